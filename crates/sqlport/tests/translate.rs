//! End-to-end translation tests: T-SQL text in, PostgreSQL text out.

use pretty_assertions::assert_eq;
use sqlport::{
    translate, OnUnsupported, SchemaQuoting, Severity, TranslateOptions, TranslationStatus,
};

fn run(sql: &str) -> sqlport::Translation {
    translate(sql, &TranslateOptions::default())
}

#[test]
fn top_with_bracketed_names() {
    let result = run("SELECT TOP (5) * FROM [dbo].[Employees];");
    assert_eq!(result.status, TranslationStatus::Ok);
    assert!(result.diagnostics.is_empty());
    assert_eq!(result.output_text, "SELECT * FROM dbo.\"Employees\" LIMIT 5;\n");
}

#[test]
fn len_with_bracketed_column() {
    let result = run("SELECT LEN([Description]) FROM [dbo].[Products];");
    assert_eq!(
        result.output_text,
        "SELECT LENGTH(\"Description\") FROM dbo.\"Products\";\n"
    );
}

#[test]
fn identifier_case_is_preserved() {
    let result = run("SELECT [First Name], LastName FROM [dbo].[Employees];");
    assert_eq!(
        result.output_text,
        "SELECT \"First Name\", \"LastName\" FROM dbo.\"Employees\";\n"
    );
}

#[test]
fn bit_column_comparison_is_left_alone() {
    // only declared BIT variables are rewritten; column types are unknown
    let result = run("SELECT * FROM [dbo].[Users] WHERE IsDeleted = 1;");
    assert_eq!(
        result.output_text,
        "SELECT * FROM dbo.\"Users\" WHERE \"IsDeleted\" = 1;\n"
    );
}

#[test]
fn national_string_loses_prefix() {
    let result = run("SELECT N'héllo';");
    assert_eq!(result.output_text, "SELECT 'héllo';\n");
}

#[test]
fn go_separates_batches() {
    let result = run("SELECT 1\nGO\nSELECT 2\nGO");
    assert_eq!(result.output_text, "SELECT 1;\nSELECT 2;\n");
}

#[test]
fn translation_is_idempotent_for_queries() {
    let sql = "SELECT TOP (3) ISNULL(Name, 'n/a') + '!' FROM [dbo].[Products] \
               WHERE CHARINDEX('x', Name) > 0 ORDER BY Name;";
    let options = TranslateOptions::default();
    let first = translate(sql, &options);
    assert_eq!(first.status, TranslationStatus::Ok);
    let second = translate(&first.output_text, &options);
    assert_eq!(second.status, TranslationStatus::Ok);
    assert_eq!(first.output_text, second.output_text);
}

#[test]
fn idempotent_across_rewritten_functions() {
    let sql = "SELECT GETUTCDATE(), DATEADD(month, 1, d), DATEDIFF(second, a, b) FROM t;";
    let options = TranslateOptions::default();
    let first = translate(sql, &options);
    assert_eq!(first.status, TranslationStatus::Ok);
    let second = translate(&first.output_text, &options);
    assert_eq!(first.output_text, second.output_text);
}

#[test]
fn for_xml_is_partial_with_span_and_intact_clause() {
    let sql = "SELECT Name FROM [dbo].[Products] FOR XML PATH('');";
    let result = run(sql);
    assert_eq!(result.status, TranslationStatus::Partial);
    assert_eq!(result.diagnostics.len(), 1);
    assert_eq!(result.diagnostics[0].severity, Severity::Error);
    assert!(result.diagnostics[0].span.is_some());
    assert!(result.diagnostics[0].message.contains("FOR XML"));
    assert_eq!(
        result.output_text,
        "/* sqlport:unsupported */\nSELECT Name FROM [dbo].[Products] FOR XML PATH('');\n"
    );
}

#[test]
fn unsupported_statement_does_not_block_the_rest() {
    let result = run("MERGE INTO a USING b ON 1 = 1; SELECT 42;");
    assert_eq!(result.status, TranslationStatus::Partial);
    assert!(result.output_text.contains("/* sqlport:unsupported */"));
    assert!(result.output_text.contains("MERGE INTO a USING b"));
    assert!(result.output_text.contains("SELECT 42;\n"));
}

#[test]
fn drop_with_warning_omits_the_statement() {
    let options = TranslateOptions {
        on_unsupported: OnUnsupported::DropWithWarning,
        ..TranslateOptions::default()
    };
    let result = translate("MERGE INTO a USING b ON 1 = 1; SELECT 42;", &options);
    assert_eq!(result.status, TranslationStatus::Partial);
    assert!(!result.output_text.contains("MERGE"));
    assert_eq!(result.output_text, "SELECT 42;\n");
}

#[test]
fn fail_mode_produces_no_output() {
    let options = TranslateOptions {
        on_unsupported: OnUnsupported::Fail,
        ..TranslateOptions::default()
    };
    let result = translate("MERGE INTO a USING b ON 1 = 1; SELECT 42;", &options);
    assert_eq!(result.status, TranslationStatus::Fatal);
    assert!(result.output_text.is_empty());
}

#[test]
fn default_schema_qualifies_bare_tables() {
    let options = TranslateOptions {
        default_schema: Some("dbo".to_string()),
        ..TranslateOptions::default()
    };
    let result = translate("SELECT * FROM Employees;", &options);
    assert_eq!(result.output_text, "SELECT * FROM dbo.\"Employees\";\n");
}

#[test]
fn always_quoting_quotes_every_identifier() {
    let options = TranslateOptions {
        schema_quoting: SchemaQuoting::Always,
        ..TranslateOptions::default()
    };
    let result = translate("SELECT name FROM dbo.employees;", &options);
    assert_eq!(
        result.output_text,
        "SELECT \"name\" FROM \"dbo\".\"employees\";\n"
    );
}

#[test]
fn procedure_translates_to_plpgsql() {
    let sql = "CREATE OR ALTER PROCEDURE [dbo].[GetRecent] @Days INT = 30 AS\n\
               BEGIN\n\
                   SET NOCOUNT ON;\n\
                   SELECT TOP (10) OrderId, Total\n\
                   FROM [dbo].[Orders]\n\
                   WHERE OrderDate >= DATEADD(day, -@Days, GETDATE())\n\
                   ORDER BY OrderDate DESC;\n\
               END";
    let result = run(sql);
    assert_eq!(result.status, TranslationStatus::Ok);
    // the dropped SET NOCOUNT is the only diagnostic
    assert_eq!(result.diagnostics.len(), 1);
    assert_eq!(result.diagnostics[0].severity, Severity::Warning);
    assert_eq!(
        result.output_text,
        "CREATE OR REPLACE PROCEDURE dbo.\"GetRecent\"(Days INTEGER DEFAULT 30)\n\
         LANGUAGE plpgsql\n\
         AS $$\n\
         BEGIN\n\
         \x20   SELECT \"OrderId\", \"Total\" FROM dbo.\"Orders\" \
         WHERE \"OrderDate\" >= CURRENT_TIMESTAMP + (-Days) * INTERVAL '1 day' \
         ORDER BY \"OrderDate\" DESC LIMIT 10;\n\
         END;\n\
         $$;\n"
    );
}

#[test]
fn try_catch_at_script_level() {
    let sql = "BEGIN TRY\n\
                   UPDATE [dbo].[Accounts] SET Balance = Balance - 100 WHERE Id = 1;\n\
               END TRY\n\
               BEGIN CATCH\n\
                   PRINT ERROR_MESSAGE();\n\
               END CATCH";
    let result = run(sql);
    assert_eq!(result.status, TranslationStatus::Ok);
    assert_eq!(
        result.output_text,
        "DO $$\n\
         BEGIN\n\
         \x20   BEGIN\n\
         \x20       UPDATE dbo.\"Accounts\" SET \"Balance\" = \"Balance\" - 100 \
         WHERE \"Id\" = 1;\n\
         \x20   EXCEPTION WHEN OTHERS THEN\n\
         \x20       RAISE NOTICE '%', SQLERRM;\n\
         \x20   END;\n\
         END;\n\
         $$;\n"
    );
}

#[test]
fn cursor_procedure_end_to_end() {
    let sql = "CREATE PROCEDURE dbo.Sweep AS\n\
               BEGIN\n\
                   DECLARE @Id INT;\n\
                   DECLARE ids CURSOR FOR SELECT id FROM dbo.queue;\n\
                   OPEN ids;\n\
                   FETCH NEXT FROM ids INTO @Id;\n\
                   WHILE @@FETCH_STATUS = 0\n\
                   BEGIN\n\
                       DELETE FROM dbo.queue WHERE id = @Id;\n\
                       FETCH NEXT FROM ids INTO @Id;\n\
                   END\n\
                   CLOSE ids;\n\
                   DEALLOCATE ids;\n\
               END";
    let result = run(sql);
    let errors: Vec<_> = result
        .diagnostics
        .iter()
        .filter(|d| d.severity == Severity::Error)
        .collect();
    assert!(errors.is_empty(), "unexpected errors: {:?}", errors);
    assert_eq!(
        result.output_text,
        "CREATE PROCEDURE dbo.\"Sweep\"()\n\
         LANGUAGE plpgsql\n\
         AS $$\n\
         DECLARE\n\
         \x20   Id INTEGER;\n\
         \x20   ids CURSOR FOR SELECT id FROM dbo.queue;\n\
         BEGIN\n\
         \x20   OPEN ids;\n\
         \x20   LOOP\n\
         \x20       FETCH ids INTO Id;\n\
         \x20       EXIT WHEN NOT FOUND;\n\
         \x20       DELETE FROM dbo.queue WHERE id = Id;\n\
         \x20   END LOOP;\n\
         \x20   CLOSE ids;\n\
         END;\n\
         $$;\n"
    );
}

#[test]
fn comments_survive_translation() {
    let result = run("-- newest employees\nSELECT TOP 5 * FROM [dbo].[Employees] ORDER BY HireDate DESC;");
    assert_eq!(
        result.output_text,
        "-- newest employees\nSELECT * FROM dbo.\"Employees\" ORDER BY \"HireDate\" DESC LIMIT 5;\n"
    );
}

#[test]
fn deterministic_across_runs() {
    let sql = "SELECT ISNULL(a, 0), GETDATE() FROM [T] WHERE x LIKE 'a%';";
    let first = run(sql);
    let second = run(sql);
    assert_eq!(first.output_text, second.output_text);
    assert_eq!(first.diagnostics.len(), second.diagnostics.len());
}

#[test]
fn result_serializes_to_json() {
    let result = run("SELECT CONVERT(VARCHAR(10), d, 120) FROM t;");
    let json = serde_json::to_value(&result).expect("serialize");
    assert_eq!(json["status"], "ok");
    assert_eq!(json["diagnostics"][0]["severity"], "warning");
    assert!(json["outputText"].as_str().expect("text").contains("CAST"));
}
