//! # sqlport
//!
//! Deterministic, rule-based translation of T-SQL batches into PostgreSQL.
//!
//! A batch moves through four stages: the [`Tokenizer`] turns source text
//! into tokens, the [`Parser`] builds an [`Expression`] tree with
//! statement-level error recovery, the [`RuleEngine`] rewrites T-SQL
//! constructs into their PostgreSQL counterparts, and the [`Generator`]
//! renders the result as text. The same input and options always produce
//! the same output, and for fully supported input running the output back
//! through [`translate`] is a no-op.
//!
//! ```
//! use sqlport::{translate, TranslateOptions};
//!
//! let result = translate(
//!     "SELECT TOP (5) * FROM [dbo].[Employees];",
//!     &TranslateOptions::default(),
//! );
//! assert_eq!(result.output_text, "SELECT * FROM dbo.\"Employees\" LIMIT 5;\n");
//! assert!(result.diagnostics.is_empty());
//! ```

pub mod diagnostics;
pub mod error;
pub mod expressions;
pub mod generator;
pub mod normalize;
pub mod parser;
pub mod rules;
pub mod tokens;

pub use diagnostics::{Diagnostic, Severity, TranslationStatus};
pub use error::{Error, Result};
pub use expressions::Expression;
pub use generator::Generator;
pub use parser::Parser;
pub use rules::RuleEngine;
pub use tokens::{Span, Token, TokenType, Tokenizer};

use serde::{Deserialize, Serialize};

/// When identifiers are rendered with double quotes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SchemaQuoting {
    /// Quote every identifier
    Always,
    /// Quote only identifiers that PostgreSQL would otherwise case-fold
    /// or reject
    #[default]
    WhenNeeded,
}

/// What to do with statements outside the supported subset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OnUnsupported {
    /// Keep the original statement in the output behind a marker comment
    #[default]
    MarkInline,
    /// Omit the statement; the diagnostic is the only trace
    DropWithWarning,
    /// Abort the whole translation
    Fail,
}

/// Options for a translation run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TranslateOptions {
    /// Schema used to qualify unqualified table references
    pub default_schema: Option<String>,
    pub schema_quoting: SchemaQuoting,
    pub on_unsupported: OnUnsupported,
}

/// The outcome of a translation run
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Translation {
    /// The PostgreSQL rendition of the batch
    pub output_text: String,
    /// Everything that was lossy, approximate, or impossible
    pub diagnostics: Vec<Diagnostic>,
    pub status: TranslationStatus,
}

impl Translation {
    fn fatal(diagnostics: Vec<Diagnostic>) -> Self {
        Self {
            output_text: String::new(),
            diagnostics,
            status: TranslationStatus::Fatal,
        }
    }
}

/// Translate a T-SQL batch into PostgreSQL.
///
/// This function is total: every outcome, including fatal ones, is
/// reported through the returned [`Translation`] rather than a panic or
/// an `Err`.
pub fn translate(sql: &str, options: &TranslateOptions) -> Translation {
    let (statements, mut diagnostics) = match Parser::parse(sql) {
        Ok(parsed) => parsed,
        Err(err) => {
            return Translation::fatal(vec![Diagnostic::error(err.to_string())]);
        }
    };

    let rewritten = {
        let mut engine = RuleEngine::new(options, &mut diagnostics);
        engine.apply(statements)
    };

    let has_errors = diagnostics.iter().any(|d| d.severity == Severity::Error);
    if options.on_unsupported == OnUnsupported::Fail && has_errors {
        return Translation::fatal(diagnostics);
    }

    match Generator::new(options).generate(rewritten) {
        Ok(output_text) => {
            let status = TranslationStatus::from_diagnostics(&diagnostics);
            Translation {
                output_text,
                diagnostics,
                status,
            }
        }
        Err(err) => {
            diagnostics.push(Diagnostic::error(err.to_string()));
            Translation::fatal(diagnostics)
        }
    }
}

/// Tokenize a T-SQL string
pub fn tokenize(sql: &str) -> Result<Vec<Token>> {
    Tokenizer::new().tokenize(sql)
}

/// Parse a T-SQL batch into statements plus recovery diagnostics
pub fn parse(sql: &str) -> Result<(Vec<Expression>, Vec<Diagnostic>)> {
    Parser::parse(sql)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ok_translation() {
        let result = translate(
            "SELECT TOP (5) * FROM [dbo].[Employees];",
            &TranslateOptions::default(),
        );
        assert_eq!(result.status, TranslationStatus::Ok);
        assert_eq!(
            result.output_text,
            "SELECT * FROM dbo.\"Employees\" LIMIT 5;\n"
        );
    }

    #[test]
    fn unterminated_string_is_fatal() {
        let result = translate("SELECT 'abc", &TranslateOptions::default());
        assert_eq!(result.status, TranslationStatus::Fatal);
        assert!(result.output_text.is_empty());
        assert_eq!(result.diagnostics.len(), 1);
    }

    #[test]
    fn unsupported_statement_is_partial() {
        let result = translate(
            "SELECT name FROM t FOR XML PATH(''); SELECT 1;",
            &TranslateOptions::default(),
        );
        assert_eq!(result.status, TranslationStatus::Partial);
        assert!(result.output_text.contains("SELECT 1;"));
    }

    #[test]
    fn fail_mode_aborts_on_unsupported() {
        let options = TranslateOptions {
            on_unsupported: OnUnsupported::Fail,
            ..TranslateOptions::default()
        };
        let result = translate("SELECT name FROM t FOR XML PATH('');", &options);
        assert_eq!(result.status, TranslationStatus::Fatal);
        assert!(result.output_text.is_empty());
    }

    #[test]
    fn warnings_do_not_demote_status() {
        let result = translate(
            "SELECT CONVERT(VARCHAR(10), d, 120) FROM t;",
            &TranslateOptions::default(),
        );
        assert_eq!(result.status, TranslationStatus::Ok);
        assert_eq!(result.diagnostics.len(), 1);
        assert_eq!(result.diagnostics[0].severity, Severity::Warning);
    }
}
