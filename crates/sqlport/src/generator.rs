//! Rendering of the rewritten tree as PostgreSQL text.
//!
//! Plain SQL statements render one per line. Routine bodies render as
//! PL/pgSQL with variable declarations hoisted into the `DECLARE` section,
//! since T-SQL allows `DECLARE` anywhere but PL/pgSQL does not. Procedural
//! statements that appear at script level, where PostgreSQL has no direct
//! home for them, are wrapped in a `DO $$ ... $$` block.

use crate::error::{Error, Result};
use crate::expressions::*;
use crate::rules::map_data_type;
use crate::{OnUnsupported, TranslateOptions};

const INDENT: &str = "    ";

pub struct Generator<'a> {
    options: &'a TranslateOptions,
}

impl<'a> Generator<'a> {
    pub fn new(options: &'a TranslateOptions) -> Self {
        Self { options }
    }

    /// Render a whole batch. Consecutive procedural statements are grouped
    /// into a single `DO` block.
    pub fn generate(&self, statements: Vec<Expression>) -> Result<String> {
        let mut out = String::new();
        let mut procedural: Vec<Expression> = Vec::new();
        for statement in statements {
            if is_procedural(&statement) {
                procedural.push(statement);
                continue;
            }
            if !procedural.is_empty() {
                self.emit_do_block(std::mem::take(&mut procedural), &mut out)?;
            }
            self.emit_top_level(statement, &mut out)?;
        }
        if !procedural.is_empty() {
            self.emit_do_block(procedural, &mut out)?;
        }
        Ok(out)
    }

    fn emit_top_level(&self, statement: Expression, out: &mut String) -> Result<()> {
        match statement {
            Expression::CreateView(view) => self.emit_create_view(*view, out),
            Expression::CreateProcedure(proc) => self.emit_create_procedure(*proc, out),
            Expression::CreateFunction(func) => self.emit_create_function(*func, out),
            Expression::CreateTable(table) => self.emit_create_table(*table, out),
            Expression::Unparsed(unparsed) => {
                self.emit_unparsed(*unparsed, 0, out);
                Ok(())
            }
            Expression::BeginTransaction(t) => {
                self.emit_comments(&t.comments, 0, out);
                out.push_str("BEGIN;\n");
                Ok(())
            }
            Expression::Commit(t) => {
                self.emit_comments(&t.comments, 0, out);
                out.push_str("COMMIT;\n");
                Ok(())
            }
            Expression::Rollback(t) => {
                self.emit_comments(&t.comments, 0, out);
                out.push_str("ROLLBACK;\n");
                Ok(())
            }
            Expression::Select(ref select) => {
                self.emit_comments(&select.comments, 0, out);
                out.push_str(&self.expr(&statement)?);
                out.push_str(";\n");
                Ok(())
            }
            Expression::Union(_) => {
                out.push_str(&self.expr(&statement)?);
                out.push_str(";\n");
                Ok(())
            }
            Expression::Insert(insert) => {
                let insert = *insert;
                self.emit_comments(&insert.comments, 0, out);
                out.push_str(&self.render_insert(&insert)?);
                out.push_str(";\n");
                Ok(())
            }
            Expression::Update(update) => {
                let update = *update;
                self.emit_comments(&update.comments, 0, out);
                out.push_str(&self.render_update(&update)?);
                out.push_str(";\n");
                Ok(())
            }
            Expression::Delete(delete) => {
                let delete = *delete;
                self.emit_comments(&delete.comments, 0, out);
                out.push_str(&self.render_delete(&delete)?);
                out.push_str(";\n");
                Ok(())
            }
            other => Err(Error::generate(format!(
                "statement cannot appear at script level: {:?}",
                other
            ))),
        }
    }

    // ===== DO blocks and routine bodies =====

    fn emit_do_block(&self, statements: Vec<Expression>, out: &mut String) -> Result<()> {
        let mut statements = statements;
        let declares = self.hoist_declarations(&mut statements)?;
        out.push_str("DO $$\n");
        if !declares.is_empty() {
            out.push_str("DECLARE\n");
            for line in &declares {
                out.push_str(INDENT);
                out.push_str(line);
                out.push('\n');
            }
        }
        out.push_str("BEGIN\n");
        for statement in statements {
            self.emit_procedural(statement, 1, out)?;
        }
        out.push_str("END;\n$$;\n");
        Ok(())
    }

    fn emit_routine_header_body(&self, body: Block, out: &mut String) -> Result<()> {
        let mut statements = body.statements;
        let declares = self.hoist_declarations(&mut statements)?;
        out.push_str("AS $$\n");
        if !declares.is_empty() {
            out.push_str("DECLARE\n");
            for line in &declares {
                out.push_str(INDENT);
                out.push_str(line);
                out.push('\n');
            }
        }
        out.push_str("BEGIN\n");
        for statement in statements {
            self.emit_procedural(statement, 1, out)?;
        }
        out.push_str("END;\n$$;\n");
        Ok(())
    }

    /// Remove every variable and cursor declaration from the statement
    /// tree and render them as `DECLARE` section lines, in order of
    /// appearance
    fn hoist_declarations(&self, statements: &mut Vec<Expression>) -> Result<Vec<String>> {
        let mut lines = Vec::new();
        self.hoist_from_list(statements, &mut lines)?;
        Ok(lines)
    }

    fn hoist_from_list(
        &self,
        statements: &mut Vec<Expression>,
        lines: &mut Vec<String>,
    ) -> Result<()> {
        let mut i = 0;
        while i < statements.len() {
            let remove = match &mut statements[i] {
                Expression::Declare(declare) => {
                    let mut line =
                        format!("{} {}", declare.name, render_data_type(&declare.data_type));
                    if let Some(default) = &declare.default {
                        line.push_str(" := ");
                        line.push_str(&self.expr(default)?);
                    }
                    line.push(';');
                    lines.push(line);
                    true
                }
                Expression::DeclareCursor(cursor) => {
                    lines.push(format!(
                        "{} CURSOR FOR {};",
                        self.ident(&cursor.name),
                        self.expr(&cursor.query)?
                    ));
                    true
                }
                Expression::Block(block) => {
                    self.hoist_from_list(&mut block.statements, lines)?;
                    block.statements.is_empty()
                }
                Expression::If(if_stmt) => {
                    self.hoist_from_list(&mut if_stmt.then_branch.statements, lines)?;
                    if let Some(else_branch) = if_stmt.else_branch.as_mut() {
                        self.hoist_from_list(&mut else_branch.statements, lines)?;
                    }
                    false
                }
                Expression::While(while_stmt) => {
                    self.hoist_from_list(&mut while_stmt.body.statements, lines)?;
                    false
                }
                Expression::CursorLoop(cursor_loop) => {
                    self.hoist_from_list(&mut cursor_loop.body, lines)?;
                    false
                }
                Expression::TryCatch(tc) => {
                    self.hoist_from_list(&mut tc.try_body.statements, lines)?;
                    self.hoist_from_list(&mut tc.catch_body.statements, lines)?;
                    false
                }
                _ => false,
            };
            if remove {
                statements.remove(i);
            } else {
                i += 1;
            }
        }
        Ok(())
    }

    /// Render one statement inside a PL/pgSQL body
    fn emit_procedural(
        &self,
        statement: Expression,
        depth: usize,
        out: &mut String,
    ) -> Result<()> {
        let pad = INDENT.repeat(depth);
        match statement {
            Expression::Block(block) => {
                // T-SQL BEGIN/END is grouping, not scoping; flatten
                for stmt in block.statements {
                    self.emit_procedural(stmt, depth, out)?;
                }
            }
            Expression::SetVariable(set) => {
                self.emit_comments(&set.comments, depth, out);
                out.push_str(&format!("{}{} := {};\n", pad, set.name, self.expr(&set.value)?));
            }
            Expression::If(if_stmt) => {
                let if_stmt = *if_stmt;
                self.emit_comments(&if_stmt.comments, depth, out);
                out.push_str(&format!("{}IF {} THEN\n", pad, self.expr(&if_stmt.condition)?));
                for stmt in if_stmt.then_branch.statements {
                    self.emit_procedural(stmt, depth + 1, out)?;
                }
                if let Some(else_branch) = if_stmt.else_branch {
                    out.push_str(&format!("{}ELSE\n", pad));
                    for stmt in else_branch.statements {
                        self.emit_procedural(stmt, depth + 1, out)?;
                    }
                }
                out.push_str(&format!("{}END IF;\n", pad));
            }
            Expression::While(while_stmt) => {
                let while_stmt = *while_stmt;
                self.emit_comments(&while_stmt.comments, depth, out);
                out.push_str(&format!(
                    "{}WHILE {} LOOP\n",
                    pad,
                    self.expr(&while_stmt.condition)?
                ));
                for stmt in while_stmt.body.statements {
                    self.emit_procedural(stmt, depth + 1, out)?;
                }
                out.push_str(&format!("{}END LOOP;\n", pad));
            }
            Expression::CursorLoop(cursor_loop) => {
                let cursor_loop = *cursor_loop;
                out.push_str(&format!("{}LOOP\n", pad));
                self.emit_procedural(cursor_loop.fetch, depth + 1, out)?;
                out.push_str(&format!("{}EXIT WHEN NOT FOUND;\n", INDENT.repeat(depth + 1)));
                for stmt in cursor_loop.body {
                    self.emit_procedural(stmt, depth + 1, out)?;
                }
                out.push_str(&format!("{}END LOOP;\n", pad));
            }
            Expression::TryCatch(tc) => {
                let tc = *tc;
                self.emit_comments(&tc.comments, depth, out);
                out.push_str(&format!("{}BEGIN\n", pad));
                for stmt in tc.try_body.statements {
                    self.emit_procedural(stmt, depth + 1, out)?;
                }
                out.push_str(&format!("{}EXCEPTION WHEN OTHERS THEN\n", pad));
                for stmt in tc.catch_body.statements {
                    self.emit_procedural(stmt, depth + 1, out)?;
                }
                out.push_str(&format!("{}END;\n", pad));
            }
            Expression::RaiseNotice(raise) => {
                let raise = *raise;
                self.emit_comments(&raise.comments, depth, out);
                match &raise.value {
                    Expression::Literal(Literal::String(s))
                    | Expression::Literal(Literal::NationalString(s)) => {
                        // literal percent signs are format characters in RAISE
                        let escaped = s.replace('\'', "''").replace('%', "%%");
                        out.push_str(&format!("{}RAISE NOTICE '{}';\n", pad, escaped));
                    }
                    other => {
                        out.push_str(&format!(
                            "{}RAISE NOTICE '%', {};\n",
                            pad,
                            self.expr(other)?
                        ));
                    }
                }
            }
            Expression::Return(ret) => {
                let ret = *ret;
                self.emit_comments(&ret.comments, depth, out);
                match ret.value {
                    Some(value) => {
                        out.push_str(&format!("{}RETURN {};\n", pad, self.expr(&value)?))
                    }
                    None => out.push_str(&format!("{}RETURN;\n", pad)),
                }
            }
            Expression::OpenCursor(cursor) => {
                self.emit_comments(&cursor.comments, depth, out);
                out.push_str(&format!("{}OPEN {};\n", pad, self.ident(&cursor.name)));
            }
            Expression::CloseCursor(cursor) => {
                self.emit_comments(&cursor.comments, depth, out);
                out.push_str(&format!("{}CLOSE {};\n", pad, self.ident(&cursor.name)));
            }
            Expression::FetchCursor(fetch) => {
                let fetch = *fetch;
                self.emit_comments(&fetch.comments, depth, out);
                out.push_str(&format!(
                    "{}FETCH {} INTO {};\n",
                    pad,
                    self.ident(&fetch.cursor),
                    fetch.into.join(", ")
                ));
            }
            Expression::Commit(t) => {
                self.emit_comments(&t.comments, depth, out);
                out.push_str(&format!("{}COMMIT;\n", pad));
            }
            Expression::Rollback(t) => {
                self.emit_comments(&t.comments, depth, out);
                out.push_str(&format!("{}ROLLBACK;\n", pad));
            }
            Expression::Select(ref select) => {
                self.emit_comments(&select.comments, depth, out);
                out.push_str(&pad);
                out.push_str(&self.expr(&statement)?);
                out.push_str(";\n");
            }
            Expression::Insert(insert) => {
                let insert = *insert;
                self.emit_comments(&insert.comments, depth, out);
                out.push_str(&format!("{}{};\n", pad, self.render_insert(&insert)?));
            }
            Expression::Update(update) => {
                let update = *update;
                self.emit_comments(&update.comments, depth, out);
                out.push_str(&format!("{}{};\n", pad, self.render_update(&update)?));
            }
            Expression::Delete(delete) => {
                let delete = *delete;
                self.emit_comments(&delete.comments, depth, out);
                out.push_str(&format!("{}{};\n", pad, self.render_delete(&delete)?));
            }
            Expression::Unparsed(unparsed) => self.emit_unparsed(*unparsed, depth, out),
            Expression::Declare(_) | Expression::DeclareCursor(_) => {
                // hoisted before emission; reaching one here is a bug
                return Err(Error::internal("declaration survived hoisting"));
            }
            other => {
                return Err(Error::generate(format!(
                    "statement cannot appear in a routine body: {:?}",
                    other
                )))
            }
        }
        Ok(())
    }

    fn emit_unparsed(&self, unparsed: Unparsed, depth: usize, out: &mut String) {
        let pad = INDENT.repeat(depth);
        match self.options.on_unsupported {
            OnUnsupported::DropWithWarning => {}
            OnUnsupported::MarkInline | OnUnsupported::Fail => {
                self.emit_comments(&unparsed.comments, depth, out);
                out.push_str(&pad);
                out.push_str("/* sqlport:unsupported */\n");
                for line in unparsed.sql.trim_end().lines() {
                    out.push_str(&pad);
                    out.push_str(line);
                    out.push('\n');
                }
                let ends_clean = unparsed.sql.trim_end().ends_with(';');
                if !ends_clean {
                    // keep the statement boundary the original had
                    let len = out.trim_end().len();
                    out.truncate(len);
                    out.push_str(";\n");
                }
            }
        }
    }

    fn emit_comments(&self, comments: &[String], depth: usize, out: &mut String) {
        let pad = INDENT.repeat(depth);
        for comment in comments {
            out.push_str(&format!("{}-- {}\n", pad, comment));
        }
    }

    // ===== DDL =====

    fn emit_create_view(&self, view: CreateView, out: &mut String) -> Result<()> {
        self.emit_comments(&view.comments, 0, out);
        let replace = if view.or_alter { "OR REPLACE " } else { "" };
        out.push_str(&format!("CREATE {}VIEW {}", replace, self.object_name(&view.name)));
        if !view.columns.is_empty() {
            let cols: Vec<String> = view.columns.iter().map(|c| self.ident(c)).collect();
            out.push_str(&format!(" ({})", cols.join(", ")));
        }
        out.push_str(" AS\n");
        out.push_str(&self.expr(&view.query)?);
        out.push_str(";\n");
        Ok(())
    }

    fn render_params(&self, params: &[ProcParam]) -> Result<String> {
        let rendered: Vec<String> = params
            .iter()
            .map(|p| {
                let mode = if p.output { "INOUT " } else { "" };
                let mut s = format!("{}{} {}", mode, p.name, render_data_type(&p.data_type));
                if let Some(default) = &p.default {
                    s.push_str(" DEFAULT ");
                    s.push_str(&self.expr(default)?);
                }
                Ok(s)
            })
            .collect::<Result<_>>()?;
        Ok(rendered.join(", "))
    }

    fn emit_create_procedure(&self, proc: CreateProcedure, out: &mut String) -> Result<()> {
        self.emit_comments(&proc.comments, 0, out);
        let replace = if proc.or_alter { "OR REPLACE " } else { "" };
        out.push_str(&format!(
            "CREATE {}PROCEDURE {}({})\n",
            replace,
            self.object_name(&proc.name),
            self.render_params(&proc.params)?
        ));
        out.push_str("LANGUAGE plpgsql\n");
        self.emit_routine_header_body(proc.body, out)
    }

    fn emit_create_function(&self, func: CreateFunction, out: &mut String) -> Result<()> {
        self.emit_comments(&func.comments, 0, out);
        let replace = if func.or_alter { "OR REPLACE " } else { "" };
        out.push_str(&format!(
            "CREATE {}FUNCTION {}({}) RETURNS {}\n",
            replace,
            self.object_name(&func.name),
            self.render_params(&func.params)?,
            render_data_type(&func.returns)
        ));
        out.push_str("LANGUAGE plpgsql\n");
        self.emit_routine_header_body(func.body, out)
    }

    fn emit_create_table(&self, table: CreateTable, out: &mut String) -> Result<()> {
        self.emit_comments(&table.comments, 0, out);
        out.push_str(&format!("CREATE TABLE {} (\n", self.object_name(&table.name)));
        let mut lines = Vec::new();
        for column in &table.columns {
            let mut line = format!(
                "{}{} {}",
                INDENT,
                self.ident(&column.name),
                render_data_type(&column.data_type)
            );
            if column.not_null {
                line.push_str(" NOT NULL");
            }
            if let Some(default) = &column.default {
                line.push_str(" DEFAULT ");
                line.push_str(&self.expr(default)?);
            }
            lines.push(line);
        }
        out.push_str(&lines.join(",\n"));
        out.push_str("\n);\n");
        Ok(())
    }

    // ===== DML =====

    fn render_insert(&self, insert: &Insert) -> Result<String> {
        let mut s = format!("INSERT INTO {}", self.object_name(&insert.table));
        if !insert.columns.is_empty() {
            let cols: Vec<String> = insert.columns.iter().map(|c| self.ident(c)).collect();
            s.push_str(&format!(" ({})", cols.join(", ")));
        }
        match &insert.source {
            InsertSource::Values(rows) => {
                let rendered: Vec<String> = rows
                    .iter()
                    .map(|row| {
                        let vals: Vec<String> =
                            row.iter().map(|e| self.expr(e)).collect::<Result<_>>()?;
                        Ok(format!("({})", vals.join(", ")))
                    })
                    .collect::<Result<_>>()?;
                s.push_str(&format!(" VALUES {}", rendered.join(", ")));
            }
            InsertSource::Query(query) => {
                s.push(' ');
                s.push_str(&self.expr(query)?);
            }
        }
        Ok(s)
    }

    fn render_update(&self, update: &Update) -> Result<String> {
        let assignments: Vec<String> = update
            .assignments
            .iter()
            .map(|a| Ok(format!("{} = {}", self.column(&a.target), self.expr(&a.value)?)))
            .collect::<Result<_>>()?;
        let mut s = format!(
            "UPDATE {} SET {}",
            self.object_name(&update.table),
            assignments.join(", ")
        );
        if let Some(selection) = &update.selection {
            s.push_str(&format!(" WHERE {}", self.expr(selection)?));
        }
        Ok(s)
    }

    fn render_delete(&self, delete: &Delete) -> Result<String> {
        let mut s = format!("DELETE FROM {}", self.object_name(&delete.table));
        if let Some(selection) = &delete.selection {
            s.push_str(&format!(" WHERE {}", self.expr(selection)?));
        }
        Ok(s)
    }

    // ===== names =====

    fn ident(&self, identifier: &Identifier) -> String {
        if identifier.quoted {
            format!("\"{}\"", identifier.name.replace('"', "\"\""))
        } else {
            identifier.name.clone()
        }
    }

    fn object_name(&self, name: &ObjectName) -> String {
        match &name.schema {
            Some(schema) => format!("{}.{}", self.ident(schema), self.ident(&name.name)),
            None => self.ident(&name.name),
        }
    }

    fn column(&self, column: &Column) -> String {
        match &column.qualifier {
            Some(q) => format!("{}.{}", self.ident(q), self.ident(&column.name)),
            None => self.ident(&column.name),
        }
    }

    // ===== expressions =====

    pub fn expr(&self, expression: &Expression) -> Result<String> {
        let s = match expression {
            Expression::Literal(literal) => match literal {
                Literal::Number(n) => n.clone(),
                Literal::String(s) | Literal::NationalString(s) => {
                    format!("'{}'", s.replace('\'', "''"))
                }
                Literal::Boolean(true) => "TRUE".to_string(),
                Literal::Boolean(false) => "FALSE".to_string(),
                Literal::Null => "NULL".to_string(),
            },
            Expression::Column(column) => self.column(column),
            Expression::Variable(v) | Expression::SystemVariable(v) => v.name.clone(),
            Expression::Star(star) => match &star.qualifier {
                Some(q) => format!("{}.*", self.ident(q)),
                None => "*".to_string(),
            },
            Expression::BinaryOp(op) => format!(
                "{} {} {}",
                self.expr(&op.left)?,
                binary_operator(op.op),
                self.expr(&op.right)?
            ),
            Expression::UnaryOp(op) => match op.op {
                UnaryOperator::Not => format!("NOT {}", self.expr(&op.this)?),
                UnaryOperator::Minus => format!("-{}", self.expr(&op.this)?),
                UnaryOperator::Plus => format!("+{}", self.expr(&op.this)?),
            },
            Expression::Paren(paren) => format!("({})", self.expr(&paren.this)?),
            Expression::Case(case) => {
                let mut s = "CASE".to_string();
                if let Some(operand) = &case.operand {
                    s.push(' ');
                    s.push_str(&self.expr(operand)?);
                }
                for when in &case.whens {
                    s.push_str(&format!(
                        " WHEN {} THEN {}",
                        self.expr(&when.condition)?,
                        self.expr(&when.result)?
                    ));
                }
                if let Some(else_result) = &case.else_result {
                    s.push_str(&format!(" ELSE {}", self.expr(else_result)?));
                }
                s.push_str(" END");
                s
            }
            Expression::FunctionCall(call) => {
                if call.no_parens {
                    call.name.clone()
                } else {
                    let args: Vec<String> =
                        call.args.iter().map(|a| self.expr(a)).collect::<Result<_>>()?;
                    let distinct = if call.distinct { "DISTINCT " } else { "" };
                    let mut s = format!("{}({}{})", call.name, distinct, args.join(", "));
                    if let Some(over) = &call.over {
                        s.push_str(&self.window_spec(over)?);
                    }
                    s
                }
            }
            Expression::Cast(cast) => format!(
                "CAST({} AS {})",
                self.expr(&cast.this)?,
                render_data_type(&cast.to)
            ),
            Expression::Convert(convert) => {
                // rewritten to CAST by the rule engine; render defensively
                format!(
                    "CAST({} AS {})",
                    self.expr(&convert.this)?,
                    render_data_type(&convert.to)
                )
            }
            Expression::Position(p) => format!(
                "POSITION({} IN {})",
                self.expr(&p.substring)?,
                self.expr(&p.string)?
            ),
            Expression::Interval(interval) => {
                format!("INTERVAL '{} {}'", interval.value, interval.unit)
            }
            Expression::Extract(extract) => {
                format!("EXTRACT({} FROM {})", extract.field, self.expr(&extract.this)?)
            }
            Expression::AtTimeZone(a) => {
                format!("{} AT TIME ZONE '{}'", self.expr(&a.this)?, a.time_zone)
            }
            Expression::IsNull(i) => {
                let not = if i.not { " NOT" } else { "" };
                format!("{} IS{} NULL", self.expr(&i.this)?, not)
            }
            Expression::InList(i) => {
                let not = if i.not { "NOT " } else { "" };
                let list: Vec<String> =
                    i.list.iter().map(|e| self.expr(e)).collect::<Result<_>>()?;
                format!("{} {}IN ({})", self.expr(&i.this)?, not, list.join(", "))
            }
            Expression::InSubquery(i) => {
                let not = if i.not { "NOT " } else { "" };
                format!(
                    "{} {}IN ({})",
                    self.expr(&i.this)?,
                    not,
                    self.expr(&i.subquery)?
                )
            }
            Expression::Between(b) => {
                let not = if b.not { "NOT " } else { "" };
                format!(
                    "{} {}BETWEEN {} AND {}",
                    self.expr(&b.this)?,
                    not,
                    self.expr(&b.low)?,
                    self.expr(&b.high)?
                )
            }
            Expression::Like(l) => {
                let not = if l.not { "NOT " } else { "" };
                format!("{} {}LIKE {}", self.expr(&l.this)?, not, self.expr(&l.pattern)?)
            }
            Expression::Exists(e) => {
                let not = if e.not { "NOT " } else { "" };
                format!("{}EXISTS ({})", not, self.expr(&e.subquery)?)
            }
            Expression::Subquery(inner) => format!("({})", self.expr(inner)?),
            Expression::Select(select) => self.render_select(select)?,
            Expression::Union(union) => {
                let op = if union.all { "UNION ALL" } else { "UNION" };
                format!(
                    "{} {} {}",
                    self.expr(&union.left)?,
                    op,
                    self.expr(&union.right)?
                )
            }
            other => {
                return Err(Error::generate(format!(
                    "node has no expression rendering: {:?}",
                    other
                )))
            }
        };
        Ok(s)
    }

    fn window_spec(&self, spec: &WindowSpec) -> Result<String> {
        let mut parts = Vec::new();
        if !spec.partition_by.is_empty() {
            let exprs: Vec<String> = spec
                .partition_by
                .iter()
                .map(|e| self.expr(e))
                .collect::<Result<_>>()?;
            parts.push(format!("PARTITION BY {}", exprs.join(", ")));
        }
        if !spec.order_by.is_empty() {
            parts.push(format!("ORDER BY {}", self.order_by_list(&spec.order_by)?));
        }
        Ok(format!(" OVER ({})", parts.join(" ")))
    }

    fn order_by_list(&self, items: &[OrderByExpr]) -> Result<String> {
        let rendered: Vec<String> = items
            .iter()
            .map(|o| {
                let dir = if o.desc { " DESC" } else { "" };
                Ok(format!("{}{}", self.expr(&o.expr)?, dir))
            })
            .collect::<Result<_>>()?;
        Ok(rendered.join(", "))
    }

    fn render_select(&self, select: &Select) -> Result<String> {
        let mut s = "SELECT ".to_string();
        if select.distinct {
            s.push_str("DISTINCT ");
        }
        let projection: Vec<String> = select
            .projection
            .iter()
            .map(|item| {
                let mut rendered = self.expr(&item.expr)?;
                if let Some(alias) = &item.alias {
                    rendered.push_str(" AS ");
                    rendered.push_str(&self.ident(alias));
                }
                Ok(rendered)
            })
            .collect::<Result<_>>()?;
        s.push_str(&projection.join(", "));
        if !select.into_variables.is_empty() {
            s.push_str(&format!(" INTO {}", select.into_variables.join(", ")));
        }
        if !select.from.is_empty() {
            let tables: Vec<String> = select
                .from
                .iter()
                .map(|t| self.table_with_joins(t))
                .collect::<Result<_>>()?;
            s.push_str(&format!(" FROM {}", tables.join(", ")));
        }
        if let Some(selection) = &select.selection {
            s.push_str(&format!(" WHERE {}", self.expr(selection)?));
        }
        if !select.group_by.is_empty() {
            let exprs: Vec<String> = select
                .group_by
                .iter()
                .map(|e| self.expr(e))
                .collect::<Result<_>>()?;
            s.push_str(&format!(" GROUP BY {}", exprs.join(", ")));
        }
        if let Some(having) = &select.having {
            s.push_str(&format!(" HAVING {}", self.expr(having)?));
        }
        if !select.order_by.is_empty() {
            s.push_str(&format!(" ORDER BY {}", self.order_by_list(&select.order_by)?));
        }
        if let Some(limit) = &select.limit {
            s.push_str(&format!(" LIMIT {}", self.expr(limit)?));
        }
        Ok(s)
    }

    fn table_with_joins(&self, table: &TableWithJoins) -> Result<String> {
        let mut s = self.table_factor(&table.relation)?;
        for join in &table.joins {
            let keyword = match join.kind {
                JoinKind::Inner => "INNER JOIN",
                JoinKind::Left => "LEFT JOIN",
                JoinKind::Right => "RIGHT JOIN",
                JoinKind::Full => "FULL JOIN",
                JoinKind::Cross => "CROSS JOIN",
            };
            s.push_str(&format!(" {} {}", keyword, self.table_factor(&join.relation)?));
            if let Some(on) = &join.on {
                s.push_str(&format!(" ON {}", self.expr(on)?));
            }
        }
        Ok(s)
    }

    fn table_factor(&self, factor: &TableFactor) -> Result<String> {
        match factor {
            TableFactor::Table { name, alias } => {
                let mut s = self.object_name(name);
                if let Some(alias) = alias {
                    s.push(' ');
                    s.push_str(&self.ident(alias));
                }
                Ok(s)
            }
            TableFactor::Derived { subquery, alias } => {
                let mut s = format!("({})", self.expr(subquery)?);
                if let Some(alias) = alias {
                    s.push(' ');
                    s.push_str(&self.ident(alias));
                }
                Ok(s)
            }
        }
    }
}

fn binary_operator(op: BinaryOperator) -> &'static str {
    use BinaryOperator::*;
    match op {
        Eq => "=",
        Neq => "<>",
        Lt => "<",
        Lte => "<=",
        Gt => ">",
        Gte => ">=",
        Plus => "+",
        Minus => "-",
        Multiply => "*",
        Divide => "/",
        Modulo => "%",
        And => "AND",
        Or => "OR",
        Concat => "||",
    }
}

/// Render a data type in PostgreSQL spelling. T-SQL variants are mapped
/// first, so this is total over the enum.
pub fn render_data_type(data_type: &DataType) -> String {
    use DataType::*;
    let mapped = map_data_type(data_type.clone());
    match mapped {
        Boolean => "BOOLEAN".to_string(),
        SmallInt => "SMALLINT".to_string(),
        Integer => "INTEGER".to_string(),
        BigIntPg => "BIGINT".to_string(),
        Decimal { precision, scale } => match (precision, scale) {
            (Some(p), Some(s)) => format!("NUMERIC({}, {})", p, s),
            (Some(p), None) => format!("NUMERIC({})", p),
            _ => "NUMERIC".to_string(),
        },
        Real => "REAL".to_string(),
        DoublePrecision => "DOUBLE PRECISION".to_string(),
        Char(len) => with_len("CHAR", len),
        VarChar(len) => with_len("VARCHAR", len),
        Text => "TEXT".to_string(),
        Date => "DATE".to_string(),
        Time => "TIME".to_string(),
        Timestamp => "TIMESTAMP".to_string(),
        TimestampTz => "TIMESTAMPTZ".to_string(),
        Uuid => "UUID".to_string(),
        Bytea => "BYTEA".to_string(),
        Serial => "SERIAL".to_string(),
        SmallSerial => "SMALLSERIAL".to_string(),
        BigSerial => "BIGSERIAL".to_string(),
        Xml => "XML".to_string(),
        Custom(name) => name,
        // map_data_type is the identity on these only when they are
        // already PostgreSQL-side; nothing else reaches here
        other => format!("{:?}", other).to_uppercase(),
    }
}

fn with_len(name: &str, len: Option<TypeLen>) -> String {
    match len {
        Some(TypeLen::Number(n)) => format!("{}({})", name, n),
        Some(TypeLen::Max) | None => name.to_string(),
    }
}

/// Statements that only exist inside a PL/pgSQL body
fn is_procedural(statement: &Expression) -> bool {
    match statement {
        Expression::Declare(_)
        | Expression::DeclareCursor(_)
        | Expression::SetVariable(_)
        | Expression::If(_)
        | Expression::While(_)
        | Expression::CursorLoop(_)
        | Expression::TryCatch(_)
        | Expression::RaiseNotice(_)
        | Expression::Return(_)
        | Expression::OpenCursor(_)
        | Expression::FetchCursor(_)
        | Expression::CloseCursor(_)
        | Expression::Block(_) => true,
        // SELECT ... INTO var is variable assignment, valid only in
        // PL/pgSQL; at the top level it would create a table instead
        Expression::Select(select) => !select.into_variables.is_empty(),
        Expression::Union(union) => is_procedural(&union.left) || is_procedural(&union.right),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Parser;
    use crate::rules::RuleEngine;
    use crate::TranslateOptions;

    fn generate(sql: &str) -> String {
        let (statements, mut diagnostics) = Parser::parse(sql).expect("tokenize");
        let options = TranslateOptions::default();
        let rewritten = {
            let mut engine = RuleEngine::new(&options, &mut diagnostics);
            engine.apply(statements)
        };
        Generator::new(&options).generate(rewritten).expect("generate")
    }

    #[test]
    fn top_and_brackets() {
        assert_eq!(
            generate("SELECT TOP (5) * FROM [dbo].[Employees];"),
            "SELECT * FROM dbo.\"Employees\" LIMIT 5;\n"
        );
    }

    #[test]
    fn len_to_length() {
        assert_eq!(
            generate("SELECT LEN([Description]) FROM [dbo].[Products];"),
            "SELECT LENGTH(\"Description\") FROM dbo.\"Products\";\n"
        );
    }

    #[test]
    fn quoted_quote_is_doubled() {
        let out = generate("SELECT * FROM [Weird\"Name]");
        assert!(out.contains("\"Weird\"\"Name\""));
    }

    #[test]
    fn string_escape_survives() {
        assert_eq!(generate("SELECT 'it''s';"), "SELECT 'it''s';\n");
    }

    #[test]
    fn case_rendering() {
        assert_eq!(
            generate("SELECT CASE WHEN a = 1 THEN 'y' ELSE 'n' END FROM t"),
            "SELECT CASE WHEN a = 1 THEN 'y' ELSE 'n' END FROM t;\n"
        );
    }

    #[test]
    fn limit_renders_after_order_by() {
        assert_eq!(
            generate("SELECT TOP 3 name FROM t ORDER BY name DESC"),
            "SELECT name FROM t ORDER BY name DESC LIMIT 3;\n"
        );
    }

    #[test]
    fn dateadd_interval() {
        assert_eq!(
            generate("SELECT DATEADD(day, 7, due) FROM t"),
            "SELECT due + INTERVAL '7 day' FROM t;\n"
        );
    }

    #[test]
    fn procedure_wraps_in_plpgsql() {
        let out = generate(
            "CREATE OR ALTER PROCEDURE dbo.Tally @Limit INT AS \
             BEGIN \
               DECLARE @n INT = 0 \
               WHILE @n < @Limit \
               BEGIN \
                 SET @n = @n + 1 \
               END \
             END",
        );
        assert!(out.starts_with("CREATE OR REPLACE PROCEDURE dbo.\"Tally\"(Limit INTEGER)\n"));
        assert!(out.contains("LANGUAGE plpgsql\n"));
        assert!(out.contains("DECLARE\n    n INTEGER := 0;\n"));
        assert!(out.contains("WHILE n < Limit LOOP\n"));
        assert!(out.contains("n := n + 1;\n"));
        assert!(out.trim_end().ends_with("$$;"));
    }

    #[test]
    fn try_catch_becomes_exception_block() {
        let out = generate(
            "CREATE PROCEDURE p AS \
             BEGIN \
               BEGIN TRY \
                 UPDATE t SET x = 1 \
               END TRY \
               BEGIN CATCH \
                 PRINT ERROR_MESSAGE() \
               END CATCH \
             END",
        );
        assert!(out.contains("EXCEPTION WHEN OTHERS THEN\n"));
        assert!(out.contains("RAISE NOTICE '%', SQLERRM;\n"));
    }

    #[test]
    fn cursor_loop_rendering() {
        let out = generate(
            "CREATE PROCEDURE p AS \
             BEGIN \
               DECLARE @Id INT \
               DECLARE c CURSOR FOR SELECT id FROM t \
               OPEN c \
               FETCH NEXT FROM c INTO @Id \
               WHILE @@FETCH_STATUS = 0 \
               BEGIN \
                 PRINT @Id \
                 FETCH NEXT FROM c INTO @Id \
               END \
               CLOSE c \
             END",
        );
        assert!(out.contains("c CURSOR FOR SELECT id FROM t;\n"));
        assert!(out.contains("OPEN c;\n"));
        assert!(out.contains("LOOP\n"));
        assert!(out.contains("FETCH c INTO Id;\n"));
        assert!(out.contains("EXIT WHEN NOT FOUND;\n"));
        assert!(out.contains("CLOSE c;\n"));
    }

    #[test]
    fn script_level_procedural_code_wrapped_in_do() {
        let out = generate("DECLARE @n INT = 1 PRINT @n");
        assert!(out.starts_with("DO $$\n"));
        assert!(out.contains("DECLARE\n    n INTEGER := 1;\n"));
        assert!(out.contains("RAISE NOTICE '%', n;\n"));
        assert!(out.trim_end().ends_with("$$;"));
    }

    #[test]
    fn unsupported_statement_marked_inline() {
        let out = generate("SELECT name FROM t FOR XML PATH(''); SELECT 1;");
        assert!(out.contains("/* sqlport:unsupported */"));
        assert!(out.contains("FOR XML PATH"));
        assert!(out.contains("SELECT 1;\n"));
    }

    #[test]
    fn unsupported_statement_dropped_when_configured() {
        let (statements, mut diagnostics) =
            Parser::parse("SELECT name FROM t FOR XML PATH(''); SELECT 1;").expect("tokenize");
        let options = TranslateOptions {
            on_unsupported: OnUnsupported::DropWithWarning,
            ..TranslateOptions::default()
        };
        let rewritten = {
            let mut engine = RuleEngine::new(&options, &mut diagnostics);
            engine.apply(statements)
        };
        let out = Generator::new(&options).generate(rewritten).expect("generate");
        assert!(!out.contains("FOR XML"));
        assert!(out.contains("SELECT 1;\n"));
    }

    #[test]
    fn comments_carried_over() {
        let out = generate("-- top five\nSELECT TOP 5 * FROM t");
        assert_eq!(out, "-- top five\nSELECT * FROM t LIMIT 5;\n");
    }

    #[test]
    fn insert_values() {
        assert_eq!(
            generate("INSERT INTO t (a, b) VALUES (1, 'x'), (2, 'y')"),
            "INSERT INTO t (a, b) VALUES (1, 'x'), (2, 'y');\n"
        );
    }

    #[test]
    fn create_table_serial() {
        let out = generate(
            "CREATE TABLE dbo.Tags (Id INT IDENTITY(1,1) NOT NULL, Name NVARCHAR(50) NOT NULL)",
        );
        assert!(out.contains("CREATE TABLE dbo.\"Tags\" (\n"));
        assert!(out.contains("    \"Id\" SERIAL NOT NULL,\n"));
        assert!(out.contains("    \"Name\" VARCHAR(50) NOT NULL\n"));
    }

    #[test]
    fn transaction_statements() {
        assert_eq!(
            generate("BEGIN TRANSACTION UPDATE t SET x = 1 COMMIT"),
            "BEGIN;\nUPDATE t SET x = 1;\nCOMMIT;\n"
        );
    }

    #[test]
    fn variable_assignment_select_stays_in_do_block() {
        assert_eq!(
            generate(
                "DECLARE @Total INT;\n\
                 SELECT @Total = COUNT(*) FROM dbo.orders;\n\
                 PRINT @Total;"
            ),
            "DO $$\n\
             DECLARE\n\
             \x20   Total INTEGER;\n\
             BEGIN\n\
             \x20   SELECT COUNT(*) INTO Total FROM dbo.orders;\n\
             \x20   RAISE NOTICE '%', Total;\n\
             END;\n\
             $$;\n"
        );
    }
}
