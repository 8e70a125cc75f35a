//! The dialect rule engine: rewrites a parsed T-SQL tree into a tree whose
//! every node has a direct PostgreSQL rendering.
//!
//! Rules are applied bottom-up in a single pass. Each rule is a pure
//! tree-to-tree mapping keyed on node shape; anything without a matching
//! rule passes through unchanged, so running the engine over an already
//! rewritten tree is a no-op. Lossy or approximate rewrites raise a
//! [`Diagnostic`] naming the originating rule.

use crate::diagnostics::Diagnostic;
use crate::expressions::*;
use crate::normalize;
use crate::tokens::Span;
use crate::TranslateOptions;
use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

/// Plain function renames, T-SQL name to PostgreSQL name
static FUNCTION_RENAMES: LazyLock<HashMap<&'static str, &'static str>> = LazyLock::new(|| {
    HashMap::from([
        ("ISNULL", "COALESCE"),
        ("LEN", "LENGTH"),
        ("DATALENGTH", "OCTET_LENGTH"),
        ("NEWID", "GEN_RANDOM_UUID"),
        ("SCOPE_IDENTITY", "LASTVAL"),
        ("CEILING", "CEIL"),
    ])
});

/// T-SQL datepart names (including abbreviations) to the PostgreSQL
/// field used by both `EXTRACT` and `INTERVAL`
static DATEPART_FIELDS: LazyLock<HashMap<&'static str, &'static str>> = LazyLock::new(|| {
    HashMap::from([
        ("YEAR", "year"),
        ("YY", "year"),
        ("YYYY", "year"),
        ("MONTH", "month"),
        ("MM", "month"),
        ("M", "month"),
        ("WEEK", "week"),
        ("WK", "week"),
        ("WW", "week"),
        ("DAY", "day"),
        ("DD", "day"),
        ("D", "day"),
        ("HOUR", "hour"),
        ("HH", "hour"),
        ("MINUTE", "minute"),
        ("MI", "minute"),
        ("N", "minute"),
        ("SECOND", "second"),
        ("SS", "second"),
        ("S", "second"),
        ("MILLISECOND", "milliseconds"),
        ("MS", "milliseconds"),
    ])
});

/// T-SQL functions with no PostgreSQL counterpart. Calls pass through
/// unchanged but raise a warning so the output is never silently wrong.
static UNMAPPED_FUNCTIONS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    HashSet::from([
        "STUFF",
        "PATINDEX",
        "QUOTENAME",
        "OBJECT_ID",
        "OBJECT_NAME",
        "ISDATE",
        "ISNUMERIC",
        "FORMATMESSAGE",
        "HOST_NAME",
        "APP_NAME",
        "IDENT_CURRENT",
        "COLUMNPROPERTY",
    ])
});

/// Functions whose result is a character string; used by the
/// concatenation rule to tell string `+` from numeric `+`
static STRING_FUNCTIONS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    HashSet::from([
        "UPPER", "LOWER", "LTRIM", "RTRIM", "TRIM", "REPLACE", "SUBSTRING",
        "LEFT", "RIGHT", "CONCAT", "CONCAT_WS", "FORMAT", "REVERSE",
        "REPLICATE", "SPACE", "STR", "TRANSLATE",
    ])
});

/// Map a T-SQL data type to its PostgreSQL counterpart. PostgreSQL-side
/// types map to themselves, which keeps the engine idempotent.
pub fn map_data_type(data_type: DataType) -> DataType {
    use DataType::*;
    match data_type {
        Bit => Boolean,
        TinyInt => SmallInt,
        Int => Integer,
        BigInt => BigIntPg,
        Money => Decimal {
            precision: Some(19),
            scale: Some(4),
        },
        SmallMoney => Decimal {
            precision: Some(10),
            scale: Some(4),
        },
        Float => DoublePrecision,
        NChar(len) => Char(len),
        VarChar(Some(TypeLen::Max)) | NVarChar(Some(TypeLen::Max)) => Text,
        NVarChar(len) => VarChar(len),
        NText => Text,
        DateTime | DateTime2(_) | SmallDateTime => Timestamp,
        UniqueIdentifier => Uuid,
        Binary(_) | VarBinary(_) | Image => Bytea,
        other => other,
    }
}

pub struct RuleEngine<'a> {
    options: &'a TranslateOptions,
    diagnostics: &'a mut Vec<Diagnostic>,
    /// Variables and parameters declared BIT, tracked so literal 0/1
    /// comparisons against them become booleans
    bit_vars: HashSet<String>,
    /// Variables and parameters with a character type, tracked for the
    /// `+` concatenation rule
    string_vars: HashSet<String>,
    in_routine: bool,
}

impl<'a> RuleEngine<'a> {
    pub fn new(options: &'a TranslateOptions, diagnostics: &'a mut Vec<Diagnostic>) -> Self {
        Self {
            options,
            diagnostics,
            bit_vars: HashSet::new(),
            string_vars: HashSet::new(),
            in_routine: false,
        }
    }

    /// Rewrite a whole batch
    pub fn apply(&mut self, statements: Vec<Expression>) -> Vec<Expression> {
        self.rewrite_statements(statements)
    }

    fn warn(&mut self, rule: &'static str, message: String, span: Option<Span>) {
        let mut d = Diagnostic::warning(message).with_rule(rule);
        if let Some(span) = span {
            d = d.with_span(span);
        }
        self.diagnostics.push(d);
    }

    fn error(&mut self, rule: &'static str, message: String, span: Option<Span>) {
        let mut d = Diagnostic::error(message).with_rule(rule);
        if let Some(span) = span {
            d = d.with_span(span);
        }
        self.diagnostics.push(d);
    }

    /// Normalize an object name under the configured policy. A dropped
    /// catalog part is reported; PostgreSQL cannot address another
    /// database.
    fn normalize_name(&mut self, name: &mut ObjectName) {
        let dropped = normalize::normalize_object_name(
            name,
            self.options.default_schema.as_deref(),
            self.options.schema_quoting,
        );
        if let Some(catalog) = dropped {
            self.warn(
                "cross-database-name",
                format!(
                    "cross-database reference {}.{} lost its database qualifier",
                    catalog, name.name.name
                ),
                None,
            );
        }
    }

    // ===== statement lists =====

    /// Restructure cursor loops in a statement list, then rewrite each
    /// statement. Statements with no PostgreSQL counterpart are dropped
    /// here (with a diagnostic), which is why this returns fewer items
    /// than it was given sometimes.
    fn rewrite_statements(&mut self, statements: Vec<Expression>) -> Vec<Expression> {
        let statements = self.restructure_cursor_loops(statements);
        statements
            .into_iter()
            .filter_map(|s| self.rewrite_statement(s))
            .collect()
    }

    fn rewrite_block(&mut self, block: Block) -> Block {
        Block {
            statements: self.rewrite_statements(block.statements),
        }
    }

    /// Fold the canonical `FETCH ...; WHILE @@FETCH_STATUS = 0 BEGIN ...
    /// FETCH ... END` shape into a [`CursorLoop`]. Anything else that
    /// consults `@@FETCH_STATUS` is reported and left alone.
    fn restructure_cursor_loops(&mut self, statements: Vec<Expression>) -> Vec<Expression> {
        let mut out: Vec<Expression> = Vec::with_capacity(statements.len());
        let mut iter = statements.into_iter().peekable();
        while let Some(stmt) = iter.next() {
            let is_fetch = matches!(stmt, Expression::FetchCursor(_));
            let next_is_status_loop = matches!(
                iter.peek(),
                Some(Expression::While(w)) if is_fetch_status_test(&w.condition)
            );
            if is_fetch && next_is_status_loop {
                let Some(Expression::While(while_stmt)) = iter.next() else {
                    unreachable!("peeked a while statement");
                };
                let WhileStatement {
                    condition,
                    body,
                    comments,
                    span,
                } = *while_stmt;
                let mut body = body.statements;
                if matches!(body.last(), Some(Expression::FetchCursor(_))) {
                    body.pop();
                    out.push(Expression::CursorLoop(Box::new(CursorLoop {
                        fetch: stmt,
                        body,
                    })));
                } else {
                    self.error(
                        "cursor-loop",
                        "cursor loop does not end with a FETCH and cannot be \
                         restructured into LOOP/EXIT WHEN NOT FOUND"
                            .to_string(),
                        span,
                    );
                    out.push(stmt);
                    out.push(Expression::While(Box::new(WhileStatement {
                        condition,
                        body: Block { statements: body },
                        comments,
                        span,
                    })));
                }
            } else {
                out.push(stmt);
            }
        }
        out
    }

    /// Rewrite one statement; `None` drops it from the output
    fn rewrite_statement(&mut self, statement: Expression) -> Option<Expression> {
        match statement {
            Expression::BeginTransaction(t) if self.in_routine => {
                self.warn(
                    "begin-transaction",
                    "BEGIN TRANSACTION inside a routine is implicit in PostgreSQL; dropped"
                        .to_string(),
                    t.span,
                );
                None
            }
            Expression::DeallocateCursor(c) => {
                self.warn(
                    "deallocate",
                    format!(
                        "DEALLOCATE {} has no PostgreSQL equivalent; CLOSE already \
                         releases the cursor",
                        c.name.name
                    ),
                    c.span,
                );
                None
            }
            other => Some(self.rewrite(other)),
        }
    }

    // ===== single-node rewrite =====

    pub fn rewrite(&mut self, expression: Expression) -> Expression {
        match expression {
            Expression::Literal(_) => expression,
            Expression::Column(column) => self.rewrite_column(*column),
            Expression::Variable(_) => expression,
            Expression::SystemVariable(v) => self.rewrite_system_variable(*v),
            Expression::Star(mut star) => {
                if let Some(q) = star.qualifier.as_mut() {
                    normalize::normalize_identifier(q, self.options.schema_quoting);
                }
                Expression::Star(star)
            }
            Expression::BinaryOp(op) => self.rewrite_binary_op(*op),
            Expression::UnaryOp(mut op) => {
                op.this = self.rewrite(op.this);
                Expression::UnaryOp(op)
            }
            Expression::Paren(mut paren) => {
                paren.this = self.rewrite(paren.this);
                Expression::Paren(paren)
            }
            Expression::Case(mut case) => {
                case.operand = case.operand.map(|e| self.rewrite(e));
                case.whens = case
                    .whens
                    .into_iter()
                    .map(|w| CaseWhen {
                        condition: self.rewrite(w.condition),
                        result: self.rewrite(w.result),
                    })
                    .collect();
                case.else_result = case.else_result.map(|e| self.rewrite(e));
                Expression::Case(case)
            }
            Expression::FunctionCall(call) => self.rewrite_function_call(*call),
            Expression::Cast(mut cast) => {
                cast.this = self.rewrite(cast.this);
                cast.to = map_data_type(cast.to);
                Expression::Cast(cast)
            }
            Expression::Convert(convert) => {
                let convert = *convert;
                if convert.style.is_some() {
                    self.warn(
                        "convert-style",
                        "CONVERT style argument has no CAST equivalent and was dropped"
                            .to_string(),
                        convert.span,
                    );
                }
                Expression::Cast(Box::new(Cast {
                    this: self.rewrite(convert.this),
                    to: map_data_type(convert.to),
                }))
            }
            Expression::Position(mut p) => {
                p.substring = self.rewrite(p.substring);
                p.string = self.rewrite(p.string);
                Expression::Position(p)
            }
            Expression::Interval(_) => expression,
            Expression::Extract(mut e) => {
                e.this = self.rewrite(e.this);
                Expression::Extract(e)
            }
            Expression::AtTimeZone(mut a) => {
                a.this = self.rewrite(a.this);
                Expression::AtTimeZone(a)
            }
            Expression::IsNull(mut i) => {
                i.this = self.rewrite(i.this);
                Expression::IsNull(i)
            }
            Expression::InList(mut i) => {
                i.this = self.rewrite(i.this);
                i.list = i.list.into_iter().map(|e| self.rewrite(e)).collect();
                Expression::InList(i)
            }
            Expression::InSubquery(mut i) => {
                i.this = self.rewrite(i.this);
                i.subquery = self.rewrite(i.subquery);
                Expression::InSubquery(i)
            }
            Expression::Between(mut b) => {
                b.this = self.rewrite(b.this);
                b.low = self.rewrite(b.low);
                b.high = self.rewrite(b.high);
                Expression::Between(b)
            }
            Expression::Like(mut l) => {
                l.this = self.rewrite(l.this);
                l.pattern = self.rewrite(l.pattern);
                Expression::Like(l)
            }
            Expression::Exists(mut e) => {
                e.subquery = self.rewrite(e.subquery);
                Expression::Exists(e)
            }
            Expression::Subquery(inner) => Expression::Subquery(Box::new(self.rewrite(*inner))),

            Expression::Select(select) => self.rewrite_select(*select),
            Expression::Union(mut union) => {
                union.left = self.rewrite(union.left);
                union.right = self.rewrite(union.right);
                Expression::Union(union)
            }

            Expression::CreateView(mut view) => {
                self.normalize_name(&mut view.name);
                for column in view.columns.iter_mut() {
                    normalize::normalize_identifier(column, self.options.schema_quoting);
                }
                view.query = self.rewrite(view.query);
                Expression::CreateView(view)
            }
            Expression::CreateProcedure(mut proc) => {
                self.normalize_name(&mut proc.name);
                proc.params = self.rewrite_params(std::mem::take(&mut proc.params));
                proc.body = self.rewrite_routine_body(std::mem::take(&mut proc.body.statements));
                Expression::CreateProcedure(proc)
            }
            Expression::CreateFunction(mut func) => {
                self.normalize_name(&mut func.name);
                func.params = self.rewrite_params(std::mem::take(&mut func.params));
                func.returns = map_data_type(func.returns);
                func.body = self.rewrite_routine_body(std::mem::take(&mut func.body.statements));
                Expression::CreateFunction(func)
            }
            Expression::CreateTable(table) => self.rewrite_create_table(*table),
            Expression::Insert(mut insert) => {
                self.normalize_name(&mut insert.table);
                for column in insert.columns.iter_mut() {
                    normalize::normalize_identifier(column, self.options.schema_quoting);
                }
                insert.source = match insert.source {
                    InsertSource::Values(rows) => InsertSource::Values(
                        rows.into_iter()
                            .map(|row| row.into_iter().map(|e| self.rewrite(e)).collect())
                            .collect(),
                    ),
                    InsertSource::Query(q) => InsertSource::Query(self.rewrite(q)),
                };
                Expression::Insert(insert)
            }
            Expression::Update(mut update) => {
                self.normalize_name(&mut update.table);
                update.assignments = update
                    .assignments
                    .into_iter()
                    .map(|mut a| {
                        normalize::normalize_identifier(
                            &mut a.target.name,
                            self.options.schema_quoting,
                        );
                        if let Some(q) = a.target.qualifier.as_mut() {
                            normalize::normalize_identifier(q, self.options.schema_quoting);
                        }
                        Assignment {
                            target: a.target,
                            value: self.rewrite(a.value),
                        }
                    })
                    .collect();
                update.selection = update.selection.map(|e| self.rewrite(e));
                Expression::Update(update)
            }
            Expression::Delete(mut delete) => {
                self.normalize_name(&mut delete.table);
                delete.selection = delete.selection.map(|e| self.rewrite(e));
                Expression::Delete(delete)
            }
            Expression::Declare(mut declare) => {
                self.track_variable(&declare.name, &declare.data_type);
                let was_bit = declare.data_type == DataType::Bit;
                declare.data_type = map_data_type(declare.data_type);
                declare.default = declare.default.map(|e| {
                    let e = self.rewrite(e);
                    if was_bit {
                        bit_literal_to_boolean(e)
                    } else {
                        e
                    }
                });
                Expression::Declare(declare)
            }
            Expression::SetVariable(mut set) => {
                set.value = self.rewrite(set.value);
                if self.bit_vars.contains(&set.name) {
                    set.value = bit_literal_to_boolean(set.value);
                }
                Expression::SetVariable(set)
            }
            Expression::Block(block) => {
                Expression::Block(Box::new(self.rewrite_block(*block)))
            }
            Expression::If(if_stmt) => {
                let if_stmt = *if_stmt;
                Expression::If(Box::new(IfStatement {
                    condition: self.rewrite(if_stmt.condition),
                    then_branch: self.rewrite_block(if_stmt.then_branch),
                    else_branch: if_stmt.else_branch.map(|b| self.rewrite_block(b)),
                    comments: if_stmt.comments,
                    span: if_stmt.span,
                }))
            }
            Expression::While(while_stmt) => {
                let while_stmt = *while_stmt;
                Expression::While(Box::new(WhileStatement {
                    condition: self.rewrite(while_stmt.condition),
                    body: self.rewrite_block(while_stmt.body),
                    comments: while_stmt.comments,
                    span: while_stmt.span,
                }))
            }
            Expression::CursorLoop(mut cursor_loop) => {
                cursor_loop.fetch = self.rewrite(cursor_loop.fetch);
                cursor_loop.body = self.rewrite_statements(std::mem::take(&mut cursor_loop.body));
                Expression::CursorLoop(cursor_loop)
            }
            Expression::TryCatch(tc) => {
                let tc = *tc;
                Expression::TryCatch(Box::new(TryCatch {
                    try_body: self.rewrite_block(tc.try_body),
                    catch_body: self.rewrite_block(tc.catch_body),
                    comments: tc.comments,
                    span: tc.span,
                }))
            }
            Expression::BeginTransaction(_)
            | Expression::Commit(_)
            | Expression::Rollback(_) => expression,
            Expression::Print(print) => {
                let print = *print;
                Expression::RaiseNotice(Box::new(RaiseNotice {
                    value: self.rewrite(print.value),
                    comments: print.comments,
                }))
            }
            Expression::RaiseNotice(mut raise) => {
                raise.value = self.rewrite(raise.value);
                Expression::RaiseNotice(raise)
            }
            Expression::Return(mut ret) => {
                ret.value = ret.value.map(|e| self.rewrite(e));
                Expression::Return(ret)
            }
            Expression::DeclareCursor(mut cursor) => {
                cursor.query = self.rewrite(cursor.query);
                Expression::DeclareCursor(cursor)
            }
            Expression::OpenCursor(_)
            | Expression::FetchCursor(_)
            | Expression::CloseCursor(_)
            | Expression::DeallocateCursor(_) => expression,
            Expression::Unparsed(_) => expression,
        }
    }

    fn rewrite_column(&mut self, mut column: Column) -> Expression {
        // Parenless system functions parse as bare columns
        if column.qualifier.is_none() && !column.name.quoted {
            match column.name.name.to_uppercase().as_str() {
                "SYSTEM_USER" | "CURRENT_USER" => {
                    return Expression::FunctionCall(Box::new(FunctionCall::keyword(
                        "CURRENT_USER",
                    )))
                }
                "SESSION_USER" => {
                    return Expression::FunctionCall(Box::new(FunctionCall::keyword(
                        "SESSION_USER",
                    )))
                }
                "CURRENT_TIMESTAMP" => {
                    return Expression::FunctionCall(Box::new(FunctionCall::keyword(
                        "CURRENT_TIMESTAMP",
                    )))
                }
                "SQLERRM" => {
                    return Expression::FunctionCall(Box::new(FunctionCall::keyword("SQLERRM")))
                }
                _ => {}
            }
        }
        if let Some(q) = column.qualifier.as_mut() {
            normalize::normalize_identifier(q, self.options.schema_quoting);
        }
        normalize::normalize_identifier(&mut column.name, self.options.schema_quoting);
        Expression::Column(Box::new(column))
    }

    fn rewrite_system_variable(&mut self, variable: Variable) -> Expression {
        match variable.name.to_uppercase().as_str() {
            "IDENTITY" => Expression::FunctionCall(Box::new(FunctionCall::new(
                "LASTVAL",
                Vec::new(),
            ))),
            "FETCH_STATUS" => {
                self.error(
                    "fetch-status",
                    "@@FETCH_STATUS outside a canonical cursor loop has no \
                     PostgreSQL equivalent"
                        .to_string(),
                    variable.span,
                );
                Expression::SystemVariable(Box::new(variable))
            }
            "ROWCOUNT" => {
                self.error(
                    "rowcount",
                    "@@ROWCOUNT has no expression equivalent; use GET DIAGNOSTICS \
                     in PL/pgSQL"
                        .to_string(),
                    variable.span,
                );
                Expression::SystemVariable(Box::new(variable))
            }
            "VERSION" => {
                Expression::FunctionCall(Box::new(FunctionCall::new("VERSION", Vec::new())))
            }
            other => {
                self.error(
                    "system-variable",
                    format!("system variable @@{} is not supported", other),
                    variable.span,
                );
                Expression::SystemVariable(Box::new(variable))
            }
        }
    }

    fn rewrite_binary_op(&mut self, op: BinaryOp) -> Expression {
        let mut left = self.rewrite(op.left);
        let mut right = self.rewrite(op.right);
        let mut operator = op.op;

        // Literal 0/1 compared with a declared BIT variable is a boolean
        if matches!(operator, BinaryOperator::Eq | BinaryOperator::Neq) {
            if self.is_bit_reference(&left) {
                right = bit_literal_to_boolean(right);
            } else if self.is_bit_reference(&right) {
                left = bit_literal_to_boolean(left);
            }
        }

        // `+` between strings is `||` in PostgreSQL
        if operator == BinaryOperator::Plus
            && (self.is_stringy(&left) || self.is_stringy(&right))
        {
            operator = BinaryOperator::Concat;
        }

        Expression::BinaryOp(Box::new(BinaryOp {
            op: operator,
            left,
            right,
        }))
    }

    fn is_bit_reference(&self, expr: &Expression) -> bool {
        matches!(expr, Expression::Variable(v) if self.bit_vars.contains(&v.name))
    }

    fn is_stringy(&self, expr: &Expression) -> bool {
        match expr {
            Expression::Literal(Literal::String(_)) | Expression::Literal(Literal::NationalString(_)) => {
                true
            }
            Expression::Variable(v) => self.string_vars.contains(&v.name),
            Expression::BinaryOp(op) => {
                op.op == BinaryOperator::Concat
                    || (op.op == BinaryOperator::Plus
                        && (self.is_stringy(&op.left) || self.is_stringy(&op.right)))
            }
            Expression::FunctionCall(f) => {
                STRING_FUNCTIONS.contains(f.name.to_uppercase().as_str())
            }
            Expression::Cast(c) => matches!(
                c.to,
                DataType::Char(_)
                    | DataType::NChar(_)
                    | DataType::VarChar(_)
                    | DataType::NVarChar(_)
                    | DataType::Text
                    | DataType::NText
            ),
            Expression::Paren(p) => self.is_stringy(&p.this),
            _ => false,
        }
    }

    fn rewrite_function_call(&mut self, call: FunctionCall) -> Expression {
        let span = call.span;
        let upper = call.name.to_uppercase();
        let mut args: Vec<Expression> =
            call.args.into_iter().map(|a| self.rewrite(a)).collect();

        if let Some(&pg_name) = FUNCTION_RENAMES.get(upper.as_str()) {
            return Expression::FunctionCall(Box::new(FunctionCall {
                name: pg_name.to_string(),
                args,
                distinct: call.distinct,
                no_parens: false,
                over: call.over,
                span,
            }));
        }

        match upper.as_str() {
            "GETDATE" | "SYSDATETIME" => {
                Expression::FunctionCall(Box::new(FunctionCall::keyword("CURRENT_TIMESTAMP")))
            }
            "GETUTCDATE" => Expression::Paren(Box::new(Paren {
                this: Expression::AtTimeZone(Box::new(AtTimeZone {
                    this: Expression::FunctionCall(Box::new(FunctionCall::keyword(
                        "CURRENT_TIMESTAMP",
                    ))),
                    time_zone: "UTC".to_string(),
                })),
            })),
            "SUSER_SNAME" => {
                Expression::FunctionCall(Box::new(FunctionCall::keyword("CURRENT_USER")))
            }
            "ERROR_MESSAGE" => {
                Expression::FunctionCall(Box::new(FunctionCall::keyword("SQLERRM")))
            }
            "ERROR_NUMBER" => {
                self.warn(
                    "error-number",
                    "ERROR_NUMBER() maps to SQLSTATE, which is a five-character \
                     string rather than an integer"
                        .to_string(),
                    span,
                );
                Expression::FunctionCall(Box::new(FunctionCall::keyword("SQLSTATE")))
            }
            "IIF" if args.len() == 3 => {
                let else_result = args.pop().expect("three args");
                let result = args.pop().expect("two args");
                let condition = args.pop().expect("one arg");
                Expression::Case(Box::new(Case {
                    operand: None,
                    whens: vec![CaseWhen { condition, result }],
                    else_result: Some(else_result),
                }))
            }
            "IIF" => {
                self.warn(
                    "iif-arity",
                    format!(
                        "IIF expects three arguments, got {}; call left unchanged",
                        args.len()
                    ),
                    span,
                );
                Expression::FunctionCall(Box::new(FunctionCall {
                    name: call.name,
                    args,
                    distinct: call.distinct,
                    no_parens: false,
                    over: call.over,
                    span,
                }))
            }
            "CHARINDEX" => match args.len() {
                2 => {
                    let string = args.pop().expect("two args");
                    let substring = args.pop().expect("one arg");
                    Expression::Position(Box::new(Position { substring, string }))
                }
                _ => {
                    self.error(
                        "charindex-start",
                        "CHARINDEX with a start position has no direct POSITION \
                         equivalent"
                            .to_string(),
                        span,
                    );
                    Expression::FunctionCall(Box::new(FunctionCall {
                        name: call.name,
                        args,
                        distinct: call.distinct,
                        no_parens: false,
                        over: call.over,
                        span,
                    }))
                }
            },
            "DATEADD" if args.len() == 3 => self.rewrite_dateadd(args, span, call.name),
            "DATEDIFF" if args.len() == 3 => self.rewrite_datediff(args, span, call.name),
            "DATEPART" if args.len() == 2 => {
                let this = args.pop().expect("two args");
                let unit = args.pop().expect("one arg");
                match datepart_field(&unit) {
                    Some(field) => Expression::Extract(Box::new(Extract {
                        field: field.to_uppercase(),
                        this,
                    })),
                    None => {
                        self.error(
                            "datepart-unit",
                            "DATEPART with an unrecognized datepart".to_string(),
                            span,
                        );
                        Expression::FunctionCall(Box::new(FunctionCall {
                            name: call.name,
                            args: vec![unit, this],
                            distinct: false,
                            no_parens: false,
                            over: None,
                            span,
                        }))
                    }
                }
            }
            "YEAR" | "MONTH" | "DAY" if args.len() == 1 => {
                Expression::Extract(Box::new(Extract {
                    field: upper,
                    this: args.pop().expect("one arg"),
                }))
            }
            _ => {
                if UNMAPPED_FUNCTIONS.contains(upper.as_str()) {
                    self.warn(
                        "unmapped-function",
                        format!(
                            "{} has no PostgreSQL equivalent; call left unchanged",
                            call.name
                        ),
                        span,
                    );
                }
                Expression::FunctionCall(Box::new(FunctionCall {
                    name: call.name,
                    args,
                    distinct: call.distinct,
                    no_parens: call.no_parens,
                    over: call.over,
                    span,
                }))
            }
        }
    }

    /// `DATEADD(unit, n, d)` becomes `d + INTERVAL 'n unit'` for literal
    /// counts, and `d + n * INTERVAL '1 unit'` otherwise
    fn rewrite_dateadd(
        &mut self,
        mut args: Vec<Expression>,
        span: Option<Span>,
        original_name: String,
    ) -> Expression {
        let date = args.pop().expect("three args");
        let count = args.pop().expect("two args");
        let unit = args.pop().expect("one arg");
        let Some(field) = datepart_field(&unit) else {
            self.error(
                "dateadd-unit",
                "DATEADD with an unrecognized datepart".to_string(),
                span,
            );
            return Expression::FunctionCall(Box::new(FunctionCall::new(
                original_name,
                vec![unit, count, date],
            )));
        };
        let interval = match literal_count(&count) {
            Some(n) => Expression::Interval(Box::new(Interval {
                value: n,
                unit: field.to_string(),
            })),
            None => Expression::BinaryOp(Box::new(BinaryOp {
                op: BinaryOperator::Multiply,
                left: Expression::Paren(Box::new(Paren { this: count })),
                right: Expression::Interval(Box::new(Interval {
                    value: "1".to_string(),
                    unit: field.to_string(),
                })),
            })),
        };
        Expression::BinaryOp(Box::new(BinaryOp {
            op: BinaryOperator::Plus,
            left: date,
            right: interval,
        }))
    }

    /// `DATEDIFF(unit, start, end)` has no single PostgreSQL form; each
    /// supported unit gets its own expression shape
    fn rewrite_datediff(
        &mut self,
        mut args: Vec<Expression>,
        span: Option<Span>,
        original_name: String,
    ) -> Expression {
        let end = args.pop().expect("three args");
        let start = args.pop().expect("two args");
        let unit = args.pop().expect("one arg");
        let field = datepart_field(&unit);
        let date_cast = |e: Expression| {
            Expression::Cast(Box::new(Cast {
                this: e,
                to: DataType::Date,
            }))
        };
        let age = |start: &Expression, end: &Expression| {
            Expression::FunctionCall(Box::new(FunctionCall::new(
                "AGE",
                vec![end.clone(), start.clone()],
            )))
        };
        let epoch_floor = |start: Expression, end: Expression, divisor: Option<&str>| {
            let elapsed = Expression::Extract(Box::new(Extract {
                field: "EPOCH".to_string(),
                this: Expression::Paren(Box::new(Paren {
                    this: Expression::BinaryOp(Box::new(BinaryOp {
                        op: BinaryOperator::Minus,
                        left: end,
                        right: start,
                    })),
                })),
            }));
            let inner = match divisor {
                Some(d) => Expression::BinaryOp(Box::new(BinaryOp {
                    op: BinaryOperator::Divide,
                    left: elapsed,
                    right: Expression::number(d),
                })),
                None => elapsed,
            };
            Expression::FunctionCall(Box::new(FunctionCall::new("FLOOR", vec![inner])))
        };
        match field {
            Some("day") => Expression::BinaryOp(Box::new(BinaryOp {
                op: BinaryOperator::Minus,
                left: date_cast(end),
                right: date_cast(start),
            })),
            Some("week") => Expression::BinaryOp(Box::new(BinaryOp {
                op: BinaryOperator::Divide,
                left: Expression::Paren(Box::new(Paren {
                    this: Expression::BinaryOp(Box::new(BinaryOp {
                        op: BinaryOperator::Minus,
                        left: date_cast(end),
                        right: date_cast(start),
                    })),
                })),
                right: Expression::number("7"),
            })),
            Some("year") => Expression::Extract(Box::new(Extract {
                field: "YEAR".to_string(),
                this: age(&start, &end),
            })),
            Some("month") => Expression::BinaryOp(Box::new(BinaryOp {
                op: BinaryOperator::Plus,
                left: Expression::BinaryOp(Box::new(BinaryOp {
                    op: BinaryOperator::Multiply,
                    left: Expression::Extract(Box::new(Extract {
                        field: "YEAR".to_string(),
                        this: age(&start, &end),
                    })),
                    right: Expression::number("12"),
                })),
                right: Expression::Extract(Box::new(Extract {
                    field: "MONTH".to_string(),
                    this: age(&start, &end),
                })),
            })),
            Some("hour") => epoch_floor(start, end, Some("3600")),
            Some("minute") => epoch_floor(start, end, Some("60")),
            Some("second") => epoch_floor(start, end, None),
            _ => {
                self.error(
                    "datediff-unit",
                    "DATEDIFF with an unsupported datepart".to_string(),
                    span,
                );
                Expression::FunctionCall(Box::new(FunctionCall::new(
                    original_name,
                    vec![unit, start, end],
                )))
            }
        }
    }

    fn rewrite_select(&mut self, mut select: Select) -> Expression {
        if let Some(top) = select.top.take() {
            if top.percent {
                self.error(
                    "top-percent",
                    "TOP ... PERCENT has no LIMIT equivalent; the clause was dropped"
                        .to_string(),
                    top.span,
                );
            } else if top.with_ties {
                self.error(
                    "top-with-ties",
                    "TOP ... WITH TIES has no LIMIT equivalent; the clause was dropped"
                        .to_string(),
                    top.span,
                );
            } else {
                select.limit = Some(self.rewrite(top.value));
            }
        }
        select.projection = select
            .projection
            .into_iter()
            .map(|mut item| {
                item.expr = self.rewrite(item.expr);
                if let Some(alias) = item.alias.as_mut() {
                    normalize::normalize_identifier(alias, self.options.schema_quoting);
                }
                item
            })
            .collect();
        select.from = select
            .from
            .into_iter()
            .map(|t| self.rewrite_table_with_joins(t))
            .collect();
        select.selection = select.selection.map(|e| self.rewrite(e));
        select.group_by = select.group_by.into_iter().map(|e| self.rewrite(e)).collect();
        select.having = select.having.map(|e| self.rewrite(e));
        select.order_by = select
            .order_by
            .into_iter()
            .map(|o| OrderByExpr {
                expr: self.rewrite(o.expr),
                desc: o.desc,
            })
            .collect();
        select.limit = select.limit.map(|e| self.rewrite(e));
        Expression::Select(Box::new(select))
    }

    fn rewrite_table_with_joins(&mut self, table: TableWithJoins) -> TableWithJoins {
        TableWithJoins {
            relation: self.rewrite_table_factor(table.relation),
            joins: table
                .joins
                .into_iter()
                .map(|j| Join {
                    kind: j.kind,
                    relation: self.rewrite_table_factor(j.relation),
                    on: j.on.map(|e| self.rewrite(e)),
                })
                .collect(),
        }
    }

    fn rewrite_table_factor(&mut self, factor: TableFactor) -> TableFactor {
        match factor {
            TableFactor::Table { mut name, mut alias } => {
                self.normalize_name(&mut name);
                if let Some(a) = alias.as_mut() {
                    normalize::normalize_identifier(a, self.options.schema_quoting);
                }
                TableFactor::Table { name, alias }
            }
            TableFactor::Derived { subquery, mut alias } => {
                if let Some(a) = alias.as_mut() {
                    normalize::normalize_identifier(a, self.options.schema_quoting);
                }
                TableFactor::Derived {
                    subquery: self.rewrite(subquery),
                    alias,
                }
            }
        }
    }

    fn rewrite_params(&mut self, params: Vec<ProcParam>) -> Vec<ProcParam> {
        params
            .into_iter()
            .map(|mut p| {
                self.track_variable(&p.name, &p.data_type);
                let was_bit = p.data_type == DataType::Bit;
                p.data_type = map_data_type(p.data_type);
                p.default = p.default.map(|e| {
                    let e = self.rewrite(e);
                    if was_bit {
                        bit_literal_to_boolean(e)
                    } else {
                        e
                    }
                });
                p
            })
            .collect()
    }

    /// Routine bodies get their own variable scope
    fn rewrite_routine_body(&mut self, statements: Vec<Expression>) -> Block {
        let was_in_routine = self.in_routine;
        self.in_routine = true;
        let block = Block {
            statements: self.rewrite_statements(statements),
        };
        self.in_routine = was_in_routine;
        block
    }

    fn track_variable(&mut self, name: &str, data_type: &DataType) {
        match data_type {
            DataType::Bit => {
                self.bit_vars.insert(name.to_string());
            }
            DataType::Char(_)
            | DataType::NChar(_)
            | DataType::VarChar(_)
            | DataType::NVarChar(_)
            | DataType::Text
            | DataType::NText => {
                self.string_vars.insert(name.to_string());
            }
            _ => {}
        }
    }

    fn rewrite_create_table(&mut self, mut table: CreateTable) -> Expression {
        self.normalize_name(&mut table.name);
        table.columns = table
            .columns
            .into_iter()
            .map(|mut column| {
                normalize::normalize_identifier(&mut column.name, self.options.schema_quoting);
                if let Some((seed, increment)) = column.identity.take() {
                    if seed != 1 || increment != 1 {
                        self.warn(
                            "identity-seed",
                            format!(
                                "IDENTITY({}, {}) seed and increment are not carried \
                                 over by SERIAL; adjust the sequence manually",
                                seed, increment
                            ),
                            None,
                        );
                    }
                    column.data_type = match column.data_type {
                        DataType::SmallInt | DataType::TinyInt => DataType::SmallSerial,
                        DataType::BigInt | DataType::BigIntPg => DataType::BigSerial,
                        _ => DataType::Serial,
                    };
                } else {
                    column.data_type = map_data_type(column.data_type);
                }
                column.default = column.default.map(|e| self.rewrite(e));
                column
            })
            .collect();
        Expression::CreateTable(Box::new(table))
    }
}

/// True for `@@FETCH_STATUS = 0`, with or without parentheses
fn is_fetch_status_test(condition: &Expression) -> bool {
    match condition {
        Expression::Paren(p) => is_fetch_status_test(&p.this),
        Expression::BinaryOp(op) if op.op == BinaryOperator::Eq => {
            let is_status = |e: &Expression| {
                matches!(e, Expression::SystemVariable(v) if v.name.eq_ignore_ascii_case("FETCH_STATUS"))
            };
            (is_status(&op.left) && op.right.is_number("0"))
                || (is_status(&op.right) && op.left.is_number("0"))
        }
        _ => false,
    }
}

/// Turn the literals `0` and `1` into booleans; anything else unchanged
fn bit_literal_to_boolean(expr: Expression) -> Expression {
    if expr.is_number("0") {
        Expression::boolean(false)
    } else if expr.is_number("1") {
        Expression::boolean(true)
    } else {
        expr
    }
}

/// The datepart argument parses as a bare column; map its name
fn datepart_field(unit: &Expression) -> Option<&'static str> {
    let name = match unit {
        Expression::Column(c) if c.qualifier.is_none() => &c.name.name,
        Expression::Literal(Literal::String(s)) => s,
        _ => return None,
    };
    DATEPART_FIELDS.get(name.to_uppercase().as_str()).copied()
}

/// A literal interval count: a number, optionally negated
fn literal_count(expr: &Expression) -> Option<String> {
    match expr {
        Expression::Literal(Literal::Number(n)) => Some(n.clone()),
        Expression::UnaryOp(u) if u.op == UnaryOperator::Minus => match &u.this {
            Expression::Literal(Literal::Number(n)) => Some(format!("-{}", n)),
            _ => None,
        },
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Parser;
    use crate::TranslateOptions;

    fn rewrite_sql(sql: &str) -> (Vec<Expression>, Vec<Diagnostic>) {
        let (statements, mut diagnostics) = Parser::parse(sql).expect("tokenize");
        let options = TranslateOptions::default();
        let rewritten = {
            let mut engine = RuleEngine::new(&options, &mut diagnostics);
            engine.apply(statements)
        };
        (rewritten, diagnostics)
    }

    fn first_projection(statements: &[Expression]) -> &Expression {
        let Expression::Select(select) = &statements[0] else {
            panic!("expected select, got {:?}", statements[0]);
        };
        &select.projection[0].expr
    }

    #[test]
    fn isnull_becomes_coalesce() {
        let (statements, diagnostics) = rewrite_sql("SELECT ISNULL(a, 0) FROM t");
        let Expression::FunctionCall(f) = first_projection(&statements) else {
            panic!("expected function");
        };
        assert_eq!(f.name, "COALESCE");
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn getdate_becomes_current_timestamp() {
        let (statements, _) = rewrite_sql("SELECT GETDATE()");
        let Expression::FunctionCall(f) = first_projection(&statements) else {
            panic!("expected function");
        };
        assert_eq!(f.name, "CURRENT_TIMESTAMP");
        assert!(f.no_parens);
    }

    #[test]
    fn charindex_two_args_becomes_position() {
        let (statements, diagnostics) = rewrite_sql("SELECT CHARINDEX('x', name) FROM t");
        assert!(matches!(first_projection(&statements), Expression::Position(_)));
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn charindex_three_args_is_flagged() {
        let (statements, diagnostics) = rewrite_sql("SELECT CHARINDEX('x', name, 3) FROM t");
        assert!(matches!(
            first_projection(&statements),
            Expression::FunctionCall(_)
        ));
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].rule, Some("charindex-start"));
    }

    #[test]
    fn top_becomes_limit() {
        let (statements, _) = rewrite_sql("SELECT TOP (5) * FROM t");
        let Expression::Select(select) = &statements[0] else {
            panic!("expected select");
        };
        assert!(select.top.is_none());
        assert!(select.limit.as_ref().expect("limit").is_number("5"));
    }

    #[test]
    fn top_percent_is_flagged_and_dropped() {
        let (statements, diagnostics) = rewrite_sql("SELECT TOP 10 PERCENT * FROM t");
        let Expression::Select(select) = &statements[0] else {
            panic!("expected select");
        };
        assert!(select.limit.is_none());
        assert_eq!(diagnostics[0].rule, Some("top-percent"));
    }

    #[test]
    fn dateadd_literal_count() {
        let (statements, _) = rewrite_sql("SELECT DATEADD(day, 7, OrderDate) FROM t");
        let Expression::BinaryOp(op) = first_projection(&statements) else {
            panic!("expected binary op");
        };
        assert_eq!(op.op, BinaryOperator::Plus);
        let Expression::Interval(interval) = &op.right else {
            panic!("expected interval, got {:?}", op.right);
        };
        assert_eq!(interval.value, "7");
        assert_eq!(interval.unit, "day");
    }

    #[test]
    fn datediff_day_is_date_subtraction() {
        let (statements, _) = rewrite_sql("SELECT DATEDIFF(day, a, b) FROM t");
        let Expression::BinaryOp(op) = first_projection(&statements) else {
            panic!("expected binary op");
        };
        assert_eq!(op.op, BinaryOperator::Minus);
        assert!(matches!(op.left, Expression::Cast(_)));
    }

    #[test]
    fn datediff_unknown_unit_is_flagged() {
        let (_, diagnostics) = rewrite_sql("SELECT DATEDIFF(quarter, a, b) FROM t");
        assert_eq!(diagnostics[0].rule, Some("datediff-unit"));
    }

    #[test]
    fn convert_style_warns() {
        let (statements, diagnostics) =
            rewrite_sql("SELECT CONVERT(VARCHAR(10), OrderDate, 120) FROM t");
        assert!(matches!(first_projection(&statements), Expression::Cast(_)));
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].rule, Some("convert-style"));
        assert_eq!(diagnostics[0].severity, crate::Severity::Warning);
    }

    #[test]
    fn bit_comparison_becomes_boolean() {
        let (statements, _) =
            rewrite_sql("DECLARE @Active BIT = 1 IF @Active = 1 PRINT 'yes'");
        let Expression::Declare(declare) = &statements[0] else {
            panic!("expected declare");
        };
        assert_eq!(declare.data_type, DataType::Boolean);
        assert_eq!(declare.default, Some(Expression::boolean(true)));
        let Expression::If(if_stmt) = &statements[1] else {
            panic!("expected if");
        };
        let Expression::BinaryOp(cond) = &if_stmt.condition else {
            panic!("expected comparison");
        };
        assert_eq!(cond.right, Expression::boolean(true));
    }

    #[test]
    fn plain_numeric_comparison_untouched() {
        let (statements, _) = rewrite_sql("SELECT * FROM t WHERE flag = 1");
        let Expression::Select(select) = &statements[0] else {
            panic!("expected select");
        };
        let Expression::BinaryOp(op) = select.selection.as_ref().expect("where") else {
            panic!("expected comparison");
        };
        assert!(op.right.is_number("1"));
    }

    #[test]
    fn string_plus_becomes_concat() {
        let (statements, _) = rewrite_sql("SELECT 'a' + name FROM t");
        let Expression::BinaryOp(op) = first_projection(&statements) else {
            panic!("expected binary op");
        };
        assert_eq!(op.op, BinaryOperator::Concat);
    }

    #[test]
    fn numeric_plus_untouched() {
        let (statements, _) = rewrite_sql("SELECT a + b FROM t");
        let Expression::BinaryOp(op) = first_projection(&statements) else {
            panic!("expected binary op");
        };
        assert_eq!(op.op, BinaryOperator::Plus);
    }

    #[test]
    fn cursor_loop_restructured() {
        let sql = "DECLARE c CURSOR FOR SELECT id FROM t \
                   OPEN c \
                   FETCH NEXT FROM c INTO @Id \
                   WHILE @@FETCH_STATUS = 0 \
                   BEGIN \
                     PRINT @Id \
                     FETCH NEXT FROM c INTO @Id \
                   END \
                   CLOSE c \
                   DEALLOCATE c";
        let (statements, diagnostics) = rewrite_sql(sql);
        let errors: Vec<_> = diagnostics
            .iter()
            .filter(|d| d.severity == crate::Severity::Error)
            .collect();
        assert!(errors.is_empty(), "unexpected errors: {:?}", errors);
        // DEALLOCATE dropped, loop folded: declare, open, loop, close
        assert_eq!(statements.len(), 4);
        let Expression::CursorLoop(cursor_loop) = &statements[2] else {
            panic!("expected cursor loop, got {:?}", statements[2]);
        };
        assert!(matches!(cursor_loop.fetch, Expression::FetchCursor(_)));
        assert_eq!(cursor_loop.body.len(), 1);
        assert!(diagnostics.iter().any(|d| d.rule == Some("deallocate")));
    }

    #[test]
    fn fetch_status_outside_loop_is_flagged() {
        let (_, diagnostics) = rewrite_sql("IF @@FETCH_STATUS = 0 PRINT 'x'");
        assert!(diagnostics.iter().any(|d| d.rule == Some("fetch-status")));
    }

    #[test]
    fn print_becomes_raise_notice() {
        let (statements, _) = rewrite_sql("PRINT 'hello'");
        assert!(matches!(statements[0], Expression::RaiseNotice(_)));
    }

    #[test]
    fn identity_column_becomes_serial() {
        let (statements, _) =
            rewrite_sql("CREATE TABLE t (Id INT IDENTITY(1,1) NOT NULL, Name NVARCHAR(50))");
        let Expression::CreateTable(table) = &statements[0] else {
            panic!("expected create table");
        };
        assert_eq!(table.columns[0].data_type, DataType::Serial);
        assert_eq!(
            table.columns[1].data_type,
            DataType::VarChar(Some(TypeLen::Number(50)))
        );
    }

    #[test]
    fn nvarchar_max_becomes_text() {
        assert_eq!(
            map_data_type(DataType::NVarChar(Some(TypeLen::Max))),
            DataType::Text
        );
        assert_eq!(map_data_type(DataType::Text), DataType::Text);
    }

    #[test]
    fn rewrite_is_idempotent_on_own_output() {
        let (once, mut diagnostics) = rewrite_sql("SELECT ISNULL(LEN(a), 0) + 1 FROM t");
        let options = TranslateOptions::default();
        let twice = {
            let mut engine = RuleEngine::new(&options, &mut diagnostics);
            engine.apply(once.clone())
        };
        assert_eq!(once, twice);
    }

    #[test]
    fn identifier_case_preserved_with_quoting() {
        let (statements, _) = rewrite_sql("SELECT [First Name] FROM [dbo].[Employees]");
        let Expression::Column(column) = first_projection(&statements) else {
            panic!("expected column");
        };
        assert_eq!(column.name.name, "First Name");
        assert!(column.name.quoted);
        let Expression::Select(select) = &statements[0] else {
            panic!("expected select");
        };
        let TableFactor::Table { name, .. } = &select.from[0].relation else {
            panic!("expected table");
        };
        assert!(!name.schema.as_ref().expect("schema").quoted);
        assert!(name.name.quoted);
    }

    #[test]
    fn cross_database_reference_is_flagged() {
        let (statements, diagnostics) = rewrite_sql("SELECT * FROM OtherDb.dbo.Orders");
        let Expression::Select(select) = &statements[0] else {
            panic!("expected select");
        };
        let TableFactor::Table { name, .. } = &select.from[0].relation else {
            panic!("expected table");
        };
        assert!(name.catalog.is_none());
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].rule, Some("cross-database-name"));
        assert!(diagnostics[0].message.contains("OtherDb"));
    }

    #[test]
    fn unmapped_function_is_flagged() {
        let (statements, diagnostics) =
            rewrite_sql("SELECT STUFF(name, 1, 2, 'ab') FROM t");
        let Expression::FunctionCall(f) = first_projection(&statements) else {
            panic!("expected function");
        };
        assert_eq!(f.name, "STUFF");
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].rule, Some("unmapped-function"));
    }

    #[test]
    fn iif_with_wrong_arity_is_flagged() {
        let (statements, diagnostics) = rewrite_sql("SELECT IIF(a, b) FROM t");
        assert!(matches!(
            first_projection(&statements),
            Expression::FunctionCall(_)
        ));
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].rule, Some("iif-arity"));
    }
}
