//! The expression tree for the supported T-SQL statement subset.
//!
//! One [`Expression`] enum covers both statements and scalar expressions,
//! with boxed node structs per variant. Each node owns its children
//! exclusively; there is no sharing and no cycles. Statement nodes carry
//! the leading comment trivia collected by the tokenizer plus a source
//! span for diagnostics.
//!
//! A handful of variants ([`Position`], [`Interval`], [`Extract`],
//! [`AtTimeZone`], [`CursorLoop`], [`RaiseNotice`]) are mainly produced by
//! the rewrite engine for PostgreSQL-only syntax; the parser also accepts
//! their source spellings so already-translated SQL re-parses cleanly.

use crate::tokens::Span;
use serde::{Deserialize, Serialize};

/// A single identifier. `quoted` records whether the source wrapped it in
/// brackets or double quotes; the case of `name` is always preserved
/// verbatim from the input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identifier {
    pub name: String,
    pub quoted: bool,
    pub span: Option<Span>,
}

impl Identifier {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            quoted: false,
            span: None,
        }
    }

    pub fn quoted(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            quoted: true,
            span: None,
        }
    }
}

/// A possibly schema-qualified (and possibly catalog-qualified) object name.
/// Bracket quoting is a presentation artifact; only `quoted` flags survive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectName {
    pub catalog: Option<Identifier>,
    pub schema: Option<Identifier>,
    pub name: Identifier,
}

impl ObjectName {
    pub fn new(name: Identifier) -> Self {
        Self {
            catalog: None,
            schema: None,
            name,
        }
    }

    pub fn with_schema(schema: Identifier, name: Identifier) -> Self {
        Self {
            catalog: None,
            schema: Some(schema),
            name,
        }
    }
}

/// Length argument of a sized type: a number or `MAX`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TypeLen {
    Number(u32),
    Max,
}

/// Data types of the supported T-SQL subset, plus the PostgreSQL types the
/// rewrite engine maps them to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataType {
    Bit,
    TinyInt,
    SmallInt,
    Int,
    BigInt,
    Decimal {
        precision: Option<u32>,
        scale: Option<u32>,
    },
    Money,
    SmallMoney,
    Float,
    Real,
    Char(Option<TypeLen>),
    NChar(Option<TypeLen>),
    VarChar(Option<TypeLen>),
    NVarChar(Option<TypeLen>),
    Text,
    NText,
    Date,
    Time,
    DateTime,
    DateTime2(Option<u32>),
    SmallDateTime,
    UniqueIdentifier,
    Binary(Option<TypeLen>),
    VarBinary(Option<TypeLen>),
    Image,
    Xml,
    // PostgreSQL-side types produced by the rewrite engine
    Boolean,
    Integer,
    BigIntPg,
    DoublePrecision,
    Timestamp,
    TimestampTz,
    Uuid,
    Bytea,
    Serial,
    SmallSerial,
    BigSerial,
    Custom(String),
}

/// Literal values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Literal {
    Number(String),
    String(String),
    NationalString(String),
    Boolean(bool),
    Null,
}

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOperator {
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
    Plus,
    Minus,
    Multiply,
    Divide,
    Modulo,
    And,
    Or,
    /// `||`, produced by the rewrite engine for string `+`
    Concat,
}

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOperator {
    Not,
    Minus,
    Plus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub qualifier: Option<Identifier>,
    pub name: Identifier,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variable {
    pub name: String,
    pub span: Option<Span>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Star {
    pub qualifier: Option<Identifier>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinaryOp {
    pub op: BinaryOperator,
    pub left: Expression,
    pub right: Expression,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnaryOp {
    pub op: UnaryOperator,
    pub this: Expression,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Paren {
    pub this: Expression,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseWhen {
    pub condition: Expression,
    pub result: Expression,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Case {
    pub operand: Option<Expression>,
    pub whens: Vec<CaseWhen>,
    pub else_result: Option<Expression>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    pub args: Vec<Expression>,
    pub distinct: bool,
    /// Render without parentheses (`CURRENT_TIMESTAMP`, `SQLERRM`)
    pub no_parens: bool,
    pub over: Option<WindowSpec>,
    pub span: Option<Span>,
}

impl FunctionCall {
    pub fn new(name: impl Into<String>, args: Vec<Expression>) -> Self {
        Self {
            name: name.into(),
            args,
            distinct: false,
            no_parens: false,
            over: None,
            span: None,
        }
    }

    /// A parenless function-like keyword such as `CURRENT_TIMESTAMP`
    pub fn keyword(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: Vec::new(),
            distinct: false,
            no_parens: true,
            over: None,
            span: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowSpec {
    pub partition_by: Vec<Expression>,
    pub order_by: Vec<OrderByExpr>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderByExpr {
    pub expr: Expression,
    pub desc: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cast {
    pub this: Expression,
    pub to: DataType,
}

/// T-SQL `CONVERT(type, expr [, style])`; rewritten to [`Cast`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Convert {
    pub to: DataType,
    pub this: Expression,
    pub style: Option<Expression>,
    pub span: Option<Span>,
}

/// PostgreSQL `POSITION(substring IN string)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub substring: Expression,
    pub string: Expression,
}

/// PostgreSQL `INTERVAL 'value unit'`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interval {
    pub value: String,
    pub unit: String,
}

/// PostgreSQL `EXTRACT(field FROM expr)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Extract {
    pub field: String,
    pub this: Expression,
}

/// PostgreSQL `expr AT TIME ZONE 'tz'`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AtTimeZone {
    pub this: Expression,
    pub time_zone: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IsNullExpr {
    pub this: Expression,
    pub not: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InList {
    pub this: Expression,
    pub list: Vec<Expression>,
    pub not: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InSubquery {
    pub this: Expression,
    pub subquery: Expression,
    pub not: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BetweenExpr {
    pub this: Expression,
    pub low: Expression,
    pub high: Expression,
    pub not: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LikeExpr {
    pub this: Expression,
    pub pattern: Expression,
    pub not: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExistsExpr {
    pub subquery: Expression,
    pub not: bool,
}

// ===== Query nodes =====

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectItem {
    pub expr: Expression,
    pub alias: Option<Identifier>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Top {
    pub value: Expression,
    pub percent: bool,
    pub with_ties: bool,
    pub span: Option<Span>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TableFactor {
    Table {
        name: ObjectName,
        alias: Option<Identifier>,
    },
    Derived {
        subquery: Expression,
        alias: Option<Identifier>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JoinKind {
    Inner,
    Left,
    Right,
    Full,
    Cross,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Join {
    pub kind: JoinKind,
    pub relation: TableFactor,
    pub on: Option<Expression>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableWithJoins {
    pub relation: TableFactor,
    pub joins: Vec<Join>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Select {
    pub top: Option<Top>,
    pub distinct: bool,
    pub projection: Vec<SelectItem>,
    /// `SELECT ... INTO @vars` inside procedures: target variable names
    pub into_variables: Vec<String>,
    pub from: Vec<TableWithJoins>,
    pub selection: Option<Expression>,
    pub group_by: Vec<Expression>,
    pub having: Option<Expression>,
    pub order_by: Vec<OrderByExpr>,
    /// Trailing `LIMIT`, produced by the TOP rewrite
    pub limit: Option<Expression>,
    pub comments: Vec<String>,
    pub span: Option<Span>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Union {
    pub left: Expression,
    pub right: Expression,
    pub all: bool,
}

// ===== Statements =====

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateView {
    pub or_alter: bool,
    pub name: ObjectName,
    pub columns: Vec<Identifier>,
    pub query: Expression,
    pub comments: Vec<String>,
    pub span: Option<Span>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcParam {
    pub name: String,
    pub data_type: DataType,
    pub default: Option<Expression>,
    pub output: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateProcedure {
    pub or_alter: bool,
    pub name: ObjectName,
    pub params: Vec<ProcParam>,
    pub body: Block,
    pub comments: Vec<String>,
    pub span: Option<Span>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateFunction {
    pub or_alter: bool,
    pub name: ObjectName,
    pub params: Vec<ProcParam>,
    pub returns: DataType,
    pub body: Block,
    pub comments: Vec<String>,
    pub span: Option<Span>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: Identifier,
    pub data_type: DataType,
    /// `IDENTITY(seed, increment)` if present
    pub identity: Option<(i64, i64)>,
    pub not_null: bool,
    pub default: Option<Expression>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateTable {
    pub name: ObjectName,
    pub columns: Vec<ColumnDef>,
    pub comments: Vec<String>,
    pub span: Option<Span>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Insert {
    pub table: ObjectName,
    pub columns: Vec<Identifier>,
    /// Either `Values` rows or a `Select` source
    pub source: InsertSource,
    pub comments: Vec<String>,
    pub span: Option<Span>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum InsertSource {
    Values(Vec<Vec<Expression>>),
    Query(Expression),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub target: Column,
    pub value: Expression,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Update {
    pub table: ObjectName,
    pub assignments: Vec<Assignment>,
    pub selection: Option<Expression>,
    pub comments: Vec<String>,
    pub span: Option<Span>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Delete {
    pub table: ObjectName,
    pub selection: Option<Expression>,
    pub comments: Vec<String>,
    pub span: Option<Span>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Declare {
    pub name: String,
    pub data_type: DataType,
    pub default: Option<Expression>,
    pub comments: Vec<String>,
    pub span: Option<Span>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetVariable {
    pub name: String,
    pub value: Expression,
    pub comments: Vec<String>,
    pub span: Option<Span>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub statements: Vec<Expression>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IfStatement {
    pub condition: Expression,
    pub then_branch: Block,
    pub else_branch: Option<Block>,
    pub comments: Vec<String>,
    pub span: Option<Span>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WhileStatement {
    pub condition: Expression,
    pub body: Block,
    pub comments: Vec<String>,
    pub span: Option<Span>,
}

/// PL/pgSQL `LOOP ... FETCH; EXIT WHEN NOT FOUND; ... END LOOP`,
/// produced by the cursor-loop restructuring rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CursorLoop {
    pub fetch: Expression,
    pub body: Vec<Expression>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TryCatch {
    pub try_body: Block,
    pub catch_body: Block,
    pub comments: Vec<String>,
    pub span: Option<Span>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub comments: Vec<String>,
    pub span: Option<Span>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrintStatement {
    pub value: Expression,
    pub comments: Vec<String>,
    pub span: Option<Span>,
}

/// PL/pgSQL `RAISE NOTICE '%', value`, produced from `PRINT`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RaiseNotice {
    pub value: Expression,
    pub comments: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReturnStatement {
    pub value: Option<Expression>,
    pub comments: Vec<String>,
    pub span: Option<Span>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeclareCursor {
    pub name: Identifier,
    pub query: Expression,
    pub comments: Vec<String>,
    pub span: Option<Span>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CursorRef {
    pub name: Identifier,
    pub comments: Vec<String>,
    pub span: Option<Span>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchCursor {
    pub cursor: Identifier,
    pub into: Vec<String>,
    pub comments: Vec<String>,
    pub span: Option<Span>,
}

/// A statement the parser recognized as outside the supported subset.
/// Carries the raw source slice so the emitter can preserve or mark it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Unparsed {
    pub sql: String,
    pub span: Span,
    pub comments: Vec<String>,
}

/// Tagged variant over every statement and expression kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expression {
    // Scalar expressions
    Literal(Literal),
    Column(Box<Column>),
    Variable(Box<Variable>),
    SystemVariable(Box<Variable>),
    Star(Box<Star>),
    BinaryOp(Box<BinaryOp>),
    UnaryOp(Box<UnaryOp>),
    Paren(Box<Paren>),
    Case(Box<Case>),
    FunctionCall(Box<FunctionCall>),
    Cast(Box<Cast>),
    Convert(Box<Convert>),
    Position(Box<Position>),
    Interval(Box<Interval>),
    Extract(Box<Extract>),
    AtTimeZone(Box<AtTimeZone>),
    IsNull(Box<IsNullExpr>),
    InList(Box<InList>),
    InSubquery(Box<InSubquery>),
    Between(Box<BetweenExpr>),
    Like(Box<LikeExpr>),
    Exists(Box<ExistsExpr>),
    Subquery(Box<Expression>),

    // Queries
    Select(Box<Select>),
    Union(Box<Union>),

    // Statements
    CreateView(Box<CreateView>),
    CreateProcedure(Box<CreateProcedure>),
    CreateFunction(Box<CreateFunction>),
    CreateTable(Box<CreateTable>),
    Insert(Box<Insert>),
    Update(Box<Update>),
    Delete(Box<Delete>),
    Declare(Box<Declare>),
    SetVariable(Box<SetVariable>),
    Block(Box<Block>),
    If(Box<IfStatement>),
    While(Box<WhileStatement>),
    CursorLoop(Box<CursorLoop>),
    TryCatch(Box<TryCatch>),
    BeginTransaction(Box<Transaction>),
    Commit(Box<Transaction>),
    Rollback(Box<Transaction>),
    Print(Box<PrintStatement>),
    RaiseNotice(Box<RaiseNotice>),
    Return(Box<ReturnStatement>),
    DeclareCursor(Box<DeclareCursor>),
    OpenCursor(Box<CursorRef>),
    FetchCursor(Box<FetchCursor>),
    CloseCursor(Box<CursorRef>),
    DeallocateCursor(Box<CursorRef>),
    Unparsed(Box<Unparsed>),
}

impl Expression {
    /// Shorthand for a number literal
    pub fn number(n: impl Into<String>) -> Self {
        Expression::Literal(Literal::Number(n.into()))
    }

    /// Shorthand for a string literal
    pub fn string(s: impl Into<String>) -> Self {
        Expression::Literal(Literal::String(s.into()))
    }

    /// Shorthand for a boolean literal
    pub fn boolean(value: bool) -> Self {
        Expression::Literal(Literal::Boolean(value))
    }

    /// Shorthand for an unqualified column reference
    pub fn column(name: impl Into<String>) -> Self {
        Expression::Column(Box::new(Column {
            qualifier: None,
            name: Identifier::new(name),
        }))
    }

    /// True if this is the numeric literal `text`
    pub fn is_number(&self, text: &str) -> bool {
        matches!(self, Expression::Literal(Literal::Number(n)) if n == text)
    }

    /// True for variants that represent statements rather than scalar
    /// expressions or queries used in expression position
    pub fn is_statement(&self) -> bool {
        matches!(
            self,
            Expression::CreateView(_)
                | Expression::CreateProcedure(_)
                | Expression::CreateFunction(_)
                | Expression::CreateTable(_)
                | Expression::Insert(_)
                | Expression::Update(_)
                | Expression::Delete(_)
                | Expression::Declare(_)
                | Expression::SetVariable(_)
                | Expression::Block(_)
                | Expression::If(_)
                | Expression::While(_)
                | Expression::CursorLoop(_)
                | Expression::TryCatch(_)
                | Expression::BeginTransaction(_)
                | Expression::Commit(_)
                | Expression::Rollback(_)
                | Expression::Print(_)
                | Expression::RaiseNotice(_)
                | Expression::Return(_)
                | Expression::DeclareCursor(_)
                | Expression::OpenCursor(_)
                | Expression::FetchCursor(_)
                | Expression::CloseCursor(_)
                | Expression::DeallocateCursor(_)
                | Expression::Unparsed(_)
        )
    }
}
