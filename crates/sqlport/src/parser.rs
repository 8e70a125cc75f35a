//! Recursive-descent parser for the supported T-SQL statement subset.
//!
//! Statement-level recovery: a statement outside the subset produces an
//! error diagnostic with the offending span and is passed through as an
//! opaque [`Unparsed`] node, so one unsupported statement never blocks
//! translation of the rest of the batch. Scalar expressions use Pratt-style
//! precedence climbing.

use crate::diagnostics::Diagnostic;
use crate::error::{Error, Result};
use crate::expressions::*;
use crate::tokens::{Span, Token, TokenType, Tokenizer};

/// Binding powers for binary operators, loosest first
fn binding_power(token_type: TokenType) -> Option<(u8, BinaryOperator)> {
    use BinaryOperator::*;
    use TokenType as T;
    let bp = match token_type {
        T::Or => (1, Or),
        T::And => (2, And),
        T::Eq => (4, Eq),
        T::Neq => (4, Neq),
        T::Lt => (4, Lt),
        T::Lte => (4, Lte),
        T::Gt => (4, Gt),
        T::Gte => (4, Gte),
        T::Plus => (5, Plus),
        T::Dash => (5, Minus),
        T::Concat => (5, Concat),
        T::Star => (6, Multiply),
        T::Slash => (6, Divide),
        T::Percent => (6, Modulo),
        _ => return None,
    };
    Some(bp)
}

/// Token types that can begin a statement; used for error recovery
const STATEMENT_START: &[TokenType] = &[
    TokenType::Create,
    TokenType::Select,
    TokenType::Declare,
    TokenType::Set,
    TokenType::Begin,
    TokenType::If,
    TokenType::While,
    TokenType::Print,
    TokenType::Return,
    TokenType::Commit,
    TokenType::Rollback,
    TokenType::Open,
    TokenType::Fetch,
    TokenType::Close,
    TokenType::Deallocate,
    TokenType::Insert,
    TokenType::Update,
    TokenType::Delete,
    TokenType::Exec,
    TokenType::Go,
];

pub struct Parser {
    source: Vec<char>,
    tokens: Vec<Token>,
    pos: usize,
    diagnostics: Vec<Diagnostic>,
}

impl Parser {
    /// Tokenize and parse a whole batch. The only `Err` is a fatal
    /// tokenizer error; parse failures surface as diagnostics.
    pub fn parse(sql: &str) -> Result<(Vec<Expression>, Vec<Diagnostic>)> {
        let tokens = Tokenizer::new().tokenize(sql)?;
        let mut parser = Parser {
            source: sql.chars().collect(),
            tokens,
            pos: 0,
            diagnostics: Vec::new(),
        };
        let statements = parser.parse_batch();
        Ok((statements, parser.diagnostics))
    }

    fn parse_batch(&mut self) -> Vec<Expression> {
        let mut statements = Vec::new();
        loop {
            while self.check(TokenType::Semicolon) || self.check(TokenType::Go) {
                self.advance();
            }
            if self.is_at_end() {
                break;
            }
            let start = self.pos;
            // parse_statement takes the leading comments out of the token;
            // keep a copy in case the statement ends up unparsed
            let leading_comments = self.tokens[start].comments.clone();
            match self.parse_statement() {
                Ok(Some(stmt)) => statements.push(stmt),
                Ok(None) => {}
                Err(err) => {
                    let span = self.recovery_span(start);
                    let message = match err {
                        Error::Parse(m) => m,
                        other => other.to_string(),
                    };
                    self.diagnostics
                        .push(Diagnostic::error(message).with_span(span));
                    self.recover_to_statement_boundary();
                    let end_span = self.previous_span().unwrap_or(span);
                    let full = span.union(end_span);
                    let sql: String = self.source[full.start..full.end].iter().collect();
                    statements.push(Expression::Unparsed(Box::new(Unparsed {
                        sql,
                        span: full,
                        comments: leading_comments,
                    })));
                }
            }
        }
        statements
    }

    // ===== token helpers =====

    fn is_at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn peek_type(&self) -> Option<TokenType> {
        self.tokens.get(self.pos).map(|t| t.token_type)
    }

    fn peek_nth_type(&self, n: usize) -> Option<TokenType> {
        self.tokens.get(self.pos + n).map(|t| t.token_type)
    }

    fn check(&self, token_type: TokenType) -> bool {
        self.peek_type() == Some(token_type)
    }

    fn advance(&mut self) -> Option<&Token> {
        let token = self.tokens.get(self.pos);
        if token.is_some() {
            self.pos += 1;
        }
        self.tokens.get(self.pos - 1)
    }

    fn eat(&mut self, token_type: TokenType) -> bool {
        if self.check(token_type) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token_type: TokenType) -> Result<Token> {
        match self.tokens.get(self.pos) {
            Some(t) if t.token_type == token_type => {
                self.pos += 1;
                Ok(self.tokens[self.pos - 1].clone())
            }
            Some(t) => Err(Error::parse(format!(
                "expected {:?}, found `{}` at line {}",
                token_type, t.text, t.span.line
            ))),
            None => Err(Error::parse(format!(
                "expected {:?}, found end of input",
                token_type
            ))),
        }
    }

    fn current_span(&self) -> Option<Span> {
        self.tokens.get(self.pos).map(|t| t.span)
    }

    fn previous_span(&self) -> Option<Span> {
        if self.pos == 0 {
            None
        } else {
            self.tokens.get(self.pos - 1).map(|t| t.span)
        }
    }

    fn recovery_span(&self, start: usize) -> Span {
        self.tokens
            .get(start)
            .map(|t| t.span)
            .unwrap_or_default()
    }

    /// Leading comments of the token at `index`
    fn comments_at(&mut self, index: usize) -> Vec<String> {
        self.tokens
            .get_mut(index)
            .map(|t| std::mem::take(&mut t.comments))
            .unwrap_or_default()
    }

    /// Skip tokens until a semicolon, GO, or a statement-start keyword at
    /// parenthesis depth zero
    fn recover_to_statement_boundary(&mut self) {
        let mut depth: i32 = 0;
        // Always consume at least one token so recovery makes progress
        let mut first = true;
        while let Some(tt) = self.peek_type() {
            if !first && depth == 0 {
                if tt == TokenType::Semicolon || tt == TokenType::Go {
                    self.advance();
                    return;
                }
                if STATEMENT_START.contains(&tt) {
                    return;
                }
            }
            match tt {
                TokenType::LParen => depth += 1,
                TokenType::RParen => depth -= 1,
                _ => {}
            }
            self.advance();
            first = false;
        }
    }

    // ===== statements =====

    /// Parse one statement. `Ok(None)` means the statement was recognized
    /// and deliberately dropped (e.g. `SET NOCOUNT ON`).
    fn parse_statement(&mut self) -> Result<Option<Expression>> {
        let comments = self.comments_at(self.pos);
        let start_span = self.current_span().unwrap_or_default();
        let stmt = match self.peek_type() {
            Some(TokenType::Create) => self.parse_create(comments, start_span)?,
            Some(TokenType::Select) => self.parse_select_statement(comments)?,
            Some(TokenType::Declare) => self.parse_declare(comments, start_span)?,
            Some(TokenType::Set) => return self.parse_set(comments, start_span),
            Some(TokenType::Begin) => self.parse_begin(comments, start_span)?,
            Some(TokenType::If) => self.parse_if(comments, start_span)?,
            Some(TokenType::While) => self.parse_while(comments, start_span)?,
            Some(TokenType::Print) => {
                self.advance();
                let value = self.parse_expr(0)?;
                Expression::Print(Box::new(PrintStatement {
                    value,
                    comments,
                    span: Some(start_span),
                }))
            }
            Some(TokenType::Return) => {
                self.advance();
                let value = if self.is_expression_start() {
                    Some(self.parse_expr(0)?)
                } else {
                    None
                };
                Expression::Return(Box::new(ReturnStatement {
                    value,
                    comments,
                    span: Some(start_span),
                }))
            }
            Some(TokenType::Commit) => {
                self.advance();
                self.eat(TokenType::Transaction);
                Expression::Commit(Box::new(Transaction {
                    comments,
                    span: Some(start_span),
                }))
            }
            Some(TokenType::Rollback) => {
                self.advance();
                self.eat(TokenType::Transaction);
                Expression::Rollback(Box::new(Transaction {
                    comments,
                    span: Some(start_span),
                }))
            }
            Some(TokenType::Open) => {
                self.advance();
                let name = self.parse_identifier()?;
                Expression::OpenCursor(Box::new(CursorRef {
                    name,
                    comments,
                    span: Some(start_span),
                }))
            }
            Some(TokenType::Fetch) => self.parse_fetch(comments, start_span)?,
            Some(TokenType::Close) => {
                self.advance();
                let name = self.parse_identifier()?;
                Expression::CloseCursor(Box::new(CursorRef {
                    name,
                    comments,
                    span: Some(start_span),
                }))
            }
            Some(TokenType::Deallocate) => {
                self.advance();
                let name = self.parse_identifier()?;
                Expression::DeallocateCursor(Box::new(CursorRef {
                    name,
                    comments,
                    span: Some(start_span),
                }))
            }
            Some(TokenType::Insert) => self.parse_insert(comments, start_span)?,
            Some(TokenType::Update) => self.parse_update(comments, start_span)?,
            Some(TokenType::Delete) => self.parse_delete(comments, start_span)?,
            Some(TokenType::Exec) => {
                return Err(Error::parse(
                    "EXEC is not supported; translate the called procedure separately",
                ))
            }
            Some(_) => {
                let t = &self.tokens[self.pos];
                return Err(Error::parse(format!(
                    "unrecognized statement starting with `{}` at line {}",
                    t.text, t.span.line
                )));
            }
            None => return Err(Error::parse("unexpected end of input")),
        };
        self.eat(TokenType::Semicolon);
        Ok(Some(stmt))
    }

    fn is_expression_start(&self) -> bool {
        matches!(
            self.peek_type(),
            Some(
                TokenType::Number
                    | TokenType::String
                    | TokenType::NationalString
                    | TokenType::Variable
                    | TokenType::SystemVariable
                    | TokenType::Identifier
                    | TokenType::QuotedIdentifier
                    | TokenType::LParen
                    | TokenType::Dash
                    | TokenType::Plus
                    | TokenType::Null
                    | TokenType::Case
                    | TokenType::Cast
                    | TokenType::Convert
                    | TokenType::Not
            )
        )
    }

    fn parse_create(&mut self, comments: Vec<String>, span: Span) -> Result<Expression> {
        self.expect(TokenType::Create)?;
        let or_alter = if self.check(TokenType::Or) {
            self.advance();
            // OR REPLACE is accepted so already-translated DDL re-parses
            if !self.eat(TokenType::Alter) {
                let t = self.expect(TokenType::Identifier)?;
                if !t.text.eq_ignore_ascii_case("REPLACE") {
                    return Err(Error::parse(format!(
                        "expected ALTER or REPLACE, found `{}` at line {}",
                        t.text, t.span.line
                    )));
                }
            }
            true
        } else {
            false
        };
        match self.peek_type() {
            Some(TokenType::View) => self.parse_create_view(or_alter, comments, span),
            Some(TokenType::Procedure) => self.parse_create_procedure(or_alter, comments, span),
            Some(TokenType::Function) => self.parse_create_function(or_alter, comments, span),
            Some(TokenType::Table) if !or_alter => self.parse_create_table(comments, span),
            _ => Err(Error::parse(
                "only CREATE [OR ALTER] VIEW/PROCEDURE/FUNCTION and CREATE TABLE are supported",
            )),
        }
    }

    fn parse_create_view(
        &mut self,
        or_alter: bool,
        comments: Vec<String>,
        span: Span,
    ) -> Result<Expression> {
        self.expect(TokenType::View)?;
        let name = self.parse_object_name()?;
        let mut columns = Vec::new();
        if self.eat(TokenType::LParen) {
            loop {
                columns.push(self.parse_identifier()?);
                if !self.eat(TokenType::Comma) {
                    break;
                }
            }
            self.expect(TokenType::RParen)?;
        }
        self.expect(TokenType::As)?;
        let query = self.parse_query()?;
        Ok(Expression::CreateView(Box::new(CreateView {
            or_alter,
            name,
            columns,
            query,
            comments,
            span: Some(span),
        })))
    }

    fn parse_proc_params(&mut self) -> Result<Vec<ProcParam>> {
        let mut params = Vec::new();
        let parenthesized = self.eat(TokenType::LParen);
        if self.check(TokenType::Variable) {
            loop {
                let name = self.expect(TokenType::Variable)?.text;
                let data_type = self.parse_data_type()?;
                let default = if self.eat(TokenType::Eq) {
                    Some(self.parse_expr(0)?)
                } else {
                    None
                };
                let output = self.eat(TokenType::Output);
                params.push(ProcParam {
                    name,
                    data_type,
                    default,
                    output,
                });
                if !self.eat(TokenType::Comma) {
                    break;
                }
            }
        }
        if parenthesized {
            self.expect(TokenType::RParen)?;
        }
        Ok(params)
    }

    fn parse_create_procedure(
        &mut self,
        or_alter: bool,
        comments: Vec<String>,
        span: Span,
    ) -> Result<Expression> {
        self.expect(TokenType::Procedure)?;
        let name = self.parse_object_name()?;
        let params = self.parse_proc_params()?;
        self.expect(TokenType::As)?;
        let body = self.parse_procedure_body()?;
        Ok(Expression::CreateProcedure(Box::new(CreateProcedure {
            or_alter,
            name,
            params,
            body,
            comments,
            span: Some(span),
        })))
    }

    fn parse_create_function(
        &mut self,
        or_alter: bool,
        comments: Vec<String>,
        span: Span,
    ) -> Result<Expression> {
        self.expect(TokenType::Function)?;
        let name = self.parse_object_name()?;
        let params = self.parse_proc_params()?;
        self.expect(TokenType::Returns)?;
        let returns = self.parse_data_type()?;
        self.expect(TokenType::As)?;
        let body = self.parse_procedure_body()?;
        Ok(Expression::CreateFunction(Box::new(CreateFunction {
            or_alter,
            name,
            params,
            returns,
            body,
            comments,
            span: Some(span),
        })))
    }

    /// Procedure body: a single BEGIN/END block, or bare statements up to
    /// the end of the batch
    fn parse_procedure_body(&mut self) -> Result<Block> {
        if self.check(TokenType::Begin) && self.peek_nth_type(1) != Some(TokenType::Try) {
            match self.parse_block()? {
                Expression::Block(b) => Ok(*b),
                other => Ok(Block {
                    statements: vec![other],
                }),
            }
        } else {
            let mut statements = Vec::new();
            while !self.is_at_end() && !self.check(TokenType::Go) {
                while self.eat(TokenType::Semicolon) {}
                if self.is_at_end() || self.check(TokenType::Go) {
                    break;
                }
                if let Some(stmt) = self.parse_statement()? {
                    statements.push(stmt);
                }
            }
            Ok(Block { statements })
        }
    }

    fn parse_create_table(&mut self, comments: Vec<String>, span: Span) -> Result<Expression> {
        self.expect(TokenType::Table)?;
        let name = self.parse_object_name()?;
        self.expect(TokenType::LParen)?;
        let mut columns = Vec::new();
        loop {
            let col_name = self.parse_identifier()?;
            let data_type = self.parse_data_type()?;
            let mut identity = None;
            let mut not_null = false;
            let mut default = None;
            loop {
                if self.check(TokenType::Identity) {
                    self.advance();
                    let mut seed = 1i64;
                    let mut increment = 1i64;
                    if self.eat(TokenType::LParen) {
                        seed = self.parse_integer()?;
                        self.expect(TokenType::Comma)?;
                        increment = self.parse_integer()?;
                        self.expect(TokenType::RParen)?;
                    }
                    identity = Some((seed, increment));
                } else if self.check(TokenType::Not) {
                    self.advance();
                    self.expect(TokenType::Null)?;
                    not_null = true;
                } else if self.eat(TokenType::Null) {
                    // explicit NULL marker, nothing to record
                } else if self.check(TokenType::Default) {
                    self.advance();
                    default = Some(self.parse_expr(7)?);
                } else {
                    break;
                }
            }
            columns.push(ColumnDef {
                name: col_name,
                data_type,
                identity,
                not_null,
                default,
            });
            if !self.eat(TokenType::Comma) {
                break;
            }
        }
        self.expect(TokenType::RParen)?;
        Ok(Expression::CreateTable(Box::new(CreateTable {
            name,
            columns,
            comments,
            span: Some(span),
        })))
    }

    fn parse_integer(&mut self) -> Result<i64> {
        let negative = self.eat(TokenType::Dash);
        let token = self.expect(TokenType::Number)?;
        let value: i64 = token
            .text
            .parse()
            .map_err(|_| Error::parse(format!("invalid integer `{}`", token.text)))?;
        Ok(if negative { -value } else { value })
    }

    fn parse_declare(&mut self, comments: Vec<String>, span: Span) -> Result<Expression> {
        self.expect(TokenType::Declare)?;
        // DECLARE name CURSOR FOR select
        if (self.check(TokenType::Identifier) || self.check(TokenType::QuotedIdentifier))
            && self.peek_nth_type(1) == Some(TokenType::Cursor)
        {
            let name = self.parse_identifier()?;
            self.expect(TokenType::Cursor)?;
            self.expect(TokenType::For)?;
            let query = self.parse_query()?;
            return Ok(Expression::DeclareCursor(Box::new(DeclareCursor {
                name,
                query,
                comments,
                span: Some(span),
            })));
        }
        let mut declares = Vec::new();
        let mut first_comments = comments;
        loop {
            let name = self.expect(TokenType::Variable)?.text;
            let data_type = self.parse_data_type()?;
            let default = if self.eat(TokenType::Eq) {
                Some(self.parse_expr(0)?)
            } else {
                None
            };
            declares.push(Expression::Declare(Box::new(Declare {
                name,
                data_type,
                default,
                comments: std::mem::take(&mut first_comments),
                span: Some(span),
            })));
            if !self.eat(TokenType::Comma) {
                break;
            }
        }
        if declares.len() == 1 {
            Ok(declares.remove(0))
        } else {
            Ok(Expression::Block(Box::new(Block {
                statements: declares,
            })))
        }
    }

    /// `SET @var = expr`, plus recognized-and-dropped session options
    fn parse_set(&mut self, comments: Vec<String>, span: Span) -> Result<Option<Expression>> {
        self.expect(TokenType::Set)?;
        if self.check(TokenType::Variable) {
            let name = self.expect(TokenType::Variable)?.text;
            self.expect(TokenType::Eq)?;
            let value = self.parse_expr(0)?;
            self.eat(TokenType::Semicolon);
            return Ok(Some(Expression::SetVariable(Box::new(SetVariable {
                name,
                value,
                comments,
                span: Some(span),
            }))));
        }
        // Session options such as SET NOCOUNT ON have no PostgreSQL
        // equivalent; drop them with a warning.
        let option = self
            .advance()
            .map(|t| t.text.clone())
            .unwrap_or_default();
        let mut dropped = option.clone();
        while let Some(tt) = self.peek_type() {
            if tt == TokenType::Semicolon || STATEMENT_START.contains(&tt) {
                break;
            }
            if let Some(t) = self.advance() {
                dropped.push(' ');
                dropped.push_str(&t.text);
            }
        }
        self.diagnostics.push(
            Diagnostic::warning(format!(
                "session option `SET {}` has no PostgreSQL equivalent and was dropped",
                dropped
            ))
            .with_span(span),
        );
        self.eat(TokenType::Semicolon);
        Ok(None)
    }

    fn parse_begin(&mut self, comments: Vec<String>, span: Span) -> Result<Expression> {
        match self.peek_nth_type(1) {
            Some(TokenType::Try) => self.parse_try_catch(comments, span),
            // bare `BEGIN;` is a transaction start, not a block
            Some(TokenType::Semicolon) | None => {
                self.advance();
                Ok(Expression::BeginTransaction(Box::new(Transaction {
                    comments,
                    span: Some(span),
                })))
            }
            Some(TokenType::Transaction) => {
                self.advance();
                self.advance();
                Ok(Expression::BeginTransaction(Box::new(Transaction {
                    comments,
                    span: Some(span),
                })))
            }
            _ => self.parse_block(),
        }
    }

    fn parse_block(&mut self) -> Result<Expression> {
        self.expect(TokenType::Begin)?;
        let mut statements = Vec::new();
        loop {
            while self.eat(TokenType::Semicolon) {}
            if self.check(TokenType::End) {
                self.advance();
                break;
            }
            if self.is_at_end() {
                return Err(Error::parse("unterminated BEGIN block"));
            }
            if let Some(stmt) = self.parse_statement()? {
                statements.push(stmt);
            }
        }
        Ok(Expression::Block(Box::new(Block { statements })))
    }

    fn parse_try_catch(&mut self, comments: Vec<String>, span: Span) -> Result<Expression> {
        self.expect(TokenType::Begin)?;
        self.expect(TokenType::Try)?;
        let mut try_statements = Vec::new();
        loop {
            while self.eat(TokenType::Semicolon) {}
            if self.check(TokenType::End) && self.peek_nth_type(1) == Some(TokenType::Try) {
                self.advance();
                self.advance();
                break;
            }
            if self.is_at_end() {
                return Err(Error::parse("unterminated BEGIN TRY block"));
            }
            if let Some(stmt) = self.parse_statement()? {
                try_statements.push(stmt);
            }
        }
        self.expect(TokenType::Begin)?;
        self.expect(TokenType::Catch)?;
        let mut catch_statements = Vec::new();
        loop {
            while self.eat(TokenType::Semicolon) {}
            if self.check(TokenType::End) && self.peek_nth_type(1) == Some(TokenType::Catch) {
                self.advance();
                self.advance();
                break;
            }
            if self.is_at_end() {
                return Err(Error::parse("unterminated BEGIN CATCH block"));
            }
            if let Some(stmt) = self.parse_statement()? {
                catch_statements.push(stmt);
            }
        }
        Ok(Expression::TryCatch(Box::new(TryCatch {
            try_body: Block {
                statements: try_statements,
            },
            catch_body: Block {
                statements: catch_statements,
            },
            comments,
            span: Some(span),
        })))
    }

    fn parse_branch_body(&mut self) -> Result<Block> {
        if self.check(TokenType::Begin) && self.peek_nth_type(1) != Some(TokenType::Try) {
            match self.parse_block()? {
                Expression::Block(b) => Ok(*b),
                other => Ok(Block {
                    statements: vec![other],
                }),
            }
        } else {
            match self.parse_statement()? {
                Some(stmt) => Ok(Block {
                    statements: vec![stmt],
                }),
                None => Ok(Block {
                    statements: Vec::new(),
                }),
            }
        }
    }

    fn parse_if(&mut self, comments: Vec<String>, span: Span) -> Result<Expression> {
        self.expect(TokenType::If)?;
        let condition = self.parse_expr(0)?;
        let then_branch = self.parse_branch_body()?;
        let else_branch = if self.eat(TokenType::Else) {
            Some(self.parse_branch_body()?)
        } else {
            None
        };
        Ok(Expression::If(Box::new(IfStatement {
            condition,
            then_branch,
            else_branch,
            comments,
            span: Some(span),
        })))
    }

    fn parse_while(&mut self, comments: Vec<String>, span: Span) -> Result<Expression> {
        self.expect(TokenType::While)?;
        let condition = self.parse_expr(0)?;
        let body = self.parse_branch_body()?;
        Ok(Expression::While(Box::new(WhileStatement {
            condition,
            body,
            comments,
            span: Some(span),
        })))
    }

    fn parse_fetch(&mut self, comments: Vec<String>, span: Span) -> Result<Expression> {
        self.expect(TokenType::Fetch)?;
        self.eat(TokenType::Next);
        self.expect(TokenType::From)?;
        let cursor = self.parse_identifier()?;
        let mut into = Vec::new();
        if self.eat(TokenType::Into) {
            loop {
                into.push(self.expect(TokenType::Variable)?.text);
                if !self.eat(TokenType::Comma) {
                    break;
                }
            }
        }
        Ok(Expression::FetchCursor(Box::new(FetchCursor {
            cursor,
            into,
            comments,
            span: Some(span),
        })))
    }

    fn parse_insert(&mut self, comments: Vec<String>, span: Span) -> Result<Expression> {
        self.expect(TokenType::Insert)?;
        self.eat(TokenType::Into);
        let table = self.parse_object_name()?;
        let mut columns = Vec::new();
        // A LParen here is a column list unless it opens a subquery source
        if self.check(TokenType::LParen) && self.peek_nth_type(1) != Some(TokenType::Select) {
            self.advance();
            loop {
                columns.push(self.parse_identifier()?);
                if !self.eat(TokenType::Comma) {
                    break;
                }
            }
            self.expect(TokenType::RParen)?;
        }
        let source = if self.eat(TokenType::Values) {
            let mut rows = Vec::new();
            loop {
                self.expect(TokenType::LParen)?;
                let mut row = Vec::new();
                loop {
                    row.push(self.parse_expr(0)?);
                    if !self.eat(TokenType::Comma) {
                        break;
                    }
                }
                self.expect(TokenType::RParen)?;
                rows.push(row);
                if !self.eat(TokenType::Comma) {
                    break;
                }
            }
            InsertSource::Values(rows)
        } else if self.eat(TokenType::LParen) {
            let query = self.parse_query()?;
            self.expect(TokenType::RParen)?;
            InsertSource::Query(query)
        } else {
            InsertSource::Query(self.parse_query()?)
        };
        Ok(Expression::Insert(Box::new(Insert {
            table,
            columns,
            source,
            comments,
            span: Some(span),
        })))
    }

    fn parse_update(&mut self, comments: Vec<String>, span: Span) -> Result<Expression> {
        self.expect(TokenType::Update)?;
        let table = self.parse_object_name()?;
        self.expect(TokenType::Set)?;
        let mut assignments = Vec::new();
        loop {
            let target = self.parse_column_ref()?;
            self.expect(TokenType::Eq)?;
            let value = self.parse_expr(0)?;
            assignments.push(Assignment { target, value });
            if !self.eat(TokenType::Comma) {
                break;
            }
        }
        let selection = if self.eat(TokenType::Where) {
            Some(self.parse_expr(0)?)
        } else {
            None
        };
        Ok(Expression::Update(Box::new(Update {
            table,
            assignments,
            selection,
            comments,
            span: Some(span),
        })))
    }

    fn parse_delete(&mut self, comments: Vec<String>, span: Span) -> Result<Expression> {
        self.expect(TokenType::Delete)?;
        self.eat(TokenType::From);
        let table = self.parse_object_name()?;
        let selection = if self.eat(TokenType::Where) {
            Some(self.parse_expr(0)?)
        } else {
            None
        };
        Ok(Expression::Delete(Box::new(Delete {
            table,
            selection,
            comments,
            span: Some(span),
        })))
    }

    // ===== queries =====

    fn parse_select_statement(&mut self, comments: Vec<String>) -> Result<Expression> {
        let mut query = self.parse_query()?;
        if let Expression::Select(ref mut select) = query {
            select.comments = comments;
        }
        Ok(query)
    }

    fn parse_query(&mut self) -> Result<Expression> {
        let mut left = self.parse_select()?;
        while self.check(TokenType::Union) {
            self.advance();
            let all = self.eat(TokenType::All);
            let right = self.parse_select()?;
            left = Expression::Union(Box::new(Union { left, right, all }));
        }
        Ok(left)
    }

    fn parse_select(&mut self) -> Result<Expression> {
        let span = self.current_span();
        self.expect(TokenType::Select)?;
        let top = if self.check(TokenType::Top) {
            let top_span = self.current_span();
            self.advance();
            let value = if self.eat(TokenType::LParen) {
                let v = self.parse_expr(0)?;
                self.expect(TokenType::RParen)?;
                v
            } else {
                let token = self.expect(TokenType::Number)?;
                Expression::number(token.text)
            };
            let percent = self.eat(TokenType::Percent_);
            let with_ties = if self.check(TokenType::With) {
                self.advance();
                self.expect(TokenType::Ties)?;
                true
            } else {
                false
            };
            Some(Top {
                value,
                percent,
                with_ties,
                span: top_span,
            })
        } else {
            None
        };
        let distinct = self.eat(TokenType::Distinct);

        let mut projection = Vec::new();
        let mut into_variables = Vec::new();
        loop {
            // `SELECT @v = expr` is a variable assignment projection
            if self.check(TokenType::Variable) && self.peek_nth_type(1) == Some(TokenType::Eq) {
                let name = self.expect(TokenType::Variable)?.text;
                self.expect(TokenType::Eq)?;
                let expr = self.parse_expr(0)?;
                into_variables.push(name);
                projection.push(SelectItem { expr, alias: None });
            } else {
                projection.push(self.parse_select_item()?);
            }
            if !self.eat(TokenType::Comma) {
                break;
            }
        }

        let mut from = Vec::new();
        if self.eat(TokenType::From) {
            loop {
                from.push(self.parse_table_with_joins()?);
                if !self.eat(TokenType::Comma) {
                    break;
                }
            }
        }
        let selection = if self.eat(TokenType::Where) {
            Some(self.parse_expr(0)?)
        } else {
            None
        };
        let mut group_by = Vec::new();
        if self.check(TokenType::Group) {
            self.advance();
            self.expect(TokenType::By)?;
            loop {
                group_by.push(self.parse_expr(0)?);
                if !self.eat(TokenType::Comma) {
                    break;
                }
            }
        }
        let having = if self.eat(TokenType::Having) {
            Some(self.parse_expr(0)?)
        } else {
            None
        };
        let order_by = if self.check(TokenType::Order) {
            self.advance();
            self.expect(TokenType::By)?;
            self.parse_order_by_list()?
        } else {
            Vec::new()
        };

        let limit = if self.eat(TokenType::Limit) {
            Some(self.parse_expr(0)?)
        } else {
            None
        };

        // FOR XML / FOR JSON have no deterministic PostgreSQL mapping
        if self.check(TokenType::For) {
            let what = self
                .tokens
                .get(self.pos + 1)
                .map(|t| t.text.to_uppercase())
                .unwrap_or_else(|| "?".to_string());
            return Err(Error::parse(format!(
                "FOR {} clause is not supported",
                what
            )));
        }

        Ok(Expression::Select(Box::new(Select {
            top,
            distinct,
            projection,
            into_variables,
            from,
            selection,
            group_by,
            having,
            order_by,
            limit,
            comments: Vec::new(),
            span,
        })))
    }

    fn parse_order_by_list(&mut self) -> Result<Vec<OrderByExpr>> {
        let mut items = Vec::new();
        loop {
            let expr = self.parse_expr(0)?;
            let desc = if self.eat(TokenType::Desc) {
                true
            } else {
                self.eat(TokenType::Asc);
                false
            };
            items.push(OrderByExpr { expr, desc });
            if !self.eat(TokenType::Comma) {
                break;
            }
        }
        Ok(items)
    }

    fn parse_select_item(&mut self) -> Result<SelectItem> {
        if self.eat(TokenType::Star) {
            return Ok(SelectItem {
                expr: Expression::Star(Box::new(Star { qualifier: None })),
                alias: None,
            });
        }
        // qualified star: t.* or [T].*
        if (self.check(TokenType::Identifier) || self.check(TokenType::QuotedIdentifier))
            && self.peek_nth_type(1) == Some(TokenType::Dot)
            && self.peek_nth_type(2) == Some(TokenType::Star)
        {
            let qualifier = self.parse_identifier()?;
            self.expect(TokenType::Dot)?;
            self.expect(TokenType::Star)?;
            return Ok(SelectItem {
                expr: Expression::Star(Box::new(Star {
                    qualifier: Some(qualifier),
                })),
                alias: None,
            });
        }
        let expr = self.parse_expr(0)?;
        let alias = if self.eat(TokenType::As) {
            Some(self.parse_identifier()?)
        } else if self.check(TokenType::Identifier) || self.check(TokenType::QuotedIdentifier) {
            Some(self.parse_identifier()?)
        } else {
            None
        };
        Ok(SelectItem { expr, alias })
    }

    fn parse_table_with_joins(&mut self) -> Result<TableWithJoins> {
        let relation = self.parse_table_factor()?;
        let mut joins = Vec::new();
        loop {
            let kind = match self.peek_type() {
                Some(TokenType::Join) | Some(TokenType::Inner) => {
                    self.eat(TokenType::Inner);
                    self.expect(TokenType::Join)?;
                    JoinKind::Inner
                }
                Some(TokenType::Left) => {
                    self.advance();
                    self.eat(TokenType::Outer);
                    self.expect(TokenType::Join)?;
                    JoinKind::Left
                }
                Some(TokenType::Right) => {
                    self.advance();
                    self.eat(TokenType::Outer);
                    self.expect(TokenType::Join)?;
                    JoinKind::Right
                }
                Some(TokenType::Full) => {
                    self.advance();
                    self.eat(TokenType::Outer);
                    self.expect(TokenType::Join)?;
                    JoinKind::Full
                }
                Some(TokenType::Cross) => {
                    self.advance();
                    self.expect(TokenType::Join)?;
                    JoinKind::Cross
                }
                _ => break,
            };
            let relation = self.parse_table_factor()?;
            let on = if kind != JoinKind::Cross {
                self.expect(TokenType::On)?;
                Some(self.parse_expr(0)?)
            } else {
                None
            };
            joins.push(Join { kind, relation, on });
        }
        Ok(TableWithJoins { relation, joins })
    }

    fn parse_table_factor(&mut self) -> Result<TableFactor> {
        if self.eat(TokenType::LParen) {
            let subquery = self.parse_query()?;
            self.expect(TokenType::RParen)?;
            self.eat(TokenType::As);
            let alias = if self.check(TokenType::Identifier)
                || self.check(TokenType::QuotedIdentifier)
            {
                Some(self.parse_identifier()?)
            } else {
                None
            };
            return Ok(TableFactor::Derived { subquery, alias });
        }
        let name = self.parse_object_name()?;
        let alias = if self.eat(TokenType::As) {
            Some(self.parse_identifier()?)
        } else if self.check(TokenType::Identifier) || self.check(TokenType::QuotedIdentifier) {
            Some(self.parse_identifier()?)
        } else {
            None
        };
        Ok(TableFactor::Table { name, alias })
    }

    // ===== names and types =====

    fn parse_identifier(&mut self) -> Result<Identifier> {
        match self.peek_type() {
            Some(TokenType::Identifier) => {
                let t = self.advance().expect("checked").clone();
                Ok(Identifier {
                    name: t.text,
                    quoted: false,
                    span: Some(t.span),
                })
            }
            Some(TokenType::QuotedIdentifier) => {
                let t = self.advance().expect("checked").clone();
                Ok(Identifier {
                    name: t.text,
                    quoted: true,
                    span: Some(t.span),
                })
            }
            _ => match self.tokens.get(self.pos) {
                Some(t) => Err(Error::parse(format!(
                    "expected identifier, found `{}` at line {}",
                    t.text, t.span.line
                ))),
                None => Err(Error::parse("expected identifier, found end of input")),
            },
        }
    }

    fn parse_object_name(&mut self) -> Result<ObjectName> {
        let mut parts = vec![self.parse_identifier()?];
        while self.eat(TokenType::Dot) {
            parts.push(self.parse_identifier()?);
            if parts.len() > 3 {
                return Err(Error::parse("object name has more than three parts"));
            }
        }
        let name = parts.pop().expect("at least one part");
        let schema = parts.pop();
        let catalog = parts.pop();
        Ok(ObjectName {
            catalog,
            schema,
            name,
        })
    }

    fn parse_column_ref(&mut self) -> Result<Column> {
        let first = self.parse_identifier()?;
        if self.eat(TokenType::Dot) {
            let name = self.parse_identifier()?;
            Ok(Column {
                qualifier: Some(first),
                name,
            })
        } else {
            Ok(Column {
                qualifier: None,
                name: first,
            })
        }
    }

    fn parse_data_type(&mut self) -> Result<DataType> {
        let token = match self.peek_type() {
            Some(TokenType::Identifier) | Some(TokenType::QuotedIdentifier) => {
                self.advance().expect("checked").clone()
            }
            _ => {
                return Err(Error::parse(match self.tokens.get(self.pos) {
                    Some(t) => format!("expected data type, found `{}`", t.text),
                    None => "expected data type, found end of input".to_string(),
                }))
            }
        };
        let upper = token.text.to_uppercase();
        let dt = match upper.as_str() {
            "BIT" => DataType::Bit,
            "TINYINT" => DataType::TinyInt,
            "SMALLINT" => DataType::SmallInt,
            "INT" | "INTEGER" => DataType::Int,
            "BIGINT" => DataType::BigInt,
            "DECIMAL" | "NUMERIC" => {
                let (precision, scale) = self.parse_precision_scale()?;
                DataType::Decimal { precision, scale }
            }
            "MONEY" => DataType::Money,
            "SMALLMONEY" => DataType::SmallMoney,
            "FLOAT" => {
                // optional mantissa argument, irrelevant after mapping
                if self.eat(TokenType::LParen) {
                    self.expect(TokenType::Number)?;
                    self.expect(TokenType::RParen)?;
                }
                DataType::Float
            }
            "REAL" => DataType::Real,
            "CHAR" => DataType::Char(self.parse_type_len()?),
            "NCHAR" => DataType::NChar(self.parse_type_len()?),
            "VARCHAR" => DataType::VarChar(self.parse_type_len()?),
            "NVARCHAR" => DataType::NVarChar(self.parse_type_len()?),
            "TEXT" => DataType::Text,
            "NTEXT" => DataType::NText,
            "DATE" => DataType::Date,
            "TIME" => DataType::Time,
            "DATETIME" => DataType::DateTime,
            "DATETIME2" => {
                let precision = if self.eat(TokenType::LParen) {
                    let n = self.expect(TokenType::Number)?;
                    self.expect(TokenType::RParen)?;
                    n.text.parse().ok()
                } else {
                    None
                };
                DataType::DateTime2(precision)
            }
            "SMALLDATETIME" => DataType::SmallDateTime,
            "UNIQUEIDENTIFIER" => DataType::UniqueIdentifier,
            "BINARY" => DataType::Binary(self.parse_type_len()?),
            "VARBINARY" => DataType::VarBinary(self.parse_type_len()?),
            "IMAGE" => DataType::Image,
            "XML" => DataType::Xml,
            _ => DataType::Custom(token.text),
        };
        Ok(dt)
    }

    fn parse_type_len(&mut self) -> Result<Option<TypeLen>> {
        if !self.eat(TokenType::LParen) {
            return Ok(None);
        }
        let len = match self.peek_type() {
            Some(TokenType::Number) => {
                let t = self.advance().expect("checked").clone();
                let n: u32 = t
                    .text
                    .parse()
                    .map_err(|_| Error::parse(format!("invalid type length `{}`", t.text)))?;
                TypeLen::Number(n)
            }
            Some(TokenType::Identifier)
                if self.tokens[self.pos].text.eq_ignore_ascii_case("MAX") =>
            {
                self.advance();
                TypeLen::Max
            }
            _ => return Err(Error::parse("expected type length or MAX")),
        };
        self.expect(TokenType::RParen)?;
        Ok(Some(len))
    }

    fn parse_precision_scale(&mut self) -> Result<(Option<u32>, Option<u32>)> {
        if !self.eat(TokenType::LParen) {
            return Ok((None, None));
        }
        let p = self.expect(TokenType::Number)?;
        let precision = p
            .text
            .parse()
            .map_err(|_| Error::parse(format!("invalid precision `{}`", p.text)))?;
        let scale = if self.eat(TokenType::Comma) {
            let s = self.expect(TokenType::Number)?;
            Some(
                s.text
                    .parse()
                    .map_err(|_| Error::parse(format!("invalid scale `{}`", s.text)))?,
            )
        } else {
            None
        };
        self.expect(TokenType::RParen)?;
        Ok((Some(precision), scale))
    }

    // ===== expressions =====

    fn parse_expr(&mut self, min_bp: u8) -> Result<Expression> {
        let mut left = self.parse_prefix()?;
        loop {
            // IS [NOT] NULL, [NOT] LIKE/BETWEEN/IN bind at comparison level
            match self.peek_type() {
                Some(TokenType::Is) if min_bp <= 4 => {
                    self.advance();
                    let not = self.eat(TokenType::Not);
                    self.expect(TokenType::Null)?;
                    left = Expression::IsNull(Box::new(IsNullExpr { this: left, not }));
                    continue;
                }
                Some(TokenType::Not) if min_bp <= 4 => {
                    // only valid before LIKE / BETWEEN / IN
                    match self.peek_nth_type(1) {
                        Some(TokenType::Like) => {
                            self.advance();
                            self.advance();
                            let pattern = self.parse_expr(5)?;
                            left = Expression::Like(Box::new(LikeExpr {
                                this: left,
                                pattern,
                                not: true,
                            }));
                            continue;
                        }
                        Some(TokenType::Between) => {
                            self.advance();
                            self.advance();
                            left = self.parse_between(left, true)?;
                            continue;
                        }
                        Some(TokenType::In) => {
                            self.advance();
                            self.advance();
                            left = self.parse_in(left, true)?;
                            continue;
                        }
                        _ => break,
                    }
                }
                Some(TokenType::Like) if min_bp <= 4 => {
                    self.advance();
                    let pattern = self.parse_expr(5)?;
                    left = Expression::Like(Box::new(LikeExpr {
                        this: left,
                        pattern,
                        not: false,
                    }));
                    continue;
                }
                Some(TokenType::Between) if min_bp <= 4 => {
                    self.advance();
                    left = self.parse_between(left, false)?;
                    continue;
                }
                Some(TokenType::In) if min_bp <= 4 => {
                    self.advance();
                    left = self.parse_in(left, false)?;
                    continue;
                }
                _ => {}
            }
            // postfix AT TIME ZONE 'tz'
            if min_bp <= 6
                && self.peek_ident(0, "AT")
                && self.peek_ident(1, "TIME")
                && self.peek_ident(2, "ZONE")
                && self.peek_nth_type(3) == Some(TokenType::String)
            {
                self.advance();
                self.advance();
                self.advance();
                let tz = self.expect(TokenType::String)?;
                left = Expression::AtTimeZone(Box::new(AtTimeZone {
                    this: left,
                    time_zone: tz.text,
                }));
                continue;
            }
            let Some(tt) = self.peek_type() else { break };
            let Some((bp, op)) = binding_power(tt) else {
                break;
            };
            if bp < min_bp {
                break;
            }
            self.advance();
            let right = self.parse_expr(bp + 1)?;
            left = Expression::BinaryOp(Box::new(BinaryOp { op, left, right }));
        }
        Ok(left)
    }

    fn parse_between(&mut self, this: Expression, not: bool) -> Result<Expression> {
        let low = self.parse_expr(5)?;
        self.expect(TokenType::And)?;
        let high = self.parse_expr(5)?;
        Ok(Expression::Between(Box::new(BetweenExpr {
            this,
            low,
            high,
            not,
        })))
    }

    fn parse_in(&mut self, this: Expression, not: bool) -> Result<Expression> {
        self.expect(TokenType::LParen)?;
        if self.check(TokenType::Select) {
            let subquery = self.parse_query()?;
            self.expect(TokenType::RParen)?;
            return Ok(Expression::InSubquery(Box::new(InSubquery {
                this,
                subquery,
                not,
            })));
        }
        let mut list = Vec::new();
        loop {
            list.push(self.parse_expr(0)?);
            if !self.eat(TokenType::Comma) {
                break;
            }
        }
        self.expect(TokenType::RParen)?;
        Ok(Expression::InList(Box::new(InList { this, list, not })))
    }

    fn parse_prefix(&mut self) -> Result<Expression> {
        match self.peek_type() {
            Some(TokenType::Number) => {
                let t = self.advance().expect("checked").clone();
                Ok(Expression::Literal(Literal::Number(t.text)))
            }
            Some(TokenType::String) => {
                let t = self.advance().expect("checked").clone();
                Ok(Expression::Literal(Literal::String(t.text)))
            }
            Some(TokenType::NationalString) => {
                let t = self.advance().expect("checked").clone();
                Ok(Expression::Literal(Literal::NationalString(t.text)))
            }
            Some(TokenType::Null) => {
                self.advance();
                Ok(Expression::Literal(Literal::Null))
            }
            Some(TokenType::Variable) => {
                let t = self.advance().expect("checked").clone();
                Ok(Expression::Variable(Box::new(Variable {
                    name: t.text,
                    span: Some(t.span),
                })))
            }
            Some(TokenType::SystemVariable) => {
                let t = self.advance().expect("checked").clone();
                Ok(Expression::SystemVariable(Box::new(Variable {
                    name: t.text,
                    span: Some(t.span),
                })))
            }
            Some(TokenType::Dash) => {
                self.advance();
                let this = self.parse_expr(7)?;
                Ok(Expression::UnaryOp(Box::new(UnaryOp {
                    op: UnaryOperator::Minus,
                    this,
                })))
            }
            Some(TokenType::Plus) => {
                self.advance();
                let this = self.parse_expr(7)?;
                Ok(Expression::UnaryOp(Box::new(UnaryOp {
                    op: UnaryOperator::Plus,
                    this,
                })))
            }
            Some(TokenType::Not) => {
                self.advance();
                let this = self.parse_expr(3)?;
                Ok(Expression::UnaryOp(Box::new(UnaryOp {
                    op: UnaryOperator::Not,
                    this,
                })))
            }
            Some(TokenType::Exists) => {
                self.advance();
                self.expect(TokenType::LParen)?;
                let subquery = self.parse_query()?;
                self.expect(TokenType::RParen)?;
                Ok(Expression::Exists(Box::new(ExistsExpr {
                    subquery,
                    not: false,
                })))
            }
            Some(TokenType::LParen) => {
                self.advance();
                if self.check(TokenType::Select) {
                    let subquery = self.parse_query()?;
                    self.expect(TokenType::RParen)?;
                    return Ok(Expression::Subquery(Box::new(subquery)));
                }
                let this = self.parse_expr(0)?;
                self.expect(TokenType::RParen)?;
                Ok(Expression::Paren(Box::new(Paren { this })))
            }
            Some(TokenType::Case) => self.parse_case(),
            Some(TokenType::Cast) => self.parse_cast(),
            Some(TokenType::Convert) => self.parse_convert(),
            Some(TokenType::Left) | Some(TokenType::Right)
                if self.peek_nth_type(1) == Some(TokenType::LParen) =>
            {
                // LEFT(s, n) / RIGHT(s, n) are function calls despite the
                // keyword collision with join syntax
                let t = self.advance().expect("checked").clone();
                self.parse_function_call(t.text, t.span)
            }
            Some(TokenType::Identifier) | Some(TokenType::QuotedIdentifier) => {
                self.parse_name_expression()
            }
            _ => match self.tokens.get(self.pos) {
                Some(t) => Err(Error::parse(format!(
                    "unexpected token `{}` in expression at line {}",
                    t.text, t.span.line
                ))),
                None => Err(Error::parse("unexpected end of input in expression")),
            },
        }
    }

    fn parse_case(&mut self) -> Result<Expression> {
        self.expect(TokenType::Case)?;
        let operand = if !self.check(TokenType::When) {
            Some(self.parse_expr(0)?)
        } else {
            None
        };
        let mut whens = Vec::new();
        while self.eat(TokenType::When) {
            let condition = self.parse_expr(0)?;
            self.expect(TokenType::Then)?;
            let result = self.parse_expr(0)?;
            whens.push(CaseWhen { condition, result });
        }
        if whens.is_empty() {
            return Err(Error::parse("CASE requires at least one WHEN branch"));
        }
        let else_result = if self.eat(TokenType::Else) {
            Some(self.parse_expr(0)?)
        } else {
            None
        };
        self.expect(TokenType::End)?;
        Ok(Expression::Case(Box::new(Case {
            operand,
            whens,
            else_result,
        })))
    }

    fn parse_cast(&mut self) -> Result<Expression> {
        self.expect(TokenType::Cast)?;
        self.expect(TokenType::LParen)?;
        let this = self.parse_expr(0)?;
        self.expect(TokenType::As)?;
        let to = self.parse_data_type()?;
        self.expect(TokenType::RParen)?;
        Ok(Expression::Cast(Box::new(Cast { this, to })))
    }

    fn parse_convert(&mut self) -> Result<Expression> {
        let span = self.current_span();
        self.expect(TokenType::Convert)?;
        self.expect(TokenType::LParen)?;
        let to = self.parse_data_type()?;
        self.expect(TokenType::Comma)?;
        let this = self.parse_expr(0)?;
        let style = if self.eat(TokenType::Comma) {
            Some(self.parse_expr(0)?)
        } else {
            None
        };
        self.expect(TokenType::RParen)?;
        Ok(Expression::Convert(Box::new(Convert {
            to,
            this,
            style,
            span,
        })))
    }

    /// True if the token at `self.pos + n` is the bare identifier `word`
    fn peek_ident(&self, n: usize, word: &str) -> bool {
        matches!(
            self.tokens.get(self.pos + n),
            Some(t) if t.token_type == TokenType::Identifier && t.text.eq_ignore_ascii_case(word)
        )
    }

    /// An identifier-led expression: column reference, qualified column,
    /// function call, or one of the literal-like keywords that tokenize as
    /// plain identifiers (`TRUE`, `FALSE`, `INTERVAL '...'`)
    fn parse_name_expression(&mut self) -> Result<Expression> {
        if self.peek_ident(0, "TRUE") && self.peek_nth_type(1) != Some(TokenType::LParen) {
            self.advance();
            return Ok(Expression::boolean(true));
        }
        if self.peek_ident(0, "FALSE") && self.peek_nth_type(1) != Some(TokenType::LParen) {
            self.advance();
            return Ok(Expression::boolean(false));
        }
        if self.peek_ident(0, "INTERVAL") && self.peek_nth_type(1) == Some(TokenType::String) {
            self.advance();
            let literal = self.expect(TokenType::String)?;
            let (value, unit) = match literal.text.split_once(' ') {
                Some((v, u)) => (v.to_string(), u.to_string()),
                None => (literal.text, String::new()),
            };
            return Ok(Expression::Interval(Box::new(Interval { value, unit })));
        }
        let first = self.parse_identifier()?;
        if self.check(TokenType::LParen) && !first.quoted {
            let span = first.span.unwrap_or_default();
            return self.parse_function_call(first.name, span);
        }
        if self.eat(TokenType::Dot) {
            let name = self.parse_identifier()?;
            return Ok(Expression::Column(Box::new(Column {
                qualifier: Some(first),
                name,
            })));
        }
        Ok(Expression::Column(Box::new(Column {
            qualifier: None,
            name: first,
        })))
    }

    fn parse_function_call(&mut self, name: String, span: Span) -> Result<Expression> {
        self.expect(TokenType::LParen)?;
        // POSITION and EXTRACT use keyword argument syntax
        if name.eq_ignore_ascii_case("POSITION") {
            let substring = self.parse_expr(5)?;
            self.expect(TokenType::In)?;
            let string = self.parse_expr(0)?;
            self.expect(TokenType::RParen)?;
            return Ok(Expression::Position(Box::new(Position { substring, string })));
        }
        if name.eq_ignore_ascii_case("EXTRACT") {
            let field = self.parse_identifier()?;
            self.expect(TokenType::From)?;
            let this = self.parse_expr(0)?;
            self.expect(TokenType::RParen)?;
            return Ok(Expression::Extract(Box::new(Extract {
                field: field.name,
                this,
            })));
        }
        let mut args = Vec::new();
        let mut distinct = false;
        if !self.check(TokenType::RParen) {
            distinct = self.eat(TokenType::Distinct);
            loop {
                if self.eat(TokenType::Star) {
                    args.push(Expression::Star(Box::new(Star { qualifier: None })));
                } else {
                    args.push(self.parse_expr(0)?);
                }
                if !self.eat(TokenType::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenType::RParen)?;
        let over = if self.check(TokenType::Over) {
            self.advance();
            self.expect(TokenType::LParen)?;
            let mut partition_by = Vec::new();
            if self.check(TokenType::Partition) {
                self.advance();
                self.expect(TokenType::By)?;
                loop {
                    partition_by.push(self.parse_expr(0)?);
                    if !self.eat(TokenType::Comma) {
                        break;
                    }
                }
            }
            let order_by = if self.check(TokenType::Order) {
                self.advance();
                self.expect(TokenType::By)?;
                self.parse_order_by_list()?
            } else {
                Vec::new()
            };
            self.expect(TokenType::RParen)?;
            Some(WindowSpec {
                partition_by,
                order_by,
            })
        } else {
            None
        };
        Ok(Expression::FunctionCall(Box::new(FunctionCall {
            name,
            args,
            distinct,
            no_parens: false,
            over,
            span: Some(span),
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(sql: &str) -> Vec<Expression> {
        let (statements, diagnostics) = Parser::parse(sql).expect("tokenize failed");
        assert!(
            diagnostics.is_empty(),
            "unexpected diagnostics: {:?}",
            diagnostics
        );
        statements
    }

    fn parse_one(sql: &str) -> Expression {
        let mut statements = parse_ok(sql);
        assert_eq!(statements.len(), 1, "expected one statement");
        statements.pop().expect("one statement")
    }

    #[test]
    fn select_with_top_and_brackets() {
        let stmt = parse_one("SELECT TOP (5) * FROM [dbo].[Employees]");
        let Expression::Select(select) = stmt else {
            panic!("expected select");
        };
        let top = select.top.expect("top");
        assert!(top.value.is_number("5"));
        assert!(!top.percent);
        let TableFactor::Table { name, .. } = &select.from[0].relation else {
            panic!("expected table");
        };
        assert_eq!(name.schema.as_ref().unwrap().name, "dbo");
        assert_eq!(name.name.name, "Employees");
        assert!(name.name.quoted);
    }

    #[test]
    fn select_case_expression() {
        let stmt = parse_one("SELECT CASE WHEN [Flag] = 1 THEN 'Y' ELSE 'N' END FROM t");
        let Expression::Select(select) = stmt else {
            panic!("expected select");
        };
        let Expression::Case(case) = &select.projection[0].expr else {
            panic!("expected case, got {:?}", select.projection[0].expr);
        };
        assert_eq!(case.whens.len(), 1);
        assert!(case.else_result.is_some());
    }

    #[test]
    fn window_function() {
        let stmt = parse_one(
            "SELECT ROW_NUMBER() OVER (PARTITION BY DeptId ORDER BY Salary DESC) FROM Emp",
        );
        let Expression::Select(select) = stmt else {
            panic!("expected select");
        };
        let Expression::FunctionCall(f) = &select.projection[0].expr else {
            panic!("expected function");
        };
        let over = f.over.as_ref().expect("window spec");
        assert_eq!(over.partition_by.len(), 1);
        assert!(over.order_by[0].desc);
    }

    #[test]
    fn joins() {
        let stmt = parse_one(
            "SELECT a.x, b.y FROM A a LEFT OUTER JOIN B b ON a.id = b.id CROSS JOIN C",
        );
        let Expression::Select(select) = stmt else {
            panic!("expected select");
        };
        assert_eq!(select.from[0].joins.len(), 2);
        assert_eq!(select.from[0].joins[0].kind, JoinKind::Left);
        assert_eq!(select.from[0].joins[1].kind, JoinKind::Cross);
        assert!(select.from[0].joins[1].on.is_none());
    }

    #[test]
    fn create_view() {
        let stmt = parse_one("CREATE OR ALTER VIEW [dbo].[V] AS SELECT 1 AS one");
        let Expression::CreateView(view) = stmt else {
            panic!("expected view");
        };
        assert!(view.or_alter);
        assert_eq!(view.name.name.name, "V");
    }

    #[test]
    fn create_procedure_with_params() {
        let stmt = parse_one(
            "CREATE PROCEDURE dbo.GetEmp @Id INT, @Name NVARCHAR(50) = N'x' OUTPUT AS \
             BEGIN SELECT @Id END",
        );
        let Expression::CreateProcedure(proc) = stmt else {
            panic!("expected procedure");
        };
        assert_eq!(proc.params.len(), 2);
        assert_eq!(proc.params[0].name, "Id");
        assert!(proc.params[1].output);
        assert!(proc.params[1].default.is_some());
        assert_eq!(proc.body.statements.len(), 1);
    }

    #[test]
    fn declare_and_set() {
        let statements = parse_ok("DECLARE @n INT = 0 SET @n = @n + 1");
        assert_eq!(statements.len(), 2);
        assert!(matches!(statements[0], Expression::Declare(_)));
        assert!(matches!(statements[1], Expression::SetVariable(_)));
    }

    #[test]
    fn multi_declare_becomes_block() {
        let stmt = parse_one("DECLARE @a INT, @b NVARCHAR(10)");
        let Expression::Block(block) = stmt else {
            panic!("expected block");
        };
        assert_eq!(block.statements.len(), 2);
    }

    #[test]
    fn try_catch() {
        let stmt = parse_one(
            "BEGIN TRY SELECT 1 END TRY BEGIN CATCH PRINT ERROR_MESSAGE() END CATCH",
        );
        let Expression::TryCatch(tc) = stmt else {
            panic!("expected try/catch");
        };
        assert_eq!(tc.try_body.statements.len(), 1);
        assert_eq!(tc.catch_body.statements.len(), 1);
    }

    #[test]
    fn transactions() {
        let statements = parse_ok("BEGIN TRANSACTION UPDATE T SET x = 1 COMMIT");
        assert_eq!(statements.len(), 3);
        assert!(matches!(statements[0], Expression::BeginTransaction(_)));
        assert!(matches!(statements[2], Expression::Commit(_)));
        assert!(statements.iter().all(|s| s.is_statement()));
    }

    #[test]
    fn cursor_statements() {
        let statements = parse_ok(
            "DECLARE c CURSOR FOR SELECT Id FROM T \
             OPEN c \
             FETCH NEXT FROM c INTO @Id \
             CLOSE c \
             DEALLOCATE c",
        );
        assert_eq!(statements.len(), 5);
        assert!(matches!(statements[0], Expression::DeclareCursor(_)));
        let Expression::FetchCursor(f) = &statements[2] else {
            panic!("expected fetch");
        };
        assert_eq!(f.into, vec!["Id".to_string()]);
    }

    #[test]
    fn unsupported_statement_recovers() {
        let (statements, diagnostics) =
            Parser::parse("MERGE INTO T USING S ON 1 = 1; SELECT 1").expect("tokenize");
        assert_eq!(statements.len(), 2);
        assert!(matches!(statements[0], Expression::Unparsed(_)));
        assert!(matches!(statements[1], Expression::Select(_)));
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].span.is_some());
    }

    #[test]
    fn comment_kept_on_unparsed_statement() {
        let (statements, diagnostics) =
            Parser::parse("-- merge step\nMERGE INTO T USING S ON 1 = 1;").expect("tokenize");
        assert_eq!(diagnostics.len(), 1);
        let Expression::Unparsed(u) = &statements[0] else {
            panic!("expected unparsed, got {:?}", statements[0]);
        };
        assert_eq!(u.comments, vec!["merge step".to_string()]);
    }

    #[test]
    fn for_xml_is_unsupported() {
        let (statements, diagnostics) =
            Parser::parse("SELECT Name FROM T FOR XML PATH('')").expect("tokenize");
        assert_eq!(statements.len(), 1);
        let Expression::Unparsed(u) = &statements[0] else {
            panic!("expected unparsed, got {:?}", statements[0]);
        };
        assert!(u.sql.contains("FOR XML"));
        assert!(diagnostics[0].message.contains("FOR XML"));
    }

    #[test]
    fn select_variable_assignment() {
        let stmt = parse_one("SELECT @Total = COUNT(*) FROM Orders");
        let Expression::Select(select) = stmt else {
            panic!("expected select");
        };
        assert_eq!(select.into_variables, vec!["Total".to_string()]);
    }

    #[test]
    fn set_nocount_dropped_with_warning() {
        let (statements, diagnostics) = Parser::parse("SET NOCOUNT ON SELECT 1").expect("tokenize");
        assert_eq!(statements.len(), 1);
        assert!(matches!(statements[0], Expression::Select(_)));
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].message.contains("NOCOUNT"));
    }

    #[test]
    fn operator_precedence() {
        let stmt = parse_one("SELECT 1 + 2 * 3");
        let Expression::Select(select) = stmt else {
            panic!("expected select");
        };
        let Expression::BinaryOp(op) = &select.projection[0].expr else {
            panic!("expected binary op");
        };
        assert_eq!(op.op, BinaryOperator::Plus);
        let Expression::BinaryOp(right) = &op.right else {
            panic!("expected nested multiply");
        };
        assert_eq!(right.op, BinaryOperator::Multiply);
    }

    #[test]
    fn union_query() {
        let stmt = parse_one("SELECT a FROM t UNION ALL SELECT a FROM u");
        assert!(matches!(stmt, Expression::Union(_)));
    }

    #[test]
    fn left_function_call() {
        let stmt = parse_one("SELECT LEFT(Name, 3) FROM T");
        let Expression::Select(select) = stmt else {
            panic!("expected select");
        };
        let Expression::FunctionCall(f) = &select.projection[0].expr else {
            panic!("expected function call");
        };
        assert_eq!(f.name, "LEFT");
        assert_eq!(f.args.len(), 2);
    }
}
