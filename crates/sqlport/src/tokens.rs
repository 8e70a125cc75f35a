//! Token types and tokenization for the T-SQL surface.
//!
//! The tokenizer is total over recognizable input: characters it does not
//! understand become [`TokenType::Unknown`] tokens consumed by downstream
//! diagnostics instead of aborting the run. Only unterminated constructs
//! (string literal, block comment, bracketed identifier) are hard errors,
//! since no token stream can be recovered past them.
//!
//! Comments are kept as trivia: a `--` or `/* */` comment is attached as a
//! leading comment of the token that follows it, which lets the emitter
//! reinsert it adjacent to its original statement.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::LazyLock;

/// Represents a position in the source SQL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Span {
    /// Starting character offset
    pub start: usize,
    /// Ending character offset (exclusive)
    pub end: usize,
    /// Line number (1-based)
    pub line: usize,
    /// Column number (1-based)
    pub column: usize,
}

impl Span {
    pub fn new(start: usize, end: usize, line: usize, column: usize) -> Self {
        Self { start, end, line, column }
    }

    /// Smallest span covering both `self` and `other`
    pub fn union(self, other: Span) -> Span {
        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
            line: self.line.min(other.line),
            column: if other.line < self.line { other.column } else { self.column },
        }
    }
}

/// A token in the T-SQL token stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    /// The type of token
    pub token_type: TokenType,
    /// The token text. For quoted identifiers and string literals this is
    /// the unescaped content, without the delimiters.
    pub text: String,
    /// Position information
    pub span: Span,
    /// Comments that appeared before this token
    #[serde(default)]
    pub comments: Vec<String>,
}

impl Token {
    pub fn new(token_type: TokenType, text: impl Into<String>, span: Span) -> Self {
        Self {
            token_type,
            text: text.into(),
            span,
            comments: Vec::new(),
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({})", self.token_type, self.text)
    }
}

/// All token types sqlport distinguishes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TokenType {
    // Punctuation and operators
    LParen,
    RParen,
    Comma,
    Dot,
    Semicolon,
    Plus,
    Dash,
    Star,
    Slash,
    Percent,
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
    /// `||`
    Concat,

    // Literals and names
    String,
    NationalString,
    Number,
    Identifier,
    /// `[Name]` or `"Name"`; text holds the unescaped identifier
    QuotedIdentifier,
    /// `@name`; text holds the name without the sigil
    Variable,
    /// `@@name`; text holds the name without the sigils
    SystemVariable,

    // Keywords
    All,
    Alter,
    And,
    As,
    Asc,
    Begin,
    Between,
    By,
    Case,
    Cast,
    Catch,
    Close,
    Commit,
    Convert,
    Create,
    Cross,
    Cursor,
    Deallocate,
    Declare,
    Default,
    Delete,
    Desc,
    Distinct,
    Else,
    End,
    Exec,
    Exists,
    Fetch,
    For,
    From,
    Full,
    Function,
    Go,
    Group,
    Having,
    Identity,
    If,
    In,
    Inner,
    Insert,
    Into,
    Is,
    Join,
    Left,
    Like,
    Limit,
    Next,
    Not,
    Null,
    On,
    Open,
    Or,
    Order,
    Outer,
    Output,
    Over,
    Partition,
    Percent_,
    Print,
    Procedure,
    Return,
    Returns,
    Right,
    Rollback,
    Select,
    Set,
    Table,
    Then,
    Ties,
    Top,
    Transaction,
    Try,
    Union,
    Update,
    Values,
    View,
    When,
    Where,
    While,
    With,

    /// A character the tokenizer does not recognize
    Unknown,
}

/// Keyword lookup table, uppercase name -> token type
static KEYWORDS: LazyLock<HashMap<&'static str, TokenType>> = LazyLock::new(|| {
    use TokenType::*;
    HashMap::from([
        ("ALL", All),
        ("ALTER", Alter),
        ("AND", And),
        ("AS", As),
        ("ASC", Asc),
        ("BEGIN", Begin),
        ("BETWEEN", Between),
        ("BY", By),
        ("CASE", Case),
        ("CAST", Cast),
        ("CATCH", Catch),
        ("CLOSE", Close),
        ("COMMIT", Commit),
        ("CONVERT", Convert),
        ("CREATE", Create),
        ("CROSS", Cross),
        ("CURSOR", Cursor),
        ("DEALLOCATE", Deallocate),
        ("DECLARE", Declare),
        ("DEFAULT", Default),
        ("DELETE", Delete),
        ("DESC", Desc),
        ("DISTINCT", Distinct),
        ("ELSE", Else),
        ("END", End),
        ("EXEC", Exec),
        ("EXECUTE", Exec),
        ("EXISTS", Exists),
        ("FETCH", Fetch),
        ("FOR", For),
        ("FROM", From),
        ("FULL", Full),
        ("FUNCTION", Function),
        ("GO", Go),
        ("GROUP", Group),
        ("HAVING", Having),
        ("IDENTITY", Identity),
        ("IF", If),
        ("IN", In),
        ("INNER", Inner),
        ("INSERT", Insert),
        ("INTO", Into),
        ("IS", Is),
        ("JOIN", Join),
        ("LEFT", Left),
        ("LIKE", Like),
        ("LIMIT", Limit),
        ("NEXT", Next),
        ("NOT", Not),
        ("NULL", Null),
        ("ON", On),
        ("OPEN", Open),
        ("OR", Or),
        ("ORDER", Order),
        ("OUTER", Outer),
        ("OUTPUT", Output),
        ("OVER", Over),
        ("PARTITION", Partition),
        ("PERCENT", Percent_),
        ("PRINT", Print),
        ("PROC", Procedure),
        ("PROCEDURE", Procedure),
        ("RETURN", Return),
        ("RETURNS", Returns),
        ("RIGHT", Right),
        ("ROLLBACK", Rollback),
        ("SELECT", Select),
        ("SET", Set),
        ("TABLE", Table),
        ("THEN", Then),
        ("TIES", Ties),
        ("TOP", Top),
        ("TRAN", Transaction),
        ("TRANSACTION", Transaction),
        ("TRY", Try),
        ("UNION", Union),
        ("UPDATE", Update),
        ("VALUES", Values),
        ("VIEW", View),
        ("WHEN", When),
        ("WHERE", Where),
        ("WHILE", While),
        ("WITH", With),
    ])
});

/// The T-SQL tokenizer
#[derive(Debug, Default)]
pub struct Tokenizer;

impl Tokenizer {
    pub fn new() -> Self {
        Self
    }

    /// Tokenize a T-SQL string
    pub fn tokenize(&self, sql: &str) -> Result<Vec<Token>> {
        let mut state = TokenizerState::new(sql);
        state.tokenize()
    }
}

/// Internal state for tokenization
struct TokenizerState {
    chars: Vec<char>,
    size: usize,
    tokens: Vec<Token>,
    start: usize,
    current: usize,
    line: usize,
    column: usize,
    start_line: usize,
    start_column: usize,
    /// Comments waiting to be attached to the next token
    pending_comments: Vec<String>,
}

impl TokenizerState {
    fn new(sql: &str) -> Self {
        let chars: Vec<char> = sql.chars().collect();
        let size = chars.len();
        Self {
            chars,
            size,
            tokens: Vec::new(),
            start: 0,
            current: 0,
            line: 1,
            column: 1,
            start_line: 1,
            start_column: 1,
            pending_comments: Vec::new(),
        }
    }

    fn tokenize(&mut self) -> Result<Vec<Token>> {
        while !self.is_at_end() {
            self.skip_whitespace()?;
            if self.is_at_end() {
                break;
            }
            self.start = self.current;
            self.start_line = self.line;
            self.start_column = self.column;
            self.scan_token()?;
        }
        Ok(std::mem::take(&mut self.tokens))
    }

    fn is_at_end(&self) -> bool {
        self.current >= self.size
    }

    fn peek(&self) -> char {
        if self.is_at_end() {
            '\0'
        } else {
            self.chars[self.current]
        }
    }

    fn peek_next(&self) -> char {
        if self.current + 1 >= self.size {
            '\0'
        } else {
            self.chars[self.current + 1]
        }
    }

    fn advance(&mut self) -> char {
        let c = self.peek();
        self.current += 1;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        c
    }

    fn skip_whitespace(&mut self) -> Result<()> {
        loop {
            match self.peek() {
                ' ' | '\t' | '\r' | '\n' | '\u{00A0}' | '\u{FEFF}' => {
                    self.advance();
                }
                '-' if self.peek_next() == '-' => {
                    self.scan_line_comment();
                }
                '/' if self.peek_next() == '*' => {
                    self.scan_block_comment()?;
                }
                _ => return Ok(()),
            }
        }
    }

    fn scan_line_comment(&mut self) {
        self.advance(); // -
        self.advance(); // -
        let start = self.current;
        while !self.is_at_end() && self.peek() != '\n' {
            self.advance();
        }
        let comment: String = self.chars[start..self.current].iter().collect();
        self.pending_comments.push(comment.trim().to_string());
    }

    fn scan_block_comment(&mut self) -> Result<()> {
        let (line, column) = (self.line, self.column);
        self.advance(); // /
        self.advance(); // *
        let start = self.current;
        while !self.is_at_end() {
            if self.peek() == '*' && self.peek_next() == '/' {
                let comment: String = self.chars[start..self.current].iter().collect();
                self.advance();
                self.advance();
                self.pending_comments.push(comment.trim().to_string());
                return Ok(());
            }
            self.advance();
        }
        Err(Error::tokenize("unterminated block comment", line, column))
    }

    fn add_token(&mut self, token_type: TokenType, text: impl Into<String>) {
        let span = Span::new(self.start, self.current, self.start_line, self.start_column);
        let mut token = Token::new(token_type, text, span);
        token.comments = std::mem::take(&mut self.pending_comments);
        self.tokens.push(token);
    }

    fn scan_token(&mut self) -> Result<()> {
        let c = self.advance();
        match c {
            '(' => self.add_token(TokenType::LParen, "("),
            ')' => self.add_token(TokenType::RParen, ")"),
            ',' => self.add_token(TokenType::Comma, ","),
            ';' => self.add_token(TokenType::Semicolon, ";"),
            '+' => self.add_token(TokenType::Plus, "+"),
            '-' => self.add_token(TokenType::Dash, "-"),
            '*' => self.add_token(TokenType::Star, "*"),
            '/' => self.add_token(TokenType::Slash, "/"),
            '%' => self.add_token(TokenType::Percent, "%"),
            '=' => self.add_token(TokenType::Eq, "="),
            '.' => {
                if self.peek().is_ascii_digit() {
                    self.scan_number(true)
                } else {
                    self.add_token(TokenType::Dot, ".")
                }
            }
            '<' => match self.peek() {
                '>' => {
                    self.advance();
                    self.add_token(TokenType::Neq, "<>");
                }
                '=' => {
                    self.advance();
                    self.add_token(TokenType::Lte, "<=");
                }
                _ => self.add_token(TokenType::Lt, "<"),
            },
            '>' => {
                if self.peek() == '=' {
                    self.advance();
                    self.add_token(TokenType::Gte, ">=");
                } else {
                    self.add_token(TokenType::Gt, ">");
                }
            }
            '!' => {
                if self.peek() == '=' {
                    self.advance();
                    self.add_token(TokenType::Neq, "!=");
                } else {
                    self.add_token(TokenType::Unknown, "!");
                }
            }
            '|' => {
                if self.peek() == '|' {
                    self.advance();
                    self.add_token(TokenType::Concat, "||");
                } else {
                    self.add_token(TokenType::Unknown, "|");
                }
            }
            '\'' => self.scan_string(TokenType::String)?,
            '[' => self.scan_bracketed_identifier()?,
            '"' => self.scan_double_quoted_identifier()?,
            '@' => self.scan_variable(),
            'N' | 'n' if self.peek() == '\'' => {
                self.advance(); // '
                self.scan_string(TokenType::NationalString)?;
            }
            c if c.is_ascii_digit() => {
                self.current -= 1;
                self.column -= 1;
                self.scan_number(false);
            }
            c if is_identifier_start(c) => {
                self.scan_identifier_or_keyword();
            }
            other => self.add_token(TokenType::Unknown, other.to_string()),
        }
        Ok(())
    }

    /// Scan a single-quoted string. The opening quote (and `N` prefix, if
    /// any) has already been consumed. Doubled quotes are an escape.
    fn scan_string(&mut self, token_type: TokenType) -> Result<()> {
        let (line, column) = (self.start_line, self.start_column);
        let mut content = String::new();
        loop {
            if self.is_at_end() {
                return Err(Error::tokenize("unterminated string literal", line, column));
            }
            let c = self.advance();
            if c == '\'' {
                if self.peek() == '\'' {
                    self.advance();
                    content.push('\'');
                } else {
                    break;
                }
            } else {
                content.push(c);
            }
        }
        self.add_token(token_type, content);
        Ok(())
    }

    /// Scan `[...]`. T-SQL has no array subscripts, so `[` always opens an
    /// identifier quote. Doubled `]]` is an escaped closing bracket.
    fn scan_bracketed_identifier(&mut self) -> Result<()> {
        let (line, column) = (self.start_line, self.start_column);
        let mut content = String::new();
        loop {
            if self.is_at_end() {
                return Err(Error::tokenize(
                    "unterminated bracketed identifier",
                    line,
                    column,
                ));
            }
            let c = self.advance();
            if c == ']' {
                if self.peek() == ']' {
                    self.advance();
                    content.push(']');
                } else {
                    break;
                }
            } else {
                content.push(c);
            }
        }
        self.add_token(TokenType::QuotedIdentifier, content);
        Ok(())
    }

    /// Scan `"..."` (QUOTED_IDENTIFIER ON). Doubled `""` is an escape.
    fn scan_double_quoted_identifier(&mut self) -> Result<()> {
        let (line, column) = (self.start_line, self.start_column);
        let mut content = String::new();
        loop {
            if self.is_at_end() {
                return Err(Error::tokenize("unterminated quoted identifier", line, column));
            }
            let c = self.advance();
            if c == '"' {
                if self.peek() == '"' {
                    self.advance();
                    content.push('"');
                } else {
                    break;
                }
            } else {
                content.push(c);
            }
        }
        self.add_token(TokenType::QuotedIdentifier, content);
        Ok(())
    }

    /// Scan `@name` or `@@name`
    fn scan_variable(&mut self) {
        let system = self.peek() == '@';
        if system {
            self.advance();
        }
        let name_start = self.current;
        while is_identifier_part(self.peek()) {
            self.advance();
        }
        let name: String = self.chars[name_start..self.current].iter().collect();
        if name.is_empty() {
            self.add_token(TokenType::Unknown, if system { "@@" } else { "@" });
        } else if system {
            self.add_token(TokenType::SystemVariable, name);
        } else {
            self.add_token(TokenType::Variable, name);
        }
    }

    fn scan_number(&mut self, seen_dot: bool) {
        let mut has_dot = seen_dot;
        while !self.is_at_end() {
            let c = self.peek();
            if c.is_ascii_digit() {
                self.advance();
            } else if c == '.' && !has_dot && self.peek_next() != '.' {
                has_dot = true;
                self.advance();
            } else if (c == 'e' || c == 'E')
                && (self.peek_next().is_ascii_digit()
                    || ((self.peek_next() == '+' || self.peek_next() == '-')
                        && self.current + 2 < self.size
                        && self.chars[self.current + 2].is_ascii_digit()))
            {
                self.advance(); // e
                self.advance(); // sign or first digit
                while self.peek().is_ascii_digit() {
                    self.advance();
                }
                break;
            } else {
                break;
            }
        }
        let text: String = self.chars[self.start..self.current].iter().collect();
        self.add_token(TokenType::Number, text);
    }

    fn scan_identifier_or_keyword(&mut self) {
        while is_identifier_part(self.peek()) {
            self.advance();
        }
        let text: String = self.chars[self.start..self.current].iter().collect();
        let upper = text.to_uppercase();
        match KEYWORDS.get(upper.as_str()) {
            Some(&token_type) => self.add_token(token_type, text),
            None => self.add_token(TokenType::Identifier, text),
        }
    }
}

fn is_identifier_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == '#'
}

fn is_identifier_part(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$' || c == '#'
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokenize(sql: &str) -> Vec<Token> {
        Tokenizer::new().tokenize(sql).expect("tokenize failed")
    }

    fn types(sql: &str) -> Vec<TokenType> {
        tokenize(sql).into_iter().map(|t| t.token_type).collect()
    }

    #[test]
    fn basic_select() {
        assert_eq!(
            types("SELECT a FROM t"),
            vec![
                TokenType::Select,
                TokenType::Identifier,
                TokenType::From,
                TokenType::Identifier
            ]
        );
    }

    #[test]
    fn bracketed_identifier_preserves_case() {
        let tokens = tokenize("[Employee Name]");
        assert_eq!(tokens[0].token_type, TokenType::QuotedIdentifier);
        assert_eq!(tokens[0].text, "Employee Name");
    }

    #[test]
    fn doubled_closing_bracket_is_escape() {
        let tokens = tokenize("[a]]b]");
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].text, "a]b");
    }

    #[test]
    fn doubled_single_quote_is_escape_not_terminator() {
        let tokens = tokenize("'it''s'");
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].token_type, TokenType::String);
        assert_eq!(tokens[0].text, "it's");
    }

    #[test]
    fn national_string() {
        let tokens = tokenize("N'héllo'");
        assert_eq!(tokens[0].token_type, TokenType::NationalString);
        assert_eq!(tokens[0].text, "héllo");
    }

    #[test]
    fn variables() {
        let tokens = tokenize("@Total @@FETCH_STATUS");
        assert_eq!(tokens[0].token_type, TokenType::Variable);
        assert_eq!(tokens[0].text, "Total");
        assert_eq!(tokens[1].token_type, TokenType::SystemVariable);
        assert_eq!(tokens[1].text, "FETCH_STATUS");
    }

    #[test]
    fn comments_attach_to_following_token() {
        let tokens = tokenize("-- header\nSELECT 1");
        assert_eq!(tokens[0].token_type, TokenType::Select);
        assert_eq!(tokens[0].comments, vec!["header".to_string()]);
    }

    #[test]
    fn block_comment_trivia() {
        let tokens = tokenize("/* note */ SELECT 1");
        assert_eq!(tokens[0].comments, vec!["note".to_string()]);
    }

    #[test]
    fn unknown_character_becomes_token() {
        let tokens = tokenize("SELECT ^ 1");
        assert_eq!(tokens[1].token_type, TokenType::Unknown);
        assert_eq!(tokens[1].text, "^");
    }

    #[test]
    fn unterminated_string_is_fatal() {
        let err = Tokenizer::new().tokenize("SELECT 'abc").unwrap_err();
        assert!(err.to_string().contains("unterminated string"));
    }

    #[test]
    fn numbers() {
        let tokens = tokenize("1 2.5 .75 1e6");
        let texts: Vec<&str> = tokens.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, vec!["1", "2.5", ".75", "1e6"]);
        assert!(tokens.iter().all(|t| t.token_type == TokenType::Number));
    }

    #[test]
    fn operators() {
        assert_eq!(
            types("a <> b != c <= d >= e"),
            vec![
                TokenType::Identifier,
                TokenType::Neq,
                TokenType::Identifier,
                TokenType::Neq,
                TokenType::Identifier,
                TokenType::Lte,
                TokenType::Identifier,
                TokenType::Gte,
                TokenType::Identifier,
            ]
        );
    }

    #[test]
    fn spans_track_lines() {
        let tokens = tokenize("SELECT\n  a");
        assert_eq!(tokens[1].span.line, 2);
        assert_eq!(tokens[1].span.column, 3);
    }

    #[test]
    fn temp_table_name() {
        let tokens = tokenize("#tmp");
        assert_eq!(tokens[0].token_type, TokenType::Identifier);
        assert_eq!(tokens[0].text, "#tmp");
    }
}
