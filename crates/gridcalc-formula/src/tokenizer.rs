//! Formula tokenizer
//!
//! Splits formula text into [`Token`]s. References are recognized here rather
//! than in the parser, so a token already carries its parsed address, range
//! and sheet qualifier:
//!
//! ```text
//! A1  $B$2  A1:C5  Sheet1!A1  'My Sheet'!A1:B2  Jan:Dec!B3  'Q1:Q4'!C1
//! ```

use crate::ast::{CellReference, NameReference, RangeReference, SheetRef};
use crate::error::{FormulaError, FormulaResult};
use gridcalc_core::{CellAddress, CellError, CellRange};

/// Longest formula text accepted, in characters
pub const MAX_FORMULA_LEN: usize = 8192;

/// A token with the source text it was read from
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    /// Raw source text of the token
    pub text: String,
    /// Byte offset of the token in the formula text
    pub position: usize,
}

/// Token types
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    // Literals
    Number(f64),
    String(String),
    Boolean(bool),
    Error(CellError),

    // References and identifiers
    CellRef(CellReference),
    RangeRef(RangeReference),
    /// Defined name
    Identifier(String),
    /// Defined name behind a sheet qualifier, e.g. `Sheet2!Rate`
    QualifiedName(NameReference),
    /// Function name, always followed by `(`; upper-cased
    Function(String),

    // Operators
    Plus,
    Minus,
    Star,
    Slash,
    Caret,
    Percent,
    Ampersand,
    Equal,
    NotEqual,
    LessThan,
    LessEqual,
    GreaterThan,
    GreaterEqual,
    Colon,

    // Punctuation
    Comma,
    Semicolon,
    LeftParen,
    RightParen,
    LeftBrace,
    RightBrace,
}

/// Split formula text into tokens
///
/// A leading `=` is optional and skipped. Whitespace between tokens is
/// ignored.
///
/// # Example
/// ```rust
/// use gridcalc_formula::{tokenize, TokenKind};
///
/// let tokens = tokenize("=SUM(A1:B2)").unwrap();
/// assert_eq!(tokens[0].kind, TokenKind::Function("SUM".into()));
/// assert_eq!(tokens[2].text, "A1:B2");
/// assert_eq!(tokens[2].position, 5);
/// ```
pub fn tokenize(text: &str) -> FormulaResult<Vec<Token>> {
    if text.chars().count() > MAX_FORMULA_LEN {
        return Err(FormulaError::lex(
            0,
            format!("formula is longer than {} characters", MAX_FORMULA_LEN),
        ));
    }

    let mut lexer = Lexer {
        input: text,
        pos: 0,
        tokens: Vec::new(),
    };
    lexer.skip_whitespace();
    if lexer.peek_char() == Some('=') {
        lexer.advance();
    }
    lexer.run()?;
    Ok(lexer.tokens)
}

fn is_word_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == '\\' || c == '$'
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '.' || c == '\\' || c == '$'
}

/// A word that reads as an A1 address within the sheet limits
fn coordinate(word: &str) -> Option<CellAddress> {
    CellAddress::parse(word).ok()
}

struct Lexer<'a> {
    input: &'a str,
    pos: usize,
    tokens: Vec<Token>,
}

impl<'a> Lexer<'a> {
    fn run(&mut self) -> FormulaResult<()> {
        loop {
            self.skip_whitespace();
            let start = self.pos;
            let Some(c) = self.peek_char() else {
                return Ok(());
            };

            let kind = match c {
                '+' => self.single(TokenKind::Plus),
                '-' => self.single(TokenKind::Minus),
                '*' => self.single(TokenKind::Star),
                '/' => self.single(TokenKind::Slash),
                '^' => self.single(TokenKind::Caret),
                '%' => self.single(TokenKind::Percent),
                '&' => self.single(TokenKind::Ampersand),
                '=' => self.single(TokenKind::Equal),
                ':' => self.single(TokenKind::Colon),
                ',' => self.single(TokenKind::Comma),
                ';' => self.single(TokenKind::Semicolon),
                '(' => self.single(TokenKind::LeftParen),
                ')' => self.single(TokenKind::RightParen),
                '{' => self.single(TokenKind::LeftBrace),
                '}' => self.single(TokenKind::RightBrace),
                '<' => {
                    self.advance();
                    if self.eat('=') {
                        TokenKind::LessEqual
                    } else if self.eat('>') {
                        TokenKind::NotEqual
                    } else {
                        TokenKind::LessThan
                    }
                }
                '>' => {
                    self.advance();
                    if self.eat('=') {
                        TokenKind::GreaterEqual
                    } else {
                        TokenKind::GreaterThan
                    }
                }
                '"' => self.scan_string(start)?,
                '#' => self.scan_error(start)?,
                '\'' => self.scan_quoted_reference(start)?,
                c if c.is_ascii_digit()
                    || (c == '.' && self.peek_char_at(1).map_or(false, |d| d.is_ascii_digit())) =>
                {
                    self.scan_number(start)?
                }
                c if is_word_start(c) => self.scan_word(start)?,
                other => {
                    return Err(FormulaError::lex(
                        start,
                        format!("unrecognized character '{}'", other),
                    ))
                }
            };

            self.tokens.push(Token {
                kind,
                text: self.input[start..self.pos].to_string(),
                position: start,
            });
        }
    }

    // === Scanners ===

    fn scan_string(&mut self, start: usize) -> FormulaResult<TokenKind> {
        self.advance(); // Skip opening quote

        let mut s = String::new();
        loop {
            match self.peek_char() {
                None => return Err(FormulaError::lex(start, "unterminated string literal")),
                Some('"') => {
                    self.advance();
                    // "" is an escaped quote
                    if self.eat('"') {
                        s.push('"');
                    } else {
                        return Ok(TokenKind::String(s));
                    }
                }
                Some(c) => {
                    s.push(c);
                    self.advance();
                }
            }
        }
    }

    fn scan_number(&mut self, start: usize) -> FormulaResult<TokenKind> {
        self.skip_digits();
        if self.eat('.') {
            self.skip_digits();
        }

        if matches!(self.peek_char(), Some('e' | 'E')) {
            let signed = matches!(self.peek_char_at(1), Some('+' | '-'));
            let digit_at = if signed { 2 } else { 1 };
            if !self.peek_char_at(digit_at).map_or(false, |c| c.is_ascii_digit()) {
                return Err(FormulaError::lex(
                    start,
                    format!("invalid numeric literal '{}'", self.rest_of_word(start)),
                ));
            }
            for _ in 0..digit_at {
                self.advance();
            }
            self.skip_digits();
        }

        if self.peek_char().map_or(false, is_word_char) {
            return Err(FormulaError::lex(
                start,
                format!("invalid numeric literal '{}'", self.rest_of_word(start)),
            ));
        }

        let text = &self.input[start..self.pos];
        match text.parse::<f64>() {
            Ok(n) if n.is_finite() => Ok(TokenKind::Number(n)),
            Ok(_) => Err(FormulaError::lex(
                start,
                format!("numeric literal '{}' is out of range", text),
            )),
            Err(_) => Err(FormulaError::lex(
                start,
                format!("invalid numeric literal '{}'", text),
            )),
        }
    }

    fn scan_error(&mut self, start: usize) -> FormulaResult<TokenKind> {
        self.advance(); // Skip '#'
        while self
            .peek_char()
            .map_or(false, |c| c.is_ascii_alphanumeric() || c == '/')
        {
            self.advance();
        }
        if matches!(self.peek_char(), Some('!' | '?')) {
            self.advance();
        }

        let text = &self.input[start..self.pos];
        CellError::parse(text)
            .map(TokenKind::Error)
            .ok_or_else(|| FormulaError::lex(start, format!("unknown error literal '{}'", text)))
    }

    fn scan_quoted_reference(&mut self, start: usize) -> FormulaResult<TokenKind> {
        self.advance(); // Skip opening quote

        let mut name = String::new();
        loop {
            match self.peek_char() {
                None => return Err(FormulaError::lex(start, "unterminated quoted sheet name")),
                Some('\'') => {
                    self.advance();
                    // '' is an escaped quote
                    if self.eat('\'') {
                        name.push('\'');
                    } else {
                        break;
                    }
                }
                Some(c) => {
                    name.push(c);
                    self.advance();
                }
            }
        }

        if !self.eat('!') {
            return Err(FormulaError::lex(self.pos, "expected '!' after quoted sheet name"));
        }

        let sheet = match name.split_once(':') {
            Some((first, last)) if !first.is_empty() && !last.is_empty() => {
                SheetRef::Span(first.to_string(), last.to_string())
            }
            None if !name.is_empty() => SheetRef::Single(name),
            _ => return Err(FormulaError::lex(start, "empty sheet name")),
        };
        self.scan_qualified(Some(sheet))
    }

    fn scan_word(&mut self, start: usize) -> FormulaResult<TokenKind> {
        let end = self.word_end(start);
        let word = &self.input[start..end];
        self.pos = end;

        match self.peek_char() {
            Some('!') => {
                if word.contains('$') {
                    return Err(FormulaError::lex(start, format!("invalid sheet name '{}'", word)));
                }
                self.advance();
                return self.scan_qualified(Some(SheetRef::Single(word.to_string())));
            }
            Some(':') => {
                // Jan:Dec!B3
                if let Some(last_end) = self.word_at(self.pos + 1) {
                    if self.input[last_end..].starts_with('!') && !word.contains('$') {
                        let last = self.input[self.pos + 1..last_end].to_string();
                        self.pos = last_end + 1;
                        return self.scan_qualified(Some(SheetRef::Span(word.to_string(), last)));
                    }
                }
                // A1:B2
                if let Some(first) = coordinate(word) {
                    if let Some(second) = self.range_tail() {
                        return Ok(TokenKind::RangeRef(RangeReference {
                            sheet: None,
                            range: CellRange::new(first, second),
                        }));
                    }
                }
            }
            Some('(') => return Ok(TokenKind::Function(word.to_uppercase())),
            _ => {}
        }

        if let Some(address) = coordinate(word) {
            return Ok(TokenKind::CellRef(CellReference {
                sheet: None,
                address,
            }));
        }
        if word.eq_ignore_ascii_case("TRUE") {
            return Ok(TokenKind::Boolean(true));
        }
        if word.eq_ignore_ascii_case("FALSE") {
            return Ok(TokenKind::Boolean(false));
        }
        if word.contains('$') {
            return Err(FormulaError::lex(start, format!("invalid reference '{}'", word)));
        }
        Ok(TokenKind::Identifier(word.to_string()))
    }

    /// The part after a sheet qualifier: `A1`, `A1:B2` or a name
    fn scan_qualified(&mut self, sheet: Option<SheetRef>) -> FormulaResult<TokenKind> {
        let start = self.pos;
        let address = self
            .word_at(start)
            .and_then(|end| coordinate(&self.input[start..end]).map(|a| (a, end)));
        let Some((address, end)) = address else {
            return self.qualified_name(start, sheet);
        };
        self.pos = end;

        match self.range_tail() {
            Some(second) => Ok(TokenKind::RangeRef(RangeReference {
                sheet,
                range: CellRange::new(address, second),
            })),
            None => Ok(TokenKind::CellRef(CellReference { sheet, address })),
        }
    }

    /// A name scoped to one sheet, such as `Sheet2!Rate`
    fn qualified_name(&mut self, start: usize, sheet: Option<SheetRef>) -> FormulaResult<TokenKind> {
        let invalid = || {
            FormulaError::lex(start, "expected a cell reference or name after the sheet name")
        };
        let Some(sheet @ SheetRef::Single(_)) = sheet else {
            return Err(invalid());
        };
        let end = self.word_at(start).ok_or_else(invalid)?;
        let word = &self.input[start..end];
        let next = self.input[end..].chars().next();
        if word.contains('$')
            || matches!(next, Some('(' | '!' | ':'))
            || word.eq_ignore_ascii_case("TRUE")
            || word.eq_ignore_ascii_case("FALSE")
        {
            return Err(invalid());
        }
        self.pos = end;
        Ok(TokenKind::QualifiedName(NameReference {
            sheet: Some(sheet),
            name: word.to_string(),
        }))
    }

    /// Consume `:B2` when it completes a range; leave input alone otherwise
    fn range_tail(&mut self) -> Option<CellAddress> {
        if self.peek_char() != Some(':') {
            return None;
        }
        let start = self.pos + 1;
        let end = self.word_at(start)?;
        if matches!(self.input[end..].chars().next(), Some('!' | '(')) {
            return None;
        }
        let address = coordinate(&self.input[start..end])?;
        self.pos = end;
        Some(address)
    }

    // === Helper methods ===

    /// End offset of a word starting at `from`, if one starts there
    fn word_at(&self, from: usize) -> Option<usize> {
        self.input[from..]
            .chars()
            .next()
            .filter(|&c| is_word_start(c))
            .map(|_| self.word_end(from))
    }

    fn word_end(&self, from: usize) -> usize {
        self.input[from..]
            .char_indices()
            .find(|&(_, c)| !is_word_char(c))
            .map_or(self.input.len(), |(i, _)| from + i)
    }

    fn rest_of_word(&self, start: usize) -> &str {
        let end = self.input[start..]
            .char_indices()
            .find(|&(_, c)| !(is_word_char(c) || c == '+' || c == '-'))
            .map_or(self.input.len(), |(i, _)| start + i);
        &self.input[start..end]
    }

    fn single(&mut self, kind: TokenKind) -> TokenKind {
        self.advance();
        kind
    }

    fn skip_digits(&mut self) {
        while self.peek_char().map_or(false, |c| c.is_ascii_digit()) {
            self.advance();
        }
    }

    fn peek_char(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn peek_char_at(&self, offset: usize) -> Option<char> {
        self.input[self.pos..].chars().nth(offset)
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek_char() == Some(expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn advance(&mut self) {
        if let Some(c) = self.peek_char() {
            self.pos += c.len_utf8();
        }
    }

    fn skip_whitespace(&mut self) {
        while self.peek_char().map_or(false, char::is_whitespace) {
            self.advance();
        }
    }
}
