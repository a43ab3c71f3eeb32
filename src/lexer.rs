//! Tokenizer and cursor shared by the text voice formats.
//!
//! The formats differ in what counts as a separator and where line breaks
//! matter, so the lexer only splits the input into coarse tokens and keeps
//! their positions. Grammars are written against [`Tokens`].

use std::fmt;

use crate::{error::FormatError, instrument::FmOperator};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// Run of spaces and tabs. A lone `\r` counts as space.
    Space,
    Comma,
    /// Run of ASCII digits.
    Number,
    /// Run of alphabetic characters.
    Word,
    /// Any other single character.
    Punct(char),
    /// `\n` or `\r\n`.
    Eol,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token<'a> {
    pub kind: TokenKind,
    pub text: &'a str,
    /// 1-based.
    pub line: usize,
    /// 1-based, in characters.
    pub column: usize,
}

impl fmt::Display for Token<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.kind {
            TokenKind::Eol => f.write_str("end of line"),
            TokenKind::Space => f.write_str("whitespace"),
            _ => write!(f, "'{}'", self.text),
        }
    }
}

fn continues_run(kind: TokenKind, c: char) -> bool {
    match kind {
        TokenKind::Space => matches!(c, ' ' | '\t' | '\r'),
        TokenKind::Number => c.is_ascii_digit(),
        TokenKind::Word => c.is_alphabetic(),
        _ => false,
    }
}

pub fn tokenize(input: &str) -> Vec<Token<'_>> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();
    let (mut line, mut column) = (1, 1);

    while let Some((start, c)) = chars.next() {
        let kind = match c {
            '\n' => TokenKind::Eol,
            '\r' if matches!(chars.peek(), Some(&(_, '\n'))) => {
                chars.next();
                TokenKind::Eol
            }
            ' ' | '\t' | '\r' => TokenKind::Space,
            ',' => TokenKind::Comma,
            c if c.is_ascii_digit() => TokenKind::Number,
            c if c.is_alphabetic() => TokenKind::Word,
            c => TokenKind::Punct(c),
        };
        while chars
            .next_if(|&(_, next)| continues_run(kind, next))
            .is_some()
        {}
        let end = chars.peek().map_or(input.len(), |&(i, _)| i);
        let text = &input[start..end];

        tokens.push(Token {
            kind,
            text,
            line,
            column,
        });
        if kind == TokenKind::Eol {
            line += 1;
            column = 1;
        } else {
            column += text.chars().count();
        }
    }
    tokens
}

/// Cursor over a token list with the checks the grammars need. Every
/// failure is a [`FormatError::TextParse`] naming the line and column.
pub struct Tokens<'a> {
    tokens: Vec<Token<'a>>,
    pos: usize,
}

impl<'a> Tokens<'a> {
    pub fn new(input: &'a str) -> Self {
        Tokens {
            tokens: tokenize(input),
            pos: 0,
        }
    }

    pub fn peek(&self) -> Option<&Token<'a>> {
        self.tokens.get(self.pos)
    }

    pub fn peek_nth(&self, n: usize) -> Option<&Token<'a>> {
        self.tokens.get(self.pos + n)
    }

    pub fn peek_kind(&self) -> Option<TokenKind> {
        self.peek().map(|t| t.kind)
    }

    pub fn is_at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    pub fn bump(&mut self) -> Option<Token<'a>> {
        let token = self.tokens.get(self.pos).copied();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    /// Consumes the next token if it is of `kind`.
    pub fn eat(&mut self, kind: TokenKind) -> bool {
        if self.peek_kind() == Some(kind) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    /// Consumes tokens while `pred` holds and returns how many.
    pub fn skip_while(&mut self, pred: impl Fn(&Token<'a>) -> bool) -> usize {
        let start = self.pos;
        while self.peek().is_some_and(&pred) {
            self.pos += 1;
        }
        self.pos - start
    }

    pub fn expect(&mut self, kind: TokenKind, what: &str) -> Result<Token<'a>, FormatError> {
        match self.peek() {
            Some(token) if token.kind == kind => {
                let token = *token;
                self.pos += 1;
                Ok(token)
            }
            _ => Err(self.unexpected(what)),
        }
    }

    pub fn expect_end(&self) -> Result<(), FormatError> {
        if self.is_at_end() {
            Ok(())
        } else {
            Err(self.unexpected("end of input"))
        }
    }

    /// Reads a number and checks it against `max`.
    pub fn number(&mut self, field: &str, max: u8) -> Result<u8, FormatError> {
        let token = self.expect(TokenKind::Number, field)?;
        let value = token
            .text
            .parse::<u32>()
            .map_err(|_| error_at(&token, format!("number {} is too large", token.text)))?;
        match u8::try_from(value) {
            Ok(value) if value <= max => Ok(value),
            _ => Err(error_at(
                &token,
                format!("{field} out of range: {value} (max {max})"),
            )),
        }
    }

    /// Error for the token under the cursor, or for the end of input.
    pub fn unexpected(&self, expected: &str) -> FormatError {
        match self.peek() {
            Some(token) => error_at(token, format!("expected {expected}, found {token}")),
            None => {
                let (line, column) = self.end_position();
                FormatError::TextParse(format!(
                    "line {line}, column {column}: expected {expected}, found end of input"
                ))
            }
        }
    }

    fn end_position(&self) -> (usize, usize) {
        match self.tokens.last() {
            Some(last) if last.kind == TokenKind::Eol => (last.line + 1, 1),
            Some(last) => (last.line, last.column + last.text.chars().count()),
            None => (1, 1),
        }
    }
}

pub fn error_at(token: &Token, message: impl fmt::Display) -> FormatError {
    FormatError::TextParse(format!(
        "line {}, column {}: {}",
        token.line, token.column, message
    ))
}

/// Operator columns in the order every text format writes them.
pub const OPERATOR_COLUMNS: [(&str, u8); 9] = [
    ("AR", 31),
    ("DR", 31),
    ("SR", 31),
    ("RR", 15),
    ("SL", 15),
    ("TL", 127),
    ("KS", 3),
    ("ML", 15),
    ("DT", 7),
];

/// The AM flag column of formats that carry one: 0 or 1.
pub const AM_COLUMN: (&str, u8) = ("AM", 1);

pub fn operator_from_columns(values: [u8; 9], am: bool) -> FmOperator {
    let [ar, dr, sr, rr, sl, tl, ks, ml, dt] = values;
    FmOperator {
        ar,
        dr,
        sr,
        rr,
        sl,
        tl,
        ks,
        ml,
        dt,
        ssg_eg: 0,
        am,
    }
}

pub fn operator_columns(op: &FmOperator) -> [u8; 9] {
    [op.ar, op.dr, op.sr, op.rr, op.sl, op.tl, op.ks, op.ml, op.dt]
}
