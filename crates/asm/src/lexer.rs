//! Tokenizes a single source line into a vector of [`Token`]s.
//!
//! The assembler only ever looks at one line at a time (aside from
//! `INCLUDE`, which recurses into another file line by line), so unlike a
//! whole-file lexer this one is re-created per line and produces its whole
//! token stream up front. Parsing walks it with a [`Cursor`], which is the
//! single-token-lookahead the component design calls for, modeled as a
//! cached peek over a plain slice rather than a mutable global cursor.

use crate::error::{at, Error};

/// The kind of a single lexical token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    /// End of the line; always the last token produced.
    Eol,
    /// An identifier immediately followed by `:`; the colon is consumed.
    Label(String),
    /// A bare identifier (mnemonic, directive, register, symbol reference).
    Ident(String),
    /// A 24-bit numeric literal.
    Number(u32),
    /// A double-quoted string literal, with escapes already resolved.
    Str(Vec<u8>),
    /// A single-quoted character literal, with escapes already resolved.
    Char(u32),
    /// `,`
    Comma,
    /// `:`
    Colon,
    /// `(`
    LParen,
    /// `)`
    RParen,
    /// `+`
    Plus,
    /// `-`
    Minus,
    /// `*`
    Star,
    /// `/`
    Slash,
    /// `$`, denoting the current program counter.
    Dollar,
    /// `=`
    Equals,
}

/// A single token, tagged with the source line it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    /// What kind of token this is.
    pub kind: TokenKind,
    /// The 1-based source line number.
    pub line: u32,
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_' || c == '.' || c == '@'
}

fn is_ident_continue(c: char) -> bool {
    is_ident_start(c) || c.is_ascii_digit()
}

struct Scanner<'a> {
    chars: Vec<char>,
    position: usize,
    line: u32,
    file: &'a std::path::Path,
}

impl<'a> Scanner<'a> {
    fn peek_char(&self) -> Option<char> {
        self.chars.get(self.position).copied()
    }

    fn peek_char_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.position + offset).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.peek_char()?;
        self.position += 1;
        Some(c)
    }

    fn skip_whitespace(&mut self) {
        while let Some(c) = self.peek_char() {
            if c == ' ' || c == '\t' {
                self.position += 1;
            } else if c == ';' || c == '#' {
                self.position = self.chars.len();
            } else {
                break;
            }
        }
    }

    fn scan_number(&mut self) -> Result<TokenKind, Error> {
        let start = self.position;

        if self.peek_char() == Some('0') && matches!(self.peek_char_at(1), Some('x') | Some('X')) {
            self.position += 2;
            let digits_start = self.position;
            while self.peek_char().is_some_and(|c| c.is_ascii_hexdigit()) {
                self.position += 1;
            }
            let digits: String = self.chars[digits_start..self.position].iter().collect();
            if digits.is_empty() {
                return Err(Error::BadLiteral(at(
                    self.file,
                    self.line,
                    "`0x` is not followed by any hex digits",
                )));
            }
            return Ok(TokenKind::Number(u32::from_str_radix(&digits, 16).unwrap_or(0)));
        }

        if self.peek_char() == Some('$') {
            self.position += 1;
            let digits_start = self.position;
            while self.peek_char().is_some_and(|c| c.is_ascii_hexdigit()) {
                self.position += 1;
            }
            let digits: String = self.chars[digits_start..self.position].iter().collect();
            if digits.is_empty() {
                return Err(Error::BadLiteral(at(
                    self.file,
                    self.line,
                    "`$` is not followed by any hex digits",
                )));
            }
            return Ok(TokenKind::Number(u32::from_str_radix(&digits, 16).unwrap_or(0)));
        }

        if self.peek_char() == Some('%') {
            self.position += 1;
            let digits_start = self.position;
            while matches!(self.peek_char(), Some('0') | Some('1')) {
                self.position += 1;
            }
            let digits: String = self.chars[digits_start..self.position].iter().collect();
            if digits.is_empty() {
                return Err(Error::BadLiteral(at(
                    self.file,
                    self.line,
                    "`%` is not followed by any binary digits",
                )));
            }
            return Ok(TokenKind::Number(u32::from_str_radix(&digits, 2).unwrap_or(0)));
        }

        // Decimal, or suffix-hex (`7Fh`): scan the longest run of hex digits,
        // then check for a trailing `h`/`H` that isn't itself an identifier
        // character.
        while self.peek_char().is_some_and(|c| c.is_ascii_hexdigit()) {
            self.position += 1;
        }
        let run: String = self.chars[start..self.position].iter().collect();

        let is_hex_suffix = matches!(self.peek_char(), Some('h') | Some('H'))
            && !self.peek_char_at(1).is_some_and(is_ident_continue);

        if is_hex_suffix {
            self.position += 1;
            return Ok(TokenKind::Number(u32::from_str_radix(&run, 16).unwrap_or(0)));
        }

        if run.chars().all(|c| c.is_ascii_digit()) {
            return Ok(TokenKind::Number(run.parse().unwrap_or(0)));
        }

        Err(Error::BadLiteral(at(
            self.file,
            self.line,
            format!("`{run}` is not a valid number (missing `0x`, `%`, or trailing `h`?)"),
        )))
    }

    fn scan_identifier(&mut self) -> String {
        let start = self.position;
        self.position += 1; // the start character was already checked by the caller.
        while self.peek_char().is_some_and(is_ident_continue) {
            self.position += 1;
        }

        let mut text: String = self.chars[start..self.position].iter().collect();

        if text.chars().count() == 2 && self.peek_char() == Some('\'') {
            text.push('\'');
            self.position += 1;
        }

        text
    }

    fn scan_escape(&mut self) -> Result<u8, Error> {
        match self.advance() {
            Some('n') => Ok(b'\n'),
            Some('r') => Ok(b'\r'),
            Some('t') => Ok(b'\t'),
            Some('0') => Ok(0),
            Some('\\') => Ok(b'\\'),
            Some('"') => Ok(b'"'),
            Some('\'') => Ok(b'\''),
            Some(other) => Err(Error::BadEscape(at(self.file, self.line, format!("`\\{other}`")))),
            None => Err(Error::BadEscape(at(self.file, self.line, "a trailing `\\` with nothing after it"))),
        }
    }

    fn scan_string(&mut self) -> Result<Vec<u8>, Error> {
        let mut bytes = Vec::new();

        loop {
            match self.advance() {
                Some('"') => return Ok(bytes),
                Some('\\') => bytes.push(self.scan_escape()?),
                Some(c) => {
                    let mut buffer = [0u8; 4];
                    bytes.extend_from_slice(c.encode_utf8(&mut buffer).as_bytes());
                }
                None => {
                    return Err(Error::BadLiteral(at(self.file, self.line, "unterminated string literal")))
                }
            }

            if bytes.len() > crate::MAX_STRING_LEN {
                return Err(Error::BadLiteral(at(self.file, self.line, "string literal is too long")));
            }
        }
    }

    fn scan_char(&mut self) -> Result<u32, Error> {
        let value = match self.advance() {
            Some('\\') => u32::from(self.scan_escape()?),
            Some(c) => u32::from(c),
            None => return Err(Error::BadLiteral(at(self.file, self.line, "unterminated character literal"))),
        };

        match self.advance() {
            Some('\'') => Ok(value),
            _ => Err(Error::BadLiteral(at(self.file, self.line, "character literal is not closed with `'`"))),
        }
    }
}

/// Tokenizes one source line. The returned vector always ends with a single
/// [`TokenKind::Eol`].
pub fn tokenize(file: &std::path::Path, line: u32, text: &str) -> Result<Vec<Token>, Error> {
    let mut scanner = Scanner { chars: text.chars().collect(), position: 0, line, file };
    let mut tokens = Vec::new();

    loop {
        scanner.skip_whitespace();

        let Some(c) = scanner.peek_char() else {
            tokens.push(Token { kind: TokenKind::Eol, line });
            return Ok(tokens);
        };

        let kind = match c {
            ',' => {
                scanner.position += 1;
                TokenKind::Comma
            }
            ':' => {
                scanner.position += 1;
                TokenKind::Colon
            }
            '(' => {
                scanner.position += 1;
                TokenKind::LParen
            }
            ')' => {
                scanner.position += 1;
                TokenKind::RParen
            }
            '+' => {
                scanner.position += 1;
                TokenKind::Plus
            }
            '-' => {
                scanner.position += 1;
                TokenKind::Minus
            }
            '*' => {
                scanner.position += 1;
                TokenKind::Star
            }
            '/' => {
                scanner.position += 1;
                TokenKind::Slash
            }
            '=' => {
                scanner.position += 1;
                TokenKind::Equals
            }
            '$' if scanner.peek_char_at(1).is_some_and(|c| c.is_ascii_hexdigit()) => scanner.scan_number()?,
            '$' => {
                scanner.position += 1;
                TokenKind::Dollar
            }
            '"' => {
                scanner.position += 1;
                TokenKind::Str(scanner.scan_string()?)
            }
            '\'' => {
                scanner.position += 1;
                TokenKind::Char(scanner.scan_char()?)
            }
            c if c.is_ascii_digit() => scanner.scan_number()?,
            c if is_ident_start(c) => {
                let text = scanner.scan_identifier();
                scanner.skip_whitespace();
                if scanner.peek_char() == Some(':') {
                    scanner.position += 1;
                    TokenKind::Label(text)
                } else {
                    TokenKind::Ident(text)
                }
            }
            other => {
                return Err(Error::BadLiteral(at(file, line, format!("unexpected character `{other}`"))))
            }
        };

        tokens.push(Token { kind, line });
    }
}

/// A single-token-lookahead cursor over an already-tokenized line.
#[derive(Debug, Clone)]
pub struct Cursor<'a> {
    tokens: &'a [Token],
    position: usize,
}

impl<'a> Cursor<'a> {
    /// Wraps a token slice (as produced by [`tokenize`]) for parsing.
    pub fn new(tokens: &'a [Token]) -> Self {
        Self { tokens, position: 0 }
    }

    /// Returns the current token without consuming it.
    pub fn peek(&self) -> &'a TokenKind {
        &self.tokens[self.position.min(self.tokens.len() - 1)].kind
    }

    /// Returns the source line of the current token.
    pub fn line(&self) -> u32 {
        self.tokens[self.position.min(self.tokens.len() - 1)].line
    }

    /// Consumes and returns the current token.
    pub fn advance(&mut self) -> &'a TokenKind {
        let token = self.peek();
        if self.position < self.tokens.len() - 1 {
            self.position += 1;
        }
        token
    }

    /// Whether the cursor is sitting on [`TokenKind::Eol`].
    pub fn at_eol(&self) -> bool {
        matches!(self.peek(), TokenKind::Eol)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(text: &str) -> Vec<TokenKind> {
        let file = std::path::Path::new("t.asm");
        tokenize(file, 1, text).unwrap().into_iter().map(|token| token.kind).collect()
    }

    #[test]
    fn test_dollar_hex_literal() {
        assert_eq!(kinds("$7F"), vec![TokenKind::Number(0x7F), TokenKind::Eol]);
    }

    #[test]
    fn test_bare_dollar_is_pc() {
        assert_eq!(kinds("$"), vec![TokenKind::Dollar, TokenKind::Eol]);
    }

    #[test]
    fn test_dollar_followed_by_a_non_hex_identifier_is_pc_then_ident() {
        assert_eq!(
            kinds("$ZZZ"),
            vec![TokenKind::Dollar, TokenKind::Ident("ZZZ".to_owned()), TokenKind::Eol]
        );
    }

    #[test]
    fn test_dollar_pc_in_an_expression_does_not_loop() {
        assert_eq!(
            kinds("$+1"),
            vec![TokenKind::Dollar, TokenKind::Plus, TokenKind::Number(1), TokenKind::Eol]
        );
    }

    #[test]
    fn test_suffix_hex_and_percent_binary() {
        assert_eq!(kinds("0x1F"), vec![TokenKind::Number(0x1F), TokenKind::Eol]);
        assert_eq!(kinds("1Fh"), vec![TokenKind::Number(0x1F), TokenKind::Eol]);
        assert_eq!(kinds("%1010"), vec![TokenKind::Number(0b1010), TokenKind::Eol]);
    }
}
