//! Tokenizer for host-literal text
//!
//! Produces numbers, strings, names and punctuation with the byte offset
//! each token starts at. Adjacent string tokens are left separate; the
//! parser joins them.

use super::LiteralError;

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    /// Integer literal, kept wide so `-9223372036854775808` survives negation
    Int(i128),
    Float(f64),
    /// Imaginary literal such as `2j`; the payload is the imaginary part
    Imag(f64),
    Str(String),
    Name(String),
    /// One of `( ) [ ] { } , : . = + -`
    Punct(char),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    /// Byte offset of the first character
    pub offset: usize,
}

impl Token {
    fn new(kind: TokenKind, offset: usize) -> Self {
        Token { kind, offset }
    }
}

const PUNCTUATION: &str = "()[]{},:.=+-";

pub fn tokenize(source: &str) -> Result<Vec<Token>, LiteralError> {
    let mut lexer = Lexer {
        source,
        chars: source.char_indices().collect(),
        pos: 0,
    };
    let mut tokens = Vec::new();
    while let Some(token) = lexer.next_token()? {
        tokens.push(token);
    }
    Ok(tokens)
}

struct Lexer<'a> {
    source: &'a str,
    chars: Vec<(usize, char)>,
    pos: usize,
}

impl Lexer<'_> {
    fn peek(&self) -> Option<char> {
        self.peek_at(0)
    }

    fn peek_at(&self, n: usize) -> Option<char> {
        self.chars.get(self.pos + n).map(|&(_, c)| c)
    }

    fn offset(&self) -> usize {
        self.chars
            .get(self.pos)
            .map(|&(i, _)| i)
            .unwrap_or(self.source.len())
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        Some(c)
    }

    fn next_token(&mut self) -> Result<Option<Token>, LiteralError> {
        while self.peek().is_some_and(|c| c.is_whitespace()) {
            self.pos += 1;
        }
        let start = self.offset();
        let Some(c) = self.peek() else {
            return Ok(None);
        };

        if c.is_ascii_digit() || (c == '.' && self.peek_at(1).is_some_and(|d| d.is_ascii_digit()))
        {
            return self.number(start).map(Some);
        }
        if c == '\'' || c == '"' {
            return self.string(start, false).map(Some);
        }
        if c.is_alphabetic() || c == '_' {
            // String prefixes: r'..', u'..', and their combinations
            let mut n = 0;
            let mut raw = false;
            while let Some(p) = self.peek_at(n) {
                match p {
                    'r' | 'R' => raw = true,
                    'u' | 'U' => {}
                    _ => break,
                }
                n += 1;
            }
            if (1..=2).contains(&n) && matches!(self.peek_at(n), Some('\'' | '"')) {
                self.pos += n;
                return self.string(start, raw).map(Some);
            }
            if matches!(c, 'b' | 'B' | 'f' | 'F')
                && matches!(self.peek_at(1), Some('\'' | '"'))
            {
                return Err(LiteralError::new(
                    format!("{}-strings are not supported", c.to_ascii_lowercase()),
                    start,
                ));
            }
            let mut name = String::new();
            while let Some(c) = self.peek().filter(|c| c.is_alphanumeric() || *c == '_') {
                name.push(c);
                self.pos += 1;
            }
            return Ok(Some(Token::new(TokenKind::Name(name), start)));
        }
        if PUNCTUATION.contains(c) {
            self.pos += 1;
            return Ok(Some(Token::new(TokenKind::Punct(c), start)));
        }
        Err(LiteralError::new(format!("unexpected character '{}'", c), start))
    }

    /// Digits in `radix`, allowing single underscores between them
    fn digits(&mut self, radix: u32) -> String {
        let mut digits = String::new();
        while let Some(c) = self.peek() {
            if c.is_digit(radix) {
                digits.push(c);
            } else if c == '_' && self.peek_at(1).is_some_and(|d| d.is_digit(radix)) {
                // separator, dropped
            } else {
                break;
            }
            self.pos += 1;
        }
        digits
    }

    fn number(&mut self, start: usize) -> Result<Token, LiteralError> {
        if self.peek() == Some('0') {
            let radix = match self.peek_at(1) {
                Some('x' | 'X') => Some(16),
                Some('o' | 'O') => Some(8),
                Some('b' | 'B') => Some(2),
                _ => None,
            };
            if let Some(radix) = radix {
                self.pos += 2;
                if self.peek() == Some('_') {
                    self.pos += 1;
                }
                let digits = self.digits(radix);
                if digits.is_empty() {
                    return Err(LiteralError::new("missing digits after radix prefix", start));
                }
                let value = i128::from_str_radix(&digits, radix)
                    .map_err(|_| LiteralError::new("integer literal too large", start))?;
                return Ok(Token::new(TokenKind::Int(value), start));
            }
        }

        let mut text = self.digits(10);
        let mut is_float = false;
        if self.peek() == Some('.') {
            self.pos += 1;
            text.push('.');
            text.push_str(&self.digits(10));
            is_float = true;
        }
        if matches!(self.peek(), Some('e' | 'E')) {
            let sign = self.peek_at(1).filter(|c| *c == '+' || *c == '-');
            let first_digit = if sign.is_some() { 2 } else { 1 };
            if self.peek_at(first_digit).is_some_and(|d| d.is_ascii_digit()) {
                self.pos += first_digit;
                text.push('e');
                if let Some(s) = sign {
                    text.push(s);
                }
                text.push_str(&self.digits(10));
                is_float = true;
            }
        }
        if matches!(self.peek(), Some('j' | 'J')) {
            self.pos += 1;
            let value: f64 = text
                .parse()
                .map_err(|_| LiteralError::new(format!("invalid number '{}j'", text), start))?;
            return Ok(Token::new(TokenKind::Imag(value), start));
        }
        if self.peek().is_some_and(|c| c.is_alphanumeric() || c == '_') {
            return Err(LiteralError::new("invalid number literal", start));
        }
        if is_float {
            let value: f64 = text
                .parse()
                .map_err(|_| LiteralError::new(format!("invalid number '{}'", text), start))?;
            return Ok(Token::new(TokenKind::Float(value), start));
        }
        if text.len() > 1 && text.starts_with('0') && text.chars().any(|c| c != '0') {
            return Err(LiteralError::new(
                "leading zeros in decimal integer literals are not permitted",
                start,
            ));
        }
        let value: i128 = text
            .parse()
            .map_err(|_| LiteralError::new("integer literal too large", start))?;
        Ok(Token::new(TokenKind::Int(value), start))
    }

    fn string(&mut self, start: usize, raw: bool) -> Result<Token, LiteralError> {
        let quote = self.bump().unwrap_or('\'');
        let triple = self.peek() == Some(quote) && self.peek_at(1) == Some(quote);
        if triple {
            self.pos += 2;
        }
        let mut text = String::new();
        loop {
            let Some(c) = self.bump() else {
                return Err(LiteralError::new("unterminated string literal", start));
            };
            if c == quote {
                if !triple {
                    break;
                }
                if self.peek() == Some(quote) && self.peek_at(1) == Some(quote) {
                    self.pos += 2;
                    break;
                }
                text.push(c);
                continue;
            }
            if c == '\n' && !triple {
                return Err(LiteralError::new("unterminated string literal", start));
            }
            if c != '\\' {
                text.push(c);
                continue;
            }
            let escape_at = self.offset().saturating_sub(1);
            let Some(e) = self.bump() else {
                return Err(LiteralError::new("unterminated string literal", start));
            };
            if raw {
                text.push('\\');
                text.push(e);
                continue;
            }
            match e {
                '\n' => {}
                '\\' => text.push('\\'),
                '\'' => text.push('\''),
                '"' => text.push('"'),
                'a' => text.push('\x07'),
                'b' => text.push('\x08'),
                'f' => text.push('\x0c'),
                'n' => text.push('\n'),
                'r' => text.push('\r'),
                't' => text.push('\t'),
                'v' => text.push('\x0b'),
                '0'..='7' => {
                    let mut code = e.to_digit(8).unwrap_or(0);
                    for _ in 0..2 {
                        match self.peek().and_then(|d| d.to_digit(8)) {
                            Some(d) => {
                                code = code * 8 + d;
                                self.pos += 1;
                            }
                            None => break,
                        }
                    }
                    text.push(self.code_point(code, escape_at)?);
                }
                'x' => text.push(self.hex_escape(2, escape_at)?),
                'u' => text.push(self.hex_escape(4, escape_at)?),
                'U' => text.push(self.hex_escape(8, escape_at)?),
                other => {
                    // Unknown escapes keep their backslash
                    text.push('\\');
                    text.push(other);
                }
            }
        }
        Ok(Token::new(TokenKind::Str(text), start))
    }

    fn hex_escape(&mut self, len: usize, at: usize) -> Result<char, LiteralError> {
        let mut code = 0u32;
        for _ in 0..len {
            let d = self
                .peek()
                .and_then(|c| c.to_digit(16))
                .ok_or_else(|| LiteralError::new("truncated \\x/\\u escape", at))?;
            code = code * 16 + d;
            self.pos += 1;
        }
        self.code_point(code, at)
    }

    fn code_point(&self, code: u32, at: usize) -> Result<char, LiteralError> {
        char::from_u32(code)
            .ok_or_else(|| LiteralError::new(format!("invalid code point {:#x}", code), at))
    }
}
