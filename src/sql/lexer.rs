//! SQL Lexer (Tokenizer)
//!
//! This module converts expression text into a stream of tokens.

use super::token::Token;
use crate::error::{Error, Result};

/// SQL Lexer
pub struct Lexer {
    /// Input characters
    input: Vec<char>,
    /// Current position in input
    position: usize,
}

impl Lexer {
    /// Create a new lexer for the given input
    pub fn new(input: &str) -> Self {
        Self {
            input: input.chars().collect(),
            position: 0,
        }
    }

    /// Tokenize the entire input
    pub fn tokenize(&mut self) -> Result<Vec<Token>> {
        let mut tokens = Vec::new();

        loop {
            let token = self.next_token()?;
            if token == Token::Eof {
                tokens.push(token);
                break;
            }
            tokens.push(token);
        }

        Ok(tokens)
    }

    /// Get the next token from the input
    pub fn next_token(&mut self) -> Result<Token> {
        self.skip_whitespace();
        self.skip_comments();
        self.skip_whitespace();

        if self.is_at_end() {
            return Ok(Token::Eof);
        }

        let ch = self.current_char();

        let token = match ch {
            '(' => Token::LParen,
            ')' => Token::RParen,
            ',' => Token::Comma,
            '+' => Token::Plus,
            // Never folded into a negative literal: `3-4` is a subtraction
            '-' => Token::Minus,
            '*' => Token::Asterisk,
            '/' => Token::Slash,
            '%' => Token::Percent,
            '=' => {
                self.advance();
                if !self.is_at_end() && self.current_char() == '=' {
                    self.advance();
                }
                return Ok(Token::Eq);
            }
            '<' => {
                self.advance();
                if !self.is_at_end() {
                    match self.current_char() {
                        '=' => {
                            self.advance();
                            return Ok(Token::Lte);
                        }
                        '>' => {
                            self.advance();
                            return Ok(Token::Neq);
                        }
                        _ => {}
                    }
                }
                return Ok(Token::Lt);
            }
            '>' => {
                self.advance();
                if !self.is_at_end() && self.current_char() == '=' {
                    self.advance();
                    return Ok(Token::Gte);
                }
                return Ok(Token::Gt);
            }
            '!' => {
                self.advance();
                if !self.is_at_end() && self.current_char() == '=' {
                    self.advance();
                    return Ok(Token::Neq);
                }
                return Err(Error::UnexpectedCharacter('!', self.position));
            }
            '.' => {
                if self.peek_char().is_some_and(|c| c.is_ascii_digit()) {
                    return self.read_number();
                }
                Token::Dot
            }
            '\'' | '"' => return self.read_string(ch),
            'x' | 'X' if self.peek_char() == Some('\'') => return self.read_blob(),
            c if c.is_ascii_digit() => return self.read_number(),
            c if c.is_alphabetic() || c == '_' => return self.read_identifier(),
            c => return Err(Error::UnexpectedCharacter(c, self.position)),
        };

        self.advance();
        Ok(token)
    }

    /// Check if we've reached the end of input
    fn is_at_end(&self) -> bool {
        self.position >= self.input.len()
    }

    /// Get the current character
    fn current_char(&self) -> char {
        self.input[self.position]
    }

    /// Peek at the next character
    fn peek_char(&self) -> Option<char> {
        self.input.get(self.position + 1).copied()
    }

    /// Advance to the next character
    fn advance(&mut self) {
        self.position += 1;
    }

    /// Skip whitespace characters
    fn skip_whitespace(&mut self) {
        while !self.is_at_end() && self.current_char().is_whitespace() {
            self.advance();
        }
    }

    /// Skip SQL comments (-- and /* */)
    fn skip_comments(&mut self) {
        if self.is_at_end() {
            return;
        }

        // Single line comment: --
        if self.current_char() == '-' && self.peek_char() == Some('-') {
            while !self.is_at_end() && self.current_char() != '\n' {
                self.advance();
            }
            self.skip_whitespace();
            self.skip_comments();
            return;
        }

        // Multi-line comment: /* */
        if self.current_char() == '/' && self.peek_char() == Some('*') {
            self.advance(); // skip /
            self.advance(); // skip *

            while !self.is_at_end() {
                if self.current_char() == '*' && self.peek_char() == Some('/') {
                    self.advance(); // skip *
                    self.advance(); // skip /
                    break;
                }
                self.advance();
            }
            self.skip_whitespace();
            self.skip_comments();
        }
    }

    /// Read a quoted string; a doubled quote character escapes itself
    fn read_string(&mut self, quote: char) -> Result<Token> {
        let start_pos = self.position;
        self.advance(); // skip opening quote

        let mut value = String::new();

        while !self.is_at_end() {
            let ch = self.current_char();

            if ch == quote {
                if self.peek_char() == Some(quote) {
                    value.push(quote);
                    self.advance();
                    self.advance();
                } else {
                    self.advance(); // skip closing quote
                    return Ok(Token::StringLiteral(value));
                }
            } else {
                value.push(ch);
                self.advance();
            }
        }

        Err(Error::UnterminatedString(start_pos))
    }

    /// Read a blob literal: X'<even number of hex digits>'
    fn read_blob(&mut self) -> Result<Token> {
        let start_pos = self.position;
        self.advance(); // skip X

        let hex = match self.read_string('\'')? {
            Token::StringLiteral(s) => s,
            _ => return Err(Error::InvalidBlob(start_pos)),
        };
        if hex.len() % 2 != 0 {
            return Err(Error::InvalidBlob(start_pos));
        }

        let digits: Vec<u32> = hex
            .chars()
            .map(|c| c.to_digit(16).ok_or(Error::InvalidBlob(start_pos)))
            .collect::<Result<_>>()?;
        let bytes = digits
            .chunks(2)
            .map(|pair| (pair[0] * 16 + pair[1]) as u8)
            .collect();

        Ok(Token::BlobLiteral(bytes))
    }

    /// Read a number (integer or float)
    fn read_number(&mut self) -> Result<Token> {
        let start_pos = self.position;
        let mut value = String::new();
        let mut is_float = false;

        while !self.is_at_end() {
            let ch = self.current_char();

            if ch.is_ascii_digit() {
                value.push(ch);
                self.advance();
            } else if ch == '.' && !is_float {
                is_float = true;
                value.push(ch);
                self.advance();
            } else if (ch == 'e' || ch == 'E') && !value.is_empty() {
                // Scientific notation
                is_float = true;
                value.push(ch);
                self.advance();

                if !self.is_at_end() && (self.current_char() == '+' || self.current_char() == '-') {
                    value.push(self.current_char());
                    self.advance();
                }
                if self.is_at_end() || !self.current_char().is_ascii_digit() {
                    return Err(Error::InvalidNumber(start_pos));
                }
                while !self.is_at_end() && self.current_char().is_ascii_digit() {
                    value.push(self.current_char());
                    self.advance();
                }
                break;
            } else {
                break;
            }
        }

        // `12abc` is not a number followed by an identifier
        if !self.is_at_end() && (self.current_char().is_alphabetic() || self.current_char() == '_')
        {
            return Err(Error::InvalidNumber(start_pos));
        }

        if !is_float {
            if let Ok(n) = value.parse::<u64>() {
                return Ok(Token::IntegerLiteral(n));
            }
        }
        // Magnitudes past 64 bits are read as floats rather than wrapped
        value
            .parse::<f64>()
            .map(Token::FloatLiteral)
            .map_err(|_| Error::InvalidNumber(start_pos))
    }

    /// Read an identifier or keyword
    fn read_identifier(&mut self) -> Result<Token> {
        let mut value = String::new();

        while !self.is_at_end() {
            let ch = self.current_char();

            if ch.is_alphanumeric() || ch == '_' {
                value.push(ch);
                self.advance();
            } else {
                break;
            }
        }

        Ok(Token::keyword(&value).unwrap_or(Token::Identifier(value)))
    }
}
