//! Tokens of the expression language
//!
//! Column definitions are lexed with the same tokens. Their constraint
//! words (`PRIMARY`, `KEY`, `UNIQUE`) stay identifiers, so they remain
//! usable as column names and are recognised by the parser in context.

use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    // Reserved words
    And,
    Or,
    Not,
    Null,
    True,
    False,

    /// Unsigned magnitude; the sign is its own token, so `9223372036854775808`
    /// still lexes as an integer and can be negated into `i64::MIN`
    IntegerLiteral(u64),
    FloatLiteral(f64),
    /// Single- or double-quoted
    StringLiteral(String),
    /// `X'..'`
    BlobLiteral(Vec<u8>),
    Identifier(String),

    Eq,
    /// `<>` or `!=`
    Neq,
    Lt,
    Gt,
    Lte,
    Gte,
    Plus,
    Minus,
    Asterisk,
    Slash,
    Percent,

    LParen,
    RParen,
    Comma,
    Dot,

    Eof,
}

impl Token {
    /// The reserved word spelled `word`, in any case
    pub fn keyword(word: &str) -> Option<Token> {
        [
            Token::And,
            Token::Or,
            Token::Not,
            Token::Null,
            Token::True,
            Token::False,
        ]
        .into_iter()
        .find(|t| t.symbol().is_some_and(|s| s.eq_ignore_ascii_case(word)))
    }

    pub fn is_keyword(&self) -> bool {
        matches!(
            self,
            Token::And | Token::Or | Token::Not | Token::Null | Token::True | Token::False
        )
    }

    /// Source text of tokens that carry no payload
    fn symbol(&self) -> Option<&'static str> {
        let text = match self {
            Token::And => "AND",
            Token::Or => "OR",
            Token::Not => "NOT",
            Token::Null => "NULL",
            Token::True => "TRUE",
            Token::False => "FALSE",
            Token::Eq => "=",
            Token::Neq => "<>",
            Token::Lt => "<",
            Token::Gt => ">",
            Token::Lte => "<=",
            Token::Gte => ">=",
            Token::Plus => "+",
            Token::Minus => "-",
            Token::Asterisk => "*",
            Token::Slash => "/",
            Token::Percent => "%",
            Token::LParen => "(",
            Token::RParen => ")",
            Token::Comma => ",",
            Token::Dot => ".",
            Token::Eof => "end of input",
            _ => return None,
        };
        Some(text)
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(text) = self.symbol() {
            return f.write_str(text);
        }
        match self {
            Token::IntegerLiteral(n) => write!(f, "{}", n),
            Token::FloatLiteral(n) => write!(f, "{}", n),
            Token::StringLiteral(s) => write!(f, "'{}'", s.replace('\'', "''")),
            Token::BlobLiteral(bytes) => {
                f.write_str("X'")?;
                bytes.iter().try_for_each(|b| write!(f, "{:02X}", b))?;
                f.write_str("'")
            }
            Token::Identifier(name) => f.write_str(name),
            _ => Ok(()),
        }
    }
}
