//! Error types for sqlvtab
//!
//! This module defines all error types used by the expression engine,
//! the store and the virtual table adapter.

use std::fmt;

use thiserror::Error;

/// Kind of constraint rejected by the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Constraint {
    /// A NOT NULL (or primary key) column received NULL
    NotNull { column: String },
    /// Another row already holds this primary key
    PrimaryKey { table: String },
    /// Another row already holds these unique column values
    Unique { columns: Vec<String> },
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constraint::NotNull { column } => write!(f, "NOT NULL constraint failed: {}", column),
            Constraint::PrimaryKey { table } => {
                write!(f, "PRIMARY KEY constraint failed on table '{}'", table)
            }
            Constraint::Unique { columns } => {
                write!(f, "UNIQUE constraint failed: {}", columns.join(", "))
            }
        }
    }
}

/// Standardized result codes a host boundary re-signals
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ErrorCode {
    Error = 1,
    Misuse = 21,
    ConstraintNotNull = 1299,
    ConstraintPrimaryKey = 1555,
    ConstraintUnique = 2067,
}

/// The main error type for sqlvtab
#[derive(Error, Debug)]
pub enum Error {
    // ========== Lexer Errors ==========
    #[error("Lexer error: unexpected character '{0}' at position {1}")]
    UnexpectedCharacter(char, usize),

    #[error("Lexer error: unterminated string literal starting at position {0}")]
    UnterminatedString(usize),

    #[error("Lexer error: invalid number format at position {0}")]
    InvalidNumber(usize),

    #[error("Lexer error: invalid blob literal at position {0}")]
    InvalidBlob(usize),

    // ========== Parser Errors ==========
    #[error("Parse error: unexpected token '{found}', expected {expected}")]
    UnexpectedToken { expected: String, found: String },

    #[error("Parse error: unexpected end of input, expected {0}")]
    UnexpectedEof(String),

    #[error("Parse error: expression nested deeper than {0} levels")]
    ExpressionTooDeep(usize),

    // ========== Evaluation Errors ==========
    #[error("Evaluation error: cannot apply {op} to {operand}")]
    UndefinedOperation {
        op: &'static str,
        operand: &'static str,
    },

    // ========== Schema Errors ==========
    #[error("Schema error: column '{0}' not found in table '{1}'")]
    ColumnNotFound(String, String),

    #[error("Schema error: column '{0}' already exists in table '{1}'")]
    ColumnAlreadyExists(String, String),

    #[error("Schema error: {0}")]
    Schema(String),

    // ========== Store Errors ==========
    #[error("Constraint violation: {0}")]
    ConstraintViolation(Constraint),

    #[error("Store error: row {0} not found")]
    RowNotFound(i64),

    #[error("Store error: {0}")]
    Store(String),

    // ========== Adapter Errors ==========
    #[error("Contract violation: {0}")]
    ContractViolation(String),

    #[error("Plan error: {0}")]
    InvalidPlan(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ========== Transaction Errors ==========
    #[error("Transaction error: transaction already active")]
    TransactionActive,

    #[error("Transaction error: no active transaction")]
    NoActiveTransaction,

    #[error("Transaction error: savepoint {0} not found")]
    SavepointNotFound(i32),
}

impl Error {
    /// Whether this error was raised while compiling expression text
    pub fn is_parse_error(&self) -> bool {
        matches!(
            self,
            Error::UnexpectedCharacter(..)
                | Error::UnterminatedString(_)
                | Error::InvalidNumber(_)
                | Error::InvalidBlob(_)
                | Error::UnexpectedToken { .. }
                | Error::UnexpectedEof(_)
                | Error::ExpressionTooDeep(_)
        )
    }

    /// Result code for the host boundary
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::ConstraintViolation(Constraint::NotNull { .. }) => ErrorCode::ConstraintNotNull,
            Error::ConstraintViolation(Constraint::PrimaryKey { .. }) => {
                ErrorCode::ConstraintPrimaryKey
            }
            Error::ConstraintViolation(Constraint::Unique { .. }) => ErrorCode::ConstraintUnique,
            Error::ContractViolation(_) => ErrorCode::Misuse,
            _ => ErrorCode::Error,
        }
    }
}

/// Result type alias for sqlvtab operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::UnexpectedCharacter('@', 5);
        assert_eq!(
            err.to_string(),
            "Lexer error: unexpected character '@' at position 5"
        );

        let err = Error::ConstraintViolation(Constraint::NotNull {
            column: "t.name".to_string(),
        });
        assert_eq!(
            err.to_string(),
            "Constraint violation: NOT NULL constraint failed: t.name"
        );
    }

    #[test]
    fn test_error_codes() {
        let unique = Error::ConstraintViolation(Constraint::Unique {
            columns: vec!["email".to_string()],
        });
        assert_eq!(unique.code(), ErrorCode::ConstraintUnique);
        assert_eq!(unique.code() as i32, 2067);

        let pk = Error::ConstraintViolation(Constraint::PrimaryKey {
            table: "t".to_string(),
        });
        assert_eq!(pk.code() as i32, 1555);

        assert_eq!(
            Error::ContractViolation("next past end".to_string()).code(),
            ErrorCode::Misuse
        );
        assert_eq!(Error::RowNotFound(3).code(), ErrorCode::Error);
    }

    #[test]
    fn test_parse_error_classification() {
        assert!(Error::UnexpectedEof("expression".to_string()).is_parse_error());
        assert!(!Error::TransactionActive.is_parse_error());
    }
}
