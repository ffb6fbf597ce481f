//! SQL front end: lexer, parser and AST for scalar expressions and
//! table column definitions.

pub mod ast;
pub mod lexer;
pub mod parser;
pub mod token;

pub use ast::{
    BinaryOperator, ColumnDef, Expr, Literal, TableConstraint, TableElement, UnaryOperator,
};
pub use lexer::Lexer;
pub use parser::Parser;
pub use token::Token;

use crate::error::Result;

/// Parse a complete scalar expression
pub fn parse_expression(sql: &str) -> Result<Expr> {
    Parser::new(sql)?.parse_expression()
}

/// Parse one table module argument
pub fn parse_table_element(sql: &str) -> Result<TableElement> {
    Parser::new(sql)?.parse_table_element()
}
