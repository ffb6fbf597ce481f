//! SQL Abstract Syntax Tree (AST)
//!
//! This module defines the AST nodes for scalar expressions and for the
//! column definitions a table is declared with.

use std::fmt;

use crate::value::coerce::{ArithOp, CmpOp};
use crate::value::Value;

/// Column definition
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDef {
    /// Column name
    pub name: String,
    /// Declared type words, verbatim (e.g. "VARCHAR(10)")
    pub type_name: Option<String>,
    /// NOT NULL constraint
    pub not_null: bool,
    /// PRIMARY KEY constraint
    pub primary_key: bool,
    /// UNIQUE constraint
    pub unique: bool,
}

/// Table-level constraint
#[derive(Debug, Clone, PartialEq)]
pub enum TableConstraint {
    /// PRIMARY KEY (a, b)
    PrimaryKey { columns: Vec<String> },
    /// UNIQUE (a, b)
    Unique { columns: Vec<String> },
}

/// One module argument of a table declaration
#[derive(Debug, Clone, PartialEq)]
pub enum TableElement {
    Column(ColumnDef),
    Constraint(TableConstraint),
}

/// Scalar expression
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Column reference, dotted parts joined verbatim (e.g. "foo.bar")
    Column(String),
    /// Literal value
    Literal(Literal),
    /// Binary operation
    BinaryOp {
        left: Box<Expr>,
        op: BinaryOperator,
        right: Box<Expr>,
    },
    /// Unary operation
    UnaryOp { op: UnaryOperator, expr: Box<Expr> },
    /// Nested expression (in parentheses)
    Nested(Box<Expr>),
}

impl Expr {
    /// Visit every column reference in left-to-right order
    pub fn walk_columns<'a>(&'a self, visit: &mut impl FnMut(&'a str)) {
        match self {
            Expr::Column(name) => visit(name),
            Expr::Literal(_) => {}
            Expr::BinaryOp { left, right, .. } => {
                left.walk_columns(visit);
                right.walk_columns(visit);
            }
            Expr::UnaryOp { expr, .. } | Expr::Nested(expr) => expr.walk_columns(visit),
        }
    }
}

/// Literal value
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    /// NULL
    Null,
    /// TRUE / FALSE
    Boolean(bool),
    /// Integer
    Integer(i64),
    /// Float
    Float(f64),
    /// String
    String(String),
    /// X'..'
    Blob(Vec<u8>),
}

impl Literal {
    /// The value this literal denotes
    pub fn to_value(&self) -> Value {
        match self {
            Literal::Null => Value::Null,
            Literal::Boolean(b) => Value::from(*b),
            Literal::Integer(i) => Value::Integer(*i),
            Literal::Float(f) => Value::Real(*f),
            Literal::String(s) => Value::Text(s.clone()),
            Literal::Blob(b) => Value::Blob(b.clone()),
        }
    }
}

/// Binary operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    // Comparison
    Eq,
    Neq,
    Lt,
    Gt,
    Lte,
    Gte,
    // Logical
    And,
    Or,
    // Arithmetic
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

impl BinaryOperator {
    /// The arithmetic operator this maps to, if any
    pub fn arith(&self) -> Option<ArithOp> {
        match self {
            BinaryOperator::Add => Some(ArithOp::Add),
            BinaryOperator::Sub => Some(ArithOp::Sub),
            BinaryOperator::Mul => Some(ArithOp::Mul),
            BinaryOperator::Div => Some(ArithOp::Div),
            BinaryOperator::Mod => Some(ArithOp::Mod),
            _ => None,
        }
    }

    /// The comparison operator this maps to, if any
    pub fn cmp(&self) -> Option<CmpOp> {
        match self {
            BinaryOperator::Eq => Some(CmpOp::Eq),
            BinaryOperator::Neq => Some(CmpOp::Neq),
            BinaryOperator::Lt => Some(CmpOp::Lt),
            BinaryOperator::Lte => Some(CmpOp::Lte),
            BinaryOperator::Gt => Some(CmpOp::Gt),
            BinaryOperator::Gte => Some(CmpOp::Gte),
            _ => None,
        }
    }

    fn symbol(&self) -> &'static str {
        match self {
            BinaryOperator::Eq => "=",
            BinaryOperator::Neq => "<>",
            BinaryOperator::Lt => "<",
            BinaryOperator::Gt => ">",
            BinaryOperator::Lte => "<=",
            BinaryOperator::Gte => ">=",
            BinaryOperator::And => "AND",
            BinaryOperator::Or => "OR",
            BinaryOperator::Add => "+",
            BinaryOperator::Sub => "-",
            BinaryOperator::Mul => "*",
            BinaryOperator::Div => "/",
            BinaryOperator::Mod => "%",
        }
    }
}

/// Unary operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOperator {
    /// NOT
    Not,
    /// - (negation)
    Minus,
    /// + (plus sign)
    Plus,
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Null => write!(f, "NULL"),
            Literal::Boolean(b) => write!(f, "{}", if *b { "TRUE" } else { "FALSE" }),
            Literal::Integer(i) => write!(f, "{}", i),
            Literal::Float(n) => write!(f, "{}", crate::value::format_real(*n)),
            Literal::String(s) => write!(f, "'{}'", s.replace('\'', "''")),
            Literal::Blob(b) => {
                write!(f, "X'")?;
                for byte in b {
                    write!(f, "{:02X}", byte)?;
                }
                write!(f, "'")
            }
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Column(name) => write!(f, "{}", name),
            Expr::Literal(lit) => write!(f, "{}", lit),
            Expr::BinaryOp { left, op, right } => {
                write!(f, "{} {} {}", left, op.symbol(), right)
            }
            Expr::UnaryOp {
                op: UnaryOperator::Not,
                expr,
            } => write!(f, "NOT {}", expr),
            Expr::UnaryOp {
                op: UnaryOperator::Minus,
                expr,
            } => write!(f, "-{}", expr),
            Expr::UnaryOp {
                op: UnaryOperator::Plus,
                expr,
            } => write!(f, "+{}", expr),
            Expr::Nested(expr) => write!(f, "({})", expr),
        }
    }
}
