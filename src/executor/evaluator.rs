//! Expression evaluator
//!
//! Compiles an expression tree once into a tree of closures. Evaluating the
//! result against a row is a plain function call with no further dispatch on
//! the AST.

use indexmap::{IndexMap, IndexSet};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use tracing::trace;

use crate::error::Result;
use crate::sql::{self, BinaryOperator, Expr, UnaryOperator};
use crate::value::coerce;
use crate::value::Value;

/// Read-only column lookup for one evaluation
pub trait RowContext {
    /// Value of a fully qualified column, `None` when absent
    fn get(&self, name: &str) -> Option<&Value>;
}

impl RowContext for HashMap<String, Value> {
    fn get(&self, name: &str) -> Option<&Value> {
        HashMap::get(self, name)
    }
}

impl RowContext for BTreeMap<String, Value> {
    fn get(&self, name: &str) -> Option<&Value> {
        BTreeMap::get(self, name)
    }
}

impl RowContext for IndexMap<String, Value> {
    fn get(&self, name: &str) -> Option<&Value> {
        IndexMap::get(self, name)
    }
}

/// A context with no columns
pub struct EmptyRow;

impl RowContext for EmptyRow {
    fn get(&self, _name: &str) -> Option<&Value> {
        None
    }
}

type Compiled = Arc<dyn Fn(&dyn RowContext) -> Result<Value> + Send + Sync>;

/// A compiled expression
#[derive(Clone)]
pub struct Evaluator {
    func: Compiled,
    inputs: IndexSet<String>,
    expr: Expr,
}

impl Evaluator {
    /// Parse and compile expression text
    pub fn compile(text: &str) -> Result<Self> {
        let expr = sql::parse_expression(text)?;
        let evaluator = Self::from_expr(expr);
        trace!(expr = text, inputs = ?evaluator.inputs, "compiled expression");
        Ok(evaluator)
    }

    /// Compile an already parsed expression
    pub fn from_expr(expr: Expr) -> Self {
        let mut inputs = IndexSet::new();
        expr.walk_columns(&mut |name| {
            inputs.insert(name.to_string());
        });
        Self {
            func: compile_node(&expr),
            inputs,
            expr,
        }
    }

    /// Column names the expression reads, in first-reference order
    pub fn inputs(&self) -> &IndexSet<String> {
        &self.inputs
    }

    /// The expression tree this was compiled from
    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    /// Evaluate against a row
    pub fn eval(&self, row: &dyn RowContext) -> Result<Value> {
        (self.func)(row)
    }
}

impl fmt::Debug for Evaluator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Evaluator")
            .field("expr", &self.expr.to_string())
            .field("inputs", &self.inputs)
            .finish()
    }
}

fn node<F>(f: F) -> Compiled
where
    F: Fn(&dyn RowContext) -> Result<Value> + Send + Sync + 'static,
{
    Arc::new(f)
}

fn compile_node(expr: &Expr) -> Compiled {
    match expr {
        Expr::Literal(lit) => {
            let value = lit.to_value();
            node(move |_| Ok(value.clone()))
        }
        Expr::Column(name) => {
            let name = name.clone();
            // Absent columns read as NULL
            node(move |row| Ok(row.get(&name).cloned().unwrap_or(Value::Null)))
        }
        Expr::Nested(inner) => compile_node(inner),
        Expr::UnaryOp { op, expr } => {
            let operand = compile_node(expr);
            match op {
                UnaryOperator::Not => node(move |row| Ok(coerce::not(&operand(row)?))),
                UnaryOperator::Minus => node(move |row| coerce::negate(&operand(row)?)),
                UnaryOperator::Plus => node(move |row| coerce::identity(&operand(row)?)),
            }
        }
        Expr::BinaryOp { left, op, right } => {
            let left = compile_node(left);
            let right = compile_node(right);
            if let Some(arith) = op.arith() {
                return node(move |row| Ok(coerce::arithmetic(arith, &left(row)?, &right(row)?)));
            }
            if let Some(cmp) = op.cmp() {
                return node(move |row| Ok(coerce::comparison(cmp, &left(row)?, &right(row)?)));
            }
            match op {
                BinaryOperator::And => node(move |row| Ok(coerce::and(&left(row)?, &right(row)?))),
                _ => node(move |row| Ok(coerce::or(&left(row)?, &right(row)?))),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    fn eval(text: &str) -> Value {
        Evaluator::compile(text).unwrap().eval(&EmptyRow).unwrap()
    }

    #[test]
    fn test_literals() {
        assert_eq!(eval("42"), Value::Integer(42));
        assert_eq!(eval("'x'"), Value::Text("x".to_string()));
        assert_eq!(eval("TRUE"), Value::Integer(1));
        assert_eq!(eval("null"), Value::Null);
        assert_eq!(eval("X'00ff'"), Value::Blob(vec![0, 255]));
    }

    #[test]
    fn test_column_lookup() {
        let evaluator = Evaluator::compile("3+foo.bar").unwrap();
        assert_eq!(
            evaluator.inputs().iter().collect::<Vec<_>>(),
            vec!["foo.bar"]
        );

        let mut row = HashMap::new();
        row.insert("foo.bar".to_string(), Value::Integer(5));
        assert_eq!(evaluator.eval(&row).unwrap(), Value::Integer(8));
        assert_eq!(evaluator.eval(&EmptyRow).unwrap(), Value::Null);
    }

    #[test]
    fn test_inputs_are_distinct_and_ordered() {
        let evaluator = Evaluator::compile("b + a * b - c.d").unwrap();
        assert_eq!(
            evaluator.inputs().iter().collect::<Vec<_>>(),
            vec!["b", "a", "c.d"]
        );
    }

    #[test]
    fn test_contexts() {
        let evaluator = Evaluator::compile("t.a * 2").unwrap();

        let mut btree = BTreeMap::new();
        btree.insert("t.a".to_string(), Value::Real(1.5));
        assert_eq!(evaluator.eval(&btree).unwrap(), Value::Real(3.0));

        let mut index = IndexMap::new();
        index.insert("t.a".to_string(), Value::Text("4".to_string()));
        assert_eq!(evaluator.eval(&index).unwrap(), Value::Integer(8));
    }

    #[test]
    fn test_unary_errors() {
        let err = Evaluator::compile("-'abc'").unwrap().eval(&EmptyRow).unwrap_err();
        assert!(matches!(err, Error::UndefinedOperation { .. }));
        assert!(Evaluator::compile("+X'01'").unwrap().eval(&EmptyRow).is_err());
        assert_eq!(eval("-'12abc'"), Value::Integer(-12));
    }

    #[test]
    fn test_compile_errors() {
        assert!(Evaluator::compile("(1").unwrap_err().is_parse_error());
        assert!(Evaluator::compile("1 1").unwrap_err().is_parse_error());
    }

    #[test]
    fn test_evaluator_is_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Evaluator>();

        let evaluator = Evaluator::compile("x + 1").unwrap();
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let evaluator = evaluator.clone();
                std::thread::spawn(move || {
                    let mut row = HashMap::new();
                    row.insert("x".to_string(), Value::Integer(i));
                    evaluator.eval(&row).unwrap()
                })
            })
            .collect();
        for (i, handle) in handles.into_iter().enumerate() {
            assert_eq!(handle.join().unwrap(), Value::Integer(i as i64 + 1));
        }
    }

    #[test]
    fn test_debug_shows_expression() {
        let evaluator = Evaluator::compile("a=1").unwrap();
        assert!(format!("{:?}", evaluator).contains("a = 1"));
    }
}
