//! SQL Parser
//!
//! This module parses tokens into an expression tree, and parses the column
//! definitions a table is declared with.

use super::ast::*;
use super::lexer::Lexer;
use super::token::Token;
use crate::error::{Error, Result};

/// Deepest run of parentheses, `NOT`s and signs the parser recurses into
const MAX_NESTING: usize = 256;

/// Tallest expression tree compiled; evaluation recurses once per level
const MAX_HEIGHT: usize = 1000;

/// An expression and the height of its tree
type Tree = (Expr, usize);

fn grow(expr: Expr, child_height: usize) -> Result<Tree> {
    let height = child_height + 1;
    if height > MAX_HEIGHT {
        return Err(Error::ExpressionTooDeep(MAX_HEIGHT));
    }
    Ok((expr, height))
}

fn binary((left, lh): Tree, op: BinaryOperator, (right, rh): Tree) -> Result<Tree> {
    let expr = Expr::BinaryOp {
        left: Box::new(left),
        op,
        right: Box::new(right),
    };
    grow(expr, lh.max(rh))
}

fn unary(op: UnaryOperator, (operand, height): Tree) -> Result<Tree> {
    let expr = Expr::UnaryOp {
        op,
        expr: Box::new(operand),
    };
    grow(expr, height)
}

/// SQL Parser
pub struct Parser {
    tokens: Vec<Token>,
    position: usize,
    nesting: usize,
}

impl Parser {
    /// Create a new parser from a SQL string
    pub fn new(sql: &str) -> Result<Self> {
        let mut lexer = Lexer::new(sql);
        let tokens = lexer.tokenize()?;

        Ok(Self {
            tokens,
            position: 0,
            nesting: 0,
        })
    }

    /// Parse a complete expression; trailing input is an error
    pub fn parse_expression(&mut self) -> Result<Expr> {
        let (expr, _) = self.parse_expr()?;
        self.expect_end()?;
        Ok(expr)
    }

    /// Parse one module argument: a column definition or a table constraint
    pub fn parse_table_element(&mut self) -> Result<TableElement> {
        let constraint = (self.check_word("PRIMARY") && self.peek_word("KEY"))
            || (self.check_word("UNIQUE") && *self.peek() == Token::LParen);
        let element = if constraint {
            TableElement::Constraint(self.parse_table_constraint()?)
        } else {
            TableElement::Column(self.parse_column_def()?)
        };
        self.expect_end()?;
        Ok(element)
    }

    // ========== Table Elements ==========

    fn parse_column_def(&mut self) -> Result<ColumnDef> {
        let name = self.expect_name()?;
        let type_name = self.parse_type_name()?;

        let mut not_null = false;
        let mut primary_key = false;
        let mut unique = false;

        // Parse column constraints
        loop {
            if self.check(&Token::Not) {
                self.advance();
                self.expect(&Token::Null)?;
                not_null = true;
            } else if self.check(&Token::Null) {
                self.advance();
                // NULL is allowed (default)
            } else if self.check_word("PRIMARY") {
                self.advance();
                self.expect_word("KEY")?;
                primary_key = true;
                not_null = true;
            } else if self.check_word("UNIQUE") {
                self.advance();
                unique = true;
            } else {
                break;
            }
        }

        Ok(ColumnDef {
            name,
            type_name,
            not_null,
            primary_key,
            unique,
        })
    }

    /// Type words are free-form: any identifiers, optionally followed by `(n)` or `(n, m)`
    fn parse_type_name(&mut self) -> Result<Option<String>> {
        let mut words = Vec::new();
        while let Token::Identifier(word) = self.current().clone() {
            if is_constraint_word(&word) {
                break;
            }
            self.advance();
            words.push(word);
        }
        if words.is_empty() {
            return Ok(None);
        }

        let mut type_name = words.join(" ");
        if self.check(&Token::LParen) {
            self.advance();
            let mut sizes = vec![self.expect_integer()?.to_string()];
            if self.check(&Token::Comma) {
                self.advance();
                sizes.push(self.expect_integer()?.to_string());
            }
            self.expect(&Token::RParen)?;
            type_name = format!("{}({})", type_name, sizes.join(","));
        }
        Ok(Some(type_name))
    }

    fn parse_table_constraint(&mut self) -> Result<TableConstraint> {
        if self.check_word("PRIMARY") {
            self.advance();
            self.expect_word("KEY")?;
            self.expect(&Token::LParen)?;
            let columns = self.parse_name_list()?;
            self.expect(&Token::RParen)?;
            Ok(TableConstraint::PrimaryKey { columns })
        } else if self.check_word("UNIQUE") {
            self.advance();
            self.expect(&Token::LParen)?;
            let columns = self.parse_name_list()?;
            self.expect(&Token::RParen)?;
            Ok(TableConstraint::Unique { columns })
        } else {
            Err(Error::UnexpectedToken {
                expected: "PRIMARY or UNIQUE".to_string(),
                found: format!("{}", self.current()),
            })
        }
    }

    // ========== Expression Parsing ==========
    //
    // Each level returns the subtree with its height, so oversized trees
    // are rejected before they are built.

    fn parse_expr(&mut self) -> Result<Tree> {
        self.parse_or_expr()
    }

    fn parse_or_expr(&mut self) -> Result<Tree> {
        let mut left = self.parse_and_expr()?;

        while self.check(&Token::Or) {
            self.advance();
            let right = self.parse_and_expr()?;
            left = binary(left, BinaryOperator::Or, right)?;
        }

        Ok(left)
    }

    fn parse_and_expr(&mut self) -> Result<Tree> {
        let mut left = self.parse_not_expr()?;

        while self.check(&Token::And) {
            self.advance();
            let right = self.parse_not_expr()?;
            left = binary(left, BinaryOperator::And, right)?;
        }

        Ok(left)
    }

    fn parse_not_expr(&mut self) -> Result<Tree> {
        if self.check(&Token::Not) {
            self.advance();
            let operand = self.nested(Self::parse_not_expr)?;
            unary(UnaryOperator::Not, operand)
        } else {
            self.parse_comparison_expr()
        }
    }

    fn parse_comparison_expr(&mut self) -> Result<Tree> {
        let mut left = self.parse_additive_expr()?;

        // Comparisons share one level and chain to the left
        loop {
            let op = match self.current() {
                Token::Eq => BinaryOperator::Eq,
                Token::Neq => BinaryOperator::Neq,
                Token::Lt => BinaryOperator::Lt,
                Token::Gt => BinaryOperator::Gt,
                Token::Lte => BinaryOperator::Lte,
                Token::Gte => BinaryOperator::Gte,
                _ => break,
            };
            self.advance();
            let right = self.parse_additive_expr()?;
            left = binary(left, op, right)?;
        }

        Ok(left)
    }

    fn parse_additive_expr(&mut self) -> Result<Tree> {
        let mut left = self.parse_multiplicative_expr()?;

        loop {
            let op = match self.current() {
                Token::Plus => BinaryOperator::Add,
                Token::Minus => BinaryOperator::Sub,
                _ => break,
            };
            self.advance();
            let right = self.parse_multiplicative_expr()?;
            left = binary(left, op, right)?;
        }

        Ok(left)
    }

    fn parse_multiplicative_expr(&mut self) -> Result<Tree> {
        let mut left = self.parse_unary_expr()?;

        loop {
            let op = match self.current() {
                Token::Asterisk => BinaryOperator::Mul,
                Token::Slash => BinaryOperator::Div,
                Token::Percent => BinaryOperator::Mod,
                _ => break,
            };
            self.advance();
            let right = self.parse_unary_expr()?;
            left = binary(left, op, right)?;
        }

        Ok(left)
    }

    fn parse_unary_expr(&mut self) -> Result<Tree> {
        let op = match self.current() {
            Token::Minus => UnaryOperator::Minus,
            Token::Plus => UnaryOperator::Plus,
            _ => return self.parse_primary_expr(),
        };
        self.advance();

        // `-9223372036854775808` is the one integer whose magnitude only fits negated
        if op == UnaryOperator::Minus
            && *self.current() == Token::IntegerLiteral(i64::MIN.unsigned_abs())
        {
            self.advance();
            return Ok((Expr::Literal(Literal::Integer(i64::MIN)), 1));
        }

        let operand = self.nested(Self::parse_unary_expr)?;
        unary(op, operand)
    }

    fn parse_primary_expr(&mut self) -> Result<Tree> {
        let literal = match self.current().clone() {
            Token::IntegerLiteral(n) => {
                i64::try_from(n).map_or(Literal::Float(n as f64), Literal::Integer)
            }
            Token::FloatLiteral(n) => Literal::Float(n),
            Token::StringLiteral(s) => Literal::String(s),
            Token::BlobLiteral(b) => Literal::Blob(b),
            Token::True => Literal::Boolean(true),
            Token::False => Literal::Boolean(false),
            Token::Null => Literal::Null,

            // Column reference: a.b.c
            Token::Identifier(first) => {
                self.advance();
                let mut name = first;
                while self.check(&Token::Dot) {
                    self.advance();
                    let part = self.expect_identifier()?;
                    name.push('.');
                    name.push_str(&part);
                }
                return Ok((Expr::Column(name), 1));
            }

            // Parenthesized expression
            Token::LParen => {
                self.advance();
                let (inner, height) = self.nested(Self::parse_expr)?;
                self.expect(&Token::RParen)?;
                return grow(Expr::Nested(Box::new(inner)), height);
            }

            Token::Eof => return Err(Error::UnexpectedEof("expression".to_string())),

            other => {
                return Err(Error::UnexpectedToken {
                    expected: "expression".to_string(),
                    found: format!("{}", other),
                })
            }
        };
        self.advance();
        Ok((Expr::Literal(literal), 1))
    }

    /// Run a recursive production one nesting level deeper
    fn nested(&mut self, parse: fn(&mut Self) -> Result<Tree>) -> Result<Tree> {
        if self.nesting >= MAX_NESTING {
            return Err(Error::ExpressionTooDeep(MAX_NESTING));
        }
        self.nesting += 1;
        let result = parse(self);
        self.nesting -= 1;
        result
    }

    // ========== Helper functions ==========

    fn parse_name_list(&mut self) -> Result<Vec<String>> {
        let mut names = Vec::new();

        loop {
            names.push(self.expect_name()?);

            if !self.check(&Token::Comma) {
                break;
            }
            self.advance();
        }

        Ok(names)
    }

    fn current(&self) -> &Token {
        self.tokens.get(self.position).unwrap_or(&Token::Eof)
    }

    fn peek(&self) -> &Token {
        self.tokens.get(self.position + 1).unwrap_or(&Token::Eof)
    }

    /// Constraint words are identifiers outside column definitions
    fn check_word(&self, word: &str) -> bool {
        matches!(self.current(), Token::Identifier(w) if w.eq_ignore_ascii_case(word))
    }

    fn peek_word(&self, word: &str) -> bool {
        matches!(self.peek(), Token::Identifier(w) if w.eq_ignore_ascii_case(word))
    }

    fn expect_word(&mut self, word: &str) -> Result<()> {
        if self.check_word(word) {
            self.advance();
            Ok(())
        } else if self.is_at_end() {
            Err(Error::UnexpectedEof(word.to_string()))
        } else {
            Err(Error::UnexpectedToken {
                expected: word.to_string(),
                found: format!("{}", self.current()),
            })
        }
    }

    fn advance(&mut self) {
        if self.position < self.tokens.len() {
            self.position += 1;
        }
    }

    fn is_at_end(&self) -> bool {
        matches!(self.current(), Token::Eof)
    }

    fn check(&self, token: &Token) -> bool {
        std::mem::discriminant(self.current()) == std::mem::discriminant(token)
    }

    fn expect(&mut self, token: &Token) -> Result<()> {
        if self.check(token) {
            self.advance();
            Ok(())
        } else if self.is_at_end() {
            Err(Error::UnexpectedEof(format!("{}", token)))
        } else {
            Err(Error::UnexpectedToken {
                expected: format!("{}", token),
                found: format!("{}", self.current()),
            })
        }
    }

    fn expect_end(&self) -> Result<()> {
        if self.is_at_end() {
            Ok(())
        } else {
            Err(Error::UnexpectedToken {
                expected: "end of input".to_string(),
                found: format!("{}", self.current()),
            })
        }
    }

    fn expect_identifier(&mut self) -> Result<String> {
        match self.current().clone() {
            Token::Identifier(name) => {
                self.advance();
                Ok(name)
            }
            _ => Err(Error::UnexpectedToken {
                expected: "identifier".to_string(),
                found: format!("{}", self.current()),
            }),
        }
    }

    /// A column name: bare identifier or quoted
    fn expect_name(&mut self) -> Result<String> {
        match self.current().clone() {
            Token::Identifier(name) | Token::StringLiteral(name) => {
                self.advance();
                Ok(name)
            }
            token if token.is_keyword() => Err(Error::UnexpectedToken {
                expected: "column name (keywords must be quoted)".to_string(),
                found: format!("{}", token),
            }),
            _ => Err(Error::UnexpectedToken {
                expected: "column name".to_string(),
                found: format!("{}", self.current()),
            }),
        }
    }

    fn expect_integer(&mut self) -> Result<u64> {
        match self.current().clone() {
            Token::IntegerLiteral(n) => {
                self.advance();
                Ok(n)
            }
            _ => Err(Error::UnexpectedToken {
                expected: "integer".to_string(),
                found: format!("{}", self.current()),
            }),
        }
    }
}

fn is_constraint_word(word: &str) -> bool {
    ["PRIMARY", "UNIQUE"]
        .iter()
        .any(|w| w.eq_ignore_ascii_case(word))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(sql: &str) -> Expr {
        Parser::new(sql).unwrap().parse_expression().unwrap()
    }

    fn binary(left: Expr, op: BinaryOperator, right: Expr) -> Expr {
        Expr::BinaryOp {
            left: Box::new(left),
            op,
            right: Box::new(right),
        }
    }

    fn int(n: i64) -> Expr {
        Expr::Literal(Literal::Integer(n))
    }

    #[test]
    fn test_parse_precedence() {
        assert_eq!(
            parse("3+4*5"),
            binary(int(3), BinaryOperator::Add, binary(int(4), BinaryOperator::Mul, int(5)))
        );
    }

    #[test]
    fn test_parse_and_binds_tighter_than_or() {
        let expr = parse("0 and 1 or 1 and 0");
        assert!(matches!(
            expr,
            Expr::BinaryOp {
                op: BinaryOperator::Or,
                ..
            }
        ));
    }

    #[test]
    fn test_parse_not_below_comparison() {
        match parse("NOT 1 = 2") {
            Expr::UnaryOp {
                op: UnaryOperator::Not,
                expr,
            } => assert!(matches!(
                *expr,
                Expr::BinaryOp {
                    op: BinaryOperator::Eq,
                    ..
                }
            )),
            other => panic!("Expected NOT, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_comparison_chain_is_left_associative() {
        assert_eq!(
            parse("1 < 2 < 3"),
            binary(binary(int(1), BinaryOperator::Lt, int(2)), BinaryOperator::Lt, int(3))
        );
    }

    #[test]
    fn test_parse_unary_chain() {
        let expr = parse("-+-1");
        assert_eq!(expr.to_string(), "-+-1");
    }

    #[test]
    fn test_parse_dotted_column() {
        assert_eq!(parse("foo.bar.baz"), Expr::Column("foo.bar.baz".to_string()));
    }

    #[test]
    fn test_parse_errors() {
        for bad in ["(1+2", "1+2)", "1 2", "", "1 +", "foo.", "* 3"] {
            let result = Parser::new(bad).and_then(|mut p| p.parse_expression());
            let err = result.expect_err(bad);
            assert!(err.is_parse_error(), "{}: {:?}", bad, err);
        }
    }

    #[test]
    fn test_parse_column_def() {
        let element = Parser::new("id INTEGER PRIMARY KEY")
            .unwrap()
            .parse_table_element()
            .unwrap();
        assert_eq!(
            element,
            TableElement::Column(ColumnDef {
                name: "id".to_string(),
                type_name: Some("INTEGER".to_string()),
                not_null: true,
                primary_key: true,
                unique: false,
            })
        );
    }

    #[test]
    fn test_parse_column_def_type_words() {
        let element = Parser::new("name unsigned big varchar(10, 2) NOT NULL UNIQUE")
            .unwrap()
            .parse_table_element()
            .unwrap();
        match element {
            TableElement::Column(col) => {
                assert_eq!(col.type_name.as_deref(), Some("unsigned big varchar(10,2)"));
                assert!(col.not_null);
                assert!(col.unique);
                assert!(!col.primary_key);
            }
            other => panic!("Expected column, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_table_constraint() {
        let element = Parser::new("PRIMARY KEY (a, \"b\")")
            .unwrap()
            .parse_table_element()
            .unwrap();
        assert_eq!(
            element,
            TableElement::Constraint(TableConstraint::PrimaryKey {
                columns: vec!["a".to_string(), "b".to_string()],
            })
        );

        assert!(Parser::new("UNIQUE ()")
            .unwrap()
            .parse_table_element()
            .is_err());
    }

    #[test]
    fn test_keyword_column_name_must_be_quoted() {
        let err = Parser::new("null INTEGER")
            .unwrap()
            .parse_table_element()
            .unwrap_err();
        assert!(err.to_string().contains("keywords must be quoted"), "{}", err);

        let element = Parser::new("\"null\" INTEGER")
            .unwrap()
            .parse_table_element()
            .unwrap();
        assert!(matches!(element, TableElement::Column(ColumnDef { ref name, .. }) if name == "null"));
    }

    #[test]
    fn test_constraint_words_are_column_names_in_expressions() {
        assert_eq!(
            parse("kv.key + 1"),
            binary(Expr::Column("kv.key".to_string()), BinaryOperator::Add, int(1))
        );
        assert_eq!(parse("t.unique"), Expr::Column("t.unique".to_string()));
        assert_eq!(parse("primary"), Expr::Column("primary".to_string()));

        let element = Parser::new("key TEXT UNIQUE")
            .unwrap()
            .parse_table_element()
            .unwrap();
        match element {
            TableElement::Column(col) => {
                assert_eq!(col.name, "key");
                assert_eq!(col.type_name.as_deref(), Some("TEXT"));
                assert!(col.unique);
            }
            other => panic!("Expected column, got {:?}", other),
        }
    }

    #[test]
    fn test_negated_minimum_integer_folds() {
        assert_eq!(
            parse("-9223372036854775808"),
            Expr::Literal(Literal::Integer(i64::MIN))
        );
        assert_eq!(
            parse("9223372036854775808"),
            Expr::Literal(Literal::Float(9223372036854775808.0))
        );
        // Only the literal itself folds
        assert!(matches!(
            parse("-(9223372036854775808)"),
            Expr::UnaryOp {
                op: UnaryOperator::Minus,
                ..
            }
        ));
    }

    #[test]
    fn test_nesting_limit() {
        let deep = format!("{}1{}", "(".repeat(3000), ")".repeat(3000));
        let err = Parser::new(&deep).unwrap().parse_expression().unwrap_err();
        assert!(matches!(err, Error::ExpressionTooDeep(MAX_NESTING)));
        assert!(err.is_parse_error());

        let nots = format!("{}1", "NOT ".repeat(MAX_NESTING + 1));
        assert!(matches!(
            Parser::new(&nots).unwrap().parse_expression(),
            Err(Error::ExpressionTooDeep(_))
        ));

        let fits = format!("{}1{}", "(".repeat(100), ")".repeat(100));
        assert!(Parser::new(&fits).unwrap().parse_expression().is_ok());
    }

    #[test]
    fn test_height_limit() {
        let long = vec!["1"; MAX_HEIGHT + 1].join(" + ");
        assert!(matches!(
            Parser::new(&long).unwrap().parse_expression(),
            Err(Error::ExpressionTooDeep(MAX_HEIGHT))
        ));

        let fits = vec!["1"; MAX_HEIGHT / 2].join(" + ");
        assert!(Parser::new(&fits).unwrap().parse_expression().is_ok());
    }
}
