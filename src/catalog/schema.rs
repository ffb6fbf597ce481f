//! Schema definitions for sqlvtab
//!
//! This module defines table schemas and column metadata, built from the
//! module arguments a virtual table is declared with.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::sql::{self, TableConstraint, TableElement};

/// Column index the host uses for the hidden rowid
pub const ROWID_COLUMN: i32 = -1;

/// Column definition in a table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    /// Column name
    pub name: String,
    /// Declared type words, kept verbatim for the declaration
    pub type_name: Option<String>,
    /// Column position (0-indexed)
    pub position: usize,
    /// Is this column nullable?
    pub nullable: bool,
    /// Is this part of the primary key?
    pub primary_key: bool,
    /// Is this column unique?
    pub unique: bool,
}

impl Column {
    /// Create a new column with minimal required fields
    pub fn new(name: impl Into<String>, position: usize) -> Self {
        Self {
            name: name.into(),
            type_name: None,
            position,
            nullable: true,
            primary_key: false,
            unique: false,
        }
    }

    /// Set the declared type
    pub fn type_name(mut self, type_name: impl Into<String>) -> Self {
        self.type_name = Some(type_name.into());
        self
    }

    /// Set nullable flag
    pub fn nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    /// Set primary key flag
    pub fn primary_key(mut self, pk: bool) -> Self {
        self.primary_key = pk;
        if pk {
            self.nullable = false;
        }
        self
    }

    /// Set unique flag
    pub fn unique(mut self, unique: bool) -> Self {
        self.unique = unique;
        self
    }
}

/// Table schema - defines the structure of a table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schema {
    /// Table name
    table_name: String,
    /// Ordered list of columns
    columns: Vec<Column>,
    /// Column name to index mapping
    name_to_index: HashMap<String, usize>,
    /// Primary key column positions, in key order
    primary_key: Vec<usize>,
    /// Column position sets that must be unique
    unique_sets: Vec<Vec<usize>>,
}

impl Schema {
    /// Create a new empty schema
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            columns: Vec::new(),
            name_to_index: HashMap::new(),
            primary_key: Vec::new(),
            unique_sets: Vec::new(),
        }
    }

    /// Build a schema from module arguments.
    ///
    /// Each argument is either a column definition
    /// (`name [type words] [PRIMARY KEY] [NOT NULL] [UNIQUE]`) or a table
    /// constraint (`PRIMARY KEY (a, b)`, `UNIQUE (a, b)`). Table constraints
    /// may name columns declared after them.
    pub fn from_args<S: AsRef<str>>(table_name: impl Into<String>, args: &[S]) -> Result<Self> {
        let mut schema = Self::new(table_name);
        let mut constraints = Vec::new();

        for arg in args {
            match sql::parse_table_element(arg.as_ref())? {
                TableElement::Column(def) => {
                    let mut column = Column::new(def.name, 0)
                        .nullable(!def.not_null)
                        .primary_key(def.primary_key)
                        .unique(def.unique);
                    column.type_name = def.type_name;
                    schema.add_column(column)?;
                }
                TableElement::Constraint(c) => constraints.push(c),
            }
        }

        if schema.columns.is_empty() {
            return Err(Error::Schema(format!(
                "table '{}' declares no columns",
                schema.table_name
            )));
        }

        for constraint in constraints {
            match constraint {
                TableConstraint::PrimaryKey { columns } => {
                    let positions = schema.resolve(&columns)?;
                    schema.set_primary_key(positions)?;
                }
                TableConstraint::Unique { columns } => {
                    let positions = schema.resolve(&columns)?;
                    schema.add_unique(positions);
                }
            }
        }

        Ok(schema)
    }

    /// Add a column to the schema
    pub fn add_column(&mut self, mut column: Column) -> Result<()> {
        if self.has_column(&column.name) {
            return Err(Error::ColumnAlreadyExists(
                column.name,
                self.table_name.clone(),
            ));
        }
        column.position = self.columns.len();
        if column.primary_key {
            self.set_primary_key(vec![column.position])?;
        }
        if column.unique {
            self.add_unique(vec![column.position]);
        }
        self.name_to_index
            .insert(column.name.clone(), column.position);
        self.columns.push(column);
        Ok(())
    }

    fn set_primary_key(&mut self, positions: Vec<usize>) -> Result<()> {
        if !self.primary_key.is_empty() {
            return Err(Error::Schema(format!(
                "table '{}' has more than one primary key",
                self.table_name
            )));
        }
        for &p in &positions {
            if let Some(col) = self.columns.get_mut(p) {
                col.primary_key = true;
                col.nullable = false;
            }
        }
        self.primary_key = positions;
        Ok(())
    }

    fn add_unique(&mut self, positions: Vec<usize>) {
        if !self.unique_sets.contains(&positions) {
            self.unique_sets.push(positions);
        }
    }

    fn resolve(&self, names: &[String]) -> Result<Vec<usize>> {
        let mut positions = Vec::with_capacity(names.len());
        for name in names {
            let p = self
                .get_column(name)
                .map(|col| col.position)
                .ok_or_else(|| Error::ColumnNotFound(name.clone(), self.table_name.clone()))?;
            if positions.contains(&p) {
                return Err(Error::Schema(format!(
                    "column '{}' named twice in one constraint",
                    name
                )));
            }
            positions.push(p);
        }
        Ok(positions)
    }

    /// Table name
    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    /// Get column by name
    pub fn get_column(&self, name: &str) -> Option<&Column> {
        self.name_to_index.get(name).map(|&idx| &self.columns[idx])
    }

    /// Get all columns
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Get number of columns
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Check if column exists
    pub fn has_column(&self, name: &str) -> bool {
        self.name_to_index.contains_key(name)
    }

    /// Whether rows are keyed by a declared primary key rather than the rowid
    pub fn has_primary_key(&self) -> bool {
        !self.primary_key.is_empty()
    }

    /// Primary key column positions
    pub fn primary_key(&self) -> &[usize] {
        &self.primary_key
    }

    /// Columns the store keys rows by: the primary key, else the rowid
    pub fn key_columns(&self) -> Vec<i32> {
        if self.primary_key.is_empty() {
            vec![ROWID_COLUMN]
        } else {
            self.primary_key.iter().map(|&p| p as i32).collect()
        }
    }

    /// Column position sets that must be unique
    pub fn unique_sets(&self) -> &[Vec<usize>] {
        &self.unique_sets
    }

    /// Get column names
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// `table.column` for a column position
    pub fn qualified_name(&self, position: usize) -> Option<String> {
        self.columns
            .get(position)
            .map(|c| format!("{}.{}", self.table_name, c.name))
    }

    /// The CREATE TABLE statement handed to the host
    pub fn declaration(&self) -> String {
        let quote = |name: &str| format!("\"{}\"", name.replace('"', "\"\""));
        let quote_list = |positions: &[usize]| {
            positions
                .iter()
                .map(|&p| quote(&self.columns[p].name))
                .collect::<Vec<_>>()
                .join(",")
        };

        let mut parts: Vec<String> = self
            .columns
            .iter()
            .map(|c| {
                let mut def = quote(&c.name);
                if let Some(t) = &c.type_name {
                    def.push(' ');
                    def.push_str(t);
                }
                if !c.nullable {
                    def.push_str(" NOT NULL");
                }
                def
            })
            .collect();

        if !self.primary_key.is_empty() {
            parts.push(format!("PRIMARY KEY({})", quote_list(&self.primary_key)));
        }
        for set in &self.unique_sets {
            parts.push(format!("UNIQUE({})", quote_list(set)));
        }

        format!("CREATE TABLE x({})", parts.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_creation() {
        let mut schema = Schema::new("users");
        schema
            .add_column(Column::new("id", 0).type_name("INTEGER").primary_key(true))
            .unwrap();
        schema
            .add_column(Column::new("name", 1).nullable(false))
            .unwrap();
        schema.add_column(Column::new("email", 2).unique(true)).unwrap();

        assert_eq!(schema.column_count(), 3);
        assert!(schema.has_column("id"));
        assert!(!schema.has_column("unknown"));

        let id_col = schema.get_column("id").unwrap();
        assert!(id_col.primary_key);
        assert!(!id_col.nullable);

        assert_eq!(schema.key_columns(), vec![0]);
        assert_eq!(schema.unique_sets(), &[vec![2]]);
        assert_eq!(schema.qualified_name(2).as_deref(), Some("users.email"));
    }

    #[test]
    fn test_from_args() {
        let schema = Schema::from_args(
            "t",
            &["a INTEGER", "b TEXT NOT NULL", "c", "PRIMARY KEY (b, a)", "UNIQUE(c, a)"],
        )
        .unwrap();

        assert_eq!(schema.column_names(), vec!["a", "b", "c"]);
        assert_eq!(schema.key_columns(), vec![1, 0]);
        assert_eq!(schema.unique_sets(), &[vec![2, 0]]);
        assert!(!schema.get_column("a").unwrap().nullable);
        assert!(schema.get_column("c").unwrap().nullable);
        assert_eq!(
            schema.declaration(),
            "CREATE TABLE x(\"a\" INTEGER NOT NULL, \"b\" TEXT NOT NULL, \"c\", \
             PRIMARY KEY(\"b\",\"a\"), UNIQUE(\"c\",\"a\"))"
        );
    }

    #[test]
    fn test_rowid_table() {
        let schema = Schema::from_args("t", &["a", "b UNIQUE"]).unwrap();
        assert!(!schema.has_primary_key());
        assert_eq!(schema.key_columns(), vec![ROWID_COLUMN]);
        assert_eq!(
            schema.declaration(),
            "CREATE TABLE x(\"a\", \"b\", UNIQUE(\"b\"))"
        );
    }

    #[test]
    fn test_schema_errors() {
        assert!(matches!(
            Schema::from_args("t", &["a", "a"]),
            Err(Error::ColumnAlreadyExists(..))
        ));
        assert!(matches!(
            Schema::from_args("t", &["a", "PRIMARY KEY(b)"]),
            Err(Error::ColumnNotFound(..))
        ));
        assert!(matches!(
            Schema::from_args("t", &["a PRIMARY KEY", "b PRIMARY KEY"]),
            Err(Error::Schema(_))
        ));
        let no_args: [&str; 0] = [];
        assert!(matches!(
            Schema::from_args("t", &no_args),
            Err(Error::Schema(_))
        ));
        assert!(Schema::from_args("t", &["a +"]).unwrap_err().is_parse_error());
    }
}
