//! Table schema description and caller-supplied rows.
//!
//! The schema surface is deliberately narrow: the compiler only needs the
//! table name, an optional schema name, and the ordered column list with two
//! flags per column. Anything richer (ORM metadata, catalogs, migrations)
//! lives outside this crate and feeds in through [`TableSchema`].

use crate::value::Value;

/// One column of the target table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    /// Stable column name, as it appears in SQL.
    pub name: String,
    /// Value is assigned by the database; never written on insert.
    pub generated: bool,
    /// Participates in a primary/unique constraint.
    pub key: bool,
}

impl Column {
    /// Create a plain writable column.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            generated: false,
            key: false,
        }
    }

    /// Mark this column as part of the table's identity key.
    pub fn key(mut self) -> Self {
        self.key = true;
        self
    }

    /// Mark this column as database-generated.
    pub fn generated(mut self) -> Self {
        self.generated = true;
        self
    }
}

/// Read-only schema description consumed by the dialect compilers.
pub trait TableSchema: Send + Sync {
    /// Table name, unquoted.
    fn name(&self) -> &str;

    /// Schema/database qualifier, if any.
    fn schema_name(&self) -> Option<&str>;

    /// All columns in declaration order.
    fn columns(&self) -> &[Column];

    /// Look up a column by name.
    fn column(&self, name: &str) -> Option<&Column> {
        self.columns().iter().find(|c| c.name == name)
    }

    /// Columns participating in the declared identity key.
    fn key_columns(&self) -> Vec<&Column> {
        self.columns().iter().filter(|c| c.key).collect()
    }

    /// Columns written on insert: every non-generated column, in order.
    fn insert_columns(&self) -> Vec<&Column> {
        self.columns().iter().filter(|c| !c.generated).collect()
    }
}

/// Builder-constructed concrete schema.
///
/// ```
/// use upsertql::Table;
///
/// let visits = Table::new("page_visit")
///     .key_column("user_id")
///     .key_column("date")
///     .column("visits")
///     .column("first_visit")
///     .column("last_visit");
/// ```
#[derive(Debug, Clone)]
pub struct Table {
    name: String,
    schema: Option<String>,
    columns: Vec<Column>,
}

impl Table {
    /// Create a schema for the given table name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            schema: None,
            columns: Vec::new(),
        }
    }

    /// Qualify the table with a schema (or database) name.
    pub fn schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    /// Append a plain writable column.
    pub fn column(mut self, name: impl Into<String>) -> Self {
        self.columns.push(Column::new(name));
        self
    }

    /// Append a key column.
    pub fn key_column(mut self, name: impl Into<String>) -> Self {
        self.columns.push(Column::new(name).key());
        self
    }

    /// Append a database-generated key column (e.g. a serial primary key).
    pub fn generated_key_column(mut self, name: impl Into<String>) -> Self {
        self.columns.push(Column::new(name).key().generated());
        self
    }

    /// Append a database-generated non-key column.
    pub fn generated_column(mut self, name: impl Into<String>) -> Self {
        self.columns.push(Column::new(name).generated());
        self
    }
}

impl TableSchema for Table {
    fn name(&self) -> &str {
        &self.name
    }

    fn schema_name(&self) -> Option<&str> {
        self.schema.as_deref()
    }

    fn columns(&self) -> &[Column] {
        &self.columns
    }
}

/// One caller-supplied row, as an ordered column/value mapping.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    values: Vec<(String, Value)>,
}

impl Row {
    /// Create an empty row.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a column value, replacing any previous value for that column.
    pub fn set(mut self, column: &str, value: impl Into<Value>) -> Self {
        let value = value.into();
        if let Some(slot) = self.values.iter_mut().find(|(c, _)| c == column) {
            slot.1 = value;
        } else {
            self.values.push((column.to_string(), value));
        }
        self
    }

    /// Get a column value, if present.
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.values
            .iter()
            .find(|(c, _)| c == column)
            .map(|(_, v)| v)
    }

    /// Column names present on this row, in insertion order.
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.values.iter().map(|(c, _)| c.as_str())
    }

    /// Number of values on this row.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check whether the row is empty.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
