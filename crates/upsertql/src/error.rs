//! Error types for upsertql

use thiserror::Error;

/// Boxed driver-level error, as returned by an [`Executor`](crate::Executor).
pub type BoxDynError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result type alias for upsert operations
pub type UpsertResult<T> = Result<T, UpsertError>;

/// Error types for upsert compilation and execution
#[derive(Debug, Error)]
pub enum UpsertError {
    /// No usable identity columns for conflict detection
    #[error("Invalid match columns: {0}")]
    InvalidMatchColumns(String),

    /// A referenced column does not exist on the target table
    #[error("Unknown column '{column}' on table '{table}'")]
    UnknownColumn { table: String, column: String },

    /// An update computation cannot be translated to SQL
    #[error("Unsupported expression: {0}")]
    UnsupportedExpression(String),

    /// The selected engine cannot express a requested capability
    #[error("The {dialect} dialect does not support {feature}")]
    UnsupportedFeature {
        dialect: &'static str,
        feature: String,
    },

    /// A row does not fit the table: it is missing a value for a
    /// non-generated column, or carries a column the table lacks
    #[error("Row {row} does not match the table schema at column '{column}'")]
    SchemaMismatch { row: usize, column: String },

    /// Builder mis-use (conflicting or repeated clauses)
    #[error("Invalid upsert configuration: {0}")]
    InvalidConfig(String),

    /// No dialect is registered for the given provider name
    #[error("Unknown database provider '{0}'")]
    UnknownProvider(String),

    /// Driver error, passed through unchanged with batch context
    #[error("Statement batch {batch} failed: {source}")]
    Execute { batch: usize, source: BoxDynError },

    /// Cancellation observed before a statement was dispatched
    #[error("Upsert cancelled before dispatch")]
    Cancelled,
}

impl UpsertError {
    /// Create an unknown column error
    pub fn unknown_column(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self::UnknownColumn {
            table: table.into(),
            column: column.into(),
        }
    }

    /// Create an invalid match columns error
    pub fn invalid_match(message: impl Into<String>) -> Self {
        Self::InvalidMatchColumns(message.into())
    }

    /// Create an unsupported expression error
    pub fn unsupported_expression(message: impl Into<String>) -> Self {
        Self::UnsupportedExpression(message.into())
    }

    /// Create an unsupported feature error for a dialect
    pub fn unsupported_feature(dialect: &'static str, feature: impl Into<String>) -> Self {
        Self::UnsupportedFeature {
            dialect,
            feature: feature.into(),
        }
    }

    /// Create an invalid configuration error
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }

    /// Check if this is a driver-level execution error
    pub fn is_execute(&self) -> bool {
        matches!(self, Self::Execute { .. })
    }

    /// Check if this is a cancellation
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// The zero-based batch index, for execution errors
    pub fn batch(&self) -> Option<usize> {
        match self {
            Self::Execute { batch, .. } => Some(*batch),
            _ => None,
        }
    }
}
