/// Error types for sqlx-format-bind
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Error while compiling the placeholder grammar
    #[error("Failed to parse SQL template: {0}")]
    Parse(#[from] regex::Error),

    /// Error from SQLx database operations
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The template cannot be compiled against its argument list
    #[error("Malformed template: {0}")]
    MalformedTemplate(String),

    /// Argument at the given position cannot be reduced to a bindable value
    #[error("Argument {index} cannot be bound: {reason}")]
    UnsupportedArgument { index: usize, reason: String },

    /// A non-null column value could not be converted to the destination type
    #[error("Column '{column}' holds {found}, which cannot be converted to {expected}")]
    TypeCoercion {
        column: String,
        expected: &'static str,
        found: &'static str,
    },

    /// Column index outside the current record
    #[error("Column index {index} is out of range for a record with {count} fields")]
    ColumnOutOfRange { index: usize, count: usize },

    /// A row does not have one value per column
    #[error("Row has {found} values but the result has {expected} columns")]
    RowWidthMismatch { expected: usize, found: usize },

    /// A value was read before the result stream was advanced onto a row
    #[error("Result stream is not positioned on a row")]
    NoCurrentRow,

    /// The pool had nothing to lend and no way to construct a new instance
    #[error("No suitable constructor configured for pooled type {0}")]
    NoSuitableConstructor(&'static str),
}

/// Result type alias for sqlx-format-bind operations
pub type Result<T> = std::result::Result<T, Error>;
