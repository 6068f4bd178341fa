use thiserror::Error;

/// A record does not conform to a table schema.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SchemaError {
    #[error("missing column '{0}'")]
    MissingColumn(String),

    #[error("unexpected column '{0}'")]
    UnexpectedColumn(String),

    #[error("column '{column}' expects {expected}, got {actual}")]
    TypeMismatch {
        column: String,
        expected: String,
        actual: String,
    },

    #[error("column '{0}' is required but null")]
    NullInRequired(String),

    #[error("invalid schema: {0}")]
    Invalid(String),
}
