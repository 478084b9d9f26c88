use thiserror::Error;

/// Errors that can occur while relinking and committing an inventory batch.
///
/// Data-quality variants carry the offending dataset as `database/code` and a
/// description of the exchange so the input can be corrected directly.
#[derive(Error, Debug)]
pub enum RelinkError {
    #[error("missing field '{field}' in exchange {exchange} of dataset {dataset}")]
    MissingField {
        dataset: String,
        exchange: String,
        field: String,
    },

    #[error("invalid exchange type '{found}' in exchange {exchange} of dataset {dataset}")]
    InvalidType {
        dataset: String,
        exchange: String,
        found: String,
    },

    #[error("non-numeric amount {found} in exchange {exchange} of dataset {dataset}")]
    NonNumericAmount {
        dataset: String,
        exchange: String,
        found: String,
    },

    #[error("invalid input shape in exchange {exchange} of dataset {dataset}: {message}")]
    InvalidInputShape {
        dataset: String,
        exchange: String,
        message: String,
    },

    #[error(
        "production exchange {exchange} of dataset {dataset} must point to ({expected}) but got ({found})"
    )]
    ProductionSelfReference {
        dataset: String,
        exchange: String,
        expected: String,
        found: String,
    },

    #[error(
        "could not resolve biosphere exchange in dataset {dataset} and synthetic flows are disabled: \
         name={name:?}, mapped_to={mapped_to:?}, categories={categories:?}, unit={unit:?}"
    )]
    UnresolvedReference {
        dataset: String,
        name: String,
        mapped_to: String,
        categories: Vec<String>,
        unit: String,
    },

    #[error("mapping file format error: {message} (path: {path})")]
    MappingFileFormat { message: String, path: String },

    #[error("mapping file not found: {path}")]
    MappingFileNotFound { path: String },

    #[error("input error: {message} (path: {path})")]
    Input { message: String, path: String },

    #[error("unknown reference database '{name}'")]
    UnknownDatabase { name: String },

    #[error("database error: {message} (operation: {operation})")]
    Database { message: String, operation: String },

    #[error("config error: {message}")]
    Config { message: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
}

impl RelinkError {
    /// Returns `true` for errors caused by the content of the input data or
    /// override table rather than by the environment.
    pub fn is_data_error(&self) -> bool {
        matches!(
            self,
            RelinkError::MissingField { .. }
                | RelinkError::InvalidType { .. }
                | RelinkError::NonNumericAmount { .. }
                | RelinkError::InvalidInputShape { .. }
                | RelinkError::ProductionSelfReference { .. }
                | RelinkError::UnresolvedReference { .. }
                | RelinkError::MappingFileFormat { .. }
        )
    }
}

/// Convenience alias for results using `RelinkError`.
pub type Result<T> = std::result::Result<T, RelinkError>;
