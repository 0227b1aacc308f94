use thiserror::Error;

pub type SheetResult<T> = Result<T, SheetError>;

#[derive(Error, Debug)]
pub enum SheetError {
    #[error("Column '{column}' not found (available: {})", available.join(", "))]
    ColumnNotFound {
        column: String,
        available: Vec<String>,
    },

    #[error("No header row in {0}")]
    EmptyHeader(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to read workbook: {0}")]
    Read(String),

    #[error("Failed to write workbook: {0}")]
    Write(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("A run is already in progress")]
    Busy,

    #[error("Run cancelled")]
    Cancelled,
}

impl SheetError {
    /// Build a `ColumnNotFound` carrying the header names for the message
    pub fn column_not_found(column: &str, available: &[String]) -> Self {
        SheetError::ColumnNotFound {
            column: column.to_string(),
            available: available.to_vec(),
        }
    }

    /// True for errors that abort a run as `Failed`
    pub fn is_fatal(&self) -> bool {
        !matches!(self, SheetError::Cancelled)
    }
}
