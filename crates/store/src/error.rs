use thiserror::Error;

/// Errors that can occur when reading or writing the store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A unique constraint rejected the write.
    #[error("Unique constraint violated: {constraint}")]
    UniqueViolation { constraint: String },

    /// A check constraint rejected the write.
    #[error("Constraint violated: {0}")]
    Constraint(String),

    /// A stored row could not be mapped back to a domain value.
    #[error("Corrupt row: {0}")]
    Corrupt(String),
}

impl StoreError {
    /// Returns the violated unique constraint name, if this is a unique violation.
    pub fn unique_constraint(&self) -> Option<&str> {
        match self {
            StoreError::UniqueViolation { constraint } => Some(constraint),
            _ => None,
        }
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
