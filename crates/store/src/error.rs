use thiserror::Error;

/// Errors that can occur when reading or writing checkout state.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A write lost against concurrent state: a conditional update matched
    /// no row, or a unique constraint was violated.
    #[error("Conflict on {entity} {id}: {reason}")]
    Conflict {
        entity: &'static str,
        id: String,
        reason: String,
    },

    /// A row the unit of work expected to update does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// A stored row could not be mapped back into the domain model.
    #[error("Invalid stored row: {0}")]
    InvalidRow(String),

    /// The commit itself was rejected; nothing was applied.
    #[error("Commit failed: {0}")]
    CommitFailed(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

impl StoreError {
    pub(crate) fn conflict(entity: &'static str, id: impl ToString, reason: impl Into<String>) -> Self {
        StoreError::Conflict {
            entity,
            id: id.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn not_found(entity: &'static str, id: impl ToString) -> Self {
        StoreError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Returns true if retrying against fresh state might succeed.
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
