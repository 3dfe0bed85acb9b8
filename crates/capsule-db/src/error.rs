use thiserror::Error;

pub type StoreResult<T> = Result<T, StoreError>;

/// Failures at the store boundary. Callers branch on [`StoreError::kind`],
/// never on the message text.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("record not found: {0}")]
    NotFound(String),
    #[error("corrupt record '{key}': {reason}")]
    Corrupt { key: String, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreErrorKind {
    Validation,
    Unavailable,
    PermissionDenied,
    NotFound,
    Corrupt,
}

impl StoreError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable(message.into())
    }

    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::PermissionDenied(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn corrupt(key: impl Into<String>, reason: impl ToString) -> Self {
        Self::Corrupt {
            key: key.into(),
            reason: reason.to_string(),
        }
    }

    pub fn kind(&self) -> StoreErrorKind {
        match self {
            Self::Validation(_) => StoreErrorKind::Validation,
            Self::Unavailable(_) => StoreErrorKind::Unavailable,
            Self::PermissionDenied(_) => StoreErrorKind::PermissionDenied,
            Self::NotFound(_) => StoreErrorKind::NotFound,
            Self::Corrupt { .. } => StoreErrorKind::Corrupt,
        }
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Unavailable(err.to_string())
    }
}
