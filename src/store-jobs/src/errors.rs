use diesel::result::{DatabaseErrorKind, Error as DieselError};

use data_model_jobs::db::PoolError;

/// Coarse class of a failed store operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A uniqueness, foreign-key, not-null or check constraint was violated.
    Integrity,
    /// Connectivity, pool exhaustion, lock wait, deadlock or serialization failure. Retrying may succeed.
    Transient,
    /// Anything else.
    Unexpected,
}

/// A store operation that was rolled back. Produced only by [`crate::unit_of_work`].
#[derive(Debug)]
pub enum Error {
    IntegrityViolation(String),
    TransientStoreError(String),
    UnexpectedError(String),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::IntegrityViolation(_) => ErrorKind::Integrity,
            Self::TransientStoreError(_) => ErrorKind::Transient,
            Self::UnexpectedError(_) => ErrorKind::Unexpected,
        }
    }

    /// True if the same call may succeed when repeated later.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::IntegrityViolation(msg) => write!(f, "Integrity violation: {}", msg),
            Self::TransientStoreError(msg) => write!(f, "Transient store error: {}", msg),
            Self::UnexpectedError(msg) => write!(f, "Unexpected error: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

// Server messages for lock and timeout failures that diesel reports as `DatabaseErrorKind::Unknown`.
const TRANSIENT_MESSAGES: &[&str] = &[
    "deadlock detected",
    "could not obtain lock",
    "lock timeout",
    "statement timeout",
    "terminating connection",
    "could not serialize access",
];

fn is_transient_message(message: &str) -> bool {
    let message = message.to_lowercase();
    TRANSIENT_MESSAGES.iter().any(|m| message.contains(m))
}

impl From<DieselError> for Error {
    fn from(error: DieselError) -> Self {
        match error {
            DieselError::DatabaseError(kind, info) => {
                let message = match info.constraint_name() {
                    Some(constraint) => format!("{} (constraint: {})", info.message(), constraint),
                    None => info.message().to_string(),
                };
                match kind {
                    DatabaseErrorKind::UniqueViolation
                    | DatabaseErrorKind::ForeignKeyViolation
                    | DatabaseErrorKind::NotNullViolation
                    | DatabaseErrorKind::CheckViolation => Self::IntegrityViolation(message),
                    DatabaseErrorKind::SerializationFailure
                    | DatabaseErrorKind::ClosedConnection
                    | DatabaseErrorKind::UnableToSendCommand => Self::TransientStoreError(message),
                    _ if is_transient_message(&message) => Self::TransientStoreError(message),
                    _ => Self::UnexpectedError(message),
                }
            }
            // the commit failed, then so did the rollback: the commit error decides the class
            DieselError::RollbackErrorOnCommit { commit_error, .. } => Self::from(*commit_error),
            DieselError::BrokenTransactionManager => Self::TransientStoreError("Broken transaction manager".to_string()),
            other => Self::UnexpectedError(other.to_string()),
        }
    }
}

impl From<PoolError> for Error {
    fn from(error: PoolError) -> Self {
        let description = format!("Database pool error: {:?}", error);
        match error {
            deadpool::managed::PoolError::NoRuntimeSpecified => Self::UnexpectedError(description),
            _ => Self::TransientStoreError(description),
        }
    }
}
