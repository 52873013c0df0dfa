use thiserror::Error;

#[derive(Error, Debug)]
pub enum BookingLockError {
    #[error("Slot not found")]
    SlotNotFound,

    #[error("Lock not found")]
    LockNotFound,

    #[error("Slot already locked")]
    AlreadyLocked,

    #[error("Not the lock holder")]
    NotHolder,

    #[error("Invalid lock duration: {0}")]
    InvalidTtl(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<BookingLockError> for shared_models::error::AppError {
    fn from(err: BookingLockError) -> Self {
        use shared_models::error::AppError;
        match err {
            BookingLockError::SlotNotFound => AppError::NotFound("Slot not found".to_string()),
            BookingLockError::LockNotFound => AppError::NotFound("Lock not found".to_string()),
            BookingLockError::AlreadyLocked => AppError::Conflict("Slot already locked".to_string()),
            BookingLockError::NotHolder => AppError::Forbidden("Not the lock holder".to_string()),
            BookingLockError::InvalidTtl(msg) => AppError::ValidationError(msg),
            BookingLockError::DatabaseError(msg) => AppError::Database(msg),
        }
    }
}
