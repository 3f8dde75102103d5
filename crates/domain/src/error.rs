use thiserror::Error;

/// Error taxonomy surfaced to callers. Domain errors bubble unchanged from
/// the store and gateway through the orchestrator to the API layer, which
/// maps them one-to-one onto HTTP statuses.
#[derive(Debug, Error)]
pub enum BookingError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("unauthorized")]
    Unauthorized,

    /// Circuit open or upstream unreachable; maps to 5xx.
    #[error("{0}")]
    Dependency(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl BookingError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        BookingError::BadRequest(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        BookingError::NotFound(message.into())
    }

    pub fn dependency(message: impl Into<String>) -> Self {
        BookingError::Dependency(message.into())
    }
}

pub type BookingResult<T> = std::result::Result<T, BookingError>;
