use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use mixtape_core::{AuthError, MetricsError, QueueError, RoomError, StoreError, TokenError};
use thiserror::Error;

pub type ServerResult<T> = Result<T, ServerError>;

/// The error taxonomy exposed over HTTP.
///
/// Forbidden carries one opaque message on purpose, so a caller cannot tell
/// which of the security checks refused them.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("Access denied")]
    Forbidden,
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error("{0}")]
    InvalidInput(String),
    #[error("Store is unavailable, try again later")]
    Unavailable,
    #[error("Unknown internal error: {0}")]
    Unknown(String),
}

impl ServerError {
    fn as_status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::InvalidCredentials => StatusCode::UNAUTHORIZED,
            Self::InvalidInput(_) => StatusCode::BAD_REQUEST,
            Self::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            Self::Unknown(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        (self.as_status_code(), self.to_string()).into_response()
    }
}

impl From<StoreError> for ServerError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::NotFound { .. } => Self::NotFound(value.to_string()),
            StoreError::Conflict { .. } => Self::Conflict(value.to_string()),
            StoreError::Timeout => Self::Unavailable,
            e => Self::Unknown(e.to_string()),
        }
    }
}

impl From<RoomError> for ServerError {
    fn from(value: RoomError) -> Self {
        match value {
            RoomError::RoomNotFound => Self::NotFound(value.to_string()),
            RoomError::AlreadyHosting | RoomError::AlreadyInRoom | RoomError::NoSongsPlayed => {
                Self::Conflict(value.to_string())
            }
            RoomError::InvalidPassword | RoomError::RoomFull | RoomError::InvalidAccessToken => {
                Self::Forbidden
            }
            RoomError::InvalidLifetime | RoomError::InvalidCapacity => {
                Self::InvalidInput(value.to_string())
            }
            RoomError::Store(e) => e.into(),
        }
    }
}

impl From<QueueError> for ServerError {
    fn from(value: QueueError) -> Self {
        match value {
            QueueError::RoomNotFound => Self::NotFound(value.to_string()),
            QueueError::QueueIsEmpty => Self::Conflict(value.to_string()),
            QueueError::NotAPermutation => Self::InvalidInput(value.to_string()),
            QueueError::Store(e) => e.into(),
        }
    }
}

impl From<MetricsError> for ServerError {
    fn from(value: MetricsError) -> Self {
        match value {
            MetricsError::RoomNotFound | MetricsError::SongNotFound => {
                Self::NotFound(value.to_string())
            }
            MetricsError::InvalidOperation(_) => Self::InvalidInput(value.to_string()),
            MetricsError::Store(e) => e.into(),
        }
    }
}

impl From<AuthError> for ServerError {
    fn from(value: AuthError) -> Self {
        match value {
            AuthError::InvalidCredentials => Self::InvalidCredentials,
            AuthError::Store(e) => e.into(),
            e => Self::Unknown(e.to_string()),
        }
    }
}

impl From<TokenError> for ServerError {
    fn from(_value: TokenError) -> Self {
        Self::Forbidden
    }
}
