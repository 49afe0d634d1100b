use thiserror::Error;
use uuid::Uuid;
use axum::http::StatusCode;

use crate::error::{ErrorMessage, HttpError};

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Webhook signature does not match payload")]
    InvalidSignature,

    #[error("Event {0} carries no usable user_id in its metadata")]
    UnknownMetadata(String),

    #[error("User {0} not found")]
    UserNotFound(Uuid),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl ServiceError {
    /// Errors the processor must not redeliver for: acknowledging them
    /// stops the retry loop without touching any state.
    pub fn is_acknowledged(&self) -> bool {
        matches!(
            self,
            ServiceError::UnknownMetadata(_) | ServiceError::UserNotFound(_)
        )
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::InvalidSignature => StatusCode::BAD_REQUEST,
            ServiceError::UnknownMetadata(_) | ServiceError::UserNotFound(_) => StatusCode::OK,
            ServiceError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<ServiceError> for HttpError {
    fn from(error: ServiceError) -> Self {
        let message = match error {
            ServiceError::InvalidSignature => ErrorMessage::InvalidSignature.to_string(),
            ServiceError::UnknownMetadata(_) | ServiceError::UserNotFound(_) => "success".to_string(),
            ServiceError::Database(_) => ErrorMessage::ServerError.to_string(),
        };
        HttpError::new(message, error.status_code())
    }
}
