//! Session handle errors

use chat_common::AppError;
use chat_core::{DomainError, RoomId};

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("session for room {0} has stopped")]
    Stopped(RoomId),

    #[error("session task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

pub type SessionResult<T> = Result<T, SessionError>;

impl From<SessionError> for AppError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::Domain(e) => Self::Domain(e),
            SessionError::Stopped(_) => Self::Connection(err.to_string()),
            SessionError::Join(e) => Self::internal(e),
        }
    }
}
