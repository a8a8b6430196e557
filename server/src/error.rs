use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{key} has an invalid value {value:?}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("session {0} was modified concurrently")]
    StaleRevision(String),
    #[error("session state could not be encoded: {0}")]
    Codec(#[from] serde_json::Error),
    #[error("session database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum AvailabilityError {
    #[error("availability request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("availability query failed: {0}")]
    Database(#[from] sqlx::Error),
    #[error("availability response was malformed: {0}")]
    Malformed(String),
}

#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("slot {date} {time} is already booked")]
    Conflict { date: String, time: String },
    #[error("ticket {id} already exists")]
    DuplicateTicket { id: String },
    #[error("persistence database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Faults inside a turn. None of these are shown to the user verbatim.
#[derive(Debug, thiserror::Error)]
pub enum DialogueError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
    #[error("prompt rendering failed: {0}")]
    Prompt(#[from] minijinja::Error),
    #[error("field {0} is already set")]
    FieldAlreadySet(&'static str),
    #[error("booking draft is incomplete: {0} missing")]
    Incomplete(&'static str),
}

/// Client mistakes in the request envelope, reported as HTTP 400.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RequestError {
    #[error("message is required")]
    MissingMessage,
    #[error("sessionId is required")]
    MissingSessionId,
}

impl IntoResponse for RequestError {
    fn into_response(self) -> axum::response::Response {
        (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": self.to_string() })),
        )
            .into_response()
    }
}
