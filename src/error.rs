use chrono::NaiveDate;
use thiserror::Error;
use tracing::error;

use crate::auth::AuthError;
use crate::client::ClientError;
use crate::timetable::TimetableError;

#[derive(Debug, Error)]
pub enum BookingError {
    /// Network failure or a non-2xx status; carries the response body when
    /// the server sent one.
    #[error("HTTP failure: {0}")]
    Http(String),
    #[error("Malformed response: {0}")]
    MalformedResponse(String),
    #[error("No session found for course {course_id} on {date}")]
    NoSuchSession { course_id: u64, date: NaiveDate },
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("{0}")]
    ClubMismatch(String),
}

impl From<AuthError> for BookingError {
    fn from(value: AuthError) -> Self {
        match value {
            AuthError::Http(err) => {
                error!("identity provider unreachable: {err}");
                BookingError::Http(format!("Authentication failed: {err}"))
            }
            AuthError::Status { step, status, body } => {
                BookingError::Http(format!("Authentication failed at {step}: {status} {body}"))
            }
            AuthError::MissingField { .. } | AuthError::Decode { .. } => {
                BookingError::MalformedResponse(value.to_string())
            }
        }
    }
}

impl From<ClientError> for BookingError {
    fn from(value: ClientError) -> Self {
        match value {
            ClientError::Http(_) | ClientError::Status { .. } => {
                BookingError::Http(value.to_string())
            }
            ClientError::MalformedResponse { .. } => {
                BookingError::MalformedResponse(value.to_string())
            }
            ClientError::ClubMismatch { .. } => BookingError::ClubMismatch(value.to_string()),
            ClientError::InvalidHeader(_) | ClientError::Url(_) => {
                BookingError::Config(value.to_string())
            }
        }
    }
}

impl From<TimetableError> for BookingError {
    fn from(value: TimetableError) -> Self {
        match value {
            TimetableError::Http(_) | TimetableError::Status { .. } => {
                BookingError::Http(value.to_string())
            }
            TimetableError::Decode(_) => BookingError::MalformedResponse(value.to_string()),
            TimetableError::Url(_) => BookingError::Config(value.to_string()),
        }
    }
}

impl From<config::ConfigError> for BookingError {
    fn from(value: config::ConfigError) -> Self {
        BookingError::Config(value.to_string())
    }
}
