use axum::http::StatusCode;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// The error taxonomy shared by the actor runtime and both gateways.
///
/// Every variant maps to exactly one client-visible status, whether the
/// client is talking Connect or GraphQL; `status_code` is consulted by the
/// Connect gateway, `kind` by the GraphQL gateway when building an `errors`
/// entry.
#[derive(Error, Debug, Clone)]
pub enum Error {
    #[error("method {0:?} is invalid: {1}")]
    Validation(String, String),

    #[error("failed to parse request: {0}")]
    Parse(String),

    #[error("unsupported content type: {0}")]
    UnsupportedMedia(String),

    #[error("request body exceeds the maximum of {limit} bytes")]
    RequestTooLarge { limit: usize },

    #[error("request timed out")]
    Timeout,

    #[error("execution failed: {0}")]
    Execution(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("not found: {0}")]
    NotFound(String),
}

impl Error {
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Validation(..) => "VALIDATION_ERROR",
            Error::Parse(_) => "PARSE_ERROR",
            Error::UnsupportedMedia(_) => "UNSUPPORTED_MEDIA",
            Error::RequestTooLarge { .. } => "REQUEST_TOO_LARGE",
            Error::Timeout => "TIMEOUT",
            Error::Execution(_) => "EXECUTION_ERROR",
            Error::Internal(_) => "INTERNAL_ERROR",
            Error::NotFound(_) => "NOT_FOUND",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::Validation(..) | Error::Parse(_) | Error::UnsupportedMedia(_) => {
                StatusCode::BAD_REQUEST
            }
            Error::RequestTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Error::Timeout => StatusCode::REQUEST_TIMEOUT,
            Error::Execution(_) | Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
        }
    }
}
