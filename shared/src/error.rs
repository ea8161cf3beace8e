use lambda_http::http::StatusCode;
use thiserror::Error;

/// Request-failure vocabulary for the whole API surface.
///
/// Auth and capability failures deliberately carry no detail about which
/// check failed; upstream detail is logged at the call site and never
/// reaches the client.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Authentication required")]
    AuthenticationRequired,

    #[error("Invalid session token")]
    TokenInvalid,

    #[error("Session expired")]
    TokenExpired,

    #[error("You do not have permission to perform this action")]
    CapabilityDenied,

    #[error("{0} not found")]
    ResourceNotFound(&'static str),

    #[error("{0}")]
    ValidationFailed(String),

    #[error("Upstream service request failed")]
    Upstream(String),

    #[error("Unexpected internal error")]
    Internal(String),
}

impl AppError {
    /// Machine-readable error code carried in the JSON envelope.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::AuthenticationRequired => "AuthenticationRequired",
            AppError::TokenInvalid => "TokenInvalid",
            AppError::TokenExpired => "TokenExpired",
            AppError::CapabilityDenied => "CapabilityDenied",
            AppError::ResourceNotFound(_) => "ResourceNotFound",
            AppError::ValidationFailed(_) => "ValidationFailed",
            AppError::Upstream(_) => "UpstreamFailure",
            AppError::Internal(_) => "InternalUnexpected",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::AuthenticationRequired
            | AppError::TokenInvalid
            | AppError::TokenExpired => StatusCode::UNAUTHORIZED,
            AppError::CapabilityDenied => StatusCode::FORBIDDEN,
            AppError::ResourceNotFound(_) => StatusCode::NOT_FOUND,
            AppError::ValidationFailed(_) => StatusCode::BAD_REQUEST,
            AppError::Upstream(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Message safe to show a client. Upstream/internal detail stays in logs.
    pub fn public_message(&self) -> String {
        match self {
            AppError::Upstream(_) => "Upstream service request failed".to_string(),
            AppError::Internal(_) => "Unexpected internal error".to_string(),
            other => other.to_string(),
        }
    }

    /// Wrap a serde parse failure so the first violation's message surfaces
    /// in the 400 response.
    pub fn from_body_parse(err: serde_json::Error) -> Self {
        AppError::ValidationFailed(format!("Invalid request body: {}", err))
    }
}

/// Parse a numeric path id, naming the resource in the 400 message.
pub fn parse_id(raw: &str, what: &'static str) -> Result<u64, AppError> {
    raw.trim()
        .parse()
        .map_err(|_| AppError::ValidationFailed(format!("Invalid {} id", what)))
}
