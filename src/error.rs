//! Gateway error taxonomy.
//!
//! Every rejection or failure a caller can observe maps to exactly one
//! variant here. Conversion to an HTTP response lives in `http::response`.

use std::time::Duration;

use axum::http::StatusCode;

use crate::proxy::upstream::UpstreamError;
use crate::security::auth::AuthError;

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("Rate limit exceeded")]
    RateLimitExceeded { retry_after: Duration },

    #[error("Rate limiter unavailable")]
    RateLimiterUnavailable,

    #[error("Service not found")]
    RouteNotFound,

    #[error("Method Not Allowed")]
    MethodNotAllowed,

    #[error("Service temporarily unavailable")]
    ServiceUnavailable { route: String },

    #[error("Error communicating with upstream: {0}")]
    UpstreamUnavailable(UpstreamError),

    #[error("{0}")]
    MalformedRequest(String),

    #[error("Request body too large")]
    PayloadTooLarge,
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::Auth(_) => StatusCode::UNAUTHORIZED,
            GatewayError::RateLimitExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            GatewayError::RateLimiterUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::RouteNotFound => StatusCode::NOT_FOUND,
            GatewayError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            GatewayError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::UpstreamUnavailable(_) => StatusCode::BAD_GATEWAY,
            GatewayError::MalformedRequest(_) => StatusCode::BAD_REQUEST,
            GatewayError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
        }
    }

    /// Text placed in the `detail` field of the error body.
    pub fn detail(&self) -> String {
        self.to_string()
    }
}
