//! Response construction.
//!
//! # Responsibilities
//! - Render backend results for the client (status and body verbatim)
//! - Map gateway errors to status codes with a `{"detail": ...}` body
//!
//! # Design Decisions
//! - Backend framing, encoding and hop-by-hop headers are dropped; the body
//!   is re-encoded as plain JSON
//! - 401 carries `WWW-Authenticate`, 429 carries `Retry-After`

use axum::http::{header, HeaderValue};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::error::GatewayError;
use crate::proxy::upstream::ForwardResult;
use crate::security::headers::sanitize_outbound;

impl IntoResponse for ForwardResult {
    fn into_response(self) -> Response {
        let mut passthrough = sanitize_outbound(&self.headers);
        passthrough.remove(header::CONTENT_TYPE);
        passthrough.remove(header::CONTENT_ENCODING);

        let mut response = (self.status, Json(self.body)).into_response();
        for (name, value) in passthrough.iter() {
            response.headers_mut().append(name.clone(), value.clone());
        }
        response
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let mut response = (self.status(), Json(json!({ "detail": self.detail() }))).into_response();

        match &self {
            GatewayError::Auth(_) => {
                response
                    .headers_mut()
                    .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
            }
            GatewayError::RateLimitExceeded { retry_after } => {
                let secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
                response
                    .headers_mut()
                    .insert(header::RETRY_AFTER, HeaderValue::from(secs));
            }
            _ => {}
        }

        response
    }
}
