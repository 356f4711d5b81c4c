//! Request handling.
//!
//! # Responsibilities
//! - Generate unique request IDs (UUID v4)
//! - Buffer the request body under the configured size limit
//! - Catch framing errors before they reach the pipeline stages
//!
//! # Design Decisions
//! - Request ID added as early as possible for tracing
//! - Declared Content-Length is checked before any body byte is read
//! - Bodies are buffered so retries can replay them

use axum::body::{Body, Bytes};
use axum::http::{header, HeaderMap, HeaderName, Request};
use futures_util::StreamExt;
use tower_http::request_id::{MakeRequestId, RequestId};
use uuid::Uuid;

use crate::error::GatewayError;

pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

pub const SHORT_BODY_DETAIL: &str = "Too little data for declared Content-Length";

/// Request ID generator for `SetRequestIdLayer`.
#[derive(Debug, Clone, Copy, Default)]
pub struct MakeRequestUuidV4;

impl MakeRequestId for MakeRequestUuidV4 {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        Uuid::new_v4().to_string().parse().ok().map(RequestId::new)
    }
}

/// The request's ID, as set by the request-id layer or sent by the client.
pub fn request_id(headers: &HeaderMap) -> &str {
    headers
        .get(&X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
}

fn declared_length(headers: &HeaderMap) -> Result<Option<usize>, GatewayError> {
    match headers.get(header::CONTENT_LENGTH) {
        None => Ok(None),
        Some(value) => value
            .to_str()
            .ok()
            .and_then(|v| v.trim().parse::<usize>().ok())
            .map(Some)
            .ok_or_else(|| GatewayError::MalformedRequest("Invalid Content-Length header".to_string())),
    }
}

/// Read the whole body, enforcing `max_size` and the declared length.
pub async fn buffer_body(headers: &HeaderMap, body: Body, max_size: usize) -> Result<Bytes, GatewayError> {
    let declared = declared_length(headers)?;
    if declared.is_some_and(|len| len > max_size) {
        return Err(GatewayError::PayloadTooLarge);
    }

    let mut buffer = Vec::with_capacity(declared.unwrap_or(0));
    let mut stream = body.into_data_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| {
            tracing::debug!(error = %e, received = buffer.len(), ?declared, "Request body read failed");
            match declared {
                Some(_) => GatewayError::MalformedRequest(SHORT_BODY_DETAIL.to_string()),
                None => GatewayError::MalformedRequest("Failed to read request body".to_string()),
            }
        })?;
        if buffer.len() + chunk.len() > max_size {
            return Err(GatewayError::PayloadTooLarge);
        }
        buffer.extend_from_slice(&chunk);
    }

    if declared.is_some_and(|len| buffer.len() < len) {
        return Err(GatewayError::MalformedRequest(SHORT_BODY_DETAIL.to_string()));
    }

    Ok(Bytes::from(buffer))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use futures_util::stream;

    fn with_length(len: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from_static(len));
        headers
    }

    #[tokio::test]
    async fn test_buffers_complete_body() {
        let bytes = buffer_body(&with_length("5"), Body::from("hello"), 1024).await.unwrap();
        assert_eq!(&bytes[..], b"hello");

        let bytes = buffer_body(&HeaderMap::new(), Body::empty(), 1024).await.unwrap();
        assert!(bytes.is_empty());
    }

    #[tokio::test]
    async fn test_declared_length_over_limit() {
        let err = buffer_body(&with_length("4096"), Body::empty(), 1024).await.unwrap_err();
        assert!(matches!(err, GatewayError::PayloadTooLarge));

        let err = buffer_body(&HeaderMap::new(), Body::from(vec![0u8; 2048]), 1024)
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::PayloadTooLarge));
    }

    #[tokio::test]
    async fn test_short_body_is_bad_request() {
        let chunks: Vec<Result<Bytes, std::io::Error>> = vec![
            Ok(Bytes::from_static(b"{\"partial\":")),
            Err(std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "connection closed")),
        ];
        let body = Body::from_stream(stream::iter(chunks));

        let err = buffer_body(&with_length("100"), body, 1024).await.unwrap_err();
        assert_eq!(err.detail(), SHORT_BODY_DETAIL);
        assert_eq!(err.status().as_u16(), 400);
    }

    #[test]
    fn test_invalid_content_length() {
        assert!(declared_length(&with_length("ten")).is_err());
        assert_eq!(declared_length(&with_length("10")).unwrap(), Some(10));
    }

    #[test]
    fn test_generates_distinct_ids() {
        let request = Request::new(());
        let mut make = MakeRequestUuidV4;
        let a = make.make_request_id(&request).unwrap();
        let b = make.make_request_id(&request).unwrap();
        assert_ne!(a.header_value(), b.header_value());
    }
}
