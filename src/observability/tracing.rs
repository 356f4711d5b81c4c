//! W3C trace context propagation.
//!
//! # Responsibilities
//! - Extract trace context from incoming `traceparent` headers
//! - Start a new trace when none (or a malformed one) arrives
//! - Produce the header value sent to backends
//!
//! # Design Decisions
//! - Only version `00` is parsed; anything else starts a fresh trace
//! - The gateway hop always gets its own span id under the caller's trace id

use std::fmt;

use axum::http::{HeaderMap, HeaderName, HeaderValue};
use rand::Rng;

pub const TRACEPARENT: HeaderName = HeaderName::from_static("traceparent");

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceContext {
    /// 32 lowercase hex chars.
    pub trace_id: String,
    /// 16 lowercase hex chars identifying the gateway span.
    pub span_id: String,
    /// Span id of the caller, when the trace was continued.
    pub parent_id: Option<String>,
    pub sampled: bool,
}

impl TraceContext {
    /// Continue the caller's trace if the header is valid, else start one.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        headers
            .get(&TRACEPARENT)
            .and_then(|v| v.to_str().ok())
            .and_then(Self::parse)
            .map(|parent| Self {
                trace_id: parent.trace_id,
                span_id: random_hex(8),
                parent_id: Some(parent.span_id),
                sampled: parent.sampled,
            })
            .unwrap_or_else(Self::new_root)
    }

    pub fn new_root() -> Self {
        Self {
            trace_id: random_hex(16),
            span_id: random_hex(8),
            parent_id: None,
            sampled: true,
        }
    }

    /// Parse a `traceparent` value as received.
    pub fn parse(value: &str) -> Option<Self> {
        let mut parts = value.trim().split('-');
        let (version, trace_id, span_id, flags) =
            (parts.next()?, parts.next()?, parts.next()?, parts.next()?);
        if parts.next().is_some() || version != "00" {
            return None;
        }
        if !is_hex(trace_id, 32) || !is_hex(span_id, 16) || !is_hex(flags, 2) {
            return None;
        }
        if trace_id.bytes().all(|b| b == b'0') || span_id.bytes().all(|b| b == b'0') {
            return None;
        }
        let flags = u8::from_str_radix(flags, 16).ok()?;

        Some(Self {
            trace_id: trace_id.to_ascii_lowercase(),
            span_id: span_id.to_ascii_lowercase(),
            parent_id: None,
            sampled: flags & 0x01 == 0x01,
        })
    }

    pub fn header_value(&self) -> Option<HeaderValue> {
        HeaderValue::from_str(&self.to_string()).ok()
    }
}

impl fmt::Display for TraceContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "00-{}-{}-{}",
            self.trace_id,
            self.span_id,
            if self.sampled { "01" } else { "00" }
        )
    }
}

fn is_hex(s: &str, len: usize) -> bool {
    s.len() == len && s.bytes().all(|b| b.is_ascii_hexdigit())
}

fn random_hex(bytes: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..bytes).map(|_| format!("{:02x}", rng.gen::<u8>())).collect()
}
