use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::CardId;

/// Standard error body returned by the ticket store on any failed call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

impl ErrorEnvelope {
    /// Build an envelope from a raw response body.
    ///
    /// Falls back to a status-derived code when the body is not an envelope
    /// (proxies, HTML error pages, bare `{"detail": ...}` bodies).
    pub fn from_body(status: u16, body: &str) -> Self {
        if let Ok(envelope) = serde_json::from_str::<ErrorEnvelope>(body) {
            return envelope;
        }
        let message = match serde_json::from_str::<Value>(body) {
            Ok(Value::Object(map)) => match map.get("detail") {
                Some(Value::String(s)) => s.clone(),
                Some(other) => other.to_string(),
                None => Value::Object(map).to_string(),
            },
            _ if body.trim().is_empty() => format!("HTTP {}", status),
            _ => body.trim().to_string(),
        };
        Self {
            code: default_code_for_status(status).to_string(),
            message,
            details: None,
            request_id: None,
        }
    }
}

/// Envelope `code` the store uses for a bare HTTP status.
pub fn default_code_for_status(status: u16) -> &'static str {
    match status {
        400 => "bad_request",
        401 => "unauthorized",
        403 => "forbidden",
        404 => "not_found",
        409 => "conflict",
        422 => "validation_error",
        429 => "rate_limited",
        500 => "internal_error",
        503 => "service_unavailable",
        _ => "error",
    }
}

/// Failure of a call to the ticket store.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ApiError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Request rejected with status {status}: [{}] {}", .envelope.code, .envelope.message)]
    Rejected { status: u16, envelope: ErrorEnvelope },

    #[error("Invalid response body: {0}")]
    Decode(String),
}

impl ApiError {
    /// Envelope code for surfacing to the user, when the server sent one.
    pub fn code(&self) -> Option<&str> {
        match self {
            ApiError::Rejected { envelope, .. } => Some(&envelope.code),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EngineError {
    #[error("Card {0} is not on the loaded board")]
    CardNotFound(CardId),

    #[error("Card {0} already has a write in flight")]
    WriteInFlight(CardId),

    #[error("Column '{column}' is at its WIP limit of {limit}")]
    WipLimitReached { column: String, limit: u32 },

    #[error("Batch write failed: {0}")]
    BatchWrite(#[source] ApiError),

    #[error("Delete of card {card_id} failed: {source}")]
    Delete { card_id: CardId, source: ApiError },

    #[error("Page {page} failed to load: {source}")]
    PageFetch { page: u32, source: ApiError },

    #[error("Board session is closed")]
    SessionClosed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_parsed_verbatim() {
        let body = r#"{"code":"bad_request","message":"Límite WIP alcanzado","details":null,"request_id":"r-1"}"#;
        let env = ErrorEnvelope::from_body(400, body);
        assert_eq!(env.code, "bad_request");
        assert_eq!(env.message, "Límite WIP alcanzado");
        assert_eq!(env.request_id.as_deref(), Some("r-1"));
    }

    #[test]
    fn test_envelope_from_detail_body() {
        let env = ErrorEnvelope::from_body(404, r#"{"detail":"Tarjeta no encontrada"}"#);
        assert_eq!(env.code, "not_found");
        assert_eq!(env.message, "Tarjeta no encontrada");
    }

    #[test]
    fn test_envelope_from_plain_text_and_empty() {
        let env = ErrorEnvelope::from_body(502, "Bad Gateway");
        assert_eq!(env.code, "error");
        assert_eq!(env.message, "Bad Gateway");

        let env = ErrorEnvelope::from_body(503, "  ");
        assert_eq!(env.code, "service_unavailable");
        assert_eq!(env.message, "HTTP 503");
    }

    #[test]
    fn test_api_error_display_includes_code() {
        let err = ApiError::Rejected {
            status: 409,
            envelope: ErrorEnvelope::from_body(409, ""),
        };
        assert_eq!(err.code(), Some("conflict"));
        assert!(err.to_string().contains("[conflict]"));
    }
}
