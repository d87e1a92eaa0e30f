use serde_json::json;
use thiserror::Error;

use crate::capabilities::PresentationError;
use crate::framer::FramingError;
use crate::payload::{observed_keys, PayloadError};
use crate::response::Response;

/// Raw bodies echoed back in decode errors are cut at this many bytes.
pub const MAX_ECHOED_BODY_BYTES: usize = 4096;

/// Everything that can end a single request early. None of these affect
/// the accept loop or shared state.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error(transparent)]
    Framing(#[from] FramingError),

    #[error("missing or invalid bearer token")]
    Unauthorized,

    #[error("invalid notification payload: {source}")]
    Decode {
        source: PayloadError,
        raw_body: String,
        received_keys: Vec<String>,
    },

    #[error("failed to present notification: {0}")]
    Presentation(#[from] PresentationError),
}

impl RelayError {
    /// Capture the diagnostic context a caller needs to fix its payload.
    pub fn decode(source: PayloadError, body: &[u8]) -> Self {
        RelayError::Decode {
            source,
            raw_body: echo_body(body),
            received_keys: observed_keys(body),
        }
    }

    pub fn status(&self) -> u16 {
        match self {
            RelayError::Framing(_) | RelayError::Decode { .. } => 400,
            RelayError::Unauthorized => 401,
            RelayError::Presentation(_) => 500,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            RelayError::Framing(_) => "bad_request",
            RelayError::Unauthorized => "unauthorized",
            RelayError::Decode { .. } => "invalid_payload",
            RelayError::Presentation(_) => "presentation_failed",
        }
    }

    pub fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code();
        match self {
            RelayError::Framing(_) => Response::text(status, "Bad Request"),
            RelayError::Unauthorized => Response::json(
                status,
                &json!({
                    "error": code,
                    "message": "Missing or invalid bearer token",
                }),
            ),
            RelayError::Decode {
                source,
                raw_body,
                received_keys,
            } => Response::json(
                status,
                &json!({
                    "error": code,
                    "message": source.to_string(),
                    "raw_body": raw_body,
                    "received_keys": received_keys,
                }),
            ),
            RelayError::Presentation(err) => Response::json(
                status,
                &json!({
                    "error": code,
                    "message": err.to_string(),
                }),
            ),
        }
    }
}

fn echo_body(body: &[u8]) -> String {
    let text = String::from_utf8_lossy(body);
    if text.len() <= MAX_ECHOED_BODY_BYTES {
        return text.into_owned();
    }
    let mut cut = MAX_ECHOED_BODY_BYTES;
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}... (truncated, {} bytes total)", &text[..cut], body.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::decode_request;
    use serde_json::Value;

    fn body_json(response: &Response) -> Value {
        serde_json::from_slice(response.body()).expect("json body")
    }

    #[test]
    fn framing_errors_are_plain_text_400() {
        let response = RelayError::from(FramingError::Empty).into_response();
        assert_eq!(response.status(), 400);
        assert_eq!(response.body(), b"Bad Request");
        assert!(response.content_type().starts_with("text/plain"));
    }

    #[test]
    fn unauthorized_is_structured_401() {
        let response = RelayError::Unauthorized.into_response();
        assert_eq!(response.status(), 401);
        let body = body_json(&response);
        assert_eq!(body["error"], "unauthorized");
        assert!(body["message"].is_string());
    }

    #[test]
    fn decode_error_carries_raw_body_and_keys() {
        let raw = br#"{"notification":{"titel":"T","message":"M"}}"#;
        let source = decode_request(raw).expect_err("missing title");
        let response = RelayError::decode(source, raw).into_response();
        assert_eq!(response.status(), 400);

        let body = body_json(&response);
        assert_eq!(body["error"], "invalid_payload");
        assert!(body["message"].as_str().expect("message").contains("title"));
        assert_eq!(
            body["raw_body"].as_str(),
            Some(std::str::from_utf8(raw).expect("utf8"))
        );
        let keys: Vec<_> = body["received_keys"]
            .as_array()
            .expect("keys")
            .iter()
            .filter_map(Value::as_str)
            .collect();
        assert!(keys.contains(&"notification.titel"));
    }

    #[test]
    fn presentation_error_is_structured_500() {
        let err = PresentationError::Unavailable("notify-send missing".to_string());
        let response = RelayError::from(err).into_response();
        assert_eq!(response.status(), 500);
        let body = body_json(&response);
        assert_eq!(body["error"], "presentation_failed");
        assert!(body["message"].as_str().expect("message").contains("notify-send missing"));
    }

    #[test]
    fn long_bodies_are_truncated_on_char_boundary() {
        let body = "é".repeat(MAX_ECHOED_BODY_BYTES);
        let echoed = echo_body(body.as_bytes());
        assert!(echoed.contains("truncated"));
        assert!(echoed.len() < body.len());
    }
}
