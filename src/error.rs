// Error taxonomy for the library side of the client. The binary wraps
// these in `anyhow` for display; the session and API layers return them
// directly so callers can tell preconditions apart from remote failures.

use reqwest::StatusCode;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Error body returned by the Gemini API on non-success responses.
#[derive(Deserialize, Debug, Clone)]
pub struct ApiErrorResponse {
    pub error: ApiErrorDetail,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct ApiErrorDetail {
    #[serde(default)]
    pub code: u16,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub status: String,
}

#[derive(Error, Debug)]
pub enum RagError {
    #[error("GEMINI_API_KEY not found in environment variables")]
    MissingCredential,

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("No file search store created. Call create_store() first.")]
    NoStore,

    #[error("No files uploaded. Call upload_file() first.")]
    NoFiles,

    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Non-success status from the API. `detail` is filled when the body
    /// parsed as the standard error envelope.
    #[error("Gemini API error: status={status}, message='{message}'")]
    Api {
        status: StatusCode,
        message: String,
        detail: Option<ApiErrorDetail>,
    },

    #[error("Failed to parse response body ({context}): {source}")]
    ResponseParsing {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    #[error("Operation {name} failed: {message}")]
    OperationFailed { name: String, message: String },

    #[error("Operation {name} not done after {elapsed:?}")]
    PollTimeout { name: String, elapsed: Duration },

    #[error("Cancelled while handling {name}")]
    PollCancelled { name: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RagError {
    /// Build an `Api` error from a status and raw body, keeping the parsed
    /// envelope when the body has one.
    pub fn from_api_body(status: StatusCode, body_text: &str) -> Self {
        match serde_json::from_str::<ApiErrorResponse>(body_text) {
            Ok(parsed) => RagError::Api {
                status,
                message: parsed.error.message.clone(),
                detail: Some(parsed.error),
            },
            Err(e) => {
                tracing::debug!(%status, error = %e, "error body is not a Gemini error envelope");
                RagError::Api {
                    status,
                    message: body_text.trim().to_string(),
                    detail: None,
                }
            }
        }
    }

    pub fn parsing(context: impl Into<String>, source: serde_json::Error) -> Self {
        RagError::ResponseParsing {
            context: context.into(),
            source,
        }
    }
}

pub type Result<T, E = RagError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_body_with_envelope_keeps_detail() {
        let body = r#"{"error":{"code":403,"message":"API key not valid","status":"PERMISSION_DENIED"}}"#;
        match RagError::from_api_body(StatusCode::FORBIDDEN, body) {
            RagError::Api { status, message, detail } => {
                assert_eq!(status, StatusCode::FORBIDDEN);
                assert_eq!(message, "API key not valid");
                assert_eq!(detail.unwrap().status, "PERMISSION_DENIED");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn api_body_without_envelope_keeps_raw_text() {
        match RagError::from_api_body(StatusCode::BAD_GATEWAY, " upstream down\n") {
            RagError::Api { message, detail, .. } => {
                assert_eq!(message, "upstream down");
                assert!(detail.is_none());
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
