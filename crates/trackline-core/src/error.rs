use serde_json::Value;
use thiserror::Error;

const MAX_DETAIL_CHARS: usize = 200;

pub type ClientResult<T> = Result<T, ClientError>;

/// Failure of a single intent or remote call.
///
/// Every variant is recoverable: the collection or selection that produced
/// it stays usable and the same intent may simply be issued again.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ClientError {
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    #[error("invalid input: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error(
        "rate limited by server{}",
        .retry_after_secs
            .map(|secs| format!(", retry in {secs}s"))
            .unwrap_or_default()
    )]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("unexpected response: {0}")]
    Unknown(String),
}

impl ClientError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Maps a non-2xx status and its body onto the taxonomy.
    pub fn from_status(status: u16, body: &str, retry_after_secs: Option<u64>) -> Self {
        let message = detail_message(body).unwrap_or_else(|| format!("HTTP {status}"));
        match status {
            400 | 409 | 422 => Self::Validation(message),
            401 | 403 => Self::Unauthorized(message),
            404 => Self::NotFound(message),
            429 => Self::RateLimited { retry_after_secs },
            _ => Self::Unknown(format!("HTTP {status}: {message}")),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::AuthFailed(_) => "auth_failed",
            Self::Validation(_) => "validation",
            Self::NotFound(_) => "not_found",
            Self::Unauthorized(_) => "unauthorized",
            Self::RateLimited { .. } => "rate_limited",
            Self::Transport(_) => "transport",
            Self::Unknown(_) => "unknown",
        }
    }

    /// Whether repeating the identical request later can reasonably succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::RateLimited { .. })
    }
}

/// Extracts the human readable message from an error body.
///
/// The service answers with `{"detail": "..."}` for most failures and with
/// `{"detail": [{"msg": "...", ...}, ...]}` for request validation errors.
/// Anything else falls back to the trimmed raw body.
pub fn detail_message(body: &str) -> Option<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }

    let from_json = serde_json::from_str::<Value>(trimmed)
        .ok()
        .and_then(|value| match value.get("detail") {
            Some(Value::String(text)) => Some(text.clone()),
            Some(Value::Array(entries)) => {
                let messages: Vec<&str> = entries
                    .iter()
                    .filter_map(|entry| entry.get("msg").and_then(Value::as_str))
                    .collect();
                if messages.is_empty() {
                    None
                } else {
                    Some(messages.join("; "))
                }
            }
            _ => None,
        });

    Some(truncate(&from_json.unwrap_or_else(|| trimmed.to_string())))
}

fn truncate(text: &str) -> String {
    if text.chars().count() <= MAX_DETAIL_CHARS {
        return text.to_string();
    }
    let mut out: String = text.chars().take(MAX_DETAIL_CHARS).collect();
    out.push('…');
    out
}

#[cfg(test)]
mod tests {
    use super::{ClientError, detail_message};

    #[test]
    fn maps_statuses_onto_taxonomy() {
        let body = r#"{"detail":"Project not found"}"#;
        assert_eq!(
            ClientError::from_status(404, body, None),
            ClientError::NotFound("Project not found".to_string())
        );
        assert!(matches!(
            ClientError::from_status(401, "", None),
            ClientError::Unauthorized(_)
        ));
        assert!(matches!(
            ClientError::from_status(403, body, None),
            ClientError::Unauthorized(_)
        ));
        assert!(matches!(
            ClientError::from_status(422, body, None),
            ClientError::Validation(_)
        ));
        assert_eq!(
            ClientError::from_status(429, r#"{"detail":"Too Many Requests"}"#, Some(12)),
            ClientError::RateLimited {
                retry_after_secs: Some(12)
            }
        );
        assert!(matches!(
            ClientError::from_status(503, "upstream down", None),
            ClientError::Unknown(msg) if msg.contains("503") && msg.contains("upstream down")
        ));
    }

    #[test]
    fn joins_validation_detail_entries() {
        let body = r#"{"detail":[{"loc":["body","email"],"msg":"value is not a valid email address"},{"msg":"field required"}]}"#;
        assert_eq!(
            detail_message(body).as_deref(),
            Some("value is not a valid email address; field required")
        );
    }

    #[test]
    fn falls_back_to_raw_body_and_truncates() {
        assert_eq!(detail_message("   ").as_deref(), None);
        assert_eq!(
            detail_message("Internal Server Error").as_deref(),
            Some("Internal Server Error")
        );

        let long = "x".repeat(500);
        let message = detail_message(&long).expect("message");
        assert_eq!(message.chars().count(), 201);
        assert!(message.ends_with('…'));
    }

    #[test]
    fn retry_hint_only_for_transient_failures() {
        assert!(ClientError::Transport("timed out".into()).is_retryable());
        assert!(ClientError::RateLimited { retry_after_secs: None }.is_retryable());
        assert!(!ClientError::validation("empty title").is_retryable());
        assert_eq!(
            ClientError::RateLimited {
                retry_after_secs: Some(3)
            }
            .to_string(),
            "rate limited by server, retry in 3s"
        );
    }
}
