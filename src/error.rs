//! Service-wide error taxonomy.
//!
//! Every public operation maps one of these into the `{success:false, error}`
//! envelope; nothing is allowed to cross the HTTP boundary as an unhandled
//! fault. There are no retries anywhere: each failure is terminal for its
//! call.

use serde_json::Value;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// A required credential or endpoint is not configured.
    #[error("{0}")]
    Configuration(String),

    /// A request payload is missing or carries an invalid required field.
    #[error("{0}")]
    Validation(String),

    /// The model replied with text that is not valid JSON. The raw text is
    /// kept for diagnosis and attached to the error envelope.
    #[error("AI response is not valid JSON: {detail}")]
    MalformedResponse { raw: String, detail: String },

    /// The model replied with valid JSON that is missing (or carries an
    /// unusable) `score`, `reason`, or `breakdown`. The parsed value is
    /// attached to the error envelope.
    #[error("AI response is missing required fields (score, reason, breakdown)")]
    InvalidEvaluationShape { parsed: Value },

    /// An issue-fetch or text-generation call failed.
    #[error("{0}")]
    Upstream(String),
}

impl ServiceError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn upstream(msg: impl Into<String>) -> Self {
        Self::Upstream(msg.into())
    }

    /// Stable label for metrics/log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "configuration",
            Self::Validation(_) => "validation",
            Self::MalformedResponse { .. } => "malformed_response",
            Self::InvalidEvaluationShape { .. } => "invalid_shape",
            Self::Upstream(_) => "upstream",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn display_keeps_field_specific_messages() {
        let e = ServiceError::validation("issueKey is required");
        assert_eq!(e.to_string(), "issueKey is required");
        assert_eq!(e.kind(), "validation");
    }

    #[test]
    fn malformed_response_keeps_raw_text() {
        let e = ServiceError::MalformedResponse {
            raw: "Sure! Here is the score:".into(),
            detail: "expected value at line 1 column 1".into(),
        };
        match &e {
            ServiceError::MalformedResponse { raw, .. } => {
                assert!(raw.starts_with("Sure!"));
            }
            _ => unreachable!(),
        }
        assert!(e.to_string().contains("not valid JSON"));
    }

    #[test]
    fn invalid_shape_keeps_parsed_value() {
        let e = ServiceError::InvalidEvaluationShape {
            parsed: json!({"score": 5}),
        };
        assert_eq!(e.kind(), "invalid_shape");
    }
}
