//! JSON bodies exchanged with the admin server.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Registry endpoints
// ---------------------------------------------------------------------------

/// Response body for `GET /fields`: every registered entity and its fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldsResponse {
    pub fields: BTreeMap<String, Vec<String>>,
}

// ---------------------------------------------------------------------------
// Error response
// ---------------------------------------------------------------------------

/// Standard error response body returned on any non-2xx status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Short machine-readable error code (e.g. `"bad_request"`).
    pub code: String,
    /// Human-readable description safe to expose to callers.
    pub message: String,
}

impl ErrorResponse {
    /// Construct an [`ErrorResponse`] from a code and message.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

impl From<&crate::ServiceError> for ErrorResponse {
    fn from(err: &crate::ServiceError) -> Self {
        Self::new(err.code(), err.to_string())
    }
}

// ---------------------------------------------------------------------------
// Health check
// ---------------------------------------------------------------------------

/// Response body for `GET /health`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// `"ok"` or `"degraded"`.
    pub status: String,
    /// Whether setup validation found no errors.
    pub valid: bool,
    /// Whether the cipher round-trip passed.
    pub self_test: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    /// Truncated SHA-256 of the loaded key, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_fingerprint: Option<String>,
    /// Number of entities with at least one registered field.
    pub entities: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ServiceError;

    #[test]
    fn error_response_from_service_error() {
        let e = ErrorResponse::from(&ServiceError::BadRequest("empty field name".into()));
        assert_eq!(e.code, "bad_request");
        assert!(e.message.contains("empty field name"));
    }

    #[test]
    fn health_response_omits_missing_fingerprint() {
        let h = HealthResponse {
            status: "degraded".into(),
            valid: false,
            self_test: false,
            errors: vec!["FIELD_ENCRYPTION_KEY is not set".into()],
            warnings: vec![],
            key_fingerprint: None,
            entities: 0,
        };
        let json = serde_json::to_value(&h).unwrap();
        assert!(json.get("key_fingerprint").is_none());
        assert_eq!(json["errors"][0], "FIELD_ENCRYPTION_KEY is not set");
    }

    #[test]
    fn fields_response_serialises_sorted() {
        let mut fields = BTreeMap::new();
        fields.insert("User".to_owned(), vec!["ssn".to_owned()]);
        fields.insert("Client".to_owned(), vec!["phone".to_owned()]);
        let json = serde_json::to_string(&FieldsResponse { fields }).unwrap();
        assert!(json.find("Client").unwrap() < json.find("User").unwrap());
    }
}
