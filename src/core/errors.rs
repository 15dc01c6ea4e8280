use thiserror::Error;

#[derive(Debug, Error)]
pub enum RagError {
    #[error("invalid parameters: {0}")]
    Params(String),
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("provider error: {0}")]
    Provider(String),
    #[error("{service} request failed ({status}): {message}")]
    ExternalApi {
        service: String,
        status: u16,
        message: String,
    },
    #[error("timed out: {0}")]
    Timeout(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl RagError {
    pub fn internal<E: std::fmt::Display>(err: E) -> Self {
        RagError::Internal(err.to_string())
    }

    pub fn external(service: &str, status: reqwest::StatusCode, message: impl Into<String>) -> Self {
        RagError::ExternalApi {
            service: service.to_string(),
            status: status.as_u16(),
            message: message.into(),
        }
    }

    /// Params and configuration errors must reach the operator unchanged.
    pub fn is_fatal(&self) -> bool {
        matches!(self, RagError::Params(_) | RagError::Configuration(_))
    }
}

impl From<reqwest::Error> for RagError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            RagError::Timeout(err.to_string())
        } else {
            RagError::Provider(err.to_string())
        }
    }
}

impl From<serde_json::Error> for RagError {
    fn from(err: serde_json::Error) -> Self {
        RagError::Provider(format!("malformed payload: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatal_kinds_are_params_and_configuration() {
        assert!(RagError::Params("id".into()).is_fatal());
        assert!(RagError::Configuration("missing".into()).is_fatal());
        assert!(!RagError::NotFound("none".into()).is_fatal());
        assert!(!RagError::Provider("boom".into()).is_fatal());
    }

    #[test]
    fn external_error_formats_service_and_status() {
        let err = RagError::external("vectorize", reqwest::StatusCode::BAD_GATEWAY, "upstream");
        assert_eq!(err.to_string(), "vectorize request failed (502): upstream");
    }
}
