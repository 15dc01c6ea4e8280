use std::fmt;

use crate::core::config::settings::AwsSettings;
use crate::core::errors::RagError;

/// Separator used by the encoded `accessKey::@@::secretKey` form that user
/// settings store their AWS key pair in.
pub const ENCODED_SEPARATOR: &str = "::@@::";

#[derive(Clone, PartialEq, Eq)]
pub struct AwsCredentials {
    pub access_key_id: String,
    secret_access_key: String,
    pub session_token: Option<String>,
}

impl AwsCredentials {
    pub fn new(access_key_id: impl Into<String>, secret_access_key: impl Into<String>) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            session_token: None,
        }
    }

    pub fn with_session_token(mut self, token: Option<String>) -> Self {
        self.session_token = token.filter(|t| !t.trim().is_empty());
        self
    }

    pub fn secret_access_key(&self) -> &str {
        &self.secret_access_key
    }

    pub fn parse_encoded(encoded: &str) -> Result<Self, RagError> {
        let (access, secret) = encoded
            .trim()
            .split_once(ENCODED_SEPARATOR)
            .ok_or_else(|| RagError::Params("encoded AWS credentials lack separator".into()))?;

        let access = access.trim();
        let secret = secret.trim();
        if access.is_empty() || secret.is_empty() {
            return Err(RagError::Params(
                "encoded AWS credentials have an empty key".into(),
            ));
        }

        Ok(Self::new(access, secret))
    }

    /// Tenant default pair, if the settings carry both halves.
    pub fn from_settings(settings: &AwsSettings) -> Option<Self> {
        let access = settings.access_key_id.as_deref()?.trim();
        let secret = settings.secret_access_key.as_deref()?.trim();
        if access.is_empty() || secret.is_empty() {
            return None;
        }
        Some(Self::new(access, secret).with_session_token(settings.session_token.clone()))
    }
}

impl fmt::Debug for AwsCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AwsCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"****")
            .field("session_token", &self.session_token.as_ref().map(|_| "****"))
            .finish()
    }
}

/// Resolution order: per-user override, then tenant default, then fail.
///
/// A missing or malformed override never errors on its own.
pub fn resolve_credentials(
    user_override: Option<&str>,
    tenant_default: Option<&AwsCredentials>,
) -> Result<AwsCredentials, RagError> {
    if let Some(encoded) = user_override.filter(|value| !value.trim().is_empty()) {
        match AwsCredentials::parse_encoded(encoded) {
            Ok(credentials) => return Ok(credentials),
            Err(err) => {
                tracing::warn!("Ignoring malformed per-user AWS credentials: {}", err);
            }
        }
    }

    tenant_default.cloned().ok_or_else(|| {
        RagError::Configuration("Missing required AWS credentials".to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tenant_default() -> AwsCredentials {
        AwsCredentials::new("TENANT", "tenant-secret")
    }

    #[test]
    fn parses_encoded_pair() {
        let creds = AwsCredentials::parse_encoded("AKIAUSER::@@::user-secret").expect("parse");
        assert_eq!(creds.access_key_id, "AKIAUSER");
        assert_eq!(creds.secret_access_key(), "user-secret");
        assert!(creds.session_token.is_none());
    }

    #[test]
    fn rejects_pair_without_separator_or_half() {
        assert!(AwsCredentials::parse_encoded("AKIAUSER:user-secret").is_err());
        assert!(AwsCredentials::parse_encoded("::@@::secret").is_err());
        assert!(AwsCredentials::parse_encoded("AKIA::@@::  ").is_err());
    }

    #[test]
    fn user_override_wins() {
        let default = tenant_default();
        let creds = resolve_credentials(Some("AKIAUSER::@@::user-secret"), Some(&default))
            .expect("resolve");
        assert_eq!(creds.access_key_id, "AKIAUSER");
    }

    #[test]
    fn missing_override_falls_back_to_tenant_default() {
        let default = tenant_default();
        assert_eq!(resolve_credentials(None, Some(&default)).expect("resolve"), default);
        assert_eq!(resolve_credentials(Some("  "), Some(&default)).expect("resolve"), default);
    }

    #[test]
    fn malformed_override_falls_back_to_tenant_default() {
        let default = tenant_default();
        let creds = resolve_credentials(Some("garbage"), Some(&default)).expect("resolve");
        assert_eq!(creds, default);
    }

    #[test]
    fn fails_only_when_both_are_absent() {
        let err = resolve_credentials(None, None).unwrap_err();
        assert!(matches!(err, RagError::Configuration(_)));
        let err = resolve_credentials(Some("garbage"), None).unwrap_err();
        assert!(matches!(err, RagError::Configuration(_)));
    }

    #[test]
    fn debug_output_hides_secret() {
        let rendered = format!("{:?}", tenant_default());
        assert!(rendered.contains("TENANT"));
        assert!(!rendered.contains("tenant-secret"));
    }

    #[test]
    fn settings_need_both_halves() {
        let half = AwsSettings {
            access_key_id: Some("AK".into()),
            ..Default::default()
        };
        assert!(AwsCredentials::from_settings(&half).is_none());

        let full = AwsSettings {
            access_key_id: Some("AK".into()),
            secret_access_key: Some("SK".into()),
            session_token: Some("TOKEN".into()),
            region: None,
        };
        let creds = AwsCredentials::from_settings(&full).expect("creds");
        assert_eq!(creds.session_token.as_deref(), Some("TOKEN"));
    }
}
