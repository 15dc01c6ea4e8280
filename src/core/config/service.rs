use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::{Map, Value};

use super::paths::AppPaths;
use super::settings::RagSettings;
use super::validation::validate_config;
use crate::core::errors::RagError;

const REDACT_PLACEHOLDER: &str = "****";

const SENSITIVE_PATTERNS: [&str; 12] = [
    "api_key",
    "secret",
    "password",
    "_token",
    "token_",
    "credential",
    "private_key",
    "auth_",
    "_auth",
    "access_key",
    "session_token",
    "bearer",
];

const SENSITIVE_WHITELIST: [&str; 3] = ["max_tokens", "token_count", "tokens"];

#[derive(Clone)]
pub struct ConfigService {
    paths: Arc<AppPaths>,
}

impl ConfigService {
    pub fn new(paths: Arc<AppPaths>) -> Self {
        Self { paths }
    }

    pub fn config_path(&self) -> PathBuf {
        if let Ok(path) = env::var("RAG_CONFIG_PATH") {
            return PathBuf::from(path);
        }

        let user_config = self.paths.user_data_dir.join("config.yml");
        if user_config.exists() {
            return user_config;
        }

        self.paths.project_root.join("config.yml")
    }

    pub fn secrets_path(&self) -> PathBuf {
        self.paths.secrets_path.clone()
    }

    pub fn load_config(&self) -> Result<Value, RagError> {
        let public_config = load_yaml_file(&self.config_path());
        let secrets_config = load_yaml_file(&self.secrets_path());
        let merged = deep_merge(&public_config, &secrets_config);
        validate_config(&merged)?;
        Ok(merged)
    }

    /// Settings for one tenant: `tenants.<id>` deep-merged over the `rag` section.
    pub fn tenant_settings(&self, tenant_id: Option<&str>) -> Result<RagSettings, RagError> {
        let config = self.load_config()?;
        settings_from_config(&config, tenant_id)
    }

    /// Per-user credential override, stored in its encoded form under `users.<id>`.
    pub fn user_aws_credentials(&self, tenant_id: &str) -> Result<Option<String>, RagError> {
        let config = self.load_config()?;
        Ok(config
            .get("users")
            .and_then(|users| users.get(tenant_id))
            .and_then(|user| user.get("aws_credentials"))
            .and_then(|v| v.as_str())
            .map(str::to_string))
    }
}

pub(crate) fn settings_from_config(
    config: &Value,
    tenant_id: Option<&str>,
) -> Result<RagSettings, RagError> {
    let base = config
        .get("rag")
        .cloned()
        .unwrap_or_else(|| Value::Object(Map::new()));

    let tenant_override = tenant_id.and_then(|id| config.get("tenants").and_then(|t| t.get(id)));
    let effective = match tenant_override {
        Some(overrides) => deep_merge(&base, overrides),
        None => base,
    };

    tracing::debug!(
        "Effective RAG settings for tenant {:?}: {}",
        tenant_id,
        redact_sensitive_values(&effective)
    );

    serde_json::from_value(effective)
        .map_err(|err| RagError::Configuration(format!("Invalid rag settings: {}", err)))
}

fn load_yaml_file(path: &Path) -> Value {
    if !path.exists() {
        return Value::Object(Map::new());
    }

    match fs::read_to_string(path) {
        Ok(contents) => match serde_yaml::from_str::<Value>(&contents) {
            Ok(value) => match value {
                Value::Object(_) => value,
                _ => Value::Object(Map::new()),
            },
            Err(err) => {
                tracing::warn!("Ignoring unreadable config {}: {}", path.display(), err);
                Value::Object(Map::new())
            }
        },
        Err(_) => Value::Object(Map::new()),
    }
}

pub(crate) fn deep_merge(base: &Value, override_value: &Value) -> Value {
    match (base, override_value) {
        (Value::Object(base_map), Value::Object(override_map)) => {
            let mut merged: Map<String, Value> = base_map.clone();
            for (key, value) in override_map {
                let merged_value = match merged.get(key) {
                    Some(existing) => deep_merge(existing, value),
                    None => value.clone(),
                };
                merged.insert(key.clone(), merged_value);
            }
            Value::Object(merged)
        }
        _ => override_value.clone(),
    }
}

fn redact_sensitive_values(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut redacted = Map::new();
            for (key, val) in map {
                if is_sensitive_key(key) && !val.is_null() {
                    redacted.insert(key.clone(), Value::String(REDACT_PLACEHOLDER.to_string()));
                } else {
                    redacted.insert(key.clone(), redact_sensitive_values(val));
                }
            }
            Value::Object(redacted)
        }
        Value::Array(items) => Value::Array(items.iter().map(redact_sensitive_values).collect()),
        _ => value.clone(),
    }
}

fn is_sensitive_key(key: &str) -> bool {
    let key_lower = key.to_lowercase();
    if SENSITIVE_WHITELIST
        .iter()
        .any(|allowed| *allowed == key_lower)
    {
        return false;
    }
    SENSITIVE_PATTERNS
        .iter()
        .any(|pattern| key_lower.contains(pattern))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn deep_merge_merges_objects_and_overrides_scalars() {
        let base = json!({
            "a": 1,
            "b": { "c": 2, "d": 3 },
            "arr": [1, 2]
        });
        let override_value = json!({
            "b": { "c": 99 },
            "arr": [3],
            "e": "x"
        });

        let merged = deep_merge(&base, &override_value);

        assert_eq!(
            merged,
            json!({
                "a": 1,
                "b": { "c": 99, "d": 3 },
                "arr": [3],
                "e": "x"
            })
        );
    }

    #[test]
    fn redact_sensitive_values_replaces_secrets_only() {
        let input = json!({
            "api_token": "secret",
            "aws": {
                "secret_access_key": "shh",
                "access_key_id": "AKIA",
                "region": "us-east-1"
            },
            "defaults": { "max_tokens": 42 }
        });

        let redacted = redact_sensitive_values(&input);

        assert_eq!(
            redacted,
            json!({
                "api_token": "****",
                "aws": {
                    "secret_access_key": "****",
                    "access_key_id": "****",
                    "region": "us-east-1"
                },
                "defaults": { "max_tokens": 42 }
            })
        );
    }

    #[test]
    fn tenant_overrides_are_merged_over_rag_section() {
        let config = json!({
            "rag": {
                "provider": "vectorize",
                "defaults": { "summary_threshold": 750 },
                "s3_vectors": { "vector_bucket_name": "shared", "index_name": "docs" }
            },
            "tenants": {
                "acme": {
                    "provider": "s3vectors",
                    "s3_vectors": { "vector_bucket_name": "acme-bucket" }
                }
            }
        });

        let shared = settings_from_config(&config, Some("other")).expect("settings");
        assert_eq!(shared.provider, "vectorize");

        let acme = settings_from_config(&config, Some("acme")).expect("settings");
        assert_eq!(acme.provider, "s3vectors");
        let s3 = acme.s3_vectors.expect("s3 block");
        assert_eq!(s3.vector_bucket_name.as_deref(), Some("acme-bucket"));
        assert_eq!(s3.index_name.as_deref(), Some("docs"));
        assert_eq!(acme.defaults.summary_threshold, 750);
    }

    #[test]
    fn load_config_merges_secrets_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let paths = AppPaths::with_data_dir(dir.path().to_path_buf(), dir.path().to_path_buf());
        fs::write(
            dir.path().join("config.yml"),
            "rag:\n  provider: bedrock\n  aws:\n    region: eu-west-1\n",
        )
        .expect("write config");
        fs::write(
            dir.path().join("secrets.yaml"),
            "rag:\n  aws:\n    access_key_id: AKIA\n    secret_access_key: s3cr3t\nusers:\n  u1:\n    aws_credentials: \"AK::@@::SK\"\n",
        )
        .expect("write secrets");

        let service = ConfigService::new(Arc::new(paths));
        let settings = service.tenant_settings(None).expect("settings");
        let aws = settings.aws.expect("aws block");
        assert_eq!(aws.region.as_deref(), Some("eu-west-1"));
        assert_eq!(aws.secret_access_key.as_deref(), Some("s3cr3t"));

        let user = service.user_aws_credentials("u1").expect("lookup");
        assert_eq!(user.as_deref(), Some("AK::@@::SK"));
        assert!(service.user_aws_credentials("u2").expect("lookup").is_none());
    }
}
