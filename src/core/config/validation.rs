use serde_json::{Map, Value};

use super::service::deep_merge;
use crate::core::errors::RagError;

pub fn validate_config(config: &Value) -> Result<(), RagError> {
    let root = config
        .as_object()
        .ok_or_else(|| config_type_error("root", "object"))?;

    let rag = expect_optional_object(root, "rag")?;
    if let Some(rag) = rag {
        validate_rag_section(rag, "rag")?;
    }

    // Tenant entries are partial overrides; check them as they will be used.
    if let Some(tenants) = expect_optional_object(root, "tenants")? {
        let base = Value::Object(rag.cloned().unwrap_or_default());
        for (tenant_id, value) in tenants {
            let path_prefix = format!("tenants.{}", tenant_id);
            if !value.is_object() {
                return Err(config_type_error(&path_prefix, "object"));
            }
            if let Value::Object(effective) = deep_merge(&base, value) {
                validate_rag_section(&effective, &path_prefix)?;
            }
        }
    }

    if let Some(users) = expect_optional_object(root, "users")? {
        for (user_id, value) in users {
            let path_prefix = format!("users.{}", user_id);
            let entry = value
                .as_object()
                .ok_or_else(|| config_type_error(&path_prefix, "object"))?;
            validate_optional_string_field(
                entry,
                &format!("{}.aws_credentials", path_prefix),
                "aws_credentials",
            )?;
        }
    }

    Ok(())
}

fn validate_rag_section(section: &Map<String, Value>, prefix: &str) -> Result<(), RagError> {
    validate_optional_string_field(section, &format!("{}.provider", prefix), "provider")?;

    if let Some(defaults) = expect_optional_object(section, "defaults")? {
        let path = |key: &str| format!("{}.defaults.{}", prefix, key);
        validate_f64_field(defaults, &path("score_threshold"), "score_threshold", -1.0, 1.0)?;
        validate_u64_field(
            defaults,
            &path("summary_threshold"),
            "summary_threshold",
            1,
            1_000_000,
        )?;
        validate_u64_field(
            defaults,
            &path("rerank_min_candidates"),
            "rerank_min_candidates",
            1,
            1_000,
        )?;
        validate_u64_field(
            defaults,
            &path("rerank_multiplier"),
            "rerank_multiplier",
            1,
            100,
        )?;
        validate_u64_field(
            defaults,
            &path("short_query_chars"),
            "short_query_chars",
            0,
            10_000,
        )?;
        validate_u64_field(
            defaults,
            &path("call_timeout_ms"),
            "call_timeout_ms",
            1,
            600_000,
        )?;
    }

    if let Some(vectorize) = expect_optional_object(section, "vectorize")? {
        let path = |key: &str| format!("{}.vectorize.{}", prefix, key);
        validate_optional_string_field(vectorize, &path("account_id"), "account_id")?;
        validate_optional_string_field(vectorize, &path("api_token"), "api_token")?;
        validate_optional_string_field(vectorize, &path("base_url"), "base_url")?;
        if let Some(index) = expect_optional_object(vectorize, "index")? {
            validate_required_string_field(index, &path("index.index_name"), "index_name")?;
        }
    }

    if let Some(aws) = expect_optional_object(section, "aws")? {
        let path = |key: &str| format!("{}.aws.{}", prefix, key);
        validate_optional_string_field(aws, &path("region"), "region")?;
        validate_optional_string_field(aws, &path("access_key_id"), "access_key_id")?;
        validate_optional_string_field(aws, &path("secret_access_key"), "secret_access_key")?;
    }

    if let Some(s3) = expect_optional_object(section, "s3_vectors")? {
        let path = |key: &str| format!("{}.s3_vectors.{}", prefix, key);
        validate_u64_field(s3, &path("dimensions"), "dimensions", 1, 65_536)?;
    }

    if let Some(aux) = expect_optional_object(section, "auxiliary_model")? {
        let path = |key: &str| format!("{}.auxiliary_model.{}", prefix, key);
        validate_required_string_field(aux, &path("base_url"), "base_url")?;
        validate_required_string_field(aux, &path("model"), "model")?;
        validate_f64_field(aux, &path("temperature"), "temperature", 0.0, 2.0)?;
    }

    Ok(())
}

fn expect_optional_object<'a>(
    root: &'a Map<String, Value>,
    key: &str,
) -> Result<Option<&'a Map<String, Value>>, RagError> {
    match root.get(key) {
        Some(Value::Object(map)) => Ok(Some(map)),
        Some(_) => Err(config_type_error(key, "object")),
        None => Ok(None),
    }
}

fn validate_u64_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
    min: u64,
    max: u64,
) -> Result<(), RagError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    let Some(number) = value.as_u64() else {
        return Err(config_type_error(path, "integer"));
    };
    if number < min || number > max {
        return Err(RagError::Configuration(format!(
            "Invalid config at '{}': must be between {} and {}",
            path, min, max
        )));
    }
    Ok(())
}

fn validate_f64_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
    min: f64,
    max: f64,
) -> Result<(), RagError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    let Some(number) = value.as_f64() else {
        return Err(config_type_error(path, "number"));
    };
    if number < min || number > max {
        return Err(RagError::Configuration(format!(
            "Invalid config at '{}': must be between {} and {}",
            path, min, max
        )));
    }
    Ok(())
}

fn validate_required_string_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
) -> Result<(), RagError> {
    let value = section.get(key).ok_or_else(|| {
        RagError::Configuration(format!("Invalid config at '{}': value is required", path))
    })?;
    let Some(text) = value.as_str() else {
        return Err(config_type_error(path, "string"));
    };
    if text.trim().is_empty() {
        return Err(RagError::Configuration(format!(
            "Invalid config at '{}': value cannot be empty",
            path
        )));
    }
    Ok(())
}

fn validate_optional_string_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
) -> Result<(), RagError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    if value.as_str().is_none() && !value.is_null() {
        return Err(config_type_error(path, "string"));
    }
    Ok(())
}

fn config_type_error(path: &str, expected: &str) -> RagError {
    RagError::Configuration(format!(
        "Invalid config at '{}': expected {}",
        path, expected
    ))
}
