//! Typed view over the `rag` section of the merged configuration.
//!
//! Every backend block is optional here; whether a block is complete enough
//! to build a provider is decided by the provider selector, which fails with
//! a configuration error naming the missing field.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub const DEFAULT_PROVIDER: &str = "vectorize";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RagSettings {
    pub provider: String,
    pub defaults: PipelineDefaults,
    pub vectorize: Option<VectorizeSettings>,
    pub bedrock_knowledge_base: Option<BedrockKnowledgeBaseSettings>,
    pub s3_vectors: Option<S3VectorsSettings>,
    /// Tenant default AWS credentials, shared by both AWS backends.
    pub aws: Option<AwsSettings>,
    pub auxiliary_model: Option<AuxiliaryModelSettings>,
    pub content_store: Option<ContentStoreSettings>,
}

impl Default for RagSettings {
    fn default() -> Self {
        Self {
            provider: DEFAULT_PROVIDER.to_string(),
            defaults: PipelineDefaults::default(),
            vectorize: None,
            bedrock_knowledge_base: None,
            s3_vectors: None,
            aws: None,
            auxiliary_model: None,
            content_store: None,
        }
    }
}

/// Tuning constants for the augmentation pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineDefaults {
    pub score_threshold: f32,
    pub summary_threshold: usize,
    pub rerank_min_candidates: usize,
    pub rerank_multiplier: usize,
    pub short_query_chars: usize,
    pub call_timeout_ms: u64,
}

impl Default for PipelineDefaults {
    fn default() -> Self {
        Self {
            score_threshold: 0.7,
            summary_threshold: 750,
            rerank_min_candidates: 10,
            rerank_multiplier: 2,
            short_query_chars: 20,
            call_timeout_ms: 15_000,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VectorizeSettings {
    pub account_id: Option<String>,
    pub api_token: Option<String>,
    pub base_url: Option<String>,
    /// Workers AI binding used for embeddings.
    pub ai: Option<WorkersAiBinding>,
    /// Vectorize index binding.
    pub index: Option<VectorIndexBinding>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkersAiBinding {
    #[serde(default = "default_workers_ai_model")]
    pub embedding_model: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorIndexBinding {
    pub index_name: String,
    #[serde(default = "default_namespace")]
    pub default_namespace: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BedrockKnowledgeBaseSettings {
    pub knowledge_base_id: Option<String>,
    pub custom_data_source_id: Option<String>,
    pub region: Option<String>,
    pub agent_endpoint: Option<String>,
    pub runtime_endpoint: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct S3VectorsSettings {
    pub vector_bucket_name: Option<String>,
    pub index_name: Option<String>,
    pub region: Option<String>,
    #[serde(default = "default_titan_model")]
    pub embedding_model_id: String,
    #[serde(default = "default_titan_dimensions")]
    pub dimensions: usize,
    pub endpoint: Option<String>,
    pub bedrock_runtime_endpoint: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AwsSettings {
    pub region: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub session_token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuxiliaryModelSettings {
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub temperature: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContentStoreSettings {
    pub sqlite_path: Option<PathBuf>,
}

fn default_workers_ai_model() -> String {
    "@cf/baai/bge-base-en-v1.5".to_string()
}

fn default_namespace() -> String {
    crate::rag::namespace::DEFAULT_NAMESPACE.to_string()
}

fn default_titan_model() -> String {
    "amazon.titan-embed-text-v2:0".to_string()
}

fn default_titan_dimensions() -> usize {
    1024
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_section_uses_documented_defaults() {
        let settings: RagSettings = serde_json::from_value(json!({})).expect("settings");
        assert_eq!(settings.provider, "vectorize");
        assert!((settings.defaults.score_threshold - 0.7).abs() < f32::EPSILON);
        assert_eq!(settings.defaults.summary_threshold, 750);
        assert_eq!(settings.defaults.rerank_min_candidates, 10);
        assert!(settings.vectorize.is_none());
    }

    #[test]
    fn partial_defaults_keep_unset_fields() {
        let settings: RagSettings = serde_json::from_value(json!({
            "defaults": { "summary_threshold": 400 },
            "s3_vectors": { "vector_bucket_name": "bucket", "index_name": "docs" }
        }))
        .expect("settings");

        assert_eq!(settings.defaults.summary_threshold, 400);
        assert_eq!(settings.defaults.short_query_chars, 20);
        let s3 = settings.s3_vectors.expect("s3 block");
        assert_eq!(s3.embedding_model_id, "amazon.titan-embed-text-v2:0");
        assert_eq!(s3.dimensions, 1024);
    }
}
