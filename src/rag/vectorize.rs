//! Cloudflare Vectorize backend with Workers AI embeddings.
//!
//! Both bindings are plain Cloudflare REST endpoints here: the AI binding
//! names the embedding model, the index binding names the Vectorize index.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Map, Value};

use super::content::ContentStore;
use super::provider::{validate_generate_params, EmbeddingProvider};
use super::types::{
    EmbeddingVector, InsertOptions, MatchQuery, MatchResult, MatchSet, Metadata,
    MutationStatus, QueryOptions,
};
use crate::core::config::settings::VectorizeSettings;
use crate::core::errors::RagError;

const DEFAULT_BASE_URL: &str = "https://api.cloudflare.com/client/v4";
const SERVICE: &str = "vectorize";

pub struct VectorizeProvider {
    client: Client,
    base_url: String,
    account_id: String,
    api_token: String,
    embedding_model: String,
    index_name: String,
    default_namespace: String,
    content: Arc<dyn ContentStore>,
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    errors: Vec<Value>,
    #[serde(default)]
    result: Value,
}

#[derive(Deserialize)]
struct EmbeddingResult {
    #[serde(default)]
    data: Vec<Vec<f32>>,
}

#[derive(Deserialize)]
struct QueryResult {
    #[serde(default)]
    count: Option<usize>,
    #[serde(default)]
    matches: Vec<VectorizeMatch>,
}

#[derive(Deserialize)]
struct VectorizeMatch {
    id: String,
    score: f32,
    #[serde(default)]
    metadata: Option<Metadata>,
    #[serde(default)]
    namespace: Option<String>,
}

impl VectorizeProvider {
    /// Fails before any network call when either binding is missing.
    pub fn from_settings(
        settings: &VectorizeSettings,
        content: Arc<dyn ContentStore>,
    ) -> Result<Self, RagError> {
        let ai = settings.ai.as_ref().ok_or_else(|| {
            RagError::Configuration("Missing required AI binding (vectorize.ai)".into())
        })?;
        let index = settings.index.as_ref().ok_or_else(|| {
            RagError::Configuration("Missing required vector index binding (vectorize.index)".into())
        })?;
        let account_id = non_empty(settings.account_id.as_deref()).ok_or_else(|| {
            RagError::Configuration("Missing required Cloudflare account id (vectorize.account_id)".into())
        })?;
        let api_token = non_empty(settings.api_token.as_deref()).ok_or_else(|| {
            RagError::Configuration("Missing required Cloudflare API token (vectorize.api_token)".into())
        })?;

        let base_url = settings
            .base_url
            .as_deref()
            .unwrap_or(DEFAULT_BASE_URL)
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            client: Client::new(),
            base_url,
            account_id: account_id.to_string(),
            api_token: api_token.to_string(),
            embedding_model: ai.embedding_model.clone(),
            index_name: index.index_name.clone(),
            default_namespace: index.default_namespace.clone(),
            content,
        })
    }

    fn index_url(&self, op: &str) -> String {
        format!(
            "{}/accounts/{}/vectorize/v2/indexes/{}/{}",
            self.base_url, self.account_id, self.index_name, op
        )
    }

    async fn post(&self, url: &str, body: reqwest::Body, content_type: &str) -> Result<Value, RagError> {
        let res = self
            .client
            .post(url)
            .bearer_auth(&self.api_token)
            .header("content-type", content_type)
            .body(body)
            .send()
            .await?;

        let status = res.status();
        if !status.is_success() {
            let text = res.text().await.unwrap_or_default();
            return Err(RagError::external(SERVICE, status, text));
        }

        let envelope: Envelope = res.json().await?;
        if !envelope.success {
            return Err(RagError::Provider(format!(
                "Cloudflare API reported failure: {}",
                Value::Array(envelope.errors)
            )));
        }
        Ok(envelope.result)
    }

    async fn post_json(&self, url: &str, body: &Value) -> Result<Value, RagError> {
        let payload = serde_json::to_vec(body).map_err(RagError::internal)?;
        self.post(url, payload.into(), "application/json").await
    }

    async fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, RagError> {
        let url = format!(
            "{}/accounts/{}/ai/run/{}",
            self.base_url, self.account_id, self.embedding_model
        );
        let result = self.post_json(&url, &json!({ "text": texts })).await?;
        let parsed: EmbeddingResult = serde_json::from_value(result)?;

        if parsed.data.len() != texts.len() || parsed.data.iter().any(|v| v.is_empty()) {
            return Err(RagError::Provider(format!(
                "Workers AI returned {} embeddings for {} inputs",
                parsed.data.len(),
                texts.len()
            )));
        }
        Ok(parsed.data)
    }

    /// Caller filter plus a `type` equality clause.
    fn build_filter(filter: Option<&Value>, doc_type: Option<&str>) -> Option<Value> {
        let mut merged = match filter {
            Some(Value::Object(map)) => map.clone(),
            _ => Map::new(),
        };
        if let Some(doc_type) = doc_type {
            merged.insert("type".to_string(), json!(doc_type));
        }
        (!merged.is_empty()).then_some(Value::Object(merged))
    }
}

#[async_trait]
impl EmbeddingProvider for VectorizeProvider {
    fn name(&self) -> &str {
        "vectorize"
    }

    fn default_namespace(&self) -> &str {
        &self.default_namespace
    }

    fn content_store(&self) -> &dyn ContentStore {
        self.content.as_ref()
    }

    async fn generate(
        &self,
        doc_type: &str,
        content: &str,
        id: &str,
        mut metadata: Metadata,
    ) -> Result<Vec<EmbeddingVector>, RagError> {
        validate_generate_params(doc_type, content, id)?;

        let values = self
            .embed(&[content])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| RagError::Provider("Workers AI returned no embedding".into()))?;

        metadata.insert("type".to_string(), json!(doc_type));
        Ok(vec![EmbeddingVector {
            id: id.to_string(),
            values,
            metadata,
        }])
    }

    async fn insert(
        &self,
        vectors: &[EmbeddingVector],
        options: &InsertOptions,
    ) -> Result<MutationStatus, RagError> {
        if vectors.is_empty() {
            return Ok(MutationStatus::success());
        }

        let namespace = options
            .namespace
            .as_deref()
            .unwrap_or(&self.default_namespace);

        let mut ndjson = String::new();
        for vector in vectors {
            let mut metadata = vector.metadata.clone();
            metadata.insert("namespace".to_string(), json!(namespace));
            let line = json!({
                "id": vector.id,
                "values": vector.values,
                "namespace": namespace,
                "metadata": metadata,
            });
            ndjson.push_str(&line.to_string());
            ndjson.push('\n');
        }

        self.post(&self.index_url("upsert"), ndjson.into(), "application/x-ndjson")
            .await
            .map_err(|e| RagError::Provider(format!("Vectorize upsert failed: {}", e)))?;

        tracing::debug!("Upserted {} vectors into namespace '{}'", vectors.len(), namespace);
        Ok(MutationStatus::success())
    }

    async fn delete(&self, ids: &[String]) -> Result<MutationStatus, RagError> {
        if ids.is_empty() {
            return Ok(MutationStatus::success());
        }

        match self
            .post_json(&self.index_url("delete_by_ids"), &json!({ "ids": ids }))
            .await
        {
            Ok(_) => Ok(MutationStatus::success()),
            Err(err) => {
                tracing::warn!("Vectorize delete of {} ids failed: {}", ids.len(), err);
                Ok(MutationStatus::error(err.to_string()))
            }
        }
    }

    async fn get_matches(
        &self,
        query: MatchQuery<'_>,
        options: &QueryOptions,
    ) -> Result<MatchSet, RagError> {
        let vector = match query {
            MatchQuery::Vector(values) => values.to_vec(),
            MatchQuery::Text(text) => {
                if text.trim().is_empty() {
                    return Err(RagError::Params("Query text is empty".into()));
                }
                self.embed(&[text])
                    .await?
                    .into_iter()
                    .next()
                    .ok_or_else(|| RagError::Provider("Workers AI returned no embedding".into()))?
            }
        };

        let namespace = options
            .namespace
            .as_deref()
            .unwrap_or(&self.default_namespace);

        let mut body = json!({
            "vector": vector,
            "topK": options.top_k,
            "returnValues": options.return_values,
            "returnMetadata": options.return_metadata.as_str(),
            "namespace": namespace,
        });
        if let (Some(obj), Some(filter)) = (
            body.as_object_mut(),
            Self::build_filter(options.filter.as_ref(), options.doc_type.as_deref()),
        ) {
            obj.insert("filter".to_string(), filter);
        }

        let result = self.post_json(&self.index_url("query"), &body).await?;
        let parsed: QueryResult = serde_json::from_value(result)?;

        let matches: Vec<MatchResult> = parsed
            .matches
            .into_iter()
            .map(|m| {
                let mut metadata = m.metadata.unwrap_or_default();
                if let Some(ns) = m.namespace {
                    metadata.entry("namespace").or_insert(json!(ns));
                }
                MatchResult {
                    id: m.id,
                    score: m.score,
                    metadata,
                }
            })
            .collect();

        let count = parsed.count.unwrap_or(matches.len());
        Ok(MatchSet { matches, count })
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::settings::{VectorIndexBinding, WorkersAiBinding};
    use crate::rag::content::MemoryContentStore;

    fn complete_settings() -> VectorizeSettings {
        VectorizeSettings {
            account_id: Some("acc".into()),
            api_token: Some("tok".into()),
            base_url: Some("http://127.0.0.1:9/".into()),
            ai: Some(WorkersAiBinding {
                embedding_model: "@cf/baai/bge-base-en-v1.5".into(),
            }),
            index: Some(VectorIndexBinding {
                index_name: "kb-index".into(),
                default_namespace: "kb".into(),
            }),
        }
    }

    fn store() -> Arc<dyn ContentStore> {
        Arc::new(MemoryContentStore::new())
    }

    #[test]
    fn missing_bindings_are_configuration_errors() {
        let mut settings = complete_settings();
        settings.ai = None;
        let err = VectorizeProvider::from_settings(&settings, store()).err().unwrap();
        assert!(matches!(err, RagError::Configuration(ref m) if m.contains("vectorize.ai")));

        let mut settings = complete_settings();
        settings.index = None;
        let err = VectorizeProvider::from_settings(&settings, store()).err().unwrap();
        assert!(matches!(err, RagError::Configuration(ref m) if m.contains("vectorize.index")));

        let mut settings = complete_settings();
        settings.api_token = Some("  ".into());
        assert!(VectorizeProvider::from_settings(&settings, store()).is_err());
    }

    #[test]
    fn base_url_is_normalized() {
        let provider = VectorizeProvider::from_settings(&complete_settings(), store()).unwrap();
        assert_eq!(
            provider.index_url("query"),
            "http://127.0.0.1:9/accounts/acc/vectorize/v2/indexes/kb-index/query"
        );
    }

    #[test]
    fn filter_merges_type_clause() {
        let filter = VectorizeProvider::build_filter(Some(&json!({ "lang": "en" })), Some("faq"));
        assert_eq!(filter, Some(json!({ "lang": "en", "type": "faq" })));
        assert_eq!(VectorizeProvider::build_filter(None, None), None);
    }

    #[tokio::test]
    async fn generate_rejects_empty_params_without_network() {
        // base_url points at a closed port; a network call would fail differently.
        let provider = VectorizeProvider::from_settings(&complete_settings(), store()).unwrap();
        let err = provider
            .generate("faq", "", "doc-1", Metadata::new())
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::Params(_)));
    }
}
