//! AWS S3 Vectors backend with Titan text embeddings from Bedrock runtime.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use super::content::ContentStore;
use super::provider::{validate_generate_params, EmbeddingProvider};
use super::types::{
    EmbeddingVector, InsertOptions, MatchQuery, MatchResult, MatchSet, Metadata,
    MutationStatus, QueryOptions,
};
use crate::aws::{AwsCredentials, AwsJsonClient};
use crate::core::config::settings::S3VectorsSettings;
use crate::core::errors::RagError;

pub struct S3VectorsProvider {
    vectors: AwsJsonClient,
    embeddings: AwsJsonClient,
    endpoint: String,
    runtime_endpoint: String,
    bucket: String,
    index: String,
    model_id: String,
    dimensions: usize,
    content: Arc<dyn ContentStore>,
}

#[derive(Deserialize)]
struct TitanResponse {
    #[serde(default)]
    embedding: Vec<f32>,
}

#[derive(Deserialize)]
struct QueryVectorsResponse {
    #[serde(default)]
    vectors: Vec<QueriedVector>,
}

#[derive(Deserialize)]
struct QueriedVector {
    key: String,
    #[serde(default)]
    distance: Option<f32>,
    #[serde(default)]
    metadata: Option<Metadata>,
}

impl S3VectorsProvider {
    pub fn from_settings(
        settings: &S3VectorsSettings,
        credentials: AwsCredentials,
        region: &str,
        content: Arc<dyn ContentStore>,
    ) -> Result<Self, RagError> {
        let bucket = required(settings.vector_bucket_name.as_deref(), "s3_vectors.vector_bucket_name")?;
        let index = required(settings.index_name.as_deref(), "s3_vectors.index_name")?;
        if settings.dimensions == 0 {
            return Err(RagError::Configuration(
                "s3_vectors.dimensions must be greater than zero".into(),
            ));
        }
        let model_id = required(
            Some(settings.embedding_model_id.as_str()),
            "s3_vectors.embedding_model_id",
        )?;

        let endpoint = settings
            .endpoint
            .clone()
            .unwrap_or_else(|| format!("https://s3vectors.{}.api.aws", region));
        let runtime_endpoint = settings
            .bedrock_runtime_endpoint
            .clone()
            .unwrap_or_else(|| format!("https://bedrock-runtime.{}.amazonaws.com", region));

        Ok(Self {
            vectors: AwsJsonClient::new(credentials.clone(), region, "s3vectors"),
            embeddings: AwsJsonClient::new(credentials, region, "bedrock"),
            endpoint: endpoint.trim_end_matches('/').to_string(),
            runtime_endpoint: runtime_endpoint.trim_end_matches('/').to_string(),
            bucket: bucket.to_string(),
            index: index.to_string(),
            model_id: model_id.to_string(),
            dimensions: settings.dimensions,
            content,
        })
    }

    fn operation_url(&self, operation: &str) -> String {
        format!("{}/{}", self.endpoint, operation)
    }

    fn invoke_url(&self) -> String {
        format!(
            "{}/model/{}/invoke",
            self.runtime_endpoint,
            urlencoding::encode(&self.model_id)
        )
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, RagError> {
        let body = json!({
            "inputText": text,
            "dimensions": self.dimensions,
            "normalize": true,
        });
        let payload = self.embeddings.post_json(&self.invoke_url(), &body).await?;
        let response: TitanResponse = serde_json::from_value(payload)?;

        if response.embedding.len() != self.dimensions {
            return Err(RagError::Provider(format!(
                "Embedding model {} returned {} dimensions, expected {}",
                self.model_id,
                response.embedding.len(),
                self.dimensions
            )));
        }
        Ok(response.embedding)
    }

    fn build_filter(options: &QueryOptions) -> Option<Value> {
        let mut clauses = Vec::new();
        if let Some(namespace) = &options.namespace {
            clauses.push(json!({ "namespace": { "$eq": namespace } }));
        }
        if let Some(doc_type) = &options.doc_type {
            clauses.push(json!({ "type": { "$eq": doc_type } }));
        }
        if let Some(filter) = options.filter.as_ref().filter(|f| !f.is_null()) {
            clauses.push(filter.clone());
        }

        match clauses.len() {
            0 => None,
            1 => clauses.pop(),
            _ => Some(json!({ "$and": clauses })),
        }
    }
}

#[async_trait]
impl EmbeddingProvider for S3VectorsProvider {
    fn name(&self) -> &str {
        "s3vectors"
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

        let values = self.embed(content).await?;
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
        if let Some(bad) = vectors.iter().find(|v| v.values.len() != self.dimensions) {
            return Err(RagError::Params(format!(
                "Vector {} has {} dimensions, index expects {}",
                bad.id,
                bad.values.len(),
                self.dimensions
            )));
        }

        let namespace = options
            .namespace
            .as_deref()
            .unwrap_or_else(|| self.default_namespace());
        let entries: Vec<Value> = vectors
            .iter()
            .map(|v| {
                let mut metadata = v.metadata.clone();
                metadata.insert("namespace".to_string(), json!(namespace));
                json!({
                    "key": v.id,
                    "data": { "float32": v.values },
                    "metadata": metadata,
                })
            })
            .collect();

        let body = json!({
            "vectorBucketName": self.bucket,
            "indexName": self.index,
            "vectors": entries,
        });
        self.vectors
            .post_json(&self.operation_url("PutVectors"), &body)
            .await
            .map_err(|e| RagError::Provider(format!("PutVectors failed: {}", e)))?;

        tracing::debug!(
            "Put {} vectors into {}/{} namespace '{}'",
            vectors.len(),
            self.bucket,
            self.index,
            namespace
        );
        Ok(MutationStatus::success())
    }

    async fn delete(&self, ids: &[String]) -> Result<MutationStatus, RagError> {
        if ids.is_empty() {
            return Ok(MutationStatus::success());
        }

        let body = json!({
            "vectorBucketName": self.bucket,
            "indexName": self.index,
            "keys": ids,
        });
        match self
            .vectors
            .post_json(&self.operation_url("DeleteVectors"), &body)
            .await
        {
            Ok(_) => Ok(MutationStatus::success()),
            Err(err) => {
                tracing::warn!("DeleteVectors for {} keys failed: {}", ids.len(), err);
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
                self.embed(text).await?
            }
        };

        let mut body = json!({
            "vectorBucketName": self.bucket,
            "indexName": self.index,
            "topK": options.top_k.max(1),
            "queryVector": { "float32": vector },
            "returnMetadata": true,
            "returnDistance": true,
        });
        if let (Some(obj), Some(filter)) = (body.as_object_mut(), Self::build_filter(options)) {
            obj.insert("filter".to_string(), filter);
        }

        let payload = self
            .vectors
            .post_json(&self.operation_url("QueryVectors"), &body)
            .await?;
        let response: QueryVectorsResponse = serde_json::from_value(payload)?;

        let matches = response
            .vectors
            .into_iter()
            .map(|v| MatchResult {
                id: v.key,
                // Cosine distance; similarity is its complement.
                score: 1.0 - v.distance.unwrap_or(1.0),
                metadata: v.metadata.unwrap_or_default(),
            })
            .collect();

        Ok(MatchSet::new(matches))
    }
}

fn required<'a>(value: Option<&'a str>, field: &str) -> Result<&'a str, RagError> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| RagError::Configuration(format!("Missing required S3 Vectors setting: {}", field)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rag::content::MemoryContentStore;

    fn settings() -> S3VectorsSettings {
        S3VectorsSettings {
            vector_bucket_name: Some("kb-bucket".into()),
            index_name: Some("docs".into()),
            region: None,
            embedding_model_id: "amazon.titan-embed-text-v2:0".into(),
            dimensions: 4,
            endpoint: None,
            bedrock_runtime_endpoint: None,
        }
    }

    fn provider() -> S3VectorsProvider {
        S3VectorsProvider::from_settings(
            &settings(),
            AwsCredentials::new("AK", "SK"),
            "eu-central-1",
            Arc::new(MemoryContentStore::new()),
        )
        .unwrap()
    }

    #[test]
    fn missing_bucket_is_named() {
        let mut incomplete = settings();
        incomplete.vector_bucket_name = None;
        let err = S3VectorsProvider::from_settings(
            &incomplete,
            AwsCredentials::new("AK", "SK"),
            "eu-central-1",
            Arc::new(MemoryContentStore::new()),
        )
        .err()
        .unwrap();
        assert!(matches!(err, RagError::Configuration(ref m) if m.contains("vector_bucket_name")));
    }

    #[test]
    fn urls_follow_region() {
        let provider = provider();
        assert_eq!(
            provider.operation_url("QueryVectors"),
            "https://s3vectors.eu-central-1.api.aws/QueryVectors"
        );
        assert_eq!(
            provider.invoke_url(),
            "https://bedrock-runtime.eu-central-1.amazonaws.com/model/amazon.titan-embed-text-v2%3A0/invoke"
        );
    }

    #[tokio::test]
    async fn insert_rejects_wrong_dimensions_before_network() {
        let vector = EmbeddingVector {
            id: "doc-1".into(),
            values: vec![0.1, 0.2],
            metadata: Metadata::new(),
        };
        let err = provider()
            .insert(&[vector], &InsertOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::Params(_)));
    }

    #[tokio::test]
    async fn empty_delete_is_a_noop() {
        let status = provider().delete(&[]).await.unwrap();
        assert!(status.is_success());
    }

    #[test]
    fn filter_joins_namespace_and_type() {
        let options = QueryOptions {
            namespace: Some("user_kb_42".into()),
            doc_type: Some("faq".into()),
            ..Default::default()
        };
        let filter = S3VectorsProvider::build_filter(&options).unwrap();
        assert_eq!(filter["$and"][0]["namespace"]["$eq"], "user_kb_42");
        assert_eq!(filter["$and"][1]["type"]["$eq"], "faq");
    }
}
