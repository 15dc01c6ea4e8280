//! AWS Bedrock Knowledge Base backend.
//!
//! The knowledge base embeds server side, so `generate` only packages the
//! content and metadata; `insert` ingests inline documents into a custom
//! data source and `get_matches` calls the Retrieve API with query text.

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
use crate::core::config::settings::BedrockKnowledgeBaseSettings;
use crate::core::errors::RagError;

const SIGNING_SERVICE: &str = "bedrock";

pub struct BedrockKnowledgeBaseProvider {
    client: AwsJsonClient,
    knowledge_base_id: String,
    data_source_id: String,
    agent_endpoint: String,
    runtime_endpoint: String,
    content: Arc<dyn ContentStore>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RetrieveResponse {
    #[serde(default)]
    retrieval_results: Vec<RetrievalResult>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RetrievalResult {
    #[serde(default)]
    content: Option<RetrievalContent>,
    #[serde(default)]
    location: Option<Value>,
    #[serde(default)]
    metadata: Option<Metadata>,
    #[serde(default)]
    score: f32,
}

#[derive(Deserialize)]
struct RetrievalContent {
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct IngestResponse {
    #[serde(default)]
    document_details: Vec<DocumentDetail>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DocumentDetail {
    #[serde(default)]
    status: String,
    #[serde(default)]
    status_reason: Option<String>,
}

impl BedrockKnowledgeBaseProvider {
    pub fn from_settings(
        settings: &BedrockKnowledgeBaseSettings,
        credentials: AwsCredentials,
        region: &str,
        content: Arc<dyn ContentStore>,
    ) -> Result<Self, RagError> {
        let knowledge_base_id = required(
            settings.knowledge_base_id.as_deref(),
            "bedrock_knowledge_base.knowledge_base_id",
        )?;
        let data_source_id = required(
            settings.custom_data_source_id.as_deref(),
            "bedrock_knowledge_base.custom_data_source_id",
        )?;

        let agent_endpoint = settings
            .agent_endpoint
            .clone()
            .unwrap_or_else(|| format!("https://bedrock-agent.{}.amazonaws.com", region));
        let runtime_endpoint = settings
            .runtime_endpoint
            .clone()
            .unwrap_or_else(|| format!("https://bedrock-agent-runtime.{}.amazonaws.com", region));

        Ok(Self {
            client: AwsJsonClient::new(credentials, region, SIGNING_SERVICE),
            knowledge_base_id: knowledge_base_id.to_string(),
            data_source_id: data_source_id.to_string(),
            agent_endpoint: agent_endpoint.trim_end_matches('/').to_string(),
            runtime_endpoint: runtime_endpoint.trim_end_matches('/').to_string(),
            content,
        })
    }

    fn ingest_url(&self) -> String {
        format!(
            "{}/knowledgebases/{}/datasources/{}/documents",
            self.agent_endpoint,
            urlencoding::encode(&self.knowledge_base_id),
            urlencoding::encode(&self.data_source_id)
        )
    }

    fn retrieve_url(&self) -> String {
        format!(
            "{}/knowledgebases/{}/retrieve",
            self.runtime_endpoint,
            urlencoding::encode(&self.knowledge_base_id)
        )
    }

    fn ingest_document(vector: &EmbeddingVector, namespace: &str) -> Result<Value, RagError> {
        let text = vector
            .metadata
            .get("content")
            .and_then(Value::as_str)
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| {
                RagError::Params(format!("Vector {} carries no content to ingest", vector.id))
            })?;

        let mut attributes: Vec<Value> = vector
            .metadata
            .iter()
            .filter(|(key, _)| key.as_str() != "content" && key.as_str() != "namespace")
            .filter_map(|(key, value)| inline_attribute(key, value))
            .collect();
        attributes.push(json!({
            "key": "namespace",
            "value": { "type": "STRING", "stringValue": namespace },
        }));
        attributes.push(json!({
            "key": "id",
            "value": { "type": "STRING", "stringValue": vector.id },
        }));

        Ok(json!({
            "content": {
                "dataSourceType": "CUSTOM",
                "custom": {
                    "customDocumentIdentifier": { "id": vector.id },
                    "sourceType": "IN_LINE",
                    "inlineContent": {
                        "type": "TEXT",
                        "textContent": { "data": text },
                    },
                },
            },
            "metadata": {
                "type": "IN_LINE_ATTRIBUTE",
                "inlineAttributes": attributes,
            },
        }))
    }

    /// Namespace equality, plus `type` and any caller filter, AND-ed together.
    fn build_filter(options: &QueryOptions) -> Option<Value> {
        let mut clauses = Vec::new();
        if let Some(namespace) = &options.namespace {
            clauses.push(json!({ "equals": { "key": "namespace", "value": namespace } }));
        }
        if let Some(doc_type) = &options.doc_type {
            clauses.push(json!({ "equals": { "key": "type", "value": doc_type } }));
        }
        if let Some(filter) = options.filter.as_ref().filter(|f| !f.is_null()) {
            clauses.push(filter.clone());
        }

        match clauses.len() {
            0 => None,
            1 => clauses.pop(),
            _ => Some(json!({ "andAll": clauses })),
        }
    }

    fn match_id(result: &RetrievalResult) -> Option<String> {
        let from_metadata = result
            .metadata
            .as_ref()
            .and_then(|m| m.get("id").or_else(|| m.get("x-amz-bedrock-kb-chunk-id")))
            .and_then(Value::as_str);
        let from_location = result.location.as_ref().and_then(|loc| {
            loc.pointer("/customDocumentLocation/id")
                .or_else(|| loc.pointer("/s3Location/uri"))
                .and_then(Value::as_str)
        });
        from_metadata
            .filter(|id| !id.is_empty())
            .or(from_location)
            .map(str::to_string)
    }
}

#[async_trait]
impl EmbeddingProvider for BedrockKnowledgeBaseProvider {
    fn name(&self) -> &str {
        "bedrock-knowledge-base"
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

        metadata.insert("type".to_string(), json!(doc_type));
        metadata.insert("content".to_string(), json!(content));
        Ok(vec![EmbeddingVector {
            id: id.to_string(),
            values: Vec::new(),
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
            .unwrap_or_else(|| self.default_namespace());
        let documents = vectors
            .iter()
            .map(|v| Self::ingest_document(v, namespace))
            .collect::<Result<Vec<_>, _>>()?;

        let payload = self
            .client
            .put_json(&self.ingest_url(), &json!({ "documents": documents }))
            .await
            .map_err(|e| RagError::Provider(format!("Knowledge base ingestion failed: {}", e)))?;

        let response: IngestResponse = serde_json::from_value(payload)?;
        let failures: Vec<String> = response
            .document_details
            .iter()
            .filter(|d| d.status.eq_ignore_ascii_case("FAILED"))
            .map(|d| d.status_reason.clone().unwrap_or_else(|| "unknown reason".into()))
            .collect();

        if !failures.is_empty() {
            return Err(RagError::Provider(format!(
                "Knowledge base rejected {} of {} documents: {}",
                failures.len(),
                vectors.len(),
                failures.join("; ")
            )));
        }

        Ok(MutationStatus::success())
    }

    async fn delete(&self, ids: &[String]) -> Result<MutationStatus, RagError> {
        tracing::debug!(
            "Delete of {} ids requested on knowledge base {}; unsupported",
            ids.len(),
            self.knowledge_base_id
        );
        Ok(MutationStatus::not_implemented())
    }

    async fn get_matches(
        &self,
        query: MatchQuery<'_>,
        options: &QueryOptions,
    ) -> Result<MatchSet, RagError> {
        let MatchQuery::Text(text) = query else {
            return Err(RagError::Params(
                "Knowledge base retrieval needs query text, not a vector".into(),
            ));
        };
        if text.trim().is_empty() {
            return Err(RagError::Params("Query text is empty".into()));
        }

        let mut search = json!({ "numberOfResults": options.top_k.max(1) });
        if let (Some(obj), Some(filter)) = (search.as_object_mut(), Self::build_filter(options)) {
            obj.insert("filter".to_string(), filter);
        }
        let body = json!({
            "retrievalQuery": { "text": text },
            "retrievalConfiguration": { "vectorSearchConfiguration": search },
        });

        let payload = self.client.post_json(&self.retrieve_url(), &body).await?;
        let response: RetrieveResponse = serde_json::from_value(payload)?;

        let matches: Vec<MatchResult> = response
            .retrieval_results
            .into_iter()
            .filter_map(|result| {
                let id = Self::match_id(&result)?;
                let mut metadata = result.metadata.unwrap_or_default();
                if let Some(content) = result.content.filter(|c| !c.text.is_empty()) {
                    metadata.insert("content".to_string(), json!(content.text));
                }
                Some(MatchResult {
                    id,
                    score: result.score,
                    metadata,
                })
            })
            .collect();

        Ok(MatchSet::new(matches))
    }
}

fn required<'a>(value: Option<&'a str>, field: &str) -> Result<&'a str, RagError> {
    value.map(str::trim).filter(|v| !v.is_empty()).ok_or_else(|| {
        RagError::Configuration(format!(
            "Missing required AWS credentials or knowledge base IDs: {}",
            field
        ))
    })
}

fn inline_attribute(key: &str, value: &Value) -> Option<Value> {
    let typed = match value {
        Value::String(s) => json!({ "type": "STRING", "stringValue": s }),
        Value::Number(n) => json!({ "type": "NUMBER", "numberValue": n }),
        Value::Bool(b) => json!({ "type": "BOOLEAN", "booleanValue": b }),
        Value::Array(items) => {
            let strings: Vec<String> = items
                .iter()
                .map(|item| match item {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect();
            json!({ "type": "STRING_LIST", "stringListValue": strings })
        }
        Value::Null => return None,
        Value::Object(_) => json!({ "type": "STRING", "stringValue": value.to_string() }),
    };
    Some(json!({ "key": key, "value": typed }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rag::content::MemoryContentStore;

    fn settings() -> BedrockKnowledgeBaseSettings {
        BedrockKnowledgeBaseSettings {
            knowledge_base_id: Some("KB123".into()),
            custom_data_source_id: Some("DS456".into()),
            region: None,
            agent_endpoint: None,
            runtime_endpoint: None,
        }
    }

    fn provider() -> BedrockKnowledgeBaseProvider {
        BedrockKnowledgeBaseProvider::from_settings(
            &settings(),
            AwsCredentials::new("AK", "SK"),
            "us-west-2",
            Arc::new(MemoryContentStore::new()),
        )
        .unwrap()
    }

    #[test]
    fn missing_ids_name_the_field() {
        let mut incomplete = settings();
        incomplete.custom_data_source_id = None;
        let err = BedrockKnowledgeBaseProvider::from_settings(
            &incomplete,
            AwsCredentials::new("AK", "SK"),
            "us-west-2",
            Arc::new(MemoryContentStore::new()),
        )
        .err()
        .unwrap();

        assert!(matches!(err, RagError::Configuration(_)));
        assert!(err
            .to_string()
            .contains("Missing required AWS credentials or knowledge base IDs"));
        assert!(err.to_string().contains("custom_data_source_id"));
    }

    #[test]
    fn endpoints_default_to_region() {
        let provider = provider();
        assert_eq!(
            provider.retrieve_url(),
            "https://bedrock-agent-runtime.us-west-2.amazonaws.com/knowledgebases/KB123/retrieve"
        );
        assert_eq!(
            provider.ingest_url(),
            "https://bedrock-agent.us-west-2.amazonaws.com/knowledgebases/KB123/datasources/DS456/documents"
        );
    }

    #[tokio::test]
    async fn generate_produces_metadata_only_vector() {
        let vectors = provider()
            .generate("faq", "Refunds take 5 days", "doc-1", Metadata::new())
            .await
            .unwrap();

        assert_eq!(vectors.len(), 1);
        assert!(vectors[0].values.is_empty());
        assert_eq!(vectors[0].metadata.get("content"), Some(&json!("Refunds take 5 days")));
        assert_eq!(vectors[0].metadata.get("type"), Some(&json!("faq")));
    }

    #[tokio::test]
    async fn generate_rejects_missing_id() {
        let err = provider()
            .generate("faq", "text", "", Metadata::new())
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::Params(_)));
    }

    #[tokio::test]
    async fn delete_reports_not_implemented() {
        let status = provider().delete(&["doc-1".to_string()]).await.unwrap();
        assert_eq!(status, MutationStatus::not_implemented());
    }

    #[tokio::test]
    async fn vector_queries_are_rejected() {
        let err = provider()
            .get_matches(MatchQuery::Vector(&[0.1, 0.2]), &QueryOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::Params(_)));
    }

    #[test]
    fn ingest_document_carries_namespace_and_attributes() {
        let mut metadata = Metadata::new();
        metadata.insert("content".into(), json!("body"));
        metadata.insert("type".into(), json!("faq"));
        metadata.insert("rank".into(), json!(3));
        metadata.insert("ignored".into(), Value::Null);
        let vector = EmbeddingVector {
            id: "doc-1".into(),
            values: vec![],
            metadata,
        };

        let doc = BedrockKnowledgeBaseProvider::ingest_document(&vector, "user_kb_42").unwrap();
        assert_eq!(doc.pointer("/content/custom/inlineContent/textContent/data"), Some(&json!("body")));
        let attributes = doc
            .pointer("/metadata/inlineAttributes")
            .and_then(Value::as_array)
            .unwrap();
        let keys: Vec<&str> = attributes.iter().filter_map(|a| a["key"].as_str()).collect();
        assert!(keys.contains(&"namespace"));
        assert!(keys.contains(&"type"));
        assert!(keys.contains(&"rank"));
        assert!(!keys.contains(&"content"));
        assert!(!keys.contains(&"ignored"));
    }

    #[test]
    fn filter_combines_clauses() {
        let options = QueryOptions {
            namespace: Some("kb".into()),
            doc_type: Some("faq".into()),
            ..Default::default()
        };
        let filter = BedrockKnowledgeBaseProvider::build_filter(&options).unwrap();
        assert_eq!(filter["andAll"].as_array().map(|a| a.len()), Some(2));

        let only_namespace = QueryOptions {
            namespace: Some("kb".into()),
            ..Default::default()
        };
        let filter = BedrockKnowledgeBaseProvider::build_filter(&only_namespace).unwrap();
        assert_eq!(filter["equals"]["key"], "namespace");
    }
}
