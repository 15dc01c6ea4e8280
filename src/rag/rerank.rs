//! Relevance reranking of search candidates by an auxiliary chat model.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use regex::Regex;
use serde_json::{json, Value};

use super::types::HydratedDocument;
use crate::core::errors::RagError;
use crate::llm::{ChatMessage, ChatModel, ChatRequest};

/// Characters of each candidate shown to the model.
const PREVIEW_CHARS: usize = 600;

#[async_trait]
pub trait Reranker: Send + Sync {
    /// Reorder `documents` by relevance to `query`.
    ///
    /// Documents the reranker leaves out are dropped. Errors mean "keep the
    /// score order"; the caller decides that. `user` is passed on to the
    /// model for attribution.
    async fn rerank(
        &self,
        query: &str,
        documents: Vec<HydratedDocument>,
        user: Option<&str>,
    ) -> Result<Vec<HydratedDocument>, RagError>;
}

pub struct LlmReranker {
    model: Arc<dyn ChatModel>,
}

impl LlmReranker {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self { model }
    }

    fn build_request(query: &str, documents: &[HydratedDocument], user: Option<&str>) -> ChatRequest {
        let candidates: Vec<Value> = documents
            .iter()
            .map(|doc| {
                json!({
                    "id": doc.id,
                    "content": preview(&doc.content),
                })
            })
            .collect();

        let system = "You rank documents by how well they answer a question. \
                      Reply with a JSON array of document ids, most relevant first. \
                      Omit documents that are irrelevant. Reply with the array only.";
        let prompt = format!(
            "Question: {}\n\nDocuments:\n{}",
            query,
            Value::Array(candidates)
        );

        let mut request = ChatRequest::new(vec![ChatMessage::system(system), ChatMessage::user(prompt)])
            .with_max_tokens(256)
            .with_user(user);
        request.temperature = Some(0.0);
        request
    }
}

#[async_trait]
impl Reranker for LlmReranker {
    async fn rerank(
        &self,
        query: &str,
        documents: Vec<HydratedDocument>,
        user: Option<&str>,
    ) -> Result<Vec<HydratedDocument>, RagError> {
        if documents.len() < 2 {
            return Ok(documents);
        }

        let reply = self
            .model
            .chat(Self::build_request(query, &documents, user))
            .await?;
        let order = parse_id_order(&reply).ok_or_else(|| {
            RagError::Provider(format!("rerank reply is not an id array: {}", preview(&reply)))
        })?;

        let reordered = apply_order(documents, &order);
        if reordered.is_empty() {
            return Err(RagError::Provider(
                "rerank reply named none of the candidates".into(),
            ));
        }
        Ok(reordered)
    }
}

/// Pull the first JSON array out of a model reply.
///
/// Accepts a bare array, one wrapped in prose or a code fence, and ids given
/// as strings or numbers.
pub fn parse_id_order(reply: &str) -> Option<Vec<String>> {
    static ARRAY: OnceLock<Option<Regex>> = OnceLock::new();
    let pattern = ARRAY
        .get_or_init(|| Regex::new(r"(?s)\[.*?\]").ok())
        .as_ref()?;

    let trimmed = reply.trim();
    let candidate = match serde_json::from_str::<Value>(trimmed) {
        Ok(Value::Array(items)) => items,
        // Prose may contain bracketed text before the actual array.
        _ => pattern
            .find_iter(trimmed)
            .find_map(|found| match serde_json::from_str::<Value>(found.as_str()) {
                Ok(Value::Array(items)) => Some(items),
                _ => None,
            })?,
    };

    let ids: Vec<String> = candidate
        .into_iter()
        .filter_map(|item| match item {
            Value::String(s) => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            Value::Object(map) => map.get("id").and_then(|id| match id {
                Value::String(s) => Some(s.trim().to_string()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            }),
            _ => None,
        })
        .filter(|id| !id.is_empty())
        .collect();

    Some(ids)
}

/// Reorder by `order`; unknown and repeated ids are ignored, unnamed
/// documents are dropped.
pub fn apply_order(documents: Vec<HydratedDocument>, order: &[String]) -> Vec<HydratedDocument> {
    let mut by_id: HashMap<String, HydratedDocument> = documents
        .into_iter()
        .map(|doc| (doc.id.clone(), doc))
        .collect();

    order.iter().filter_map(|id| by_id.remove(id)).collect()
}

fn preview(text: &str) -> String {
    if text.chars().count() <= PREVIEW_CHARS {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(PREVIEW_CHARS).collect();
    cut.push('…');
    cut
}
