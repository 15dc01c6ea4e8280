use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::errors::RagError;

pub type Metadata = Map<String, Value>;

/// Default number of documents `search_similar` keeps.
pub const DEFAULT_TOP_K: usize = 3;

/// Output of `generate`, input of `insert`.
///
/// `values` is empty for backends that embed server side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingVector {
    pub id: String,
    pub values: Vec<f32>,
    pub metadata: Metadata,
}

/// A raw similarity hit. Scores are only comparable within one provider call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub id: String,
    pub score: f32,
    #[serde(default)]
    pub metadata: Metadata,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MatchSet {
    pub matches: Vec<MatchResult>,
    pub count: usize,
}

impl MatchSet {
    pub fn new(matches: Vec<MatchResult>) -> Self {
        let count = matches.len();
        Self { matches, count }
    }
}

/// A match joined against the content store; the unit the pipeline ranks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HydratedDocument {
    pub id: String,
    pub title: String,
    pub content: String,
    pub score: f32,
    #[serde(rename = "type")]
    pub doc_type: String,
    pub metadata: Metadata,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReturnMetadata {
    #[default]
    None,
    Indexed,
    All,
}

impl ReturnMetadata {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReturnMetadata::None => "none",
            ReturnMetadata::Indexed => "indexed",
            ReturnMetadata::All => "all",
        }
    }
}

/// Query-time configuration accepted by the augmentation pipeline.
///
/// Unset fields fall back to the pipeline defaults (see `augment`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RagOptions {
    pub top_k: Option<usize>,
    pub score_threshold: Option<f32>,
    pub rerank_candidates: Option<usize>,
    pub namespace: Option<String>,
    #[serde(rename = "type")]
    pub doc_type: Option<String>,
    pub filter: Option<Value>,
    pub summary_threshold: Option<usize>,
    pub return_values: bool,
    pub return_metadata: Option<ReturnMetadata>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct InsertOptions {
    pub namespace: Option<String>,
}

/// Options for a raw `get_matches` query.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryOptions {
    pub top_k: usize,
    pub namespace: Option<String>,
    pub doc_type: Option<String>,
    pub filter: Option<Value>,
    pub return_values: bool,
    pub return_metadata: ReturnMetadata,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            namespace: None,
            doc_type: None,
            filter: None,
            return_values: false,
            return_metadata: ReturnMetadata::None,
        }
    }
}

/// Options for `search_similar`.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchOptions {
    pub top_k: usize,
    pub score_threshold: f32,
    pub namespace: Option<String>,
    pub doc_type: Option<String>,
    pub filter: Option<Value>,
    pub return_values: bool,
    pub return_metadata: ReturnMetadata,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            score_threshold: 0.0,
            namespace: None,
            doc_type: None,
            filter: None,
            return_values: false,
            return_metadata: ReturnMetadata::All,
        }
    }
}

impl SearchOptions {
    pub fn query_options(&self, namespace: &str) -> QueryOptions {
        QueryOptions {
            top_k: self.top_k,
            namespace: Some(namespace.to_string()),
            doc_type: self.doc_type.clone(),
            filter: self.filter.clone(),
            return_values: self.return_values,
            return_metadata: self.return_metadata,
        }
    }
}

/// Query input for `get_matches`: backends that embed server side take text.
#[derive(Debug, Clone, Copy)]
pub enum MatchQuery<'a> {
    Vector(&'a [f32]),
    Text(&'a str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Success,
    Error,
}

/// `{status, error}` result of `insert` / `delete`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MutationStatus {
    pub status: Status,
    pub error: Option<String>,
}

impl MutationStatus {
    pub fn success() -> Self {
        Self {
            status: Status::Success,
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: Status::Error,
            error: Some(message.into()),
        }
    }

    pub fn not_implemented() -> Self {
        Self::error("Not implemented")
    }

    pub fn is_success(&self) -> bool {
        self.status == Status::Success
    }
}

/// Result of `search_similar`. No surviving match is a routine outcome.
#[derive(Debug, Clone, PartialEq)]
pub enum SearchOutcome {
    Documents(Vec<HydratedDocument>),
    NoMatches,
}

impl SearchOutcome {
    pub fn from_documents(documents: Vec<HydratedDocument>) -> Self {
        if documents.is_empty() {
            SearchOutcome::NoMatches
        } else {
            SearchOutcome::Documents(documents)
        }
    }

    /// Error form for callers that treat an empty search as `NotFound`.
    pub fn into_documents(self) -> Result<Vec<HydratedDocument>, RagError> {
        match self {
            SearchOutcome::Documents(docs) => Ok(docs),
            SearchOutcome::NoMatches => Err(RagError::NotFound(
                "No matches survived filtering".to_string(),
            )),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            SearchOutcome::Documents(docs) => docs.len(),
            SearchOutcome::NoMatches => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn rag_options_deserialize_camel_case() {
        let options: RagOptions = serde_json::from_value(json!({
            "topK": 2,
            "scoreThreshold": 0.5,
            "type": "faq",
            "returnMetadata": "indexed"
        }))
        .expect("options");

        assert_eq!(options.top_k, Some(2));
        assert_eq!(options.doc_type.as_deref(), Some("faq"));
        assert_eq!(options.return_metadata, Some(ReturnMetadata::Indexed));
        assert!(options.rerank_candidates.is_none());
    }

    #[test]
    fn mutation_status_serializes_status_and_error() {
        let value = serde_json::to_value(MutationStatus::not_implemented()).unwrap();
        assert_eq!(value, json!({ "status": "error", "error": "Not implemented" }));
        assert!(MutationStatus::success().is_success());
    }

    #[test]
    fn empty_outcome_maps_to_not_found() {
        let outcome = SearchOutcome::from_documents(vec![]);
        assert_eq!(outcome, SearchOutcome::NoMatches);
        assert!(matches!(outcome.into_documents(), Err(RagError::NotFound(_))));
    }

    #[test]
    fn hydrated_document_serializes_type_field() {
        let doc = HydratedDocument {
            id: "d1".into(),
            title: "T".into(),
            content: "C".into(),
            score: 0.5,
            doc_type: "note".into(),
            metadata: Metadata::new(),
        };
        let value = serde_json::to_value(&doc).unwrap();
        assert_eq!(value["type"], "note");
    }
}
