//! EmbeddingProvider trait: the capability contract every retrieval backend
//! implements.

use async_trait::async_trait;
use futures_util::future::try_join_all;
use serde_json::Value;

use super::content::ContentStore;
use super::namespace::DEFAULT_NAMESPACE;
use super::types::{
    EmbeddingVector, HydratedDocument, InsertOptions, MatchQuery, MatchResult, MatchSet,
    Metadata, MutationStatus, QueryOptions, SearchOptions, SearchOutcome,
};
use crate::core::errors::RagError;

/// Abstract interface over remote retrieval backends.
///
/// Implementations should:
/// - reject empty `generate` arguments before any network call
/// - never report a partial `insert` as success
/// - answer `delete` with an error status when deletion is unsupported
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Registry key of the backend (e.g. "vectorize").
    fn name(&self) -> &str;

    /// Namespace used when the caller does not pass one.
    fn default_namespace(&self) -> &str {
        DEFAULT_NAMESPACE
    }

    /// Repository that raw matches are hydrated against.
    fn content_store(&self) -> &dyn ContentStore;

    /// Embed one piece of content.
    async fn generate(
        &self,
        doc_type: &str,
        content: &str,
        id: &str,
        metadata: Metadata,
    ) -> Result<Vec<EmbeddingVector>, RagError>;

    /// Upsert vectors under `options.namespace`.
    async fn insert(
        &self,
        vectors: &[EmbeddingVector],
        options: &InsertOptions,
    ) -> Result<MutationStatus, RagError>;

    /// Best-effort removal by id.
    async fn delete(&self, ids: &[String]) -> Result<MutationStatus, RagError>;

    /// Raw similarity query, no hydration.
    async fn get_matches(
        &self,
        query: MatchQuery<'_>,
        options: &QueryOptions,
    ) -> Result<MatchSet, RagError>;

    /// Query, filter by score, truncate to `top_k` and hydrate.
    ///
    /// The namespace is resolved once and used for both the query and the
    /// hydration step.
    async fn search_similar(
        &self,
        query: &str,
        options: &SearchOptions,
    ) -> Result<SearchOutcome, RagError> {
        let namespace = options
            .namespace
            .clone()
            .unwrap_or_else(|| self.default_namespace().to_string());

        let match_set = self
            .get_matches(MatchQuery::Text(query), &options.query_options(&namespace))
            .await?;

        tracing::debug!(
            "{} returned {} raw matches in namespace '{}'",
            self.name(),
            match_set.count,
            namespace
        );

        hydrate_matches(self.content_store(), match_set.matches, options, &namespace).await
    }
}

pub(crate) fn validate_generate_params(
    doc_type: &str,
    content: &str,
    id: &str,
) -> Result<(), RagError> {
    let missing: Vec<&str> = [("type", doc_type), ("content", content), ("id", id)]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| name)
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(RagError::Params(format!(
            "Missing required parameters: {}",
            missing.join(", ")
        )))
    }
}

/// Score filter, namespace guard, `top_k` truncation, then hydration.
pub async fn hydrate_matches(
    store: &dyn ContentStore,
    mut matches: Vec<MatchResult>,
    options: &SearchOptions,
    namespace: &str,
) -> Result<SearchOutcome, RagError> {
    matches.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut eligible: Vec<MatchResult> = matches
        .into_iter()
        .filter(|m| m.score >= options.score_threshold)
        .filter(|m| match m.metadata.get("namespace").and_then(Value::as_str) {
            Some(ns) if ns != namespace => {
                tracing::warn!(
                    "Dropping match {} from namespace '{}' (expected '{}')",
                    m.id,
                    ns,
                    namespace
                );
                false
            }
            _ => true,
        })
        .collect();
    eligible.truncate(options.top_k);

    if eligible.is_empty() {
        return Ok(SearchOutcome::NoMatches);
    }

    let doc_type = options.doc_type.as_deref();
    let hydrated = try_join_all(
        eligible
            .into_iter()
            .map(|m| hydrate_one(store, m, doc_type)),
    )
    .await?;

    Ok(SearchOutcome::from_documents(
        hydrated.into_iter().flatten().collect(),
    ))
}

async fn hydrate_one(
    store: &dyn ContentStore,
    matched: MatchResult,
    doc_type: Option<&str>,
) -> Result<Option<HydratedDocument>, RagError> {
    let stored = store.get_document_by_id(&matched.id, doc_type).await?;

    let Some(stored) = stored else {
        let inline = inline_document(&matched, doc_type);
        if inline.is_none() {
            tracing::debug!("No content for match {}, skipping", matched.id);
        }
        return Ok(inline);
    };

    // Hydrated metadata wins on key collision.
    let mut metadata = matched.metadata;
    metadata.extend(stored.metadata);

    Ok(Some(HydratedDocument {
        id: stored.id,
        title: stored.title,
        content: stored.content,
        score: matched.score,
        doc_type: stored.doc_type,
        metadata,
    }))
}

/// Backends that keep text next to the vector can hydrate without the store.
fn inline_document(matched: &MatchResult, doc_type: Option<&str>) -> Option<HydratedDocument> {
    let text = |key: &str| matched.metadata.get(key).and_then(Value::as_str);

    let content = text("content").or_else(|| text("text"))?;
    let inline_type = text("type").or(doc_type).unwrap_or("document");
    if doc_type.is_some_and(|wanted| wanted != inline_type) {
        return None;
    }

    Some(HydratedDocument {
        id: matched.id.clone(),
        title: text("title").unwrap_or_default().to_string(),
        content: content.to_string(),
        score: matched.score,
        doc_type: inline_type.to_string(),
        metadata: matched.metadata.clone(),
    })
}
