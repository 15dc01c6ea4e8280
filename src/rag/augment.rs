//! Prompt augmentation pipeline.
//!
//! resolve namespace → search → rerank → truncate → summarize → render.
//! Search failures end the pipeline with an empty fragment; rerank and
//! summarization failures fall back to their unmodified input.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use serde::Serialize;
use tracing::Instrument;
use uuid::Uuid;

use super::namespace::resolve_namespace;
use super::provider::EmbeddingProvider;
use super::rerank::{LlmReranker, Reranker};
use super::summarize::{LlmSummarizer, Summarizer};
use super::types::{HydratedDocument, RagOptions, ReturnMetadata, SearchOptions, SearchOutcome};
use crate::core::config::settings::PipelineDefaults;
use crate::core::errors::RagError;
use crate::llm::ChatModel;

#[derive(Serialize)]
struct RenderedContext<'a> {
    id: &'a str,
    #[serde(rename = "type")]
    doc_type: &'a str,
    title: &'a str,
    score: f32,
    content: &'a str,
}

pub struct Augmenter {
    reranker: Option<Arc<dyn Reranker>>,
    summarizer: Option<Arc<dyn Summarizer>>,
    defaults: PipelineDefaults,
}

impl Augmenter {
    /// Pipeline without auxiliary model: no rerank, no summarization.
    pub fn new(defaults: PipelineDefaults) -> Self {
        Self {
            reranker: None,
            summarizer: None,
            defaults,
        }
    }

    /// Rerank and summarize with the same chat model.
    pub fn with_chat_model(defaults: PipelineDefaults, model: Arc<dyn ChatModel>) -> Self {
        Self::new(defaults)
            .with_reranker(Arc::new(LlmReranker::new(model.clone())))
            .with_summarizer(Arc::new(LlmSummarizer::new(model)))
    }

    pub fn with_reranker(mut self, reranker: Arc<dyn Reranker>) -> Self {
        self.reranker = Some(reranker);
        self
    }

    pub fn with_summarizer(mut self, summarizer: Arc<dyn Summarizer>) -> Self {
        self.summarizer = Some(summarizer);
        self
    }

    /// Short non-empty queries are precise lookups and get a single document.
    pub fn resolve_top_k(&self, query: &str, requested: Option<usize>) -> usize {
        if let Some(top_k) = requested.filter(|k| *k > 0) {
            return top_k;
        }
        let trimmed = query.trim();
        if !trimmed.is_empty() && trimmed.chars().count() < self.defaults.short_query_chars {
            1
        } else {
            3
        }
    }

    pub fn rerank_candidates(&self, top_k: usize, requested: Option<usize>) -> usize {
        requested.filter(|c| *c > 0).unwrap_or_else(|| {
            self.defaults
                .rerank_min_candidates
                .max(top_k.saturating_mul(self.defaults.rerank_multiplier))
        })
    }

    fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.defaults.call_timeout_ms.max(1))
    }

    /// Build a context fragment for `query`. Never fails: any error yields "".
    pub async fn augment_prompt(
        &self,
        provider: &dyn EmbeddingProvider,
        query: &str,
        options: &RagOptions,
        tenant_id: Option<&str>,
    ) -> String {
        let request_id = Uuid::new_v4();
        let span = tracing::info_span!(
            "augment_prompt",
            %request_id,
            provider = provider.name(),
            tenant = tenant_id.unwrap_or("-")
        );

        match self
            .run(provider, query, options, tenant_id)
            .instrument(span.clone())
            .await
        {
            Ok(fragment) => fragment,
            Err(err) => {
                tracing::error!(
                    parent: &span,
                    "Context augmentation failed, continuing without context: {}",
                    err
                );
                String::new()
            }
        }
    }

    async fn run(
        &self,
        provider: &dyn EmbeddingProvider,
        query: &str,
        options: &RagOptions,
        tenant_id: Option<&str>,
    ) -> Result<String, RagError> {
        let namespace = resolve_namespace(tenant_id, options.namespace.as_deref());
        let query = query.trim();
        if query.is_empty() {
            tracing::debug!("Empty query, no context to retrieve");
            return Ok(String::new());
        }

        let top_k = self.resolve_top_k(query, options.top_k);
        let candidates = self.rerank_candidates(top_k, options.rerank_candidates);

        let search = SearchOptions {
            top_k: candidates,
            score_threshold: options
                .score_threshold
                .unwrap_or(self.defaults.score_threshold),
            namespace: Some(namespace.clone()),
            doc_type: options.doc_type.clone(),
            filter: options.filter.clone(),
            return_values: options.return_values,
            return_metadata: options.return_metadata.unwrap_or(ReturnMetadata::All),
        };

        let outcome = self
            .with_timeout("search", provider.search_similar(query, &search))
            .await?;
        let documents = match outcome {
            SearchOutcome::Documents(documents) => documents,
            SearchOutcome::NoMatches => {
                tracing::info!("No matches above {} in namespace '{}'", search.score_threshold, namespace);
                return Ok(String::new());
            }
        };
        tracing::debug!(
            "Search returned {} candidates (top_k {}, candidates {})",
            documents.len(),
            top_k,
            candidates
        );

        let mut documents = self.rerank(query, documents, top_k, tenant_id).await;
        documents.truncate(top_k);

        let summary_threshold = options
            .summary_threshold
            .unwrap_or(self.defaults.summary_threshold);
        let documents = self
            .summarize(query, documents, summary_threshold, tenant_id)
            .await;

        render(query, &documents)
    }

    async fn rerank(
        &self,
        query: &str,
        documents: Vec<HydratedDocument>,
        top_k: usize,
        user: Option<&str>,
    ) -> Vec<HydratedDocument> {
        let Some(reranker) = self.reranker.as_ref() else {
            return documents;
        };
        if documents.len() <= top_k {
            return documents;
        }

        match self
            .with_timeout("rerank", reranker.rerank(query, documents.clone(), user))
            .await
        {
            Ok(reranked) => reranked,
            Err(err) => {
                tracing::warn!("Rerank skipped, keeping score order: {}", err);
                documents
            }
        }
    }

    async fn summarize(
        &self,
        query: &str,
        documents: Vec<HydratedDocument>,
        threshold: usize,
        user: Option<&str>,
    ) -> Vec<HydratedDocument> {
        let Some(summarizer) = self.summarizer.as_ref() else {
            return documents;
        };

        // join_all keeps input order and lets every call finish on its own.
        join_all(documents.into_iter().map(move |mut doc| async move {
            if doc.content.chars().count() <= threshold {
                return doc;
            }
            match self
                .with_timeout("summarize", summarizer.summarize(query, &doc, user))
                .await
            {
                Ok(summary) => doc.content = summary,
                Err(err) => {
                    tracing::warn!("Summary of {} skipped, keeping full content: {}", doc.id, err);
                }
            }
            doc
        }))
        .await
    }

    async fn with_timeout<T>(
        &self,
        stage: &str,
        fut: impl Future<Output = Result<T, RagError>>,
    ) -> Result<T, RagError> {
        let limit = self.call_timeout();
        match tokio::time::timeout(limit, fut).await {
            Ok(result) => result,
            Err(_) => Err(RagError::Timeout(format!(
                "{} exceeded {} ms",
                stage,
                limit.as_millis()
            ))),
        }
    }
}

/// Fenced JSON context array followed by one instruction sentence.
pub fn render(query: &str, documents: &[HydratedDocument]) -> Result<String, RagError> {
    if documents.is_empty() {
        return Ok(String::new());
    }

    let contexts: Vec<RenderedContext<'_>> = documents
        .iter()
        .map(|doc| RenderedContext {
            id: &doc.id,
            doc_type: &doc.doc_type,
            title: &doc.title,
            score: doc.score,
            content: &doc.content,
        })
        .collect();
    let json = serde_json::to_string_pretty(&contexts).map_err(RagError::internal)?;

    Ok(format!(
        "```json\n{}\n```\nAnswer the query \"{}\" using only the contexts above; if they do not contain the answer, say so.",
        json, query
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn augmenter() -> Augmenter {
        Augmenter::new(PipelineDefaults::default())
    }

    #[test]
    fn top_k_defaults_by_query_length() {
        let a = augmenter();
        assert_eq!(a.resolve_top_k("hello", None), 1);
        assert_eq!(a.resolve_top_k("   refund policy   ", None), 1);
        assert_eq!(a.resolve_top_k("how do refunds work for annual plans", None), 3);
        assert_eq!(a.resolve_top_k("   ", None), 3);
        assert_eq!(a.resolve_top_k("hello", Some(5)), 5);
        assert_eq!(a.resolve_top_k("hello", Some(0)), 1);
    }

    #[test]
    fn rerank_candidates_always_exceed_small_top_k() {
        let a = augmenter();
        assert_eq!(a.rerank_candidates(1, None), 10);
        assert_eq!(a.rerank_candidates(3, None), 10);
        assert_eq!(a.rerank_candidates(8, None), 16);
        assert_eq!(a.rerank_candidates(3, Some(4)), 4);
    }

    #[test]
    fn render_is_fenced_json_plus_instruction() {
        let docs = vec![HydratedDocument {
            id: "d1".into(),
            title: "Refunds".into(),
            content: "Refunds take 5 days.".into(),
            score: 0.5,
            doc_type: "faq".into(),
            metadata: Default::default(),
        }];
        let out = render("refund policy", &docs).unwrap();

        assert!(out.starts_with("```json\n["));
        let body = out
            .strip_prefix("```json\n")
            .and_then(|rest| rest.split("\n```\n").next())
            .unwrap();
        let parsed: serde_json::Value = serde_json::from_str(body).unwrap();
        assert_eq!(parsed[0]["id"], "d1");
        assert_eq!(parsed[0]["type"], "faq");
        assert_eq!(parsed[0]["score"], 0.5);
        assert!(parsed[0].get("metadata").is_none());

        let last_line = out.lines().last().unwrap();
        assert!(last_line.contains("refund policy"));
        assert!(last_line.contains("only"));
    }

    #[test]
    fn render_of_nothing_is_empty() {
        assert_eq!(render("q", &[]).unwrap(), "");
    }
}
