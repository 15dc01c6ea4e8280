use std::sync::Arc;

use async_trait::async_trait;

use super::types::HydratedDocument;
use crate::core::errors::RagError;
use crate::llm::{ChatMessage, ChatModel, ChatRequest};

pub const SUMMARY_MAX_WORDS: usize = 100;

#[async_trait]
pub trait Summarizer: Send + Sync {
    /// Compress one document's content. Errors leave the content untouched.
    async fn summarize(
        &self,
        query: &str,
        document: &HydratedDocument,
        user: Option<&str>,
    ) -> Result<String, RagError>;
}

pub struct LlmSummarizer {
    model: Arc<dyn ChatModel>,
    max_words: usize,
}

impl LlmSummarizer {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self {
            model,
            max_words: SUMMARY_MAX_WORDS,
        }
    }
}

#[async_trait]
impl Summarizer for LlmSummarizer {
    async fn summarize(
        &self,
        query: &str,
        document: &HydratedDocument,
        user: Option<&str>,
    ) -> Result<String, RagError> {
        let system = format!(
            "Summarize the document in at most {} words. Keep facts, numbers and names \
             that help answer the question. Reply with the summary only.",
            self.max_words
        );
        let prompt = format!(
            "Question: {}\n\nTitle: {}\n\nDocument:\n{}",
            query, document.title, document.content
        );

        let request = ChatRequest::new(vec![ChatMessage::system(system), ChatMessage::user(prompt)])
            .with_max_tokens((self.max_words * 2) as i32)
            .with_user(user);
        let reply = self.model.chat(request).await?;

        let summary = limit_words(reply.trim(), self.max_words);
        if summary.is_empty() {
            return Err(RagError::Provider(format!(
                "empty summary for document {}",
                document.id
            )));
        }
        Ok(summary)
    }
}

/// Keep the first `max_words` whitespace-separated words.
pub fn limit_words(text: &str, max_words: usize) -> String {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.len() <= max_words {
        return text.to_string();
    }
    words[..max_words].join(" ")
}
