use async_trait::async_trait;

use super::types::ChatRequest;
use crate::core::errors::RagError;

/// Auxiliary chat model used for reranking and summarization.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// return the model identifier used in logs
    fn name(&self) -> &str;

    /// chat completion (non-streaming)
    async fn chat(&self, request: ChatRequest) -> Result<String, RagError>;
}
