//! Retrieval-augmented prompt assembly over pluggable vector backends.

pub mod aws;
pub mod core;
pub mod llm;
pub mod logging;
pub mod rag;

pub use crate::core::errors::RagError;
