//! Retrieval-augmented generation: embedding providers and the prompt
//! augmentation pipeline.

pub mod augment;
pub mod bedrock_kb;
pub mod content;
pub mod namespace;
pub mod provider;
pub mod rerank;
pub mod s3_vectors;
pub mod selector;
pub mod sqlite;
pub mod summarize;
pub mod types;
pub mod vectorize;


pub use augment::Augmenter;
pub use content::{ContentStore, MemoryContentStore, StoredDocument};
pub use namespace::{resolve_namespace, DEFAULT_NAMESPACE};
pub use provider::EmbeddingProvider;
pub use selector::{select_provider, TenantContext};
pub use sqlite::SqliteContentStore;
pub use types::{HydratedDocument, RagOptions, SearchOptions, SearchOutcome};
