pub mod openai;
pub mod provider;
pub mod types;

pub use openai::OpenAiCompatibleModel;
pub use provider::ChatModel;
pub use types::{ChatMessage, ChatRequest};
