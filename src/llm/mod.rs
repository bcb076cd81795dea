pub mod embedder;
pub mod openai;
pub mod provider;
pub mod retry;
pub mod types;

pub use embedder::Embedder;
pub use openai::OpenAiProvider;
pub use provider::{LlmProvider, ProviderError};
pub use retry::{RetryPolicy, RetryingProvider};
pub use types::{ChatMessage, ChatRequest};
