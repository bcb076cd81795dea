//! Stateful chatbot: history replay, generation and atomic turn storage.

pub mod locks;
pub mod pipeline;
pub mod prompt;

pub use locks::ConversationLocks;
pub use pipeline::{ChatPipeline, ChatReply, ConversationHistory};
pub use prompt::build_chat_messages;
