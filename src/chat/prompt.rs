use crate::llm::ChatMessage;
use crate::store::{Sender, StoredMessage};

const SYSTEM_PROMPT: &str = "You are a helpful, friendly AI assistant engaged in a conversation.\n\n\
Instructions:\n\
- Be conversational and natural\n\
- Consider the conversation history when responding\n\
- Be helpful and informative\n\
- Keep responses concise but complete\n\
- Maintain context from previous messages";

/// System prompt, then each prior turn in stored order under its own role,
/// then the new user message.
pub fn build_chat_messages(history: &[StoredMessage], user_message: &str) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(ChatMessage::system(SYSTEM_PROMPT));
    messages.extend(history.iter().map(|m| match m.sender {
        Sender::User => ChatMessage::user(m.text.clone()),
        Sender::Assistant => ChatMessage::assistant(m.text.clone()),
    }));
    messages.push(ChatMessage::user(user_message));
    messages
}
