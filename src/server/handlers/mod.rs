pub mod chatbot;
pub mod classifier;
