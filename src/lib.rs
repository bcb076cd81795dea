pub mod chat;
pub mod classifier;
pub mod core;
pub mod llm;
pub mod pipeline;
pub mod rag;
pub mod server;
pub mod state;
pub mod store;

#[cfg(test)]
pub(crate) mod testing;
