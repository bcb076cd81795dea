pub mod stage;

pub use stage::{RequestTrace, Stage};
