//! Model backend implementations for localcoder.
//!
//! All providers implement the `localcoder_core::Provider` trait. The engine
//! only sees that trait; which backend sits behind it is configuration.

pub mod ollama;

pub use ollama::{OllamaProvider, model_available};
