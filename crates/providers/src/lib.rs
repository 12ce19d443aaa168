//! Model inference providers for Roost.
//!
//! Roost is local-first: the reference provider speaks the Ollama chat API
//! over localhost. Anything implementing `roost_core::Provider` can be
//! swapped in — the agent core never sees past the trait.

pub mod ollama;

pub use ollama::OllamaProvider;
