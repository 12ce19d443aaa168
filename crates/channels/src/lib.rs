//! Presentation adapters for Roost.
//!
//! Adapters submit turns through the shared `TurnOriginator` port and
//! render streamed output and approval prompts. The reference adapter is
//! the interactive CLI; bot front-ends would slot in beside it.

pub mod cli;

pub use cli::{CliChannel, CliInput, classify_line};
