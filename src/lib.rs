// Public modules
pub mod chat;
pub mod client;
pub mod config;
pub mod error;
pub mod observability;
pub mod prompt;
pub mod tokenizer;
pub mod types;

// Re-exports
pub use client::{ChatCompletion, OpenAi};
pub use config::AppConfig;
pub use error::{Error, Result};
pub use observability::register_biometrics;
pub use prompt::{DEFAULT_INPUT_MARKER, PromptLibrary, PromptTemplate, split_by_segments};
pub use tokenizer::{BpeTokenizer, CharTokenizer, Tokenizer};
pub use types::*;
