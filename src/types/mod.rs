// Public modules
pub mod chat_completion;
pub mod chat_message;
pub mod model;
pub mod usage;

// Re-exports
pub use chat_completion::{ChatCompletionRequest, ChatCompletionResponse, Choice, ResponseMessage};
pub use chat_message::{ChatMessage, Role};
pub use model::{DEFAULT_CONTEXT_WINDOW, KnownModel, Model};
pub use usage::Usage;
