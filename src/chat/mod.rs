//! Chat session driver.
//!
//! Two mutually exclusive modes share one configuration:
//!
//! - interactive mode ([`ChatSession`]) reads one line at a time and sends
//!   the whole growing conversation with every request;
//! - templated mode ([`run_template`]) expands a named prompt template over
//!   all of standard input, splitting it into segments when it does not fit
//!   the context window.
//!
//! # Architecture
//!
//! - [`config`]: CLI argument parsing and configuration
//! - [`session`]: interactive conversation state and input sources
//! - [`template`]: templated requests and template listing

mod config;
mod session;
mod template;

pub use config::{
    ChatArgs, ChatConfig, ChatOptions, DEFAULT_MAX_TOKENS, DEFAULT_TEMPERATURE,
    DEFAULT_TIMEOUT_SECS, usage,
};
pub use session::{ChatSession, EditorLines, LineSource, ReaderLines, USER_PROMPT};
pub use template::{list_prompts, plan_requests, run_template};
