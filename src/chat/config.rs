//! Configuration types for the chat application.
//!
//! This module parses the command line with `getopts` and resolves the
//! process-wide defaults every request starts from.

use std::ffi::OsStr;
use std::time::Duration;

use getopts::{Matches, Options};

use crate::error::{Error, Result};
use crate::prompt::PromptTemplate;
use crate::types::Model;

/// Default sampling temperature.
pub const DEFAULT_TEMPERATURE: f32 = 0.5;

/// Default maximum tokens per response.
pub const DEFAULT_MAX_TOKENS: u32 = 500;

/// Default per-request timeout, in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Command-line arguments for the aichat tool.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatArgs {
    /// Sampling temperature (`-t`, `--temperature`).
    pub temperature: f32,

    /// Max tokens per response (`-m`, `--max-tokens`).
    pub max_tokens: u32,

    /// Log resolved options and expanded messages (`-v`, `--verbose`).
    pub verbose: bool,

    /// List template names and descriptions, then exit (`-l`, `--list-prompts`).
    pub list_prompts: bool,

    /// Model identifier (`--model`).
    pub model: Option<String>,

    /// Context window override (`--context-window`).
    pub context_window: Option<usize>,

    /// Per-request timeout in seconds (`--timeout`).
    pub timeout_secs: u64,

    /// Retries for retryable service failures (`--max-retries`).
    pub max_retries: u32,

    /// Completion service base URL (`--base-url`).
    pub base_url: Option<String>,

    /// Send templated input as one request without splitting (`--no-split`).
    pub no_split: bool,

    /// Print usage and exit (`-h`, `--help`).
    pub help: bool,

    /// Template to run; absent means interactive mode.
    pub template: Option<String>,
}

impl Default for ChatArgs {
    fn default() -> Self {
        Self {
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
            verbose: false,
            list_prompts: false,
            model: None,
            context_window: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            max_retries: 0,
            base_url: None,
            no_split: false,
            help: false,
            template: None,
        }
    }
}

fn options() -> Options {
    let mut opts = Options::new();
    opts.optopt("t", "temperature", "sampling temperature (default: 0.5)", "FLOAT");
    opts.optopt("m", "max-tokens", "max tokens per response (default: 500)", "INT");
    opts.optflag("v", "verbose", "log resolved options and expanded messages");
    opts.optflag("l", "list-prompts", "list prompt templates and exit");
    opts.optopt("", "model", "model to use (default: gpt-3.5-turbo)", "MODEL");
    opts.optopt("", "context-window", "context window in tokens (default: the model's)", "INT");
    opts.optopt("", "timeout", "per-request timeout in seconds (default: 60)", "SECS");
    opts.optopt("", "max-retries", "retries for transient service failures (default: 0)", "INT");
    opts.optopt("", "base-url", "completion service base URL", "URL");
    opts.optflag("", "no-split", "never split oversized templated input");
    opts.optflag("h", "help", "print this help and exit");
    opts
}

/// Usage text for `program`.
pub fn usage(program: &str) -> String {
    let brief = format!("Usage: {program} [OPTIONS] [TEMPLATE]");
    options().usage(&brief)
}

fn parse_value<T: std::str::FromStr>(matches: &Matches, name: &str) -> Result<Option<T>> {
    match matches.opt_str(name) {
        Some(value) => value.trim().parse::<T>().map(Some).map_err(|_| {
            Error::validation(
                format!("invalid value {value:?} for --{name}"),
                Some(name.to_string()),
            )
        }),
        None => Ok(None),
    }
}

impl ChatArgs {
    /// Parse command-line arguments, excluding the program name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] for unknown flags, malformed values or
    /// more than one positional argument.
    pub fn parse<I, S>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let matches = options()
            .parse(args)
            .map_err(|e| Error::validation(e.to_string(), None))?;

        let defaults = Self::default();
        let temperature = parse_value::<f32>(&matches, "temperature")?
            .unwrap_or(defaults.temperature);
        if !temperature.is_finite() || temperature < 0.0 {
            return Err(Error::validation(
                format!("temperature must be a non-negative number, got {temperature}"),
                Some("temperature".to_string()),
            ));
        }
        let context_window = parse_value::<usize>(&matches, "context-window")?;
        if context_window == Some(0) {
            return Err(Error::validation(
                "context window must be positive",
                Some("context-window".to_string()),
            ));
        }
        let timeout_secs =
            parse_value::<u64>(&matches, "timeout")?.unwrap_or(defaults.timeout_secs);
        if timeout_secs == 0 {
            return Err(Error::validation(
                "timeout must be at least one second",
                Some("timeout".to_string()),
            ));
        }
        let model = matches.opt_str("model").filter(|m| !m.trim().is_empty());

        if matches.free.len() > 1 {
            return Err(Error::validation(
                format!("expected at most one template name, got {:?}", matches.free),
                None,
            ));
        }

        Ok(Self {
            temperature,
            max_tokens: parse_value::<u32>(&matches, "max-tokens")?
                .unwrap_or(defaults.max_tokens),
            verbose: matches.opt_present("verbose"),
            list_prompts: matches.opt_present("list-prompts"),
            model,
            context_window,
            timeout_secs,
            max_retries: parse_value::<u32>(&matches, "max-retries")?
                .unwrap_or(defaults.max_retries),
            base_url: matches.opt_str("base-url"),
            no_split: matches.opt_present("no-split"),
            help: matches.opt_present("help"),
            template: matches.free.into_iter().next(),
        })
    }
}

/// Process-wide generation defaults.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChatOptions {
    /// Sampling temperature.
    pub temperature: f32,
    /// Maximum tokens per response.
    pub max_tokens: u32,
}

impl Default for ChatOptions {
    fn default() -> Self {
        Self {
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }
}

impl ChatOptions {
    /// The options for one templated call: each non-zero template override
    /// wins over the process default.
    pub fn resolve(&self, template: &PromptTemplate) -> ChatOptions {
        ChatOptions {
            temperature: if template.temperature != 0.0 {
                template.temperature
            } else {
                self.temperature
            },
            max_tokens: if template.max_tokens != 0 {
                template.max_tokens
            } else {
                self.max_tokens
            },
        }
    }
}

/// Resolved configuration for a chat run.
#[derive(Debug, Clone)]
pub struct ChatConfig {
    /// The model to use for generating responses.
    pub model: Model,

    /// Process-wide generation defaults.
    pub options: ChatOptions,

    /// Token budget shared by prompt and reply.
    pub context_window: usize,

    /// Per-request timeout.
    pub timeout: Duration,

    /// Retries for retryable service failures.
    pub max_retries: u32,

    /// Completion service base URL, if not the default.
    pub base_url: Option<String>,

    /// Whether templated input is split to fit the context window.
    pub split: bool,
}

impl ChatConfig {
    /// Creates a new ChatConfig with default values.
    pub fn new() -> Self {
        let model = Model::default();
        Self {
            context_window: model.context_window(),
            model,
            options: ChatOptions::default(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            max_retries: 0,
            base_url: None,
            split: true,
        }
    }

    /// Sets the model; the context window follows it.
    pub fn with_model(mut self, model: Model) -> Self {
        self.context_window = model.context_window();
        self.model = model;
        self
    }

    /// Sets the generation defaults.
    pub fn with_options(mut self, options: ChatOptions) -> Self {
        self.options = options;
        self
    }

    /// Sets the context window.
    pub fn with_context_window(mut self, context_window: usize) -> Self {
        self.context_window = context_window;
        self
    }

    /// Enables or disables input splitting.
    pub fn with_split(mut self, split: bool) -> Self {
        self.split = split;
        self
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&ChatArgs> for ChatConfig {
    fn from(args: &ChatArgs) -> Self {
        let model = args
            .model
            .as_deref()
            .map(Model::from)
            .unwrap_or_default();
        let context_window = args.context_window.unwrap_or(model.context_window());
        ChatConfig {
            model,
            options: ChatOptions {
                temperature: args.temperature,
                max_tokens: args.max_tokens,
            },
            context_window,
            timeout: Duration::from_secs(args.timeout_secs),
            max_retries: args.max_retries,
            base_url: args.base_url.clone(),
            split: !args.no_split,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ChatMessage, KnownModel};

    #[test]
    fn parse_defaults() {
        let args = ChatArgs::parse(Vec::<String>::new()).unwrap();
        assert_eq!(args, ChatArgs::default());
        assert_eq!(args.temperature, 0.5);
        assert_eq!(args.max_tokens, 500);
        assert!(args.template.is_none());
    }

    #[test]
    fn parse_short_and_long_flags() {
        let args = ChatArgs::parse(["-t", "0.9", "-m", "100", "-v", "translate"]).unwrap();
        assert_eq!(args.temperature, 0.9);
        assert_eq!(args.max_tokens, 100);
        assert!(args.verbose);
        assert_eq!(args.template.as_deref(), Some("translate"));

        let args = ChatArgs::parse([
            "--temperature=0.1",
            "--max-tokens",
            "42",
            "--list-prompts",
            "--model",
            "gpt-4",
            "--context-window",
            "2048",
            "--timeout",
            "5",
            "--max-retries",
            "2",
            "--no-split",
        ])
        .unwrap();
        assert_eq!(args.temperature, 0.1);
        assert_eq!(args.max_tokens, 42);
        assert!(args.list_prompts);
        assert_eq!(args.model.as_deref(), Some("gpt-4"));
        assert_eq!(args.context_window, Some(2048));
        assert_eq!(args.timeout_secs, 5);
        assert_eq!(args.max_retries, 2);
        assert!(args.no_split);
    }

    #[test]
    fn parse_rejects_bad_input() {
        for bad in [
            vec!["-t", "warm"],
            vec!["-m", "-5"],
            vec!["--timeout", "0"],
            vec!["--context-window", "0"],
            vec!["--bogus"],
            vec!["one", "two"],
        ] {
            let err = ChatArgs::parse(bad.clone()).unwrap_err();
            assert!(
                matches!(err, Error::Validation { .. }),
                "{bad:?} gave {err:?}"
            );
        }
    }

    #[test]
    fn usage_mentions_flags() {
        let text = usage("aichat");
        assert!(text.starts_with("Usage: aichat [OPTIONS] [TEMPLATE]"));
        for flag in ["--temperature", "--max-tokens", "--verbose", "--list-prompts"] {
            assert!(text.contains(flag), "missing {flag}");
        }
    }

    #[test]
    fn options_resolve_first_non_zero() {
        let defaults = ChatOptions::default();
        let template = PromptTemplate::new(vec![ChatMessage::user("$INPUT")]);
        assert_eq!(defaults.resolve(&template), defaults);

        let template = template.with_max_tokens(100);
        let resolved = defaults.resolve(&template);
        assert_eq!(resolved.max_tokens, 100);
        assert_eq!(resolved.temperature, 0.5);

        let template = template.with_temperature(0.2);
        assert_eq!(defaults.resolve(&template).temperature, 0.2);
    }

    #[test]
    fn config_from_args() {
        let config = ChatConfig::from(&ChatArgs::default());
        assert_eq!(config.model, Model::Known(KnownModel::Gpt35Turbo));
        assert_eq!(config.context_window, 4096);
        assert_eq!(config.options, ChatOptions::default());
        assert_eq!(config.timeout, Duration::from_secs(60));
        assert!(config.split);

        let args = ChatArgs {
            model: Some("gpt-4".to_string()),
            no_split: true,
            ..ChatArgs::default()
        };
        let config = ChatConfig::from(&args);
        assert_eq!(config.model, Model::Known(KnownModel::Gpt4));
        assert_eq!(config.context_window, 8192);
        assert!(!config.split);

        let args = ChatArgs {
            model: Some("local-llama".to_string()),
            context_window: Some(2048),
            ..ChatArgs::default()
        };
        let config = ChatConfig::from(&args);
        assert_eq!(config.model, Model::Custom("local-llama".to_string()));
        assert_eq!(config.context_window, 2048);
    }

    #[test]
    fn config_builder_pattern() {
        let config = ChatConfig::new()
            .with_model(Model::Known(KnownModel::Gpt4o))
            .with_options(ChatOptions {
                temperature: 0.0,
                max_tokens: 64,
            })
            .with_split(false);
        assert_eq!(config.context_window, 128_000);
        assert_eq!(config.options.max_tokens, 64);
        assert!(!config.split);
        assert_eq!(config.with_context_window(100).context_window, 100);
    }
}
