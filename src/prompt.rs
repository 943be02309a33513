//! Prompt templates for aichat.
//!
//! A prompt template is a reusable conversation skeleton stored as one YAML
//! file per template:
//!
//! ```yaml
//! description: "Translate to English"
//! input_marker: "$INPUT"        # optional
//! messages:
//!   - role: system
//!     content: "You are a translator."
//!   - role: user
//!     content: "Translate: $INPUT"
//! temperature: 0.2              # optional, 0 = use the caller default
//! max_tokens: 100               # optional, 0 = use the caller default
//! ```
//!
//! Templates are never mutated after load.  [`PromptTemplate::expand`]
//! builds a fresh message list by substituting the input for every
//! occurrence of the input marker, and [`PromptTemplate::expand_with_split`]
//! first slices oversized input into token-bounded segments so that each
//! request fits the model's context window.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::tokenizer::Tokenizer;
use crate::types::{ChatMessage, DEFAULT_CONTEXT_WINDOW};

/// Placeholder replaced by the caller's input when a template sets none.
pub const DEFAULT_INPUT_MARKER: &str = "$INPUT";

/// File extensions recognized as prompt templates.
pub const TEMPLATE_EXTENSIONS: [&str; 2] = ["yaml", "yml"];

/// Tokens a segment boundary may move left to avoid cutting a character.
const MAX_BOUNDARY_BACKOFF: usize = 3;

/// A reusable, parameterized conversation template.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PromptTemplate {
    /// Free-text label, informational only.
    pub description: String,

    /// Substring replaced by the caller's input.
    pub input_marker: String,

    /// Ordered messages; content may reference the input marker.
    pub messages: Vec<ChatMessage>,

    /// Temperature override; zero means "use the caller default".
    pub temperature: f32,

    /// Max-tokens override; zero means "use the caller default".
    pub max_tokens: u32,
}

// Nulls and omitted keys both mean "unset".
#[derive(Deserialize)]
struct RawPromptTemplate {
    description: Option<String>,
    input_marker: Option<String>,
    messages: Option<Vec<ChatMessage>>,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
}

impl From<RawPromptTemplate> for PromptTemplate {
    fn from(raw: RawPromptTemplate) -> Self {
        let input_marker = raw
            .input_marker
            .filter(|marker| !marker.is_empty())
            .unwrap_or_else(|| DEFAULT_INPUT_MARKER.to_string());
        Self {
            description: raw.description.unwrap_or_default(),
            input_marker,
            messages: raw.messages.unwrap_or_default(),
            temperature: raw.temperature.unwrap_or_default(),
            max_tokens: raw.max_tokens.unwrap_or_default(),
        }
    }
}

impl PromptTemplate {
    /// Create a template from messages, with the default marker and no overrides.
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            description: String::new(),
            input_marker: DEFAULT_INPUT_MARKER.to_string(),
            messages,
            temperature: 0.0,
            max_tokens: 0,
        }
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Set the input marker.  An empty marker restores the default.
    pub fn with_input_marker(mut self, marker: impl Into<String>) -> Self {
        let marker = marker.into();
        self.input_marker = if marker.is_empty() {
            DEFAULT_INPUT_MARKER.to_string()
        } else {
            marker
        };
        self
    }

    /// Set the temperature override.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Set the max-tokens override.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Parse a template from YAML text.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Parse`] if the YAML is malformed or a message role is
    /// not one of `system`, `user` or `assistant`.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let raw: RawPromptTemplate = serde_yaml::from_str(yaml)?;
        Ok(raw.into())
    }

    /// Load a template from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the file cannot be read and [`Error::Parse`]
    /// if it is malformed.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::io(format!("cannot read {}: {e}", path.display()), e))?;
        let raw: RawPromptTemplate = serde_yaml::from_str(&content).map_err(|e| {
            Error::parse(
                e.to_string(),
                Some(path.display().to_string()),
                Some(Box::new(e)),
            )
        })?;
        Ok(raw.into())
    }

    /// Substitute `input` for every occurrence of the input marker.
    ///
    /// Roles, message count and order are preserved; the template itself is
    /// left untouched.
    pub fn expand(&self, input: &str) -> Vec<ChatMessage> {
        self.messages
            .iter()
            .map(|message| {
                let content = if self.input_marker.is_empty() {
                    message.content.clone()
                } else {
                    message.content.replace(&self.input_marker, input)
                };
                ChatMessage::new(message.role, content)
            })
            .collect()
    }

    /// Sum of the token counts of every message's raw content.
    pub fn count_tokens(&self, tokenizer: &dyn Tokenizer) -> Result<usize> {
        let mut count = 0;
        for message in &self.messages {
            count += tokenizer.count(&message.content)?;
        }
        Ok(count)
    }

    /// Tokens left for input once the template and its `max_tokens` are
    /// taken out of `context_window`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Budget`] if nothing is left.
    pub fn allowed_input_tokens(
        &self,
        tokenizer: &dyn Tokenizer,
        context_window: usize,
    ) -> Result<usize> {
        self.allowed_input_tokens_reserving(tokenizer, context_window, self.max_tokens)
    }

    /// Like [`allowed_input_tokens`](Self::allowed_input_tokens) but
    /// reserving `reserved_output` tokens for the reply.
    pub fn allowed_input_tokens_reserving(
        &self,
        tokenizer: &dyn Tokenizer,
        context_window: usize,
        reserved_output: u32,
    ) -> Result<usize> {
        let prompt_tokens = self.count_tokens(tokenizer)?;
        let allowed = context_window as i64 - (prompt_tokens as i64 + i64::from(reserved_output));
        if allowed <= 0 {
            return Err(Error::budget(
                format!(
                    "allowed tokens for input is {allowed}, but it should be greater than 0 \
                     (context window {context_window}, prompt {prompt_tokens}, reserved output {reserved_output})"
                ),
                allowed,
            ));
        }
        Ok(allowed as usize)
    }

    /// Split `input` to fit the default context window and expand the
    /// template once per segment.
    pub fn expand_with_split(
        &self,
        tokenizer: &dyn Tokenizer,
        input: &str,
    ) -> Result<Vec<Vec<ChatMessage>>> {
        self.expand_with_split_reserving(tokenizer, input, DEFAULT_CONTEXT_WINDOW, self.max_tokens)
    }

    /// Split `input` to fit `context_window` with `reserved_output` tokens
    /// kept for the reply, and expand the template once per segment.
    ///
    /// Each returned message list is a standalone request; together they are
    /// not a conversation.
    pub fn expand_with_split_reserving(
        &self,
        tokenizer: &dyn Tokenizer,
        input: &str,
        context_window: usize,
        reserved_output: u32,
    ) -> Result<Vec<Vec<ChatMessage>>> {
        let allowed =
            self.allowed_input_tokens_reserving(tokenizer, context_window, reserved_output)?;
        let segments = split_by_segments(tokenizer, input, allowed)?;
        tracing::debug!(
            allowed_input_tokens = allowed,
            segments = segments.len(),
            "split input into segments"
        );
        Ok(segments
            .iter()
            .map(|segment| self.expand(segment))
            .collect())
    }
}

/// Partition `input` into contiguous segments of at most `token_limit`
/// tokens each, in order.
///
/// Empty input yields no segments.  A cut that would end in the middle of a
/// multi-byte character moves left by up to three tokens.  When no such cut
/// exists, as with a limit smaller than one character's tokens, the segment
/// is decoded lossily; the token partition stays exact either way.
///
/// # Errors
///
/// Returns [`Error::Budget`] if `token_limit` is zero, and a tokenizer error
/// if a segment cannot be decoded.
pub fn split_by_segments(
    tokenizer: &dyn Tokenizer,
    input: &str,
    token_limit: usize,
) -> Result<Vec<String>> {
    if token_limit == 0 {
        return Err(Error::budget("token limit for input segments must be positive", 0));
    }
    let tokens = tokenizer.encode(input)?;
    let mut segments = Vec::new();
    let mut start = 0;
    while start < tokens.len() {
        let end = (start + token_limit).min(tokens.len());
        let (cut, text) = decode_segment(tokenizer, &tokens, start, end)?;
        segments.push(text);
        start = cut;
    }
    Ok(segments)
}

fn decode_segment(
    tokenizer: &dyn Tokenizer,
    tokens: &[u32],
    start: usize,
    end: usize,
) -> Result<(usize, String)> {
    if let Ok(text) = tokenizer.decode(&tokens[start..end]) {
        return Ok((end, text));
    }
    if end < tokens.len() {
        for backoff in 1..=MAX_BOUNDARY_BACKOFF {
            let cut = end - backoff;
            if cut <= start {
                break;
            }
            if let Ok(text) = tokenizer.decode(&tokens[start..cut]) {
                return Ok((cut, text));
            }
        }
    }
    // A character wider than the segment: keep the partition exact.
    tracing::debug!(start, end, "segment boundary splits a character");
    tokenizer
        .decode_lossy(&tokens[start..end])
        .map(|text| (end, text))
}

/// Templates keyed by name.
#[derive(Debug, Clone, Default)]
pub struct PromptLibrary {
    templates: BTreeMap<String, PromptTemplate>,
}

impl PromptLibrary {
    /// Create an empty library.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every template in `dir`.
    ///
    /// Only regular files ending in `.yaml` or `.yml` are considered, and
    /// subdirectories are not descended into.  A template's name is its file
    /// name without the extension.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the directory cannot be listed.  Any template
    /// that fails to load fails the whole call.
    pub fn load_dir<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();
        let entries = std::fs::read_dir(dir).map_err(|e| {
            Error::io(
                format!("cannot list prompt directory {}: {e}", dir.display()),
                e,
            )
        })?;
        let mut library = Self::new();
        for entry in entries {
            let entry = entry.map_err(|e| {
                Error::io(
                    format!("cannot list prompt directory {}: {e}", dir.display()),
                    e,
                )
            })?;
            let path = entry.path();
            if path.is_dir() {
                continue;
            }
            let Some(file_name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            let Some(name) = template_name(&file_name) else {
                continue;
            };
            let template = PromptTemplate::from_file(&path)?;
            tracing::debug!(name, path = %path.display(), "loaded prompt template");
            library.insert(name, template);
        }
        Ok(library)
    }

    /// Add or replace a template.
    pub fn insert(&mut self, name: impl Into<String>, template: PromptTemplate) {
        self.templates.insert(name.into(), template);
    }

    /// Look up a template by name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if no template has that name.
    pub fn get(&self, name: &str) -> Result<&PromptTemplate> {
        self.templates.get(name).ok_or_else(|| {
            Error::not_found(
                format!("prompt {name:?} not found"),
                Some("prompt".to_string()),
                None,
            )
        })
    }

    /// Template names.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.templates.keys().map(String::as_str)
    }

    /// Name and template pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &PromptTemplate)> {
        self.templates
            .iter()
            .map(|(name, template)| (name.as_str(), template))
    }

    /// Number of templates.
    pub fn len(&self) -> usize {
        self.templates.len()
    }

    /// True if the library holds no templates.
    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

fn template_name(file_name: &str) -> Option<&str> {
    TEMPLATE_EXTENSIONS
        .iter()
        .find_map(|ext| file_name.strip_suffix(ext)?.strip_suffix('.'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenizer::{BpeTokenizer, CharTokenizer};
    use crate::types::{KnownModel, Model, Role};
    use std::path::PathBuf;

    fn fixture_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("aichat_prompt_{name}_{}", std::process::id()));
        std::fs::remove_dir_all(&dir).ok();
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn translate_template() -> PromptTemplate {
        PromptTemplate::new(vec![
            ChatMessage::system("You translate text."),
            ChatMessage::user("Translate: $INPUT\nAgain: $INPUT"),
            ChatMessage::assistant("Sure."),
        ])
    }

    #[test]
    fn parse_full_template() {
        let yaml = r#"
description: "Translate"
input_marker: "{{text}}"
messages:
  - role: system
    content: "You translate."
  - role: user
    content: "Translate: {{text}}"
temperature: 0.2
max_tokens: 100
"#;
        let template = PromptTemplate::from_yaml_str(yaml).unwrap();
        assert_eq!(template.description, "Translate");
        assert_eq!(template.input_marker, "{{text}}");
        assert_eq!(template.messages.len(), 2);
        assert_eq!(template.messages[0].role, Role::System);
        assert_eq!(template.temperature, 0.2);
        assert_eq!(template.max_tokens, 100);
    }

    #[test]
    fn parse_applies_defaults() {
        let yaml = r#"
description: "Minimal"
input_marker:
messages:
  - role: user
    content: "$INPUT"
"#;
        let template = PromptTemplate::from_yaml_str(yaml).unwrap();
        assert_eq!(template.input_marker, DEFAULT_INPUT_MARKER);
        assert_eq!(template.temperature, 0.0);
        assert_eq!(template.max_tokens, 0);

        let template = PromptTemplate::from_yaml_str("input_marker: \"\"\n").unwrap();
        assert_eq!(template.input_marker, DEFAULT_INPUT_MARKER);
        assert!(template.messages.is_empty());
    }

    #[test]
    fn parse_rejects_malformed_templates() {
        assert!(PromptTemplate::from_yaml_str("messages: [").unwrap_err().is_parse());
        let bad_role = "messages:\n  - role: robot\n    content: hi\n";
        assert!(PromptTemplate::from_yaml_str(bad_role).unwrap_err().is_parse());
        let bad_tokens = "max_tokens: -5\n";
        assert!(PromptTemplate::from_yaml_str(bad_tokens).unwrap_err().is_parse());
    }

    #[test]
    fn expand_replaces_every_occurrence() {
        let template = translate_template();
        let messages = template.expand("bonjour");
        assert_eq!(messages[1].content, "Translate: bonjour\nAgain: bonjour");
    }

    #[test]
    fn expand_preserves_roles_order_and_unmarked_content() {
        let template = translate_template();
        let messages = template.expand("hola");
        let roles: Vec<Role> = messages.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::System, Role::User, Role::Assistant]);
        assert_eq!(messages[0].content, "You translate text.");
        assert_eq!(messages[2].content, "Sure.");
        // The template is reusable.
        assert_eq!(template, translate_template());
        assert_eq!(template.expand("ciao")[1].content, "Translate: ciao\nAgain: ciao");
    }

    #[test]
    fn expand_with_custom_marker() {
        let template = PromptTemplate::new(vec![ChatMessage::user("Summarize <<doc>> and $INPUT")])
            .with_input_marker("<<doc>>");
        let messages = template.expand("the report");
        assert_eq!(messages[0].content, "Summarize the report and $INPUT");
    }

    #[test]
    fn count_tokens_uses_raw_content() {
        let template = PromptTemplate::new(vec![
            ChatMessage::system("abc"),
            ChatMessage::user("$INPUT"),
        ]);
        assert_eq!(template.count_tokens(&CharTokenizer).unwrap(), 9);
    }

    #[test]
    fn allowed_input_tokens_budget() {
        let template = PromptTemplate::new(vec![ChatMessage::user("0123456789")]).with_max_tokens(40);
        assert_eq!(template.allowed_input_tokens(&CharTokenizer, 100).unwrap(), 50);
        assert_eq!(template.allowed_input_tokens(&CharTokenizer, 51).unwrap(), 1);

        let err = template.allowed_input_tokens(&CharTokenizer, 50).unwrap_err();
        assert!(err.is_budget());
        let err = template.allowed_input_tokens(&CharTokenizer, 20).unwrap_err();
        match err {
            Error::Budget { allowed, .. } => assert_eq!(allowed, -30),
            other => panic!("expected budget error, got {other:?}"),
        }
    }

    #[test]
    fn allowed_input_tokens_default_window() {
        let template = PromptTemplate::new(vec![ChatMessage::user("$INPUT")]).with_max_tokens(96);
        assert_eq!(
            template
                .allowed_input_tokens(&CharTokenizer, DEFAULT_CONTEXT_WINDOW)
                .unwrap(),
            4096 - 6 - 96
        );
    }

    #[test]
    fn split_respects_limit_and_round_trips() {
        let input = "the quick brown fox jumps over the lazy dog";
        for limit in [1, 2, 5, 7, 43, 100] {
            let segments = split_by_segments(&CharTokenizer, input, limit).unwrap();
            assert!(segments.iter().all(|s| !s.is_empty()));
            assert!(segments.iter().all(|s| s.chars().count() <= limit));
            assert_eq!(segments.concat(), input);
            assert_eq!(segments.len(), input.chars().count().div_ceil(limit));
        }
    }

    #[test]
    fn split_empty_input_yields_nothing() {
        assert!(split_by_segments(&CharTokenizer, "", 10).unwrap().is_empty());
        assert!(split_by_segments(&CharTokenizer, "", 1).unwrap().is_empty());
    }

    #[test]
    fn split_rejects_zero_limit() {
        assert!(split_by_segments(&CharTokenizer, "abc", 0).unwrap_err().is_budget());
    }

    #[test]
    fn split_bpe_keeps_token_partition() {
        let tokenizer = BpeTokenizer::for_model(&Model::Known(KnownModel::Gpt35Turbo)).unwrap();
        let input = "Rust is a multi-paradigm, general-purpose programming language. ".repeat(20);
        let original = tokenizer.encode(&input).unwrap();
        let segments = split_by_segments(&tokenizer, &input, 16).unwrap();
        assert_eq!(segments.len(), original.len().div_ceil(16));
        assert!(segments.iter().all(|s| !s.is_empty()));
        assert_eq!(segments.concat(), input);
    }

    #[test]
    fn split_bpe_never_cuts_characters() {
        let tokenizer = BpeTokenizer::for_model(&Model::Known(KnownModel::Gpt35Turbo)).unwrap();
        let input = "café 🙂 テ ü ñ 語 ".repeat(12);
        let segments = split_by_segments(&tokenizer, &input, 5).unwrap();
        assert!(segments.len() > 1);
        assert!(segments.iter().all(|s| !s.is_empty()));
        assert_eq!(segments.concat(), input);
    }

    #[test]
    fn split_bpe_limit_smaller_than_a_character() {
        let tokenizer = BpeTokenizer::for_model(&Model::Known(KnownModel::Gpt35Turbo)).unwrap();
        let input = "🙂🙂🙂";
        let tokens = tokenizer.encode(input).unwrap();
        let segments = split_by_segments(&tokenizer, input, 1).unwrap();
        assert_eq!(segments.len(), tokens.len());
        assert!(segments.iter().all(|s| !s.is_empty()));

        let input = "𝔘𝔫𝔦𝔠𝔬𝔡𝔢 text";
        let tokens = tokenizer.encode(input).unwrap();
        let segments = split_by_segments(&tokenizer, input, 2).unwrap();
        assert!(!segments.is_empty());
        assert!(segments.len() <= tokens.len());
        assert!(segments.len() >= tokens.len().div_ceil(2));
        assert!(segments.iter().all(|s| !s.is_empty()));
        assert!(segments.last().unwrap().ends_with("text"));
    }

    #[test]
    fn expand_with_split_produces_one_request_per_segment() {
        let template = PromptTemplate::new(vec![
            ChatMessage::system("sys"),
            ChatMessage::user("<$INPUT>"),
        ])
        .with_max_tokens(4);
        // window 20 - (3 + 8) prompt - 4 reserved = 5 input tokens per segment
        let batches = template
            .expand_with_split_reserving(&CharTokenizer, "abcdefghijkl", 20, 4)
            .unwrap();
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[0][1].content, "<abcde>");
        assert_eq!(batches[1][1].content, "<fghij>");
        assert_eq!(batches[2][1].content, "<kl>");
        assert!(batches.iter().all(|b| b[0] == ChatMessage::system("sys")));
    }

    #[test]
    fn expand_with_split_fails_without_budget() {
        let template = PromptTemplate::new(vec![ChatMessage::user("$INPUT")]).with_max_tokens(5000);
        let err = template.expand_with_split(&CharTokenizer, "hi").unwrap_err();
        assert!(err.is_budget());
    }

    #[test]
    fn load_dir_reads_yaml_and_yml() {
        let dir = fixture_dir("load_dir");
        std::fs::write(dir.join("a.yaml"), "description: Alpha\nmessages: []\n").unwrap();
        std::fs::write(dir.join("b.yml"), "description: Beta\n").unwrap();
        std::fs::write(dir.join("notes.txt"), "not: [a template").unwrap();
        std::fs::create_dir_all(dir.join("nested.yaml")).unwrap();
        std::fs::write(dir.join("nested.yaml").join("c.yaml"), "description: Gamma\n").unwrap();

        let library = PromptLibrary::load_dir(&dir).unwrap();
        assert_eq!(library.len(), 2);
        assert_eq!(library.get("a").unwrap().description, "Alpha");
        assert_eq!(library.get("b").unwrap().description, "Beta");
        assert!(library.get("c").unwrap_err().is_not_found());
        assert!(library.get("notes").unwrap_err().is_not_found());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn load_dir_fails_on_any_malformed_file() {
        let dir = fixture_dir("malformed");
        std::fs::write(dir.join("good.yaml"), "description: Good\n").unwrap();
        std::fs::write(dir.join("bad.yaml"), "messages: [\n").unwrap();

        let err = PromptLibrary::load_dir(&dir).unwrap_err();
        assert!(err.is_parse());
        assert!(err.to_string().contains("bad.yaml"));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn load_dir_missing_directory_is_io_error() {
        let dir = std::env::temp_dir().join("aichat_prompt_does_not_exist_6f1c");
        assert!(PromptLibrary::load_dir(&dir).unwrap_err().is_io());
    }

    #[test]
    fn template_names_strip_extension() {
        assert_eq!(template_name("translate.yaml"), Some("translate"));
        assert_eq!(template_name("summary.yml"), Some("summary"));
        assert_eq!(template_name("archive.tar.yaml"), Some("archive.tar"));
        assert_eq!(template_name("readme.md"), None);
        assert_eq!(template_name("yaml"), None);
    }
}
