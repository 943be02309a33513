use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Context window assumed for models whose window is not known.
pub const DEFAULT_CONTEXT_WINDOW: usize = 4096;

/// Represents a chat completion model identifier.
///
/// This can be a predefined model or a custom string value for models that
/// the client does not know about.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Model {
    /// Known model versions
    Known(KnownModel),

    /// Custom model identifier (for future models or private deployments)
    Custom(String),
}

/// Known chat completion models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KnownModel {
    /// GPT-3.5 Turbo
    #[serde(rename = "gpt-3.5-turbo")]
    Gpt35Turbo,

    /// GPT-3.5 Turbo with the 16k context window
    #[serde(rename = "gpt-3.5-turbo-16k")]
    Gpt35Turbo16k,

    /// GPT-4
    #[serde(rename = "gpt-4")]
    Gpt4,

    /// GPT-4 with the 32k context window
    #[serde(rename = "gpt-4-32k")]
    Gpt432k,

    /// GPT-4o
    #[serde(rename = "gpt-4o")]
    Gpt4o,

    /// GPT-4o mini
    #[serde(rename = "gpt-4o-mini")]
    Gpt4oMini,
}

impl KnownModel {
    const ALL: [KnownModel; 6] = [
        KnownModel::Gpt35Turbo,
        KnownModel::Gpt35Turbo16k,
        KnownModel::Gpt4,
        KnownModel::Gpt432k,
        KnownModel::Gpt4o,
        KnownModel::Gpt4oMini,
    ];

    /// The identifier sent on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            KnownModel::Gpt35Turbo => "gpt-3.5-turbo",
            KnownModel::Gpt35Turbo16k => "gpt-3.5-turbo-16k",
            KnownModel::Gpt4 => "gpt-4",
            KnownModel::Gpt432k => "gpt-4-32k",
            KnownModel::Gpt4o => "gpt-4o",
            KnownModel::Gpt4oMini => "gpt-4o-mini",
        }
    }

    /// Maximum prompt plus completion tokens accepted per request.
    pub fn context_window(&self) -> usize {
        match self {
            KnownModel::Gpt35Turbo => 4096,
            KnownModel::Gpt35Turbo16k => 16_384,
            KnownModel::Gpt4 => 8192,
            KnownModel::Gpt432k => 32_768,
            KnownModel::Gpt4o | KnownModel::Gpt4oMini => 128_000,
        }
    }
}

impl Model {
    /// Context window for this model; custom models get [`DEFAULT_CONTEXT_WINDOW`].
    pub fn context_window(&self) -> usize {
        match self {
            Model::Known(known) => known.context_window(),
            Model::Custom(_) => DEFAULT_CONTEXT_WINDOW,
        }
    }
}

impl Default for Model {
    fn default() -> Self {
        Model::Known(KnownModel::Gpt35Turbo)
    }
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Model::Known(known_model) => write!(f, "{}", known_model),
            Model::Custom(custom) => write!(f, "{}", custom),
        }
    }
}

impl fmt::Display for KnownModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KnownModel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        KnownModel::ALL
            .into_iter()
            .find(|model| model.as_str() == s)
            .ok_or_else(|| format!("unknown model: {s}"))
    }
}

impl FromStr for Model {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err("model name must not be empty".to_string());
        }
        Ok(s.parse::<KnownModel>()
            .map(Model::Known)
            .unwrap_or_else(|_| Model::Custom(s.to_string())))
    }
}

impl From<KnownModel> for Model {
    fn from(model: KnownModel) -> Self {
        Model::Known(model)
    }
}

impl From<&str> for Model {
    fn from(model: &str) -> Self {
        model
            .parse()
            .unwrap_or_else(|_| Model::Custom(model.to_string()))
    }
}
