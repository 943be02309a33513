//! Process configuration: where templates live and how to find the API key.
//!
//! Nothing here reads the environment implicitly except
//! [`AppConfig::from_env`]; tests build an [`AppConfig`] pointing at a
//! fixture directory instead.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::prompt::PromptLibrary;

/// Environment variable that overrides the configuration directory.
pub const CONFIG_DIR_ENV: &str = "AICHAT_HOME";

/// Environment variable holding the API key.
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

const CONFIG_DIR_NAME: &str = ".aichat";
const PROMPTS_DIR_NAME: &str = "prompts";
const CONFIG_FILE_NAME: &str = "config.yaml";

/// Resolved locations of aichat's on-disk configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    config_dir: PathBuf,
}

#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    openai_api_key: Option<String>,
}

impl AppConfig {
    /// Use `config_dir` as the configuration directory.
    pub fn with_config_dir(config_dir: impl Into<PathBuf>) -> Self {
        Self {
            config_dir: config_dir.into(),
        }
    }

    /// Resolve the configuration directory from the environment:
    /// `$AICHAT_HOME` if set, else `<home>/.aichat`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if no home directory can be found.
    pub fn from_env() -> Result<Self> {
        if let Some(dir) = std::env::var_os(CONFIG_DIR_ENV).filter(|dir| !dir.is_empty()) {
            return Ok(Self::with_config_dir(dir));
        }
        let home = std::env::var_os("HOME")
            .or_else(|| std::env::var_os("USERPROFILE"))
            .filter(|home| !home.is_empty())
            .ok_or_else(|| Error::configuration("cannot determine the home directory"))?;
        Ok(Self::with_config_dir(Path::new(&home).join(CONFIG_DIR_NAME)))
    }

    /// The configuration directory.
    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    /// Directory scanned for prompt templates.
    pub fn prompts_dir(&self) -> PathBuf {
        self.config_dir.join(PROMPTS_DIR_NAME)
    }

    /// Path of the optional settings file.
    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join(CONFIG_FILE_NAME)
    }

    /// Load every template in [`prompts_dir`](Self::prompts_dir).
    pub fn load_prompts(&self) -> Result<PromptLibrary> {
        PromptLibrary::load_dir(self.prompts_dir())
    }

    /// Find the API key: `$OPENAI_API_KEY` if set, else `openai_api_key`
    /// from `config.yaml`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if neither source supplies a key,
    /// and [`Error::Parse`] if the settings file is malformed.
    pub fn api_key(&self) -> Result<String> {
        let from_env = std::env::var(API_KEY_ENV).ok();
        self.resolve_api_key(from_env)
    }

    fn resolve_api_key(&self, from_env: Option<String>) -> Result<String> {
        if let Some(key) = from_env.map(|key| key.trim().to_string()).filter(|key| !key.is_empty()) {
            return Ok(key);
        }
        let path = self.config_file();
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::configuration(format!(
                    "API key not found: set {API_KEY_ENV} or add openai_api_key to {}",
                    path.display()
                )));
            }
            Err(err) => {
                return Err(Error::io(format!("cannot read {}: {err}", path.display()), err));
            }
        };
        let file: Option<ConfigFile> = serde_yaml::from_str(&content).map_err(|e| {
            Error::parse(e.to_string(), Some(path.display().to_string()), Some(Box::new(e)))
        })?;
        file.unwrap_or_default()
            .openai_api_key
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty())
            .ok_or_else(|| {
                Error::configuration(format!("openai_api_key is missing from {}", path.display()))
            })
    }
}
