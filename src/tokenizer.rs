//! Tokenizers used for token-budget accounting.
//!
//! The [`Tokenizer`] trait converts text to token IDs and back.  The
//! [`BpeTokenizer`] wraps the byte-pair encodings shipped with `tiktoken-rs`
//! so counts match what the completion service enforces.

use tiktoken_rs::CoreBPE;

use crate::error::{Error, Result};
use crate::types::Model;

/// Converts text to an ordered sequence of token IDs and back.
pub trait Tokenizer {
    /// Encode `text` into token IDs.
    fn encode(&self, text: &str) -> Result<Vec<u32>>;

    /// Decode token IDs back into text.
    ///
    /// Fails when the tokens end in the middle of a multi-byte character.
    fn decode(&self, tokens: &[u32]) -> Result<String>;

    /// Decode token IDs, replacing bytes of any character cut off at either
    /// end with U+FFFD.
    fn decode_lossy(&self, tokens: &[u32]) -> Result<String> {
        self.decode(tokens)
    }

    /// Number of tokens in `text`.
    fn count(&self, text: &str) -> Result<usize> {
        Ok(self.encode(text)?.len())
    }
}

/// Byte-pair encoding tokenizer compatible with the target model.
pub struct BpeTokenizer {
    bpe: CoreBPE,
}

impl BpeTokenizer {
    /// Tokenizer for `model`, falling back to `cl100k_base` for models
    /// `tiktoken-rs` does not recognize.
    pub fn for_model(model: &Model) -> Result<Self> {
        let name = model.to_string();
        let bpe = match tiktoken_rs::get_bpe_from_model(&name) {
            Ok(bpe) => bpe,
            Err(_) => {
                tracing::debug!(model = %name, "no tokenizer registered for model; using cl100k_base");
                tiktoken_rs::cl100k_base()
                    .map_err(|e| Error::tokenizer(format!("failed to load cl100k_base: {e}")))?
            }
        };
        Ok(Self { bpe })
    }
}

impl std::fmt::Debug for BpeTokenizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BpeTokenizer").finish_non_exhaustive()
    }
}

impl Tokenizer for BpeTokenizer {
    fn encode(&self, text: &str) -> Result<Vec<u32>> {
        Ok(self.bpe.encode_with_special_tokens(text))
    }

    fn decode(&self, tokens: &[u32]) -> Result<String> {
        self.bpe
            .decode(tokens.to_vec())
            .map_err(|e| Error::tokenizer(format!("failed to decode {} tokens: {e}", tokens.len())))
    }

    fn decode_lossy(&self, tokens: &[u32]) -> Result<String> {
        let bytes: Vec<u8> = self.bpe._decode_native_and_split(tokens.to_vec()).flatten().collect();
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

/// One token per Unicode scalar value.
///
/// Useful where a model-accurate count is not needed, and in tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct CharTokenizer;

impl Tokenizer for CharTokenizer {
    fn encode(&self, text: &str) -> Result<Vec<u32>> {
        Ok(text.chars().map(u32::from).collect())
    }

    fn decode(&self, tokens: &[u32]) -> Result<String> {
        tokens
            .iter()
            .map(|&t| {
                char::from_u32(t).ok_or_else(|| Error::tokenizer(format!("invalid token {t}")))
            })
            .collect()
    }

    fn decode_lossy(&self, tokens: &[u32]) -> Result<String> {
        Ok(tokens
            .iter()
            .map(|&t| char::from_u32(t).unwrap_or(char::REPLACEMENT_CHARACTER))
            .collect())
    }
}
