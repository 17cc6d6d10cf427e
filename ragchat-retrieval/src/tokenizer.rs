//! Token counting and token-budgeted truncation.
//!
//! A single [`Tokenizer`] is shared by everything that measures text in
//! tokens, so that budgets mean the same thing everywhere. The default scheme
//! is tiktoken's `cl100k_base` via [`TiktokenTokenizer`].

use tiktoken_rs::CoreBPE;

use crate::error::{RagError, Result};

/// A reversible text ↔ token-id encoding.
///
/// Only [`encode`](Tokenizer::encode) and [`decode`](Tokenizer::decode) are
/// required. [`truncate`](Tokenizer::truncate) is built on them and guarantees
/// `count(truncate(text, n)) <= n` for every `n`.
pub trait Tokenizer: Send + Sync {
    /// Name of the encoding scheme, used in errors and logs.
    fn encoding(&self) -> &str;

    /// Encode text into token ids.
    fn encode(&self, text: &str) -> Result<Vec<u32>>;

    /// Decode token ids back into text.
    ///
    /// May fail when the ids end inside a multi-byte character.
    fn decode(&self, tokens: &[u32]) -> Result<String>;

    /// Number of tokens in `text`.
    fn count(&self, text: &str) -> Result<usize> {
        Ok(self.encode(text)?.len())
    }

    /// Return the longest token prefix of `text` that fits in `max_tokens`.
    ///
    /// Text that already fits is returned unchanged. Otherwise the prefix is
    /// cut at a token boundary, which may fall inside a word. A prefix that
    /// does not decode cleanly, or that re-encodes to more than `max_tokens`,
    /// is shortened one token at a time.
    fn truncate(&self, text: &str, max_tokens: usize) -> Result<String> {
        let tokens = self.encode(text)?;
        if tokens.len() <= max_tokens {
            return Ok(text.to_string());
        }

        let mut end = max_tokens;
        while end > 0 {
            if let Ok(prefix) = self.decode(&tokens[..end]) {
                if self.count(&prefix)? <= max_tokens {
                    return Ok(prefix);
                }
            }
            end -= 1;
        }
        Ok(String::new())
    }
}

/// A [`Tokenizer`] backed by OpenAI's tiktoken BPE encodings.
///
/// # Example
///
/// ```rust,ignore
/// use ragchat_retrieval::{Tokenizer, TiktokenTokenizer};
///
/// let tokenizer = TiktokenTokenizer::cl100k()?;
/// let short = tokenizer.truncate(&long_text, 3000)?;
/// ```
pub struct TiktokenTokenizer {
    bpe: CoreBPE,
    encoding: String,
}

impl TiktokenTokenizer {
    /// The `cl100k_base` encoding.
    pub fn cl100k() -> Result<Self> {
        let bpe = tiktoken_rs::cl100k_base().map_err(|e| Self::load_err("cl100k_base", e))?;
        Ok(Self { bpe, encoding: "cl100k_base".to_string() })
    }

    /// The `o200k_base` encoding.
    pub fn o200k() -> Result<Self> {
        let bpe = tiktoken_rs::o200k_base().map_err(|e| Self::load_err("o200k_base", e))?;
        Ok(Self { bpe, encoding: "o200k_base".to_string() })
    }

    /// The encoding used by a chat or embedding model, e.g. `gpt-4o`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if tiktoken does not know the model.
    pub fn for_model(model: &str) -> Result<Self> {
        let bpe = tiktoken_rs::get_bpe_from_model(model).map_err(|e| {
            RagError::ConfigError(format!("no tiktoken encoding for model '{model}': {e}"))
        })?;
        Ok(Self { bpe, encoding: model.to_string() })
    }

    fn load_err(encoding: &str, e: impl std::fmt::Display) -> RagError {
        RagError::TokenizerError {
            encoding: encoding.to_string(),
            message: format!("failed to load encoding: {e}"),
        }
    }
}

impl std::fmt::Debug for TiktokenTokenizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TiktokenTokenizer").field("encoding", &self.encoding).finish()
    }
}

impl Tokenizer for TiktokenTokenizer {
    fn encoding(&self) -> &str {
        &self.encoding
    }

    fn encode(&self, text: &str) -> Result<Vec<u32>> {
        Ok(self.bpe.encode_ordinary(text))
    }

    fn decode(&self, tokens: &[u32]) -> Result<String> {
        self.bpe.decode(tokens.to_vec()).map_err(|e| RagError::TokenizerError {
            encoding: self.encoding.clone(),
            message: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_returned_unchanged() {
        let tokenizer = TiktokenTokenizer::cl100k().unwrap();
        let text = "The quick brown fox.";
        assert_eq!(tokenizer.truncate(text, 100).unwrap(), text);
        let exact = tokenizer.count(text).unwrap();
        assert_eq!(tokenizer.truncate(text, exact).unwrap(), text);
    }

    #[test]
    fn truncation_is_a_prefix_within_budget() {
        let tokenizer = TiktokenTokenizer::cl100k().unwrap();
        let text = "Retrieval augmented generation assembles a bounded context window.";
        let truncated = tokenizer.truncate(text, 4).unwrap();
        assert!(text.starts_with(&truncated));
        assert!(tokenizer.count(&truncated).unwrap() <= 4);
        assert!(!truncated.is_empty());
    }

    #[test]
    fn zero_budget_yields_empty_text() {
        let tokenizer = TiktokenTokenizer::cl100k().unwrap();
        assert_eq!(tokenizer.truncate("anything at all", 0).unwrap(), "");
    }

    #[test]
    fn multibyte_text_never_exceeds_budget() {
        let tokenizer = TiktokenTokenizer::cl100k().unwrap();
        let text = "日本語のテキストを分割します。絵文字も🙂🙃含みます。";
        for budget in 0..tokenizer.count(text).unwrap() {
            let truncated = tokenizer.truncate(text, budget).unwrap();
            assert!(tokenizer.count(&truncated).unwrap() <= budget);
        }
    }

    #[test]
    fn unknown_model_is_a_config_error() {
        let err = TiktokenTokenizer::for_model("definitely-not-a-model").unwrap_err();
        assert!(matches!(err, RagError::ConfigError(_)));
    }
}
