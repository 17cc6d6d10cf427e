//! HuggingFace `tokenizers` backend.
//!
//! This module is only available when the `hf-tokenizer` feature is enabled.
//! Use it when the embedding or chat model ships a `tokenizer.json` rather
//! than a tiktoken encoding.

use std::path::Path;

use crate::error::{RagError, Result};
use crate::tokenizer::Tokenizer;

/// A [`Tokenizer`] wrapping a [`tokenizers::Tokenizer`] loaded from disk.
pub struct HfTokenizer {
    inner: tokenizers::Tokenizer,
    encoding: String,
}

impl HfTokenizer {
    /// Load a tokenizer from a `tokenizer.json` file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let encoding = path.display().to_string();
        let inner = tokenizers::Tokenizer::from_file(path).map_err(|e| {
            RagError::TokenizerError { encoding: encoding.clone(), message: e.to_string() }
        })?;
        Ok(Self { inner, encoding })
    }

    fn map_err(&self, e: impl std::fmt::Display) -> RagError {
        RagError::TokenizerError { encoding: self.encoding.clone(), message: e.to_string() }
    }
}

impl Tokenizer for HfTokenizer {
    fn encoding(&self) -> &str {
        &self.encoding
    }

    fn encode(&self, text: &str) -> Result<Vec<u32>> {
        // Special tokens are left out so counts reflect the text alone.
        let encoding = self.inner.encode(text, false).map_err(|e| self.map_err(e))?;
        Ok(encoding.get_ids().to_vec())
    }

    fn decode(&self, tokens: &[u32]) -> Result<String> {
        self.inner.decode(tokens, false).map_err(|e| self.map_err(e))
    }
}
