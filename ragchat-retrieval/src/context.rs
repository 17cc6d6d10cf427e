//! Token-budgeted context assembly.

use std::sync::Arc;

use serde::Serialize;

use crate::config::ContextTruncation;
use crate::document::SearchResult;
use crate::error::Result;
use crate::tokenizer::Tokenizer;

/// Separator placed between chunk texts.
pub const CHUNK_SEPARATOR: &str = "\n\n";

/// Assembled context plus the ranked results it was built from.
#[derive(Debug, Clone, Serialize)]
pub struct RetrievedContext {
    /// Chunk texts joined in rank order, within the token budget.
    pub context: String,
    /// The ranked results, highest score first.
    pub sources: Vec<SearchResult>,
}

/// Joins ranked chunk texts and fits them into a token budget.
pub struct ContextAssembler {
    tokenizer: Arc<dyn Tokenizer>,
    max_tokens: usize,
    policy: ContextTruncation,
}

impl ContextAssembler {
    pub fn new(tokenizer: Arc<dyn Tokenizer>, max_tokens: usize, policy: ContextTruncation) -> Self {
        Self { tokenizer, max_tokens, policy }
    }

    pub fn max_tokens(&self) -> usize {
        self.max_tokens
    }

    /// Build the context for `results`, which must already be in rank order.
    ///
    /// Returns empty text for empty results. Under
    /// [`ContextTruncation::Concatenated`] the joined text is cut at the token
    /// limit; under [`ContextTruncation::WholeChunks`] trailing chunks that
    /// would overflow are dropped.
    pub fn build_context(&self, results: &[SearchResult]) -> Result<String> {
        if results.is_empty() {
            return Ok(String::new());
        }

        match self.policy {
            ContextTruncation::Concatenated => {
                let joined = results
                    .iter()
                    .map(|r| r.payload.text.as_str())
                    .collect::<Vec<_>>()
                    .join(CHUNK_SEPARATOR);
                self.tokenizer.truncate(&joined, self.max_tokens)
            }
            ContextTruncation::WholeChunks => self.whole_chunks(results),
        }
    }

    fn whole_chunks(&self, results: &[SearchResult]) -> Result<String> {
        let mut context = String::new();
        for result in results {
            let candidate = if context.is_empty() {
                result.payload.text.clone()
            } else {
                format!("{context}{CHUNK_SEPARATOR}{}", result.payload.text)
            };
            if self.tokenizer.count(&candidate)? > self.max_tokens {
                break;
            }
            context = candidate;
        }

        if context.is_empty() {
            // The top-ranked chunk alone is over budget.
            return self.tokenizer.truncate(&results[0].payload.text, self.max_tokens);
        }
        Ok(context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{ChunkPayload, Metadata};
    use crate::tokenizer::TiktokenTokenizer;

    const LONG_TAIL: &str = "the second chunk carries many more words than the budget leaves room \
                             for once the first chunk has been placed in the context";

    fn result(text: &str, score: f32) -> SearchResult {
        SearchResult {
            id: format!("id-{score}"),
            score,
            payload: ChunkPayload {
                document_id: "doc".into(),
                chunk_index: 0,
                text: text.into(),
                metadata: Metadata::new(),
                embedding_model: "test".into(),
            },
        }
    }

    fn assembler(max_tokens: usize, policy: ContextTruncation) -> ContextAssembler {
        ContextAssembler::new(Arc::new(TiktokenTokenizer::cl100k().unwrap()), max_tokens, policy)
    }

    #[test]
    fn empty_results_give_empty_context() {
        for policy in [ContextTruncation::Concatenated, ContextTruncation::WholeChunks] {
            assert_eq!(assembler(100, policy).build_context(&[]).unwrap(), "");
        }
    }

    #[test]
    fn chunks_are_joined_in_rank_order() {
        let results = [result("first chunk", 0.9), result("second chunk", 0.8)];
        let context = assembler(100, ContextTruncation::Concatenated).build_context(&results).unwrap();
        assert_eq!(context, "first chunk\n\nsecond chunk");
    }

    #[test]
    fn concatenated_policy_cuts_inside_a_chunk() {
        let results = [
            result("alpha beta gamma delta epsilon", 0.9),
            result(LONG_TAIL, 0.8),
        ];
        let assembler = assembler(12, ContextTruncation::Concatenated);
        let context = assembler.build_context(&results).unwrap();
        assert!(context.starts_with("alpha beta gamma delta epsilon"));
        assert!(context.len() < "alpha beta gamma delta epsilon".len() + 2 + LONG_TAIL.len());
        assert!(assembler.tokenizer.count(&context).unwrap() <= 12);
    }

    #[test]
    fn whole_chunk_policy_drops_the_overflowing_tail() {
        let results = [
            result("alpha beta gamma delta epsilon", 0.9),
            result(LONG_TAIL, 0.8),
        ];
        let context = assembler(12, ContextTruncation::WholeChunks).build_context(&results).unwrap();
        assert_eq!(context, "alpha beta gamma delta epsilon");
    }

    #[test]
    fn whole_chunk_policy_truncates_an_oversized_top_chunk() {
        let results = [result("alpha beta gamma delta epsilon zeta eta theta", 0.9)];
        let assembler = assembler(3, ContextTruncation::WholeChunks);
        let context = assembler.build_context(&results).unwrap();
        assert!(!context.is_empty());
        assert!("alpha beta gamma delta epsilon zeta eta theta".starts_with(&context));
        assert!(assembler.tokenizer.count(&context).unwrap() <= 3);
    }
}
