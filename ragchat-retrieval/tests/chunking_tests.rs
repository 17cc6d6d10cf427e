//! Property tests for word-window chunking.

use ragchat_retrieval::{Chunker, WordWindowChunker};
use proptest::prelude::*;

/// A window size and an overlap strictly smaller than it.
fn arb_window() -> impl Strategy<Value = (usize, usize)> {
    (1usize..40).prop_flat_map(|size| (Just(size), 0..size))
}

fn arb_text(max_words: usize) -> impl Strategy<Value = String> {
    proptest::collection::vec("[a-z]{1,6}", 0..max_words).prop_map(|words| words.join(" "))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn chunk_count_matches_window_formula((size, overlap) in arb_window(), text in arb_text(300)) {
        let chunker = WordWindowChunker::new(size, overlap).unwrap();
        let words = text.split_whitespace().count();
        let chunks = chunker.chunk("doc", &text);

        let expected = if words == 0 {
            0
        } else {
            std::cmp::max(1, (words.saturating_sub(overlap)).div_ceil(size - overlap))
        };
        prop_assert_eq!(chunks.len(), expected);
        prop_assert_eq!(chunker.expected_chunks(words), expected);
    }

    #[test]
    fn chunking_is_deterministic((size, overlap) in arb_window(), text in arb_text(200)) {
        let chunker = WordWindowChunker::new(size, overlap).unwrap();
        prop_assert_eq!(chunker.chunk("doc", &text), chunker.chunk("doc", &text));
    }

    #[test]
    fn windows_cover_the_text_in_order((size, overlap) in arb_window(), text in arb_text(200)) {
        let chunker = WordWindowChunker::new(size, overlap).unwrap();
        let words: Vec<&str> = text.split_whitespace().collect();
        let chunks = chunker.chunk("doc", &text);

        for (i, chunk) in chunks.iter().enumerate() {
            prop_assert_eq!(chunk.index, i);
            prop_assert_eq!(chunk.document_id.as_str(), "doc");

            let start = i * (size - overlap);
            let end = (start + size).min(words.len());
            prop_assert_eq!(chunk.text.clone(), words[start..end].join(" "));
        }
        if let Some(last) = chunks.last() {
            prop_assert_eq!(last.text.split(' ').next_back(), words.last().copied());
        }
    }

    #[test]
    fn consecutive_windows_share_exactly_the_overlap((size, overlap) in arb_window(), text in arb_text(200)) {
        let chunker = WordWindowChunker::new(size, overlap).unwrap();
        let chunks = chunker.split(&text);
        for pair in chunks.windows(2) {
            let prev: Vec<&str> = pair[0].split(' ').collect();
            let next: Vec<&str> = pair[1].split(' ').collect();
            prop_assert_eq!(prev.len(), size);
            let shared = overlap.min(next.len());
            prop_assert_eq!(&prev[size - overlap..size - overlap + shared], &next[..shared]);
        }
    }
}

#[test]
fn two_thousand_words_make_five_reference_chunks() {
    let chunker = WordWindowChunker::new(500, 50).unwrap();
    let text: String = (0..2000).map(|i| format!("w{i}")).collect::<Vec<_>>().join(" ");

    let chunks = chunker.chunk("doc", &text);

    assert_eq!(chunks.len(), 5);
    let starts: Vec<&str> =
        chunks.iter().map(|c| c.text.split(' ').next().unwrap_or_default()).collect();
    assert_eq!(starts, ["w0", "w450", "w900", "w1350", "w1800"]);
    assert_eq!(chunks[4].text.split(' ').count(), 200);
}
