//! Word-window text chunker.
//!
//! Splits long text into overlapping windows of whitespace-delimited words.
//! The unit of length is always a word, never a character, so technical
//! identifiers (`ORDER_TOTAL`, `billing::invoice`) are never cut in half.
//! Chunks are re-joined with single spaces.
//!
//! With `n` words, window `max` and overlap `o`, the chunker emits one chunk
//! when `n <= max`, otherwise `ceil((n - o) / (max - o))` chunks. Every word
//! appears in at least one chunk and no chunk exceeds `max` words.

use sha2::{Digest, Sha256};

use crate::config::ChunkingConfig;
use crate::error::{Error, Result};

/// Validated chunking parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkParams {
    max_words: usize,
    overlap_words: usize,
}

impl ChunkParams {
    /// Fails fast unless `0 < max_words` and `overlap_words < max_words`,
    /// which keeps the window step positive.
    pub fn new(max_words: usize, overlap_words: usize) -> Result<Self> {
        if max_words == 0 {
            return Err(Error::validation("chunk size must be at least one word"));
        }
        if overlap_words >= max_words {
            return Err(Error::validation(format!(
                "chunk overlap ({}) must be smaller than chunk size ({})",
                overlap_words, max_words
            )));
        }
        Ok(Self {
            max_words,
            overlap_words,
        })
    }

    pub fn from_config(config: &ChunkingConfig) -> Result<Self> {
        Self::new(config.max_words, config.overlap_words)
    }

    pub fn max_words(&self) -> usize {
        self.max_words
    }

    pub fn overlap_words(&self) -> usize {
        self.overlap_words
    }

    fn step(&self) -> usize {
        self.max_words - self.overlap_words
    }
}

/// Iterator over the word windows of a text.
///
/// Holds only borrowed words and a cursor, so calling [`split_iter`] again
/// restarts from the beginning.
pub struct WordChunks<'a> {
    words: Vec<&'a str>,
    params: ChunkParams,
    start: usize,
    done: bool,
}

impl<'a> Iterator for WordChunks<'a> {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        if self.done || self.start >= self.words.len() {
            return None;
        }
        let end = (self.start + self.params.max_words).min(self.words.len());
        let chunk = self.words[self.start..end].join(" ");
        if end == self.words.len() {
            self.done = true;
        } else {
            self.start += self.params.step();
        }
        Some(chunk)
    }
}

/// Lazily split `text` into word windows.
pub fn split_iter(text: &str, params: ChunkParams) -> WordChunks<'_> {
    WordChunks {
        words: text.split_whitespace().collect(),
        params,
        start: 0,
        done: false,
    }
}

/// Split `text` into overlapping word windows.
///
/// Empty or whitespace-only input yields no chunks.
pub fn split(text: &str, max_words: usize, overlap_words: usize) -> Result<Vec<String>> {
    let params = ChunkParams::new(max_words, overlap_words)?;
    Ok(split_iter(text, params).collect())
}

/// Number of chunks [`split`] would produce for `word_count` words.
pub fn expected_chunk_count(word_count: usize, params: ChunkParams) -> usize {
    if word_count == 0 {
        0
    } else if word_count <= params.max_words {
        1
    } else {
        (word_count - params.overlap_words).div_ceil(params.step())
    }
}

/// SHA-256 hex digest of a piece of text.
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numbered_words(n: usize) -> String {
        (0..n).map(|i| format!("w{}", i)).collect::<Vec<_>>().join(" ")
    }

    #[test]
    fn test_small_text_single_chunk() {
        let chunks = split("Hello, world!", 50, 25).unwrap();
        assert_eq!(chunks, vec!["Hello, world!".to_string()]);
    }

    #[test]
    fn test_empty_and_whitespace_text() {
        assert!(split("", 50, 25).unwrap().is_empty());
        assert!(split("   \n\t  ", 50, 25).unwrap().is_empty());
    }

    #[test]
    fn test_overlap_must_be_smaller_than_size() {
        assert!(split("a b c", 5, 5).unwrap_err().is_validation());
        assert!(split("a b c", 5, 9).unwrap_err().is_validation());
        assert!(split("a b c", 0, 0).unwrap_err().is_validation());
    }

    #[test]
    fn test_zero_overlap_partitions() {
        let chunks = split(&numbered_words(10), 4, 0).unwrap();
        assert_eq!(chunks, vec!["w0 w1 w2 w3", "w4 w5 w6 w7", "w8 w9"]);
    }

    #[test]
    fn test_overlapping_windows() {
        let chunks = split(&numbered_words(7), 4, 2).unwrap();
        assert_eq!(chunks, vec!["w0 w1 w2 w3", "w2 w3 w4 w5", "w4 w5 w6"]);
    }

    #[test]
    fn test_no_trailing_chunk_fully_inside_previous() {
        // 6 words, window 4, step 2: second window reaches the end.
        let chunks = split(&numbered_words(6), 4, 2).unwrap();
        assert_eq!(chunks, vec!["w0 w1 w2 w3", "w2 w3 w4 w5"]);
    }

    #[test]
    fn test_identifiers_are_never_split() {
        let text = "Call billing::invoice::finalize() before ORDER_TOTAL_CENTS is read";
        for chunk in split(text, 3, 1).unwrap() {
            for word in chunk.split(' ') {
                assert!(text.split_whitespace().any(|w| w == word));
            }
        }
    }

    #[test]
    fn test_count_bounds_and_coverage() {
        for n in [1usize, 2, 49, 50, 51, 75, 100, 101, 333] {
            for (max, overlap) in [(50usize, 25usize), (10, 0), (10, 9), (7, 3), (1, 0)] {
                let params = ChunkParams::new(max, overlap).unwrap();
                let text = numbered_words(n);
                let chunks: Vec<String> = split_iter(&text, params).collect();

                assert_eq!(chunks.len(), expected_chunk_count(n, params), "n={n} max={max} o={overlap}");
                let mut seen = vec![false; n];
                for chunk in &chunks {
                    let words: Vec<&str> = chunk.split(' ').collect();
                    assert!(!words.is_empty() && words.len() <= max);
                    for w in words {
                        let idx: usize = w[1..].parse().unwrap();
                        seen[idx] = true;
                    }
                }
                assert!(seen.iter().all(|s| *s), "every word must be covered");
            }
        }
    }

    #[test]
    fn test_iterator_is_restartable() {
        let text = numbered_words(120);
        let params = ChunkParams::new(50, 25).unwrap();
        let first: Vec<String> = split_iter(&text, params).collect();
        let second: Vec<String> = split_iter(&text, params).collect();
        assert_eq!(first, second);
        assert_eq!(first.len(), 4);
    }

    #[test]
    fn test_whitespace_is_normalized() {
        let chunks = split("alpha\n\n  beta\tgamma", 50, 25).unwrap();
        assert_eq!(chunks, vec!["alpha beta gamma"]);
    }

    #[test]
    fn test_content_hash_deterministic() {
        assert_eq!(content_hash("abc"), content_hash("abc"));
        assert_ne!(content_hash("abc"), content_hash("abd"));
        assert_eq!(content_hash("").len(), 64);
    }
}
