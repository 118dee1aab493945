//! Recursive text splitting for retrieval.
//!
//! Text is cut on the coarsest boundary that keeps pieces under the chunk
//! size: paragraphs first, then lines, sentences, words, and finally raw
//! characters. Neighbouring pieces are packed back together up to the chunk
//! size, with a tail of each chunk repeated at the head of the next.

use std::collections::VecDeque;

const SEPARATORS: [&str; 4] = ["\n\n", "\n", ". ", " "];

#[derive(Debug, Clone)]
pub struct TextChunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

fn len(s: &str) -> usize {
    s.chars().count()
}

impl TextChunker {
    /// `chunk_overlap` is clamped below `chunk_size`.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            chunk_size,
            chunk_overlap: chunk_overlap.min(chunk_size - 1),
        }
    }

    pub fn split(&self, text: &str) -> Vec<String> {
        self.split_with(text, &SEPARATORS)
            .into_iter()
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .collect()
    }

    fn split_with(&self, text: &str, separators: &[&str]) -> Vec<String> {
        let Some(pos) = separators.iter().position(|s| text.contains(s)) else {
            return self.hard_split(text);
        };
        let separator = separators[pos];
        let finer = &separators[pos + 1..];

        let mut out = Vec::new();
        let mut pending: Vec<&str> = Vec::new();

        for piece in text.split(separator).filter(|p| !p.is_empty()) {
            if len(piece) <= self.chunk_size {
                pending.push(piece);
                continue;
            }
            if !pending.is_empty() {
                out.extend(self.merge(&pending, separator));
                pending.clear();
            }
            out.extend(self.split_with(piece, finer));
        }
        if !pending.is_empty() {
            out.extend(self.merge(&pending, separator));
        }
        out
    }

    /// Last resort: fixed windows of characters.
    fn hard_split(&self, text: &str) -> Vec<String> {
        let chars: Vec<char> = text.chars().collect();
        let step = self.chunk_size - self.chunk_overlap;
        let mut out = Vec::new();
        let mut start = 0;
        while start < chars.len() {
            let end = (start + self.chunk_size).min(chars.len());
            out.push(chars[start..end].iter().collect());
            if end == chars.len() {
                break;
            }
            start += step;
        }
        out
    }

    /// Pack small pieces into chunks, carrying an overlap tail forward.
    fn merge(&self, pieces: &[&str], joiner: &str) -> Vec<String> {
        let joiner_len = len(joiner);
        let mut docs = Vec::new();
        let mut window: VecDeque<&str> = VecDeque::new();
        let mut total = 0usize;

        for &piece in pieces {
            let piece_len = len(piece);
            let extra = if window.is_empty() { 0 } else { joiner_len };

            if !window.is_empty() && total + extra + piece_len > self.chunk_size {
                docs.push(join(&window, joiner));
                while let Some(first) = window.front() {
                    let joined_next = if window.len() > 1 { joiner_len } else { 0 };
                    let fits = total + joiner_len + piece_len <= self.chunk_size;
                    if total <= self.chunk_overlap && fits {
                        break;
                    }
                    total -= len(first) + joined_next;
                    window.pop_front();
                }
            }

            total += piece_len + if window.is_empty() { 0 } else { joiner_len };
            window.push_back(piece);
        }

        if !window.is_empty() {
            docs.push(join(&window, joiner));
        }
        docs
    }
}

fn join(window: &VecDeque<&str>, joiner: &str) -> String {
    window.iter().copied().collect::<Vec<_>>().join(joiner)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn testimony(paragraphs: usize) -> String {
        (0..paragraphs)
            .map(|i| {
                format!(
                    "Q. Where were you on the night of March {i}? A. I was at the corner of Fifth and Main, \
                     watching the intersection from the bus shelter. I saw the blue sedan run the light."
                )
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    #[test]
    fn short_text_is_one_chunk() {
        let chunker = TextChunker::new(400, 40);
        let chunks = chunker.split("Jane Doe, eyewitness.");
        assert_eq!(chunks, vec!["Jane Doe, eyewitness.".to_string()]);
    }

    #[test]
    fn chunks_respect_size_limit() {
        let chunker = TextChunker::new(400, 40);
        let text = testimony(12);
        let chunks = chunker.split(&text);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(len(chunk) <= 400, "chunk too long: {}", len(chunk));
        }
    }

    #[test]
    fn long_paragraph_falls_back_to_sentences_and_words() {
        let chunker = TextChunker::new(50, 10);
        let text = "The deponent stated that the vehicle was blue. She was certain of the color. \
                    She had seen it many times before on her street.";
        let chunks = chunker.split(text);
        assert!(chunks.len() >= 2);
        assert!(chunks.iter().all(|c| len(c) <= 50));
        let rejoined = chunks.join(" ");
        assert!(rejoined.contains("vehicle was blue"));
        assert!(rejoined.contains("her street"));
    }

    #[test]
    fn adjacent_chunks_overlap() {
        let chunker = TextChunker::new(30, 10);
        let text = "alpha beta gamma delta epsilon zeta eta theta iota kappa lambda";
        let chunks = chunker.split(text);
        assert!(chunks.len() >= 2);
        for pair in chunks.windows(2) {
            let last_word = pair[0].split(' ').last().unwrap();
            assert!(pair[1].starts_with(last_word) || pair[1].contains(last_word));
        }
    }

    #[test]
    fn unbroken_text_is_hard_split() {
        let chunker = TextChunker::new(10, 2);
        let chunks = chunker.split(&"x".repeat(25));
        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|c| len(c) <= 10));
    }

    #[test]
    fn overlap_is_clamped() {
        let chunker = TextChunker::new(5, 50);
        assert_eq!(chunker.chunk_overlap, 4);
    }
}
