//! Text chunking with overlap for embedding.
//!
//! Chunks are exact character slices of the document: chunk `i + 1` starts
//! `overlap` characters before chunk `i` ends, so dropping the first `overlap`
//! characters of every chunk after the first and concatenating gives back the
//! original text.

use crate::error::ConfigError;
use crate::models::{DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE, Document, DocumentChunk, IndexingConfig};

/// Text chunker that splits documents into overlapping chunks.
#[derive(Debug, Clone)]
pub struct TextChunker {
    /// Maximum chunk length in characters
    max_size: usize,
    /// Characters shared by consecutive chunks
    overlap: usize,
}

/// Character range `[start, end)` of one chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Boundary {
    Word,
    Sentence,
    Line,
    Paragraph,
}

impl TextChunker {
    /// Create a chunker; `overlap` must be smaller than `max_size`.
    pub fn new(max_size: usize, overlap: usize) -> Result<Self, ConfigError> {
        if max_size == 0 || overlap >= max_size {
            return Err(ConfigError::ChunkerConfig { max_size, overlap });
        }
        Ok(Self { max_size, overlap })
    }

    pub fn from_config(config: &IndexingConfig) -> Result<Self, ConfigError> {
        Self::new(config.chunk_size as usize, config.chunk_overlap as usize)
    }

    /// Create a chunker with the default 3000/200 settings.
    pub fn with_defaults() -> Self {
        Self {
            max_size: DEFAULT_CHUNK_SIZE as usize,
            overlap: DEFAULT_CHUNK_OVERLAP as usize,
        }
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Chunk a document. Blank documents yield no chunks.
    pub fn chunk(&self, document: &Document) -> Vec<DocumentChunk> {
        let chars: Vec<char> = document.content.chars().collect();
        let spans = self.split_chars(&chars);
        let total_chunks = spans.len() as u32;

        spans
            .into_iter()
            .enumerate()
            .map(|(idx, span)| {
                let content: String = chars[span.start..span.end].iter().collect();
                DocumentChunk::from_document(
                    document,
                    content,
                    idx as u32,
                    total_chunks,
                    span.start as u64,
                    span.end as u64,
                )
            })
            .collect()
    }

    /// Compute chunk spans over `text`.
    pub fn split(&self, text: &str) -> Vec<Span> {
        let chars: Vec<char> = text.chars().collect();
        self.split_chars(&chars)
    }

    fn split_chars(&self, chars: &[char]) -> Vec<Span> {
        let total = chars.len();
        if chars.iter().all(|c| c.is_whitespace()) {
            return Vec::new();
        }

        if total <= self.max_size {
            return vec![Span {
                start: 0,
                end: total,
            }];
        }

        let mut spans = Vec::new();
        let mut start = 0;

        loop {
            let target_end = (start + self.max_size).min(total);
            let end = if target_end == total {
                total
            } else {
                self.find_break_point(chars, start, target_end)
            };

            spans.push(Span { start, end });

            if end >= total {
                break;
            }

            // `find_break_point` never returns an end within `overlap` of `start`,
            // so this always moves forward.
            start = end - self.overlap;
        }

        spans
    }

    /// Find the end of a chunk starting at `start`, at most `target_end`.
    ///
    /// Looks for a boundary in the last fifth of the chunk, preferring
    /// paragraph > line > sentence > word, and takes the latest position of the
    /// best kind found. Falls back to a hard cut at `target_end`.
    fn find_break_point(&self, chars: &[char], start: usize, target_end: usize) -> usize {
        let tolerance = (self.max_size / 5).max(1);
        let floor = start + self.overlap + 1;
        let search_start = target_end.saturating_sub(tolerance).max(floor);

        if search_start > target_end {
            return target_end;
        }

        let mut best: Option<(Boundary, usize)> = None;
        for pos in search_start..=target_end {
            let Some(kind) = boundary_at(chars, pos) else {
                continue;
            };
            match best {
                Some((best_kind, _)) if best_kind > kind => {}
                _ => best = Some((kind, pos)),
            }
        }

        best.map_or(target_end, |(_, pos)| pos)
    }
}

/// Classify a cut that ends a chunk right before `chars[pos]`.
fn boundary_at(chars: &[char], pos: usize) -> Option<Boundary> {
    if pos == 0 || pos >= chars.len() {
        return None;
    }
    let prev = chars[pos - 1];
    let next = chars[pos];

    if prev == '\n' {
        if pos >= 2 && chars[pos - 2] == '\n' {
            return Some(Boundary::Paragraph);
        }
        return Some(Boundary::Line);
    }
    if matches!(prev, '.' | '!' | '?') && next.is_whitespace() {
        return Some(Boundary::Sentence);
    }
    if prev == ' ' || prev == '\t' {
        return Some(Boundary::Word);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Metadata;

    fn create_test_document(content: &str) -> Document {
        Document::new(content.to_string(), "test.txt", Metadata::new())
    }

    fn chunk_texts(chunker: &TextChunker, text: &str) -> Vec<String> {
        chunker
            .chunk(&create_test_document(text))
            .into_iter()
            .map(|c| c.content)
            .collect()
    }

    fn reconstruct(chunks: &[String], overlap: usize) -> String {
        let mut out = String::new();
        for (i, chunk) in chunks.iter().enumerate() {
            if i == 0 {
                out.push_str(chunk);
            } else {
                out.extend(chunk.chars().skip(overlap));
            }
        }
        out
    }

    /// Deterministic prose with paragraphs, sentences and a few long words.
    fn sample_text(words: usize, seed: u64) -> String {
        let vocab = [
            "battery", "cell", "LFP", "chemistry", "voltage", "the", "a", "is", "of",
            "thermal", "runaway", "électrode", "日本語", "cathode", "supercalifragilistic",
        ];
        let mut state = seed;
        let mut text = String::new();
        for i in 0..words {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            let word = vocab[(state >> 33) as usize % vocab.len()];
            text.push_str(word);
            match (state >> 20) % 23 {
                0 => text.push_str(".\n\n"),
                1 | 2 => text.push_str(". "),
                3 => text.push('\n'),
                _ if i + 1 < words => text.push(' '),
                _ => {}
            }
        }
        text
    }

    #[test]
    fn test_small_document_single_chunk() {
        let chunker = TextChunker::with_defaults();
        let doc = create_test_document("The battery uses LFP chemistry.");
        let chunks = chunker.chunk(&doc);

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content, "The battery uses LFP chemistry.");
        assert_eq!(chunks[0].chunk_index, 0);
        assert_eq!(chunks[0].total_chunks, 1);
        assert_eq!(chunks[0].start_offset, 0);
        assert_eq!(chunks[0].end_offset, 31);
    }

    #[test]
    fn test_document_exactly_max_size_is_one_chunk() {
        let chunker = TextChunker::new(10, 2).unwrap();
        assert_eq!(chunk_texts(&chunker, "abcdefghij"), vec!["abcdefghij"]);
    }

    #[test]
    fn test_empty_document() {
        let chunker = TextChunker::with_defaults();
        assert!(chunker.chunk(&create_test_document("")).is_empty());
        assert!(chunker.chunk(&create_test_document("  \n\n\t ")).is_empty());
    }

    #[test]
    fn test_invalid_settings_rejected() {
        assert!(matches!(
            TextChunker::new(0, 0),
            Err(ConfigError::ChunkerConfig { .. })
        ));
        assert!(TextChunker::new(100, 100).is_err());
        assert!(TextChunker::new(100, 150).is_err());
        assert!(TextChunker::new(100, 99).is_ok());
        assert!(TextChunker::new(1, 0).is_ok());
    }

    #[test]
    fn test_hard_cut_without_boundaries() {
        let chunker = TextChunker::new(200, 40).unwrap();
        let content = "a".repeat(500);
        let chunks = chunk_texts(&chunker, &content);

        assert_eq!(chunks[0].len(), 200);
        assert!(chunks.len() > 1);
        assert_eq!(reconstruct(&chunks, 40), content);
    }

    #[test]
    fn test_prefers_paragraph_boundary() {
        let chunker = TextChunker::new(100, 10).unwrap();
        let first = format!("{}.\n\n", "word ".repeat(17).trim_end());
        let text = format!("{first}{}", "next paragraph text ".repeat(10));
        let chunks = chunk_texts(&chunker, &text);

        assert_eq!(chunks[0], first);
    }

    #[test]
    fn test_prefers_sentence_over_word() {
        let chunker = TextChunker::new(50, 5).unwrap();
        let text = "Alpha beta gamma delta epsilon zeta eta. Theta iota kappa lambda mu nu xi.";
        let chunks = chunk_texts(&chunker, text);

        assert_eq!(chunks[0], "Alpha beta gamma delta epsilon zeta eta.");
        assert!(chunks[1].ends_with("xi."));
    }

    #[test]
    fn test_word_boundary_before_hard_cut() {
        let chunker = TextChunker::new(20, 4).unwrap();

        let chunks = chunk_texts(&chunker, "abcdefghijklmnop qrstuvwxyz");
        assert_eq!(chunks[0], "abcdefghijklmnop ");

        // The only space lies outside the search window: hard cut.
        let chunks = chunk_texts(&chunker, "abcdefgh ijklmnopqrstuvwxyz");
        assert_eq!(chunks[0], "abcdefgh ijklmnopqrs");
    }

    #[test]
    fn test_size_overlap_and_roundtrip_invariants() {
        let settings = [(50, 0), (50, 10), (64, 63), (120, 30), (300, 200), (3000, 200), (7, 3)];
        for (seed, &(max_size, overlap)) in settings.iter().enumerate() {
            let chunker = TextChunker::new(max_size, overlap).unwrap();
            let text = sample_text(900, seed as u64 + 1);
            let chunks = chunker.chunk(&create_test_document(&text));
            let contents: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();

            assert!(!chunks.is_empty());
            for chunk in &chunks {
                assert!(
                    chunk.char_len() <= max_size,
                    "chunk of {} chars exceeds {max_size}",
                    chunk.char_len()
                );
                assert_eq!(chunk.total_chunks as usize, chunks.len());
            }

            for pair in chunks.windows(2) {
                let tail: String = pair[0]
                    .content
                    .chars()
                    .skip(pair[0].char_len() - overlap)
                    .collect();
                let head: String = pair[1].content.chars().take(overlap).collect();
                assert_eq!(tail, head, "overlap broken for max={max_size} overlap={overlap}");
                assert_eq!(pair[1].start_offset, pair[0].end_offset - overlap as u64);
            }

            assert_eq!(reconstruct(&contents, overlap), text);
            assert_eq!(chunks.last().unwrap().end_offset as usize, text.chars().count());
        }
    }

    #[test]
    fn test_multibyte_counts_characters() {
        let chunker = TextChunker::new(10, 3).unwrap();
        let text = "日本語のテキストを分割するテストです";
        let chunks = chunk_texts(&chunker, text);

        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.chars().count() <= 10));
        assert_eq!(reconstruct(&chunks, 3), text);
    }

    #[test]
    fn test_chunks_inherit_metadata_and_indices() {
        let chunker = TextChunker::new(40, 8).unwrap();
        let doc = create_test_document(&sample_text(60, 9));
        let chunks = chunker.chunk(&doc);

        assert!(chunks.len() > 1);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.chunk_index, i as u32);
            assert_eq!(chunk.document_id, doc.id);
            assert_eq!(chunk.metadata.get("source").unwrap(), "test.txt");
        }
    }

    #[test]
    fn test_from_config() {
        let config = IndexingConfig {
            chunk_size: 100,
            chunk_overlap: 150,
            ..Default::default()
        };
        assert!(TextChunker::from_config(&config).is_err());

        let chunker = TextChunker::from_config(&IndexingConfig::default()).unwrap();
        assert_eq!(chunker.max_size(), 3000);
        assert_eq!(chunker.overlap(), 200);
    }
}
