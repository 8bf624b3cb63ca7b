//! Paragraph- and sentence-aware text chunker.
//!
//! Splits document text into overlapping [`Chunk`]s bounded by a target size.
//! Splitting happens on blank-line paragraph boundaries first; consecutive
//! chunks share up to two trailing sentences so that context straddling a
//! boundary is retrievable from either side. Chunks that still end up much
//! larger than the target are re-split at sentence boundaries.
//!
//! All lengths are measured in characters, not bytes. The output is fully
//! deterministic for a given input and parameters.

use std::sync::LazyLock;

use regex::Regex;

use crate::models::Chunk;

/// Chunks at or below this many characters are dropped as noise.
pub const MIN_CHUNK_CHARS: usize = 20;

pub const DEFAULT_CHUNK_SIZE: usize = 400;
pub const DEFAULT_OVERLAP: usize = 50;

static EXCESS_BLANK_LINES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{3,}").expect("static regex"));
static PARAGRAPH_BREAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n\n+").expect("static regex"));
static SENTENCE_END: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[.!?]\s+").expect("static regex"));

/// Split `text` into chunks of roughly `target_size` characters.
///
/// `overlap_hint` bounds the overlap window: the last two sentences of a
/// closed chunk are carried into the next one only if they total fewer than
/// `2 × overlap_hint` characters.
///
/// Returns an empty vector for empty or whitespace-only input.
pub fn chunk_text(text: &str, target_size: usize, overlap_hint: usize) -> Vec<Chunk> {
    let target_size = target_size.max(1);
    let normalized = normalize(text);

    let mut chunks: Vec<String> = Vec::new();
    let mut current = String::new();

    for para in PARAGRAPH_BREAK.split(&normalized) {
        let para = para.trim();
        if para.is_empty() {
            continue;
        }

        let would_be = if current.is_empty() {
            char_len(para)
        } else {
            char_len(&current) + 2 + char_len(para)
        };

        if would_be > target_size && !current.is_empty() {
            let closed = current.trim().to_string();
            let overlap = trailing_sentences(&closed, 2);
            current = if char_len(&overlap) < overlap_hint * 2 {
                format!("{}\n\n{}", overlap, para)
            } else {
                para.to_string()
            };
            chunks.push(closed);
        } else {
            if !current.is_empty() {
                current.push_str("\n\n");
            }
            current.push_str(para);
        }
    }

    let tail = current.trim();
    if !tail.is_empty() {
        chunks.push(tail.to_string());
    }

    let max_chars = target_size + target_size / 2;
    let mut final_chunks = Vec::with_capacity(chunks.len());
    for chunk in chunks {
        if char_len(&chunk) > max_chars {
            final_chunks.extend(resplit_by_sentence(&chunk, target_size, max_chars));
        } else {
            final_chunks.push(chunk);
        }
    }

    final_chunks
        .into_iter()
        .filter(|c| char_len(c) > MIN_CHUNK_CHARS)
        .enumerate()
        .map(|(i, text)| Chunk::new(i, text))
        .collect()
}

/// Normalize line endings and collapse runs of blank lines.
fn normalize(text: &str) -> String {
    let unix = text.replace("\r\n", "\n");
    EXCESS_BLANK_LINES.replace_all(&unix, "\n\n").into_owned()
}

/// Split text after sentence-ending punctuation followed by whitespace.
fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    for m in SENTENCE_END.find_iter(text) {
        // Keep the punctuation (always one byte) with the sentence.
        sentences.push(&text[start..m.start() + 1]);
        start = m.end();
    }
    if start < text.len() {
        sentences.push(&text[start..]);
    }
    sentences
}

fn trailing_sentences(text: &str, count: usize) -> String {
    let sentences = split_sentences(text);
    let skip = sentences.len().saturating_sub(count);
    sentences[skip..].join(" ")
}

/// Greedy sentence accumulation without overlap.
fn resplit_by_sentence(chunk: &str, target_size: usize, max_chars: usize) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut sub = String::new();

    for sentence in split_sentences(chunk) {
        let would_be = if sub.is_empty() {
            char_len(sentence)
        } else {
            char_len(&sub) + 1 + char_len(sentence)
        };
        if would_be > target_size && !sub.is_empty() {
            pieces.push(sub.trim().to_string());
            sub = sentence.to_string();
        } else {
            if !sub.is_empty() {
                sub.push(' ');
            }
            sub.push_str(sentence);
        }
    }
    let tail = sub.trim();
    if !tail.is_empty() {
        pieces.push(tail.to_string());
    }

    // A single run-on sentence can still exceed the bound.
    let mut bounded = Vec::with_capacity(pieces.len());
    for piece in pieces {
        if char_len(&piece) > max_chars {
            bounded.extend(hard_split(&piece, target_size));
        } else {
            bounded.push(piece);
        }
    }
    bounded
}

/// Split at the last whitespace before `max_chars`, or exactly at
/// `max_chars` when the window has no whitespace.
fn hard_split(text: &str, max_chars: usize) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut remaining = text.trim();

    while !remaining.is_empty() {
        let Some((window_end, _)) = remaining.char_indices().nth(max_chars) else {
            pieces.push(remaining.to_string());
            break;
        };
        let window = &remaining[..window_end];
        let split_at = window
            .rfind(char::is_whitespace)
            .filter(|&pos| pos > 0)
            .unwrap_or(window_end);
        let piece = remaining[..split_at].trim();
        if !piece.is_empty() {
            pieces.push(piece.to_string());
        }
        remaining = remaining[split_at..].trim_start();
    }

    pieces
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sentence(i: usize) -> String {
        format!("Sentence number {} talks about vacation policy details.", i)
    }

    #[test]
    fn test_small_document_single_chunk() {
        let text = "Leave policy: employees get 20 days.\n\nRemote work: allowed 2 days/week.";
        let chunks = chunk_text(text, 400, 50);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].index, 0);
        assert_eq!(chunks[0].text, text);
        assert_eq!(chunks[0].length, text.chars().count());
    }

    #[test]
    fn test_empty_text() {
        assert!(chunk_text("", 400, 50).is_empty());
        assert!(chunk_text("  \n\n \r\n  ", 400, 50).is_empty());
    }

    #[test]
    fn test_short_noise_dropped() {
        let chunks = chunk_text("Header", 400, 50);
        assert!(chunks.is_empty());
    }

    #[test]
    fn test_crlf_and_blank_runs_normalized() {
        let text = "First paragraph is long enough.\r\n\r\n\r\n\r\nSecond paragraph is long enough.";
        let chunks = chunk_text(text, 400, 50);
        assert_eq!(chunks.len(), 1);
        assert_eq!(
            chunks[0].text,
            "First paragraph is long enough.\n\nSecond paragraph is long enough."
        );
    }

    #[test]
    fn test_paragraphs_split_with_overlap() {
        let p1 = "Alpha one is here. Alpha two follows. Alpha three ends.";
        let p2 = "Beta paragraph carries on with more words.";
        let text = format!("{}\n\n{}", p1, p2);
        let chunks = chunk_text(&text, 60, 50);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].text, p1);
        // Last two sentences of the first chunk seed the second.
        assert_eq!(
            chunks[1].text,
            format!("Alpha two follows. Alpha three ends.\n\n{}", p2)
        );
    }

    #[test]
    fn test_overlap_skipped_when_too_long() {
        let p1 = "A fairly long first sentence that keeps going on. Another fairly long sentence follows it here.";
        let p2 = "Second paragraph stands alone.";
        let text = format!("{}\n\n{}", p1, p2);
        let chunks = chunk_text(&text, 100, 10);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[1].text, p2);
    }

    #[test]
    fn test_long_paragraph_resplit() {
        let para = (0..40).map(sentence).collect::<Vec<_>>().join(" ");
        let chunks = chunk_text(&para, 400, 50);
        assert!(chunks.len() > 1);
        for c in &chunks {
            assert!(c.length <= 600, "chunk too long: {}", c.length);
            assert!(c.length > MIN_CHUNK_CHARS);
        }
    }

    #[test]
    fn test_run_on_sentence_hard_split() {
        let para = "word ".repeat(500);
        let chunks = chunk_text(&para, 100, 50);
        assert!(chunks.len() >= 20);
        for c in &chunks {
            assert!(c.length <= 150);
        }
    }

    #[test]
    fn test_unbroken_token_hard_split_is_char_safe() {
        let para = "é".repeat(1000);
        let chunks = chunk_text(&para, 100, 50);
        assert_eq!(chunks.len(), 10);
        assert!(chunks.iter().all(|c| c.length == 100));
    }

    #[test]
    fn test_indices_contiguous() {
        let text = (0..50)
            .map(|i| format!("Paragraph number {} has a few words.", i))
            .collect::<Vec<_>>()
            .join("\n\n");
        let chunks = chunk_text(&text, 80, 20);
        assert!(chunks.len() > 1);
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.index, i, "Index mismatch at position {}", i);
        }
    }

    #[test]
    fn test_deterministic() {
        let text = (0..30)
            .map(|i| format!("{}\n\n{}", sentence(i), sentence(i + 100)))
            .collect::<Vec<_>>()
            .join("\n\n\n");
        let c1 = chunk_text(&text, 120, 50);
        let c2 = chunk_text(&text, 120, 50);
        assert_eq!(c1, c2);
    }

    #[test]
    fn test_every_paragraph_is_covered() {
        let paragraphs: Vec<String> = (0..25)
            .map(|i| format!("Topic {} explains policy item number {}.", i, i * 7))
            .collect();
        let text = paragraphs.join("\n\n");
        let chunks = chunk_text(&text, 150, 50);
        for p in &paragraphs {
            assert!(
                chunks.iter().any(|c| c.text.contains(p.as_str())),
                "paragraph missing from output: {}",
                p
            );
        }
    }

    #[test]
    fn test_split_sentences_keeps_punctuation() {
        let s = split_sentences("One. Two! Three? Four");
        assert_eq!(s, vec!["One.", "Two!", "Three?", "Four"]);
    }
}
