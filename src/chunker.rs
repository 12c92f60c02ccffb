//! Fixed-size overlapping chunker.
//!
//! Sizes and offsets are counted in `char`s. Each window ends at the most
//! natural break (paragraph, line, sentence, whitespace) found in its back
//! half, and the next window starts exactly `chunk_overlap` chars before
//! that end, so consecutive chunks always share exactly `chunk_overlap`
//! chars and dropping those shared prefixes rebuilds the source text.

use crate::config::{ConfigError, validate_chunking};
use crate::loader::{DocumentRecord, SourceType};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub text: String,
    pub source_path: String,
    pub project: String,
    /// Char offset of `text` within the source document (or page).
    pub offset: usize,
    pub source_type: SourceType,
    pub page: Option<u32>,
}

const SENTENCE_ENDS: &[char] = &['.', '!', '?', '。', '！', '？'];

/// Split every document into chunks, in document order.
pub fn split(
    documents: &[DocumentRecord],
    chunk_size: usize,
    chunk_overlap: usize,
) -> Result<Vec<Chunk>, ConfigError> {
    validate_chunking(chunk_size, chunk_overlap)?;

    let mut chunks = Vec::new();
    for doc in documents {
        for (offset, text) in split_text(&doc.text, chunk_size, chunk_overlap) {
            chunks.push(Chunk {
                text,
                source_path: doc.source_path.clone(),
                project: doc.project.clone(),
                offset,
                source_type: doc.source_type,
                page: doc.page,
            });
        }
    }
    Ok(chunks)
}

/// Split one text into `(char_offset, text)` windows.
///
/// Callers must have validated `chunk_overlap < chunk_size`.
pub fn split_text(text: &str, chunk_size: usize, chunk_overlap: usize) -> Vec<(usize, String)> {
    let chars: Vec<char> = text.chars().collect();
    let total = chars.len();
    let mut windows = Vec::new();
    if total == 0 {
        return windows;
    }

    let mut start = 0;
    loop {
        let hard_end = (start + chunk_size).min(total);
        let end = if hard_end == total {
            total
        } else {
            find_break(&chars, start, hard_end, chunk_size, chunk_overlap)
        };

        windows.push((start, chars[start..end].iter().collect()));
        if end == total {
            break;
        }
        start = end - chunk_overlap;
    }

    windows
}

/// Pick the end of the window starting at `start`.
///
/// Never earlier than `start + chunk_overlap + 1`, which guarantees the
/// next window starts strictly after this one.
fn find_break(
    chars: &[char],
    start: usize,
    hard_end: usize,
    chunk_size: usize,
    chunk_overlap: usize,
) -> usize {
    let floor = start + (chunk_overlap + 1).max(chunk_size / 2);
    if floor >= hard_end {
        return hard_end;
    }

    let tiers: [&dyn Fn(usize) -> bool; 4] = [
        &|end| chars[end - 1] == '\n' && end >= 2 && chars[end - 2] == '\n',
        &|end| chars[end - 1] == '\n',
        &|end| SENTENCE_ENDS.contains(&chars[end - 1]),
        &|end| chars[end - 1].is_whitespace(),
    ];

    for is_break in tiers {
        if let Some(end) = (floor..=hard_end).rev().find(|&end| is_break(end)) {
            return end;
        }
    }

    hard_end
}
