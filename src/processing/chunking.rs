//! Separator-based chunking with token overlap.
//!
//! The document is cut at single spaces only, so a space-delimited unit is never split across
//! chunks. Units are accumulated greedily until the next one would push the chunk past
//! `chunk_size`; the next chunk then starts by keeping the trailing units of the previous one
//! (up to `chunk_overlap` tokens), so neighbouring chunks share a small window of text.
//!
//! Token arithmetic counts each unit on its own plus one separator between units, which keeps
//! the budget check independent of how the encoder merges tokens across unit boundaries.

use crate::processing::tokens::TokenCounter;
use crate::processing::types::{Chunk, ChunkSettings, PipelineError};
use std::collections::VecDeque;

/// The only break point the splitter uses.
pub const SEPARATOR: &str = " ";

/// Split `text` into ordered, overlapping chunks.
///
/// - `chunk_size == 0` returns an empty sequence (a disabled path).
/// - `chunk_overlap >= chunk_size` fails with [`PipelineError::InvalidConfiguration`].
/// - Empty or whitespace-only text returns an empty sequence.
/// - A single unit larger than `chunk_size` becomes its own oversized chunk.
pub fn split_text(
    text: &str,
    settings: ChunkSettings,
    counter: &TokenCounter,
) -> Result<Vec<Chunk>, PipelineError> {
    if !settings.is_enabled() {
        return Ok(Vec::new());
    }
    settings.validate()?;

    let ChunkSettings {
        chunk_size,
        chunk_overlap,
    } = settings;
    let separator_tokens = counter.count(SEPARATOR);
    let mut chunks = Vec::new();
    let mut window: VecDeque<(&str, usize)> = VecDeque::new();
    let mut total = 0usize;

    for unit in text.split(SEPARATOR).filter(|unit| !unit.is_empty()) {
        let unit_tokens = counter.count(unit);
        if total + unit_tokens + joiner(&window, separator_tokens) > chunk_size {
            if total > chunk_size {
                tracing::warn!(
                    tokens = total,
                    chunk_size,
                    "Created a chunk larger than the configured chunk size"
                );
            }
            if !window.is_empty() {
                push_chunk(&mut chunks, &window, counter);
                while total > chunk_overlap
                    || (total > 0
                        && total + unit_tokens + joiner(&window, separator_tokens) > chunk_size)
                {
                    let had_neighbour = window.len() > 1;
                    let Some((_, dropped)) = window.pop_front() else {
                        break;
                    };
                    let dropped_separator = if had_neighbour { separator_tokens } else { 0 };
                    total = total.saturating_sub(dropped + dropped_separator);
                }
            }
        }
        total += unit_tokens + joiner(&window, separator_tokens);
        window.push_back((unit, unit_tokens));
    }
    push_chunk(&mut chunks, &window, counter);

    tracing::debug!(
        chunk_size,
        chunk_overlap,
        chunks = chunks.len(),
        counter = counter.label(),
        "Split document"
    );
    Ok(chunks)
}

fn joiner(window: &VecDeque<(&str, usize)>, separator_tokens: usize) -> usize {
    if window.is_empty() {
        0
    } else {
        separator_tokens
    }
}

fn push_chunk(chunks: &mut Vec<Chunk>, window: &VecDeque<(&str, usize)>, counter: &TokenCounter) {
    let joined = window
        .iter()
        .map(|(unit, _)| *unit)
        .collect::<Vec<_>>()
        .join(SEPARATOR);
    let content = joined.trim();
    if content.is_empty() {
        return;
    }
    chunks.push(Chunk {
        content: content.to_string(),
        token_count: counter.count(content),
        sequence_index: chunks.len(),
    });
}
