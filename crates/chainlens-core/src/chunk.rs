//! Structure-aware text chunker.
//!
//! Turns the [`RawContentUnit`]s produced by the extractors into
//! [`Chunk`]s sized for embedding. Token counts are estimated as
//! `ceil(chars / 4)`; no tokenizer is involved.
//!
//! # Algorithm
//!
//! Each unit is processed independently:
//!
//! 1. The content is split into prose runs and fenced code blocks
//!    (```` ``` ```` to the next ```` ``` ````).
//! 2. Prose accumulates in a buffer. While the buffer is over the
//!    target, it is cut at the last sentence end (`.`, `!`, `?` followed
//!    by whitespace) past 50% of the target, else the last line break past
//!    50%, else the last space past 30%, else hard at the target. The last
//!    `overlap_tokens` worth of each emitted chunk seeds the next one.
//! 3. A code block no larger than `code_block_max_tokens` is kept whole.
//!    If adding it would push the buffer past `target + slack`, the buffer
//!    is flushed first. Once buffered, the block is never cut: prose that
//!    would overflow the buffer first flushes it through the block's
//!    closing fence, and overlap is only taken from text after the block.
//! 4. A larger code block flushes the buffer and is split on line
//!    boundaries into target-sized pieces. A single line longer than the
//!    target becomes its own chunk.
//! 5. Whatever remains in the buffer is emitted as a final chunk.
//!
//! Chunk indices are renumbered globally across all units at the end.
//!
//! # Example
//!
//! ```rust
//! use chainlens_core::chunk::{chunk_units, ChunkingParams};
//! use chainlens_core::models::RawContentUnit;
//!
//! let units = vec![RawContentUnit::new("Bridges move tokens.").with_heading("Intro")];
//! let chunks = chunk_units(&units, &ChunkingParams::default());
//! assert_eq!(chunks.len(), 1);
//! assert_eq!(chunks[0].heading.as_deref(), Some("Intro"));
//! ```

use crate::models::{Chunk, RawContentUnit};

/// Approximate characters-per-token ratio.
const CHARS_PER_TOKEN: usize = 4;

/// Extra characters scanned past the cut limit when looking for a
/// sentence end.
const SENTENCE_LOOKAHEAD_CHARS: usize = 100;

/// Size parameters for [`chunk_units`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingParams {
    pub target_tokens: usize,
    pub overlap_tokens: usize,
    pub code_block_max_tokens: usize,
    /// How far past the target a buffer may grow to keep a code block
    /// with the prose before it.
    pub code_flush_slack_tokens: usize,
}

impl Default for ChunkingParams {
    fn default() -> Self {
        Self {
            target_tokens: 512,
            overlap_tokens: 50,
            code_block_max_tokens: 800,
            code_flush_slack_tokens: 100,
        }
    }
}

/// Estimated token count of `text`: `ceil(chars / 4)`.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(CHARS_PER_TOKEN)
}

fn estimate_joined(a: &str, b: &str) -> usize {
    (a.chars().count() + b.chars().count()).div_ceil(CHARS_PER_TOKEN)
}

/// Chunk every unit and renumber the result `0..N-1`.
///
/// Deterministic: the same units and params always give the same chunks.
/// Units with blank content produce nothing.
pub fn chunk_units(units: &[RawContentUnit], params: &ChunkingParams) -> Vec<Chunk> {
    let mut all = Vec::new();
    for unit in units {
        all.extend(UnitChunker::new(unit, params).run());
    }
    for (i, chunk) in all.iter_mut().enumerate() {
        chunk.chunk_index = i as i64;
    }
    all
}

enum Segment<'a> {
    Prose(&'a str),
    Code(&'a str),
}

/// Split text into prose runs and complete fenced code blocks.
///
/// An unterminated fence is treated as prose.
fn segments(text: &str) -> Vec<Segment<'_>> {
    let mut out = Vec::new();
    let mut rest = text;
    while let Some(open) = rest.find("```") {
        let Some(close) = rest[open + 3..].find("```") else {
            break;
        };
        let end = open + 3 + close + 3;
        if open > 0 {
            out.push(Segment::Prose(&rest[..open]));
        }
        out.push(Segment::Code(&rest[open..end]));
        rest = &rest[end..];
    }
    if !rest.is_empty() {
        out.push(Segment::Prose(rest));
    }
    out
}

struct UnitChunker<'a> {
    unit: &'a RawContentUnit,
    params: &'a ChunkingParams,
    out: Vec<Chunk>,
    buffer: String,
    /// False when the buffer holds only overlap carried from an emitted chunk.
    fresh: bool,
    /// Byte offset just past the last code block in the buffer.
    code_end: Option<usize>,
}

impl<'a> UnitChunker<'a> {
    fn new(unit: &'a RawContentUnit, params: &'a ChunkingParams) -> Self {
        Self {
            unit,
            params,
            out: Vec::new(),
            buffer: String::new(),
            fresh: false,
            code_end: None,
        }
    }

    fn run(mut self) -> Vec<Chunk> {
        for segment in segments(&self.unit.content) {
            match segment {
                Segment::Prose(text) => self.push_prose(text),
                Segment::Code(code) => self.push_code(code),
            }
        }
        if self.fresh {
            let rest = std::mem::take(&mut self.buffer);
            self.emit(&rest);
        }
        self.out
    }

    fn overlap_chars(&self) -> usize {
        self.params.overlap_tokens * CHARS_PER_TOKEN
    }

    fn emit(&mut self, text: &str) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        self.out.push(Chunk {
            content: text.to_string(),
            heading: self.unit.heading.clone(),
            url: self.unit.url.clone(),
            file_path: self.unit.file_path.clone(),
            chunk_index: self.out.len() as i64,
            token_count: estimate_tokens(text) as i64,
        });
    }

    /// Emit the buffer and keep its tail as the seed of the next chunk.
    fn flush_with_overlap(&mut self) {
        let whole = std::mem::take(&mut self.buffer);
        let after_code = match self.code_end.take() {
            Some(end) => &whole[end..],
            None => whole.as_str(),
        };
        let seed = tail_chars(after_code.trim(), self.overlap_chars())
            .trim_start()
            .to_string();
        if self.fresh {
            self.emit(&whole);
        }
        self.buffer = seed;
        self.fresh = false;
    }

    fn push_prose(&mut self, text: &str) {
        if text.trim().is_empty() {
            self.buffer.push_str(text);
            return;
        }
        if self.code_end.is_some()
            && estimate_joined(&self.buffer, text) > self.params.target_tokens
        {
            self.flush_with_overlap();
        }
        self.buffer.push_str(text);
        self.fresh = true;

        let max_chars = self.params.target_tokens * CHARS_PER_TOKEN;
        while estimate_tokens(&self.buffer) > self.params.target_tokens {
            let (head, rest) = split_at_boundary(&self.buffer, max_chars);
            if head.is_empty() {
                break;
            }
            let head = head.to_string();
            let rest = rest.to_string();
            let overlap = tail_chars(&head, self.overlap_chars()).trim_start().to_string();
            let next = if rest.is_empty() {
                overlap
            } else {
                format!("{} {}", overlap, rest)
            };
            self.emit(&head);
            let stalled = next.len() >= self.buffer.len();
            self.buffer = next;
            self.fresh = !rest.is_empty();
            if stalled {
                break;
            }
        }
    }

    fn push_code(&mut self, code: &str) {
        let target = self.params.target_tokens;

        if estimate_tokens(code) <= self.params.code_block_max_tokens {
            if estimate_joined(&self.buffer, code) > target + self.params.code_flush_slack_tokens {
                self.flush_with_overlap();
            }
            self.buffer.push('\n');
            self.buffer.push_str(code);
            self.buffer.push('\n');
            self.fresh = true;
            self.code_end = Some(self.buffer.len());

            // Emit an oversized buffer whole so the prose splitter never
            // cuts through the block.
            if estimate_tokens(&self.buffer) > target {
                let whole = std::mem::take(&mut self.buffer);
                self.emit(&whole);
                self.fresh = false;
                self.code_end = None;
            }
            return;
        }

        self.flush_with_overlap();
        self.buffer.clear();
        self.fresh = false;

        let mut piece = String::new();
        for line in code.split('\n') {
            if !piece.trim().is_empty() && estimate_joined(&piece, line) > target {
                let done = std::mem::take(&mut piece);
                self.emit(&done);
            }
            piece.push_str(line);
            piece.push('\n');
        }
        if !piece.trim().is_empty() {
            self.buffer = piece;
            self.fresh = true;
            self.code_end = Some(self.buffer.len());
        }
    }
}

/// Byte offset of the `n`th character, or `text.len()` if shorter.
fn byte_offset(text: &str, n: usize) -> usize {
    text.char_indices()
        .nth(n)
        .map(|(i, _)| i)
        .unwrap_or(text.len())
}

fn ceil_boundary(text: &str, mut i: usize) -> usize {
    if i >= text.len() {
        return text.len();
    }
    while !text.is_char_boundary(i) {
        i += 1;
    }
    i
}

/// The last `n` characters of `text`.
fn tail_chars(text: &str, n: usize) -> &str {
    let count = text.chars().count();
    if count <= n {
        return text;
    }
    &text[byte_offset(text, count - n)..]
}

/// Cut `text` at most `max_chars` in, preferring sentence, then line,
/// then word boundaries. Both halves are trimmed.
fn split_at_boundary(text: &str, max_chars: usize) -> (&str, &str) {
    let limit = byte_offset(text, max_chars);
    if limit >= text.len() {
        return (text.trim(), "");
    }
    let cut = |at: usize| (text[..at].trim(), text[at..].trim());
    let half = limit / 2;

    let region_end = byte_offset(text, max_chars + SENTENCE_LOOKAHEAD_CHARS);
    let scan_end = (limit + 2).min(region_end);
    let last_sentence_end = text.as_bytes()[..scan_end]
        .windows(2)
        .enumerate()
        .filter(|(_, w)| matches!(w[0], b'.' | b'!' | b'?') && w[1].is_ascii_whitespace())
        .map(|(i, _)| i + 1)
        .last();
    if let Some(end) = last_sentence_end {
        if end > half {
            return cut(end);
        }
    }

    let window = &text[..ceil_boundary(text, limit + 1)];
    if let Some(lb) = window.rfind('\n') {
        if lb > half {
            return cut(lb);
        }
    }
    if let Some(sp) = window.rfind(' ') {
        if sp * 10 > limit * 3 {
            return cut(sp);
        }
    }
    cut(limit)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prose(sentences: usize) -> String {
        (0..sentences)
            .map(|i| {
                format!(
                    "Sentence number {} explains how the relayer routes messages between chains. ",
                    i
                )
            })
            .collect()
    }

    fn solidity_block(lines: usize) -> String {
        let mut code = String::from("```solidity\n");
        for i in 0..lines {
            code.push_str(&format!("    balances[msg.sender] += amounts[{}];\n", i));
        }
        code.push_str("```");
        code
    }

    fn params() -> ChunkingParams {
        ChunkingParams::default()
    }

    #[test]
    fn blank_units_produce_nothing() {
        let units = vec![RawContentUnit::new(""), RawContentUnit::new("   \n\n  ")];
        assert!(chunk_units(&units, &params()).is_empty());
    }

    #[test]
    fn short_unit_is_single_chunk_with_metadata() {
        let units = vec![RawContentUnit::new("  Short note about fees.  ")
            .with_heading("Guides > Fees")
            .with_url("https://docs.example.com/fees")];
        let chunks = chunk_units(&units, &params());
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content, "Short note about fees.");
        assert_eq!(chunks[0].heading.as_deref(), Some("Guides > Fees"));
        assert_eq!(chunks[0].url.as_deref(), Some("https://docs.example.com/fees"));
        assert_eq!(chunks[0].file_path, None);
        assert_eq!(chunks[0].token_count, 6);
        assert_eq!(chunks[0].chunk_index, 0);
    }

    #[test]
    fn token_estimate_rounds_up() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abc"), 1);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
        assert_eq!(estimate_tokens("éééé"), 1);
    }

    #[test]
    fn long_prose_respects_target_and_sentence_ends() {
        let units = vec![RawContentUnit::new(prose(120))];
        let chunks = chunk_units(&units, &params());
        assert!(chunks.len() > 2);
        for chunk in &chunks {
            assert!(chunk.token_count <= 512, "chunk too large: {}", chunk.token_count);
        }
        for chunk in &chunks[..chunks.len() - 1] {
            assert!(chunk.content.ends_with('.'), "not cut at a sentence: {:?}", &chunk.content);
        }
    }

    #[test]
    fn consecutive_prose_chunks_overlap() {
        let units = vec![RawContentUnit::new(prose(120))];
        let chunks = chunk_units(&units, &params());
        for pair in chunks.windows(2) {
            let tail = tail_chars(&pair[0].content, 200).trim_start();
            assert!(
                pair[1].content.starts_with(tail),
                "chunk does not begin with the previous tail"
            );
        }
    }

    #[test]
    fn indices_are_global_and_contiguous() {
        let units = vec![
            RawContentUnit::new(prose(60)).with_heading("A"),
            RawContentUnit::new("Tiny.").with_heading("B"),
            RawContentUnit::new(prose(60)).with_file_path("docs/c.md"),
        ];
        let chunks = chunk_units(&units, &params());
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.chunk_index, i as i64);
        }
        assert!(chunks.iter().any(|c| c.heading.as_deref() == Some("B") && c.content == "Tiny."));
        assert_eq!(
            chunks.last().and_then(|c| c.file_path.as_deref()),
            Some("docs/c.md")
        );
    }

    #[test]
    fn moderate_code_block_stays_whole() {
        let code = solidity_block(30);
        assert!(estimate_tokens(&code) > 250 && estimate_tokens(&code) <= 800);
        let text = format!("{}\n{}\n{}", prose(20), code, prose(20));
        let chunks = chunk_units(&[RawContentUnit::new(text)], &params());
        assert!(
            chunks.iter().any(|c| c.content.contains(&code)),
            "code block was split"
        );
    }

    #[test]
    fn code_block_larger_than_target_but_under_max_stays_whole() {
        let code = solidity_block(60);
        let tokens = estimate_tokens(&code);
        assert!(tokens > 512 && tokens <= 800);
        let text = format!("{}\n{}\n{}", prose(10), code, prose(10));
        let chunks = chunk_units(&[RawContentUnit::new(text)], &params());
        assert!(chunks.iter().any(|c| c.content.contains(&code)));
    }

    #[test]
    fn buffered_code_block_survives_trailing_prose() {
        let mut code = String::from("```solidity\n");
        for i in 0..14 {
            code.push_str(&format!("    // Step {} settles the pending position.\n", i));
        }
        code.push_str("```");
        let trailing = "liquidity ".repeat(200);
        let text = format!("{}\n{}\n{}", prose(13), code, trailing);
        assert!(estimate_tokens(&format!("{}\n{}", prose(13), code)) <= 512);

        let chunks = chunk_units(&[RawContentUnit::new(text)], &params());
        assert!(chunks.len() >= 2);
        assert!(
            chunks.iter().any(|c| c.content.contains(&code)),
            "code block was split"
        );
        for chunk in &chunks {
            assert_eq!(chunk.content.matches("```").count() % 2, 0, "dangling fence");
        }
        assert!(chunks.last().is_some_and(|c| c.content.ends_with("liquidity")));
    }

    #[test]
    fn oversized_code_block_splits_on_lines() {
        let code = solidity_block(150);
        assert!(estimate_tokens(&code) > 800);
        let chunks = chunk_units(&[RawContentUnit::new(code.clone())], &params());
        assert!(chunks.len() >= 3);
        for chunk in &chunks {
            assert!(chunk.token_count <= 512);
        }
        for i in [0, 75, 149] {
            let line = format!("balances[msg.sender] += amounts[{}];", i);
            assert!(chunks.iter().any(|c| c.content.contains(&line)));
        }
    }

    #[test]
    fn single_long_code_line_is_its_own_chunk() {
        let long_line = "x".repeat(3000);
        let code = format!("```\n{}\n{}\n```", "a".repeat(2000), long_line);
        let chunks = chunk_units(&[RawContentUnit::new(code)], &params());
        assert!(chunks.iter().any(|c| c.content == long_line));
    }

    #[test]
    fn unterminated_fence_is_prose() {
        let text = "Intro.\n```rust\nfn main() {}";
        let chunks = chunk_units(&[RawContentUnit::new(text)], &params());
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content, text);
    }

    #[test]
    fn hard_split_without_boundaries() {
        let text = "z".repeat(5000);
        let chunks = chunk_units(&[RawContentUnit::new(text)], &params());
        assert!(chunks.len() >= 3);
        assert_eq!(chunks[0].content.len(), 2048);
    }

    #[test]
    fn multibyte_text_never_panics() {
        let text = "Überweisung über die Brücke, schnell und günstig! ".repeat(200);
        let chunks = chunk_units(&[RawContentUnit::new(text)], &params());
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.token_count <= 512);
        }
    }

    #[test]
    fn deterministic() {
        let units = vec![RawContentUnit::new(format!("{}{}", prose(50), solidity_block(40)))];
        assert_eq!(chunk_units(&units, &params()), chunk_units(&units, &params()));
    }
}
