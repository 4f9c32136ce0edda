//! Paragraph-boundary text chunker with overlap.
//!
//! Splits extracted document text into segments sized for the embedding
//! model's input limit. Splitting happens on blank-line boundaries so each
//! chunk keeps whole paragraphs; a paragraph is never split, even when it
//! alone exceeds `max_tokens`. Each chunk after the first is seeded with a
//! suffix of the previous chunk so context spanning a boundary survives
//! retrieval.
//!
//! Token counts are approximated as `ceil(bytes / 4)`. All size decisions
//! use this approximation consistently; nothing here runs a real tokenizer.

/// Approximate bytes-per-token ratio.
const CHARS_PER_TOKEN: usize = 4;

/// Rough token estimate for sizing decisions.
pub fn estimate_token_count(text: &str) -> usize {
    text.len().div_ceil(CHARS_PER_TOKEN)
}

/// How a chunk was formed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkKind {
    /// Built by accumulating paragraphs up to the token budget.
    ParagraphBased,
    /// The whole text emitted as one chunk.
    Single,
}

impl ChunkKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkKind::ParagraphBased => "paragraph_based",
            ChunkKind::Single => "single",
        }
    }
}

/// A segment of source text, pre-embedding.
///
/// `start_index`/`end_index` are best-effort byte offsets into the source
/// text. Once overlap text is spliced into a chunk the offsets no longer
/// reconstruct the original exactly; they exist for traceability only.
#[derive(Debug, Clone)]
pub struct TextChunk {
    pub content: String,
    pub start_index: usize,
    pub end_index: usize,
    pub kind: ChunkKind,
}

/// Split text into overlapping chunks on paragraph boundaries.
///
/// Paragraphs are greedily accumulated until adding the next one would
/// exceed `max_tokens`; the running chunk is then emitted and the next one
/// starts with an `overlap_tokens`-sized tail of it. If nothing was emitted
/// (e.g. the whole text fits in one chunk and has no paragraphs), the
/// trimmed text is returned as a single chunk. Degenerate input (empty or
/// whitespace-only) is the caller's problem; it yields one empty chunk.
pub fn chunk_text(text: &str, max_tokens: usize, overlap_tokens: usize) -> Vec<TextChunk> {
    let mut chunks: Vec<TextChunk> = Vec::new();
    let mut current = String::new();
    let mut current_start = 0usize;

    for (offset, para) in split_paragraphs(text) {
        let would_be = estimate_token_count(&current) + estimate_token_count(para);

        if would_be > max_tokens && !current.is_empty() {
            chunks.push(TextChunk {
                content: current.trim().to_string(),
                start_index: current_start,
                end_index: current_start + current.len(),
                kind: ChunkKind::ParagraphBased,
            });

            // Seed the next chunk with the tail of the one just closed. The
            // start offset is walked back past the spliced-in overlap text,
            // which makes it approximate from here on.
            let overlap = overlap_tail(&current, overlap_tokens);
            current_start = offset.saturating_sub(overlap.len() + 2);
            current.clear();
            if !overlap.is_empty() {
                current.push_str(&overlap);
                current.push_str("\n\n");
            }
            current.push_str(para);
        } else if current.is_empty() {
            current.push_str(para);
            current_start = offset;
        } else {
            current.push_str("\n\n");
            current.push_str(para);
        }
    }

    if !current.trim().is_empty() {
        chunks.push(TextChunk {
            content: current.trim().to_string(),
            start_index: current_start,
            end_index: current_start + current.len(),
            kind: ChunkKind::ParagraphBased,
        });
    }

    if chunks.is_empty() {
        chunks.push(TextChunk {
            content: text.trim().to_string(),
            start_index: 0,
            end_index: text.len(),
            kind: ChunkKind::Single,
        });
    }

    chunks
}

/// Paragraphs are maximal runs of non-blank lines; a blank line is any line
/// that is empty after trimming. Returns `(byte_offset, trimmed_text)` pairs,
/// skipping paragraphs that trim to nothing.
fn split_paragraphs(text: &str) -> Vec<(usize, &str)> {
    let mut out = Vec::new();
    let mut para_start: Option<usize> = None;
    let mut para_end = 0usize;
    let mut pos = 0usize;

    for line in text.split_inclusive('\n') {
        if line.trim().is_empty() {
            if let Some(start) = para_start.take() {
                push_paragraph(&mut out, text, start, para_end);
            }
        } else {
            if para_start.is_none() {
                para_start = Some(pos);
            }
            para_end = pos + line.len();
        }
        pos += line.len();
    }
    if let Some(start) = para_start {
        push_paragraph(&mut out, text, start, para_end);
    }

    out
}

fn push_paragraph<'a>(out: &mut Vec<(usize, &'a str)>, text: &'a str, start: usize, end: usize) {
    let raw = &text[start..end];
    let trimmed = raw.trim();
    if !trimmed.is_empty() {
        let offset = start + (raw.len() - raw.trim_start().len());
        out.push((offset, trimmed));
    }
}

/// Tail of `text` sized to roughly `overlap_tokens`, preferring to start
/// just after a sentence boundary when one falls within half the overlap
/// window before the hard cut.
fn overlap_tail(text: &str, overlap_tokens: usize) -> String {
    let overlap_chars = overlap_tokens * CHARS_PER_TOKEN;
    if overlap_chars == 0 {
        return String::new();
    }
    if text.len() <= overlap_chars {
        return text.trim().to_string();
    }

    let hard_cut = floor_char_boundary(text, text.len() - overlap_chars);
    if let Some(dot) = text[..hard_cut].rfind('.') {
        if dot + overlap_chars / 2 > hard_cut {
            return text[dot + 1..].trim().to_string();
        }
    }
    text[hard_cut..].trim().to_string()
}

fn floor_char_boundary(s: &str, mut i: usize) -> usize {
    if i >= s.len() {
        return s.len();
    }
    while !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}
