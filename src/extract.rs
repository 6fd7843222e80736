//! PDF text extraction and heading segmentation.
//!
//! Text comes from `pdf-extract`; segmentation is line-based:
//! - numeric lines of at most four digits are page numbers and dropped;
//! - a heading is a short all-caps line without periods that does not
//!   start with a digit, or a numbered heading such as `"12. Scope"`;
//! - each heading starts a new unit collecting the following lines.
//!
//! Text before the first heading is labelled [`DEFAULT_HEADING`].

use chainlens_core::models::RawContentUnit;
use regex::Regex;
use std::sync::LazyLock;

pub const DEFAULT_HEADING: &str = "Document";

static NUMBERED_HEADING: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d+\.\s+[A-Z]").unwrap());

#[derive(Debug)]
pub enum ExtractError {
    Pdf(String),
}

impl std::fmt::Display for ExtractError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExtractError::Pdf(e) => write!(f, "PDF extraction failed: {}", e),
        }
    }
}

impl std::error::Error for ExtractError {}

pub fn extract_pdf_text(bytes: &[u8]) -> Result<String, ExtractError> {
    pdf_extract::extract_text_from_mem(bytes).map_err(|e| ExtractError::Pdf(e.to_string()))
}

pub fn is_page_number(line: &str) -> bool {
    !line.is_empty() && line.len() <= 4 && line.bytes().all(|b| b.is_ascii_digit())
}

pub fn is_heading(line: &str) -> bool {
    let len = line.chars().count();
    let shouted = line == line.to_uppercase()
        && line.chars().any(char::is_alphabetic)
        && len > 3
        && len < 100
        && !line.contains('.')
        && !line.starts_with(|c: char| c.is_ascii_digit());
    shouted || NUMBERED_HEADING.is_match(line)
}

/// Segment extracted document text into heading-keyed units tagged with `url`.
pub fn segment_document(text: &str, url: &str) -> Vec<RawContentUnit> {
    let mut units = Vec::new();
    let mut heading = DEFAULT_HEADING.to_string();
    let mut body = String::new();

    let mut flush = |heading: &str, body: &mut String| {
        let content = body.trim();
        if !content.is_empty() {
            units.push(
                RawContentUnit::new(content)
                    .with_heading(heading)
                    .with_url(url),
            );
        }
        body.clear();
    };

    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            body.push('\n');
            continue;
        }
        if is_page_number(trimmed) {
            continue;
        }
        if is_heading(trimmed) {
            flush(&heading, &mut body);
            heading = trimmed.to_string();
        } else {
            body.push_str(trimmed);
            body.push('\n');
        }
    }
    flush(&heading, &mut body);

    units
}
