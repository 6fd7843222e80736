//! Heading-keyed segmentation shared by the HTML and Markdown extractors.
//!
//! An [`Outline`] receives a document as a stream of headings and body
//! text. Each heading closes the current span and opens a new one keyed by
//! the breadcrumb of open headings (`"Guide > Install > Linux"`); a
//! heading pops every open heading at the same or a deeper level first.

use chainlens_core::models::RawContentUnit;
use regex::Regex;
use std::sync::LazyLock;

pub const BREADCRUMB_SEPARATOR: &str = " > ";

pub struct Outline {
    open: Vec<(u8, String)>,
    body: String,
    seen_heading: bool,
    preamble_heading: Option<String>,
    min_preamble_chars: usize,
    url: Option<String>,
    file_path: Option<String>,
    units: Vec<RawContentUnit>,
}

impl Outline {
    /// `preamble_heading` labels text appearing before the first heading,
    /// which is kept only when longer than `min_preamble_chars`.
    pub fn new(preamble_heading: Option<String>, min_preamble_chars: usize) -> Self {
        Self {
            open: Vec::new(),
            body: String::new(),
            seen_heading: false,
            preamble_heading,
            min_preamble_chars,
            url: None,
            file_path: None,
            units: Vec::new(),
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_file_path(mut self, path: impl Into<String>) -> Self {
        self.file_path = Some(path.into());
        self
    }

    pub fn heading(&mut self, level: u8, text: &str) {
        self.flush();
        self.seen_heading = true;
        while self.open.last().is_some_and(|(l, _)| *l >= level) {
            self.open.pop();
        }
        self.open.push((level, text.trim().to_string()));
    }

    pub fn push_str(&mut self, text: &str) {
        self.body.push_str(text);
    }

    /// Current body text, used by callers deciding on separators.
    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn finish(mut self) -> Vec<RawContentUnit> {
        self.flush();
        self.units
    }

    fn flush(&mut self) {
        let content = tidy(&self.body);
        self.body.clear();
        if content.is_empty() {
            return;
        }

        let heading = if self.seen_heading {
            Some(
                self.open
                    .iter()
                    .map(|(_, t)| t.as_str())
                    .collect::<Vec<_>>()
                    .join(BREADCRUMB_SEPARATOR),
            )
        } else {
            if content.chars().count() <= self.min_preamble_chars {
                return;
            }
            self.preamble_heading.clone()
        };

        let mut unit = RawContentUnit::new(content);
        unit.heading = heading.filter(|h| !h.is_empty());
        unit.url = self.url.clone();
        unit.file_path = self.file_path.clone();
        self.units.push(unit);
    }
}

static BLANK_RUN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n[ \t]*(\n[ \t]*)+\n").unwrap());

/// Trim the span and squeeze runs of blank lines down to one.
fn tidy(text: &str) -> String {
    BLANK_RUN.replace_all(text.trim(), "\n\n").into_owned()
}
