//! Structural extraction from Solidity sources.
//!
//! A set of small matchers, each tested on its own:
//! - [`pragma_version`] / [`is_supported_pragma`]: compiler pin, `>= 0.8` accepted.
//! - [`spdx_license`], [`contracts`]: file header facts.
//! - [`members`]: `function` / `modifier` / `event` / `error` declarations.
//! - [`declaration_end`]: end of a declaration, braces balanced by depth
//!   counting with strings and comments skipped.
//! - [`preceding_natspec`] / [`parse_natspec`]: the doc comment directly
//!   above a declaration and its `@tag` sections.
//!
//! Known limitations: declarations are recognized only at the start of a
//! line, and a pragma range such as `>=0.6.0 <0.9.0` that never names
//! `0.8` is judged by its first version.

use chainlens_core::models::RawContentUnit;
use regex::Regex;
use std::sync::LazyLock;

static PRAGMA: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"pragma\s+solidity\s+([^;]+);").unwrap());
static VERSION: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d+)\.(\d+)").unwrap());
static SPDX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"//\s*SPDX-License-Identifier:\s*(.+)").unwrap());
static CONTRACT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*(?:abstract\s+contract|contract|interface|library)\s+(\w+)").unwrap()
});
static MEMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^[ \t]*(function|modifier|event|error)\s+(\w+)").unwrap());
static NATSPEC_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^@(\w+)\s*(.*)$").unwrap());

/// Prefix kept by the no-declaration fallback unit.
const FALLBACK_PREFIX_CHARS: usize = 2000;

pub fn pragma_version(source: &str) -> Option<&str> {
    PRAGMA
        .captures(source)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim())
}

/// Files pinned below 0.8 are rejected; a missing pragma is accepted.
pub fn is_supported_pragma(source: &str) -> bool {
    let Some(version) = pragma_version(source) else {
        return true;
    };
    if version.contains("0.8") {
        return true;
    }
    match VERSION.captures(version) {
        Some(c) => {
            let major: u32 = c[1].parse().unwrap_or(0);
            let minor: u32 = c[2].parse().unwrap_or(0);
            major > 0 || minor >= 8
        }
        None => true,
    }
}

pub fn spdx_license(source: &str) -> Option<&str> {
    SPDX.captures(source)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim())
}

/// Contract-like declarations as `(byte offset, name)`, in file order.
pub fn contracts(source: &str) -> Vec<(usize, &str)> {
    CONTRACT
        .captures_iter(source)
        .filter_map(|c| {
            let whole = c.get(0)?;
            Some((whole.start(), c.get(1)?.as_str()))
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberKind {
    Function,
    Modifier,
    Event,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member<'a> {
    pub kind: MemberKind,
    pub name: &'a str,
    /// Offset of the declaration keyword.
    pub start: usize,
    /// Offset one past the closing `}` or `;`.
    pub end: usize,
}

/// Member declarations in file order.
pub fn members(source: &str) -> Vec<Member<'_>> {
    MEMBER
        .captures_iter(source)
        .filter_map(|c| {
            let keyword = c.get(1)?;
            let kind = match keyword.as_str() {
                "function" => MemberKind::Function,
                "modifier" => MemberKind::Modifier,
                "event" => MemberKind::Event,
                _ => MemberKind::Error,
            };
            let start = keyword.start();
            Some(Member {
                kind,
                name: c.get(2)?.as_str(),
                start,
                end: declaration_end(source, start),
            })
        })
        .collect()
}

/// End offset of the declaration starting at `start`: one past the first
/// top-level `;`, or past the `}` closing the first top-level `{`.
/// Unterminated declarations run to the end of the file.
pub fn declaration_end(source: &str, start: usize) -> usize {
    let bytes = source.as_bytes();
    let mut depth = 0usize;
    let mut i = start;
    while i < bytes.len() {
        match bytes[i] {
            b'/' if bytes.get(i + 1) == Some(&b'/') => {
                while i < bytes.len() && bytes[i] != b'\n' {
                    i += 1;
                }
                continue;
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                i += 2;
                while i + 1 < bytes.len() && !(bytes[i] == b'*' && bytes[i + 1] == b'/') {
                    i += 1;
                }
                i += 2;
                continue;
            }
            quote @ (b'"' | b'\'') => {
                i += 1;
                while i < bytes.len() && bytes[i] != quote {
                    if bytes[i] == b'\\' {
                        i += 1;
                    }
                    i += 1;
                }
            }
            b'{' => depth += 1,
            b'}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return i + 1;
                }
            }
            b';' if depth == 0 => return i + 1,
            _ => {}
        }
        i += 1;
    }
    bytes.len()
}

/// The doc comment immediately above `decl_start`, either a `/** */`
/// block or a run of `///` lines. Only whitespace may separate it from
/// the declaration.
pub fn preceding_natspec(source: &str, decl_start: usize) -> Option<&str> {
    let before = source[..decl_start].trim_end();

    if before.ends_with("*/") {
        let open = before.rfind("/**")?;
        let block = &before[open..];
        // `/**/` is empty, and a `*/` inside means the closing one ends a plain `/* */`.
        if block.len() < 5 || block[3..block.len() - 2].contains("*/") {
            return None;
        }
        return Some(block);
    }

    let mut start = None;
    let mut cursor = before.len();
    for line in before.split('\n').rev() {
        if !line.trim_start().starts_with("///") {
            break;
        }
        let line_start = cursor - line.len();
        start = Some(line_start);
        cursor = line_start.saturating_sub(1);
    }
    start.map(|s| before[s..].trim_start())
}

/// `@tag` sections of a doc comment, in order. Untagged leading text is a
/// `notice`; continuation lines join the preceding tag.
pub fn parse_natspec(comment: &str) -> Vec<(String, String)> {
    let mut tags: Vec<(String, String)> = Vec::new();
    for raw in comment.lines() {
        let line = raw
            .trim()
            .trim_start_matches("/**")
            .trim_end_matches("*/")
            .trim_start_matches("///")
            .trim_start_matches('*')
            .trim();
        if line.is_empty() {
            continue;
        }
        if let Some(c) = NATSPEC_TAG.captures(line) {
            tags.push((c[1].to_string(), c[2].trim().to_string()));
        } else if let Some((_, text)) = tags.last_mut() {
            if !text.is_empty() {
                text.push(' ');
            }
            text.push_str(line);
        } else {
            tags.push(("notice".to_string(), line.to_string()));
        }
    }
    tags
}

fn render_natspec(tags: &[(String, String)]) -> String {
    tags.iter()
        .map(|(tag, text)| format!("@{} {}", tag, text).trim_end().to_string())
        .collect::<Vec<_>>()
        .join("\n")
}

fn file_stem(file_path: &str) -> &str {
    let name = file_path.rsplit('/').next().unwrap_or(file_path);
    name.strip_suffix(".sol").unwrap_or(name)
}

/// Units for one Solidity file: one per member declaration, headed
/// `Contract > member`, or a single header-plus-prefix unit when no
/// member is recognized. Files pinned below 0.8 yield nothing.
pub fn extract_solidity(source: &str, file_path: &str) -> Vec<RawContentUnit> {
    if !is_supported_pragma(source) {
        tracing::debug!(file_path, "skipping pre-0.8 Solidity file");
        return Vec::new();
    }

    let declared = contracts(source);
    let mut units = Vec::new();

    for member in members(source) {
        let owner = declared
            .iter()
            .rev()
            .find(|(offset, _)| *offset < member.start)
            .map(|(_, name)| *name);
        let heading = match owner {
            Some(contract) => format!("{} > {}", contract, member.name),
            None => member.name.to_string(),
        };

        let declaration = source[member.start..member.end].trim();
        let content = match preceding_natspec(source, member.start) {
            Some(comment) => {
                let docs = render_natspec(&parse_natspec(comment));
                if docs.is_empty() {
                    declaration.to_string()
                } else {
                    format!("{}\n{}", docs, declaration)
                }
            }
            None => declaration.to_string(),
        };
        units.push(
            RawContentUnit::new(content)
                .with_heading(heading)
                .with_file_path(file_path),
        );
    }

    if units.is_empty() {
        let contract = declared
            .first()
            .map(|(_, name)| *name)
            .unwrap_or_else(|| file_stem(file_path));
        let mut header = Vec::new();
        if let Some(spdx) = spdx_license(source) {
            header.push(format!("// SPDX: {}", spdx));
        }
        if let Some(pragma) = pragma_version(source) {
            header.push(format!("// pragma: {}", pragma));
        }
        header.push(format!("// Contract: {}", contract));
        let prefix: String = source.chars().take(FALLBACK_PREFIX_CHARS).collect();
        units.push(
            RawContentUnit::new(format!("{}\n\n{}", header.join("\n"), prefix))
                .with_heading(contract)
                .with_file_path(file_path),
        );
    }

    units
}
