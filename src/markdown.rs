//! Markdown segmentation for repository files.
//!
//! ATX headings `#` through `####` open breadcrumb spans; deeper headings
//! and `#` lines inside fenced code blocks stay in the body. Text before
//! the first heading is labelled with the file path.

use chainlens_core::models::RawContentUnit;
use regex::Regex;
use std::sync::LazyLock;

use crate::outline::Outline;

static HEADING: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(#{1,4})\s+(.+?)\s*#*\s*$").unwrap());
static FENCE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\s{0,3}(```|~~~)").unwrap());

pub fn segment_markdown(content: &str, file_path: &str) -> Vec<RawContentUnit> {
    let mut outline = Outline::new(Some(file_path.to_string()), 0).with_file_path(file_path);
    let mut fence: Option<&str> = None;

    for line in content.lines() {
        if let Some(m) = FENCE.captures(line) {
            let marker = m.get(1).map_or("```", |g| g.as_str());
            fence = match fence {
                None => Some(marker),
                Some(open) if open == marker => None,
                other => other,
            };
        } else if fence.is_none() {
            if let Some(caps) = HEADING.captures(line) {
                let level = caps[1].len() as u8;
                outline.heading(level, &caps[2]);
                continue;
            }
        }
        outline.push_str(line);
        outline.push_str("\n");
    }

    outline.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_headings_with_breadcrumbs() {
        let md = "# Vault\nOverview text.\n## Deposit\nCall deposit.\n## Withdraw ##\nCall withdraw.\n";
        let units = segment_markdown(md, "docs/vault.md");
        let pairs: Vec<_> = units
            .iter()
            .map(|u| (u.heading.clone().unwrap(), u.content.clone()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("Vault".to_string(), "Overview text.".to_string()),
                ("Vault > Deposit".to_string(), "Call deposit.".to_string()),
                ("Vault > Withdraw".to_string(), "Call withdraw.".to_string()),
            ]
        );
        assert!(units.iter().all(|u| u.file_path.as_deref() == Some("docs/vault.md")));
    }

    #[test]
    fn preamble_uses_file_path() {
        let units = segment_markdown("Some intro\n# Title\nbody\n", "README.md");
        assert_eq!(units[0].heading.as_deref(), Some("README.md"));
        assert_eq!(units[0].content, "Some intro");
    }

    #[test]
    fn hashes_inside_code_fences_are_not_headings() {
        let md = "# Setup\n```bash\n# install deps\nnpm i\n```\nDone.\n";
        let units = segment_markdown(md, "a.md");
        assert_eq!(units.len(), 1);
        assert!(units[0].content.contains("# install deps"));
        assert!(units[0].content.starts_with("```bash"));
    }

    #[test]
    fn deep_headings_stay_in_body() {
        let units = segment_markdown("# A\n##### tiny\ntext\n", "a.md");
        assert_eq!(units.len(), 1);
        assert!(units[0].content.contains("##### tiny"));
    }
}
