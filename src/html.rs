//! HTML content extraction and link discovery.
//!
//! Pure functions over page markup, used by the web extractor:
//! - [`extract_units`] picks the main content region, skips chrome
//!   (navigation, footers, sidebars, scripts) and segments the remainder
//!   by `h1`–`h4` into breadcrumb-keyed units.
//! - [`extract_links`] collects absolute, fragment- and query-free links.
//! - [`looks_client_rendered`] estimates whether a page needs a browser.

use chainlens_core::models::RawContentUnit;
use scraper::node::Node;
use scraper::{ElementRef, Html, Selector};
use std::sync::LazyLock;
use url::Url;

use crate::outline::Outline;

/// Content regions in priority order. The first one holding more than
/// [`MIN_REGION_CHARS`] of text wins; otherwise `<body>` is used.
const CONTENT_SELECTORS: &[&str] = &[
    "main",
    "article",
    ".content",
    ".docs-content",
    ".prose",
    ".markdown-body",
    "[role=\"main\"]",
    "#content",
    ".documentation",
    "#main-content",
    ".page-content",
    ".doc-content",
    ".rst-content",
    ".md-content",
    "[data-content]",
];

const SKIP_SELECTORS: &[&str] = &[
    "nav",
    "footer",
    "header",
    ".sidebar",
    ".toc",
    ".table-of-contents",
    ".breadcrumb",
    ".pagination",
    ".cookie-banner",
    ".edit-on-github",
    ".social-share",
    "script",
    "style",
    "noscript",
    "iframe",
    ".nav-links",
    ".edit-page-link",
    ".github-edit-link",
    ".page-edit",
];

const MIN_REGION_CHARS: usize = 50;
/// Pages without headings must carry more text than this to be kept.
const MIN_PAGE_CHARS: usize = 20;
/// Below this much content text, other signals may mark a page as client-rendered.
const RENDER_CONTENT_THRESHOLD: usize = 200;
const RENDER_SCRIPT_THRESHOLD: usize = 5;

const BLOCK_ELEMENTS: &[&str] = &[
    "p", "div", "section", "li", "ul", "ol", "table", "tr", "blockquote", "dl", "dt", "dd",
    "br", "hr", "h5", "h6", "figure", "figcaption", "details", "summary",
];

fn compile(list: &[&str]) -> Vec<Selector> {
    list.iter().filter_map(|s| Selector::parse(s).ok()).collect()
}

static CONTENT: LazyLock<Vec<Selector>> = LazyLock::new(|| compile(CONTENT_SELECTORS));
static SKIP: LazyLock<Vec<Selector>> = LazyLock::new(|| compile(SKIP_SELECTORS));
static BODY: LazyLock<Vec<Selector>> = LazyLock::new(|| compile(&["body"]));
static TITLE: LazyLock<Vec<Selector>> = LazyLock::new(|| compile(&["title"]));
static ANCHOR: LazyLock<Vec<Selector>> = LazyLock::new(|| compile(&["a[href]"]));
static APP_ROOT: LazyLock<Vec<Selector>> =
    LazyLock::new(|| compile(&["#app", "#root", "#__next", "#__nuxt"]));
static NOSCRIPT: LazyLock<Vec<Selector>> = LazyLock::new(|| compile(&["noscript"]));
static EXTERNAL_SCRIPT: LazyLock<Vec<Selector>> = LazyLock::new(|| compile(&["script[src]"]));

fn first<'a>(doc: &'a Html, selectors: &[Selector]) -> Option<ElementRef<'a>> {
    selectors.iter().find_map(|s| doc.select(s).next())
}

fn is_skipped(el: &ElementRef) -> bool {
    SKIP.iter().any(|s| s.matches(el))
}

fn heading_level(name: &str) -> Option<u8> {
    match name {
        "h1" => Some(1),
        "h2" => Some(2),
        "h3" => Some(3),
        "h4" => Some(4),
        _ => None,
    }
}

/// Visible text of an element, ignoring skipped regions, whitespace-collapsed.
fn visible_text(el: ElementRef) -> String {
    let mut parts = Vec::new();
    collect_text(el, &mut parts);
    parts.join(" ")
}

fn collect_text(el: ElementRef, parts: &mut Vec<String>) {
    for child in el.children() {
        match child.value() {
            Node::Text(text) => {
                let collapsed = collapse_whitespace(text);
                if !collapsed.is_empty() {
                    parts.push(collapsed);
                }
            }
            Node::Element(_) => {
                if let Some(child_el) = ElementRef::wrap(child) {
                    if !is_skipped(&child_el) {
                        collect_text(child_el, parts);
                    }
                }
            }
            _ => {}
        }
    }
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Raw text of a `<pre>` block, whitespace preserved.
fn preformatted_text(el: ElementRef) -> String {
    el.text().collect::<String>()
}

fn content_root(doc: &Html) -> Option<ElementRef<'_>> {
    for selector in CONTENT.iter() {
        if let Some(el) = doc.select(selector).next() {
            if visible_text(el).chars().count() > MIN_REGION_CHARS {
                return Some(el);
            }
        }
    }
    first(doc, &BODY)
}

fn page_title(doc: &Html) -> Option<String> {
    first(doc, &TITLE)
        .map(|t| collapse_whitespace(&t.text().collect::<String>()))
        .filter(|t| !t.is_empty())
}

/// Walks the content tree in document order, feeding the outline.
fn walk(el: ElementRef, outline: &mut Outline) {
    for child in el.children() {
        match child.value() {
            Node::Text(text) => {
                let collapsed = collapse_whitespace(text);
                if collapsed.is_empty() {
                    continue;
                }
                let needs_space = outline
                    .body()
                    .chars()
                    .last()
                    .is_some_and(|c| !c.is_whitespace());
                if needs_space {
                    outline.push_str(" ");
                }
                outline.push_str(&collapsed);
            }
            Node::Element(element) => {
                let Some(child_el) = ElementRef::wrap(child) else {
                    continue;
                };
                if is_skipped(&child_el) {
                    continue;
                }
                let name = element.name();
                if let Some(level) = heading_level(name) {
                    outline.heading(level, &visible_text(child_el));
                } else if name == "pre" {
                    outline.push_str("\n```\n");
                    outline.push_str(preformatted_text(child_el).trim_end_matches('\n'));
                    outline.push_str("\n```\n");
                } else if BLOCK_ELEMENTS.contains(&name) {
                    outline.push_str("\n");
                    walk(child_el, outline);
                    outline.push_str("\n");
                } else {
                    walk(child_el, outline);
                }
            }
            _ => {}
        }
    }
}

/// Segment a page into content units tagged with `page_url`.
pub fn extract_units(html: &str, page_url: &str) -> Vec<RawContentUnit> {
    let doc = Html::parse_document(html);
    let Some(root) = content_root(&doc) else {
        return Vec::new();
    };
    let mut outline = Outline::new(page_title(&doc), MIN_PAGE_CHARS).with_url(page_url);
    walk(root, &mut outline);
    outline.finish()
}

/// Absolute links found on the page, normalized and de-duplicated in
/// document order. In-page anchors, `javascript:` and `mailto:` links and
/// non-HTTP schemes are dropped.
pub fn extract_links(html: &str, page_url: &str) -> Vec<String> {
    let Ok(base) = Url::parse(page_url) else {
        return Vec::new();
    };
    let doc = Html::parse_document(html);
    let mut links: Vec<String> = Vec::new();

    for selector in ANCHOR.iter() {
        for a in doc.select(selector) {
            let Some(href) = a.value().attr("href").map(str::trim) else {
                continue;
            };
            if href.is_empty()
                || href.starts_with('#')
                || href.starts_with("javascript:")
                || href.starts_with("mailto:")
            {
                continue;
            }
            let Ok(absolute) = base.join(href) else {
                continue;
            };
            if absolute.scheme() != "http" && absolute.scheme() != "https" {
                continue;
            }
            let clean = normalize_url(absolute);
            if !links.contains(&clean) {
                links.push(clean);
            }
        }
    }
    links
}

/// Drop fragment and query.
pub fn normalize_url(mut url: Url) -> String {
    url.set_fragment(None);
    url.set_query(None);
    url.to_string()
}

/// Normalize a URL string, leaving unparsable input unchanged.
pub fn normalize_url_str(url: &str) -> String {
    match Url::parse(url) {
        Ok(parsed) => normalize_url(parsed),
        Err(_) => url.to_string(),
    }
}

/// Same host as the crawl root, and passes the path-substring filters.
pub fn should_follow(link: &str, root: &Url, include: &[String], exclude: &[String]) -> bool {
    let Ok(parsed) = Url::parse(link) else {
        return false;
    };
    if parsed.host_str() != root.host_str() {
        return false;
    }
    let path = parsed.path();
    if exclude.iter().any(|p| path.contains(p.as_str())) {
        return false;
    }
    include.is_empty() || include.iter().any(|p| path.contains(p.as_str()))
}

/// Heuristic for client-rendered pages: little server-rendered content
/// plus an SPA mount point, a `<noscript>` JavaScript warning, or many
/// external scripts. Misses are accepted; such pages index with whatever
/// the static markup holds.
pub fn looks_client_rendered(html: &str) -> bool {
    let doc = Html::parse_document(html);

    let content_len = CONTENT
        .iter()
        .find_map(|s| doc.select(s).next())
        .or_else(|| first(&doc, &BODY))
        .map(|el| visible_text(el).chars().count())
        .unwrap_or(0);
    if content_len >= RENDER_CONTENT_THRESHOLD {
        return false;
    }

    let has_app_root = first(&doc, &APP_ROOT).is_some();
    let has_noscript_warning = NOSCRIPT.iter().any(|s| {
        doc.select(s).any(|n| {
            n.text()
                .collect::<String>()
                .to_lowercase()
                .contains("javascript")
        })
    });
    let external_scripts: usize = EXTERNAL_SCRIPT.iter().map(|s| doc.select(s).count()).sum();

    has_app_root || has_noscript_warning || external_scripts > RENDER_SCRIPT_THRESHOLD
}
