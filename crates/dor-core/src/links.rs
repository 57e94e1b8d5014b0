//! Design-link extraction.
//!
//! Figma references are collected from every place a ticket can carry one,
//! in a fixed priority order:
//!
//! 1. link marks and smart cards in structured documents
//! 2. inline anchors: HTML `<a href>` and markdown `[text](url)`
//! 3. reference-style links: `[text][ref]` with `[ref]: url`
//! 4. wiki-style links: `[text|url]`
//! 5. bare URLs
//!
//! Each hit is unwrapped from redirect wrappers, parsed into file and node
//! ids, and deduplicated by its normalized URL. The first sighting keeps its
//! anchor text and section.

use crate::fields::key_tokens;
use crate::normalize::{document_text, NormalizedTicket, SourceDoc, MAX_DOC_DEPTH};
use crate::ticket::NodeRef;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::OnceLock;
use tracing::debug;

const DESIGN_KINDS: &[&str] = &["file", "design", "proto", "board", "slides"];
const REDIRECT_PARAMS: &[&str] = &["url", "u", "q", "target", "link"];
const NODE_PARAMS: &[&str] = &["node-id", "starting-point-node-id"];
const MAX_UNWRAP: usize = 3;

// ---------------------------------------------------------------------------
// Output types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LinkSection {
    #[serde(rename = "Acceptance Criteria")]
    AcceptanceCriteria,
    #[serde(rename = "Test Scenarios")]
    TestScenarios,
    #[serde(rename = "User Story")]
    UserStory,
    #[serde(rename = "Accessibility")]
    Accessibility,
    #[serde(rename = "Description")]
    Description,
}

impl LinkSection {
    pub fn as_str(self) -> &'static str {
        match self {
            LinkSection::AcceptanceCriteria => "Acceptance Criteria",
            LinkSection::TestScenarios => "Test Scenarios",
            LinkSection::UserStory => "User Story",
            LinkSection::Accessibility => "Accessibility",
            LinkSection::Description => "Description",
        }
    }

    /// Section named by a heading. Whole words are matched, so "Latest
    /// designs" is not a test heading. Unrecognised headings are `Description`.
    pub fn from_heading(heading: &str) -> LinkSection {
        let words = key_tokens(heading);
        SECTION_WORDS
            .iter()
            .find(|(_, keywords)| words.iter().any(|w| keywords.contains(&w.as_str())))
            .map_or(LinkSection::Description, |(section, _)| *section)
    }
}

/// Checked in order; the first section with a matching word wins.
const SECTION_WORDS: &[(LinkSection, &[&str])] = &[
    (LinkSection::AcceptanceCriteria, &["acceptance", "ac"]),
    (
        LinkSection::TestScenarios,
        &["test", "tests", "testing", "scenario", "scenarios", "qa"],
    ),
    (LinkSection::Accessibility, &["accessibility", "accessible", "a11y"]),
    (LinkSection::UserStory, &["story", "stories", "narrative"]),
];

impl fmt::Display for LinkSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which markup convention produced the link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkOrigin {
    Annotation,
    Anchor,
    Reference,
    Wiki,
    Bare,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesignLink {
    /// `https://www.figma.com/{kind}/{file_id}[?node-id=...]`
    pub url: String,
    pub file_id: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub node_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anchor_text: Option<String>,
    pub section: LinkSection,
    pub origin: LinkOrigin,
}

// ---------------------------------------------------------------------------
// URL parsing
// ---------------------------------------------------------------------------

/// Decode `%XX` escapes (and `+` when `plus_as_space`). Invalid escapes are
/// kept literally; invalid UTF-8 is replaced.
pub fn percent_decode(s: &str, plus_as_space: bool) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'%' if i + 2 < bytes.len() => {
                let hex = std::str::from_utf8(&bytes[i + 1..i + 3])
                    .ok()
                    .and_then(|h| u8::from_str_radix(h, 16).ok());
                match hex {
                    Some(b) => {
                        out.push(b);
                        i += 3;
                    }
                    None => {
                        out.push(b'%');
                        i += 1;
                    }
                }
            }
            b'+' if plus_as_space => {
                out.push(b' ');
                i += 1;
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

struct UrlParts<'a> {
    host: String,
    path: &'a str,
    query: &'a str,
}

fn split_url(url: &str) -> Option<UrlParts<'_>> {
    let rest = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .or_else(|| url.strip_prefix("HTTPS://"))
        .or_else(|| url.strip_prefix("HTTP://"))?;
    let rest = rest.split('#').next().unwrap_or("");
    let host_end = rest.find(['/', '?']).unwrap_or(rest.len());
    let authority = &rest[..host_end];
    let host = authority
        .rsplit('@')
        .next()
        .unwrap_or("")
        .split(':')
        .next()
        .unwrap_or("")
        .to_ascii_lowercase();
    let after = &rest[host_end..];
    let (path, query) = after.split_once('?').unwrap_or((after, ""));
    Some(UrlParts { host, path, query })
}

fn query_pairs(query: &str) -> impl Iterator<Item = (String, String)> + '_ {
    query
        .split('&')
        .filter(|p| !p.is_empty())
        .map(|p| match p.split_once('=') {
            Some((k, v)) => (percent_decode(k, true), percent_decode(v, true)),
            None => (percent_decode(p, true), String::new()),
        })
}

fn is_figma_host(host: &str) -> bool {
    host == "figma.com" || host.ends_with(".figma.com")
}

/// A parsed design URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedDesignUrl {
    pub url: String,
    pub file_id: String,
    pub node_ids: Vec<String>,
}

/// Unwrap redirect wrappers around `href` until a Figma URL remains.
fn unwrap_redirects(href: &str) -> Option<String> {
    let mut current = href.trim().replace("&amp;", "&");
    for _ in 0..=MAX_UNWRAP {
        let parts = split_url(&current)?;
        if is_figma_host(&parts.host) {
            return Some(current);
        }
        let target = query_pairs(parts.query)
            .find(|(k, v)| {
                REDIRECT_PARAMS.contains(&k.to_ascii_lowercase().as_str())
                    && v.to_ascii_lowercase().contains("figma.com")
            })
            .map(|(_, v)| v)?;
        current = target.trim().to_string();
    }
    None
}

/// Parse a design-tool URL. `None` for non-design URLs and for design URLs
/// that carry no file id.
pub fn parse_design_url(href: &str) -> Option<ParsedDesignUrl> {
    let target = unwrap_redirects(href)?;
    let parts = split_url(&target)?;

    let segments: Vec<&str> = parts.path.split('/').filter(|s| !s.is_empty()).collect();
    let Some(kind_idx) = segments.iter().position(|s| DESIGN_KINDS.contains(s)) else {
        debug!(url = %target, "design link without a file path, dropping");
        return None;
    };
    let kind = segments[kind_idx];
    let file_id = segments
        .get(kind_idx + 1)
        .map(|s| percent_decode(s, false))
        .filter(|id| !id.is_empty() && id.chars().all(|c| c.is_ascii_alphanumeric()));
    let Some(file_id) = file_id else {
        debug!(url = %target, "design link without a valid file id, dropping");
        return None;
    };

    let mut node_ids: Vec<String> = Vec::new();
    for (key, value) in query_pairs(parts.query) {
        if !NODE_PARAMS.contains(&key.as_str()) {
            continue;
        }
        for raw in value.split(',') {
            let id = normalize_node_id(raw.trim());
            if !id.is_empty() && !node_ids.contains(&id) {
                node_ids.push(id);
            }
        }
    }

    let mut url = format!("https://www.figma.com/{kind}/{file_id}");
    if !node_ids.is_empty() {
        url.push_str("?node-id=");
        url.push_str(&node_ids.join(","));
    }
    Some(ParsedDesignUrl {
        url,
        file_id,
        node_ids,
    })
}

/// `12-34` is the URL form of node `12:34`.
fn normalize_node_id(raw: &str) -> String {
    match raw.split_once('-') {
        Some((a, b))
            if !a.is_empty()
                && !b.is_empty()
                && a.chars().all(|c| c.is_ascii_digit())
                && b.chars().all(|c| c.is_ascii_digit()) =>
        {
            format!("{a}:{b}")
        }
        _ => raw.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Patterns
// ---------------------------------------------------------------------------

struct LinkPatterns {
    html_anchor: Regex,
    md_inline: Regex,
    ref_definition: Regex,
    ref_usage: Regex,
    wiki: Regex,
    bare: Regex,
    html_heading: Regex,
    any_tag: Regex,
}

fn patterns() -> &'static LinkPatterns {
    static PATTERNS: OnceLock<LinkPatterns> = OnceLock::new();
    PATTERNS.get_or_init(|| LinkPatterns {
        html_anchor: Regex::new(
            r#"(?is)<a\s[^>]*?href\s*=\s*["']([^"']+)["'][^>]*>(.*?)</a\s*>"#,
        )
        .unwrap(),
        md_inline: Regex::new(r"\[([^\]\[]*)\]\(\s*<?(https?://[^\s)>]+)>?\s*\)").unwrap(),
        ref_definition: Regex::new(r"(?m)^[ \t]*\[([^\]]+)\]:[ \t]*<?(https?://[^\s>]+)>?").unwrap(),
        ref_usage: Regex::new(r"\[([^\]\[]+)\]\[([^\]\[]*)\]").unwrap(),
        wiki: Regex::new(r"\[([^\]\[|]+)\|(https?://[^\]\s|]+)\]").unwrap(),
        bare: Regex::new(r#"(?i)https?://[^\s<>"'\]\[)(|]+"#).unwrap(),
        html_heading: Regex::new(r"(?is)<h[1-6]\b[^>]*>(.*?)</h[1-6]\s*>").unwrap(),
        any_tag: Regex::new(r"<[^>]*>").unwrap(),
    })
}

// ---------------------------------------------------------------------------
// Section lookup
// ---------------------------------------------------------------------------

fn is_heading_line(line: &str) -> Option<&str> {
    let t = line.trim();
    if t.is_empty() {
        return None;
    }
    if let Some(rest) = t.strip_prefix('#') {
        return Some(rest.trim_start_matches('#').trim());
    }
    let lower = t.as_bytes();
    if lower.len() > 3 && lower[0] == b'h' && lower[1].is_ascii_digit() && lower[2] == b'.' {
        return Some(t[3..].trim());
    }
    if t.ends_with(':') && t.chars().count() <= 60 {
        return Some(t.trim_end_matches(':').trim_matches('*').trim());
    }
    if t.len() > 4 && t.starts_with("**") && t.ends_with("**") {
        return Some(t.trim_matches('*').trim());
    }
    None
}

/// Nearest heading above byte offset `pos` in a plain-text source.
fn text_section_before(text: &str, pos: usize) -> Option<LinkSection> {
    let before = &text[..pos];
    // The line holding the link counts only up to the link itself
    let mut lines = before.rsplit('\n');
    let current = lines.next().unwrap_or("");
    if let Some((head, _)) = current.split_once(':') {
        if head.trim().chars().count() <= 40 {
            let section = LinkSection::from_heading(head);
            if section != LinkSection::Description {
                return Some(section);
            }
        }
    }
    lines
        .find_map(is_heading_line)
        .map(LinkSection::from_heading)
}

/// Nearest `<hN>` above byte offset `pos` in markup.
fn markup_section_before(html: &str, pos: usize) -> Option<LinkSection> {
    let p = patterns();
    p.html_heading
        .captures_iter(html)
        .take_while(|c| c.get(0).is_some_and(|m| m.end() <= pos))
        .last()
        .map(|c| LinkSection::from_heading(&p.any_tag.replace_all(&c[1], "")))
}

// ---------------------------------------------------------------------------
// Extraction
// ---------------------------------------------------------------------------

struct RawLink {
    href: String,
    anchor: Option<String>,
    section: LinkSection,
    origin: LinkOrigin,
}

struct TextSource {
    text: String,
    is_markup: bool,
    /// Section when no heading precedes the link (field values name their own).
    fallback: LinkSection,
}

impl TextSource {
    fn section_at(&self, pos: usize) -> LinkSection {
        let found = if self.is_markup {
            markup_section_before(&self.text, pos)
        } else {
            text_section_before(&self.text, pos)
        };
        found.unwrap_or(self.fallback)
    }
}

fn clean_anchor(text: &str) -> Option<String> {
    let stripped = patterns().any_tag.replace_all(text, "");
    let t = stripped.split_whitespace().collect::<Vec<_>>().join(" ");
    (!t.is_empty()).then_some(t)
}

fn trim_bare(url: &str) -> &str {
    url.trim_end_matches(['.', ',', ';', ':', '!', '?', '*', '_'])
}

/// Link marks and smart cards in a document tree, in document order.
fn scan_document(root: NodeRef<'_>, fallback: LinkSection, out: &mut Vec<RawLink>) {
    let mut section = fallback;
    let mut stack = vec![(root, 0usize)];
    while let Some((node, depth)) = stack.pop() {
        if depth > MAX_DOC_DEPTH {
            continue;
        }
        if node.heading_level().is_some() {
            section = LinkSection::from_heading(&document_text(node));
        }
        for href in node.link_hrefs() {
            out.push(RawLink {
                href: href.to_string(),
                anchor: node.text().and_then(clean_anchor),
                section,
                origin: LinkOrigin::Annotation,
            });
        }
        if matches!(node.kind(), "inlineCard" | "blockCard" | "embedCard") {
            if let Some(url) = node.attr_str("url") {
                out.push(RawLink {
                    href: url.to_string(),
                    anchor: None,
                    section,
                    origin: LinkOrigin::Annotation,
                });
            }
        }
        for child in node.children().rev() {
            stack.push((child, depth + 1));
        }
    }
}

fn doc_fallback(doc: &SourceDoc) -> LinkSection {
    doc.field
        .as_deref()
        .map_or(LinkSection::Description, LinkSection::from_heading)
}

fn text_sources(ticket: &NormalizedTicket) -> Vec<TextSource> {
    let mut sources = Vec::new();
    if let Some(markup) = &ticket.markup {
        sources.push(TextSource {
            text: markup.clone(),
            is_markup: true,
            fallback: LinkSection::Description,
        });
    }
    if let Some(plain) = &ticket.plain {
        sources.push(TextSource {
            text: plain.clone(),
            is_markup: false,
            fallback: LinkSection::Description,
        });
    }
    for doc in &ticket.documents {
        sources.push(TextSource {
            text: document_text(doc.doc.node()),
            is_markup: false,
            fallback: doc_fallback(doc),
        });
    }
    for (key, value) in &ticket.fields {
        sources.push(TextSource {
            text: value.clone(),
            is_markup: false,
            fallback: LinkSection::from_heading(key),
        });
    }
    sources
}

fn collect_raw(ticket: &NormalizedTicket) -> Vec<RawLink> {
    let p = patterns();
    let mut raw = Vec::new();

    for doc in &ticket.documents {
        scan_document(doc.doc.node(), doc_fallback(doc), &mut raw);
    }

    let sources = text_sources(ticket);

    for src in &sources {
        for c in p.html_anchor.captures_iter(&src.text) {
            let pos = c.get(0).map_or(0, |m| m.start());
            raw.push(RawLink {
                href: c[1].to_string(),
                anchor: clean_anchor(&c[2]),
                section: src.section_at(pos),
                origin: LinkOrigin::Anchor,
            });
        }
        for c in p.md_inline.captures_iter(&src.text) {
            let pos = c.get(0).map_or(0, |m| m.start());
            raw.push(RawLink {
                href: c[2].to_string(),
                anchor: clean_anchor(&c[1]),
                section: src.section_at(pos),
                origin: LinkOrigin::Anchor,
            });
        }
    }

    for src in &sources {
        let definitions: Vec<(String, String)> = p
            .ref_definition
            .captures_iter(&src.text)
            .map(|c| (c[1].trim().to_lowercase(), c[2].to_string()))
            .collect();
        if definitions.is_empty() {
            continue;
        }
        for c in p.ref_usage.captures_iter(&src.text) {
            let label = if c[2].trim().is_empty() { &c[1] } else { &c[2] };
            let label = label.trim().to_lowercase();
            if let Some((_, href)) = definitions.iter().find(|(l, _)| *l == label) {
                let pos = c.get(0).map_or(0, |m| m.start());
                raw.push(RawLink {
                    href: href.clone(),
                    anchor: clean_anchor(&c[1]),
                    section: src.section_at(pos),
                    origin: LinkOrigin::Reference,
                });
            }
        }
    }

    for src in &sources {
        for c in p.wiki.captures_iter(&src.text) {
            let pos = c.get(0).map_or(0, |m| m.start());
            raw.push(RawLink {
                href: c[2].to_string(),
                anchor: clean_anchor(&c[1]),
                section: src.section_at(pos),
                origin: LinkOrigin::Wiki,
            });
        }
    }

    for src in &sources {
        for m in p.bare.find_iter(&src.text) {
            raw.push(RawLink {
                href: trim_bare(m.as_str()).to_string(),
                anchor: None,
                section: src.section_at(m.start()),
                origin: LinkOrigin::Bare,
            });
        }
    }

    raw
}

/// All design links in the ticket, deduplicated by normalized URL in
/// first-seen order.
pub fn extract_design_links(ticket: &NormalizedTicket) -> Vec<DesignLink> {
    let mut seen = HashSet::new();
    let mut links = Vec::new();
    for raw in collect_raw(ticket) {
        let Some(parsed) = parse_design_url(&raw.href) else {
            continue;
        };
        if !seen.insert(parsed.url.clone()) {
            continue;
        }
        links.push(DesignLink {
            url: parsed.url,
            file_id: parsed.file_id,
            node_ids: parsed.node_ids,
            anchor_text: raw.anchor,
            section: raw.section,
            origin: raw.origin,
        });
    }
    links
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
