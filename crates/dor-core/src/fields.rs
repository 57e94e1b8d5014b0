use crate::config::Config;
use crate::error::{DorError, Result};
use crate::normalize::NormalizedTicket;
use crate::types::DorField;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::OnceLock;
use tracing::debug;

/// Longest heading text (before any colon) still treated as a heading.
const MAX_HEADING_LEN: usize = 40;

// ---------------------------------------------------------------------------
// Resolution output
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldSource {
    /// A tracker-specific field id such as `customfield_10500`.
    Vendor,
    /// A human-named field whose key matched one of the field's aliases.
    Generic,
    /// A section of the description under a matching heading.
    Section,
    /// A persona sentence found in the description body.
    NarrativeSentence,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedField {
    pub field: DorField,
    pub value: String,
    pub source: FieldSource,
    /// Field key or heading the value came from.
    pub origin: String,
    /// Lower-priority sources that also held a usable value.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub alternates: usize,
}

fn is_zero(n: &usize) -> bool {
    *n == 0
}

/// Every field that resolved to a non-placeholder value.
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    fields: BTreeMap<DorField, ResolvedField>,
}

impl Resolution {
    pub fn get(&self, field: DorField) -> Option<&ResolvedField> {
        self.fields.get(&field)
    }

    pub fn value(&self, field: DorField) -> Option<&str> {
        self.fields.get(&field).map(|r| r.value.as_str())
    }

    pub fn is_present(&self, field: DorField) -> bool {
        self.fields.contains_key(&field)
    }
}

// ---------------------------------------------------------------------------
// Key and heading normalization
// ---------------------------------------------------------------------------

/// Lowercase word tokens: `"Acceptance_Criteria (AC)"` → `["acceptance", "criteria", "ac"]`.
pub fn key_tokens(s: &str) -> Vec<String> {
    s.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

fn starts_with_tokens(haystack: &[String], needle: &[String]) -> bool {
    !needle.is_empty() && haystack.len() >= needle.len() && haystack[..needle.len()] == *needle
}

fn contains_tokens(haystack: &[String], needle: &[String]) -> bool {
    !needle.is_empty() && haystack.windows(needle.len()).any(|w| w == needle)
}

fn heading_marker_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(?:#{1,6}\s*|h[1-6]\.\s*)").unwrap())
}

/// A description line that may open a section.
struct HeadingLine {
    tokens: Vec<String>,
    /// Started with `#` or `h2.`.
    marked: bool,
    has_colon: bool,
    /// Text after the colon on the same line.
    rest: Option<String>,
}

fn parse_heading(line: &str) -> Option<HeadingLine> {
    let trimmed = line.trim();
    if trimmed.starts_with("- ") || trimmed.starts_with("* ") || trimmed.starts_with("• ") {
        return None;
    }
    let marked = heading_marker_re().is_match(trimmed);
    let unmarked = heading_marker_re().replace(trimmed, "");
    let cleaned = unmarked.trim_matches(|c: char| c == '*' || c == '_' || c.is_whitespace());

    let (head, rest) = match cleaned.split_once(':') {
        Some((head, rest)) => {
            let rest = rest.trim_matches(|c: char| c == '*' || c == '_' || c.is_whitespace());
            (head, (!rest.is_empty()).then(|| rest.to_string()))
        }
        None => (cleaned, None),
    };
    let head = head.trim_matches(|c: char| c == '*' || c == '_' || c.is_whitespace());
    if head.is_empty() || head.chars().count() > MAX_HEADING_LEN {
        return None;
    }
    Some(HeadingLine {
        tokens: key_tokens(head),
        marked,
        has_colon: cleaned.contains(':'),
        rest,
    })
}

// ---------------------------------------------------------------------------
// FieldResolver
// ---------------------------------------------------------------------------

struct FieldTable {
    field: DorField,
    vendor_ids: Vec<String>,
    aliases: Vec<Vec<String>>,
}

/// Resolves DoR field values from a normalized ticket. Built once from the
/// configuration; holds no per-ticket state.
pub struct FieldResolver {
    tables: Vec<FieldTable>,
    /// Heading phrase tokens → field, longest phrase first.
    headings: Vec<(Vec<String>, DorField)>,
    placeholder: Option<Regex>,
}

impl FieldResolver {
    pub fn new(config: &Config) -> Result<Self> {
        let mut tables = Vec::new();
        let mut headings = Vec::new();
        for &field in DorField::all() {
            let src = config.sources_for(field);
            for h in &src.headings {
                let tokens = key_tokens(h);
                if !tokens.is_empty() {
                    headings.push((tokens, field));
                }
            }
            tables.push(FieldTable {
                field,
                vendor_ids: src.vendor_ids,
                aliases: src
                    .aliases
                    .iter()
                    .map(|a| key_tokens(a))
                    .filter(|t| !t.is_empty())
                    .collect(),
            });
        }
        // Longest phrase wins: "story points" must beat "story"
        headings.sort_by(|a, b| b.0.len().cmp(&a.0.len()));

        Ok(Self {
            tables,
            headings,
            placeholder: placeholder_regex(&config.placeholders)?,
        })
    }

    /// True when `value` is empty or made only of placeholder vocabulary.
    /// A literal "none" is never a placeholder.
    pub fn is_placeholder(&self, value: &str) -> bool {
        let t = value.trim();
        if is_explicit_none(t) {
            return false;
        }
        if !t.chars().any(char::is_alphanumeric) {
            return true;
        }
        self.placeholder.as_ref().is_some_and(|re| re.is_match(t))
    }

    pub fn resolve(&self, ticket: &NormalizedTicket) -> Resolution {
        let sections = self.scan_sections(&ticket.body);
        let mut fields = BTreeMap::new();
        for table in &self.tables {
            if let Some(resolved) = self.resolve_field(table, ticket, &sections) {
                fields.insert(table.field, resolved);
            }
        }
        Resolution { fields }
    }

    fn resolve_field(
        &self,
        table: &FieldTable,
        ticket: &NormalizedTicket,
        sections: &[Section],
    ) -> Option<ResolvedField> {
        let mut candidates: Vec<(FieldSource, &str, &str)> = Vec::new();

        // 1. Vendor field ids, declared priority order
        for id in &table.vendor_ids {
            if let Some(v) = ticket.fields.get(id) {
                candidates.push((FieldSource::Vendor, id.as_str(), v.as_str()));
            }
        }

        // 2. Generic keys: exact alias first, then multi-word containment
        let (exact, rest): (Vec<_>, Vec<_>) = ticket
            .fields
            .iter()
            .filter(|(k, _)| !table.vendor_ids.contains(*k))
            .map(|(k, v)| (k.as_str(), v.as_str(), key_tokens(k)))
            .partition(|(_, _, tokens)| table.aliases.iter().any(|a| a == tokens));
        for (key, value, _) in &exact {
            candidates.push((FieldSource::Generic, *key, *value));
        }
        for (key, value, tokens) in &rest {
            let contained = table
                .aliases
                .iter()
                .any(|a| a.len() > 1 && contains_tokens(tokens, a));
            if contained {
                candidates.push((FieldSource::Generic, *key, *value));
            }
        }

        // 3. Description sections
        for s in sections.iter().filter(|s| s.field == table.field) {
            candidates.push((FieldSource::Section, s.heading.as_str(), s.text.as_str()));
        }

        // 3b. Persona sentence for the narrative
        let sentence = if table.field == DorField::UserStory {
            narrative_sentence(&ticket.body)
        } else {
            None
        };
        if let Some(line) = &sentence {
            candidates.push((FieldSource::NarrativeSentence, "description", line.as_str()));
        }

        let mut usable = candidates
            .into_iter()
            .filter(|(_, _, value)| !self.is_placeholder(value));
        let (source, origin, value) = usable.next()?;
        let alternates = usable.count();
        if alternates > 0 {
            debug!(
                ticket = %ticket.id,
                field = %table.field,
                chosen = origin,
                alternates,
                "multiple sources hold a value; using highest priority"
            );
        }
        Some(ResolvedField {
            field: table.field,
            value: value.trim().to_string(),
            source,
            origin: origin.to_string(),
            alternates,
        })
    }

    // -----------------------------------------------------------------------
    // Section scan
    // -----------------------------------------------------------------------

    fn heading_field(&self, h: &HeadingLine) -> Option<DorField> {
        self.headings
            .iter()
            .find(|(phrase, _)| {
                if h.marked || h.has_colon {
                    starts_with_tokens(&h.tokens, phrase)
                } else {
                    h.tokens == *phrase
                }
            })
            .map(|(_, field)| *field)
    }

    fn scan_sections(&self, body: &str) -> Vec<Section> {
        let mut sections: Vec<Section> = Vec::new();
        let mut open: Option<Section> = None;

        for line in body.lines() {
            let heading = parse_heading(line);
            let field = heading.as_ref().and_then(|h| self.heading_field(h));
            let is_boundary = field.is_some() || heading.as_ref().is_some_and(|h| h.marked);

            if !is_boundary {
                if let Some(s) = open.as_mut() {
                    s.push_line(line.trim());
                }
                continue;
            }

            if let Some(done) = open.take() {
                sections.push(done);
            }
            if let (Some(field), Some(h)) = (field, heading) {
                let mut s = Section {
                    field,
                    heading: line.trim().to_string(),
                    text: String::new(),
                };
                if let Some(rest) = h.rest {
                    s.push_line(&rest);
                }
                open = Some(s);
            }
        }
        if let Some(done) = open {
            sections.push(done);
        }
        sections.retain(|s| !s.text.is_empty());
        sections
    }
}

struct Section {
    field: DorField,
    heading: String,
    text: String,
}

impl Section {
    fn push_line(&mut self, line: &str) {
        if line.is_empty() {
            return;
        }
        if !self.text.is_empty() {
            self.text.push('\n');
        }
        self.text.push_str(line);
    }
}

// ---------------------------------------------------------------------------
// Placeholders and narrative sentences
// ---------------------------------------------------------------------------

pub fn is_explicit_none(value: &str) -> bool {
    value
        .trim()
        .trim_end_matches(['.', '!'])
        .eq_ignore_ascii_case("none")
}

fn placeholder_regex(vocabulary: &[String]) -> Result<Option<Regex>> {
    let mut terms: Vec<String> = vocabulary
        .iter()
        .map(|p| p.trim().to_lowercase())
        .filter(|p| !p.is_empty() && p != "none")
        .collect();
    if terms.is_empty() {
        return Ok(None);
    }
    terms.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
    terms.dedup();
    let alt = terms
        .iter()
        .map(|t| regex::escape(t))
        .collect::<Vec<_>>()
        .join("|");
    let sep = r"[\s\p{P}\p{S}]";
    let pattern = format!(r"(?i)^{sep}*(?:{alt})(?:{sep}+(?:{alt}))*{sep}*$");
    Regex::new(&pattern)
        .map(Some)
        .map_err(|source| DorError::InvalidPattern { pattern, source })
}

fn persona_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\bas an?\s+\w+.*\bi\s+(?:want|need|would like)\b").unwrap())
}

/// First description line phrased as a user story.
pub fn narrative_sentence(body: &str) -> Option<String> {
    body.lines()
        .map(|l| l.trim().trim_start_matches("- "))
        .find(|l| persona_re().is_match(l))
        .map(str::to_string)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::normalize;
    use crate::ticket::Ticket;
    use serde_json::json;

    fn resolver() -> FieldResolver {
        FieldResolver::new(&Config::default()).unwrap()
    }

    fn resolve(value: serde_json::Value) -> Resolution {
        let ticket: Ticket = serde_json::from_value(value).unwrap();
        resolver().resolve(&normalize(&ticket).unwrap())
    }

    // -----------------------------------------------------------------------
    // Placeholders
    // -----------------------------------------------------------------------

    #[test]
    fn placeholder_vocabulary() {
        let r = resolver();
        for v in ["", "   ", "TBD", "n/a", "N/A.", "tbd - pending", "To be determined", "?", "--"] {
            assert!(r.is_placeholder(v), "expected placeholder: {v:?}");
        }
        for v in ["none", "None.", "NONE", "Pending review by legal", "tbdx", "Checkout"] {
            assert!(!r.is_placeholder(v), "expected substantive: {v:?}");
        }
    }

    #[test]
    fn none_survives_even_if_configured_as_placeholder() {
        let mut cfg = Config::default();
        cfg.placeholders.push("none".to_string());
        let r = FieldResolver::new(&cfg).unwrap();
        assert!(!r.is_placeholder("none"));
    }

    #[test]
    fn empty_vocabulary_still_rejects_blank() {
        let cfg = Config {
            placeholders: vec![],
            ..Config::default()
        };
        let r = FieldResolver::new(&cfg).unwrap();
        assert!(r.is_placeholder(" "));
        assert!(!r.is_placeholder("tbd"));
    }

    // -----------------------------------------------------------------------
    // Source priority
    // -----------------------------------------------------------------------

    #[test]
    fn vendor_field_beats_generic_and_section() {
        let res = resolve(json!({
            "id": "S-1",
            "description": "Acceptance Criteria:\nfrom the body",
            "fields": {
                "Acceptance Criteria": "from generic",
                "customfield_10035": "second vendor",
                "customfield_10500": "first vendor"
            }
        }));
        let ac = res.get(DorField::AcceptanceCriteria).unwrap();
        assert_eq!(ac.value, "first vendor");
        assert_eq!(ac.source, FieldSource::Vendor);
        assert_eq!(ac.alternates, 3);
    }

    #[test]
    fn placeholder_vendor_value_falls_through() {
        let res = resolve(json!({
            "id": "S-1",
            "fields": { "customfield_10500": "TBD", "acceptance_criteria": "Total updates" }
        }));
        let ac = res.get(DorField::AcceptanceCriteria).unwrap();
        assert_eq!(ac.value, "Total updates");
        assert_eq!(ac.source, FieldSource::Generic);
        assert_eq!(ac.origin, "acceptance_criteria");
    }

    #[test]
    fn malformed_vendor_value_falls_through() {
        let res = resolve(json!({
            "id": "S-1",
            "fields": { "customfield_10001": { "weird": [1, 2] }, "Squad": "Checkout Squad" }
        }));
        assert_eq!(res.value(DorField::Team), Some("Checkout Squad"));
    }

    #[test]
    fn generic_keys_match_fuzzily() {
        let res = resolve(json!({
            "id": "S-1",
            "fields": {
                "Story Points": 5,
                "User Story (Narrative)": "As a shopper I want x so that y",
                "a11y": "Focus order follows layout"
            }
        }));
        assert_eq!(res.value(DorField::SizeEstimate), Some("5"));
        assert!(res.is_present(DorField::UserStory));
        assert!(res.is_present(DorField::AccessibilityCriteria));
    }

    #[test]
    fn single_word_alias_needs_exact_key() {
        let res = resolve(json!({
            "id": "S-1",
            "fields": { "Team Lead": "Dana", "Brand Guidelines Link": "https://example.com" }
        }));
        assert!(!res.is_present(DorField::Team));
        assert!(!res.is_present(DorField::Brand));
    }

    #[test]
    fn explicit_none_is_present() {
        let res = resolve(json!({
            "id": "S-1",
            "fields": { "Architecture": "None", "Accessibility Criteria": "n/a" }
        }));
        assert_eq!(res.value(DorField::Architecture), Some("None"));
        assert!(!res.is_present(DorField::AccessibilityCriteria));
    }

    // -----------------------------------------------------------------------
    // Section scan
    // -----------------------------------------------------------------------

    #[test]
    fn sections_capture_until_next_heading() {
        let res = resolve(json!({
            "id": "S-1",
            "description": "# Acceptance Criteria\n- Total updates\n- Code is validated\n## Design\nsee figma\nTesting steps:\n1. Apply code\nStory points: 3"
        }));
        assert_eq!(
            res.value(DorField::AcceptanceCriteria),
            Some("- Total updates\n- Code is validated")
        );
        assert_eq!(res.value(DorField::TestingSteps), Some("1. Apply code"));
        assert_eq!(res.value(DorField::SizeEstimate), Some("3"));
        assert!(!res.is_present(DorField::UserStory), "story points is not a story");
    }

    #[test]
    fn inline_colon_sections() {
        let res = resolve(json!({
            "id": "S-1",
            "description": "Team: Checkout Squad\nBrand: Acme\n**Environment:** staging"
        }));
        assert_eq!(res.value(DorField::Team), Some("Checkout Squad"));
        assert_eq!(res.value(DorField::Brand), Some("Acme"));
        assert_eq!(res.value(DorField::Environment), Some("staging"));
    }

    #[test]
    fn sentences_are_not_headings() {
        let res = resolve(json!({
            "id": "S-1",
            "description": "Team members can see the banner on every page of the site"
        }));
        assert!(!res.is_present(DorField::Team));
    }

    #[test]
    fn placeholder_section_is_absent() {
        let res = resolve(json!({
            "id": "S-1",
            "description": "Architecture:\nTBD\nAccessibility: pending"
        }));
        assert!(!res.is_present(DorField::Architecture));
        assert!(!res.is_present(DorField::AccessibilityCriteria));
    }

    #[test]
    fn narrative_sentence_fallback() {
        let res = resolve(json!({
            "id": "S-1",
            "description": "Context first.\nAs a returning shopper, I want saved cards so that checkout is faster."
        }));
        let story = res.get(DorField::UserStory).unwrap();
        assert_eq!(story.source, FieldSource::NarrativeSentence);
        assert!(story.value.starts_with("As a returning shopper"));
    }

    #[test]
    fn markup_headings_become_sections() {
        let res = resolve(json!({
            "id": "S-1",
            "rendered_description": "<h3>Accessibility</h3><p>Announce errors to screen readers</p><h3>Notes</h3><p>misc</p>"
        }));
        assert_eq!(
            res.value(DorField::AccessibilityCriteria),
            Some("Announce errors to screen readers")
        );
    }
}
