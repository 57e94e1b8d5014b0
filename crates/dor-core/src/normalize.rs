use crate::error::{DorError, Result};
use crate::ticket::{Description, DocNode, FieldValue, NodeRef, Ticket};
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::OnceLock;
use tracing::debug;

/// Document nodes nested deeper than this are skipped.
pub const MAX_DOC_DEPTH: usize = 64;

// ---------------------------------------------------------------------------
// NormalizedTicket
// ---------------------------------------------------------------------------

/// A ticket reduced to flat text. Built once per analysis and never mutated.
#[derive(Debug, Clone)]
pub struct NormalizedTicket {
    pub id: String,
    pub title: String,
    pub category: Option<String>,
    pub status: Option<String>,
    /// Field key → text, for every field that yields usable text.
    pub fields: BTreeMap<String, String>,
    /// The description as plain text, one block per line.
    pub body: String,
    /// Structured documents kept for link scanning: the description tree
    /// first, then document-valued fields in key order.
    pub documents: Vec<SourceDoc>,
    /// Raw pre-rendered markup, if any.
    pub markup: Option<String>,
    /// Raw plain-string description, if any.
    pub plain: Option<String>,
}

/// A structured document and the field key it came from. `field` is `None`
/// for the description.
#[derive(Debug, Clone)]
pub struct SourceDoc {
    pub field: Option<String>,
    pub doc: DocNode,
}

impl NormalizedTicket {
    /// Title, body and field values joined, for keyword scans.
    pub fn full_text(&self) -> String {
        let mut text = String::with_capacity(self.title.len() + self.body.len() + 64);
        text.push_str(&self.title);
        text.push('\n');
        text.push_str(&self.body);
        for value in self.fields.values() {
            text.push('\n');
            text.push_str(value);
        }
        text
    }
}

pub fn normalize(ticket: &Ticket) -> Result<NormalizedTicket> {
    let (id, title) = ticket.identity().ok_or(DorError::MissingIdentity)?;

    let mut documents = Vec::new();
    let mut description_doc = None;
    let mut plain = None;
    if let Some(description) = &ticket.description {
        match description {
            Description::Document(doc) => {
                description_doc = Some(doc.node());
                documents.push(SourceDoc {
                    field: None,
                    doc: doc.clone(),
                });
            }
            Description::Text(s) => plain = Some(s.clone()),
            Description::Other(_) => debug!(ticket = %id, "description has an unsupported shape"),
        }
    }

    let markup = ticket
        .rendered_description
        .as_ref()
        .filter(|m| !m.trim().is_empty())
        .cloned();

    // Priority: rendered markup > document tree > plain string
    let body = markup
        .as_deref()
        .map(strip_markup)
        .filter(|s| !s.is_empty())
        .or_else(|| {
            description_doc
                .map(document_text)
                .filter(|s| !s.is_empty())
        })
        .or_else(|| plain.as_deref().map(tidy))
        .unwrap_or_default();

    let mut fields = BTreeMap::new();
    for (key, value) in &ticket.fields {
        for doc in nested_documents(value) {
            documents.push(SourceDoc {
                field: Some(key.clone()),
                doc: doc.clone(),
            });
        }
        match field_text(value) {
            Some(text) => {
                fields.insert(key.clone(), text);
            }
            None => debug!(ticket = %id, field = %key, "field has no usable text"),
        }
    }

    Ok(NormalizedTicket {
        id,
        title,
        category: ticket.category_text(),
        status: ticket.status_text(),
        fields,
        body,
        documents,
        markup,
        plain,
    })
}

/// Document nodes in a field value, including those inside lists, in order.
fn nested_documents(value: &FieldValue) -> Vec<&DocNode> {
    let mut found = Vec::new();
    let mut stack = vec![(value, 0usize)];
    while let Some((value, depth)) = stack.pop() {
        match value {
            FieldValue::Node(doc) => found.push(doc),
            FieldValue::List(items) if depth < MAX_DOC_DEPTH => {
                stack.extend(items.iter().rev().map(|item| (item, depth + 1)));
            }
            _ => {}
        }
    }
    found
}

// ---------------------------------------------------------------------------
// Field values
// ---------------------------------------------------------------------------

/// Text of a field value. Lists are joined one item per line; malformed
/// entries are skipped; `None` when nothing usable remains.
pub fn field_text(value: &FieldValue) -> Option<String> {
    let mut parts: Vec<String> = Vec::new();
    let mut stack = vec![value];
    while let Some(v) = stack.pop() {
        match v {
            FieldValue::Text(s) => parts.push(tidy(s)),
            FieldValue::Number(n) => parts.push(n.to_string()),
            FieldValue::Named(n) => parts.push(n.as_str().trim().to_string()),
            FieldValue::Node(doc) => parts.push(document_text(doc.node())),
            FieldValue::List(items) => stack.extend(items.iter().rev()),
            FieldValue::Other(_) => {}
        }
    }
    let joined = parts
        .into_iter()
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join("\n");
    (!joined.is_empty()).then_some(joined)
}

// ---------------------------------------------------------------------------
// Document trees
// ---------------------------------------------------------------------------

enum Step<'a> {
    Open(NodeRef<'a>, usize),
    Close,
}

fn is_block(kind: &str) -> bool {
    matches!(
        kind,
        "paragraph"
            | "heading"
            | "listItem"
            | "blockquote"
            | "codeBlock"
            | "tableRow"
            | "rule"
            | "panel"
            | "blockCard"
    )
}

fn start_line(out: &mut String) {
    if !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }
}

/// Plain text of a document tree, walked with an explicit worklist.
///
/// Block nodes end their line, headings are prefixed with `# ` and list items
/// with `- `. Unknown node types contribute only their children.
pub fn document_text(root: NodeRef<'_>) -> String {
    let mut out = String::new();
    let mut stack = vec![Step::Open(root, 0)];

    while let Some(step) = stack.pop() {
        let (node, depth) = match step {
            Step::Close => {
                start_line(&mut out);
                continue;
            }
            Step::Open(node, depth) => (node, depth),
        };
        if depth > MAX_DOC_DEPTH {
            debug!(kind = node.kind(), depth, "document nested too deeply, skipping");
            continue;
        }
        if node.has_malformed_children() {
            debug!(kind = node.kind(), "skipping malformed document content");
        }

        let kind = node.kind();
        match kind {
            "text" => {
                if let Some(t) = node.text() {
                    out.push_str(t);
                }
            }
            "hardBreak" => out.push('\n'),
            "heading" => {
                start_line(&mut out);
                out.push_str("# ");
            }
            "listItem" => {
                start_line(&mut out);
                out.push_str("- ");
            }
            "mention" | "emoji" | "status" => {
                if let Some(t) = node.attr_str("text") {
                    out.push_str(t);
                }
            }
            "inlineCard" | "blockCard" => {
                if let Some(url) = node.attr_str("url") {
                    out.push_str(url);
                }
            }
            _ => {}
        }

        if is_block(kind) {
            stack.push(Step::Close);
        }
        for child in node.children().rev() {
            stack.push(Step::Open(child, depth + 1));
        }
    }

    tidy(&out)
}

// ---------------------------------------------------------------------------
// Markup
// ---------------------------------------------------------------------------

struct MarkupPatterns {
    hidden: Regex,
    heading_open: Regex,
    list_item_open: Regex,
    line_break: Regex,
    block: Regex,
    any_tag: Regex,
    numeric_entity: Regex,
}

fn markup_patterns() -> &'static MarkupPatterns {
    static PATTERNS: OnceLock<MarkupPatterns> = OnceLock::new();
    PATTERNS.get_or_init(|| MarkupPatterns {
        hidden: Regex::new(r"(?is)<script\b.*?</script\s*>|<style\b.*?</style\s*>").unwrap(),
        heading_open: Regex::new(r"(?i)<h[1-6]\b[^>]*>").unwrap(),
        list_item_open: Regex::new(r"(?i)<li\b[^>]*>").unwrap(),
        line_break: Regex::new(r"(?i)<br\s*/?>").unwrap(),
        block: Regex::new(
            r"(?i)</?(?:p|div|h[1-6]|li|tr|ul|ol|table|tbody|thead|blockquote|pre|section)\b[^>]*>",
        )
        .unwrap(),
        any_tag: Regex::new(r"<[^>]*>").unwrap(),
        numeric_entity: Regex::new(r"&#(\d{1,7});").unwrap(),
    })
}

/// Plain text of pre-rendered markup: tags removed, block boundaries kept as
/// line breaks, entities decoded, whitespace collapsed.
pub fn strip_markup(html: &str) -> String {
    let p = markup_patterns();
    let text = p.hidden.replace_all(html, "");
    let text = p.heading_open.replace_all(&text, "\n# ");
    let text = p.list_item_open.replace_all(&text, "\n- ");
    let text = p.line_break.replace_all(&text, "\n");
    let text = p.block.replace_all(&text, "\n");
    let text = p.any_tag.replace_all(&text, "");
    let text = p.numeric_entity.replace_all(&text, |caps: &regex::Captures| {
        caps[1]
            .parse::<u32>()
            .ok()
            .and_then(char::from_u32)
            .map(String::from)
            .unwrap_or_default()
    });
    let text = text
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&amp;", "&");
    tidy(&text)
}

/// Collapse horizontal whitespace, trim every line, drop blank lines.
pub fn tidy(text: &str) -> String {
    text.lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ticket(value: serde_json::Value) -> Ticket {
        serde_json::from_value(value).unwrap()
    }

    fn doc(value: serde_json::Value) -> DocNode {
        DocNode::from_value(value).unwrap()
    }

    #[test]
    fn markup_is_stripped_with_line_structure() {
        let html = "<h2>Acceptance Criteria</h2><ul><li>Shows   total</li><li>Applies &amp; saves</li></ul><p>Done&nbsp;when<br/>merged</p>";
        assert_eq!(
            strip_markup(html),
            "# Acceptance Criteria\n- Shows total\n- Applies & saves\nDone when\nmerged"
        );
    }

    #[test]
    fn markup_drops_scripts_and_decodes_numeric_entities() {
        let html = "<script>alert(1)</script><p>caf&#233; &lt;b&gt;</p>";
        assert_eq!(strip_markup(html), "café <b>");
    }

    #[test]
    fn document_text_preserves_blocks() {
        let d = doc(json!({
            "type": "doc",
            "content": [
                { "type": "heading", "attrs": { "level": 2 }, "content": [{ "type": "text", "text": "User Story" }] },
                { "type": "paragraph", "content": [
                    { "type": "text", "text": "As a shopper, " },
                    { "type": "text", "text": "I want things" }
                ]},
                { "type": "bulletList", "content": [
                    { "type": "listItem", "content": [{ "type": "paragraph", "content": [{ "type": "text", "text": "one" }] }] },
                    { "type": "listItem", "content": [{ "type": "paragraph", "content": [{ "type": "text", "text": "two" }] }] }
                ]}
            ]
        }));
        assert_eq!(
            document_text(d.node()),
            "# User Story\nAs a shopper, I want things\n- one\n- two"
        );
    }

    #[test]
    fn document_text_tolerates_malformed_children() {
        let d = doc(json!({
            "type": "doc",
            "content": [
                "stray string",
                42,
                { "type": "paragraph", "content": { "not": "a list" } },
                { "type": "mysteryNode", "content": [{ "type": "text", "text": "kept" }] },
                { "no_type": true },
                { "type": "text" }
            ]
        }));
        assert_eq!(document_text(d.node()), "kept");
    }

    #[test]
    fn document_text_caps_depth() {
        let mut node = json!({ "type": "text", "text": "deep" });
        for _ in 0..(MAX_DOC_DEPTH + 10) {
            node = json!({ "type": "blockquote", "content": [node] });
        }
        let d = doc(json!({ "type": "doc", "content": [
            { "type": "paragraph", "content": [{ "type": "text", "text": "shallow" }] },
            node
        ]}));
        assert_eq!(document_text(d.node()), "shallow");
    }

    #[test]
    fn markup_wins_over_document_and_plain() {
        let t = ticket(json!({
            "id": "T-1",
            "rendered_description": "<p>from markup</p>",
            "description": { "type": "doc", "content": [{ "type": "paragraph", "content": [{ "type": "text", "text": "from tree" }] }] }
        }));
        let n = normalize(&t).unwrap();
        assert_eq!(n.body, "from markup");
        assert_eq!(n.documents.len(), 1, "tree kept for link scanning");
    }

    #[test]
    fn empty_markup_falls_back_to_tree() {
        let t = ticket(json!({
            "id": "T-1",
            "rendered_description": "<p> </p>",
            "description": { "type": "doc", "content": [{ "type": "paragraph", "content": [{ "type": "text", "text": "from tree" }] }] }
        }));
        assert_eq!(normalize(&t).unwrap().body, "from tree");
    }

    #[test]
    fn plain_description_is_tidied() {
        let t = ticket(json!({ "id": "T-1", "description": "  line   one \r\n\r\n line two " }));
        let n = normalize(&t).unwrap();
        assert_eq!(n.body, "line one\nline two");
        assert!(n.plain.is_some());
    }

    #[test]
    fn field_values_flatten_and_skip_malformed() {
        let t = ticket(json!({
            "id": "T-1",
            "fields": {
                "components": [{ "name": "Checkout" }, true, "Payments"],
                "customfield_10016": 5,
                "customfield_10500": { "type": "doc", "content": [
                    { "type": "paragraph", "content": [{ "type": "text", "text": "Total updates" }] }
                ]},
                "flag": false,
                "empty": "   "
            }
        }));
        let n = normalize(&t).unwrap();
        assert_eq!(n.fields["components"], "Checkout\nPayments");
        assert_eq!(n.fields["customfield_10016"], "5");
        assert_eq!(n.fields["customfield_10500"], "Total updates");
        assert!(!n.fields.contains_key("flag"));
        assert!(!n.fields.contains_key("empty"));
        assert_eq!(n.documents.len(), 1);
    }

    #[test]
    fn missing_identity_is_an_error() {
        let t = ticket(json!({ "description": "orphan" }));
        assert!(matches!(normalize(&t), Err(DorError::MissingIdentity)));
    }

    #[test]
    fn documents_inside_lists_are_kept() {
        let t = ticket(json!({
            "id": "T-1",
            "description": "plain body",
            "fields": {
                "Acceptance Criteria": [
                    "first",
                    { "type": "paragraph", "content": [{ "type": "text", "text": "nested" }] }
                ]
            }
        }));
        let n = normalize(&t).unwrap();
        assert_eq!(n.body, "plain body");
        assert_eq!(n.documents.len(), 1);
        assert_eq!(n.documents[0].field.as_deref(), Some("Acceptance Criteria"));
    }
}
