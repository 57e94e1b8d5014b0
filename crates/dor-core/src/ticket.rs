//! Input contract: the ticket record as handed over by a tracker client.
//!
//! Every type here deserializes leniently. Values of an unexpected shape land
//! in an `Other` variant instead of failing the whole ticket, so the pipeline
//! can skip them later.

use crate::error::DorError;
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

// ---------------------------------------------------------------------------
// Ticket
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Ticket {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Label>,
    /// Human-readable tracker key (`SHOP-42`); preferred over `id`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<Label>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<Label>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<Label>,
    /// Explicit category metadata (issue type).
    #[serde(
        default,
        alias = "issue_type",
        alias = "issuetype",
        alias = "type",
        skip_serializing_if = "Option::is_none"
    )]
    pub category: Option<Label>,
    /// External workflow status ("Backlog", "Ready for Dev", ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<Label>,
    /// A non-object `fields` member reads as empty.
    #[serde(default, deserialize_with = "lenient_fields")]
    pub fields: BTreeMap<String, FieldValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<Description>,
    /// Pre-rendered HTML of the description. A non-string value reads as absent.
    #[serde(
        default,
        alias = "renderedDescription",
        deserialize_with = "lenient_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub rendered_description: Option<String>,
}

fn lenient_fields<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<BTreeMap<String, FieldValue>, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::Object(map) => Ok(map
            .into_iter()
            .map(|(k, v)| {
                let value = serde_json::from_value(v.clone()).unwrap_or(FieldValue::Other(v));
                (k, value)
            })
            .collect()),
        other => {
            tracing::debug!(kind = value_kind(&other), "ignoring non-object fields member");
            Ok(BTreeMap::new())
        }
    }
}

fn lenient_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(Some(s)),
        Value::Null => Ok(None),
        other => {
            tracing::debug!(kind = value_kind(&other), "ignoring non-string rendered description");
            Ok(None)
        }
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// The identifier of a raw record, for reporting records that are not
/// tickets at all.
pub fn record_id(value: &Value) -> Option<String> {
    ["key", "id"].iter().find_map(|k| match value.get(*k)? {
        Value::String(s) => non_blank(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

impl Ticket {
    /// Decode one raw record. Wrong-typed members are tolerated; a record
    /// that is not an object, or that repeats a member under two aliases, is
    /// rejected.
    pub fn from_value(value: Value) -> crate::Result<Self> {
        if !value.is_object() {
            return Err(DorError::NotAnObject(value_kind(&value)));
        }
        Ok(serde_json::from_value(value)?)
    }

    /// Identifier and title, each falling back to the other. `None` when the
    /// ticket carries neither.
    pub fn identity(&self) -> Option<(String, String)> {
        let id = label_text(self.key.as_ref())
            .or_else(|| label_text(self.id.as_ref()))
            .or_else(|| self.field_label("key"));
        let title = label_text(self.title.as_ref())
            .or_else(|| label_text(self.summary.as_ref()))
            .or_else(|| self.field_label("summary"));
        match (id, title) {
            (Some(id), Some(title)) => Some((id, title)),
            (Some(id), None) => Some((id.clone(), id)),
            (None, Some(title)) => Some((title.clone(), title)),
            (None, None) => None,
        }
    }

    pub fn category_text(&self) -> Option<String> {
        label_text(self.category.as_ref()).or_else(|| self.field_label("issuetype"))
    }

    pub fn status_text(&self) -> Option<String> {
        label_text(self.status.as_ref()).or_else(|| self.field_label("status"))
    }

    fn field_label(&self, key: &str) -> Option<String> {
        match self.fields.get(key)? {
            FieldValue::Text(s) => non_blank(s),
            FieldValue::Named(n) => non_blank(n.as_str()),
            _ => None,
        }
    }
}

fn label_text(label: Option<&Label>) -> Option<String> {
    label.and_then(Label::as_text)
}

fn non_blank(s: &str) -> Option<String> {
    let t = s.trim();
    (!t.is_empty()).then(|| t.to_string())
}

// ---------------------------------------------------------------------------
// Label
// ---------------------------------------------------------------------------

/// A scalar-ish metadata value: `"Bug"`, `42`, or `{ "name": "Bug" }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Label {
    Text(String),
    Number(serde_json::Number),
    Named(Named),
    Other(Value),
}

impl Label {
    pub fn as_text(&self) -> Option<String> {
        match self {
            Label::Text(s) => non_blank(s),
            Label::Number(n) => Some(n.to_string()),
            Label::Named(n) => non_blank(n.as_str()),
            Label::Other(_) => None,
        }
    }
}

impl From<&str> for Label {
    fn from(s: &str) -> Self {
        Label::Text(s.to_string())
    }
}

/// Option/user objects as trackers return them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Named {
    Value {
        value: String,
    },
    Name {
        name: String,
    },
    DisplayName {
        #[serde(rename = "displayName")]
        display_name: String,
    },
}

impl Named {
    pub fn as_str(&self) -> &str {
        match self {
            Named::Value { value } => value,
            Named::Name { name } => name,
            Named::DisplayName { display_name } => display_name,
        }
    }
}

// ---------------------------------------------------------------------------
// FieldValue
// ---------------------------------------------------------------------------

/// A value from the ticket's field map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    Number(serde_json::Number),
    List(Vec<FieldValue>),
    Node(DocNode),
    Named(Named),
    /// Anything else: booleans, nulls, unrecognised objects.
    Other(Value),
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Text(s.to_string())
    }
}

// ---------------------------------------------------------------------------
// Description
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Description {
    Text(String),
    Document(DocNode),
    Other(Value),
}

// ---------------------------------------------------------------------------
// DocNode
// ---------------------------------------------------------------------------

/// A structured-document node: a JSON object with a string `type`, optional
/// `content` children, `text`, `attrs` and `marks`.
///
/// The raw object is kept as-is; accessors read wrong-typed members as empty.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct DocNode(Map<String, Value>);

impl DocNode {
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) if matches!(map.get("type"), Some(Value::String(_))) => {
                Some(DocNode(map))
            }
            _ => None,
        }
    }

    pub fn node(&self) -> NodeRef<'_> {
        NodeRef(&self.0)
    }
}

impl<'de> Deserialize<'de> for DocNode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        DocNode::from_value(value)
            .ok_or_else(|| de::Error::custom("document node requires a string `type`"))
    }
}

/// Borrowed view over a document node.
#[derive(Debug, Clone, Copy)]
pub struct NodeRef<'a>(&'a Map<String, Value>);

impl<'a> NodeRef<'a> {
    pub fn kind(&self) -> &'a str {
        self.0.get("type").and_then(Value::as_str).unwrap_or("")
    }

    pub fn text(&self) -> Option<&'a str> {
        self.0.get("text").and_then(Value::as_str)
    }

    pub fn attr_str(&self, key: &str) -> Option<&'a str> {
        self.0
            .get("attrs")
            .and_then(Value::as_object)
            .and_then(|attrs| attrs.get(key))
            .and_then(Value::as_str)
    }

    pub fn heading_level(&self) -> Option<u64> {
        if self.kind() != "heading" {
            return None;
        }
        Some(
            self.0
                .get("attrs")
                .and_then(|a| a.get("level"))
                .and_then(Value::as_u64)
                .unwrap_or(1),
        )
    }

    /// Child nodes. Non-object entries and a non-array `content` are skipped.
    pub fn children(&self) -> impl DoubleEndedIterator<Item = NodeRef<'a>> {
        self.0
            .get("content")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[])
            .iter()
            .filter_map(Value::as_object)
            .map(NodeRef)
    }

    pub fn has_malformed_children(&self) -> bool {
        match self.0.get("content") {
            None => false,
            Some(Value::Array(items)) => items.iter().any(|v| !v.is_object()),
            Some(_) => true,
        }
    }

    /// `href`s of the node's `link` marks.
    pub fn link_hrefs(&self) -> impl Iterator<Item = &'a str> {
        self.0
            .get("marks")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[])
            .iter()
            .filter(|m| m.get("type").and_then(Value::as_str) == Some("link"))
            .filter_map(|m| m.get("attrs")?.get("href")?.as_str())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
