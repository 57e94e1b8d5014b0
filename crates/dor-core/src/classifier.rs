use crate::normalize::NormalizedTicket;
use crate::types::CardType;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// ClassifyContext
// ---------------------------------------------------------------------------

pub struct ClassifyContext<'a> {
    pub ticket: &'a NormalizedTicket,
    /// Lowercased category metadata, if any.
    pub category: Option<String>,
    /// Lowercased title, body, field keys and field values.
    pub text: String,
}

impl<'a> ClassifyContext<'a> {
    pub fn new(ticket: &'a NormalizedTicket) -> Self {
        let mut text = ticket.full_text();
        for key in ticket.fields.keys() {
            text.push('\n');
            text.push_str(&key.replace(['_', '-'], " "));
        }
        Self {
            ticket,
            category: ticket.category.as_ref().map(|c| c.to_lowercase()),
            text: text.to_lowercase(),
        }
    }
}

// ---------------------------------------------------------------------------
// Classification (output)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationBasis {
    Metadata,
    Content,
    Default,
}

impl fmt::Display for ClassificationBasis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ClassificationBasis::Metadata => "metadata",
            ClassificationBasis::Content => "content",
            ClassificationBasis::Default => "default",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub card_type: CardType,
    pub basis: ClassificationBasis,
    /// Id of the rule that decided, absent for the default.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule: Option<String>,
}

// ---------------------------------------------------------------------------
// Rules
// ---------------------------------------------------------------------------

/// Matches category metadata by substring.
pub struct MetadataRule {
    pub id: &'static str,
    pub card_type: CardType,
    pub needles: &'static [&'static str],
}

/// Scores ticket content. The rule with the most hits wins.
pub struct ContentRule {
    pub id: &'static str,
    pub card_type: CardType,
    pub hits: fn(&ClassifyContext) -> usize,
}

pub fn default_metadata_rules() -> Vec<MetadataRule> {
    vec![
        MetadataRule {
            id: "metadata-bug",
            card_type: CardType::Bug,
            needles: &["bug", "defect", "incident"],
        },
        MetadataRule {
            id: "metadata-feature",
            card_type: CardType::Feature,
            needles: &["epic", "feature", "initiative"],
        },
        MetadataRule {
            id: "metadata-task",
            card_type: CardType::Task,
            needles: &["task", "chore", "spike"],
        },
        MetadataRule {
            id: "metadata-story",
            card_type: CardType::Story,
            needles: &["story"],
        },
    ]
}

struct ContentPatterns {
    story: Vec<Regex>,
    bug: Vec<Regex>,
    task: Vec<Regex>,
    feature: Vec<Regex>,
}

fn content_patterns() -> &'static ContentPatterns {
    static PATTERNS: OnceLock<ContentPatterns> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        let compile = |pats: &[&str]| -> Vec<Regex> {
            pats.iter().map(|p| Regex::new(p).unwrap()).collect()
        };
        ContentPatterns {
            story: compile(&[
                r"\bas an? [a-z]",
                r"\bi (?:want|need|would like)\b",
                r"\bso that\b",
                r"\buser story\b",
            ]),
            bug: compile(&[
                r"\bcurrent(?:ly)? behaviou?r\b",
                r"\bsteps to reproduce\b",
                r"\bexpected (?:behaviou?r|result)\b",
                r"\bactual (?:behaviou?r|result)\b",
                r"\b(?:bug|defect|regression|crash(?:es|ed)?|broken)\b",
            ]),
            task: compile(&[
                r"\bconfigur(?:e|ation)\b",
                r"\bdocument(?:ation)?\b",
                r"\b(?:upgrade|migrat(?:e|ion)|refactor)\b",
                r"\bset ?up\b",
            ]),
            feature: compile(&[
                r"\bepic\b",
                r"\bcapabilit(?:y|ies)\b",
                r"\binitiative\b",
                r"\bsuccess metrics?\b",
                r"\bkpis?\b",
            ]),
        }
    })
}

fn count_hits(patterns: &[Regex], text: &str) -> usize {
    patterns.iter().map(|p| p.find_iter(text).count()).sum()
}

pub fn default_content_rules() -> Vec<ContentRule> {
    vec![
        ContentRule {
            id: "content-story",
            card_type: CardType::Story,
            hits: |ctx| count_hits(&content_patterns().story, &ctx.text),
        },
        ContentRule {
            id: "content-bug",
            card_type: CardType::Bug,
            hits: |ctx| count_hits(&content_patterns().bug, &ctx.text),
        },
        ContentRule {
            id: "content-task",
            card_type: CardType::Task,
            hits: |ctx| count_hits(&content_patterns().task, &ctx.text),
        },
        ContentRule {
            id: "content-feature",
            card_type: CardType::Feature,
            hits: |ctx| count_hits(&content_patterns().feature, &ctx.text),
        },
    ]
}

// ---------------------------------------------------------------------------
// Classifier
// ---------------------------------------------------------------------------

pub struct Classifier {
    metadata: Vec<MetadataRule>,
    content: Vec<ContentRule>,
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new(default_metadata_rules(), default_content_rules())
    }
}

impl Classifier {
    pub fn new(metadata: Vec<MetadataRule>, content: Vec<ContentRule>) -> Self {
        Self { metadata, content }
    }

    pub fn classify(&self, ctx: &ClassifyContext) -> Classification {
        if let Some(category) = &ctx.category {
            for rule in &self.metadata {
                if rule.needles.iter().any(|n| category.contains(n)) {
                    return Classification {
                        card_type: rule.card_type,
                        basis: ClassificationBasis::Metadata,
                        rule: Some(rule.id.to_string()),
                    };
                }
            }
        }

        // Strictly greater keeps the earlier rule on ties
        let mut best: Option<(&ContentRule, usize)> = None;
        for rule in &self.content {
            let hits = (rule.hits)(ctx);
            if hits > 0 && best.map_or(true, |(_, b)| hits > b) {
                best = Some((rule, hits));
            }
        }

        match best {
            Some((rule, _)) => Classification {
                card_type: rule.card_type,
                basis: ClassificationBasis::Content,
                rule: Some(rule.id.to_string()),
            },
            None => Classification {
                card_type: CardType::Story,
                basis: ClassificationBasis::Default,
                rule: None,
            },
        }
    }
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

    fn classify(value: serde_json::Value) -> Classification {
        let ticket: Ticket = serde_json::from_value(value).unwrap();
        let normalized = normalize(&ticket).unwrap();
        Classifier::default().classify(&ClassifyContext::new(&normalized))
    }

    #[test]
    fn metadata_wins_over_content() {
        let c = classify(json!({
            "id": "B-1",
            "issuetype": { "name": "Production Defect" },
            "description": "As a shopper I want to pay so that I can leave"
        }));
        assert_eq!(c.card_type, CardType::Bug);
        assert_eq!(c.basis, ClassificationBasis::Metadata);
        assert_eq!(c.rule.as_deref(), Some("metadata-bug"));
    }

    #[test]
    fn metadata_substring_order() {
        assert_eq!(classify(json!({ "id": "1", "type": "Epic" })).card_type, CardType::Feature);
        assert_eq!(classify(json!({ "id": "1", "type": "Sub-task" })).card_type, CardType::Task);
        assert_eq!(classify(json!({ "id": "1", "type": "Spike" })).card_type, CardType::Task);
        assert_eq!(classify(json!({ "id": "1", "type": "Story" })).card_type, CardType::Story);
        // "Bug story" reads as a bug: bug rules come first
        assert_eq!(classify(json!({ "id": "1", "type": "Bug story" })).card_type, CardType::Bug);
    }

    #[test]
    fn unmatched_metadata_falls_through_to_content() {
        let c = classify(json!({
            "id": "1",
            "type": "Improvement",
            "description": "Steps to reproduce: open cart. Expected result: total shown. Actual result: blank."
        }));
        assert_eq!(c.card_type, CardType::Bug);
        assert_eq!(c.basis, ClassificationBasis::Content);
    }

    #[test]
    fn content_field_keys_count() {
        let c = classify(json!({
            "id": "1",
            "fields": { "current_behaviour": "The basket empties on refresh" }
        }));
        assert_eq!(c.card_type, CardType::Bug);
    }

    #[test]
    fn content_most_hits_wins() {
        let c = classify(json!({
            "id": "1",
            "title": "Configure CDN",
            "description": "Update configuration and documentation for the setup. Story owner: ops."
        }));
        assert_eq!(c.card_type, CardType::Task);
    }

    #[test]
    fn content_ties_go_to_earlier_rule() {
        // One story hit, one feature hit
        let c = classify(json!({ "id": "1", "description": "so that the epic closes" }));
        assert_eq!(c.card_type, CardType::Story);
        assert_eq!(c.basis, ClassificationBasis::Content);
    }

    #[test]
    fn no_signal_defaults_to_story() {
        let c = classify(json!({ "id": "1", "title": "Homepage banner" }));
        assert_eq!(c.card_type, CardType::Story);
        assert_eq!(c.basis, ClassificationBasis::Default);
        assert!(c.rule.is_none());
    }
}
