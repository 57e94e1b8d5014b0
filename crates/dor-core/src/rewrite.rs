//! Suggested improvements: narrative and acceptance-criteria rewrites,
//! test-scenario sets and role-tagged recommendations.

use crate::config::RewriteConfig;
use crate::domain::{phrase_regex, strategy, Domain};
use crate::error::Result;
use crate::evaluate::DorEvaluation;
use crate::links::DesignLink;
use crate::types::{CardType, DorField, Role};
use regex::{NoExpand, Regex};
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// Output types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NarrativeRewrite {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original: Option<String>,
    pub text: String,
    /// False when the original was kept as-is.
    pub rewritten: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CriterionRewrite {
    /// Absent for criteria generated from a template.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original: Option<String>,
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub changes: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestScenarios {
    pub positive: Vec<String>,
    pub negative: Vec<String>,
    pub error: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recommendation {
    pub role: Role,
    pub text: String,
}

impl Recommendation {
    fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Patterns
// ---------------------------------------------------------------------------

struct RewritePatterns {
    persona: Regex,
    goal: Regex,
    benefit: Regex,
    bullet: Regex,
    measurable: Regex,
    error_bucket: Regex,
    negative_bucket: Regex,
}

fn patterns() -> &'static RewritePatterns {
    static PATTERNS: OnceLock<RewritePatterns> = OnceLock::new();
    PATTERNS.get_or_init(|| RewritePatterns {
        persona: Regex::new(
            r"(?i)\bas\s+an?\s+([^,.;\n]+?)(?:\s*,|\s+i\s+(?:want|need|would\s+like)\b|[.;\n]|$)",
        )
        .unwrap(),
        goal: Regex::new(
            r"(?i)\bi\s+(?:want|need|would\s+like)\s+((?:to\s+)?[^,.;\n]+?)(?:\s*,|\s+so\s+that\b|[.;\n]|$)",
        )
        .unwrap(),
        benefit: Regex::new(r"(?i)\bso\s+that\s+([^.;\n]+)").unwrap(),
        bullet: Regex::new(r"^\s*(?:[-*•]|\d+[.)])\s*").unwrap(),
        measurable: Regex::new(
            r"(?i)\d+(?:\.\d+)?\s*%|\b\d+(?:\.\d+)?\s*(?:ms|milliseconds?|s|secs?|seconds?|minutes?|mins?|hours?|hrs?|days?|percent|px|items?|results?|characters?|chars?|times?|attempts?|steps?)\b|\bwithin\b|\b(?:under|below|above|over|up\s+to|at\s+least|at\s+most|no\s+more\s+than|no\s+later\s+than|no\s+less\s+than|maximum|minimum|max|min)\s+\d",
        )
        .unwrap(),
        error_bucket: Regex::new(
            r"(?i)\b(?:errors?|fail(?:s|ed|ure|ures)?|timeouts?|timed\s+out|500|exceptions?|offline|unavailable|crash(?:es|ed)?)\b",
        )
        .unwrap(),
        negative_bucket: Regex::new(
            r"(?i)\b(?:invalid|empty|missing|wrong|not|cannot|can't|reject(?:s|ed)?|unauthori[sz]ed|expired|without)\b",
        )
        .unwrap(),
    })
}

/// Content lines of a multi-line value, bullets and numbering removed.
fn content_lines(text: &str) -> Vec<String> {
    let p = patterns();
    text.lines()
        .map(|l| p.bullet.replace(l, "").trim().to_string())
        .filter(|l| l.chars().any(char::is_alphanumeric))
        .collect()
}

fn fragment(re: &Regex, text: &str) -> Option<String> {
    re.captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().trim_end_matches(['.', ',', ';', '!']).to_string())
        .filter(|s| !s.is_empty())
}

fn article_for(word: &str) -> &'static str {
    match word.chars().next().map(|c| c.to_ascii_lowercase()) {
        Some('a' | 'e' | 'i' | 'o' | 'u') => "an",
        _ => "a",
    }
}

/// `"Apply promo code"` → `"to apply promo code"`. Acronyms keep their case.
fn goal_from_title(title: &str) -> String {
    let t = title.trim().trim_end_matches('.');
    let mut chars = t.chars();
    let lowered = match (chars.next(), chars.next()) {
        (Some(first), Some(second)) if !second.is_uppercase() => {
            format!("{}{}", first.to_lowercase(), &t[first.len_utf8()..])
        }
        _ => t.to_string(),
    };
    format!("to {lowered}")
}

// ---------------------------------------------------------------------------
// Rewriter
// ---------------------------------------------------------------------------

struct VaguePhrase {
    phrase: String,
    replacement: String,
    re: Regex,
}

pub struct Rewriter {
    config: RewriteConfig,
    /// Longest phrase first so "user-friendly" wins over "friendly".
    vague: Vec<VaguePhrase>,
}

impl Rewriter {
    pub fn new(config: &RewriteConfig) -> Result<Self> {
        let mut vague = config
            .vague_phrases
            .iter()
            .filter(|(phrase, _)| !phrase.trim().is_empty())
            .map(|(phrase, replacement)| {
                Ok(VaguePhrase {
                    phrase: phrase.clone(),
                    replacement: replacement.clone(),
                    re: phrase_regex(phrase)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        vague.sort_by_key(|v| Reverse(v.phrase.len()));
        Ok(Self {
            config: config.clone(),
            vague,
        })
    }

    /// Keep a well-formed narrative, otherwise synthesize one. `None` when
    /// the card type neither requires nor carries a narrative.
    pub fn narrative(
        &self,
        card_type: CardType,
        existing: Option<&str>,
        title: &str,
        body: &str,
        domain: Domain,
        terms: &[String],
    ) -> Option<NarrativeRewrite> {
        if existing.is_none() && !card_type.requires(DorField::UserStory) {
            return None;
        }
        if let Some(text) = existing {
            if self.is_well_formed(text) {
                return Some(NarrativeRewrite {
                    original: Some(text.to_string()),
                    text: text.to_string(),
                    rewritten: false,
                });
            }
        }

        let p = patterns();
        let s = strategy(domain);
        let find = |re: &Regex| {
            existing
                .and_then(|e| fragment(re, e))
                .or_else(|| fragment(re, body))
        };
        let persona = find(&p.persona).unwrap_or_else(|| s.persona.to_string());
        let goal = find(&p.goal).unwrap_or_else(|| goal_from_title(title));
        let benefit = find(&p.benefit).unwrap_or_else(|| s.benefit.to_string());

        let mut text = format!(
            "As {} {persona}, I want {goal} so that {benefit}. {}",
            article_for(&persona),
            s.elaboration
        );
        if !terms.is_empty() {
            text.push_str(&format!(" Scope: {}.", terms.join(", ")));
        }
        Some(NarrativeRewrite {
            original: existing.map(str::to_string),
            text,
            rewritten: true,
        })
    }

    fn is_well_formed(&self, text: &str) -> bool {
        let lower = text.to_lowercase();
        lower.contains("as a")
            && lower.contains("i want")
            && lower.contains("so that")
            && text.trim().chars().count() >= self.config.min_narrative_length
    }

    /// Rewrite each criterion line, most-corrected first. Without criteria,
    /// the domain's template set is returned.
    pub fn acceptance_criteria(&self, existing: Option<&str>, domain: Domain) -> Vec<CriterionRewrite> {
        let lines = existing.map(content_lines).unwrap_or_default();
        if lines.is_empty() {
            return strategy(domain)
                .acceptance_criteria
                .iter()
                .map(|t| CriterionRewrite {
                    original: None,
                    text: t.to_string(),
                    changes: Vec::new(),
                })
                .collect();
        }

        let mut rewrites: Vec<CriterionRewrite> =
            lines.into_iter().map(|l| self.rewrite_criterion(l)).collect();
        rewrites.sort_by_key(|r| Reverse(r.changes.len()));
        rewrites
    }

    fn rewrite_criterion(&self, original: String) -> CriterionRewrite {
        let mut text = original.clone();
        let mut changes = Vec::new();
        for v in &self.vague {
            if v.re.is_match(&text) {
                text = v.re.replace_all(&text, NoExpand(&v.replacement)).into_owned();
                changes.push(format!("replaced \"{}\" with \"{}\"", v.phrase, v.replacement));
            }
        }
        let clause = self.config.latency_clause.trim();
        if !clause.is_empty() && !patterns().measurable.is_match(&text) {
            let had_period = text.ends_with('.');
            let stem = text.trim_end_matches(['.', ' ']);
            text = format!("{stem} {clause}{}", if had_period { "." } else { "" });
            changes.push(format!("added time bound \"{clause}\""));
        }
        CriterionRewrite {
            original: Some(original),
            text,
            changes,
        }
    }

    /// Bucket existing QA lines, then backfill each bucket from the domain
    /// and generic templates up to the minimum, capped at the maximum.
    pub fn test_scenarios(&self, existing: Option<&str>, domain: Domain) -> TestScenarios {
        let p = patterns();
        let mut out = TestScenarios::default();
        for line in existing.map(content_lines).unwrap_or_default() {
            let bucket = if p.error_bucket.is_match(&line) {
                &mut out.error
            } else if p.negative_bucket.is_match(&line) {
                &mut out.negative
            } else {
                &mut out.positive
            };
            push_unique(bucket, &line);
        }

        let (min, max) = (self.config.min_scenarios, self.config.max_scenarios);
        let specific = strategy(domain);
        let generic = strategy(Domain::Generic);
        fill(&mut out.positive, [specific.positive, generic.positive], min, max);
        fill(&mut out.negative, [specific.negative, generic.negative], min, max);
        fill(&mut out.error, [specific.error, generic.error], min, max);
        out
    }
}

fn push_unique(bucket: &mut Vec<String>, line: &str) -> bool {
    if bucket.iter().any(|b| b.eq_ignore_ascii_case(line)) {
        return false;
    }
    bucket.push(line.to_string());
    true
}

fn fill(bucket: &mut Vec<String>, templates: [&[&str]; 2], min: usize, max: usize) {
    for t in templates.iter().flat_map(|set| set.iter()) {
        if bucket.len() >= min {
            break;
        }
        push_unique(bucket, t);
    }
    bucket.truncate(max);
}

// ---------------------------------------------------------------------------
// Recommendations
// ---------------------------------------------------------------------------

fn missing_field_advice(field: DorField) -> (Role, &'static str) {
    match field {
        DorField::UserStory => (Role::ProductOwner, "Add a user story naming the persona, the goal and the benefit."),
        DorField::AcceptanceCriteria => (Role::ProductOwner, "Write testable acceptance criteria in Given/When/Then form."),
        DorField::TestingSteps => (Role::Qa, "Add testing steps covering the happy path, invalid input and failures."),
        DorField::ImplementationDetails => (Role::Engineering, "Outline the implementation approach and affected code paths."),
        DorField::Architecture => (Role::Engineering, "Describe architecture impact, or state \"none\" if there is none."),
        DorField::AccessibilityCriteria => (Role::Qa, "Define accessibility criteria: keyboard access, focus order and screen-reader text."),
        DorField::Brand => (Role::ProductOwner, "Name the brand or brands this change applies to."),
        DorField::Component => (Role::Engineering, "Set the affected component."),
        DorField::Team => (Role::ProductOwner, "Assign an owning team."),
        DorField::SizeEstimate => (Role::Engineering, "Estimate the size once the scope is agreed."),
        DorField::Environment => (Role::Qa, "Record the environment where the problem occurs."),
        DorField::Severity => (Role::ProductOwner, "Set a severity so the fix can be prioritised."),
        DorField::SuccessMetric => (Role::ProductOwner, "Define the success metric and its target value."),
        DorField::CurrentBehaviour => (Role::Qa, "Describe the current behaviour as observed."),
        DorField::StepsToReproduce => (Role::Qa, "List numbered steps to reproduce the problem."),
        DorField::ExpectedBehaviour => (Role::Qa, "State the expected behaviour."),
    }
}

/// Role-tagged actions, grouped by role in [`Role::all`] order.
pub fn recommendations(
    evaluation: &DorEvaluation,
    links: &[DesignLink],
    domain: Domain,
) -> Vec<Recommendation> {
    let mut recs = Vec::new();
    for &field in &evaluation.missing {
        let (role, text) = missing_field_advice(field);
        recs.push(Recommendation::new(role, text));
    }
    for c in &evaluation.conflicts {
        recs.push(Recommendation::new(
            Role::ProductOwner,
            format!(
                "Resolve the contradiction between \"{}\" and \"{}\" in the acceptance criteria.",
                c.first, c.second
            ),
        ));
    }
    if !evaluation.conflicts.is_empty() {
        recs.push(Recommendation::new(
            Role::Qa,
            "Hold test design until the conflicting criteria are resolved.",
        ));
    }
    if links.is_empty() && matches!(evaluation.card_type, CardType::Story | CardType::Feature) {
        recs.push(Recommendation::new(
            Role::ProductOwner,
            "Attach the Figma designs for the affected screens.",
        ));
    }
    for (role, text) in strategy(domain).recommendations {
        recs.push(Recommendation::new(*role, *text));
    }
    recs.sort_by_key(|r| Role::all().iter().position(|x| *x == r.role));
    recs
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluate::Conflict;
    use crate::types::{GroomingStage, ReadinessStatus};

    fn rewriter() -> Rewriter {
        Rewriter::new(&RewriteConfig::default()).unwrap()
    }

    // -----------------------------------------------------------------------
    // Narrative
    // -----------------------------------------------------------------------

    #[test]
    fn well_formed_narrative_is_kept() {
        let text = "As a shopper, I want to save my card so that checkout is faster next time.";
        let n = rewriter()
            .narrative(CardType::Story, Some(text), "Save card", "", Domain::Checkout, &[])
            .unwrap();
        assert!(!n.rewritten);
        assert_eq!(n.text, text);
    }

    #[test]
    fn short_narrative_is_rewritten_from_its_fragments() {
        let text = "As a guest I want to pay so that I go";
        let n = rewriter()
            .narrative(CardType::Story, Some(text), "Guest checkout", "", Domain::Checkout, &[])
            .unwrap();
        assert!(n.rewritten);
        assert!(n.text.starts_with("As a guest, I want to pay so that I go. "), "{}", n.text);
        assert!(n.text.contains(strategy(Domain::Checkout).elaboration));
    }

    #[test]
    fn missing_narrative_synthesized_from_title() {
        let terms = vec!["PLP".to_string(), "filters".to_string()];
        let n = rewriter()
            .narrative(CardType::Story, None, "Filter by colour", "", Domain::Search, &terms)
            .unwrap();
        assert_eq!(n.original, None);
        assert!(n.text.starts_with("As a shopper, I want to filter by colour so that"), "{}", n.text);
        assert!(n.text.ends_with("Scope: PLP, filters."));
    }

    #[test]
    fn persona_article_follows_vowel() {
        let n = rewriter()
            .narrative(CardType::Story, None, "Export", "As an admin I need exports.", Domain::Generic, &[])
            .unwrap();
        assert!(n.text.starts_with("As an admin, I want exports so that"), "{}", n.text);
    }

    #[test]
    fn no_narrative_for_tasks_without_one() {
        assert!(rewriter()
            .narrative(CardType::Task, None, "Bump deps", "", Domain::Generic, &[])
            .is_none());
        assert!(rewriter()
            .narrative(CardType::Task, Some("As a dev"), "Bump deps", "", Domain::Generic, &[])
            .is_some());
    }

    #[test]
    fn goal_from_title_keeps_acronyms() {
        assert_eq!(goal_from_title("Apply promo code."), "to apply promo code");
        assert_eq!(goal_from_title("PLP sorting"), "to PLP sorting");
    }

    // -----------------------------------------------------------------------
    // Acceptance criteria
    // -----------------------------------------------------------------------

    #[test]
    fn criteria_are_corrected_and_ranked() {
        let ac = "- Total is shown within 2 seconds\n- The form is user-friendly and fast\n- Errors are shown";
        let out = rewriter().acceptance_criteria(Some(ac), Domain::Generic);
        assert_eq!(out.len(), 3);
        // two replacements, and "within" now present so no clause
        assert_eq!(out[0].original.as_deref(), Some("The form is user-friendly and fast"));
        assert_eq!(out[0].changes.len(), 2);
        assert!(!out[0].text.contains("fast"));
        // one change: appended clause
        assert_eq!(out[1].text, "Errors are shown within 2 seconds");
        // untouched line last
        assert!(out[2].changes.is_empty());
        assert_eq!(out[2].text, "Total is shown within 2 seconds");
    }

    #[test]
    fn clause_keeps_trailing_period() {
        let out = rewriter().acceptance_criteria(Some("The banner is shown."), Domain::Generic);
        assert_eq!(out[0].text, "The banner is shown within 2 seconds.");
    }

    #[test]
    fn percentages_count_as_measurable() {
        let out = rewriter().acceptance_criteria(Some("Discount is 10% of total"), Domain::Generic);
        assert!(out[0].changes.is_empty());
    }

    #[test]
    fn no_criteria_uses_domain_templates() {
        let out = rewriter().acceptance_criteria(None, Domain::Search);
        assert_eq!(out.len(), strategy(Domain::Search).acceptance_criteria.len());
        assert!(out.iter().all(|c| c.original.is_none()));
    }

    // -----------------------------------------------------------------------
    // Test scenarios
    // -----------------------------------------------------------------------

    #[test]
    fn scenarios_bucket_and_backfill() {
        let steps = "1. Apply a valid code\n2. Apply an expired code\n3. Pricing service returns 500\n4. Apply a valid code";
        let s = rewriter().test_scenarios(Some(steps), Domain::Checkout);
        assert_eq!(s.positive[0], "Apply a valid code");
        assert_eq!(s.negative[0], "Apply an expired code");
        assert_eq!(s.error[0], "Pricing service returns 500");
        assert_eq!(s.positive.len(), 2);
        assert_eq!(s.negative.len(), 2);
        assert_eq!(s.error.len(), 2);
        assert_eq!(s.positive[1], strategy(Domain::Checkout).positive[0]);
    }

    #[test]
    fn scenarios_are_capped() {
        let steps = (1..=8).map(|i| format!("Happy path {i}")).collect::<Vec<_>>().join("\n");
        let s = rewriter().test_scenarios(Some(&steps), Domain::Generic);
        assert_eq!(s.positive.len(), 5);
    }

    #[test]
    fn empty_steps_get_minimum_from_templates() {
        let s = rewriter().test_scenarios(None, Domain::Generic);
        for bucket in [&s.positive, &s.negative, &s.error] {
            assert_eq!(bucket.len(), 2);
        }
    }

    // -----------------------------------------------------------------------
    // Recommendations
    // -----------------------------------------------------------------------

    fn evaluation(card_type: CardType, missing: Vec<DorField>, conflicts: Vec<Conflict>) -> DorEvaluation {
        DorEvaluation {
            card_type,
            present: Vec::new(),
            missing,
            conflicts,
            coverage: 0,
            status: ReadinessStatus::NeedsRefinement,
            status_rule: "incomplete".to_string(),
            status_reason: String::new(),
            grooming_stage: GroomingStage::Grooming,
        }
    }

    #[test]
    fn recommendations_cover_missing_conflicts_and_designs() {
        let e = evaluation(
            CardType::Story,
            vec![DorField::Architecture, DorField::TestingSteps],
            vec![Conflict {
                field: DorField::AcceptanceCriteria,
                first: "always".to_string(),
                second: "never".to_string(),
            }],
        );
        let recs = recommendations(&e, &[], Domain::Generic);
        let roles: Vec<Role> = recs.iter().map(|r| r.role).collect();
        let mut sorted = roles.clone();
        sorted.sort_by_key(|r| Role::all().iter().position(|x| x == r));
        assert_eq!(roles, sorted);
        assert!(recs.iter().any(|r| r.role == Role::ProductOwner && r.text.contains("\"always\"")));
        assert!(recs.iter().any(|r| r.text.contains("Figma")));
        assert!(recs.iter().any(|r| r.role == Role::Engineering));
        assert!(recs.iter().any(|r| r.role == Role::Qa));
    }

    #[test]
    fn bugs_are_not_asked_for_designs() {
        let e = evaluation(CardType::Bug, vec![], vec![]);
        let recs = recommendations(&e, &[], Domain::Generic);
        assert!(recs.is_empty());
    }

    #[test]
    fn domain_fragments_are_added() {
        let e = evaluation(CardType::Task, vec![], vec![]);
        let recs = recommendations(&e, &[], Domain::Checkout);
        assert_eq!(recs.len(), strategy(Domain::Checkout).recommendations.len());
    }
}
