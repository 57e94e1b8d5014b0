use crate::classifier::ClassificationBasis;
use crate::domain::Domain;
use crate::error::DorError;
use crate::evaluate::DorEvaluation;
use crate::links::DesignLink;
use crate::rewrite::{CriterionRewrite, NarrativeRewrite, Recommendation, TestScenarios};
use crate::types::{DorField, ReadinessStatus, Role};
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// TicketReport
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TicketReport {
    pub id: String,
    pub title: String,
    /// How the card type was decided.
    pub basis: ClassificationBasis,
    #[serde(flatten)]
    pub evaluation: DorEvaluation,
    pub domain: Domain,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub domain_terms: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub narrative: Option<NarrativeRewrite>,
    pub acceptance_criteria: Vec<CriterionRewrite>,
    pub test_scenarios: TestScenarios,
    pub design_links: Vec<DesignLink>,
    pub recommendations: Vec<Recommendation>,
}

impl TicketReport {
    pub fn status(&self) -> ReadinessStatus {
        self.evaluation.status
    }

    pub fn missing(&self) -> &[DorField] {
        &self.evaluation.missing
    }

    pub fn recommendations_for(&self, role: Role) -> impl Iterator<Item = &Recommendation> {
        self.recommendations.iter().filter(move |r| r.role == role)
    }
}

// ---------------------------------------------------------------------------
// AnalysisOutcome
// ---------------------------------------------------------------------------

/// A report, or the minimal fallback for a ticket that could not be analyzed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnalysisOutcome {
    Report(Box<TicketReport>),
    Failed {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        error: String,
    },
}

impl AnalysisOutcome {
    pub fn failed(id: Option<String>, error: &DorError) -> Self {
        AnalysisOutcome::Failed {
            id,
            error: error.to_string(),
        }
    }

    pub fn report(&self) -> Option<&TicketReport> {
        match self {
            AnalysisOutcome::Report(r) => Some(r),
            AnalysisOutcome::Failed { .. } => None,
        }
    }

    pub fn id(&self) -> Option<&str> {
        match self {
            AnalysisOutcome::Report(r) => Some(&r.id),
            AnalysisOutcome::Failed { id, .. } => id.as_deref(),
        }
    }

    pub fn status(&self) -> Option<ReadinessStatus> {
        self.report().map(TicketReport::status)
    }
}

// ---------------------------------------------------------------------------
// Verbosity
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verbosity {
    Brief,
    #[default]
    Balanced,
    Detailed,
}

impl Verbosity {
    pub fn all() -> &'static [Verbosity] {
        &[Verbosity::Brief, Verbosity::Balanced, Verbosity::Detailed]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Verbosity::Brief => "brief",
            Verbosity::Balanced => "balanced",
            Verbosity::Detailed => "detailed",
        }
    }

    pub fn projection(self) -> Projection {
        match self {
            Verbosity::Brief => Projection {
                present: false,
                narrative: false,
                criteria: Some(0),
                criterion_changes: false,
                scenarios: Some(0),
                links: Some(0),
                node_ids: false,
                recommendations_per_role: Some(2),
            },
            Verbosity::Balanced => Projection {
                present: false,
                narrative: true,
                criteria: Some(3),
                criterion_changes: false,
                scenarios: Some(2),
                links: None,
                node_ids: false,
                recommendations_per_role: Some(3),
            },
            Verbosity::Detailed => Projection {
                present: true,
                narrative: true,
                criteria: None,
                criterion_changes: true,
                scenarios: None,
                links: None,
                node_ids: true,
                recommendations_per_role: None,
            },
        }
    }
}

impl fmt::Display for Verbosity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Verbosity {
    type Err = DorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "brief" => Ok(Verbosity::Brief),
            "balanced" => Ok(Verbosity::Balanced),
            "detailed" => Ok(Verbosity::Detailed),
            other => Err(DorError::UnknownVerbosity(other.to_string())),
        }
    }
}

/// What a verbosity preset shows. `None` limits mean "all"; `Some(0)` hides
/// the section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Projection {
    pub present: bool,
    pub narrative: bool,
    pub criteria: Option<usize>,
    pub criterion_changes: bool,
    /// Per bucket.
    pub scenarios: Option<usize>,
    pub links: Option<usize>,
    pub node_ids: bool,
    pub recommendations_per_role: Option<usize>,
}

fn take<T>(items: &[T], limit: Option<usize>) -> &[T] {
    match limit {
        Some(n) => &items[..n.min(items.len())],
        None => items,
    }
}

fn field_list(fields: &[DorField]) -> String {
    fields.iter().map(|f| f.label()).collect::<Vec<_>>().join(", ")
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

/// Deterministic plain-text rendering. Every line of a brief rendering also
/// appears in the detailed one.
pub fn render(report: &TicketReport, verbosity: Verbosity) -> String {
    let p = verbosity.projection();
    let e = &report.evaluation;
    let mut lines: Vec<String> = Vec::new();

    lines.push(format!("{}: {}", report.id, report.title));
    lines.push(format!("Type: {} ({})", e.card_type, report.basis));
    lines.push(format!(
        "Status: {} (coverage {}%, stage {})",
        e.status, e.coverage, e.grooming_stage
    ));
    if !e.status_reason.is_empty() {
        lines.push(format!("Reason: {}", e.status_reason));
    }
    if !e.missing.is_empty() {
        lines.push(format!("Missing: {}", field_list(&e.missing)));
    }
    if p.present && !e.present.is_empty() {
        lines.push(format!("Present: {}", field_list(&e.present)));
    }
    if !e.conflicts.is_empty() {
        lines.push("Conflicts:".to_string());
        for c in &e.conflicts {
            lines.push(format!("  - {}", c.describe()));
        }
    }

    if p.narrative {
        if let Some(n) = report.narrative.as_ref().filter(|n| n.rewritten) {
            lines.push("Suggested narrative:".to_string());
            lines.push(format!("  {}", n.text));
        }
    }

    let criteria = take(&report.acceptance_criteria, p.criteria);
    if !criteria.is_empty() {
        lines.push("Acceptance criteria:".to_string());
        for c in criteria {
            lines.push(format!("  - {}", c.text));
            if p.criterion_changes {
                for change in &c.changes {
                    lines.push(format!("      ({change})"));
                }
            }
        }
    }

    let s = &report.test_scenarios;
    let buckets = [
        ("Positive", &s.positive),
        ("Negative", &s.negative),
        ("Error", &s.error),
    ];
    if p.scenarios != Some(0) && buckets.iter().any(|(_, b)| !b.is_empty()) {
        lines.push("Test scenarios:".to_string());
        for (name, bucket) in buckets {
            let shown = take(bucket, p.scenarios);
            if shown.is_empty() {
                continue;
            }
            lines.push(format!("  {name}:"));
            for item in shown {
                lines.push(format!("    - {item}"));
            }
        }
    }

    let links = take(&report.design_links, p.links);
    if !links.is_empty() {
        lines.push("Design links:".to_string());
        for l in links {
            let mut line = format!("  - {} [{}]", l.url, l.section);
            if let Some(anchor) = &l.anchor_text {
                line.push_str(&format!(" \"{anchor}\""));
            }
            lines.push(line);
            if p.node_ids && !l.node_ids.is_empty() {
                lines.push(format!("      nodes: {}", l.node_ids.join(", ")));
            }
        }
    }

    if p.recommendations_per_role != Some(0) && !report.recommendations.is_empty() {
        lines.push("Recommendations:".to_string());
        for &role in Role::all() {
            let recs: Vec<&Recommendation> = report.recommendations_for(role).collect();
            let shown = take(&recs, p.recommendations_per_role);
            if shown.is_empty() {
                continue;
            }
            lines.push(format!("  {}:", role.label()));
            for r in shown {
                lines.push(format!("    - {}", r.text));
            }
        }
    }

    lines.join("\n")
}

pub fn render_outcome(outcome: &AnalysisOutcome, verbosity: Verbosity) -> String {
    match outcome {
        AnalysisOutcome::Report(r) => render(r, verbosity),
        AnalysisOutcome::Failed { id, error } => format!(
            "{}: analysis failed: {error}",
            id.as_deref().unwrap_or("<unknown>")
        ),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluate::Conflict;
    use crate::links::{LinkOrigin, LinkSection};
    use crate::types::{CardType, GroomingStage};
    use std::collections::HashSet;

    fn sample() -> TicketReport {
        TicketReport {
            id: "SHOP-7".to_string(),
            title: "Apply promo code".to_string(),
            basis: ClassificationBasis::Metadata,
            evaluation: DorEvaluation {
                card_type: CardType::Story,
                present: vec![DorField::UserStory, DorField::AcceptanceCriteria],
                missing: vec![DorField::Architecture, DorField::Team],
                conflicts: vec![Conflict {
                    field: DorField::AcceptanceCriteria,
                    first: "immediately".to_string(),
                    second: "after delay".to_string(),
                }],
                coverage: 50,
                status: ReadinessStatus::NeedsRefinement,
                status_rule: "conflicts-or-technical-gaps".to_string(),
                status_reason: "architecture missing".to_string(),
                grooming_stage: GroomingStage::Grooming,
            },
            domain: Domain::Checkout,
            domain_terms: vec!["promo code".to_string()],
            narrative: Some(NarrativeRewrite {
                original: None,
                text: "As a shopper, I want to apply a promo code so that I pay less.".to_string(),
                rewritten: true,
            }),
            acceptance_criteria: (1..=5)
                .map(|i| CriterionRewrite {
                    original: Some(format!("Criterion {i}")),
                    text: format!("Criterion {i} within 2 seconds"),
                    changes: vec!["added time bound \"within 2 seconds\"".to_string()],
                })
                .collect(),
            test_scenarios: TestScenarios {
                positive: vec!["p1".into(), "p2".into(), "p3".into()],
                negative: vec!["n1".into(), "n2".into()],
                error: vec!["e1".into(), "e2".into()],
            },
            design_links: vec![DesignLink {
                url: "https://www.figma.com/file/ABC123?node-id=5:10".to_string(),
                file_id: "ABC123".to_string(),
                node_ids: vec!["5:10".to_string()],
                anchor_text: Some("Figma Prototype".to_string()),
                section: LinkSection::Description,
                origin: LinkOrigin::Anchor,
            }],
            recommendations: vec![
                Recommendation { role: Role::ProductOwner, text: "po 1".into() },
                Recommendation { role: Role::ProductOwner, text: "po 2".into() },
                Recommendation { role: Role::ProductOwner, text: "po 3".into() },
                Recommendation { role: Role::Engineering, text: "eng 1".into() },
            ],
        }
    }

    #[test]
    fn verbosity_parses() {
        assert_eq!("Brief".parse::<Verbosity>().unwrap(), Verbosity::Brief);
        assert_eq!(" detailed ".parse::<Verbosity>().unwrap(), Verbosity::Detailed);
        assert!(matches!(
            "loud".parse::<Verbosity>(),
            Err(DorError::UnknownVerbosity(_))
        ));
        assert_eq!(Verbosity::default(), Verbosity::Balanced);
    }

    #[test]
    fn rendering_is_deterministic() {
        let r = sample();
        for &v in Verbosity::all() {
            assert_eq!(render(&r, v), render(&r, v));
        }
    }

    #[test]
    fn brief_lines_are_subset_of_detailed() {
        let r = sample();
        let detailed: HashSet<String> = render(&r, Verbosity::Detailed).lines().map(String::from).collect();
        for &v in &[Verbosity::Brief, Verbosity::Balanced] {
            for line in render(&r, v).lines() {
                assert!(detailed.contains(line), "{v}: {line:?} not in detailed output");
            }
        }
    }

    #[test]
    fn presets_differ_in_selection() {
        let r = sample();
        let brief = render(&r, Verbosity::Brief);
        let balanced = render(&r, Verbosity::Balanced);
        let detailed = render(&r, Verbosity::Detailed);

        assert!(brief.contains("Status: Needs Refinement (coverage 50%, stage grooming)"));
        assert!(brief.contains("Missing: Architecture, Team"));
        assert!(brief.contains("\"immediately\" contradicts \"after delay\""));
        assert!(!brief.contains("Acceptance criteria:"));
        assert!(!brief.contains("po 3"));

        assert!(balanced.contains("Criterion 3 within"));
        assert!(!balanced.contains("Criterion 4 within"));
        assert!(!balanced.contains("p3"));
        assert!(balanced.contains("Suggested narrative:"));
        assert!(!balanced.contains("nodes: 5:10"));

        assert!(detailed.contains("Criterion 5 within"));
        assert!(detailed.contains("(added time bound"));
        assert!(detailed.contains("nodes: 5:10"));
        assert!(detailed.contains("Present: User Story, Acceptance Criteria"));
    }

    #[test]
    fn outcome_json_shapes() {
        let ok = AnalysisOutcome::Report(Box::new(sample()));
        let v = serde_json::to_value(&ok).unwrap();
        assert_eq!(v["status"], "Needs Refinement");
        assert_eq!(v["coverage"], 50);
        assert_eq!(v["card_type"], "story");
        assert_eq!(v["recommendations"][0]["role"], "product_owner");

        let failed = AnalysisOutcome::failed(None, &DorError::MissingIdentity);
        let v = serde_json::to_value(&failed).unwrap();
        assert_eq!(v, serde_json::json!({ "error": "ticket has no usable identifier or title" }));
        assert_eq!(failed.status(), None);
    }

    #[test]
    fn outcome_roundtrips() {
        let ok = AnalysisOutcome::Report(Box::new(sample()));
        let json = serde_json::to_string(&ok).unwrap();
        let parsed: AnalysisOutcome = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, ok);
    }

    #[test]
    fn failed_outcome_renders_one_line() {
        let failed = AnalysisOutcome::Failed {
            id: Some("X".into()),
            error: "boom".into(),
        };
        assert_eq!(render_outcome(&failed, Verbosity::Brief), "X: analysis failed: boom");
    }
}
