use crate::config::{Config, GroomingConfig};
use crate::domain::phrase_regex;
use crate::error::Result;
use crate::fields::Resolution;
use crate::rules::{default_rules, StatusContext, StatusRule};
use crate::types::{CardType, DorField, GroomingStage, ReadinessStatus};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

/// Two contradictory terms found together in the acceptance criteria.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conflict {
    pub field: DorField,
    pub first: String,
    pub second: String,
}

impl Conflict {
    pub fn describe(&self) -> String {
        format!(
            "{}: \"{}\" contradicts \"{}\"",
            self.field.label(),
            self.first,
            self.second
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DorEvaluation {
    pub card_type: CardType,
    pub present: Vec<DorField>,
    pub missing: Vec<DorField>,
    pub conflicts: Vec<Conflict>,
    /// Percentage of required fields present, 0–100.
    pub coverage: u32,
    pub status: ReadinessStatus,
    /// Id of the status rule that decided.
    pub status_rule: String,
    pub status_reason: String,
    pub grooming_stage: GroomingStage,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// `round(present / total * 100)`, halves rounding up. An empty checklist is
/// fully covered.
pub fn coverage(present: usize, total: usize) -> u32 {
    if total == 0 {
        return 100;
    }
    ((present * 200 + total) / (2 * total)) as u32
}

fn stage_from_coverage(cfg: &GroomingConfig, coverage: u32) -> GroomingStage {
    if coverage < cfg.discovery_below {
        GroomingStage::Discovery
    } else if coverage < cfg.ready_min_coverage {
        GroomingStage::Grooming
    } else {
        GroomingStage::Ready
    }
}

/// Grooming stage for a ticket.
///
/// A missing narrative always means discovery. Otherwise a mapped workflow
/// status decides (when status-aware), with a mapped "ready" held back to
/// grooming below `ready_min_coverage`. Everything else is coverage-derived.
pub fn grooming_stage(
    cfg: &GroomingConfig,
    coverage: u32,
    narrative_missing: bool,
    status: Option<&str>,
) -> GroomingStage {
    if narrative_missing {
        return GroomingStage::Discovery;
    }
    let mapped = status
        .filter(|_| cfg.status_aware)
        .and_then(|s| cfg.stage_for_status(s));
    match mapped {
        Some(GroomingStage::Ready) if coverage < cfg.ready_min_coverage => GroomingStage::Grooming,
        Some(stage) => stage,
        None => stage_from_coverage(cfg, coverage),
    }
}

// ---------------------------------------------------------------------------
// Evaluator
// ---------------------------------------------------------------------------

struct ConflictMatcher {
    first: String,
    second: String,
    first_re: Regex,
    second_re: Regex,
}

pub struct Evaluator {
    conflicts: Vec<ConflictMatcher>,
    grooming: GroomingConfig,
    rules: Vec<StatusRule>,
}

impl Evaluator {
    pub fn new(config: &Config) -> Result<Self> {
        let conflicts = config
            .conflicts
            .iter()
            .filter(|p| !p.first.trim().is_empty() && !p.second.trim().is_empty())
            .map(|p| {
                Ok(ConflictMatcher {
                    first: p.first.trim().to_string(),
                    second: p.second.trim().to_string(),
                    first_re: phrase_regex(&p.first)?,
                    second_re: phrase_regex(&p.second)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            conflicts,
            grooming: config.grooming.clone(),
            rules: default_rules(),
        })
    }

    /// Contradictory term pairs co-occurring in the acceptance criteria.
    pub fn conflicts(&self, resolution: &Resolution) -> Vec<Conflict> {
        let Some(text) = resolution.value(DorField::AcceptanceCriteria) else {
            return Vec::new();
        };
        self.conflicts
            .iter()
            .filter(|m| m.first_re.is_match(text) && m.second_re.is_match(text))
            .map(|m| Conflict {
                field: DorField::AcceptanceCriteria,
                first: m.first.clone(),
                second: m.second.clone(),
            })
            .collect()
    }

    pub fn evaluate(
        &self,
        card_type: CardType,
        resolution: &Resolution,
        workflow_status: Option<&str>,
    ) -> DorEvaluation {
        let (present, missing): (Vec<DorField>, Vec<DorField>) = card_type
            .required_fields()
            .iter()
            .copied()
            .partition(|f| resolution.is_present(*f));

        let conflicts = self.conflicts(resolution);
        let coverage = coverage(present.len(), present.len() + missing.len());

        let ctx = StatusContext {
            card_type,
            resolution,
            missing: &missing,
            conflicts: &conflicts,
        };
        let (status, status_rule, status_reason) = match self
            .rules
            .iter()
            .find(|r| (r.condition)(&ctx))
        {
            Some(rule) => (rule.status, rule.id.to_string(), (rule.reason)(&ctx)),
            None => (
                ReadinessStatus::NeedsRefinement,
                "none".to_string(),
                String::new(),
            ),
        };
        debug!(rule = %status_rule, status = %status, coverage, "status decided");

        let grooming_stage = grooming_stage(
            &self.grooming,
            coverage,
            missing.contains(&DorField::UserStory),
            workflow_status,
        );

        DorEvaluation {
            card_type,
            present,
            missing,
            conflicts,
            coverage,
            status,
            status_rule,
            status_reason,
            grooming_stage,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::FieldResolver;
    use crate::normalize::normalize;
    use crate::ticket::Ticket;
    use serde_json::{json, Value};

    fn evaluate(card_type: CardType, value: Value) -> DorEvaluation {
        let config = Config::default();
        let ticket: Ticket = serde_json::from_value(value).unwrap();
        let normalized = normalize(&ticket).unwrap();
        let resolution = FieldResolver::new(&config).unwrap().resolve(&normalized);
        Evaluator::new(&config)
            .unwrap()
            .evaluate(card_type, &resolution, normalized.status.as_deref())
    }

    fn full_story() -> Value {
        json!({
            "id": "SHOP-1",
            "title": "Apply promo code at checkout",
            "fields": {
                "User Story": "As a shopper, I want to apply a promo code at checkout so that I pay the discounted price.",
                "Acceptance Criteria": "Given a valid code, when applied, then the total drops within 2 seconds",
                "Testing Steps": "Apply SAVE10 and verify the total",
                "Implementation Details": "Call the pricing service",
                "Architecture": "No new services",
                "Accessibility Criteria": "Error text is announced by screen readers",
                "Brand": "Acme",
                "components": ["Checkout"],
                "Team": "Payments",
                "Story Points": 3
            }
        })
    }

    // -----------------------------------------------------------------------
    // Coverage & grooming
    // -----------------------------------------------------------------------

    #[test]
    fn coverage_rounds_half_up() {
        assert_eq!(coverage(0, 10), 0);
        assert_eq!(coverage(10, 10), 100);
        assert_eq!(coverage(1, 8), 13); // 12.5
        assert_eq!(coverage(1, 3), 33);
        assert_eq!(coverage(2, 3), 67);
        assert_eq!(coverage(0, 0), 100);
        for total in 1..=16 {
            for present in 0..=total {
                assert!(coverage(present, total) <= 100);
            }
        }
    }

    #[test]
    fn grooming_from_coverage() {
        let cfg = GroomingConfig::default();
        assert_eq!(grooming_stage(&cfg, 49, false, None), GroomingStage::Discovery);
        assert_eq!(grooming_stage(&cfg, 50, false, None), GroomingStage::Grooming);
        assert_eq!(grooming_stage(&cfg, 79, false, None), GroomingStage::Grooming);
        assert_eq!(grooming_stage(&cfg, 80, false, None), GroomingStage::Ready);
    }

    #[test]
    fn grooming_from_status_map() {
        let cfg = GroomingConfig::default();
        assert_eq!(
            grooming_stage(&cfg, 100, false, Some(" Backlog ")),
            GroomingStage::Discovery
        );
        assert_eq!(
            grooming_stage(&cfg, 90, false, Some("Ready for Dev")),
            GroomingStage::Ready
        );
        // mapped ready below 80% is held back
        assert_eq!(
            grooming_stage(&cfg, 70, false, Some("Ready for Dev")),
            GroomingStage::Grooming
        );
        // unmapped falls back to coverage
        assert_eq!(
            grooming_stage(&cfg, 30, false, Some("In Review")),
            GroomingStage::Discovery
        );
    }

    #[test]
    fn grooming_ignores_status_when_not_status_aware() {
        let cfg = GroomingConfig {
            status_aware: false,
            ..GroomingConfig::default()
        };
        assert_eq!(
            grooming_stage(&cfg, 100, false, Some("backlog")),
            GroomingStage::Ready
        );
    }

    #[test]
    fn missing_narrative_forces_discovery() {
        let cfg = GroomingConfig::default();
        assert_eq!(
            grooming_stage(&cfg, 100, true, Some("Ready for Dev")),
            GroomingStage::Discovery
        );
    }

    // -----------------------------------------------------------------------
    // Evaluation
    // -----------------------------------------------------------------------

    #[test]
    fn complete_story_is_ready() {
        let e = evaluate(CardType::Story, full_story());
        assert_eq!(e.missing, Vec::<DorField>::new());
        assert_eq!(e.present.len(), 10);
        assert_eq!(e.coverage, 100);
        assert_eq!(e.status, ReadinessStatus::Ready);
        assert_eq!(e.status_rule, "complete");
        assert_eq!(e.grooming_stage, GroomingStage::Ready);
    }

    #[test]
    fn bug_with_only_current_behaviour_is_not_ready() {
        let e = evaluate(
            CardType::Bug,
            json!({
                "id": "BUG-1",
                "fields": { "current_behaviour": "Basket empties on refresh" }
            }),
        );
        assert_eq!(e.present, vec![DorField::CurrentBehaviour]);
        assert_eq!(e.missing.len(), 8);
        assert_eq!(e.coverage, 11);
        assert_eq!(e.status, ReadinessStatus::NotReady);
        assert_eq!(e.status_rule, "no-criteria-or-steps");
    }

    #[test]
    fn contradictory_criteria_yield_one_conflict() {
        let mut story = full_story();
        story["fields"]["Acceptance Criteria"] =
            json!("The banner shows immediately.\nThe banner shows after delay of 3 seconds.");
        let e = evaluate(CardType::Story, story);
        assert_eq!(e.conflicts.len(), 1);
        assert_eq!(e.conflicts[0].first, "immediately");
        assert_eq!(e.conflicts[0].second, "after delay");
        assert_eq!(e.status, ReadinessStatus::NeedsRefinement);
        assert_eq!(e.status_rule, "conflicts-or-technical-gaps");
    }

    #[test]
    fn conflict_terms_match_whole_words() {
        let mut story = full_story();
        story["fields"]["Acceptance Criteria"] =
            json!("Always show the total; nevertheless keep it short within 2 seconds");
        let e = evaluate(CardType::Story, story);
        assert!(e.conflicts.is_empty());
    }

    #[test]
    fn none_counts_as_present() {
        let mut story = full_story();
        story["fields"]["Architecture"] = json!("None");
        let e = evaluate(CardType::Story, story);
        assert!(e.present.contains(&DorField::Architecture));
        assert_eq!(e.status, ReadinessStatus::Ready);
    }

    #[test]
    fn placeholder_counts_as_missing() {
        let mut story = full_story();
        story["fields"]["Architecture"] = json!("TBD");
        let e = evaluate(CardType::Story, story);
        assert!(e.missing.contains(&DorField::Architecture));
        assert_eq!(e.coverage, 90);
        assert_eq!(e.status, ReadinessStatus::NeedsRefinement);
        assert_eq!(e.status_rule, "conflicts-or-technical-gaps");
    }

    #[test]
    fn story_without_narrative_is_not_ready_and_in_discovery() {
        let mut story = full_story();
        story["fields"]
            .as_object_mut()
            .unwrap()
            .remove("User Story");
        story["status"] = json!("Ready for Dev");
        let e = evaluate(CardType::Story, story);
        assert!(e.missing.contains(&DorField::UserStory));
        assert_eq!(e.status, ReadinessStatus::NotReady);
        assert_eq!(e.status_rule, "narrative-missing");
        assert_eq!(e.grooming_stage, GroomingStage::Discovery);
    }

    #[test]
    fn accessibility_gap_needs_refinement() {
        let mut story = full_story();
        story["fields"]["Accessibility Criteria"] = json!("n/a");
        let e = evaluate(CardType::Story, story);
        assert_eq!(e.status, ReadinessStatus::NeedsRefinement);
        assert_eq!(e.status_rule, "accessibility-missing");
    }

    #[test]
    fn ready_iff_nothing_missing_and_no_conflicts() {
        let mut story = full_story();
        story["fields"]["Brand"] = json!("");
        let e = evaluate(CardType::Story, story);
        assert_eq!(e.status, ReadinessStatus::NeedsRefinement);
        assert_eq!(e.status_rule, "incomplete");
        assert!(e.status_reason.contains("Brand"));
    }
}
