use crate::evaluate::Conflict;
use crate::fields::Resolution;
use crate::types::{CardType, DorField, ReadinessStatus};

// ---------------------------------------------------------------------------
// StatusContext
// ---------------------------------------------------------------------------

pub struct StatusContext<'a> {
    pub card_type: CardType,
    pub resolution: &'a Resolution,
    /// Required fields that did not resolve.
    pub missing: &'a [DorField],
    pub conflicts: &'a [Conflict],
}

impl StatusContext<'_> {
    fn is_missing(&self, field: DorField) -> bool {
        self.missing.contains(&field)
    }

    fn is_present(&self, field: DorField) -> bool {
        self.resolution.is_present(field)
    }
}

// ---------------------------------------------------------------------------
// StatusRule
// ---------------------------------------------------------------------------

/// A fn-pointer rule. Rules are evaluated in order; the first match decides.
pub struct StatusRule {
    pub id: &'static str,
    pub condition: fn(&StatusContext) -> bool,
    pub status: ReadinessStatus,
    pub reason: fn(&StatusContext) -> String,
}

macro_rules! rule {
    (
        id: $id:expr,
        condition: $cond:expr,
        status: $status:expr,
        reason: $reason:expr
    ) => {
        StatusRule {
            id: $id,
            condition: $cond,
            status: $status,
            reason: $reason,
        }
    };
}

// ---------------------------------------------------------------------------
// Condition helpers
// ---------------------------------------------------------------------------

fn narrative_required_and_absent(ctx: &StatusContext) -> bool {
    ctx.card_type.requires(DorField::UserStory) && !ctx.is_present(DorField::UserStory)
}

fn no_criteria_or_steps(ctx: &StatusContext) -> bool {
    !ctx.is_present(DorField::AcceptanceCriteria) && !ctx.is_present(DorField::TestingSteps)
}

fn conflicts_or_technical_gaps(ctx: &StatusContext) -> bool {
    !ctx.conflicts.is_empty()
        || ctx.is_missing(DorField::ImplementationDetails)
        || ctx.is_missing(DorField::Architecture)
}

fn accessibility_gap(ctx: &StatusContext) -> bool {
    (ctx.is_present(DorField::UserStory) || ctx.is_present(DorField::AcceptanceCriteria))
        && ctx.is_missing(DorField::AccessibilityCriteria)
}

fn complete(ctx: &StatusContext) -> bool {
    ctx.missing.is_empty() && ctx.conflicts.is_empty()
}

fn technical_gap_reason(ctx: &StatusContext) -> String {
    let mut parts = Vec::new();
    if !ctx.conflicts.is_empty() {
        parts.push(format!(
            "{} conflicting requirement(s) in acceptance criteria",
            ctx.conflicts.len()
        ));
    }
    for field in [DorField::ImplementationDetails, DorField::Architecture] {
        if ctx.is_missing(field) {
            parts.push(format!("{} missing", field.label().to_lowercase()));
        }
    }
    parts.join("; ")
}

fn missing_reason(ctx: &StatusContext) -> String {
    let names: Vec<&str> = ctx.missing.iter().map(|f| f.label()).collect();
    format!("{} required field(s) missing: {}", names.len(), names.join(", "))
}

// ---------------------------------------------------------------------------
// Default rule table
// ---------------------------------------------------------------------------

pub fn default_rules() -> Vec<StatusRule> {
    vec![
        rule!(
            id: "narrative-missing",
            condition: narrative_required_and_absent,
            status: ReadinessStatus::NotReady,
            reason: |ctx| format!("a {} needs a user story", ctx.card_type)
        ),
        rule!(
            id: "no-criteria-or-steps",
            condition: no_criteria_or_steps,
            status: ReadinessStatus::NotReady,
            reason: |_| "neither acceptance criteria nor testing steps are present".to_string()
        ),
        rule!(
            id: "conflicts-or-technical-gaps",
            condition: conflicts_or_technical_gaps,
            status: ReadinessStatus::NeedsRefinement,
            reason: technical_gap_reason
        ),
        rule!(
            id: "accessibility-missing",
            condition: accessibility_gap,
            status: ReadinessStatus::NeedsRefinement,
            reason: |_| "accessibility criteria missing".to_string()
        ),
        rule!(
            id: "complete",
            condition: complete,
            status: ReadinessStatus::Ready,
            reason: |_| "all required fields present, no conflicts".to_string()
        ),
        rule!(
            id: "incomplete",
            condition: |_| true,
            status: ReadinessStatus::NeedsRefinement,
            reason: missing_reason
        ),
    ]
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
