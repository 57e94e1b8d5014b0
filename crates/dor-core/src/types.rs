use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// DorField
// ---------------------------------------------------------------------------

/// One entry of the Definition-of-Readiness checklist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DorField {
    UserStory,
    AcceptanceCriteria,
    TestingSteps,
    ImplementationDetails,
    Architecture,
    AccessibilityCriteria,
    Brand,
    Component,
    Team,
    SizeEstimate,
    Environment,
    Severity,
    SuccessMetric,
    CurrentBehaviour,
    StepsToReproduce,
    ExpectedBehaviour,
}

impl DorField {
    pub fn all() -> &'static [DorField] {
        &[
            DorField::UserStory,
            DorField::AcceptanceCriteria,
            DorField::TestingSteps,
            DorField::ImplementationDetails,
            DorField::Architecture,
            DorField::AccessibilityCriteria,
            DorField::Brand,
            DorField::Component,
            DorField::Team,
            DorField::SizeEstimate,
            DorField::Environment,
            DorField::Severity,
            DorField::SuccessMetric,
            DorField::CurrentBehaviour,
            DorField::StepsToReproduce,
            DorField::ExpectedBehaviour,
        ]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DorField::UserStory => "user_story",
            DorField::AcceptanceCriteria => "acceptance_criteria",
            DorField::TestingSteps => "testing_steps",
            DorField::ImplementationDetails => "implementation_details",
            DorField::Architecture => "architecture",
            DorField::AccessibilityCriteria => "accessibility_criteria",
            DorField::Brand => "brand",
            DorField::Component => "component",
            DorField::Team => "team",
            DorField::SizeEstimate => "size_estimate",
            DorField::Environment => "environment",
            DorField::Severity => "severity",
            DorField::SuccessMetric => "success_metric",
            DorField::CurrentBehaviour => "current_behaviour",
            DorField::StepsToReproduce => "steps_to_reproduce",
            DorField::ExpectedBehaviour => "expected_behaviour",
        }
    }

    /// Human-readable name used in rendered reports and recommendations.
    pub fn label(self) -> &'static str {
        match self {
            DorField::UserStory => "User Story",
            DorField::AcceptanceCriteria => "Acceptance Criteria",
            DorField::TestingSteps => "Testing Steps",
            DorField::ImplementationDetails => "Implementation Details",
            DorField::Architecture => "Architecture",
            DorField::AccessibilityCriteria => "Accessibility Criteria",
            DorField::Brand => "Brand",
            DorField::Component => "Component",
            DorField::Team => "Team",
            DorField::SizeEstimate => "Size Estimate",
            DorField::Environment => "Environment",
            DorField::Severity => "Severity",
            DorField::SuccessMetric => "Success Metric",
            DorField::CurrentBehaviour => "Current Behaviour",
            DorField::StepsToReproduce => "Steps to Reproduce",
            DorField::ExpectedBehaviour => "Expected Behaviour",
        }
    }
}

impl fmt::Display for DorField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DorField {
    type Err = crate::error::DorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DorField::all()
            .iter()
            .copied()
            .find(|f| f.as_str() == s)
            .ok_or_else(|| crate::error::DorError::UnknownField(s.to_string()))
    }
}

// ---------------------------------------------------------------------------
// CardType
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CardType {
    Story,
    Bug,
    Task,
    Feature,
}

impl CardType {
    pub fn all() -> &'static [CardType] {
        &[CardType::Story, CardType::Bug, CardType::Task, CardType::Feature]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CardType::Story => "story",
            CardType::Bug => "bug",
            CardType::Task => "task",
            CardType::Feature => "feature",
        }
    }

    /// The ordered DoR checklist for this card type. Every type requires
    /// acceptance criteria.
    pub fn required_fields(self) -> &'static [DorField] {
        match self {
            CardType::Story => &[
                DorField::UserStory,
                DorField::AcceptanceCriteria,
                DorField::TestingSteps,
                DorField::ImplementationDetails,
                DorField::Architecture,
                DorField::AccessibilityCriteria,
                DorField::Brand,
                DorField::Component,
                DorField::Team,
                DorField::SizeEstimate,
            ],
            CardType::Bug => &[
                DorField::CurrentBehaviour,
                DorField::StepsToReproduce,
                DorField::ExpectedBehaviour,
                DorField::AcceptanceCriteria,
                DorField::TestingSteps,
                DorField::Environment,
                DorField::Severity,
                DorField::Component,
                DorField::Team,
            ],
            CardType::Task => &[
                DorField::AcceptanceCriteria,
                DorField::TestingSteps,
                DorField::ImplementationDetails,
                DorField::Component,
                DorField::Team,
                DorField::SizeEstimate,
            ],
            CardType::Feature => &[
                DorField::UserStory,
                DorField::AcceptanceCriteria,
                DorField::Architecture,
                DorField::AccessibilityCriteria,
                DorField::SuccessMetric,
                DorField::Brand,
                DorField::Team,
                DorField::SizeEstimate,
            ],
        }
    }

    pub fn requires(self, field: DorField) -> bool {
        self.required_fields().contains(&field)
    }
}

impl fmt::Display for CardType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CardType {
    type Err = crate::error::DorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "story" => Ok(CardType::Story),
            "bug" => Ok(CardType::Bug),
            "task" => Ok(CardType::Task),
            "feature" => Ok(CardType::Feature),
            _ => Err(crate::error::DorError::UnknownCardType(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// ReadinessStatus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReadinessStatus {
    #[serde(rename = "Ready")]
    Ready,
    #[serde(rename = "Needs Refinement")]
    NeedsRefinement,
    #[serde(rename = "Not Ready")]
    NotReady,
}

impl ReadinessStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ReadinessStatus::Ready => "Ready",
            ReadinessStatus::NeedsRefinement => "Needs Refinement",
            ReadinessStatus::NotReady => "Not Ready",
        }
    }
}

impl fmt::Display for ReadinessStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// GroomingStage
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroomingStage {
    Discovery,
    Grooming,
    Ready,
}

impl GroomingStage {
    pub fn as_str(self) -> &'static str {
        match self {
            GroomingStage::Discovery => "discovery",
            GroomingStage::Grooming => "grooming",
            GroomingStage::Ready => "ready",
        }
    }
}

impl fmt::Display for GroomingStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Role
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    ProductOwner,
    Qa,
    Engineering,
}

impl Role {
    pub fn all() -> &'static [Role] {
        &[Role::ProductOwner, Role::Qa, Role::Engineering]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::ProductOwner => "product_owner",
            Role::Qa => "qa",
            Role::Engineering => "engineering",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Role::ProductOwner => "Product Owner",
            Role::Qa => "QA",
            Role::Engineering => "Engineering",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
