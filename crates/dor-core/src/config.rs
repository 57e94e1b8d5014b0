use crate::error::{DorError, Result};
use crate::types::{DorField, GroomingStage};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// FieldSourceConfig
// ---------------------------------------------------------------------------

/// Where to look for one DoR field, in priority order: vendor field ids,
/// then generic field names matching an alias, then body sections starting
/// with a heading.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldSourceConfig {
    #[serde(default)]
    pub vendor_ids: Vec<String>,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub headings: Vec<String>,
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn sources(vendor_ids: &[&str], aliases: &[&str], headings: &[&str]) -> FieldSourceConfig {
    FieldSourceConfig {
        vendor_ids: strings(vendor_ids),
        aliases: strings(aliases),
        headings: strings(headings),
    }
}

/// Built-in source table for a field.
pub fn default_sources(field: DorField) -> FieldSourceConfig {
    match field {
        DorField::UserStory => sources(
            &["customfield_10401"],
            &["user story", "narrative", "story description"],
            &["user story", "narrative", "story"],
        ),
        DorField::AcceptanceCriteria => sources(
            &["customfield_10500", "customfield_10035"],
            &["acceptance criteria", "ac", "acceptance"],
            &["acceptance criteria", "acceptance", "ac"],
        ),
        DorField::TestingSteps => sources(
            &["customfield_10501"],
            &["testing steps", "test steps", "qa steps", "test scenarios", "test cases", "how to test"],
            &["testing steps", "test steps", "test scenarios", "test cases", "qa steps", "how to test", "test plan"],
        ),
        DorField::ImplementationDetails => sources(
            &["customfield_10502"],
            &["implementation details", "implementation", "technical details", "dev notes"],
            &["implementation details", "implementation", "technical details", "dev notes"],
        ),
        DorField::Architecture => sources(
            &["customfield_10503"],
            &["architecture", "technical design", "solution design"],
            &["architecture", "technical design", "solution design"],
        ),
        DorField::AccessibilityCriteria => sources(
            &["customfield_10504"],
            &["accessibility criteria", "accessibility", "a11y"],
            &["accessibility criteria", "accessibility", "a11y"],
        ),
        DorField::Brand => sources(&["customfield_10600"], &["brand", "brands"], &["brand"]),
        DorField::Component => sources(
            &["components"],
            &["component", "components"],
            &["component"],
        ),
        DorField::Team => sources(
            &["customfield_10001"],
            &["team", "squad", "owning team"],
            &["team", "squad"],
        ),
        DorField::SizeEstimate => sources(
            &["customfield_10016", "customfield_10026"],
            &["size", "estimate", "story points", "size estimate", "t shirt size"],
            &["size estimate", "story points", "estimate", "size"],
        ),
        DorField::Environment => sources(
            &["environment"],
            &["environment", "env", "affected environment"],
            &["environment"],
        ),
        DorField::Severity => sources(&["customfield_10700"], &["severity", "impact"], &["severity"]),
        DorField::SuccessMetric => sources(
            &["customfield_10800"],
            &["success metric", "success metrics", "kpi", "success criteria"],
            &["success metrics", "success metric", "success criteria", "kpi"],
        ),
        DorField::CurrentBehaviour => sources(
            &["customfield_10901"],
            &["current behaviour", "current behavior", "actual behaviour", "actual behavior", "actual result"],
            &["current behaviour", "current behavior", "actual behaviour", "actual behavior", "actual result"],
        ),
        DorField::StepsToReproduce => sources(
            &["customfield_10902"],
            &["steps to reproduce", "reproduction steps", "repro steps"],
            &["steps to reproduce", "reproduction steps", "repro steps"],
        ),
        DorField::ExpectedBehaviour => sources(
            &["customfield_10903"],
            &["expected behaviour", "expected behavior", "expected result"],
            &["expected behaviour", "expected behavior", "expected result"],
        ),
    }
}

// ---------------------------------------------------------------------------
// ConflictPair
// ---------------------------------------------------------------------------

/// Two acceptance-criteria terms that contradict each other when both appear.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictPair {
    pub first: String,
    pub second: String,
}

impl ConflictPair {
    pub fn new(first: impl Into<String>, second: impl Into<String>) -> Self {
        Self {
            first: first.into(),
            second: second.into(),
        }
    }
}

fn default_conflicts() -> Vec<ConflictPair> {
    vec![
        ConflictPair::new("immediately", "after delay"),
        ConflictPair::new("always", "never"),
        ConflictPair::new("mandatory", "optional"),
        ConflictPair::new("synchronous", "asynchronous"),
        ConflictPair::new("enabled by default", "disabled by default"),
    ]
}

fn default_placeholders() -> Vec<String> {
    strings(&[
        "tbd",
        "tba",
        "tbc",
        "n/a",
        "na",
        "pending",
        "todo",
        "to do",
        "wip",
        "placeholder",
        "to be determined",
        "to be defined",
        "to be confirmed",
        "coming soon",
        "xxx",
    ])
}

fn default_domain_terms() -> Vec<String> {
    strings(&[
        "checkout",
        "basket",
        "cart",
        "payment",
        "promo code",
        "gift card",
        "wishlist",
        "search",
        "filters",
        "sort",
        "PLP",
        "PDP",
        "product listing page",
        "product detail page",
        "my account",
        "login",
        "order history",
        "delivery",
        "returns",
        "store locator",
        "newsletter",
    ])
}

// ---------------------------------------------------------------------------
// GroomingConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroomingConfig {
    /// Derive the stage from the ticket's workflow status when one is mapped.
    #[serde(default = "default_status_aware")]
    pub status_aware: bool,
    /// Lowercased workflow status → grooming stage.
    #[serde(default = "default_status_map")]
    pub status_map: BTreeMap<String, GroomingStage>,
    /// Coverage below this is "discovery".
    #[serde(default = "default_discovery_below")]
    pub discovery_below: u32,
    /// Coverage at or above this may be "ready"; below it a mapped "ready"
    /// is downgraded to "grooming".
    #[serde(default = "default_ready_min_coverage")]
    pub ready_min_coverage: u32,
}

fn default_status_aware() -> bool {
    true
}

fn default_discovery_below() -> u32 {
    50
}

fn default_ready_min_coverage() -> u32 {
    80
}

fn default_status_map() -> BTreeMap<String, GroomingStage> {
    let mut m = BTreeMap::new();
    for s in ["backlog", "new", "open", "idea", "discovery"] {
        m.insert(s.to_string(), GroomingStage::Discovery);
    }
    for s in ["to do", "refinement", "in refinement", "grooming", "needs grooming", "in analysis"] {
        m.insert(s.to_string(), GroomingStage::Grooming);
    }
    for s in ["ready", "ready for dev", "ready for development", "selected for development"] {
        m.insert(s.to_string(), GroomingStage::Ready);
    }
    m
}

impl Default for GroomingConfig {
    fn default() -> Self {
        Self {
            status_aware: default_status_aware(),
            status_map: default_status_map(),
            discovery_below: default_discovery_below(),
            ready_min_coverage: default_ready_min_coverage(),
        }
    }
}

impl GroomingConfig {
    pub fn stage_for_status(&self, status: &str) -> Option<GroomingStage> {
        let key = status.trim().to_lowercase();
        self.status_map.get(&key).copied()
    }
}

// ---------------------------------------------------------------------------
// RewriteConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewriteConfig {
    /// A well-formed narrative shorter than this is still rewritten.
    #[serde(default = "default_min_narrative_length")]
    pub min_narrative_length: usize,
    /// Appended to acceptance criteria that carry no measurable qualifier.
    #[serde(default = "default_latency_clause")]
    pub latency_clause: String,
    /// Vague phrase → specific replacement.
    #[serde(default = "default_vague_phrases")]
    pub vague_phrases: BTreeMap<String, String>,
    #[serde(default = "default_min_scenarios")]
    pub min_scenarios: usize,
    #[serde(default = "default_max_scenarios")]
    pub max_scenarios: usize,
}

fn default_min_narrative_length() -> usize {
    40
}

fn default_latency_clause() -> String {
    "within 2 seconds".to_string()
}

fn default_min_scenarios() -> usize {
    2
}

fn default_max_scenarios() -> usize {
    5
}

fn default_vague_phrases() -> BTreeMap<String, String> {
    [
        ("user-friendly", "operable by keyboard and screen reader in no more than 3 steps"),
        ("user friendly", "operable by keyboard and screen reader in no more than 3 steps"),
        ("easy to use", "completable by a first-time user without help text"),
        ("intuitive", "consistent with existing design-system patterns"),
        ("seamless", "without a full page reload"),
        ("seamlessly", "without a full page reload"),
        ("fast", "within 2 seconds"),
        ("quickly", "within 2 seconds"),
        ("properly", "as specified in the linked design"),
        ("correctly", "as specified in the linked design"),
        ("as expected", "matching the documented expected result"),
        ("should work", "must succeed"),
        ("works well", "meets every listed criterion"),
        ("responsive", "rendered without horizontal scrolling from 320px to 1440px wide"),
        ("etc.", "(full list enumerated in the ticket)"),
        ("and/or", "and"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

impl Default for RewriteConfig {
    fn default() -> Self {
        Self {
            min_narrative_length: default_min_narrative_length(),
            latency_clause: default_latency_clause(),
            vague_phrases: default_vague_phrases(),
            min_scenarios: default_min_scenarios(),
            max_scenarios: default_max_scenarios(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config (top-level)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default = "default_placeholders")]
    pub placeholders: Vec<String>,
    /// Per-field overrides keyed by field name (`acceptance_criteria`, ...).
    /// Fields without an entry use [`default_sources`].
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub fields: BTreeMap<String, FieldSourceConfig>,
    #[serde(default = "default_conflicts")]
    pub conflicts: Vec<ConflictPair>,
    #[serde(default = "default_domain_terms")]
    pub domain_terms: Vec<String>,
    #[serde(default)]
    pub grooming: GroomingConfig,
    #[serde(default)]
    pub rewrite: RewriteConfig,
}

fn default_version() -> u32 {
    1
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: default_version(),
            placeholders: default_placeholders(),
            fields: BTreeMap::new(),
            conflicts: default_conflicts(),
            domain_terms: default_domain_terms(),
            grooming: GroomingConfig::default(),
            rewrite: RewriteConfig::default(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(DorError::ConfigNotFound(path.display().to_string()));
        }
        let data = std::fs::read_to_string(path)?;
        let cfg: Config = serde_yaml::from_str(&data)?;
        Ok(cfg)
    }

    /// Effective sources for `field`: the configured override, else the
    /// built-in table.
    pub fn sources_for(&self, field: DorField) -> FieldSourceConfig {
        self.fields
            .get(field.as_str())
            .cloned()
            .unwrap_or_else(|| default_sources(field))
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        // 1. Placeholder vocabulary
        if self.placeholders.is_empty() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "placeholder vocabulary is empty: 'TBD' values will count as present"
                    .to_string(),
            });
        }
        if self.placeholders.iter().any(|p| p.trim().eq_ignore_ascii_case("none")) {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "'none' in placeholders is ignored: an explicit 'none' always counts as present"
                    .to_string(),
            });
        }

        // 2. Field override keys must name real fields
        for (key, src) in &self.fields {
            if let Err(e) = key.parse::<DorField>() {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Warning,
                    message: format!("{e} in fields"),
                });
            } else if src.vendor_ids.is_empty() && src.aliases.is_empty() && src.headings.is_empty()
            {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Warning,
                    message: format!("field '{key}' has no sources and can never be resolved"),
                });
            }
        }

        // 3. Conflict pairs
        for pair in &self.conflicts {
            let (a, b) = (pair.first.trim(), pair.second.trim());
            if a.is_empty() || b.is_empty() {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Error,
                    message: "conflict pair has an empty term".to_string(),
                });
            } else if a.eq_ignore_ascii_case(b) {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Error,
                    message: format!("conflict pair '{a}' vs '{b}' uses the same term twice"),
                });
            }
        }

        // 4. Grooming thresholds
        let g = &self.grooming;
        if g.ready_min_coverage > 100 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: format!(
                    "grooming.ready_min_coverage={} is above 100",
                    g.ready_min_coverage
                ),
            });
        }
        if g.discovery_below > g.ready_min_coverage {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: format!(
                    "grooming.discovery_below={} exceeds ready_min_coverage={}",
                    g.discovery_below, g.ready_min_coverage
                ),
            });
        }

        // 5. Scenario bounds
        let r = &self.rewrite;
        if r.min_scenarios > r.max_scenarios {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: format!(
                    "rewrite.min_scenarios={} exceeds max_scenarios={}",
                    r.min_scenarios, r.max_scenarios
                ),
            });
        }
        if r.latency_clause.trim().is_empty() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "rewrite.latency_clause is empty".to_string(),
            });
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
