use crate::classifier::{Classifier, ClassifyContext};
use crate::config::Config;
use crate::domain::{Domain, TermMatcher};
use crate::error::Result;
use crate::evaluate::Evaluator;
use crate::fields::FieldResolver;
use crate::links::extract_design_links;
use crate::normalize::normalize;
use crate::report::{AnalysisOutcome, TicketReport};
use crate::rewrite::{recommendations, Rewriter};
use crate::ticket::{record_id, Ticket};
use serde_json::Value;
use crate::types::DorField;
use tracing::{debug, warn};

/// The analysis pipeline, compiled once from a [`Config`].
///
/// Holds no per-ticket state; one analyzer can be shared across threads.
pub struct Analyzer {
    config: Config,
    resolver: FieldResolver,
    classifier: Classifier,
    evaluator: Evaluator,
    rewriter: Rewriter,
    terms: TermMatcher,
}

impl Analyzer {
    pub fn new(config: Config) -> Result<Self> {
        Ok(Self {
            resolver: FieldResolver::new(&config)?,
            classifier: Classifier::default(),
            evaluator: Evaluator::new(&config)?,
            rewriter: Rewriter::new(&config.rewrite)?,
            terms: TermMatcher::new(&config.domain_terms)?,
            config,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Analyze one ticket. Only a ticket without any identifier or title
    /// fails; everything else yields a best-effort report.
    pub fn try_analyze(&self, ticket: &Ticket) -> Result<TicketReport> {
        let normalized = normalize(ticket)?;
        let resolution = self.resolver.resolve(&normalized);
        let design_links = extract_design_links(&normalized);
        let classification = self
            .classifier
            .classify(&ClassifyContext::new(&normalized));
        let card_type = classification.card_type;
        debug!(
            ticket = %normalized.id,
            card_type = %card_type,
            basis = %classification.basis,
            "classified"
        );

        let evaluation =
            self.evaluator
                .evaluate(card_type, &resolution, normalized.status.as_deref());

        let text = normalized.full_text();
        let domain = Domain::detect(&text);
        let domain_terms = self.terms.extract(&text);

        let narrative = self.rewriter.narrative(
            card_type,
            resolution.value(DorField::UserStory),
            &normalized.title,
            &normalized.body,
            domain,
            &domain_terms,
        );
        let acceptance_criteria = self
            .rewriter
            .acceptance_criteria(resolution.value(DorField::AcceptanceCriteria), domain);
        let test_scenarios = self
            .rewriter
            .test_scenarios(resolution.value(DorField::TestingSteps), domain);
        let recommendations = recommendations(&evaluation, &design_links, domain);

        debug!(
            ticket = %normalized.id,
            status = %evaluation.status,
            coverage = evaluation.coverage,
            links = design_links.len(),
            "analyzed"
        );

        Ok(TicketReport {
            id: normalized.id,
            title: normalized.title,
            basis: classification.basis,
            evaluation,
            domain,
            domain_terms,
            narrative,
            acceptance_criteria,
            test_scenarios,
            design_links,
            recommendations,
        })
    }

    /// Like [`Analyzer::try_analyze`], but a failure becomes the fallback
    /// outcome carrying the reason.
    pub fn analyze(&self, ticket: &Ticket) -> AnalysisOutcome {
        match self.try_analyze(ticket) {
            Ok(report) => AnalysisOutcome::Report(Box::new(report)),
            Err(e) => {
                warn!(error = %e, "ticket analysis failed");
                AnalysisOutcome::failed(None, &e)
            }
        }
    }

    /// Analyze a raw JSON record. A record that cannot be read as a ticket
    /// becomes a failed outcome instead of an error.
    pub fn analyze_value(&self, value: &Value) -> AnalysisOutcome {
        match Ticket::from_value(value.clone()) {
            Ok(ticket) => self.analyze(&ticket),
            Err(e) => {
                warn!(error = %e, "ticket record rejected");
                AnalysisOutcome::failed(record_id(value), &e)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
