use crate::analyzer::Analyzer;
use crate::report::AnalysisOutcome;
use crate::ticket::Ticket;
use crate::types::{DorField, ReadinessStatus};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::num::NonZeroUsize;
use std::thread;
use tracing::{debug, info};

/// How many tickets with a given field missing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissingCount {
    pub field: DorField,
    pub count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub total: usize,
    pub ready: usize,
    pub needs_refinement: usize,
    pub not_ready: usize,
    pub failed: usize,
    /// Most common first; ties by field key.
    pub top_missing: Vec<MissingCount>,
}

impl BatchSummary {
    /// Fold outcomes into totals. The result does not depend on their order.
    pub fn from_outcomes<'a>(outcomes: impl IntoIterator<Item = &'a AnalysisOutcome>) -> Self {
        let mut summary = BatchSummary::default();
        let mut missing: BTreeMap<&'static str, (DorField, usize)> = BTreeMap::new();
        for outcome in outcomes {
            summary.total += 1;
            let Some(report) = outcome.report() else {
                summary.failed += 1;
                continue;
            };
            match report.status() {
                ReadinessStatus::Ready => summary.ready += 1,
                ReadinessStatus::NeedsRefinement => summary.needs_refinement += 1,
                ReadinessStatus::NotReady => summary.not_ready += 1,
            }
            for &field in report.missing() {
                missing.entry(field.as_str()).or_insert((field, 0)).1 += 1;
            }
        }
        let mut top: Vec<MissingCount> = missing
            .into_values()
            .map(|(field, count)| MissingCount { field, count })
            .collect();
        // BTreeMap order is key order, so a stable sort by count keeps ties by key
        top.sort_by(|a, b| b.count.cmp(&a.count));
        summary.top_missing = top;
        summary
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchResult {
    /// In input order.
    pub outcomes: Vec<AnalysisOutcome>,
    pub summary: BatchSummary,
}

fn worker_count(tickets: usize) -> usize {
    let available = thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1);
    available.min(tickets).max(1)
}

/// Analyze many tickets in parallel. Outcomes come back in input order.
pub fn analyze_batch(analyzer: &Analyzer, tickets: &[Ticket]) -> BatchResult {
    run_batch(tickets, |t| analyzer.analyze(t))
}

/// Like [`analyze_batch`] over raw JSON records. A record that is not a
/// ticket becomes a failed outcome and the rest of the batch still runs.
pub fn analyze_batch_values(analyzer: &Analyzer, records: &[Value]) -> BatchResult {
    run_batch(records, |v| analyzer.analyze_value(v))
}

fn run_batch<T, F>(items: &[T], analyze: F) -> BatchResult
where
    T: Sync,
    F: Fn(&T) -> AnalysisOutcome + Sync,
{
    let workers = worker_count(items.len());
    let chunk = items.len().div_ceil(workers).max(1);
    info!(tickets = items.len(), workers, "batch analysis started");

    let analyze = &analyze;
    let outcomes: Vec<AnalysisOutcome> = thread::scope(|scope| {
        let handles: Vec<_> = items
            .chunks(chunk)
            .enumerate()
            .map(|(i, part)| {
                scope.spawn(move || {
                    debug!(worker = i, tickets = part.len(), "worker started");
                    part.iter().map(analyze).collect::<Vec<_>>()
                })
            })
            .collect();
        handles
            .into_iter()
            .flat_map(|h| match h.join() {
                Ok(part) => part,
                Err(panic) => std::panic::resume_unwind(panic),
            })
            .collect()
    });

    let summary = BatchSummary::from_outcomes(&outcomes);
    info!(
        total = summary.total,
        ready = summary.ready,
        needs_refinement = summary.needs_refinement,
        not_ready = summary.not_ready,
        failed = summary.failed,
        "batch analysis finished"
    );
    BatchResult { outcomes, summary }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
