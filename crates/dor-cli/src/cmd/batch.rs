use crate::input::{collect_files, parse_records, read_source};
use crate::output::{print_json, print_table};
use dor_core::batch::{analyze_batch_values, BatchResult};
use dor_core::report::AnalysisOutcome;
use dor_core::Analyzer;
use std::path::PathBuf;

pub fn run(analyzer: &Analyzer, paths: &[PathBuf], json: bool) -> anyhow::Result<()> {
    let files = collect_files(paths)?;
    if files.is_empty() {
        anyhow::bail!("no ticket files found");
    }

    let mut records = Vec::new();
    for file in &files {
        let origin = file.display().to_string();
        let text = read_source(&origin)?;
        records.extend(parse_records(&text, &origin)?);
    }

    let result = analyze_batch_values(analyzer, &records);

    if json {
        let value = serde_json::json!({
            "generated_at": chrono::Utc::now().to_rfc3339(),
            "outcomes": result.outcomes,
            "summary": result.summary,
        });
        print_json(&value)?;
    } else {
        print_text(&result);
    }
    Ok(())
}

fn print_text(result: &BatchResult) {
    let rows: Vec<Vec<String>> = result
        .outcomes
        .iter()
        .map(|outcome| match outcome {
            AnalysisOutcome::Report(r) => vec![
                r.id.clone(),
                r.status().to_string(),
                format!("{}%", r.evaluation.coverage),
                r.evaluation.card_type.to_string(),
                r.evaluation.grooming_stage.to_string(),
                r.missing().len().to_string(),
            ],
            AnalysisOutcome::Failed { id, error } => vec![
                id.clone().unwrap_or_else(|| "<unknown>".to_string()),
                "Failed".to_string(),
                "-".to_string(),
                "-".to_string(),
                "-".to_string(),
                error.clone(),
            ],
        })
        .collect();
    print_table(
        &["ID", "STATUS", "COVERAGE", "TYPE", "STAGE", "MISSING"],
        &rows,
    );

    let s = &result.summary;
    println!();
    println!(
        "Total: {}  Ready: {}  Needs Refinement: {}  Not Ready: {}  Failed: {}",
        s.total, s.ready, s.needs_refinement, s.not_ready, s.failed
    );
    if !s.top_missing.is_empty() {
        println!("Most often missing:");
        for m in s.top_missing.iter().take(5) {
            println!("  {:<24} {}", m.field.label(), m.count);
        }
    }
}
