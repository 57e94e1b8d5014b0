use crate::input::{parse_records, read_source};
use crate::output::print_json;
use dor_core::report::{render_outcome, AnalysisOutcome, Verbosity};
use dor_core::Analyzer;

pub fn run(analyzer: &Analyzer, input: &str, verbosity: Verbosity, json: bool) -> anyhow::Result<()> {
    let text = read_source(input)?;
    let origin = if input == "-" { "stdin" } else { input };
    let records = parse_records(&text, origin)?;
    let [record] = records.as_slice() else {
        anyhow::bail!(
            "{origin}: expected one ticket, found {}; use `dor batch` for lists",
            records.len()
        );
    };

    let outcome = analyzer.analyze_value(record);
    if json {
        print_json(&outcome)?;
    } else {
        println!("{}", render_outcome(&outcome, verbosity));
    }

    if let AnalysisOutcome::Failed { error, .. } = &outcome {
        anyhow::bail!("{origin}: ticket could not be analyzed: {error}");
    }
    Ok(())
}
