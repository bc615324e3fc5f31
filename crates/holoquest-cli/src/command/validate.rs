use std::path::PathBuf;

use anyhow::Context;
use holoquest_evaluator::persistence;
use holoquest_training::ValidationReport;

use crate::util::Output;

#[derive(Debug, Clone, clap::Args)]
pub(crate) struct ValidateArg {
    /// Saved model directory
    #[arg(long, default_value = "model")]
    model: PathBuf,
    /// Output file path
    #[arg(long)]
    output: Option<PathBuf>,
}

pub(crate) fn run(arg: &ValidateArg) -> anyhow::Result<()> {
    let ValidateArg { model, output } = arg;

    let network = persistence::load_model_dir(model)
        .with_context(|| format!("Failed to load model from {}", model.display()))?;
    let report = ValidationReport::run(&network, None);
    report.log();

    for case in &report.cases {
        let mark = if case.is_correct() { "ok" } else { "NG" };
        eprintln!(
            "  [{mark}] {:<14} expected {:<12} predicted {:<12} q={:?}",
            case.label, case.expected, case.predicted, case.q_values
        );
    }
    eprintln!(
        "Accuracy: {}/{} ({:.1}%)",
        report.correct(),
        report.total(),
        report.accuracy() * 100.0
    );

    Output::save_json(&report, output.clone())?;
    Ok(())
}
