use std::path::PathBuf;

use holoquest_engine::{
    Level, LevelSelection, SkillMetrics, SkillState, SkillTier, select_next_level,
};
use holoquest_evaluator::ClassificationReason;
use serde::Serialize;

use crate::util::{self, Output};

#[derive(Debug, Clone, clap::Args)]
pub(crate) struct ClassifyArg {
    /// Average seconds per completed stage
    #[arg(long)]
    time: f32,
    /// Average attempts per puzzle
    #[arg(long)]
    attempts: f32,
    /// Fraction of puzzles solved
    #[arg(long)]
    success: f32,
    /// Saved model directory; without one only the rules and the default tier apply
    #[arg(long)]
    model: Option<PathBuf>,
    /// Agent config JSON file (rule thresholds, normalization)
    #[arg(long)]
    config: Option<PathBuf>,
    /// Level just completed; prints the level to load next
    #[arg(long)]
    level: Option<Level>,
    /// Output file path
    #[arg(long)]
    output: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ClassifyOutput {
    metrics: SkillMetrics,
    state: SkillState,
    tier: SkillTier,
    reason: ClassificationReason,
    q_values: Option<[f32; SkillTier::LEN]>,
    next_level: Option<NextLevel>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct NextLevel {
    level: Level,
    tier: SkillTier,
    welcome: &'static str,
}

impl From<LevelSelection> for NextLevel {
    fn from(selection: LevelSelection) -> Self {
        Self {
            level: selection.level,
            tier: selection.tier,
            welcome: selection.level.welcome(),
        }
    }
}

pub(crate) fn run(arg: &ClassifyArg) -> anyhow::Result<()> {
    let ClassifyArg {
        time,
        attempts,
        success,
        model,
        config,
        level,
        output,
    } = arg;

    let config = util::read_agent_config(config.as_deref())?;
    let normalization = config.normalization;
    let agent = util::inference_agent(config, 0, model.as_deref());

    let metrics = SkillMetrics::new(*time, *attempts, *success);
    let classification = agent.classify(&metrics);
    eprintln!(
        "Classified as {} ({})",
        classification.tier, classification.reason
    );

    let next_level = level.and_then(|level| select_next_level(level, classification.tier));
    match (level, next_level) {
        (Some(_), Some(selection)) => eprintln!("Next level: {selection}"),
        (Some(level), None) => eprintln!("{level} is the last level"),
        (None, _) => {}
    }

    let result = ClassifyOutput {
        metrics,
        state: SkillState::from_metrics(&metrics, &normalization),
        tier: classification.tier,
        reason: classification.reason,
        q_values: classification.q_values.map(|q| q.0),
        next_level: next_level.map(NextLevel::from),
    };
    Output::save_json(&result, output.clone())?;
    Ok(())
}
