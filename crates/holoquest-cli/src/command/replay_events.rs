use std::path::PathBuf;

use holoquest_engine::{
    BackgroundSink, JsonDirSink, Level, LevelSelection, MetricsAggregator,
    MetricsSink, NullSink, SessionSnapshot, SkillLevelUpdated, select_next_level,
};
use serde::Serialize;

use crate::util::{self, Output};

#[derive(Debug, Clone, clap::Args)]
pub(crate) struct ReplayEventsArg {
    /// Event log JSON file (an array of gameplay events)
    events: PathBuf,
    /// Saved model directory; without one only the rules and the default tier apply
    #[arg(long)]
    model: Option<PathBuf>,
    /// Agent config JSON file (rule thresholds, normalization)
    #[arg(long)]
    config: Option<PathBuf>,
    /// Directory to write a session snapshot to after every completed stage
    #[arg(long)]
    metrics_dir: Option<PathBuf>,
    /// Output file path
    #[arg(long)]
    output: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ReplaySummary {
    updates: Vec<SkillLevelUpdated>,
    next_level: Option<Level>,
    session: SessionSnapshot,
}

pub(crate) fn run(arg: &ReplayEventsArg) -> anyhow::Result<()> {
    let ReplayEventsArg {
        events,
        model,
        config,
        metrics_dir,
        output,
    } = arg;

    let log = util::read_event_log(events)?;
    let config = util::read_agent_config(config.as_deref())?;
    let normalization = config.normalization;
    let agent = util::inference_agent(config, 0, model.as_deref());
    if !agent.has_model() {
        eprintln!("No model loaded; network decisions default to Intermediate");
    }

    let sink: Box<dyn MetricsSink> = match metrics_dir {
        Some(dir) => Box::new(BackgroundSink::spawn(JsonDirSink::new(dir.clone()))),
        None => Box::new(NullSink),
    };
    let mut aggregator = MetricsAggregator::new(sink).with_normalization(normalization);

    eprintln!("Replaying {} events...", log.len());
    let mut updates = vec![];
    for event in &log {
        if event.is_restart() {
            eprintln!("Session restarted");
        }
        if let Some(update) = aggregator.handle_event(event, &agent) {
            let SkillLevelUpdated(result) = &update;
            eprintln!("{}: {}", result.level_id, result.skill_level);
            updates.push(update);
        }
    }

    let latest = aggregator.latest_skill_result();
    let next_level = latest
        .level_id
        .parse::<Level>()
        .ok()
        .and_then(|level| select_next_level(level, latest.skill_level));
    match next_level {
        Some(LevelSelection { level, tier }) => {
            eprintln!("Next level: {level} with {tier} variant");
            eprintln!("  {}", level.welcome());
        }
        None => eprintln!("Latest skill level: {}", latest.skill_level),
    }

    let summary = ReplaySummary {
        updates,
        next_level: next_level.map(|selection| selection.level),
        session: aggregator.snapshot(),
    };
    // flushes pending snapshots before the summary is written
    drop(aggregator);
    Output::save_json(&summary, output.clone())?;
    Ok(())
}
