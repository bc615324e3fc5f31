use clap::{Parser, Subcommand};

use self::{
    classify::ClassifyArg, replay_events::ReplayEventsArg, train::TrainArg,
    validate::ValidateArg,
};
use crate::logging;

mod classify;
mod replay_events;
mod train;
mod validate;

#[derive(Debug, Clone, Parser)]
#[command(author, version, about, long_about = None)]
pub struct CommandArgs {
    /// Log filter (e.g. `debug`, `holoquest_training=trace`); defaults to `RUST_LOG`, then `info`
    #[arg(long, global = true)]
    log_level: Option<String>,
    #[command(subcommand)]
    mode: Mode,
}

#[derive(Debug, Clone, Subcommand)]
enum Mode {
    /// Train the skill-tier Q-network on a simulated environment
    Train(#[clap(flatten)] TrainArg),
    /// Classify one set of skill metrics
    Classify(#[clap(flatten)] ClassifyArg),
    /// Run the validation table against a saved model
    Validate(#[clap(flatten)] ValidateArg),
    /// Feed a recorded gameplay event log through the metrics aggregator
    ReplayEvents(#[clap(flatten)] ReplayEventsArg),
}

pub fn run() -> anyhow::Result<()> {
    let args = CommandArgs::parse();
    logging::init_tracing(args.log_level.as_deref());
    match args.mode {
        Mode::Train(arg) => train::run(&arg)?,
        Mode::Classify(arg) => classify::run(&arg)?,
        Mode::Validate(arg) => validate::run(&arg)?,
        Mode::ReplayEvents(arg) => replay_events::run(&arg)?,
    }
    Ok(())
}
