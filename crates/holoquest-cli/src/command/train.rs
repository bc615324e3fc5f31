use std::path::PathBuf;

use anyhow::Context;
use holoquest_engine::SkillTier;
use holoquest_training::{
    ClassificationEnvironment, Environment, QLearningAgent, SimulatedEnvironment,
};

use crate::util::{self, Output};

#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, derive_more::FromStr)]
pub enum EnvKind {
    /// Rewards labelling the simulated player with the right tier
    #[default]
    Classification,
    /// Rewards keeping the simulated player in a balanced experience
    Simulated,
}

#[derive(Default, Debug, Clone, clap::Args)]
pub(crate) struct TrainArg {
    /// Training environment (`classification` or `simulated`)
    #[arg(long, default_value = "classification")]
    env: EnvKind,
    #[arg(long, default_value_t = 1000)]
    episodes: usize,
    /// Seed of the agent; the environment uses the same seed
    #[arg(long, default_value_t = 42)]
    seed: u64,
    /// Agent config JSON file; omitted fields use defaults
    #[arg(long)]
    config: Option<PathBuf>,
    /// Simulation params JSON file; omitted fields use defaults
    #[arg(long)]
    simulation: Option<PathBuf>,
    /// Directory to save the trained model to
    #[arg(long, default_value = "model")]
    model: PathBuf,
    /// Training report output file path
    #[arg(long)]
    output: Option<PathBuf>,
}

pub(crate) fn run(arg: &TrainArg) -> anyhow::Result<()> {
    let TrainArg {
        env,
        episodes,
        seed,
        config,
        simulation,
        model,
        output,
    } = arg;

    let config = util::read_agent_config(config.as_deref())?;
    let params = util::read_simulation_params(simulation.as_deref())?;
    let mut environment: Box<dyn Environment> = match env {
        EnvKind::Classification => Box::new(ClassificationEnvironment::new(params, *seed)),
        EnvKind::Simulated => Box::new(SimulatedEnvironment::new(params, *seed)),
    };

    eprintln!("Training {episodes} episodes on {env:?} environment (seed {seed})...");
    let mut agent = QLearningAgent::trainable(config, *seed);
    let report = agent.train(environment.as_mut(), *episodes)?;

    eprintln!("Training finished:");
    eprintln!("  replays:       {}", report.replays);
    eprintln!("  final epsilon: {:.3}", report.final_epsilon);
    for tier in SkillTier::ALL {
        eprintln!(
            "  {:<13} {} actions",
            format!("{tier}:"),
            report.action_counts[tier.index()]
        );
    }
    if let Some(validation) = report.validations.last() {
        eprintln!(
            "  validation:    {}/{} ({:.1}%)",
            validation.correct(),
            validation.total(),
            validation.accuracy() * 100.0
        );
    }

    agent
        .save_model(model)
        .with_context(|| format!("Failed to save model to {}", model.display()))?;
    eprintln!("Model saved to {}", model.display());

    Output::save_json(&report, output.clone())?;
    Ok(())
}
