//! Runs one training task on this node and reports the winning trial.

use anyhow::Context;
use clap::Parser;
use mn_node::{
    ClientManager, CommandTrialExecutor, ForecastingTrainingTask, FsTrialRegistry, HttpConnector,
    ModelFactory, NodeConfig, SpecModelFactory, TrainingRuntime,
};
use mn_types::{ModelConfig, TaskConfig};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Train a forecasting model directly or through a learning-rate search.
#[derive(Parser, Debug)]
#[command(name = "mn-task-runner", version, about, long_about = None)]
struct Cli {
    /// Task configuration (JSON file)
    #[arg(long)]
    task: PathBuf,

    /// Model configuration (JSON file)
    #[arg(long)]
    model: PathBuf,

    /// Dataset handed to the trainer
    #[arg(long)]
    dataset: PathBuf,

    /// Trainer command; reads the job on stdin, prints the loss last on stdout
    #[arg(last = true, required = true)]
    trainer: Vec<String>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let node = NodeConfig::from_env().context("loading node configuration")?;
    let task_config = TaskConfig::from_json_file(&cli.task)
        .with_context(|| format!("loading task config {}", cli.task.display()))?;
    let model_config = ModelConfig::from_json_file(&cli.model)
        .with_context(|| format!("loading model config {}", cli.model.display()))?;

    let Some((program, args)) = cli.trainer.split_first() else {
        anyhow::bail!("missing trainer command");
    };
    let executor = CommandTrialExecutor::new(program.as_str()).with_args(args.iter().cloned());

    let clients = ClientManager::new(
        HttpConnector::new(node.coordinator_url.clone(), node.request_timeout()),
        node.client_pool_size,
    );
    let registrar = Arc::new(FsTrialRegistry::new(node.registry_dir.clone()));
    info!(
        coordinator = %node.coordinator_url,
        registry = %registrar.root().display(),
        "node configured"
    );

    let model_factory = SpecModelFactory;
    let model = model_factory.create_model(&model_config)?;

    let task = ForecastingTrainingTask::new(
        task_config,
        model_config,
        model,
        cli.dataset,
        TrainingRuntime {
            executor,
            model_factory,
            registrar,
            clients,
        },
    )?;

    let best = task.run()?;
    info!(best_trial_id = %best, "done");
    Ok(())
}
