//! Training task orchestration: one task in, one terminal report out.

use mn_tuner::{build_strategy, ObjectiveDirection, Study};
use mn_types::{
    ModelConfig, TaskConfig, TaskResult, TrainingState, TrialConfig, TrialId, TuningOptions,
};
use std::sync::Arc;
use tracing::{info, warn};

use crate::coordinator::{ClientManager, CoordinatorClient, PooledClient};
use crate::executor::{ModelFactory, TrialExecutor};
use crate::objective::TrainingTrialObjective;
use crate::registry::TrialRegistrar;

/// How a task turns into trials.
#[derive(Debug, Clone, PartialEq)]
pub enum SchedulingStrategy {
    /// One trial (`tid_0`) with the task's own configuration and model.
    Direct,
    /// A bounded search; the best trial wins.
    Tuning(TuningOptions),
}

impl SchedulingStrategy {
    pub fn from_config(config: &TaskConfig) -> Self {
        if config.tuning {
            Self::Tuning(config.tuning_options.clone())
        } else {
            Self::Direct
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Tuning(_) => "tuning",
        }
    }

    /// Run the trials and return the id of the winning one.
    fn execute<E, F>(&self, context: &TaskContext<E, F>, model: E::Model) -> TaskResult<TrialId>
    where
        E: TrialExecutor,
        F: ModelFactory<Model = E::Model>,
    {
        match self {
            Self::Direct => context.run_direct(model),
            Self::Tuning(options) => context.run_tuning(options),
        }
    }
}

/// Collaborators a training task runs against.
pub struct TrainingRuntime<E, F> {
    pub executor: E,
    pub model_factory: F,
    pub registrar: Arc<dyn TrialRegistrar>,
    pub clients: Arc<ClientManager>,
}

struct TaskContext<E: TrialExecutor, F> {
    task_config: Arc<TaskConfig>,
    model_config: ModelConfig,
    dataset: E::Dataset,
    registrar: Arc<dyn TrialRegistrar>,
    executor: E,
    model_factory: F,
}

impl<E, F> TaskContext<E, F>
where
    E: TrialExecutor,
    F: ModelFactory<Model = E::Model>,
{
    fn model_id(&self) -> &str {
        &self.task_config.model_id
    }

    fn run_direct(&self, model: E::Model) -> TaskResult<TrialId> {
        let trial = TrialConfig::direct(Arc::clone(&self.task_config));
        self.registrar
            .record(self.model_id(), trial.trial_id(), std::process::id())?;

        let loss = self
            .executor
            .start(&trial, model, &self.model_config, &self.dataset)?;
        info!(model_id = self.model_id(), trial_id = %trial.trial_id(), loss, "trial finished");

        Ok(trial.trial_id().clone())
    }

    fn run_tuning(&self, options: &TuningOptions) -> TaskResult<TrialId> {
        let direction = ObjectiveDirection::Minimize;
        let strategy = build_strategy(
            options.sampler,
            options.exploration_weight,
            options.seed,
            direction,
        );
        let mut study = Study::new(direction, strategy);
        let objective = TrainingTrialObjective::new(
            Arc::clone(&self.task_config),
            &self.model_config,
            &self.dataset,
            self.registrar.as_ref(),
            &self.executor,
            &self.model_factory,
        );

        study.optimize(|trial| objective.call(trial), options.n_trials)?;

        let best = study.best_trial()?;
        info!(
            model_id = self.model_id(),
            study = %study.id(),
            best_trial = best.number,
            best_loss = best.value,
            "study finished"
        );
        Ok(TrialId::from_number(best.number))
    }
}

/// Forecasting model training task.
///
/// Runs either one direct trial or a tuning study, then reports
/// `FINISHED` with the winning trial to the coordinator. Failures are
/// logged once and returned; the coordinator is not told about them.
pub struct ForecastingTrainingTask<E: TrialExecutor, F> {
    context: TaskContext<E, F>,
    model: E::Model,
    coordinator: PooledClient,
}

impl<E, F> ForecastingTrainingTask<E, F>
where
    E: TrialExecutor,
    F: ModelFactory<Model = E::Model>,
{
    /// Validate the configuration and borrow a coordinator client.
    pub fn new(
        task_config: TaskConfig,
        model_config: ModelConfig,
        model: E::Model,
        dataset: E::Dataset,
        runtime: TrainingRuntime<E, F>,
    ) -> TaskResult<Self> {
        task_config.validate()?;
        model_config.validate()?;
        let coordinator = runtime.clients.borrow_config_node_client()?;

        Ok(Self {
            context: TaskContext {
                task_config: Arc::new(task_config),
                model_config,
                dataset,
                registrar: runtime.registrar,
                executor: runtime.executor,
                model_factory: runtime.model_factory,
            },
            model,
            coordinator,
        })
    }

    pub fn model_id(&self) -> &str {
        self.context.model_id()
    }

    pub fn strategy(&self) -> SchedulingStrategy {
        SchedulingStrategy::from_config(&self.context.task_config)
    }

    /// Run the task to its terminal report and return the winning trial id.
    pub fn run(self) -> TaskResult<TrialId> {
        let model_id = self.model_id().to_string();
        self.execute().map_err(|e| {
            warn!(model_id = %model_id, error = %e, "training task failed");
            e
        })
    }

    fn execute(self) -> TaskResult<TrialId> {
        let strategy = self.strategy();
        let Self {
            context,
            model,
            coordinator,
        } = self;

        info!(model_id = context.model_id(), mode = strategy.name(), "starting training task");
        let best_trial_id = strategy.execute(&context, model)?;

        coordinator.update_model_state(
            context.model_id(),
            TrainingState::Finished,
            &best_trial_id,
        )?;
        info!(
            model_id = context.model_id(),
            best_trial_id = %best_trial_id,
            "training task finished"
        );
        Ok(best_trial_id)
    }
}
