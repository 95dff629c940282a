//! Adapter turning one study trial into one training run.

use mn_tuner::TrialHandle;
use mn_types::{ModelConfig, TaskConfig, TaskResult, TrialConfig, TrialId, TrialOverrides};
use std::sync::Arc;
use tracing::info;

use crate::executor::{ModelFactory, TrialExecutor};
use crate::registry::TrialRegistrar;

/// Name under which the learning rate is recorded in study params.
pub const LEARNING_RATE_PARAM: &str = "lr";

/// Objective evaluated by the study for every tuning trial.
pub struct TrainingTrialObjective<'a, E: TrialExecutor, F> {
    base: Arc<TaskConfig>,
    model_config: &'a ModelConfig,
    dataset: &'a E::Dataset,
    registrar: &'a dyn TrialRegistrar,
    executor: &'a E,
    model_factory: &'a F,
}

impl<'a, E, F> TrainingTrialObjective<'a, E, F>
where
    E: TrialExecutor,
    F: ModelFactory<Model = E::Model>,
{
    pub fn new(
        base: Arc<TaskConfig>,
        model_config: &'a ModelConfig,
        dataset: &'a E::Dataset,
        registrar: &'a dyn TrialRegistrar,
        executor: &'a E,
        model_factory: &'a F,
    ) -> Self {
        Self {
            base,
            model_config,
            dataset,
            registrar,
            executor,
            model_factory,
        }
    }

    /// Run the trial behind `trial` and return its loss.
    pub fn call(&self, trial: &mut TrialHandle<'_>) -> TaskResult<f64> {
        let options = &self.base.tuning_options;
        let learning_rate =
            trial.suggest_float(LEARNING_RATE_PARAM, options.lr_low, options.lr_high, true)?;
        let trial_id = TrialId::from_number(trial.number());

        let trial_config = TrialConfig::new(
            Arc::clone(&self.base),
            TrialOverrides {
                trial_id: trial_id.clone(),
                learning_rate: Some(learning_rate),
            },
        );

        let model = self.model_factory.create_model(self.model_config)?;
        self.registrar
            .record(&self.base.model_id, &trial_id, std::process::id())?;

        let loss = self
            .executor
            .start(&trial_config, model, self.model_config, self.dataset)?;

        info!(
            model_id = %self.base.model_id,
            trial_id = %trial_id,
            learning_rate,
            loss,
            "trial finished"
        );
        Ok(loss)
    }
}
