//! Task and model configuration as received from the coordinator.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;

use crate::errors::{TaskError, TaskResult};

/// Trial budget of a tuning run when the task does not set one.
pub const DEFAULT_TUNING_TRIALS: usize = 20;

/// Learning-rate search range used by tuning runs.
pub const DEFAULT_LR_LOW: f64 = 1e-7;
pub const DEFAULT_LR_HIGH: f64 = 1e-1;

/// Configuration of one training task.
///
/// Known keys are typed; anything else the coordinator sends is kept in
/// `extra` and forwarded to the trainer untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskConfig {
    pub model_id: String,

    /// Run a hyperparameter search instead of a single trial.
    #[serde(default)]
    pub tuning: bool,

    /// Base learning rate; tuning trials override it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub learning_rate: Option<f64>,

    #[serde(default)]
    pub tuning_options: TuningOptions,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TaskConfig {
    pub fn new(model_id: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
            tuning: false,
            learning_rate: None,
            tuning_options: TuningOptions::default(),
            extra: Map::new(),
        }
    }

    pub fn with_tuning(mut self, tuning: bool) -> Self {
        self.tuning = tuning;
        self
    }

    pub fn with_learning_rate(mut self, learning_rate: f64) -> Self {
        self.learning_rate = Some(learning_rate);
        self
    }

    pub fn with_tuning_options(mut self, options: TuningOptions) -> Self {
        self.tuning_options = options;
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    pub fn from_json_str(json: &str) -> TaskResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> TaskResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    pub fn validate(&self) -> TaskResult<()> {
        if self.model_id.trim().is_empty() {
            return Err(TaskError::Config("model_id must not be empty".into()));
        }
        if let Some(lr) = self.learning_rate {
            if !lr.is_finite() || lr <= 0.0 {
                return Err(TaskError::Config(format!(
                    "learning_rate must be a positive number, got {lr}"
                )));
            }
        }
        if self.tuning {
            self.tuning_options.validate()?;
        }
        Ok(())
    }
}

/// Which sampler drives a tuning run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SamplerKind {
    Random,
    Bayesian,
}

impl Default for SamplerKind {
    fn default() -> Self {
        Self::Bayesian
    }
}

/// Search settings for tuning mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TuningOptions {
    /// Number of trials evaluated before the study stops.
    pub n_trials: usize,
    pub sampler: SamplerKind,
    /// Probability of a random draw once the Bayesian sampler has history.
    pub exploration_weight: f64,
    pub seed: Option<u64>,
    pub lr_low: f64,
    pub lr_high: f64,
}

impl Default for TuningOptions {
    fn default() -> Self {
        Self {
            n_trials: DEFAULT_TUNING_TRIALS,
            sampler: SamplerKind::default(),
            exploration_weight: 0.3,
            seed: None,
            lr_low: DEFAULT_LR_LOW,
            lr_high: DEFAULT_LR_HIGH,
        }
    }
}

impl TuningOptions {
    pub fn with_n_trials(mut self, n: usize) -> Self {
        self.n_trials = n;
        self
    }

    pub fn with_sampler(mut self, sampler: SamplerKind) -> Self {
        self.sampler = sampler;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_lr_range(mut self, low: f64, high: f64) -> Self {
        self.lr_low = low;
        self.lr_high = high;
        self
    }

    pub fn validate(&self) -> TaskResult<()> {
        if self.n_trials == 0 {
            return Err(TaskError::Config("n_trials must be at least 1".into()));
        }
        if !(0.0..=1.0).contains(&self.exploration_weight) {
            return Err(TaskError::Config(format!(
                "exploration_weight must be within [0, 1], got {}",
                self.exploration_weight
            )));
        }
        let (low, high) = (self.lr_low, self.lr_high);
        if !low.is_finite() || !high.is_finite() || low <= 0.0 || low > high {
            return Err(TaskError::Config(format!(
                "learning rate range must satisfy 0 < lr_low <= lr_high, got [{low}, {high}]"
            )));
        }
        Ok(())
    }
}

/// Static description of the model to build for each trial.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Factory key, e.g. "dlinear" or "nbeats".
    pub model_type: String,

    #[serde(flatten)]
    pub hyperparameters: Map<String, Value>,
}

impl ModelConfig {
    pub fn new(model_type: impl Into<String>) -> Self {
        Self {
            model_type: model_type.into(),
            hyperparameters: Map::new(),
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: Value) -> Self {
        self.hyperparameters.insert(key.into(), value);
        self
    }

    pub fn from_json_str(json: &str) -> TaskResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> TaskResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    pub fn validate(&self) -> TaskResult<()> {
        if self.model_type.trim().is_empty() {
            return Err(TaskError::Config("model_type must not be empty".into()));
        }
        Ok(())
    }
}

/// Model training state as tracked by the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrainingState {
    Pending,
    Running,
    Finished,
    Failed,
    Dropping,
}

impl TrainingState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Running => "RUNNING",
            Self::Finished => "FINISHED",
            Self::Failed => "FAILED",
            Self::Dropping => "DROPPING",
        }
    }
}

impl std::fmt::Display for TrainingState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn task_config_defaults_from_minimal_json() {
        let config = TaskConfig::from_json_str(r#"{"model_id": "m1"}"#).unwrap();
        assert_eq!(config.model_id, "m1");
        assert!(!config.tuning);
        assert_eq!(config.learning_rate, None);
        assert_eq!(config.tuning_options.n_trials, 20);
        assert_eq!(config.tuning_options.sampler, SamplerKind::Bayesian);
        assert_eq!(config.tuning_options.lr_low, 1e-7);
        assert_eq!(config.tuning_options.lr_high, 1e-1);
        assert!(config.extra.is_empty());
    }

    #[test]
    fn unknown_keys_are_kept() {
        let config = TaskConfig::from_json_str(
            r#"{"model_id": "m1", "tuning": true, "epochs": 10, "batch_size": 64,
                "tuning_options": {"n_trials": 5, "sampler": "random"}}"#,
        )
        .unwrap();
        assert!(config.tuning);
        assert_eq!(config.extra.get("epochs"), Some(&json!(10)));
        assert_eq!(config.extra.get("batch_size"), Some(&json!(64)));
        assert_eq!(config.tuning_options.n_trials, 5);
        assert_eq!(config.tuning_options.sampler, SamplerKind::Random);
        // Partially specified options fall back to defaults.
        assert_eq!(config.tuning_options.exploration_weight, 0.3);
    }

    #[test]
    fn missing_model_id_is_rejected() {
        assert!(TaskConfig::from_json_str(r#"{"tuning": false}"#).is_err());

        let err = TaskConfig::from_json_str(r#"{"model_id": "  "}"#).unwrap_err();
        assert!(matches!(err, TaskError::Config(_)));
    }

    #[test]
    fn zero_trial_budget_is_rejected_only_when_tuning() {
        let options = TuningOptions::default().with_n_trials(0);
        let direct = TaskConfig::new("m1").with_tuning_options(options.clone());
        assert!(direct.validate().is_ok());

        let tuned = direct.with_tuning(true);
        assert!(matches!(tuned.validate(), Err(TaskError::Config(_))));
    }

    #[test]
    fn bad_learning_rate_range_is_rejected_when_tuning() {
        let ranges = [
            (0.0, 1e-1),
            (-1e-3, 1e-1),
            (1e-1, 1e-3),
            (1e-7, f64::INFINITY),
            (f64::NAN, 1e-1),
        ];
        for (low, high) in ranges {
            let options = TuningOptions::default().with_lr_range(low, high);
            assert!(
                matches!(options.validate(), Err(TaskError::Config(_))),
                "[{low}, {high}] accepted"
            );
            let tuned = TaskConfig::new("m1").with_tuning(true).with_tuning_options(options);
            assert!(matches!(tuned.validate(), Err(TaskError::Config(_))));
        }

        let single_point = TuningOptions::default().with_lr_range(1e-3, 1e-3);
        assert!(single_point.validate().is_ok());
    }

    #[test]
    fn invalid_learning_rate_is_rejected() {
        let config = TaskConfig::new("m1").with_learning_rate(-0.1);
        assert!(config.validate().is_err());
        let config = TaskConfig::new("m1").with_learning_rate(f64::NAN);
        assert!(config.validate().is_err());
    }

    #[test]
    fn task_config_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("task.json");
        std::fs::write(&path, r#"{"model_id": "m7", "learning_rate": 0.01}"#).unwrap();

        let config = TaskConfig::from_json_file(&path).unwrap();
        assert_eq!(config.model_id, "m7");
        assert_eq!(config.learning_rate, Some(0.01));

        assert!(matches!(
            TaskConfig::from_json_file(dir.path().join("missing.json")),
            Err(TaskError::Io(_))
        ));
    }

    #[test]
    fn model_config_flattens_hyperparameters() {
        let config = ModelConfig::from_json_str(
            r#"{"model_type": "dlinear", "input_len": 96, "pred_len": 96}"#,
        )
        .unwrap();
        assert_eq!(config.model_type, "dlinear");
        assert_eq!(config.hyperparameters.get("input_len"), Some(&json!(96)));

        let back = serde_json::to_value(&config).unwrap();
        assert_eq!(back["pred_len"], json!(96));
        assert_eq!(back["model_type"], json!("dlinear"));

        assert!(ModelConfig::from_json_str(r#"{"model_type": ""}"#).is_err());
    }

    #[test]
    fn training_state_wire_names() {
        assert_eq!(
            serde_json::to_string(&TrainingState::Finished).unwrap(),
            "\"FINISHED\""
        );
        assert_eq!(TrainingState::Dropping.to_string(), "DROPPING");
    }
}
