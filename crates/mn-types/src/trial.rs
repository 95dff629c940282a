//! Trial identity and the per-trial view of a task's configuration.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;

use crate::task::TaskConfig;

/// Identifier of one trial within a task, e.g. `tid_3`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrialId(String);

impl TrialId {
    const PREFIX: &'static str = "tid_";

    /// Id of the trial with the given search sequence number.
    pub fn from_number(number: usize) -> Self {
        Self(format!("{}{number}", Self::PREFIX))
    }

    /// Id used for the single trial of a task that is not tuned.
    pub fn direct() -> Self {
        Self::from_number(0)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Sequence number encoded in the id, if it has the `tid_<n>` shape.
    pub fn number(&self) -> Option<usize> {
        self.0.strip_prefix(Self::PREFIX)?.parse().ok()
    }
}

impl std::fmt::Display for TrialId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for TrialId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for TrialId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Values that differ from the base task configuration for one trial.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialOverrides {
    pub trial_id: TrialId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub learning_rate: Option<f64>,
}

/// Resolved configuration handed to a trial executor.
///
/// The base task configuration is shared and never written to; every trial
/// gets its own overrides.
#[derive(Debug, Clone, PartialEq)]
pub struct TrialConfig {
    base: Arc<TaskConfig>,
    overrides: TrialOverrides,
}

impl TrialConfig {
    pub fn new(base: Arc<TaskConfig>, overrides: TrialOverrides) -> Self {
        Self { base, overrides }
    }

    /// Trial that keeps the base configuration as-is.
    pub fn direct(base: Arc<TaskConfig>) -> Self {
        Self::new(
            base,
            TrialOverrides {
                trial_id: TrialId::direct(),
                learning_rate: None,
            },
        )
    }

    pub fn base(&self) -> &TaskConfig {
        &self.base
    }

    pub fn model_id(&self) -> &str {
        &self.base.model_id
    }

    pub fn trial_id(&self) -> &TrialId {
        &self.overrides.trial_id
    }

    pub fn learning_rate(&self) -> Option<f64> {
        self.overrides.learning_rate.or(self.base.learning_rate)
    }

    pub fn overrides(&self) -> &TrialOverrides {
        &self.overrides
    }

    /// Flat key/value view with the overrides applied on top of the base.
    pub fn to_json(&self) -> Value {
        let mut map = match serde_json::to_value(self.base()) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        };
        map.insert(
            "trial_id".to_string(),
            Value::String(self.overrides.trial_id.to_string()),
        );
        if let Some(lr) = self.learning_rate() {
            map.insert("learning_rate".to_string(), Value::from(lr));
        }
        Value::Object(map)
    }
}
