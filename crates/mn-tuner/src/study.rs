//! Study execution and trial bookkeeping.

use chrono::{DateTime, Utc};
use mn_types::{SearchError, TaskResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info};
use uuid::Uuid;

use crate::search::{ParameterDef, ParameterKind, ParameterValue, SearchStrategy};

/// Unique study identifier.
pub type StudyId = Uuid;

/// Whether we are maximizing or minimizing the objective.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObjectiveDirection {
    Maximize,
    Minimize,
}

impl Default for ObjectiveDirection {
    fn default() -> Self {
        Self::Minimize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrialState {
    Running,
    Complete,
    Failed,
}

/// Record of one evaluated (or evaluating) trial.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrozenTrial {
    /// Zero-based sequence number within the study.
    pub number: usize,
    pub params: HashMap<String, ParameterValue>,
    pub value: Option<f64>,
    pub state: TrialState,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl FrozenTrial {
    fn new(number: usize) -> Self {
        Self {
            number,
            params: HashMap::new(),
            value: None,
            state: TrialState::Running,
            started_at: Utc::now(),
            finished_at: None,
            error: None,
        }
    }

    fn mark_complete(&mut self, params: HashMap<String, ParameterValue>, value: f64) {
        self.params = params;
        self.value = Some(value);
        self.state = TrialState::Complete;
        self.finished_at = Some(Utc::now());
    }

    fn mark_failed(&mut self, params: HashMap<String, ParameterValue>, error: String) {
        self.params = params;
        self.state = TrialState::Failed;
        self.finished_at = Some(Utc::now());
        self.error = Some(error);
    }

    /// Wall-clock duration, once the trial has finished.
    pub fn duration(&self) -> Option<chrono::Duration> {
        self.finished_at.map(|end| end - self.started_at)
    }
}

/// Handle given to the objective for the trial being evaluated.
///
/// Parameters are requested by name while the objective runs; asking for the
/// same name twice within one trial returns the first value.
pub struct TrialHandle<'a> {
    number: usize,
    params: HashMap<String, ParameterValue>,
    strategy: &'a mut dyn SearchStrategy,
}

impl<'a> TrialHandle<'a> {
    pub fn new(number: usize, strategy: &'a mut dyn SearchStrategy) -> Self {
        Self {
            number,
            params: HashMap::new(),
            strategy,
        }
    }

    /// Zero-based sequence number of this trial within its study.
    pub fn number(&self) -> usize {
        self.number
    }

    pub fn params(&self) -> &HashMap<String, ParameterValue> {
        &self.params
    }

    /// Suggest a float in `[low, high]`, sampled in log space when `log` is set.
    pub fn suggest_float(
        &mut self,
        name: &str,
        low: f64,
        high: f64,
        log: bool,
    ) -> TaskResult<f64> {
        let invalid = !low.is_finite()
            || !high.is_finite()
            || !(high - low).is_finite()
            || low > high
            || (log && low <= 0.0);
        if invalid {
            return Err(SearchError::InvalidRange {
                name: name.to_string(),
                low,
                high,
            }
            .into());
        }

        let kind = if log {
            ParameterKind::LogUniform { low, high }
        } else {
            ParameterKind::FloatRange { low, high }
        };
        Ok(self.suggest(name, kind).as_f64())
    }

    /// Suggest an integer in `[low, high]` inclusive.
    pub fn suggest_int(&mut self, name: &str, low: i64, high: i64) -> TaskResult<i64> {
        if low > high {
            return Err(SearchError::InvalidRange {
                name: name.to_string(),
                low: low as f64,
                high: high as f64,
            }
            .into());
        }

        match self.suggest(name, ParameterKind::IntRange { low, high }) {
            ParameterValue::Int(v) => Ok(v),
            ParameterValue::Float(v) => Ok(v.round() as i64),
        }
    }

    fn suggest(&mut self, name: &str, kind: ParameterKind) -> ParameterValue {
        if let Some(existing) = self.params.get(name) {
            return *existing;
        }
        let def = ParameterDef {
            name: name.to_string(),
            kind,
        };
        let value = self.strategy.sample(&def);
        self.params.insert(def.name, value);
        value
    }

    fn into_params(self) -> HashMap<String, ParameterValue> {
        self.params
    }
}

/// A bounded, sequential black-box optimization run.
pub struct Study {
    id: StudyId,
    direction: ObjectiveDirection,
    strategy: Box<dyn SearchStrategy>,
    trials: Vec<FrozenTrial>,
    best: Option<usize>,
}

impl Study {
    pub fn new(direction: ObjectiveDirection, strategy: Box<dyn SearchStrategy>) -> Self {
        Self {
            id: Uuid::new_v4(),
            direction,
            strategy,
            trials: Vec::new(),
            best: None,
        }
    }

    pub fn id(&self) -> StudyId {
        self.id
    }

    pub fn direction(&self) -> ObjectiveDirection {
        self.direction
    }

    pub fn trials(&self) -> &[FrozenTrial] {
        &self.trials
    }

    /// Evaluate `objective` for `n_trials` more trials, one after another.
    ///
    /// An objective error marks the trial failed and is returned unchanged;
    /// no further trials are started. A NaN objective marks the trial failed
    /// and the study carries on.
    pub fn optimize<F>(&mut self, mut objective: F, n_trials: usize) -> TaskResult<()>
    where
        F: FnMut(&mut TrialHandle<'_>) -> TaskResult<f64>,
    {
        info!(
            study = %self.id,
            strategy = self.strategy.name(),
            direction = ?self.direction,
            n_trials,
            "starting study"
        );

        for _ in 0..n_trials {
            let number = self.trials.len();
            self.trials.push(FrozenTrial::new(number));

            let mut handle = TrialHandle::new(number, self.strategy.as_mut());
            let outcome = objective(&mut handle);
            let params = handle.into_params();

            match outcome {
                Ok(value) if value.is_nan() => {
                    info!(
                        study = %self.id,
                        trial = number,
                        "objective returned NaN, trial failed"
                    );
                    self.trials[number].mark_failed(params, "objective returned NaN".to_string());
                }
                Ok(value) => {
                    self.strategy.report(&params, value);
                    self.trials[number].mark_complete(params, value);
                    self.update_best(number);
                    debug!(study = %self.id, trial = number, value, "trial complete");
                }
                Err(e) => {
                    debug!(study = %self.id, trial = number, error = %e, "trial failed");
                    self.trials[number].mark_failed(params, e.to_string());
                    return Err(e);
                }
            }
        }

        Ok(())
    }

    /// Best completed trial so far. Ties keep the earliest trial.
    pub fn best_trial(&self) -> Result<&FrozenTrial, SearchError> {
        self.best
            .map(|idx| &self.trials[idx])
            .ok_or(SearchError::NoCompletedTrials)
    }

    fn update_best(&mut self, candidate: usize) {
        let Some(value) = self.trials[candidate].value else {
            return;
        };
        let improves = match self.best.and_then(|idx| self.trials[idx].value) {
            None => true,
            Some(current) => match self.direction {
                ObjectiveDirection::Maximize => value > current,
                ObjectiveDirection::Minimize => value < current,
            },
        };
        if improves {
            self.best = Some(candidate);
        }
    }
}

impl std::fmt::Debug for Study {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Study")
            .field("id", &self.id)
            .field("direction", &self.direction)
            .field("strategy", &self.strategy.name())
            .field("trials", &self.trials.len())
            .field("best", &self.best)
            .finish()
    }
}
