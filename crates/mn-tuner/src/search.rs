//! Parameter definitions and sampling strategies.

use mn_types::SamplerKind;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::study::ObjectiveDirection;

/// A single parameter dimension requested by an objective.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterDef {
    /// Parameter name (e.g. "lr").
    pub name: String,
    /// The kind of search range.
    pub kind: ParameterKind,
}

/// Describes how a parameter is sampled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ParameterKind {
    /// Continuous uniform range [low, high].
    FloatRange { low: f64, high: f64 },
    /// Integer range [low, high] inclusive.
    IntRange { low: i64, high: i64 },
    /// Log-uniform range (sampled in log-space then exponentiated).
    LogUniform { low: f64, high: f64 },
}

/// A concrete parameter value produced by a search strategy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParameterValue {
    Float(f64),
    Int(i64),
}

impl ParameterValue {
    pub fn as_f64(&self) -> f64 {
        match self {
            Self::Float(v) => *v,
            Self::Int(v) => *v as f64,
        }
    }
}

impl std::fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Float(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Search strategies
// ---------------------------------------------------------------------------

/// Common trait for all search strategies.
pub trait SearchStrategy: Send {
    /// Draw a value for one parameter of the running trial.
    fn sample(&mut self, param: &ParameterDef) -> ParameterValue;

    /// Report completed trial results so adaptive strategies can learn.
    fn report(&mut self, _params: &HashMap<String, ParameterValue>, _objective: f64) {}

    /// Human-readable strategy name.
    fn name(&self) -> &str;
}

/// Build the strategy selected by a task's tuning options.
pub fn build_strategy(
    kind: SamplerKind,
    exploration_weight: f64,
    seed: Option<u64>,
    direction: ObjectiveDirection,
) -> Box<dyn SearchStrategy> {
    match kind {
        SamplerKind::Random => Box::new(RandomSearch::with_rng(rng_from(seed))),
        SamplerKind::Bayesian => Box::new(
            BayesianSearch::new(exploration_weight, direction).with_rng(rng_from(seed)),
        ),
    }
}

fn rng_from(seed: Option<u64>) -> ChaCha8Rng {
    match seed {
        Some(seed) => ChaCha8Rng::seed_from_u64(seed),
        None => ChaCha8Rng::from_entropy(),
    }
}

fn sample_kind(rng: &mut ChaCha8Rng, kind: &ParameterKind) -> ParameterValue {
    match kind {
        ParameterKind::FloatRange { low, high } => {
            ParameterValue::Float(rng.gen_range(*low..=*high))
        }
        ParameterKind::IntRange { low, high } => ParameterValue::Int(rng.gen_range(*low..=*high)),
        ParameterKind::LogUniform { low, high } => {
            let log_low = low.ln();
            let log_high = high.ln();
            let log_val: f64 = rng.gen_range(log_low..=log_high);
            // exp(ln(x)) can land a hair outside the bounds.
            ParameterValue::Float(log_val.exp().clamp(*low, *high))
        }
    }
}

// ---- Random search ----

/// Independent random sampling of every parameter.
#[derive(Debug, Clone)]
pub struct RandomSearch {
    rng: ChaCha8Rng,
}

impl RandomSearch {
    pub fn new() -> Self {
        Self::with_rng(ChaCha8Rng::from_entropy())
    }

    pub fn with_seed(seed: u64) -> Self {
        Self::with_rng(ChaCha8Rng::seed_from_u64(seed))
    }

    fn with_rng(rng: ChaCha8Rng) -> Self {
        Self { rng }
    }
}

impl Default for RandomSearch {
    fn default() -> Self {
        Self::new()
    }
}

impl SearchStrategy for RandomSearch {
    fn sample(&mut self, param: &ParameterDef) -> ParameterValue {
        sample_kind(&mut self.rng, &param.kind)
    }

    fn name(&self) -> &str {
        "random"
    }
}

// ---- Bayesian search (surrogate-model stub) ----

/// Bayesian optimization using a simple surrogate heuristic.
///
/// Tracks observed (params, objective) pairs. With probability
/// `exploration_weight` a parameter is drawn at random; otherwise the value
/// from the best observation so far is perturbed. A full Gaussian-process
/// backend can replace the heuristic behind the same trait.
#[derive(Debug, Clone)]
pub struct BayesianSearch {
    rng: ChaCha8Rng,
    observations: Vec<(HashMap<String, ParameterValue>, f64)>,
    exploration_weight: f64,
    direction: ObjectiveDirection,
}

impl BayesianSearch {
    pub fn new(exploration_weight: f64, direction: ObjectiveDirection) -> Self {
        Self {
            rng: ChaCha8Rng::from_entropy(),
            observations: Vec::new(),
            exploration_weight,
            direction,
        }
    }

    pub fn with_seed(self, seed: u64) -> Self {
        self.with_rng(ChaCha8Rng::seed_from_u64(seed))
    }

    fn with_rng(mut self, rng: ChaCha8Rng) -> Self {
        self.rng = rng;
        self
    }

    /// Best value observed so far for `name`, honouring the direction.
    fn best_value_for(&self, name: &str) -> Option<ParameterValue> {
        let candidates = self
            .observations
            .iter()
            .filter_map(|(params, objective)| params.get(name).map(|v| (*v, *objective)));

        let cmp = |a: &(ParameterValue, f64), b: &(ParameterValue, f64)| {
            a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal)
        };
        let best = match self.direction {
            ObjectiveDirection::Maximize => candidates.max_by(cmp),
            ObjectiveDirection::Minimize => candidates.min_by(cmp),
        };
        best.map(|(value, _)| value)
    }

    /// Exploitation: perturb the best-known value for this parameter.
    fn exploit(&mut self, param: &ParameterDef) -> ParameterValue {
        let base = match self.best_value_for(&param.name) {
            Some(value) => value,
            None => return sample_kind(&mut self.rng, &param.kind),
        };

        match (&param.kind, base) {
            (ParameterKind::FloatRange { low, high }, ParameterValue::Float(v)) => {
                let range = high - low;
                let noise = self.rng.gen_range(-0.1..0.1) * range;
                ParameterValue::Float((v + noise).clamp(*low, *high))
            }
            (ParameterKind::IntRange { low, high }, ParameterValue::Int(v)) => {
                let delta: i64 = self.rng.gen_range(-2..=2);
                ParameterValue::Int((v + delta).clamp(*low, *high))
            }
            (ParameterKind::LogUniform { low, high }, ParameterValue::Float(v)) => {
                let log_v = v.ln();
                let log_range = high.ln() - low.ln();
                let noise = self.rng.gen_range(-0.1..0.1) * log_range;
                ParameterValue::Float((log_v + noise).exp().clamp(*low, *high))
            }
            // Same name reused with a different kind: start over.
            _ => sample_kind(&mut self.rng, &param.kind),
        }
    }
}

impl SearchStrategy for BayesianSearch {
    fn sample(&mut self, param: &ParameterDef) -> ParameterValue {
        if self.observations.is_empty() || self.rng.gen::<f64>() < self.exploration_weight {
            sample_kind(&mut self.rng, &param.kind)
        } else {
            self.exploit(param)
        }
    }

    fn report(&mut self, params: &HashMap<String, ParameterValue>, objective: f64) {
        self.observations.push((params.clone(), objective));
    }

    fn name(&self) -> &str {
        "bayesian"
    }
}
