//! # mn-tuner
//!
//! Hyperparameter search for ML node training tasks.
//!
//! Provides parameter definitions, samplers (random and a light Bayesian
//! heuristic) and a [`Study`] that evaluates an objective sequentially for a
//! fixed trial budget while tracking the best trial.

mod search;
mod study;

pub use search::{
    build_strategy, BayesianSearch, ParameterDef, ParameterKind, ParameterValue, RandomSearch,
    SearchStrategy,
};
pub use study::{FrozenTrial, ObjectiveDirection, Study, StudyId, TrialHandle, TrialState};
