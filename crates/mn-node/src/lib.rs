//! ML node training task scheduler.
//!
//! A task either trains once ("direct") or runs a bounded learning-rate
//! search ("tuning"). Every trial is published to a [`TrialRegistrar`]
//! before it starts, and the winning trial is reported to the coordinator
//! as `FINISHED`.

pub mod config;
pub mod coordinator;
pub mod executor;
pub mod objective;
pub mod registry;
pub mod task;

#[cfg(test)]
mod testing;

pub use config::NodeConfig;
pub use coordinator::{
    ClientManager, CoordinatorClient, CoordinatorConnector, CoordinatorResult, HttpConnector,
    HttpCoordinatorClient, PooledClient,
};
pub use executor::{CommandTrialExecutor, ModelFactory, ModelSpec, SpecModelFactory, TrialExecutor};
pub use objective::{TrainingTrialObjective, LEARNING_RATE_PARAM};
pub use registry::{FsTrialRegistry, InMemoryTrialRegistry, TrialRegistrar};
pub use task::{ForecastingTrainingTask, SchedulingStrategy, TrainingRuntime};
