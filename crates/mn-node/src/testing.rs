//! Test doubles shared by the unit tests in this crate.

use mn_types::{
    CoordinatorError, ModelConfig, TaskResult, TrainingState, TrialConfig, TrialError, TrialId,
};
use parking_lot::Mutex;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing_subscriber::fmt::MakeWriter;

use crate::coordinator::{CoordinatorClient, CoordinatorConnector, CoordinatorResult};
use crate::executor::{ModelFactory, TrialExecutor};

#[derive(Debug, Clone, PartialEq)]
pub struct TestModel {
    pub instance: usize,
}

/// Hands out [`TestModel`]s with increasing instance numbers.
#[derive(Debug, Default)]
pub struct CountingFactory {
    first: usize,
    created: AtomicUsize,
}

impl CountingFactory {
    pub fn starting_at(first: usize) -> Self {
        Self {
            first,
            created: AtomicUsize::new(0),
        }
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }
}

impl ModelFactory for CountingFactory {
    type Model = TestModel;

    fn create_model(&self, _config: &ModelConfig) -> TaskResult<TestModel> {
        let n = self.created.fetch_add(1, Ordering::SeqCst);
        Ok(TestModel {
            instance: self.first + n,
        })
    }
}

#[derive(Debug, Clone)]
pub struct ExecutorCall {
    pub model_id: String,
    pub trial_id: TrialId,
    pub learning_rate: Option<f64>,
    pub model_instance: usize,
}

/// Returns scripted losses in call order and records what it was given.
#[derive(Debug)]
pub struct ScriptedExecutor {
    losses: Vec<f64>,
    fail_on: Option<usize>,
    calls: Arc<Mutex<Vec<ExecutorCall>>>,
}

impl ScriptedExecutor {
    pub fn new(losses: Vec<f64>) -> Self {
        Self {
            losses,
            fail_on: None,
            calls: Arc::default(),
        }
    }

    /// Executor whose `index`-th call fails.
    pub fn failing_at(index: usize) -> Self {
        Self::new(vec![1.0]).fail_on(index)
    }

    pub fn fail_on(mut self, index: usize) -> Self {
        self.fail_on = Some(index);
        self
    }

    pub fn calls(&self) -> Vec<ExecutorCall> {
        self.calls.lock().clone()
    }

    /// Shared handle to the call log, usable after the executor is moved.
    pub fn call_log(&self) -> Arc<Mutex<Vec<ExecutorCall>>> {
        Arc::clone(&self.calls)
    }
}

impl TrialExecutor for ScriptedExecutor {
    type Model = TestModel;
    type Dataset = String;

    fn start(
        &self,
        trial: &TrialConfig,
        model: TestModel,
        _model_config: &ModelConfig,
        _dataset: &String,
    ) -> TaskResult<f64> {
        let index = {
            let mut calls = self.calls.lock();
            calls.push(ExecutorCall {
                model_id: trial.model_id().to_string(),
                trial_id: trial.trial_id().clone(),
                learning_rate: trial.overrides().learning_rate,
                model_instance: model.instance,
            });
            calls.len() - 1
        };

        if self.fail_on == Some(index) {
            return Err(TrialError::ExecutionFailed {
                trial_id: trial.trial_id().to_string(),
                message: "scripted failure".to_string(),
            }
            .into());
        }

        let loss = self
            .losses
            .get(index)
            .or_else(|| self.losses.last())
            .copied()
            .unwrap_or(1.0);
        Ok(loss)
    }
}

type ReportLog = Arc<Mutex<Vec<(String, TrainingState, TrialId)>>>;

/// Connector whose clients record every state report.
#[derive(Debug, Clone, Default)]
pub struct RecordingConnector {
    reports: ReportLog,
    connections: Arc<AtomicUsize>,
    reject: bool,
}

impl RecordingConnector {
    /// Clients that answer every report with a rejection.
    pub fn rejecting() -> Self {
        Self {
            reject: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<(String, TrainingState, TrialId)> {
        self.reports.lock().clone()
    }

    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }
}

impl CoordinatorConnector for RecordingConnector {
    fn connect(&self) -> CoordinatorResult<Box<dyn CoordinatorClient>> {
        self.connections.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(RecordingClient {
            reports: Arc::clone(&self.reports),
            reject: self.reject,
        }))
    }
}

struct RecordingClient {
    reports: ReportLog,
    reject: bool,
}

impl CoordinatorClient for RecordingClient {
    fn update_model_state(
        &self,
        model_id: &str,
        state: TrainingState,
        best_trial_id: &TrialId,
    ) -> CoordinatorResult<()> {
        if self.reject {
            return Err(CoordinatorError::Rejected {
                model_id: model_id.to_string(),
                status: 500,
                message: "coordinator unavailable".to_string(),
            });
        }
        self.reports
            .lock()
            .push((model_id.to_string(), state, best_trial_id.clone()));
        Ok(())
    }
}

/// Formatted log output captured in memory.
#[derive(Debug, Clone, Default)]
pub struct CapturedLogs {
    buf: Arc<Mutex<Vec<u8>>>,
}

impl CapturedLogs {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.buf.lock()).into_owned()
    }

    /// Number of lines logged at `level` ("WARN", "INFO", ...).
    pub fn count_level(&self, level: &str) -> usize {
        let marker = format!(" {level} ");
        self.contents()
            .lines()
            .filter(|line| line.contains(&marker))
            .count()
    }
}

pub struct CapturedWriter {
    buf: Arc<Mutex<Vec<u8>>>,
}

impl io::Write for CapturedWriter {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buf.lock().extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for CapturedLogs {
    type Writer = CapturedWriter;

    fn make_writer(&'a self) -> Self::Writer {
        CapturedWriter {
            buf: Arc::clone(&self.buf),
        }
    }
}

/// Run `f` with a DEBUG-level subscriber writing into memory.
pub fn with_captured_logs<T>(f: impl FnOnce() -> T) -> (T, CapturedLogs) {
    let logs = CapturedLogs::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(logs.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::DEBUG)
        .finish();
    let out = tracing::subscriber::with_default(subscriber, f);
    (out, logs)
}
