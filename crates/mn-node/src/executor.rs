//! Trial execution and model construction seams.
//!
//! The training loop itself lives outside this crate. A [`TrialExecutor`]
//! receives a fully resolved trial and reports a loss; a [`ModelFactory`]
//! builds a fresh model for each tuning trial.

use mn_types::{ModelConfig, TaskResult, TrialConfig, TrialError};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use tracing::debug;
use uuid::Uuid;

/// Runs one trial to completion and returns its loss.
pub trait TrialExecutor {
    type Model;
    type Dataset;

    fn start(
        &self,
        trial: &TrialConfig,
        model: Self::Model,
        model_config: &ModelConfig,
        dataset: &Self::Dataset,
    ) -> TaskResult<f64>;
}

/// Builds model instances from their static configuration.
pub trait ModelFactory {
    type Model;

    fn create_model(&self, config: &ModelConfig) -> TaskResult<Self::Model>;
}

/// Model handed to an out-of-process trainer: its configuration plus an
/// instance id, so the trainer can tell fresh instances apart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSpec {
    pub instance_id: Uuid,
    pub config: ModelConfig,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SpecModelFactory;

impl ModelFactory for SpecModelFactory {
    type Model = ModelSpec;

    fn create_model(&self, config: &ModelConfig) -> TaskResult<ModelSpec> {
        config.validate().map_err(|e| TrialError::ModelCreation {
            message: e.to_string(),
        })?;
        Ok(ModelSpec {
            instance_id: Uuid::new_v4(),
            config: config.clone(),
        })
    }
}

#[derive(Debug, Serialize)]
struct TrainingJob<'a> {
    trial: serde_json::Value,
    model: &'a ModelSpec,
    dataset: &'a PathBuf,
}

/// Executes each trial by running an external training command.
///
/// The job (`trial`, `model`, `dataset`) is written to the child's stdin as
/// JSON. The child must print its final loss as the last non-empty line on
/// stdout; stderr is passed through.
#[derive(Debug, Clone)]
pub struct CommandTrialExecutor {
    program: String,
    args: Vec<String>,
}

impl CommandTrialExecutor {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }
}

impl TrialExecutor for CommandTrialExecutor {
    type Model = ModelSpec;
    type Dataset = PathBuf;

    fn start(
        &self,
        trial: &TrialConfig,
        model: ModelSpec,
        _model_config: &ModelConfig,
        dataset: &PathBuf,
    ) -> TaskResult<f64> {
        let trial_id = trial.trial_id().to_string();
        let job = serde_json::to_vec(&TrainingJob {
            trial: trial.to_json(),
            model: &model,
            dataset,
        })?;

        debug!(trial_id = %trial_id, program = %self.program, "spawning trainer");
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .env("MLNODE_MODEL_ID", trial.model_id())
            .env("MLNODE_TRIAL_ID", &trial_id)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()?;

        // Feed stdin from another thread so a chatty trainer cannot block on a
        // full stdout pipe while we are still writing.
        let writer = child.stdin.take().map(|mut stdin| {
            std::thread::spawn(move || match stdin.write_all(&job) {
                Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => Ok(()),
                other => other,
            })
        });

        let output = child.wait_with_output()?;
        if let Some(writer) = writer {
            writer
                .join()
                .map_err(|_| mn_types::internal_error!("stdin writer for {trial_id} panicked"))??;
        }

        if !output.status.success() {
            return Err(TrialError::ProcessFailed {
                trial_id,
                status: output.status.to_string(),
            }
            .into());
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let last_line = stdout
            .lines()
            .rev()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .unwrap_or_default();

        last_line.parse::<f64>().map_err(|_| {
            TrialError::InvalidOutput {
                trial_id,
                output: last_line.to_string(),
            }
            .into()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mn_types::{TaskConfig, TaskError, TrialId, TrialOverrides};
    use std::sync::Arc;

    #[test]
    fn spec_factory_builds_fresh_instances() {
        let config = ModelConfig::new("dlinear").with_param("input_len", serde_json::json!(96));
        let a = SpecModelFactory.create_model(&config).unwrap();
        let b = SpecModelFactory.create_model(&config).unwrap();
        assert_eq!(a.config, config);
        assert_ne!(a.instance_id, b.instance_id);
    }

    #[test]
    fn spec_factory_rejects_invalid_config() {
        let err = SpecModelFactory
            .create_model(&ModelConfig::new(""))
            .unwrap_err();
        assert!(matches!(err, TaskError::Trial(TrialError::ModelCreation { .. })));
    }

    #[cfg(unix)]
    mod command {
        use super::*;

        fn run(script: &str, trial: &TrialConfig) -> TaskResult<f64> {
            let config = ModelConfig::new("dlinear");
            let model = SpecModelFactory.create_model(&config).unwrap();
            CommandTrialExecutor::new("sh")
                .with_args(["-c", script])
                .start(trial, model, &config, &PathBuf::from("/data/etth1.csv"))
        }

        fn direct_trial() -> TrialConfig {
            TrialConfig::direct(Arc::new(TaskConfig::new("m1")))
        }

        #[test]
        fn loss_is_last_stdout_line() {
            let loss = run("cat > /dev/null; echo 'epoch 1 done'; echo 0.25; echo", &direct_trial())
                .unwrap();
            assert_eq!(loss, 0.25);
        }

        #[test]
        fn job_is_written_to_stdin() {
            let trial = TrialConfig::new(
                Arc::new(TaskConfig::new("m1")),
                TrialOverrides {
                    trial_id: TrialId::from_number(3),
                    learning_rate: Some(0.01),
                },
            );
            let loss = run(
                r#"grep -q '"trial_id":"tid_3"' && echo 0.5"#,
                &trial,
            )
            .unwrap();
            assert_eq!(loss, 0.5);
        }

        #[test]
        fn trial_identity_is_exported_to_env() {
            let loss = run(
                r#"cat > /dev/null; [ "$MLNODE_TRIAL_ID" = tid_0 ] && [ "$MLNODE_MODEL_ID" = m1 ] && echo 1.5"#,
                &direct_trial(),
            )
            .unwrap();
            assert_eq!(loss, 1.5);
        }

        #[test]
        fn non_zero_exit_is_process_failure() {
            let err = run("cat > /dev/null; exit 3", &direct_trial()).unwrap_err();
            match err {
                TaskError::Trial(TrialError::ProcessFailed { trial_id, status }) => {
                    assert_eq!(trial_id, "tid_0");
                    assert!(status.contains('3'));
                }
                other => panic!("expected ProcessFailed, got {other:?}"),
            }
        }

        #[test]
        fn garbage_output_is_rejected() {
            let err = run("echo not-a-number", &direct_trial()).unwrap_err();
            assert!(matches!(
                err,
                TaskError::Trial(TrialError::InvalidOutput { .. })
            ));
        }

        #[test]
        fn missing_program_is_io_error() {
            let config = ModelConfig::new("dlinear");
            let model = SpecModelFactory.create_model(&config).unwrap();
            let err = CommandTrialExecutor::new("/nonexistent/trainer")
                .start(&direct_trial(), model, &config, &PathBuf::from("x"))
                .unwrap_err();
            assert!(matches!(err, TaskError::Io(_)));
        }
    }
}
