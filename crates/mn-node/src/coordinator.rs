//! Coordinator client abstraction and a small connection pool.

use mn_types::{CoordinatorError, TaskResult, TrainingState, TrialId};
use parking_lot::Mutex;
use reqwest::Url;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Result alias for coordinator calls.
pub type CoordinatorResult<T> = Result<T, CoordinatorError>;

/// Remote model registry that records the terminal state of training tasks.
pub trait CoordinatorClient: Send + Sync {
    /// Report the state of `model_id` together with its winning trial.
    fn update_model_state(
        &self,
        model_id: &str,
        state: TrainingState,
        best_trial_id: &TrialId,
    ) -> CoordinatorResult<()>;
}

/// Opens new coordinator clients for the pool.
pub trait CoordinatorConnector: Send + Sync {
    fn connect(&self) -> CoordinatorResult<Box<dyn CoordinatorClient>>;
}

/// Pool of idle coordinator clients.
pub struct ClientManager {
    connector: Box<dyn CoordinatorConnector>,
    idle: Mutex<Vec<Box<dyn CoordinatorClient>>>,
    max_idle: usize,
}

impl ClientManager {
    pub fn new(connector: impl CoordinatorConnector + 'static, max_idle: usize) -> Arc<Self> {
        Arc::new(Self {
            connector: Box::new(connector),
            idle: Mutex::new(Vec::new()),
            max_idle,
        })
    }

    /// Take an idle client, or open a new one when none is idle.
    pub fn borrow_config_node_client(self: &Arc<Self>) -> TaskResult<PooledClient> {
        let reused = self.idle.lock().pop();
        let client = match reused {
            Some(client) => client,
            None => {
                debug!("opening new coordinator client");
                self.connector.connect()?
            }
        };
        Ok(PooledClient {
            client: Some(client),
            manager: Arc::clone(self),
        })
    }

    pub fn idle_count(&self) -> usize {
        self.idle.lock().len()
    }

    fn give_back(&self, client: Box<dyn CoordinatorClient>) {
        let mut idle = self.idle.lock();
        if idle.len() < self.max_idle {
            idle.push(client);
        }
    }
}

impl std::fmt::Debug for ClientManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientManager")
            .field("idle", &self.idle_count())
            .field("max_idle", &self.max_idle)
            .finish()
    }
}

/// Client borrowed from a [`ClientManager`]; returned to the pool on drop.
pub struct PooledClient {
    client: Option<Box<dyn CoordinatorClient>>,
    manager: Arc<ClientManager>,
}

impl CoordinatorClient for PooledClient {
    fn update_model_state(
        &self,
        model_id: &str,
        state: TrainingState,
        best_trial_id: &TrialId,
    ) -> CoordinatorResult<()> {
        match &self.client {
            Some(client) => client.update_model_state(model_id, state, best_trial_id),
            None => Err(CoordinatorError::Transport {
                message: "pooled client already released".to_string(),
            }),
        }
    }
}

impl Drop for PooledClient {
    fn drop(&mut self) {
        if let Some(client) = self.client.take() {
            self.manager.give_back(client);
        }
    }
}

impl std::fmt::Debug for PooledClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledClient")
            .field("active", &self.client.is_some())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// HTTP transport
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct StateUpdate<'a> {
    state: TrainingState,
    best_trial_id: &'a TrialId,
}

/// Coordinator client speaking JSON over HTTP.
///
/// `POST {base}/models/{model_id}/state` with
/// `{"state": "FINISHED", "best_trial_id": "tid_3"}`.
#[derive(Debug, Clone)]
pub struct HttpCoordinatorClient {
    base_url: Url,
    http: reqwest::blocking::Client,
}

impl HttpCoordinatorClient {
    fn state_url(&self, model_id: &str) -> CoordinatorResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| CoordinatorError::Connection {
                address: self.base_url.to_string(),
                message: "URL cannot be a base".to_string(),
            })?
            .pop_if_empty()
            .extend(["models", model_id, "state"]);
        Ok(url)
    }
}

impl CoordinatorClient for HttpCoordinatorClient {
    fn update_model_state(
        &self,
        model_id: &str,
        state: TrainingState,
        best_trial_id: &TrialId,
    ) -> CoordinatorResult<()> {
        let url = self.state_url(model_id)?;
        let body = StateUpdate {
            state,
            best_trial_id,
        };

        let response = self
            .http
            .post(url)
            .json(&body)
            .send()
            .map_err(|e| CoordinatorError::Transport {
                message: format!("HTTP request failed: {e}"),
            })?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().unwrap_or_default();
            return Err(CoordinatorError::Rejected {
                model_id: model_id.to_string(),
                status: status.as_u16(),
                message,
            });
        }

        info!(model_id, state = %state, best_trial_id = %best_trial_id, "reported model state");
        Ok(())
    }
}

/// Opens [`HttpCoordinatorClient`]s against one coordinator address.
#[derive(Debug, Clone)]
pub struct HttpConnector {
    base_url: String,
    timeout: Duration,
}

impl HttpConnector {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            base_url: base_url.into(),
            timeout,
        }
    }
}

impl CoordinatorConnector for HttpConnector {
    fn connect(&self) -> CoordinatorResult<Box<dyn CoordinatorClient>> {
        let connection_error = |message: String| CoordinatorError::Connection {
            address: self.base_url.clone(),
            message,
        };

        let base_url = Url::parse(&self.base_url).map_err(|e| connection_error(e.to_string()))?;
        if base_url.cannot_be_a_base() {
            return Err(connection_error("URL cannot be a base".to_string()));
        }
        let http = reqwest::blocking::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| connection_error(e.to_string()))?;

        Ok(Box::new(HttpCoordinatorClient { base_url, http }))
    }
}
