//! Durable execution.
//!
//! [`DurableEngine`] is the contract the dispatcher needs from a replay-capable
//! engine: start a run under a workflow id, terminating whatever is still
//! running under that id, and execute activities with at-least-once retry.
//!
//! [`LocalDurableEngine`] implements it in-process. Every activity request and
//! output crosses a JSON boundary, the same way it would when handed to an
//! external engine, and retryable activity failures are attempted again with
//! linear backoff.

use async_trait::async_trait;
use convoy_agent::{ActivityExecutor, ActivityOutput, ActivityRequest, MessageWorkflow, WorkflowInput, WorkflowReport};
use convoy_config::AppConfig;
use convoy_core::{ActivityError, WorkflowError};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// What `start` did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartedWorkflow {
    pub workflow_id: String,
    /// Sequence of the run that was still active under the same id and got terminated
    pub terminated_sequence: Option<u64>,
}

#[async_trait]
pub trait DurableEngine: Send + Sync {
    fn name(&self) -> &str;

    /// Start a run, terminating any run still active under `workflow_id`.
    async fn start(
        &self,
        workflow_id: &str,
        input: WorkflowInput,
    ) -> Result<StartedWorkflow, WorkflowError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Multiplied by the attempt number before each retry
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            max_attempts: config.workflow.max_activity_attempts.max(1),
            backoff: Duration::from_millis(config.workflow.retry_backoff_ms),
        }
    }
}

/// Wraps an executor with JSON round-tripping and retry.
pub struct RetryingExecutor {
    inner: Arc<dyn ActivityExecutor>,
    policy: RetryPolicy,
}

impl RetryingExecutor {
    pub fn new(inner: Arc<dyn ActivityExecutor>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl ActivityExecutor for RetryingExecutor {
    async fn execute(&self, request: ActivityRequest) -> Result<ActivityOutput, ActivityError> {
        let activity = request.name();
        let payload = encode(&request)?;
        let mut attempt = 0;

        loop {
            attempt += 1;
            let request: ActivityRequest = decode(&payload)?;
            match self.inner.execute(request).await {
                Ok(output) => return decode(&encode(&output)?),
                Err(e) if e.is_retryable() && attempt < self.policy.max_attempts => {
                    warn!(activity, attempt, error = %e, "Activity failed, retrying");
                    tokio::time::sleep(self.policy.backoff * attempt).await;
                }
                Err(e) if e.is_retryable() => {
                    let exhausted = WorkflowError::ActivityExhausted {
                        activity: activity.to_string(),
                        attempts: attempt,
                        reason: e.to_string(),
                    };
                    warn!(activity, error = %exhausted, "Activity retries exhausted");
                    return Err(ActivityError::Fatal {
                        activity: activity.to_string(),
                        reason: exhausted.to_string(),
                    });
                }
                Err(e) => return Err(e),
            }
        }
    }
}

fn encode<T: Serialize>(value: &T) -> Result<String, ActivityError> {
    serde_json::to_string(value).map_err(|e| ActivityError::Serialization(e.to_string()))
}

fn decode<T: DeserializeOwned>(payload: &str) -> Result<T, ActivityError> {
    serde_json::from_str(payload).map_err(|e| ActivityError::Serialization(e.to_string()))
}

struct ActiveRun {
    sequence: u64,
    handle: JoinHandle<WorkflowReport>,
}

/// In-process durable engine: one task per workflow id.
pub struct LocalDurableEngine {
    executor: Arc<RetryingExecutor>,
    workflow: Arc<MessageWorkflow>,
    runs: Mutex<HashMap<String, ActiveRun>>,
}

impl LocalDurableEngine {
    pub fn new(activities: Arc<dyn ActivityExecutor>, workflow: MessageWorkflow, policy: RetryPolicy) -> Self {
        Self {
            executor: Arc::new(RetryingExecutor::new(activities, policy)),
            workflow: Arc::new(workflow),
            runs: Mutex::new(HashMap::new()),
        }
    }

    /// Wait for the run currently registered under `workflow_id`.
    ///
    /// Returns `None` when nothing is registered.
    pub async fn join(&self, workflow_id: &str) -> Option<Result<WorkflowReport, WorkflowError>> {
        let active = self
            .runs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(workflow_id)?;
        Some(match active.handle.await {
            Ok(report) => Ok(report),
            Err(e) if e.is_cancelled() => Err(WorkflowError::Terminated(workflow_id.to_string())),
            Err(e) => Err(WorkflowError::EngineUnavailable(e.to_string())),
        })
    }

    /// Number of runs that have not finished yet.
    pub fn active_runs(&self) -> usize {
        self.runs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .filter(|run| !run.handle.is_finished())
            .count()
    }
}

#[async_trait]
impl DurableEngine for LocalDurableEngine {
    fn name(&self) -> &str {
        "local"
    }

    async fn start(
        &self,
        workflow_id: &str,
        input: WorkflowInput,
    ) -> Result<StartedWorkflow, WorkflowError> {
        let sequence = input.run.sequence;
        let executor = self.executor.clone();
        let workflow = self.workflow.clone();

        let mut runs = self.runs.lock().unwrap_or_else(|e| e.into_inner());
        let terminated_sequence = match runs.remove(workflow_id) {
            Some(previous) if !previous.handle.is_finished() => {
                previous.handle.abort();
                info!(
                    workflow_id = %workflow_id,
                    terminated = previous.sequence,
                    sequence,
                    "Terminated running workflow for newer message"
                );
                Some(previous.sequence)
            }
            _ => None,
        };

        let handle = tokio::spawn(async move { workflow.run(executor.as_ref(), input).await });
        runs.insert(workflow_id.to_string(), ActiveRun { sequence, handle });
        debug!(workflow_id = %workflow_id, sequence, "Workflow started on local engine");

        Ok(StartedWorkflow {
            workflow_id: workflow_id.to_string(),
            terminated_sequence,
        })
    }
}
