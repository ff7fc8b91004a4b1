//! Hosted model start/stop and status.
//!
//! Start and stop are asynchronous transitions on the service side
//! (`STARTING -> RUNNING`, `STOPPING -> STOPPED`). Issuing the request does not
//! wait for the transition; [`wait_for_status`] polls when a caller wants to.

use async_trait::async_trait;
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelStatus {
    TrainingInProgress,
    TrainingCompleted,
    TrainingFailed,
    Starting,
    Running,
    Failed,
    Stopping,
    Stopped,
    Deleting,
    Other(String),
}

impl ModelStatus {
    pub fn parse(s: &str) -> Self {
        match s {
            "TRAINING_IN_PROGRESS" => Self::TrainingInProgress,
            "TRAINING_COMPLETED" => Self::TrainingCompleted,
            "TRAINING_FAILED" => Self::TrainingFailed,
            "STARTING" => Self::Starting,
            "RUNNING" => Self::Running,
            "FAILED" => Self::Failed,
            "STOPPING" => Self::Stopping,
            "STOPPED" => Self::Stopped,
            "DELETING" => Self::Deleting,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::TrainingInProgress => "TRAINING_IN_PROGRESS",
            Self::TrainingCompleted => "TRAINING_COMPLETED",
            Self::TrainingFailed => "TRAINING_FAILED",
            Self::Starting => "STARTING",
            Self::Running => "RUNNING",
            Self::Failed => "FAILED",
            Self::Stopping => "STOPPING",
            Self::Stopped => "STOPPED",
            Self::Deleting => "DELETING",
            Self::Other(s) => s,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed | Self::TrainingFailed)
    }
}

impl fmt::Display for ModelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifies a model version for status queries.
#[derive(Debug, Clone)]
pub struct VersionRef {
    pub project_arn: String,
    pub version_name: String,
}

#[async_trait]
pub trait ModelLifecycle: Send + Sync {
    /// Requests a start and returns the status reported right after.
    async fn start(&self, model_id: &str, min_inference_units: i32) -> Result<ModelStatus>;

    async fn stop(&self, model_id: &str) -> Result<ModelStatus>;

    async fn status(&self, version: &VersionRef) -> Result<ModelStatus>;
}

#[derive(Debug, Clone, Copy)]
pub struct WaitOptions {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            timeout: Duration::from_secs(60 * 60),
        }
    }
}

/// Polls until the version reports `target`.
///
/// Returns early with [`Error::ModelFailed`] on a failed state and with
/// [`Error::WaitTimeout`] once `options.timeout` has passed.
pub async fn wait_for_status(
    lifecycle: &dyn ModelLifecycle,
    version: &VersionRef,
    target: ModelStatus,
    options: WaitOptions,
) -> Result<ModelStatus> {
    let started = Instant::now();
    info!(
        "Waiting for {} to reach {}",
        version.version_name, target
    );
    loop {
        let status = lifecycle.status(version).await?;
        debug!("{} is {}", version.version_name, status);
        if status == target {
            return Ok(status);
        }
        if status.is_failure() {
            return Err(Error::ModelFailed(status.to_string()));
        }
        let waited = started.elapsed();
        if waited >= options.timeout {
            return Err(Error::WaitTimeout {
                target: target.to_string(),
                last: status.to_string(),
                waited_secs: waited.as_secs(),
            });
        }
        tokio::time::sleep(options.interval).await;
    }
}

/// A requested start or stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Start { min_inference_units: i32 },
    Stop,
}

impl Transition {
    /// Status the version settles in once the transition completes.
    pub fn target(&self) -> ModelStatus {
        match self {
            Self::Start { .. } => ModelStatus::Running,
            Self::Stop => ModelStatus::Stopped,
        }
    }
}

/// Everything a start or stop needs, resolved before the request is sent.
#[derive(Debug, Clone)]
pub struct TransitionPlan {
    pub model_id: String,
    pub transition: Transition,
    /// Version to poll and how long to poll it, when waiting was asked for.
    pub wait: Option<(VersionRef, WaitOptions)>,
}

/// Sends the request in `plan` and, if the plan asks for it, waits for the
/// target status. Returns the last status seen.
pub async fn run_transition(
    lifecycle: &dyn ModelLifecycle,
    plan: &TransitionPlan,
) -> Result<ModelStatus> {
    let status = match plan.transition {
        Transition::Start {
            min_inference_units,
        } => lifecycle.start(&plan.model_id, min_inference_units).await?,
        Transition::Stop => lifecycle.stop(&plan.model_id).await?,
    };
    info!("{}: {}", plan.model_id, status);
    match &plan.wait {
        Some((version, options)) => {
            wait_for_status(lifecycle, version, plan.transition.target(), *options).await
        }
        None => Ok(status),
    }
}
