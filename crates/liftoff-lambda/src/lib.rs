//! AWS Lambda adapter for liftoff.
//!
//! Decodes S3 notifications into artifact references, runs them through a
//! [`Deployer`] under a deadline-derived cancellation token, and talks to
//! the Lambda control plane through [`LambdaPlatform`].

#![forbid(unsafe_code)]

pub mod event;
pub mod platform;

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use liftoff_core::config::InvocationConfig;
use liftoff_core::{ArtifactRef, Deployer, ScratchError};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub use platform::LambdaPlatform;

/// Errors that fail a whole invocation.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    /// Scratch storage could not be allocated.
    #[error(transparent)]
    Scratch(#[from] ScratchError),

    /// At least one record failed to deploy.
    #[error("{failed} of {total} artifact(s) failed to deploy")]
    RecordsFailed {
        /// Number of failed records.
        failed: usize,
        /// Number of records in the batch.
        total: usize,
    },
}

/// Invocation response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    /// Records that deployed successfully.
    pub deployed: usize,
    /// Records that failed.
    pub failed: usize,
}

/// Time left before in-flight work must stop.
///
/// `deadline_ms` is the host deadline in milliseconds since the Unix epoch.
/// A deadline already past (or within the margin) yields zero.
#[must_use]
pub fn time_budget(deadline_ms: u64, now: SystemTime, margin: Duration) -> Duration {
    let deadline = UNIX_EPOCH + Duration::from_millis(deadline_ms);
    deadline
        .duration_since(now)
        .unwrap_or(Duration::ZERO)
        .saturating_sub(margin)
}

/// Deploy a batch, cancelling in-flight work `budget` from now.
pub async fn handle(
    deployer: &Deployer,
    config: &InvocationConfig,
    artifacts: &[ArtifactRef],
    budget: Duration,
) -> Result<BatchSummary, HandlerError> {
    let cancel = CancellationToken::new();
    let timer = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            tokio::time::sleep(budget).await;
            warn!(budget_ms = budget.as_millis(), "deadline approaching, cancelling");
            cancel.cancel();
        }
    });

    info!(records = artifacts.len(), budget_ms = budget.as_millis(), "invocation started");
    let report = deployer.deploy_batch(artifacts, &cancel).await;
    timer.abort();
    let report = report?;

    let summary = BatchSummary {
        deployed: report.succeeded().count(),
        failed: report.failed().count(),
    };

    if summary.failed > 0 && config.fail_on_record_error {
        return Err(HandlerError::RecordsFailed {
            failed: summary.failed,
            total: artifacts.len(),
        });
    }

    Ok(summary)
}
