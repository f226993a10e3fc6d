//! Cancellation of in-flight platform and storage calls.

use std::future::Future;

use tokio_util::sync::CancellationToken;

use crate::error::{DeployError, DeployResult};

/// Run `operation` unless `cancel` fires first.
///
/// A cancelled operation is dropped mid-flight and reported as
/// [`DeployError::Cancelled`].
pub(crate) async fn cancellable<F: Future>(
    cancel: &CancellationToken,
    operation: F,
) -> DeployResult<F::Output> {
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(DeployError::Cancelled),
        output = operation => Ok(output),
    }
}
