//! Batch orchestration: artifact in, aliased function out.

use std::sync::Arc;

use tokio::task::spawn_blocking;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use crate::alias::AliasManager;
use crate::cancel::cancellable;
use crate::config::{DeployConfig, ManifestConfig};
use crate::error::{DeployError, DeployResult, ScratchError};
use crate::manifest::parse_archive;
use crate::platform::FunctionPlatform;
use crate::reconcile::Reconciler;
use crate::scratch::ScratchSpace;
use crate::stage::StageResolver;
use crate::storage::ArtifactSource;
use crate::types::{AliasRecord, ArtifactRef, DeploymentDescriptor, FunctionRecord, StageName};

/// A successfully deployed artifact.
#[derive(Debug, Clone)]
pub struct Deployment {
    /// Artifact the function was deployed from.
    pub artifact: ArtifactRef,
    /// Function as left by the reconciler.
    pub function: FunctionRecord,
    /// Stage the alias was applied for.
    pub stage: StageName,
    /// Alias as left by the platform.
    pub alias: AliasRecord,
}

/// Outcome of one record in a batch.
#[derive(Debug)]
pub struct RecordOutcome {
    /// Artifact the record referred to.
    pub artifact: ArtifactRef,
    /// What happened to it.
    pub result: DeployResult<Deployment>,
}

/// Per-record outcomes of a batch, in input order.
#[derive(Debug, Default)]
pub struct BatchReport {
    /// One entry per input record.
    pub outcomes: Vec<RecordOutcome>,
}

impl BatchReport {
    /// Records that deployed successfully.
    pub fn succeeded(&self) -> impl Iterator<Item = &Deployment> {
        self.outcomes.iter().filter_map(|o| o.result.as_ref().ok())
    }

    /// Records that failed, with their errors.
    pub fn failed(&self) -> impl Iterator<Item = (&ArtifactRef, &DeployError)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().err().map(|e| (&o.artifact, e)))
    }

    /// Whether every record deployed.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.outcomes.iter().all(|o| o.result.is_ok())
    }
}

/// Deploys batches of artifacts one record at a time.
pub struct Deployer {
    source: Arc<dyn ArtifactSource>,
    reconciler: Reconciler,
    aliases: AliasManager,
    stages: StageResolver,
    manifest: ManifestConfig,
    scratch: ScratchSpace,
}

impl Deployer {
    /// Wire a deployer from configuration and its two external services.
    pub fn new(
        config: &DeployConfig,
        platform: Arc<dyn FunctionPlatform>,
        source: Arc<dyn ArtifactSource>,
    ) -> Self {
        Self {
            source,
            reconciler: Reconciler::new(platform.clone(), config.platform.clone()),
            aliases: AliasManager::new(platform),
            stages: StageResolver::new(&config.stages),
            manifest: config.manifest.clone(),
            scratch: ScratchSpace::new(&config.scratch),
        }
    }

    /// Deploy every artifact in order.
    ///
    /// A failing record is logged and recorded, and processing moves on to
    /// the next one. Once `cancel` fires, the in-flight record fails with
    /// [`DeployError::Cancelled`] and the remaining records are reported as
    /// cancelled without being started. The only batch-level error is a
    /// failure to allocate scratch storage.
    pub async fn deploy_batch(
        &self,
        artifacts: &[ArtifactRef],
        cancel: &CancellationToken,
    ) -> Result<BatchReport, ScratchError> {
        let mut report = BatchReport {
            outcomes: Vec::with_capacity(artifacts.len()),
        };

        for artifact in artifacts {
            let result = if cancel.is_cancelled() {
                Err(DeployError::Cancelled)
            } else {
                self.deploy_record(artifact, cancel).await?
            };

            match &result {
                Ok(deployment) => info!(
                    bucket = %artifact.bucket(),
                    key = %artifact.key(),
                    function = %deployment.function.name,
                    version = %deployment.function.version,
                    stage = %deployment.stage,
                    "artifact deployed"
                ),
                Err(e) => error!(
                    bucket = %artifact.bucket(),
                    key = %artifact.key(),
                    kind = e.kind(),
                    platform_kind = e.platform_kind().map(|k| k.as_str()).unwrap_or_default(),
                    error = %e,
                    "artifact deployment failed"
                ),
            }

            report.outcomes.push(RecordOutcome {
                artifact: artifact.clone(),
                result,
            });
        }

        let failed = report.failed().count();
        if failed > 0 {
            warn!(records = artifacts.len(), failed, "batch finished with failures");
        } else {
            info!(records = artifacts.len(), "batch finished");
        }

        Ok(report)
    }

    #[instrument(
        skip(self, artifact, cancel),
        fields(bucket = %artifact.bucket(), key = %artifact.key())
    )]
    async fn deploy_record(
        &self,
        artifact: &ArtifactRef,
        cancel: &CancellationToken,
    ) -> Result<DeployResult<Deployment>, ScratchError> {
        let scratch = self.scratch.allocate()?;
        let mut sink = scratch.writer()?;

        let downloaded = cancellable(cancel, self.source.fetch(artifact, &mut sink))
            .await
            .and_then(|fetched| {
                fetched.map_err(|source| DeployError::DownloadFailed {
                    artifact: artifact.clone(),
                    source,
                })
            });
        drop(sink);

        let bytes = match downloaded {
            Ok(bytes) => bytes,
            Err(e) => return Ok(Err(e)),
        };
        info!(bytes, "artifact downloaded");

        let reader = scratch.reader()?;
        let manifest = self.manifest.clone();
        let parsed = spawn_blocking(move || parse_archive(reader, &manifest))
            .await
            .unwrap_or_else(|e| Err(DeployError::Archive(format!("manifest task failed: {e}"))));
        drop(scratch);

        let descriptor = match parsed {
            Ok(descriptor) => descriptor,
            Err(e) => return Ok(Err(e)),
        };

        Ok(self.promote(artifact, &descriptor, cancel).await)
    }

    async fn promote(
        &self,
        artifact: &ArtifactRef,
        descriptor: &DeploymentDescriptor,
        cancel: &CancellationToken,
    ) -> DeployResult<Deployment> {
        info!(
            function = %descriptor.function_name(),
            runtime = %descriptor.runtime(),
            publish = descriptor.publish(),
            "manifest parsed"
        );

        let function = self.reconciler.reconcile(descriptor, artifact, cancel).await?;
        let stage = self.stages.resolve(artifact.key());
        let alias = self.aliases.apply(&function, &stage, cancel).await?;

        Ok(Deployment {
            artifact: artifact.clone(),
            function,
            stage,
            alias,
        })
    }
}
