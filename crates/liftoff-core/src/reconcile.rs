//! Create-or-update reconciliation of a function against a descriptor.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cancel::cancellable;
use crate::config::PlatformConfig;
use crate::error::{DeployError, DeployResult};
use crate::platform::{
    CodeLocation, CreateFunctionRequest, FunctionPlatform, FunctionSettings, UpdateCodeRequest,
    UpdateConfigurationRequest,
};
use crate::types::{ArtifactRef, DeploymentDescriptor, FunctionRecord};

/// Brings a platform function in line with a deployment descriptor.
pub struct Reconciler {
    platform: Arc<dyn FunctionPlatform>,
    config: PlatformConfig,
}

impl Reconciler {
    /// Create a reconciler over the given platform.
    pub fn new(platform: Arc<dyn FunctionPlatform>, config: PlatformConfig) -> Self {
        Self { platform, config }
    }

    /// Create or update the descriptor's function from `artifact`.
    ///
    /// A not-found lookup leads to a single create call. An existing
    /// function gets an update-code call followed by an update-configuration
    /// call; the second is attempted even if the first fails, and either
    /// failure fails the reconciliation. Any other lookup failure is
    /// returned as [`DeployError::ExistenceCheckFailed`] without mutating
    /// anything.
    ///
    /// The returned record carries the version the stage alias should point
    /// at. When publishing an existing function that is the version cut by
    /// the code update; the configuration update that follows only changes
    /// `$LATEST`, so new settings reach an aliased version on the next
    /// publishing deploy.
    pub async fn reconcile(
        &self,
        descriptor: &DeploymentDescriptor,
        artifact: &ArtifactRef,
        cancel: &CancellationToken,
    ) -> DeployResult<FunctionRecord> {
        let function_id = self.config.qualified_function_id(descriptor.function_name());
        debug!(function = %function_id, "checking whether function exists");

        match cancellable(cancel, self.platform.get_function(&function_id)).await? {
            Ok(existing) => {
                info!(
                    function = %descriptor.function_name(),
                    arn = existing.arn.as_deref().unwrap_or_default(),
                    "function exists, updating"
                );
                self.update(descriptor, artifact, cancel).await
            }
            Err(e) if e.is_not_found() => {
                info!(function = %descriptor.function_name(), "function not found, creating");
                self.create(descriptor, artifact, cancel).await
            }
            Err(e) => Err(DeployError::ExistenceCheckFailed(e)),
        }
    }

    async fn create(
        &self,
        descriptor: &DeploymentDescriptor,
        artifact: &ArtifactRef,
        cancel: &CancellationToken,
    ) -> DeployResult<FunctionRecord> {
        let request = CreateFunctionRequest {
            function_name: descriptor.function_name().to_owned(),
            code: CodeLocation::from(artifact),
            settings: FunctionSettings::from(descriptor),
            publish: descriptor.publish(),
        };

        let created = cancellable(cancel, self.platform.create_function(&request))
            .await?
            .map_err(DeployError::CreateFailed)?;

        info!(
            function = %created.name,
            version = %created.version,
            "function created"
        );
        Ok(created)
    }

    async fn update(
        &self,
        descriptor: &DeploymentDescriptor,
        artifact: &ArtifactRef,
        cancel: &CancellationToken,
    ) -> DeployResult<FunctionRecord> {
        let code_request = UpdateCodeRequest {
            function_name: descriptor.function_name().to_owned(),
            code: CodeLocation::from(artifact),
            publish: descriptor.publish(),
        };
        let code_result =
            cancellable(cancel, self.platform.update_function_code(&code_request)).await?;

        match &code_result {
            Ok(record) => debug!(
                function = %record.name,
                version = %record.version,
                "function code updated"
            ),
            Err(e) => warn!(
                function = %descriptor.function_name(),
                kind = %e.kind,
                error = %e,
                "function code update failed, still updating configuration"
            ),
        }

        let configuration_request = UpdateConfigurationRequest {
            function_name: descriptor.function_name().to_owned(),
            settings: FunctionSettings::from(descriptor),
        };
        let configuration_result = cancellable(
            cancel,
            self.platform
                .update_function_configuration(&configuration_request),
        )
        .await?;

        match (code_result, configuration_result) {
            (Ok(code), Ok(mut configured)) => {
                if code.is_published() {
                    configured.version = code.version;
                }
                info!(
                    function = %configured.name,
                    version = %configured.version,
                    "function updated"
                );
                Ok(configured)
            }
            (Err(code), Ok(_)) => Err(DeployError::UpdateCodeFailed(code)),
            (Ok(_), Err(configuration)) => Err(DeployError::UpdateConfigFailed(configuration)),
            (Err(code), Err(configuration)) => Err(DeployError::UpdateFailed {
                code,
                configuration,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ManifestFormat;
    use crate::error::{PlatformError, PlatformErrorKind};
    use crate::manifest::parse_manifest;
    use crate::platform::{MemoryPlatform, PlatformOperation};
    use crate::types::LATEST_VERSION;

    fn descriptor(publish: bool) -> DeploymentDescriptor {
        let text = format!(
            "FUNCTION_NAME=orders\nHANDLER_NAME=index.handler\nMEMORY_SIZE=256\nTIMEOUT=30\n\
             DEV_ARN_IAM_ROLE=role\nPUBLISH={publish}\n"
        );
        parse_manifest(&text, ManifestFormat::Properties, "nodejs12.x").expect("descriptor")
    }

    fn artifact() -> ArtifactRef {
        ArtifactRef::new("deploys", "develop/orders.zip")
    }

    fn reconciler(platform: &Arc<MemoryPlatform>) -> Reconciler {
        Reconciler::new(platform.clone(), PlatformConfig::default())
    }

    #[tokio::test]
    async fn absent_function_is_created_once() {
        let platform = Arc::new(MemoryPlatform::new());

        let record = reconciler(&platform)
            .reconcile(&descriptor(true), &artifact(), &CancellationToken::new())
            .await
            .expect("reconcile");

        assert_eq!(record.version, "1");
        assert_eq!(platform.count(PlatformOperation::CreateFunction), 1);
        assert_eq!(platform.count(PlatformOperation::UpdateFunctionCode), 0);
        assert_eq!(platform.count(PlatformOperation::UpdateFunctionConfiguration), 0);

        let stored = platform.function("orders").expect("created");
        assert_eq!(stored.memory_size, Some(256));
        assert_eq!(stored.runtime.as_deref(), Some("nodejs12.x"));
    }

    #[tokio::test]
    async fn existing_function_is_updated_once_each() {
        let platform = Arc::new(MemoryPlatform::new());
        platform.seed_function("orders", 4);

        let record = reconciler(&platform)
            .reconcile(&descriptor(true), &artifact(), &CancellationToken::new())
            .await
            .expect("reconcile");

        assert_eq!(record.version, "5");
        assert_eq!(record.handler.as_deref(), Some("index.handler"));
        assert_eq!(platform.count(PlatformOperation::CreateFunction), 0);
        assert_eq!(platform.count(PlatformOperation::UpdateFunctionCode), 1);
        assert_eq!(platform.count(PlatformOperation::UpdateFunctionConfiguration), 1);
    }

    #[tokio::test]
    async fn unpublished_update_targets_latest() {
        let platform = Arc::new(MemoryPlatform::new());
        platform.seed_function("orders", 4);

        let record = reconciler(&platform)
            .reconcile(&descriptor(false), &artifact(), &CancellationToken::new())
            .await
            .expect("reconcile");

        assert_eq!(record.version, LATEST_VERSION);
    }

    #[tokio::test]
    async fn ambiguous_lookup_failure_is_fatal_and_mutates_nothing() {
        let platform = Arc::new(MemoryPlatform::new());
        platform.fail_next(
            PlatformOperation::GetFunction,
            PlatformError::new(PlatformErrorKind::Throttled, "rate exceeded"),
        );

        let err = reconciler(&platform)
            .reconcile(&descriptor(true), &artifact(), &CancellationToken::new())
            .await
            .expect_err("should fail");

        assert!(matches!(err, DeployError::ExistenceCheckFailed(_)));
        assert_eq!(platform.count(PlatformOperation::CreateFunction), 0);
        assert_eq!(platform.count(PlatformOperation::UpdateFunctionCode), 0);
    }

    #[tokio::test]
    async fn code_failure_still_updates_configuration() {
        let platform = Arc::new(MemoryPlatform::new());
        platform.seed_function("orders", 1);
        platform.fail_next(
            PlatformOperation::UpdateFunctionCode,
            PlatformError::new(PlatformErrorKind::CodeStorageExceeded, "quota"),
        );

        let err = reconciler(&platform)
            .reconcile(&descriptor(true), &artifact(), &CancellationToken::new())
            .await
            .expect_err("should fail");

        assert!(matches!(err, DeployError::UpdateCodeFailed(_)));
        assert_eq!(platform.count(PlatformOperation::UpdateFunctionConfiguration), 1);
        let stored = platform.function("orders").expect("exists");
        assert_eq!(stored.timeout, Some(30));
    }

    #[tokio::test]
    async fn configuration_failure_is_reported() {
        let platform = Arc::new(MemoryPlatform::new());
        platform.seed_function("orders", 1);
        platform.fail_next(
            PlatformOperation::UpdateFunctionConfiguration,
            PlatformError::new(PlatformErrorKind::InvalidParameter, "bad role"),
        );

        let err = reconciler(&platform)
            .reconcile(&descriptor(true), &artifact(), &CancellationToken::new())
            .await
            .expect_err("should fail");

        assert!(matches!(err, DeployError::UpdateConfigFailed(_)));
    }

    #[tokio::test]
    async fn both_update_failures_are_aggregated() {
        let platform = Arc::new(MemoryPlatform::new());
        platform.seed_function("orders", 1);
        platform.fail_next(
            PlatformOperation::UpdateFunctionCode,
            PlatformError::new(PlatformErrorKind::Conflict, "in progress"),
        );
        platform.fail_next(
            PlatformOperation::UpdateFunctionConfiguration,
            PlatformError::new(PlatformErrorKind::Service, "internal"),
        );

        let err = reconciler(&platform)
            .reconcile(&descriptor(true), &artifact(), &CancellationToken::new())
            .await
            .expect_err("should fail");

        match err {
            DeployError::UpdateFailed {
                code,
                configuration,
            } => {
                assert_eq!(code.kind, PlatformErrorKind::Conflict);
                assert_eq!(configuration.kind, PlatformErrorKind::Service);
            }
            other => panic!("expected UpdateFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn create_failure_is_classified() {
        let platform = Arc::new(MemoryPlatform::new());
        platform.fail_next(
            PlatformOperation::CreateFunction,
            PlatformError::new(PlatformErrorKind::InvalidParameter, "role cannot be assumed"),
        );

        let err = reconciler(&platform)
            .reconcile(&descriptor(true), &artifact(), &CancellationToken::new())
            .await
            .expect_err("should fail");

        assert_eq!(err.kind(), "create_failed");
        assert_eq!(err.platform_kind(), Some(PlatformErrorKind::InvalidParameter));
    }

    #[tokio::test]
    async fn qualified_lookup_uses_arn() {
        let platform = Arc::new(MemoryPlatform::new());
        platform.seed_function("orders", 0);
        let config = PlatformConfig {
            account_id: Some("655622384061".to_owned()),
            ..PlatformConfig::default()
        };

        Reconciler::new(platform.clone(), config)
            .reconcile(&descriptor(false), &artifact(), &CancellationToken::new())
            .await
            .expect("reconcile");

        let calls = platform.calls();
        assert_eq!(
            calls[0].function,
            "arn:aws:lambda:us-east-1:655622384061:function:orders"
        );
        assert_eq!(calls[1].function, "orders");
    }

    #[tokio::test]
    async fn cancelled_token_stops_before_lookup_completes() {
        let platform = Arc::new(MemoryPlatform::new());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = reconciler(&platform)
            .reconcile(&descriptor(true), &artifact(), &cancel)
            .await
            .expect_err("cancelled");

        assert!(matches!(err, DeployError::Cancelled));
        assert_eq!(platform.count(PlatformOperation::CreateFunction), 0);
    }
}
