//! Stage alias management.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::cancel::cancellable;
use crate::error::{DeployError, DeployResult, PlatformError};
use crate::platform::{AliasRequest, FunctionPlatform};
use crate::types::{AliasRecord, FunctionRecord, StageName};

/// Points stage aliases at function versions.
pub struct AliasManager {
    platform: Arc<dyn FunctionPlatform>,
}

impl AliasManager {
    /// Create an alias manager over the given platform.
    pub fn new(platform: Arc<dyn FunctionPlatform>) -> Self {
        Self { platform }
    }

    /// Point the `stage` alias at `function`'s version.
    ///
    /// An existing alias is overwritten with a single update call; a missing
    /// one (a not-found lookup) is created with a single create call. Any
    /// other lookup failure is returned without issuing either.
    pub async fn apply(
        &self,
        function: &FunctionRecord,
        stage: &StageName,
        cancel: &CancellationToken,
    ) -> DeployResult<AliasRecord> {
        let request = AliasRequest {
            function_name: function.name.clone(),
            name: stage.as_str().to_owned(),
            function_version: function.version.clone(),
        };
        let failed = |source: PlatformError| DeployError::AliasOperationFailed {
            stage: stage.clone(),
            source,
        };

        let lookup = cancellable(
            cancel,
            self.platform.get_alias(&request.function_name, &request.name),
        )
        .await?;

        let alias = match lookup {
            Ok(existing) => {
                info!(
                    function = %request.function_name,
                    alias = %request.name,
                    from = %existing.function_version,
                    to = %request.function_version,
                    "updating alias"
                );
                cancellable(cancel, self.platform.update_alias(&request))
                    .await?
                    .map_err(failed)?
            }
            Err(e) if e.is_not_found() => {
                info!(
                    function = %request.function_name,
                    alias = %request.name,
                    version = %request.function_version,
                    "creating alias"
                );
                cancellable(cancel, self.platform.create_alias(&request))
                    .await?
                    .map_err(failed)?
            }
            Err(e) => return Err(failed(e)),
        };

        Ok(alias)
    }
}
