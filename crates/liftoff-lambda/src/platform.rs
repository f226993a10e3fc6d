//! AWS Lambda implementation of [`FunctionPlatform`].

use std::collections::HashMap;
use std::error::Error;
use std::fmt::Debug;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_lambda::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_lambda::types::{Environment, FunctionCode, LastUpdateStatus, Runtime, VpcConfig};
use aws_sdk_lambda::Client;
use liftoff_core::platform::{
    AliasRequest, CreateFunctionRequest, FunctionPlatform, FunctionSettings, UpdateCodeRequest,
    UpdateConfigurationRequest,
};
use liftoff_core::types::LATEST_VERSION;
use liftoff_core::{AliasRecord, FunctionRecord, PlatformError, PlatformErrorKind};
use tracing::{debug, info};

const DEFAULT_UPDATE_POLL_INTERVAL: Duration = Duration::from_secs(1);
const DEFAULT_UPDATE_TIMEOUT: Duration = Duration::from_secs(120);

/// Talks to the Lambda control plane through the AWS SDK.
///
/// Code and configuration updates return only once the function has left
/// the `InProgress` update state, because Lambda rejects a further update
/// with `ResourceConflictException` until then.
#[derive(Debug, Clone)]
pub struct LambdaPlatform {
    client: Client,
    poll_interval: Duration,
    update_timeout: Duration,
}

impl LambdaPlatform {
    /// Wrap an SDK client.
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self {
            client,
            poll_interval: DEFAULT_UPDATE_POLL_INTERVAL,
            update_timeout: DEFAULT_UPDATE_TIMEOUT,
        }
    }

    /// Override how often and for how long an in-progress update is polled.
    #[must_use]
    pub fn with_update_wait(mut self, poll_interval: Duration, timeout: Duration) -> Self {
        self.poll_interval = poll_interval;
        self.update_timeout = timeout;
        self
    }

    async fn update_state(&self, function_name: &str) -> Result<UpdateState, PlatformError> {
        let output = self
            .client
            .get_function_configuration()
            .function_name(function_name)
            .send()
            .await
            .map_err(classify)?;

        Ok(UpdateState::from_status(
            output.last_update_status(),
            output.last_update_status_reason(),
        ))
    }

    async fn settle(
        &self,
        function_name: &str,
        returned: Option<&LastUpdateStatus>,
    ) -> Result<(), PlatformError> {
        if UpdateState::from_status(returned, None) == UpdateState::Settled {
            return Ok(());
        }

        debug!(function = %function_name, "function update in progress, waiting");
        wait_until_settled(
            || self.update_state(function_name),
            self.poll_interval,
            self.update_timeout,
        )
        .await?;
        info!(function = %function_name, "function update settled");
        Ok(())
    }
}

/// Where an asynchronous function update stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateState {
    /// Further updates are rejected until this clears.
    InProgress,
    /// The update finished, or no update was reported.
    Settled,
    /// The platform gave up on the update.
    Failed(String),
}

impl UpdateState {
    /// Interpret a function's `LastUpdateStatus`.
    #[must_use]
    pub fn from_status(status: Option<&LastUpdateStatus>, reason: Option<&str>) -> Self {
        match status {
            Some(LastUpdateStatus::InProgress) => Self::InProgress,
            Some(LastUpdateStatus::Failed) => {
                Self::Failed(reason.unwrap_or("no reason given").to_owned())
            }
            _ => Self::Settled,
        }
    }
}

/// Poll until an update is no longer in progress.
///
/// A failed update is a [`PlatformErrorKind::Service`] error; one still in
/// progress after `timeout` is a [`PlatformErrorKind::Conflict`].
pub async fn wait_until_settled<F, Fut>(
    mut poll: F,
    poll_interval: Duration,
    timeout: Duration,
) -> Result<(), PlatformError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<UpdateState, PlatformError>>,
{
    let deadline = tokio::time::Instant::now() + timeout;

    while tokio::time::Instant::now() < deadline {
        match poll().await? {
            UpdateState::Settled => return Ok(()),
            UpdateState::Failed(reason) => {
                return Err(PlatformError::new(
                    PlatformErrorKind::Service,
                    format!("function update failed: {reason}"),
                ))
            }
            UpdateState::InProgress => tokio::time::sleep(poll_interval).await,
        }
    }

    Err(PlatformError::new(
        PlatformErrorKind::Conflict,
        format!("function update still in progress after {}s", timeout.as_secs()),
    ))
}

/// Map a Lambda error code onto a platform error kind.
#[must_use]
pub fn kind_for_code(code: Option<&str>) -> PlatformErrorKind {
    match code {
        Some("ResourceNotFoundException") => PlatformErrorKind::NotFound,
        Some("ServiceException") => PlatformErrorKind::Service,
        Some("InvalidParameterValueException") => PlatformErrorKind::InvalidParameter,
        Some("ResourceConflictException" | "ResourceInUseException") => PlatformErrorKind::Conflict,
        Some("TooManyRequestsException") => PlatformErrorKind::Throttled,
        Some("CodeStorageExceededException") => PlatformErrorKind::CodeStorageExceeded,
        _ => PlatformErrorKind::Unclassified,
    }
}

fn classify<E, R>(err: SdkError<E, R>) -> PlatformError
where
    E: ProvideErrorMetadata + Error + 'static,
    R: Debug,
{
    let kind = kind_for_code(err.code());
    let message = err
        .message()
        .map_or_else(|| DisplayErrorContext(&err).to_string(), ToOwned::to_owned);
    debug!(code = err.code().unwrap_or_default(), kind = %kind, "lambda call failed");
    PlatformError::new(kind, message)
}

fn to_i32(value: u32, field: &str) -> Result<i32, PlatformError> {
    i32::try_from(value).map_err(|_| {
        PlatformError::new(
            PlatformErrorKind::InvalidParameter,
            format!("{field} {value} is out of range"),
        )
    })
}

fn vpc_config(settings: &FunctionSettings) -> Option<VpcConfig> {
    settings.network.as_ref().map(|network| {
        VpcConfig::builder()
            .set_security_group_ids(Some(network.security_group_ids.clone()))
            .set_subnet_ids(Some(network.subnet_ids.clone()))
            .build()
    })
}

fn environment(settings: &FunctionSettings) -> Option<Environment> {
    settings.environment.as_ref().map(|variables| {
        Environment::builder()
            .set_variables(Some(
                variables
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect::<HashMap<_, _>>(),
            ))
            .build()
    })
}

/// Build a [`FunctionRecord`] from any SDK output exposing the function
/// configuration getters.
macro_rules! function_record {
    ($output:expr, $fallback_name:expr) => {{
        let output = $output;
        FunctionRecord {
            name: output.function_name().unwrap_or($fallback_name).to_owned(),
            arn: output.function_arn().map(ToOwned::to_owned),
            version: output.version().unwrap_or(LATEST_VERSION).to_owned(),
            runtime: output.runtime().map(|r| r.as_str().to_owned()),
            handler: output.handler().map(ToOwned::to_owned),
            role: output.role().map(ToOwned::to_owned),
            description: output.description().map(ToOwned::to_owned),
            memory_size: output.memory_size().and_then(|m| u32::try_from(m).ok()),
            timeout: output.timeout().and_then(|t| u32::try_from(t).ok()),
        }
    }};
}

macro_rules! alias_record {
    ($output:expr, $function_name:expr, $fallback:expr) => {{
        let output = $output;
        AliasRecord {
            name: output.name().unwrap_or($fallback.name.as_str()).to_owned(),
            function_name: $function_name.to_owned(),
            function_version: output
                .function_version()
                .unwrap_or($fallback.function_version.as_str())
                .to_owned(),
        }
    }};
}

#[async_trait]
impl FunctionPlatform for LambdaPlatform {
    async fn get_function(&self, function_id: &str) -> Result<FunctionRecord, PlatformError> {
        let output = self
            .client
            .get_function()
            .function_name(function_id)
            .send()
            .await
            .map_err(classify)?;

        Ok(match output.configuration() {
            Some(configuration) => function_record!(configuration, function_id),
            None => FunctionRecord {
                name: function_id.to_owned(),
                version: LATEST_VERSION.to_owned(),
                ..FunctionRecord::default()
            },
        })
    }

    async fn create_function(
        &self,
        request: &CreateFunctionRequest,
    ) -> Result<FunctionRecord, PlatformError> {
        let settings = &request.settings;
        let output = self
            .client
            .create_function()
            .function_name(&request.function_name)
            .code(
                FunctionCode::builder()
                    .s3_bucket(&request.code.bucket)
                    .s3_key(&request.code.key)
                    .build(),
            )
            .handler(&settings.handler)
            .runtime(Runtime::from(settings.runtime.as_str()))
            .memory_size(to_i32(settings.memory_size, "memory size")?)
            .timeout(to_i32(settings.timeout, "timeout")?)
            .role(&settings.role)
            .description(&settings.description)
            .set_vpc_config(vpc_config(settings))
            .set_environment(environment(settings))
            .publish(request.publish)
            .send()
            .await
            .map_err(classify)?;

        Ok(function_record!(&output, request.function_name.as_str()))
    }

    async fn update_function_code(
        &self,
        request: &UpdateCodeRequest,
    ) -> Result<FunctionRecord, PlatformError> {
        let output = self
            .client
            .update_function_code()
            .function_name(&request.function_name)
            .s3_bucket(&request.code.bucket)
            .s3_key(&request.code.key)
            .publish(request.publish)
            .send()
            .await
            .map_err(classify)?;

        self.settle(&request.function_name, output.last_update_status())
            .await?;
        Ok(function_record!(&output, request.function_name.as_str()))
    }

    async fn update_function_configuration(
        &self,
        request: &UpdateConfigurationRequest,
    ) -> Result<FunctionRecord, PlatformError> {
        let settings = &request.settings;
        let output = self
            .client
            .update_function_configuration()
            .function_name(&request.function_name)
            .handler(&settings.handler)
            .runtime(Runtime::from(settings.runtime.as_str()))
            .memory_size(to_i32(settings.memory_size, "memory size")?)
            .timeout(to_i32(settings.timeout, "timeout")?)
            .role(&settings.role)
            .description(&settings.description)
            .set_vpc_config(vpc_config(settings))
            .set_environment(environment(settings))
            .send()
            .await
            .map_err(classify)?;

        self.settle(&request.function_name, output.last_update_status())
            .await?;
        Ok(function_record!(&output, request.function_name.as_str()))
    }

    async fn get_alias(&self, function_name: &str, name: &str) -> Result<AliasRecord, PlatformError> {
        let output = self
            .client
            .get_alias()
            .function_name(function_name)
            .name(name)
            .send()
            .await
            .map_err(classify)?;

        Ok(AliasRecord {
            name: output.name().unwrap_or(name).to_owned(),
            function_name: function_name.to_owned(),
            function_version: output
                .function_version()
                .unwrap_or(LATEST_VERSION)
                .to_owned(),
        })
    }

    async fn create_alias(&self, request: &AliasRequest) -> Result<AliasRecord, PlatformError> {
        let output = self
            .client
            .create_alias()
            .function_name(&request.function_name)
            .name(&request.name)
            .function_version(&request.function_version)
            .send()
            .await
            .map_err(classify)?;

        Ok(alias_record!(&output, request.function_name, request))
    }

    async fn update_alias(&self, request: &AliasRequest) -> Result<AliasRecord, PlatformError> {
        let output = self
            .client
            .update_alias()
            .function_name(&request.function_name)
            .name(&request.name)
            .function_version(&request.function_version)
            .send()
            .await
            .map_err(classify)?;

        Ok(alias_record!(&output, request.function_name, request))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use liftoff_core::types::NetworkPlacement;

    use super::*;

    fn settings() -> FunctionSettings {
        FunctionSettings {
            handler: "index.handler".to_owned(),
            runtime: "nodejs20.x".to_owned(),
            memory_size: 256,
            timeout: 30,
            role: "arn:aws:iam::123456789012:role/exec".to_owned(),
            description: String::new(),
            network: None,
            environment: None,
        }
    }

    #[test]
    fn known_codes_are_classified() {
        assert_eq!(
            kind_for_code(Some("ResourceNotFoundException")),
            PlatformErrorKind::NotFound
        );
        assert_eq!(
            kind_for_code(Some("ServiceException")),
            PlatformErrorKind::Service
        );
        assert_eq!(
            kind_for_code(Some("InvalidParameterValueException")),
            PlatformErrorKind::InvalidParameter
        );
        assert_eq!(
            kind_for_code(Some("ResourceConflictException")),
            PlatformErrorKind::Conflict
        );
        assert_eq!(
            kind_for_code(Some("TooManyRequestsException")),
            PlatformErrorKind::Throttled
        );
        assert_eq!(
            kind_for_code(Some("CodeStorageExceededException")),
            PlatformErrorKind::CodeStorageExceeded
        );
    }

    #[test]
    fn unknown_codes_are_unclassified() {
        assert_eq!(kind_for_code(None), PlatformErrorKind::Unclassified);
        assert_eq!(
            kind_for_code(Some("KMSAccessDeniedException")),
            PlatformErrorKind::Unclassified
        );
    }

    #[test]
    fn oversized_values_are_rejected() {
        let err = to_i32(u32::MAX, "memory size").expect_err("out of range");
        assert_eq!(err.kind, PlatformErrorKind::InvalidParameter);
        assert_eq!(to_i32(512, "memory size").expect("in range"), 512);
    }

    #[test]
    fn update_status_is_interpreted() {
        assert_eq!(UpdateState::from_status(None, None), UpdateState::Settled);
        assert_eq!(
            UpdateState::from_status(Some(&LastUpdateStatus::Successful), None),
            UpdateState::Settled
        );
        assert_eq!(
            UpdateState::from_status(Some(&LastUpdateStatus::InProgress), None),
            UpdateState::InProgress
        );
        assert_eq!(
            UpdateState::from_status(Some(&LastUpdateStatus::Failed), Some("image invalid")),
            UpdateState::Failed("image invalid".to_owned())
        );
    }

    fn scripted(
        states: Vec<UpdateState>,
    ) -> (
        Arc<AtomicUsize>,
        impl FnMut() -> std::future::Ready<Result<UpdateState, PlatformError>>,
    ) {
        let polls = Arc::new(AtomicUsize::new(0));
        let counter = polls.clone();
        let poll = move || {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            let state = states
                .get(n)
                .or(states.last())
                .cloned()
                .unwrap_or(UpdateState::Settled);
            std::future::ready(Ok(state))
        };
        (polls, poll)
    }

    #[tokio::test(start_paused = true)]
    async fn waits_while_update_is_in_progress() {
        let (polls, poll) = scripted(vec![
            UpdateState::InProgress,
            UpdateState::InProgress,
            UpdateState::Settled,
        ]);

        wait_until_settled(poll, Duration::from_secs(1), Duration::from_secs(60))
            .await
            .expect("settles");

        assert_eq!(polls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_update_is_reported() {
        let (_, poll) = scripted(vec![
            UpdateState::InProgress,
            UpdateState::Failed("EniLimitExceeded".to_owned()),
        ]);

        let err = wait_until_settled(poll, Duration::from_secs(1), Duration::from_secs(60))
            .await
            .expect_err("failed update");

        assert_eq!(err.kind, PlatformErrorKind::Service);
        assert!(err.message.contains("EniLimitExceeded"));
    }

    #[tokio::test(start_paused = true)]
    async fn stuck_update_times_out_as_conflict() {
        let (polls, poll) = scripted(vec![UpdateState::InProgress]);

        let err = wait_until_settled(poll, Duration::from_secs(1), Duration::from_secs(5))
            .await
            .expect_err("timed out");

        assert_eq!(err.kind, PlatformErrorKind::Conflict);
        assert_eq!(polls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn poll_errors_are_propagated() {
        let err = wait_until_settled(
            || {
                std::future::ready(Err(PlatformError::new(
                    PlatformErrorKind::Throttled,
                    "rate exceeded",
                )))
            },
            Duration::from_secs(1),
            Duration::from_secs(5),
        )
        .await
        .expect_err("poll failed");

        assert_eq!(err.kind, PlatformErrorKind::Throttled);
    }

    #[test]
    fn network_and_environment_are_optional() {
        let plain = settings();
        assert!(vpc_config(&plain).is_none());
        assert!(environment(&plain).is_none());

        let placed = FunctionSettings {
            network: Some(NetworkPlacement {
                security_group_ids: vec!["sg-1".to_owned()],
                subnet_ids: vec!["subnet-1".to_owned(), "subnet-2".to_owned()],
            }),
            environment: Some(BTreeMap::from([("STAGE".to_owned(), "dev".to_owned())])),
            ..settings()
        };

        let vpc = vpc_config(&placed).expect("vpc");
        assert_eq!(vpc.subnet_ids(), ["subnet-1", "subnet-2"]);
        let env = environment(&placed).expect("environment");
        assert_eq!(
            env.variables().and_then(|v| v.get("STAGE")).map(String::as_str),
            Some("dev")
        );
    }
}
