//! Liftoff Lambda entry point.
//!
//! Deploys every artifact named in an S3 notification.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use aws_config::meta::region::RegionProviderChain;
use aws_config::{BehaviorVersion, Region};
use aws_lambda_events::event::s3::S3Event;
use lambda_runtime::{run, service_fn, Error, LambdaEvent};
use liftoff_core::{DeployConfig, Deployer, ObjectStoreSource};
use liftoff_lambda::{event, handle, time_budget, LambdaPlatform};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("liftoff_core=info".parse()?)
                .add_directive("liftoff_lambda=info".parse()?),
        )
        .with_ansi(false)
        .without_time()
        .init();

    let config = DeployConfig::load().unwrap_or_else(|e| {
        error!(error = %e, "failed to load config, falling back to defaults for every section");
        DeployConfig::default()
    });

    info!(
        region = %config.platform.region,
        scratch = %config.scratch.dir.display(),
        stages = ?config.stages.prefixes,
        default_stage = %config.stages.default,
        "configuration loaded"
    );

    let region = RegionProviderChain::default_provider()
        .or_else(Region::new(config.platform.region.clone()));
    let sdk_config = aws_config::defaults(BehaviorVersion::latest())
        .region(region)
        .load()
        .await;

    let platform = Arc::new(LambdaPlatform::new(aws_sdk_lambda::Client::new(&sdk_config)));
    let source = Arc::new(ObjectStoreSource::new(config.storage.clone()));
    let deployer = Deployer::new(&config, platform, source);

    let deployer = &deployer;
    let config = &config;
    run(service_fn(move |event: LambdaEvent<S3Event>| async move {
        let margin = Duration::from_millis(config.invocation.deadline_margin_ms);
        let budget = time_budget(event.context.deadline, SystemTime::now(), margin);
        let artifacts = event::artifacts(&event.payload);

        handle(deployer, &config.invocation, &artifacts, budget)
            .await
            .map_err(Error::from)
    }))
    .await
}

