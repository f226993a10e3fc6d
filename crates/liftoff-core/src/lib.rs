//! Liftoff deployment core
//!
//! This crate turns zipped function artifacts sitting in object storage into
//! deployed, aliased functions on a serverless platform.
//!
//! # Pipeline
//!
//! Each artifact in a batch goes through the same steps, one record at a
//! time:
//!
//! ```text
//! download ──▶ find manifest ──▶ reconcile ──▶ resolve stage ──▶ apply alias
//!  (scratch)   (zip entry)      (create or     (key prefix)     (create or
//!                               update)                         update)
//! ```
//!
//! A record that fails at any step is reported and the batch moves on. The
//! scratch file a record downloads into is removed before the next record
//! starts.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//!
//! use liftoff_core::{ArtifactRef, DeployConfig, Deployer, ObjectStoreSource};
//! use tokio_util::sync::CancellationToken;
//!
//! let config = DeployConfig::load()?;
//! let source = Arc::new(ObjectStoreSource::new(config.storage.clone()));
//! let deployer = Deployer::new(&config, platform, source);
//!
//! let report = deployer
//!     .deploy_batch(
//!         &[ArtifactRef::new("artifacts", "develop/orders.zip")],
//!         &CancellationToken::new(),
//!     )
//!     .await?;
//! assert!(report.is_success());
//! ```

#![doc = include_str!("../README.md")]
#![forbid(unsafe_code)]

mod cancel;

pub mod alias;
pub mod config;
pub mod deployer;
pub mod error;
pub mod manifest;
pub mod platform;
pub mod reconcile;
pub mod scratch;
pub mod stage;
pub mod storage;
pub mod types;

// Re-export commonly used types at the crate root
pub use alias::AliasManager;
pub use config::DeployConfig;
pub use deployer::{BatchReport, Deployer, Deployment, RecordOutcome};
pub use error::{
    ConfigError, DeployError, DeployResult, PlatformError, PlatformErrorKind, ScratchError,
    StorageError,
};
pub use manifest::{parse_archive, parse_manifest};
pub use platform::{FunctionPlatform, MemoryPlatform};
pub use reconcile::Reconciler;
pub use stage::{resolve_stage, StageResolver};
pub use storage::{ArtifactSource, ObjectStoreSource};
pub use types::{AliasRecord, ArtifactRef, DeploymentDescriptor, FunctionRecord, StageName};
