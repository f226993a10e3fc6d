//! Function platform abstraction.
//!
//! The reconciler and alias manager talk to the platform exclusively through
//! [`FunctionPlatform`]. The AWS Lambda implementation lives in
//! `liftoff-lambda`; [`MemoryPlatform`] is an in-memory implementation for
//! tests.

mod memory;

pub use memory::{MemoryPlatform, PlatformCall, PlatformOperation};

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::error::PlatformError;
use crate::types::{AliasRecord, ArtifactRef, DeploymentDescriptor, FunctionRecord, NetworkPlacement};

/// Where the platform fetches function code from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeLocation {
    /// Bucket holding the code archive.
    pub bucket: String,
    /// Key of the code archive.
    pub key: String,
}

impl From<&ArtifactRef> for CodeLocation {
    fn from(artifact: &ArtifactRef) -> Self {
        Self {
            bucket: artifact.bucket().to_owned(),
            key: artifact.key().to_owned(),
        }
    }
}

/// Mutable configuration of a function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionSettings {
    /// Entry-point handler.
    pub handler: String,
    /// Runtime identifier.
    pub runtime: String,
    /// Memory size in MB.
    pub memory_size: u32,
    /// Timeout in seconds.
    pub timeout: u32,
    /// Execution role.
    pub role: String,
    /// Description.
    pub description: String,
    /// Network placement.
    pub network: Option<NetworkPlacement>,
    /// Environment variables.
    pub environment: Option<BTreeMap<String, String>>,
}

impl From<&DeploymentDescriptor> for FunctionSettings {
    fn from(descriptor: &DeploymentDescriptor) -> Self {
        Self {
            handler: descriptor.handler().to_owned(),
            runtime: descriptor.runtime().to_owned(),
            memory_size: descriptor.memory_size(),
            timeout: descriptor.timeout(),
            role: descriptor.role().to_owned(),
            description: descriptor.description().to_owned(),
            network: descriptor.network().cloned(),
            environment: descriptor.environment().cloned(),
        }
    }
}

/// Request to create a function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateFunctionRequest {
    /// Function name.
    pub function_name: String,
    /// Code source.
    pub code: CodeLocation,
    /// Function configuration.
    pub settings: FunctionSettings,
    /// Publish the first version immediately.
    pub publish: bool,
}

/// Request to replace a function's code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateCodeRequest {
    /// Function name.
    pub function_name: String,
    /// New code source.
    pub code: CodeLocation,
    /// Publish a new version after the update.
    pub publish: bool,
}

/// Request to replace a function's configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateConfigurationRequest {
    /// Function name.
    pub function_name: String,
    /// New configuration.
    pub settings: FunctionSettings,
}

/// Request to create or repoint an alias.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AliasRequest {
    /// Function the alias belongs to.
    pub function_name: String,
    /// Alias name.
    pub name: String,
    /// Version the alias should point at.
    pub function_version: String,
}

/// Operations the deployer needs from a serverless function platform.
///
/// Every method reports failures as a [`PlatformError`] whose kind is
/// classified by the implementation from the platform's error codes. In
/// particular, lookups of absent functions or aliases must fail with
/// [`crate::error::PlatformErrorKind::NotFound`] and nothing else.
#[async_trait]
pub trait FunctionPlatform: Send + Sync {
    /// Look up a function by name or fully qualified identifier.
    async fn get_function(&self, function_id: &str) -> Result<FunctionRecord, PlatformError>;

    /// Create a function.
    async fn create_function(
        &self,
        request: &CreateFunctionRequest,
    ) -> Result<FunctionRecord, PlatformError>;

    /// Replace a function's code, optionally publishing a version.
    async fn update_function_code(
        &self,
        request: &UpdateCodeRequest,
    ) -> Result<FunctionRecord, PlatformError>;

    /// Replace a function's configuration.
    async fn update_function_configuration(
        &self,
        request: &UpdateConfigurationRequest,
    ) -> Result<FunctionRecord, PlatformError>;

    /// Look up an alias.
    async fn get_alias(&self, function_name: &str, name: &str)
        -> Result<AliasRecord, PlatformError>;

    /// Create an alias.
    async fn create_alias(&self, request: &AliasRequest) -> Result<AliasRecord, PlatformError>;

    /// Repoint an existing alias.
    async fn update_alias(&self, request: &AliasRequest) -> Result<AliasRecord, PlatformError>;
}
