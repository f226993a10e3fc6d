//! Core types for liftoff-core.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Version identifier the platform uses for the unpublished head of a function.
pub const LATEST_VERSION: &str = "$LATEST";

/// Identifies the object that triggered a deployment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArtifactRef {
    bucket: String,
    key: String,
}

impl ArtifactRef {
    /// Create a new artifact reference.
    #[must_use]
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }

    /// Bucket holding the artifact.
    #[must_use]
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Object key of the artifact.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl fmt::Display for ArtifactRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.bucket, self.key)
    }
}

/// Name of a stage alias (e.g. `DEV`, `PROD`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StageName(String);

impl StageName {
    /// Create a new stage name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Get the name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for StageName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Security groups and subnets a function is attached to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkPlacement {
    /// Security group identifiers.
    pub security_group_ids: Vec<String>,
    /// Subnet identifiers.
    pub subnet_ids: Vec<String>,
}

impl NetworkPlacement {
    /// Whether neither security groups nor subnets are set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.security_group_ids.is_empty() && self.subnet_ids.is_empty()
    }
}

/// A validated deployment manifest.
///
/// Only [`crate::manifest::ManifestFields::into_descriptor`] constructs this
/// type, so every descriptor that reaches the reconciler has a name, handler,
/// runtime, role and positive memory and timeout values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentDescriptor {
    pub(crate) function_name: String,
    pub(crate) handler: String,
    pub(crate) runtime: String,
    pub(crate) memory_size: u32,
    pub(crate) timeout: u32,
    pub(crate) role: String,
    pub(crate) description: String,
    pub(crate) network: Option<NetworkPlacement>,
    pub(crate) environment: Option<BTreeMap<String, String>>,
    pub(crate) publish: bool,
}

impl DeploymentDescriptor {
    /// Function name, unique within the platform account.
    #[must_use]
    pub fn function_name(&self) -> &str {
        &self.function_name
    }

    /// Entry-point handler.
    #[must_use]
    pub fn handler(&self) -> &str {
        &self.handler
    }

    /// Runtime identifier (e.g. `nodejs12.x`).
    #[must_use]
    pub fn runtime(&self) -> &str {
        &self.runtime
    }

    /// Memory size in MB.
    #[must_use]
    pub const fn memory_size(&self) -> u32 {
        self.memory_size
    }

    /// Timeout in seconds.
    #[must_use]
    pub const fn timeout(&self) -> u32 {
        self.timeout
    }

    /// Execution role reference.
    #[must_use]
    pub fn role(&self) -> &str {
        &self.role
    }

    /// Human-readable description.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Network placement, if the function runs inside a VPC.
    #[must_use]
    pub const fn network(&self) -> Option<&NetworkPlacement> {
        self.network.as_ref()
    }

    /// Environment variables, if any were declared.
    #[must_use]
    pub const fn environment(&self) -> Option<&BTreeMap<String, String>> {
        self.environment.as_ref()
    }

    /// Whether the deployment should publish a new version.
    #[must_use]
    pub const fn publish(&self) -> bool {
        self.publish
    }
}

/// The platform's view of a function.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionRecord {
    /// Function name.
    pub name: String,
    /// Fully qualified resource name, when the platform reports one.
    pub arn: Option<String>,
    /// Version this record describes (`$LATEST` or a published number).
    pub version: String,
    /// Runtime identifier.
    pub runtime: Option<String>,
    /// Entry-point handler.
    pub handler: Option<String>,
    /// Memory size in MB.
    pub memory_size: Option<u32>,
    /// Timeout in seconds.
    pub timeout: Option<u32>,
    /// Execution role.
    pub role: Option<String>,
    /// Description.
    pub description: Option<String>,
}

impl FunctionRecord {
    /// Whether this record refers to a published version rather than `$LATEST`.
    #[must_use]
    pub fn is_published(&self) -> bool {
        !self.version.is_empty() && self.version != LATEST_VERSION
    }
}

/// A named pointer to a function version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AliasRecord {
    /// Alias name.
    pub name: String,
    /// Function the alias belongs to.
    pub function_name: String,
    /// Version the alias points at.
    pub function_version: String,
}
