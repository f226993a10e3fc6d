//! Error types for liftoff-core.

use std::fmt;

use crate::types::{ArtifactRef, StageName};

/// Result type alias using [`DeployError`].
pub type DeployResult<T> = Result<T, DeployError>;

/// Classification of a function platform failure.
///
/// The set mirrors the error codes the platform reports for function and
/// alias operations. Anything the platform does not classify (transport
/// failures, unknown codes) lands in [`PlatformErrorKind::Unclassified`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlatformErrorKind {
    /// The platform failed internally.
    Service,
    /// A request parameter was rejected.
    InvalidParameter,
    /// The function, version or alias does not exist.
    NotFound,
    /// The resource is in a conflicting state (e.g. an update in progress).
    Conflict,
    /// The request was throttled.
    Throttled,
    /// The account's code storage limit was exceeded.
    CodeStorageExceeded,
    /// Any failure without a recognised error code.
    Unclassified,
}

impl PlatformErrorKind {
    /// Get the kind as a static string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Service => "service",
            Self::InvalidParameter => "invalid_parameter",
            Self::NotFound => "not_found",
            Self::Conflict => "conflict",
            Self::Throttled => "throttled",
            Self::CodeStorageExceeded => "code_storage_exceeded",
            Self::Unclassified => "unclassified",
        }
    }
}

impl fmt::Display for PlatformErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failure reported by the function platform.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct PlatformError {
    /// What class of failure this is.
    pub kind: PlatformErrorKind,
    /// Human-readable detail from the platform.
    pub message: String,
}

impl PlatformError {
    /// Create a platform error of the given kind.
    #[must_use]
    pub fn new(kind: PlatformErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Create a not-found error.
    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(PlatformErrorKind::NotFound, message)
    }

    /// Whether the platform reported that the resource does not exist.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self.kind, PlatformErrorKind::NotFound)
    }
}

/// Errors reading artifacts from object storage.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The object does not exist.
    #[error("object not found: {0}")]
    NotFound(String),

    /// A client for the bucket could not be built.
    #[error("failed to create storage client: {0}")]
    ClientCreation(String),

    /// The key is not a valid object path.
    #[error("invalid object path: {0}")]
    InvalidPath(String),

    /// The backend failed while reading.
    #[error("storage backend error: {0}")]
    Backend(String),

    /// Writing to the local sink failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    /// Create a backend error.
    #[must_use]
    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }
}

/// Local scratch storage could not be allocated.
///
/// This is the only failure that aborts a whole batch: without scratch space
/// no record can be processed.
#[derive(Debug, thiserror::Error)]
#[error("failed to allocate scratch storage in {dir}: {source}")]
pub struct ScratchError {
    /// Directory the scratch file was requested in.
    pub dir: String,
    /// Underlying IO failure.
    #[source]
    pub source: std::io::Error,
}

/// Configuration could not be loaded.
#[derive(Debug, thiserror::Error)]
#[error("configuration error: {0}")]
pub struct ConfigError(pub String);

/// Errors that fail the deployment of a single artifact.
#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    /// The artifact could not be read from object storage.
    #[error("failed to download {artifact}: {source}")]
    DownloadFailed {
        /// Artifact being fetched.
        artifact: ArtifactRef,
        /// Storage failure.
        #[source]
        source: StorageError,
    },

    /// No archive entry matched a manifest marker.
    #[error("no manifest found in archive (looked for {markers})")]
    ManifestMissing {
        /// Comma-separated markers that were searched for.
        markers: String,
    },

    /// The manifest is missing a required field or a field is malformed.
    #[error("invalid manifest field {field}: {reason}")]
    ManifestInvalid {
        /// Field that failed validation.
        field: String,
        /// Why it failed.
        reason: String,
    },

    /// The artifact is not a readable archive.
    #[error("unreadable archive: {0}")]
    Archive(String),

    /// Looking up the function failed for a reason other than absence.
    #[error("function existence check failed: {0}")]
    ExistenceCheckFailed(#[source] PlatformError),

    /// Creating the function failed.
    #[error("create function failed: {0}")]
    CreateFailed(#[source] PlatformError),

    /// Updating the function code failed.
    #[error("update function code failed: {0}")]
    UpdateCodeFailed(#[source] PlatformError),

    /// Updating the function configuration failed.
    #[error("update function configuration failed: {0}")]
    UpdateConfigFailed(#[source] PlatformError),

    /// Both update steps failed.
    #[error("update function failed: code: {code}; configuration: {configuration}")]
    UpdateFailed {
        /// Failure from the code update.
        code: PlatformError,
        /// Failure from the configuration update.
        configuration: PlatformError,
    },

    /// Creating or repointing the stage alias failed.
    #[error("alias operation for stage {stage} failed: {source}")]
    AliasOperationFailed {
        /// Stage alias being applied.
        stage: StageName,
        /// Platform failure.
        #[source]
        source: PlatformError,
    },

    /// The invocation was cancelled before the operation finished.
    #[error("operation cancelled")]
    Cancelled,
}

impl DeployError {
    /// Create a manifest validation error.
    #[must_use]
    pub fn manifest_invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ManifestInvalid {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Stable label for structured logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::DownloadFailed { .. } => "download_failed",
            Self::ManifestMissing { .. } => "manifest_missing",
            Self::ManifestInvalid { .. } => "manifest_invalid",
            Self::Archive(_) => "archive_unreadable",
            Self::ExistenceCheckFailed(_) => "existence_check_failed",
            Self::CreateFailed(_) => "create_failed",
            Self::UpdateCodeFailed(_) => "update_code_failed",
            Self::UpdateConfigFailed(_) => "update_config_failed",
            Self::UpdateFailed { .. } => "update_failed",
            Self::AliasOperationFailed { .. } => "alias_operation_failed",
            Self::Cancelled => "cancelled",
        }
    }

    /// The platform error kind behind this failure, if any.
    ///
    /// When both update steps failed, the code update's kind is reported.
    #[must_use]
    pub const fn platform_kind(&self) -> Option<PlatformErrorKind> {
        match self {
            Self::ExistenceCheckFailed(e)
            | Self::CreateFailed(e)
            | Self::UpdateCodeFailed(e)
            | Self::UpdateConfigFailed(e)
            | Self::UpdateFailed { code: e, .. }
            | Self::AliasOperationFailed { source: e, .. } => Some(e.kind),
            _ => None,
        }
    }
}
