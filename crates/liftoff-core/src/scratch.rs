//! Per-record local scratch storage.
//!
//! Every record downloads into its own [`ScratchFile`]. The file is deleted
//! when the handle is dropped, so nothing from one record is visible to the
//! next regardless of how the first one ended.

use std::fs::File;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::debug;

use crate::config::ScratchConfig;
use crate::error::ScratchError;

/// Allocates scratch files in a directory.
#[derive(Debug, Clone)]
pub struct ScratchSpace {
    dir: PathBuf,
}

impl ScratchSpace {
    /// Create a scratch space from configuration.
    #[must_use]
    pub fn new(config: &ScratchConfig) -> Self {
        Self {
            dir: config.dir.clone(),
        }
    }

    /// Allocate a fresh, empty scratch file.
    pub fn allocate(&self) -> Result<ScratchFile, ScratchError> {
        let failed = |source| ScratchError {
            dir: self.dir.display().to_string(),
            source,
        };

        std::fs::create_dir_all(&self.dir).map_err(failed)?;
        let file = tempfile::Builder::new()
            .prefix("artifact-")
            .suffix(".zip")
            .tempfile_in(&self.dir)
            .map_err(failed)?;

        debug!(path = %file.path().display(), "scratch file allocated");
        Ok(ScratchFile { file })
    }
}

/// A scratch file that is removed when dropped.
#[derive(Debug)]
pub struct ScratchFile {
    file: NamedTempFile,
}

impl ScratchFile {
    /// Location of the file on disk.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Open an async write handle positioned at the start of the file.
    pub fn writer(&self) -> Result<tokio::fs::File, ScratchError> {
        self.reopen().map(tokio::fs::File::from_std)
    }

    /// Open a fresh read handle positioned at the start of the file.
    pub fn reader(&self) -> Result<File, ScratchError> {
        self.reopen()
    }

    fn reopen(&self) -> Result<File, ScratchError> {
        self.file.reopen().map_err(|source| ScratchError {
            dir: self.path().display().to_string(),
            source,
        })
    }
}
