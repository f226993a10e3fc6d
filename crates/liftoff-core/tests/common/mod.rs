//! Common test utilities for deployer integration tests.

pub mod fixtures;

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use liftoff_core::config::ScratchConfig;
use liftoff_core::{
    ArtifactRef, ArtifactSource, DeployConfig, Deployer, MemoryPlatform, ObjectStoreSource,
    StorageError,
};
use object_store::memory::InMemory;
use object_store::path::Path as ObjectPath;
use object_store::ObjectStore;
use tempfile::TempDir;

/// Bucket every test artifact is uploaded to.
pub const BUCKET: &str = "artifacts";

/// A deployer wired to an in-memory bucket, platform and scratch directory.
pub struct TestDeployer {
    pub deployer: Deployer,
    pub platform: Arc<MemoryPlatform>,
    pub bucket: Arc<InMemory>,
    pub scratch: TempDir,
    source: Arc<ObservedSource>,
}

/// Artifact source that notes how many scratch files exist whenever a
/// download starts.
struct ObservedSource {
    inner: ObjectStoreSource,
    scratch_dir: PathBuf,
    files_at_fetch: Mutex<Vec<usize>>,
}

#[async_trait]
impl ArtifactSource for ObservedSource {
    async fn fetch(
        &self,
        artifact: &ArtifactRef,
        sink: &mut tokio::fs::File,
    ) -> Result<u64, StorageError> {
        self.files_at_fetch
            .lock()
            .expect("lock")
            .push(count_files(&self.scratch_dir));
        self.inner.fetch(artifact, sink).await
    }
}

impl TestDeployer {
    /// Creates a deployer with default configuration.
    pub fn new() -> Self {
        Self::with_config(DeployConfig::default())
    }

    /// Creates a deployer with custom configuration. The scratch directory is
    /// always replaced with a fresh temporary one.
    pub fn with_config(mut config: DeployConfig) -> Self {
        let scratch = tempfile::tempdir().expect("scratch dir");
        config.scratch = ScratchConfig {
            dir: scratch.path().to_path_buf(),
        };

        let platform = Arc::new(MemoryPlatform::new());
        let bucket = Arc::new(InMemory::new());
        let store: Arc<dyn ObjectStore> = bucket.clone();
        let source = Arc::new(ObservedSource {
            inner: ObjectStoreSource::new(config.storage.clone()).with_store(BUCKET, store),
            scratch_dir: scratch.path().to_path_buf(),
            files_at_fetch: Mutex::new(Vec::new()),
        });

        let deployer = Deployer::new(&config, platform.clone(), source.clone());

        Self {
            deployer,
            platform,
            bucket,
            scratch,
            source,
        }
    }

    /// Uploads an artifact and returns its reference.
    pub async fn upload(&self, key: &str, contents: Vec<u8>) -> ArtifactRef {
        self.bucket
            .put(&ObjectPath::from(key), Bytes::from(contents).into())
            .await
            .expect("upload artifact");
        ArtifactRef::new(BUCKET, key)
    }

    /// Scratch files present at the start of each download, in order.
    pub fn scratch_files_at_fetch(&self) -> Vec<usize> {
        self.source.files_at_fetch.lock().expect("lock").clone()
    }

    /// Number of files left in the scratch directory.
    pub fn scratch_files(&self) -> usize {
        count_files(self.scratch.path())
    }
}

fn count_files(dir: &Path) -> usize {
    std::fs::read_dir(dir)
        .map(|entries| entries.filter_map(Result::ok).count())
        .unwrap_or(0)
}
