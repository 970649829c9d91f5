//! Directory-backed privileged executor
//!
//! Stands in for the system's dynamic-partition service on hosts without
//! one: partitions are plain files under an image root. Pre-allocation uses
//! `set_len`, which leaves the files sparse.

use async_trait::async_trait;
use dsu_broker::{BindNotifier, Binder, Identity, PrivilegedService};
use dsu_errors::{Error, PlatformError};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

const USERDATA_FILE: &str = "userdata.img";
const ACTIVE_FILE: &str = "active";

fn fs_error(operation: impl Into<String>, err: &std::io::Error) -> Error {
    let operation = operation.into();
    let platform = if err.kind() == std::io::ErrorKind::PermissionDenied {
        PlatformError::PermissionDenied {
            operation,
            message: err.to_string(),
        }
    } else {
        PlatformError::FilesystemOperationFailed {
            operation,
            message: err.to_string(),
        }
    };
    platform.into()
}

#[cfg(unix)]
#[allow(unsafe_code)]
fn effective_uid() -> u32 {
    // SAFETY: geteuid has no preconditions and cannot fail
    unsafe { libc::geteuid() }
}

#[cfg(not(unix))]
fn effective_uid() -> u32 {
    u32::MAX
}

/// [`PrivilegedService`] writing partitions as files under `root`
#[derive(Debug)]
pub struct LocalPrivilegedService {
    root: PathBuf,
    identity: Identity,
    open: Mutex<HashMap<String, File>>,
}

impl LocalPrivilegedService {
    /// Service running as the current effective user
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::with_identity(root, Identity::new(effective_uid()))
    }

    #[must_use]
    pub fn with_identity(root: impl Into<PathBuf>, identity: Identity) -> Self {
        Self {
            root: root.into(),
            identity,
            open: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn partition_path(&self, name: &str) -> PathBuf {
        self.root.join(format!("{name}.img"))
    }

    #[must_use]
    pub fn userdata_path(&self) -> PathBuf {
        self.root.join(USERDATA_FILE)
    }

    #[must_use]
    pub fn completion_marker(&self, name: &str) -> PathBuf {
        self.root.join(format!("{name}.complete"))
    }

    /// File naming the partition selected for the next boot
    #[must_use]
    pub fn active_path(&self) -> PathBuf {
        self.root.join(ACTIVE_FILE)
    }

    async fn ensure_root(&self) -> Result<(), Error> {
        fs::create_dir_all(&self.root)
            .await
            .map_err(|e| fs_error(format!("create {}", self.root.display()), &e))
    }
}

#[async_trait]
impl PrivilegedService for LocalPrivilegedService {
    fn identity(&self) -> Identity {
        self.identity
    }

    async fn allocate_userdata(&self, size_bytes: u64) -> Result<(), Error> {
        self.ensure_root().await?;
        let path = self.userdata_path();
        let file = File::create(&path)
            .await
            .map_err(|e| fs_error(format!("create {}", path.display()), &e))?;
        file.set_len(size_bytes)
            .await
            .map_err(|e| fs_error("allocate userdata", &e))?;
        tracing::debug!(path = %path.display(), size_bytes, "userdata allocated");
        Ok(())
    }

    async fn create_partition(&self, name: &str, size_bytes: Option<u64>) -> Result<(), Error> {
        self.ensure_root().await?;
        // a stale marker from an earlier install no longer describes this partition
        let marker = self.completion_marker(name);
        match fs::remove_file(&marker).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(fs_error(format!("remove {}", marker.display()), &e)),
        }

        let path = self.partition_path(name);
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)
            .await
            .map_err(|e| fs_error(format!("create {}", path.display()), &e))?;
        if let Some(size) = size_bytes {
            file.set_len(size)
                .await
                .map_err(|e| fs_error(format!("pre-allocate {name}"), &e))?;
        }
        self.open.lock().await.insert(name.to_string(), file);
        tracing::debug!(partition = name, ?size_bytes, "partition created");
        Ok(())
    }

    async fn write_chunk(&self, partition: &str, data: &[u8]) -> Result<(), Error> {
        let mut open = self.open.lock().await;
        let file = open
            .get_mut(partition)
            .ok_or_else(|| PlatformError::PartitionNotOpen {
                partition: partition.to_string(),
                operation: "write".to_string(),
            })?;
        file.write_all(data)
            .await
            .map_err(|e| fs_error(format!("write {partition}"), &e))
    }

    async fn finalize(&self, partition: &str, activate: bool) -> Result<(), Error> {
        let mut file = self.open.lock().await.remove(partition).ok_or_else(|| {
            PlatformError::PartitionNotOpen {
                partition: partition.to_string(),
                operation: "finalize".to_string(),
            }
        })?;
        file.flush()
            .await
            .map_err(|e| fs_error(format!("flush {partition}"), &e))?;
        file.sync_all()
            .await
            .map_err(|e| fs_error(format!("sync {partition}"), &e))?;

        let marker = self.completion_marker(partition);
        fs::write(&marker, b"")
            .await
            .map_err(|e| fs_error(format!("write {}", marker.display()), &e))?;
        if activate {
            let active = self.active_path();
            fs::write(&active, partition)
                .await
                .map_err(|e| fs_error(format!("write {}", active.display()), &e))?;
        }
        tracing::debug!(partition, activate, "partition finalized");
        Ok(())
    }
}

/// [`Binder`] that connects the broker to a [`LocalPrivilegedService`]
#[derive(Debug, Clone)]
pub struct LocalBinder {
    service: Arc<LocalPrivilegedService>,
}

impl LocalBinder {
    #[must_use]
    pub fn new(service: Arc<LocalPrivilegedService>) -> Self {
        Self { service }
    }

    #[must_use]
    pub fn service(&self) -> &Arc<LocalPrivilegedService> {
        &self.service
    }
}

impl Binder for LocalBinder {
    fn request_bind(&self, notifier: BindNotifier) {
        tracing::debug!(root = %self.service.root().display(), "binding local privileged service");
        notifier.connected(self.service.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn writes_land_in_partition_file() {
        let dir = TempDir::new().unwrap();
        let service = LocalPrivilegedService::with_identity(dir.path(), Identity::ROOT);

        service.allocate_userdata(4096).await.unwrap();
        service.create_partition("dsu", None).await.unwrap();
        service.write_chunk("dsu", b"hello ").await.unwrap();
        service.write_chunk("dsu", b"world").await.unwrap();
        service.finalize("dsu", true).await.unwrap();

        let userdata = std::fs::metadata(service.userdata_path()).unwrap();
        assert_eq!(userdata.len(), 4096);
        assert_eq!(
            std::fs::read(service.partition_path("dsu")).unwrap(),
            b"hello world"
        );
        assert!(service.completion_marker("dsu").exists());
        assert_eq!(
            std::fs::read_to_string(service.active_path()).unwrap(),
            "dsu"
        );
    }

    #[tokio::test]
    async fn write_without_create_fails() {
        let dir = TempDir::new().unwrap();
        let service = LocalPrivilegedService::with_identity(dir.path(), Identity::ROOT);
        let err = service.write_chunk("dsu", b"x").await.unwrap_err();
        assert!(matches!(
            err,
            Error::Platform(PlatformError::PartitionNotOpen { .. })
        ));
    }

    #[tokio::test]
    async fn finalize_without_activate_leaves_slot_alone() {
        let dir = TempDir::new().unwrap();
        let service = LocalPrivilegedService::with_identity(dir.path(), Identity::ROOT);
        service.create_partition("dsu", Some(8)).await.unwrap();
        service.write_chunk("dsu", b"abcd").await.unwrap();
        service.finalize("dsu", false).await.unwrap();

        assert_eq!(std::fs::metadata(service.partition_path("dsu")).unwrap().len(), 8);
        assert!(!service.active_path().exists());
    }

    #[tokio::test]
    async fn recreate_clears_completion_marker() {
        let dir = TempDir::new().unwrap();
        let service = LocalPrivilegedService::with_identity(dir.path(), Identity::ROOT);
        service.create_partition("dsu", None).await.unwrap();
        service.finalize("dsu", false).await.unwrap();
        assert!(service.completion_marker("dsu").exists());

        service.create_partition("dsu", None).await.unwrap();
        assert!(!service.completion_marker("dsu").exists());
    }

    #[tokio::test]
    async fn marker_that_cannot_be_removed_fails_before_truncating() {
        let dir = TempDir::new().unwrap();
        let service = LocalPrivilegedService::with_identity(dir.path(), Identity::ROOT);
        std::fs::write(service.partition_path("dsu"), b"previous image").unwrap();
        // a directory in the marker's place makes the unlink fail
        std::fs::create_dir(service.completion_marker("dsu")).unwrap();

        let err = service.create_partition("dsu", None).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Platform(
                PlatformError::FilesystemOperationFailed { .. }
                    | PlatformError::PermissionDenied { .. }
            )
        ));
        assert_eq!(
            std::fs::read(service.partition_path("dsu")).unwrap(),
            b"previous image"
        );
        assert!(service.completion_marker("dsu").exists());
    }
}
