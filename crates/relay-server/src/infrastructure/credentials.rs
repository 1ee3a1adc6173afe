//! Filesystem-backed credential store.
//!
//! The driver persists its session under a directory (or, for some drivers,
//! a single file).  Purging deletes whatever is there; an absent path counts
//! as already purged.

use std::io;
use std::path::PathBuf;

use async_trait::async_trait;
use tracing::debug;

use crate::application::ports::CredentialStore;

/// Deletes the credential blob at a fixed path.
#[derive(Debug, Clone)]
pub struct FsCredentialStore {
    path: PathBuf,
}

impl FsCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl CredentialStore for FsCredentialStore {
    async fn purge(&self) -> io::Result<()> {
        let removed = match tokio::fs::symlink_metadata(&self.path).await {
            Ok(meta) if meta.is_dir() => tokio::fs::remove_dir_all(&self.path).await,
            Ok(_) => tokio::fs::remove_file(&self.path).await,
            Err(e) => Err(e),
        };
        match removed {
            Ok(()) => {
                debug!(path = %self.path.display(), "credential blob deleted");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}
