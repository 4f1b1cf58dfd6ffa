pub mod gc;
mod ipfs;
mod local;

pub use ipfs::IpfsClient;
pub use local::LocalStore;

use crate::{
    settings::StorageSettings,
    types::{ItemHash, ItemHashKind},
};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("object not found: {0}")]
    NotFound(String),
    #[error("object references ipfs but no ipfs backend is configured")]
    NoIpfs,
    #[error("fetch timed out")]
    Timeout,
    #[error("ipfs api error: {0}")]
    Ipfs(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl StorageError {
    /// Permanent errors reject the message; everything else retries.
    pub fn is_permanent(&self) -> bool {
        matches!(self, StorageError::NoIpfs)
    }
}

/// Unified content-addressed storage over the local object store and an
/// optional IPFS daemon. Hash kind decides the backend: sha-256 objects
/// are always local, CIDs prefer the local copy and fall back to IPFS.
pub struct Storage {
    local: LocalStore,
    ipfs: Option<IpfsClient>,
}

impl Storage {
    pub fn new(settings: &StorageSettings) -> anyhow::Result<Self> {
        let ipfs = settings
            .ipfs
            .as_ref()
            .map(IpfsClient::new)
            .transpose()?;
        Ok(Self {
            local: LocalStore::new(settings.root.clone()),
            ipfs,
        })
    }

    /// Fetches the object, persisting remote hits locally so subsequent
    /// readers stay off the network.
    pub async fn fetch(&self, hash: &ItemHash, timeout: Duration) -> Result<Vec<u8>, StorageError> {
        match self.local.get(hash.as_str()).await {
            Ok(bytes) => return Ok(bytes),
            Err(StorageError::NotFound(_)) => {}
            Err(err) => return Err(err),
        }

        match hash.kind() {
            ItemHashKind::Sha256 => Err(StorageError::NotFound(hash.to_string())),
            ItemHashKind::Cid => {
                let ipfs = self.ipfs.as_ref().ok_or(StorageError::NoIpfs)?;
                let bytes = tokio::time::timeout(timeout, ipfs.block_get(hash.as_str()))
                    .await
                    .map_err(|_| StorageError::Timeout)??;
                self.local.put_named(hash.as_str(), &bytes).await?;
                Ok(bytes)
            }
        }
    }

    /// Stores raw bytes locally and returns their sha-256 hex address.
    pub async fn put(&self, bytes: &[u8]) -> Result<String, StorageError> {
        self.local.put(bytes).await
    }

    pub async fn pin(&self, hash: &ItemHash) -> Result<(), StorageError> {
        match hash.kind() {
            // local objects are pinned by existing; the row lock in the
            // stored-file table does the bookkeeping
            ItemHashKind::Sha256 => Ok(()),
            ItemHashKind::Cid => {
                let ipfs = self.ipfs.as_ref().ok_or(StorageError::NoIpfs)?;
                ipfs.pin_add(hash.as_str()).await
            }
        }
    }

    pub async fn unpin(&self, hash: &ItemHash) -> Result<(), StorageError> {
        match hash.kind() {
            ItemHashKind::Sha256 => Ok(()),
            ItemHashKind::Cid => match self.ipfs.as_ref() {
                Some(ipfs) => ipfs.pin_rm(hash.as_str()).await,
                None => Ok(()),
            },
        }
    }

    pub async fn size(&self, hash: &ItemHash) -> Result<u64, StorageError> {
        self.local.size(hash.as_str()).await
    }

    /// Drops the object from every backend. Idempotent; missing objects
    /// are not an error.
    pub async fn remove(&self, hash: &ItemHash) -> Result<(), StorageError> {
        self.unpin(hash).await?;
        self.local.delete(hash.as_str()).await
    }
}
