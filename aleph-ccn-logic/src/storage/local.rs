use super::StorageError;
use crate::types::sha256_hex;
use std::path::PathBuf;
use tokio::fs;

/// Flat-file object store under `{root}/objects/{hh}/{hash}` where `hh`
/// is the first two characters of the hash.
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    fn path_for(&self, hash: &str) -> PathBuf {
        self.root.join("objects").join(&hash[..2]).join(hash)
    }

    pub async fn get(&self, hash: &str) -> Result<Vec<u8>, StorageError> {
        match fs::read(self.path_for(hash)).await {
            Ok(bytes) => Ok(bytes),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(hash.to_string()))
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Content-addressed write: the address is recomputed from the bytes,
    /// so duplicate puts are deduplicated for free.
    pub async fn put(&self, bytes: &[u8]) -> Result<String, StorageError> {
        let hash = sha256_hex(bytes);
        self.put_named(&hash, bytes).await?;
        Ok(hash)
    }

    /// Write under an externally-computed address (CIDs fetched from
    /// IPFS). Atomic via temp file + rename, safe under concurrent
    /// writers of the same object.
    pub async fn put_named(&self, hash: &str, bytes: &[u8]) -> Result<(), StorageError> {
        let path = self.path_for(hash);
        if fs::try_exists(&path).await? {
            return Ok(());
        }

        let dir = path.parent().expect("object path always has a parent");
        fs::create_dir_all(dir).await?;

        let tmp = path.with_extension(format!("tmp.{}", std::process::id()));
        fs::write(&tmp, bytes).await?;
        fs::rename(&tmp, &path).await?;
        Ok(())
    }

    pub async fn size(&self, hash: &str) -> Result<u64, StorageError> {
        match fs::metadata(self.path_for(hash)).await {
            Ok(meta) => Ok(meta.len()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(hash.to_string()))
            }
            Err(err) => Err(err.into()),
        }
    }

    pub async fn delete(&self, hash: &str) -> Result<(), StorageError> {
        match fs::remove_file(self.path_for(hash)).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, LocalStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new(dir.path().to_path_buf());
        (dir, store)
    }

    #[tokio::test]
    async fn put_get_round_trip() {
        let (_dir, store) = store();

        let hash = store.put(b"some bytes").await.unwrap();
        assert_eq!(hash, sha256_hex(b"some bytes"));
        assert_eq!(store.get(&hash).await.unwrap(), b"some bytes");
        assert_eq!(store.size(&hash).await.unwrap(), 10);
    }

    #[tokio::test]
    async fn put_is_idempotent() {
        let (_dir, store) = store();

        let first = store.put(b"x").await.unwrap();
        let second = store.put(b"x").await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn objects_are_sharded_by_prefix() {
        let (dir, store) = store();

        let hash = store.put(b"sharded").await.unwrap();
        let expected = dir.path().join("objects").join(&hash[..2]).join(&hash);
        assert!(expected.exists());
    }

    #[tokio::test]
    async fn missing_object_is_not_found() {
        let (_dir, store) = store();
        let missing = sha256_hex(b"never stored");

        assert!(matches!(
            store.get(&missing).await,
            Err(StorageError::NotFound(_))
        ));
        // deleting it anyway is fine
        store.delete(&missing).await.unwrap();
    }
}
