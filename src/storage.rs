use std::path::{Path, PathBuf};

use anyhow::Context;
use async_trait::async_trait;
use bytes::Bytes;
use tracing::debug;
use uuid::Uuid;

/// Public URL prefix under which profile pictures are served.
pub const PROFILE_URL_PREFIX: &str = "/uploads/profiles";

#[async_trait]
pub trait StorageClient: Send + Sync {
    /// Write `body` under `key`, replacing any object with the same key.
    async fn put_object(&self, key: &str, body: Bytes, content_type: &str) -> anyhow::Result<()>;
    /// Remove `key`. Returns `false` if there was nothing to remove.
    async fn delete_object(&self, key: &str) -> anyhow::Result<bool>;
    async fn exists(&self, key: &str) -> anyhow::Result<bool>;
    fn public_url(&self, key: &str) -> String;
}

/// Map a stored public URL back to its object key.
pub fn key_from_public_url(url: &str) -> Option<&str> {
    let key = url.strip_prefix(PROFILE_URL_PREFIX)?.strip_prefix('/')?;
    is_safe_key(key).then_some(key)
}

/// A key must be a single, non-hidden path component.
pub fn is_safe_key(key: &str) -> bool {
    !key.is_empty()
        && !key.starts_with('.')
        && !key.contains(['/', '\\', '\0'])
}

/// Filesystem-backed picture store rooted at one directory.
#[derive(Clone)]
pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    pub async fn new(root: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(&root)
            .await
            .with_context(|| format!("create upload dir {}", root.display()))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> anyhow::Result<PathBuf> {
        anyhow::ensure!(is_safe_key(key), "invalid storage key {key:?}");
        Ok(self.root.join(key))
    }
}

#[async_trait]
impl StorageClient for LocalStorage {
    async fn put_object(&self, key: &str, body: Bytes, content_type: &str) -> anyhow::Result<()> {
        let path = self.path_for(key)?;
        // Write beside the target then rename, so readers never see a partial file.
        let tmp = self.root.join(format!(".{}.{}.tmp", key, Uuid::new_v4()));
        tokio::fs::write(&tmp, &body)
            .await
            .with_context(|| format!("write {}", tmp.display()))?;
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e).with_context(|| format!("rename into {}", path.display()));
        }
        debug!(key, content_type, bytes = body.len(), "object stored");
        Ok(())
    }

    async fn delete_object(&self, key: &str) -> anyhow::Result<bool> {
        let path = self.path_for(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                debug!(key, "object deleted");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e).with_context(|| format!("delete {}", path.display())),
        }
    }

    async fn exists(&self, key: &str) -> anyhow::Result<bool> {
        let path = self.path_for(key)?;
        tokio::fs::try_exists(&path)
            .await
            .with_context(|| format!("stat {}", path.display()))
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/{}", PROFILE_URL_PREFIX, key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_keys_that_escape_the_root() {
        assert!(is_safe_key("jane.png"));
        assert!(!is_safe_key(""));
        assert!(!is_safe_key(".."));
        assert!(!is_safe_key(".hidden"));
        assert!(!is_safe_key("a/b.png"));
        assert!(!is_safe_key("a\\b.png"));
    }

    #[test]
    fn maps_public_url_back_to_key() {
        assert_eq!(key_from_public_url("/uploads/profiles/jane.png"), Some("jane.png"));
        assert_eq!(key_from_public_url("/uploads/profiles/../secret"), None);
        assert_eq!(key_from_public_url("/elsewhere/jane.png"), None);
        assert_eq!(key_from_public_url("/uploads/profilesjane.png"), None);
    }

    #[tokio::test]
    async fn put_overwrites_and_delete_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStorage::new(dir.path().join("profiles")).await.unwrap();

        store
            .put_object("jane.png", Bytes::from_static(b"first"), "image/png")
            .await
            .unwrap();
        store
            .put_object("jane.png", Bytes::from_static(b"second"), "image/png")
            .await
            .unwrap();
        assert!(store.exists("jane.png").await.unwrap());
        let on_disk = tokio::fs::read(store.root().join("jane.png")).await.unwrap();
        assert_eq!(on_disk, b"second");

        assert!(store.delete_object("jane.png").await.unwrap());
        assert!(!store.delete_object("jane.png").await.unwrap());
        assert!(!store.exists("jane.png").await.unwrap());
    }

    #[tokio::test]
    async fn put_leaves_no_temp_files_behind() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStorage::new(dir.path()).await.unwrap();
        store
            .put_object("bob.jpg", Bytes::from_static(b"jpeg"), "image/jpeg")
            .await
            .unwrap();

        let mut entries = tokio::fs::read_dir(dir.path()).await.unwrap();
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await.unwrap() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        assert_eq!(names, vec!["bob.jpg".to_string()]);
    }

    #[tokio::test]
    async fn rejects_unsafe_key_without_touching_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStorage::new(dir.path()).await.unwrap();
        let err = store
            .put_object("../evil.png", Bytes::from_static(b"x"), "image/png")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("invalid storage key"));
        assert_eq!(store.public_url("jane.png"), "/uploads/profiles/jane.png");
    }
}
