//! Write-once article persistence.
//!
//! Records are keyed by `{YYYYMMDD}/{domain}/{link_id}/{sha224}.json`, so an
//! unchanged article maps to an existing key and is never rewritten while
//! an edited one lands next to its previous versions.

use async_trait::async_trait;
use chrono::DateTime;
use dashmap::{DashMap, mapref::entry::Entry};
use sha2::{Digest, Sha224};
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::debug;
use uuid::Uuid;

use crate::article::ArticleRecord;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("invalid storage key {0:?}")]
    InvalidKey(String),

    #[error("article has no publication time")]
    Undated,

    #[error("failed to serialize article: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("io error for {key}: {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn exists(&self, key: &str) -> Result<bool, StorageError>;

    /// Store `bytes` under `key` unless the key is taken. Returns whether
    /// this call wrote the blob.
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<bool, StorageError>;
}

/// Hex sha224 digest.
pub fn content_hash(bytes: &[u8]) -> String {
    format!("{:x}", Sha224::digest(bytes))
}

/// Storage key for one article version. The date folder is the UTC day of
/// `published`.
pub fn article_key(published: i64, domain: &str, link_id: &str, hash: &str) -> Option<String> {
    let day = DateTime::from_timestamp(published, 0)?.format("%Y%m%d");
    let link_id = link_id.replace(['/', '\\'], "_");
    if domain.is_empty() || link_id.is_empty() || link_id == "." || link_id == ".." {
        return None;
    }
    Some(format!("{day}/{domain}/{link_id}/{hash}.json"))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Persisted {
    Written(String),
    Unchanged(String),
}

impl Persisted {
    pub fn key(&self) -> &str {
        match self {
            Persisted::Written(key) | Persisted::Unchanged(key) => key,
        }
    }
}

/// Store `record` unless an identical version is already present.
pub async fn persist_if_absent<S: BlobStore + ?Sized>(
    store: &S,
    record: &ArticleRecord,
    domain: &str,
    link_id: &str,
) -> Result<Persisted, StorageError> {
    let published = record.article.time.published.ok_or(StorageError::Undated)?;
    let hash = content_hash(&serde_json::to_vec(&record.article)?);
    let key = article_key(published, domain, link_id, &hash)
        .ok_or_else(|| StorageError::InvalidKey(format!("{domain}/{link_id}")))?;

    if store.exists(&key).await? {
        debug!(key = %key, "article unchanged");
        return Ok(Persisted::Unchanged(key));
    }
    if store.put(&key, record.to_json_bytes()?).await? {
        Ok(Persisted::Written(key))
    } else {
        Ok(Persisted::Unchanged(key))
    }
}

#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: DashMap<String, Vec<u8>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.blobs.get(key).map(|blob| blob.value().clone())
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.blobs.iter().map(|blob| blob.key().clone()).collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        Ok(self.blobs.contains_key(key))
    }

    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<bool, StorageError> {
        match self.blobs.entry(key.to_string()) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(bytes);
                Ok(true)
            }
        }
    }
}

/// Blobs as files under a root directory.
///
/// Each blob is written to a temporary file and hard-linked into place, so
/// a key either does not exist or holds a complete blob.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path(&self, key: &str) -> Result<PathBuf, StorageError> {
        let relative = Path::new(key);
        let valid = !key.is_empty()
            && relative
                .components()
                .all(|component| matches!(component, Component::Normal(_)));
        if !valid {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        let path = self.path(key)?;
        tokio::fs::try_exists(&path)
            .await
            .map_err(|source| StorageError::Io {
                key: key.to_string(),
                source,
            })
    }

    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<bool, StorageError> {
        let path = self.path(key)?;
        let io_error = |source| StorageError::Io {
            key: key.to_string(),
            source,
        };

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(io_error)?;
        }

        let staging = path.with_extension(format!("{}.tmp", Uuid::new_v4()));
        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&staging)
            .await
            .map_err(io_error)?;
        let written = async {
            file.write_all(&bytes).await?;
            file.sync_all().await
        }
        .await;
        drop(file);

        let linked = match written {
            Ok(()) => tokio::fs::hard_link(&staging, &path).await,
            Err(err) => Err(err),
        };
        let _ = tokio::fs::remove_file(&staging).await;

        match linked {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == ErrorKind::AlreadyExists => Ok(false),
            Err(err) => Err(io_error(err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::article::Article;
    use url::Url;

    fn record() -> ArticleRecord {
        let url = Url::parse("https://news.example.com/2018/10/18/story").unwrap();
        let mut article = Article::default();
        article.set_title("Title");
        article.set_organisation("Example News");
        article.set_published(Some(1_539_870_072));
        article.set_markdown("Hello world".to_string());
        ArticleRecord::new(article.finalize(&url).unwrap(), &url)
    }

    #[test]
    fn test_article_key_uses_utc_day() {
        // 2018-10-18T23:30:00Z is already the 19th east of UTC
        assert_eq!(
            article_key(1_539_905_400, "example.com", "story", "abc").as_deref(),
            Some("20181018/example.com/story/abc.json")
        );
        assert_eq!(
            article_key(0, "example.com", "a/b", "abc").as_deref(),
            Some("19700101/example.com/a_b/abc.json")
        );
        assert_eq!(article_key(0, "example.com", "..", "abc"), None);
    }

    #[test]
    fn test_content_hash() {
        let hash = content_hash(b"article");
        assert_eq!(hash.len(), 56);
        assert_eq!(hash, content_hash(b"article"));
        assert_ne!(hash, content_hash(b"article "));
    }

    #[tokio::test]
    async fn test_memory_store_is_write_once() {
        let store = MemoryBlobStore::new();
        assert!(store.put("a/b.json", b"one".to_vec()).await.unwrap());
        assert!(!store.put("a/b.json", b"two".to_vec()).await.unwrap());
        assert!(store.exists("a/b.json").await.unwrap());
        assert_eq!(store.get("a/b.json"), Some(b"one".to_vec()));
    }

    #[tokio::test]
    async fn test_fs_store_is_write_once() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path());

        assert!(!store.exists("20181018/example.com/a/h.json").await.unwrap());
        assert!(store.put("20181018/example.com/a/h.json", b"one".to_vec()).await.unwrap());
        assert!(!store.put("20181018/example.com/a/h.json", b"two".to_vec()).await.unwrap());
        assert!(store.exists("20181018/example.com/a/h.json").await.unwrap());

        let stored = std::fs::read(dir.path().join("20181018/example.com/a/h.json")).unwrap();
        assert_eq!(stored, b"one");
        let leftovers = std::fs::read_dir(dir.path().join("20181018/example.com/a")).unwrap().count();
        assert_eq!(leftovers, 1);
    }

    #[tokio::test]
    async fn test_fs_store_rejects_escaping_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path());
        for key in ["../outside.json", "/etc/passwd", ""] {
            assert!(matches!(
                store.put(key, Vec::new()).await,
                Err(StorageError::InvalidKey(_))
            ));
        }
    }

    #[tokio::test]
    async fn test_persist_writes_new_versions() {
        let store = MemoryBlobStore::new();
        let record = record();

        let first = persist_if_absent(&store, &record, "example.com", "story").await.unwrap();
        assert!(matches!(first, Persisted::Written(_)));
        assert!(first.key().starts_with("20181018/example.com/story/"));

        let second = persist_if_absent(&store, &record, "example.com", "story").await.unwrap();
        assert_eq!(second, Persisted::Unchanged(first.key().to_string()));

        let mut edited = record.clone();
        edited.article.set_title("Updated title");
        let third = persist_if_absent(&store, &edited, "example.com", "story").await.unwrap();
        assert!(matches!(third, Persisted::Written(_)));
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_persist_skips_put_when_key_exists() {
        let record = record();
        let hash = content_hash(&serde_json::to_vec(&record.article).unwrap());
        let key = article_key(1_539_870_072, "example.com", "story", &hash).unwrap();

        let mut store = MockBlobStore::new();
        let expected = key.clone();
        store
            .expect_exists()
            .withf(move |candidate| candidate == expected)
            .times(1)
            .returning(|_| Ok(true));
        store.expect_put().never();

        let persisted = persist_if_absent(&store, &record, "example.com", "story").await.unwrap();
        assert_eq!(persisted, Persisted::Unchanged(key));
    }
}
