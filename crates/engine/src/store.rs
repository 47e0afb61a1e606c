//! Read-only access to the artifacts produced by the build stage.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use gate_core::validation::is_safe_key;
use reqwest::{StatusCode, Url};
use thiserror::Error;

use crate::signing::{uri_encode, RequestSigner};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("object not found")]
    NotFound,
    #[error("access denied")]
    AccessDenied,
    #[error("invalid object location: {0}")]
    InvalidLocation(String),
    #[error("backend error: {0}")]
    Backend(String),
}

/// Keyed object store holding artifact content.
///
/// Shared by every concurrent evaluation; implementations must not mutate.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StoreError>;
}

/// Buckets are directories under `root`; keys are relative paths inside them.
#[derive(Debug, Clone)]
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, bucket: &str, key: &str) -> Result<PathBuf, StoreError> {
        if bucket.is_empty() || bucket.contains('/') || bucket == "." || bucket == ".." {
            return Err(StoreError::InvalidLocation(format!("bucket '{bucket}'")));
        }
        if key.is_empty() || !is_safe_key(key) {
            return Err(StoreError::InvalidLocation(format!("key '{key}'")));
        }
        Ok(self.root.join(bucket).join(Path::new(key)))
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StoreError> {
        let path = self.resolve(bucket, key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(StoreError::NotFound),
            Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => Err(StoreError::AccessDenied),
            Err(e) => Err(StoreError::Backend(format!("read {}: {e}", path.display()))),
        }
    }
}

/// S3 over its REST API with path-style addressing and SigV4 (service `s3`).
#[derive(Debug, Clone)]
pub struct S3ObjectStore {
    http: reqwest::Client,
    endpoint: String,
    signer: RequestSigner,
}

impl S3ObjectStore {
    /// `endpoint` defaults to `https://s3.<region>.amazonaws.com` when `None`.
    pub fn new(http: reqwest::Client, signer: RequestSigner, endpoint: Option<String>) -> Self {
        let endpoint = endpoint
            .unwrap_or_else(|| format!("https://s3.{}.amazonaws.com", signer.region()))
            .trim_end_matches('/')
            .to_string();
        Self {
            http,
            endpoint,
            signer,
        }
    }

    fn object_url(&self, bucket: &str, key: &str) -> Result<Url, StoreError> {
        let raw = format!("{}/{}/{}", self.endpoint, uri_encode(bucket, true), uri_encode(key, false));
        Url::parse(&raw).map_err(|e| StoreError::InvalidLocation(format!("{raw}: {e}")))
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StoreError> {
        let url = self.object_url(bucket, key)?;
        let headers = self.signer.sign("GET", &url, &[], b"", Utc::now());

        let mut req = self.http.get(url);
        for (name, value) in headers {
            req = req.header(name, value);
        }
        let resp = req
            .send()
            .await
            .map_err(|e| StoreError::Backend(format!("request failed: {e}")))?;

        match resp.status() {
            StatusCode::OK => resp
                .bytes()
                .await
                .map(|b| b.to_vec())
                .map_err(|e| StoreError::Backend(format!("read body: {e}"))),
            StatusCode::NOT_FOUND => Err(StoreError::NotFound),
            StatusCode::FORBIDDEN => Err(StoreError::AccessDenied),
            other => Err(StoreError::Backend(format!("unexpected status {other}"))),
        }
    }
}

/// In-memory store for tests.
#[derive(Default)]
pub struct MemoryObjectStore {
    inner: Mutex<HashMap<(String, String), Vec<u8>>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, bucket: &str, key: &str, bytes: impl Into<Vec<u8>>) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.insert((bucket.to_string(), key.to_string()), bytes.into());
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StoreError> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
            .ok_or(StoreError::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signing::Credentials;

    #[tokio::test]
    async fn fs_store_reads_bucket_relative_keys() {
        let dir = tempfile::tempdir().unwrap();
        let obj = dir.path().join("b").join("exec-1");
        std::fs::create_dir_all(&obj).unwrap();
        std::fs::write(obj.join("template.json"), br#"{"Resources":{}}"#).unwrap();

        let store = FsObjectStore::new(dir.path());
        let bytes = store.get("b", "exec-1/template.json").await.unwrap();
        assert_eq!(bytes, br#"{"Resources":{}}"#);

        assert!(matches!(store.get("b", "missing.json").await, Err(StoreError::NotFound)));
    }

    #[tokio::test]
    async fn fs_store_rejects_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsObjectStore::new(dir.path());
        assert!(matches!(
            store.get("b", "../../etc/passwd").await,
            Err(StoreError::InvalidLocation(_))
        ));
        assert!(matches!(
            store.get("..", "x").await,
            Err(StoreError::InvalidLocation(_))
        ));
    }

    #[tokio::test]
    async fn memory_store_round_trip() {
        let store = MemoryObjectStore::new();
        store.put("b", "k", b"{}".to_vec());
        assert_eq!(store.get("b", "k").await.unwrap(), b"{}");
        assert!(matches!(store.get("b", "other").await, Err(StoreError::NotFound)));
    }

    #[test]
    fn s3_urls_are_path_style_and_encoded() {
        let signer = RequestSigner::new(Credentials::new("AKID", "secret"), "eu-west-1", "s3");
        let store = S3ObjectStore::new(reqwest::Client::new(), signer, None);
        let url = store.object_url("my-bucket", "exec 1/template.json").unwrap();
        assert_eq!(
            url.as_str(),
            "https://s3.eu-west-1.amazonaws.com/my-bucket/exec%201/template.json"
        );
    }
}
