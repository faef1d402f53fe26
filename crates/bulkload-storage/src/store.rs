//! Object Storage by URI
//!
//! [`ExportStore`] resolves a storage URI to an `object_store` backend
//! plus a base path, and exposes the two operations the pipeline needs:
//! read a whole object, write a whole object.
//!
//! Supported schemes:
//! - `file:///path` - the local filesystem.
//! - `memory://name/path` - a process-wide in-memory store, keyed by
//!   `name` so separate handles to the same URI see the same objects.
//!   Used heavily by tests.
//! - `s3://bucket/path` - S3-compatible storage, credentials from the
//!   environment.
//!
//! URIs may carry credentials; [`sanitize_uri`] strips userinfo and query
//! parameters before a URI is logged or embedded in a job description.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};

use bytes::Bytes;
use object_store::aws::AmazonS3Builder;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::path::Path as ObjectPath;
use object_store::ObjectStore;
use url::Url;

use crate::error::{Error, Result};

/// Process-wide registry backing `memory://` URIs.
fn memory_registry() -> &'static Mutex<HashMap<String, Arc<InMemory>>> {
    static REGISTRY: OnceLock<Mutex<HashMap<String, Arc<InMemory>>>> = OnceLock::new();
    REGISTRY.get_or_init(|| Mutex::new(HashMap::new()))
}

/// A resolved storage location: a backend plus a base path within it.
#[derive(Clone)]
pub struct ExportStore {
    store: Arc<dyn ObjectStore>,
    base: ObjectPath,
    uri: String,
}

impl std::fmt::Debug for ExportStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExportStore")
            .field("uri", &sanitize_uri(&self.uri))
            .finish()
    }
}

impl ExportStore {
    /// Resolve a storage URI.
    pub fn from_uri(uri: &str) -> Result<Self> {
        let parsed = Url::parse(uri).map_err(|e| Error::InvalidUri {
            uri: uri.to_string(),
            reason: e.to_string(),
        })?;
        let store: Arc<dyn ObjectStore>;
        let base: ObjectPath;
        match parsed.scheme() {
            "file" => {
                let path = parsed.to_file_path().map_err(|()| Error::InvalidUri {
                    uri: uri.to_string(),
                    reason: "not a valid file path".to_string(),
                })?;
                store = Arc::new(LocalFileSystem::new());
                base = ObjectPath::from_absolute_path(&path).map_err(|e| Error::InvalidUri {
                    uri: uri.to_string(),
                    reason: e.to_string(),
                })?;
            }
            "memory" => {
                let name = parsed.host_str().unwrap_or("default").to_string();
                let memory = {
                    let mut registry = memory_registry().lock().expect("registry poisoned");
                    Arc::clone(registry.entry(name).or_insert_with(|| Arc::new(InMemory::new())))
                };
                store = memory;
                base = ObjectPath::from(parsed.path().trim_matches('/'));
            }
            "s3" => {
                let bucket = parsed.host_str().ok_or_else(|| Error::InvalidUri {
                    uri: uri.to_string(),
                    reason: "missing bucket".to_string(),
                })?;
                let s3 = AmazonS3Builder::from_env()
                    .with_bucket_name(bucket)
                    .build()?;
                store = Arc::new(s3);
                base = ObjectPath::from(parsed.path().trim_matches('/'));
            }
            other => return Err(Error::UnsupportedScheme(other.to_string())),
        }
        Ok(Self {
            store,
            base,
            uri: uri.to_string(),
        })
    }

    /// The URI this store was resolved from.
    pub fn uri(&self) -> &str {
        &self.uri
    }

    fn object_path(&self, name: &str) -> ObjectPath {
        if name.is_empty() {
            self.base.clone()
        } else {
            self.base.child(name)
        }
    }

    /// Read the whole object at `name` relative to the base; an empty
    /// name reads the base object itself.
    pub async fn read_all(&self, name: &str) -> Result<Bytes> {
        let path = self.object_path(name);
        Ok(self.store.get(&path).await?.bytes().await?)
    }

    /// Write a whole object.
    pub async fn put(&self, name: &str, data: Bytes) -> Result<()> {
        let path = self.object_path(name);
        self.store.put(&path, data.into()).await?;
        Ok(())
    }
}

/// Strip credentials and query parameters from a URI for logging. Returns
/// the input unchanged when it does not parse.
pub fn sanitize_uri(uri: &str) -> String {
    match Url::parse(uri) {
        Ok(mut parsed) => {
            let _ = parsed.set_username("");
            let _ = parsed.set_password(None);
            parsed.set_query(None);
            parsed.to_string()
        }
        Err(_) => uri.to_string(),
    }
}
