//! # External settings loaders.
//!
//! A [`Loader`] turns a resource location into a JSON document. The runtime
//! uses it for externally referenced unit settings and for the default `fetch`
//! spell action.
//!
//! - [`StaticLoader`]: in-memory documents keyed by resource string.
//! - [`FsLoader`]: files below a root directory, read with `tokio::fs`.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use serde_json::Value;

use crate::error::UnitError;

/// Source of JSON documents.
#[async_trait]
pub trait Loader: Send + Sync + 'static {
    /// Loads and parses `resource`.
    ///
    /// Failures are reported as [`UnitError::Load`].
    async fn load_json(&self, resource: &str) -> Result<Value, UnitError>;
}

/// In-memory loader.
///
/// ## Example
/// ```rust
/// use unitvisor::{Loader, StaticLoader};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let loader = StaticLoader::new().with("settings/x-card.json", serde_json::json!({"a": 1}));
/// assert_eq!(loader.load_json("settings/x-card.json").await.unwrap()["a"], 1);
/// assert!(loader.load_json("missing.json").await.is_err());
/// # }
/// ```
#[derive(Debug, Default)]
pub struct StaticLoader {
    docs: RwLock<HashMap<String, Value>>,
}

impl StaticLoader {
    /// Empty loader; every load fails.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a document (builder form).
    pub fn with(self, resource: impl Into<String>, doc: Value) -> Self {
        self.insert(resource, doc);
        self
    }

    /// Adds or replaces a document.
    pub fn insert(&self, resource: impl Into<String>, doc: Value) {
        self.docs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(resource.into(), doc);
    }
}

#[async_trait]
impl Loader for StaticLoader {
    async fn load_json(&self, resource: &str) -> Result<Value, UnitError> {
        self.docs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(resource)
            .cloned()
            .ok_or_else(|| UnitError::Load {
                resource: resource.to_string(),
                reason: "no such resource".into(),
            })
    }
}

/// Loads JSON files relative to a root directory.
#[derive(Clone, Debug)]
pub struct FsLoader {
    root: PathBuf,
}

impl FsLoader {
    /// Loader rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl Loader for FsLoader {
    async fn load_json(&self, resource: &str) -> Result<Value, UnitError> {
        let path = self.root.join(resource);
        let load_err = |reason: String| UnitError::Load {
            resource: path.display().to_string(),
            reason,
        };
        let text = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| load_err(e.to_string()))?;
        serde_json::from_str(&text).map_err(|e| load_err(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fs_loader_reports_missing_and_malformed_files() {
        let dir = std::env::temp_dir().join(format!("unitvisor-loader-{}", uuid::Uuid::new_v4()));
        tokio::fs::create_dir_all(&dir).await.unwrap();
        tokio::fs::write(dir.join("ok.json"), r#"{"status": {"timeout": 50}}"#)
            .await
            .unwrap();
        tokio::fs::write(dir.join("bad.json"), "{not json").await.unwrap();

        let loader = FsLoader::new(&dir);
        let ok = loader.load_json("ok.json").await.unwrap();
        assert_eq!(ok["status"]["timeout"], 50);

        let missing = loader.load_json("nope.json").await.unwrap_err();
        assert_eq!(missing.as_label(), "unit_load_failed");
        assert!(missing.is_recoverable());
        assert!(loader.load_json("bad.json").await.is_err());

        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }
}
