//! One JSON file per stack recording which containers belong to it.
//! Writes go through a `.tmp` file plus atomic rename.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceLock {
    #[serde(rename = "containerName")]
    pub container_name: String,
    pub image: String,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "containerId", skip_serializing_if = "Option::is_none")]
    pub container_id: Option<String>,
}

/// Persistent per-stack record of which containers belong to the stack.
/// `services` uses `BTreeMap` for deterministic JSON output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockRecord {
    pub stack_name: String,
    pub fingerprint: String,
    pub services: BTreeMap<String, ServiceLock>,
    #[serde(default)]
    pub networks: Vec<String>,
    #[serde(default)]
    pub volumes: Vec<String>,
    pub last_deployed: DateTime<Utc>,
}

/// sha256 hex digest of `text`, used as the drift-detection fingerprint.
pub fn fingerprint(text: &str) -> String {
    let digest = Sha256::digest(text.as_bytes());
    hex::encode(digest)
}

/// Atomic per-stack JSON file store at `<data_dir>/locks/<name>.lock.json`.
pub struct LockStore {
    locks_dir: PathBuf,
}

impl LockStore {
    pub fn new(locks_dir: impl Into<PathBuf>) -> Self {
        Self {
            locks_dir: locks_dir.into(),
        }
    }

    fn path_for(&self, name: &str) -> PathBuf {
        self.locks_dir.join(format!("{}.lock.json", name))
    }

    async fn ensure_dir(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.locks_dir)
            .await
            .context("creating locks directory")
    }

    /// A missing or corrupt file returns `Ok(None)`, never an error.
    pub async fn read(&self, name: &str) -> Result<Option<LockRecord>> {
        let path = self.path_for(name);
        match tokio::fs::read_to_string(&path).await {
            Ok(text) => Ok(serde_json::from_str(&text).ok()),
            Err(_) => Ok(None),
        }
    }

    /// Writes pretty-printed JSON via a `.tmp` file plus atomic rename.
    pub async fn write(&self, name: &str, record: &LockRecord) -> Result<()> {
        self.ensure_dir().await?;
        let path = self.path_for(name);
        let tmp_path = self.locks_dir.join(format!("{}.lock.json.tmp", name));
        let text = serde_json::to_string_pretty(record).context("serialising lock record")?;
        tokio::fs::write(&tmp_path, text).await.context("writing lock file")?;
        tokio::fs::rename(&tmp_path, &path).await.context("renaming lock file")?;
        Ok(())
    }

    pub async fn delete(&self, name: &str) -> Result<()> {
        let path = self.path_for(name);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).context("deleting lock file"),
        }
    }

    pub async fn exists(&self, name: &str) -> bool {
        tokio::fs::metadata(self.path_for(name)).await.is_ok()
    }

    /// Stack names with a `*.lock.json` file, in directory-read order.
    pub async fn list_all(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let mut entries = match tokio::fs::read_dir(&self.locks_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(names),
            Err(e) => return Err(e).context("reading locks directory"),
        };
        while let Some(entry) = entries
            .next_entry()
            .await
            .context("reading locks directory entry")?
        {
            if let Some(file_name) = entry.file_name().to_str() {
                if let Some(name) = file_name.strip_suffix(".lock.json") {
                    names.push(name.to_string());
                }
            }
        }
        Ok(names)
    }

    /// True iff `text`'s fingerprint differs from the stored one (or no
    /// record exists yet).
    pub async fn has_changed(&self, name: &str, text: &str) -> Result<bool> {
        let current = fingerprint(text);
        match self.read(name).await? {
            Some(record) => Ok(record.fingerprint != current),
            None => Ok(true),
        }
    }
}

impl LockRecord {
    pub fn new(stack_name: impl Into<String>) -> Self {
        Self {
            stack_name: stack_name.into(),
            fingerprint: String::new(),
            services: BTreeMap::new(),
            networks: Vec::new(),
            volumes: Vec::new(),
            last_deployed: Utc::now(),
        }
    }

    pub fn container_names(&self) -> Vec<String> {
        self.services.values().map(|s| s.container_name.clone()).collect()
    }
}
