//! Lockfile read/write and the `freeze` output format.
//!
//! A lockfile maps each canonical package name to the exact version and
//! artifact it resolved to. It is used both as the baseline the resolver
//! treats as already available and as the result of `freeze`.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::fs;
use wheelhouse_schema::{PackageName, Version};

/// Environment description stored at the top of a lockfile.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LockInfo {
    /// `python_full_version` the lock was produced for.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub python: String,
    /// `sys_platform` the lock was produced for.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub platform: String,
    /// RFC 3339 timestamp of the last save.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generated_at: Option<String>,
    /// Fields written by other tools, preserved on round trip.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// One locked package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockEntry {
    /// Project name as published.
    pub name: String,
    pub version: Version,
    /// Source URL of the artifact.
    pub file_name: String,
    #[serde(default)]
    pub sha256: String,
    #[serde(default = "default_install_dir")]
    pub install_dir: String,
    /// Canonical names of the packages this one depends on.
    #[serde(default)]
    pub depends: Vec<PackageName>,
}

fn default_install_dir() -> String {
    "site".to_string()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Lockfile {
    #[serde(default)]
    pub info: LockInfo,
    #[serde(default)]
    pub packages: BTreeMap<PackageName, LockEntry>,
}

impl Lockfile {
    /// Load a lockfile; a missing file yields an empty lockfile.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub async fn load(path: &Path) -> Result<Self> {
        if !fs::try_exists(path).await.unwrap_or(false) {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;

        Self::from_json(&content).with_context(|| format!("Failed to parse {}", path.display()))
    }

    /// Parse the JSON form.
    ///
    /// # Errors
    ///
    /// Returns an error if `content` is not a valid lockfile document.
    pub fn from_json(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    /// Pretty-printed JSON form.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Atomically persist this lockfile, stamping `generated_at`.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization, the write or the rename fails.
    pub async fn save(&mut self, path: &Path) -> Result<()> {
        self.info.generated_at = Some(chrono::Utc::now().to_rfc3339());
        let content = self.to_json()?;

        // Atomic write: write to temp file, then rename
        let temp_path = path.with_extension("json.tmp");
        fs::write(&temp_path, &content)
            .await
            .with_context(|| format!("Failed to write {}", temp_path.display()))?;
        fs::rename(&temp_path, path)
            .await
            .with_context(|| format!("Failed to move lockfile into {}", path.display()))?;

        Ok(())
    }

    /// Add or replace the entry for `entry.name`.
    pub fn insert(&mut self, entry: LockEntry) {
        self.packages.insert(PackageName::new(&entry.name), entry);
    }

    /// Installed versions keyed by canonical name.
    pub fn versions(&self) -> BTreeMap<PackageName, Version> {
        self.packages
            .iter()
            .map(|(name, entry)| (name.clone(), entry.version.clone()))
            .collect()
    }
}
