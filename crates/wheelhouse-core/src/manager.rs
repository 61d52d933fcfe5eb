//! Package manager facade: resolve, install and freeze.
//!
//! The manager owns the configuration, the collaborators and the record of
//! what it installed. Nothing here is global; two managers with different
//! configs can run side by side.

use std::collections::BTreeMap;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use bytes::Bytes;
use futures::future;
use wheelhouse_schema::{PackageName, Requirement, Version};

use crate::config::Config;
use crate::constraints::validate_constraints;
use crate::error::ResolveError;
use crate::fetch::{FetchOptions, Fetcher, HttpFetcher, sha256};
use crate::lockfile::{LockEntry, LockInfo, Lockfile};
use crate::reporter::{Reporter, TracingReporter};
use crate::resolver::{
    PrebuiltPackage, Resolution, ResolveOptions, ResolvedArtifact, Transaction, verify,
};

/// Places downloaded wheels into the target environment.
#[async_trait]
pub trait Installer: Send + Sync {
    /// Install one wheel into `target`.
    async fn install(
        &self,
        artifact: &ResolvedArtifact,
        data: Bytes,
        target: &Path,
    ) -> anyhow::Result<()>;

    /// Make baseline packages available.
    async fn load_prebuilt(&self, packages: &[PrebuiltPackage]) -> anyhow::Result<()>;
}

/// Unpacks wheels into a directory, the way a `site-packages` install
/// lays them out. Baseline packages are assumed to be present already.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnpackInstaller;

#[async_trait]
impl Installer for UnpackInstaller {
    async fn install(
        &self,
        artifact: &ResolvedArtifact,
        data: Bytes,
        target: &Path,
    ) -> anyhow::Result<()> {
        let target = target.to_path_buf();
        let filename = artifact.artifact.filename.clone();
        tokio::fs::create_dir_all(&target)
            .await
            .with_context(|| format!("Failed to create {}", target.display()))?;
        tokio::task::spawn_blocking(move || {
            let mut archive = zip::ZipArchive::new(Cursor::new(data))
                .with_context(|| format!("{filename} is not a zip archive"))?;
            archive
                .extract(&target)
                .with_context(|| format!("Failed to unpack {filename}"))
        })
        .await
        .context("unpack task panicked")?
    }

    async fn load_prebuilt(&self, packages: &[PrebuiltPackage]) -> anyhow::Result<()> {
        for package in packages {
            tracing::debug!("{}=={} comes from the baseline", package.name, package.version());
        }
        Ok(())
    }
}

/// Per-call options of [`PackageManager::resolve`] and
/// [`PackageManager::install`].
#[derive(Debug, Clone)]
pub struct InstallOptions {
    pub keep_going: bool,
    pub include_deps: bool,
    pub pre: bool,
    pub reinstall: bool,
    /// Overrides the manager's index list for this call.
    pub index_urls: Option<Vec<String>>,
    /// Raw constraint strings; invalid ones are reported and ignored.
    pub constraints: Vec<String>,
    pub fetch: FetchOptions,
}

impl Default for InstallOptions {
    fn default() -> Self {
        Self {
            keep_going: false,
            include_deps: true,
            pre: false,
            reinstall: false,
            index_urls: None,
            constraints: Vec::new(),
            fetch: FetchOptions::default(),
        }
    }
}

pub struct PackageManager {
    config: Config,
    fetcher: Arc<dyn Fetcher>,
    installer: Arc<dyn Installer>,
    reporter: Arc<dyn Reporter>,
    baseline: Lockfile,
    installed: Lockfile,
}

impl PackageManager {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            fetcher: Arc::new(HttpFetcher::new()),
            installer: Arc::new(UnpackInstaller),
            reporter: Arc::new(TracingReporter),
            baseline: Lockfile::default(),
            installed: Lockfile::default(),
        }
    }

    pub fn with_fetcher(mut self, fetcher: Arc<dyn Fetcher>) -> Self {
        self.fetcher = fetcher;
        self
    }

    pub fn with_installer(mut self, installer: Arc<dyn Installer>) -> Self {
        self.installer = installer;
        self
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn Reporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Packages treated as available without consulting the index.
    pub fn with_baseline(mut self, baseline: Lockfile) -> Self {
        self.baseline = baseline;
        self
    }

    /// Install into `dir` instead of the configured target.
    pub fn with_target_dir(mut self, dir: PathBuf) -> Self {
        self.config.target_dir = Some(dir);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn index_urls(&self) -> &[String] {
        &self.config.index_urls
    }

    /// Replace the default index list used by later calls.
    pub fn set_index_urls(&mut self, urls: Vec<String>) {
        self.config.index_urls = urls;
    }

    /// Resolve `requirements` without installing anything.
    ///
    /// # Errors
    ///
    /// Returns the first failure when `keep_going` is off, or
    /// [`ResolveError::Unresolved`] listing every failed requirement when
    /// it is on. A requirement string that does not parse is one such
    /// failure.
    pub async fn resolve(
        &self,
        requirements: &[String],
        options: &InstallOptions,
    ) -> Result<Resolution, ResolveError> {
        let mut parsed = Vec::with_capacity(requirements.len());
        let mut invalid = Vec::new();
        for text in requirements {
            match Requirement::parse(text) {
                Ok(req) => parsed.push(req),
                Err(e) if options.keep_going => {
                    self.reporter.warning(&format!("invalid requirement '{text}': {e}"));
                    invalid.push(text.clone());
                }
                Err(e) => return Err(e.into()),
            }
        }

        let context = self.config.environment.to_context(None);
        let (constraints, messages) = validate_constraints(&options.constraints, &context);
        for (constraint, message) in &messages {
            self.reporter
                .warning(&format!("constraint '{constraint}': {message}"));
        }

        let transaction = Transaction::new(
            Arc::clone(&self.fetcher),
            &self.config.environment,
            self.config.supported_tags(),
            ResolveOptions {
                keep_going: options.keep_going,
                include_deps: options.include_deps,
                pre: options.pre,
                reinstall: options.reinstall,
                index_urls: options
                    .index_urls
                    .clone()
                    .unwrap_or_else(|| self.config.index_urls.clone()),
                constraints,
                fetch: options.fetch.clone(),
            },
        )
        .with_reporter(Arc::clone(&self.reporter))
        .with_installed(self.installed_versions())
        .with_baseline(&self.baseline);

        let outcome = transaction.gather_requirements(parsed).await;
        let resolution = transaction.into_resolution();
        outcome?;
        if !invalid.is_empty() || !resolution.failures.is_empty() {
            invalid.extend(resolution.unresolved().iter().map(ToString::to_string));
            return Err(ResolveError::Unresolved { unresolved: invalid });
        }
        Ok(resolution)
    }

    /// Resolve, download and install `requirements`.
    ///
    /// # Errors
    ///
    /// Everything [`PackageManager::resolve`] returns, plus download,
    /// hash and installer failures.
    pub async fn install(
        &mut self,
        requirements: &[String],
        options: &InstallOptions,
    ) -> Result<Resolution, ResolveError> {
        let resolution = self.resolve(requirements, options).await?;
        let target = self.target_dir();

        if !resolution.prebuilt.is_empty() {
            self.installer
                .load_prebuilt(&resolution.prebuilt)
                .await
                .map_err(|e| ResolveError::Install {
                    name: resolution.prebuilt[0].name.clone(),
                    reason: format!("{e:#}"),
                })?;
        }

        let downloads = resolution
            .artifacts
            .iter()
            .map(|artifact| self.download(artifact, &options.fetch));
        let wheels = future::try_join_all(downloads).await?;

        for (artifact, data) in resolution.artifacts.iter().zip(wheels) {
            self.reporter.installing(&artifact.name, &artifact.version);
            let digest = sha256(&data);
            self.installer
                .install(artifact, data, &target)
                .await
                .map_err(|e| ResolveError::Install {
                    name: artifact.name.clone(),
                    reason: format!("{e:#}"),
                })?;
            self.reporter
                .done(&artifact.name, &artifact.version, "installed");
            self.installed.insert(LockEntry {
                sha256: digest.to_string(),
                ..artifact.lock_entry()
            });
        }

        if resolution.artifacts.is_empty() {
            self.reporter.info("Nothing to install");
        } else {
            let installed: Vec<String> = resolution
                .artifacts
                .iter()
                .map(|a| format!("{}-{}", a.name, a.version))
                .collect();
            self.reporter
                .info(&format!("Successfully installed {}", installed.join(" ")));
        }
        Ok(resolution)
    }

    async fn download(
        &self,
        artifact: &ResolvedArtifact,
        options: &FetchOptions,
    ) -> Result<Bytes, ResolveError> {
        if let Some(data) = &artifact.data {
            return Ok(data.clone());
        }
        self.reporter
            .downloading(&artifact.name, &artifact.version, &artifact.artifact.url);
        let data = self.fetcher.fetch_bytes(&artifact.artifact.url, options).await?;
        if let Some(expected) = &artifact.artifact.hash {
            verify(&artifact.artifact.url, &data, expected)?;
        }
        Ok(data)
    }

    fn target_dir(&self) -> PathBuf {
        self.config
            .target_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from("site-packages"))
    }

    fn installed_versions(&self) -> BTreeMap<PackageName, Version> {
        self.installed.versions()
    }

    /// The baseline merged with everything this manager installed.
    pub fn freeze(&self) -> Lockfile {
        let mut lock = Lockfile {
            info: LockInfo {
                python: self.config.environment.python_full_version.clone(),
                platform: self.config.environment.sys_platform.clone(),
                ..self.baseline.info.clone()
            },
            packages: self.baseline.packages.clone(),
        };
        for entry in self.installed.packages.values() {
            lock.insert(entry.clone());
        }
        lock
    }

    /// Every known package, sorted by name.
    pub fn list(&self) -> Vec<LockEntry> {
        self.freeze().packages.into_values().collect()
    }
}
