//! Subcommand implementations

pub mod freeze;
pub mod install;
pub mod list;
pub mod resolve;

use std::path::Path;

use anyhow::{Context, Result};
use wheelhouse_core::{Config, Lockfile, PackageManager};

use crate::ResolveArgs;

/// Load the config and build a manager seeded with the baseline lockfile.
pub(crate) async fn manager(config: Option<&Path>, args: &ResolveArgs) -> Result<PackageManager> {
    let config = Config::load(config).context("Failed to load config")?;
    let baseline = match args.baseline.as_ref().or(config.baseline.as_ref()) {
        Some(path) => Lockfile::load(path).await?,
        None => Lockfile::default(),
    };
    Ok(PackageManager::new(config).with_baseline(baseline))
}

/// Stamp `lock` with the configured environment and write it to `path`.
pub(crate) async fn save_lock(mut lock: Lockfile, config: &Config, path: &Path) -> Result<()> {
    lock.info.python.clone_from(&config.environment.python_full_version);
    lock.info.platform.clone_from(&config.environment.sys_platform);
    lock.save(path).await?;
    tracing::info!("Wrote {} packages to {}", lock.packages.len(), path.display());
    Ok(())
}
