//! Freeze command

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use wheelhouse_core::{Config, Lockfile, PackageManager};

/// Print the baseline lockfile restamped for the configured environment
pub async fn freeze(
    config: Option<&Path>,
    baseline: Option<PathBuf>,
    output: Option<&Path>,
) -> Result<()> {
    let config = Config::load(config).context("Failed to load config")?;
    let Some(path) = baseline.or_else(|| config.baseline.clone()) else {
        bail!("No lockfile given and no baseline configured");
    };
    let baseline = Lockfile::load(&path).await?;
    let manager = PackageManager::new(config).with_baseline(baseline);

    let mut lock = manager.freeze();
    match output {
        Some(output) => lock.save(output).await?,
        None => println!("{}", lock.to_json()?),
    }
    Ok(())
}
