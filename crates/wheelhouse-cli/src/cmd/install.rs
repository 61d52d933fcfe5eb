//! Install command

use std::path::{Path, PathBuf};

use anyhow::Result;

use super::{manager, save_lock};
use crate::ResolveArgs;

/// Resolve, download and unpack requirements into the target directory
pub async fn install(
    config: Option<&Path>,
    args: &ResolveArgs,
    target: Option<PathBuf>,
    lock: Option<&Path>,
) -> Result<()> {
    let mut manager = manager(config, args).await?;
    if let Some(target) = target {
        manager = manager.with_target_dir(target);
    }

    let resolution = manager
        .install(&args.requirements, &args.install_options())
        .await?;

    if resolution.artifacts.is_empty() {
        println!("Nothing to install.");
    } else {
        let installed: Vec<_> = resolution
            .artifacts
            .iter()
            .map(|a| format!("{}-{}", a.display_name(), a.version))
            .collect();
        println!("Successfully installed {}", installed.join(" "));
    }

    if let Some(path) = lock {
        save_lock(manager.freeze(), manager.config(), path).await?;
    }
    Ok(())
}
