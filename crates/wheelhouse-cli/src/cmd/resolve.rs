//! Resolve command

use std::path::Path;

use anyhow::Result;
use serde_json::json;
use wheelhouse_core::Resolution;

use super::{manager, save_lock};
use crate::ResolveArgs;

/// Resolve requirements and print the closure
pub async fn resolve(
    config: Option<&Path>,
    args: &ResolveArgs,
    lock: Option<&Path>,
    json: bool,
) -> Result<()> {
    let manager = manager(config, args).await?;
    let resolution = manager
        .resolve(&args.requirements, &args.install_options())
        .await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&to_json(&resolution))?);
    } else {
        print_table(&resolution);
    }

    if let Some(path) = lock {
        save_lock(resolution.to_lockfile(), manager.config(), path).await?;
    }
    Ok(())
}

fn to_json(resolution: &Resolution) -> serde_json::Value {
    let artifacts: Vec<_> = resolution
        .artifacts
        .iter()
        .map(|a| {
            json!({
                "name": a.display_name(),
                "version": a.version.to_string(),
                "url": a.artifact.url,
                "sha256": a.artifact.hash.as_ref().map(ToString::to_string),
                "extras": a.extras,
                "depends": a.depends.iter().map(ToString::to_string).collect::<Vec<_>>(),
            })
        })
        .collect();
    let prebuilt: Vec<_> = resolution
        .prebuilt
        .iter()
        .map(|p| json!({ "name": p.entry.name, "version": p.version().to_string() }))
        .collect();
    json!({ "artifacts": artifacts, "prebuilt": prebuilt })
}

fn print_table(resolution: &Resolution) {
    if resolution.artifacts.is_empty() && resolution.prebuilt.is_empty() {
        println!("Nothing to install.");
        return;
    }

    let width = resolution
        .artifacts
        .iter()
        .map(|a| a.display_name().len())
        .chain(resolution.prebuilt.iter().map(|p| p.entry.name.len()))
        .max()
        .unwrap_or(0);

    for artifact in &resolution.artifacts {
        println!(
            "  {:<width$}  {:<12}{}",
            artifact.display_name(),
            artifact.version.to_string(),
            artifact.artifact.filename
        );
    }
    for package in &resolution.prebuilt {
        println!(
            "  {:<width$}  {:<12}(baseline)",
            package.entry.name,
            package.version().to_string()
        );
    }
}
