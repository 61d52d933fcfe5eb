//! List command

use std::path::Path;

use anyhow::Result;
use wheelhouse_core::Lockfile;

/// List the packages recorded in a lockfile
pub async fn list(path: &Path) -> Result<()> {
    let lock = Lockfile::load(path).await?;
    if lock.packages.is_empty() {
        println!();
        println!("  No packages in {}.", path.display());
        return Ok(());
    }

    let width = lock
        .packages
        .values()
        .map(|e| e.name.len())
        .max()
        .unwrap_or(0);
    for entry in lock.packages.values() {
        let version = entry.version.to_string();
        if entry.depends.is_empty() {
            println!("  {:<width$}  {version}", entry.name);
        } else {
            let depends: Vec<_> = entry.depends.iter().map(ToString::to_string).collect();
            println!("  {:<width$}  {version:<12}{}", entry.name, depends.join(", "));
        }
    }
    Ok(())
}
