//! PyPI JSON API (`/pypi/<name>/json`).

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::Value;
use wheelhouse_schema::PackageName;

use super::{FileEntry, IndexError, ProjectInfo, project_from_releases};

#[derive(Debug, Deserialize)]
struct Document {
    #[serde(default)]
    info: Option<Info>,
    releases: BTreeMap<String, Vec<File>>,
}

#[derive(Debug, Deserialize)]
struct Info {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct File {
    filename: String,
    url: String,
    #[serde(default)]
    digests: BTreeMap<String, String>,
    size: Option<u64>,
    requires_python: Option<String>,
    #[serde(default)]
    yanked: bool,
    yanked_reason: Option<String>,
    core_metadata: Option<Value>,
    data_dist_info_metadata: Option<Value>,
}

pub(crate) fn parse(
    name: &PackageName,
    url: &str,
    body: &str,
) -> Result<ProjectInfo, IndexError> {
    let doc: Document = serde_json::from_str(body).map_err(|e| IndexError::Malformed {
        url: url.to_string(),
        reason: e.to_string(),
    })?;

    let project_name = doc
        .info
        .and_then(|info| info.name)
        .map_or_else(|| name.clone(), |n| PackageName::new(&n));

    let releases = doc
        .releases
        .into_iter()
        .map(|(version, files)| {
            let entries = files
                .into_iter()
                .map(|f| FileEntry {
                    metadata: super::simple_json::metadata_from_value(
                        f.core_metadata.as_ref().or(f.data_dist_info_metadata.as_ref()),
                    ),
                    filename: f.filename,
                    url: f.url,
                    hashes: f.digests,
                    size: f.size,
                    requires_python: f.requires_python,
                    yanked: f.yanked,
                    yanked_reason: f.yanked_reason,
                })
                .collect();
            (version, entries)
        })
        .collect();

    Ok(project_from_releases(project_name, url, releases))
}
