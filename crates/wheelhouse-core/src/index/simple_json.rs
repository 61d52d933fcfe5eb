//! PEP 691 JSON simple API (`application/vnd.pypi.simple.v1+json`),
//! including the PEP 700 `size`/`versions` additions.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::Value;
use wheelhouse_schema::{PackageName, Sha256Hash};

use super::{FileEntry, IndexError, MetadataAvailability, ProjectInfo, project_from_files};

#[derive(Debug, Deserialize)]
struct Document {
    #[serde(default)]
    meta: Option<Meta>,
    name: String,
    files: Vec<File>,
}

#[derive(Debug, Deserialize)]
struct Meta {
    #[serde(rename = "api-version")]
    api_version: Option<String>,
}

#[derive(Debug, Deserialize)]
struct File {
    filename: String,
    url: String,
    #[serde(default)]
    hashes: BTreeMap<String, String>,
    #[serde(rename = "requires-python")]
    requires_python: Option<String>,
    size: Option<u64>,
    yanked: Option<Value>,
    #[serde(rename = "core-metadata")]
    core_metadata: Option<Value>,
    #[serde(rename = "dist-info-metadata")]
    dist_info_metadata: Option<Value>,
}

/// `true`, `false` or a `{"sha256": ...}` map.
pub(crate) fn metadata_from_value(value: Option<&Value>) -> MetadataAvailability {
    match value {
        None | Some(Value::Bool(false) | Value::Null) => MetadataAvailability::Absent,
        Some(Value::Object(map)) => map
            .get("sha256")
            .and_then(Value::as_str)
            .and_then(|h| Sha256Hash::new(h).ok())
            .map_or(MetadataAvailability::Available, MetadataAvailability::Hashed),
        Some(_) => MetadataAvailability::Available,
    }
}

// `false`/absent, `true`, or the reason string (PEP 592).
fn yank_from_value(value: Option<&Value>) -> (bool, Option<String>) {
    match value {
        Some(Value::Bool(yanked)) => (*yanked, None),
        Some(Value::String(reason)) => (true, Some(reason.clone())),
        _ => (false, None),
    }
}

/// Reject listings whose major API version is not 1.
pub(crate) fn check_api_version(url: &str, version: &str) -> Result<(), IndexError> {
    let major = version.split('.').next().unwrap_or_default().trim();
    match major.parse::<u32>() {
        Ok(1) => {
            if version.split('.').nth(1).and_then(|m| m.parse::<u32>().ok()) > Some(1) {
                tracing::warn!("index {url} uses a newer repository version {version}");
            }
            Ok(())
        }
        _ => Err(IndexError::UnsupportedFormat {
            url: url.to_string(),
            reason: format!("repository version '{version}'"),
        }),
    }
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

    if let Some(version) = doc.meta.and_then(|m| m.api_version) {
        check_api_version(url, &version)?;
    }

    let project_name = if doc.name.is_empty() {
        name.clone()
    } else {
        PackageName::new(&doc.name)
    };

    let files = doc
        .files
        .into_iter()
        .map(|f| {
            let (yanked, yanked_reason) = yank_from_value(f.yanked.as_ref());
            FileEntry {
                metadata: metadata_from_value(
                    f.core_metadata.as_ref().or(f.dist_info_metadata.as_ref()),
                ),
                filename: f.filename,
                url: f.url,
                hashes: f.hashes,
                size: f.size,
                requires_python: f.requires_python,
                yanked,
                yanked_reason,
            }
        })
        .collect();

    Ok(project_from_files(project_name, url, files))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_forms() {
        assert_eq!(metadata_from_value(None), MetadataAvailability::Absent);
        assert_eq!(
            metadata_from_value(Some(&Value::Bool(true))),
            MetadataAvailability::Available
        );
        let hashed = serde_json::json!({
            "sha256": "9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08"
        });
        assert!(matches!(
            metadata_from_value(Some(&hashed)),
            MetadataAvailability::Hashed(_)
        ));
    }

    #[test]
    fn test_rejects_future_api() {
        let body = r#"{"meta": {"api-version": "2.0"}, "name": "demo", "files": []}"#;
        let err = parse(&PackageName::new("demo"), "https://i/demo/", body).unwrap_err();
        assert!(matches!(err, IndexError::UnsupportedFormat { .. }));
    }

    #[test]
    fn test_relative_url_and_yank() {
        let body = r#"{
          "meta": {"api-version": "1.1"},
          "name": "Demo",
          "files": [
            {"filename": "demo-0.1-py3-none-any.whl", "url": "demo-0.1-py3-none-any.whl",
             "hashes": {}, "yanked": true, "core-metadata": true}
          ]
        }"#;
        let project = parse(&PackageName::new("demo"), "https://i.example/simple/demo/", body)
            .unwrap();
        assert_eq!(project.name, "demo");
        let artifact = &project.releases.values().next().unwrap().artifacts[0];
        assert_eq!(artifact.url, "https://i.example/simple/demo/demo-0.1-py3-none-any.whl");
        assert!(artifact.yanked);
        assert!(artifact.yanked_reason.is_none());
        assert!(artifact.metadata.is_available());
        assert!(artifact.hash.is_none());
    }
}
