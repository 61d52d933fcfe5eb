//! Package index client.
//!
//! Three wire formats describe the same thing (the files of one project):
//!
//! - the PyPI JSON API (`application/json`),
//! - the PEP 691 simple JSON listing (`application/vnd.pypi.simple.v1+json`),
//! - the PEP 503 simple HTML listing (`text/html`).
//!
//! Each parser turns its format into a [`ProjectInfo`]. Only wheels survive,
//! versions that do not round-trip through [`Version`] are dropped, and
//! relative URLs are resolved against the URL that served the listing.

pub mod json;
pub mod simple_html;
pub mod simple_json;

use std::collections::BTreeMap;

use reqwest::Url;
use thiserror::Error;
use wheelhouse_schema::{PackageName, Sha256Hash, Version, WheelFilename};

use crate::compat::SupportedTags;
use crate::fetch::{FetchOptions, Fetcher};

/// Index used when none is configured.
pub const DEFAULT_INDEX_URL: &str = "https://pypi.org/simple/";

const ACCEPT: &str = "application/vnd.pypi.simple.v1+json, \
                      application/vnd.pypi.simple.v1+html;q=0.2, \
                      text/html;q=0.1, application/json;q=0.01";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IndexError {
    #[error("unsupported index format from {url}: {reason}")]
    UnsupportedFormat { url: String, reason: String },

    #[error("malformed index response from {url}: {reason}")]
    Malformed { url: String, reason: String },

    #[error(
        "Can't fetch metadata for '{name}' from any index. Please make sure you have entered a correct package name. ({})",
        .reasons.join("; ")
    )]
    Exhausted {
        name: PackageName,
        reasons: Vec<String>,
    },
}

/// Whether the index serves the wheel's `METADATA` next to it (PEP 658).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum MetadataAvailability {
    #[default]
    Absent,
    Available,
    Hashed(Sha256Hash),
}

impl MetadataAvailability {
    pub fn is_available(&self) -> bool {
        !matches!(self, Self::Absent)
    }
}

/// One downloadable wheel of a release.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateArtifact {
    pub filename: String,
    pub url: String,
    pub hash: Option<Sha256Hash>,
    pub size: Option<u64>,
    pub wheel: WheelFilename,
    pub requires_python: Option<String>,
    pub metadata: MetadataAvailability,
    pub yanked: bool,
    pub yanked_reason: Option<String>,
}

impl CandidateArtifact {
    /// URL of the PEP 658 metadata document, when the index serves one.
    pub fn metadata_url(&self) -> Option<String> {
        self.metadata
            .is_available()
            .then(|| format!("{}.metadata", self.url))
    }
}

/// The wheels published for one version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Release {
    pub version: Version,
    pub artifacts: Vec<CandidateArtifact>,
}

/// Every usable release of one project, ascending by version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectInfo {
    pub name: PackageName,
    pub releases: BTreeMap<Version, Release>,
}

impl ProjectInfo {
    /// Keep only artifacts the host can install, dropping releases left
    /// without any.
    pub fn compatible_only(mut self, tags: &SupportedTags) -> Self {
        self.releases.retain(|_, release| {
            release.artifacts.retain(|a| tags.is_compatible(&a.wheel));
            !release.artifacts.is_empty()
        });
        self
    }

    pub fn versions(&self) -> impl Iterator<Item = &Version> {
        self.releases.keys()
    }
}

/// A file entry as any of the three formats describes it, before URL
/// resolution and wheel parsing.
#[derive(Debug, Clone, Default)]
pub(crate) struct FileEntry {
    pub filename: String,
    pub url: String,
    pub hashes: BTreeMap<String, String>,
    pub size: Option<u64>,
    pub requires_python: Option<String>,
    pub metadata: MetadataAvailability,
    pub yanked: bool,
    pub yanked_reason: Option<String>,
}

impl FileEntry {
    fn into_artifact(self, base: Option<&Url>) -> Option<CandidateArtifact> {
        if !self.filename.ends_with(".whl") {
            return None;
        }
        let wheel = match WheelFilename::parse(&self.filename) {
            Ok(wheel) => wheel,
            Err(e) => {
                tracing::debug!("skipping {}: {e}", self.filename);
                return None;
            }
        };
        let url = match base.map(|b| b.join(&self.url)) {
            Some(Ok(joined)) => joined.to_string(),
            _ => self.url,
        };
        let hash = self.hashes.get("sha256").and_then(|h| match Sha256Hash::new(h) {
            Ok(hash) => Some(hash),
            Err(e) => {
                tracing::warn!("ignoring hash of {}: {e}", self.filename);
                None
            }
        });

        Some(CandidateArtifact {
            filename: self.filename,
            url,
            hash,
            size: self.size,
            wheel,
            requires_python: self.requires_python.filter(|s| !s.trim().is_empty()),
            metadata: self.metadata,
            yanked: self.yanked,
            yanked_reason: self.yanked_reason.filter(|s| !s.is_empty()),
        })
    }
}

/// Parse `text` as a version only if it is already in canonical form.
pub(crate) fn round_trip_version(text: &str) -> Option<Version> {
    Version::parse(text).ok().filter(|v| v.to_string() == text)
}

fn insert_artifact(
    releases: &mut BTreeMap<Version, Release>,
    version: Version,
    artifact: CandidateArtifact,
) {
    releases
        .entry(version.clone())
        .or_insert_with(|| Release {
            version,
            artifacts: Vec::new(),
        })
        .artifacts
        .push(artifact);
}

/// Group flat file entries by the version in their wheel filename. Used by
/// both simple formats.
pub(crate) fn project_from_files(
    name: PackageName,
    base_url: &str,
    files: Vec<FileEntry>,
) -> ProjectInfo {
    let base = Url::parse(base_url).ok();
    let mut releases = BTreeMap::new();
    for file in files {
        let Some(artifact) = file.into_artifact(base.as_ref()) else {
            continue;
        };
        let Some(version) = round_trip_version(&artifact.wheel.version_text) else {
            tracing::warn!(
                "The package '{name}' contains an invalid version: '{}'. This version will be skipped",
                artifact.wheel.version_text
            );
            continue;
        };
        insert_artifact(&mut releases, version, artifact);
    }
    ProjectInfo { name, releases }
}

/// Group file entries that the document already keyed by version.
pub(crate) fn project_from_releases(
    name: PackageName,
    base_url: &str,
    raw: Vec<(String, Vec<FileEntry>)>,
) -> ProjectInfo {
    let base = Url::parse(base_url).ok();
    let mut releases = BTreeMap::new();
    for (version_text, files) in raw {
        let Some(version) = round_trip_version(&version_text) else {
            tracing::warn!(
                "The package '{name}' contains an invalid version: '{version_text}'. This version will be skipped"
            );
            continue;
        };
        for file in files {
            if let Some(artifact) = file.into_artifact(base.as_ref()) {
                insert_artifact(&mut releases, version.clone(), artifact);
            }
        }
    }
    ProjectInfo { name, releases }
}

/// Dispatch on the response content type.
///
/// # Errors
///
/// Returns [`IndexError::UnsupportedFormat`] for an unknown content type or
/// repository version, and [`IndexError::Malformed`] when the body does not
/// parse.
pub fn parse_project(
    name: &PackageName,
    url: &str,
    content_type: &str,
    body: &str,
) -> Result<ProjectInfo, IndexError> {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    match mime.as_str() {
        "application/vnd.pypi.simple.v1+json" => simple_json::parse(name, url, body),
        "application/vnd.pypi.simple.v1+html" | "text/html" => simple_html::parse(name, url, body),
        "application/json" => json::parse(name, url, body),
        _ => Err(IndexError::UnsupportedFormat {
            url: url.to_string(),
            reason: format!("content type '{content_type}'"),
        }),
    }
}

/// The project page for `name` on `index_url`: `{package_name}` is
/// substituted when present, otherwise `<name>/` is appended.
pub fn project_url(index_url: &str, name: &PackageName) -> String {
    if index_url.contains("{package_name}") {
        index_url.replace("{package_name}", name.as_str())
    } else {
        format!("{}/{name}/", index_url.trim_end_matches('/'))
    }
}

/// Query each index in order and return the first listing that parses.
///
/// # Errors
///
/// Returns [`IndexError::Exhausted`] with one reason per index when no
/// index produced a usable listing.
pub async fn query_package<F: Fetcher + ?Sized>(
    fetcher: &F,
    name: &PackageName,
    index_urls: &[String],
    options: &FetchOptions,
) -> Result<ProjectInfo, IndexError> {
    let options = options.with_header("Accept", ACCEPT);
    let mut reasons = Vec::new();

    let default = [DEFAULT_INDEX_URL.to_string()];
    let index_urls = if index_urls.is_empty() {
        &default[..]
    } else {
        index_urls
    };

    for index_url in index_urls {
        let url = project_url(index_url, name);
        let (body, headers) = match fetcher.fetch_text_and_headers(&url, &options).await {
            Ok(response) => response,
            Err(e) => {
                if e.is_not_found() {
                    tracing::debug!("{name} not found on {index_url}");
                } else {
                    tracing::debug!("index {index_url} failed for {name}: {e}");
                }
                reasons.push(e.to_string());
                continue;
            }
        };

        let content_type = headers
            .get("content-type")
            .map(String::as_str)
            .unwrap_or_default();
        match parse_project(name, &url, content_type, &body) {
            Ok(project) => return Ok(project),
            Err(e) => {
                tracing::debug!("skipping index {index_url}: {e}");
                reasons.push(e.to_string());
            }
        }
    }

    Err(IndexError::Exhausted {
        name: name.clone(),
        reasons,
    })
}
