//! Core metadata (`METADATA`) of a distribution.

use std::collections::BTreeSet;
use std::io::{Cursor, Read};

use thiserror::Error;
use wheelhouse_schema::{
    MarkerContext, MarkerError, PackageName, Requirement, SpecifierSet,
    canonicalize_name,
};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MetadataError {
    #[error("invalid marker on '{requirement}': {source}")]
    Marker {
        requirement: String,
        source: MarkerError,
    },

    #[error("invalid wheel '{name}': {reason}")]
    InvalidWheel { name: String, reason: String },
}

/// The fields of a `METADATA` document the resolver needs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DistributionMetadata {
    pub name: Option<String>,
    pub version: Option<String>,
    pub requires_dist: Vec<Requirement>,
    pub provides_extra: BTreeSet<String>,
    pub requires_python: Option<SpecifierSet>,
    /// `Requires-Dist` values that could not be parsed and were skipped.
    pub invalid_requires: Vec<String>,
}

impl DistributionMetadata {
    /// Parse the RFC 822 style header block of a `METADATA` file. The body
    /// (long description) after the first blank line is ignored.
    ///
    /// A malformed `Requires-Dist` only loses that one line; it is logged
    /// and kept in `invalid_requires`.
    pub fn parse(text: &str) -> Self {
        let mut metadata = Self::default();

        for (key, value) in header_fields(text) {
            match key.to_ascii_lowercase().as_str() {
                "name" => metadata.name = Some(value),
                "version" => metadata.version = Some(value),
                "requires-dist" => {
                    let line = match value.find(" #") {
                        Some(pos) => value[..pos].trim().to_string(),
                        None => value,
                    };
                    match Requirement::parse(&line) {
                        Ok(req) => metadata.requires_dist.push(req),
                        Err(e) => {
                            tracing::warn!("skipping invalid Requires-Dist '{line}': {e}");
                            metadata.invalid_requires.push(line);
                        }
                    }
                }
                "provides-extra" => {
                    metadata.provides_extra.insert(canonicalize_name(&value));
                }
                "requires-python" => match SpecifierSet::parse(&value) {
                    Ok(spec) => metadata.requires_python = Some(spec),
                    Err(e) => tracing::warn!("ignoring invalid Requires-Python '{value}': {e}"),
                },
                _ => {}
            }
        }

        metadata
    }

    /// Read `*.dist-info/METADATA` out of a wheel archive.
    ///
    /// # Errors
    ///
    /// Returns [`MetadataError::InvalidWheel`] when the archive is not a zip
    /// file, has zero or several `.dist-info` directories, or the directory
    /// does not belong to `name`.
    pub fn from_wheel(data: &[u8], name: &PackageName) -> Result<Self, MetadataError> {
        let invalid = |reason: String| MetadataError::InvalidWheel {
            name: name.to_string(),
            reason,
        };

        let mut archive =
            zip::ZipArchive::new(Cursor::new(data)).map_err(|e| invalid(e.to_string()))?;

        let info_dirs: BTreeSet<&str> = archive
            .file_names()
            .filter_map(|path| path.split('/').next())
            .filter(|dir| dir.ends_with(".dist-info"))
            .collect();
        let info_dir = match info_dirs.len() {
            0 => return Err(invalid(".dist-info directory not found".to_string())),
            1 => info_dirs.into_iter().next().unwrap_or_default().to_string(),
            _ => {
                return Err(invalid(format!(
                    "multiple .dist-info directories: {}",
                    info_dirs.into_iter().collect::<Vec<_>>().join(", ")
                )));
            }
        };
        if !canonicalize_name(&info_dir).starts_with(name.as_str()) {
            return Err(invalid(format!(
                ".dist-info directory '{info_dir}' does not start with '{name}'"
            )));
        }

        let mut file = archive
            .by_name(&format!("{info_dir}/METADATA"))
            .map_err(|_| invalid(format!("{info_dir}/METADATA not found")))?;
        let mut text = String::new();
        file.read_to_string(&mut text)
            .map_err(|e| invalid(format!("unreadable METADATA: {e}")))?;

        Ok(Self::parse(&text))
    }

    /// Dependencies that apply with the given extras active: the base set
    /// (markers true with no extra) followed by whatever each extra adds.
    ///
    /// Extras the distribution does not declare are skipped with a warning.
    ///
    /// # Errors
    ///
    /// Returns [`MetadataError::Marker`] when a marker cannot be evaluated.
    pub fn requires(
        &self,
        context: &MarkerContext,
        extras: &BTreeSet<String>,
    ) -> Result<Vec<Requirement>, MetadataError> {
        let mut selected = self.requires_for_extra(context, "")?;
        for extra in extras {
            if !self.provides_extra.is_empty() && !self.provides_extra.contains(extra) {
                tracing::warn!(
                    "{} does not provide the extra '{extra}'",
                    self.name.as_deref().unwrap_or("package")
                );
                continue;
            }
            for req in self.requires_for_extra(context, extra)? {
                if !selected.contains(&req) {
                    selected.push(req);
                }
            }
        }
        Ok(selected)
    }

    fn requires_for_extra(
        &self,
        context: &MarkerContext,
        extra: &str,
    ) -> Result<Vec<Requirement>, MetadataError> {
        let mut context = context.clone();
        context.insert("extra".to_string(), extra.to_string());

        let mut out = Vec::new();
        for req in &self.requires_dist {
            let applies = match &req.marker {
                None => true,
                Some(marker) => {
                    marker
                        .evaluate(&context)
                        .map_err(|source| MetadataError::Marker {
                            requirement: req.to_string(),
                            source,
                        })?
                }
            };
            if applies {
                out.push(req.clone());
            }
        }
        Ok(out)
    }
}

// Unfolds continuation lines and stops at the first blank line.
fn header_fields(text: &str) -> Vec<(String, String)> {
    let mut fields: Vec<(String, String)> = Vec::new();
    for line in text.lines() {
        if line.trim().is_empty() {
            break;
        }
        if line.starts_with([' ', '\t']) {
            if let Some((_, value)) = fields.last_mut() {
                value.push(' ');
                value.push_str(line.trim());
            }
            continue;
        }
        if let Some((key, value)) = line.split_once(':') {
            fields.push((key.trim().to_string(), value.trim().to_string()));
        }
    }
    fields
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use wheelhouse_schema::MarkerEnvironment;

    const METADATA: &str = "Metadata-Version: 2.1
Name: requests
Version: 2.31.0
Requires-Python: >=3.7
Requires-Dist: charset-normalizer (<4,>=2)
Requires-Dist: idna (<4,>=2.5)
Requires-Dist: urllib3 (<3,>=1.21.1)
Requires-Dist: PySocks (!=1.5.7,>=1.5.6) ; extra == 'socks'
Requires-Dist: chardet (<6,>=3.0.2) ; extra == 'use_chardet_on_py3'
Requires-Dist: win-inet-pton ; sys_platform == \"win32\" and extra == 'socks'
Provides-Extra: socks
Provides-Extra: use_chardet_on_py3

Requires-Dist: not-a-header
";

    fn names(reqs: &[Requirement]) -> Vec<&str> {
        reqs.iter().map(|r| r.name.as_str()).collect()
    }

    #[test]
    fn test_parse_headers() {
        let metadata = DistributionMetadata::parse(METADATA);
        assert_eq!(metadata.name.as_deref(), Some("requests"));
        assert_eq!(metadata.requires_dist.len(), 6);
        assert!(metadata.provides_extra.contains("use-chardet-on-py3"));
        assert_eq!(metadata.requires_python.unwrap().to_string(), ">=3.7");
    }

    #[test]
    fn test_requires_with_extras() {
        let metadata = DistributionMetadata::parse(METADATA);
        let context = MarkerEnvironment::default().to_context(None);

        let base = metadata.requires(&context, &BTreeSet::new()).unwrap();
        assert_eq!(names(&base), vec!["charset-normalizer", "idna", "urllib3"]);

        let extras: BTreeSet<String> = ["socks".to_string()].into();
        let with_socks = metadata.requires(&context, &extras).unwrap();
        assert_eq!(
            names(&with_socks),
            vec!["charset-normalizer", "idna", "urllib3", "pysocks"]
        );

        let unknown: BTreeSet<String> = ["nope".to_string()].into();
        assert_eq!(metadata.requires(&context, &unknown).unwrap().len(), 3);
    }

    #[test]
    fn test_invalid_requirement_only_loses_its_line() {
        let metadata =
            DistributionMetadata::parse("Name: x\nRequires-Dist: foo >=\nRequires-Dist: bar\n");
        assert_eq!(names(&metadata.requires_dist), vec!["bar"]);
        assert_eq!(metadata.invalid_requires, ["foo >="]);
    }

    fn build_wheel(files: &[(&str, &str)]) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        {
            let mut writer = zip::ZipWriter::new(&mut buf);
            let options = zip::write::SimpleFileOptions::default();
            for (path, body) in files {
                writer.start_file(*path, options).unwrap();
                writer.write_all(body.as_bytes()).unwrap();
            }
            writer.finish().unwrap();
        }
        buf.into_inner()
    }

    #[test]
    fn test_from_wheel() {
        let data = build_wheel(&[
            ("requests/__init__.py", ""),
            ("requests-2.31.0.dist-info/METADATA", METADATA),
        ]);
        let metadata = DistributionMetadata::from_wheel(&data, &PackageName::new("requests")).unwrap();
        assert_eq!(metadata.version.as_deref(), Some("2.31.0"));

        let err = DistributionMetadata::from_wheel(&data, &PackageName::new("urllib3")).unwrap_err();
        assert!(matches!(err, MetadataError::InvalidWheel { .. }));

        let missing = build_wheel(&[("requests/__init__.py", "")]);
        assert!(DistributionMetadata::from_wheel(&missing, &PackageName::new("requests")).is_err());
    }
}
