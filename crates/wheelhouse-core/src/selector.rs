//! Pick one artifact for a requirement from a project listing.

use wheelhouse_schema::{Requirement, SpecifierSet, Version};

use crate::compat::SupportedTags;
use crate::error::ResolveError;
use crate::index::{CandidateArtifact, ProjectInfo};

/// Return the best artifact of the highest version that satisfies `req`
/// and has at least one installable artifact.
///
/// Version precedence wins over tag rank: rank only chooses among the
/// artifacts of one version, and equal ranks keep the first artifact
/// listed. Yanked artifacts are only considered for exact pins, and
/// artifacts whose `Requires-Python` excludes `python` are skipped.
///
/// # Errors
///
/// Returns [`ResolveError::NoCompatibleArtifact`] when no version
/// qualifies.
pub fn find_best<'p>(
    project: &'p ProjectInfo,
    req: &Requirement,
    tags: &SupportedTags,
    python: Option<&Version>,
) -> Result<&'p CandidateArtifact, ResolveError> {
    let mut candidates = req.specifier.filter(project.releases.keys());
    candidates.sort_unstable_by(|a, b| b.cmp(a));
    let allow_yanked = req.specifier.is_exact_pin();

    for version in candidates {
        let Some(release) = project.releases.get(version) else {
            continue;
        };

        let mut best: Option<(usize, &CandidateArtifact)> = None;
        for artifact in &release.artifacts {
            if artifact.yanked && !allow_yanked {
                continue;
            }
            if !python_matches(artifact, python) {
                tracing::debug!(
                    "skipping {}: requires python {}",
                    artifact.filename,
                    artifact.requires_python.as_deref().unwrap_or_default()
                );
                continue;
            }
            let Some(rank) = tags.rank(&artifact.wheel) else {
                continue;
            };
            if best.is_none_or(|(best_rank, _)| rank < best_rank) {
                best = Some((rank, artifact));
            }
        }

        if let Some((_, artifact)) = best {
            if artifact.yanked {
                tracing::warn!(
                    "The candidate selected for download or install is a yanked version: '{}' candidate (version {version} at {})\nReason for being yanked: {}",
                    project.name,
                    artifact.url,
                    artifact.yanked_reason.as_deref().unwrap_or("<none given>")
                );
            }
            return Ok(artifact);
        }
    }

    Err(ResolveError::NoCompatibleArtifact {
        requirement: req.to_string(),
    })
}

fn python_matches(artifact: &CandidateArtifact, python: Option<&Version>) -> bool {
    let (Some(python), Some(requires)) = (python, artifact.requires_python.as_deref()) else {
        return true;
    };
    match SpecifierSet::parse(requires) {
        Ok(spec) => spec.contains(python, Some(true)),
        // An unparseable constraint does not exclude the file.
        Err(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::parse_project;
    use wheelhouse_schema::PackageName;

    fn project(files: &[(&str, &str)]) -> ProjectInfo {
        let files: Vec<String> = files
            .iter()
            .map(|(filename, extra)| {
                format!(
                    r#"{{"filename": "{filename}", "url": "https://f/{filename}", "hashes": {{}}{extra}}}"#
                )
            })
            .collect();
        let body = format!(r#"{{"name": "p", "files": [{}]}}"#, files.join(","));
        parse_project(
            &PackageName::new("p"),
            "https://i/p/",
            "application/vnd.pypi.simple.v1+json",
            &body,
        )
        .unwrap()
    }

    fn host() -> SupportedTags {
        SupportedTags::cpython(3, 11, &["manylinux_2_17_x86_64".to_string()])
    }

    fn req(s: &str) -> Requirement {
        Requirement::parse(s).unwrap()
    }

    #[test]
    fn test_version_precedence_beats_rank() {
        let p = project(&[
            ("p-1.0-py3-none-any.whl", ""),
            ("p-0.9-cp311-cp311-manylinux_2_17_x86_64.whl", ""),
        ]);
        let best = find_best(&p, &req("p"), &host(), None).unwrap();
        assert_eq!(best.filename, "p-1.0-py3-none-any.whl");
    }

    #[test]
    fn test_rank_chooses_within_a_version() {
        let p = project(&[
            ("p-1.0-py3-none-manylinux_2_17_x86_64.whl", ""),
            ("p-1.0-cp311-abi3-manylinux_2_17_x86_64.whl", ""),
            ("p-1.0-cp311-cp311-manylinux_2_17_x86_64.whl", ""),
            ("p-1.0-cp311-cp311-win_amd64.whl", ""),
        ]);
        let best = find_best(&p, &req("p"), &host(), None).unwrap();
        assert_eq!(best.filename, "p-1.0-cp311-cp311-manylinux_2_17_x86_64.whl");
    }

    #[test]
    fn test_falls_back_to_older_compatible_version() {
        let p = project(&[
            ("p-2.0-cp311-cp311-win_amd64.whl", ""),
            ("p-1.5-py3-none-any.whl", ""),
        ]);
        let best = find_best(&p, &req("p"), &host(), None).unwrap();
        assert_eq!(best.wheel.version.to_string(), "1.5");

        let err = find_best(&p, &req("p>=2"), &host(), None).unwrap_err();
        assert!(matches!(err, ResolveError::NoCompatibleArtifact { .. }));
    }

    #[test]
    fn test_yanked_only_for_exact_pins() {
        let p = project(&[
            ("p-2.0-py3-none-any.whl", r#", "yanked": "bad build""#),
            ("p-1.0-py3-none-any.whl", ""),
        ]);
        let best = find_best(&p, &req("p"), &host(), None).unwrap();
        assert_eq!(best.wheel.version.to_string(), "1.0");

        let pinned = find_best(&p, &req("p==2.0"), &host(), None).unwrap();
        assert_eq!(pinned.wheel.version.to_string(), "2.0");
    }

    #[test]
    fn test_requires_python_filter() {
        let p = project(&[
            ("p-2.0-py3-none-any.whl", r#", "requires-python": ">=3.12""#),
            ("p-1.0-py3-none-any.whl", r#", "requires-python": ">=3.8""#),
        ]);
        let python = Version::parse("3.11.4").unwrap();
        let best = find_best(&p, &req("p"), &host(), Some(&python)).unwrap();
        assert_eq!(best.wheel.version.to_string(), "1.0");
    }

    #[test]
    fn test_prereleases() {
        let p = project(&[
            ("p-2.0b1-py3-none-any.whl", ""),
            ("p-1.0-py3-none-any.whl", ""),
        ]);
        let best = find_best(&p, &req("p"), &host(), None).unwrap();
        assert_eq!(best.wheel.version.to_string(), "1.0");

        let mut pre = req("p");
        pre.specifier_mut().set_prereleases(Some(true));
        let best = find_best(&p, &pre, &host(), None).unwrap();
        assert_eq!(best.wheel.version.to_string(), "2.0b1");
    }

    #[test]
    fn test_prerelease_not_chosen_when_no_final_matches() {
        let p = project(&[
            ("p-2.0b1-py3-none-any.whl", ""),
            ("p-1.0-py3-none-any.whl", ""),
        ]);
        assert!(matches!(
            find_best(&p, &req("p>=1.5"), &host(), None),
            Err(ResolveError::NoCompatibleArtifact { .. })
        ));
        let best = find_best(&p, &req("p==2.0b1"), &host(), None).unwrap();
        assert_eq!(best.wheel.version.to_string(), "2.0b1");
    }
}
