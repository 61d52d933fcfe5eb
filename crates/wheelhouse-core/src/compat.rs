//! Host tag list and wheel compatibility ranking.

use std::collections::{BTreeSet, HashMap, HashSet};

use wheelhouse_schema::{MarkerEnvironment, Tag, WheelFilename};

/// Ordered (best first) list of tags the host can install.
#[derive(Debug, Clone)]
pub struct SupportedTags {
    tags: Vec<Tag>,
    positions: HashMap<Tag, usize>,
}

impl SupportedTags {
    /// Wrap an already-ordered tag list. Duplicates keep their first
    /// position.
    pub fn new(tags: Vec<Tag>) -> Self {
        let mut positions = HashMap::with_capacity(tags.len());
        for (i, tag) in tags.iter().enumerate() {
            positions.entry(tag.clone()).or_insert(i);
        }
        Self { tags, positions }
    }

    /// The CPython tag order for interpreter `major.minor` on `platforms`
    /// (most specific platform first).
    pub fn cpython(major: u64, minor: u64, platforms: &[String]) -> Self {
        let interpreter = format!("cp{major}{minor}");
        let mut tags = Vec::new();

        for abi in [interpreter.as_str(), "abi3", "none"] {
            for platform in platforms {
                tags.push(Tag::new(&interpreter, abi, platform));
            }
        }
        for older in (2..minor).rev() {
            for platform in platforms {
                tags.push(Tag::new(&format!("cp{major}{older}"), "abi3", platform));
            }
        }

        let py_versions: Vec<String> = std::iter::once(format!("py{major}{minor}"))
            .chain(std::iter::once(format!("py{major}")))
            .chain((0..minor).rev().map(|m| format!("py{major}{m}")))
            .collect();
        for py in &py_versions {
            for platform in platforms {
                tags.push(Tag::new(py, "none", platform));
            }
        }
        tags.push(Tag::new(&interpreter, "none", "any"));
        for py in &py_versions {
            tags.push(Tag::new(py, "none", "any"));
        }

        Self::new(tags)
    }

    /// Tags for the interpreter described by `env`, falling back to
    /// CPython 3.12 when `python_version` does not parse.
    pub fn from_environment(env: &MarkerEnvironment, platforms: &[String]) -> Self {
        let (major, minor) = env.python_minor().unwrap_or((3, 12));
        Self::cpython(major, minor, platforms)
    }

    pub fn tags(&self) -> &[Tag] {
        &self.tags
    }

    /// Position of the best host tag present in `tags`, or `None` when the
    /// sets do not intersect.
    pub fn best_index(&self, tags: &BTreeSet<Tag>) -> Option<usize> {
        tags.iter().filter_map(|tag| self.positions.get(tag)).min().copied()
    }

    /// Rank of a wheel: `py3-none-any` wheels are always `0`, otherwise
    /// [`SupportedTags::best_index`] over the wheel's tags.
    pub fn rank(&self, wheel: &WheelFilename) -> Option<usize> {
        if wheel.is_universal() {
            return Some(0);
        }
        self.best_index(&wheel.tags)
    }

    pub fn is_compatible(&self, wheel: &WheelFilename) -> bool {
        self.rank(wheel).is_some()
    }

    /// Describe why `wheel` cannot be installed here, or `None` if it can.
    pub fn explain_incompatibility(&self, wheel: &WheelFilename) -> Option<String> {
        if self.is_compatible(wheel) {
            return None;
        }
        let first = wheel.tags.iter().next()?;

        let platforms: HashSet<&str> = self.tags.iter().map(|t| t.platform.as_str()).collect();
        if !platforms.contains(first.platform.as_str()) {
            let host = self
                .tags
                .first()
                .map_or("any", |t| t.platform.as_str());
            return Some(format!(
                "Wheel platform '{}' is not compatible with the host platform '{host}'",
                first.platform
            ));
        }

        let abis: HashSet<&str> = self.tags.iter().map(|t| t.abi.as_str()).collect();
        if !wheel.tags.iter().any(|t| abis.contains(t.abi.as_str())) {
            let wheel_abis: BTreeSet<&str> = wheel.tags.iter().map(|t| t.abi.as_str()).collect();
            let mut supported: Vec<&str> = abis.into_iter().collect();
            supported.sort_unstable();
            return Some(format!(
                "Wheel abi '{}' is not supported. Supported abis are {}.",
                wheel_abis.into_iter().collect::<Vec<_>>().join(","),
                supported
                    .iter()
                    .map(|a| format!("'{a}'"))
                    .collect::<Vec<_>>()
                    .join(", ")
            ));
        }

        Some(format!(
            "Wheel interpreter version '{}' is not supported.",
            first.interpreter
        ))
    }
}

/// manylinux platform tags for `arch`, newest glibc first, down to
/// `manylinux_2_5`, with the legacy aliases after their glibc level and the
/// bare `linux_<arch>` tag last.
pub fn manylinux_platforms(arch: &str, glibc_minor: u32) -> Vec<String> {
    let mut platforms = Vec::new();
    for minor in (5..=glibc_minor).rev() {
        platforms.push(format!("manylinux_2_{minor}_{arch}"));
        let legacy = match minor {
            17 => Some("manylinux2014"),
            12 => Some("manylinux2010"),
            5 => Some("manylinux1"),
            _ => None,
        };
        if let Some(legacy) = legacy {
            platforms.push(format!("{legacy}_{arch}"));
        }
    }
    platforms.push(format!("linux_{arch}"));
    platforms
}
