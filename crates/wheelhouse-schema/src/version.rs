//! Release versions.
//!
//! Parses the version grammar used by package indexes (epoch, release
//! segments, pre/post/dev labels and a `+local` suffix), normalizes the
//! accepted spellings, and orders versions the way resolvers expect:
//!
//! ```text
//! 1.0.dev0 < 1.0a1.dev0 < 1.0a1 < 1.0b2 < 1.0rc1 < 1.0 < 1.0+local < 1.0.post1
//! ```

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use std::sync::LazyLock;
use thiserror::Error;

static VERSION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?ix)
        ^\s*v?
        (?:(?P<epoch>[0-9]+)!)?
        (?P<release>[0-9]+(?:\.[0-9]+)*)
        (?P<pre>
            [-_.]?
            (?P<pre_l>alpha|a|beta|b|preview|pre|c|rc)
            [-_.]?
            (?P<pre_n>[0-9]+)?
        )?
        (?P<post>
            (?:-(?P<post_n1>[0-9]+))
            |
            (?:
                [-_.]?
                (?P<post_l>post|rev|r)
                [-_.]?
                (?P<post_n2>[0-9]+)?
            )
        )?
        (?P<dev>
            [-_.]?
            (?P<dev_l>dev)
            [-_.]?
            (?P<dev_n>[0-9]+)?
        )?
        (?:\+(?P<local>[a-z0-9]+(?:[-_.][a-z0-9]+)*))?
        \s*$",
    )
    .expect("version grammar is a valid regex")
});

/// Errors produced while parsing a version string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VersionError {
    /// The text does not match the version grammar.
    #[error("invalid version format: '{0}'")]
    InvalidFormat(String),
}

/// Pre-release phase, ordered `a < b < rc`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PreKind {
    /// Alpha (`a`, `alpha`).
    Alpha,
    /// Beta (`b`, `beta`).
    Beta,
    /// Release candidate (`rc`, `c`, `pre`, `preview`).
    Rc,
}

impl PreKind {
    fn as_str(self) -> &'static str {
        match self {
            Self::Alpha => "a",
            Self::Beta => "b",
            Self::Rc => "rc",
        }
    }
}

/// A pre-release label and its number, e.g. `rc1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PreRelease {
    /// The phase.
    pub kind: PreKind,
    /// The number following the phase (`0` when omitted).
    pub number: u64,
}

/// One dot-separated piece of a local version label.
///
/// Text segments sort before numeric ones; text compares case-insensitively
/// (it is stored lower-cased).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LocalSegment {
    /// Alphanumeric segment.
    Text(String),
    /// Purely numeric segment.
    Number(u64),
}

impl Ord for LocalSegment {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Number(a), Self::Number(b)) => a.cmp(b),
            (Self::Text(a), Self::Text(b)) => a.cmp(b),
            (Self::Text(_), Self::Number(_)) => Ordering::Less,
            (Self::Number(_), Self::Text(_)) => Ordering::Greater,
        }
    }
}

impl PartialOrd for LocalSegment {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for LocalSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) => f.write_str(s),
            Self::Number(n) => write!(f, "{n}"),
        }
    }
}

/// A parsed, normalized version.
///
/// Equality and hashing ignore trailing zero release segments, so
/// `1.0 == 1.0.0`. `Display` renders the normalized spelling, which keeps the
/// release segments exactly as written.
#[derive(Debug, Clone)]
pub struct Version {
    epoch: u64,
    release: Vec<u64>,
    pre: Option<PreRelease>,
    post: Option<u64>,
    dev: Option<u64>,
    local: Vec<LocalSegment>,
}

fn parse_number(text: &str, original: &str) -> Result<u64, VersionError> {
    text.parse()
        .map_err(|_| VersionError::InvalidFormat(original.to_string()))
}

impl Version {
    /// Parse a version string.
    ///
    /// # Errors
    ///
    /// Returns [`VersionError::InvalidFormat`] if `text` does not match the
    /// version grammar or a numeric component overflows.
    pub fn parse(text: &str) -> Result<Self, VersionError> {
        let caps = VERSION_RE
            .captures(text)
            .ok_or_else(|| VersionError::InvalidFormat(text.to_string()))?;

        let epoch = match caps.name("epoch") {
            Some(m) => parse_number(m.as_str(), text)?,
            None => 0,
        };

        let release = caps["release"]
            .split('.')
            .map(|s| parse_number(s, text))
            .collect::<Result<Vec<_>, _>>()?;

        let pre = match caps.name("pre_l") {
            Some(label) => {
                let kind = match label.as_str().to_ascii_lowercase().as_str() {
                    "a" | "alpha" => PreKind::Alpha,
                    "b" | "beta" => PreKind::Beta,
                    _ => PreKind::Rc,
                };
                let number = match caps.name("pre_n") {
                    Some(n) => parse_number(n.as_str(), text)?,
                    None => 0,
                };
                Some(PreRelease { kind, number })
            }
            None => None,
        };

        let post = if let Some(n) = caps.name("post_n1") {
            Some(parse_number(n.as_str(), text)?)
        } else if caps.name("post_l").is_some() {
            match caps.name("post_n2") {
                Some(n) => Some(parse_number(n.as_str(), text)?),
                None => Some(0),
            }
        } else {
            None
        };

        let dev = if caps.name("dev_l").is_some() {
            match caps.name("dev_n") {
                Some(n) => Some(parse_number(n.as_str(), text)?),
                None => Some(0),
            }
        } else {
            None
        };

        let local = match caps.name("local") {
            Some(m) => m
                .as_str()
                .split(['.', '-', '_'])
                .map(|seg| match seg.parse::<u64>() {
                    Ok(n) if seg.bytes().all(|b| b.is_ascii_digit()) => LocalSegment::Number(n),
                    _ => LocalSegment::Text(seg.to_ascii_lowercase()),
                })
                .collect(),
            None => Vec::new(),
        };

        Ok(Self {
            epoch,
            release,
            pre,
            post,
            dev,
            local,
        })
    }

    /// Build a plain final release from its segments, e.g. `[1, 2]` → `1.2`.
    pub fn from_release(release: impl Into<Vec<u64>>) -> Self {
        let mut release = release.into();
        if release.is_empty() {
            release.push(0);
        }
        Self {
            epoch: 0,
            release,
            pre: None,
            post: None,
            dev: None,
            local: Vec::new(),
        }
    }

    /// The epoch (`0` unless written as `N!`).
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// The release segments exactly as written.
    pub fn release(&self) -> &[u64] {
        &self.release
    }

    /// The pre-release label, if any.
    pub fn pre(&self) -> Option<PreRelease> {
        self.pre
    }

    /// The post-release number, if any.
    pub fn post(&self) -> Option<u64> {
        self.post
    }

    /// The development release number, if any.
    pub fn dev(&self) -> Option<u64> {
        self.dev
    }

    /// The local version label segments (empty when absent).
    pub fn local(&self) -> &[LocalSegment] {
        &self.local
    }

    /// `true` for pre-releases and development releases.
    pub fn is_prerelease(&self) -> bool {
        self.pre.is_some() || self.dev.is_some()
    }

    /// `true` if the version carries a post-release label.
    pub fn is_postrelease(&self) -> bool {
        self.post.is_some()
    }

    /// `true` if the version carries a `+local` label.
    pub fn has_local(&self) -> bool {
        !self.local.is_empty()
    }

    /// The same version without its local label.
    pub fn public(&self) -> Self {
        Self {
            local: Vec::new(),
            ..self.clone()
        }
    }

    /// Epoch and release only, dropping every label.
    pub fn base_version(&self) -> Self {
        Self {
            epoch: self.epoch,
            release: self.release.clone(),
            pre: None,
            post: None,
            dev: None,
            local: Vec::new(),
        }
    }

    fn release_trimmed(&self) -> &[u64] {
        let end = self
            .release
            .iter()
            .rposition(|&n| n != 0)
            .map_or(0, |i| i + 1);
        &self.release[..end]
    }

    // Pre-release key: a dev-only release sorts before every pre-release of
    // the same release, a final release after all of them.
    fn pre_key(&self) -> (i8, Option<PreRelease>) {
        match (self.pre, self.post, self.dev) {
            (None, None, Some(_)) => (-1, None),
            (None, _, _) => (1, None),
            (Some(pre), _, _) => (0, Some(pre)),
        }
    }

    fn dev_key(&self) -> (u8, u64) {
        match self.dev {
            Some(n) => (0, n),
            None => (1, 0),
        }
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.epoch
            .cmp(&other.epoch)
            .then_with(|| self.release_trimmed().cmp(other.release_trimmed()))
            .then_with(|| self.pre_key().cmp(&other.pre_key()))
            .then_with(|| self.post.cmp(&other.post))
            .then_with(|| self.dev_key().cmp(&other.dev_key()))
            .then_with(|| self.local.cmp(&other.local))
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl Hash for Version {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.epoch.hash(state);
        self.release_trimmed().hash(state);
        self.pre.hash(state);
        self.post.hash(state);
        self.dev.hash(state);
        self.local.hash(state);
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.epoch != 0 {
            write!(f, "{}!", self.epoch)?;
        }
        let release: Vec<String> = self.release.iter().map(u64::to_string).collect();
        f.write_str(&release.join("."))?;
        if let Some(pre) = self.pre {
            write!(f, "{}{}", pre.kind.as_str(), pre.number)?;
        }
        if let Some(post) = self.post {
            write!(f, ".post{post}")?;
        }
        if let Some(dev) = self.dev {
            write!(f, ".dev{dev}")?;
        }
        if !self.local.is_empty() {
            let local: Vec<String> = self.local.iter().map(ToString::to_string).collect();
            write!(f, "+{}", local.join("."))?;
        }
        Ok(())
    }
}

impl FromStr for Version {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for Version {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Version {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    #[test]
    fn test_normalized_display() {
        assert_eq!(v("1.0").to_string(), "1.0");
        assert_eq!(v("V1.0-ALPHA.1").to_string(), "1.0a1");
        assert_eq!(v("1.0-1").to_string(), "1.0.post1");
        assert_eq!(v("1.0rev2").to_string(), "1.0.post2");
        assert_eq!(v("1.0c3").to_string(), "1.0rc3");
        assert_eq!(v("1.0.preview4").to_string(), "1.0rc4");
        assert_eq!(v("1.0-dev").to_string(), "1.0.dev0");
        assert_eq!(v("2!1.0+Ubuntu-1").to_string(), "2!1.0+ubuntu.1");
    }

    #[test]
    fn test_round_trip_is_idempotent() {
        for s in [
            "0.1",
            "1.0.0",
            "1!2.3.4",
            "1.0a1",
            "1.0b2.post3.dev4",
            "1.0rc1+local.7",
            "2013.10.29",
            "1.0.post0",
            "v1.0_RC2",
            "1.0-5",
        ] {
            let parsed = v(s);
            let reparsed = v(&parsed.to_string());
            assert_eq!(parsed, reparsed, "{s}");
            assert_eq!(parsed.to_string(), reparsed.to_string(), "{s}");
        }
    }

    #[test]
    fn test_invalid_versions() {
        for s in ["", "2.0x", "1.0.", "one", "1.0+", "1..0", "1.0-beta-2-3x"] {
            assert!(Version::parse(s).is_err(), "{s} should not parse");
        }
    }

    #[test]
    fn test_ordering_of_labels() {
        let ordered = [
            "1.0.dev0",
            "1.0a1.dev0",
            "1.0a1",
            "1.0a2",
            "1.0b1",
            "1.0rc1",
            "1.0",
            "1.0+abc",
            "1.0+5",
            "1.0.post1.dev0",
            "1.0.post1",
            "1.1.dev1",
            "1.1",
            "1!0.1",
        ];
        for pair in ordered.windows(2) {
            assert!(v(pair[0]) < v(pair[1]), "{} < {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_trailing_zeros_are_equal() {
        assert_eq!(v("1.0"), v("1.0.0"));
        assert_eq!(v("1"), v("1.0.0.0"));
        assert!(v("1.0.1") > v("1.0"));

        use std::collections::HashSet;
        let set: HashSet<Version> = [v("1.0"), v("1.0.0")].into_iter().collect();
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_classification() {
        assert!(v("1.0a1").is_prerelease());
        assert!(v("1.0.dev1").is_prerelease());
        assert!(!v("1.0.post1").is_prerelease());
        assert!(v("1.0.post1").is_postrelease());
        assert!(v("1.0+x").has_local());
        assert_eq!(v("1.2rc1.post2+x").base_version().to_string(), "1.2");
        assert_eq!(v("1.2rc1+x").public().to_string(), "1.2rc1");
    }
}
