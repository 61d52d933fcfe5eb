//! Version specifiers (`>=1.0, !=1.3.*, <2`).

use crate::version::Version;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;
use thiserror::Error;

static CLAUSE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?P<op>~=|===|==|!=|<=|>=|<|>)\s*(?P<version>[^\s,;]+)\s*$")
        .expect("specifier grammar is a valid regex")
});

/// Errors produced while parsing specifiers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SpecifierError {
    /// The clause does not have the `<op><version>` shape.
    #[error("invalid specifier: '{0}'")]
    InvalidClause(String),

    /// The clause is well formed but the operator/version pair is not allowed.
    #[error("invalid specifier '{clause}': {reason}")]
    Unsupported {
        /// The offending clause.
        clause: String,
        /// Why it was rejected.
        reason: &'static str,
    },
}

/// Comparison operator of one clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Operator {
    /// `~=` compatible release.
    Compatible,
    /// `==` (optionally with a `.*` wildcard).
    Equal,
    /// `!=` (optionally with a `.*` wildcard).
    NotEqual,
    /// `<=`
    LessEqual,
    /// `>=`
    GreaterEqual,
    /// `<`
    Less,
    /// `>`
    Greater,
    /// `===` arbitrary string equality.
    ArbitraryEqual,
}

impl Operator {
    /// The operator's textual form.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Compatible => "~=",
            Self::Equal => "==",
            Self::NotEqual => "!=",
            Self::LessEqual => "<=",
            Self::GreaterEqual => ">=",
            Self::Less => "<",
            Self::Greater => ">",
            Self::ArbitraryEqual => "===",
        }
    }
}

impl FromStr for Operator {
    type Err = SpecifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "~=" => Self::Compatible,
            "==" => Self::Equal,
            "!=" => Self::NotEqual,
            "<=" => Self::LessEqual,
            ">=" => Self::GreaterEqual,
            "<" => Self::Less,
            ">" => Self::Greater,
            "===" => Self::ArbitraryEqual,
            other => return Err(SpecifierError::InvalidClause(other.to_string())),
        })
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single `(operator, version)` clause.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Specifier {
    op: Operator,
    /// Version text as written (without a trailing `.*`).
    text: String,
    /// Parsed version; `None` only for `===` clauses that are not versions.
    version: Option<Version>,
    wildcard: bool,
}

impl Specifier {
    /// Parse one clause such as `>=1.0` or `==2.*`.
    ///
    /// # Errors
    ///
    /// Returns [`SpecifierError`] if the clause is malformed, if the version
    /// does not parse, or if the operator does not accept the version form
    /// (wildcards outside `==`/`!=`, local labels on ordered comparisons, a
    /// single-segment `~=`).
    pub fn parse(clause: &str) -> Result<Self, SpecifierError> {
        let caps = CLAUSE_RE
            .captures(clause)
            .ok_or_else(|| SpecifierError::InvalidClause(clause.to_string()))?;
        let op: Operator = caps["op"].parse()?;
        let raw = &caps["version"];
        let unsupported = |reason| SpecifierError::Unsupported {
            clause: clause.trim().to_string(),
            reason,
        };

        if op == Operator::ArbitraryEqual {
            return Ok(Self {
                op,
                text: raw.to_string(),
                version: Version::parse(raw).ok(),
                wildcard: false,
            });
        }

        let (text, wildcard) = match raw.strip_suffix(".*") {
            Some(prefix) => (prefix, true),
            None => (raw, false),
        };
        if wildcard && !matches!(op, Operator::Equal | Operator::NotEqual) {
            return Err(unsupported("wildcards are only allowed with == and !="));
        }

        let version =
            Version::parse(text).map_err(|_| SpecifierError::InvalidClause(clause.to_string()))?;

        if version.has_local() && (wildcard || !matches!(op, Operator::Equal | Operator::NotEqual))
        {
            return Err(unsupported("local versions are only allowed with == and !="));
        }
        if op == Operator::Compatible && version.release().len() < 2 {
            return Err(unsupported("~= needs at least two release segments"));
        }

        Ok(Self {
            op,
            text: version.to_string(),
            version: Some(version),
            wildcard,
        })
    }

    /// The clause operator.
    pub fn operator(&self) -> Operator {
        self.op
    }

    /// The clause version, if it parsed as one.
    pub fn version(&self) -> Option<&Version> {
        self.version.as_ref()
    }

    /// `true` for an exact pin: `==V` without wildcard, or `===V`.
    pub fn is_exact_pin(&self) -> bool {
        matches!(self.op, Operator::ArbitraryEqual) || (self.op == Operator::Equal && !self.wildcard)
    }

    /// Whether this clause, on its own, opts into pre-releases.
    ///
    /// Inclusive operators naming a pre-release do; `<`, `>` and `!=` never
    /// do.
    pub fn mentions_prerelease(&self) -> bool {
        matches!(
            self.op,
            Operator::Equal
                | Operator::GreaterEqual
                | Operator::LessEqual
                | Operator::Compatible
                | Operator::ArbitraryEqual
        ) && self.version.as_ref().is_some_and(Version::is_prerelease)
    }

    /// Check `candidate` against this clause, ignoring pre-release gating.
    pub fn matches(&self, candidate: &Version) -> bool {
        let Some(spec) = &self.version else {
            return candidate.to_string().eq_ignore_ascii_case(&self.text);
        };

        match self.op {
            Operator::ArbitraryEqual => candidate.to_string().eq_ignore_ascii_case(&self.text),
            Operator::Equal => self.equal(candidate, spec),
            Operator::NotEqual => !self.equal(candidate, spec),
            Operator::LessEqual => candidate.public() <= *spec,
            Operator::GreaterEqual => candidate.public() >= *spec,
            Operator::Less => {
                let public = candidate.public();
                public < *spec
                    && !(!spec.is_prerelease()
                        && public.is_prerelease()
                        && public.base_version() == spec.base_version())
            }
            Operator::Greater => {
                let public = candidate.public();
                public > *spec
                    && !(!spec.is_postrelease()
                        && public.is_postrelease()
                        && public.base_version() == spec.base_version())
                    && !(candidate.has_local() && public.base_version() == spec.base_version())
            }
            Operator::Compatible => {
                let prefix_len = spec.release().len() - 1;
                let prefix = Version::from_release(&spec.release()[..prefix_len]);
                candidate.public() >= *spec
                    && candidate.epoch() == spec.epoch()
                    && release_prefix_matches(candidate, &prefix)
            }
        }
    }

    fn equal(&self, candidate: &Version, spec: &Version) -> bool {
        if self.wildcard {
            return candidate.epoch() == spec.epoch()
                && release_prefix_matches(candidate, spec)
                && wildcard_labels_match(candidate, spec);
        }
        if spec.has_local() {
            candidate == spec
        } else {
            candidate.public() == *spec
        }
    }
}

fn release_prefix_matches(candidate: &Version, prefix: &Version) -> bool {
    let wanted = prefix.release();
    (0..wanted.len()).all(|i| candidate.release().get(i).copied().unwrap_or(0) == wanted[i])
}

// `==1.0rc1.*` style prefixes: every label the prefix names must match, and
// the candidate may not extend the release past the prefix.
fn wildcard_labels_match(candidate: &Version, prefix: &Version) -> bool {
    if prefix.pre().is_none() && prefix.post().is_none() && prefix.dev().is_none() {
        return true;
    }
    let extra_release = candidate
        .release()
        .iter()
        .skip(prefix.release().len())
        .any(|&n| n != 0);
    !extra_release
        && (prefix.pre().is_none() || candidate.pre() == prefix.pre())
        && (prefix.post().is_none() || candidate.post() == prefix.post())
        && (prefix.dev().is_none() || candidate.dev() == prefix.dev())
}

impl fmt::Display for Specifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.op, self.text)?;
        if self.wildcard {
            f.write_str(".*")?;
        }
        Ok(())
    }
}

impl FromStr for Specifier {
    type Err = SpecifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// A conjunction of clauses plus the pre-release policy.
///
/// The pre-release flag is tri-state: `Some(true)` admits pre-releases,
/// `Some(false)` never does, and `None` leaves it to the clauses (any clause
/// naming a pre-release opts in) with a fallback in [`SpecifierSet::filter`]
/// when nothing else matches.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct SpecifierSet {
    specs: Vec<Specifier>,
    prereleases: Option<bool>,
}

impl SpecifierSet {
    /// An empty set that matches every final release.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a comma-separated list of clauses. Empty input yields an empty
    /// set.
    ///
    /// # Errors
    ///
    /// Returns the first clause's [`SpecifierError`].
    pub fn parse(text: &str) -> Result<Self, SpecifierError> {
        let mut specs = Vec::new();
        for clause in text.split(',') {
            if clause.trim().is_empty() {
                if text.trim().is_empty() {
                    continue;
                }
                return Err(SpecifierError::InvalidClause(text.to_string()));
            }
            specs.push(Specifier::parse(clause)?);
        }
        Ok(Self {
            specs,
            prereleases: None,
        })
    }

    /// The clauses of this set.
    pub fn iter(&self) -> impl Iterator<Item = &Specifier> {
        self.specs.iter()
    }

    /// Number of clauses.
    pub fn len(&self) -> usize {
        self.specs.len()
    }

    /// `true` when the set has no clauses.
    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    /// Force the pre-release policy.
    pub fn set_prereleases(&mut self, allow: Option<bool>) {
        self.prereleases = allow;
    }

    /// The effective pre-release policy: explicit setting, or `Some(true)`
    /// when a clause names a pre-release, or `None` when undecided.
    pub fn prereleases(&self) -> Option<bool> {
        self.prereleases.or_else(|| {
            self.specs
                .iter()
                .any(Specifier::mentions_prerelease)
                .then_some(true)
        })
    }

    /// `true` when some clause is an exact pin.
    pub fn is_exact_pin(&self) -> bool {
        self.specs.iter().any(Specifier::is_exact_pin)
    }

    /// Add the clauses of `other` to this set (intersection).
    pub fn extend(&mut self, other: &SpecifierSet) {
        for spec in &other.specs {
            if !self.specs.contains(spec) {
                self.specs.push(spec.clone());
            }
        }
        if other.prereleases.is_some() {
            self.prereleases = other.prereleases;
        }
    }

    /// Remove and return the clause at `index`.
    ///
    /// The set keeps the pre-release policy it had before the removal, so
    /// the remaining clauses never admit fewer versions.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of bounds.
    pub fn remove(&mut self, index: usize) -> Specifier {
        self.prereleases = self.prereleases();
        self.specs.remove(index)
    }

    /// Check one version. `prereleases` overrides the set's own policy.
    pub fn contains(&self, version: &Version, prereleases: Option<bool>) -> bool {
        let allow = prereleases.or_else(|| self.prereleases()).unwrap_or(false);
        if version.is_prerelease() && !allow {
            return false;
        }
        self.specs.iter().all(|spec| spec.matches(version))
    }

    /// Return the versions satisfying every clause, in input order.
    ///
    /// Pre-releases are kept only when the policy admits them: explicitly,
    /// or because a clause names a pre-release (`==1.1rc1`, `>=2.0b1`).
    pub fn filter<'a, I>(&self, versions: I) -> Vec<&'a Version>
    where
        I: IntoIterator<Item = &'a Version>,
    {
        let allow = self.prereleases().unwrap_or(false);
        versions
            .into_iter()
            .filter(|version| allow || !version.is_prerelease())
            .filter(|version| self.specs.iter().all(|spec| spec.matches(version)))
            .collect()
    }
}

impl fmt::Display for SpecifierSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut clauses: Vec<String> = self.specs.iter().map(ToString::to_string).collect();
        clauses.sort();
        f.write_str(&clauses.join(","))
    }
}

impl FromStr for SpecifierSet {
    type Err = SpecifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for SpecifierSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for SpecifierSet {
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

    fn set(s: &str) -> SpecifierSet {
        SpecifierSet::parse(s).unwrap()
    }

    fn versions(list: &[&str]) -> Vec<Version> {
        list.iter().map(|s| v(s)).collect()
    }

    fn filtered(spec: &SpecifierSet, list: &[Version]) -> Vec<String> {
        spec.filter(list).into_iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_basic_operators() {
        let s = set(">=1.0, <2.0, !=1.5");
        assert!(s.contains(&v("1.0"), None));
        assert!(s.contains(&v("1.9.9"), None));
        assert!(!s.contains(&v("1.5"), None));
        assert!(!s.contains(&v("2.0"), None));
        assert!(!s.contains(&v("0.9"), None));
    }

    #[test]
    fn test_wildcards() {
        let s = set("==1.2.*");
        assert!(s.contains(&v("1.2"), None));
        assert!(s.contains(&v("1.2.7"), None));
        assert!(!s.contains(&v("1.20"), None));
        assert!(!s.contains(&v("1.3"), None));

        let s = set("!=1.2.*");
        assert!(s.contains(&v("1.3"), None));
        assert!(!s.contains(&v("1.2.1"), None));

        assert!(SpecifierSet::parse(">=1.*").is_err());
    }

    #[test]
    fn test_compatible_release() {
        let s = set("~=2.2");
        assert!(s.contains(&v("2.2"), None));
        assert!(s.contains(&v("2.9"), None));
        assert!(!s.contains(&v("3.0"), None));

        let s = set("~=1.4.5");
        assert!(s.contains(&v("1.4.9"), None));
        assert!(!s.contains(&v("1.5.0"), None));

        assert!(SpecifierSet::parse("~=1").is_err());
    }

    #[test]
    fn test_exclusive_ordering_rules() {
        // `<V` does not admit pre-releases of V itself
        assert!(!set("<2.0").contains(&v("2.0rc1"), Some(true)));
        assert!(set("<2.0rc2").contains(&v("2.0rc1"), Some(true)));
        // `>V` does not admit post-releases of V
        assert!(!set(">1.0").contains(&v("1.0.post1"), None));
        assert!(set(">1.0.post1").contains(&v("1.0.post2"), None));
        assert!(!set(">1.0").contains(&v("1.0+local"), None));
    }

    #[test]
    fn test_local_versions() {
        assert!(set("==1.0").contains(&v("1.0+abc"), None));
        assert!(set("==1.0+abc").contains(&v("1.0+abc"), None));
        assert!(!set("==1.0+abc").contains(&v("1.0+def"), None));
        assert!(set("<=1.0").contains(&v("1.0+abc"), None));
        assert!(SpecifierSet::parse(">=1.0+abc").is_err());
    }

    #[test]
    fn test_arbitrary_equality() {
        let s = set("===1.0");
        assert!(s.contains(&v("1.0"), None));
        assert!(!s.contains(&v("1.0.0"), None));
        assert!(SpecifierSet::parse("===foobar").is_ok());
    }

    #[test]
    fn test_prerelease_policy() {
        let list = versions(&["1.0", "2.0b1"]);
        assert_eq!(filtered(&set(""), &list), vec!["1.0"]);
        assert_eq!(filtered(&set(">=2.0b1"), &list), vec!["2.0b1"]);

        let mut explicit = set("");
        explicit.set_prereleases(Some(true));
        assert_eq!(filtered(&explicit, &list), vec!["1.0", "2.0b1"]);

        // no final release matches, and nothing asked for a pre-release
        assert!(filtered(&set(">=1.5"), &list).is_empty());
        let only_pre = versions(&["3.0a1", "3.0b1"]);
        assert!(filtered(&set(""), &only_pre).is_empty());
        assert_eq!(filtered(&set("==3.0b1"), &only_pre), vec!["3.0b1"]);

        let mut never = set("");
        never.set_prereleases(Some(false));
        assert!(filtered(&never, &only_pre).is_empty());
    }

    #[test]
    fn test_exact_prerelease_pin() {
        let list = versions(&["1.0", "1.1rc1"]);
        assert_eq!(filtered(&set("==1.1rc1"), &list), vec!["1.1rc1"]);
        assert!(set("==1.1rc1").is_exact_pin());
        assert!(!set("==1.1.*").is_exact_pin());
    }

    #[test]
    fn test_widening_never_shrinks() {
        let list = versions(&["0.9", "1.0", "1.4", "1.5", "2.0", "2.1rc1", "3.0"]);
        let narrow = set(">=1.0,<3.0,!=1.5");
        let narrow_result = filtered(&narrow, &list);
        for i in 0..narrow.len() {
            let mut wider = narrow.clone();
            wider.remove(i);
            let wider_result = filtered(&wider, &list);
            for version in &narrow_result {
                assert!(wider_result.contains(version), "{wider} lost {version}");
            }
        }
    }

    #[test]
    fn test_widening_with_prereleases_above_the_bound() {
        let list = versions(&["0.9", "1.0", "1.4", "2.0b1", "2.1rc1", "3.0a1"]);
        for narrow in [">=1.5", ">=1.5,<3", ">=2.0b1,<3", "!=1.0,>=0.9,<=2.1rc1", "~=1.4"] {
            let narrow = set(narrow);
            let narrow_result = filtered(&narrow, &list);
            for i in 0..narrow.len() {
                let mut wider = narrow.clone();
                wider.remove(i);
                let wider_result = filtered(&wider, &list);
                for version in &narrow_result {
                    assert!(wider_result.contains(version), "{narrow} -> {wider} lost {version}");
                }
            }
        }
        assert!(filtered(&set(">=1.5"), &list).is_empty());
    }

    #[test]
    fn test_display_is_sorted() {
        assert_eq!(set("<2, >=1.0").to_string(), "<2,>=1.0");
        assert_eq!(set("==1.2.*").to_string(), "==1.2.*");
        assert!(SpecifierSet::parse(">=1.0,").is_err());
    }
}
