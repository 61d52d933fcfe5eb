//! Dependency specifications (`requests[socks]>=2.31; python_version >= "3.8"`).

use crate::marker::{MarkerError, MarkerTree};
use crate::name::{PackageName, canonicalize_name};
use crate::specifier::{SpecifierError, SpecifierSet};
use crate::wheel::WheelFilename;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;
use thiserror::Error;

static NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*([A-Za-z0-9](?:[A-Za-z0-9._-]*[A-Za-z0-9])?)\s*")
        .expect("requirement name grammar is a valid regex")
});

/// Error returned for a malformed requirement string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequirementError {
    /// The requirement does not follow the grammar.
    #[error("invalid requirement '{input}': {reason}")]
    InvalidFormat {
        /// The requirement text.
        input: String,
        /// What went wrong.
        reason: String,
    },

    /// The version specifier part is invalid.
    #[error("invalid requirement '{input}': {source}")]
    Specifier {
        /// The requirement text.
        input: String,
        /// Underlying specifier error.
        source: SpecifierError,
    },

    /// The marker part is invalid.
    #[error("invalid requirement '{input}': {source}")]
    Marker {
        /// The requirement text.
        input: String,
        /// Underlying marker error.
        source: MarkerError,
    },
}

/// A parsed requirement.
///
/// Requirements are immutable once parsed apart from the narrowing a
/// constraint applies (see [`Requirement::specifier_mut`]).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Requirement {
    /// Canonical project name.
    pub name: PackageName,
    /// Requested extras, canonicalized.
    pub extras: BTreeSet<String>,
    /// Version constraints.
    pub specifier: SpecifierSet,
    /// Optional environment marker.
    pub marker: Option<MarkerTree>,
    /// Direct URL (`name @ url`), if any.
    pub url: Option<String>,
}

impl Requirement {
    /// A bare requirement on `name` with no constraints.
    pub fn new(name: impl Into<PackageName>) -> Self {
        Self {
            name: name.into(),
            extras: BTreeSet::new(),
            specifier: SpecifierSet::new(),
            marker: None,
            url: None,
        }
    }

    /// Parse a requirement string.
    ///
    /// Besides the usual `name[extras] specifiers ; marker` and
    /// `name @ url ; marker` forms, a bare URL ending in `.whl` is accepted;
    /// its name comes from the wheel filename.
    ///
    /// # Errors
    ///
    /// Returns [`RequirementError`] if any part of the text is malformed.
    pub fn parse(input: &str) -> Result<Self, RequirementError> {
        let text = input.trim();
        let invalid = |reason: &str| RequirementError::InvalidFormat {
            input: input.to_string(),
            reason: reason.to_string(),
        };

        if text.contains("://") && !text.contains('@') {
            let wheel = WheelFilename::from_url(text).map_err(|e| invalid(&e.to_string()))?;
            let mut req = Self::new(wheel.name.clone());
            req.url = Some(text.to_string());
            return Ok(req);
        }

        let caps = NAME_RE
            .captures(text)
            .ok_or_else(|| invalid("expected a package name"))?;
        let name = PackageName::new(&caps[1]);
        let mut rest = &text[caps[0].len()..];

        let mut extras = BTreeSet::new();
        if let Some(after) = rest.strip_prefix('[') {
            let close = after.find(']').ok_or_else(|| invalid("unclosed '['"))?;
            for extra in after[..close].split(',') {
                let extra = extra.trim();
                if extra.is_empty() {
                    continue;
                }
                if !NAME_RE.is_match(extra) || extra.contains(char::is_whitespace) {
                    return Err(invalid("invalid extra name"));
                }
                extras.insert(canonicalize_name(extra));
            }
            rest = after[close + 1..].trim_start();
        }

        let mut url = None;
        let (spec_text, marker_text) = if let Some(after) = rest.strip_prefix('@') {
            let after = after.trim_start();
            // A `;` only ends the URL when preceded by whitespace.
            let (url_text, marker) = match after.find(" ;") {
                Some(pos) => (&after[..pos], Some(&after[pos + 2..])),
                None => (after, None),
            };
            let url_text = url_text.trim();
            if url_text.is_empty() || !url_text.contains(':') {
                return Err(invalid("expected a URL after '@'"));
            }
            url = Some(url_text.to_string());
            ("", marker)
        } else {
            match rest.split_once(';') {
                Some((spec, marker)) => (spec, Some(marker)),
                None => (rest, None),
            }
        };

        let mut spec_text = spec_text.trim();
        if let Some(inner) = spec_text.strip_prefix('(') {
            spec_text = inner
                .strip_suffix(')')
                .ok_or_else(|| invalid("unclosed '('"))?
                .trim();
        }
        if !spec_text.is_empty() && !spec_text.starts_with(['<', '>', '=', '!', '~']) {
            return Err(invalid("unexpected text after the package name"));
        }
        let specifier =
            SpecifierSet::parse(spec_text).map_err(|source| RequirementError::Specifier {
                input: input.to_string(),
                source,
            })?;

        let marker = match marker_text.map(str::trim) {
            Some("") => return Err(invalid("empty marker after ';'")),
            Some(m) => Some(MarkerTree::parse(m).map_err(|source| {
                RequirementError::Marker {
                    input: input.to_string(),
                    source,
                }
            })?),
            None => None,
        };

        Ok(Self {
            name,
            extras,
            specifier,
            marker,
            url,
        })
    }

    /// Mutable access to the specifier, for constraint narrowing and the
    /// global pre-release switch.
    pub fn specifier_mut(&mut self) -> &mut SpecifierSet {
        &mut self.specifier
    }

    /// The same requirement without its marker.
    pub fn without_marker(&self) -> Self {
        Self {
            marker: None,
            ..self.clone()
        }
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name.as_str())?;
        if !self.extras.is_empty() {
            let extras: Vec<&str> = self.extras.iter().map(String::as_str).collect();
            write!(f, "[{}]", extras.join(","))?;
        }
        if let Some(url) = &self.url {
            write!(f, " @ {url}")?;
            if self.marker.is_some() {
                f.write_str(" ")?;
            }
        } else {
            write!(f, "{}", self.specifier)?;
        }
        if let Some(marker) = &self.marker {
            write!(f, "; {marker}")?;
        }
        Ok(())
    }
}

impl FromStr for Requirement {
    type Err = RequirementError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for Requirement {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Requirement {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}
