//! Project names and their PEP 503 canonical form.

use serde::{Deserialize, Deserializer, Serialize};
use std::borrow::Borrow;
use std::fmt;

/// Normalize a project name the way package indexes compare them.
///
/// Lower-cases the name and collapses every run of `-`, `_` and `.` into a
/// single `-`.
///
/// ```
/// use wheelhouse_schema::canonicalize_name;
///
/// assert_eq!(canonicalize_name("Jinja2"), "jinja2");
/// assert_eq!(canonicalize_name("zope.interface"), "zope-interface");
/// assert_eq!(canonicalize_name("typing__Extensions"), "typing-extensions");
/// ```
pub fn canonicalize_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut in_separator = false;
    for c in name.trim().chars() {
        if matches!(c, '-' | '_' | '.') {
            if !in_separator {
                out.push('-');
                in_separator = true;
            }
        } else {
            out.push(c.to_ascii_lowercase());
            in_separator = false;
        }
    }
    out
}

/// A canonicalized package name.
///
/// Two names that differ only in case or separator spelling are the same
/// package, so the newtype stores the canonical form and nothing else.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct PackageName(String);

impl PackageName {
    /// Create a name, canonicalizing the input.
    pub fn new(name: &str) -> Self {
        Self(canonicalize_name(name))
    }

    /// Return the canonical name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PackageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for PackageName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for PackageName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for PackageName {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for PackageName {
    fn from(s: String) -> Self {
        Self::new(&s)
    }
}

impl PartialEq<str> for PackageName {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for PackageName {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

impl<'de> Deserialize<'de> for PackageName {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(Self::new(&s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_forms_compare_equal() {
        assert_eq!(PackageName::new("Foo.Bar"), PackageName::new("foo-bar"));
        assert_eq!(PackageName::new("foo__bar"), PackageName::new("FOO_BAR"));
        assert_ne!(PackageName::new("foobar"), PackageName::new("foo-bar"));
    }

    #[test]
    fn deserialize_canonicalizes() {
        let name: PackageName = serde_json::from_str("\"Ruamel.YAML\"").unwrap();
        assert_eq!(name, "ruamel-yaml");
    }
}
