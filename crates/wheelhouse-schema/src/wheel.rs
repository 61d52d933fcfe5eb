//! Wheel filenames and compatibility tags.

use crate::name::PackageName;
use crate::version::Version;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors produced while parsing wheel filenames and tags.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WheelFilenameError {
    /// The filename does not end in `.whl`.
    #[error("'{0}' is not a wheel filename")]
    NotAWheel(String),

    /// The filename does not have 5 or 6 dash-separated components.
    #[error("invalid wheel filename '{filename}': {reason}")]
    Invalid {
        /// The offending filename.
        filename: String,
        /// What went wrong.
        reason: &'static str,
    },

    /// A compressed tag triple is malformed.
    #[error("invalid tag '{0}'")]
    InvalidTag(String),
}

/// One `interpreter-abi-platform` compatibility tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Tag {
    /// Interpreter tag, e.g. `cp312` or `py3`.
    pub interpreter: String,
    /// ABI tag, e.g. `cp312`, `abi3` or `none`.
    pub abi: String,
    /// Platform tag, e.g. `manylinux_2_17_x86_64` or `any`.
    pub platform: String,
}

impl Tag {
    /// Build a tag, lower-casing each part.
    pub fn new(interpreter: &str, abi: &str, platform: &str) -> Self {
        Self {
            interpreter: interpreter.to_ascii_lowercase(),
            abi: abi.to_ascii_lowercase(),
            platform: platform.to_ascii_lowercase(),
        }
    }

    /// Expand a compressed tag triple (`py2.py3-none-any`) into its tags.
    ///
    /// # Errors
    ///
    /// Returns [`WheelFilenameError::InvalidTag`] if `text` does not have
    /// three dash-separated parts.
    pub fn parse_compressed(text: &str) -> Result<BTreeSet<Self>, WheelFilenameError> {
        let parts: Vec<&str> = text.split('-').collect();
        let [interpreters, abis, platforms] = parts.as_slice() else {
            return Err(WheelFilenameError::InvalidTag(text.to_string()));
        };
        expand(interpreters, abis, platforms)
            .ok_or_else(|| WheelFilenameError::InvalidTag(text.to_string()))
    }
}

fn expand(interpreters: &str, abis: &str, platforms: &str) -> Option<BTreeSet<Tag>> {
    let mut tags = BTreeSet::new();
    for interpreter in interpreters.split('.') {
        for abi in abis.split('.') {
            for platform in platforms.split('.') {
                if interpreter.is_empty() || abi.is_empty() || platform.is_empty() {
                    return None;
                }
                tags.insert(Tag::new(interpreter, abi, platform));
            }
        }
    }
    Some(tags)
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-{}", self.interpreter, self.abi, self.platform)
    }
}

impl FromStr for Tag {
    type Err = WheelFilenameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let tags = Self::parse_compressed(s)?;
        match tags.len() {
            1 => tags
                .into_iter()
                .next()
                .ok_or_else(|| WheelFilenameError::InvalidTag(s.to_string())),
            _ => Err(WheelFilenameError::InvalidTag(s.to_string())),
        }
    }
}

/// Optional build tag: a number followed by an optional string suffix.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BuildTag {
    /// Leading digits.
    pub number: u64,
    /// Remainder after the digits.
    pub suffix: String,
}

/// A parsed wheel filename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WheelFilename {
    /// The filename as given.
    pub filename: String,
    /// Canonical project name.
    pub name: PackageName,
    /// Parsed version.
    pub version: Version,
    /// The version component exactly as written in the filename.
    pub version_text: String,
    /// Optional build tag.
    pub build: Option<BuildTag>,
    /// Expanded compatibility tags.
    pub tags: BTreeSet<Tag>,
}

impl WheelFilename {
    /// Parse a wheel filename such as `numpy-2.0.0-cp312-cp312-manylinux_2_17_x86_64.whl`.
    ///
    /// # Errors
    ///
    /// Returns [`WheelFilenameError`] when the name is not a `.whl` file,
    /// has the wrong number of components, or carries an invalid version,
    /// build tag or tag triple.
    pub fn parse(filename: &str) -> Result<Self, WheelFilenameError> {
        let invalid = |reason| WheelFilenameError::Invalid {
            filename: filename.to_string(),
            reason,
        };
        let stem = filename
            .strip_suffix(".whl")
            .ok_or_else(|| WheelFilenameError::NotAWheel(filename.to_string()))?;
        let parts: Vec<&str> = stem.split('-').collect();

        let (name, version_text, build, py, abi, plat) = match parts.as_slice() {
            [name, version, py, abi, plat] => (*name, *version, None, *py, *abi, *plat),
            [name, version, build, py, abi, plat] => {
                (*name, *version, Some(*build), *py, *abi, *plat)
            }
            _ => return Err(invalid("expected 5 or 6 dash-separated components")),
        };
        if name.is_empty() {
            return Err(invalid("empty project name"));
        }

        let version = Version::parse(version_text).map_err(|_| invalid("invalid version"))?;

        let build = match build {
            Some(text) => {
                let digits: String = text.chars().take_while(char::is_ascii_digit).collect();
                let number = digits
                    .parse()
                    .map_err(|_| invalid("build tag must start with a digit"))?;
                Some(BuildTag {
                    number,
                    suffix: text[digits.len()..].to_string(),
                })
            }
            None => None,
        };

        let tags = expand(py, abi, plat).ok_or_else(|| invalid("empty tag component"))?;

        Ok(Self {
            filename: filename.to_string(),
            name: PackageName::new(name),
            version,
            version_text: version_text.to_string(),
            build,
            tags,
        })
    }

    /// Parse the filename in the last path segment of `url`, ignoring any
    /// query string or fragment.
    ///
    /// # Errors
    ///
    /// Same as [`WheelFilename::parse`].
    pub fn from_url(url: &str) -> Result<Self, WheelFilenameError> {
        Self::parse(url_filename(url))
    }

    /// `true` for pure-Python wheels that run anywhere (`py3-none-any`).
    pub fn is_universal(&self) -> bool {
        self.filename.ends_with("py3-none-any.whl")
    }
}

/// The last path segment of a URL, without query string or fragment.
pub fn url_filename(url: &str) -> &str {
    let end = url.find(['?', '#']).unwrap_or(url.len());
    let path = &url[..end];
    path.rsplit('/').next().unwrap_or(path)
}

impl fmt::Display for WheelFilename {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.filename)
    }
}

impl FromStr for WheelFilename {
    type Err = WheelFilenameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_platform_wheel() {
        let wheel =
            WheelFilename::parse("numpy-2.0.0-cp312-cp312-manylinux_2_17_x86_64.manylinux2014_x86_64.whl")
                .unwrap();
        assert_eq!(wheel.name, "numpy");
        assert_eq!(wheel.version.to_string(), "2.0.0");
        assert!(wheel.build.is_none());
        assert_eq!(wheel.tags.len(), 2);
        assert!(wheel.tags.contains(&Tag::new("cp312", "cp312", "manylinux2014_x86_64")));
        assert!(!wheel.is_universal());
    }

    #[test]
    fn test_parse_build_tag_and_compressed() {
        let wheel = WheelFilename::parse("Foo_Bar-1.0-1a-py2.py3-none-any.whl").unwrap();
        assert_eq!(wheel.name, "foo-bar");
        assert_eq!(
            wheel.build,
            Some(BuildTag {
                number: 1,
                suffix: "a".to_string()
            })
        );
        assert_eq!(wheel.tags.len(), 2);
        assert!(wheel.is_universal());
    }

    #[test]
    fn test_rejects_bad_names() {
        assert!(matches!(
            WheelFilename::parse("foo-1.0.tar.gz"),
            Err(WheelFilenameError::NotAWheel(_))
        ));
        assert!(WheelFilename::parse("foo-1.0-py3-none.whl").is_err());
        assert!(WheelFilename::parse("foo-2.0x-py3-none-any.whl").is_err());
        assert!(WheelFilename::parse("foo-1.0-x1-py3-none-any.whl").is_err());
    }

    #[test]
    fn test_from_url() {
        let wheel = WheelFilename::from_url(
            "https://files.example/packages/ab/six-1.16.0-py2.py3-none-any.whl#sha256=00",
        )
        .unwrap();
        assert_eq!(wheel.filename, "six-1.16.0-py2.py3-none-any.whl");
        assert_eq!(url_filename("https://a/b/c.whl?x=1"), "c.whl");
    }

    #[test]
    fn test_tag_from_str() {
        let tag: Tag = "cp312-abi3-win_amd64".parse().unwrap();
        assert_eq!(tag.to_string(), "cp312-abi3-win_amd64");
        assert!("py2.py3-none-any".parse::<Tag>().is_err());
    }
}
