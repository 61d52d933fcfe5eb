//! PEP 503 HTML simple API.

use std::collections::HashMap;
use std::sync::LazyLock;

use percent_encoding::percent_decode_str;
use regex::Regex;
use wheelhouse_schema::{PackageName, Sha256Hash};

use super::simple_json::check_api_version;
use super::{FileEntry, IndexError, MetadataAvailability, ProjectInfo, project_from_files};

static TAG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<\s*(a|meta)\b([^>]*)>").expect("tag pattern is a valid regex")
});

static ATTR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"([A-Za-z_:][-A-Za-z0-9_:.]*)(?:\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'=<>`]+)))?"#,
    )
    .expect("attribute pattern is a valid regex")
});

static ENTITY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"&(#[0-9]+|#[xX][0-9a-fA-F]+|[A-Za-z]+);").expect("entity pattern is a valid regex")
});

/// Decode the character references that show up in index pages.
fn unescape(text: &str) -> String {
    ENTITY_RE
        .replace_all(text, |caps: &regex::Captures<'_>| {
            let entity = &caps[1];
            let decoded = if let Some(hex) = entity
                .strip_prefix("#x")
                .or_else(|| entity.strip_prefix("#X"))
            {
                u32::from_str_radix(hex, 16).ok().and_then(char::from_u32)
            } else if let Some(dec) = entity.strip_prefix('#') {
                dec.parse().ok().and_then(char::from_u32)
            } else {
                match entity {
                    "amp" => Some('&'),
                    "lt" => Some('<'),
                    "gt" => Some('>'),
                    "quot" => Some('"'),
                    "apos" => Some('\''),
                    _ => None,
                }
            };
            decoded.map_or_else(|| caps[0].to_string(), String::from)
        })
        .into_owned()
}

fn attributes(raw: &str) -> HashMap<String, Option<String>> {
    ATTR_RE
        .captures_iter(raw)
        .map(|caps| {
            let value = caps
                .get(2)
                .or_else(|| caps.get(3))
                .or_else(|| caps.get(4))
                .map(|m| unescape(m.as_str()));
            (caps[1].to_ascii_lowercase(), value)
        })
        .collect()
}

fn file_from_anchor(attrs: &HashMap<String, Option<String>>) -> Option<FileEntry> {
    let href = attrs.get("href")?.as_deref().filter(|h| !h.is_empty())?;
    let (without_fragment, fragment) = match href.split_once('#') {
        Some((url, fragment)) => (url, Some(fragment)),
        None => (href, None),
    };
    let path = without_fragment
        .split_once('?')
        .map_or(without_fragment, |(path, _)| path);
    let raw_filename = path.rsplit('/').next().unwrap_or(path);
    let filename = percent_decode_str(raw_filename)
        .decode_utf8_lossy()
        .into_owned();

    let mut entry = FileEntry {
        filename,
        url: without_fragment.to_string(),
        ..FileEntry::default()
    };

    if let Some((algo, value)) = fragment.and_then(|f| f.split_once('=')) {
        entry.hashes.insert(algo.to_ascii_lowercase(), value.to_string());
    }
    if let Some(Some(requires)) = attrs.get("data-requires-python") {
        entry.requires_python = Some(unescape(requires));
    }
    if let Some(reason) = attrs.get("data-yanked") {
        entry.yanked = true;
        entry.yanked_reason = reason.clone();
    }
    let metadata = attrs
        .get("data-core-metadata")
        .or_else(|| attrs.get("data-dist-info-metadata"));
    entry.metadata = match metadata {
        None => MetadataAvailability::Absent,
        Some(Some(value)) if value != "true" => match value.split_once('=') {
            Some((algo, hash)) if algo.eq_ignore_ascii_case("sha256") => Sha256Hash::new(hash)
                .map_or(MetadataAvailability::Available, MetadataAvailability::Hashed),
            _ => MetadataAvailability::Available,
        },
        Some(_) => MetadataAvailability::Available,
    };

    Some(entry)
}

pub(crate) fn parse(
    name: &PackageName,
    url: &str,
    body: &str,
) -> Result<ProjectInfo, IndexError> {
    let mut files = Vec::new();
    for caps in TAG_RE.captures_iter(body) {
        let attrs = attributes(&caps[2]);
        if caps[1].eq_ignore_ascii_case("meta") {
            let is_version = attrs
                .get("name")
                .and_then(Option::as_deref)
                .is_some_and(|n| n == "pypi:repository-version");
            if let (true, Some(Some(version))) = (is_version, attrs.get("content")) {
                check_api_version(url, version)?;
            }
            continue;
        }
        if let Some(entry) = file_from_anchor(&attrs) {
            files.push(entry);
        }
    }

    Ok(project_from_files(name.clone(), url, files))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unescape() {
        assert_eq!(unescape("&gt;=3.8, &lt;4"), ">=3.8, <4");
        assert_eq!(unescape("a&#38;b&#x26;c&amp;d"), "a&b&c&d");
        assert_eq!(unescape("&bogus;"), "&bogus;");
    }

    #[test]
    fn test_anchor_attributes() {
        let body = r#"
<html><body>
<A HREF="../../packages/demo-1.0%2Blocal-py3-none-any.whl#SHA256=9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08"
   data-requires-python="&gt;=3.9" data-yanked data-dist-info-metadata="sha256=9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08">demo</A>
<a href='demo-0.9-py3-none-any.whl' data-core-metadata="true">demo-0.9-py3-none-any.whl</a>
<a>no href</a>
</body></html>"#;
        let project =
            parse(&PackageName::new("demo"), "https://i.example/simple/demo/", body).unwrap();
        assert_eq!(project.name, "demo");
        assert_eq!(project.releases.len(), 2);

        let releases: Vec<_> = project.releases.values().collect();
        let old = &releases[0].artifacts[0];
        assert_eq!(old.url, "https://i.example/simple/demo/demo-0.9-py3-none-any.whl");
        assert_eq!(old.metadata, MetadataAvailability::Available);
        assert!(!old.yanked);

        let local = &releases[1].artifacts[0];
        assert_eq!(local.filename, "demo-1.0+local-py3-none-any.whl");
        assert_eq!(
            local.url,
            "https://i.example/packages/demo-1.0%2Blocal-py3-none-any.whl"
        );
        assert!(local.hash.is_some());
        assert_eq!(local.requires_python.as_deref(), Some(">=3.9"));
        assert!(local.yanked);
        assert!(local.yanked_reason.is_none());
        assert!(matches!(local.metadata, MetadataAvailability::Hashed(_)));
    }

    #[test]
    fn test_repository_version_check() {
        let future = r#"<meta name="pypi:repository-version" content="2.0"><a href="x-1.0-py3-none-any.whl">x</a>"#;
        assert!(matches!(
            parse(&PackageName::new("x"), "https://i/x/", future),
            Err(IndexError::UnsupportedFormat { .. })
        ));

        let newer_minor = r#"<meta name="pypi:repository-version" content="1.3"><a href="x-1.0-py3-none-any.whl">x</a>"#;
        assert_eq!(
            parse(&PackageName::new("x"), "https://i/x/", newer_minor)
                .unwrap()
                .releases
                .len(),
            1
        );
    }
}
