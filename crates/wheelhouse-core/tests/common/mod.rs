//! In-memory package index for engine tests.
#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet};
use std::io::{Cursor, Write};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::{Value, json};
use wheelhouse_core::fetch::{FetchError, FetchOptions, Fetcher, Headers, sha256};
use wheelhouse_schema::WheelFilename;

pub const INDEX_URL: &str = "https://index.test/simple/";
pub const FILES_URL: &str = "https://files.test/";

enum Publish {
    SideChannel,
    WheelOnly,
    Tampered,
}

/// Serves PEP 691 listings for the wheels added to it.
#[derive(Default)]
pub struct FakeIndex {
    listings: BTreeMap<String, Vec<Value>>,
    files: BTreeMap<String, Bytes>,
    blocked: BTreeSet<String>,
    requests: Mutex<Vec<String>>,
    cancelled: AtomicUsize,
}

struct CancelGuard<'a>(&'a AtomicUsize);

impl Drop for CancelGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

impl FakeIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// A wheel whose metadata is also served next to it.
    pub fn wheel(self, filename: &str, requires: &[&str]) -> Self {
        self.publish(filename, requires, &[], Publish::SideChannel)
    }

    pub fn wheel_with_extras(self, filename: &str, requires: &[&str], extras: &[&str]) -> Self {
        self.publish(filename, requires, extras, Publish::SideChannel)
    }

    /// A wheel without a metadata side-channel.
    pub fn wheel_only(self, filename: &str, requires: &[&str]) -> Self {
        self.publish(filename, requires, &[], Publish::WheelOnly)
    }

    /// A wheel whose served bytes do not match the listed hash.
    pub fn tampered(self, filename: &str, requires: &[&str]) -> Self {
        self.publish(filename, requires, &[], Publish::Tampered)
    }

    /// A listing entry that is never parsed as a wheel before it is served.
    pub fn raw_entry(mut self, project: &str, filename: &str) -> Self {
        self.listings.entry(project.to_string()).or_default().push(json!({
            "filename": filename,
            "url": format!("{FILES_URL}{filename}"),
            "hashes": {},
        }));
        self
    }

    /// Listing requests for `project` never complete.
    pub fn block(mut self, project: &str) -> Self {
        self.blocked.insert(project.to_string());
        self
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    pub fn was_requested(&self, url: &str) -> bool {
        self.requests().iter().any(|r| r == url)
    }

    /// Number of blocked requests dropped before they finished.
    pub fn cancelled(&self) -> usize {
        self.cancelled.load(Ordering::SeqCst)
    }

    fn publish(mut self, filename: &str, requires: &[&str], extras: &[&str], mode: Publish) -> Self {
        let wheel = WheelFilename::parse(filename).unwrap();
        let metadata = metadata_text(filename, &wheel, requires, extras);
        let data = Bytes::from(build_wheel(filename, &wheel, &metadata));
        let url = format!("{FILES_URL}{filename}");

        let mut entry = json!({
            "filename": filename,
            "url": url,
            "hashes": {"sha256": sha256(&data).to_string()},
        });
        let served = match mode {
            Publish::SideChannel => {
                entry["core-metadata"] = json!({"sha256": sha256(metadata.as_bytes()).to_string()});
                self.files
                    .insert(format!("{url}.metadata"), Bytes::from(metadata));
                data
            }
            Publish::WheelOnly => data,
            Publish::Tampered => Bytes::from_static(b"not the wheel that was hashed"),
        };
        self.files.insert(url, served);
        self.listings
            .entry(wheel.name.to_string())
            .or_default()
            .push(entry);
        self
    }

    fn not_found(url: &str) -> FetchError {
        FetchError::Status {
            url: url.to_string(),
            status: 404,
        }
    }
}

#[async_trait]
impl Fetcher for FakeIndex {
    async fn fetch_bytes(&self, url: &str, _: &FetchOptions) -> Result<Bytes, FetchError> {
        self.requests.lock().unwrap().push(url.to_string());
        self.files
            .get(url)
            .cloned()
            .ok_or_else(|| Self::not_found(url))
    }

    async fn fetch_text_and_headers(
        &self,
        url: &str,
        _: &FetchOptions,
    ) -> Result<(String, Headers), FetchError> {
        self.requests.lock().unwrap().push(url.to_string());
        // Suspend like a real request so concurrent branches interleave.
        tokio::task::yield_now().await;
        let Some(project) = url.strip_prefix(INDEX_URL).map(|p| p.trim_end_matches('/')) else {
            return Err(Self::not_found(url));
        };
        if self.blocked.contains(project) {
            let _guard = CancelGuard(&self.cancelled);
            std::future::pending::<()>().await;
        }
        let Some(files) = self.listings.get(project) else {
            return Err(Self::not_found(url));
        };

        let body = json!({
            "meta": {"api-version": "1.1"},
            "name": project,
            "files": files,
        });
        let headers = Headers::from([(
            "content-type".to_string(),
            "application/vnd.pypi.simple.v1+json".to_string(),
        )]);
        Ok((body.to_string(), headers))
    }
}

fn metadata_text(filename: &str, wheel: &WheelFilename, requires: &[&str], extras: &[&str]) -> String {
    let mut text = format!(
        "Metadata-Version: 2.1\nName: {}\nVersion: {}\n",
        filename.split('-').next().unwrap(),
        wheel.version_text
    );
    for extra in extras {
        text.push_str(&format!("Provides-Extra: {extra}\n"));
    }
    for req in requires {
        text.push_str(&format!("Requires-Dist: {req}\n"));
    }
    text
}

fn build_wheel(filename: &str, wheel: &WheelFilename, metadata: &str) -> Vec<u8> {
    let dist = filename.split('-').next().unwrap();
    let mut buf = Cursor::new(Vec::new());
    {
        let mut writer = zip::ZipWriter::new(&mut buf);
        let options = zip::write::SimpleFileOptions::default();
        writer
            .start_file(format!("{dist}/__init__.py"), options)
            .unwrap();
        writer
            .start_file(
                format!("{dist}-{}.dist-info/METADATA", wheel.version_text),
                options,
            )
            .unwrap();
        writer.write_all(metadata.as_bytes()).unwrap();
        writer.finish().unwrap();
    }
    buf.into_inner()
}
