//! Network collaborator used by the index client and the resolver.
//!
//! The engine only sees the [`Fetcher`] trait; [`HttpFetcher`] is the
//! default implementation over `reqwest`.

use std::collections::BTreeMap;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client;
use sha2::{Digest, Sha256};
use thiserror::Error;
use wheelhouse_schema::Sha256Hash;

/// Response headers with lower-cased names.
pub type Headers = BTreeMap<String, String>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("HTTP {status} fetching {url}")]
    Status { url: String, status: u16 },

    #[error("network error fetching {url}: {message}")]
    Transport { url: String, message: String },
}

impl FetchError {
    /// `true` when the server answered 404.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Status { status: 404, .. })
    }

    fn transport(url: &str, err: &reqwest::Error) -> Self {
        Self::Transport {
            url: url.to_string(),
            message: err.to_string(),
        }
    }
}

/// Basic-auth credentials attached to every request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: Option<String>,
}

/// Per-request options forwarded to the fetcher.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchOptions {
    pub headers: Vec<(String, String)>,
    pub credentials: Option<Credentials>,
}

impl FetchOptions {
    /// Copy of these options with one extra header.
    pub fn with_header(&self, name: &str, value: &str) -> Self {
        let mut options = self.clone();
        if !options
            .headers
            .iter()
            .any(|(k, _)| k.eq_ignore_ascii_case(name))
        {
            options.headers.push((name.to_string(), value.to_string()));
        }
        options
    }
}

#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch a URL as raw bytes.
    async fn fetch_bytes(&self, url: &str, options: &FetchOptions) -> Result<Bytes, FetchError>;

    /// Fetch a URL as text together with its response headers.
    async fn fetch_text_and_headers(
        &self,
        url: &str,
        options: &FetchOptions,
    ) -> Result<(String, Headers), FetchError>;
}

#[async_trait]
impl<T: Fetcher + ?Sized> Fetcher for std::sync::Arc<T> {
    async fn fetch_bytes(&self, url: &str, options: &FetchOptions) -> Result<Bytes, FetchError> {
        (**self).fetch_bytes(url, options).await
    }

    async fn fetch_text_and_headers(
        &self,
        url: &str,
        options: &FetchOptions,
    ) -> Result<(String, Headers), FetchError> {
        (**self).fetch_text_and_headers(url, options).await
    }
}

/// [`Fetcher`] over a shared `reqwest` client.
#[derive(Debug, Clone, Default)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    async fn send(&self, url: &str, options: &FetchOptions) -> Result<reqwest::Response, FetchError> {
        let mut request = self
            .client
            .get(url)
            .header(reqwest::header::USER_AGENT, crate::USER_AGENT);
        for (name, value) in &options.headers {
            request = request.header(name.as_str(), value.as_str());
        }
        if let Some(creds) = &options.credentials {
            request = request.basic_auth(&creds.username, creds.password.as_ref());
        }

        let response = request
            .send()
            .await
            .map_err(|e| FetchError::transport(url, &e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch_bytes(&self, url: &str, options: &FetchOptions) -> Result<Bytes, FetchError> {
        tracing::debug!("GET {url}");
        let response = self.send(url, options).await?;
        response
            .bytes()
            .await
            .map_err(|e| FetchError::transport(url, &e))
    }

    async fn fetch_text_and_headers(
        &self,
        url: &str,
        options: &FetchOptions,
    ) -> Result<(String, Headers), FetchError> {
        tracing::debug!("GET {url}");
        let response = self.send(url, options).await?;
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect();
        let text = response
            .text()
            .await
            .map_err(|e| FetchError::transport(url, &e))?;
        Ok((text, headers))
    }
}

/// SHA-256 digest of `data`.
pub fn sha256(data: &[u8]) -> Sha256Hash {
    let mut hasher = Sha256::new();
    hasher.update(data);
    Sha256Hash::from_digest(&hasher.finalize())
}

/// Compare `data` against an expected digest, returning the actual digest on
/// mismatch.
///
/// # Errors
///
/// Returns the computed digest when it differs from `expected`.
pub fn verify_sha256(data: &[u8], expected: &Sha256Hash) -> Result<(), Sha256Hash> {
    let actual = sha256(data);
    if actual == *expected {
        Ok(())
    } else {
        Err(actual)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Server;

    #[tokio::test]
    async fn test_fetch_text_and_headers() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/simple/six/")
            .match_header("accept", "text/html")
            .with_status(200)
            .with_header("Content-Type", "text/html; charset=utf-8")
            .with_body("<html></html>")
            .create_async()
            .await;

        let fetcher = HttpFetcher::new();
        let options = FetchOptions::default().with_header("Accept", "text/html");
        let (text, headers) = fetcher
            .fetch_text_and_headers(&format!("{}/simple/six/", server.url()), &options)
            .await
            .unwrap();

        assert_eq!(text, "<html></html>");
        assert_eq!(headers["content-type"], "text/html; charset=utf-8");
    }

    #[tokio::test]
    async fn test_fetch_reports_status() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/missing")
            .with_status(404)
            .create_async()
            .await;

        let err = HttpFetcher::new()
            .fetch_bytes(&format!("{}/missing", server.url()), &FetchOptions::default())
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_fetch_sends_basic_auth() {
        let mut server = Server::new_async().await;
        // "user:secret"
        let _m = server
            .mock("GET", "/private.whl")
            .match_header("authorization", "Basic dXNlcjpzZWNyZXQ=")
            .with_status(200)
            .with_body("wheel-bytes")
            .create_async()
            .await;

        let options = FetchOptions {
            credentials: Some(Credentials {
                username: "user".to_string(),
                password: Some("secret".to_string()),
            }),
            ..FetchOptions::default()
        };
        let body = HttpFetcher::new()
            .fetch_bytes(&format!("{}/private.whl", server.url()), &options)
            .await
            .unwrap();
        assert_eq!(&body[..], b"wheel-bytes");
    }

    #[test]
    fn test_verify_sha256() {
        let digest = sha256(b"test");
        assert_eq!(
            digest.as_str(),
            "9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08"
        );
        assert!(verify_sha256(b"test", &digest).is_ok());
        assert_eq!(verify_sha256(b"other", &digest), Err(sha256(b"other")));
    }
}
