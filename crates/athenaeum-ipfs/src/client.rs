//! Thin wrapper over a local Kubo-compatible IPFS daemon's HTTP API.

use std::path::Path;

use serde::Deserialize;
use tracing::warn;

use crate::error::{IpfsError, Result};

#[derive(Debug, Deserialize)]
struct AddResponse {
    #[serde(rename = "Hash")]
    hash: String,
}

#[derive(Debug, Deserialize)]
struct VersionResponse {
    #[serde(rename = "Version")]
    #[allow(dead_code)]
    version: String,
}

/// Async client for the three operations the system needs against a local
/// daemon: add (pin), get, unpin, plus an availability probe.
pub struct IpfsClient {
    http: reqwest::Client,
    api_base: String,
}

impl IpfsClient {
    pub fn new(api_base: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_base: api_base.trim_end_matches('/').to_string(),
        }
    }

    /// Adds the file at `path` to the daemon with `pin=true`, returning its CID.
    pub async fn add(&self, path: &Path) -> Result<String> {
        let bytes = tokio::fs::read(path).await?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "file".to_string());

        let part = reqwest::multipart::Part::bytes(bytes).file_name(filename);
        let form = reqwest::multipart::Form::new().part("file", part);

        let url = format!("{}/api/v0/add?pin=true", self.api_base);
        let resp = self.http.post(&url).multipart(form).send().await?;
        if !resp.status().is_success() {
            return Err(IpfsError::DaemonError(format!("add: HTTP {}", resp.status())));
        }
        let body: AddResponse = resp
            .json()
            .await
            .map_err(|e| IpfsError::BadResponse(e.to_string()))?;
        Ok(body.hash)
    }

    /// Streams `cid`'s content to `dest`.
    pub async fn get(&self, cid: &str, dest: &Path) -> Result<()> {
        let url = format!("{}/api/v0/cat?arg={cid}", self.api_base);
        let resp = self.http.post(&url).send().await?;
        if !resp.status().is_success() {
            return Err(IpfsError::DaemonError(format!("get: HTTP {}", resp.status())));
        }
        let bytes = resp.bytes().await?;
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(dest, bytes).await?;
        Ok(())
    }

    pub async fn unpin(&self, cid: &str) -> Result<()> {
        let url = format!("{}/api/v0/pin/rm?arg={cid}", self.api_base);
        let resp = self.http.post(&url).send().await?;
        if !resp.status().is_success() {
            return Err(IpfsError::DaemonError(format!("unpin: HTTP {}", resp.status())));
        }
        Ok(())
    }

    /// Probes the daemon's `version` endpoint. A failure here is non-fatal —
    /// callers use it to decide whether to disable IPFS-dependent features.
    pub async fn is_available(&self) -> bool {
        let url = format!("{}/api/v0/version", self.api_base);
        match self.http.post(&url).send().await {
            Ok(resp) if resp.status().is_success() => {
                resp.json::<VersionResponse>().await.is_ok()
            }
            Ok(resp) => {
                warn!(status = %resp.status(), "ipfs version probe returned non-success");
                false
            }
            Err(e) => {
                warn!(error = %e, "ipfs daemon unreachable during probe");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn add_posts_multipart_and_parses_hash() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("POST", "/api/v0/add")
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_body(r#"{"Name":"book.epub","Hash":"QmTest123","Size":"10"}"#)
            .create_async()
            .await;

        let dir = TempDir::new().unwrap();
        let file = dir.path().join("book.epub");
        std::fs::write(&file, b"hello").unwrap();

        let client = IpfsClient::new(&server.url());
        let cid = client.add(&file).await.unwrap();
        assert_eq!(cid, "QmTest123");
    }

    #[tokio::test]
    async fn is_available_false_on_daemon_error() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("POST", "/api/v0/version")
            .with_status(500)
            .create_async()
            .await;

        let client = IpfsClient::new(&server.url());
        assert!(!client.is_available().await);
    }

    #[tokio::test]
    async fn unpin_errors_on_non_success_status() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("POST", "/api/v0/pin/rm")
            .match_query(mockito::Matcher::Any)
            .with_status(500)
            .create_async()
            .await;

        let client = IpfsClient::new(&server.url());
        let err = client.unpin("QmTest123").await.unwrap_err();
        assert!(matches!(err, IpfsError::DaemonError(_)));
    }
}
