//! IPFS client adapter (C5): a thin async wrapper over a local daemon's HTTP
//! API, plus a synchronous bridge implementing `athenaeum_core::IpfsPinner`
//! for use from the (synchronous) ingest pipeline.

pub mod client;
pub mod error;

pub use client::IpfsClient;
pub use error::{IpfsError, Result};

use std::path::Path;

use athenaeum_core::IpfsPinner;

/// Wraps an [`IpfsClient`] with its own single-threaded runtime so the
/// synchronous ingest pipeline can pin a file without itself being async.
pub struct SyncIpfsPinner {
    client: IpfsClient,
    runtime: tokio::runtime::Runtime,
}

impl SyncIpfsPinner {
    pub fn new(api_base: &str) -> athenaeum_core::Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| athenaeum_core::Error::ExternalUnavailable(format!("failed to start ipfs runtime: {e}")))?;
        Ok(Self {
            client: IpfsClient::new(api_base),
            runtime,
        })
    }

    /// Non-fatal availability probe; callers disable IPFS-dependent features
    /// on `false` rather than failing startup.
    pub fn is_available(&self) -> bool {
        self.runtime.block_on(self.client.is_available())
    }

    pub fn unpin(&self, cid: &str) -> athenaeum_core::Result<()> {
        self.runtime
            .block_on(self.client.unpin(cid))
            .map_err(|e| athenaeum_core::Error::ExternalUnavailable(e.to_string()))
    }

    pub fn get(&self, cid: &str, dest: &Path) -> athenaeum_core::Result<()> {
        self.runtime
            .block_on(self.client.get(cid, dest))
            .map_err(|e| athenaeum_core::Error::ExternalUnavailable(e.to_string()))
    }
}

impl IpfsPinner for SyncIpfsPinner {
    fn pin(&self, path: &Path) -> athenaeum_core::Result<String> {
        self.runtime
            .block_on(self.client.add(path))
            .map_err(|e| athenaeum_core::Error::ExternalUnavailable(e.to_string()))
    }
}
