//! Nostr transport for the book-exchange protocol: a long-lived subscriber
//! pool (one worker per relay, supervised and relaunched as a group) plus
//! short-lived publish connections for outgoing requests and responses.

pub mod error;
pub mod event;
pub mod keys;
pub mod relay;
pub mod supervisor;

pub use error::{NostrError, Result};
pub use event::{build_request_event, build_response_event, parse_response_content, request_event_id_of, REQUEST_KIND, RESPONSE_KIND};
pub use keys::load_or_generate;

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use athenaeum_core::{RequestContent, ResponseBookWire};
use futures_util::SinkExt;
use nostr::{Event, Keys};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::relay::RelayWorker;
use crate::supervisor::Supervisor;

const EVENTS_CHANNEL_CAPACITY: usize = 100;
const PUBLISH_TIMEOUT: Duration = Duration::from_secs(10);

/// Ties together identity, the supervised relay pool, and the responder
/// reputation counter into one handle the rest of the application drives.
pub struct NostrClient {
    keys: Keys,
    relay_urls: Vec<String>,
    events_rx: mpsc::Receiver<Event>,
    cancel: CancellationToken,
    reputation: Mutex<HashMap<String, u32>>,
}

impl NostrClient {
    /// Spawns the supervisor and its relay worker pool as background tasks.
    /// The returned client's `events_rx` yields every response event any
    /// relay forwards, deduplication is the caller's responsibility.
    pub fn start(keys: Keys, relay_urls: Vec<String>) -> Self {
        let (events_tx, events_rx) = mpsc::channel(EVENTS_CHANNEL_CAPACITY);
        let cancel = CancellationToken::new();

        let supervisor = Supervisor::new(relay_urls.clone(), events_tx, cancel.clone());
        tokio::spawn(supervisor.run());

        Self {
            keys,
            relay_urls,
            events_rx,
            cancel,
            reputation: Mutex::new(HashMap::new()),
        }
    }

    pub fn public_key_hex(&self) -> String {
        self.keys.public_key().to_hex()
    }

    /// Awaits the next forwarded response event. `None` once the client has
    /// shut down and the channel has drained.
    pub async fn recv(&mut self) -> Option<Event> {
        self.events_rx.recv().await
    }

    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Builds, signs, and broadcasts a request event to every configured
    /// relay. Returns the signed event so the caller can persist it via
    /// `NostrRepository::insert_request`.
    pub async fn publish_request(&self, content: &RequestContent) -> Result<Event> {
        let event = build_request_event(&self.keys, content)?;
        self.broadcast(&event).await;
        Ok(event)
    }

    /// Builds, signs, and broadcasts a response event replying to
    /// `request_event_id`.
    pub async fn publish_response(&self, request_event_id: &str, books: &[ResponseBookWire]) -> Result<Event> {
        let event = build_response_event(&self.keys, request_event_id, books)?;
        self.broadcast(&event).await;
        Ok(event)
    }

    /// Best-effort fan-out: opens a short-lived connection to each relay,
    /// sends the event, and moves on. A single unreachable relay never fails
    /// the whole publish.
    async fn broadcast(&self, event: &Event) {
        let msg = nostr::ClientMessage::event(event.clone()).as_json();
        for url in &self.relay_urls {
            if let Err(e) = publish_to_one(url, &msg).await {
                warn!(relay = %url, error = %e, "failed to publish event");
            }
        }
    }

    /// Increments the responder's successful-delivery count. Used to weight
    /// which responders are preferred when the same book is offered by more
    /// than one peer.
    pub fn record_successful_download(&self, responder_pubkey: &str) {
        let mut reputation = self.reputation.lock().unwrap_or_else(|e| e.into_inner());
        *reputation.entry(responder_pubkey.to_string()).or_insert(0) += 1;
    }

    pub fn reputation_of(&self, responder_pubkey: &str) -> u32 {
        let reputation = self.reputation.lock().unwrap_or_else(|e| e.into_inner());
        reputation.get(responder_pubkey).copied().unwrap_or(0)
    }
}

async fn publish_to_one(url: &str, msg: &str) -> Result<()> {
    let (ws_stream, _) = timeout(PUBLISH_TIMEOUT, connect_async(url)).await.map_err(|_| {
        NostrError::MalformedContent(format!("connect timeout: {url}"))
    })??;
    let (mut write, _read) = futures_util::StreamExt::split(ws_stream);
    write.send(Message::Text(msg.to_string())).await?;
    write.close().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reputation_counter_starts_at_zero_and_increments() {
        let client = NostrClient {
            keys: Keys::generate(),
            relay_urls: vec![],
            events_rx: mpsc::channel::<Event>(1).1,
            cancel: CancellationToken::new(),
            reputation: Mutex::new(HashMap::new()),
        };
        assert_eq!(client.reputation_of("peer1"), 0);
        client.record_successful_download("peer1");
        client.record_successful_download("peer1");
        assert_eq!(client.reputation_of("peer1"), 2);
    }
}

/// Fetches a book offered over a response event from its IPFS CID into a
/// local staging path. Rejects malformed inputs before touching the
/// network; the caller is expected to re-run the ingest pipeline afterward.
pub async fn download(
    ipfs: &athenaeum_ipfs::IpfsClient,
    book: &ResponseBookWire,
    dest: &std::path::Path,
) -> Result<()> {
    if !book.is_valid() {
        return Err(NostrError::MalformedContent("response book missing required fields".to_string()));
    }
    let cid = book
        .ipfs_cid
        .as_deref()
        .filter(|c| !c.is_empty())
        .ok_or_else(|| NostrError::MalformedContent("response book missing ipfs_cid".to_string()))?;
    if dest.exists() {
        return Ok(());
    }
    ipfs.get(cid, dest)
        .await
        .map_err(|e| NostrError::MalformedContent(e.to_string()))
}
