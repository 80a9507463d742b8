//! One worker per configured relay: connect, subscribe to response events,
//! forward them onto a shared channel, and reconnect with backoff on failure.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use nostr::{ClientMessage, Event, Filter, Kind, RelayMessage, SubscriptionId, Timestamp};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::Result;
use crate::event::RESPONSE_KIND;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(30);
const SUBSCRIPTION_WINDOW: i64 = 3600;

/// Status reports a worker sends to the supervisor, distinct from the
/// forwarded protocol events themselves.
#[derive(Debug, Clone)]
pub enum RelayStatus {
    Connected(String),
    Failed(String),
}

pub struct RelayWorker {
    pub url: String,
    pub events_tx: mpsc::Sender<Event>,
    pub status_tx: mpsc::Sender<RelayStatus>,
    pub cancel: CancellationToken,
}

impl RelayWorker {
    /// Runs until cancelled, reconnecting with exponential backoff on every
    /// failure and resetting the backoff after each successful session.
    pub async fn run(self) {
        let mut backoff = INITIAL_BACKOFF;
        while !self.cancel.is_cancelled() {
            match self.connect_and_subscribe().await {
                Ok(()) => {
                    backoff = INITIAL_BACKOFF;
                }
                Err(e) => {
                    warn!(relay = %self.url, error = %e, "relay worker failed, backing off");
                    let _ = self.status_tx.send(RelayStatus::Failed(self.url.clone())).await;
                    tokio::select! {
                        _ = tokio::time::sleep(backoff) => {}
                        _ = self.cancel.cancelled() => break,
                    }
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                }
            }
        }
    }

    async fn connect_and_subscribe(&self) -> Result<()> {
        let (ws_stream, _) = timeout(CONNECT_TIMEOUT, connect_async(&self.url))
            .await
            .map_err(|_| crate::error::NostrError::MalformedContent(format!("connect timeout: {}", self.url)))??;
        info!(relay = %self.url, "connected");
        let _ = self.status_tx.send(RelayStatus::Connected(self.url.clone())).await;

        let (mut write, mut read) = ws_stream.split();

        let since = Timestamp::now() - SUBSCRIPTION_WINDOW;
        let filter = Filter::new().kind(Kind::Custom(RESPONSE_KIND)).since(since);
        let req = ClientMessage::req(SubscriptionId::generate(), vec![filter]);
        write.send(Message::Text(req.as_json())).await?;

        loop {
            tokio::select! {
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => self.handle_text(&text).await,
                        Some(Ok(Message::Close(_))) | None => return Ok(()),
                        Some(Ok(_)) => {}
                        Some(Err(e)) => return Err(e.into()),
                    }
                }
                _ = self.cancel.cancelled() => {
                    let _ = write.close().await;
                    return Ok(());
                }
            }
        }
    }

    async fn handle_text(&self, text: &str) {
        let Ok(msg) = RelayMessage::from_json(text) else { return };
        if let RelayMessage::Event { event, .. } = msg {
            if event.kind != Kind::Custom(RESPONSE_KIND) {
                return;
            }
            if self.events_tx.try_send((*event).clone()).is_err() {
                warn!(relay = %self.url, "event channel full, dropping newest event");
            }
        }
    }
}
