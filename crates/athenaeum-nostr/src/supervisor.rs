//! Watches the relay worker pool as a whole: tracks an active-relay counter
//! derived from connect/fail status reports, and performs a coordinated
//! relaunch of every worker once the pool has gone fully dark.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use nostr::Event;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::relay::{RelayStatus, RelayWorker};

const INITIAL_BACKOFF: Duration = Duration::from_secs(5);
const MAX_BACKOFF: Duration = Duration::from_secs(5 * 60);
const ERROR_FREE_RESET: Duration = Duration::from_secs(30 * 60);
const STATUS_CHANNEL_CAPACITY: usize = 64;

pub struct Supervisor {
    relay_urls: Vec<String>,
    events_tx: mpsc::Sender<Event>,
    cancel: CancellationToken,
}

impl Supervisor {
    pub fn new(relay_urls: Vec<String>, events_tx: mpsc::Sender<Event>, cancel: CancellationToken) -> Self {
        Self {
            relay_urls,
            events_tx,
            cancel,
        }
    }

    pub async fn run(self) {
        let mut relaunch_backoff = INITIAL_BACKOFF;
        let mut last_error_at = Instant::now();

        while !self.cancel.is_cancelled() {
            let active = Arc::new(AtomicI64::new(self.relay_urls.len() as i64));
            let (status_tx, mut status_rx) = mpsc::channel(STATUS_CHANNEL_CAPACITY);
            let mut handles = Vec::with_capacity(self.relay_urls.len());

            for url in &self.relay_urls {
                let worker = RelayWorker {
                    url: url.clone(),
                    events_tx: self.events_tx.clone(),
                    status_tx: status_tx.clone(),
                    cancel: self.cancel.clone(),
                };
                handles.push(tokio::spawn(worker.run()));
            }
            drop(status_tx);

            loop {
                tokio::select! {
                    status = status_rx.recv() => {
                        match status {
                            Some(RelayStatus::Connected(url)) => {
                                active.fetch_add(1, Ordering::SeqCst);
                                info!(relay = %url, "relay connected");
                            }
                            Some(RelayStatus::Failed(url)) => {
                                if last_error_at.elapsed() > ERROR_FREE_RESET {
                                    relaunch_backoff = INITIAL_BACKOFF;
                                }
                                last_error_at = Instant::now();
                                let remaining = active.fetch_sub(1, Ordering::SeqCst) - 1;
                                warn!(relay = %url, remaining, "relay failed");
                                if remaining <= 0 {
                                    break;
                                }
                            }
                            None => break,
                        }
                    }
                    _ = self.cancel.cancelled() => {
                        for handle in handles {
                            handle.abort();
                        }
                        return;
                    }
                }
            }

            warn!(backoff_secs = relaunch_backoff.as_secs(), "relay pool went dark, relaunching after backoff");
            for handle in handles {
                handle.abort();
            }

            tokio::select! {
                _ = tokio::time::sleep(relaunch_backoff) => {}
                _ = self.cancel.cancelled() => return,
            }
            relaunch_backoff = (relaunch_backoff * 2).min(MAX_BACKOFF);
        }
    }
}
