//! Standalone companion process: subscribes to the same Nostr relays as the
//! main catalog server and keeps a capped in-memory log of offered books, so
//! an operator can watch what's circulating without running the full server.
//! Serves that log as JSON; no HTML/visual layer (out of scope here).

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::{Arc, RwLock};

use anyhow::{Context, Result};
use athenaeum_core::ResponseBookWire;
use athenaeum_nostr::NostrClient;
use axum::extract::State;
use axum::response::{IntoResponse, Json};
use axum::routing::get;
use axum::Router;
use clap::Parser;
use serde::Serialize;
use tracing::{info, warn};

/// Offers older than this are evicted once the log exceeds capacity.
const CAPTURE_CAPACITY: usize = 500;

#[derive(Parser)]
#[command(name = "smelloscope", about = "Watches the book-exchange Nostr stream", version)]
struct Cli {
    /// Relay URLs to subscribe to.
    #[arg(long = "relay", required = true)]
    relays: Vec<String>,

    /// Address to serve the dashboard JSON endpoint on.
    #[arg(long, default_value = "0.0.0.0:8090")]
    addr: SocketAddr,
}

#[derive(Debug, Clone, Serialize)]
struct CapturedOffer {
    responder_pubkey: String,
    received_at: i64,
    books: Vec<ResponseBookWire>,
}

struct DashboardState {
    offers: RwLock<VecDeque<CapturedOffer>>,
}

impl DashboardState {
    fn new() -> Self {
        Self { offers: RwLock::new(VecDeque::with_capacity(CAPTURE_CAPACITY)) }
    }

    fn record(&self, offer: CapturedOffer) {
        let mut offers = self.offers.write().unwrap();
        offers.push_front(offer);
        offers.truncate(CAPTURE_CAPACITY);
    }

    fn snapshot(&self) -> Vec<CapturedOffer> {
        self.offers.read().unwrap().iter().cloned().collect()
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    let (keys, _) = athenaeum_nostr::load_or_generate(None).context("generating watcher identity")?;
    let mut nostr_client = NostrClient::start(keys, cli.relays.clone());
    info!(pubkey = %nostr_client.public_key_hex(), relays = ?cli.relays, "smelloscope watching");

    let state = Arc::new(DashboardState::new());
    let recv_state = state.clone();
    tokio::spawn(async move {
        while let Some(event) = nostr_client.recv().await {
            handle_event(&recv_state, &event);
        }
    });

    let app = Router::new()
        .route("/", get(offers))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(cli.addr).await?;
    info!(addr = %cli.addr, "smelloscope dashboard listening");
    axum::serve(listener, app).await?;
    Ok(())
}

fn handle_event(state: &Arc<DashboardState>, event: &nostr::Event) {
    let books = match athenaeum_nostr::parse_response_content(&event.content) {
        Ok(books) => books,
        Err(e) => {
            warn!(error = %e, "discarding malformed offer");
            return;
        }
    };
    let valid: Vec<_> = books.into_iter().filter(ResponseBookWire::is_valid).collect();
    if valid.is_empty() {
        return;
    }
    state.record(CapturedOffer {
        responder_pubkey: event.pubkey.to_hex(),
        received_at: chrono::Utc::now().timestamp(),
        books: valid,
    });
}

async fn offers(State(state): State<Arc<DashboardState>>) -> impl IntoResponse {
    Json(state.snapshot())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_book() -> ResponseBookWire {
        ResponseBookWire {
            id: None,
            title: "Dune".to_string(),
            authors: vec!["Frank Herbert".to_string()],
            series: None,
            series_number: None,
            file_type: athenaeum_core::FileType::Epub,
            file_hash: "0123456789abcdef".to_string(),
            file_size: 100,
            ipfs_cid: Some("Qm123".to_string()),
        }
    }

    #[test]
    fn record_prepends_newest_first() {
        let state = DashboardState::new();
        state.record(CapturedOffer { responder_pubkey: "a".to_string(), received_at: 1, books: vec![sample_book()] });
        state.record(CapturedOffer { responder_pubkey: "b".to_string(), received_at: 2, books: vec![sample_book()] });

        let snapshot = state.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].responder_pubkey, "b");
    }

    #[test]
    fn record_evicts_oldest_past_capacity() {
        let state = DashboardState::new();
        for i in 0..CAPTURE_CAPACITY + 10 {
            state.record(CapturedOffer {
                responder_pubkey: i.to_string(),
                received_at: i as i64,
                books: vec![sample_book()],
            });
        }
        let snapshot = state.snapshot();
        assert_eq!(snapshot.len(), CAPTURE_CAPACITY);
        assert_eq!(snapshot[0].responder_pubkey, (CAPTURE_CAPACITY + 9).to_string());
    }
}
