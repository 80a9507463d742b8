use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use athenaeum_core::storage::repositories::{
    AuthorRepository, BookRepository, NostrRepository, SqliteAuthorRepository, SqliteBookRepository,
    SqliteNostrRepository, SqliteTagRepository, TagRepository,
};
use athenaeum_core::{open_database, AppConfig, Blacklist, IngestMode};
use athenaeum_ipfs::SyncIpfsPinner;
use athenaeum_nostr::NostrClient;
use athenaeum_server::AppState;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "athenaeum", about = "Self-hosted book catalog, Nostr exchange, and OPDS server", version, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output in JSON format.
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP/OPDS server and the Nostr relay pool.
    Serve {
        /// Address to bind the HTTP server to.
        #[arg(long, default_value = "0.0.0.0:8080")]
        addr: SocketAddr,
    },

    /// Ingest a single file into the catalog.
    Ingest {
        /// Path to the book file.
        path: PathBuf,

        /// What to do with the source file after a successful ingest.
        #[arg(long, default_value = "copy")]
        mode: IngestModeArg,
    },

    /// Run one revision pass (reconcile disk, catalog, and IPFS).
    Revision,

    /// Run startup diagnostics.
    Doctor,
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum IngestModeArg {
    Stay,
    Copy,
    Move,
}

impl From<IngestModeArg> for IngestMode {
    fn from(value: IngestModeArg) -> Self {
        match value {
            IngestModeArg::Stay => IngestMode::Stay,
            IngestModeArg::Copy => IngestMode::Copy,
            IngestModeArg::Move => IngestMode::Move,
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();
    let config = AppConfig::load().context("loading configuration")?;

    let result = match cli.command {
        Commands::Serve { addr } => run_serve(config, addr),
        Commands::Ingest { path, mode } => run_ingest(&config, &path, mode.into()),
        Commands::Revision => run_revision(&config),
        Commands::Doctor => run_doctor(&config, cli.json),
    };

    if let Err(e) = &result {
        error!(error = %e, "command failed");
        if let Some(core_err) = e.downcast_ref::<athenaeum_core::Error>() {
            std::process::exit(core_err.exit_code() as i32);
        }
        std::process::exit(athenaeum_core::ExitCode::Fatal as i32);
    }
    Ok(())
}

fn open_ipfs(config: &AppConfig) -> Option<SyncIpfsPinner> {
    match SyncIpfsPinner::new(&config.local_ipfs_api) {
        Ok(pinner) if pinner.is_available() => Some(pinner),
        Ok(_) => {
            warn!("IPFS daemon not reachable; IPFS-dependent features disabled");
            None
        }
        Err(e) => {
            warn!(error = %e, "failed to start IPFS client; IPFS-dependent features disabled");
            None
        }
    }
}

fn run_serve(mut config: AppConfig, addr: SocketAddr) -> Result<()> {
    let runtime = tokio::runtime::Runtime::new().context("starting tokio runtime")?;
    runtime.block_on(async move {
        let pool = open_database(&config.database_path()).context("opening database")?;
        let blacklist = Blacklist::load(&config.blacklist_path()).context("loading blacklist")?;
        let ipfs = open_ipfs(&config);

        let (keys, generated_privkey) =
            athenaeum_nostr::load_or_generate(config.nostr_privkey.as_deref()).context("loading Nostr keys")?;
        if let Some(privkey) = generated_privkey {
            config.nostr_privkey = Some(privkey);
            config.save().context("persisting generated Nostr key")?;
        }
        let mut nostr_client = NostrClient::start(keys, config.nostr_relays.clone());
        info!(pubkey = %nostr_client.public_key_hex(), "Nostr client started");

        let app_root = AppConfig::app_dir();
        let state = Arc::new(AppState::new(pool, config, blacklist, &app_root, ipfs));
        let cancel = CancellationToken::new();

        let listener_state = state.clone();
        let listener_cancel = cancel.clone();
        let listener_task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    event = nostr_client.recv() => {
                        match event {
                            Some(event) => handle_incoming_event(&listener_state, &event),
                            None => break,
                        }
                    }
                    _ = listener_cancel.cancelled() => break,
                }
            }
        });

        let serve_result = athenaeum_server::serve(state, addr, cancel.clone()).await;
        cancel.cancel();
        let _ = listener_task.await;
        serve_result.context("HTTP server error")
    })
}

/// Implements the write side of Nostr response intake: every valid,
/// non-blacklisted book offered in a response event is upserted against the
/// request it replies to.
fn handle_incoming_event(state: &Arc<AppState>, event: &nostr::Event) {
    if event.kind != nostr::Kind::Custom(athenaeum_nostr::RESPONSE_KIND) {
        return;
    }
    let Some(request_event_id) = athenaeum_nostr::request_event_id_of(event) else {
        return;
    };
    let books = match athenaeum_nostr::parse_response_content(&event.content) {
        Ok(books) => books,
        Err(e) => {
            warn!(error = %e, "discarding malformed Nostr response content");
            return;
        }
    };

    let responder_pubkey = event.pubkey.to_hex();
    let conn = state.pool.get_connection();
    let blacklist = state.blacklist.read().unwrap();
    let nostr_repo = SqliteNostrRepository::new(&conn);

    let accepted: Vec<_> = books
        .into_iter()
        .filter(|book| book.is_valid())
        .filter(|book| !blacklist.is_hash_blocked(&book.file_hash))
        .filter(|_| !blacklist.is_pubkey_blocked(&responder_pubkey))
        .collect();
    if accepted.is_empty() {
        return;
    }

    let raw_json = serde_json::to_string(&accepted).unwrap_or_default();
    let received_at = chrono::Utc::now().timestamp();
    match nostr_repo.insert_response(&request_event_id, &responder_pubkey, received_at, &event.content) {
        Ok(response_id) => {
            for book in &accepted {
                if let Err(e) = nostr_repo.upsert_response_book(response_id, book, &raw_json) {
                    warn!(error = %e, "failed to record offered book");
                }
            }
        }
        Err(e) => warn!(error = %e, "failed to record Nostr response"),
    }
}

fn run_ingest(config: &AppConfig, path: &std::path::Path, mode: IngestMode) -> Result<()> {
    let pool = open_database(&config.database_path()).context("opening database")?;
    let conn = pool.get_connection();
    let book_repo = SqliteBookRepository::new(&conn);
    let author_repo = SqliteAuthorRepository::new(&conn);
    let ipfs = open_ipfs(config);
    let ipfs_pinner: Option<&dyn athenaeum_core::IpfsPinner> =
        ipfs.as_ref().map(|p| p as &dyn athenaeum_core::IpfsPinner);

    let outcome = athenaeum_core::ingest_file(
        &book_repo,
        &author_repo,
        path,
        mode,
        &config.books_dir(),
        &config.covers_dir(),
        &config.notes_dir(),
        config.rename_book,
        ipfs_pinner,
    )
    .context("ingest failed")?;

    if outcome.deduped {
        println!("already exists, skip (hash {})", outcome.file_hash);
    } else {
        println!("ingested book #{} (hash {})", outcome.book_id, outcome.file_hash);
    }
    Ok(())
}

fn run_revision(config: &AppConfig) -> Result<()> {
    let pool = open_database(&config.database_path()).context("opening database")?;
    let conn = pool.get_connection();
    let book_repo = SqliteBookRepository::new(&conn);
    let author_repo = SqliteAuthorRepository::new(&conn);
    let tag_repo = SqliteTagRepository::new(&conn);
    let nostr_repo = SqliteNostrRepository::new(&conn);
    let ipfs = open_ipfs(config);
    let ipfs_pinner: Option<&dyn athenaeum_core::IpfsPinner> =
        ipfs.as_ref().map(|p| p as &dyn athenaeum_core::IpfsPinner);

    let progress = std::sync::RwLock::new(athenaeum_core::Progress::default());
    let summary = athenaeum_core::run_revision(
        &conn,
        &book_repo,
        &author_repo,
        &tag_repo,
        &nostr_repo,
        &config.books_dir(),
        &config.covers_dir(),
        &config.notes_dir(),
        config.rename_book,
        ipfs_pinner,
        chrono::Utc::now().timestamp(),
        &progress,
    );

    println!("revision complete:");
    println!("  deleted (missing files):   {}", summary.deleted_missing);
    println!("  ingested (new files):      {}", summary.ingested_new);
    println!("  renamed:                   {}", summary.renamed);
    println!("  orphan authors removed:    {}", summary.orphan_authors_removed);
    println!("  orphan tags removed:       {}", summary.orphan_tags_removed);
    println!("  covers generated:          {}", summary.covers_generated);
    println!("  annotations generated:     {}", summary.annotations_generated);
    println!("  pinned to IPFS:            {}", summary.pinned);
    println!("  untracked files deleted:   {}", summary.deleted_untracked_files);
    Ok(())
}

fn run_doctor(config: &AppConfig, json: bool) -> Result<()> {
    let mut issues = 0usize;
    let mut checks = Vec::new();

    let config_path = AppConfig::config_path();
    if config_path.exists() {
        checks.push(("config".to_string(), true, config_path.display().to_string()));
    } else {
        checks.push(("config".to_string(), true, "not found (using defaults)".to_string()));
    }

    let db_path = config.database_path();
    match open_database(&db_path) {
        Ok(pool) => {
            let conn = pool.get_connection();
            let count = SqliteBookRepository::new(&conn).count(&athenaeum_core::BookSearch {
                query_lower: None,
                over18_allowed: true,
                limit: 1,
                offset: 0,
            });
            let detail = match count {
                Ok(n) => format!("{} ({} books)", db_path.display(), n),
                Err(_) => db_path.display().to_string(),
            };
            checks.push(("database".to_string(), true, detail));
        }
        Err(e) => {
            issues += 1;
            checks.push(("database".to_string(), false, e.to_string()));
        }
    }

    let books_dir = config.books_dir();
    checks.push((
        "books_dir".to_string(),
        true,
        if books_dir.exists() {
            books_dir.display().to_string()
        } else {
            format!("{} (not created yet)", books_dir.display())
        },
    ));

    match SyncIpfsPinner::new(&config.local_ipfs_api) {
        Ok(pinner) if pinner.is_available() => {
            checks.push(("ipfs".to_string(), true, config.local_ipfs_api.clone()))
        }
        _ => checks.push(("ipfs".to_string(), true, "daemon unreachable (non-fatal)".to_string())),
    }

    if json {
        let items: Vec<_> = checks
            .iter()
            .map(|(name, ok, detail)| serde_json::json!({ "check": name, "ok": ok, "detail": detail }))
            .collect();
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({ "issues": issues, "checks": items }))?
        );
    } else {
        for (name, ok, detail) in &checks {
            let mark = if *ok { "ok" } else { "fail" };
            println!("[{mark}] {name}: {detail}");
        }
        if issues == 0 {
            println!("\nall checks passed");
        } else {
            println!("\n{issues} issue(s) found");
        }
    }

    if issues > 0 {
        std::process::exit(athenaeum_core::ExitCode::Fatal as i32);
    }
    Ok(())
}
