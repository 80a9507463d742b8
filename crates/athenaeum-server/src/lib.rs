//! HTTP/OPDS catalog surface: route wiring, pagination and auth decisions,
//! identicon generation, and the background revision/progress endpoints.
//! Atom/XML serialization and template markup are a rendering concern and
//! live outside this crate's scope.

pub mod auth;
pub mod handlers;
pub mod identicon;
pub mod opds;
pub mod pagination;
pub mod state;

pub use state::AppState;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(handlers::catalog::index))
        .route("/book/:id", get(handlers::catalog::book_detail))
        .route("/author/:id", get(handlers::catalog::by_author))
        .route("/s/:name", get(handlers::catalog::by_series))
        .route("/tag/:name", get(handlers::catalog::by_tag))
        .route("/authors", get(handlers::catalog::authors_index))
        .route("/tags", get(handlers::catalog::tags_index))
        .route("/covers/:hash", get(handlers::artifacts::cover))
        .route("/notes/:hash", get(handlers::artifacts::note))
        .route("/opds", get(handlers::opds::root))
        .route("/opds/authors", get(handlers::opds::authors))
        .route("/opds/series", get(handlers::opds::series))
        .route("/opds/tags", get(handlers::opds::tags))
        .route("/opds/author/:id", get(handlers::opds::by_author))
        .route("/opds/s/:name", get(handlers::opds::by_series))
        .route("/opds/tag/:name", get(handlers::opds::by_tag))
        .route("/opds/all", get(handlers::opds::all_books))
        .route("/opds-download/:id/:filename", get(handlers::artifacts::download))
        .route("/identicon/:segment", get(handlers::artifacts::identicon_png))
        .route("/upload", post(handlers::upload::upload))
        .route("/save/book/:id", post(handlers::admin::save_book))
        .route("/save/book/:id/cover", post(handlers::admin::save_book_cover))
        .route("/save/author/:id", post(handlers::admin::save_author))
        .route("/save/series/:name", post(handlers::admin::save_series))
        .route("/delete/book/:id", post(handlers::admin::delete_book))
        .route("/request", get(handlers::request::list_active).post(handlers::request::submit))
        .route("/revision", post(handlers::revision::start_revision))
        .route("/progress", get(handlers::revision::progress))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

/// Runs the HTTP server until `cancel` fires, observing OS INT/TERM signals
/// as an additional shutdown trigger.
pub async fn serve(
    state: Arc<AppState>,
    addr: std::net::SocketAddr,
    cancel: CancellationToken,
) -> std::io::Result<()> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "athenaeum-server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let ctrl_c = async {
                tokio::signal::ctrl_c().await.ok();
            };
            #[cfg(unix)]
            let terminate = async {
                if let Ok(mut sig) = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                    sig.recv().await;
                }
            };
            #[cfg(not(unix))]
            let terminate = std::future::pending::<()>();

            tokio::select! {
                _ = ctrl_c => {}
                _ = terminate => {}
                _ = cancel.cancelled() => {}
            }
        })
        .await
}
