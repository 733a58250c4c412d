mod auth;
mod config;
mod context;
mod docs;
mod errors;
pub mod logging;
mod metrics;
mod queues;
mod rooms;
mod schemas;
mod serialized;

use std::{
    net::{Ipv6Addr, SocketAddr},
    sync::Arc,
    thread,
};

use axum::routing::get;
use log::info;
use thiserror::Error;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};

use mixtape_core::{
    Downloader, HttpDownloader, Mixtape, NullDownloader, OpaqueTokenIssuer, PgStore, StoreError,
};

pub use config::{Config, ConfigError};
pub use context::{Engine, ServerContext};

/// The default port the server will listen on.
pub const DEFAULT_PORT: u16 = 9050;

pub type Router = axum::Router<ServerContext>;

#[derive(Debug, Error)]
pub enum StartError {
    #[error("Could not initialize store: {0}")]
    Store(#[from] StoreError),
}

impl StartError {
    pub fn hint(&self) -> String {
        match self {
            StartError::Store(_) => {
                "This is a store error. Make sure the Postgres instance behind MIXTAPE_DATABASE_URL is properly installed and running, then try again.".to_string()
            }
        }
    }
}

/// Starts the mixtape server
pub async fn run_server(config: Config) -> Result<(), StartError> {
    info!("Connecting to store...");
    let store = PgStore::new(&config.database_url).await?;

    let downloader: Arc<dyn Downloader> = match &config.downloader_url {
        Some(url) => Arc::new(HttpDownloader::new(url)),
        None => Arc::new(NullDownloader),
    };

    let engine = Arc::new(Mixtape::new(
        store,
        Arc::new(OpaqueTokenIssuer::new()),
        downloader,
    ));

    // Surface engine notifications in the log until a bus consumer attaches
    let events = engine.events();
    thread::spawn(move || {
        for event in events.iter() {
            info!("{event:?}");
        }
    });

    let context = ServerContext { engine };

    let addr: SocketAddr = (Ipv6Addr::UNSPECIFIED, config.port).into();

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let version_one_router = Router::new()
        .nest("/auth", auth::router())
        .nest("/rooms", rooms::router())
        .nest("/queues", queues::router())
        .nest("/metrics", metrics::router());

    let root_router = Router::new()
        .nest("/v1", version_one_router)
        .route("/health", get(health))
        .route("/api.json", get(docs::docs))
        .layer(cors)
        .with_state(context);

    let listener = TcpListener::bind(&addr).await.expect("listens on address");

    info!("Listening on port {}", config.port);

    axum::serve(listener, root_router.into_make_service())
        .await
        .expect("server runs");

    Ok(())
}

async fn health() -> &'static str {
    "OK"
}
