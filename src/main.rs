//! Place Back binary entrypoint wiring the snapshot route, the canvas WebSocket and the store.

use std::{env, net::SocketAddr, sync::Arc};

use anyhow::{Context, bail};
use axum::Router;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use place_back::{
    config::AppConfig,
    dao::kv_store::MemoryKeyValueStore,
    routes,
    services::notify_service::PlacementNotifier,
    state::{AppState, SharedState},
};

const DEFAULT_PORT: u16 = 37372;

/// Backing store selected through `PLACE_STORE`.
enum StoreBackend {
    Memory,
    Mongo { uri: String, db_name: Option<String> },
}

impl StoreBackend {
    /// `PLACE_STORE` wins; otherwise MongoDB is used whenever `MONGO_URI` is set.
    fn from_env() -> anyhow::Result<Self> {
        let mongo_uri = env::var("MONGO_URI").ok().filter(|uri| !uri.is_empty());
        let db_name = env::var("MONGO_DB").ok();

        match env::var("PLACE_STORE").ok().as_deref() {
            Some("memory") => Ok(Self::Memory),
            Some("mongodb") => Ok(Self::Mongo {
                uri: mongo_uri.unwrap_or_else(|| "mongodb://localhost:27017".into()),
                db_name,
            }),
            Some(other) => bail!("unknown PLACE_STORE `{other}` (expected `memory` or `mongodb`)"),
            None => Ok(match mongo_uri {
                Some(uri) if cfg!(feature = "mongo-store") => Self::Mongo { uri, db_name },
                _ => Self::Memory,
            }),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::load();
    let notifier = match env::var("PLACE_POST_PIXEL_URL") {
        Ok(url) if !url.is_empty() => {
            info!(%url, "placement notifications enabled");
            Some(PlacementNotifier::new(url).context("building placement notifier")?)
        }
        _ => None,
    };

    let app_state = AppState::new(config, notifier);
    start_store(app_state.clone(), StoreBackend::from_env()?).await?;

    // Build the HTTP router once the shared state is ready.
    let app = build_router(app_state);

    let port = env::var("PLACE_PORT")
        .or_else(|_| env::var("PORT"))
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(DEFAULT_PORT);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "starting server");

    let listener = TcpListener::bind(addr).await.context("binding server")?;
    let service = app.into_make_service_with_connect_info::<SocketAddr>();
    axum::serve(listener, service)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving axum")?;

    Ok(())
}

/// Install the in-memory store right away, or hand MongoDB to the storage supervisor which
/// keeps the service in degraded mode until it connects.
async fn start_store(state: SharedState, backend: StoreBackend) -> anyhow::Result<()> {
    match backend {
        StoreBackend::Memory => {
            info!("using in-memory store; canvas is lost on restart");
            state
                .install_store(Arc::new(MemoryKeyValueStore::new()))
                .await;
            Ok(())
        }
        #[cfg(feature = "mongo-store")]
        StoreBackend::Mongo { uri, db_name } => {
            spawn_mongo_supervisor(state, uri, db_name);
            Ok(())
        }
        #[cfg(not(feature = "mongo-store"))]
        StoreBackend::Mongo { .. } => {
            bail!("PLACE_STORE=mongodb requires building with the `mongo-store` feature")
        }
    }
}

#[cfg(feature = "mongo-store")]
fn spawn_mongo_supervisor(state: SharedState, uri: String, db_name: Option<String>) {
    use place_back::{
        dao::kv_store::{
            KeyValueStore,
            mongodb::{MongoConfig, MongoKeyValueStore},
        },
        dao::storage::StorageError,
        services::storage_supervisor,
    };

    info!("using MongoDB store");
    tokio::spawn(storage_supervisor::run(state, move || {
        let uri = uri.clone();
        let db_name = db_name.clone();
        async move {
            let config = MongoConfig::from_uri(&uri, db_name.as_deref()).await?;
            let store = MongoKeyValueStore::connect(config).await?;
            Ok::<_, StorageError>(Arc::new(store) as Arc<dyn KeyValueStore>)
        }
    }));
}

/// Build the top-level router and attach cross-cutting middleware layers.
fn build_router(state: SharedState) -> Router<()> {
    routes::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Configure tracing subscribers so logs include spans by default.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=debug".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Wait for Ctrl+C or SIGTERM and shut the server down gracefully.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = term.recv() => {},
                }
            }
            Err(err) => {
                tracing::warn!(error = %err, "failed to install SIGTERM handler; waiting for Ctrl+C");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
