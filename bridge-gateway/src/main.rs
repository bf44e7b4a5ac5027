//! Gateway entry point: settings, tracing, component wiring, and the HTTP
//! server with graceful shutdown.

use std::sync::Arc;

use bridge_client::RumqttConnector;
use bridge_core::{ConnectionCache, ConnectionProvider, MessagePublisher, StreamBridge};
use bridge_gateway::{handle_rejection, routes, AppContext, Settings};
use bridge_store::{ConfigStore, SledStore};
use tracing::info;
use tracing_subscriber::EnvFilter;
use warp::Filter;

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("bridge-gateway failed: {err}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    init_tracing();

    let settings = Settings::load()?;
    let config = settings.bridge_config();
    config.validate()?;

    let store: Arc<dyn ConfigStore> = Arc::new(SledStore::open(&settings.store.path)?);
    let connector = Arc::new(RumqttConnector::new(settings.rumqtt_options()));
    let credentials = Arc::new(settings.credentials.clone());

    let cache = Arc::new(ConnectionCache::new(
        Arc::clone(&store),
        connector,
        credentials,
        &config,
    ));
    let provider: Arc<dyn ConnectionProvider> = cache;

    let context = Arc::new(AppContext {
        store,
        publisher: Arc::new(MessagePublisher::new(Arc::clone(&provider), config.clone())),
        bridge: Arc::new(StreamBridge::new(Arc::clone(&provider), config)),
    });

    let filter = routes(context).recover(handle_rejection);
    let addr = settings.bind_addr()?;

    let (bound, server) = warp::serve(filter).bind_with_graceful_shutdown(addr, async {
        let _ = tokio::signal::ctrl_c().await;
    });

    info!(addr = %bound, "bridge gateway listening");
    server.await;

    info!("shutting down, evicting broker connections");
    provider.evict_all().await;
    info!("shutdown complete");
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
