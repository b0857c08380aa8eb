// Server entrypoint: config → store → gateway client → lifecycle → router.

use std::sync::Arc;

use log::info;
use tokio::net::TcpListener;

use zapdesk::api::{self, AppState};
use zapdesk::config::AppConfig;
use zapdesk::engine::gateway::{Gateway, HttpGateway};
use zapdesk::engine::lifecycle::Lifecycle;
use zapdesk::engine::store::Store;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = AppConfig::from_env();
    info!("[main] Zapdesk {} starting", env!("CARGO_PKG_VERSION"));
    info!("[main] Gateway at {}", config.gateway.base_url);

    let store = Arc::new(Store::open(&config.db_path)?);
    let gateway: Arc<dyn Gateway> = Arc::new(HttpGateway::new(&config.gateway)?);
    let lifecycle = Arc::new(Lifecycle::new(store.clone(), gateway, config.lifecycle.clone()));

    let state = AppState {
        store,
        lifecycle,
        auth: config.auth.clone(),
    };

    let listener = TcpListener::bind(&config.bind_addr).await?;
    info!("[main] Listening on http://{}/api", config.bind_addr);
    axum::serve(listener, api::router(state)).await?;
    Ok(())
}
