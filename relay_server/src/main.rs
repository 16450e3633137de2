use log::{error, info};
use relay_server::{load_config, start_server, AppState};

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = load_config();
    info!(
        "universe={:?} quotes={:?} depth={} whale_floor=${} fallback={:?}",
        config.universe, config.quote_prefs, config.depth_count, config.whale_usd_floor, config.fallback_venues
    );
    let port = config.port;
    let state = AppState::new(config);
    let _poller = state.aggregator.spawn_poller();

    if let Err(e) = start_server(state, port).await {
        error!("server stopped: {}", e);
        std::process::exit(1);
    }
}
