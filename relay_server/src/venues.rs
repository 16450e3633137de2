//! Builds the upstream clients named in the config.

use crate::config::AppConfig;
use connector_bitstamp::BitstampClient;
use connector_coinbase::CoinbaseClient;
use connector_coingecko::CoingeckoClient;
use connector_gateio::GateioClient;
use connector_kraken::KrakenClient;
use connector_kucoin::KucoinClient;
use connectors_common::venue::PriceVenue;
use log::info;
use std::sync::Arc;
use std::time::Duration;

pub fn kraken_client(cfg: &AppConfig) -> KrakenClient {
    KrakenClient::new(&cfg.urls.kraken)
        .with_timeout(cfg.request_timeout())
        .with_metadata_ttl(Duration::from_secs(cfg.metadata_ttl_secs))
}

/// Fallback venues in configured order. Unknown names were dropped by `AppConfig::normalize`.
pub fn fallback_venues(cfg: &AppConfig) -> Vec<Arc<dyn PriceVenue>> {
    let timeout = cfg.request_timeout();
    let venues: Vec<Arc<dyn PriceVenue>> = cfg
        .fallback_venues
        .iter()
        .filter_map(|name| -> Option<Arc<dyn PriceVenue>> {
            match name.as_str() {
                "coinbase" => Some(Arc::new(CoinbaseClient::new(&cfg.urls.coinbase).with_timeout(timeout))),
                "kucoin" => Some(Arc::new(KucoinClient::new(&cfg.urls.kucoin).with_timeout(timeout))),
                "bitstamp" => Some(Arc::new(BitstampClient::new(&cfg.urls.bitstamp).with_timeout(timeout))),
                "gateio" => Some(Arc::new(GateioClient::new(&cfg.urls.gateio).with_timeout(timeout))),
                "coingecko" => Some(Arc::new(CoingeckoClient::new(&cfg.urls.coingecko).with_timeout(timeout))),
                _ => None,
            }
        })
        .collect();
    info!("fallback venues: {:?}", venues.iter().map(|v| v.name()).collect::<Vec<_>>());
    venues
}
