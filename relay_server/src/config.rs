//! Configuration loading.
//!
//! Precedence: inline JSON in `RELAY_CONFIG_JSON`, then the file named by
//! `RELAY_CONFIG_PATH` (default `config.json`), then built-in defaults. Single
//! fields can then be overridden with the `RELAY_*` variables and `PORT`.
//! A source that is missing or malformed is skipped with a log line.

use crate::error::{RelayError, Result};
use aggregator::AggregatorConfig;
use connector_kraken::rest::OHLC_INTERVALS;
use log::{debug, info, warn};
use serde::{Deserialize, Deserializer};
use std::path::Path;
use std::time::Duration;

pub const CONFIG_JSON_ENV: &str = "RELAY_CONFIG_JSON";
pub const CONFIG_PATH_ENV: &str = "RELAY_CONFIG_PATH";
pub const DEFAULT_CONFIG_PATH: &str = "config.json";

pub const DEFAULT_UNIVERSE: &str = "BTC,ETH,SOL,XRP,LINK,ADA,DOGE,AVAX,ATOM,TRX";
pub const DEFAULT_QUOTES: &str = "USD,USDT,EUR,USDC";
pub const DEFAULT_FALLBACK_VENUES: &str = "coinbase,kucoin,bitstamp,gateio,coingecko";
pub const KNOWN_VENUES: [&str; 5] = ["coinbase", "kucoin", "bitstamp", "gateio", "coingecko"];

/// Kraken caps `count` on `/Depth` at 500.
const MAX_DEPTH_COUNT: usize = 500;

/// Base URLs of the upstream venues; overridden in tests.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct VenueUrls {
    pub kraken: String,
    pub coinbase: String,
    pub kucoin: String,
    pub bitstamp: String,
    pub gateio: String,
    pub coingecko: String,
}

impl Default for VenueUrls {
    fn default() -> Self {
        VenueUrls {
            kraken: connector_kraken::rest::KRAKEN_REST_URL.to_string(),
            coinbase: connector_coinbase::rest::COINBASE_REST_URL.to_string(),
            kucoin: connector_kucoin::rest::KUCOIN_REST_URL.to_string(),
            bitstamp: connector_bitstamp::rest::BITSTAMP_REST_URL.to_string(),
            gateio: connector_gateio::rest::GATEIO_REST_URL.to_string(),
            coingecko: connector_coingecko::rest::COINGECKO_REST_URL.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    #[serde(deserialize_with = "list_or_csv")]
    pub universe: Vec<String>,
    #[serde(deserialize_with = "list_or_csv", alias = "quotes")]
    pub quote_prefs: Vec<String>,
    pub depth_count: usize,
    pub whale_usd_floor: f64,
    pub ohlc_interval_min: u32,
    pub momentum_window: usize,
    pub snapshot_ttl_secs: u64,
    pub poll_interval_secs: u64,
    pub metadata_ttl_secs: u64,
    pub request_timeout_secs: u64,
    #[serde(deserialize_with = "list_or_csv")]
    pub fallback_venues: Vec<String>,
    pub port: u16,
    pub urls: VenueUrls,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            universe: split_csv(DEFAULT_UNIVERSE),
            quote_prefs: split_csv(DEFAULT_QUOTES),
            depth_count: 20,
            whale_usd_floor: 100_000.0,
            ohlc_interval_min: 15,
            momentum_window: 4,
            snapshot_ttl_secs: 15,
            poll_interval_secs: 10,
            metadata_ttl_secs: 300,
            request_timeout_secs: 10,
            fallback_venues: split_csv(DEFAULT_FALLBACK_VENUES),
            port: 10000,
            urls: VenueUrls::default(),
        }
    }
}

fn split_csv(s: &str) -> Vec<String> {
    s.split(',').map(|p| p.trim().to_string()).filter(|p| !p.is_empty()).collect()
}

/// Lists may be written as JSON arrays or as comma-separated strings.
fn list_or_csv<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum ListOrCsv {
        List(Vec<String>),
        Csv(String),
    }
    Ok(match ListOrCsv::deserialize(deserializer)? {
        ListOrCsv::List(v) => v,
        ListOrCsv::Csv(s) => split_csv(&s),
    })
}

fn normalize_list(items: &[String], upper: bool) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(items.len());
    for item in items {
        let t = item.trim();
        if t.is_empty() {
            continue;
        }
        let t = if upper { t.to_uppercase() } else { t.to_lowercase() };
        if !out.contains(&t) {
            out.push(t);
        }
    }
    out
}

impl AppConfig {
    /// Upper-case and de-duplicate symbols, drop unknown venues, clamp numeric ranges.
    pub fn normalize(&mut self) {
        let defaults = AppConfig::default();
        self.universe = normalize_list(&self.universe, true);
        if self.universe.is_empty() {
            warn!("empty universe, using defaults");
            self.universe = defaults.universe;
        }
        self.quote_prefs = normalize_list(&self.quote_prefs, true);
        if self.quote_prefs.is_empty() {
            warn!("empty quote preferences, using defaults");
            self.quote_prefs = defaults.quote_prefs;
        }
        let venues = normalize_list(&self.fallback_venues, false);
        self.fallback_venues = venues
            .into_iter()
            .filter(|v| {
                let known = KNOWN_VENUES.contains(&v.as_str());
                if !known {
                    warn!("ignoring unknown fallback venue {}", v);
                }
                known
            })
            .collect();
        self.depth_count = self.depth_count.clamp(1, MAX_DEPTH_COUNT);
        if !self.whale_usd_floor.is_finite() || self.whale_usd_floor < 0.0 {
            warn!("invalid whale_usd_floor {}, using default", self.whale_usd_floor);
            self.whale_usd_floor = defaults.whale_usd_floor;
        }
        if !OHLC_INTERVALS.contains(&self.ohlc_interval_min) {
            warn!("kraken has no {}-minute candles, using default", self.ohlc_interval_min);
            self.ohlc_interval_min = defaults.ohlc_interval_min;
        }
        if self.momentum_window == 0 {
            self.momentum_window = defaults.momentum_window;
        }
        if self.request_timeout_secs == 0 {
            self.request_timeout_secs = defaults.request_timeout_secs;
        }
    }

    /// Apply the single-field `RELAY_*` / `PORT` overrides. Unparsable values are ignored.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("RELAY_UNIVERSE") {
            self.universe = split_csv(&v);
        }
        if let Ok(v) = std::env::var("RELAY_QUOTE_PREFS") {
            self.quote_prefs = split_csv(&v);
        }
        if let Ok(v) = std::env::var("RELAY_FALLBACK_VENUES") {
            self.fallback_venues = split_csv(&v);
        }
        override_parsed("RELAY_DEPTH_COUNT", &mut self.depth_count);
        override_parsed("RELAY_WHALE_USD_FLOOR", &mut self.whale_usd_floor);
        override_parsed("RELAY_POLL_INTERVAL_SECS", &mut self.poll_interval_secs);
        override_parsed("PORT", &mut self.port);
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn aggregator_config(&self) -> AggregatorConfig {
        AggregatorConfig {
            universe: self.universe.clone(),
            quotes: self.quote_prefs.clone(),
            depth_count: self.depth_count,
            whale_usd_floor: self.whale_usd_floor,
            ohlc_interval_min: self.ohlc_interval_min,
            momentum_window: self.momentum_window,
            snapshot_ttl: Duration::from_secs(self.snapshot_ttl_secs),
            poll_interval: Duration::from_secs(self.poll_interval_secs),
        }
    }
}

fn override_parsed<T: std::str::FromStr>(var: &str, slot: &mut T) {
    if let Ok(raw) = std::env::var(var) {
        match raw.trim().parse::<T>() {
            Ok(v) => *slot = v,
            Err(_) => warn!("ignoring {}={:?}: not a valid value", var, raw),
        }
    }
}

/// Parse a JSON config document; absent fields take their defaults.
pub fn load_config_from_str(raw: &str) -> Result<AppConfig> {
    let cfg: AppConfig = serde_json::from_str(raw)?;
    Ok(cfg)
}

pub fn load_config_from_path(path: impl AsRef<Path>) -> Result<AppConfig> {
    let raw = std::fs::read_to_string(path.as_ref())?;
    load_config_from_str(&raw).map_err(|e| RelayError::Config(format!("{}: {}", path.as_ref().display(), e)))
}

fn base_config() -> AppConfig {
    if let Ok(raw) = std::env::var(CONFIG_JSON_ENV) {
        match load_config_from_str(&raw) {
            Ok(cfg) => {
                info!("config loaded from {}", CONFIG_JSON_ENV);
                return cfg;
            }
            Err(e) => warn!("malformed {}: {}", CONFIG_JSON_ENV, e),
        }
    }
    let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    match load_config_from_path(&path) {
        Ok(cfg) => {
            info!("config loaded from {}", path);
            return cfg;
        }
        Err(RelayError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => debug!("no config file at {}", path),
        Err(e) => warn!("config file skipped: {}", e),
    }
    info!("using built-in config defaults");
    AppConfig::default()
}

/// Resolve the effective configuration. Never fails: bad sources fall back to defaults.
pub fn load_config() -> AppConfig {
    let mut cfg = base_config();
    cfg.apply_env_overrides();
    cfg.normalize();
    cfg
}
