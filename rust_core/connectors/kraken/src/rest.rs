use crate::symbols::{pick_pair, AssetIndex, PairIndex, ResolvedPair};
use connectors_common::errors::{ConnectorError, ConnectorResult};
use connectors_common::http::{as_f64, build_client, get_json, DEFAULT_TIMEOUT};
use connectors_common::types::{now_ms, Candle, OrderBookLevel, OrderBookSnapshot, Quote};
use log::{debug, info};
use reqwest::Client;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

pub const KRAKEN_REST_URL: &str = "https://api.kraken.com";
pub const DEFAULT_METADATA_TTL: Duration = Duration::from_secs(300);
/// Candle widths, in minutes, that `/OHLC` accepts.
pub const OHLC_INTERVALS: [u32; 9] = [1, 5, 15, 30, 60, 240, 1440, 10080, 21600];

type Cached<T> = Option<(Arc<T>, Instant)>;

/// Kraken public REST client. Asset and pair metadata are cached for `metadata_ttl`.
pub struct KrakenClient {
    client: Client,
    base_url: String,
    metadata_ttl: Duration,
    assets: Mutex<Cached<AssetIndex>>,
    pairs: Mutex<Cached<PairIndex>>,
}

impl Default for KrakenClient {
    fn default() -> Self {
        Self::new(KRAKEN_REST_URL)
    }
}

impl KrakenClient {
    pub fn new(base_url: &str) -> Self {
        KrakenClient {
            client: build_client(DEFAULT_TIMEOUT),
            base_url: base_url.trim_end_matches('/').to_string(),
            metadata_ttl: DEFAULT_METADATA_TTL,
            assets: Mutex::new(None),
            pairs: Mutex::new(None),
        }
    }

    pub fn with_metadata_ttl(mut self, ttl: Duration) -> Self {
        self.metadata_ttl = ttl;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.client = build_client(timeout);
        self
    }

    /// Call a public method and unwrap Kraken's `{error, result}` envelope.
    async fn public(&self, method: &str, query: &[(&str, String)]) -> ConnectorResult<Value> {
        let url = format!("{}/0/public/{}", self.base_url, method);
        let mut body = get_json(&self.client, &url, query).await?;
        if let Some(errs) = body.get("error").and_then(|e| e.as_array()) {
            if !errs.is_empty() {
                let msg: Vec<&str> = errs.iter().filter_map(|e| e.as_str()).collect();
                if msg.iter().any(|m| m.starts_with("EQuery:Unknown")) {
                    return Err(ConnectorError::NotFound(msg.join(",")));
                }
                return Err(ConnectorError::Api(msg.join(",")));
            }
        }
        match body.get_mut("result") {
            Some(result) => Ok(result.take()),
            None => Err(ConnectorError::Parse(format!("kraken {} response has no result", method))),
        }
    }

    pub async fn assets(&self) -> ConnectorResult<Arc<AssetIndex>> {
        let mut guard = self.assets.lock().await;
        if let Some((idx, at)) = guard.as_ref() {
            if at.elapsed() < self.metadata_ttl {
                return Ok(idx.clone());
            }
        }
        let idx = Arc::new(AssetIndex::from_result(&self.public("Assets", &[]).await?));
        info!("kraken assets refreshed: {} altnames", idx.len());
        *guard = Some((idx.clone(), Instant::now()));
        Ok(idx)
    }

    pub async fn asset_pairs(&self) -> ConnectorResult<Arc<PairIndex>> {
        let mut guard = self.pairs.lock().await;
        if let Some((idx, at)) = guard.as_ref() {
            if at.elapsed() < self.metadata_ttl {
                return Ok(idx.clone());
            }
        }
        let idx = Arc::new(PairIndex::from_result(&self.public("AssetPairs", &[]).await?));
        info!("kraken asset pairs refreshed: {} pairs", idx.len());
        *guard = Some((idx.clone(), Instant::now()));
        Ok(idx)
    }

    /// Resolve every symbol of `universe`; returns `(resolved, skipped)` in universe order.
    pub async fn resolve_universe(
        &self,
        universe: &[String],
        quotes: &[String],
    ) -> ConnectorResult<(Vec<ResolvedPair>, Vec<String>)> {
        let assets = self.assets().await?;
        let pairs = self.asset_pairs().await?;
        let mut resolved = Vec::new();
        let mut skipped = Vec::new();
        for sym in universe {
            match pick_pair(&assets, &pairs, sym, quotes) {
                Some(p) => resolved.push(p),
                None => {
                    debug!("kraken has no pair for {}", sym);
                    skipped.push(sym.trim().to_uppercase());
                }
            }
        }
        Ok((resolved, skipped))
    }

    /// Last trade price per pair key. Pairs missing from the response are absent from the map.
    pub async fn tickers(&self, pair_keys: &[String]) -> ConnectorResult<HashMap<String, Quote>> {
        if pair_keys.is_empty() {
            return Ok(HashMap::new());
        }
        let result = self.public("Ticker", &[("pair", pair_keys.join(","))]).await?;
        let mut out = HashMap::new();
        if let Some(obj) = result.as_object() {
            for (key, t) in obj {
                if let Some(price) = t.get("c").and_then(|c| c.get(0)).and_then(as_f64) {
                    out.insert(key.clone(), Quote {
                        exchange: "kraken".to_string(),
                        pair: key.clone(),
                        price,
                        change_24h_pct: None,
                        ts: now_ms(),
                    });
                }
            }
        }
        Ok(out)
    }

    pub async fn depth(&self, pair_key: &str, count: usize) -> ConnectorResult<OrderBookSnapshot> {
        let result = self.public("Depth", &[("pair", pair_key.to_string()), ("count", count.to_string())]).await?;
        let book = pair_entry(&result, pair_key);
        Ok(OrderBookSnapshot {
            exchange: "kraken".to_string(),
            pair: pair_key.to_string(),
            bids: parse_levels(book.and_then(|b| b.get("bids"))),
            asks: parse_levels(book.and_then(|b| b.get("asks"))),
            ts: now_ms(),
        })
    }

    /// Candles oldest first, `interval` in minutes.
    pub async fn ohlc(&self, pair_key: &str, interval: u32) -> ConnectorResult<Vec<Candle>> {
        let result = self.public("OHLC", &[("pair", pair_key.to_string()), ("interval", interval.to_string())]).await?;
        let rows = pair_entry(&result, pair_key).and_then(|r| r.as_array());
        let mut candles = Vec::new();
        for row in rows.into_iter().flatten() {
            let time = row.get(0).and_then(|t| t.as_i64());
            let open = row.get(1).and_then(as_f64);
            let close = row.get(4).and_then(as_f64);
            if let (Some(time), Some(open), Some(close)) = (time, open, close) {
                candles.push(Candle { time, open, close });
            }
        }
        Ok(candles)
    }
}

/// Kraken keys results by pair key; if the echoed key differs, take the only pair entry.
fn pair_entry<'a>(result: &'a Value, pair_key: &str) -> Option<&'a Value> {
    if let Some(v) = result.get(pair_key) {
        return Some(v);
    }
    let obj = result.as_object()?;
    let mut entries = obj.iter().filter(|(k, _)| k.as_str() != "last");
    match (entries.next(), entries.next()) {
        (Some((_, v)), None) => Some(v),
        _ => None,
    }
}

fn parse_levels(side: Option<&Value>) -> Vec<OrderBookLevel> {
    side.and_then(|s| s.as_array())
        .map(|rows| {
            rows.iter()
                .filter_map(|row| {
                    let price = row.get(0).and_then(as_f64)?;
                    let qty = row.get(1).and_then(as_f64)?;
                    Some(OrderBookLevel { price, qty })
                })
                .collect()
        })
        .unwrap_or_default()
}
