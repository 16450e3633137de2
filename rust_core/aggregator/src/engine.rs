use crate::metrics::{bias_from_imbalance, change_24h, entry_levels, momentum, summarize_whales, Bias, EntryLevels, WhaleSummary};
use crate::snapshot::{SignalRow, Snapshot};
use connector_kraken::{KrakenClient, ResolvedPair};
use connectors_common::errors::ConnectorError;
use connectors_common::types::Quote;
use connectors_common::venue::PriceVenue;
use futures::stream::{self, StreamExt};
use log::{debug, info, warn};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

const NO_BOOK: &str = "No order book available.";
/// Per-symbol upstream fetches allowed in flight during one build.
const MAX_IN_FLIGHT: usize = 3;

#[derive(Debug, Clone)]
pub struct AggregatorConfig {
    /// Upper-case, de-duplicated tickers in display order.
    pub universe: Vec<String>,
    /// Preferred quote currencies, most preferred first.
    pub quotes: Vec<String>,
    pub depth_count: usize,
    pub whale_usd_floor: f64,
    pub ohlc_interval_min: u32,
    pub momentum_window: usize,
    pub snapshot_ttl: Duration,
    /// Zero disables the background poller.
    pub poll_interval: Duration,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        AggregatorConfig {
            universe: ["BTC", "ETH", "SOL", "XRP", "LINK", "ADA", "DOGE", "AVAX", "ATOM", "TRX"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            quotes: ["USD", "USDT", "EUR", "USDC"].iter().map(|s| s.to_string()).collect(),
            depth_count: 20,
            whale_usd_floor: 100_000.0,
            ohlc_interval_min: 15,
            momentum_window: 4,
            snapshot_ttl: Duration::from_secs(15),
            poll_interval: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone)]
pub struct UniverseStatus {
    pub resolved: Vec<ResolvedPair>,
    pub skipped: Vec<String>,
}

pub struct Aggregator {
    cfg: AggregatorConfig,
    kraken: Arc<KrakenClient>,
    venues: Vec<Arc<dyn PriceVenue>>,
    cache: RwLock<Option<(Arc<Snapshot>, Instant)>>,
    /// Last failed build with no previous snapshot to fall back on.
    failure: RwLock<Option<(String, Instant)>>,
    build_lock: Mutex<()>,
}

impl Aggregator {
    /// `venues` are asked, in order, for symbols Kraken cannot price.
    pub fn new(cfg: AggregatorConfig, kraken: KrakenClient, venues: Vec<Arc<dyn PriceVenue>>) -> Self {
        Aggregator {
            cfg,
            kraken: Arc::new(kraken),
            venues,
            cache: RwLock::new(None),
            failure: RwLock::new(None),
            build_lock: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &AggregatorConfig {
        &self.cfg
    }

    pub fn venue_names(&self) -> Vec<&'static str> {
        self.venues.iter().map(|v| v.name()).collect()
    }

    pub async fn universe_status(&self) -> Result<UniverseStatus, ConnectorError> {
        let (resolved, skipped) = self.kraken.resolve_universe(&self.cfg.universe, &self.cfg.quotes).await?;
        Ok(UniverseStatus { resolved, skipped })
    }

    /// Outcome of the last build attempt while younger than the TTL, failures included.
    async fn cached_fresh(&self) -> Option<Result<Arc<Snapshot>, ConnectorError>> {
        if let Some((snap, at)) = self.cache.read().await.as_ref() {
            if at.elapsed() < self.cfg.snapshot_ttl {
                return Some(Ok(snap.clone()));
            }
        }
        match self.failure.read().await.as_ref() {
            Some((msg, at)) if at.elapsed() < self.cfg.snapshot_ttl => Some(Err(ConnectorError::Other(msg.clone()))),
            _ => None,
        }
    }

    /// Cached snapshot while younger than the TTL, otherwise a fresh build.
    pub async fn snapshot(&self) -> Result<Arc<Snapshot>, ConnectorError> {
        if let Some(outcome) = self.cached_fresh().await {
            return outcome;
        }
        let _guard = self.build_lock.lock().await;
        // another caller may have rebuilt while we waited
        if let Some(outcome) = self.cached_fresh().await {
            return outcome;
        }
        self.rebuild_locked().await
    }

    /// Unconditional rebuild, used by the poller.
    pub async fn refresh(&self) -> Result<Arc<Snapshot>, ConnectorError> {
        let _guard = self.build_lock.lock().await;
        self.rebuild_locked().await
    }

    async fn rebuild_locked(&self) -> Result<Arc<Snapshot>, ConnectorError> {
        match self.build().await {
            Ok(snap) => {
                let snap = Arc::new(snap);
                *self.cache.write().await = Some((snap.clone(), Instant::now()));
                *self.failure.write().await = None;
                Ok(snap)
            }
            Err(e) => {
                let mut cache = self.cache.write().await;
                if let Some((prev, at)) = cache.as_mut() {
                    warn!("snapshot build failed, serving previous snapshot: {}", e);
                    // the previous snapshot stands in until the next TTL expiry
                    *at = Instant::now();
                    return Ok(prev.clone());
                }
                *self.failure.write().await = Some((e.to_string(), Instant::now()));
                Err(e)
            }
        }
    }

    pub fn spawn_poller(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        if self.cfg.poll_interval.is_zero() {
            info!("snapshot poller disabled");
            return None;
        }
        let agg = self.clone();
        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(agg.cfg.poll_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                match agg.refresh().await {
                    Ok(s) => info!("snapshot refreshed: {} rows, {} skipped", s.rows.len(), s.skipped.len()),
                    Err(e) => warn!("snapshot refresh failed: {}", e),
                }
            }
        }))
    }

    async fn build(&self) -> Result<Snapshot, ConnectorError> {
        let mut venues_failed: Vec<String> = Vec::new();

        let resolved = match self.kraken.resolve_universe(&self.cfg.universe, &self.cfg.quotes).await {
            Ok((resolved, _)) => resolved,
            Err(e) => {
                warn!("kraken symbol resolution failed: {}", e);
                push_unique(&mut venues_failed, "kraken");
                Vec::new()
            }
        };

        let keys: Vec<String> = resolved.iter().map(|p| p.pair_key.clone()).collect();
        let tickers = match self.kraken.tickers(&keys).await {
            Ok(t) => t,
            Err(e) => {
                warn!("kraken ticker fetch failed: {}", e);
                push_unique(&mut venues_failed, "kraken");
                HashMap::new()
            }
        };

        let kraken_rows: Vec<(Option<SignalRow>, bool)> = stream::iter(resolved.iter().map(|p| self.kraken_row(p, tickers.get(&p.pair_key))).collect::<Vec<_>>())
            .buffered(MAX_IN_FLIGHT)
            .collect()
            .await;
        let mut rows: HashMap<String, SignalRow> = HashMap::new();
        // Kraken rows without a price give way to any fallback venue that has one
        let mut unpriced: HashMap<String, SignalRow> = HashMap::new();
        for (row, failed) in kraken_rows {
            if failed {
                push_unique(&mut venues_failed, "kraken");
            }
            match row {
                Some(r) if r.price.is_some() => {
                    rows.insert(r.symbol.clone(), r);
                }
                Some(r) => {
                    unpriced.insert(r.symbol.clone(), r);
                }
                None => {}
            }
        }

        let missing: Vec<&String> = self.cfg.universe.iter().filter(|s| !rows.contains_key(s.as_str())).collect();
        let fallback: Vec<(Option<SignalRow>, Vec<&'static str>)> = stream::iter(missing.iter().map(|s| self.fallback_row(s)).collect::<Vec<_>>())
            .buffered(MAX_IN_FLIGHT)
            .collect()
            .await;
        for (sym, (row, failed)) in missing.iter().zip(fallback) {
            for name in failed {
                push_unique(&mut venues_failed, name);
            }
            match row.or_else(|| unpriced.remove(sym.as_str())) {
                Some(r) => {
                    rows.insert(r.symbol.clone(), r);
                }
                None => debug!("no venue priced {}", sym),
            }
        }

        let mut ordered = Vec::with_capacity(rows.len());
        let mut skipped = Vec::new();
        for sym in &self.cfg.universe {
            match rows.remove(sym) {
                Some(r) => ordered.push(r),
                None => skipped.push(sym.clone()),
            }
        }

        if ordered.is_empty() && !venues_failed.is_empty() {
            return Err(ConnectorError::Other(format!("no venue answered ({})", venues_failed.join(","))));
        }

        Ok(Snapshot { ts: chrono::Utc::now().timestamp(), rows: ordered, skipped, venues_failed })
    }

    /// Row for a Kraken-listed symbol; the flag reports an upstream failure.
    /// No row when Kraken returned nothing usable for the pair.
    async fn kraken_row(&self, pair: &ResolvedPair, ticker: Option<&Quote>) -> (Option<SignalRow>, bool) {
        let (depth, candles) = tokio::join!(
            self.kraken.depth(&pair.pair_key, self.cfg.depth_count),
            self.kraken.ohlc(&pair.pair_key, self.cfg.ohlc_interval_min),
        );
        let whales = match depth {
            Ok(book) => Some(summarize_whales(&book, self.cfg.whale_usd_floor)),
            Err(e) => {
                warn!("kraken depth for {} failed: {}", pair.pair_key, e);
                None
            }
        };
        let candles = match candles {
            Ok(c) => Some(c),
            Err(e) => {
                warn!("kraken ohlc for {} failed: {}", pair.pair_key, e);
                None
            }
        };
        let failed = whales.is_none() || candles.is_none();
        if ticker.is_none() && whales.is_none() && candles.is_none() {
            return (None, true);
        }
        let (change, mom) = match &candles {
            Some(c) => (change_24h(c, self.cfg.ohlc_interval_min), momentum(c, self.cfg.momentum_window)),
            None => (None, None),
        };
        let row = finish_row(
            SignalRow {
                symbol: pair.symbol.clone(),
                pair_key: Some(pair.pair_key.clone()),
                pair_alt: Some(pair.altname.clone()),
                price: ticker.map(|t| t.price),
                price_venue: Some("kraken".to_string()),
                change_24h_pct: change,
                momentum_pct: mom,
                ts: chrono::Utc::now().timestamp(),
                whales: None,
                bias: Bias::Hold,
                why: String::new(),
                entries: EntryLevels::default(),
            },
            whales,
        );
        (Some(row), failed)
    }

    /// First fallback venue that prices `symbol` wins. Returns the venues that errored.
    async fn fallback_row(&self, symbol: &str) -> (Option<SignalRow>, Vec<&'static str>) {
        let mut failed = Vec::new();
        for venue in &self.venues {
            let quote = match venue.fetch_quote(symbol, &self.cfg.quotes).await {
                Ok(Some(q)) => q,
                Ok(None) => continue,
                Err(e) => {
                    warn!("{} quote for {} failed: {}", venue.name(), symbol, e);
                    failed.push(venue.name());
                    continue;
                }
            };
            let whales = match venue.fetch_book(&quote.pair, self.cfg.depth_count).await {
                Ok(book) => book.map(|b| summarize_whales(&b, self.cfg.whale_usd_floor)),
                Err(e) => {
                    warn!("{} book for {} failed: {}", venue.name(), quote.pair, e);
                    failed.push(venue.name());
                    None
                }
            };
            let row = finish_row(
                SignalRow {
                    symbol: symbol.to_string(),
                    pair_key: None,
                    pair_alt: None,
                    price: Some(quote.price),
                    price_venue: Some(venue.name().to_string()),
                    change_24h_pct: quote.change_24h_pct,
                    momentum_pct: None,
                    ts: chrono::Utc::now().timestamp(),
                    whales: None,
                    bias: Bias::Hold,
                    why: String::new(),
                    entries: EntryLevels::default(),
                },
                whales,
            );
            return (Some(row), failed);
        }
        (None, failed)
    }
}

fn finish_row(mut row: SignalRow, whales: Option<WhaleSummary>) -> SignalRow {
    match whales {
        Some(w) => {
            let (bias, why) = bias_from_imbalance(w.bid_usd_total, w.ask_usd_total);
            row.entries = entry_levels(&w, bias);
            row.bias = bias;
            row.why = why;
            row.whales = Some(w);
        }
        None => {
            row.bias = Bias::Hold;
            row.why = NO_BOOK.to_string();
        }
    }
    row
}

fn push_unique(list: &mut Vec<String>, name: &str) {
    if !list.iter().any(|n| n == name) {
        list.push(name.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use connectors_common::errors::ConnectorResult;
    use mockito::{Matcher, Server, ServerGuard};

    struct FlakyVenue;

    #[async_trait]
    impl PriceVenue for FlakyVenue {
        fn name(&self) -> &'static str {
            "flaky"
        }
        async fn fetch_quote(&self, _base: &str, _quotes: &[String]) -> ConnectorResult<Option<Quote>> {
            Err(ConnectorError::Network("connection reset".into()))
        }
    }

    struct SolOnly;

    #[async_trait]
    impl PriceVenue for SolOnly {
        fn name(&self) -> &'static str {
            "solonly"
        }
        async fn fetch_quote(&self, base: &str, _quotes: &[String]) -> ConnectorResult<Option<Quote>> {
            if base != "SOL" {
                return Ok(None);
            }
            Ok(Some(Quote { exchange: "solonly".into(), pair: "SOL-USD".into(), price: 150.0, change_24h_pct: Some(2.0), ts: 0 }))
        }
    }

    struct BtcVenue;

    #[async_trait]
    impl PriceVenue for BtcVenue {
        fn name(&self) -> &'static str {
            "btcvenue"
        }
        async fn fetch_quote(&self, base: &str, _quotes: &[String]) -> ConnectorResult<Option<Quote>> {
            if base != "BTC" {
                return Ok(None);
            }
            Ok(Some(Quote { exchange: "btcvenue".into(), pair: "BTC-USD".into(), price: 123.0, change_24h_pct: None, ts: 0 }))
        }
    }

    fn cfg(universe: &[&str]) -> AggregatorConfig {
        AggregatorConfig {
            universe: universe.iter().map(|s| s.to_string()).collect(),
            quotes: vec!["USD".to_string()],
            depth_count: 10,
            whale_usd_floor: 100_000.0,
            snapshot_ttl: Duration::from_secs(60),
            poll_interval: Duration::ZERO,
            ..Default::default()
        }
    }

    async fn kraken_server() -> (ServerGuard, Vec<mockito::Mock>) {
        let mut server = Server::new_async().await;
        let mut mocks = Vec::new();
        mocks.push(
            server
                .mock("GET", "/0/public/Assets")
                .with_body(r#"{"error":[],"result":{"XXBT":{"altname":"XBT"},"ZUSD":{"altname":"USD"}}}"#)
                .create_async()
                .await,
        );
        mocks.push(
            server
                .mock("GET", "/0/public/AssetPairs")
                .with_body(r#"{"error":[],"result":{"XXBTZUSD":{"altname":"XBTUSD"}}}"#)
                .create_async()
                .await,
        );
        mocks.push(
            server
                .mock("GET", "/0/public/Ticker")
                .match_query(Matcher::Any)
                .with_body(r#"{"error":[],"result":{"XXBTZUSD":{"c":["50000.0","1"]}}}"#)
                .expect_at_least(1)
                .create_async()
                .await,
        );
        mocks.push(
            server
                .mock("GET", "/0/public/Depth")
                .match_query(Matcher::Any)
                .with_body(r#"{"error":[],"result":{"XXBTZUSD":{"bids":[["50000","10",1],["49990","0.1",1]],"asks":[["50010","1",1]]}}}"#)
                .create_async()
                .await,
        );
        mocks.push(
            server
                .mock("GET", "/0/public/OHLC")
                .match_query(Matcher::Any)
                .with_body(r#"{"error":[],"result":{"XXBTZUSD":[[1,"48000","0","0","48000","0","0",1],[2,"49000","0","0","49000","0","0",1],[3,"50000","0","0","50000","0","0",1]],"last":3}}"#)
                .create_async()
                .await,
        );
        (server, mocks)
    }

    #[tokio::test]
    async fn test_build_with_fallback_venues() {
        let (server, _mocks) = kraken_server().await;
        let venues: Vec<Arc<dyn PriceVenue>> = vec![Arc::new(FlakyVenue), Arc::new(SolOnly)];
        let agg = Aggregator::new(cfg(&["BTC", "SOL", "NOPE"]), KrakenClient::new(&server.url()), venues);

        let snap = agg.snapshot().await.unwrap();
        let symbols: Vec<&str> = snap.rows.iter().map(|r| r.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["BTC", "SOL"]);
        assert_eq!(snap.skipped, vec!["NOPE".to_string()]);
        assert_eq!(snap.venues_failed, vec!["flaky".to_string()]);

        let btc = snap.row("BTC").unwrap();
        assert_eq!(btc.price, Some(50000.0));
        assert_eq!(btc.pair_key.as_deref(), Some("XXBTZUSD"));
        assert_eq!(btc.bias, Bias::Buy);
        let whales = btc.whales.as_ref().unwrap();
        assert_eq!(whales.bids.len(), 1);
        assert!(whales.asks.is_empty());
        assert_eq!(btc.entries.suggested, Some(50000.0));
        // 48000 -> 50000
        assert!((btc.change_24h_pct.unwrap() - 4.1666666).abs() < 1e-3);

        let sol = snap.row("SOL").unwrap();
        assert_eq!(sol.price_venue.as_deref(), Some("solonly"));
        assert_eq!(sol.change_24h_pct, Some(2.0));
        assert_eq!(sol.why, NO_BOOK);
    }

    /// Kraken answering data calls with 503 while the cached metadata still resolves BTC.
    async fn fail_kraken_data(server: &mut ServerGuard, mocks: &[mockito::Mock]) -> Vec<mockito::Mock> {
        for m in &mocks[2..] {
            m.remove_async().await;
        }
        let mut down = Vec::new();
        for path in ["/0/public/Ticker", "/0/public/Depth", "/0/public/OHLC"] {
            down.push(server.mock("GET", path).match_query(Matcher::Any).with_status(503).create_async().await);
        }
        down
    }

    async fn ticker_once_server() -> (ServerGuard, Vec<mockito::Mock>) {
        let mut server = Server::new_async().await;
        let assets = server
            .mock("GET", "/0/public/Assets")
            .with_body(r#"{"error":[],"result":{"XXBT":{"altname":"XBT"},"ZUSD":{"altname":"USD"}}}"#)
            .create_async()
            .await;
        let pairs = server
            .mock("GET", "/0/public/AssetPairs")
            .with_body(r#"{"error":[],"result":{"XXBTZUSD":{"altname":"XBTUSD"}}}"#)
            .create_async()
            .await;
        let ticker = server
            .mock("GET", "/0/public/Ticker")
            .match_query(Matcher::Any)
            .with_body(r#"{"error":[],"result":{"XXBTZUSD":{"c":["1.0","1"]}}}"#)
            .expect(1)
            .create_async()
            .await;
        let depth = server
            .mock("GET", "/0/public/Depth")
            .match_query(Matcher::Any)
            .with_body(r#"{"error":[],"result":{}}"#)
            .create_async()
            .await;
        let ohlc = server
            .mock("GET", "/0/public/OHLC")
            .match_query(Matcher::Any)
            .with_body(r#"{"error":[],"result":{"last":0}}"#)
            .create_async()
            .await;
        (server, vec![assets, pairs, ticker, depth, ohlc])
    }

    #[tokio::test]
    async fn test_snapshot_is_reused_within_ttl() {
        let (server, mocks) = ticker_once_server().await;
        let agg = Aggregator::new(cfg(&["BTC"]), KrakenClient::new(&server.url()), vec![]);
        let first = agg.snapshot().await.unwrap();
        let second = agg.snapshot().await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.row("BTC").unwrap().why, "Balanced book (bids $0 vs asks $0).");
        mocks[2].assert_async().await;
    }

    #[tokio::test]
    async fn test_concurrent_snapshots_share_one_build() {
        let (server, mocks) = ticker_once_server().await;
        let agg = Aggregator::new(cfg(&["BTC"]), KrakenClient::new(&server.url()), vec![]);
        let snaps = futures::future::join_all((0..5).map(|_| agg.snapshot())).await;
        let first = snaps[0].as_ref().unwrap();
        for s in &snaps {
            assert!(Arc::ptr_eq(first, s.as_ref().unwrap()));
        }
        mocks[2].assert_async().await;
    }

    #[tokio::test]
    async fn test_failure_keeps_previous() {
        let (server, mocks) = kraken_server().await;
        let kraken = KrakenClient::new(&server.url()).with_metadata_ttl(Duration::ZERO);
        let agg = Aggregator::new(cfg(&["BTC"]), kraken, vec![]);

        let first = agg.refresh().await.unwrap();
        for m in &mocks {
            m.remove_async().await;
        }
        let again = agg.refresh().await.unwrap();
        assert!(Arc::ptr_eq(&first, &again));
    }

    #[tokio::test]
    async fn test_kraken_data_outage_uses_fallback_venue() {
        let (mut server, mocks) = kraken_server().await;
        let venues: Vec<Arc<dyn PriceVenue>> = vec![Arc::new(BtcVenue)];
        let agg = Aggregator::new(cfg(&["BTC"]), KrakenClient::new(&server.url()), venues);

        let first = agg.refresh().await.unwrap();
        assert_eq!(first.row("BTC").unwrap().price_venue.as_deref(), Some("kraken"));

        let _down = fail_kraken_data(&mut server, &mocks).await;
        let second = agg.refresh().await.unwrap();
        let btc = second.row("BTC").unwrap();
        assert_eq!(btc.price, Some(123.0));
        assert_eq!(btc.price_venue.as_deref(), Some("btcvenue"));
        assert_eq!(second.venues_failed, vec!["kraken".to_string()]);
    }

    #[tokio::test]
    async fn test_kraken_data_outage_without_fallback_keeps_previous() {
        let (mut server, mocks) = kraken_server().await;
        let agg = Aggregator::new(cfg(&["BTC"]), KrakenClient::new(&server.url()), vec![Arc::new(SolOnly)]);

        let first = agg.refresh().await.unwrap();
        let _down = fail_kraken_data(&mut server, &mocks).await;
        let second = agg.refresh().await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.row("BTC").unwrap().price, Some(50000.0));
    }

    #[tokio::test]
    async fn test_failed_build_is_not_retried_within_ttl() {
        let mut server = Server::new_async().await;
        let assets = server.mock("GET", "/0/public/Assets").with_status(503).expect(1).create_async().await;
        let agg = Aggregator::new(cfg(&["BTC"]), KrakenClient::new(&server.url()), vec![]);

        let outcomes = futures::future::join_all((0..3).map(|_| agg.snapshot())).await;
        assert!(outcomes.iter().all(|o| o.is_err()));
        assert!(agg.snapshot().await.is_err());
        assets.assert_async().await;
    }

    #[tokio::test]
    async fn test_all_sources_down_without_previous_is_error() {
        let server = Server::new_async().await;
        let agg = Aggregator::new(cfg(&["BTC"]), KrakenClient::new(&server.url()), vec![Arc::new(FlakyVenue)]);
        let err = agg.snapshot().await.unwrap_err();
        assert!(err.to_string().contains("kraken"));
        assert!(err.to_string().contains("flaky"));
    }

    #[tokio::test]
    async fn test_poller_disabled_for_zero_interval() {
        let agg = Arc::new(Aggregator::new(cfg(&["BTC"]), KrakenClient::new("http://127.0.0.1:1"), vec![]));
        assert!(agg.spawn_poller().is_none());
    }
}
