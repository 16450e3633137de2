use async_trait::async_trait;
use connectors_common::errors::ConnectorResult;
use connectors_common::http::{as_f64, build_client, get_json, DEFAULT_TIMEOUT};
use connectors_common::types::{now_ms, Quote};
use connectors_common::venue::PriceVenue;
use log::info;
use reqwest::Client;
use std::time::Duration;

pub const COINGECKO_REST_URL: &str = "https://api.coingecko.com";

/// Coingecko keys coins by id, not ticker. Unknown tickers are tried lower-cased.
pub fn coin_id(symbol: &str) -> String {
    let id = match symbol.to_uppercase().as_str() {
        "BTC" => "bitcoin",
        "ETH" => "ethereum",
        "SOL" => "solana",
        "XRP" => "ripple",
        "LINK" => "chainlink",
        "ADA" => "cardano",
        "DOGE" => "dogecoin",
        "AVAX" => "avalanche-2",
        "ATOM" => "cosmos",
        "TRX" => "tron",
        "MATIC" => "matic-network",
        "DOT" => "polkadot",
        "LTC" => "litecoin",
        "BCH" => "bitcoin-cash",
        "USDT" => "tether",
        "USDC" => "usd-coin",
        _ => return symbol.to_lowercase(),
    };
    id.to_string()
}

pub struct CoingeckoClient {
    client: Client,
    base_url: String,
}

impl Default for CoingeckoClient {
    fn default() -> Self {
        Self::new(COINGECKO_REST_URL)
    }
}

impl CoingeckoClient {
    pub fn new(base_url: &str) -> Self {
        CoingeckoClient { client: build_client(DEFAULT_TIMEOUT), base_url: base_url.trim_end_matches('/').to_string() }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.client = build_client(timeout);
        self
    }

    /// `/api/v3/simple/price` for one coin id against one vs-currency (lower case).
    pub async fn simple_price(&self, id: &str, vs: &str) -> ConnectorResult<Option<Quote>> {
        let url = format!("{}/api/v3/simple/price", self.base_url);
        let query = [
            ("ids", id.to_string()),
            ("vs_currencies", vs.to_string()),
            ("include_24hr_change", "true".to_string()),
        ];
        let v = get_json(&self.client, &url, &query).await?;
        let coin = v.get(id);
        let price = match coin.and_then(|o| o.get(vs)).and_then(as_f64) {
            Some(p) => p,
            None => return Ok(None),
        };
        let change = coin.and_then(|o| o.get(format!("{}_24h_change", vs).as_str())).and_then(as_f64);
        Ok(Some(Quote {
            exchange: "coingecko".to_string(),
            pair: format!("{}/{}", id, vs),
            price,
            change_24h_pct: change,
            ts: now_ms(),
        }))
    }
}

#[async_trait]
impl PriceVenue for CoingeckoClient {
    fn name(&self) -> &'static str {
        "coingecko"
    }

    async fn fetch_quote(&self, base: &str, quotes: &[String]) -> ConnectorResult<Option<Quote>> {
        let id = coin_id(base);
        for q in quotes {
            let vs = q.to_lowercase();
            if let Some(quote) = self.simple_price(&id, &vs).await? {
                return Ok(Some(quote));
            }
        }
        info!("coingecko has no price for {} ({})", base, id);
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    #[test]
    fn test_coin_id_mapping() {
        assert_eq!(coin_id("btc"), "bitcoin");
        assert_eq!(coin_id("AVAX"), "avalanche-2");
        assert_eq!(coin_id("PEPE"), "pepe");
    }

    #[tokio::test]
    async fn test_simple_price_with_change() {
        let mut server = mockito::Server::new_async().await;
        let _usdt = server
            .mock("GET", "/api/v3/simple/price")
            .match_query(Matcher::UrlEncoded("vs_currencies".into(), "usdt".into()))
            .with_body("{}")
            .create_async()
            .await;
        let _usd = server
            .mock("GET", "/api/v3/simple/price")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("ids".into(), "cosmos".into()),
                Matcher::UrlEncoded("vs_currencies".into(), "usd".into()),
            ]))
            .with_body(r#"{"cosmos":{"usd":8.5,"usd_24h_change":-1.25}}"#)
            .create_async()
            .await;
        let venue = CoingeckoClient::new(&server.url());
        let q = venue.fetch_quote("ATOM", &["USDT".to_string(), "USD".to_string()]).await.unwrap().unwrap();
        assert_eq!(q.price, 8.5);
        assert_eq!(q.change_24h_pct, Some(-1.25));
        assert_eq!(q.pair, "cosmos/usd");
    }
}
