use crate::errors::{ConnectorError, ConnectorResult};
use log::debug;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

pub fn build_client(timeout: Duration) -> Client {
    Client::builder()
        .timeout(timeout)
        .user_agent(concat!("exchange-relay/", env!("CARGO_PKG_VERSION")))
        .build()
        .unwrap_or_else(|_| Client::new())
}

/// GET `url` and decode the body as JSON. Non-2xx responses become `ConnectorError::Http`.
pub async fn get_json(client: &Client, url: &str, query: &[(&str, String)]) -> ConnectorResult<Value> {
    debug!("GET {} {:?}", url, query);
    let resp = client.get(url).query(query).send().await?;
    let status = resp.status();
    if !status.is_success() {
        return Err(ConnectorError::Http { status: status.as_u16(), url: url.to_string() });
    }
    let text = resp.text().await?;
    Ok(serde_json::from_str(&text)?)
}

/// Exchanges encode numbers as JSON strings or numbers; accept both.
pub fn as_f64(v: &Value) -> Option<f64> {
    let f = match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    if f.is_finite() { Some(f) } else { None }
}
