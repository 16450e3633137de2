use crate::errors::ConnectorResult;
use crate::types::{OrderBookSnapshot, Quote};
use async_trait::async_trait;

/// A venue that can price a base asset against one of several quote currencies.
#[async_trait]
pub trait PriceVenue: Send + Sync {
    fn name(&self) -> &'static str;

    /// First quote in `quotes` the venue lists for `base`, or `Ok(None)` when it lists none.
    async fn fetch_quote(&self, base: &str, quotes: &[String]) -> ConnectorResult<Option<Quote>>;

    /// Order book for a pair returned by `fetch_quote`. Venues without a book endpoint return `None`.
    async fn fetch_book(&self, _pair: &str, _depth: usize) -> ConnectorResult<Option<OrderBookSnapshot>> {
        Ok(None)
    }
}

/// Percent change from `reference` to `last`; `None` when the reference is zero.
pub fn pct_change(reference: f64, last: f64) -> Option<f64> {
    if reference == 0.0 || !reference.is_finite() || !last.is_finite() {
        return None;
    }
    Some((last - reference) / reference * 100.0)
}
