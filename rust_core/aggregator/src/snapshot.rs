use crate::metrics::{Bias, EntryLevels, WhaleSummary};
use serde::{Deserialize, Serialize};

/// Everything computed for one universe symbol in one build.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalRow {
    pub symbol: String,
    pub pair_key: Option<String>,
    pub pair_alt: Option<String>,
    pub price: Option<f64>,
    pub price_venue: Option<String>,
    pub change_24h_pct: Option<f64>,
    pub momentum_pct: Option<f64>,
    pub ts: i64,
    pub whales: Option<WhaleSummary>,
    pub bias: Bias,
    pub why: String,
    pub entries: EntryLevels,
}

/// The symbol-record view of a row, served by `/symbols`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolRecord {
    pub symbol: String,
    pub price: Option<f64>,
    pub price_venue: Option<String>,
    pub change_24h_pct: Option<f64>,
    pub momentum_pct: Option<f64>,
}

impl From<&SignalRow> for SymbolRecord {
    fn from(r: &SignalRow) -> Self {
        SymbolRecord {
            symbol: r.symbol.clone(),
            price: r.price,
            price_venue: r.price_venue.clone(),
            change_24h_pct: r.change_24h_pct,
            momentum_pct: r.momentum_pct,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanRow {
    pub rank: usize,
    pub symbol: String,
    pub price: Option<f64>,
    pub momentum_pct: Option<f64>,
    pub change_24h_pct: Option<f64>,
    pub bias: Bias,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Unix seconds at build time.
    pub ts: i64,
    /// Universe order; symbols are unique.
    pub rows: Vec<SignalRow>,
    pub skipped: Vec<String>,
    pub venues_failed: Vec<String>,
}

impl Snapshot {
    pub fn row(&self, symbol: &str) -> Option<&SignalRow> {
        self.rows.iter().find(|r| r.symbol.eq_ignore_ascii_case(symbol))
    }

    pub fn symbols(&self) -> Vec<SymbolRecord> {
        self.rows.iter().map(SymbolRecord::from).collect()
    }

    /// Rows ranked by momentum, strongest first; rows without momentum go last in universe order.
    pub fn scan(&self) -> Vec<ScanRow> {
        let mut rows: Vec<&SignalRow> = self.rows.iter().collect();
        rows.sort_by(|a, b| match (a.momentum_pct, b.momentum_pct) {
            (Some(x), Some(y)) => y.total_cmp(&x),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => std::cmp::Ordering::Equal,
        });
        rows.into_iter()
            .enumerate()
            .map(|(i, r)| ScanRow {
                rank: i + 1,
                symbol: r.symbol.clone(),
                price: r.price,
                momentum_pct: r.momentum_pct,
                change_24h_pct: r.change_24h_pct,
                bias: r.bias,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(symbol: &str, momentum: Option<f64>) -> SignalRow {
        SignalRow {
            symbol: symbol.to_string(),
            pair_key: None,
            pair_alt: None,
            price: Some(1.0),
            price_venue: Some("kraken".into()),
            change_24h_pct: None,
            momentum_pct: momentum,
            ts: 0,
            whales: None,
            bias: Bias::Hold,
            why: String::new(),
            entries: EntryLevels::default(),
        }
    }

    #[test]
    fn test_scan_orders_by_momentum() {
        let snap = Snapshot {
            rows: vec![row("A", None), row("B", Some(-1.0)), row("C", Some(3.0)), row("D", None), row("E", Some(0.5))],
            ..Default::default()
        };
        let order: Vec<String> = snap.scan().into_iter().map(|r| r.symbol).collect();
        assert_eq!(order, vec!["C", "E", "B", "A", "D"]);
        assert_eq!(snap.scan()[0].rank, 1);
    }

    #[test]
    fn test_row_lookup_ignores_case() {
        let snap = Snapshot { rows: vec![row("BTC", None)], ..Default::default() };
        assert!(snap.row("btc").is_some());
        assert!(snap.row("eth").is_none());
    }
}
