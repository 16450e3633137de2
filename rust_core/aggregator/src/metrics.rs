//! Arithmetic over venue responses: whale levels, book imbalance, momentum and entries.

use connectors_common::types::{Candle, OrderBookSnapshot};
use connectors_common::venue::pct_change;
use serde::{Deserialize, Serialize};

/// Imbalance beyond which the book is called one-sided.
pub const BIAS_THRESHOLD: f64 = 0.2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Bid,
    Ask,
}

/// A book level whose notional clears the whale floor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WhaleLevel {
    pub price: f64,
    pub qty: f64,
    pub usd: f64,
    pub side: Side,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WhaleSummary {
    pub bids: Vec<WhaleLevel>,
    pub asks: Vec<WhaleLevel>,
    /// Notional of every fetched bid level, whale or not.
    pub bid_usd_total: f64,
    pub ask_usd_total: f64,
    pub bid_whale_usd: f64,
    pub ask_whale_usd: f64,
    /// `bid_whale_usd - ask_whale_usd`
    pub pressure_usd: f64,
}

pub fn summarize_whales(book: &OrderBookSnapshot, usd_floor: f64) -> WhaleSummary {
    let mut out = WhaleSummary::default();
    for (levels, side) in [(&book.bids, Side::Bid), (&book.asks, Side::Ask)] {
        for lvl in levels.iter() {
            let usd = lvl.notional();
            if !usd.is_finite() {
                continue;
            }
            let whale = usd >= usd_floor;
            match side {
                Side::Bid => {
                    out.bid_usd_total += usd;
                    if whale {
                        out.bid_whale_usd += usd;
                        out.bids.push(WhaleLevel { price: lvl.price, qty: lvl.qty, usd, side });
                    }
                }
                Side::Ask => {
                    out.ask_usd_total += usd;
                    if whale {
                        out.ask_whale_usd += usd;
                        out.asks.push(WhaleLevel { price: lvl.price, qty: lvl.qty, usd, side });
                    }
                }
            }
        }
    }
    out.pressure_usd = out.bid_whale_usd - out.ask_whale_usd;
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Bias {
    Buy,
    Sell,
    Hold,
}

impl std::fmt::Display for Bias {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Bias::Buy => "BUY",
            Bias::Sell => "SELL",
            Bias::Hold => "HOLD",
        };
        f.write_str(s)
    }
}

/// Bias and a one-line explanation from total bid/ask notional.
pub fn bias_from_imbalance(bid_usd: f64, ask_usd: f64) -> (Bias, String) {
    let denom = (bid_usd + ask_usd).max(1e-9);
    let imbalance = (bid_usd - ask_usd) / denom;
    if imbalance > BIAS_THRESHOLD {
        return (
            Bias::Buy,
            format!("Bid pressure {:.0}% higher (bids ${} vs asks ${}).", imbalance * 100.0, fmt_usd(bid_usd), fmt_usd(ask_usd)),
        );
    }
    if imbalance < -BIAS_THRESHOLD {
        return (
            Bias::Sell,
            format!("Ask pressure {:.0}% higher (asks ${} vs bids ${}).", imbalance.abs() * 100.0, fmt_usd(ask_usd), fmt_usd(bid_usd)),
        );
    }
    (Bias::Hold, format!("Balanced book (bids ${} vs asks ${}).", fmt_usd(bid_usd), fmt_usd(ask_usd)))
}

/// Whole dollars with thousands separators.
pub fn fmt_usd(v: f64) -> String {
    let rounded = v.round();
    let digits = format!("{:.0}", rounded.abs());
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    if rounded < 0.0 {
        out.insert(0, '-');
    }
    out
}

/// Percent change of the last close versus `lookback` candles earlier, or versus the
/// oldest candle when history is shorter.
pub fn change_over(candles: &[Candle], lookback: usize) -> Option<f64> {
    if candles.len() < 2 || lookback == 0 {
        return None;
    }
    let last = candles.len() - 1;
    let reference = candles[last.saturating_sub(lookback)];
    pct_change(reference.close, candles[last].close)
}

pub fn momentum(candles: &[Candle], window: usize) -> Option<f64> {
    change_over(candles, window)
}

pub fn change_24h(candles: &[Candle], interval_min: u32) -> Option<f64> {
    if interval_min == 0 {
        return None;
    }
    change_over(candles, (24 * 60 / interval_min as usize).max(1))
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntryLevels {
    /// Price of the heaviest whale bid.
    pub support: Option<f64>,
    /// Price of the heaviest whale ask.
    pub resistance: Option<f64>,
    pub suggested: Option<f64>,
}

fn heaviest(levels: &[WhaleLevel]) -> Option<f64> {
    levels.iter().max_by(|a, b| a.usd.total_cmp(&b.usd)).map(|l| l.price)
}

pub fn entry_levels(whales: &WhaleSummary, bias: Bias) -> EntryLevels {
    let support = heaviest(&whales.bids);
    let resistance = heaviest(&whales.asks);
    let suggested = match bias {
        Bias::Buy => support,
        Bias::Sell => resistance,
        Bias::Hold => None,
    };
    EntryLevels { support, resistance, suggested }
}

#[cfg(test)]
mod tests {
    use super::*;
    use connectors_common::types::OrderBookLevel;

    fn book(bids: &[(f64, f64)], asks: &[(f64, f64)]) -> OrderBookSnapshot {
        OrderBookSnapshot {
            exchange: "kraken".into(),
            pair: "XXBTZUSD".into(),
            bids: bids.iter().map(|&(price, qty)| OrderBookLevel { price, qty }).collect(),
            asks: asks.iter().map(|&(price, qty)| OrderBookLevel { price, qty }).collect(),
            ts: 0,
        }
    }

    fn candles(closes: &[f64]) -> Vec<Candle> {
        closes.iter().enumerate().map(|(i, &c)| Candle { time: i as i64, open: c, close: c }).collect()
    }

    #[test]
    fn test_whales_exclude_levels_below_floor() {
        let s = summarize_whales(&book(&[(100.0, 2000.0), (99.0, 10.0)], &[(101.0, 500.0)]), 100_000.0);
        assert_eq!(s.bids.len(), 1);
        assert_eq!(s.bids[0].usd, 200_000.0);
        assert_eq!(s.bids[0].side, Side::Bid);
        assert!(s.asks.is_empty());
        assert_eq!(s.bid_usd_total, 200_990.0);
        assert_eq!(s.ask_usd_total, 50_500.0);
        assert_eq!(s.pressure_usd, 200_000.0);
        assert!(s.bids.iter().chain(s.asks.iter()).all(|w| w.usd >= 100_000.0));
    }

    #[test]
    fn test_floor_is_inclusive() {
        let s = summarize_whales(&book(&[], &[(100.0, 1000.0)]), 100_000.0);
        assert_eq!(s.asks.len(), 1);
        assert_eq!(s.pressure_usd, -100_000.0);
    }

    #[test]
    fn test_empty_book() {
        let s = summarize_whales(&book(&[], &[]), 1.0);
        assert_eq!(s, WhaleSummary::default());
        let (bias, why) = bias_from_imbalance(s.bid_usd_total, s.ask_usd_total);
        assert_eq!(bias, Bias::Hold);
        assert_eq!(why, "Balanced book (bids $0 vs asks $0).");
    }

    #[test]
    fn test_bias_thresholds() {
        let (b, why) = bias_from_imbalance(1_500_000.0, 500_000.0);
        assert_eq!(b, Bias::Buy);
        assert_eq!(why, "Bid pressure 50% higher (bids $1,500,000 vs asks $500,000).");

        let (s, why) = bias_from_imbalance(100.0, 300.0);
        assert_eq!(s, Bias::Sell);
        assert_eq!(why, "Ask pressure 50% higher (asks $300 vs bids $100).");

        // exactly 0.2 stays HOLD
        assert_eq!(bias_from_imbalance(60.0, 40.0).0, Bias::Hold);
    }

    #[test]
    fn test_fmt_usd() {
        assert_eq!(fmt_usd(0.4), "0");
        assert_eq!(fmt_usd(999.6), "1,000");
        assert_eq!(fmt_usd(1234567.0), "1,234,567");
        assert_eq!(fmt_usd(-12345.0), "-12,345");
    }

    #[test]
    fn test_momentum_and_24h_change() {
        let c = candles(&[100.0, 90.0, 95.0, 99.0, 110.0]);
        assert!((momentum(&c, 4).unwrap() - 10.0).abs() < 1e-9);
        assert!((momentum(&c, 1).unwrap() - (11.0 / 99.0 * 100.0)).abs() < 1e-9);
        // short history falls back to the oldest candle
        assert!((change_24h(&c, 15).unwrap() - 10.0).abs() < 1e-9);
        assert_eq!(momentum(&c[..1], 4), None);
        assert_eq!(momentum(&candles(&[0.0, 5.0]), 1), None);
    }

    #[test]
    fn test_entries_follow_bias() {
        let s = summarize_whales(&book(&[(100.0, 2000.0), (98.0, 5000.0)], &[(105.0, 3000.0)]), 100_000.0);
        let buy = entry_levels(&s, Bias::Buy);
        assert_eq!(buy.support, Some(98.0));
        assert_eq!(buy.resistance, Some(105.0));
        assert_eq!(buy.suggested, Some(98.0));
        assert_eq!(entry_levels(&s, Bias::Sell).suggested, Some(105.0));
        assert_eq!(entry_levels(&s, Bias::Hold).suggested, None);
    }

    #[test]
    fn test_bias_serializes_uppercase() {
        assert_eq!(serde_json::to_string(&Bias::Buy).unwrap(), "\"BUY\"");
        assert_eq!(serde_json::to_string(&Side::Ask).unwrap(), "\"ask\"");
    }
}
