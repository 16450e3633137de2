//! Canned answers for `POST /chat`, built from the current snapshot.

use aggregator::{SignalRow, Snapshot};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatReply {
    pub reply: String,
    /// Symbols the reply talks about.
    pub symbols: Vec<String>,
}

const LEADER_WORDS: [&str; 5] = ["TOP", "SCAN", "MOMENTUM", "BEST", "MOVERS"];

fn fmt_price(p: f64) -> String {
    if p >= 1.0 {
        format!("${:.2}", p)
    } else {
        format!("${:.6}", p)
    }
}

fn fmt_pct(p: Option<f64>) -> String {
    match p {
        Some(v) => format!("{:+.2}%", v),
        None => "n/a".to_string(),
    }
}

fn describe(row: &SignalRow) -> String {
    let price = row.price.map(fmt_price).unwrap_or_else(|| "no price".to_string());
    let venue = row.price_venue.as_deref().unwrap_or("unknown venue");
    let mut line = format!(
        "{}: {} on {}, 24h {}, momentum {}, {}. {}",
        row.symbol,
        price,
        venue,
        fmt_pct(row.change_24h_pct),
        fmt_pct(row.momentum_pct),
        row.bias,
        row.why
    );
    if let Some(entry) = row.entries.suggested {
        line.push_str(&format!(" Entry near {}.", fmt_price(entry)));
    }
    line
}

pub fn answer(snapshot: &Snapshot, message: &str) -> ChatReply {
    let words: Vec<String> = message
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|w| w.to_uppercase())
        .collect();

    let mut lines = Vec::new();
    let mut symbols = Vec::new();
    for w in &words {
        if symbols.contains(w) {
            continue;
        }
        if let Some(row) = snapshot.row(w) {
            lines.push(describe(row));
            symbols.push(row.symbol.clone());
        } else if snapshot.skipped.contains(w) {
            lines.push(format!("{}: no venue is quoting it right now.", w));
            symbols.push(w.clone());
        }
    }

    if lines.is_empty() && words.iter().any(|w| LEADER_WORDS.contains(&w.as_str())) {
        for r in snapshot.scan().into_iter().filter(|r| r.momentum_pct.is_some()).take(3) {
            lines.push(format!("#{} {} momentum {} ({})", r.rank, r.symbol, fmt_pct(r.momentum_pct), r.bias));
            symbols.push(r.symbol);
        }
        if lines.is_empty() {
            lines.push("No momentum data yet.".to_string());
        }
    }

    if lines.is_empty() {
        let tracked: Vec<&str> = snapshot.rows.iter().map(|r| r.symbol.as_str()).collect();
        let tracked = if tracked.is_empty() { "nothing yet".to_string() } else { tracked.join(", ") };
        lines.push(format!("Ask about a symbol (e.g. BTC) or say \"top\" for momentum leaders. Tracking: {}.", tracked));
    }

    ChatReply { reply: lines.join("\n"), symbols }
}
