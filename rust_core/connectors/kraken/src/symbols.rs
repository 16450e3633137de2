use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;

/// Everyday ticker -> Kraken altname, for the assets where they differ.
pub fn alias(symbol: &str) -> Option<&'static str> {
    match symbol {
        "BTC" => Some("XBT"),
        "DOGE" => Some("XDG"),
        "MIOTA" => Some("IOTA"),
        _ => None,
    }
}

/// Index over `/0/public/Assets`: altname -> asset key.
#[derive(Debug, Default, Clone)]
pub struct AssetIndex {
    alt_to_key: HashMap<String, String>,
}

impl AssetIndex {
    pub fn from_result(result: &Value) -> Self {
        let mut alt_to_key = HashMap::new();
        if let Some(obj) = result.as_object() {
            for (key, info) in obj {
                let alt = info.get("altname").and_then(|a| a.as_str()).unwrap_or_default().to_uppercase();
                if !alt.is_empty() {
                    alt_to_key.insert(alt, key.clone());
                }
            }
        }
        AssetIndex { alt_to_key }
    }

    pub fn contains_alt(&self, alt: &str) -> bool {
        self.alt_to_key.contains_key(alt)
    }

    pub fn len(&self) -> usize {
        self.alt_to_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.alt_to_key.is_empty()
    }

    /// Kraken altname for `symbol`: the alias when Kraken lists it, then the
    /// symbol itself. Unknown symbols come back unchanged and fail pair lookup later.
    pub fn resolve_alt(&self, symbol: &str) -> String {
        let s = symbol.trim().to_uppercase();
        if let Some(a) = alias(&s) {
            if self.contains_alt(a) {
                return a.to_string();
            }
        }
        s
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PairInfo {
    pub key: String,
    pub altname: String,
}

/// Index over `/0/public/AssetPairs`, keyed by pair altname.
#[derive(Debug, Default, Clone)]
pub struct PairIndex {
    by_alt: HashMap<String, PairInfo>,
}

impl PairIndex {
    pub fn from_result(result: &Value) -> Self {
        let mut by_alt = HashMap::new();
        if let Some(obj) = result.as_object() {
            for (key, info) in obj {
                let alt = info.get("altname").and_then(|a| a.as_str()).unwrap_or_default().to_uppercase();
                if !alt.is_empty() {
                    by_alt.insert(alt.clone(), PairInfo { key: key.clone(), altname: alt });
                }
            }
        }
        PairIndex { by_alt }
    }

    pub fn get(&self, altname: &str) -> Option<&PairInfo> {
        self.by_alt.get(altname)
    }

    pub fn len(&self) -> usize {
        self.by_alt.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_alt.is_empty()
    }
}

/// A universe symbol matched to a tradable Kraken pair.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedPair {
    pub symbol: String,
    pub pair_key: String,
    pub altname: String,
    pub quote: String,
}

/// Try each preferred quote in order; the first `BASE+QUOTE` altname Kraken lists wins.
pub fn pick_pair(assets: &AssetIndex, pairs: &PairIndex, symbol: &str, quotes: &[String]) -> Option<ResolvedPair> {
    let base_alt = assets.resolve_alt(symbol);
    quotes.iter().find_map(|q| {
        let altname = format!("{}{}", base_alt, assets.resolve_alt(q));
        pairs.get(&altname).map(|info| ResolvedPair {
            symbol: symbol.trim().to_uppercase(),
            pair_key: info.key.clone(),
            altname: info.altname.clone(),
            quote: q.trim().to_uppercase(),
        })
    })
}
