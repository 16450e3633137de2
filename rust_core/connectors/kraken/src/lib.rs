//! Kraken public REST connector.
//!
//! Kraken names assets by "altname" (`XBT`, `XDG`, ...) and pairs by an opaque
//! key (`XXBTZUSD`). [`symbols`] maps everyday tickers onto those names and
//! [`rest::KrakenClient`] fetches tickers, depth and candles by pair key.

pub mod rest;
pub mod symbols;

pub use rest::KrakenClient;
pub use symbols::{AssetIndex, PairIndex, PairInfo, ResolvedPair};
