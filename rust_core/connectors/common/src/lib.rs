//! Shared building blocks for the REST venue connectors.

pub mod errors;
pub mod http;
pub mod types;
pub mod venue;

pub use errors::ConnectorError;
pub use types::{Candle, OrderBookLevel, OrderBookSnapshot, Quote};
pub use venue::PriceVenue;
