pub mod rest;

pub use rest::CoingeckoClient;
