pub mod rest;

pub use rest::CoinbaseClient;
