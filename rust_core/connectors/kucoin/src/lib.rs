pub mod rest;

pub use rest::KucoinClient;
