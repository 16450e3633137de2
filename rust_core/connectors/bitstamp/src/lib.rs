pub mod rest;

pub use rest::BitstampClient;
