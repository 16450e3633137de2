pub mod rest;

pub use rest::GateioClient;
