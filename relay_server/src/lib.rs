//! HTTP relay over the exchange snapshot: config loading, routes and the static page.

pub mod chat;
pub mod config;
pub mod error;
pub mod server;
pub mod venues;
pub mod web;

pub use config::{load_config, load_config_from_str, AppConfig};
pub use error::{RelayError, Result};
pub use server::{build_router, start_server, AppState};
