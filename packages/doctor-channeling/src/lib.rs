pub mod auth;
pub mod cli;
pub mod config;
pub mod error;
pub mod http;
pub mod identity;
pub mod log;
pub mod models;
pub mod prometheus;
pub mod services;
pub mod store;

pub use crate::cli::Args;
pub use crate::config::ChannelingConfig;
pub use crate::http::{router, AppState};
pub use crate::log::init;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
pub mod test_helpers;
