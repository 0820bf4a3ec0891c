mod channeling;
mod identity;
mod log;
mod server;
mod store;

pub use channeling::{ChannelingConfig, PrometheusConfig};
pub use identity::IdentityConfig;
pub use log::{LogConfig, LogFormat, LogLevel, LogOutput};
pub use server::ServerConfig;
pub use store::StoreConfig;

pub const DC_PREFIX: &str = "DC";
pub const DEFAULT_CONFIG_FILE_PATH: &str = "doctor-channeling.toml";

pub const DEFAULT_PORT: u16 = 5000;
pub const DEFAULT_SHUTDOWN_TIMEOUT: u64 = 2000;

pub const DEFAULT_TOKEN_TTL: u64 = 60 * 60 * 24;
pub const MIN_TOKEN_SECRET_LENGTH: usize = 32;
