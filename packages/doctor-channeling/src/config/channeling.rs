use super::{
    IdentityConfig, LogConfig, LogFormat, ServerConfig, StoreConfig, DC_PREFIX,
    DEFAULT_CONFIG_FILE_PATH,
};
use crate::error::{ConfigError, Error};
use crate::Args;
use config::{Config, Environment};
use regex::Regex;
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Clone, Debug, Deserialize)]
pub struct ChannelingConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub store: StoreConfig,
    pub identity: IdentityConfig,
    #[serde(default)]
    pub log: LogConfig,
    #[serde(default)]
    pub prometheus: PrometheusConfig,
}

#[derive(Clone, Debug, Deserialize)]
pub struct PrometheusConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "PrometheusConfig::default_port")]
    pub port: u16,
}

/// Config defaults to a file called `doctor-channeling.toml` in the current directory.
/// Supports TOML, JSON
/// Variable names should match the struct field names.
///
/// ENV vars can be used to override file settings.
///
/// ENV vars must be prefixed with `DC_`.
///
impl ChannelingConfig {
    pub fn default_path() -> String {
        DEFAULT_CONFIG_FILE_PATH.to_string()
    }

    pub fn load(args: &Args) -> Result<ChannelingConfig, Error> {
        // Log a warning to user that config file is missing
        if !PathBuf::from(&args.config_file_path).exists() {
            println!(
                "Configuration file was not found: {}",
                args.config_file_path
            );
            println!("Loading config values from environment variables.");
        }
        let mut config = ChannelingConfig::build(&args.config_file_path)?;

        // If log level is default, it has not been set by the user in config
        if config.log.level == LogConfig::default_log_level() {
            config.log.level = args.log_level;
        }

        // If log format is default, it has not been set by the user in config
        if config.log.format == LogConfig::default_log_format() {
            config.log.format = args.log_format;
        }

        config.identity.validate()?;

        Ok(config)
    }

    pub fn build(path: &str) -> Result<Self, Error> {
        // For parsing top-level values such as DC_HOST
        // and for parsing nested env values such as DC_SERVER__HOST, DC_SERVER__PORT
        let dc_env_source = Environment::with_prefix(DC_PREFIX)
            .try_parsing(true)
            .separator("__")
            .prefix_separator("_")
            .list_separator(",")
            .with_list_parse_key("server.allowed_origins");

        let config: Self = Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(dc_env_source)
            .build()?
            .try_deserialize()
            .map_err(|err| match err {
                config::ConfigError::Message(ref s) => match s {
                    s if s.contains("missing field") => {
                        let mut name = extract_field_name(s).map_or("unknown".to_string(), |s| s);

                        if name == "identity" || name == "token_secret" {
                            name = "identity.token_secret".to_string();
                        }

                        ConfigError::MissingParameter { name }
                    }
                    s if s.contains("does not have variant constructor") => {
                        let (name, value) = extract_invalid_field(s);
                        ConfigError::InvalidParameter { name, value }
                    }
                    _ => err.into(),
                },
                _ => err.into(),
            })?;

        Ok(config)
    }

    pub fn use_structured_logging(&self) -> bool {
        matches!(self.log.format, LogFormat::Structured)
    }

    ///
    /// Returns true if Prometheus export is enabled
    ///
    pub fn prometheus_enabled(&self) -> bool {
        self.prometheus.enabled
    }
}

impl PrometheusConfig {
    pub fn default_port() -> u16 {
        9930
    }
}

impl Default for PrometheusConfig {
    fn default() -> Self {
        PrometheusConfig {
            enabled: false,
            port: PrometheusConfig::default_port(),
        }
    }
}

///
/// Extracts a field name (if present) from a config::ConfigError::Message
/// This is called in `build` if a ConfigError message contains the string `missing field`
///
fn extract_field_name(input: &str) -> Option<String> {
    let re = Regex::new(r"`(\w+)`").ok()?;
    re.captures(input)
        .and_then(|caps| caps.get(1).map(|m| m.as_str().to_string()))
}

///
/// Error string is `enum {name} does not have variant constructor {value}`
///
fn extract_invalid_field(input: &str) -> (String, String) {
    let words = input.split(' ').collect::<Vec<_>>();

    let default_name = "unknown".to_string();
    let default_val = "".to_string();

    if !input.starts_with("enum") {
        return (default_name, default_val);
    }

    let name = words
        .get(1)
        .map_or(default_name.to_owned(), |w| w.to_string());

    let value = words
        .last()
        .map_or(default_val.to_owned(), |w| w.to_string());

    (name, value)
}

#[cfg(test)]
mod tests {
    use crate::config::ChannelingConfig;
    use crate::error::{ConfigError, Error};
    use crate::test_helpers::with_no_dc_vars;

    const TEST_CONFIG: &str = "tests/config/doctor-channeling-test.toml";

    #[test]
    fn server_defaults_and_file_values() {
        with_no_dc_vars(|| {
            let config = ChannelingConfig::build(TEST_CONFIG).unwrap();
            assert_eq!(config.server.to_socket_address(), "127.0.0.1:5050");
            assert_eq!(config.server.shutdown_timeout, 2000);
            assert_eq!(config.identity.token_ttl, 3600);
            assert!(config.store.path.is_none());
        });
    }

    #[test]
    fn env_overrides_file() {
        with_no_dc_vars(|| {
            temp_env::with_vars(
                [
                    ("DC_SERVER__PORT", Some("7070")),
                    (
                        "DC_SERVER__ALLOWED_ORIGINS",
                        Some("https://a.example,https://b.example"),
                    ),
                    ("DC_STORE__PATH", Some("/tmp/channeling.json")),
                ],
                || {
                    let config = ChannelingConfig::build(TEST_CONFIG).unwrap();
                    assert_eq!(config.server.port, 7070);
                    assert_eq!(
                        config.server.allowed_origins,
                        vec!["https://a.example", "https://b.example"]
                    );
                    assert!(config.store.is_persistent());
                },
            );
        });
    }

    #[test]
    fn missing_token_secret_is_reported_by_name() {
        with_no_dc_vars(|| {
            let config = ChannelingConfig::build("tests/config/unknown.toml");

            match config.unwrap_err() {
                Error::Config(ConfigError::MissingParameter { name }) => {
                    assert_eq!(name, "identity.token_secret");
                }
                err => panic!("expected MissingParameter, got {err:?}"),
            }

            temp_env::with_vars(
                [(
                    "DC_IDENTITY__TOKEN_SECRET",
                    Some("0123456789abcdef0123456789abcdef"),
                )],
                || {
                    let config = ChannelingConfig::build("tests/config/unknown.toml").unwrap();
                    assert!(config.identity.validate().is_ok());
                },
            );
        });
    }

    #[test]
    fn prometheus_config() {
        with_no_dc_vars(|| {
            let config = ChannelingConfig::build(TEST_CONFIG).unwrap();
            assert!(!config.prometheus_enabled());

            temp_env::with_vars([("DC_PROMETHEUS__ENABLED", Some("true"))], || {
                let config = ChannelingConfig::build(TEST_CONFIG).unwrap();
                assert!(config.prometheus_enabled());
                assert_eq!(config.prometheus.port, 9930);
            });

            temp_env::with_vars([("DC_PROMETHEUS__PORT", Some("7777"))], || {
                let config = ChannelingConfig::build(TEST_CONFIG).unwrap();
                assert!(!config.prometheus_enabled());
                assert_eq!(config.prometheus.port, 7777);
            });
        });
    }
}
