use crate::config::{LogConfig, LogFormat, LogLevel, DEFAULT_CONFIG_FILE_PATH};
use clap::Parser;

#[derive(Clone, Debug, Parser)]
#[command(version, about, verbatim_doc_comment)]
///
/// Doctor Channeling
///
/// Doctor directory, appointment booking with per-day queue numbers, prescriptions and admin moderation.
///
pub struct Args {
    /// Optional path to a configuration file.
    ///
    /// Default is "doctor-channeling.toml".
    /// Configuration is loaded from this file, if present.
    /// Environment variables are used instead of the file or to override any values defined in the file.
    #[arg(short = 'p', long, default_value = DEFAULT_CONFIG_FILE_PATH, verbatim_doc_comment)]
    pub config_file_path: String,

    ///
    /// Optional log level.
    ///
    #[arg(short, long, value_enum, default_value_t = LogConfig::default_log_level(), env = "DC_LOG__LEVEL")]
    pub log_level: LogLevel,

    ///
    /// Optional log format. Default level is "pretty" if running in a terminal session, otherwise "structured".
    ///
    #[arg(short='f', long, value_enum, default_value_t = LogConfig::default_log_format(), env = "DC_LOG__FORMAT")]
    pub log_format: LogFormat,
}
