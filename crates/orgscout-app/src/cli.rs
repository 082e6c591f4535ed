//! CLI argument definitions for the Orgscout gateway.
//!
//! Priority resolution: CLI args > env vars > config file > defaults.

use clap::Parser;
use std::path::PathBuf;

/// Orgscout - conversational organization search over WebSocket.
#[derive(Parser, Debug, Default)]
#[command(name = "orgscout", version, about)]
pub struct CliArgs {
    /// Path to the configuration file.
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// HTTP server port.
    #[arg(short = 'p', long = "port")]
    pub port: Option<u16>,

    /// Data directory for the SQLite turn log.
    #[arg(short = 'd', long = "data-dir")]
    pub data_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short = 'l', long = "log-level")]
    pub log_level: Option<String>,
}

impl CliArgs {
    /// Priority: --config flag > ORGSCOUT_CONFIG env var > ~/.orgscout/config.toml.
    pub fn resolve_config_path(&self) -> PathBuf {
        if let Some(ref p) = self.config {
            return p.clone();
        }
        if let Ok(p) = std::env::var("ORGSCOUT_CONFIG") {
            return PathBuf::from(p);
        }
        default_config_path()
    }

    /// Priority: --port flag > ORGSCOUT_PORT env var > config file value.
    pub fn resolve_port(&self, config_port: u16) -> u16 {
        if let Some(p) = self.port {
            return p;
        }
        std::env::var("ORGSCOUT_PORT")
            .ok()
            .and_then(|val| val.parse::<u16>().ok())
            .unwrap_or(config_port)
    }

    /// `None` keeps the config file value.
    pub fn resolve_data_dir(&self) -> Option<String> {
        self.data_dir
            .as_ref()
            .map(|p| p.to_string_lossy().to_string())
    }

    pub fn resolve_log_level(&self) -> Option<String> {
        self.log_level.clone()
    }
}

fn default_config_path() -> PathBuf {
    match home_dir() {
        Some(home) => home.join(".orgscout").join("config.toml"),
        None => PathBuf::from("config.toml"),
    }
}

pub fn home_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    let home = std::env::var("USERPROFILE");
    #[cfg(not(target_os = "windows"))]
    let home = std::env::var("HOME");
    home.ok().map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_flags() {
        let args = CliArgs::parse_from([
            "orgscout",
            "--config",
            "/tmp/o.toml",
            "-p",
            "9000",
            "--data-dir",
            "/tmp/data",
            "-l",
            "debug",
        ]);
        assert_eq!(args.resolve_config_path(), PathBuf::from("/tmp/o.toml"));
        assert_eq!(args.resolve_port(8080), 9000);
        assert_eq!(args.resolve_data_dir().as_deref(), Some("/tmp/data"));
        assert_eq!(args.resolve_log_level().as_deref(), Some("debug"));
    }

    #[test]
    fn test_flag_beats_config_port() {
        let args = CliArgs {
            port: Some(4000),
            ..CliArgs::default()
        };
        assert_eq!(args.resolve_port(8080), 4000);
    }

    #[test]
    fn test_no_overrides() {
        let args = CliArgs::parse_from(["orgscout"]);
        assert!(args.resolve_data_dir().is_none());
        assert!(args.resolve_log_level().is_none());
    }
}
