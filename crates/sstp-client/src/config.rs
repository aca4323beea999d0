//! Client configuration.
//!
//! Loaded from an optional TOML file with `SSTPC_*` environment
//! variables layered on top, so credentials can stay out of the file.

use anyhow::Result;
use serde::Deserialize;
use std::path::{Path, PathBuf};

fn default_port() -> u16 {
    443
}

fn default_pppd_path() -> PathBuf {
    PathBuf::from("/usr/sbin/pppd")
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// SSTP gateway hostname, also used for the HTTP Host header.
    pub server: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Credentials handed to pppd for the inner MS-CHAPv2 exchange.
    pub username: String,
    pub password: String,

    /// Optional Windows domain, passed through to pppd.
    #[serde(default)]
    pub domain: Option<String>,

    #[serde(default = "default_pppd_path")]
    pub pppd_path: PathBuf,

    /// When set, pppd runs with `logfile <path> debug`.
    #[serde(default)]
    pub logfile: Option<PathBuf>,

    /// 0 = info, 1 = debug, 2+ = trace. Logging only.
    #[serde(default)]
    pub verbose: u8,
}

impl Config {
    /// Load from an optional file plus SSTPC_* environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }
        let settings = builder
            .add_source(config::Environment::with_prefix("SSTPC"))
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::FileFormat;

    #[test]
    fn test_config_defaults() {
        let toml = r#"
            server = "vpn.example.org"
            username = "user"
            password = "secret"
        "#;
        let config: Config = config::Config::builder()
            .add_source(config::File::from_str(toml, FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(config.server, "vpn.example.org");
        assert_eq!(config.port, 443);
        assert_eq!(config.pppd_path, PathBuf::from("/usr/sbin/pppd"));
        assert_eq!(config.domain, None);
        assert_eq!(config.logfile, None);
        assert_eq!(config.verbose, 0);
    }

    #[test]
    fn test_config_full() {
        let toml = r#"
            server = "vpn.example.org"
            port = 8443
            username = "user"
            password = "secret"
            domain = "CORP"
            pppd_path = "/usr/local/sbin/pppd"
            logfile = "/tmp/ppp.log"
            verbose = 2
        "#;
        let config: Config = config::Config::builder()
            .add_source(config::File::from_str(toml, FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(config.port, 8443);
        assert_eq!(config.domain.as_deref(), Some("CORP"));
        assert_eq!(config.logfile, Some(PathBuf::from("/tmp/ppp.log")));
        assert_eq!(config.verbose, 2);
    }
}
