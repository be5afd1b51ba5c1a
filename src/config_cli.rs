// ============================================================================
// Configuration and CLI
// ============================================================================

use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use url::Url;

#[derive(Parser, Debug)]
#[command(
    name = "vhostwatch",
    about = "Derives a proxy hostname model from running containers"
)]
pub struct Config {
    /// Docker Engine compatible API endpoint
    #[arg(
        long,
        env = "VHOSTWATCH_RUNTIME_ENDPOINT",
        default_value = "http://localhost:2375"
    )]
    pub runtime_endpoint: Url,

    /// API version path prefix, e.g. v1.41
    #[arg(long, env = "VHOSTWATCH_API_VERSION")]
    pub api_version: Option<String>,

    /// Runtime connection timeout (seconds)
    #[arg(long, env = "VHOSTWATCH_CONNECT_TIMEOUT", default_value = "10")]
    pub connect_timeout: u64,

    /// Health check server port
    #[arg(long, env = "HEALTH_PORT", default_value = "8080")]
    pub health_port: u16,

    /// Comma-separated domains to request wildcard certificates for
    #[arg(long, env = "VHOSTWATCH_WILDCARD_DOMAINS", value_delimiter = ',')]
    pub wildcard_domains: Vec<String>,

    /// Comma-separated list of models to log on every change
    #[arg(long, env = "VHOSTWATCH_DEBUG", value_delimiter = ',')]
    pub debug: Vec<DebugTarget>,

    /// File to write the JSON model to whenever it changes
    #[arg(long, env = "VHOSTWATCH_MODEL_OUTPUT")]
    pub model_output: Option<PathBuf>,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebugTarget {
    Containers,
    Hostnames,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = Config::try_parse_from(["vhostwatch"]).unwrap();
        assert_eq!(config.runtime_endpoint.as_str(), "http://localhost:2375/");
        assert_eq!(config.connect_timeout, 10);
        assert!(config.wildcard_domains.is_empty());
        assert!(config.debug.is_empty());
        assert!(config.model_output.is_none());
    }

    #[test]
    fn parses_lists() {
        let config = Config::try_parse_from([
            "vhostwatch",
            "--wildcard-domains",
            "example.com,example.org",
            "--debug",
            "containers,hostnames",
        ])
        .unwrap();
        assert_eq!(config.wildcard_domains, vec!["example.com", "example.org"]);
        assert_eq!(
            config.debug,
            vec![DebugTarget::Containers, DebugTarget::Hostnames]
        );
    }

    #[test]
    fn rejects_invalid_endpoint() {
        assert!(Config::try_parse_from(["vhostwatch", "--runtime-endpoint", "not a url"]).is_err());
    }
}
