//! Gateway configuration.
//!
//! Loaded from a TOML file whose string values may reference environment
//! variables as `$VAR` or `${VAR}`. A `.env` file in the working directory is
//! read first, so the verifier key can live there instead of in the TOML.
//!
//! # Example Configuration
//!
//! ```toml
//! host = "0.0.0.0"
//! port = 4021
//! api_key = "$P2PAY_VERIFIER_API_KEY"
//! verifier_url = "https://api.zkp2p.xyz/v1"
//! request_timeout_secs = 20
//!
//! [rpc_urls]
//! 8453 = "https://base.example-rpc.com"
//! ```
//!
//! # Environment Variables
//!
//! - `CONFIG` - Path to configuration file (default: `config.toml`)
//! - `HOST` - Override server bind address
//! - `PORT` - Override server port

use std::collections::HashMap;
use std::net::IpAddr;
use std::path::Path;
use std::time::Duration;

use p2pay_http::ApiKey;
use serde::Deserialize;

/// Top-level gateway configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    /// Server bind address (default: `0.0.0.0`).
    #[serde(default = "default_host")]
    pub host: IpAddr,

    /// Server port (default: `4021`).
    #[serde(default = "default_port")]
    pub port: u16,

    /// Verifier credential. `POST /verify/intent` is disabled without it.
    #[serde(default)]
    pub api_key: Option<ApiKey>,

    /// Verifier base URL (default: the public API).
    #[serde(default)]
    pub verifier_url: Option<String>,

    /// Timeout for upstream verifier and RPC requests.
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,

    /// RPC endpoints keyed by chain id, overriding the built-in registry.
    #[serde(default)]
    pub rpc_urls: HashMap<String, String>,
}

fn default_host() -> IpAddr {
    IpAddr::V4(std::net::Ipv4Addr::new(0, 0, 0, 0))
}

const fn default_port() -> u16 {
    4021
}

impl GatewayConfig {
    /// Loads configuration from the path in `CONFIG`, falling back to
    /// `config.toml` in the current directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load() -> Result<Self, Box<dyn std::error::Error>> {
        let path = std::env::var("CONFIG").unwrap_or_else(|_| "config.toml".to_owned());
        Self::load_from(&path)
    }

    /// Loads configuration from a specific file path.
    ///
    /// A missing file yields the defaults. `HOST` and `PORT` override the
    /// file values.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_from(path: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let content = if Path::new(path).exists() {
            std::fs::read_to_string(path)?
        } else {
            String::new()
        };
        let mut config = Self::parse(&content)?;

        if let Ok(host) = std::env::var("HOST")
            && let Ok(addr) = host.parse()
        {
            config.host = addr;
        }
        if let Ok(port) = std::env::var("PORT")
            && let Ok(port) = port.parse()
        {
            config.port = port;
        }
        Ok(config)
    }

    /// Parses TOML after expanding environment references.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid.
    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        let mut config: Self = toml::from_str(&expand_env_vars(content))?;
        if config
            .api_key
            .as_ref()
            .is_some_and(|key| key.is_empty() || key.is_unresolved())
        {
            config.api_key = None;
        }
        Ok(config)
    }

    /// The upstream request timeout, if configured.
    #[must_use]
    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }

    /// RPC overrides with their chain ids parsed; malformed keys are skipped.
    #[must_use]
    pub fn rpc_overrides(&self) -> HashMap<u64, String> {
        self.rpc_urls
            .iter()
            .filter_map(|(chain, url)| Some((chain.trim().parse().ok()?, url.clone())))
            .collect()
    }
}

/// Expands `$VAR` and `${VAR}` patterns from the process environment.
///
/// Unresolved variables are left as-is.
fn expand_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch != '$' {
            result.push(ch);
            continue;
        }
        let braced = chars.next_if_eq(&'{').is_some();
        let mut name = String::new();
        while let Some(&c) = chars.peek() {
            if braced && c == '}' {
                chars.next();
                break;
            }
            if !braced && !c.is_ascii_alphanumeric() && c != '_' {
                break;
            }
            name.push(c);
            chars.next();
        }

        match std::env::var(&name) {
            Ok(value) if !name.is_empty() => result.push_str(&value),
            _ if braced => {
                result.push_str("${");
                result.push_str(&name);
                if !name.is_empty() {
                    result.push('}');
                }
            }
            _ => {
                result.push('$');
                result.push_str(&name);
            }
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_file() {
        let config = GatewayConfig::parse("").unwrap();
        assert_eq!(config.port, 4021);
        assert!(config.api_key.is_none());
        assert!(config.request_timeout().is_none());
    }

    #[test]
    fn test_expands_known_variables() {
        let Ok(path) = std::env::var("PATH") else {
            return;
        };
        assert_eq!(expand_env_vars("a=$PATH"), format!("a={path}"));
        assert_eq!(expand_env_vars("a=${PATH}!"), format!("a={path}!"));
    }

    #[test]
    fn test_unresolved_variables_are_kept() {
        assert_eq!(
            expand_env_vars("k = \"$P2PAY_TEST_SURELY_UNSET\""),
            "k = \"$P2PAY_TEST_SURELY_UNSET\""
        );
        assert_eq!(
            expand_env_vars("${P2PAY_TEST_SURELY_UNSET}"),
            "${P2PAY_TEST_SURELY_UNSET}"
        );
        assert_eq!(expand_env_vars("cost: $"), "cost: $");
    }

    #[test]
    fn test_unresolved_api_key_disables_verification() {
        let config = GatewayConfig::parse("api_key = \"$P2PAY_TEST_SURELY_UNSET\"").unwrap();
        assert!(config.api_key.is_none());
    }

    #[test]
    fn test_literal_api_key_and_overrides() {
        let config = GatewayConfig::parse(
            r#"
            api_key = "sk_test"
            request_timeout_secs = 5

            [rpc_urls]
            8453 = "http://localhost:8545"
            bogus = "http://ignored"
            "#,
        )
        .unwrap();
        assert!(config.api_key.is_some());
        assert!(!format!("{config:?}").contains("sk_test"));
        assert_eq!(config.request_timeout(), Some(Duration::from_secs(5)));
        let overrides = config.rpc_overrides();
        assert_eq!(overrides.len(), 1);
        assert_eq!(overrides[&8453], "http://localhost:8545");
    }
}
