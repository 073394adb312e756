//! Gateway configuration
//!
//! TOML configuration with sections for the front-end listener, the
//! upstream resolver, the optional DoH transport (with proxy and OAuth2
//! sub-sections) and the deny-list filter.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Main configuration structure
///
/// # Example Configuration
///
/// ```toml
/// [listen]
/// bind = "127.0.0.1:5353"
///
/// [resolver]
/// server = "8.8.8.8:53"
///
/// [filter]
/// deny_list = "deny.txt"
///
/// [doh]
/// url = "https://dns.example.com/dns-query"
/// no_pad = false
///
/// [doh.proxy]
/// url = "https://doh-proxy.example.net"
/// aead = true
///
/// [doh.oauth2]
/// token_url = "https://auth.example.net/oauth2/token"
/// client_id = "veildns"
/// client_secret = "..."
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub listen: ListenConfig,

    #[serde(default)]
    pub resolver: ResolverConfig,

    /// DoH transport; queries stay on classic UDP when absent
    pub doh: Option<DohConfig>,

    #[serde(default)]
    pub filter: FilterConfig,
}

/// Front-end listener settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListenConfig {
    /// UDP address the front-end binds
    pub bind: String,
}

impl Default for ListenConfig {
    fn default() -> Self {
        ListenConfig {
            bind: "127.0.0.1:5353".into(),
        }
    }
}

/// Upstream classic resolver settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// `host:port` of the UDP resolver
    pub server: String,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        ResolverConfig {
            server: "8.8.8.8:53".into(),
        }
    }
}

/// DoH transport settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DohConfig {
    /// RFC 8484 endpoint URL
    pub url: String,

    /// Disable RFC 8467 padding
    #[serde(default)]
    pub no_pad: bool,

    pub proxy: Option<ProxyConfig>,

    pub oauth2: Option<OAuth2Config>,
}

/// DoH proxy settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// Proxy base URL
    pub url: String,

    /// Wrap proxied queries in the AEAD channel
    #[serde(default)]
    pub aead: bool,
}

/// OAuth2 client-credentials settings for the proxy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuth2Config {
    pub token_url: String,
    pub client_id: String,
    pub client_secret: String,
}

/// Deny-list filter settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Path to the deny-list file; no filtering when absent
    pub deny_list: Option<PathBuf>,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.resolver.server.is_empty() {
            return Err(Error::Config("resolver server is required".into()));
        }
        if self.listen.bind.is_empty() {
            return Err(Error::Config("listen bind address is required".into()));
        }

        if let Some(doh) = &self.doh {
            if !doh.url.starts_with("https://") {
                return Err(Error::Config(format!(
                    "DoH URL '{}' must be https",
                    doh.url
                )));
            }
            if let Some(proxy) = &doh.proxy {
                if !proxy.url.starts_with("https://") {
                    return Err(Error::Config(format!(
                        "DoH proxy URL '{}' must be https",
                        proxy.url
                    )));
                }
                if doh.oauth2.is_none() {
                    return Err(Error::Config(
                        "DoH proxy requires an [doh.oauth2] section".into(),
                    ));
                }
            }
        }
        Ok(())
    }

    /// Generate a sample configuration
    pub fn sample() -> String {
        r#"# veildns configuration

[listen]
# UDP address the DNS front-end binds
bind = "127.0.0.1:5353"

[resolver]
# Classic upstream resolver, host:port
server = "8.8.8.8:53"

[filter]
# Deny-list file: one dotted pattern per line, `*` matches one or more
# labels, `**` matches any number. Lines starting with # are comments.
#deny_list = "deny.txt"

# Uncomment to send non-passthrough queries over DNS-over-HTTPS.
#[doh]
#url = "https://dns.example.com/dns-query"
# Disable RFC 8467 padding
#no_pad = false

# Route DoH queries through an authenticated proxy.
#[doh.proxy]
#url = "https://doh-proxy.example.net"
# Wrap proxied queries in an encrypted session with the proxy
#aead = true

#[doh.oauth2]
#token_url = "https://auth.example.net/oauth2/token"
#client_id = "veildns"
#client_secret = "change-me"
"#
        .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.listen.bind, "127.0.0.1:5353");
        assert_eq!(config.resolver.server, "8.8.8.8:53");
        assert!(config.doh.is_none());
        assert!(config.filter.deny_list.is_none());
    }

    #[test]
    fn test_sample_parses() {
        let config = Config::from_toml(&Config::sample()).unwrap();
        assert!(config.doh.is_none());
    }

    #[test]
    fn test_full_config() {
        let config = Config::from_toml(
            r#"
[listen]
bind = "0.0.0.0:53"

[resolver]
server = "[2001:4860:4860::8888]:53"

[filter]
deny_list = "/etc/veildns/deny.txt"

[doh]
url = "https://dns.example.com/dns-query"
no_pad = true

[doh.proxy]
url = "https://proxy.example.net"
aead = true

[doh.oauth2]
token_url = "https://auth.example.net/token"
client_id = "id"
client_secret = "secret"
"#,
        )
        .unwrap();

        let doh = config.doh.unwrap();
        assert!(doh.no_pad);
        assert!(doh.proxy.as_ref().unwrap().aead);
        assert_eq!(doh.oauth2.unwrap().client_id, "id");
    }

    #[test]
    fn test_proxy_requires_oauth2() {
        let result = Config::from_toml(
            r#"
[doh]
url = "https://dns.example.com/dns-query"

[doh.proxy]
url = "https://proxy.example.net"
"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_doh_must_be_https() {
        let result = Config::from_toml(
            r#"
[doh]
url = "http://dns.example.com/dns-query"
"#,
        );
        assert!(result.is_err());
    }
}
