//! Configuration management

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub telephony: TelephonyConfig,
    pub voice_agent: VoiceAgentConfig,
    pub routing: RoutingDefaults,
    pub warm_transfer: WarmTransferConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Externally reachable base URL, used to build webhook action URLs
    /// and as a signature validation candidate behind proxies.
    pub public_base_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelephonyConfig {
    pub api_base: String,
    pub account_sid: String,
    pub auth_token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceAgentConfig {
    pub api_base: String,
    pub api_key: String,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingDefaults {
    pub default_country: String,
    pub default_timezone: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WarmTransferConfig {
    /// Shared secret expected in the X-Transfer-Secret header.
    pub secret: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            database: DatabaseConfig::default(),
            telephony: TelephonyConfig::default(),
            voice_agent: VoiceAgentConfig::default(),
            routing: RoutingDefaults::default(),
            warm_transfer: WarmTransferConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            public_base_url: "http://localhost:8080".to_string(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgres://postgres@localhost/ringline".to_string(),
        }
    }
}

impl Default for TelephonyConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.twilio.com/2010-04-01".to_string(),
            account_sid: String::new(),
            auth_token: String::new(),
        }
    }
}

impl Default for VoiceAgentConfig {
    fn default() -> Self {
        Self {
            api_base: "http://localhost:9090".to_string(),
            api_key: String::new(),
            request_timeout_secs: 10,
        }
    }
}

impl Default for RoutingDefaults {
    fn default() -> Self {
        Self {
            default_country: "US".to_string(),
            default_timezone: "UTC".to_string(),
        }
    }
}

impl Default for WarmTransferConfig {
    fn default() -> Self {
        Self {
            secret: String::new(),
        }
    }
}

impl Config {
    /// Load configuration from an optional TOML file (RINGLINE_CONFIG)
    /// with RINGLINE_* environment variable overrides on top.
    pub fn load() -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        if let Ok(path) = std::env::var("RINGLINE_CONFIG") {
            builder = builder.add_source(config::File::with_name(&path));
        }

        let settings = builder
            .add_source(
                config::Environment::with_prefix("RINGLINE")
                    .separator("__"),
            )
            .build()?;

        settings.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.routing.default_country, "US");
        assert_eq!(config.routing.default_timezone, "UTC");
        assert_eq!(config.voice_agent.request_timeout_secs, 10);
    }

    #[test]
    fn test_toml_round_trip() {
        let config = Config::default();
        let serialized = toml::to_string(&config).unwrap();
        let parsed: Config = toml::from_str(&serialized).unwrap();
        assert_eq!(parsed.server.public_base_url, config.server.public_base_url);
    }
}
