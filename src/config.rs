//! Configuration types.

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use crate::error::ConfigError;

/// Default wait before an in-progress stage completes.
pub const DEFAULT_STEP_DELAY: Duration = Duration::from_secs(3);

/// Sequencer configuration.
#[derive(Debug, Clone)]
pub struct SequencerConfig {
    /// Simulated work time per stage.
    pub step_delay: Duration,
    /// Capacity of the event broadcast channel.
    pub event_capacity: usize,
}

impl Default for SequencerConfig {
    fn default() -> Self {
        Self {
            step_delay: DEFAULT_STEP_DELAY,
            event_capacity: 64,
        }
    }
}

impl SequencerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Ok(raw) = std::env::var("DEALER_ONBOARDING_STEP_DELAY_MS") {
            config.step_delay = parse_step_delay(&raw)?;
        }
        Ok(config)
    }

    pub fn with_step_delay(mut self, step_delay: Duration) -> Self {
        self.step_delay = step_delay;
        self
    }
}

fn parse_step_delay(raw: &str) -> Result<Duration, ConfigError> {
    let invalid = |message: &str| ConfigError::InvalidValue {
        key: "DEALER_ONBOARDING_STEP_DELAY_MS".to_string(),
        message: message.to_string(),
    };
    let ms: u64 = raw
        .trim()
        .parse()
        .map_err(|_| invalid("expected a whole number of milliseconds"))?;
    if ms == 0 {
        return Err(invalid("must be greater than zero"));
    }
    Ok(Duration::from_millis(ms))
}

/// HTTP server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
    /// Allowed browser origins. `*` allows any; empty means localhost only.
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: 8080,
            cors_origins: Vec::new(),
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let bind = std::env::var("DEALER_ONBOARDING_BIND").unwrap_or(defaults.bind);
        let port = match std::env::var("DEALER_ONBOARDING_PORT") {
            Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
                key: "DEALER_ONBOARDING_PORT".to_string(),
                message: format!("not a valid port: {raw}"),
            })?,
            Err(_) => defaults.port,
        };
        let cors_origins = std::env::var("DEALER_ONBOARDING_CORS_ORIGINS")
            .map(|raw| parse_origins(&raw))
            .unwrap_or_default();
        let config = Self {
            bind,
            port,
            cors_origins,
        };
        config.socket_addr()?;
        Ok(config)
    }

    /// `bind` may be IPv4 or IPv6 (`::`), without brackets.
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        let ip: IpAddr = self
            .bind
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue {
                key: "DEALER_ONBOARDING_BIND".to_string(),
                message: format!("not a valid IP address: {}", self.bind),
            })?;
        Ok(SocketAddr::new(ip, self.port))
    }
}

fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_step_delay_is_three_seconds() {
        assert_eq!(SequencerConfig::default().step_delay, Duration::from_secs(3));
    }

    #[test]
    fn step_delay_parses_milliseconds() {
        assert_eq!(parse_step_delay("250").unwrap(), Duration::from_millis(250));
        assert_eq!(parse_step_delay(" 3000 ").unwrap(), Duration::from_secs(3));
    }

    #[test]
    fn step_delay_rejects_zero_and_garbage() {
        assert!(parse_step_delay("0").is_err());
        assert!(parse_step_delay("-5").is_err());
        let err = parse_step_delay("soon").unwrap_err();
        assert!(err.to_string().contains("DEALER_ONBOARDING_STEP_DELAY_MS"));
    }

    #[test]
    fn server_socket_addr() {
        let config = ServerConfig::default();
        assert_eq!(config.socket_addr().unwrap().port(), 8080);

        let bad = ServerConfig {
            bind: "not-an-ip".to_string(),
            port: 80,
            cors_origins: Vec::new(),
        };
        assert!(bad.socket_addr().is_err());
    }

    #[test]
    fn server_socket_addr_accepts_ipv6_bind() {
        let config = ServerConfig {
            bind: "::".to_string(),
            port: 8080,
            cors_origins: Vec::new(),
        };
        let addr = config.socket_addr().unwrap();
        assert!(addr.is_ipv6());
        assert!(addr.ip().is_unspecified());
        assert_eq!(addr.to_string(), "[::]:8080");

        let loopback = ServerConfig {
            bind: "::1".to_string(),
            ..config
        };
        assert_eq!(loopback.socket_addr().unwrap().to_string(), "[::1]:8080");
    }

    #[test]
    fn origins_split_on_commas() {
        assert_eq!(
            parse_origins("http://localhost:3000, https://dealers.example.com,,"),
            vec!["http://localhost:3000", "https://dealers.example.com"]
        );
        assert!(parse_origins("  ").is_empty());
    }
}
