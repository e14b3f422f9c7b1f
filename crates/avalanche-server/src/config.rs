// ============================================
// File: crates/avalanche-server/src/config.rs
// ============================================
//! # Server Configuration
//!
//! ## Creation Reason
//! Provides configuration management for the game server front door,
//! loaded from a TOML file.
//!
//! ## Main Functionality
//! - `ServerConfig`: Main configuration structure
//! - TOML file loading and parsing
//! - Configuration validation
//! - Conversion into the transport's typed `ListenerConfig`
//!
//! ## Configuration Sections
//! - `network`: Bind address, port and socket options
//! - `limits`: Admission limit, buffer size, timeouts
//! - `rate_limit`: Per-address connection rate limiting
//! - `key_exchange`: Diffie-Hellman parameters and prime pool
//! - `cipher`: Stream cipher selection and wire footers
//! - `logging`: Log level
//!
//! ## Example Configuration
//! ```toml
//! [network]
//! bind_address = "0.0.0.0"
//! port = 5816
//!
//! [limits]
//! max_connections = 1000
//! receive_buffer_size = 4096
//!
//! [rate_limit]
//! window_secs = 60
//! max_attempts = 30
//! block_secs = 900
//!
//! [cipher]
//! kind = "block_feedback"
//! server_footer = "TQServer"
//! client_footer_length = 8
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - All config changes require server restart
//! - `load` rejects port 0; `from_str` accepts it so tests can bind
//!   ephemeral ports
//! - The cipher footers must match what deployed clients send and expect
//!
//! ## Last Modified
//! v0.1.0 - Initial configuration implementation

use std::path::Path;
use std::time::Duration;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::info;

use avalanche_common::validate;
use avalanche_core::crypto::cipher::block_feedback::{DEFAULT_INITIAL_KEY, KEY_SIZE};
use avalanche_core::crypto::exchange::{DEFAULT_GENERATOR, DEFAULT_PRIMITIVE_ROOT};
use avalanche_core::crypto::prime::{DEFAULT_PRIME_BITS, DEFAULT_QUEUE_CAPACITY};
use avalanche_core::crypto::KeyExchange;
use avalanche_core::protocol::HANDSHAKE_HEADER_SIZE;
use avalanche_transport::{ListenerConfig, RateLimitConfig};

use crate::error::{Result, ServerError};

/// Smallest prime size the exchange will draw.
const MIN_PRIME_BITS: u64 = 16;

// ============================================
// ServerConfig
// ============================================

/// Main server configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Network configuration.
    #[serde(default)]
    pub network: NetworkConfig,

    /// Resource limits.
    #[serde(default)]
    pub limits: LimitsConfig,

    /// Connection rate limiting.
    #[serde(default)]
    pub rate_limit: RateLimitSection,

    /// Key exchange parameters.
    #[serde(default)]
    pub key_exchange: KeyExchangeConfig,

    /// Stream cipher settings.
    #[serde(default)]
    pub cipher: CipherConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl ServerConfig {
    /// Loads configuration from a TOML file.
    ///
    /// # Arguments
    /// * `path` - Path to the configuration file
    ///
    /// # Errors
    /// Returns error if file cannot be read, parsed or validated.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let path_str = path.display().to_string();

        info!("Loading configuration from: {}", path_str);

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| ServerError::config_load(&path_str, e.to_string()))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| ServerError::config_load(&path_str, e.to_string()))?;

        config.validate()?;
        if config.network.port == 0 {
            return Err(ServerError::config_invalid("network.port", "cannot be 0"));
        }

        info!("Configuration loaded successfully");
        Ok(config)
    }

    /// Loads configuration from a string (useful for testing).
    ///
    /// # Errors
    /// Returns error if the string cannot be parsed or validated.
    pub fn from_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| ServerError::config_load("<string>", e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    /// Returns `ConfigInvalid` naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        self.network.validate()?;
        self.limits.validate()?;
        self.rate_limit.validate()?;
        self.key_exchange.validate()?;
        self.cipher.validate(&self.limits)?;
        Ok(())
    }

    /// Serializes configuration to TOML string.
    #[must_use]
    pub fn to_toml(&self) -> String {
        toml::to_string_pretty(self).unwrap_or_default()
    }

    /// Builds the transport's listener settings.
    #[must_use]
    pub fn to_listener_config(&self) -> ListenerConfig {
        ListenerConfig {
            bind_address: self.network.bind_address.clone(),
            port: self.network.port,
            backlog: self.network.backlog,
            no_delay: self.network.no_delay,
            dont_fragment: self.network.dont_fragment,
            max_connections: self.limits.max_connections,
            receive_buffer_size: self.limits.receive_buffer_size,
            receive_timeout: Duration::from_secs(self.limits.receive_timeout_secs),
            admission_wait: Duration::from_secs(self.limits.admission_wait_secs),
            server_footer: Bytes::from(self.cipher.server_footer.clone().into_bytes()),
            client_footer_len: self.cipher.client_footer_length,
            rate_limit: self.rate_limit.to_rate_limit_config(),
        }
    }
}

// ============================================
// NetworkConfig
// ============================================

/// Network configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Host to bind; "localhost" and "127.0.0.1" bind every interface.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// TCP port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Listen backlog.
    #[serde(default = "default_backlog")]
    pub backlog: u32,

    /// Disable Nagle's algorithm.
    #[serde(default = "default_true")]
    pub no_delay: bool,

    /// Set the IPv4 don't-fragment flag.
    #[serde(default)]
    pub dont_fragment: bool,
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5816
}

fn default_backlog() -> u32 {
    100
}

fn default_true() -> bool {
    true
}

impl NetworkConfig {
    fn validate(&self) -> Result<()> {
        validate::non_zero("network.backlog", self.backlog)?;
        Ok(())
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
            backlog: default_backlog(),
            no_delay: true,
            dont_fragment: false,
        }
    }
}

// ============================================
// LimitsConfig
// ============================================

/// Resource limits configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Maximum concurrent connections.
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    /// Receive buffer capacity per connection, in bytes.
    #[serde(default = "default_receive_buffer_size")]
    pub receive_buffer_size: usize,

    /// Idle seconds before a read times out.
    #[serde(default = "default_receive_timeout")]
    pub receive_timeout_secs: u64,

    /// Seconds one admission attempt waits before re-checking shutdown.
    #[serde(default = "default_admission_wait")]
    pub admission_wait_secs: u64,
}

fn default_max_connections() -> usize {
    1000
}

fn default_receive_buffer_size() -> usize {
    4096
}

fn default_receive_timeout() -> u64 {
    30
}

fn default_admission_wait() -> u64 {
    5
}

impl LimitsConfig {
    fn validate(&self) -> Result<()> {
        validate::non_zero("limits.max_connections", self.max_connections)?;
        validate::at_least(
            "limits.receive_buffer_size",
            self.receive_buffer_size,
            HANDSHAKE_HEADER_SIZE,
        )?;
        validate::non_zero("limits.receive_timeout_secs", self.receive_timeout_secs)?;
        validate::non_zero("limits.admission_wait_secs", self.admission_wait_secs)?;
        Ok(())
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
            receive_buffer_size: default_receive_buffer_size(),
            receive_timeout_secs: default_receive_timeout(),
            admission_wait_secs: default_admission_wait(),
        }
    }
}

// ============================================
// RateLimitSection
// ============================================

/// Rate limiting configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitSection {
    /// Counting window in seconds.
    #[serde(default = "default_window")]
    pub window_secs: u64,

    /// Connections allowed per address per window.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Seconds an address stays blocked.
    #[serde(default = "default_block")]
    pub block_secs: u64,
}

fn default_window() -> u64 {
    60
}

fn default_max_attempts() -> u32 {
    30
}

fn default_block() -> u64 {
    15 * 60
}

impl RateLimitSection {
    fn validate(&self) -> Result<()> {
        validate::non_zero("rate_limit.window_secs", self.window_secs)?;
        Ok(())
    }

    /// Converts to the transport's limiter settings.
    #[must_use]
    pub const fn to_rate_limit_config(&self) -> RateLimitConfig {
        RateLimitConfig {
            window: Duration::from_secs(self.window_secs),
            max_attempts: self.max_attempts,
            block_duration: Duration::from_secs(self.block_secs),
        }
    }
}

impl Default for RateLimitSection {
    fn default() -> Self {
        Self {
            window_secs: default_window(),
            max_attempts: default_max_attempts(),
            block_secs: default_block(),
        }
    }
}

// ============================================
// KeyExchangeConfig
// ============================================

/// Key exchange configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyExchangeConfig {
    /// Modulus `p`, hex.
    #[serde(default = "default_primitive_root")]
    pub primitive_root: String,

    /// Generator `g`, hex.
    #[serde(default = "default_generator")]
    pub generator: String,

    /// Bit length of the per-connection secret primes.
    #[serde(default = "default_prime_bits")]
    pub prime_bits: u64,

    /// Primes generated ahead of demand.
    #[serde(default = "default_prime_queue_capacity")]
    pub prime_queue_capacity: usize,

    /// Seconds a new connection waits for a prime before it is dropped.
    #[serde(default = "default_exchange_timeout")]
    pub exchange_timeout_secs: u64,
}

fn default_primitive_root() -> String {
    DEFAULT_PRIMITIVE_ROOT.to_string()
}

fn default_generator() -> String {
    DEFAULT_GENERATOR.to_string()
}

fn default_prime_bits() -> u64 {
    DEFAULT_PRIME_BITS
}

fn default_prime_queue_capacity() -> usize {
    DEFAULT_QUEUE_CAPACITY
}

fn default_exchange_timeout() -> u64 {
    10
}

impl KeyExchangeConfig {
    fn validate(&self) -> Result<()> {
        self.template()?;

        validate::at_least("key_exchange.prime_bits", self.prime_bits, MIN_PRIME_BITS)?;
        validate::non_zero("key_exchange.prime_queue_capacity", self.prime_queue_capacity)?;
        validate::non_zero("key_exchange.exchange_timeout_secs", self.exchange_timeout_secs)?;
        Ok(())
    }

    /// Builds an unused exchange carrying the configured `p` and `g`.
    ///
    /// # Errors
    /// Returns `ConfigInvalid` if either value is not a usable hex integer.
    pub fn template(&self) -> Result<KeyExchange> {
        KeyExchange::from_hex(&self.primitive_root, &self.generator)
            .map_err(|e| ServerError::config_invalid("key_exchange", e.to_string()))
    }

    /// Prime wait bound as a `Duration`.
    #[must_use]
    pub const fn exchange_timeout(&self) -> Duration {
        Duration::from_secs(self.exchange_timeout_secs)
    }
}

impl Default for KeyExchangeConfig {
    fn default() -> Self {
        Self {
            primitive_root: default_primitive_root(),
            generator: default_generator(),
            prime_bits: default_prime_bits(),
            prime_queue_capacity: default_prime_queue_capacity(),
            exchange_timeout_secs: default_exchange_timeout(),
        }
    }
}

// ============================================
// CipherConfig
// ============================================

/// Which stream cipher protects connections.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CipherKind {
    /// CAST5 in 64-bit feedback mode.
    #[default]
    BlockFeedback,
    /// Table-driven substitution cipher.
    Substitution,
}

/// Cipher configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CipherConfig {
    /// Cipher selection.
    #[serde(default)]
    pub kind: CipherKind,

    /// Key used by the block feedback cipher until the exchange completes.
    #[serde(default = "default_initial_key")]
    pub initial_key: String,

    /// Footer appended to every frame the server sends.
    #[serde(default = "default_server_footer")]
    pub server_footer: String,

    /// Footer length trailing every frame a client sends.
    #[serde(default = "default_client_footer_length")]
    pub client_footer_length: usize,
}

fn default_initial_key() -> String {
    String::from_utf8_lossy(DEFAULT_INITIAL_KEY).into_owned()
}

fn default_server_footer() -> String {
    "TQServer".to_string()
}

fn default_client_footer_length() -> usize {
    8
}

impl CipherConfig {
    fn validate(&self, limits: &LimitsConfig) -> Result<()> {
        if self.kind == CipherKind::BlockFeedback && self.initial_key.len() != KEY_SIZE {
            return Err(ServerError::config_invalid(
                "cipher.initial_key",
                format!("must be exactly {KEY_SIZE} bytes"),
            ));
        }

        if self.client_footer_length >= limits.receive_buffer_size {
            return Err(ServerError::config_invalid(
                "cipher.client_footer_length",
                "must be smaller than limits.receive_buffer_size",
            ));
        }

        Ok(())
    }
}

impl Default for CipherConfig {
    fn default() -> Self {
        Self {
            kind: CipherKind::default(),
            initial_key: default_initial_key(),
            server_footer: default_server_footer(),
            client_footer_length: default_client_footer_length(),
        }
    }
}

// ============================================
// LoggingConfig
// ============================================

/// Logging configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.cipher.initial_key, "BC234xs45nme7HU9");
        assert_eq!(config.cipher.kind, CipherKind::BlockFeedback);
    }

    #[test]
    fn test_full_config_format() {
        let toml = r#"
            [network]
            bind_address = "10.0.0.5"
            port = 9958
            backlog = 50
            no_delay = false
            dont_fragment = true

            [limits]
            max_connections = 250
            receive_buffer_size = 2048
            receive_timeout_secs = 60
            admission_wait_secs = 2

            [rate_limit]
            window_secs = 30
            max_attempts = 10
            block_secs = 600

            [key_exchange]
            generator = "05"
            prime_bits = 128
            prime_queue_capacity = 16
            exchange_timeout_secs = 3

            [cipher]
            kind = "substitution"
            server_footer = "TQServer"
            client_footer_length = 8

            [logging]
            level = "debug"
        "#;

        let config = ServerConfig::from_str(toml).unwrap();
        assert_eq!(config.network.port, 9958);
        assert!(config.network.dont_fragment);
        assert_eq!(config.limits.max_connections, 250);
        assert_eq!(config.rate_limit.max_attempts, 10);
        assert_eq!(config.key_exchange.prime_bits, 128);
        assert_eq!(config.key_exchange.primitive_root, DEFAULT_PRIMITIVE_ROOT);
        assert_eq!(config.cipher.kind, CipherKind::Substitution);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_listener_config_conversion() {
        let config = ServerConfig::from_str(
            r#"
            [limits]
            receive_timeout_secs = 45

            [rate_limit]
            block_secs = 120
            "#,
        )
        .unwrap();

        let listener = config.to_listener_config();
        assert_eq!(listener.port, 5816);
        assert_eq!(listener.receive_timeout, Duration::from_secs(45));
        assert_eq!(listener.rate_limit.block_duration, Duration::from_secs(120));
        assert_eq!(&listener.server_footer[..], b"TQServer");
        assert_eq!(listener.client_footer_len, 8);
        assert!(listener.validate().is_ok());
    }

    #[test]
    fn test_rejects_bad_values() {
        let cases = [
            "[limits]\nmax_connections = 0",
            "[limits]\nreceive_buffer_size = 8",
            "[rate_limit]\nwindow_secs = 0",
            "[key_exchange]\nprimitive_root = \"not-hex\"",
            "[key_exchange]\nprime_bits = 0",
            "[cipher]\ninitial_key = \"short\"",
            "[cipher]\nkind = \"rot13\"",
            "[cipher]\nclient_footer_length = 4096",
        ];
        for case in cases {
            assert!(ServerConfig::from_str(case).is_err(), "accepted: {case}");
        }
    }

    #[test]
    fn test_range_errors_name_the_field() {
        let err = ServerConfig::from_str("[limits]\nreceive_timeout_secs = 0").unwrap_err();
        assert!(err.is_config_error());
        match err {
            ServerError::Common(inner) => assert_eq!(inner.field(), "limits.receive_timeout_secs"),
            other => panic!("unexpected error: {other}"),
        }

        let err = ServerConfig::from_str("[key_exchange]\nprime_bits = 8").unwrap_err();
        assert!(err.to_string().contains("key_exchange.prime_bits"));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_substitution_ignores_initial_key() {
        let config = ServerConfig::from_str(
            r#"
            [cipher]
            kind = "substitution"
            initial_key = ""
            "#,
        )
        .unwrap();
        assert_eq!(config.cipher.kind, CipherKind::Substitution);
    }

    #[test]
    fn test_ephemeral_port_only_from_str() {
        let config = ServerConfig::from_str("[network]\nport = 0").unwrap();
        assert_eq!(config.network.port, 0);
    }

    #[tokio::test]
    async fn test_load_rejects_port_zero() {
        let path = std::env::temp_dir().join(format!("avalanche-port0-{}.toml", std::process::id()));
        tokio::fs::write(&path, "[network]\nport = 0\n").await.unwrap();
        let result = ServerConfig::load(&path).await;
        let _ = tokio::fs::remove_file(&path).await;
        assert!(matches!(result, Err(ServerError::ConfigInvalid { .. })));
    }

    #[test]
    fn test_toml_roundtrip_keeps_kind() {
        let mut config = ServerConfig::default();
        config.cipher.kind = CipherKind::Substitution;
        let reparsed = ServerConfig::from_str(&config.to_toml()).unwrap();
        assert_eq!(reparsed.cipher.kind, CipherKind::Substitution);
    }
}
