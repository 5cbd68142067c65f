use std::env;
use std::time::Duration;

use thiserror::Error;

use crate::broker::BrokerHost;
use crate::consumer::ConsumerOptions;
use crate::discovery::{DiscoveryOptions, QuiescencePolicy};
use crate::stomp::ConnectOptions;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("Config error: {key} must be valid (got '{value}')")]
    Invalid { key: String, value: String },
}

// --- CONFIG AGGREGATOR ---

#[derive(Debug, Clone)]
pub struct Config {
    pub broker: BrokerConfig,
    pub discovery: DiscoveryConfig,
    pub publisher: PublisherConfig,
    pub consumer: ConsumerConfig,
    pub log: LogConfig,
}

impl Config {
    /// Reads the process environment, after loading `.env` if present.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let src = Source(&lookup);
        Ok(Self {
            broker: BrokerConfig::load(&src)?,
            discovery: DiscoveryConfig::load(&src)?,
            publisher: PublisherConfig::load(&src)?,
            consumer: ConsumerConfig::load(&src)?,
            log: LogConfig::load(&src)?,
        })
    }
}

// --- MODULES ---

// BROKER
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    pub primary_host: String,
    pub secondary_host: Option<String>,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub use_tls: bool,
    pub destination: String,
    pub connect_timeout_ms: u64,
    pub heartbeat_ms: u64,
    pub receipt_timeout_ms: u64,
}

impl BrokerConfig {
    fn load(src: &Source) -> Result<Self, ConfigError> {
        let primary_host = src
            .raw("ACTIVEMQ_URL")
            .or_else(|| src.raw("ACTIVEMQ_HOST"))
            .unwrap_or_else(|| "localhost".to_string());
        let secondary_host = src
            .raw("ACTIVEMQ_URL_SECONDARY")
            .filter(|h| !h.trim().is_empty());

        Ok(Self {
            primary_host,
            secondary_host,
            port:               src.get("ACTIVEMQ_PORT", "61614")?,
            username:           src.get("ACTIVEMQ_USERNAME", "admin")?,
            password:           src.get("ACTIVEMQ_PASSWORD", "admin")?,
            use_tls:            src.flag("USE_SSL", "true"),
            destination:        src.get("ACTIVEMQ_QUEUE", "/queue/test-queue")?,
            connect_timeout_ms: src.get("ACTIVEMQ_CONNECT_TIMEOUT_MS", "10000")?,
            heartbeat_ms:       src.get("ACTIVEMQ_HEARTBEAT_MS", "10000")?,
            receipt_timeout_ms: src.get("ACTIVEMQ_RECEIPT_TIMEOUT_MS", "5000")?,
        })
    }

    /// Primary first; the secondary shares the port.
    pub fn hosts(&self) -> Vec<BrokerHost> {
        let mut hosts = vec![BrokerHost::new(self.primary_host.clone(), self.port)];
        if let Some(secondary) = &self.secondary_host {
            hosts.push(BrokerHost::new(secondary.clone(), self.port));
        }
        hosts
    }

    pub fn connect_options(&self) -> ConnectOptions {
        ConnectOptions {
            login: Some(self.username.clone()),
            passcode: Some(self.password.clone()),
            use_tls: self.use_tls,
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
            heartbeat: (self.heartbeat_ms, self.heartbeat_ms),
            receipt_timeout: Duration::from_millis(self.receipt_timeout_ms),
            virtual_host: None,
        }
    }
}

// DISCOVERY
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    pub timeout_secs: u64,
    pub quiet_secs: u64,
}

impl DiscoveryConfig {
    fn load(src: &Source) -> Result<Self, ConfigError> {
        Ok(Self {
            timeout_secs: src.get("DISCOVERY_TIMEOUT_SECS", "15")?,
            quiet_secs:   src.get("DISCOVERY_QUIET_SECS", "3")?,
        })
    }

    pub fn options(&self) -> DiscoveryOptions {
        DiscoveryOptions {
            policy: QuiescencePolicy {
                ceiling: Duration::from_secs(self.timeout_secs),
                quiet_period: Duration::from_secs(self.quiet_secs),
            },
            ..DiscoveryOptions::default()
        }
    }
}

// PUBLISHER
#[derive(Debug, Clone)]
pub struct PublisherConfig {
    pub host: String,
    pub port: u16,
}

impl PublisherConfig {
    fn load(src: &Source) -> Result<Self, ConfigError> {
        Ok(Self {
            host: src.get("PUBLISHER_HOST", "0.0.0.0")?,
            port: src.get("PUBLISHER_PORT", "5000")?,
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

// CONSUMER
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    pub retry_secs: u64,
    pub prefetch: u32,
}

impl ConsumerConfig {
    fn load(src: &Source) -> Result<Self, ConfigError> {
        Ok(Self {
            retry_secs: src.get("CONSUMER_RETRY_SECS", "3")?,
            prefetch:   src.get("CONSUMER_PREFETCH", "1")?,
        })
    }

    pub fn options(&self, destination: &str) -> ConsumerOptions {
        ConsumerOptions {
            destination: destination.to_string(),
            prefetch: self.prefetch,
            retry_backoff: Duration::from_secs(self.retry_secs),
        }
    }
}

// LOG
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub level: String,
}

impl LogConfig {
    fn load(src: &Source) -> Result<Self, ConfigError> {
        Ok(Self {
            level: src.get("AMQPROBE_LOG", "info")?,
        })
    }
}

// --- PRIVATE HELPER ---

struct Source<'a>(&'a dyn Fn(&str) -> Option<String>);

impl Source<'_> {
    fn raw(&self, key: &str) -> Option<String> {
        (self.0)(key)
    }

    fn get<T: std::str::FromStr>(&self, key: &str, default: &str) -> Result<T, ConfigError> {
        let value = self.raw(key).unwrap_or_else(|| default.to_string());
        value.parse().map_err(|_| ConfigError::Invalid {
            key: key.to_string(),
            value,
        })
    }

    /// Only a case-insensitive `true` enables the flag.
    fn flag(&self, key: &str, default: &str) -> bool {
        self.raw(key)
            .unwrap_or_else(|| default.to_string())
            .eq_ignore_ascii_case("true")
    }
}
