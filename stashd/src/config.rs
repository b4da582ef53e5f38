//! Daemon configuration.
//!
//! Loads configuration from environment variables with sensible defaults.

use crate::error::{DaemonError, DaemonResult};
use stash_engine::Policy;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

// =============================================================================
// Configuration
// =============================================================================

/// Daemon configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Control API
    pub api: ListenConfig,

    /// Bot TCP listener
    pub bots: ListenConfig,

    /// Ledger storage
    pub store: StoreConfig,

    /// Timing rules handed to the engine
    pub policy: Policy,

    /// Cadence of the slot, deposit and withdrawal sweeps
    pub sweep_interval: Duration,

    /// Environment (test, development, production)
    pub environment: Environment,
}

/// Address a listener binds to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenConfig {
    pub host: String,
    /// 0 lets the OS pick
    pub port: u16,
}

impl ListenConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Storage configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub database_url: String,
    /// Extra listings to seed at startup
    pub listings_file: Option<PathBuf>,
    /// Server the built-in listings are created for
    pub default_server: String,
}

/// Environment type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Test,
    Development,
    Production,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> DaemonResult<Self> {
        // Load .env file if present (ignore errors)
        let _ = dotenvy::dotenv();

        let defaults = Self::default();
        let environment = Self::load_environment()?;

        let api = ListenConfig {
            host: env::var("STASH_API_HOST").unwrap_or(defaults.api.host),
            port: load_env("STASH_API_PORT", defaults.api.port)?,
        };
        let bots = ListenConfig {
            host: env::var("STASH_BOT_HOST").unwrap_or(defaults.bots.host),
            port: load_env("STASH_BOT_PORT", defaults.bots.port)?,
        };
        let store = StoreConfig {
            database_url: env::var("STASH_DATABASE_URL").unwrap_or(defaults.store.database_url),
            listings_file: env::var("STASH_LISTINGS_FILE").ok().map(PathBuf::from),
            default_server: env::var("STASH_DEFAULT_SERVER").unwrap_or(defaults.store.default_server),
        };
        let policy = Policy {
            deposit_ttl_secs: load_env("STASH_DEPOSIT_TTL_SECS", defaults.policy.deposit_ttl_secs)?,
            withdrawal_ttl_secs: load_env("STASH_WITHDRAWAL_TTL_SECS", defaults.policy.withdrawal_ttl_secs)?,
            ..defaults.policy
        };
        let sweep_secs = load_env("STASH_SWEEP_INTERVAL_SECS", defaults.sweep_interval.as_secs())?;
        if sweep_secs == 0 {
            return Err(DaemonError::Config("STASH_SWEEP_INTERVAL_SECS must be positive".to_string()));
        }

        Ok(Self {
            api,
            bots,
            store,
            policy,
            sweep_interval: Duration::from_secs(sweep_secs),
            environment,
        })
    }

    /// Create test configuration: in-memory storage, OS-assigned ports.
    pub fn test() -> Self {
        Self {
            api: ListenConfig {
                host: "127.0.0.1".to_string(),
                port: 0,
            },
            bots: ListenConfig {
                host: "127.0.0.1".to_string(),
                port: 0,
            },
            store: StoreConfig {
                database_url: "sqlite::memory:".to_string(),
                listings_file: None,
                default_server: "2b2t.org".to_string(),
            },
            policy: Policy::default(),
            sweep_interval: Duration::from_secs(1),
            environment: Environment::Test,
        }
    }

    fn load_environment() -> DaemonResult<Environment> {
        let env_str = env::var("STASH_ENV").unwrap_or_else(|_| "development".to_string());
        env_str.parse()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api: ListenConfig {
                host: "0.0.0.0".to_string(),
                port: 3000,
            },
            bots: ListenConfig {
                host: "0.0.0.0".to_string(),
                port: 5021,
            },
            store: StoreConfig {
                database_url: "sqlite://exchange.db".to_string(),
                listings_file: None,
                default_server: "2b2t.org".to_string(),
            },
            policy: Policy::default(),
            sweep_interval: Duration::from_secs(10),
            environment: Environment::Development,
        }
    }
}

fn load_env<T: FromStr>(key: &str, default: T) -> DaemonResult<T> {
    match env::var(key) {
        Ok(val) => parse_value(key, &val),
        Err(_) => Ok(default),
    }
}

fn parse_value<T: FromStr>(key: &str, raw: &str) -> DaemonResult<T> {
    raw.trim()
        .parse()
        .map_err(|_| DaemonError::Config(format!("Invalid {} value: {}", key, raw)))
}

impl FromStr for Environment {
    type Err = DaemonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "test" => Ok(Environment::Test),
            "development" | "dev" => Ok(Environment::Development),
            "production" | "prod" => Ok(Environment::Production),
            other => Err(DaemonError::Config(format!(
                "Invalid STASH_ENV: {}. Expected: test, development, production",
                other
            ))),
        }
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Test => write!(f, "test"),
            Environment::Development => write!(f, "development"),
            Environment::Production => write!(f, "production"),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
