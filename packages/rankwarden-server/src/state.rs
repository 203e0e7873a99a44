//! Server state management.
//!
//! Holds the engine, the command registry and the reply catalog. Cloned
//! into every request handler.

use std::sync::Arc;
use std::time::Duration;

use rankwarden_core::{CommandRegistry, Engine, EngineConfig, Error, Permissions, Result};

use crate::commands;
use crate::i18n::Translator;

/// Default store deadline in milliseconds.
const DEFAULT_STORE_TIMEOUT_MS: u64 = 3_000;

/// Default platform deadline in milliseconds.
const DEFAULT_PLATFORM_TIMEOUT_MS: u64 = 5_000;

/// Default rank cache staleness in seconds.
const DEFAULT_RANK_CACHE_TTL_SECS: u64 = 5;

/// Default leaderboard length.
const DEFAULT_LEADERBOARD_SIZE: usize = 10;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    /// SQLite file; in-memory when unset
    pub database_path: Option<String>,
    /// Platform REST base URL; in-memory membership when unset
    pub platform_url: Option<String>,
    pub platform_token: Option<String>,
    pub store_timeout_ms: u64,
    pub platform_timeout_ms: u64,
    pub rank_cache_ttl_secs: u64,
    /// Flag names or a decimal bitfield; roles carrying any of them are
    /// never mutated automatically
    pub dangerous_permissions: String,
    /// Stripped from command lines before resolution
    pub command_prefix: String,
    /// Whether the `invites` command applies the plan it shows
    pub auto_apply: bool,
    pub leaderboard_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            database_path: None,
            platform_url: None,
            platform_token: None,
            store_timeout_ms: DEFAULT_STORE_TIMEOUT_MS,
            platform_timeout_ms: DEFAULT_PLATFORM_TIMEOUT_MS,
            rank_cache_ttl_secs: DEFAULT_RANK_CACHE_TTL_SECS,
            dangerous_permissions: "administrator".to_string(),
            command_prefix: "!".to_string(),
            auto_apply: true,
            leaderboard_size: DEFAULT_LEADERBOARD_SIZE,
        }
    }
}

impl ServerConfig {
    /// Engine settings derived from this configuration.
    pub fn engine_config(&self) -> Result<EngineConfig> {
        let dangerous_permissions = Permissions::parse_list(&self.dangerous_permissions)
            .ok_or_else(|| {
                Error::Misconfiguration(format!(
                    "unknown permission in `{}`",
                    self.dangerous_permissions
                ))
            })?;

        Ok(EngineConfig {
            store_timeout: Duration::from_millis(self.store_timeout_ms),
            platform_timeout: Duration::from_millis(self.platform_timeout_ms),
            rank_cache_ttl: Duration::from_secs(self.rank_cache_ttl_secs),
            dangerous_permissions,
        })
    }
}

/// Shared server state.
#[derive(Clone)]
pub struct ServerState {
    /// The invite and rank engine.
    pub engine: Arc<Engine>,

    /// Chat commands this server answers.
    pub registry: Arc<CommandRegistry>,

    /// Reply templates.
    pub translator: Arc<Translator>,

    /// Server configuration.
    pub config: ServerConfig,
}

impl ServerState {
    /// Create state around an engine.
    pub fn new(engine: Engine, translator: Translator, config: ServerConfig) -> Result<Self> {
        Ok(Self {
            engine: Arc::new(engine),
            registry: Arc::new(commands::registry()?),
            translator: Arc::new(translator),
            config,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rankwarden_core::Permission;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.port, 8080);
        assert!(config.database_path.is_none());
        assert_eq!(config.command_prefix, "!");

        let engine = config.engine_config().unwrap();
        assert_eq!(engine.store_timeout, Duration::from_secs(3));
        assert_eq!(engine.rank_cache_ttl, Duration::from_secs(5));
        assert!(engine.dangerous_permissions.has(Permission::Administrator));
        assert!(!engine.dangerous_permissions.has(Permission::ManageRoles));
    }

    #[test]
    fn test_dangerous_permissions_parsing() {
        let config = ServerConfig {
            dangerous_permissions: "administrator, manage_roles".to_string(),
            ..ServerConfig::default()
        };
        let mask = config.engine_config().unwrap().dangerous_permissions;
        assert!(mask.has(Permission::ManageRoles));

        let none = ServerConfig {
            dangerous_permissions: String::new(),
            ..ServerConfig::default()
        };
        assert!(none.engine_config().unwrap().dangerous_permissions.is_empty());

        let bad = ServerConfig {
            dangerous_permissions: "root".to_string(),
            ..ServerConfig::default()
        };
        assert!(matches!(bad.engine_config(), Err(Error::Misconfiguration(_))));
    }
}
