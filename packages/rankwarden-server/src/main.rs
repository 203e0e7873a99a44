//! Rankwarden Server
//!
//! HTTP front end for the invite accounting and rank reconciliation engine:
//!
//! 1. **Event ingestion**: the platform gateway posts joins, leaves and fake
//!    flags; each becomes one row in the append-only invite log.
//!
//! 2. **Counts and ranks**: per-user counts are summed from the log and
//!    placed in the community's rank table.
//!
//! 3. **Reconciliation**: a member's rank roles are compared against their
//!    total and granted or revoked through the platform's REST API. Roles
//!    carrying dangerous permissions are reported, never touched.
//!
//! 4. **Chat commands**: command lines are resolved by name and answered
//!    with rendered replies.

mod api;
mod commands;
mod i18n;
mod membership;
mod protocol;
mod state;

use std::sync::Arc;

use clap::Parser;

use rankwarden_core::platform::InMemoryMembership;
use rankwarden_core::storage::Database;
use rankwarden_core::{Engine, MembershipClient};

use i18n::Translator;
use membership::HttpMembership;
use state::{ServerConfig, ServerState};

// ── CLI Arguments ─────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "rankwarden-server", version, about = "Invite ranks for chat communities")]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value_t = 8080, env = "RANKWARDEN_PORT")]
    port: u16,

    /// SQLite database file. In-memory when omitted.
    #[arg(long, env = "RANKWARDEN_DATABASE")]
    database: Option<String>,

    /// Platform REST base URL (e.g. https://discord.com/api/v10).
    /// Without it, membership is kept in memory.
    #[arg(long, env = "RANKWARDEN_PLATFORM_URL")]
    platform_url: Option<String>,

    /// Bot token sent to the platform
    #[arg(long, env = "RANKWARDEN_PLATFORM_TOKEN", hide_env_values = true)]
    platform_token: Option<String>,

    /// Deadline for each store operation, in milliseconds
    #[arg(long, default_value_t = 3_000, env = "RANKWARDEN_STORE_TIMEOUT_MS")]
    store_timeout_ms: u64,

    /// Deadline for each platform call, in milliseconds
    #[arg(long, default_value_t = 5_000, env = "RANKWARDEN_PLATFORM_TIMEOUT_MS")]
    platform_timeout_ms: u64,

    /// How long rank tables may be served from cache, in seconds
    #[arg(long, default_value_t = 5, env = "RANKWARDEN_RANK_CACHE_TTL_SECS")]
    rank_cache_ttl_secs: u64,

    /// Permissions that make a rank role dangerous (comma-separated names
    /// such as "administrator,manage_roles", or a decimal bitfield)
    #[arg(long, default_value = "administrator", env = "RANKWARDEN_DANGEROUS_PERMISSIONS")]
    dangerous_permissions: String,

    /// Prefix stripped from command lines
    #[arg(long, default_value = "!", env = "RANKWARDEN_COMMAND_PREFIX")]
    command_prefix: String,

    /// Only report rank roles from the invites command, never change them
    #[arg(long, env = "RANKWARDEN_REPORT_ONLY")]
    report_only: bool,

    /// Default leaderboard length
    #[arg(long, default_value_t = 10, env = "RANKWARDEN_LEADERBOARD_SIZE")]
    leaderboard_size: usize,

    /// JSON file overriding reply strings
    #[arg(long, env = "RANKWARDEN_STRINGS")]
    strings: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long, env = "RANKWARDEN_LOG_JSON")]
    log_json: bool,
}

impl Args {
    fn server_config(&self) -> ServerConfig {
        ServerConfig {
            port: self.port,
            database_path: self.database.clone(),
            platform_url: self.platform_url.clone(),
            platform_token: self.platform_token.clone(),
            store_timeout_ms: self.store_timeout_ms,
            platform_timeout_ms: self.platform_timeout_ms,
            rank_cache_ttl_secs: self.rank_cache_ttl_secs,
            dangerous_permissions: self.dangerous_permissions.clone(),
            command_prefix: self.command_prefix.clone(),
            auto_apply: !self.report_only,
            leaderboard_size: self.leaderboard_size,
        }
    }
}

// ── Entry Point ───────────────────────────────────────────────────────────────

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        "rankwarden_server=info,rankwarden_core=info,tower_http=info".into()
    });

    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

fn build_state(config: ServerConfig, translator: Translator) -> rankwarden_core::Result<ServerState> {
    let engine_config = config.engine_config()?;

    let db = Arc::new(Database::open(config.database_path.as_deref())?);

    let platform: Arc<dyn MembershipClient> = match &config.platform_url {
        Some(url) => {
            tracing::info!(platform_url = url.as_str(), "Using platform REST API");
            Arc::new(HttpMembership::new(
                url,
                config.platform_token.clone(),
                engine_config.platform_timeout,
            )?)
        }
        None => {
            tracing::warn!("No platform URL configured; membership is kept in memory");
            Arc::new(InMemoryMembership::new())
        }
    };

    let engine = Engine::new(db, platform, engine_config);
    ServerState::new(engine, translator, config)
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_tracing(args.log_json);

    let translator = match &args.strings {
        Some(path) => match std::fs::read_to_string(path)
            .map_err(|e| rankwarden_core::Error::Misconfiguration(format!("{}: {}", path, e)))
            .and_then(|json| Translator::with_overrides(&json))
        {
            Ok(t) => t,
            Err(e) => {
                tracing::error!("Failed to load strings: {}", e);
                std::process::exit(2);
            }
        },
        None => Translator::english(),
    };

    let config = args.server_config();
    let port = config.port;
    let state = match build_state(config, translator) {
        Ok(state) => state,
        Err(e) => {
            tracing::error!(code = e.code(), "Failed to start: {}", e);
            std::process::exit(1);
        }
    };

    let app = api::router(state);

    let addr = format!("0.0.0.0:{}", port);
    tracing::info!("Rankwarden server starting on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind address");

    axum::serve(listener, app)
        .await
        .expect("Server error");
}

// ── Tests ─────────────────────────────────────────────────────────────────────
