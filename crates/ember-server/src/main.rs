//! Ember Server
//!
//! Authenticated chat API that relays generative-AI output to clients as
//! Server-Sent Events.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::serve::ListenerExt;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use ember_core::config::{self, Config};
use ember_core::tracing_init::init_tracing;
use ember_server::auth::JwtManager;
use ember_server::server::{AppState, build_router};
use ember_server::storage::AppDatabase;
use ember_server::upstream::{OpenAiConfig, OpenAiUpstream};

const DEV_JWT_SECRET: &str = "dev-secret-change-me";

#[derive(Parser, Debug)]
#[command(name = "ember-server")]
#[command(version, about = "Ember server - chat API with SSE model streaming")]
struct Args {
    /// Path to a JSON settings file (merged over the global settings).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// JWT secret key.
    #[arg(long, env = "EMBER_JWT_SECRET", default_value = DEV_JWT_SECRET, global = true)]
    jwt_secret: String,

    /// Access token TTL in seconds.
    #[arg(long, default_value_t = 3600, global = true)]
    access_ttl: i64,

    /// Address to listen on (overrides config).
    #[arg(long)]
    addr: Option<SocketAddr>,

    /// Path to SQLite database file (overrides config).
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// API key for the upstream model provider.
    #[arg(long, env = "EMBER_UPSTREAM_API_KEY", default_value = "", hide_env_values = true)]
    upstream_api_key: String,

    /// Upstream API root (overrides config).
    #[arg(long)]
    upstream_base_url: Option<String>,

    /// Default model (overrides config).
    #[arg(long)]
    model: Option<String>,

    /// Output logs as JSON (for structured log aggregation).
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP server (default).
    Serve,
    /// Print an access token for a user, signed with the configured secret.
    IssueToken {
        #[arg(long)]
        user_id: String,
        #[arg(long)]
        username: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing("ember_server=info,tower_http=info", args.log_json);

    let jwt = Arc::new(JwtManager::new(args.jwt_secret.as_bytes(), args.access_ttl));

    if let Some(Command::IssueToken { user_id, username }) = &args.command {
        return issue_token(&jwt, user_id, username);
    }
    serve(args, jwt).await
}

#[allow(clippy::print_stdout)]
fn issue_token(jwt: &JwtManager, user_id: &str, username: &str) -> anyhow::Result<()> {
    let (token, ttl) = jwt.issue_access_token(user_id, username)?;
    info!(user_id, ttl, "Issued access token");
    println!("{token}");
    Ok(())
}

async fn serve(args: Args, jwt: Arc<JwtManager>) -> anyhow::Result<()> {
    let config = resolve_config(&args)?;
    let addr: SocketAddr = config
        .server
        .addr
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid listen address {}: {e}", config.server.addr))?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        addr = %addr,
        upstream = %config.upstream.base_url,
        model = %config.upstream.default_model,
        "Starting ember-server"
    );
    if args.jwt_secret == DEV_JWT_SECRET {
        warn!("Using the development JWT secret; set EMBER_JWT_SECRET in production");
    }
    if args.upstream_api_key.is_empty() {
        warn!("No upstream API key configured; requests are sent unauthenticated");
    }

    let db_path = match &config.server.database_path {
        Some(path) => path.clone(),
        None => config::database_path()
            .ok_or_else(|| anyhow::anyhow!("Cannot determine default database path"))?,
    };
    info!(path = %db_path.display(), "Opening database");
    let db = AppDatabase::open(&db_path).await?;

    let upstream = OpenAiUpstream::new(&OpenAiConfig {
        base_url: config.upstream.base_url.clone(),
        api_key: args.upstream_api_key.clone(),
        default_model: config.upstream.default_model.clone(),
        system_prompt: config.upstream.system_prompt.clone(),
        connect_timeout: Duration::from_secs(config.upstream.connect_timeout_secs),
    })?;

    let shutdown = CancellationToken::new();
    let state = AppState {
        db: db.clone(),
        jwt,
        upstream: Arc::new(upstream),
        relay: config.relay.clone(),
        shutdown: shutdown.clone(),
    };
    let app = build_router(state, &config.server.cors_origins);

    let listener = tokio::net::TcpListener::bind(addr)
        .await?
        .tap_io(|tcp| {
            if let Err(e) = tcp.set_nodelay(true) {
                warn!(error = %e, "Failed to set TCP_NODELAY");
            }
        });
    #[cfg(unix)]
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

    info!(addr = %addr, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            #[cfg(unix)]
            let sigterm_future = sigterm.recv();
            #[cfg(not(unix))]
            let sigterm_future = std::future::pending::<Option<()>>();

            tokio::select! {
                () = ctrl_c() => info!("Received Ctrl+C shutdown signal"),
                _ = sigterm_future => info!("Received SIGTERM shutdown signal"),
            }
            // Ends open relay streams; the connection drain waits on them.
            shutdown.cancel();
        })
        .await?;

    db.close().await;
    info!("Server stopped");
    Ok(())
}

/// Defaults, settings files and `EMBER_*` env, then CLI flags on top.
fn resolve_config(args: &Args) -> anyhow::Result<Config> {
    let mut config = config::load_config(args.config.as_deref())?;
    if let Some(addr) = args.addr {
        config.server.addr = addr.to_string();
    }
    if let Some(path) = &args.db_path {
        config.server.database_path = Some(path.clone());
    }
    if let Some(url) = &args.upstream_base_url {
        config.upstream.base_url.clone_from(url);
    }
    if let Some(model) = &args.model {
        config.upstream.default_model.clone_from(model);
    }
    Ok(config)
}

async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
}
