use std::sync::Arc;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "taskcast",
    version = "0.1.0",
    about = "Taskcast \u{2014} unified task tracking and streaming service"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the taskcast server (default)
    Start {
        /// Config file path
        #[arg(short, long)]
        config: Option<String>,
        /// Port to listen on
        #[arg(short, long, default_value = "3721")]
        port: u16,
    },
}

/// Resolve broadcast + short-term adapters from a Redis URL, falling back to
/// the in-memory implementations when no URL is configured.
///
/// The in-memory fallback is only correct for single-instance deployments;
/// see `ShortTermStore::next_index` for why a shared store is required once
/// more than one engine instance is running.
async fn build_broadcast_and_short_term(
    redis_url: Option<&str>,
) -> Result<
    (
        Arc<dyn taskcast_core::BroadcastProvider>,
        Arc<dyn taskcast_core::ShortTermStore>,
    ),
    Box<dyn std::error::Error + Send + Sync>,
> {
    if let Some(url) = redis_url {
        let client = redis::Client::open(url)?;
        let pub_conn = client.get_multiplexed_async_connection().await?;
        let sub_conn = client.get_async_pubsub().await?;
        let store_conn = client.get_multiplexed_async_connection().await?;

        let adapters = taskcast_redis::create_redis_adapters(pub_conn, sub_conn, store_conn, None);
        Ok((Arc::new(adapters.broadcast), Arc::new(adapters.short_term)))
    } else {
        Ok((
            Arc::new(taskcast_core::MemoryBroadcastProvider::new()),
            Arc::new(taskcast_core::MemoryShortTermStore::new()),
        ))
    }
}

/// Resolve the optional archival long-term store from a Postgres URL.
async fn build_long_term(
    postgres_url: Option<&str>,
) -> Result<Option<Arc<dyn taskcast_core::LongTermStore>>, Box<dyn std::error::Error + Send + Sync>>
{
    if let Some(url) = postgres_url {
        let pool = sqlx::PgPool::connect(url).await?;
        let store = taskcast_postgres::PostgresLongTermStore::new(pool, None);
        store.migrate().await?;
        Ok(Some(Arc::new(store)))
    } else {
        Ok(None)
    }
}

/// Resolve the JWT algorithm name from config into a `jsonwebtoken::Algorithm`,
/// defaulting to HS256 for unrecognized or absent values.
fn resolve_jwt_algorithm(name: Option<&str>) -> jsonwebtoken::Algorithm {
    match name {
        Some("RS256") => jsonwebtoken::Algorithm::RS256,
        Some("RS384") => jsonwebtoken::Algorithm::RS384,
        Some("RS512") => jsonwebtoken::Algorithm::RS512,
        Some("ES256") => jsonwebtoken::Algorithm::ES256,
        Some("ES384") => jsonwebtoken::Algorithm::ES384,
        Some("PS256") => jsonwebtoken::Algorithm::PS256,
        Some("PS384") => jsonwebtoken::Algorithm::PS384,
        Some("PS512") => jsonwebtoken::Algorithm::PS512,
        _ => jsonwebtoken::Algorithm::HS256,
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let cmd = cli.command.unwrap_or(Commands::Start {
        config: None,
        port: 3721,
    });

    match cmd {
        Commands::Start { config, port } => {
            // 1. Load config file
            let file_config = taskcast_core::config::load_config_file(config.as_deref())
                .unwrap_or_default();

            // 2. Install the tracing subscriber: RUST_LOG > configured logLevel > info.
            let filter = std::env::var("RUST_LOG").ok().unwrap_or_else(|| {
                match file_config.log_level {
                    Some(taskcast_core::config::LogLevel::Debug) => "debug".to_string(),
                    Some(taskcast_core::config::LogLevel::Info) => "info".to_string(),
                    Some(taskcast_core::config::LogLevel::Warn) => "warn".to_string(),
                    Some(taskcast_core::config::LogLevel::Error) => "error".to_string(),
                    None => "info".to_string(),
                }
            });
            tracing_subscriber::fmt()
                .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
                .init();

            // 3. Resolve port: CLI flag > config file > default
            let port = if port != 3721 {
                port
            } else {
                file_config.port.unwrap_or(port)
            };

            // 4. Resolve adapter URLs
            let redis_url = std::env::var("TASKCAST_REDIS_URL")
                .ok()
                .or_else(|| file_config.adapters.as_ref()?.broadcast.as_ref()?.url.clone());
            let postgres_url = std::env::var("TASKCAST_POSTGRES_URL")
                .ok()
                .or_else(|| file_config.adapters.as_ref()?.long_term.as_ref()?.url.clone());

            if redis_url.is_none() {
                tracing::warn!(
                    "no TASKCAST_REDIS_URL configured, using in-memory adapters (single-instance only)"
                );
            }

            // 5. Build adapters
            let (broadcast, short_term) =
                build_broadcast_and_short_term(redis_url.as_deref()).await?;
            let long_term = build_long_term(postgres_url.as_deref()).await?;

            // 6. Build engine
            let engine = Arc::new(taskcast_core::TaskEngine::new(
                taskcast_core::TaskEngineOptions {
                    short_term,
                    broadcast,
                    long_term,
                    hooks: None,
                },
            ));

            // 7. Auth mode
            let auth_mode_str = std::env::var("TASKCAST_AUTH_MODE").ok().or_else(|| {
                file_config.auth.as_ref().map(|a| match a.mode {
                    taskcast_core::config::AuthMode::None => "none".to_string(),
                    taskcast_core::config::AuthMode::Jwt => "jwt".to_string(),
                    taskcast_core::config::AuthMode::Custom => "custom".to_string(),
                })
            });

            let auth_mode = match auth_mode_str.as_deref() {
                Some("jwt") => {
                    let jwt_config = file_config
                        .auth
                        .as_ref()
                        .and_then(|a| a.jwt.as_ref());

                    let algorithm =
                        resolve_jwt_algorithm(jwt_config.and_then(|j| j.algorithm.as_deref()));

                    taskcast_server::AuthMode::Jwt(taskcast_server::JwtConfig {
                        algorithm,
                        secret: std::env::var("TASKCAST_JWT_SECRET")
                            .ok()
                            .or_else(|| jwt_config?.secret.clone()),
                        public_key: jwt_config.and_then(|j| j.public_key.clone()),
                        issuer: jwt_config.and_then(|j| j.issuer.clone()),
                        audience: jwt_config.and_then(|j| j.audience.clone()),
                    })
                }
                _ => taskcast_server::AuthMode::None,
            };

            // 8. Create and serve app
            let app = taskcast_server::create_app(engine, auth_mode);
            let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}")).await?;
            tracing::info!(%port, "taskcast server started");
            axum::serve(listener, app).await?;
        }
    }

    Ok(())
}
