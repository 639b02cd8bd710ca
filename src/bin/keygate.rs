use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use keygate::config::AppConfig;
use keygate::http::{AppState, router};
use keygate::store::{MemoryStore, RedisStore};

#[derive(Debug, Parser)]
#[command(name = "keygate", about = "License-gated proxy for LLM chat completions")]
struct Args {
    /// Address to bind the HTTP server on.
    #[arg(long, default_value = "127.0.0.1:8080", env = "KEYGATE_LISTEN")]
    listen: String,

    /// Redis connection URL. Without it, licenses and rate-limit windows
    /// live in process memory and vanish on restart.
    #[arg(long, env = "KEYGATE_REDIS_URL")]
    redis_url: Option<String>,

    /// Key prefix for all Redis entries.
    #[arg(long, default_value = "keygate", env = "KEYGATE_REDIS_PREFIX")]
    redis_prefix: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = AppConfig::from_env();

    let state = match &args.redis_url {
        Some(url) => {
            let store = RedisStore::new(url)?.with_prefix(args.redis_prefix.clone());
            store.ping().await?;
            tracing::info!(prefix = %args.redis_prefix, "using redis store");
            let store = Arc::new(store);
            AppState::new(config, store.clone(), store)
        }
        None => {
            tracing::warn!("no --redis-url given; using in-memory store (state is not persisted)");
            let store = Arc::new(MemoryStore::new());
            AppState::new(config, store.clone(), store)
        }
    };

    let app = router(state);
    let listener = tokio::net::TcpListener::bind(&args.listen).await?;
    tracing::info!(listen = %args.listen, "keygate listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;
    Ok(())
}
