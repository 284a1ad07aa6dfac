use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tokentap::config::{
    ProxyConfig, DEFAULT_PROMPTS_DIR, DEFAULT_PROXY_PORT, DEFAULT_TOKEN_LIMIT,
    DEFAULT_UPSTREAM_ORIGIN,
};
use tokentap::proxy::{self, AppState};
use tokentap::sink::{FileSink, RawChunkSink, RawFileSink};
use tokentap::tokens::TiktokenCounter;

/// Intercepting proxy that logs LLM prompts, responses, and token counts.
#[derive(Parser, Debug)]
#[command(name = "tokentap", version)]
struct Cli {
    /// Local port to listen on
    #[arg(short, long, default_value_t = DEFAULT_PROXY_PORT)]
    port: u16,

    /// Upstream origin to proxy, e.g. https://api.openai.com
    #[arg(short, long, default_value = DEFAULT_UPSTREAM_ORIGIN)]
    upstream: String,

    /// Directory to save captured prompts and responses
    #[arg(long, default_value = DEFAULT_PROMPTS_DIR)]
    prompts_dir: PathBuf,

    /// Token limit for downstream fuel-gauge consumers
    #[arg(short, long, default_value_t = DEFAULT_TOKEN_LIMIT)]
    limit: u64,

    /// Also log raw response bytes verbatim, one file per stream
    #[arg(long)]
    raw_log: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tokentap=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let config = ProxyConfig {
        port: cli.port,
        upstream_origin: cli.upstream,
        prompts_dir: cli.prompts_dir,
        token_limit: cli.limit,
    };

    tokio::fs::create_dir_all(&config.prompts_dir).await?;

    let raw_sink: Option<Arc<dyn RawChunkSink>> = if cli.raw_log {
        Some(Arc::new(RawFileSink::new(config.prompts_dir.clone())))
    } else {
        None
    };

    let state = AppState {
        client: reqwest::Client::builder().build()?,
        sink: Arc::new(FileSink::new(config.prompts_dir.clone())),
        raw_sink,
        counter: Arc::new(TiktokenCounter::new()?),
        config: Arc::new(config),
    };

    let listener =
        tokio::net::TcpListener::bind(("127.0.0.1", state.config.port)).await?;

    tracing::info!(
        "tokentap proxying {} -> {}",
        listener.local_addr()?,
        state.config.upstream_origin
    );
    tracing::info!("saving prompts to {}", state.config.prompts_dir.display());

    axum::serve(listener, proxy::router(state)).await?;

    Ok(())
}
