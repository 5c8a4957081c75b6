use clap::Parser;
use nanobanana_proxy::{build_router, AppState, ProxyConfig};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(
    name = "nanobanana-proxy",
    about = "Gemini-compatible image generation on top of OpenRouter",
    version
)]
struct Cli {
    /// Path to config file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port to listen on (overrides config)
    #[arg(short, long, env = "PORT")]
    port: Option<u16>,

    /// Upstream model id (overrides config)
    #[arg(long)]
    model: Option<String>,

    /// Print config search paths and exit
    #[arg(long)]
    show_config_paths: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "nanobanana_proxy=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if cli.show_config_paths {
        println!("Config search paths:");
        for (i, path) in nanobanana_proxy::config::config_search_paths().iter().enumerate() {
            println!("  {}. {}", i + 1, path.display());
        }
        return Ok(());
    }

    let mut config = ProxyConfig::find_and_load(cli.config.as_deref())?;

    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(model) = cli.model {
        config.upstream.model = model;
    }

    info!("nanobanana-proxy v{}", env!("CARGO_PKG_VERSION"));
    info!("  Upstream:    {}", config.upstream.base_url);
    info!("  Model:       {}", config.upstream.model);
    info!(
        "  Quota guard: {} (free-tier marker {:?})",
        if config.quota.enabled { "on" } else { "off" },
        config.quota.free_tier_marker
    );
    info!(
        "  Fallback key: {}",
        if config.fallback_api_key().is_some() {
            format!("${} set", config.upstream.api_key_env)
        } else {
            format!("${} not set", config.upstream.api_key_env)
        }
    );

    let client = reqwest::Client::builder()
        .timeout(config.request_timeout())
        .build()?;

    let port = config.port;
    let state = Arc::new(AppState { config, client });

    let app = build_router(state);
    let bind_addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;

    info!("Listening on http://{}", bind_addr);
    info!("  Gemini endpoint: http://localhost:{}/v1beta/models/<model>:generateContent", port);

    axum::serve(listener, app).await?;

    Ok(())
}
