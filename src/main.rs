use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use embed_resolver::config::Config;
use embed_resolver::routes;
use embed_resolver::services::{
    http::{HttpFetcher, PageFetcher},
    manifests::{ManifestParser, StreamParser},
    plugins::default_plugins,
    resolver::Resolver,
};
use embed_resolver::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing/logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "embed_resolver=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    // Load configuration
    let config = Config::from_env();
    let port = config.port;

    tracing::info!("Starting Embed Resolver v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        "Resolver limits: depth={}, playlist_max={}",
        config.max_resolve_depth,
        config.plugin_options.playlist_cap()
    );

    // Initialize services
    let fetcher: Arc<dyn PageFetcher> = Arc::new(HttpFetcher::new(
        &config.user_agent,
        config.fetch_timeout_ms,
        config.max_retries,
    )?);
    let parser: Arc<dyn StreamParser> = Arc::new(ManifestParser::new(fetcher.clone()));
    let plugins = default_plugins(fetcher.clone(), parser.clone());
    tracing::info!("Loaded {} site plugins", plugins.len());

    let resolver = Resolver::new(fetcher, parser, config.resolver_settings()).with_plugins(plugins);

    // Build application state
    let state = Arc::new(AppState {
        config,
        resolver,
        start_time: Instant::now(),
    });

    let app = routes::router(state);

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
