//! Fetch Cache - command-line demo
//!
//! Fetches each URL given on the command line twice, concurrently, through
//! one cache instance, then prints the cache statistics as JSON.
//!
//! ```text
//! fetch-cache https://httpbin.org/json https://httpbin.org/cache/60
//! ```

use anyhow::{bail, Context, Result};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use fetch_cache::client::ReqwestTransport;
use fetch_cache::{CacheConfig, FetchOptions, HttpCache};

/// Main entry point for the fetch cache demo.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Build the cache around a reqwest transport
/// 4. Start the background cleanup task
/// 5. Fetch every URL twice concurrently
/// 6. Print statistics and shut down
#[tokio::main]
async fn main() -> Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fetch_cache=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let urls: Vec<String> = std::env::args().skip(1).collect();
    if urls.is_empty() {
        bail!("usage: fetch-cache <url>...");
    }

    let config = CacheConfig::from_env();
    info!(
        "Configuration loaded: max_entries={}, max_size={}, default_ttl={}ms, storage={:?}",
        config.max_entries, config.max_size, config.default_ttl_ms, config.storage
    );

    let client = reqwest::Client::builder()
        .timeout(config.request_timeout())
        .build()
        .context("failed to create HTTP client")?;

    let cache = HttpCache::builder(config)
        .transport(std::sync::Arc::new(ReqwestTransport::new(client)))
        .build();
    cache.start_cleanup();

    for url in &urls {
        let (first, second) = tokio::join!(
            cache.fetch(url, FetchOptions::get()),
            cache.fetch(url, FetchOptions::get()),
        );

        match (first, second) {
            (Ok(body), Ok(_)) => {
                let kind = match body {
                    fetch_cache::ResponseBody::Json(_) => "json",
                    fetch_cache::ResponseBody::Text(_) => "text",
                    fetch_cache::ResponseBody::Bytes(_) => "bytes",
                };
                info!(url = %url, kind, "Fetched");
            }
            (Err(e), _) | (_, Err(e)) => warn!(url = %url, error = %e, "Fetch failed"),
        }
    }

    let stats = cache.stats().await;
    println!("{}", serde_json::to_string_pretty(&stats)?);
    info!("Hit rate: {:.2}", stats.hit_rate());

    cache.shutdown();
    Ok(())
}
