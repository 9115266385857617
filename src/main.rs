use anyhow::Result;
use clap::Parser;

use dexter::app;
use dexter::config::Config;

#[derive(Parser, Debug)]
#[command(version, about = "Multi-strategy DEX trading decision engine")]
struct Args {
    /// Quote provider base URL
    #[arg(long)]
    provider_url: Option<String>,

    /// Path to config file (optional)
    #[arg(long)]
    config: Option<String>,

    /// Strategy rotation mode: score or round_robin
    #[arg(long)]
    rotation_mode: Option<String>,

    /// Always run the named strategy (score mode only)
    #[arg(long)]
    forced_strategy: Option<String>,

    /// Paper-trading starting balance
    #[arg(long)]
    starting_balance: Option<f64>,

    /// Quote cache TTL in milliseconds
    #[arg(long)]
    cache_ttl_ms: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();
    let args = Args::parse();

    // Build configuration with priority: CLI args > config file > defaults
    let mut config = if let Some(config_path) = &args.config {
        Config::from_file(config_path)?
    } else {
        let provider_url = args.provider_url.clone().ok_or_else(|| {
            anyhow::anyhow!("--provider-url is required when not using --config")
        })?;
        Config::with_provider(provider_url)
    };

    // Override with CLI args if provided (CLI has higher priority)
    if let Some(provider_url) = args.provider_url {
        config.provider.url = provider_url;
    }
    if let Some(rotation_mode) = args.rotation_mode {
        config.engine.rotation_mode = rotation_mode.parse()?;
    }
    if let Some(forced_strategy) = args.forced_strategy {
        config.engine.forced_strategy = Some(forced_strategy);
    }
    if let Some(starting_balance) = args.starting_balance {
        config.engine.starting_balance = starting_balance;
    }
    if let Some(cache_ttl_ms) = args.cache_ttl_ms {
        config.engine.cache_ttl_ms = cache_ttl_ms;
    }

    app::run(config).await
}
