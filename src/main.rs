use anyhow::{Context, Result};
use feed_autopilot::config::Config;
use feed_autopilot::engine::{Collaborators, Orchestrator, StatusListener, TracingStatusListener};
use feed_autopilot::execution::dry_run::DryRunInteraction;
use feed_autopilot::feed::replay::ReplayDiscovery;
use feed_autopilot::generator::{ContentGenerator, HttpContentGenerator, TemplateGenerator};
use feed_autopilot::store::{DedupStore, JsonFileStore, SystemClock};
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Prints status lines to the terminal.
struct ConsoleStatus;

impl StatusListener for ConsoleStatus {
    fn on_status(&self, message: &str, progress_percent: Option<u8>) {
        match progress_percent {
            Some(p) => println!("  [{:>3}%] {}", p, message),
            None => println!("         {}", message),
        }
    }
}

fn arg_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .map(String::as_str)
}

#[tokio::main]
async fn main() -> Result<()> {
    let log_file = std::fs::File::create("feed-autopilot.log")?;
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("feed_autopilot=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(log_file)
        .init();

    let args: Vec<String> = std::env::args().collect();
    let config_path = arg_value(&args, "--config").unwrap_or("config.toml");
    let feed_path = arg_value(&args, "--feed").unwrap_or("demos/feed.json");

    let config = Config::load(Path::new(config_path))?;

    // Load saved keys from .env (real env vars take precedence)
    Config::load_env_file();

    println!();
    println!("  Feed Autopilot v0.1.0 (dry run)");
    println!("  ===============================");

    let kv = Arc::new(
        JsonFileStore::open(&config.store.path)
            .await
            .context("Failed to open state store")?,
    );
    let store = Arc::new(DedupStore::new(kv, Arc::new(SystemClock)));
    let swept = store.sweep_older_than(config.store.retention_days).await?;
    println!(
        "  State: {} ({} stale author records dropped)",
        config.store.path.display(),
        swept
    );

    let generator: Arc<dyn ContentGenerator> = match &config.generator {
        Some(gen_config) => {
            println!("  Generator: {}", gen_config.endpoint);
            Arc::new(HttpContentGenerator::new(gen_config, Config::generator_api_key())?)
        }
        None => {
            println!("  Generator: built-in templates");
            Arc::new(TemplateGenerator::new(TemplateGenerator::default_templates()))
        }
    };

    let discovery = ReplayDiscovery::load(Path::new(feed_path))?;
    println!("  Feed: {} ({} pages)", feed_path, discovery.page_count());
    println!();

    let orchestrator = Arc::new(Orchestrator::new(
        config.run.clone(),
        &config.timing,
        Collaborators {
            discovery: Box::new(discovery),
            interaction: Arc::new(DryRunInteraction::new()),
            generator,
            store: store.clone(),
        },
    )?);
    orchestrator.add_listener(Arc::new(TracingStatusListener));
    orchestrator.add_listener(Arc::new(ConsoleStatus));

    let stopper = orchestrator.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            stopper.stop();
        }
    });

    let summary = orchestrator.start().await?;

    println!();
    println!("  Stopped: {:?}", summary.stop_reason);
    println!(
        "  Commented: {}  Attempted: {}  Soft failures: {}  Errors: {}",
        summary.success_count, summary.total_attempted, summary.soft_failures, summary.total_errors
    );
    let counters = store.get_counters().await?;
    for (name, value) in counters.iter() {
        println!("    {:<24} {}", name, value);
    }

    tracing::debug!("shutting down");
    Ok(())
}
