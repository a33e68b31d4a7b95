use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use podsieve::config::Config;
use podsieve::dispatch::dispatch;
use podsieve::logging;

/// Get the config directory path (~/.config/podsieve/)
fn get_config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".config").join("podsieve"))
}

#[derive(Parser, Debug)]
#[command(
    name = "podsieve",
    version,
    about = "Keep filtered mirrors of podcast feeds"
)]
struct Args {
    /// Config file (default: ~/.config/podsieve/config.toml)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Run only the named filter (repeatable)
    #[arg(long, value_name = "NAME")]
    only: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let log_file = logging::init();

    let config_path = match args.config {
        Some(path) => path,
        None => get_config_dir()?.join("config.toml"),
    };
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config '{}'", config_path.display()))?;

    if let Some(path) = config.log_file.as_deref() {
        log_file.attach(path)?;
    }

    let jobs = config.select(&args.only)?;
    if jobs.is_empty() {
        eprintln!("Error: No filters configured in {}", config_path.display());
        eprintln!();
        eprintln!("Add at least one [[filter]] table, for example:");
        eprintln!();
        eprintln!("  [[filter]]");
        eprintln!("  name = \"no-politics\"");
        eprintln!("  source_url = \"https://example.com/feed.xml\"");
        eprintln!("  output_path = \"/srv/feeds/no-politics.xml\"");
        eprintln!("  exclude_title = [\"politics\"]");
        std::process::exit(1);
    }

    let policy = config.fetch.policy();
    let client = reqwest::Client::builder()
        .user_agent(concat!("podsieve/", env!("CARGO_PKG_VERSION")))
        .connect_timeout(Duration::from_secs(10).min(policy.timeout))
        .build()
        .context("Failed to build HTTP client")?;

    let outcomes = dispatch(&jobs, &client, &policy).await;

    let failed: Vec<&str> = outcomes
        .iter()
        .filter(|o| !o.is_success())
        .map(|o| o.name.as_str())
        .collect();
    if !failed.is_empty() {
        eprintln!("Failed filters: {}", failed.join(", "));
        std::process::exit(1);
    }

    Ok(())
}
