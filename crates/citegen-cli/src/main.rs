use std::fs::File;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use citegen_core::AppConfig;
use citegen_science::{MetadataCache, Pipeline};

// ─── CLI Definition ─────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "citegen",
    about = "Expand reference lines in a README template into citations",
    version,
    long_about = None
)]
struct Cli {
    /// Template to expand; the result goes to stdout.
    #[arg(long)]
    readme_template: PathBuf,

    /// Line-delimited JSON cache of provider responses.
    /// Overrides `cache.path` from the config file.
    #[arg(long)]
    cache_fname: Option<PathBuf>,

    /// Config file. Defaults to $CITEGEN_CONFIG or ~/.config/citegen/config.toml.
    #[arg(long)]
    config: Option<PathBuf>,
}

// ─── Main ────────────────────────────────────────────────────────────────────

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // stdout carries the document, so logs go to stderr.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "citegen=info,citegen_science=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => AppConfig::load_from(path),
        None => AppConfig::load(),
    }
    .context("loading config")?;
    if let Some(cache_path) = cli.cache_fname {
        config.cache.path = Some(cache_path);
    }

    run(&cli.readme_template, &config).await
}

async fn run(template: &Path, config: &AppConfig) -> Result<()> {
    let cache = match &config.cache.path {
        Some(path) => MetadataCache::load(path)
            .with_context(|| format!("loading cache {}", path.display()))?,
        None => MetadataCache::in_memory(),
    };
    let mut pipeline = Pipeline::from_config(config, cache)?;

    let reader = BufReader::new(
        File::open(template)
            .with_context(|| format!("opening template {}", template.display()))?,
    );
    let result = pipeline.expand(reader, io::stdout().lock()).await;

    // Keep whatever was fetched before a failure.
    let saved = pipeline.cache_mut().save_if_dirty();
    if result.is_err()
        && let Err(e) = &saved
    {
        warn!("could not save metadata cache: {e}");
    }

    let stats = result.with_context(|| format!("expanding {}", template.display()))?;
    if saved.context("saving metadata cache")? {
        info!(entries = pipeline.cache().len(), "metadata cache updated");
    }
    info!(
        lines = stats.lines,
        references = stats.references,
        fetched = stats.fetched,
        cache_hits = stats.cache_hits,
        "done"
    );
    Ok(())
}
