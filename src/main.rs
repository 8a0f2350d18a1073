use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::Parser;
use clipsync::blocks::BlockLimits;
use clipsync::cache::SyncCache;
use clipsync::config::{Cli, Command, Config, default_config_dir, default_config_path};
use clipsync::export::{export_grouped_clippings, log_stats, notes_only, read_clippings};
use clipsync::group::group_clippings;
use clipsync::model::BookGroup;
use clipsync::notion::NotionClient;
use clipsync::parser::parse_clippings;
use clipsync::sync::{SyncOptions, Syncer, plan};
use clipsync::unpack_error;
use tokio::signal;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let args = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if args.json_logs {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    // If --config is provided, its parent directory holds the sync cache.
    // Otherwise use ~/.clipsync/ for both
    let (config_path, data_dir) = match &args.config_path {
        Some(path) => {
            let path = PathBuf::from(path);
            let dir = path
                .parent()
                .map(|p| p.to_path_buf())
                .unwrap_or_else(|| PathBuf::from("."));
            (path, dir)
        }
        None => (default_config_path(), default_config_dir()),
    };

    if let Err(e) = std::fs::create_dir_all(&data_dir) {
        tracing::error!(error = %e, path = ?data_dir, "failed to create data directory");
        std::process::exit(1);
    }

    let loaded = match &args.config_path {
        Some(path) => Config::new(path),
        None => Config::load_or_env(&config_path),
    };
    let cfg = loaded.unwrap_or_else(|e| {
        tracing::error!(error = %e, path = ?config_path, "failed to load config file");
        std::process::exit(1);
    });

    tokio::select! {
        result = run(&args, &cfg, &data_dir) => {
            if let Err(err) = result {
                tracing::error!(error = %unpack_error(&*err), "clipsync failed");
                std::process::exit(1);
            }
        }
        _ = signal::ctrl_c() => {
            tracing::warn!("ctrl+c signal received, books not yet completed will be resent next run");
            std::process::exit(130);
        }
    }
}

async fn run(args: &Cli, cfg: &Config, data_dir: &Path) -> Result<()> {
    let input = args
        .input
        .clone()
        .unwrap_or_else(|| cfg.app.clippings_path.clone());

    tracing::info!(path = %input, "parsing clippings");
    let raw = read_clippings(Path::new(&input))?;
    let parsed = parse_clippings(&raw);

    tracing::info!("grouping clippings");
    let books = group_clippings(parsed.clippings);
    export_grouped_clippings(&books, Path::new(&cfg.app.output_dir))?;
    log_stats(&books, &parsed.report);

    match args.command {
        Command::Parse => Ok(()),
        Command::Notes => {
            println!("{}", serde_json::to_string_pretty(&notes_only(&books))?);
            Ok(())
        }
        Command::Sync { dry_run } => sync(cfg, data_dir, &books, dry_run).await,
    }
}

async fn sync(cfg: &Config, data_dir: &Path, books: &[BookGroup], dry_run: bool) -> Result<()> {
    let mut cache = SyncCache::load(cfg.app.cache_path(data_dir))?;
    let limits = BlockLimits::default();

    if dry_run {
        let plans = plan(books, &cache, &limits)?;
        if plans.is_empty() {
            tracing::info!("every book is already synced");
        }
        for book in plans {
            tracing::info!(
                title = %book.title,
                pending = book.pending,
                requests = book.requests,
                "would sync book"
            );
        }
        return Ok(());
    }

    cfg.notion.require()?;
    let client = NotionClient::new(
        &cfg.notion.api_url,
        &cfg.notion.api_key,
        &cfg.notion.api_version,
    )?;
    let options = SyncOptions {
        database_id: cfg.notion.database_id.clone(),
        pacing: cfg.app.pacing(),
        limits,
    };

    Syncer::new(&client, options)
        .sync_books(books, &mut cache)
        .await?;
    Ok(())
}
