use anyhow::Context;
use clap::Parser;
use mylobster_memory::cli::{Cli, Commands, ConfigAction};
use mylobster_memory::config::{validate_config, Config};
use mylobster_memory::logging;
use mylobster_memory::memory::{
    MemoryIndexManager, MemorySearchOptions, MemorySearchResult, MemoryStatus, SyncOptions,
    SyncReport,
};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let config = Config::load(cli.command.config_path())?;
    logging::init(cli.log_json || config.logging.json.unwrap_or(false));

    match cli.command {
        Commands::Sync(opts) => {
            let manager = open_manager(&config).await?;
            let options = SyncOptions { force: opts.force };
            let report = manager.sync(options).await;
            manager.close().await;
            let report = report.context("memory sync failed")?;
            if opts.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_report(&report);
            }
        }
        Commands::Search(opts) => {
            let manager = open_manager(&config).await?;
            let search_opts = MemorySearchOptions {
                max_results: opts.max_results,
                min_score: opts.min_score,
            };
            let results = manager.search(&opts.query, search_opts).await;
            manager.close().await;
            let results = results?;
            if opts.json {
                println!("{}", serde_json::to_string_pretty(&results)?);
            } else {
                print_results(&results);
            }
        }
        Commands::Status(opts) => {
            let manager = open_manager(&config).await?;
            let status = manager.status();
            manager.close().await;
            let status = status?;
            if opts.json {
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else {
                print_status(&status);
            }
        }
        Commands::Config(opts) => match opts.action {
            ConfigAction::Show => {
                println!("{}", serde_json::to_string_pretty(&config)?);
            }
            ConfigAction::Validate => {
                let errors = validate_config(&config);
                if errors.is_empty() {
                    info!("Configuration is valid");
                    println!("Configuration is valid");
                } else {
                    for e in &errors {
                        eprintln!("{e}");
                    }
                    anyhow::bail!("{} configuration error(s)", errors.len());
                }
            }
            ConfigAction::Init => {
                let path = opts.config.as_deref().unwrap_or("mylobster.json");
                Config::write_default(path)?;
                info!(path, "Configuration file created");
            }
        },
        Commands::Version => {
            println!("mylobster-memory {}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}

async fn open_manager(config: &Config) -> anyhow::Result<MemoryIndexManager> {
    if config.memory.enabled == Some(false) {
        anyhow::bail!("memory search is disabled (memory.enabled = false)");
    }
    MemoryIndexManager::open(config)
        .await
        .context("failed to open memory index")
}

fn print_report(report: &SyncReport) {
    println!(
        "generation {}: {} files, {} chunks ({} carried, {} added, {} removed)",
        report.generation,
        report.files,
        report.chunks,
        report.carried,
        report.added,
        report.removed
    );
    println!(
        "embedded {}, reused {}, provider calls {}",
        report.embedded, report.reused, report.provider_calls
    );
    if report.is_degraded() {
        println!("{} chunks are lexical-only until the next sync", report.failed);
        for e in &report.provider_errors {
            println!("  {e}");
        }
    }
}

fn print_results(results: &[MemorySearchResult]) {
    if results.is_empty() {
        println!("No results.");
        return;
    }
    for r in results {
        println!("{}  {:.3}", r.citation, r.score);
        for line in r.snippet.lines() {
            println!("    {line}");
        }
        println!();
    }
}

fn print_status(status: &MemoryStatus) {
    println!("state:       {:?}", status.state);
    println!("provider:    {}/{}", status.provider, status.model);
    println!("generation:  {}", status.generation);
    println!("files:       {}", status.file_count);
    println!(
        "chunks:      {} ({} with vectors, {} lexical-only)",
        status.chunk_count, status.vector_count, status.degraded_count
    );
    if let Some(path) = &status.store_path {
        println!("store:       {}", path.display());
    }
    if status.needs_full_resync {
        println!("next sync rebuilds the index from scratch");
    }
}
