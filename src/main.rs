mod crawl;
mod db;
mod fetch;
mod normalize;
mod registry;

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};
use tracing::info;

#[derive(Parser)]
#[command(name = "trend_crawler", about = "Multi-platform trending topics crawler")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the schema and register the platform table
    Init {
        /// Platform table TOML (default: built-in table)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Crawl all enabled platforms once, or on an interval
    Crawl {
        /// Platform table TOML (default: built-in table)
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Repeat forever, sleeping this many seconds between cycles
        #[arg(short, long)]
        interval: Option<u64>,
    },
    /// Show storage statistics
    Stats,
    /// Show the current ranked items for one platform
    Top {
        platform: String,
        /// Max rows to display
        #[arg(short = 'n', long, default_value = "20")]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Init { config } => {
            let conn = db::connect()?;
            db::init_schema(&conn)?;
            let platforms = load_platforms(config.as_deref())?;
            db::sync_platforms(&conn, &platforms)?;
            println!("Schema ready, {} platforms registered.", platforms.len());
            Ok(())
        }
        Commands::Crawl { config, interval } => {
            let conn = db::connect()?;
            db::init_schema(&conn)?;
            let platforms = load_platforms(config.as_deref())?;
            let cfg = crawl::CrawlConfig::default();

            let stats = crawl::run_cycle(&conn, &platforms, &cfg).await?;
            crawl::print_summary(&stats);

            if let Some(secs) = interval {
                loop {
                    info!("next cycle in {}s", secs);
                    tokio::time::sleep(Duration::from_secs(secs)).await;
                    let stats = crawl::run_cycle(&conn, &platforms, &cfg).await?;
                    crawl::print_summary(&stats);
                }
            }
            Ok(())
        }
        Commands::Stats => {
            let conn = db::connect()?;
            db::init_schema(&conn)?;
            let stats = db::get_stats(&conn)?;
            println!(
                "{:<10} | {:<12} | {:>3} | {:>6} | {:<19}",
                "Platform", "Name", "On", "Items", "Last crawl"
            );
            println!("{}", "-".repeat(62));
            for p in &stats.platforms {
                println!(
                    "{:<10} | {:<12} | {:>3} | {:>6} | {:<19}",
                    p.id,
                    truncate(&p.name, 12),
                    if p.enabled { "yes" } else { "no" },
                    p.items,
                    p.last_crawl.as_deref().unwrap_or("-"),
                );
            }
            println!("\n{} items total", stats.total_items);
            Ok(())
        }
        Commands::Top { platform, limit } => {
            let conn = db::connect()?;
            db::init_schema(&conn)?;
            let rows = db::fetch_top(&conn, &platform, limit)?;
            if rows.is_empty() {
                println!("No items for '{}'. Run 'crawl' first.", platform);
                return Ok(());
            }
            println!(
                "{:>4} | {:<40} | {:<12} | {:>5}",
                "#", "Title", "Hot", "Seen"
            );
            println!("{}", "-".repeat(70));
            for r in &rows {
                println!(
                    "{:>4} | {:<40} | {:<12} | {:>5}",
                    r.rank,
                    truncate(&r.title, 40),
                    truncate(&r.hot_value, 12),
                    r.crawl_count,
                );
            }
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

fn load_platforms(path: Option<&Path>) -> anyhow::Result<Vec<registry::Platform>> {
    match path {
        Some(p) => registry::load(p),
        None => Ok(registry::builtin()),
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max).collect();
        format!("{}...", truncated)
    }
}

fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
