use catalogue_scraper::config::Config;
use catalogue_scraper::db::{DocumentStore, SqliteStore};
use catalogue_scraper::pipeline::Pipeline;
use catalogue_scraper::scheduler;
use clap::{Parser, Subcommand};
use log::{error, info, LevelFilter};
use log4rs::append::console::ConsoleAppender;
use log4rs::config::{Appender, Root};
use log4rs::encode::pattern::PatternEncoder;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

const LOG_CONFIG: &str = "log4rs.yml";

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Cli {
    /// TOML configuration file.
    #[arg(long, global = true, default_value = "config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Scrape the whole catalogue once, now.
    Run {
        /// Discard snapshots left by an interrupted run.
        #[arg(long)]
        fresh: bool,
    },
    /// Scrape once at startup, then every day at `schedule.daily_at`.
    Schedule {
        #[arg(long)]
        skip_initial: bool,
    },
    /// Print store statistics.
    Stats,
    /// Search stored mangas by title or alternative title.
    Search { query: String },
}

fn init_logging() {
    if Path::new(LOG_CONFIG).exists() {
        match log4rs::init_file(LOG_CONFIG, Default::default()) {
            Ok(()) => return,
            Err(e) => eprintln!("Invalid {}: {}, using console logging", LOG_CONFIG, e),
        }
    }

    let stdout = ConsoleAppender::builder()
        .encoder(Box::new(PatternEncoder::new("{d(%Y-%m-%d %H:%M:%S)} {h({l})} {t} - {m}{n}")))
        .build();
    let config = log4rs::Config::builder()
        .appender(Appender::builder().build("stdout", Box::new(stdout)))
        .build(Root::builder().appender("stdout").build(LevelFilter::Info));
    match config {
        Ok(config) => {
            if let Err(e) = log4rs::init_config(config) {
                eprintln!("Failed to initialise logging: {}", e);
            }
        }
        Err(e) => eprintln!("Failed to build logging config: {}", e),
    }
}

fn print_stats(cfg: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let store = SqliteStore::open(&cfg.db_path)?;
    let stats = store.stats()?;
    println!("Mangas:              {}", stats.total_manga);
    println!("Chapters:            {}", stats.total_chapters);
    println!("Pages:               {}", stats.total_pages);
    println!("Avg pages/chapter:   {:.1}", stats.avg_pages_per_chapter);
    if !stats.top_manga.is_empty() {
        println!("Top mangas by chapter count:");
        for (i, top) in stats.top_manga.iter().enumerate() {
            println!(
                "  {:>2}. {} ({} chapters, {} pages)",
                i + 1,
                top.manga_title,
                top.chapter_count,
                top.total_pages
            );
        }
    }
    store.close()?;
    Ok(())
}

fn print_search(cfg: &Config, query: &str) -> Result<(), Box<dyn std::error::Error>> {
    let store = SqliteStore::open(&cfg.db_path)?;
    let found = store.search_manga(query)?;
    if found.is_empty() {
        println!("No manga matching '{}'", query);
    }
    for manga in &found {
        let scans: Vec<&str> = manga.scan_types.iter().map(|s| s.name.as_str()).collect();
        println!(
            "{} [{}] {} chapters, {} pages ({})",
            manga.title,
            manga.language,
            manga.total_chapters,
            manga.total_pages,
            scans.join(", ")
        );
    }
    store.close()?;
    Ok(())
}

async fn try_main(cli: Cli) -> Result<bool, Box<dyn std::error::Error>> {
    let cfg = Config::load_from(&cli.config);

    match cli.command {
        Command::Run { fresh } => {
            let client = cfg.http.create_http_client()?;
            let pipeline = Pipeline::new(client, cfg);
            let outcome = scheduler::run_once(&pipeline, fresh).await;
            info!(
                "Run finished: success={}, {} mangas added, {} chapters added",
                outcome.success, outcome.mangas_added, outcome.chapters_added
            );
            Ok(outcome.success)
        }
        Command::Schedule { skip_initial } => {
            let client = cfg.http.create_http_client()?;
            info!("Scheduling daily scraping at {}", cfg.schedule.daily_at);
            let pipeline = Pipeline::new(client, cfg);
            scheduler::run_daily(&pipeline, skip_initial).await?;
            Ok(true)
        }
        Command::Stats => {
            print_stats(&cfg)?;
            Ok(true)
        }
        Command::Search { query } => {
            print_search(&cfg, &query)?;
            Ok(true)
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    init_logging();
    let cli = Cli::parse();

    match try_main(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
