use clap::{Parser, Subcommand};
use dialoguer::Confirm;
use film_sleuth::{
    BatchScheduler, FilmSleuthError, MatchHints, ProgressEvent, ProviderRegistry, Resolution,
    ScrapeOptions, ScrapePipeline, WorkItem, open_fetch_cache, scrape_batch, select_match,
};
use humansize::{DECIMAL, format_size};
use std::fs;
use std::path::{Path, PathBuf};
use std::process;

#[derive(Parser)]
#[command(name = "film-sleuth")]
#[command(author, version, about = "Resolve movie metadata, artwork and trailers")]
struct Cli {
    /// Path to a TOML config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// TMDB API key
    #[arg(long, env = "TMDB_API_KEY", global = true, hide_env_values = true)]
    tmdb_api_key: Option<String>,

    /// fanart.tv API key
    #[arg(long, env = "FANART_API_KEY", global = true, hide_env_values = true)]
    fanart_api_key: Option<String>,

    /// Do not read or write the on-disk fetch cache
    #[arg(long, global = true)]
    no_cache: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scrape a batch of titles and print the results as JSON
    Scrape {
        /// Titles to scrape
        #[arg(required_unless_present = "input")]
        titles: Vec<String>,

        /// JSON file with work items instead of titles
        #[arg(short, long, conflicts_with = "titles")]
        input: Option<PathBuf>,

        /// Year hint applied to all titles
        #[arg(long)]
        year: Option<u32>,

        /// IMDb id hint applied to all titles
        #[arg(long)]
        imdb_id: Option<String>,

        #[command(flatten)]
        locale: LocaleArgs,

        /// Number of parallel workers
        #[arg(long)]
        concurrency: Option<usize>,

        /// Let the enrichment provider localize titles and plot
        #[arg(long)]
        foreign_language: bool,

        /// Fetch collection (saga) information
        #[arg(long)]
        collection_info: bool,
    },

    /// Show ranked search candidates for a title
    Search {
        query: String,

        /// Year hint
        #[arg(long)]
        year: Option<u32>,

        /// IMDb id hint, looked up canonically by the provider
        #[arg(long)]
        imdb_id: Option<String>,

        #[command(flatten)]
        locale: LocaleArgs,
    },

    /// Inspect or clear the fetch cache
    Cache {
        #[command(subcommand)]
        command: CacheCommands,
    },
}

#[derive(clap::Args)]
struct LocaleArgs {
    /// Preferred language (ISO 639-1)
    #[arg(long)]
    language: Option<String>,

    /// Preferred country (ISO 3166-1 alpha-2)
    #[arg(long)]
    country: Option<String>,
}

impl LocaleArgs {
    fn apply(self, options: &mut ScrapeOptions) {
        if let Some(language) = self.language {
            options.preferred_language = language;
        }
        if let Some(country) = self.country {
            options.preferred_country = country;
        }
    }
}

#[derive(Subcommand)]
enum CacheCommands {
    /// Show number and size of cached documents
    Stats,
    /// Remove all cached documents
    Clear {
        /// Do not ask for confirmation
        #[arg(short, long)]
        yes: bool,
    },
}

/// Handles progress events and prints formatted output to stderr
fn handle_progress_event(event: ProgressEvent) {
    match event {
        ProgressEvent::Started { total, workers } => {
            eprintln!(
                "FilmSleuth on the case: {} title(s), {} worker(s)",
                total, workers
            );
        }
        ProgressEvent::ItemTaken { name, progress, .. } => {
            eprintln!("[{:>3.0}%] Looking up '{}'...", progress * 100.0, name);
        }
        ProgressEvent::ItemScraped { name, title, .. } => {
            eprintln!("  '{}' identified as '{}'", name, title);
        }
        ProgressEvent::ItemSkipped { name, reason, .. } => {
            eprintln!("  '{}' skipped: {}", name, reason);
        }
        ProgressEvent::ItemFailed { name, error, .. } => {
            eprintln!("  '{}' failed: {}", name, error);
        }
        ProgressEvent::Cancelled { remaining } => {
            eprintln!("Cancelled, {} title(s) left unscraped", remaining);
        }
        ProgressEvent::Complete { summary } => {
            eprintln!(
                "\nDone: {} scraped, {} skipped, {} failed, {} cancelled",
                summary.scraped, summary.skipped, summary.failed, summary.cancelled
            );
        }
    }
}

fn load_options(cli: &Cli) -> Result<ScrapeOptions, FilmSleuthError> {
    let mut options = match &cli.config {
        Some(path) => ScrapeOptions::load(path)?,
        None => ScrapeOptions::default(),
    };
    if cli.tmdb_api_key.is_some() {
        options.tmdb_api_key = cli.tmdb_api_key.clone();
    }
    if cli.fanart_api_key.is_some() {
        options.fanart_api_key = cli.fanart_api_key.clone();
    }
    Ok(options)
}

fn read_items(path: &Path) -> Result<Vec<WorkItem>, String> {
    let content = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
    serde_json::from_str(&content)
        .map_err(|e| format!("Invalid work items in {}: {}", path.display(), e))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), String> {
    let json = serde_json::to_string_pretty(value).map_err(|e| e.to_string())?;
    println!("{}", json);
    Ok(())
}

fn run(cli: Cli) -> Result<(), String> {
    let mut options = load_options(&cli).map_err(|e| e.to_string())?;
    let persistent = !cli.no_cache;

    match cli.command {
        Commands::Scrape {
            titles,
            input,
            year,
            imdb_id,
            locale,
            concurrency,
            foreign_language,
            collection_info,
        } => {
            locale.apply(&mut options);
            if let Some(concurrency) = concurrency {
                options.concurrency = concurrency;
            }
            options.scrape_foreign_language |= foreign_language;
            options.scrape_collection_info |= collection_info;

            let items = match input {
                Some(path) => read_items(&path)?,
                None => titles
                    .iter()
                    .map(|title| {
                        WorkItem::new(title)
                            .with_year(year)
                            .with_external_id(imdb_id.clone())
                    })
                    .collect(),
            };

            let cache = open_fetch_cache(&options, persistent).map_err(|e| e.to_string())?;
            let registry = ProviderRegistry::with_builtin_providers(cache, &options);
            let scheduler = BatchScheduler::new();

            let report = scrape_batch(&registry, &scheduler, items, options, handle_progress_event)
                .map_err(|e| e.to_string())?;
            print_json(&report.into_items())
        }

        Commands::Search {
            query,
            year,
            imdb_id,
            locale,
        } => {
            locale.apply(&mut options);
            let cache = open_fetch_cache(&options, persistent).map_err(|e| e.to_string())?;
            let registry = ProviderRegistry::with_builtin_providers(cache, &options);
            let pipeline =
                ScrapePipeline::from_registry(&registry, options).map_err(|e| e.to_string())?;

            let hints = MatchHints {
                name: query,
                external_id: imdb_id,
                year,
            };
            let ranked = pipeline.resolver().rank(&hints).map_err(|e| e.to_string())?;
            let language = &pipeline.options().preferred_language;

            for candidate in &ranked {
                println!(
                    "{:.3}  {:<10} {} ({})",
                    candidate.score_or_zero(),
                    candidate.id,
                    candidate.display_title(language),
                    candidate
                        .year
                        .map(|y| y.to_string())
                        .unwrap_or_else(|| "----".to_string())
                );
            }

            match select_match(ranked) {
                Resolution::Matched(candidate) | Resolution::Direct(candidate) => {
                    println!("\nWould commit to '{}' ({})", candidate.title, candidate.id);
                }
                Resolution::Ambiguous { perfect_matches } => {
                    println!("\nWould abstain: {} perfect matches", perfect_matches);
                }
                Resolution::NoMatch => println!("No candidates found."),
            }
            Ok(())
        }

        Commands::Cache { command } => {
            let cache = open_fetch_cache(&options, true).map_err(|e| e.to_string())?;
            match command {
                CacheCommands::Stats => {
                    let stats = cache.stats().map_err(|e| e.to_string())?;
                    println!(
                        "{} cached document(s), {}",
                        stats.entries,
                        format_size(stats.total_bytes, DECIMAL)
                    );
                }
                CacheCommands::Clear { yes } => {
                    let confirmed = yes
                        || Confirm::new()
                            .with_prompt("Remove all cached documents?")
                            .default(false)
                            .interact()
                            .map_err(|e| e.to_string())?;
                    if confirmed {
                        let removed = cache.clear().map_err(|e| e.to_string())?;
                        println!("Removed {} cached document(s).", removed);
                    } else {
                        println!("Cache left untouched.");
                    }
                }
            }
            Ok(())
        }
    }
}

fn main() {
    let cli = Cli::parse();

    // RUST_LOG wins over --verbose
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "film_sleuth=debug".to_string()
        } else {
            "film_sleuth=info".to_string()
        }
    });
    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(cli) {
        eprintln!("\nError: {}", e);
        process::exit(1);
    }
}
