use std::collections::BTreeSet;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use dex_api::{ApiConfig, BrowseView, Browser, CatalogApi, GenerationParams, GenerationView, InProcApi, SearchView};
use dex_core::{CatalogRecord, FilterState, Generation, SortOrder};
use dex_persist::{MemoryStorage, SqliteStorage, Storage};
use dex_remote::RemoteConfig;
use dex_search::normalize_query;
use metrics::counter;
use tokio::io::AsyncBufReadExt;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "dexctl", version, about = "Dex catalog CLI")]
struct Cli {
    /// Output format
    #[arg(short = 'o', long = "output", value_enum, global = true, default_value_t = Output::Human)]
    output: Output,

    /// Catalog API base URL
    #[arg(long = "base-url", env = "DEX_BASE_URL", global = true)]
    base_url: Option<String>,

    /// SQLite file for the response cache (default: ~/.dex/dex.db)
    #[arg(long = "db-path", env = "DEX_DB_PATH", global = true)]
    db_path: Option<String>,

    /// Keep the response cache in memory only
    #[arg(long = "no-persist", action = ArgAction::SetTrue, global = true)]
    no_persist: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Output { Human, Json }

#[derive(Subcommand, Debug)]
enum Commands {
    /// List generation windows
    Gens,
    /// Page through one generation
    Ls {
        /// Generation: 1-9, "gen-3", or roman "iii"
        #[arg(long = "gen", default_value = "1")]
        generation: Generation,
        /// ID_ASC, ID_DESC, AZ, ZA
        #[arg(long = "sort", default_value = "ID_ASC")]
        sort: SortOrder,
        /// Only records carrying every given type
        #[arg(long = "type")]
        types: Vec<String>,
        /// Number of slices to load
        #[arg(long = "pages", default_value_t = 1, conflicts_with = "all")]
        pages: u32,
        /// Load the whole generation
        #[arg(long = "all", action = ArgAction::SetTrue)]
        all: bool,
    },
    /// Search the whole catalog by name or id
    Search {
        query: String,
        /// Limit results
        #[arg(long = "limit")]
        limit: Option<usize>,
    },
    /// Show one record
    Show {
        name_or_id: String,
    },
    /// Inspect or clear the response cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
    /// Read queries from stdin and search each settled one
    WatchSearch,
}

#[derive(Subcommand, Debug, Clone, Copy)]
enum CacheAction { Stats, Clear }

fn init_tracing() {
    let env = std::env::var("DEX_LOG").unwrap_or_else(|_| "info".to_string());
    let filter = tracing_subscriber::EnvFilter::from_str(&env).unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).with_writer(std::io::stderr).init();
}

fn init_metrics() {
    if let Ok(addr) = std::env::var("DEX_METRICS_ADDR") {
        if let Ok(sock) = addr.parse::<std::net::SocketAddr>() {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            match builder.with_http_listener(sock).install() {
                Ok(_) => tracing::info!(addr = %addr, "Prometheus metrics exporter listening"),
                Err(e) => tracing::warn!(error = %e, "failed to install metrics exporter"),
            }
        } else {
            tracing::warn!(addr = %addr, "invalid DEX_METRICS_ADDR; expected host:port");
        }
    }
}

/// The cache is best effort: an unusable database falls back to memory.
fn open_storage(cli: &Cli) -> Arc<dyn Storage> {
    if cli.no_persist {
        return Arc::new(MemoryStorage::new());
    }
    let opened = match cli.db_path.as_deref() {
        Some(path) => {
            let max_pages = std::env::var("DEX_CACHE_MAX_PAGES").ok().and_then(|s| s.parse().ok());
            SqliteStorage::open(path, max_pages)
        }
        None => SqliteStorage::open_default(),
    };
    match opened {
        Ok(db) => Arc::new(db),
        Err(e) => {
            warn!(error = %e, "response cache unavailable; using memory");
            Arc::new(MemoryStorage::new())
        }
    }
}

fn connect(cli: &Cli, cfg: ApiConfig) -> Result<Arc<InProcApi>> {
    let mut remote = RemoteConfig::from_env();
    if let Some(url) = &cli.base_url {
        remote.base_url = url.clone();
    }
    Ok(Arc::new(InProcApi::connect(&remote, open_storage(cli), cfg)?))
}

fn command_name(c: &Commands) -> &'static str {
    match c {
        Commands::Gens => "gens",
        Commands::Ls { .. } => "ls",
        Commands::Search { .. } => "search",
        Commands::Show { .. } => "show",
        Commands::Cache { .. } => "cache",
        Commands::WatchSearch => "watch-search",
    }
}

fn print_records(records: &[CatalogRecord]) {
    for r in records {
        let types: Vec<&str> = r.types.iter().map(String::as_str).collect();
        println!("#{:<5} {:<24} {}", r.id, r.name, types.join("/"));
    }
}

fn print_generation(output: Output, view: &GenerationView) -> Result<()> {
    match output {
        Output::Human => {
            print_records(&view.records);
            println!(
                "-- {} {} • {} shown • {}/{} loaded{}",
                view.generation,
                view.sort,
                view.records.len(),
                view.loaded_count,
                view.limit,
                if view.has_more { " • more available" } else { "" }
            );
        }
        Output::Json => println!("{}", serde_json::to_string_pretty(view)?),
    }
    Ok(())
}

fn print_search(output: Output, view: &SearchView) -> Result<()> {
    match output {
        Output::Human => {
            print_records(&view.records);
            println!("-- \"{}\" • {} results", view.query, view.records.len());
        }
        Output::Json => println!("{}", serde_json::to_string_pretty(view)?),
    }
    Ok(())
}

fn print_browse(output: Output, query: &str, view: &BrowseView) -> Result<()> {
    match output {
        Output::Human => {
            print_records(&view.records);
            println!("-- {:?} \"{}\" • {} records", view.mode, query, view.records.len());
        }
        Output::Json => println!("{}", serde_json::to_string(view)?),
    }
    Ok(())
}

/// Debounce stdin lines into searches and print each settled result.
async fn watch_search(output: Output, api: Arc<InProcApi>) -> Result<()> {
    api.load_generation(GenerationParams::default()).await?;
    let mut browser = Browser::new(Arc::clone(&api));
    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    let mut last = String::new();
    let mut printed: Option<String> = None;
    loop {
        tokio::select! {
            line = lines.next_line() => match line? {
                Some(text) => {
                    last = normalize_query(&text);
                    browser.set_filter(FilterState { search: text, ..browser.filter().clone() });
                }
                None => break,
            },
            settled = browser.next_settled() => match settled {
                Some(res) => {
                    let query = browser.settled_search();
                    print_browse(output, &query, &res?)?;
                    printed = Some(query);
                }
                None => break,
            },
        }
    }
    // input closed: wait for the final query to settle
    while browser.settled_search() != last {
        match browser.next_settled().await {
            Some(res) => {
                let query = browser.settled_search();
                print_browse(output, &query, &res?)?;
                printed = Some(query);
            }
            None => break,
        }
    }
    // a search interrupted by newer input may never have been shown
    let settled = browser.settled_search();
    if printed.as_deref() != Some(settled.as_str()) {
        let view = browser.refresh().await?;
        print_browse(output, &settled, &view)?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    init_metrics();
    let cli = Cli::parse();
    counter!("cli_commands_total", 1u64, "command" => command_name(&cli.command));
    let mut cfg = ApiConfig::from_env();

    match &cli.command {
        Commands::Gens => match cli.output {
            Output::Human => {
                for g in Generation::ALL {
                    let w = g.window();
                    println!("{} • ids {}-{} • {} species", g, w.offset + 1, w.end(), w.limit);
                }
            }
            Output::Json => {
                let rows: Vec<serde_json::Value> = Generation::ALL
                    .iter()
                    .map(|g| serde_json::json!({ "generation": g, "offset": g.window().offset, "limit": g.window().limit }))
                    .collect();
                println!("{}", serde_json::to_string_pretty(&rows)?);
            }
        },
        Commands::Ls { generation, sort, types, pages, all } => {
            let api = connect(&cli, cfg)?;
            let types: BTreeSet<String> = types.iter().map(|t| t.trim().to_lowercase()).collect();
            info!(generation = %generation, sort = %sort, types = ?types, pages, all, "ls invoked");
            let params = GenerationParams { generation: *generation, sort: *sort, types: types.clone() };
            let mut view = api.load_generation(params).await?;
            if *all {
                view = api.load_all(&types).await?;
            } else {
                for _ in 1..*pages {
                    if !view.has_more {
                        break;
                    }
                    let before = view.loaded_count;
                    view = api.next_page(&types).await?;
                    if view.loaded_count == before {
                        warn!(loaded = before, "page load made no progress; stopping");
                        break;
                    }
                }
            }
            print_generation(cli.output, &view)?;
        }
        Commands::Search { query, limit } => {
            if let Some(limit) = limit {
                cfg.search.limit = (*limit).max(1);
            }
            let api = connect(&cli, cfg)?;
            info!(query = %query, limit = cfg.search.limit, "search invoked");
            let view = api.search_catalog(query).await?;
            print_search(cli.output, &view)?;
        }
        Commands::Show { name_or_id } => {
            let api = connect(&cli, cfg)?;
            let rec = api.detail(name_or_id).await?;
            match cli.output {
                Output::Human => {
                    println!("#{} {}", rec.id, rec.name);
                    println!("types:  {}", rec.types.join(", "));
                    println!("height: {}", rec.height);
                    println!("weight: {}", rec.weight);
                }
                Output::Json => println!("{}", serde_json::to_string_pretty(&rec)?),
            }
        }
        Commands::Cache { action } => {
            let api = connect(&cli, cfg)?;
            match action {
                CacheAction::Stats => match cli.output {
                    Output::Human => println!("cached records: {}", api.cache_len()),
                    Output::Json => println!("{}", serde_json::json!({ "records": api.cache_len() })),
                },
                CacheAction::Clear => {
                    let n = api.cache_len();
                    api.clear_cache();
                    info!(removed = n, "cache cleared");
                    if cli.output == Output::Json {
                        println!("{}", serde_json::json!({ "removed": n }));
                    } else {
                        println!("removed {} cached records", n);
                    }
                }
            }
        }
        Commands::WatchSearch => {
            let api = connect(&cli, cfg)?;
            watch_search(cli.output, api).await?;
        }
    }
    Ok(())
}
