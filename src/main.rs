//! # Free-tier catalog CLI (`ftc`)
//!
//! Query the free-for.dev catalog from the terminal, or serve it to agents
//! over MCP (stdio) or a JSON HTTP API.
//!
//! ## Usage
//!
//! ```bash
//! ftc --config ./config/ftc.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `ftc search "<query>"` | Fuzzy, ranked search |
//! | `ftc find [query]` | Plain substring search in catalog order |
//! | `ftc similar <name>` | Services similar to a named one |
//! | `ftc get <name>` / `ftc get --url <url>` | One service |
//! | `ftc categories [--with-count]` | List categories |
//! | `ftc tags` | List tags |
//! | `ftc popular` | Services ranked by popularity |
//! | `ftc stats` | Catalog, index, and cache statistics |
//! | `ftc refresh` | Re-download and re-parse the catalog |
//! | `ftc cache clear` | Delete cached data |
//! | `ftc serve mcp` | MCP server on stdio |
//! | `ftc serve http` | JSON HTTP API on `[server].bind` |
//!
//! ## Examples
//!
//! ```bash
//! # Typo-tolerant search
//! ftc search "postgres databse" --limit 5
//!
//! # Everything tagged "email" in the APIs category
//! ftc find --category apis --tag email
//!
//! # JSON output
//! ftc categories --with-count --json
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use freetier_catalog::catalog::CatalogService;
use freetier_catalog::config::{self, Config};
use freetier_catalog::models::{SearchQuery, ServiceLookup, ServiceRecord};
use freetier_catalog::tools::{ToolContext, ToolRegistry};
use freetier_catalog::{mcp, server};

/// Free-tier developer service catalog.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. When the file does not exist, built-in defaults are used. See
/// `config/ftc.example.toml`.
#[derive(Parser)]
#[command(
    name = "ftc",
    about = "Search the free-for.dev catalog of free-tier developer services",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/ftc.toml")]
    config: PathBuf,

    /// Print machine-readable JSON instead of text.
    #[arg(long, global = true)]
    json: bool,

    /// Log level when RUST_LOG is unset (error, warn, info, debug, trace).
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fuzzy search, ranked by relevance.
    Search {
        /// Free-text query; tolerant of typos.
        query: String,

        /// Filter by category (substring, case-insensitive).
        #[arg(long)]
        category: Option<String>,

        /// Keep services carrying any of these tags. Repeatable.
        #[arg(long = "tag")]
        tags: Vec<String>,

        #[arg(long)]
        limit: Option<usize>,
    },

    /// Plain substring search in catalog order.
    Find {
        /// Substring to match in name, description, free tier, or category.
        query: Option<String>,

        #[arg(long)]
        category: Option<String>,

        #[arg(long = "tag")]
        tags: Vec<String>,

        #[arg(long)]
        limit: Option<usize>,
    },

    /// Services similar to a named service.
    Similar {
        /// Exact service name (case-insensitive).
        name: String,

        #[arg(long, default_value_t = 5)]
        limit: usize,
    },

    /// Show one service by name or URL.
    Get {
        /// Service name (case-insensitive).
        name: Option<String>,

        /// Exact service URL; preferred over the name when both match.
        #[arg(long)]
        url: Option<String>,
    },

    /// List categories.
    Categories {
        /// Include the number of services per category.
        #[arg(long)]
        with_count: bool,
    },

    /// List all tags in use.
    Tags,

    /// Services ranked by a popularity heuristic.
    Popular {
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Catalog, search index, and cache statistics.
    Stats,

    /// Re-download and re-parse the catalog, replacing cached data.
    Refresh,

    /// Manage the on-disk cache.
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },

    /// Serve the catalog tools.
    Serve {
        #[command(subcommand)]
        service: ServeService,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// Delete the cached snapshot.
    Clear,
}

#[derive(Subcommand)]
enum ServeService {
    /// MCP JSON-RPC on stdin/stdout.
    Mcp,
    /// JSON HTTP API on `[server].bind`.
    Http,
}

fn initialize_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    initialize_tracing(&cli.log_level);

    let cfg = Arc::new(config::resolve_config(&cli.config)?);
    let catalog = Arc::new(
        CatalogService::from_config(&cfg).context("failed to set up catalog service")?,
    );
    let json = cli.json;

    match cli.command {
        Commands::Search {
            query,
            category,
            tags,
            limit,
        } => {
            let query = SearchQuery {
                query: Some(query),
                category,
                tags: non_empty(tags),
                limit: resolve_limit(&cfg, limit),
            };
            catalog.initialize().await?;
            let results = catalog.search(&query)?;
            if json {
                print_json(&results)?;
            } else if results.is_empty() {
                println!("No results.");
            } else {
                for (i, r) in results.iter().enumerate() {
                    println!(
                        "{}. [{:.3}] {}",
                        i + 1,
                        r.score,
                        r.record.name
                    );
                    print_record_body(&r.record);
                }
            }
        }
        Commands::Find {
            query,
            category,
            tags,
            limit,
        } => {
            let query = SearchQuery {
                query,
                category,
                tags: non_empty(tags),
                limit: resolve_limit(&cfg, limit),
            };
            catalog.initialize().await?;
            let services = catalog.basic_search(&query)?;
            print_services(&services, json)?;
        }
        Commands::Similar { name, limit } => {
            catalog.initialize().await?;
            match catalog.similar(&name, cfg.search.clamp_limit(limit))? {
                Some(services) => print_services(&services, json)?,
                None => anyhow::bail!("service not found: {}", name),
            }
        }
        Commands::Get { name, url } => {
            if name.is_none() && url.is_none() {
                anyhow::bail!("provide a service name or --url");
            }
            catalog.initialize().await?;
            let lookup = ServiceLookup { name, url };
            let Some(service) = catalog.get_service(&lookup)? else {
                anyhow::bail!(
                    "service not found: {}",
                    lookup.url.or(lookup.name).unwrap_or_default()
                );
            };
            if json {
                print_json(&service)?;
            } else {
                println!("{}", service.name);
                print_record_body(&service);
                if let Some(tags) = &service.tags {
                    println!("   tags: {}", tags.join(", "));
                }
            }
        }
        Commands::Categories { with_count } => {
            catalog.initialize().await?;
            if with_count {
                let categories = catalog.categories_with_count()?;
                if json {
                    print_json(&categories)?;
                } else {
                    for c in categories {
                        println!("{:>4}  {}", c.count, c.name);
                    }
                }
            } else {
                let categories = catalog.categories()?;
                if json {
                    print_json(&categories)?;
                } else {
                    for c in categories {
                        println!("{}", c);
                    }
                }
            }
        }
        Commands::Tags => {
            catalog.initialize().await?;
            let tags = catalog.all_tags()?;
            if json {
                print_json(&tags)?;
            } else {
                for t in tags {
                    println!("{}", t);
                }
            }
        }
        Commands::Popular { limit } => {
            catalog.initialize().await?;
            let services = catalog.popular(resolve_limit(&cfg, limit))?;
            print_services(&services, json)?;
        }
        Commands::Stats => {
            catalog.initialize().await?;
            let stats = catalog.stats();
            if json {
                print_json(&stats)?;
            } else {
                println!("Services:          {}", stats.total_services);
                println!("Categories:        {}", stats.total_categories);
                println!("With tags:         {}", stats.services_with_tags);
                println!("With limitations:  {}", stats.services_with_limitations);
                if let Some(updated) = stats.last_updated {
                    println!("Last updated:      {}", updated.to_rfc3339());
                }
                println!("Source:            {}", stats.source);
                println!("Cache:             {}", stats.cache.location);
                println!(
                    "Search memo:       {}/{}",
                    stats.search.cache_entries, stats.search.cache_capacity
                );
            }
        }
        Commands::Refresh => {
            let summary = catalog.refresh().await?;
            if json {
                print_json(&summary)?;
            } else {
                println!(
                    "Refreshed: {} services in {} categories{}",
                    summary.services,
                    summary.categories,
                    if summary.changed { "" } else { " (unchanged)" }
                );
            }
        }
        Commands::Cache {
            action: CacheAction::Clear,
        } => {
            catalog
                .clear_cache()
                .await
                .context("failed to clear cache")?;
            if !json {
                println!("Cache cleared.");
            }
        }
        Commands::Serve { service } => {
            catalog.initialize().await?;
            let tools = Arc::new(ToolRegistry::with_builtins());
            let ctx = ToolContext::new(catalog.clone(), cfg.clone());
            match service {
                ServeService::Mcp => mcp::run_stdio(tools, ctx).await?,
                ServeService::Http => server::run_server(tools, ctx).await?,
            }
        }
    }

    Ok(())
}

fn non_empty(tags: Vec<String>) -> Option<Vec<String>> {
    (!tags.is_empty()).then_some(tags)
}

fn resolve_limit(cfg: &Config, limit: Option<usize>) -> usize {
    cfg.search
        .clamp_limit(limit.unwrap_or(cfg.search.default_limit))
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_record_body(record: &ServiceRecord) {
    println!("   {}", record.url);
    println!("   category: {}", record.category);
    if !record.description.is_empty() {
        println!("   {}", record.description);
    }
    if record.free_tier != record.description {
        println!("   free tier: {}", record.free_tier);
    }
    if let Some(limitation) = &record.limitation {
        println!("   limit: {}", limitation);
    }
}

fn print_services(services: &[ServiceRecord], json: bool) -> Result<()> {
    if json {
        return print_json(services);
    }
    if services.is_empty() {
        println!("No results.");
        return Ok(());
    }
    for (i, s) in services.iter().enumerate() {
        println!("{}. {}", i + 1, s.name);
        print_record_body(s);
    }
    Ok(())
}
