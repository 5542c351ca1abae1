use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use citation_atlas::analysis::{
    count_duplicates, write_csv, write_map, AffiliationResolver, AffiliationTable, GeoAggregator,
    NominatimGeocoder, COUNTRIES_FILE, MAP_FILE, TABLE_FILE,
};
use citation_atlas::config::{find_config_file, get_config, load_config, Config, API_KEY_ENV};
use citation_atlas::crawl::{
    ArticleExtractor, AuthorCrawl, CitationGraphCrawler, CrawlOptions, RESULTS_FILE,
};
use citation_atlas::models::{AnalysisRow, Article, CountryPoints};
use citation_atlas::ui::{self, print_section, print_status, Status};
use citation_atlas::utils::{load_yaml, PaginatedFetcher, ResultCache};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Citation Atlas - Map who cites a Google Scholar author, by institution and country
#[derive(Parser, Debug)]
#[command(name = "citation-atlas")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Crawl an author's citations, resolve affiliations, and map them by country", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose logging (can be used multiple times for more verbosity: -v, -vv)
    #[arg(long, short, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Only log errors and skip summaries
    #[arg(long, short, global = true)]
    quiet: bool,

    /// Path to configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Also append logs to this file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Crawl the citation graph of an author
    Crawl {
        /// Google Scholar author identifier
        author_id: String,

        /// Root directory of the result cache
        #[arg(long, short)]
        output: Option<PathBuf>,

        /// Fetch everything again instead of reusing cached results
        #[arg(long)]
        overwrite: bool,
    },

    /// Resolve citing authors' affiliations and export them as CSV
    Table {
        author_id: String,

        #[arg(long, short)]
        output: Option<PathBuf>,

        /// Keep citations and affiliations with warnings
        #[arg(long)]
        keep_warnings: bool,

        /// Reference affiliation table
        #[arg(long)]
        affiliations: Option<PathBuf>,

        /// Where to write the table (default: <author dir>/citations.csv)
        #[arg(long)]
        csv: Option<PathBuf>,
    },

    /// Geocode citing countries and render the map
    Map {
        author_id: String,

        #[arg(long, short)]
        output: Option<PathBuf>,

        /// Geocode again instead of reusing cached coordinates
        #[arg(long)]
        overwrite: bool,

        #[arg(long)]
        keep_warnings: bool,

        #[arg(long)]
        affiliations: Option<PathBuf>,
    },

    /// Crawl, export the table, and render the map
    Run {
        author_id: String,

        #[arg(long, short)]
        output: Option<PathBuf>,

        #[arg(long)]
        overwrite: bool,

        #[arg(long)]
        keep_warnings: bool,

        #[arg(long)]
        affiliations: Option<PathBuf>,
    },

    /// Manage the result cache
    Cache {
        #[command(subcommand)]
        command: CacheCommands,
    },

    /// Show recognised environment variables and the effective configuration
    Env,
}

#[derive(Subcommand, Debug)]
enum CacheCommands {
    /// Delete everything cached for an author
    Clear {
        author_id: String,

        #[arg(long, short)]
        output: Option<PathBuf>,
    },
}

/// Options shared by the analysis commands
struct AnalysisArgs {
    keep_warnings: bool,
    affiliations: Option<PathBuf>,
}

/// Print all available environment variables
fn print_env_vars(config: &Config) -> Result<()> {
    println!("Citation Atlas - Environment Variables");
    println!();
    println!("API Keys:");
    println!("  {:<40} SerpApi credential (required for live fetches)", API_KEY_ENV);
    println!();
    println!("Settings (override any configuration key):");
    println!("  CITATION_ATLAS_SERPAPI__PAGE_SIZE        Results per page (default: 20)");
    println!("  CITATION_ATLAS_SERPAPI__TIMEOUT_SECONDS  Search timeout (default: 30)");
    println!("  CITATION_ATLAS_CRAWL__OUTPUT_DIR         Result cache root (default: results)");
    println!("  CITATION_ATLAS_CRAWL__MAX_TITLE_LEN      Title characters in directory names (default: 30)");
    println!("  CITATION_ATLAS_AFFILIATIONS__FILE        Reference affiliation table (default: assets/affiliations.csv)");
    println!("  CITATION_ATLAS_MAP__RADIUS_SCALE         Marker radius factor (default: 6.0)");
    println!("  CITATION_ATLAS_MAP__RADIUS_LOG_BASE      Marker radius log base, 0 for linear (default: 2.0)");
    println!();
    println!("Other Settings:");
    println!("  RUST_LOG                                 Rust logging level (e.g., debug, info, warn, error)");
    println!();
    println!("Effective configuration:");
    println!();
    print!("{}", config.to_toml()?);
    Ok(())
}

fn init_logging(cli: &Cli) -> Result<()> {
    let log_level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let env_filter = if cli.quiet { "error" } else { log_level };

    let file_layer = match &cli.log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("cannot open log file {}", path.display()))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| format!("citation_atlas={}", env_filter)),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();
    Ok(())
}

fn author_dir(config: &Config, output: Option<&Path>, author_id: &str) -> PathBuf {
    output
        .unwrap_or(config.crawl.output_dir.as_path())
        .join(author_id)
}

async fn crawl(
    config: &Config,
    author_id: &str,
    output: Option<&Path>,
    overwrite: bool,
    quiet: bool,
) -> Result<AuthorCrawl> {
    let client = Arc::new(config.serpapi_client()?);
    let fetcher = PaginatedFetcher::new(client.clone(), config.serpapi.api_key.clone())
        .page_size(config.serpapi.page_size);
    let cache = ResultCache::new(fetcher, client);

    let options = CrawlOptions {
        output_dir: output
            .map(Path::to_path_buf)
            .unwrap_or_else(|| config.crawl.output_dir.clone()),
        overwrite,
        max_title_len: config.crawl.max_title_len,
        show_progress: !quiet && ui::is_terminal(),
    };
    let crawler = CitationGraphCrawler::new(
        cache,
        ArticleExtractor::new(&config.crawl.scholar_base_url),
        options,
    );

    let result = crawler
        .crawl_author(author_id)
        .await
        .with_context(|| format!("crawl of {} stopped; rerun to resume", author_id))?;

    if !quiet {
        let report = &result.report;
        print_section("Crawl");
        let status = if report.is_clean() {
            Status::Success
        } else {
            Status::Warning
        };
        print_status(
            status,
            &format!(
                "{} articles, {} citations ({} with warnings)",
                ui::format_number(report.articles),
                ui::format_number(report.citations),
                ui::format_number(report.citations_with_warnings)
            ),
        );
        for mismatch in &report.count_mismatches {
            print_status(
                Status::Warning,
                &format!(
                    "{}: {} citations declared, {} retrieved",
                    ui::truncate_with_ellipsis(&mismatch.article, 60),
                    mismatch.declared,
                    mismatch.retrieved
                ),
            );
        }
        if !report.failures.is_empty() {
            print_status(
                Status::Warning,
                &format!("{} units skipped, see report.yaml", report.failures.len()),
            );
        }
    }
    Ok(result)
}

fn resolve_rows(config: &Config, author_dir: &Path, args: &AnalysisArgs) -> Result<Vec<AnalysisRow>> {
    let results = author_dir.join(RESULTS_FILE);
    if !results.is_file() {
        anyhow::bail!(
            "no crawl results at {}; run `citation-atlas crawl` first",
            results.display()
        );
    }
    let articles: Vec<Article> = load_yaml(&results)?;

    let file = args
        .affiliations
        .clone()
        .unwrap_or_else(|| config.affiliations.file.clone());
    let table = AffiliationTable::from_path(&file)
        .with_context(|| format!("cannot read affiliation table {}", file.display()))?;

    let resolver = AffiliationResolver::new(table)
        .keep_warnings(args.keep_warnings || config.affiliations.keep_warnings);
    Ok(resolver.resolve(&articles))
}

fn table(rows: &[AnalysisRow], csv_path: &Path, quiet: bool) -> Result<()> {
    write_csv(rows, csv_path)?;
    if quiet {
        return Ok(());
    }

    print_section("Affiliations");
    let by_institution = count_duplicates(rows, |r| r.affil_name.as_deref());

    use comfy_table::{Attribute, Cell, Table};
    let mut summary = Table::new();
    summary.load_preset(comfy_table::presets::UTF8_FULL);
    summary.set_header(vec!["Institution", "Country", "Authors"]);
    for (row, count) in by_institution.iter().take(20) {
        summary.add_row(vec![
            Cell::new(ui::truncate_with_ellipsis(
                row.affil_name.as_deref().unwrap_or_default(),
                50,
            ))
            .add_attribute(Attribute::Bold),
            Cell::new(row.affil_country_name.as_deref().unwrap_or("")),
            Cell::new(ui::format_number(*count)),
        ]);
    }
    println!("{summary}");

    let authors = count_duplicates(rows, |r| r.author_id.as_deref()).len();
    print_status(
        Status::Success,
        &format!(
            "{} rows, {} distinct profiled authors, written to {}",
            ui::format_number(rows.len()),
            ui::format_number(authors),
            csv_path.display()
        ),
    );
    Ok(())
}

async fn map(config: &Config, rows: &[AnalysisRow], author_dir: &Path, overwrite: bool, quiet: bool) -> Result<()> {
    let geocoder = NominatimGeocoder::new(
        &config.geocoder.user_agent,
        Duration::from_secs(config.geocoder.timeout_seconds),
    )?
    .with_base_url(&config.geocoder.base_url);
    let aggregator = GeoAggregator::new(geocoder);

    let points = aggregator
        .aggregate(rows, Some(&author_dir.join(COUNTRIES_FILE)), overwrite)
        .await?;
    let map_path = author_dir.join(MAP_FILE);
    write_map(&points, &config.map.style(), &map_path)?;

    if !quiet {
        print_section("Countries");
        print_countries(&points);
        print_status(
            Status::Success,
            &format!("Map written to {}", map_path.display()),
        );
    }
    Ok(())
}

fn print_countries(points: &CountryPoints) {
    use comfy_table::{Cell, CellAlignment, Table};
    let mut ranked: Vec<_> = points.iter().collect();
    ranked.sort_by(|a, b| b.1.count.cmp(&a.1.count).then(a.0.cmp(b.0)));

    let mut table = Table::new();
    table.load_preset(comfy_table::presets::UTF8_FULL);
    table.set_header(vec!["Country", "Authors", "Latitude", "Longitude"]);
    for (country, point) in ranked {
        table.add_row(vec![
            Cell::new(country),
            Cell::new(ui::format_number(point.count)).set_alignment(CellAlignment::Right),
            Cell::new(format!("{:.3}", point.latitude)),
            Cell::new(format!("{:.3}", point.longitude)),
        ]);
    }
    println!("{table}");
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli)?;

    // Load configuration from file if specified or found in default locations
    let config = if let Some(config_path) = &cli.config {
        load_config(Some(config_path.as_path()))?
    } else if let Some(config_path) = find_config_file() {
        tracing::info!("Using config file: {}", config_path.display());
        load_config(Some(config_path.as_path()))?
    } else {
        load_config(None).unwrap_or_else(|e| {
            tracing::warn!("Ignoring environment configuration: {}", e);
            get_config()
        })
    };
    let quiet = cli.quiet;

    match cli.command {
        Commands::Crawl {
            author_id,
            output,
            overwrite,
        } => {
            crawl(&config, &author_id, output.as_deref(), overwrite, quiet).await?;
        }

        Commands::Table {
            author_id,
            output,
            keep_warnings,
            affiliations,
            csv,
        } => {
            let dir = author_dir(&config, output.as_deref(), &author_id);
            let args = AnalysisArgs {
                keep_warnings,
                affiliations,
            };
            let rows = resolve_rows(&config, &dir, &args)?;
            table(&rows, &csv.unwrap_or_else(|| dir.join(TABLE_FILE)), quiet)?;
        }

        Commands::Map {
            author_id,
            output,
            overwrite,
            keep_warnings,
            affiliations,
        } => {
            let dir = author_dir(&config, output.as_deref(), &author_id);
            let args = AnalysisArgs {
                keep_warnings,
                affiliations,
            };
            let rows = resolve_rows(&config, &dir, &args)?;
            map(&config, &rows, &dir, overwrite, quiet).await?;
        }

        Commands::Run {
            author_id,
            output,
            overwrite,
            keep_warnings,
            affiliations,
        } => {
            crawl(&config, &author_id, output.as_deref(), overwrite, quiet).await?;
            let dir = author_dir(&config, output.as_deref(), &author_id);
            let args = AnalysisArgs {
                keep_warnings,
                affiliations,
            };
            let rows = resolve_rows(&config, &dir, &args)?;
            table(&rows, &dir.join(TABLE_FILE), quiet)?;
            map(&config, &rows, &dir, overwrite, quiet).await?;
        }

        Commands::Cache {
            command: CacheCommands::Clear { author_id, output },
        } => {
            let dir = author_dir(&config, output.as_deref(), &author_id);
            if ResultCache::invalidate(&dir)? {
                print_status(Status::Success, &format!("Removed {}", dir.display()));
            } else {
                print_status(Status::Info, &format!("Nothing cached at {}", dir.display()));
            }
        }

        Commands::Env => print_env_vars(&config)?,
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_crawl() {
        let cli = Cli::try_parse_from(["citation-atlas", "-vv", "crawl", "abc123", "--overwrite"])
            .unwrap();
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::Crawl {
                author_id,
                output,
                overwrite,
            } => {
                assert_eq!(author_id, "abc123");
                assert_eq!(output, None);
                assert!(overwrite);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_cache_clear() {
        let cli = Cli::try_parse_from([
            "citation-atlas",
            "cache",
            "clear",
            "abc123",
            "--output",
            "/tmp/out",
            "--log-file",
            "atlas.log",
        ])
        .unwrap();
        assert_eq!(cli.log_file, Some(PathBuf::from("atlas.log")));
        assert!(matches!(
            cli.command,
            Commands::Cache {
                command: CacheCommands::Clear { .. }
            }
        ));
    }

    #[test]
    fn test_author_dir() {
        let config = Config::default();
        assert_eq!(
            author_dir(&config, None, "abc"),
            PathBuf::from("results").join("abc")
        );
        assert_eq!(
            author_dir(&config, Some(Path::new("/tmp/x")), "abc"),
            PathBuf::from("/tmp/x/abc")
        );
    }
}
