//! Command-line interface for the harvester.

use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use textwrap::{fill, Options};

use crate::catalog::{Catalog, CatalogFilter, CatalogRecord};
use crate::config::HarvestConfig;
use crate::connectors::ConnectorRegistry;
use crate::error::Result;
use crate::export::export_csv;
use crate::harvester::{Harvester, ScrapeOptions};
use crate::queries::QueryPlan;
use crate::types::{HarvestStats, SourceStatus};

const WRAP_WIDTH: usize = 88;

/// QDArchive harvester - Collect open qualitative research data from public repositories.
#[derive(Parser)]
#[command(name = "qdarchive")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// SQLite catalog path (default: $QDARCHIVE_DB_PATH or qdarchive.db)
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    /// Root directory for downloaded files (default: $QDARCHIVE_DATA_DIR or data/)
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Where the queries of a harvest come from.
#[derive(Args, Debug, Default)]
pub struct QueryArgs {
    /// Search query; repeat for several (default: built-in query list)
    #[arg(short, long = "query")]
    pub queries: Vec<String>,

    /// YAML file with `default:` and per-source `sources:` query lists
    #[arg(long, conflicts_with = "queries")]
    pub queries_file: Option<PathBuf>,

    /// Keep at most this many new results per query
    #[arg(short = 'n', long)]
    pub limit: Option<usize>,

    /// Only keep datasets listing a file with this extension
    #[arg(short = 't', long)]
    pub file_type: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Search a source and print the matching datasets.
    Search {
        /// Source name (see `list-sources`)
        source: String,

        /// Search query
        #[arg(short, long, default_value = "qualitative data")]
        query: String,

        /// Only keep datasets listing a file with this extension
        #[arg(short = 't', long)]
        file_type: Option<String>,

        /// Maximum number of results to print
        #[arg(short = 'n', long, default_value_t = 20)]
        limit: usize,
    },

    /// Harvest one source into the catalog.
    Scrape {
        /// Source name (see `list-sources`)
        source: String,

        #[command(flatten)]
        queries: QueryArgs,
    },

    /// Harvest every registered source, retrying failed ones.
    ScrapeAll {
        #[command(flatten)]
        queries: QueryArgs,

        /// Extra rounds for failed sources (default: $QDARCHIVE_SOURCE_RETRIES or 2)
        #[arg(long)]
        retries: Option<u32>,
    },

    /// Export the catalog to CSV.
    Export {
        /// Output file (default: exports/metadata.csv)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show catalog counts.
    Status,

    /// Delete every catalog record and downloaded file.
    Reset {
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// List the available sources.
    ListSources,

    /// List catalog records matching filters.
    Db {
        #[arg(long)]
        source: Option<String>,

        /// Only QDA files
        #[arg(long)]
        qda_only: bool,

        /// Only restricted files
        #[arg(long, conflicts_with = "open")]
        restricted: bool,

        /// Only files that are not restricted
        #[arg(long)]
        open: bool,

        /// Substring of the license
        #[arg(long)]
        license: Option<String>,

        /// Substring of the language list
        #[arg(long)]
        language: Option<String>,

        /// Substring of the software list
        #[arg(long)]
        software: Option<String>,

        /// File extension, with or without the dot
        #[arg(short = 't', long)]
        file_type: Option<String>,

        /// Free text over title, description, keywords and tags
        #[arg(short, long)]
        search: Option<String>,

        /// Only downloaded files
        #[arg(long)]
        downloaded: bool,

        /// Only records that name software
        #[arg(long)]
        has_software: bool,

        /// Only records with keywords
        #[arg(long)]
        has_keywords: bool,

        /// Maximum number of rows
        #[arg(short = 'n', long, default_value_t = 50)]
        limit: usize,
    },

    /// Show every field of one catalog record.
    Show {
        /// Catalog id (see `db`)
        id: i64,
    },
}

/// Run the CLI.
pub fn run() -> Result<()> {
    let cli = Cli::parse();

    let mut config = HarvestConfig::from_env()?;
    if let Some(db) = cli.db {
        config = config.with_db_path(db);
    }
    if let Some(dir) = cli.data_dir {
        config = config.with_data_dir(dir);
    }

    match cli.command {
        Commands::Search {
            source,
            query,
            file_type,
            limit,
        } => search_command(&source, &query, file_type.as_deref(), limit),
        Commands::Scrape { source, queries } => scrape_command(&config, &source, &queries),
        Commands::ScrapeAll { queries, retries } => {
            scrape_all_command(&config, &queries, retries.unwrap_or(config.source_retries))
        }
        Commands::Export { output } => {
            let path = output.unwrap_or_else(|| config.default_export_path());
            export_command(&config, &path)
        }
        Commands::Status => status_command(&config),
        Commands::Reset { yes } => reset_command(&config, yes),
        Commands::ListSources => list_sources_command(),
        Commands::Db {
            source,
            qda_only,
            restricted,
            open,
            license,
            language,
            software,
            file_type,
            search,
            downloaded,
            has_software,
            has_keywords,
            limit,
        } => {
            let filter = CatalogFilter {
                source_name: source,
                file_type,
                is_qda_file: qda_only.then_some(true),
                restricted: match (restricted, open) {
                    (true, _) => Some(true),
                    (false, true) => Some(false),
                    (false, false) => None,
                },
                license,
                language,
                software,
                search,
                has_software,
                has_keywords,
                downloaded_only: downloaded,
                ..CatalogFilter::default()
            };
            db_command(&config, &filter, limit)
        }
        Commands::Show { id } => show_command(&config, id),
    }
}

fn spinner(message: String) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    #[allow(clippy::expect_used)] // Static template string that is guaranteed to be valid
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .expect("valid template"),
    );
    pb.set_message(message);
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// Pick the query plan from a YAML file, explicit queries or the defaults.
fn query_plan(args: &QueryArgs) -> Result<QueryPlan> {
    if let Some(path) = &args.queries_file {
        return QueryPlan::load(path);
    }
    if args.queries.is_empty() {
        Ok(QueryPlan::default())
    } else {
        Ok(QueryPlan::from_queries(args.queries.clone()))
    }
}

fn scrape_options(args: &QueryArgs) -> ScrapeOptions {
    ScrapeOptions {
        limit: args.limit,
        file_type: args.file_type.clone(),
    }
}

fn open_catalog(config: &HarvestConfig) -> Result<Catalog> {
    Catalog::open(&config.db_path)
}

fn search_command(source: &str, query: &str, file_type: Option<&str>, limit: usize) -> Result<()> {
    let registry = ConnectorRegistry::with_defaults()?;
    let connector = registry.get(source)?;

    let pb = spinner(format!("Searching {source} for \"{query}\"..."));
    let results = match connector.search(query, file_type) {
        Ok(results) => results,
        Err(e) => {
            pb.finish_and_clear();
            return Err(e);
        }
    };
    pb.finish_and_clear();

    println!(
        "{} {} result(s) from {}",
        style("Found").bold(),
        style(results.len()).cyan(),
        style(source).green()
    );
    println!();
    for result in results.iter().take(limit) {
        println!("  {}", style(&result.title).bold());
        println!("    {}", style(&result.source_url).dim());
        if !result.date_published.is_empty() {
            println!("    Published: {}", result.date_published);
        }
    }
    if results.len() > limit {
        println!();
        println!("  ... and {} more", results.len() - limit);
    }
    Ok(())
}

fn scrape_command(config: &HarvestConfig, source: &str, args: &QueryArgs) -> Result<()> {
    let registry = ConnectorRegistry::with_defaults()?;
    let connector = registry.get(source)?;
    let plan = query_plan(args)?;

    config.ensure_dirs()?;
    let catalog = open_catalog(config)?;
    let harvester = Harvester::new(&catalog, &config.data_dir);

    let queries = plan.for_source(source);
    println!(
        "{} {} with {} quer{}",
        style("Harvesting").bold(),
        style(source).cyan(),
        queries.len(),
        if queries.len() == 1 { "y" } else { "ies" }
    );
    println!();

    let pb = spinner(format!("Harvesting {source}..."));
    let stats = match harvester.scrape(connector, queries, &scrape_options(args)) {
        Ok(stats) => stats,
        Err(e) => {
            pb.finish_and_clear();
            return Err(e);
        }
    };
    pb.finish_and_clear();

    print_stats(&stats, "  ");
    Ok(())
}

fn scrape_all_command(config: &HarvestConfig, args: &QueryArgs, retries: u32) -> Result<()> {
    let registry = ConnectorRegistry::with_defaults()?;
    let plan = query_plan(args)?;

    config.ensure_dirs()?;
    let catalog = open_catalog(config)?;
    let harvester = Harvester::new(&catalog, &config.data_dir);

    let pb = spinner(format!("Harvesting {} sources...", registry.len()));
    let summaries = harvester.scrape_all(&registry, &plan, &scrape_options(args), retries);
    pb.finish_and_clear();

    println!("{}", style("Harvest summary").bold());
    println!();
    for summary in &summaries {
        let status = match summary.status {
            SourceStatus::Ok => style(summary.status.as_str()).green().bold(),
            SourceStatus::Failed => style(summary.status.as_str()).red().bold(),
        };
        println!(
            "  {:<14} {:<8} attempts: {}",
            summary.source_name, status, summary.attempts
        );
        print_stats(&summary.stats, "      ");
        if let Some(error) = &summary.last_error {
            println!("      {} {}", style("Last error:").yellow(), error);
        }
    }

    let failed = summaries
        .iter()
        .filter(|s| s.status == SourceStatus::Failed)
        .count();
    if failed > 0 {
        println!();
        println!(
            "{} {failed} source(s) failed after {} retr{}",
            style("Warning:").yellow().bold(),
            retries,
            if retries == 1 { "y" } else { "ies" }
        );
    }
    Ok(())
}

fn print_stats(stats: &HarvestStats, indent: &str) {
    println!(
        "{indent}Downloaded: {}  Restricted: {}  Skipped: {}",
        style(stats.downloaded).green(),
        style(stats.restricted).yellow(),
        stats.skipped
    );
    println!(
        "{indent}Datasets: {}  Already cataloged: {}  Duplicates: {}  Irrelevant: {}  Failed: {}",
        stats.datasets_seen, stats.already_cataloged, stats.duplicates, stats.irrelevant, stats.failed
    );
}

fn export_command(config: &HarvestConfig, path: &Path) -> Result<()> {
    let catalog = open_catalog(config)?;
    let count = export_csv(&catalog, path)?;
    println!(
        "{} {count} records to {}",
        style("Exported").green().bold(),
        path.display()
    );
    Ok(())
}

fn status_command(config: &HarvestConfig) -> Result<()> {
    let catalog = open_catalog(config)?;
    let stats = catalog.stats()?;

    println!("Total records:    {}", style(stats.total).bold());
    println!("QDA files:        {}", style(stats.qda_files).cyan());
    println!("Downloaded files: {}", style(stats.downloaded).green());
    println!("Restricted files: {}", style(stats.restricted).yellow());

    if !stats.by_source.is_empty() {
        println!();
        println!("{}", style("By source:").bold());
        for (source, count) in &stats.by_source {
            println!("  {source:<15} {count}");
        }
    }
    Ok(())
}

fn reset_command(config: &HarvestConfig, yes: bool) -> Result<()> {
    if !yes && !confirm("Delete every catalog record and downloaded file?")? {
        println!("Aborted.");
        return Ok(());
    }

    let catalog = open_catalog(config)?;
    let removed = catalog.reset()?;
    if config.data_dir.exists() {
        std::fs::remove_dir_all(&config.data_dir)?;
    }
    std::fs::create_dir_all(&config.data_dir)?;

    println!(
        "{} {removed} records and cleared {}",
        style("Removed").green().bold(),
        config.data_dir.display()
    );
    Ok(())
}

fn confirm(question: &str) -> Result<bool> {
    print!("{question} [y/N] ");
    std::io::stdout().flush()?;
    let mut answer = String::new();
    std::io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}

fn list_sources_command() -> Result<()> {
    let registry = ConnectorRegistry::with_defaults()?;
    println!("{}", style("Available sources:").bold());
    println!();
    for source in registry.sources() {
        println!(
            "  {:<15} {:<62} {}",
            style(&source.name).cyan(),
            source.description,
            style(format!("data/{}", source.dir_name)).dim()
        );
    }
    Ok(())
}

fn db_command(config: &HarvestConfig, filter: &CatalogFilter, limit: usize) -> Result<()> {
    let catalog = open_catalog(config)?;
    let total = catalog.count(filter)?;
    let records = catalog.list(filter, Some(limit))?;

    for record in &records {
        let state = if record.is_downloaded() {
            style("downloaded").green()
        } else if record.restricted {
            style("restricted").yellow()
        } else {
            style("metadata").dim()
        };
        println!(
            "{:>6}  {:<12} {:<10} {:<8} {}",
            record.id.unwrap_or_default(),
            record.source_name,
            state,
            if record.is_qda_file { "QDA" } else { "" },
            record.file_name
        );
    }

    println!();
    println!("Showing {} of {total} matching records", records.len());
    Ok(())
}

fn show_command(config: &HarvestConfig, id: i64) -> Result<()> {
    let catalog = open_catalog(config)?;
    let record = catalog.get(id)?;
    print_record(&record);
    Ok(())
}

fn print_record(record: &CatalogRecord) {
    println!("{}", style(&record.title).bold());
    println!();

    let fields: [(&str, String); 20] = [
        ("Source", record.source_name.clone()),
        ("Dataset", record.source_url.clone()),
        ("File", record.file_name.clone()),
        ("Download URL", record.download_url.clone()),
        ("Type", record.file_type.clone()),
        ("QDA file", record.is_qda_file.to_string()),
        ("Restricted", record.restricted.to_string()),
        ("License", record.license_type.clone()),
        ("Authors", record.authors.clone()),
        ("Published", record.date_published.clone()),
        ("Keywords", record.keywords.clone()),
        ("Kind of data", record.kind_of_data.clone()),
        ("Language", record.language.clone()),
        ("Software", record.software.clone()),
        ("Coverage", record.geographic_coverage.clone()),
        ("Local path", record.local_path.clone().unwrap_or_default()),
        ("SHA-256", record.file_hash.clone().unwrap_or_default()),
        (
            "Size",
            record
                .file_size_bytes
                .map(|s| format!("{s} bytes"))
                .unwrap_or_default(),
        ),
        (
            "Downloaded at",
            record
                .downloaded_at
                .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
                .unwrap_or_default(),
        ),
        ("Notes", record.notes.clone().unwrap_or_default()),
    ];
    for (label, value) in fields.iter().filter(|(_, v)| !v.is_empty()) {
        println!("  {:<14} {value}", style(format!("{label}:")).dim());
    }

    if !record.description.is_empty() {
        println!();
        let options = Options::new(WRAP_WIDTH)
            .initial_indent("  ")
            .subsequent_indent("  ");
        println!("{}", fill(&record.description, options));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_scrape() {
        let cli = Cli::parse_from([
            "qdarchive", "scrape", "zenodo", "-q", "qdpx", "-q", "nvivo", "--limit", "5",
        ]);

        let Commands::Scrape { source, queries } = cli.command else {
            panic!("expected scrape");
        };
        assert_eq!(source, "zenodo");
        assert_eq!(queries.queries, vec!["qdpx".to_string(), "nvivo".to_string()]);
        assert_eq!(queries.limit, Some(5));
    }

    #[test]
    fn test_cli_parse_global_flags() {
        let cli = Cli::parse_from(["qdarchive", "status", "--db", "/tmp/x.db"]);
        assert_eq!(cli.db, Some(PathBuf::from("/tmp/x.db")));
        assert!(matches!(cli.command, Commands::Status));
    }

    #[test]
    fn test_cli_parse_db_filters() {
        let cli = Cli::parse_from(["qdarchive", "db", "--qda-only", "--open", "-t", "qdpx"]);
        let Commands::Db {
            qda_only,
            open,
            restricted,
            file_type,
            limit,
            ..
        } = cli.command
        else {
            panic!("expected db");
        };
        assert!(qda_only);
        assert!(open);
        assert!(!restricted);
        assert_eq!(file_type.as_deref(), Some("qdpx"));
        assert_eq!(limit, 50);
    }

    #[test]
    fn test_queries_and_file_conflict() {
        let parsed = Cli::try_parse_from([
            "qdarchive", "scrape-all", "-q", "qdpx", "--queries-file", "q.yaml",
        ]);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_query_plan_defaults() {
        let plan = query_plan(&QueryArgs::default()).unwrap();
        assert_eq!(plan, QueryPlan::default());

        let args = QueryArgs {
            queries: vec!["focus group".to_string()],
            ..QueryArgs::default()
        };
        assert_eq!(query_plan(&args).unwrap().for_source("dryad"), ["focus group".to_string()]);
    }
}
