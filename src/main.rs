//! Binary entry point for polystore.
//!
//! A thin demo CLI over the orchestration layer: load the sample catalog,
//! then run the same operation against one engine or all four and compare
//! the results. Everything prints as JSON.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(missing_docs)]
// Allow printing in the CLI binary.
#![allow(clippy::print_stderr)]
#![allow(clippy::print_stdout)]

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};

use polystore::observability::{self, LogFormat};
use polystore::{
    BulkLoader, Catalog, FieldUpdate, PolystoreConfig, Sort, SortDirection, SortField, Target,
    TitleCategory, TitleFilter, TitleId,
};

/// Polystore - one catalog contract over four database engines.
#[derive(Parser)]
#[command(name = "polystore")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log format (text or json).
    #[arg(long, global = true, default_value = "text")]
    log_format: String,

    /// Target backend: mongo, cassandra, neo4j, redis, or all.
    #[arg(short, long, global = true, default_value = "all")]
    target: String,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// Bulk-load the catalog from TSV sources.
    Load {
        /// Titles TSV path.
        #[arg(long)]
        titles: PathBuf,
        /// People TSV path.
        #[arg(long)]
        people: PathBuf,
        /// Credits TSV path.
        #[arg(long)]
        credits: PathBuf,
    },
    /// Fetch one title by canonical id.
    Get {
        /// Canonical title id.
        id: String,
    },
    /// Advanced title search.
    Search {
        /// Substring of the title name (case-insensitive).
        #[arg(long)]
        name: Option<String>,
        /// Production category.
        #[arg(long)]
        category: Option<String>,
        /// Minimum release year.
        #[arg(long)]
        year_min: Option<i32>,
        /// Required genres (repeatable).
        #[arg(long = "genre")]
        genres: Vec<String>,
        /// Minimum rating.
        #[arg(long)]
        rating_min: Option<f64>,
        /// Minimum runtime in minutes.
        #[arg(long)]
        runtime_min: Option<i32>,
        /// Sort field.
        #[arg(long, default_value = "rating")]
        sort: String,
        /// Sort ascending instead of descending.
        #[arg(long)]
        asc: bool,
        /// Result cap.
        #[arg(long, default_value_t = 100)]
        limit: usize,
    },
    /// Update one field of a title; the value is parsed as JSON.
    Update {
        /// Canonical title id.
        id: String,
        /// Field name.
        field: String,
        /// New value (JSON literal, e.g. `8.5`, `"drama"`, `null`).
        value: String,
    },
    /// Delete a title (cascades over its credits).
    Delete {
        /// Canonical title id.
        id: String,
    },
    /// All titles a person appears in (id, falling back to exact name).
    TitlesByPerson {
        /// Canonical person id or exact name.
        person: String,
        /// Result cap.
        #[arg(long, default_value_t = 100)]
        limit: usize,
    },
    /// All people credited in a title.
    PeopleByTitle {
        /// Canonical title id.
        id: String,
    },
    /// Title counts per release year.
    CountByYear,
    /// Average rating per genre.
    AvgByGenre,
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = match &cli.config {
        Some(path) => PolystoreConfig::load_from_file(path)?,
        None => PolystoreConfig::load_default(),
    };
    let target = Target::parse(&cli.target)?;
    let catalog = Catalog::connect(&config)
        .await
        .context("connecting backends")?;

    match cli.command {
        Commands::Load {
            titles,
            people,
            credits,
        } => {
            let loader = BulkLoader::from_paths(&titles, &people, &credits)?;
            let report = loader.run(&catalog, target).await?;
            print_json(&report)?;
        },
        Commands::Get { id } => {
            let result = catalog.get_title(target, &TitleId::new(id)).await?;
            print_json(&result)?;
        },
        Commands::Search {
            name,
            category,
            year_min,
            genres,
            rating_min,
            runtime_min,
            sort,
            asc,
            limit,
        } => {
            let filter = TitleFilter {
                name_contains: name,
                category: category.as_deref().map(TitleCategory::parse),
                year_min,
                genres_all: genres,
                rating_min,
                runtime_min,
            };
            let direction = if asc {
                SortDirection::Asc
            } else {
                SortDirection::Desc
            };
            let sort = Sort::new(SortField::parse(&sort)?, direction);
            let result = catalog.search_titles(target, &filter, sort, limit).await?;
            print_json(&result)?;
        },
        Commands::Update { id, field, value } => {
            let value = serde_json::from_str(&value).context("value must be a JSON literal")?;
            let update = FieldUpdate::parse(&field, value)?;
            let result = catalog
                .update_title_field(target, &TitleId::new(id), &update)
                .await?;
            print_json(&result)?;
        },
        Commands::Delete { id } => {
            let result = catalog.delete_title(target, &TitleId::new(id)).await?;
            print_json(&result)?;
        },
        Commands::TitlesByPerson { person, limit } => {
            let result = catalog
                .titles_by_person(target, &person, Sort::year_desc(), limit)
                .await?;
            print_json(&result)?;
        },
        Commands::PeopleByTitle { id } => {
            let result = catalog.people_by_title(target, &TitleId::new(id)).await?;
            print_json(&result)?;
        },
        Commands::CountByYear => {
            let result = catalog.count_by_year(target).await?;
            print_json(&result)?;
        },
        Commands::AvgByGenre => {
            let result = catalog.average_rating_by_genre(target).await?;
            print_json(&result)?;
        },
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    observability::init(LogFormat::parse(&cli.log_format), cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        },
    }
}
