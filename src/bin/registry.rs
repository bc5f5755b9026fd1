use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use registry_ingest::database_ops::companies::{CompanyStore, PgCompanyStore};
use registry_ingest::database_ops::db::Db;
use registry_ingest::importer::{
    ImportConfig, Importer, DEFAULT_BATCH_SIZE, DEFAULT_PROGRESS_EVERY,
};
use registry_ingest::util::env as env_util;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "registry", version, about = "Company registry admin CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
#[command(rename_all = "kebab-case")]
enum Commands {
    /// Bulk-import a registry CSV dump into the companies table
    Import {
        /// Path to the CSV file
        file: PathBuf,
        /// Records per bulk insert
        #[arg(long, default_value_t = DEFAULT_BATCH_SIZE)]
        batch_size: usize,
        /// When set, normalizes and dedupes without writing to the database
        #[arg(long, default_value_t = false)]
        dry_run: bool,
        /// Optional override for the database URL
        #[arg(long)]
        db_url: Option<String>,
        /// Known total row count of the dump, for percentage progress lines
        #[arg(long)]
        expect_total: Option<u64>,
        /// Write the final run report as JSON to this path
        #[arg(long)]
        report_json: Option<PathBuf>,
        /// Progress line interval, in rows
        #[arg(long, default_value_t = DEFAULT_PROGRESS_EVERY)]
        progress_every: u64,
        /// Maximum pool connections
        #[arg(long, default_value_t = 5)]
        max_connections: u32,
    },
    /// Print the number of stored companies
    Count {
        /// Optional override for the database URL
        #[arg(long)]
        db_url: Option<String>,
        /// Maximum pool connections
        #[arg(long, default_value_t = 2)]
        max_connections: u32,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    env_util::init_env();
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Import {
            file,
            batch_size,
            dry_run,
            db_url,
            expect_total,
            report_json,
            progress_every,
            max_connections,
        } => {
            let url = resolve_db_url(db_url)?;
            let db = Db::connect(&url, max_connections).await?;
            let importer = Importer::new(
                PgCompanyStore::new(db),
                ImportConfig {
                    batch_size,
                    dry_run,
                    progress_every,
                    expect_total,
                },
            );
            let report = importer.run(&file).await?;
            if let Some(path) = report_json {
                report.write_json(&path)?;
            }
            if !report.failed_cins.is_empty() {
                // keep the failing cins greppable in plain terminal output too
                eprintln!("record commit failures: {}", report.failed_cins.join(", "));
            }
        }
        Commands::Count {
            db_url,
            max_connections,
        } => {
            let url = resolve_db_url(db_url)?;
            let db = Db::connect(&url, max_connections).await?;
            let store = PgCompanyStore::new(db);
            println!("companies: {}", store.count().await?);
        }
    }
    Ok(())
}

fn resolve_db_url(flag: Option<String>) -> Result<String> {
    match flag {
        Some(url) => Ok(url),
        None => env_util::db_url(),
    }
}
