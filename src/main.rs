use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use nse_fundamentals::database::Database;
use nse_fundamentals::ingest::{StatementIngestor, StatementKind};
use nse_fundamentals::metrics::DerivedMetricsCalculator;
use nse_fundamentals::models::{Config, StatementPeriod};
use nse_fundamentals::scores::FundamentalScoreCalculator;

#[derive(Parser)]
#[command(name = "nse-fundamentals", about = "ETL pipeline for NSE equity fundamentals")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database schema (no-op if it already exists)
    Init,
    /// Load vendor statement JSON files into the source tables
    Ingest {
        #[arg(long, value_enum)]
        kind: KindArg,
        #[arg(long, value_enum)]
        period: PeriodArg,
        /// Directory of per-ticker JSON dumps (file stem = ticker)
        #[arg(long)]
        dir: PathBuf,
    },
    /// Flatten the annual statements into the derived_metrics table
    DeriveMetrics,
    /// Compute point-in-time ratios into the fundamental_scores table
    FundamentalScores,
}

#[derive(Clone, Copy, ValueEnum)]
enum KindArg {
    Income,
    BalanceSheet,
    CashFlow,
}

impl From<KindArg> for StatementKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Income => StatementKind::IncomeStatement,
            KindArg::BalanceSheet => StatementKind::BalanceSheet,
            KindArg::CashFlow => StatementKind::CashFlow,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum PeriodArg {
    Annual,
    Quarterly,
}

impl From<PeriodArg> for StatementPeriod {
    fn from(period: PeriodArg) -> Self {
        match period {
            PeriodArg::Annual => StatementPeriod::Annual,
            PeriodArg::Quarterly => StatementPeriod::Quarterly,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    // Connection failure is the only fatal fault; everything downstream is
    // recovered per ticker.
    let db = Database::connect(&config.database_path).await?;

    match cli.command {
        Commands::Init => {
            println!("Schema ready at {}", config.database_path);
        }
        Commands::Ingest { kind, period, dir } => {
            let ingestor = StatementIngestor::new(&db);
            let stats = ingestor
                .ingest_dir(kind.into(), period.into(), &dir)
                .await?;
            println!(
                "Ingested {} records from {} files ({} errors)",
                stats.records_written, stats.files_processed, stats.errors
            );
        }
        Commands::DeriveMetrics => {
            let calculator = DerivedMetricsCalculator::new(&db);
            let stats = calculator.process_all().await?;
            println!(
                "Completed! Processed {} records across {} tickers ({} empty rows skipped, {} errors)",
                stats.records_written, stats.tickers_processed, stats.rows_skipped, stats.errors
            );
        }
        Commands::FundamentalScores => {
            let calculator = FundamentalScoreCalculator::new(&db, config.score_start_year);
            let stats = calculator.process_all().await?;
            println!(
                "Completed! Saved {} score records across {} tickers ({} quarters skipped, {} errors)",
                stats.records_written, stats.tickers_processed, stats.quarters_skipped, stats.errors
            );
        }
    }

    Ok(())
}
