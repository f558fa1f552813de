use anyhow::Result;
use chrono::Utc;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{error, info};

use crate::database::Database;
use crate::models::DerivedMetricRecord;

/// Counters reported after a derivation run.
#[derive(Debug, Default)]
pub struct DerivationStats {
    pub tickers_processed: usize,
    pub records_written: usize,
    pub rows_skipped: usize,
    pub errors: usize,
}

/// Flattens the three annual statements into one `derived_metrics` row per
/// (ticker, fiscal year).
pub struct DerivedMetricsCalculator<'a> {
    db: &'a Database,
}

impl<'a> DerivedMetricsCalculator<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Process every ticker present in any annual source table. A failure on
    /// one ticker is logged and does not abort the remaining tickers.
    pub async fn process_all(&self) -> Result<DerivationStats> {
        let tickers = self.db.annual_tickers().await?;
        info!("deriving metrics for {} tickers", tickers.len());

        let pb = ProgressBar::new(tickers.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos:>7}/{len:7} {msg}")
                .unwrap()
                .progress_chars("#>-"),
        );
        pb.set_message("Deriving metrics...");

        let mut stats = DerivationStats::default();
        for ticker in &tickers {
            stats.tickers_processed += 1;
            match self.process_ticker(ticker).await {
                Ok((written, skipped)) => {
                    stats.records_written += written;
                    stats.rows_skipped += skipped;
                }
                Err(e) => {
                    error!(ticker = %ticker, "failed to derive metrics: {e:#}");
                    stats.errors += 1;
                }
            }
            pb.inc(1);
            pb.set_message(format!("{} records", stats.records_written));
        }
        pb.finish_with_message(format!("{} records written", stats.records_written));

        info!(
            total = stats.records_written,
            skipped = stats.rows_skipped,
            errors = stats.errors,
            "derived metrics run complete"
        );
        Ok(stats)
    }

    /// Derive and upsert all fiscal-year records for one ticker. Returns
    /// (records written, fully-empty rows skipped).
    async fn process_ticker(&self, ticker: &str) -> Result<(usize, usize)> {
        let rows = self.db.annual_fundamentals(ticker).await?;
        let now = Utc::now();

        let mut records = Vec::with_capacity(rows.len());
        let mut skipped = 0;
        for row in &rows {
            if row.is_empty() {
                skipped += 1;
                continue;
            }
            records.push(DerivedMetricRecord::from_annual_row(ticker, row, now));
        }

        if records.is_empty() {
            return Ok((0, skipped));
        }

        let written = self.db.upsert_derived_metrics(&records).await?;
        Ok((written as usize, skipped))
    }
}
