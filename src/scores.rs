use anyhow::Result;
use chrono::{Datelike, NaiveDate, Utc};
use indicatif::{ProgressBar, ProgressStyle};
use thiserror::Error;
use tracing::{error, info};

use crate::calendar;
use crate::database::{Database, QuarterlyTable};
use crate::models::FundamentalScoreRecord;

/// Faults that invalidate a single (ticker, as-of date) computation. They
/// are caught per quarter; the quarter is skipped and the run continues.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RatioError {
    #[error("missing operand: {0}")]
    MissingOperand(&'static str),
    #[error("zero denominator: {0}")]
    ZeroDenominator(&'static str),
}

/// As-of-available operands for one (ticker, quarter end) pair. All are
/// looked up point-in-time; `*_prev` values come from strictly earlier
/// periods.
#[derive(Debug, Clone, Copy, Default)]
pub struct QuarterInputs {
    pub eps: Option<f64>,
    pub eps_prev: Option<f64>,
    pub revenue: Option<f64>,
    pub revenue_prev: Option<f64>,
    pub net_income: Option<f64>,
    pub equity: Option<f64>,
    pub total_debt: Option<f64>,
    pub fcf: Option<f64>,
}

/// The six derived ratios, rounded to 4 decimal places.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreRatios {
    pub eps_growth: f64,
    pub revenue_growth: f64,
    pub roe: f64,
    pub debt_to_equity: f64,
    pub net_margin: f64,
    pub fcf_margin: f64,
}

fn require(value: Option<f64>, name: &'static str) -> Result<f64, RatioError> {
    value.ok_or(RatioError::MissingOperand(name))
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

/// Compute the six fundamental ratios from one quarter's operands.
///
/// Any missing operand or zero denominator fails the whole quarter; ratios
/// are never zero-filled.
pub fn compute_ratios(inputs: &QuarterInputs) -> Result<ScoreRatios, RatioError> {
    let eps = require(inputs.eps, "eps")?;
    let eps_prev = require(inputs.eps_prev, "eps_prev")?;
    let revenue = require(inputs.revenue, "revenue")?;
    let revenue_prev = require(inputs.revenue_prev, "revenue_prev")?;
    let net_income = require(inputs.net_income, "net_income")?;
    let equity = require(inputs.equity, "equity")?;
    let total_debt = require(inputs.total_debt, "total_debt")?;
    let fcf = require(inputs.fcf, "fcf")?;

    if equity == 0.0 {
        return Err(RatioError::ZeroDenominator("equity"));
    }
    if revenue == 0.0 {
        return Err(RatioError::ZeroDenominator("revenue"));
    }
    if eps_prev == 0.0 {
        return Err(RatioError::ZeroDenominator("eps_prev"));
    }
    if revenue_prev == 0.0 {
        return Err(RatioError::ZeroDenominator("revenue_prev"));
    }

    Ok(ScoreRatios {
        eps_growth: round4((eps - eps_prev) / eps_prev.abs()),
        revenue_growth: round4((revenue - revenue_prev) / revenue_prev.abs()),
        roe: round4(net_income / equity),
        debt_to_equity: round4(total_debt / equity),
        net_margin: round4(net_income / revenue),
        fcf_margin: round4(fcf / revenue),
    })
}

/// Counters reported after a score run.
#[derive(Debug, Default)]
pub struct ScoreStats {
    pub tickers_processed: usize,
    pub records_written: usize,
    pub quarters_skipped: usize,
    pub errors: usize,
}

/// Computes point-in-time fundamental ratios at fixed calendar quarter ends,
/// usable for historical backtesting without look-ahead bias.
pub struct FundamentalScoreCalculator<'a> {
    db: &'a Database,
    quarter_ends: Vec<NaiveDate>,
}

impl<'a> FundamentalScoreCalculator<'a> {
    /// Quarter-end calendar runs from `start_year` through the current year.
    pub fn new(db: &'a Database, start_year: i32) -> Self {
        let current_year = Utc::now().date_naive().year();
        Self {
            db,
            quarter_ends: calendar::quarter_ends(start_year, current_year),
        }
    }

    pub fn quarter_ends(&self) -> &[NaiveDate] {
        &self.quarter_ends
    }

    /// Process every ticker with quarterly income statement data. Persistence
    /// failures are logged per ticker and do not abort the run.
    pub async fn process_all(&self) -> Result<ScoreStats> {
        let tickers = self.db.quarterly_tickers().await?;
        info!(
            "computing fundamental scores for {} tickers over {} quarter ends",
            tickers.len(),
            self.quarter_ends.len()
        );

        let pb = ProgressBar::new(tickers.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos:>7}/{len:7} {msg}")
                .unwrap()
                .progress_chars("#>-"),
        );
        pb.set_message("Scoring...");

        let mut stats = ScoreStats::default();
        for ticker in &tickers {
            stats.tickers_processed += 1;
            match self.process_ticker(ticker).await {
                Ok((written, skipped)) => {
                    stats.records_written += written;
                    stats.quarters_skipped += skipped;
                }
                Err(e) => {
                    error!(ticker = %ticker, "failed to compute scores: {e:#}");
                    stats.errors += 1;
                }
            }
            pb.inc(1);
            pb.set_message(format!("{} records", stats.records_written));
        }
        pb.finish_with_message(format!("{} records written", stats.records_written));

        info!(
            total = stats.records_written,
            skipped = stats.quarters_skipped,
            errors = stats.errors,
            "fundamental score run complete"
        );
        Ok(stats)
    }

    /// Score every quarter end for one ticker and write the batch in one
    /// upsert. Returns (records written, quarters skipped).
    async fn process_ticker(&self, ticker: &str) -> Result<(usize, usize)> {
        let mut records = Vec::new();
        let mut skipped = 0;

        for &quarter_end in &self.quarter_ends {
            let inputs = self.quarter_inputs(ticker, quarter_end).await?;
            match compute_ratios(&inputs) {
                Ok(ratios) => records.push(FundamentalScoreRecord {
                    ticker: ticker.to_string(),
                    period_ending: quarter_end,
                    as_of_date: quarter_end,
                    eps_growth: ratios.eps_growth,
                    revenue_growth: ratios.revenue_growth,
                    roe: ratios.roe,
                    debt_to_equity: ratios.debt_to_equity,
                    net_margin: ratios.net_margin,
                    fcf_margin: ratios.fcf_margin,
                }),
                Err(_) => skipped += 1,
            }
        }

        if records.is_empty() {
            return Ok((0, skipped));
        }

        let written = self.db.upsert_fundamental_scores(&records).await?;
        Ok((written as usize, skipped))
    }

    async fn quarter_inputs(&self, ticker: &str, as_of: NaiveDate) -> Result<QuarterInputs> {
        use QuarterlyTable::{BalanceSheet, CashFlow, IncomeStatement};

        Ok(QuarterInputs {
            eps: self
                .db
                .quarter_value(IncomeStatement, "basic_eps", ticker, as_of)
                .await?,
            eps_prev: self
                .db
                .previous_quarter_value(IncomeStatement, "basic_eps", ticker, as_of)
                .await?,
            revenue: self
                .db
                .quarter_value(IncomeStatement, "total_revenue", ticker, as_of)
                .await?,
            revenue_prev: self
                .db
                .previous_quarter_value(IncomeStatement, "total_revenue", ticker, as_of)
                .await?,
            net_income: self
                .db
                .quarter_value(IncomeStatement, "net_income", ticker, as_of)
                .await?,
            equity: self
                .db
                .quarter_value(BalanceSheet, "stockholders_equity", ticker, as_of)
                .await?,
            total_debt: self
                .db
                .quarter_value(BalanceSheet, "total_debt", ticker, as_of)
                .await?,
            fcf: self
                .db
                .quarter_value(CashFlow, "free_cash_flow", ticker, as_of)
                .await?,
        })
    }
}
