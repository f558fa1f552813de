use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Which reporting cadence a source statement table holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementPeriod {
    Annual,
    Quarterly,
}

/// One income statement row as ingested from vendor JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncomeStatementRecord {
    pub ticker: String,
    pub period_ending: NaiveDate,
    pub total_revenue: Option<f64>,
    pub operating_income: Option<f64>,
    pub net_income: Option<f64>,
    pub basic_eps: Option<f64>,
    pub diluted_eps: Option<f64>,
}

impl IncomeStatementRecord {
    /// How many metric fields carry a value, used by the annual ingestion
    /// retention rule.
    pub fn populated_metrics(&self) -> usize {
        [
            self.total_revenue,
            self.operating_income,
            self.net_income,
            self.basic_eps,
            self.diluted_eps,
        ]
        .iter()
        .flatten()
        .count()
    }
}

/// One balance sheet row as ingested from vendor JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceSheetRecord {
    pub ticker: String,
    pub period_ending: NaiveDate,
    pub total_assets: Option<f64>,
    pub total_liabilities: Option<f64>,
    pub current_assets: Option<f64>,
    pub current_liabilities: Option<f64>,
    pub stockholders_equity: Option<f64>,
    pub total_debt: Option<f64>,
}

impl BalanceSheetRecord {
    /// How many metric fields carry a value, used by the annual ingestion
    /// retention rule.
    pub fn populated_metrics(&self) -> usize {
        [
            self.total_assets,
            self.total_liabilities,
            self.current_assets,
            self.current_liabilities,
            self.stockholders_equity,
            self.total_debt,
        ]
        .iter()
        .flatten()
        .count()
    }
}

/// One cash flow row as ingested from vendor JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CashFlowRecord {
    pub ticker: String,
    pub period_ending: NaiveDate,
    pub operating_cash_flow: Option<f64>,
    pub free_cash_flow: Option<f64>,
    pub dividends_paid: Option<f64>,
}

/// One joined row of the three annual statements for a single
/// (ticker, period_ending). Anchored at the income statement, so
/// `period_ending` is always present while every numeric field may be null.
#[derive(Debug, Clone, PartialEq)]
pub struct AnnualFundamentalsRow {
    pub period_ending: NaiveDate,
    pub eps: Option<f64>,
    pub revenue: Option<f64>,
    pub net_income: Option<f64>,
    pub operating_income: Option<f64>,
    pub stockholders_equity: Option<f64>,
    pub total_assets: Option<f64>,
    pub total_debt: Option<f64>,
    pub current_assets: Option<f64>,
    pub current_liabilities: Option<f64>,
    pub operating_cash_flow: Option<f64>,
    pub free_cash_flow: Option<f64>,
    pub dividends_paid: Option<f64>,
}

impl AnnualFundamentalsRow {
    /// The numeric fields of the joined row, in table column order.
    pub fn numeric_fields(&self) -> [Option<f64>; 12] {
        [
            self.eps,
            self.revenue,
            self.net_income,
            self.operating_income,
            self.stockholders_equity,
            self.total_assets,
            self.total_debt,
            self.current_assets,
            self.current_liabilities,
            self.operating_cash_flow,
            self.free_cash_flow,
            self.dividends_paid,
        ]
    }

    /// A row with every numeric field null carries no information and is
    /// dropped by the derivation engine. Partial rows survive.
    pub fn is_empty(&self) -> bool {
        self.numeric_fields().iter().all(Option::is_none)
    }
}

/// Flattened per-fiscal-year snapshot written to `derived_metrics`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivedMetricRecord {
    pub ticker: String,
    pub fiscal_year: i32,
    pub eps: Option<f64>,
    pub revenue: Option<f64>,
    pub net_income: Option<f64>,
    pub operating_income: Option<f64>,
    pub stockholders_equity: Option<f64>,
    pub total_assets: Option<f64>,
    pub total_debt: Option<f64>,
    pub current_assets: Option<f64>,
    pub current_liabilities: Option<f64>,
    pub operating_cash_flow: Option<f64>,
    pub free_cash_flow: Option<f64>,
    pub dividends_paid: Option<f64>,
    pub period_ending: NaiveDate,
    pub last_updated: DateTime<Utc>,
}

impl DerivedMetricRecord {
    /// Flatten a joined annual row. The fiscal year is the calendar year of
    /// the period end date.
    pub fn from_annual_row(
        ticker: &str,
        row: &AnnualFundamentalsRow,
        last_updated: DateTime<Utc>,
    ) -> Self {
        Self {
            ticker: ticker.to_string(),
            fiscal_year: row.period_ending.year(),
            eps: row.eps,
            revenue: row.revenue,
            net_income: row.net_income,
            operating_income: row.operating_income,
            stockholders_equity: row.stockholders_equity,
            total_assets: row.total_assets,
            total_debt: row.total_debt,
            current_assets: row.current_assets,
            current_liabilities: row.current_liabilities,
            operating_cash_flow: row.operating_cash_flow,
            free_cash_flow: row.free_cash_flow,
            dividends_paid: row.dividends_paid,
            period_ending: row.period_ending,
            last_updated,
        }
    }
}

/// Point-in-time ratio snapshot written to `fundamental_scores`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FundamentalScoreRecord {
    pub ticker: String,
    pub period_ending: NaiveDate,
    pub as_of_date: NaiveDate,
    pub eps_growth: f64,
    pub revenue_growth: f64,
    pub roe: f64,
    pub debt_to_equity: f64,
    pub net_margin: f64,
    pub fcf_margin: f64,
}

/// Configuration for the application
#[derive(Debug, Clone)]
pub struct Config {
    pub database_path: String,
    pub score_start_year: i32,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok(); // Load .env file if it exists

        Ok(Config {
            database_path: std::env::var("DATABASE_PATH")
                .unwrap_or_else(|_| "nse_fundamentals.db".to_string()),
            score_start_year: std::env::var("SCORE_START_YEAR")
                .unwrap_or_else(|_| "2015".to_string())
                .parse()
                .unwrap_or(2015),
        })
    }
}
