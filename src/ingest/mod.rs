use std::collections::BTreeSet;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde_json::{Map, Value};
use tracing::{debug, error, info, warn};

use crate::calendar;
use crate::database::Database;
use crate::models::{
    BalanceSheetRecord, CashFlowRecord, IncomeStatementRecord, StatementPeriod,
};

/// Statement types handled by the ingestion path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    IncomeStatement,
    BalanceSheet,
    CashFlow,
}

/// One canonical column with its vendor field-name variants, consulted in
/// priority order: the first alias that yields an acceptable value wins.
pub struct FieldAliases {
    pub column: &'static str,
    pub aliases: &'static [&'static str],
}

pub const INCOME_ANNUAL_FIELDS: &[FieldAliases] = &[
    FieldAliases { column: "total_revenue", aliases: &["Total Revenue"] },
    FieldAliases { column: "operating_income", aliases: &["Operating Income"] },
    FieldAliases { column: "net_income", aliases: &["Net Income"] },
    FieldAliases { column: "basic_eps", aliases: &["Basic EPS"] },
    FieldAliases { column: "diluted_eps", aliases: &["Diluted EPS"] },
];

// Quarterly vendor dumps use looser EPS labels than the annual ones.
pub const INCOME_QUARTERLY_FIELDS: &[FieldAliases] = &[
    FieldAliases { column: "total_revenue", aliases: &["Total Revenue"] },
    FieldAliases { column: "operating_income", aliases: &["Operating Income"] },
    FieldAliases { column: "net_income", aliases: &["Net Income"] },
    FieldAliases {
        column: "basic_eps",
        aliases: &["Earnings Per Share", "EPS - Basic", "EPS - Basic (Rs.)"],
    },
    FieldAliases { column: "diluted_eps", aliases: &["EPS - Diluted", "Diluted EPS"] },
];

pub const BALANCE_SHEET_FIELDS: &[FieldAliases] = &[
    FieldAliases { column: "total_assets", aliases: &["Total Assets"] },
    FieldAliases {
        column: "total_liabilities",
        aliases: &["Total Liabilities Net Minority Interest"],
    },
    FieldAliases { column: "current_assets", aliases: &["Current Assets"] },
    FieldAliases { column: "current_liabilities", aliases: &["Current Liabilities"] },
    FieldAliases { column: "stockholders_equity", aliases: &["Stockholders Equity"] },
    FieldAliases { column: "total_debt", aliases: &["Total Debt"] },
];

pub const CASH_FLOW_FIELDS: &[FieldAliases] = &[
    FieldAliases {
        column: "operating_cash_flow",
        aliases: &["Operating Cash Flow", "Cash Flow from Operating Activities"],
    },
    FieldAliases {
        column: "free_cash_flow",
        aliases: &["Free Cash Flow", "Free Cash Flow to Firm"],
    },
    FieldAliases {
        column: "dividends_paid",
        aliases: &["Cash Dividends Paid", "Common Stock Dividend Paid"],
    },
];

/// Alias table for a (statement, period) combination.
pub fn field_aliases(kind: StatementKind, period: StatementPeriod) -> &'static [FieldAliases] {
    match (kind, period) {
        (StatementKind::IncomeStatement, StatementPeriod::Annual) => INCOME_ANNUAL_FIELDS,
        (StatementKind::IncomeStatement, StatementPeriod::Quarterly) => INCOME_QUARTERLY_FIELDS,
        (StatementKind::BalanceSheet, _) => BALANCE_SHEET_FIELDS,
        (StatementKind::CashFlow, _) => CASH_FLOW_FIELDS,
    }
}

/// Top-level key of the statement block inside a vendor JSON dump.
pub fn statement_key(kind: StatementKind, period: StatementPeriod) -> &'static str {
    match (kind, period) {
        (StatementKind::IncomeStatement, StatementPeriod::Annual) => "income_statement",
        (StatementKind::IncomeStatement, StatementPeriod::Quarterly) => {
            "quarterly_income_statement"
        }
        (StatementKind::BalanceSheet, StatementPeriod::Annual) => "annual_balance_sheet",
        (StatementKind::BalanceSheet, StatementPeriod::Quarterly) => "quarterly_balance_sheet",
        (StatementKind::CashFlow, StatementPeriod::Annual) => "cashflow",
        (StatementKind::CashFlow, StatementPeriod::Quarterly) => "quarterly_cashflow",
    }
}

/// Parse a vendor period key, stripping the " 00:00:00" suffix some dumps
/// carry on their date strings.
pub fn parse_period_key(raw: &str) -> Option<NaiveDate> {
    let date_part = raw.split(' ').next().unwrap_or(raw);
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok()
}

/// Annual income statement and balance sheet dumps are noisy; a record is
/// kept only when at least this many metrics survive the acceptance rule.
const MIN_ANNUAL_METRICS: usize = 3;

/// Acceptance rule for a raw vendor value: parses as a finite f64 below 1e15
/// in magnitude, and non-zero for every column except dividends_paid, where
/// zero is a legitimate observation.
pub fn accept_value(column: &str, raw: &Value) -> Option<f64> {
    let value = match raw {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return None;
            }
            match trimmed.to_ascii_lowercase().as_str() {
                "nan" | "null" | "none" => return None,
                _ => trimmed.parse::<f64>().ok()?,
            }
        }
        _ => return None,
    };

    if !value.is_finite() || value.abs() >= 1e15 {
        return None;
    }
    if value == 0.0 && column != "dividends_paid" {
        return None;
    }
    Some(value)
}

/// Resolve one canonical column for one period: aliases are scanned in
/// priority order and the first acceptable value wins. An alias present with
/// an unacceptable value does not block later aliases. Each series is keyed
/// by parsed date, so mixed date-string spellings within one file (with and
/// without the time suffix) all resolve.
pub fn resolve_field(
    statement: &Map<String, Value>,
    period_ending: NaiveDate,
    field: &FieldAliases,
) -> Option<f64> {
    for alias in field.aliases {
        let Some(Value::Object(series)) = statement.get(*alias) else {
            continue;
        };
        for (key, raw) in series {
            if parse_period_key(key) != Some(period_ending) {
                continue;
            }
            if let Some(value) = accept_value(field.column, raw) {
                return Some(value);
            }
        }
    }
    None
}

/// Collect every period date found under any vendor field of the statement
/// block. Quarterly ingestion keeps only calendar quarter-end dates; annual
/// ingestion keeps everything.
fn period_dates(statement: &Map<String, Value>, period: StatementPeriod) -> Vec<NaiveDate> {
    let mut seen: BTreeSet<NaiveDate> = BTreeSet::new();
    for series in statement.values() {
        let Value::Object(map) = series else { continue };
        for key in map.keys() {
            let Some(date) = parse_period_key(key) else {
                continue;
            };
            if period == StatementPeriod::Quarterly && !calendar::is_quarter_end(date) {
                continue;
            }
            seen.insert(date);
        }
    }
    seen.into_iter().collect()
}

/// Counters reported after an ingestion run.
#[derive(Debug, Default)]
pub struct IngestStats {
    pub files_processed: usize,
    pub records_written: usize,
    pub errors: usize,
}

/// Loads vendor statement JSON files into the source tables, one file per
/// ticker (the file stem is the ticker symbol).
pub struct StatementIngestor<'a> {
    db: &'a Database,
}

impl<'a> StatementIngestor<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Ingest every `*.json` file under `data_dir` for one statement kind
    /// and cadence. A failure on one file is logged and does not abort the
    /// remaining files.
    pub async fn ingest_dir(
        &self,
        kind: StatementKind,
        period: StatementPeriod,
        data_dir: &Path,
    ) -> Result<IngestStats> {
        let mut paths: Vec<_> = std::fs::read_dir(data_dir)
            .with_context(|| format!("failed to read data directory {}", data_dir.display()))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
            .collect();
        paths.sort();

        info!(
            "ingesting {} {:?}/{:?} files from {}",
            paths.len(),
            kind,
            period,
            data_dir.display()
        );

        let mut stats = IngestStats::default();
        for path in &paths {
            let Some(ticker) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            stats.files_processed += 1;
            match self.ingest_file(kind, period, ticker, path).await {
                Ok(written) => stats.records_written += written,
                Err(e) => {
                    error!(ticker = %ticker, "ingestion failed: {e:#}");
                    stats.errors += 1;
                }
            }
        }

        info!(
            files = stats.files_processed,
            records = stats.records_written,
            errors = stats.errors,
            "ingestion run complete"
        );
        Ok(stats)
    }

    async fn ingest_file(
        &self,
        kind: StatementKind,
        period: StatementPeriod,
        ticker: &str,
        path: &Path,
    ) -> Result<usize> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let json: Value = serde_json::from_str(&text)
            .with_context(|| format!("invalid JSON in {}", path.display()))?;

        let key = statement_key(kind, period);
        let Some(Value::Object(statement)) = json.get(key) else {
            debug!(ticker = %ticker, "no '{}' block, skipping", key);
            return Ok(0);
        };

        let dates = period_dates(statement, period);
        if dates.is_empty() {
            warn!(ticker = %ticker, "'{}' block has no usable period dates", key);
            return Ok(0);
        }

        let written = match kind {
            StatementKind::IncomeStatement => {
                let mut records: Vec<_> = dates
                    .iter()
                    .map(|&date| income_record(ticker, date, statement, period))
                    .collect();
                // Annual dumps are kept only when enough metrics resolved;
                // quarterly rows are written regardless of sparsity.
                if period == StatementPeriod::Annual {
                    records.retain(|r| r.populated_metrics() >= MIN_ANNUAL_METRICS);
                }
                self.db.upsert_income_statements(period, &records).await?
            }
            StatementKind::BalanceSheet => {
                let mut records: Vec<_> = dates
                    .iter()
                    .map(|&date| balance_sheet_record(ticker, date, statement))
                    .collect();
                if period == StatementPeriod::Annual {
                    records.retain(|r| r.populated_metrics() >= MIN_ANNUAL_METRICS);
                }
                self.db.upsert_balance_sheets(period, &records).await?
            }
            StatementKind::CashFlow => {
                let records: Vec<_> = dates
                    .iter()
                    .map(|&date| cash_flow_record(ticker, date, statement))
                    .collect();
                self.db.upsert_cash_flows(period, &records).await?
            }
        };

        Ok(written as usize)
    }
}

fn income_record(
    ticker: &str,
    period_ending: NaiveDate,
    statement: &Map<String, Value>,
    period: StatementPeriod,
) -> IncomeStatementRecord {
    let fields = field_aliases(StatementKind::IncomeStatement, period);
    let get = |column: &str| {
        fields
            .iter()
            .find(|f| f.column == column)
            .and_then(|f| resolve_field(statement, period_ending, f))
    };
    IncomeStatementRecord {
        ticker: ticker.to_string(),
        period_ending,
        total_revenue: get("total_revenue"),
        operating_income: get("operating_income"),
        net_income: get("net_income"),
        basic_eps: get("basic_eps"),
        diluted_eps: get("diluted_eps"),
    }
}

fn balance_sheet_record(
    ticker: &str,
    period_ending: NaiveDate,
    statement: &Map<String, Value>,
) -> BalanceSheetRecord {
    let get = |column: &str| {
        BALANCE_SHEET_FIELDS
            .iter()
            .find(|f| f.column == column)
            .and_then(|f| resolve_field(statement, period_ending, f))
    };
    BalanceSheetRecord {
        ticker: ticker.to_string(),
        period_ending,
        total_assets: get("total_assets"),
        total_liabilities: get("total_liabilities"),
        current_assets: get("current_assets"),
        current_liabilities: get("current_liabilities"),
        stockholders_equity: get("stockholders_equity"),
        total_debt: get("total_debt"),
    }
}

fn cash_flow_record(
    ticker: &str,
    period_ending: NaiveDate,
    statement: &Map<String, Value>,
) -> CashFlowRecord {
    let get = |column: &str| {
        CASH_FLOW_FIELDS
            .iter()
            .find(|f| f.column == column)
            .and_then(|f| resolve_field(statement, period_ending, f))
    };
    CashFlowRecord {
        ticker: ticker.to_string(),
        period_ending,
        operating_cash_flow: get("operating_cash_flow"),
        free_cash_flow: get("free_cash_flow"),
        dividends_paid: get("dividends_paid"),
    }
}
