use anyhow::{Context, Result};
use chrono::NaiveDate;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use tracing::info;

use crate::models::{
    AnnualFundamentalsRow, BalanceSheetRecord, CashFlowRecord, DerivedMetricRecord,
    FundamentalScoreRecord, IncomeStatementRecord, StatementPeriod,
};

/// Quarterly source tables consulted by the as-of lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuarterlyTable {
    IncomeStatement,
    BalanceSheet,
    CashFlow,
}

impl QuarterlyTable {
    pub fn name(self) -> &'static str {
        match self {
            QuarterlyTable::IncomeStatement => "income_statement_quarterly",
            QuarterlyTable::BalanceSheet => "balance_sheet_quarterly",
            QuarterlyTable::CashFlow => "cash_flow_quarterly",
        }
    }
}

/// Data-access handle for one batch run. The pool is acquired at run start
/// and released when the handle is dropped, on every exit path.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open (creating if missing) the SQLite database and ensure the schema
    /// exists. Failure here is fatal to the whole run.
    pub async fn connect(database_path: &str) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(database_path)
            .create_if_missing(true);

        // The pipeline is strictly sequential; one shared connection is
        // reused across all per-ticker queries.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .with_context(|| format!("failed to open database at {database_path}"))?;

        sqlx::query("PRAGMA journal_mode = WAL").execute(&pool).await?;
        sqlx::query("PRAGMA synchronous = NORMAL").execute(&pool).await?;

        let db = Self { pool };
        db.init_schema().await?;
        info!("database initialized at {}", database_path);
        Ok(db)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn init_schema(&self) -> Result<()> {
        for period in ["annual", "quarterly"] {
            sqlx::query(&format!(
                r#"
                CREATE TABLE IF NOT EXISTS income_statement_{period} (
                    ticker TEXT NOT NULL,
                    period_ending DATE NOT NULL,
                    total_revenue REAL,
                    operating_income REAL,
                    net_income REAL,
                    basic_eps REAL,
                    diluted_eps REAL,
                    last_updated DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
                    PRIMARY KEY (ticker, period_ending)
                )
                "#
            ))
            .execute(&self.pool)
            .await?;

            sqlx::query(&format!(
                r#"
                CREATE TABLE IF NOT EXISTS balance_sheet_{period} (
                    ticker TEXT NOT NULL,
                    period_ending DATE NOT NULL,
                    total_assets REAL,
                    total_liabilities REAL,
                    current_assets REAL,
                    current_liabilities REAL,
                    stockholders_equity REAL,
                    total_debt REAL,
                    last_updated DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
                    PRIMARY KEY (ticker, period_ending)
                )
                "#
            ))
            .execute(&self.pool)
            .await?;

            sqlx::query(&format!(
                r#"
                CREATE TABLE IF NOT EXISTS cash_flow_{period} (
                    ticker TEXT NOT NULL,
                    period_ending DATE NOT NULL,
                    operating_cash_flow REAL,
                    free_cash_flow REAL,
                    dividends_paid REAL,
                    last_updated DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
                    PRIMARY KEY (ticker, period_ending)
                )
                "#
            ))
            .execute(&self.pool)
            .await?;
        }

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS derived_metrics (
                ticker TEXT NOT NULL,
                fiscal_year INTEGER NOT NULL,
                eps REAL,
                revenue REAL,
                net_income REAL,
                operating_income REAL,
                stockholders_equity REAL,
                total_assets REAL,
                total_debt REAL,
                current_assets REAL,
                current_liabilities REAL,
                operating_cash_flow REAL,
                free_cash_flow REAL,
                dividends_paid REAL,
                period_ending DATE NOT NULL,
                last_updated DATETIME NOT NULL,
                PRIMARY KEY (ticker, fiscal_year)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS fundamental_scores (
                ticker TEXT NOT NULL,
                period_ending DATE NOT NULL,
                as_of_date DATE NOT NULL,
                eps_growth REAL,
                revenue_growth REAL,
                roe REAL,
                debt_to_equity REAL,
                net_margin REAL,
                fcf_margin REAL,
                PRIMARY KEY (ticker, as_of_date)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Distinct tickers across the three annual source tables. A ticker
    /// present in any one of them is processed by the derivation engine.
    pub async fn annual_tickers(&self) -> Result<Vec<String>> {
        let rows = sqlx::query(
            r#"
            SELECT DISTINCT ticker FROM (
                SELECT ticker FROM income_statement_annual
                UNION
                SELECT ticker FROM balance_sheet_annual
                UNION
                SELECT ticker FROM cash_flow_annual
            )
            ORDER BY ticker
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(|r| r.get::<String, _>("ticker")).collect())
    }

    /// Distinct tickers with quarterly income statement data, the driver set
    /// for the fundamental score engine.
    pub async fn quarterly_tickers(&self) -> Result<Vec<String>> {
        let rows = sqlx::query(
            "SELECT DISTINCT ticker FROM income_statement_quarterly ORDER BY ticker",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(|r| r.get::<String, _>("ticker")).collect())
    }

    /// The three annual statements outer-joined per period for one ticker,
    /// anchored at the income statement, oldest period first.
    pub async fn annual_fundamentals(&self, ticker: &str) -> Result<Vec<AnnualFundamentalsRow>> {
        let rows = sqlx::query(
            r#"
            SELECT
                i.period_ending,
                i.diluted_eps,
                i.total_revenue,
                i.net_income,
                i.operating_income,
                b.stockholders_equity,
                b.total_assets,
                b.total_debt,
                b.current_assets,
                b.current_liabilities,
                c.operating_cash_flow,
                c.free_cash_flow,
                c.dividends_paid
            FROM income_statement_annual i
            LEFT JOIN balance_sheet_annual b
                ON i.ticker = b.ticker AND i.period_ending = b.period_ending
            LEFT JOIN cash_flow_annual c
                ON i.ticker = c.ticker AND i.period_ending = c.period_ending
            WHERE i.ticker = ?1
            ORDER BY i.period_ending
            "#,
        )
        .bind(ticker)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|r| AnnualFundamentalsRow {
                period_ending: r.get("period_ending"),
                eps: r.get("diluted_eps"),
                revenue: r.get("total_revenue"),
                net_income: r.get("net_income"),
                operating_income: r.get("operating_income"),
                stockholders_equity: r.get("stockholders_equity"),
                total_assets: r.get("total_assets"),
                total_debt: r.get("total_debt"),
                current_assets: r.get("current_assets"),
                current_liabilities: r.get("current_liabilities"),
                operating_cash_flow: r.get("operating_cash_flow"),
                free_cash_flow: r.get("free_cash_flow"),
                dividends_paid: r.get("dividends_paid"),
            })
            .collect())
    }

    /// Most recent non-null value with `period_ending <= as_of`.
    ///
    /// Point-in-time constraint: nothing dated after `as_of` is ever read.
    pub async fn quarter_value(
        &self,
        table: QuarterlyTable,
        column: &str,
        ticker: &str,
        as_of: NaiveDate,
    ) -> Result<Option<f64>> {
        self.fetch_as_of(table, column, ticker, as_of, "<=").await
    }

    /// Most recent non-null value strictly before `as_of`, used as the
    /// prior-period operand of growth calculations.
    pub async fn previous_quarter_value(
        &self,
        table: QuarterlyTable,
        column: &str,
        ticker: &str,
        as_of: NaiveDate,
    ) -> Result<Option<f64>> {
        self.fetch_as_of(table, column, ticker, as_of, "<").await
    }

    async fn fetch_as_of(
        &self,
        table: QuarterlyTable,
        column: &str,
        ticker: &str,
        as_of: NaiveDate,
        cmp: &str,
    ) -> Result<Option<f64>> {
        // table and column are static identifiers chosen by the caller, not
        // user input; only ticker and date go through bind parameters.
        let sql = format!(
            "SELECT {column} FROM {table} \
             WHERE ticker = ?1 AND period_ending {cmp} ?2 AND {column} IS NOT NULL \
             ORDER BY period_ending DESC LIMIT 1",
            table = table.name(),
        );

        let row = sqlx::query(&sql)
            .bind(ticker)
            .bind(as_of)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|r| r.get::<f64, _>(0)))
    }

    /// Batched upsert of derived metric records, one transaction per call.
    /// Conflicts on (ticker, fiscal_year) replace every field.
    pub async fn upsert_derived_metrics(&self, records: &[DerivedMetricRecord]) -> Result<u64> {
        if records.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        for m in records {
            sqlx::query(
                r#"
                INSERT INTO derived_metrics (
                    ticker, fiscal_year,
                    eps, revenue, net_income, operating_income,
                    stockholders_equity, total_assets, total_debt,
                    current_assets, current_liabilities,
                    operating_cash_flow, free_cash_flow, dividends_paid,
                    period_ending, last_updated
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
                ON CONFLICT (ticker, fiscal_year) DO UPDATE SET
                    eps = excluded.eps,
                    revenue = excluded.revenue,
                    net_income = excluded.net_income,
                    operating_income = excluded.operating_income,
                    stockholders_equity = excluded.stockholders_equity,
                    total_assets = excluded.total_assets,
                    total_debt = excluded.total_debt,
                    current_assets = excluded.current_assets,
                    current_liabilities = excluded.current_liabilities,
                    operating_cash_flow = excluded.operating_cash_flow,
                    free_cash_flow = excluded.free_cash_flow,
                    dividends_paid = excluded.dividends_paid,
                    period_ending = excluded.period_ending,
                    last_updated = excluded.last_updated
                "#,
            )
            .bind(&m.ticker)
            .bind(m.fiscal_year)
            .bind(m.eps)
            .bind(m.revenue)
            .bind(m.net_income)
            .bind(m.operating_income)
            .bind(m.stockholders_equity)
            .bind(m.total_assets)
            .bind(m.total_debt)
            .bind(m.current_assets)
            .bind(m.current_liabilities)
            .bind(m.operating_cash_flow)
            .bind(m.free_cash_flow)
            .bind(m.dividends_paid)
            .bind(m.period_ending)
            .bind(m.last_updated)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        Ok(records.len() as u64)
    }

    /// Batched upsert of fundamental score records. Conflicts on
    /// (ticker, as_of_date) overwrite the six ratio fields.
    pub async fn upsert_fundamental_scores(
        &self,
        records: &[FundamentalScoreRecord],
    ) -> Result<u64> {
        if records.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        for s in records {
            sqlx::query(
                r#"
                INSERT INTO fundamental_scores (
                    ticker, period_ending, as_of_date,
                    eps_growth, revenue_growth, roe,
                    debt_to_equity, net_margin, fcf_margin
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                ON CONFLICT (ticker, as_of_date) DO UPDATE SET
                    eps_growth = excluded.eps_growth,
                    revenue_growth = excluded.revenue_growth,
                    roe = excluded.roe,
                    debt_to_equity = excluded.debt_to_equity,
                    net_margin = excluded.net_margin,
                    fcf_margin = excluded.fcf_margin
                "#,
            )
            .bind(&s.ticker)
            .bind(s.period_ending)
            .bind(s.as_of_date)
            .bind(s.eps_growth)
            .bind(s.revenue_growth)
            .bind(s.roe)
            .bind(s.debt_to_equity)
            .bind(s.net_margin)
            .bind(s.fcf_margin)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        Ok(records.len() as u64)
    }

    /// Upsert ingested income statement rows into the annual or quarterly
    /// source table. Latest ingestion wins.
    pub async fn upsert_income_statements(
        &self,
        period: StatementPeriod,
        records: &[IncomeStatementRecord],
    ) -> Result<u64> {
        if records.is_empty() {
            return Ok(0);
        }
        let table = match period {
            StatementPeriod::Annual => "income_statement_annual",
            StatementPeriod::Quarterly => "income_statement_quarterly",
        };

        let mut tx = self.pool.begin().await?;
        for r in records {
            sqlx::query(&format!(
                r#"
                INSERT INTO {table} (
                    ticker, period_ending,
                    total_revenue, operating_income, net_income,
                    basic_eps, diluted_eps, last_updated
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, CURRENT_TIMESTAMP)
                ON CONFLICT (ticker, period_ending) DO UPDATE SET
                    total_revenue = excluded.total_revenue,
                    operating_income = excluded.operating_income,
                    net_income = excluded.net_income,
                    basic_eps = excluded.basic_eps,
                    diluted_eps = excluded.diluted_eps,
                    last_updated = excluded.last_updated
                "#
            ))
            .bind(&r.ticker)
            .bind(r.period_ending)
            .bind(r.total_revenue)
            .bind(r.operating_income)
            .bind(r.net_income)
            .bind(r.basic_eps)
            .bind(r.diluted_eps)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        Ok(records.len() as u64)
    }

    /// Upsert ingested balance sheet rows.
    pub async fn upsert_balance_sheets(
        &self,
        period: StatementPeriod,
        records: &[BalanceSheetRecord],
    ) -> Result<u64> {
        if records.is_empty() {
            return Ok(0);
        }
        let table = match period {
            StatementPeriod::Annual => "balance_sheet_annual",
            StatementPeriod::Quarterly => "balance_sheet_quarterly",
        };

        let mut tx = self.pool.begin().await?;
        for r in records {
            sqlx::query(&format!(
                r#"
                INSERT INTO {table} (
                    ticker, period_ending,
                    total_assets, total_liabilities,
                    current_assets, current_liabilities,
                    stockholders_equity, total_debt, last_updated
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, CURRENT_TIMESTAMP)
                ON CONFLICT (ticker, period_ending) DO UPDATE SET
                    total_assets = excluded.total_assets,
                    total_liabilities = excluded.total_liabilities,
                    current_assets = excluded.current_assets,
                    current_liabilities = excluded.current_liabilities,
                    stockholders_equity = excluded.stockholders_equity,
                    total_debt = excluded.total_debt,
                    last_updated = excluded.last_updated
                "#
            ))
            .bind(&r.ticker)
            .bind(r.period_ending)
            .bind(r.total_assets)
            .bind(r.total_liabilities)
            .bind(r.current_assets)
            .bind(r.current_liabilities)
            .bind(r.stockholders_equity)
            .bind(r.total_debt)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        Ok(records.len() as u64)
    }

    /// Upsert ingested cash flow rows.
    pub async fn upsert_cash_flows(
        &self,
        period: StatementPeriod,
        records: &[CashFlowRecord],
    ) -> Result<u64> {
        if records.is_empty() {
            return Ok(0);
        }
        let table = match period {
            StatementPeriod::Annual => "cash_flow_annual",
            StatementPeriod::Quarterly => "cash_flow_quarterly",
        };

        let mut tx = self.pool.begin().await?;
        for r in records {
            sqlx::query(&format!(
                r#"
                INSERT INTO {table} (
                    ticker, period_ending,
                    operating_cash_flow, free_cash_flow, dividends_paid,
                    last_updated
                )
                VALUES (?1, ?2, ?3, ?4, ?5, CURRENT_TIMESTAMP)
                ON CONFLICT (ticker, period_ending) DO UPDATE SET
                    operating_cash_flow = excluded.operating_cash_flow,
                    free_cash_flow = excluded.free_cash_flow,
                    dividends_paid = excluded.dividends_paid,
                    last_updated = excluded.last_updated
                "#
            ))
            .bind(&r.ticker)
            .bind(r.period_ending)
            .bind(r.operating_cash_flow)
            .bind(r.free_cash_flow)
            .bind(r.dividends_paid)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        Ok(records.len() as u64)
    }

    /// All derived metric rows for one ticker, oldest fiscal year first.
    pub async fn derived_metrics(&self, ticker: &str) -> Result<Vec<DerivedMetricRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT ticker, fiscal_year,
                   eps, revenue, net_income, operating_income,
                   stockholders_equity, total_assets, total_debt,
                   current_assets, current_liabilities,
                   operating_cash_flow, free_cash_flow, dividends_paid,
                   period_ending, last_updated
            FROM derived_metrics
            WHERE ticker = ?1
            ORDER BY fiscal_year
            "#,
        )
        .bind(ticker)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|r| DerivedMetricRecord {
                ticker: r.get("ticker"),
                fiscal_year: r.get("fiscal_year"),
                eps: r.get("eps"),
                revenue: r.get("revenue"),
                net_income: r.get("net_income"),
                operating_income: r.get("operating_income"),
                stockholders_equity: r.get("stockholders_equity"),
                total_assets: r.get("total_assets"),
                total_debt: r.get("total_debt"),
                current_assets: r.get("current_assets"),
                current_liabilities: r.get("current_liabilities"),
                operating_cash_flow: r.get("operating_cash_flow"),
                free_cash_flow: r.get("free_cash_flow"),
                dividends_paid: r.get("dividends_paid"),
                period_ending: r.get("period_ending"),
                last_updated: r.get("last_updated"),
            })
            .collect())
    }

    /// All fundamental score rows for one ticker, oldest as-of date first.
    pub async fn fundamental_scores(&self, ticker: &str) -> Result<Vec<FundamentalScoreRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT ticker, period_ending, as_of_date,
                   eps_growth, revenue_growth, roe,
                   debt_to_equity, net_margin, fcf_margin
            FROM fundamental_scores
            WHERE ticker = ?1
            ORDER BY as_of_date
            "#,
        )
        .bind(ticker)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|r| FundamentalScoreRecord {
                ticker: r.get("ticker"),
                period_ending: r.get("period_ending"),
                as_of_date: r.get("as_of_date"),
                eps_growth: r.get("eps_growth"),
                revenue_growth: r.get("revenue_growth"),
                roe: r.get("roe"),
                debt_to_equity: r.get("debt_to_equity"),
                net_margin: r.get("net_margin"),
                fcf_margin: r.get("fcf_margin"),
            })
            .collect())
    }
}
