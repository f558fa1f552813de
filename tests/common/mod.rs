use chrono::NaiveDate;
use tempfile::TempDir;

use nse_fundamentals::database::Database;
use nse_fundamentals::models::{BalanceSheetRecord, CashFlowRecord, IncomeStatementRecord};

/// Fresh on-disk database in a temporary directory. The TempDir must be kept
/// alive for the duration of the test.
pub async fn test_db() -> (TempDir, Database) {
    let dir = TempDir::new().expect("failed to create temp dir");
    let path = dir.path().join("test.db");
    let db = Database::connect(path.to_str().unwrap())
        .await
        .expect("failed to open test database");
    (dir, db)
}

pub fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap()
}

/// Income statement row with every numeric field null.
pub fn income_row(ticker: &str, period_ending: NaiveDate) -> IncomeStatementRecord {
    IncomeStatementRecord {
        ticker: ticker.to_string(),
        period_ending,
        total_revenue: None,
        operating_income: None,
        net_income: None,
        basic_eps: None,
        diluted_eps: None,
    }
}

/// Balance sheet row with every numeric field null.
pub fn balance_row(ticker: &str, period_ending: NaiveDate) -> BalanceSheetRecord {
    BalanceSheetRecord {
        ticker: ticker.to_string(),
        period_ending,
        total_assets: None,
        total_liabilities: None,
        current_assets: None,
        current_liabilities: None,
        stockholders_equity: None,
        total_debt: None,
    }
}

/// Cash flow row with every numeric field null.
pub fn cash_flow_row(ticker: &str, period_ending: NaiveDate) -> CashFlowRecord {
    CashFlowRecord {
        ticker: ticker.to_string(),
        period_ending,
        operating_cash_flow: None,
        free_cash_flow: None,
        dividends_paid: None,
    }
}
