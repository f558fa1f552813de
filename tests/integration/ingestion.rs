use sqlx::Row;
use tempfile::TempDir;

use nse_fundamentals::ingest::{StatementIngestor, StatementKind};
use nse_fundamentals::metrics::DerivedMetricsCalculator;
use nse_fundamentals::models::StatementPeriod;

use crate::common::{date, test_db};

fn write_json(dir: &TempDir, file_name: &str, body: serde_json::Value) {
    let path = dir.path().join(file_name);
    std::fs::write(&path, serde_json::to_string_pretty(&body).unwrap()).unwrap();
}

#[tokio::test]
async fn quarterly_cash_flow_ingestion_applies_alias_and_value_rules() {
    let (_db_dir, db) = test_db().await;
    let data_dir = TempDir::new().unwrap();

    write_json(
        &data_dir,
        "TCS.NS.json",
        serde_json::json!({
            "quarterly_cashflow": {
                // Both aliases present: the first one must win.
                "Operating Cash Flow": { "2024-03-31 00:00:00": 5.0e6 },
                "Cash Flow from Operating Activities": { "2024-03-31 00:00:00": 9.9e6 },
                // Zero is rejected for free_cash_flow...
                "Free Cash Flow": { "2024-03-31 00:00:00": 0.0 },
                // ...but accepted for dividends_paid.
                "Cash Dividends Paid": {
                    "2024-03-31 00:00:00": 0.0,
                    // Not a calendar quarter end: dropped entirely.
                    "2024-05-15 00:00:00": -1.0e6
                }
            }
        }),
    );

    let stats = StatementIngestor::new(&db)
        .ingest_dir(
            StatementKind::CashFlow,
            StatementPeriod::Quarterly,
            data_dir.path(),
        )
        .await
        .unwrap();
    assert_eq!(stats.files_processed, 1);
    assert_eq!(stats.records_written, 1);
    assert_eq!(stats.errors, 0);

    let rows = sqlx::query(
        "SELECT ticker, period_ending, operating_cash_flow, free_cash_flow, dividends_paid \
         FROM cash_flow_quarterly ORDER BY period_ending",
    )
    .fetch_all(db.pool())
    .await
    .unwrap();

    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get::<String, _>("ticker"), "TCS.NS");
    assert_eq!(
        rows[0].get::<chrono::NaiveDate, _>("period_ending"),
        date(2024, 3, 31)
    );
    assert_eq!(rows[0].get::<Option<f64>, _>("operating_cash_flow"), Some(5.0e6));
    assert_eq!(rows[0].get::<Option<f64>, _>("free_cash_flow"), None);
    assert_eq!(rows[0].get::<Option<f64>, _>("dividends_paid"), Some(0.0));
}

#[tokio::test]
async fn rerun_of_unchanged_ingestion_leaves_tables_unchanged() {
    let (_db_dir, db) = test_db().await;
    let data_dir = TempDir::new().unwrap();

    write_json(
        &data_dir,
        "INFY.NS.json",
        serde_json::json!({
            "quarterly_income_statement": {
                "Total Revenue": { "2024-03-31": 3.8e9 },
                "EPS - Basic (Rs.)": { "2024-03-31": 6.1 }
            }
        }),
    );

    let ingestor = StatementIngestor::new(&db);
    ingestor
        .ingest_dir(
            StatementKind::IncomeStatement,
            StatementPeriod::Quarterly,
            data_dir.path(),
        )
        .await
        .unwrap();
    ingestor
        .ingest_dir(
            StatementKind::IncomeStatement,
            StatementPeriod::Quarterly,
            data_dir.path(),
        )
        .await
        .unwrap();

    let rows = sqlx::query(
        "SELECT total_revenue, basic_eps FROM income_statement_quarterly WHERE ticker = 'INFY.NS'",
    )
    .fetch_all(db.pool())
    .await
    .unwrap();

    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get::<Option<f64>, _>("total_revenue"), Some(3.8e9));
    assert_eq!(rows[0].get::<Option<f64>, _>("basic_eps"), Some(6.1));
}

#[tokio::test]
async fn files_without_the_statement_block_are_skipped_quietly() {
    let (_db_dir, db) = test_db().await;
    let data_dir = TempDir::new().unwrap();

    write_json(
        &data_dir,
        "HDFC.NS.json",
        serde_json::json!({ "quarterly_cashflow": {} }),
    );

    let stats = StatementIngestor::new(&db)
        .ingest_dir(
            StatementKind::BalanceSheet,
            StatementPeriod::Quarterly,
            data_dir.path(),
        )
        .await
        .unwrap();

    assert_eq!(stats.files_processed, 1);
    assert_eq!(stats.records_written, 0);
    assert_eq!(stats.errors, 0);
}

#[tokio::test]
async fn malformed_json_is_logged_and_does_not_abort_the_run() {
    let (_db_dir, db) = test_db().await;
    let data_dir = TempDir::new().unwrap();

    std::fs::write(data_dir.path().join("BROKEN.NS.json"), "{not json").unwrap();
    write_json(
        &data_dir,
        "WIPRO.NS.json",
        serde_json::json!({
            "quarterly_cashflow": {
                "Free Cash Flow": { "2024-03-31": 1.2e8 }
            }
        }),
    );

    let stats = StatementIngestor::new(&db)
        .ingest_dir(
            StatementKind::CashFlow,
            StatementPeriod::Quarterly,
            data_dir.path(),
        )
        .await
        .unwrap();

    assert_eq!(stats.files_processed, 2);
    assert_eq!(stats.records_written, 1);
    assert_eq!(stats.errors, 1);
}

#[tokio::test]
async fn sparse_annual_rows_are_not_written() {
    let (_db_dir, db) = test_db().await;
    let data_dir = TempDir::new().unwrap();

    // Two metrics resolve for FY2022 and three for FY2023; only the
    // FY2023 row clears the annual retention threshold.
    write_json(
        &data_dir,
        "TATASTEEL.NS.json",
        serde_json::json!({
            "income_statement": {
                "Total Revenue": {
                    "2022-03-31 00:00:00": 2.4e12,
                    "2023-03-31 00:00:00": 2.4e12
                },
                "Net Income": { "2023-03-31 00:00:00": 8.0e10 },
                "Diluted EPS": {
                    "2022-03-31 00:00:00": 33.0,
                    "2023-03-31 00:00:00": 6.5
                }
            }
        }),
    );

    let stats = StatementIngestor::new(&db)
        .ingest_dir(
            StatementKind::IncomeStatement,
            StatementPeriod::Annual,
            data_dir.path(),
        )
        .await
        .unwrap();
    assert_eq!(stats.records_written, 1);

    let rows = sqlx::query(
        "SELECT period_ending FROM income_statement_annual WHERE ticker = 'TATASTEEL.NS'",
    )
    .fetch_all(db.pool())
    .await
    .unwrap();

    assert_eq!(rows.len(), 1);
    assert_eq!(
        rows[0].get::<chrono::NaiveDate, _>("period_ending"),
        date(2023, 3, 31)
    );
}

#[tokio::test]
async fn annual_ingestion_feeds_the_derivation_engine_end_to_end() {
    let (_db_dir, db) = test_db().await;
    let data_dir = TempDir::new().unwrap();

    write_json(
        &data_dir,
        "RELIANCE.NS.json",
        serde_json::json!({
            "income_statement": {
                "Total Revenue": { "2023-03-31 00:00:00": 8.9e12 },
                "Net Income": { "2023-03-31 00:00:00": 6.7e11 },
                "Diluted EPS": { "2023-03-31 00:00:00": 98.6 }
            }
        }),
    );

    StatementIngestor::new(&db)
        .ingest_dir(
            StatementKind::IncomeStatement,
            StatementPeriod::Annual,
            data_dir.path(),
        )
        .await
        .unwrap();

    let stats = DerivedMetricsCalculator::new(&db).process_all().await.unwrap();
    assert_eq!(stats.records_written, 1);

    let records = db.derived_metrics("RELIANCE.NS").await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].fiscal_year, 2023);
    assert_eq!(records[0].eps, Some(98.6));
    assert_eq!(records[0].revenue, Some(8.9e12));
}
