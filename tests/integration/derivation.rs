use chrono::{DateTime, Utc};
use pretty_assertions::assert_eq;

use nse_fundamentals::metrics::DerivedMetricsCalculator;
use nse_fundamentals::models::{DerivedMetricRecord, StatementPeriod};

use crate::common::{balance_row, cash_flow_row, date, income_row, test_db};

fn epoch() -> DateTime<Utc> {
    DateTime::from_timestamp(0, 0).unwrap()
}

/// Strip the refreshed timestamp so reruns can be compared field-by-field.
fn without_timestamp(mut record: DerivedMetricRecord) -> DerivedMetricRecord {
    record.last_updated = epoch();
    record
}

#[test_log::test(tokio::test)]
async fn ticker_without_income_statement_writes_nothing() {
    let (_dir, db) = test_db().await;

    // Present only in the balance sheet table: part of the ticker union, but
    // the join is anchored at the income statement, so no rows come back.
    let mut balance = balance_row("HDFC.NS", date(2023, 3, 31));
    balance.stockholders_equity = Some(1.0e9);
    db.upsert_balance_sheets(StatementPeriod::Annual, &[balance])
        .await
        .unwrap();

    let stats = DerivedMetricsCalculator::new(&db).process_all().await.unwrap();
    assert_eq!(stats.tickers_processed, 1);
    assert_eq!(stats.records_written, 0);
    assert_eq!(stats.errors, 0);
    assert!(db.derived_metrics("HDFC.NS").await.unwrap().is_empty());
}

#[test_log::test(tokio::test)]
async fn fully_null_joined_row_is_skipped() {
    let (_dir, db) = test_db().await;

    db.upsert_income_statements(
        StatementPeriod::Annual,
        &[income_row("TCS.NS", date(2023, 3, 31))],
    )
    .await
    .unwrap();

    let stats = DerivedMetricsCalculator::new(&db).process_all().await.unwrap();
    assert_eq!(stats.records_written, 0);
    assert_eq!(stats.rows_skipped, 1);
    assert!(db.derived_metrics("TCS.NS").await.unwrap().is_empty());
}

#[test_log::test(tokio::test)]
async fn partial_join_survives_with_null_fields() {
    let (_dir, db) = test_db().await;

    // Income statement only; no balance sheet or cash flow rows at all.
    let mut income = income_row("INFY.NS", date(2024, 3, 31));
    income.total_revenue = Some(1.5e9);
    db.upsert_income_statements(StatementPeriod::Annual, &[income])
        .await
        .unwrap();

    let stats = DerivedMetricsCalculator::new(&db).process_all().await.unwrap();
    assert_eq!(stats.records_written, 1);

    let records = db.derived_metrics("INFY.NS").await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].fiscal_year, 2024);
    assert_eq!(records[0].period_ending, date(2024, 3, 31));
    assert_eq!(records[0].revenue, Some(1.5e9));
    assert_eq!(records[0].stockholders_equity, None);
    assert_eq!(records[0].operating_cash_flow, None);
}

#[test_log::test(tokio::test)]
async fn fiscal_year_is_calendar_year_for_every_row() {
    let (_dir, db) = test_db().await;

    for (period, eps) in [
        (date(2022, 3, 31), 10.0),
        (date(2023, 3, 31), 12.0),
        (date(2024, 12, 31), 14.0),
    ] {
        let mut income = income_row("WIPRO.NS", period);
        income.diluted_eps = Some(eps);
        db.upsert_income_statements(StatementPeriod::Annual, &[income])
            .await
            .unwrap();
    }

    DerivedMetricsCalculator::new(&db).process_all().await.unwrap();

    let records = db.derived_metrics("WIPRO.NS").await.unwrap();
    assert_eq!(records.len(), 3);
    for record in &records {
        use chrono::Datelike;
        assert_eq!(record.fiscal_year, record.period_ending.year());
    }
}

#[test_log::test(tokio::test)]
async fn rerun_with_unchanged_sources_is_idempotent() {
    let (_dir, db) = test_db().await;

    let mut income = income_row("TCS.NS", date(2023, 3, 31));
    income.total_revenue = Some(2.4e9);
    income.net_income = Some(4.5e8);
    income.diluted_eps = Some(115.2);
    let mut balance = balance_row("TCS.NS", date(2023, 3, 31));
    balance.stockholders_equity = Some(9.0e8);
    balance.total_debt = Some(8.0e7);
    let mut cash = cash_flow_row("TCS.NS", date(2023, 3, 31));
    cash.operating_cash_flow = Some(4.1e8);
    cash.free_cash_flow = Some(3.9e8);

    db.upsert_income_statements(StatementPeriod::Annual, &[income])
        .await
        .unwrap();
    db.upsert_balance_sheets(StatementPeriod::Annual, &[balance])
        .await
        .unwrap();
    db.upsert_cash_flows(StatementPeriod::Annual, &[cash])
        .await
        .unwrap();

    let calculator = DerivedMetricsCalculator::new(&db);
    calculator.process_all().await.unwrap();
    let first: Vec<_> = db
        .derived_metrics("TCS.NS")
        .await
        .unwrap()
        .into_iter()
        .map(without_timestamp)
        .collect();

    calculator.process_all().await.unwrap();
    let second: Vec<_> = db
        .derived_metrics("TCS.NS")
        .await
        .unwrap()
        .into_iter()
        .map(without_timestamp)
        .collect();

    assert_eq!(first, second);
}

#[test_log::test(tokio::test)]
async fn rerun_fully_replaces_conflicting_rows() {
    let (_dir, db) = test_db().await;

    let mut income = income_row("ITC.NS", date(2023, 3, 31));
    income.total_revenue = Some(7.0e8);
    income.net_income = Some(1.0e8);
    db.upsert_income_statements(StatementPeriod::Annual, &[income.clone()])
        .await
        .unwrap();

    let calculator = DerivedMetricsCalculator::new(&db);
    calculator.process_all().await.unwrap();
    let records = db.derived_metrics("ITC.NS").await.unwrap();
    assert_eq!(records[0].net_income, Some(1.0e8));

    // Re-ingestion wipes net_income; the derived row must follow suit rather
    // than merge.
    income.total_revenue = Some(7.5e8);
    income.net_income = None;
    db.upsert_income_statements(StatementPeriod::Annual, &[income])
        .await
        .unwrap();
    calculator.process_all().await.unwrap();

    let records = db.derived_metrics("ITC.NS").await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].revenue, Some(7.5e8));
    assert_eq!(records[0].net_income, None);
}

#[test_log::test(tokio::test)]
async fn ticker_union_spans_all_three_source_tables() {
    let (_dir, db) = test_db().await;

    let mut income = income_row("A.NS", date(2023, 3, 31));
    income.total_revenue = Some(1.0e6);
    db.upsert_income_statements(StatementPeriod::Annual, &[income])
        .await
        .unwrap();

    let mut cash = cash_flow_row("B.NS", date(2023, 3, 31));
    cash.free_cash_flow = Some(2.0e6);
    db.upsert_cash_flows(StatementPeriod::Annual, &[cash])
        .await
        .unwrap();

    let stats = DerivedMetricsCalculator::new(&db).process_all().await.unwrap();
    // Both tickers are visited; only the one with income statement rows
    // yields a derived record.
    assert_eq!(stats.tickers_processed, 2);
    assert_eq!(stats.records_written, 1);
}
