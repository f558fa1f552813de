pub mod calendar;
pub mod database;
pub mod ingest;
pub mod metrics;
pub mod models;
pub mod scores;
