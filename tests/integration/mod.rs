mod derivation;
mod ingestion;
