//! Persistence: domain models and the PostgreSQL store.
//!
//! One `delegations` table written by the scraper and read by the web API,
//! plus the singleton `scraper_checkpoint` row that tracks ingestion
//! progress. Schema lives in `schema/postgres.sql`.

pub mod models;
pub mod postgres;

pub use postgres::PostgresClient;
