pub mod config;
pub mod db;
pub mod scraper;
pub mod tzkt;
pub mod web;

pub use config::Settings;
pub use db::PostgresClient;
pub use scraper::{ScraperOptions, ScraperService, ShutdownSignal, Subscriber};
pub use tzkt::TzktClient;
