mod client;
mod ops;
mod query;

pub use client::PostgresClient;
pub use query::{DelegationsQuery, QueryArg};
