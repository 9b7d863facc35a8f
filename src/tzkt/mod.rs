//! Client for the TzKT Tezos indexer API.

mod client;
mod models;

pub use client::{FeedError, TzktClient, DEFAULT_LIMIT};
pub use models::{DelegationsRequest, Sender, TzktDelegation};
