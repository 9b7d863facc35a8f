use chrono::{DateTime, Utc};
use serde::Deserialize;

/// Query for `GET /v1/operations/delegations`.
///
/// The scraper only ever pages with `id_greater_than`; `offset` and
/// `timestamp_ge` are exposed for callers that want offset or time-window
/// paging instead.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DelegationsRequest {
    /// Page size. Zero means the client default.
    pub limit: u64,
    pub offset: u64,
    pub id_greater_than: Option<i64>,
    pub timestamp_ge: Option<DateTime<Utc>>,
}

impl DelegationsRequest {
    /// Next page strictly after `checkpoint`.
    pub fn after(checkpoint: i64, limit: u64) -> Self {
        Self {
            limit,
            id_greater_than: Some(checkpoint),
            ..Default::default()
        }
    }
}

/// Delegation operation as returned by TzKT (only the selected fields).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TzktDelegation {
    pub id: i64,
    pub level: i64,
    /// ISO-8601, parsed during conversion to the domain model
    pub timestamp: String,
    pub sender: Sender,
    pub amount: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Sender {
    pub address: String,
}
