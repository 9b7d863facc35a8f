use chrono::{DateTime, Datelike, Utc};
use num_bigint::BigUint;

/// A Tezos delegation operation as persisted by the scraper and served by
/// the read API.
///
/// `id` is the TzKT operation id: globally unique and strictly increasing in
/// feed order, so it doubles as primary key and pagination cursor.
/// Records are immutable once created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delegation {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    /// Delegated balance in mutez, kept arbitrary-precision end to end
    pub amount: BigUint,
    /// Address of the account that sent the delegation
    pub delegator: String,
    /// Block level the operation was included in
    pub level: i64,
}

impl Delegation {
    /// UTC calendar year of the operation, stored alongside the row for
    /// year-filtered reads.
    pub fn year(&self) -> i32 {
        self.timestamp.year()
    }
}
