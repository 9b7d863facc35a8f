use chrono::{DateTime, Utc};
use num_bigint::BigUint;

use crate::db::models::Delegation;
use crate::tzkt::TzktDelegation;

#[derive(Debug, thiserror::Error)]
pub enum ConversionError {
    #[error("invalid delegation timestamp {timestamp:?} for id {id}: {source}")]
    InvalidTimestamp {
        id: i64,
        timestamp: String,
        source: chrono::ParseError,
    },

    #[error("batch is not ordered by id: {previous} followed by {next}")]
    UnorderedBatch { previous: i64, next: i64 },
}

/// Convert a fetched page into domain delegations.
///
/// The page must be strictly ascending by id: the checkpoint is taken from
/// its last element.
pub fn convert_delegations(batch: &[TzktDelegation]) -> Result<Vec<Delegation>, ConversionError> {
    if let Some(pair) = batch.windows(2).find(|pair| pair[0].id >= pair[1].id) {
        return Err(ConversionError::UnorderedBatch {
            previous: pair[0].id,
            next: pair[1].id,
        });
    }

    batch.iter().map(convert_delegation).collect()
}

fn convert_delegation(delegation: &TzktDelegation) -> Result<Delegation, ConversionError> {
    let timestamp = DateTime::parse_from_rfc3339(&delegation.timestamp)
        .map_err(|source| ConversionError::InvalidTimestamp {
            id: delegation.id,
            timestamp: delegation.timestamp.clone(),
            source,
        })?
        .with_timezone(&Utc);

    Ok(Delegation {
        id: delegation.id,
        timestamp,
        amount: BigUint::from(delegation.amount),
        delegator: delegation.sender.address.clone(),
        level: delegation.level,
    })
}
