use chrono::SecondsFormat;
use serde::Serialize;

use crate::db::models::Delegation;

/// Wire form of a delegation. Every field is a string so that amounts and
/// levels survive JSON number precision limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DelegationDto {
    pub timestamp: String,
    pub amount: String,
    pub delegator: String,
    pub level: String,
}

impl From<&Delegation> for DelegationDto {
    fn from(d: &Delegation) -> Self {
        Self {
            timestamp: d.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
            amount: d.amount.to_string(),
            delegator: d.delegator.clone(),
            level: d.level.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DelegationsResponse {
    pub data: Vec<DelegationDto>,
}

impl DelegationsResponse {
    pub fn new(delegations: &[Delegation]) -> Self {
        Self {
            data: delegations.iter().map(DelegationDto::from).collect(),
        }
    }
}
