use async_trait::async_trait;

use crate::web::{DelegationsCriteria, DelegationsPage};

/// Read side of the delegation store.
#[async_trait]
pub trait DelegationsFinder: Send + Sync {
    async fn find_delegations(
        &self,
        criteria: &DelegationsCriteria,
    ) -> anyhow::Result<DelegationsPage>;
}
