use async_trait::async_trait;

use crate::db::models::Delegation;
use crate::tzkt::{DelegationsRequest, FeedError, TzktDelegation};

/// Source of delegation operations, ordered by ascending id.
#[async_trait]
pub trait DelegationFeed: Send + Sync {
    async fn get_delegations(
        &self,
        request: DelegationsRequest,
    ) -> Result<Vec<TzktDelegation>, FeedError>;
}

/// Durable side of the scraper.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Highest delegation id saved so far, or 0 when nothing was ever saved.
    async fn last_processed_id(&self) -> anyhow::Result<i64>;

    /// Persist an id-ascending batch and advance the checkpoint to its last
    /// id, atomically. Ids that are already stored are skipped silently.
    async fn save_batch(&self, delegations: &[Delegation]) -> anyhow::Result<()>;
}
