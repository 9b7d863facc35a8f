use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Scraper progress checkpoint (PostgreSQL).
///
/// Singleton row holding the highest delegation id that has been durably
/// saved. Advanced in the same transaction as the batch that produced it,
/// so a restart resumes exactly after the last committed batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncCheckpoint {
    pub last_id: i64,
    pub updated_at: DateTime<Utc>,
}

impl SyncCheckpoint {
    pub fn new(last_id: i64) -> Self {
        Self {
            last_id,
            updated_at: Utc::now(),
        }
    }
}
