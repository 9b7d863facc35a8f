use std::str::FromStr;

use anyhow::Context;
use async_trait::async_trait;
use log::error;
use num_bigint::BigUint;
use tokio_postgres::types::ToSql;

use crate::db::models::{Delegation, SyncCheckpoint};
use crate::db::postgres::{DelegationsQuery, PostgresClient};
use crate::scraper::CheckpointStore;
use crate::web::{DelegationsCriteria, DelegationsFinder, DelegationsPage};

const COLS_PER_ROW: usize = 6;
/// Rows per INSERT; keeps each statement well under the 65535 bind limit.
const INSERT_CHUNK: usize = 1_000;

impl PostgresClient {
    // ==================== SYNC CHECKPOINT ====================

    pub async fn get_sync_checkpoint(&self) -> anyhow::Result<Option<SyncCheckpoint>> {
        let client = self.pool.get().await?;
        let query = "SELECT last_id, updated_at FROM scraper_checkpoint WHERE single_row";

        let row = client
            .query_opt(query, &[])
            .await
            .context("Failed to read scraper checkpoint")?;

        Ok(row.map(|r| SyncCheckpoint {
            last_id: r.get("last_id"),
            updated_at: r.get("updated_at"),
        }))
    }

    /// Highest delegation id saved so far, 0 before the first batch.
    pub async fn last_processed_id(&self) -> anyhow::Result<i64> {
        Ok(self
            .get_sync_checkpoint()
            .await?
            .map_or(0, |checkpoint| checkpoint.last_id))
    }

    /// Seed the checkpoint on first start. An existing checkpoint is left
    /// untouched, so restarts always resume where they stopped.
    pub async fn initialise_checkpoint(&self, initial: i64) -> anyhow::Result<SyncCheckpoint> {
        let client = self.pool.get().await?;
        let seed = SyncCheckpoint::new(initial);

        client
            .execute(
                r#"
                INSERT INTO scraper_checkpoint (single_row, last_id, updated_at)
                VALUES (TRUE, $1, $2)
                ON CONFLICT (single_row) DO NOTHING
                "#,
                &[&seed.last_id, &seed.updated_at],
            )
            .await
            .context("Failed to initialise scraper checkpoint")?;

        self.get_sync_checkpoint()
            .await?
            .context("Scraper checkpoint missing after initialisation")
    }

    // ==================== DELEGATIONS ====================

    /// Insert a batch and advance the checkpoint in one transaction.
    ///
    /// Rows already present are skipped. The checkpoint moves to the
    /// batch's highest id but never backwards.
    pub async fn save_delegations(&self, delegations: &[Delegation]) -> anyhow::Result<()> {
        let Some(max_id) = delegations.iter().map(|d| d.id).max() else {
            return Ok(());
        };

        let mut client = self.pool.get().await?;
        let tx = client
            .transaction()
            .await
            .context("Failed to begin transaction")?;

        for chunk in delegations.chunks(INSERT_CHUNK) {
            // ($1, $2, $3::TEXT::NUMERIC, $4, $5, $6), ($7, ...), ...
            let values_clauses: Vec<String> = (0..chunk.len())
                .map(|i| {
                    let n = i * COLS_PER_ROW;
                    format!(
                        "(${}, ${}, ${}::TEXT::NUMERIC, ${}, ${}, ${})",
                        n + 1,
                        n + 2,
                        n + 3,
                        n + 4,
                        n + 5,
                        n + 6
                    )
                })
                .collect();

            let query = format!(
                r#"
                INSERT INTO delegations (id, timestamp, amount, delegator, level, year)
                VALUES {}
                ON CONFLICT (id) DO NOTHING
                "#,
                values_clauses.join(", ")
            );

            let derived: Vec<(String, i32)> = chunk
                .iter()
                .map(|d| (d.amount.to_string(), d.year()))
                .collect();

            let mut params: Vec<&(dyn ToSql + Sync)> =
                Vec::with_capacity(chunk.len() * COLS_PER_ROW);
            for (delegation, (amount, year)) in chunk.iter().zip(&derived) {
                params.push(&delegation.id);
                params.push(&delegation.timestamp);
                params.push(amount);
                params.push(&delegation.delegator);
                params.push(&delegation.level);
                params.push(year);
            }

            tx.execute(&query, &params).await.map_err(|e| {
                error!("Failed to batch insert {} delegations: {:?}", chunk.len(), e);
                e
            })?;
        }

        tx.execute(
            r#"
            INSERT INTO scraper_checkpoint (single_row, last_id, updated_at)
            VALUES (TRUE, $1, now())
            ON CONFLICT (single_row) DO UPDATE SET
                last_id = GREATEST(scraper_checkpoint.last_id, EXCLUDED.last_id),
                updated_at = EXCLUDED.updated_at
            "#,
            &[&max_id],
        )
        .await
        .context("Failed to advance scraper checkpoint")?;

        tx.commit().await.context("Failed to commit delegation batch")?;

        Ok(())
    }

    /// One page of delegations, newest first.
    pub async fn find_delegations(
        &self,
        criteria: &DelegationsCriteria,
    ) -> anyhow::Result<DelegationsPage> {
        let client = self.pool.get().await?;
        let query = DelegationsQuery::for_criteria(criteria);
        let (sql, params) = query.build();

        let rows = client
            .query(sql, &params)
            .await
            .context("Delegation query failed")?;

        let delegations = rows
            .iter()
            .map(row_to_delegation)
            .collect::<anyhow::Result<Vec<_>>>()?;

        Ok(DelegationsPage::from_overfetch(delegations, criteria))
    }
}

fn row_to_delegation(row: &tokio_postgres::Row) -> anyhow::Result<Delegation> {
    let id: i64 = row.get("id");
    let amount: String = row.get("amount");

    Ok(Delegation {
        id,
        timestamp: row.get("timestamp"),
        amount: BigUint::from_str(&amount)
            .with_context(|| format!("Invalid amount {:?} for delegation {}", amount, id))?,
        delegator: row.get("delegator"),
        level: row.get("level"),
    })
}

#[async_trait]
impl CheckpointStore for PostgresClient {
    async fn last_processed_id(&self) -> anyhow::Result<i64> {
        PostgresClient::last_processed_id(self).await
    }

    async fn save_batch(&self, delegations: &[Delegation]) -> anyhow::Result<()> {
        self.save_delegations(delegations).await
    }
}

#[async_trait]
impl DelegationsFinder for PostgresClient {
    async fn find_delegations(
        &self,
        criteria: &DelegationsCriteria,
    ) -> anyhow::Result<DelegationsPage> {
        PostgresClient::find_delegations(self, criteria).await
    }
}
