//! Lease manager: exclusive, time-bounded claims on single units.
//!
//! Expiry is evaluated lazily at claim time. There is no background sweep:
//! an abandoned claim is picked up the next time anyone asks for work after
//! its lease ran out.

use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use opentelemetry::KeyValue;
use tracing::{debug, info};

use crate::error::Result;
use crate::model::*;
use crate::store::Store;
use crate::telemetry::metrics;

pub struct LeaseManager<S> {
    store: Arc<S>,
    lease: TimeDelta,
}

impl<S: Store> LeaseManager<S> {
    pub fn new(store: Arc<S>, lease: TimeDelta) -> Self {
        Self { store, lease }
    }

    /// Claim the lowest-index claimable unit in the batch. `None` means the
    /// batch has nothing left to hand out.
    pub async fn claim_next(&self, batch_id: BatchId, user_id: &str) -> Result<Option<Unit>> {
        self.claim_next_at(batch_id, user_id, Utc::now()).await
    }

    /// [`claim_next`](Self::claim_next) evaluated at an explicit instant.
    pub async fn claim_next_at(
        &self,
        batch_id: BatchId,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Unit>> {
        validate_user_id(user_id)?;

        let Some(grant) = self
            .store
            .claim_next_unit(batch_id, user_id, now, self.lease)
            .await?
        else {
            debug!(%batch_id, user_id, "no claimable unit");
            metrics::claims().add(1, &[KeyValue::new("result", "exhausted")]);
            return Ok(None);
        };

        let unit = grant.unit;
        match grant.reclaimed_from {
            Some(previous) => {
                info!(
                    %batch_id,
                    unit_id = %unit.id,
                    user_id,
                    previous_assignee = %previous,
                    "expired claim taken over"
                );
                metrics::claims().add(1, &[KeyValue::new("result", "stolen")]);
            }
            None => {
                info!(
                    %batch_id,
                    unit_id = %unit.id,
                    user_id,
                    index = unit.original_index,
                    "unit claimed"
                );
                metrics::claims().add(1, &[KeyValue::new("result", "granted")]);
            }
        }
        Ok(Some(unit))
    }

    /// The user's own live claim in the batch, if any.
    pub async fn held_claim(&self, batch_id: BatchId, user_id: &str) -> Result<Option<Unit>> {
        self.held_claim_at(batch_id, user_id, Utc::now()).await
    }

    pub async fn held_claim_at(
        &self,
        batch_id: BatchId,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Unit>> {
        validate_user_id(user_id)?;
        let held = self.store.held_claim(batch_id, user_id, now).await?;
        if held.is_some() {
            metrics::claims().add(1, &[KeyValue::new("result", "resumed")]);
        }
        Ok(held)
    }

    /// Hand a claim back. A no-op, not an error, when the caller no longer
    /// holds it. Returns whether the unit was released.
    pub async fn release(&self, unit_id: UnitId, user_id: &str) -> Result<bool> {
        validate_user_id(user_id)?;
        let released = self.store.release_unit(unit_id, user_id).await?;
        if released {
            info!(%unit_id, user_id, "claim released");
            metrics::claims_released().add(1, &[KeyValue::new("result", "released")]);
        } else {
            debug!(%unit_id, user_id, "stale release ignored");
            metrics::claims_released().add(1, &[KeyValue::new("result", "stale")]);
        }
        Ok(released)
    }
}
