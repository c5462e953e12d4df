//! Entity finisher
//!
//! Invoked after every tracker reaches a terminal state. Whichever invocation
//! observes the last tracker settle moves the entity itself; all the others
//! are no-ops, so callers never need to know whether they were "the last one".

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::entity::{EntityStatus, TrackerStatus};
use crate::error::Result;
use crate::store::StateStore;

pub struct EntityFinisher {
    store: StateStore,
}

impl EntityFinisher {
    pub fn new(store: StateStore) -> Self {
        Self { store }
    }

    /// Settle the entity if every one of its trackers is terminal. Returns
    /// the entity status as persisted after this call.
    ///
    /// An entity fails only when every tracker failed; a partial migration
    /// with some failed relations still finishes, with the detail kept on
    /// the tracker rows.
    pub async fn finish(&self, entity_id: Uuid) -> Result<EntityStatus> {
        let entity = self.store.entity(entity_id).await?;
        if entity.status.is_terminal() {
            debug!(entity_id = %entity_id, status = entity.status.as_str(), "Entity already settled");
            return Ok(entity.status);
        }

        let trackers = self.store.trackers_for_entity(entity_id).await?;
        if trackers.iter().any(|t| !t.status.is_terminal()) {
            debug!(entity_id = %entity_id, "Trackers still running, leaving entity open");
            return Ok(entity.status);
        }

        let all_failed = !trackers.is_empty()
            && trackers.iter().all(|t| t.status == TrackerStatus::Failed);

        if all_failed {
            if self
                .store
                .fail_entity(entity_id, "all relation pipelines failed")
                .await?
            {
                warn!(entity_id = %entity_id, "Entity failed, no relation migrated");
            }
        } else if self.store.finish_entity(entity_id).await? {
            let failed = trackers
                .iter()
                .filter(|t| t.status == TrackerStatus::Failed)
                .count();
            info!(
                entity_id = %entity_id,
                relations = trackers.len(),
                failed_relations = failed,
                "Entity finished"
            );
        }

        // The transitions above are guarded, so under concurrent invocations
        // the row is authoritative, not our local branch.
        Ok(self.store.entity(entity_id).await?.status)
    }
}
