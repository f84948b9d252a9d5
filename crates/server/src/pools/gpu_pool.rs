//! Guards the set of GPU/MIG partitions discovered at startup.
//!
//! Hold state is an explicit sum type rather than a `held: bool` plus an
//! `Option<String>` holder, so "held but no holder" is unrepresentable.

use std::collections::HashMap;

use sandman_protocol::GpuSliceDescriptor;
use tokio::sync::Mutex;

use crate::error::EngineError;

#[derive(Debug, Clone, PartialEq)]
pub enum GpuHold {
    Free,
    Held { user_id: String },
}

#[derive(Debug, Clone)]
struct GpuEntry {
    descriptor: GpuSliceDescriptor,
    hold: GpuHold,
}

pub struct GpuPool {
    entries: Mutex<HashMap<String, GpuEntry>>,
}

impl GpuPool {
    /// Seeds the pool from a freshly discovered slice list; every entry
    /// starts `Free`. Reconciliation against the store happens separately
    /// (see `reconcile_held`) since startup ordering needs the store open
    /// first.
    pub fn new(slices: Vec<GpuSliceDescriptor>) -> Self {
        let entries = slices
            .into_iter()
            .map(|descriptor| {
                (
                    descriptor.uuid.clone(),
                    GpuEntry {
                        descriptor,
                        hold: GpuHold::Free,
                    },
                )
            })
            .collect();
        Self {
            entries: Mutex::new(entries),
        }
    }

    /// Marks a UUID as held by `user_id` during startup reconciliation.
    /// Logs and is a no-op if the UUID is unknown to this host (the
    /// corresponding record is considered corrupt, per `spec.md` §4.1).
    pub async fn reconcile_held(&self, uuid: &str, user_id: &str) {
        let mut entries = self.entries.lock().await;
        match entries.get_mut(uuid) {
            Some(entry) => {
                entry.hold = GpuHold::Held {
                    user_id: user_id.to_string(),
                };
            }
            None => {
                tracing::warn!(gpu_uuid = uuid, user_id, "reconciliation: unknown GPU UUID in record");
            }
        }
    }

    pub async fn allocate_by_profile(
        &self,
        profile_name: &str,
        user_id: &str,
    ) -> Result<GpuSliceDescriptor, EngineError> {
        let mut entries = self.entries.lock().await;
        let hit = entries
            .values_mut()
            .find(|entry| entry.descriptor.profile_name == profile_name && entry.hold == GpuHold::Free);
        match hit {
            Some(entry) => {
                entry.hold = GpuHold::Held {
                    user_id: user_id.to_string(),
                };
                Ok(entry.descriptor.clone())
            }
            None => Err(EngineError::GpuExhausted),
        }
    }

    pub async fn allocate_by_uuid(
        &self,
        uuid: &str,
        user_id: &str,
    ) -> Result<GpuSliceDescriptor, EngineError> {
        let mut entries = self.entries.lock().await;
        let entry = entries
            .get_mut(uuid)
            .ok_or_else(|| EngineError::GpuUnknown(uuid.to_string()))?;
        if entry.hold != GpuHold::Free {
            return Err(EngineError::GpuBusy(uuid.to_string()));
        }
        entry.hold = GpuHold::Held {
            user_id: user_id.to_string(),
        };
        Ok(entry.descriptor.clone())
    }

    /// Idempotent. Logs (doesn't fail) if already free or held by someone
    /// else, since administrative teardown must still release the slice.
    pub async fn release(&self, uuid: &str, user_id: &str) {
        let mut entries = self.entries.lock().await;
        let Some(entry) = entries.get_mut(uuid) else {
            tracing::warn!(gpu_uuid = uuid, "release: unknown GPU UUID");
            return;
        };
        match &entry.hold {
            GpuHold::Free => {
                tracing::warn!(gpu_uuid = uuid, "release: GPU already free");
            }
            GpuHold::Held { user_id: holder } if holder != user_id => {
                tracing::warn!(gpu_uuid = uuid, holder, releaser = user_id, "release: held by another user");
            }
            GpuHold::Held { .. } => {}
        }
        entry.hold = GpuHold::Free;
    }

    pub async fn snapshot_free(&self) -> Vec<GpuSliceDescriptor> {
        let entries = self.entries.lock().await;
        entries
            .values()
            .filter(|entry| entry.hold == GpuHold::Free)
            .map(|entry| entry.descriptor.clone())
            .collect()
    }

    pub async fn snapshot_all(&self) -> Vec<GpuSliceDescriptor> {
        let entries = self.entries.lock().await;
        entries.values().map(|entry| entry.descriptor.clone()).collect()
    }
}
