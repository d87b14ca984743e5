//! Pet Record Store contract.
//!
//! Every owner-scoped method filters by both pet id and owner id, so a pet
//! belonging to someone else looks exactly like a missing one.

use crate::care::StatDelta;
use crate::error::Result;
use crate::pet::{Pet, PetUpdate};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Persistence for pets and their activity log.
///
/// Mutating methods validate the resulting record before committing and
/// leave stored state untouched when validation fails. The `event` passed
/// to a write is committed in the same transaction as the pet row, so a
/// failed log insert rolls the write back.
pub trait PetStore: Send + Sync {
    /// Insert a new pet
    fn create(&self, pet: &Pet, event: &Event) -> Result<Pet>;

    fn find_by_id(&self, id: &str) -> Result<Option<Pet>>;

    fn find_by_id_and_owner(&self, id: &str, owner_id: &str) -> Result<Option<Pet>>;

    /// Pets owned by `owner_id`, oldest first
    fn find_by_owner(&self, owner_id: &str) -> Result<Vec<Pet>>;

    /// Pets with no owner, oldest first
    fn find_public(&self) -> Result<Vec<Pet>>;

    /// Merge a partial update, unscoped by owner
    fn update_by_id(&self, id: &str, update: &PetUpdate, event: &Event) -> Result<Option<Pet>>;

    fn update_by_id_and_owner(
        &self,
        id: &str,
        owner_id: &str,
        update: &PetUpdate,
        event: &Event,
    ) -> Result<Option<Pet>>;

    /// Atomically add `delta` to the stats, clamping each to [0, 100]
    fn apply_stat_delta(
        &self,
        id: &str,
        owner_id: &str,
        delta: StatDelta,
        event: &Event,
    ) -> Result<Option<Pet>>;

    /// Removes the pet together with its activity log.
    /// Returns true if a pet was deleted.
    fn delete_by_id_and_owner(&self, id: &str, owner_id: &str) -> Result<bool>;

    /// Newest first
    fn events_for_pet(&self, pet_id: &str) -> Result<Vec<Event>>;

    fn count(&self) -> Result<i64>;
}

/// Activity log entry ("Every change is an event")
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub pet_id: String,
    pub data: serde_json::Value,
    pub actor: String,
}

impl Event {
    pub fn new(event_type: &str, pet_id: &str, data: serde_json::Value, actor: &str) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type: event_type.to_string(),
            pet_id: pet_id.to_string(),
            data,
            actor: actor.to_string(),
        }
    }
}
