//! Pet operations exposed to the HTTP layer and the CLI.
//!
//! Identity arrives already resolved: callers pass the owner id they got
//! from a [`SessionResolver`](crate::users::SessionResolver). Nothing here
//! distinguishes "not yours" from "does not exist".

use crate::care::CareAction;
use crate::error::{PetError, Result};
use crate::pet::{AdoptRequest, CreatedBy, Pet, PetFilter, PetUpdate};
use crate::store::{Event, PetStore};
use crate::users::{self, User, UserDirectory};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Clone)]
pub struct PetService {
    store: Arc<dyn PetStore>,
    users: Arc<dyn UserDirectory>,
}

impl PetService {
    pub fn new(store: Arc<dyn PetStore>, users: Arc<dyn UserDirectory>) -> Self {
        PetService { store, users }
    }

    /// Owner-initiated adoption (web provenance, default stats)
    pub fn adopt_pet(&self, owner_id: &str, request: AdoptRequest) -> Result<Pet> {
        let draft = request.into_draft(false)?;
        if self.users.find_user(owner_id)?.is_none() {
            return Err(PetError::NotFound("User".to_string()));
        }

        let pet = Pet::new(draft, Some(owner_id.to_string()), CreatedBy::Web);
        let event = Event::new("adopted", &pet.id, json!({ "createdBy": "web" }), owner_id);
        let pet = self.store.create(&pet, &event)?;
        info!(pet_id = %pet.id, name = %pet.name, owner = %owner_id, "pet adopted");
        Ok(pet)
    }

    /// API adoption naming the owner by username. Nothing is written if the
    /// username does not resolve.
    pub fn adopt_pet_by_username(&self, username: &str, request: AdoptRequest) -> Result<Pet> {
        let draft = request.into_draft(true)?;
        let user = self
            .users
            .resolve_username(username)?
            .ok_or_else(|| PetError::NotFound(format!("User '{}'", username)))?;

        let pet = Pet::new(draft, Some(user.id.clone()), CreatedBy::Api);
        let event = Event::new(
            "adopted",
            &pet.id,
            json!({ "createdBy": "api", "username": user.username }),
            &user.id,
        );
        let pet = self.store.create(&pet, &event)?;
        info!(pet_id = %pet.id, name = %pet.name, owner = %user.username, "pet adopted via api");
        Ok(pet)
    }

    /// API adoption of an unowned pet
    pub fn adopt_public_pet(&self, request: AdoptRequest) -> Result<Pet> {
        let draft = request.into_draft(true)?;
        let pet = Pet::new(draft, None, CreatedBy::Api);
        let event = Event::new(
            "adopted",
            &pet.id,
            json!({ "createdBy": "api", "public": true }),
            "api",
        );
        let pet = self.store.create(&pet, &event)?;
        info!(pet_id = %pet.id, name = %pet.name, "public pet created");
        Ok(pet)
    }

    pub fn list_owned_pets(&self, owner_id: &str) -> Result<Vec<Pet>> {
        self.store.find_by_owner(owner_id)
    }

    pub fn search_owned_pets(&self, owner_id: &str, filter: &PetFilter) -> Result<Vec<Pet>> {
        let pets = self.store.find_by_owner(owner_id)?;
        let total = pets.len();
        let matched: Vec<Pet> = pets.into_iter().filter(|p| filter.matches(p)).collect();
        debug!(owner = %owner_id, total, matched = matched.len(), "filtered pets");
        Ok(matched)
    }

    pub fn list_public_pets(&self) -> Result<Vec<Pet>> {
        self.store.find_public()
    }

    pub fn get_pet(&self, id: &str, owner_id: &str) -> Result<Pet> {
        self.store
            .find_by_id_and_owner(id, owner_id)?
            .ok_or_else(PetError::pet_not_found)
    }

    /// Apply a care action by tag. Unrecognized tags change nothing and
    /// return the pet as stored.
    pub fn apply_care_action(&self, id: &str, owner_id: &str, tag: &str) -> Result<Pet> {
        let Some(action) = CareAction::parse(tag) else {
            warn!(pet_id = %id, action = %tag, "ignoring unrecognized care action");
            return self.get_pet(id, owner_id);
        };

        let delta = action.delta();
        let event = Event::new(
            "care",
            id,
            json!({ "action": action.as_str(), "delta": delta }),
            owner_id,
        );
        let pet = self
            .store
            .apply_stat_delta(id, owner_id, delta, &event)?
            .ok_or_else(PetError::pet_not_found)?;
        debug!(pet_id = %id, action = action.as_str(), stats = ?pet.stats, "care applied");
        Ok(pet)
    }

    /// Unscoped update for administrative callers
    pub fn update_pet(&self, id: &str, update: &PetUpdate) -> Result<Pet> {
        let event = Event::new("updated", id, json!({ "fields": update.fields() }), "admin");
        self.store
            .update_by_id(id, update, &event)?
            .ok_or_else(PetError::pet_not_found)
    }

    pub fn update_owned_pet(&self, id: &str, owner_id: &str, update: &PetUpdate) -> Result<Pet> {
        let event = Event::new("updated", id, json!({ "fields": update.fields() }), owner_id);
        self.store
            .update_by_id_and_owner(id, owner_id, update, &event)?
            .ok_or_else(PetError::pet_not_found)
    }

    /// Deleting a pet also discards its activity log
    pub fn delete_pet(&self, id: &str, owner_id: &str) -> Result<bool> {
        let deleted = self.store.delete_by_id_and_owner(id, owner_id)?;
        if deleted {
            info!(pet_id = %id, owner = %owner_id, "pet deleted");
        }
        Ok(deleted)
    }

    /// Activity log of an owned pet, newest first
    pub fn pet_activity(&self, id: &str, owner_id: &str) -> Result<Vec<Event>> {
        let pet = self.get_pet(id, owner_id)?;
        self.store.events_for_pet(&pet.id)
    }

    pub fn register_user(&self, username: &str, email: Option<&str>) -> Result<User> {
        users::register_user(self.users.as_ref(), username, email)
    }

    pub fn resolve_username(&self, username: &str) -> Result<User> {
        self.users
            .resolve_username(username)?
            .ok_or_else(|| PetError::NotFound(format!("User '{}'", username)))
    }
}
