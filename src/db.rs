use crate::care::StatDelta;
use crate::error::{PetError, Result};
use crate::pet::{CreatedBy, Pet, PetTrait, PetUpdate, Rarity, Species, Stats, STAT_MAX, STAT_MIN};
use crate::store::{Event, PetStore};
use crate::users::{User, UserDirectory};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

const PET_COLUMNS: &str = "id, name, species, rarity, traits, hunger, happiness, energy,
     color, birth_date, owner_id, created_by, created_at, updated_at, version";

pub fn setup_database(conn: &Connection) -> Result<()> {
    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;

    // ==========================================================================
    // Users Table (directory entries only, credentials live elsewhere)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            username TEXT UNIQUE NOT NULL,
            email TEXT UNIQUE,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    // ==========================================================================
    // Pets Table (stat bounds enforced by the engine as well)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS pets (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            species TEXT NOT NULL,
            rarity TEXT NOT NULL DEFAULT 'Common',
            traits TEXT NOT NULL DEFAULT '[]',
            hunger INTEGER NOT NULL DEFAULT 50 CHECK (hunger BETWEEN 0 AND 100),
            happiness INTEGER NOT NULL DEFAULT 50 CHECK (happiness BETWEEN 0 AND 100),
            energy INTEGER NOT NULL DEFAULT 50 CHECK (energy BETWEEN 0 AND 100),
            color TEXT NOT NULL,
            birth_date TEXT NOT NULL,
            owner_id TEXT REFERENCES users(id),
            created_by TEXT NOT NULL DEFAULT 'web' CHECK (created_by IN ('web', 'api')),
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            version INTEGER NOT NULL DEFAULT 1
        )",
        [],
    )?;

    // ==========================================================================
    // Events Table (activity log, removed along with its pet)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id TEXT UNIQUE NOT NULL,
            timestamp TEXT NOT NULL,
            event_type TEXT NOT NULL,
            pet_id TEXT NOT NULL,
            data TEXT NOT NULL,
            actor TEXT NOT NULL
        )",
        [],
    )?;

    // ==========================================================================
    // Indexes
    // ==========================================================================
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_pets_owner ON pets(owner_id)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_events_pet ON events(pet_id, timestamp)",
        [],
    )?;

    Ok(())
}

/// SQLite-backed pet store and user directory sharing one connection
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        tracing::debug!(path = %path.display(), "opened database");
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    pub fn from_connection(conn: Connection) -> Result<Self> {
        setup_database(&conn)?;
        Ok(Database {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| PetError::Unavailable("database lock poisoned".to_string()))
    }

    fn update_scoped(
        &self,
        id: &str,
        owner_id: Option<&str>,
        update: &PetUpdate,
        event: &Event,
    ) -> Result<Option<Pet>> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        // Dropping tx without commit rolls back
        let Some(mut pet) = select_pet(&tx, id, owner_id)? else {
            return Ok(None);
        };
        let previous_version = pet.version;

        update.apply_to(&mut pet)?;
        pet.updated_at = Utc::now();
        pet.version = previous_version + 1;

        let changed = tx.execute(
            "UPDATE pets SET
                name = ?1, species = ?2, rarity = ?3, traits = ?4,
                hunger = ?5, happiness = ?6, energy = ?7, color = ?8,
                updated_at = ?9, version = ?10
             WHERE id = ?11 AND version = ?12",
            params![
                pet.name,
                pet.species.as_str(),
                pet.rarity.as_str(),
                serde_json::to_string(&pet.traits)?,
                pet.stats.hunger,
                pet.stats.happiness,
                pet.stats.energy,
                pet.color,
                format_timestamp(&pet.updated_at),
                pet.version,
                pet.id,
                previous_version,
            ],
        )?;
        if changed == 0 {
            return Err(PetError::Conflict(format!("pet {} changed during update", id)));
        }

        insert_event(&tx, event)?;
        let stored = select_pet(&tx, id, owner_id)?;
        tx.commit()?;
        Ok(stored)
    }
}

impl PetStore for Database {
    fn create(&self, pet: &Pet, event: &Event) -> Result<Pet> {
        pet.validate()?;

        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        tx.execute(
            &format!(
                "INSERT INTO pets ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
                PET_COLUMNS
            ),
            params![
                pet.id,
                pet.name,
                pet.species.as_str(),
                pet.rarity.as_str(),
                serde_json::to_string(&pet.traits)?,
                pet.stats.hunger,
                pet.stats.happiness,
                pet.stats.energy,
                pet.color,
                format_timestamp(&pet.birth_date),
                pet.owner,
                pet.created_by.as_str(),
                format_timestamp(&pet.created_at),
                format_timestamp(&pet.updated_at),
                pet.version,
            ],
        )?;

        insert_event(&tx, event)?;

        // Re-read so callers see the stored (microsecond) timestamps
        let stored = select_pet(&tx, &pet.id, None)?.ok_or_else(PetError::pet_not_found)?;
        tx.commit()?;
        Ok(stored)
    }

    fn find_by_id(&self, id: &str) -> Result<Option<Pet>> {
        let conn = self.lock()?;
        select_pet(&conn, id, None)
    }

    fn find_by_id_and_owner(&self, id: &str, owner_id: &str) -> Result<Option<Pet>> {
        let conn = self.lock()?;
        select_pet(&conn, id, Some(owner_id))
    }

    fn find_by_owner(&self, owner_id: &str) -> Result<Vec<Pet>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM pets WHERE owner_id = ?1 ORDER BY created_at, rowid",
            PET_COLUMNS
        ))?;

        let pets = stmt
            .query_map([owner_id], row_to_pet)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(pets)
    }

    fn find_public(&self) -> Result<Vec<Pet>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM pets WHERE owner_id IS NULL ORDER BY created_at, rowid",
            PET_COLUMNS
        ))?;

        let pets = stmt
            .query_map([], row_to_pet)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(pets)
    }

    fn update_by_id(&self, id: &str, update: &PetUpdate, event: &Event) -> Result<Option<Pet>> {
        self.update_scoped(id, None, update, event)
    }

    fn update_by_id_and_owner(
        &self,
        id: &str,
        owner_id: &str,
        update: &PetUpdate,
        event: &Event,
    ) -> Result<Option<Pet>> {
        self.update_scoped(id, Some(owner_id), update, event)
    }

    fn apply_stat_delta(
        &self,
        id: &str,
        owner_id: &str,
        delta: StatDelta,
        event: &Event,
    ) -> Result<Option<Pet>> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        // Clamp in the engine so concurrent writers never lose an update
        let changed = tx.execute(
            "UPDATE pets SET
                hunger = MIN(?2, MAX(?1, hunger + ?3)),
                happiness = MIN(?2, MAX(?1, happiness + ?4)),
                energy = MIN(?2, MAX(?1, energy + ?5)),
                updated_at = ?6,
                version = version + 1
             WHERE id = ?7 AND owner_id = ?8",
            params![
                STAT_MIN,
                STAT_MAX,
                delta.hunger,
                delta.happiness,
                delta.energy,
                format_timestamp(&Utc::now()),
                id,
                owner_id,
            ],
        )?;
        if changed == 0 {
            return Ok(None);
        }

        insert_event(&tx, event)?;
        let pet = select_pet(&tx, id, Some(owner_id))?;
        tx.commit()?;
        Ok(pet)
    }

    fn delete_by_id_and_owner(&self, id: &str, owner_id: &str) -> Result<bool> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let deleted = tx.execute(
            "DELETE FROM pets WHERE id = ?1 AND owner_id = ?2",
            params![id, owner_id],
        )?;
        if deleted == 0 {
            return Ok(false);
        }

        let events = tx.execute("DELETE FROM events WHERE pet_id = ?1", [id])?;
        tx.commit()?;
        tracing::debug!(pet_id = %id, events, "removed pet and its activity log");
        Ok(true)
    }

    fn events_for_pet(&self, pet_id: &str) -> Result<Vec<Event>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT event_id, timestamp, event_type, pet_id, data, actor
             FROM events
             WHERE pet_id = ?1
             ORDER BY timestamp DESC, id DESC",
        )?;

        let events = stmt
            .query_map([pet_id], |row| {
                let data_json: String = row.get(4)?;

                Ok(Event {
                    event_id: row.get(0)?,
                    timestamp: parse_timestamp(row, 1)?,
                    event_type: row.get(2)?,
                    pet_id: row.get(3)?,
                    data: serde_json::from_str(&data_json)
                        .map_err(|e| invalid_column(4, e.to_string()))?,
                    actor: row.get(5)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(events)
    }

    fn count(&self) -> Result<i64> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM pets", [], |row| row.get(0))?;

        Ok(count)
    }
}

impl UserDirectory for Database {
    fn register(&self, user: &User) -> Result<()> {
        let conn = self.lock()?;
        let result = conn.execute(
            "INSERT INTO users (id, username, email, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![user.id, user.username, user.email, format_timestamp(&user.created_at)],
        );

        match result {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(PetError::Conflict(format!(
                    "username '{}' or email already registered",
                    user.username
                )))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn find_user(&self, id: &str) -> Result<Option<User>> {
        let conn = self.lock()?;
        let user = conn
            .query_row(
                "SELECT id, username, email, created_at FROM users WHERE id = ?1",
                [id],
                row_to_user,
            )
            .optional()?;
        Ok(user)
    }

    fn resolve_username(&self, username: &str) -> Result<Option<User>> {
        let conn = self.lock()?;
        let user = conn
            .query_row(
                "SELECT id, username, email, created_at FROM users WHERE username = ?1",
                [username],
                row_to_user,
            )
            .optional()?;
        Ok(user)
    }
}

fn insert_event(conn: &Connection, event: &Event) -> Result<()> {
    let data_json = serde_json::to_string(&event.data)?;

    conn.execute(
        "INSERT INTO events (
            event_id, timestamp, event_type, pet_id, data, actor
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            event.event_id,
            format_timestamp(&event.timestamp),
            event.event_type,
            event.pet_id,
            data_json,
            event.actor,
        ],
    )?;

    Ok(())
}

fn select_pet(conn: &Connection, id: &str, owner_id: Option<&str>) -> Result<Option<Pet>> {
    let pet = match owner_id {
        Some(owner_id) => conn
            .query_row(
                &format!("SELECT {} FROM pets WHERE id = ?1 AND owner_id = ?2", PET_COLUMNS),
                params![id, owner_id],
                row_to_pet,
            )
            .optional()?,
        None => conn
            .query_row(
                &format!("SELECT {} FROM pets WHERE id = ?1", PET_COLUMNS),
                [id],
                row_to_pet,
            )
            .optional()?,
    };
    Ok(pet)
}

fn row_to_pet(row: &Row<'_>) -> rusqlite::Result<Pet> {
    let species: String = row.get(2)?;
    let rarity: String = row.get(3)?;
    let traits_json: String = row.get(4)?;
    let created_by: String = row.get(11)?;

    Ok(Pet {
        id: row.get(0)?,
        name: row.get(1)?,
        species: Species::parse(&species)
            .ok_or_else(|| invalid_column(2, format!("unknown species '{}'", species)))?,
        rarity: Rarity::parse(&rarity)
            .ok_or_else(|| invalid_column(3, format!("unknown rarity '{}'", rarity)))?,
        traits: serde_json::from_str::<Vec<PetTrait>>(&traits_json)
            .map_err(|e| invalid_column(4, e.to_string()))?,
        stats: Stats {
            hunger: row.get(5)?,
            happiness: row.get(6)?,
            energy: row.get(7)?,
        },
        color: row.get(8)?,
        birth_date: parse_timestamp(row, 9)?,
        owner: row.get(10)?,
        created_by: CreatedBy::parse(&created_by)
            .ok_or_else(|| invalid_column(11, format!("unknown provenance '{}'", created_by)))?,
        created_at: parse_timestamp(row, 12)?,
        updated_at: parse_timestamp(row, 13)?,
        version: row.get(14)?,
    })
}

fn row_to_user(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        created_at: parse_timestamp(row, 3)?,
    })
}

fn parse_timestamp(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| invalid_column(idx, e.to_string()))
}

/// Fixed-width UTC timestamps so text ordering matches time ordering
fn format_timestamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn invalid_column(idx: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, message.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::care::CareAction;
    use crate::pet::{AdoptRequest, StatsPatch};

    fn setup() -> (Database, User, User) {
        let db = Database::open_in_memory().unwrap();
        let alice = User::new("alice".to_string(), None);
        let bob = User::new("bob".to_string(), Some("bob@example.com".to_string()));
        db.register(&alice).unwrap();
        db.register(&bob).unwrap();
        (db, alice, bob)
    }

    fn event(event_type: &str, pet_id: &str) -> Event {
        Event::new(event_type, pet_id, serde_json::json!({}), "test")
    }

    fn create_test_pet(db: &Database, name: &str, owner: Option<&User>) -> Pet {
        let draft = AdoptRequest::new(name, "dragon").into_draft(false).unwrap();
        let pet = Pet::new(draft, owner.map(|u| u.id.clone()), CreatedBy::Web);
        db.create(&pet, &event("adopted", &pet.id)).unwrap()
    }

    #[test]
    fn test_create_and_find_roundtrip() {
        let (db, alice, _) = setup();
        let pet = create_test_pet(&db, "Spark", Some(&alice));

        let found = db.find_by_id(&pet.id).unwrap().unwrap();

        assert_eq!(found.name, "Spark");
        assert_eq!(found.species, Species::Dragon);
        assert_eq!(found.stats, Stats::default());
        assert_eq!(found.owner.as_deref(), Some(alice.id.as_str()));
        assert_eq!(found.created_at.timestamp_millis(), pet.created_at.timestamp_millis());
        assert_eq!(db.count().unwrap(), 1);
    }

    #[test]
    fn test_create_rejects_invalid_record() {
        let (db, alice, _) = setup();
        let draft = AdoptRequest::new("Spark", "dragon").into_draft(false).unwrap();
        let mut pet = Pet::new(draft, Some(alice.id.clone()), CreatedBy::Web);
        pet.stats.hunger = 120;

        let err = db.create(&pet, &event("adopted", &pet.id)).unwrap_err();

        assert!(matches!(err, PetError::Validation(_)));
        assert_eq!(db.count().unwrap(), 0);
        assert!(db.events_for_pet(&pet.id).unwrap().is_empty());
    }

    #[test]
    fn test_owner_scoped_lookup_hides_foreign_pets() {
        let (db, alice, bob) = setup();
        let pet = create_test_pet(&db, "Spark", Some(&alice));

        assert!(db.find_by_id_and_owner(&pet.id, &alice.id).unwrap().is_some());
        assert!(db.find_by_id_and_owner(&pet.id, &bob.id).unwrap().is_none());
        assert!(db.find_by_id_and_owner("missing", &alice.id).unwrap().is_none());
    }

    #[test]
    fn test_owner_and_public_listings_are_disjoint() {
        let (db, alice, bob) = setup();
        create_test_pet(&db, "Spark", Some(&alice));
        create_test_pet(&db, "Ember", Some(&alice));
        create_test_pet(&db, "Moss", Some(&bob));
        create_test_pet(&db, "Stray", None);

        let alice_pets = db.find_by_owner(&alice.id).unwrap();
        let names: Vec<&str> = alice_pets.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["Spark", "Ember"]);

        let public = db.find_public().unwrap();
        assert_eq!(public.len(), 1);
        assert!(public.iter().all(|p| p.owner.is_none()));
        assert_eq!(public[0].name, "Stray");
    }

    #[test]
    fn test_stat_delta_matches_pure_rules() {
        let (db, alice, _) = setup();
        let pet = create_test_pet(&db, "Spark", Some(&alice));
        let mut expected = pet.stats;

        for action in [
            CareAction::Feed,
            CareAction::Feed,
            CareAction::Play,
            CareAction::Play,
            CareAction::Play,
            CareAction::Rest,
        ] {
            expected = expected.apply(action.delta());
            let updated = db
                .apply_stat_delta(&pet.id, &alice.id, action.delta(), &event("care", &pet.id))
                .unwrap()
                .unwrap();
            assert_eq!(updated.stats, expected, "after {:?}", action);
        }

        let stored = db.find_by_id(&pet.id).unwrap().unwrap();
        assert_eq!(stored.version, 7);
    }

    #[test]
    fn test_stat_delta_requires_ownership() {
        let (db, alice, bob) = setup();
        let pet = create_test_pet(&db, "Spark", Some(&alice));

        let result = db
            .apply_stat_delta(&pet.id, &bob.id, CareAction::Feed.delta(), &event("care", &pet.id))
            .unwrap();

        assert!(result.is_none());
        assert_eq!(db.find_by_id(&pet.id).unwrap().unwrap().stats, Stats::default());
        assert_eq!(db.events_for_pet(&pet.id).unwrap().len(), 1);
    }

    #[test]
    fn test_shared_handle_serializes_care() {
        let (db, alice, _) = setup();
        let pet = create_test_pet(&db, "Spark", Some(&alice));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let db = db.clone();
                let id = pet.id.clone();
                let owner = alice.id.clone();
                std::thread::spawn(move || {
                    let delta = StatDelta {
                        hunger: 0,
                        happiness: 0,
                        energy: -5,
                    };
                    db.apply_stat_delta(&id, &owner, delta, &event("care", &id))
                        .unwrap()
                        .unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let stored = db.find_by_id(&pet.id).unwrap().unwrap();
        assert_eq!(stored.stats.energy, 10);
        assert_eq!(stored.version, 9);
        assert_eq!(db.events_for_pet(&pet.id).unwrap().len(), 9);
    }

    #[test]
    fn test_poisoned_lock_is_unavailable() {
        let (db, alice, _) = setup();
        let pet = create_test_pet(&db, "Spark", Some(&alice));

        let poisoner = db.clone();
        let result = std::thread::spawn(move || {
            let _guard = poisoner.conn.lock().unwrap();
            panic!("writer died holding the connection");
        })
        .join();
        assert!(result.is_err());

        let err = db.find_by_id(&pet.id).unwrap_err();
        assert!(matches!(err, PetError::Unavailable(_)));
        assert!(err.is_persistence());
        assert!(matches!(
            db.apply_stat_delta(&pet.id, &alice.id, CareAction::Feed.delta(), &event("care", &pet.id)),
            Err(PetError::Unavailable(_))
        ));
    }

    #[test]
    fn test_failed_event_insert_rolls_back_writes() {
        let (db, alice, _) = setup();
        let pet = create_test_pet(&db, "Spark", Some(&alice));
        db.conn.lock().unwrap().execute_batch("DROP TABLE events").unwrap();

        let err = db
            .apply_stat_delta(&pet.id, &alice.id, CareAction::Feed.delta(), &event("care", &pet.id))
            .unwrap_err();
        assert!(err.is_persistence());

        let update = PetUpdate {
            name: Some("Blaze".to_string()),
            ..Default::default()
        };
        assert!(db.update_by_id(&pet.id, &update, &event("updated", &pet.id)).is_err());

        let draft = AdoptRequest::new("Ember", "cat").into_draft(false).unwrap();
        let other = Pet::new(draft, Some(alice.id.clone()), CreatedBy::Web);
        assert!(db.create(&other, &event("adopted", &other.id)).is_err());

        let stored = db.find_by_id(&pet.id).unwrap().unwrap();
        assert_eq!(stored.name, "Spark");
        assert_eq!(stored.stats, Stats::default());
        assert_eq!(stored.version, 1);
        assert_eq!(db.count().unwrap(), 1);
    }

    #[test]
    fn test_update_merges_and_bumps_version() {
        let (db, alice, _) = setup();
        let pet = create_test_pet(&db, "Spark", Some(&alice));

        let update = PetUpdate {
            name: Some("Blaze".to_string()),
            rarity: Some("Epic".to_string()),
            stats: Some(StatsPatch {
                happiness: Some(99),
                ..Default::default()
            }),
            ..Default::default()
        };
        let updated = db
            .update_by_id(&pet.id, &update, &event("updated", &pet.id))
            .unwrap()
            .unwrap();

        assert_eq!(updated.name, "Blaze");
        assert_eq!(updated.rarity, Rarity::Epic);
        assert_eq!(updated.stats, Stats::new(50, 99, 50));
        assert_eq!(updated.version, 2);
        assert_eq!(db.find_by_id(&pet.id).unwrap().unwrap(), updated);
    }

    #[test]
    fn test_invalid_update_leaves_stored_state() {
        let (db, alice, _) = setup();
        let pet = create_test_pet(&db, "Spark", Some(&alice));

        let update = PetUpdate {
            name: Some("Blaze".to_string()),
            stats: Some(StatsPatch {
                energy: Some(250),
                ..Default::default()
            }),
            ..Default::default()
        };
        let err = db
            .update_by_id(&pet.id, &update, &event("updated", &pet.id))
            .unwrap_err();

        assert!(matches!(err, PetError::Validation(_)));
        let stored = db.find_by_id(&pet.id).unwrap().unwrap();
        assert_eq!(stored.name, "Spark");
        assert_eq!(stored.version, 1);
        assert_eq!(db.events_for_pet(&pet.id).unwrap().len(), 1);
    }

    #[test]
    fn test_scoped_update_and_delete() {
        let (db, alice, bob) = setup();
        let pet = create_test_pet(&db, "Spark", Some(&alice));
        let update = PetUpdate {
            name: Some("Stolen".to_string()),
            ..Default::default()
        };

        assert!(db
            .update_by_id_and_owner(&pet.id, &bob.id, &update, &event("updated", &pet.id))
            .unwrap()
            .is_none());
        assert!(!db.delete_by_id_and_owner(&pet.id, &bob.id).unwrap());
        assert_eq!(db.find_by_id(&pet.id).unwrap().unwrap().name, "Spark");

        assert!(db.delete_by_id_and_owner(&pet.id, &alice.id).unwrap());
        assert!(db.find_by_id(&pet.id).unwrap().is_none());
        assert!(!db.delete_by_id_and_owner(&pet.id, &alice.id).unwrap());
    }

    #[test]
    fn test_delete_removes_activity_log() {
        let (db, alice, _) = setup();
        let pet = create_test_pet(&db, "Spark", Some(&alice));
        let kept = create_test_pet(&db, "Ember", Some(&alice));
        db.apply_stat_delta(&pet.id, &alice.id, CareAction::Play.delta(), &event("care", &pet.id))
            .unwrap();
        assert_eq!(db.events_for_pet(&pet.id).unwrap().len(), 2);

        assert!(db.delete_by_id_and_owner(&pet.id, &alice.id).unwrap());

        assert!(db.events_for_pet(&pet.id).unwrap().is_empty());
        assert_eq!(db.events_for_pet(&kept.id).unwrap().len(), 1);
        let remaining: i64 = db
            .conn
            .lock()
            .unwrap()
            .query_row("SELECT COUNT(*) FROM events", [], |row| row.get(0))
            .unwrap();
        assert_eq!(remaining, 1);
    }

    #[test]
    fn test_unknown_owner_violates_foreign_key() {
        let db = Database::open_in_memory().unwrap();
        let draft = AdoptRequest::new("Spark", "dragon").into_draft(false).unwrap();
        let pet = Pet::new(draft, Some("nobody".to_string()), CreatedBy::Api);

        let err = db.create(&pet, &event("adopted", &pet.id)).unwrap_err();
        assert!(err.is_persistence());
        assert_eq!(db.count().unwrap(), 0);
        assert!(db.events_for_pet(&pet.id).unwrap().is_empty());
    }

    #[test]
    fn test_event_log() {
        let (db, alice, _) = setup();
        let pet = create_test_pet(&db, "Spark", Some(&alice));
        let other = create_test_pet(&db, "Ember", Some(&alice));

        let care = Event::new("care", &pet.id, serde_json::json!({"action": "feed"}), &alice.id);
        db.apply_stat_delta(&pet.id, &alice.id, CareAction::Feed.delta(), &care)
            .unwrap();

        let events = db.events_for_pet(&pet.id).unwrap();

        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_id, care.event_id);
        assert_eq!(events[0].data["action"], "feed");
        assert_eq!(events[1].event_type, "adopted");
        assert_eq!(db.events_for_pet(&other.id).unwrap().len(), 1);
    }

    #[test]
    fn test_user_directory() {
        let (db, alice, _) = setup();

        assert_eq!(db.resolve_username("alice").unwrap().unwrap().id, alice.id);
        assert_eq!(db.find_user(&alice.id).unwrap().unwrap().username, "alice");
        assert!(db.resolve_username("ghost").unwrap().is_none());

        let dup = User::new("alice".to_string(), None);
        assert!(matches!(db.register(&dup), Err(PetError::Conflict(_))));

        let dup_email = User::new("carol".to_string(), Some("bob@example.com".to_string()));
        assert!(matches!(db.register(&dup_email), Err(PetError::Conflict(_))));
    }
}
