// Digital Pet Shelter - Core Library
// Exposes all modules for use in CLI, API server, and tests

pub mod care;
pub mod config;
pub mod db;
pub mod error;
pub mod pet;
pub mod service;
pub mod store;
pub mod users;

// Re-export commonly used types
pub use care::{apply_care, CareAction, StatDelta, CARE_THRESHOLD};
pub use config::Config;
pub use db::{setup_database, Database};
pub use error::{FieldError, PetError, Result};
pub use pet::{
    AdoptRequest, CreatedBy, OneOrMany, Pet, PetDraft, PetFilter, PetTrait, PetUpdate, Rarity,
    Species, Stats, StatsPatch,
};
pub use service::PetService;
pub use store::{Event, PetStore};
pub use users::{DirectorySessions, SessionResolver, User, UserDirectory};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
