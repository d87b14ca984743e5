// 🐾 Pet Entity - identity, ownership and bounded stats
//
// "Pet id is IDENTITY (never changes), name/stats/traits are VALUES"
//
// Raw input (AdoptRequest, PetUpdate) arrives as strings from the API and
// is parsed into the closed vocabularies below. Anything outside them is a
// structured validation error, never a silent default.

use crate::error::FieldError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const NAME_MAX_CHARS: usize = 30;
pub const STAT_MIN: u8 = 0;
pub const STAT_MAX: u8 = 100;
pub const STAT_DEFAULT: u8 = 50;
pub const DEFAULT_COLOR: &str = "#667eea";

// ============================================================================
// SPECIES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Species {
    Dragon,
    Cat,
    Dog,
    Rat,
    Elf,
    Robot,
    Wolf,
    Deer,
    Duck,
    Bear,
}

impl Species {
    pub const ALL: [Species; 10] = [
        Species::Dragon,
        Species::Cat,
        Species::Dog,
        Species::Rat,
        Species::Elf,
        Species::Robot,
        Species::Wolf,
        Species::Deer,
        Species::Duck,
        Species::Bear,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Species::Dragon => "dragon",
            Species::Cat => "cat",
            Species::Dog => "dog",
            Species::Rat => "rat",
            Species::Elf => "elf",
            Species::Robot => "robot",
            Species::Wolf => "wolf",
            Species::Deer => "deer",
            Species::Duck => "duck",
            Species::Bear => "bear",
        }
    }

    pub fn parse(value: &str) -> Option<Species> {
        Species::ALL.iter().copied().find(|s| s.as_str() == value)
    }

    pub fn image_url(&self) -> String {
        format!("/images/{}.png", self.as_str())
    }

    pub fn description(&self) -> &'static str {
        match self {
            Species::Dragon => "Majestic flying creature with ancient wisdom and powerful breath attacks.",
            Species::Cat => "Agile and independent companion with mysterious nocturnal habits.",
            Species::Dog => "Loyal and energetic friend who loves to play and protect its owner.",
            Species::Rat => "Clever and quick creature with excellent problem-solving skills.",
            Species::Elf => "Magical forest being with connection to nature and ancient magic.",
            Species::Robot => "Futuristic tech companion programmed for assistance and friendship.",
            Species::Wolf => "Wild and free spirit with strong pack instincts and keen senses.",
            Species::Deer => "Graceful forest dweller known for its speed and gentle nature.",
            Species::Duck => "Cheerful water lover with excellent swimming and flying abilities.",
            Species::Bear => "Strong and protective creature with surprising intelligence and warmth.",
        }
    }
}

// ============================================================================
// RARITY
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Rarity {
    #[default]
    Common,
    Rare,
    Epic,
    Legendary,
}

/// Localized rarity names accepted on input (zh-CN web forms)
const RARITY_ALIASES: [(&str, Rarity); 4] = [
    ("普通", Rarity::Common),
    ("稀有", Rarity::Rare),
    ("史诗", Rarity::Epic),
    ("传说", Rarity::Legendary),
];

impl Rarity {
    pub const ALL: [Rarity; 4] = [Rarity::Common, Rarity::Rare, Rarity::Epic, Rarity::Legendary];

    pub fn as_str(&self) -> &'static str {
        match self {
            Rarity::Common => "Common",
            Rarity::Rare => "Rare",
            Rarity::Epic => "Epic",
            Rarity::Legendary => "Legendary",
        }
    }

    /// Canonical name or a localized alias
    pub fn parse(value: &str) -> Option<Rarity> {
        Rarity::ALL
            .iter()
            .copied()
            .find(|r| r.as_str() == value)
            .or_else(|| {
                RARITY_ALIASES
                    .iter()
                    .find(|(alias, _)| *alias == value)
                    .map(|(_, rarity)| *rarity)
            })
    }

    pub fn color(&self) -> &'static str {
        match self {
            Rarity::Common => "#6c757d",
            Rarity::Rare => "#17a2b8",
            Rarity::Epic => "#6f42c1",
            Rarity::Legendary => "#e83e8c",
        }
    }
}

// ============================================================================
// TRAITS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PetTrait {
    #[serde(rename = "Fire Breath")]
    FireBreath,
    Glowing,
    #[serde(rename = "Can Sing")]
    CanSing,
    Invisible,
    Flying,
    #[serde(rename = "Water Breathing")]
    WaterBreathing,
    #[serde(rename = "Fast Moving")]
    FastMoving,
    Giant,
    Tiny,
}

impl PetTrait {
    pub const ALL: [PetTrait; 9] = [
        PetTrait::FireBreath,
        PetTrait::Glowing,
        PetTrait::CanSing,
        PetTrait::Invisible,
        PetTrait::Flying,
        PetTrait::WaterBreathing,
        PetTrait::FastMoving,
        PetTrait::Giant,
        PetTrait::Tiny,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PetTrait::FireBreath => "Fire Breath",
            PetTrait::Glowing => "Glowing",
            PetTrait::CanSing => "Can Sing",
            PetTrait::Invisible => "Invisible",
            PetTrait::Flying => "Flying",
            PetTrait::WaterBreathing => "Water Breathing",
            PetTrait::FastMoving => "Fast Moving",
            PetTrait::Giant => "Giant",
            PetTrait::Tiny => "Tiny",
        }
    }

    pub fn parse(value: &str) -> Option<PetTrait> {
        PetTrait::ALL.iter().copied().find(|t| t.as_str() == value)
    }
}

// ============================================================================
// PROVENANCE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CreatedBy {
    Web,
    Api,
}

impl CreatedBy {
    pub fn as_str(&self) -> &'static str {
        match self {
            CreatedBy::Web => "web",
            CreatedBy::Api => "api",
        }
    }

    pub fn parse(value: &str) -> Option<CreatedBy> {
        match value {
            "web" => Some(CreatedBy::Web),
            "api" => Some(CreatedBy::Api),
            _ => None,
        }
    }
}

// ============================================================================
// STATS
// ============================================================================

/// The bounded stat triple; every field stays within [STAT_MIN, STAT_MAX]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    pub hunger: u8,
    pub happiness: u8,
    pub energy: u8,
}

impl Default for Stats {
    fn default() -> Self {
        Stats {
            hunger: STAT_DEFAULT,
            happiness: STAT_DEFAULT,
            energy: STAT_DEFAULT,
        }
    }
}

impl Stats {
    pub fn new(hunger: u8, happiness: u8, energy: u8) -> Self {
        Stats {
            hunger,
            happiness,
            energy,
        }
    }

    fn validate(&self, errors: &mut Vec<FieldError>) {
        for (field, value) in [
            ("stats.hunger", self.hunger),
            ("stats.happiness", self.happiness),
            ("stats.energy", self.energy),
        ] {
            if value > STAT_MAX {
                errors.push(FieldError::new(
                    field,
                    format!("Must be between {} and {}, got {}", STAT_MIN, STAT_MAX, value),
                ));
            }
        }
    }
}

/// Partial stats as submitted by a caller; values are range-checked before use
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsPatch {
    pub hunger: Option<i64>,
    pub happiness: Option<i64>,
    pub energy: Option<i64>,
}

impl StatsPatch {
    fn merge_into(&self, base: Stats, errors: &mut Vec<FieldError>) -> Stats {
        let mut merged = base;
        if let Some(v) = self.hunger {
            merged.hunger = check_stat("stats.hunger", v, errors).unwrap_or(base.hunger);
        }
        if let Some(v) = self.happiness {
            merged.happiness = check_stat("stats.happiness", v, errors).unwrap_or(base.happiness);
        }
        if let Some(v) = self.energy {
            merged.energy = check_stat("stats.energy", v, errors).unwrap_or(base.energy);
        }
        merged
    }
}

fn check_stat(field: &str, value: i64, errors: &mut Vec<FieldError>) -> Option<u8> {
    if (STAT_MIN as i64..=STAT_MAX as i64).contains(&value) {
        Some(value as u8)
    } else {
        errors.push(FieldError::new(
            field,
            format!("Must be between {} and {}, got {}", STAT_MIN, STAT_MAX, value),
        ));
        None
    }
}

// ============================================================================
// PET ENTITY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pet {
    /// Stable identity (UUID) - NEVER changes
    pub id: String,
    pub name: String,
    pub species: Species,
    pub rarity: Rarity,
    pub traits: Vec<PetTrait>,
    pub stats: Stats,
    pub color: String,
    pub birth_date: DateTime<Utc>,
    /// None = public pet
    pub owner: Option<String>,
    pub created_by: CreatedBy,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Write counter, bumped by the store on every mutation
    pub version: i64,
}

impl Pet {
    /// Create a new pet from a validated draft
    pub fn new(draft: PetDraft, owner: Option<String>, created_by: CreatedBy) -> Self {
        let now = Utc::now();

        Pet {
            id: uuid::Uuid::new_v4().to_string(),
            name: draft.name,
            species: draft.species,
            rarity: draft.rarity,
            traits: draft.traits,
            stats: draft.stats,
            color: draft.color,
            birth_date: now,
            owner,
            created_by,
            created_at: now,
            updated_at: now,
            version: 1,
        }
    }

    pub fn is_public(&self) -> bool {
        self.owner.is_none()
    }

    pub fn is_owned_by(&self, user_id: &str) -> bool {
        self.owner.as_deref() == Some(user_id)
    }

    pub fn image_url(&self) -> String {
        self.species.image_url()
    }

    pub fn rarity_color(&self) -> &'static str {
        self.rarity.color()
    }

    pub fn description(&self) -> &'static str {
        self.species.description()
    }

    /// Re-check every field constraint; run by the store before each write
    pub fn validate(&self) -> Result<(), Vec<FieldError>> {
        let mut errors = Vec::new();

        if self.id.is_empty() {
            errors.push(FieldError::new("id", "Required field is empty"));
        }

        match normalize_name(&self.name) {
            Ok(trimmed) if trimmed != self.name => {
                errors.push(FieldError::new("name", "Surrounding whitespace not trimmed"));
            }
            Ok(_) => {}
            Err(e) => errors.push(e),
        }

        for (i, t) in self.traits.iter().enumerate() {
            if self.traits[..i].contains(t) {
                errors.push(FieldError::new(
                    "traits",
                    format!("Duplicate trait '{}'", t.as_str()),
                ));
            }
        }

        self.stats.validate(&mut errors);

        if let Err(e) = check_color(&self.color) {
            errors.push(e);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

// ============================================================================
// INPUT PAYLOADS
// ============================================================================

/// Traits may arrive as a single string (single checkbox) or a list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    pub fn into_vec(self) -> Vec<String> {
        match self {
            OneOrMany::One(s) if s.is_empty() => Vec::new(),
            OneOrMany::One(s) => vec![s],
            OneOrMany::Many(v) => v,
        }
    }
}

/// Raw adoption payload (web form or API body)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AdoptRequest {
    pub name: Option<String>,
    pub species: Option<String>,
    pub rarity: Option<String>,
    pub traits: Option<OneOrMany>,
    pub stats: Option<StatsPatch>,
    pub color: Option<String>,
}

impl AdoptRequest {
    pub fn new(name: &str, species: &str) -> Self {
        AdoptRequest {
            name: Some(name.to_string()),
            species: Some(species.to_string()),
            ..Default::default()
        }
    }

    /// Parse into a draft. Initial stats are only honored when `allow_stats`
    /// is set (API adoption); the web path always starts at the defaults.
    pub fn into_draft(self, allow_stats: bool) -> Result<PetDraft, Vec<FieldError>> {
        let mut errors = Vec::new();

        let name = match self.name.as_deref() {
            Some(raw) => normalize_name(raw).map_err(|e| errors.push(e)).ok(),
            None => {
                errors.push(FieldError::new("name", "Required field is missing"));
                None
            }
        };

        let species = match self.species.as_deref() {
            Some(raw) => parse_species(raw).map_err(|e| errors.push(e)).ok(),
            None => {
                errors.push(FieldError::new("species", "Required field is missing"));
                None
            }
        };

        let rarity = match self.rarity.as_deref().filter(|r| !r.is_empty()) {
            Some(raw) => parse_rarity(raw).map_err(|e| errors.push(e)).unwrap_or_default(),
            None => Rarity::default(),
        };

        let traits = self
            .traits
            .map(|t| parse_traits(t.into_vec(), &mut errors))
            .unwrap_or_default();

        let stats = match self.stats {
            Some(patch) if allow_stats => patch.merge_into(Stats::default(), &mut errors),
            _ => Stats::default(),
        };

        let color = match self.color.as_deref().filter(|c| !c.is_empty()) {
            Some(raw) => match check_color(raw) {
                Ok(()) => raw.to_string(),
                Err(e) => {
                    errors.push(e);
                    DEFAULT_COLOR.to_string()
                }
            },
            None => DEFAULT_COLOR.to_string(),
        };

        match (name, species) {
            (Some(name), Some(species)) if errors.is_empty() => Ok(PetDraft {
                name,
                species,
                rarity,
                traits,
                stats,
                color,
            }),
            _ => Err(errors),
        }
    }
}

/// Validated, typed creation data
#[derive(Debug, Clone, PartialEq)]
pub struct PetDraft {
    pub name: String,
    pub species: Species,
    pub rarity: Rarity,
    pub traits: Vec<PetTrait>,
    pub stats: Stats,
    pub color: String,
}

/// Partial update; absent fields are left untouched
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PetUpdate {
    pub name: Option<String>,
    pub species: Option<String>,
    pub rarity: Option<String>,
    pub traits: Option<OneOrMany>,
    pub stats: Option<StatsPatch>,
    pub color: Option<String>,
}

impl PetUpdate {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.species.is_none()
            && self.rarity.is_none()
            && self.traits.is_none()
            && self.stats.is_none()
            && self.color.is_none()
    }

    /// Names of the fields this update touches
    pub fn fields(&self) -> Vec<&'static str> {
        [
            ("name", self.name.is_some()),
            ("species", self.species.is_some()),
            ("rarity", self.rarity.is_some()),
            ("traits", self.traits.is_some()),
            ("stats", self.stats.is_some()),
            ("color", self.color.is_some()),
        ]
        .into_iter()
        .filter_map(|(field, present)| present.then_some(field))
        .collect()
    }

    /// Merge into `pet`. On error `pet` is left exactly as it was.
    pub fn apply_to(&self, pet: &mut Pet) -> Result<(), Vec<FieldError>> {
        let mut errors = Vec::new();
        let mut next = pet.clone();

        if let Some(raw) = &self.name {
            match normalize_name(raw) {
                Ok(name) => next.name = name,
                Err(e) => errors.push(e),
            }
        }
        if let Some(raw) = &self.species {
            match parse_species(raw) {
                Ok(species) => next.species = species,
                Err(e) => errors.push(e),
            }
        }
        if let Some(raw) = &self.rarity {
            match parse_rarity(raw) {
                Ok(rarity) => next.rarity = rarity,
                Err(e) => errors.push(e),
            }
        }
        if let Some(traits) = &self.traits {
            next.traits = parse_traits(traits.clone().into_vec(), &mut errors);
        }
        if let Some(patch) = &self.stats {
            next.stats = patch.merge_into(next.stats, &mut errors);
        }
        if let Some(raw) = &self.color {
            match check_color(raw) {
                Ok(()) => next.color = raw.clone(),
                Err(e) => errors.push(e),
            }
        }

        if !errors.is_empty() {
            return Err(errors);
        }
        next.validate()?;
        *pet = next;
        Ok(())
    }
}

// ============================================================================
// FILTERING
// ============================================================================

/// Listing filter, all criteria optional and combined with AND
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PetFilter {
    pub species: Option<String>,
    pub rarity: Option<String>,
    #[serde(rename = "trait")]
    pub pet_trait: Option<String>,
    pub min_happiness: Option<i64>,
    pub max_happiness: Option<i64>,
}

impl PetFilter {
    pub fn matches(&self, pet: &Pet) -> bool {
        if let Some(species) = &self.species {
            if pet.species.as_str() != species {
                return false;
            }
        }
        if let Some(rarity) = &self.rarity {
            if Rarity::parse(rarity) != Some(pet.rarity) {
                return false;
            }
        }
        if let Some(wanted) = &self.pet_trait {
            match PetTrait::parse(wanted) {
                Some(t) if pet.traits.contains(&t) => {}
                _ => return false,
            }
        }
        let happiness = pet.stats.happiness as i64;
        if self.min_happiness.is_some_and(|min| happiness < min) {
            return false;
        }
        if self.max_happiness.is_some_and(|max| happiness > max) {
            return false;
        }
        true
    }
}

// ============================================================================
// FIELD PARSERS
// ============================================================================

pub fn normalize_name(raw: &str) -> Result<String, FieldError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(FieldError::new("name", "Required field is empty"));
    }
    let len = trimmed.chars().count();
    if len > NAME_MAX_CHARS {
        return Err(FieldError::new(
            "name",
            format!("Must be at most {} characters, got {}", NAME_MAX_CHARS, len),
        ));
    }
    Ok(trimmed.to_string())
}

fn parse_species(raw: &str) -> Result<Species, FieldError> {
    Species::parse(raw)
        .ok_or_else(|| FieldError::new("species", format!("Unknown species '{}'", raw)))
}

fn parse_rarity(raw: &str) -> Result<Rarity, FieldError> {
    Rarity::parse(raw).ok_or_else(|| FieldError::new("rarity", format!("Unknown rarity '{}'", raw)))
}

/// Unknown traits are rejected; duplicates collapse to the first occurrence
fn parse_traits(raw: Vec<String>, errors: &mut Vec<FieldError>) -> Vec<PetTrait> {
    let mut traits = Vec::new();
    for value in raw {
        match PetTrait::parse(&value) {
            Some(t) if !traits.contains(&t) => traits.push(t),
            Some(_) => {}
            None => errors.push(FieldError::new("traits", format!("Unknown trait '{}'", value))),
        }
    }
    traits
}

fn check_color(raw: &str) -> Result<(), FieldError> {
    let valid = raw.len() == 7
        && raw.starts_with('#')
        && raw[1..].chars().all(|c| c.is_ascii_hexdigit());
    if valid {
        Ok(())
    } else {
        Err(FieldError::new("color", format!("Expected #rrggbb, got '{}'", raw)))
    }
}
