use serde::Serialize;
use thiserror::Error;

/// A single field-level validation failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: &str, message: impl Into<String>) -> Self {
        FieldError {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for FieldError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

#[derive(Error, Debug)]
pub enum PetError {
    #[error("Validation failed: {}", join_fields(.0))]
    Validation(Vec<FieldError>),

    #[error("{0} not found")]
    NotFound(String),

    #[error("Caller identity missing or unknown")]
    Unauthenticated,

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl PetError {
    pub fn pet_not_found() -> Self {
        PetError::NotFound("Pet".to_string())
    }

    /// Store or serialization failure, as opposed to a caller mistake
    pub fn is_persistence(&self) -> bool {
        matches!(
            self,
            PetError::Database(_) | PetError::Serialization(_) | PetError::Unavailable(_)
        )
    }

    pub fn field_errors(&self) -> &[FieldError] {
        match self {
            PetError::Validation(errors) => errors,
            _ => &[],
        }
    }
}

impl From<Vec<FieldError>> for PetError {
    fn from(errors: Vec<FieldError>) -> Self {
        PetError::Validation(errors)
    }
}

fn join_fields(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

pub type Result<T> = std::result::Result<T, PetError>;
