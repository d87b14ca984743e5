// 👤 Users - identity collaborators
//
// Password checks and cookie sessions live outside this crate. The core only
// needs two capabilities: resolve a username to an identity, and resolve the
// current caller's credential to an identity. Both are injected traits.

use crate::error::{FieldError, PetError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub const USERNAME_MAX_CHARS: usize = 30;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn new(username: String, email: Option<String>) -> Self {
        User {
            id: uuid::Uuid::new_v4().to_string(),
            username,
            email,
            created_at: Utc::now(),
        }
    }
}

/// Lookup and registration of user identities
pub trait UserDirectory: Send + Sync {
    fn register(&self, user: &User) -> Result<()>;
    fn find_user(&self, id: &str) -> Result<Option<User>>;
    fn resolve_username(&self, username: &str) -> Result<Option<User>>;
}

/// Resolves the credential presented with a request to the calling user
pub trait SessionResolver: Send + Sync {
    fn current_user(&self, credential: &str) -> Result<Option<User>>;
}

/// Treats the credential as a user id and confirms it against the directory
pub struct DirectorySessions {
    directory: Arc<dyn UserDirectory>,
}

impl DirectorySessions {
    pub fn new(directory: Arc<dyn UserDirectory>) -> Self {
        DirectorySessions { directory }
    }
}

impl SessionResolver for DirectorySessions {
    fn current_user(&self, credential: &str) -> Result<Option<User>> {
        let credential = credential.trim();
        if credential.is_empty() {
            return Ok(None);
        }
        self.directory.find_user(credential)
    }
}

/// Validate registration input, returning the trimmed username and email
pub fn validate_registration(
    username: &str,
    email: Option<&str>,
) -> std::result::Result<(String, Option<String>), Vec<FieldError>> {
    let mut errors = Vec::new();

    let username = username.trim();
    if username.is_empty() {
        errors.push(FieldError::new("username", "Required field is empty"));
    } else if username.chars().count() > USERNAME_MAX_CHARS {
        errors.push(FieldError::new(
            "username",
            format!("Must be at most {} characters", USERNAME_MAX_CHARS),
        ));
    } else if username.chars().any(char::is_whitespace) {
        errors.push(FieldError::new("username", "Must not contain whitespace"));
    }

    let email = email.map(str::trim).filter(|e| !e.is_empty());
    if let Some(email) = email {
        let well_formed = email
            .split_once('@')
            .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'));
        if !well_formed {
            errors.push(FieldError::new("email", format!("Invalid email '{}'", email)));
        }
    }

    if errors.is_empty() {
        Ok((username.to_string(), email.map(str::to_string)))
    } else {
        Err(errors)
    }
}

/// Register a new directory entry after validating it
pub fn register_user(
    directory: &dyn UserDirectory,
    username: &str,
    email: Option<&str>,
) -> Result<User> {
    let (username, email) = validate_registration(username, email).map_err(PetError::Validation)?;
    let user = User::new(username, email);
    directory.register(&user)?;
    tracing::info!(user_id = %user.id, username = %user.username, "registered user");
    Ok(user)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MemoryDirectory {
        users: Mutex<Vec<User>>,
    }

    impl UserDirectory for MemoryDirectory {
        fn register(&self, user: &User) -> Result<()> {
            let mut users = self.users.lock().unwrap();
            if users.iter().any(|u| u.username == user.username) {
                return Err(PetError::Conflict(format!("username '{}'", user.username)));
            }
            users.push(user.clone());
            Ok(())
        }

        fn find_user(&self, id: &str) -> Result<Option<User>> {
            Ok(self.users.lock().unwrap().iter().find(|u| u.id == id).cloned())
        }

        fn resolve_username(&self, username: &str) -> Result<Option<User>> {
            Ok(self
                .users
                .lock()
                .unwrap()
                .iter()
                .find(|u| u.username == username)
                .cloned())
        }
    }

    #[test]
    fn test_registration_validation() {
        assert_eq!(
            validate_registration("  alice ", Some("alice@example.com")).unwrap(),
            ("alice".to_string(), Some("alice@example.com".to_string()))
        );
        assert_eq!(validate_registration("bob", Some("  ")).unwrap().1, None);

        let errors = validate_registration("", Some("nope")).unwrap_err();
        let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, vec!["username", "email"]);

        assert!(validate_registration("two words", None).is_err());
        assert!(validate_registration(&"x".repeat(31), None).is_err());
    }

    #[test]
    fn test_register_and_resolve() {
        let directory = MemoryDirectory::default();
        let alice = register_user(&directory, "alice", None).unwrap();

        let found = directory.resolve_username("alice").unwrap().unwrap();
        assert_eq!(found.id, alice.id);
        assert!(directory.resolve_username("ghost").unwrap().is_none());

        let err = register_user(&directory, "alice", None).unwrap_err();
        assert!(matches!(err, PetError::Conflict(_)));
    }

    #[test]
    fn test_directory_sessions_resolve_known_ids_only() {
        let directory = Arc::new(MemoryDirectory::default());
        let alice = register_user(directory.as_ref(), "alice", None).unwrap();
        let sessions = DirectorySessions::new(directory);

        assert_eq!(sessions.current_user(&alice.id).unwrap().unwrap().username, "alice");
        assert!(sessions.current_user("not-a-user").unwrap().is_none());
        assert!(sessions.current_user("   ").unwrap().is_none());
    }
}
