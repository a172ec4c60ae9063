//! Credential store and advisor directory
//!
//! Both collaborators live outside the workflow engine. The engine only sees
//! the traits; `StaticDirectory` is a TOML-backed implementation used by the
//! binary and by tests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;
use tokio::sync::RwLock;

#[cfg(any(test, feature = "testing"))]
use mockall::automock;

use crate::achievements::{Caller, Role, UserId};

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error("Directory unavailable: {0}")]
    Unavailable(String),
    #[error("Failed to load directory: {0}")]
    Load(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Authenticates a caller and yields identity plus role.
#[cfg_attr(any(test, feature = "testing"), automock)]
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn authenticate(&self, username: &str, password: &str) -> Result<Caller, DirectoryError>;
}

/// Maps a student identity to the identity of the supervising advisor.
///
/// Identities here are raw user ids, the same space as `Caller::identity`.
#[cfg_attr(any(test, feature = "testing"), automock)]
#[async_trait]
pub trait AdvisorDirectory: Send + Sync {
    async fn assigned_advisor(&self, student: &UserId) -> Result<Option<UserId>, DirectoryError>;

    async fn advisees(&self, advisor: &UserId) -> Result<Vec<UserId>, DirectoryError>;
}

/// Hex SHA-256 digest used for stored passwords.
pub fn password_digest(password: &str) -> String {
    format!("{:x}", Sha256::digest(password.as_bytes()))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryUser {
    pub username: String,
    pub password_sha256: String,
    pub identity: UserId,
    pub role: Role,
    /// Assigned advisor; only meaningful for students.
    #[serde(default)]
    pub advisor: Option<UserId>,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct DirectoryFile {
    #[serde(default)]
    users: Vec<DirectoryUser>,
}

#[derive(Debug, Default)]
pub struct StaticDirectory {
    users: HashMap<String, DirectoryUser>,
    // student -> advisor, in insertion order for stable advisee listings
    assignments: RwLock<Vec<(UserId, UserId)>>,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a directory file:
    ///
    /// ```toml
    /// [[users]]
    /// username = "s1"
    /// password_sha256 = "..."
    /// identity = "student-1"
    /// role = "student"
    /// advisor = "advisor-1"
    /// ```
    pub fn from_toml_str(source: &str) -> Result<Self, DirectoryError> {
        let file: DirectoryFile =
            toml::from_str(source).map_err(|e| DirectoryError::Load(e.to_string()))?;

        let mut directory = Self::new();
        for user in file.users {
            directory = directory.with_directory_user(user);
        }
        Ok(directory)
    }

    pub async fn load(path: impl AsRef<Path>) -> Result<Self, DirectoryError> {
        let source = tokio::fs::read_to_string(path).await?;
        Self::from_toml_str(&source)
    }

    pub fn with_user(self, username: &str, password: &str, identity: &str, role: Role) -> Self {
        self.with_directory_user(DirectoryUser {
            username: username.to_string(),
            password_sha256: password_digest(password),
            identity: UserId::from(identity),
            role,
            advisor: None,
            active: true,
        })
    }

    pub fn with_advisor(mut self, student: &str, advisor: &str) -> Self {
        set_assignment(
            self.assignments.get_mut(),
            UserId::from(student),
            UserId::from(advisor),
        );
        self
    }

    fn with_directory_user(mut self, user: DirectoryUser) -> Self {
        if let Some(advisor) = &user.advisor {
            set_assignment(
                self.assignments.get_mut(),
                user.identity.clone(),
                advisor.clone(),
            );
        }
        self.users.insert(user.username.clone(), user);
        self
    }

    /// Reassign a student at runtime; guards see the change on their next check.
    pub async fn assign_advisor(&self, student: UserId, advisor: UserId) {
        set_assignment(&mut *self.assignments.write().await, student, advisor);
    }

    pub async fn unassign(&self, student: &UserId) {
        self.assignments
            .write()
            .await
            .retain(|(assigned, _)| assigned != student);
    }
}

fn set_assignment(assignments: &mut Vec<(UserId, UserId)>, student: UserId, advisor: UserId) {
    match assignments.iter_mut().find(|(s, _)| *s == student) {
        Some(entry) => entry.1 = advisor,
        None => assignments.push((student, advisor)),
    }
}

#[async_trait]
impl CredentialStore for StaticDirectory {
    async fn authenticate(&self, username: &str, password: &str) -> Result<Caller, DirectoryError> {
        let user = self
            .users
            .get(username)
            .ok_or(DirectoryError::InvalidCredentials)?;

        if !user.active || user.password_sha256 != password_digest(password) {
            return Err(DirectoryError::InvalidCredentials);
        }

        Ok(Caller {
            identity: user.identity.clone(),
            role: user.role,
        })
    }
}

#[async_trait]
impl AdvisorDirectory for StaticDirectory {
    async fn assigned_advisor(&self, student: &UserId) -> Result<Option<UserId>, DirectoryError> {
        Ok(self
            .assignments
            .read()
            .await
            .iter()
            .find(|(s, _)| s == student)
            .map(|(_, advisor)| advisor.clone()))
    }

    async fn advisees(&self, advisor: &UserId) -> Result<Vec<UserId>, DirectoryError> {
        Ok(self
            .assignments
            .read()
            .await
            .iter()
            .filter(|(_, a)| a == advisor)
            .map(|(student, _)| student.clone())
            .collect())
    }
}
