//! User records as seen by the checkout workflows.

use chrono::{DateTime, Utc};
use common::UserId;
use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::value_objects::Availability;

/// Role granted to a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    #[default]
    User,
    Admin,
}

impl Role {
    /// Returns the storage name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "USER",
            Role::Admin => "ADMIN",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "USER" => Ok(Role::User),
            "ADMIN" => Ok(Role::Admin),
            other => Err(DomainError::UnknownVariant {
                kind: "role",
                value: other.to_string(),
            }),
        }
    }
}

/// A registered user. Owned by the user directory, only read here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub email: String,
    /// Credential hash produced by the auth collaborator.
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: Role,
    pub availability: Availability,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Creates an active user with the `User` role.
    pub fn new(
        username: impl Into<String>,
        email: impl Into<String>,
        password_hash: impl Into<String>,
    ) -> Self {
        Self {
            id: UserId::new(),
            username: username.into(),
            email: email.into(),
            password_hash: password_hash.into(),
            role: Role::User,
            availability: Availability::Active,
            created_at: Utc::now(),
        }
    }

    /// Returns the same user with the given role.
    pub fn with_role(mut self, role: Role) -> Self {
        self.role = role;
        self
    }

    pub fn is_active(&self) -> bool {
        self.availability.is_active()
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}
