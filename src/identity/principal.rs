use serde::{Deserialize, Serialize};

use crate::storage::User;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    #[default]
    User,
    Administrator,
}

/// Capabilities derived from role plus the confirmation flag. Unconfirmed
/// accounts hold no capabilities at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    Follow,
    Comment,
    Write,
    Moderate,
    Admin,
}

/// An authenticated identity as seen by the auth gate. Read-only: created by
/// account registration, never mutated through the gate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub user_id: u64,
    pub email: String,
    pub username: String,
    pub confirmed: bool,
    pub role: Role,
}

impl Principal {
    pub fn from_user(user: &User) -> Self {
        Self {
            user_id: user.id,
            email: user.email.clone(),
            username: user.username.clone(),
            confirmed: user.confirmed,
            role: user.role,
        }
    }

    pub fn is_administrator(&self) -> bool {
        self.role == Role::Administrator
    }

    pub fn capabilities(&self) -> Vec<Capability> {
        if !self.confirmed {
            return Vec::new();
        }
        let mut caps = vec![Capability::Follow, Capability::Comment, Capability::Write];
        if self.is_administrator() {
            caps.push(Capability::Moderate);
            caps.push(Capability::Admin);
        }
        caps
    }

    pub fn can(&self, cap: Capability) -> bool {
        self.capabilities().contains(&cap)
    }
}
