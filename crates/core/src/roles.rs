//! User roles, ordered by privilege.
//!
//! The string forms must match the `users.role` values allowed by
//! `20260301000001_create_users_and_groups.sql`.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

pub const ROLE_ANONYMOUS: &str = "ANONYMOUS";
pub const ROLE_GUEST: &str = "GUEST";
pub const ROLE_USER: &str = "USER";
pub const ROLE_TESTER: &str = "TESTER";
pub const ROLE_PRODUCT_OWNER: &str = "PRODUCT_OWNER";
pub const ROLE_ADMIN: &str = "ADMIN";

/// Role of a user account.
///
/// Variants are declared from least to most privileged so that the derived
/// ordering can be used for "at most guest" style checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserRole {
    Anonymous,
    Guest,
    User,
    Tester,
    ProductOwner,
    Admin,
}

impl UserRole {
    pub fn as_str(self) -> &'static str {
        match self {
            UserRole::Anonymous => ROLE_ANONYMOUS,
            UserRole::Guest => ROLE_GUEST,
            UserRole::User => ROLE_USER,
            UserRole::Tester => ROLE_TESTER,
            UserRole::ProductOwner => ROLE_PRODUCT_OWNER,
            UserRole::Admin => ROLE_ADMIN,
        }
    }

    /// `true` for accounts the garbage collector is allowed to delete.
    pub fn is_disposable(self) -> bool {
        self <= UserRole::Guest
    }
}

impl std::fmt::Display for UserRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for UserRole {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            ROLE_ANONYMOUS => Ok(UserRole::Anonymous),
            ROLE_GUEST => Ok(UserRole::Guest),
            ROLE_USER => Ok(UserRole::User),
            ROLE_TESTER => Ok(UserRole::Tester),
            ROLE_PRODUCT_OWNER => Ok(UserRole::ProductOwner),
            ROLE_ADMIN => Ok(UserRole::Admin),
            other => Err(CoreError::Validation(format!("Unknown user role: {other}"))),
        }
    }
}
