//! User model
//!
//! A user carries the list of course IDs they were granted. Whether a user
//! may open a course is decided by [`User::has_access`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Registered user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Unique identifier
    pub id: i64,
    /// Username (unique)
    pub username: String,
    /// Password hash (argon2)
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: UserRole,
    /// Courses this user was granted
    pub course_ids: Vec<i64>,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Build a user that has not been stored yet.
    ///
    /// The password must already be hashed, see `services::password::hash_password`.
    pub fn new(username: String, password_hash: String, role: UserRole) -> Self {
        Self {
            id: 0,
            username,
            password_hash,
            role,
            course_ids: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// Check if the user is an administrator
    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }

    /// A user may open a course iff they are an admin or the course was granted to them
    pub fn has_access(&self, course_id: i64) -> bool {
        self.is_admin() || self.course_ids.contains(&course_id)
    }
}

/// User role for authorization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    /// Full access, including every course
    Admin,
    /// Ordinary account
    #[default]
    User,
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserRole::Admin => write!(f, "admin"),
            UserRole::User => write!(f, "user"),
        }
    }
}

impl FromStr for UserRole {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "admin" => Ok(UserRole::Admin),
            "user" => Ok(UserRole::User),
            _ => Err(anyhow::anyhow!("Invalid user role: {}", s)),
        }
    }
}

/// Input for inserting a user
#[derive(Debug, Clone)]
pub struct CreateUserInput {
    pub username: String,
    pub password_hash: String,
    pub role: UserRole,
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_role_round_trip() {
        for role in [UserRole::Admin, UserRole::User] {
            assert_eq!(role.to_string().parse::<UserRole>().unwrap(), role);
        }
        assert_eq!("ADMIN".parse::<UserRole>().unwrap(), UserRole::Admin);
        assert!("editor".parse::<UserRole>().is_err());
    }

    #[test]
    fn test_password_hash_not_serialized() {
        let user = User::new("a".into(), "secret-hash".into(), UserRole::User);
        let json = serde_json::to_string(&user).unwrap();
        assert!(!json.contains("secret-hash"));
        assert!(json.contains("\"role\":\"user\""));
    }

    #[test]
    fn test_admin_has_access_without_grants() {
        let admin = User::new("root".into(), "h".into(), UserRole::Admin);
        assert!(admin.course_ids.is_empty());
        assert!(admin.has_access(42));
    }

    proptest! {
        #[test]
        fn access_iff_admin_or_granted(
            grants in proptest::collection::vec(1i64..50, 0..10),
            course_id in 1i64..50,
            admin in any::<bool>(),
        ) {
            let role = if admin { UserRole::Admin } else { UserRole::User };
            let mut user = User::new("u".into(), "h".into(), role);
            user.course_ids = grants.clone();

            prop_assert_eq!(user.has_access(course_id), admin || grants.contains(&course_id));
        }
    }
}
