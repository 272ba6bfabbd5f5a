use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

/// A stored account. `password` always holds an adaptive hash, never plaintext.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    pub picture: String,
    pub active: bool,
    pub deleted: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Output of a password hasher. Only hashes can reach the user store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswordHash(String);

impl PasswordHash {
    /// Wraps a string that is already a hash (for example one read back from storage).
    pub fn from_hashed(hash: String) -> Self {
        Self(hash)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Registration input as received from a client, password still in plaintext.
#[derive(Debug, Clone, Deserialize)]
pub struct Registration {
    pub username: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub picture: String,
}

/// A user ready to be inserted.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password: PasswordHash,
    pub first_name: String,
    pub last_name: String,
    pub picture: String,
}

impl NewUser {
    pub fn from_registration(registration: Registration, password: PasswordHash) -> Self {
        Self {
            username: registration.username,
            email: registration.email,
            password,
            first_name: registration.first_name,
            last_name: registration.last_name,
            picture: registration.picture,
        }
    }
}

/// Partial update. `None` and empty-string fields are left untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserPatch {
    pub username: Option<String>,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub picture: Option<String>,
}

impl UserPatch {
    /// Turns empty-string fields into `None`.
    pub fn normalized(self) -> Self {
        fn keep(value: Option<String>) -> Option<String> {
            value.filter(|v| !v.is_empty())
        }

        Self {
            username: keep(self.username),
            email: keep(self.email),
            first_name: keep(self.first_name),
            last_name: keep(self.last_name),
            picture: keep(self.picture),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserFilter {
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub active: Option<bool>,
    pub deleted: Option<bool>,
    /// Inclusive creation window, applied only when start < end.
    pub created_between: Option<(DateTime<Utc>, DateTime<Utc>)>,
}

impl UserFilter {
    /// In-process equivalent of the SQL predicate built by the Postgres store.
    pub fn matches(&self, user: &User) -> bool {
        if let Some(email) = &self.email {
            if &user.email != email {
                return false;
            }
        }
        if let Some(first_name) = &self.first_name {
            if &user.first_name != first_name {
                return false;
            }
        }
        if let Some(last_name) = &self.last_name {
            if &user.last_name != last_name {
                return false;
            }
        }
        if self.active.map_or(false, |active| user.active != active) {
            return false;
        }
        if self.deleted.map_or(false, |deleted| user.deleted != deleted) {
            return false;
        }
        match self.created_between {
            Some((start, end)) if start < end => user.created_at >= start && user.created_at <= end,
            _ => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn user() -> User {
        let now = Utc::now();
        User {
            id: Uuid::new_v4(),
            username: "alice".to_string(),
            email: "alice@example.com".to_string(),
            password: "$2b$04$hash".to_string(),
            first_name: "Alice".to_string(),
            last_name: "Liddell".to_string(),
            picture: String::new(),
            active: true,
            deleted: false,
            deleted_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_empty_filter_matches_everything() {
        assert!(UserFilter::default().matches(&user()));
    }

    #[test]
    fn test_filter_on_fields() {
        let user = user();
        let filter = UserFilter {
            email: Some("alice@example.com".to_string()),
            active: Some(true),
            ..Default::default()
        };
        assert!(filter.matches(&user));

        let filter = UserFilter {
            deleted: Some(true),
            ..Default::default()
        };
        assert!(!filter.matches(&user));
    }

    #[test]
    fn test_created_between_ignored_when_inverted() {
        let user = user();
        let before = user.created_at - Duration::hours(2);
        let after = user.created_at - Duration::hours(1);

        let filter = UserFilter {
            created_between: Some((before, after)),
            ..Default::default()
        };
        assert!(!filter.matches(&user));

        let filter = UserFilter {
            created_between: Some((after, before)),
            ..Default::default()
        };
        assert!(filter.matches(&user));
    }

    #[test]
    fn test_patch_normalization_drops_empty_strings() {
        let patch = UserPatch {
            first_name: Some(String::new()),
            picture: Some("https://example.com/a.png".to_string()),
            ..Default::default()
        }
        .normalized();

        assert_eq!(patch.first_name, None);
        assert_eq!(patch.picture.as_deref(), Some("https://example.com/a.png"));
        assert_eq!(patch.username, None);
    }
}
