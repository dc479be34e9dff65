use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use super::codec::Credential;

/// Stable user identifier. Servers send it as either a string or a number.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for UserId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawId {
            Text(String),
            Number(i64),
        }

        Ok(match RawId::deserialize(deserializer)? {
            RawId::Text(s) => UserId(s),
            RawId::Number(n) => UserId(n.to_string()),
        })
    }
}

/// The authenticated user record.
///
/// Only `id` and `role` mean anything to the session layer. The rest of the
/// record is kept verbatim so it round-trips through storage untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    #[serde(alias = "_id")]
    pub id: UserId,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl User {
    /// Case-insensitive role comparison
    pub fn has_role(&self, role: &str) -> bool {
        self.role
            .as_deref()
            .map(|r| r.eq_ignore_ascii_case(role))
            .unwrap_or(false)
    }

    /// Name to show in the UI, falling back to email, then id
    pub fn display_name(&self) -> String {
        self.name
            .clone()
            .filter(|n| !n.is_empty())
            .or_else(|| self.email.clone())
            .unwrap_or_else(|| self.id.to_string())
    }
}

/// A live session: who is signed in, with which credential, until when.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub user: User,
    pub credential: Credential,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    pub fn time_until_expiry(&self, now: DateTime<Utc>) -> chrono::Duration {
        self.expires_at - now
    }
}
