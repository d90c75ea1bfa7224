use actix_web::{dev::Payload, FromRequest, HttpMessage, HttpRequest};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::future::{ready, Ready};
use uuid::Uuid;

use crate::error::AppError;

#[derive(Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub message: String,
}

/// Opaque session identifier carried in the `sessionId` cookie
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    #[must_use]
    pub fn new(id: String) -> Self {
        Self(id)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Identity as reported by the identity provider after a verified login
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct UserIdentity {
    pub provider_id: String,
    pub display_name: String,
    pub email: Option<String>,
}

/// Persisted user, keyed by `(provider, provider_id)`
///
/// `created_at` is written by the first login only.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct UserRecord {
    pub provider: String,
    pub provider_id: String,
    pub display_name: String,
    pub email: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_login_at: DateTime<Utc>,
}

impl UserRecord {
    #[must_use]
    pub fn identity(&self) -> UserIdentity {
        UserIdentity {
            provider_id: self.provider_id.clone(),
            display_name: self.display_name.clone(),
            email: self.email.clone(),
        }
    }
}

/// Server-side session as stored in the session store
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct SessionRecord {
    pub session_id: SessionId,
    pub identity: UserIdentity,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl SessionRecord {
    #[must_use]
    pub fn new(session_id: SessionId, identity: UserIdentity, now: DateTime<Utc>, ttl: Duration) -> Self {
        Self {
            session_id,
            identity,
            created_at: now,
            expires_at: now + ttl,
        }
    }

    /// A session stops being valid at `expires_at`, not after it
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    #[must_use]
    pub fn remaining_at(&self, now: DateTime<Utc>) -> Duration {
        self.expires_at - now
    }
}

/// A schemaless JSON document stored in a named collection
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Document {
    pub id: Uuid,
    pub collection: String,
    pub owner: String,
    pub body: Map<String, Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document {
    #[must_use]
    pub fn new(collection: &str, owner: &str, body: Map<String, Value>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            collection: collection.to_string(),
            owner: owner.to_string(),
            body,
            created_at: now,
            updated_at: now,
        }
    }
}

/// The resolved session attached to a request by the pipeline
///
/// Handlers behind a session-required route take this as an extractor.
#[derive(Clone, Debug)]
pub struct AuthenticatedUser {
    pub session: SessionRecord,
}

impl AuthenticatedUser {
    #[must_use]
    pub fn identity(&self) -> &UserIdentity {
        &self.session.identity
    }
}

impl FromRequest for AuthenticatedUser {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(
            req.extensions()
                .get::<Self>()
                .cloned()
                .ok_or(AppError::SessionNotFound),
        )
    }
}
