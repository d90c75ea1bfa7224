//! Anti-forgery tokens bound to a session
//!
//! A token is `base64url(salt || HMAC-SHA256(key, "csrf" || session_id || salt))`.
//! Every issuance uses a fresh salt, and any token issued for a session keeps
//! verifying for that session only, so several tabs can hold different tokens.

use actix_web::dev::{Payload, ServiceRequest};
use actix_web::http::{header, Method};
use actix_web::web::Bytes;
use base64::{engine::general_purpose, Engine as _};

use crate::error::{AppError, AppResult};
use crate::models::SessionId;
use crate::utils::crypto::{hmac_sign, hmac_verify, random_bytes, KEY_SIZE};

const SALT_SIZE: usize = 16;
const TAG_SIZE: usize = 32;
const DOMAIN: &[u8] = b"csrf";

/// Header names checked in order for a presented token
pub const CSRF_HEADERS: [&str; 4] = ["x-csrf-token", "csrf-token", "x-xsrf-token", "xsrf-token"];

/// Query parameter and form field carrying a presented token
pub const CSRF_FIELD: &str = "_csrf";

/// Methods that change state and therefore need a token
#[must_use]
pub fn is_mutating(method: &Method) -> bool {
    matches!(
        *method,
        Method::POST | Method::PUT | Method::PATCH | Method::DELETE
    )
}

#[derive(Clone)]
pub struct CsrfGuard {
    key: [u8; KEY_SIZE],
}

impl CsrfGuard {
    #[must_use]
    pub fn new(key: [u8; KEY_SIZE]) -> Self {
        Self { key }
    }

    /// Fresh token bound to `session_id`
    ///
    /// # Errors
    ///
    /// Returns `AppError::Internal` if the MAC cannot be computed
    pub fn issue_token(&self, session_id: &SessionId) -> AppResult<String> {
        let salt = random_bytes(SALT_SIZE);
        let tag = hmac_sign(&self.key, &[DOMAIN, session_id.as_str().as_bytes(), &salt])
            .map_err(|e| AppError::Internal(e.to_string()))?;

        let mut token = salt;
        token.extend_from_slice(&tag);
        Ok(general_purpose::URL_SAFE_NO_PAD.encode(token))
    }

    /// Constant-time check of a token against a session
    #[must_use]
    pub fn verify(&self, session_id: &SessionId, token: &str) -> bool {
        let Ok(raw) = general_purpose::URL_SAFE_NO_PAD.decode(token.trim()) else {
            return false;
        };
        if raw.len() != SALT_SIZE + TAG_SIZE {
            return false;
        }
        let (salt, tag) = raw.split_at(SALT_SIZE);
        hmac_verify(&self.key, &[DOMAIN, session_id.as_str().as_bytes(), salt], tag)
    }

    /// Check a request against its session
    ///
    /// Safe methods pass through. For mutating methods the presented token
    /// must verify against `session_id`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::CsrfMismatch` if the token is missing or does not verify
    pub async fn validate(&self, req: &mut ServiceRequest, session_id: &SessionId) -> AppResult<()> {
        if !is_mutating(req.method()) {
            return Ok(());
        }

        match presented_token(req).await {
            Some(token) if self.verify(session_id, &token) => {
                log::debug!("CSRF token verified for {} {}", req.method(), req.path());
                Ok(())
            }
            Some(token) => {
                log::warn!(
                    "CSRF token mismatch on {} {} (presented length {})",
                    req.method(),
                    req.path(),
                    token.len()
                );
                Err(AppError::CsrfMismatch)
            }
            None => {
                log::warn!("CSRF token missing on {} {}", req.method(), req.path());
                Err(AppError::CsrfMismatch)
            }
        }
    }
}

/// Token presented with the request: headers first, then `?_csrf=`, then a
/// urlencoded `_csrf` form field
///
/// Reading the form body consumes the payload, so it is put back for the handler.
pub async fn presented_token(req: &mut ServiceRequest) -> Option<String> {
    let from_header = CSRF_HEADERS.iter().find_map(|name| {
        req.headers()
            .get(*name)
            .and_then(|value| value.to_str().ok())
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    });
    if from_header.is_some() {
        return from_header;
    }

    if let Some(token) = field_from_urlencoded(req.query_string().as_bytes()) {
        return Some(token);
    }

    if !is_form_urlencoded(req) {
        return None;
    }

    let body = match req.extract::<Bytes>().await {
        Ok(body) => body,
        Err(e) => {
            log::debug!("Could not read form body for CSRF check: {e}");
            return None;
        }
    };
    let token = field_from_urlencoded(&body);
    req.set_payload(Payload::from(body));
    token
}

fn is_form_urlencoded(req: &ServiceRequest) -> bool {
    req.headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("application/x-www-form-urlencoded"))
}

fn field_from_urlencoded(input: &[u8]) -> Option<String> {
    url::form_urlencoded::parse(input)
        .find(|(key, value)| key == CSRF_FIELD && !value.is_empty())
        .map(|(_, value)| value.into_owned())
}
