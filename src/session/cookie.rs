use actix_web::cookie::{time::OffsetDateTime, Cookie, SameSite};
use actix_web::HttpRequest;
use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::oauth::OAuthState;
use crate::utils::crypto::{decrypt_data, encrypt_data, KEY_SIZE};

/// Cookie names used across the application
pub const SESSION_COOKIE: &str = "sessionId";
pub const CSRF_COOKIE: &str = "csrfToken";
pub const OAUTH_STATE_COOKIE: &str = "oauth_state";

/// Lifetime of the state cookie between `/auth/login` and `/auth/callback`
pub const OAUTH_STATE_MINUTES: i64 = 10;

/// Options for cookie creation
pub struct CookieOptions {
    pub http_only: bool,
    pub same_site: SameSite,
    pub path: String,
    pub expires: Option<DateTime<Utc>>,
    pub max_age: Option<actix_web::cookie::time::Duration>,
}

impl Default for CookieOptions {
    fn default() -> Self {
        Self {
            http_only: true,
            same_site: SameSite::Lax,
            path: "/".to_string(),
            expires: None,
            max_age: None,
        }
    }
}

/// Builds every cookie the server sets, so flags stay consistent
#[derive(Clone)]
pub struct CookieFactory {
    state_key: [u8; KEY_SIZE],
    cookie_secure: bool,
}

impl CookieFactory {
    #[must_use]
    pub fn new(state_key: [u8; KEY_SIZE], cookie_secure: bool) -> Self {
        Self {
            state_key,
            cookie_secure,
        }
    }

    /// Generic cookie with a plain value
    #[must_use]
    pub fn create_cookie(&self, name: &str, value: String, options: CookieOptions) -> Cookie<'static> {
        let mut cookie = Cookie::build(name.to_owned(), value)
            .http_only(options.http_only)
            .secure(self.cookie_secure)
            .same_site(options.same_site)
            .path(options.path)
            .finish();

        if let Some(expires) = options.expires.and_then(to_offset_datetime) {
            cookie.set_expires(expires);
        }
        if let Some(max_age) = options.max_age {
            cookie.set_max_age(max_age);
        }
        cookie
    }

    /// `sessionId` cookie expiring together with the session
    #[must_use]
    pub fn create_session_cookie(&self, session_id: &str, expires_at: DateTime<Utc>) -> Cookie<'static> {
        self.create_cookie(
            SESSION_COOKIE,
            session_id.to_string(),
            CookieOptions {
                expires: Some(expires_at),
                ..Default::default()
            },
        )
    }

    /// `csrfToken` cookie; readable by page scripts so they can echo it back
    #[must_use]
    pub fn create_csrf_cookie(&self, token: &str, expires_at: DateTime<Utc>) -> Cookie<'static> {
        self.create_cookie(
            CSRF_COOKIE,
            token.to_string(),
            CookieOptions {
                http_only: false,
                expires: Some(expires_at),
                ..Default::default()
            },
        )
    }

    /// Encrypted, short-lived cookie carrying the pending OAuth state
    ///
    /// # Errors
    ///
    /// Returns an error if encryption fails
    pub fn create_state_cookie(&self, oauth_state: &OAuthState) -> Result<Cookie<'static>> {
        let sealed = encrypt_data(oauth_state, &self.state_key)?;
        log::debug!(
            "Creating OAuth state cookie: secure={}, encrypted_len={}",
            self.cookie_secure,
            sealed.len()
        );
        Ok(self.create_cookie(
            OAUTH_STATE_COOKIE,
            sealed,
            CookieOptions {
                max_age: Some(actix_web::cookie::time::Duration::minutes(OAUTH_STATE_MINUTES)),
                ..Default::default()
            },
        ))
    }

    /// Pending OAuth state from the request, if present and intact
    #[must_use]
    pub fn get_state_from_request(&self, req: &HttpRequest) -> Option<OAuthState> {
        let cookie = req.cookie(OAUTH_STATE_COOKIE)?;
        match decrypt_data::<OAuthState>(cookie.value(), &self.state_key) {
            Ok(state) => Some(state),
            Err(e) => {
                log::warn!("Failed to decrypt OAuth state cookie: {e}");
                None
            }
        }
    }

    /// Expired cookie that makes the browser drop `name`
    #[must_use]
    pub fn create_expired_cookie(&self, name: &str) -> Cookie<'static> {
        create_expired_cookie(name, self.cookie_secure)
    }
}

/// Create an expired cookie to clear a specific cookie
#[must_use]
pub fn create_expired_cookie(name: &str, secure: bool) -> Cookie<'static> {
    Cookie::build(name.to_owned(), "")
        .http_only(name != CSRF_COOKIE)
        .secure(secure)
        .same_site(SameSite::Lax)
        .path("/")
        .max_age(actix_web::cookie::time::Duration::seconds(-1))
        .finish()
}

fn to_offset_datetime(at: DateTime<Utc>) -> Option<OffsetDateTime> {
    OffsetDateTime::from_unix_timestamp(at.timestamp()).ok()
}
