//! Session Management Module
//!
//! # Modules
//!
//! - [`manager`] - Session lifecycle backed by the session store
//! - [`cookie`] - Cookie construction for session, CSRF and OAuth state

pub mod cookie;
pub mod manager;

pub use cookie::{CookieFactory, CookieOptions, CSRF_COOKIE, OAUTH_STATE_COOKIE, SESSION_COOKIE};
pub use manager::SessionManager;
