//! OAuth authentication module
//!
//! - [`provider`] - the external identity provider behind an async trait
//! - [`service`] - the login handshake: begin, complete, upsert the user

pub mod provider;
pub mod service;

pub use provider::{HttpIdentityProvider, IdentityProvider, ProviderConfig};
pub use service::AuthAdapter;

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Callback parameters sent back by the provider, as query or form fields
#[derive(Deserialize, Debug, Default, Clone)]
pub struct OAuthCallback {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

/// Pending login, sealed into the `oauth_state` cookie between redirect and callback
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct OAuthState {
    pub state: String,
    pub provider: String,
    pub redirect_url: Option<String>,
}

/// Where a login attempt stands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthPhase {
    Unauthenticated,
    /// Browser sent to the provider, callback not seen yet
    ProviderPending,
    /// Grant received, exchange in flight
    Verifying,
    Authenticated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthEvent {
    Redirected,
    GrantReceived,
    Verified,
    Rejected,
}

impl AuthPhase {
    /// Apply one event
    ///
    /// `Rejected` returns to `Unauthenticated` from either in-flight phase.
    ///
    /// # Errors
    ///
    /// Returns `AppError::AuthProvider` for any transition not in the login flow
    pub fn advance(self, event: AuthEvent) -> Result<Self, AppError> {
        match (self, event) {
            (Self::Unauthenticated, AuthEvent::Redirected) => Ok(Self::ProviderPending),
            (Self::ProviderPending, AuthEvent::GrantReceived) => Ok(Self::Verifying),
            (Self::Verifying, AuthEvent::Verified) => Ok(Self::Authenticated),
            (Self::ProviderPending | Self::Verifying, AuthEvent::Rejected) => {
                Ok(Self::Unauthenticated)
            }
            (phase, event) => Err(AppError::AuthProvider(format!(
                "{event:?} is not valid while {phase:?}"
            ))),
        }
    }
}
