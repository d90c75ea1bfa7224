//! Login handshake with the identity provider
//!
//! The adapter knows nothing about sessions or cookies: it produces the
//! provider redirect, and later turns a callback into a stored user.

use chrono::Utc;
use std::sync::Arc;

use crate::error::{AppError, AppResult};
use crate::models::UserRecord;
use crate::oauth::provider::IdentityProvider;
use crate::oauth::{AuthEvent, AuthPhase, OAuthCallback, OAuthState};
use crate::storage::UserStore;
use crate::utils::crypto::generate_token;
use crate::utils::redirect::validate_post_auth_redirect;

/// Bytes of randomness in the OAuth `state` parameter
const STATE_BYTES: usize = 24;

/// Result of login initiation
#[derive(Debug, Clone)]
pub struct AuthRedirect {
    pub authorization_url: String,
    pub oauth_state: OAuthState,
}

#[derive(Clone)]
pub struct AuthAdapter {
    provider: Arc<dyn IdentityProvider>,
    users: Arc<dyn UserStore>,
}

impl AuthAdapter {
    #[must_use]
    pub fn new(provider: Arc<dyn IdentityProvider>, users: Arc<dyn UserStore>) -> Self {
        Self { provider, users }
    }

    #[must_use]
    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Start a login
    ///
    /// `redirect_after` is kept only if it is a same-site relative path.
    /// No local state changes; the caller stores the returned state.
    #[must_use]
    pub fn begin_auth(&self, redirect_after: Option<&str>) -> AuthRedirect {
        let oauth_state = OAuthState {
            state: generate_token(STATE_BYTES),
            provider: self.provider.name().to_string(),
            redirect_url: redirect_after.and_then(validate_post_auth_redirect),
        };
        let authorization_url = self.provider.authorization_url(&oauth_state.state);

        log::debug!(
            "Starting {} login, state length {}",
            oauth_state.provider,
            oauth_state.state.len()
        );
        AuthRedirect {
            authorization_url,
            oauth_state,
        }
    }

    /// Finish a login from the provider callback
    ///
    /// Checks the returned `state` against the pending one, exchanges the
    /// grant and upserts the user. The user store is written exactly once on
    /// success and never on failure.
    ///
    /// # Errors
    ///
    /// Returns `AppError::AuthProvider` if there is no pending login, the
    /// state does not match, the provider reported an error, or the exchange
    /// fails. Store failures surface as `AppError::DatabaseUnavailable`.
    pub async fn complete_auth(
        &self,
        pending: Option<&OAuthState>,
        callback: &OAuthCallback,
    ) -> AppResult<UserRecord> {
        let Some(pending) = pending else {
            return Err(AppError::AuthProvider("no login in progress".to_string()));
        };
        let phase = AuthPhase::Unauthenticated.advance(AuthEvent::Redirected)?;

        match self.verify_callback(pending, callback) {
            Ok(grant) => {
                let phase = phase.advance(AuthEvent::GrantReceived)?;
                match self.provider.exchange_grant(grant).await {
                    Ok(identity) => {
                        let record = self
                            .users
                            .upsert(self.provider.name(), &identity, Utc::now())
                            .await?;
                        phase.advance(AuthEvent::Verified)?;
                        log::info!(
                            "Login completed for {} user {}",
                            record.provider,
                            record.provider_id
                        );
                        Ok(record)
                    }
                    Err(e) => {
                        phase.advance(AuthEvent::Rejected)?;
                        log::warn!("Provider rejected the grant: {e}");
                        Err(e)
                    }
                }
            }
            Err(e) => {
                phase.advance(AuthEvent::Rejected)?;
                log::warn!("OAuth callback rejected: {e}");
                Err(e)
            }
        }
    }

    fn verify_callback<'a>(
        &self,
        pending: &OAuthState,
        callback: &'a OAuthCallback,
    ) -> AppResult<&'a str> {
        if let Some(error) = &callback.error {
            return Err(AppError::AuthProvider(format!(
                "provider returned {error}: {}",
                callback.error_description.as_deref().unwrap_or("")
            )));
        }
        if pending.provider != self.provider.name() {
            return Err(AppError::AuthProvider(format!(
                "pending login is for provider {}",
                pending.provider
            )));
        }
        match callback.state.as_deref() {
            Some(received) if received == pending.state => {}
            _ => return Err(AppError::AuthProvider("state mismatch".to_string())),
        }
        callback
            .code
            .as_deref()
            .filter(|code| !code.is_empty())
            .ok_or_else(|| AppError::AuthProvider("callback carries no grant".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::MemoryUserStore;
    use crate::testing::constants::{TEST_PROVIDER, TEST_PROVIDER_ID, VALID_GRANT};
    use crate::testing::mock::{MockOAuthCallback, MockProvider};

    fn adapter() -> (AuthAdapter, Arc<MockProvider>, Arc<MemoryUserStore>) {
        let provider = Arc::new(MockProvider::default());
        let users = Arc::new(MemoryUserStore::default());
        let adapter = AuthAdapter::new(provider.clone(), users.clone());
        (adapter, provider, users)
    }

    #[test]
    fn test_begin_auth_builds_state_and_url() {
        let (adapter, provider, _) = adapter();
        let redirect = adapter.begin_auth(Some("/courses"));

        assert_eq!(redirect.oauth_state.provider, TEST_PROVIDER);
        assert_eq!(redirect.oauth_state.redirect_url.as_deref(), Some("/courses"));
        assert!(redirect
            .authorization_url
            .ends_with(&format!("state={}", redirect.oauth_state.state)));

        let other = adapter.begin_auth(Some("https://evil.test/"));
        assert_eq!(other.oauth_state.redirect_url, None);
        assert_ne!(other.oauth_state.state, redirect.oauth_state.state);
        assert_eq!(provider.exchanges(), 0);
    }

    #[actix_web::test]
    async fn test_complete_auth_upserts_once() {
        let (adapter, provider, users) = adapter();
        let pending = adapter.begin_auth(None).oauth_state;

        let record = adapter
            .complete_auth(
                Some(&pending),
                &MockOAuthCallback::success(VALID_GRANT, &pending.state),
            )
            .await
            .unwrap();
        assert_eq!(record.provider, TEST_PROVIDER);
        assert_eq!(record.provider_id, TEST_PROVIDER_ID);
        assert_eq!(users.len().await, 1);
        assert_eq!(provider.exchanges(), 1);
    }

    #[actix_web::test]
    async fn test_state_mismatch_never_reaches_provider() {
        let (adapter, provider, users) = adapter();
        let pending = adapter.begin_auth(None).oauth_state;

        let result = adapter
            .complete_auth(Some(&pending), &MockOAuthCallback::success(VALID_GRANT, "forged"))
            .await;
        assert!(matches!(result, Err(AppError::AuthProvider(_))));
        assert_eq!(provider.exchanges(), 0);
        assert!(users.is_empty().await);
    }

    #[actix_web::test]
    async fn test_rejected_grant_creates_no_user() {
        let (adapter, provider, users) = adapter();
        let pending = adapter.begin_auth(None).oauth_state;

        let result = adapter
            .complete_auth(
                Some(&pending),
                &MockOAuthCallback::success("expired-code", &pending.state),
            )
            .await;
        assert!(matches!(result, Err(AppError::AuthProvider(_))));
        assert_eq!(provider.exchanges(), 1);
        assert!(users.is_empty().await);
    }

    #[actix_web::test]
    async fn test_missing_pending_state_and_provider_error() {
        let (adapter, provider, _) = adapter();
        assert!(adapter
            .complete_auth(None, &MockOAuthCallback::success(VALID_GRANT, "s"))
            .await
            .is_err());

        let pending = adapter.begin_auth(None).oauth_state;
        let denied = MockOAuthCallback::error("access_denied", Some(&pending.state));
        assert!(adapter.complete_auth(Some(&pending), &denied).await.is_err());
        assert_eq!(provider.exchanges(), 0);
    }
}
