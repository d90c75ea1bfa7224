//! Test fixtures providing pre-built test objects

use actix_web::cookie::Cookie;
use actix_web::web;
use std::sync::Arc;

use crate::app::AppContext;
use crate::models::{SessionRecord, UserIdentity};
use crate::settings::TutehubSettings;
use crate::storage::Stores;

use super::constants::{TEST_EMAIL, TEST_PROVIDER_ID, TEST_SECRET, TEST_USER_NAME};
use super::mock::MockProvider;

/// Central fixture provider for all test data
pub struct TestFixtures;

impl TestFixtures {
    /// Settings that pass validation and use in-memory storage
    #[must_use]
    pub fn settings() -> TutehubSettings {
        let mut settings = TutehubSettings::default();
        settings.database.url = "memory://".to_string();
        settings.session.secret = TEST_SECRET.to_string();
        settings.cookies.secure = false;
        settings.provider.client_id = Some("test-client".to_string());
        settings.provider.client_secret = Some("test-client-secret".to_string());
        settings.provider.client_id_env = None;
        settings.provider.client_secret_env = None;
        settings
    }

    #[must_use]
    pub fn identity() -> UserIdentity {
        UserIdentity {
            provider_id: TEST_PROVIDER_ID.to_string(),
            display_name: TEST_USER_NAME.to_string(),
            email: Some(TEST_EMAIL.to_string()),
        }
    }

    /// Context over fresh in-memory stores and a [`MockProvider`]
    #[must_use]
    pub fn context() -> web::Data<AppContext> {
        Self::context_with(Self::settings())
    }

    #[must_use]
    pub fn context_with(settings: TutehubSettings) -> web::Data<AppContext> {
        Self::context_with_provider(settings, Arc::new(MockProvider::default()))
    }

    /// Context sharing `provider` with the caller, for counting exchanges
    #[must_use]
    pub fn context_with_provider(
        settings: TutehubSettings,
        provider: Arc<MockProvider>,
    ) -> web::Data<AppContext> {
        web::Data::new(AppContext::with_parts(settings, Stores::in_memory(), provider))
    }

    /// Context over caller-supplied stores
    #[must_use]
    pub fn context_with_stores(stores: Stores) -> web::Data<AppContext> {
        web::Data::new(AppContext::with_parts(
            Self::settings(),
            stores,
            Arc::new(MockProvider::default()),
        ))
    }

    /// A live session for [`Self::identity`], its cookie and a matching CSRF token
    ///
    /// # Panics
    ///
    /// Panics if the in-memory store or token issuance fails.
    pub async fn signed_in(context: &AppContext) -> (SessionRecord, Cookie<'static>, String) {
        let session = context
            .sessions
            .create_session(Self::identity())
            .await
            .expect("in-memory session store should accept writes");
        let cookie = context.sessions.session_cookie(&session);
        let token = context
            .csrf
            .issue_token(&session.session_id)
            .expect("token issuance should succeed");
        (session, cookie, token)
    }
}
