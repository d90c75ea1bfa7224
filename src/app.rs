//! Application context and route registration
//!
//! [`AppContext`] is built once at startup and shared with every worker
//! through `web::Data`; nothing in the crate reads process-global state.

use actix_web::web;
use std::sync::Arc;
use std::time::Duration;

use crate::csrf::CsrfGuard;
use crate::error::AppResult;
use crate::handlers::{auth, resources, static_files};
use crate::oauth::{AuthAdapter, HttpIdentityProvider, IdentityProvider, ProviderConfig};
use crate::pipeline::Pipeline;
use crate::routes::RouteGroup;
use crate::session::{CookieFactory, SessionManager};
use crate::settings::TutehubSettings;
use crate::storage::{self, Stores};
use crate::utils::crypto::derive_key;

/// Key derivation labels for the session secret
const CSRF_KEY_PURPOSE: &str = "csrf";
const STATE_KEY_PURPOSE: &str = "oauth-state";

pub struct AppContext {
    pub settings: TutehubSettings,
    pub stores: Stores,
    pub sessions: SessionManager,
    pub csrf: CsrfGuard,
    pub auth: AuthAdapter,
    pub pipeline: Pipeline,
}

impl AppContext {
    /// Validate settings, connect storage and set up the identity provider
    ///
    /// # Errors
    ///
    /// - `AppError::Configuration` for missing or invalid settings
    /// - `AppError::DatabaseUnavailable` if the database cannot be reached
    pub async fn build(settings: TutehubSettings) -> AppResult<Self> {
        settings.validate()?;

        let stores = storage::connect(&settings.database).await?;
        let config =
            ProviderConfig::from_settings(&settings.provider, &settings.application.redirect_base_url)?;
        let provider = HttpIdentityProvider::new(
            config,
            Duration::from_secs(settings.provider.timeout_seconds.max(1)),
        )?;

        log::info!(
            "Identity provider {} ready, session TTL {}s",
            settings.provider.name,
            settings.session.ttl_seconds
        );
        Ok(Self::with_parts(settings, stores, Arc::new(provider)))
    }

    /// Assemble a context from already constructed parts
    #[must_use]
    pub fn with_parts(
        settings: TutehubSettings,
        stores: Stores,
        provider: Arc<dyn IdentityProvider>,
    ) -> Self {
        let secret = settings.session.secret.as_bytes();
        let cookie_factory = CookieFactory::new(
            derive_key(secret, STATE_KEY_PURPOSE),
            settings.cookies.secure,
        );
        let sessions = SessionManager::new(stores.sessions.clone(), cookie_factory, &settings.session);
        let csrf = CsrfGuard::new(derive_key(secret, CSRF_KEY_PURPOSE));
        let auth = AuthAdapter::new(provider, stores.users.clone());
        let pipeline = Pipeline::standard(settings.security.public_reads);

        Self {
            settings,
            stores,
            sessions,
            csrf,
            auth,
            pipeline,
        }
    }
}

/// Register every route group
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope(RouteGroup::Auth.mount())
            .route("/login", web::get().to(auth::login))
            .route("/callback", web::get().to(auth::callback))
            .route("/callback", web::post().to(auth::callback_form))
            .route("/logout", web::post().to(auth::logout))
            .route("/me", web::get().to(auth::me))
            .route("/failure", web::get().to(auth::failure)),
    );

    for group in RouteGroup::RESOURCES {
        if let Some(collection) = group.collection() {
            cfg.service(resources::scope(group.mount(), collection));
        }
    }

    cfg.route(
        "/TuteFiles/{path:.*}",
        web::get().to(static_files::serve_static),
    )
    .route(
        "/TuteFiles/{path:.*}",
        web::head().to(static_files::serve_static),
    )
    .route(RouteGroup::Health.mount(), web::get().to(static_files::health))
    .route(RouteGroup::Health.mount(), web::head().to(static_files::health))
    .default_service(web::to(static_files::not_found));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::testing::TestFixtures;

    #[actix_web::test]
    async fn test_build_with_memory_backend() {
        let context = AppContext::build(TestFixtures::settings()).await;
        let Ok(context) = context else {
            panic!("memory-backed context should build");
        };
        assert_eq!(context.auth.provider_name(), "google");
        assert_eq!(context.pipeline.stages().len(), 4);
    }

    #[actix_web::test]
    async fn test_build_fails_fast_without_secret() {
        let mut settings = TestFixtures::settings();
        settings.session.secret = String::new();
        assert!(matches!(
            AppContext::build(settings).await,
            Err(AppError::Configuration(_))
        ));
    }

    #[actix_web::test]
    async fn test_build_rejects_unsupported_database() {
        let mut settings = TestFixtures::settings();
        settings.database.url = "mongodb://localhost:27017/tutehub".to_string();
        assert!(matches!(
            AppContext::build(settings).await,
            Err(AppError::Configuration(_))
        ));
    }

    #[test]
    fn test_keys_are_separated_by_purpose() {
        let secret = b"secret";
        assert_ne!(
            derive_key(secret, CSRF_KEY_PURPOSE),
            derive_key(secret, STATE_KEY_PURPOSE)
        );
    }
}
