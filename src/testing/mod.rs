//! Testing utilities for tutehub
//!
//! Shared by the unit tests and, behind the `testing` feature, by the
//! integration tests under `tests/`.
//!
//! ## Organization
//!
//! - [`fixtures`] - Pre-built test data (settings, identities, app contexts)
//! - [`assertions`] - Helpers for inspecting responses and their cookies
//! - [`mock`] - An in-process identity provider and a failing session store
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tutehub::testing::{fixtures::TestFixtures, mock::MockProvider};
//!
//! let context = TestFixtures::context();
//! let app = tutehub::test_app!(context);
//! ```

pub mod assertions;
pub mod fixtures;
pub mod mock;

pub use assertions::*;
pub use fixtures::TestFixtures;
pub use mock::{MockOAuthCallback, MockProvider, UnavailableSessionStore};

/// Common test constants
pub mod constants {
    /// Session secret used by every fixture
    pub const TEST_SECRET: &str = "test-session-secret-with-enough-entropy";

    /// Provider name reported by [`super::MockProvider`]
    pub const TEST_PROVIDER: &str = "mock";

    /// Authorization code the mock provider accepts
    pub const VALID_GRANT: &str = "valid-code";

    /// Default test provider ID
    pub const TEST_PROVIDER_ID: &str = "123456789";

    /// Default test user name
    pub const TEST_USER_NAME: &str = "Test User";

    /// Default test email address
    pub const TEST_EMAIL: &str = "test@example.com";
}

/// Initialize a test service with the full middleware and route table
///
/// Takes a `web::Data<AppContext>`.
#[macro_export]
macro_rules! test_app {
    ($context:expr) => {
        actix_web::test::init_service(
            actix_web::App::new()
                .app_data($context)
                .wrap(actix_web::middleware::from_fn($crate::pipeline::gatekeeper))
                .configure($crate::app::configure),
        )
        .await
    };
}
