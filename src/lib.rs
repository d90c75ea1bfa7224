#![warn(clippy::pedantic)]
#![warn(clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

/// Version of the tutehub application
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod app;
pub mod csrf;
pub mod error;
pub mod handlers;
pub mod models;
pub mod oauth;
pub mod pipeline;
pub mod routes;
pub mod session;
pub mod settings;
pub mod storage;
pub mod utils;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

/// Re-export commonly used items
pub use app::{configure, AppContext};
pub use error::{AppError, AppResult};
pub use pipeline::{gatekeeper, Pipeline, Stage};
pub use routes::RouteGroup;
pub use session::SessionManager;
pub use settings::TutehubSettings;
