// HTTP request handlers
pub mod auth;
pub mod resources;
pub mod static_files;

pub use auth::{callback, callback_form, failure, login, logout, me};
pub use static_files::{health, serve_static};
