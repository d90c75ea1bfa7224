#![warn(clippy::pedantic)]
#![warn(clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

use actix_cors::Cors;
use actix_web::{
    middleware::{from_fn, Logger},
    web, App, HttpServer,
};
use tutehub::{configure, gatekeeper, oauth::provider::CALLBACK_PATH, AppContext, TutehubSettings};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load configuration from Settings.toml and environment variables
    // This also loads .env file and initializes the logger
    let settings = TutehubSettings::load()
        .map_err(|e| std::io::Error::other(format!("Failed to load settings: {e}")))?;

    // Validates settings and connects the database before binding
    let context = AppContext::build(settings)
        .await
        .map_err(|e| std::io::Error::other(format!("Failed to start: {e}")))?;

    start_server(context).await
}

/// Start the HTTP server
///
/// # Errors
///
/// Returns an error if:
/// - Server binding fails
/// - Server fails to start
async fn start_server(context: AppContext) -> std::io::Result<()> {
    let bind_address = context.settings.get_bind_address();
    print_startup_info(&bind_address, &context);

    let cors_origins = context.settings.get_cors_origins();
    let context = web::Data::new(context);

    HttpServer::new(move || {
        let cors_origins = cors_origins.clone();
        let cors = Cors::default()
            .allowed_origin_fn(move |origin, _| {
                let origin = origin.to_str().unwrap_or("");
                cors_origins
                    .iter()
                    .any(|allowed| allowed == "*" || allowed == origin)
            })
            .allowed_methods(vec!["GET", "POST", "PUT", "PATCH", "DELETE", "OPTIONS"])
            .allowed_headers(vec!["Authorization", "Content-Type", "Accept", "X-CSRF-Token"])
            .supports_credentials()
            .max_age(3600);

        App::new()
            .app_data(context.clone())
            .wrap(from_fn(gatekeeper))
            .wrap(Logger::default())
            .wrap(cors)
            .configure(configure)
    })
    .bind(&bind_address)?
    .run()
    .await
}

fn print_startup_info(bind_address: &str, context: &AppContext) {
    let settings = &context.settings;
    println!("Starting tutehub on http://{bind_address}");
    println!(
        "Identity provider: {} ({})",
        settings.provider_label(),
        context.auth.provider_name()
    );
    println!("Session TTL: {}s", settings.session.ttl_seconds);
    println!();
    println!("Auth endpoints:");
    println!("  GET      /auth/login     - Start login (optional ?rd=/path)");
    println!("  GET|POST /auth/callback  - Provider callback");
    println!("  POST     /auth/logout    - End session");
    println!("  GET      /auth/me        - Signed-in user");
    println!();
    println!("Resource endpoints (session + CSRF token for writes):");
    println!("  /courses  /tutorials  /api/posts  /api/comments");
    println!();
    println!("OAuth callback URL for the identity provider:");
    println!(
        "  {}{CALLBACK_PATH}",
        settings.application.redirect_base_url
    );
    println!();
    println!("System endpoints:");
    println!("  GET  /ping            - Health check");
    println!(
        "  GET  /TuteFiles/*     - Files from {}",
        settings.static_files.folder
    );
}
