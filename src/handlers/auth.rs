// Auth handlers: login, callback, logout, current user
use actix_web::{cookie::Cookie, web, HttpRequest, HttpResponse};
use log::{debug, info, warn};
use serde::Deserialize;

use crate::app::AppContext;
use crate::error::{AppError, AppResult};
use crate::models::AuthenticatedUser;
use crate::oauth::OAuthCallback;
use crate::session::{SessionManager, CSRF_COOKIE, OAUTH_STATE_COOKIE};
use crate::utils::responses::ResponseBuilder;

#[derive(Deserialize)]
pub struct LoginQuery {
    /// Where to land after a successful login
    pub rd: Option<String>,
}

#[derive(Deserialize)]
pub struct FailureQuery {
    pub error: Option<String>,
}

/// Destroy the presented session, if any, and return the cookies that clear it
async fn end_presented_session(
    req: &HttpRequest,
    ctx: &AppContext,
) -> AppResult<Vec<Cookie<'static>>> {
    let factory = ctx.sessions.cookie_factory();
    let clear = vec![
        ctx.sessions.expired_session_cookie(),
        factory.create_expired_cookie(CSRF_COOKIE),
    ];
    if let Some(session_id) = SessionManager::session_id_from_request(req) {
        ctx.sessions.destroy_session(&session_id).await?;
    }
    Ok(clear)
}

/// `GET /auth/login` - start the provider handshake
///
/// A presented session is left alone here; it is replaced once the callback
/// completes.
///
/// # Errors
///
/// Returns `AppError::Internal` if the state cookie cannot be sealed
pub async fn login(
    query: web::Query<LoginQuery>,
    ctx: web::Data<AppContext>,
) -> AppResult<HttpResponse> {
    let redirect = ctx.auth.begin_auth(query.rd.as_deref());
    let state_cookie = ctx
        .sessions
        .cookie_factory()
        .create_state_cookie(&redirect.oauth_state)
        .map_err(|e| AppError::Internal(format!("Failed to seal OAuth state: {e}")))?;

    info!("Redirecting to {} for login", ctx.auth.provider_name());
    Ok(ResponseBuilder::redirect_with_cookies(
        &redirect.authorization_url,
        vec![state_cookie],
    ))
}

/// `GET /auth/callback` - provider redirect with query parameters
///
/// # Errors
///
/// Only storage failures surface as errors; provider failures redirect to the
/// configured failure page
pub async fn callback(
    req: HttpRequest,
    query: web::Query<OAuthCallback>,
    ctx: web::Data<AppContext>,
) -> AppResult<HttpResponse> {
    finish_login(&req, &ctx, &query.into_inner()).await
}

/// `POST /auth/callback` - providers using `response_mode=form_post`
///
/// # Errors
///
/// See [`callback`]
pub async fn callback_form(
    req: HttpRequest,
    form: web::Form<OAuthCallback>,
    ctx: web::Data<AppContext>,
) -> AppResult<HttpResponse> {
    finish_login(&req, &ctx, &form.into_inner()).await
}

async fn finish_login(
    req: &HttpRequest,
    ctx: &AppContext,
    callback: &OAuthCallback,
) -> AppResult<HttpResponse> {
    let factory = ctx.sessions.cookie_factory();
    let clear_state = factory.create_expired_cookie(OAUTH_STATE_COOKIE);
    let pending = factory.get_state_from_request(req);
    debug!(
        "OAuth callback via {} (pending state present: {})",
        req.method(),
        pending.is_some()
    );

    let user = match ctx.auth.complete_auth(pending.as_ref(), callback).await {
        Ok(user) => user,
        Err(AppError::AuthProvider(reason)) => {
            warn!("Login failed: {reason}");
            return Ok(ResponseBuilder::redirect_with_cookies(
                &ctx.settings.provider.failure_redirect,
                vec![clear_state],
            ));
        }
        Err(e) => return Err(e),
    };

    if let Some(previous) = SessionManager::session_id_from_request(req) {
        ctx.sessions.destroy_session(&previous).await?;
    }
    let session = ctx.sessions.create_session(user.identity()).await?;
    let token = ctx.csrf.issue_token(&session.session_id)?;

    let target = pending
        .and_then(|state| state.redirect_url)
        .unwrap_or_else(|| ctx.settings.provider.success_redirect.clone());

    Ok(ResponseBuilder::redirect_with_cookies(
        &target,
        vec![
            ctx.sessions.session_cookie(&session),
            factory.create_csrf_cookie(&token, session.expires_at),
            clear_state,
        ],
    ))
}

/// `POST /auth/logout` - end the session and clear its cookies
///
/// # Errors
///
/// Returns `AppError::DatabaseUnavailable` if the session cannot be removed
pub async fn logout(req: HttpRequest, ctx: web::Data<AppContext>) -> AppResult<HttpResponse> {
    let cookies = end_presented_session(&req, &ctx).await?;
    info!("User signed out");
    Ok(ResponseBuilder::redirect_with_cookies(
        &ctx.settings.provider.success_redirect,
        cookies,
    ))
}

/// `GET /auth/me` - the signed-in user
///
/// Serves the stored user record, or the session identity if the record is gone.
///
/// # Errors
///
/// Returns `AppError::SessionNotFound` without a session
pub async fn me(user: AuthenticatedUser, ctx: web::Data<AppContext>) -> AppResult<HttpResponse> {
    let identity = user.identity();
    match ctx
        .stores
        .users
        .find(ctx.auth.provider_name(), &identity.provider_id)
        .await?
    {
        Some(record) => Ok(ResponseBuilder::ok(&record)),
        None => Ok(ResponseBuilder::ok(identity)),
    }
}

/// `GET /auth/failure` - landing page for failed logins
pub async fn failure(query: web::Query<FailureQuery>) -> HttpResponse {
    let code = query
        .error
        .as_deref()
        .filter(|code| code.len() <= 64 && code.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'))
        .unwrap_or("auth_failed");
    ResponseBuilder::unauthorized()
        .with_error_code("authentication_failed")
        .with_message(&format!("Login did not complete ({code})"))
        .build()
}
