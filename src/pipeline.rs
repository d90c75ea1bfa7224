//! Request pipeline
//!
//! The checks every request passes before its handler, as an ordered list of
//! named [`Stage`]s, plus the response stage that hands out CSRF tokens and
//! renewed session cookies afterwards. [`gatekeeper`] runs the whole thing as
//! actix middleware.
//!
//! ## Organization
//!
//! 1. **Stages** - the named pre-handler steps and their state
//! 2. **Response stage** - cookies written after the handler
//! 3. **Middleware** - wiring into actix
//! 4. **Tests**

use actix_web::body::{EitherBody, MessageBody};
use actix_web::dev::{ServiceRequest, ServiceResponse};
use actix_web::middleware::Next;
use actix_web::{web, Error, HttpMessage, HttpResponse, ResponseError};

use crate::app::AppContext;
use crate::csrf::CsrfGuard;
use crate::error::{AppError, AppResult};
use crate::models::{AuthenticatedUser, SessionRecord};
use crate::routes::RouteGroup;
use crate::session::{SessionManager, CSRF_COOKIE, SESSION_COOKIE};

// =============================================================================
// 1. Stages
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Find the route group, or reject with `NotFound`
    Classify,
    /// Look up the presented session; failures are remembered, not raised
    ResolveSession,
    /// Raise the remembered failure if the group needs a session
    Authorize,
    /// Check the CSRF token on mutating requests to protected groups
    VerifyCsrf,
}

/// What the stages learned about one request
#[derive(Debug, Default)]
pub struct RequestState {
    pub group: Option<RouteGroup>,
    pub session: Option<SessionRecord>,
    pub failure: Option<AppError>,
    /// Whether the client sent a `sessionId` cookie at all
    pub presented: bool,
    pub renewed: bool,
}

impl RequestState {
    fn group(&self) -> AppResult<RouteGroup> {
        self.group
            .ok_or_else(|| AppError::Internal("route group read before Classify".to_string()))
    }
}

#[derive(Debug, Clone)]
pub struct Pipeline {
    stages: Vec<Stage>,
    public_reads: bool,
}

impl Pipeline {
    /// Classify, `ResolveSession`, Authorize, `VerifyCsrf`
    #[must_use]
    pub fn standard(public_reads: bool) -> Self {
        Self {
            stages: vec![
                Stage::Classify,
                Stage::ResolveSession,
                Stage::Authorize,
                Stage::VerifyCsrf,
            ],
            public_reads,
        }
    }

    #[must_use]
    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// Run every stage in order, stopping at the first error
    ///
    /// # Errors
    ///
    /// Returns the error of the first stage that rejects the request
    pub async fn run(
        &self,
        sessions: &SessionManager,
        csrf: &CsrfGuard,
        req: &mut ServiceRequest,
    ) -> AppResult<RequestState> {
        let mut state = RequestState::default();
        for stage in &self.stages {
            self.run_stage(*stage, sessions, csrf, req, &mut state)
                .await
                .inspect_err(|e| {
                    log::debug!("{stage:?} rejected {} {}: {e}", req.method(), req.path());
                })?;
        }
        Ok(state)
    }

    async fn run_stage(
        &self,
        stage: Stage,
        sessions: &SessionManager,
        csrf: &CsrfGuard,
        req: &mut ServiceRequest,
        state: &mut RequestState,
    ) -> AppResult<()> {
        match stage {
            Stage::Classify => {
                state.group = Some(RouteGroup::classify(req.method(), req.path())?);
                Ok(())
            }
            Stage::ResolveSession => Self::resolve_session(sessions, req, state).await,
            Stage::Authorize => {
                let group = state.group()?;
                if state.session.is_none() && group.requires_session(req.method(), self.public_reads) {
                    return Err(state.failure.take().unwrap_or(AppError::SessionNotFound));
                }
                Ok(())
            }
            Stage::VerifyCsrf => {
                if !state.group()?.csrf_protected() {
                    return Ok(());
                }
                match &state.session {
                    Some(session) => csrf.validate(req, &session.session_id).await,
                    None => Ok(()),
                }
            }
        }
    }

    async fn resolve_session(
        sessions: &SessionManager,
        req: &ServiceRequest,
        state: &mut RequestState,
    ) -> AppResult<()> {
        if !state.group()?.uses_session() {
            return Ok(());
        }
        let Some(session_id) = SessionManager::session_id_from_request(req.request()) else {
            return Ok(());
        };
        state.presented = true;

        let session = match sessions.resolve_session(&session_id).await {
            Ok(session) => session,
            Err(e) if e.is_session_failure() => {
                state.failure = Some(e);
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        match sessions.renew_session(&session).await {
            Ok(Some(renewed)) => {
                state.session = Some(renewed);
                state.renewed = true;
            }
            Ok(None) => state.session = Some(session),
            Err(e) => {
                log::warn!("Session renewal failed, keeping current expiry: {e}");
                state.session = Some(session);
            }
        }
        Ok(())
    }
}

// =============================================================================
// 2. Response stage
// =============================================================================

impl Pipeline {
    /// Cookies to append to a handler's response
    ///
    /// Nothing is added when the handler already wrote the session or CSRF
    /// cookie itself, as login and logout do.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Internal` if a CSRF token cannot be issued
    pub fn response_cookies<B>(
        &self,
        sessions: &SessionManager,
        csrf: &CsrfGuard,
        state: &RequestState,
        response: &HttpResponse<B>,
    ) -> AppResult<Vec<actix_web::cookie::Cookie<'static>>> {
        let handler_wrote_cookies = response
            .cookies()
            .any(|cookie| cookie.name() == SESSION_COOKIE || cookie.name() == CSRF_COOKIE);
        if handler_wrote_cookies {
            return Ok(Vec::new());
        }

        let mut cookies = Vec::new();
        match &state.session {
            Some(session) => {
                if state.renewed {
                    cookies.push(sessions.session_cookie(session));
                }
                let token = csrf.issue_token(&session.session_id)?;
                cookies.push(
                    sessions
                        .cookie_factory()
                        .create_csrf_cookie(&token, session.expires_at),
                );
            }
            None if state.presented && state.failure.is_some() => {
                cookies.push(sessions.expired_session_cookie());
            }
            None => {}
        }
        Ok(cookies)
    }
}

// =============================================================================
// 3. Middleware
// =============================================================================

/// Run the pipeline around every request
///
/// Expects `web::Data<AppContext>` in the app data. On success the resolved
/// session is available to handlers as [`AuthenticatedUser`].
///
/// # Errors
///
/// Only errors from the inner service are propagated; pipeline rejections are
/// turned into JSON error responses.
pub async fn gatekeeper<B: MessageBody + 'static>(
    mut req: ServiceRequest,
    next: Next<B>,
) -> Result<ServiceResponse<EitherBody<B>>, Error> {
    let Some(ctx) = req.app_data::<web::Data<AppContext>>().cloned() else {
        let err = AppError::Configuration("application context is not registered".to_string());
        log::error!("{err}");
        return Ok(req.into_response(err.error_response()).map_into_right_body());
    };

    let state = match ctx.pipeline.run(&ctx.sessions, &ctx.csrf, &mut req).await {
        Ok(state) => state,
        Err(err) => {
            let mut response = err.error_response();
            let presented = SessionManager::session_id_from_request(req.request()).is_some();
            if err.is_session_failure() && presented {
                if let Err(e) = response.add_cookie(&ctx.sessions.expired_session_cookie()) {
                    log::warn!("Could not clear stale session cookie: {e}");
                }
            }
            return Ok(req.into_response(response).map_into_right_body());
        }
    };

    if let Some(session) = &state.session {
        req.extensions_mut().insert(AuthenticatedUser {
            session: session.clone(),
        });
    }

    let mut res = next.call(req).await?;

    match ctx
        .pipeline
        .response_cookies(&ctx.sessions, &ctx.csrf, &state, res.response())
    {
        Ok(cookies) => {
            for cookie in cookies {
                if let Err(e) = res.response_mut().add_cookie(&cookie) {
                    log::warn!("Could not set {} cookie: {e}", cookie.name());
                }
            }
        }
        Err(e) => log::error!("Response stage failed: {e}"),
    }

    Ok(res.map_into_left_body())
}

// =============================================================================
// 4. Tests
// =============================================================================
