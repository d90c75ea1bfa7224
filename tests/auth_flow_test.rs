// Integration tests for the login, callback and logout round trip
use actix_web::cookie::Cookie;
use actix_web::test;
use serde_json::Value;
use std::sync::Arc;
use tutehub::session::{CSRF_COOKIE, OAUTH_STATE_COOKIE, SESSION_COOKIE};
use tutehub::test_app;
use tutehub::testing::constants::{TEST_PROVIDER, TEST_PROVIDER_ID, VALID_GRANT};
use tutehub::testing::{
    assert_cookie_cleared, assert_status, location, response_cookie, MockProvider, TestFixtures,
};
use url::Url;

fn state_param(authorization_url: &str) -> String {
    Url::parse(authorization_url)
        .expect("authorization url should parse")
        .query_pairs()
        .find(|(key, _)| key == "state")
        .map(|(_, value)| value.into_owned())
        .expect("authorization url should carry a state")
}

#[actix_web::test]
async fn test_login_redirects_to_provider_with_state_cookie() {
    let context = TestFixtures::context();
    let app = test_app!(context.clone());

    let req = test::TestRequest::get()
        .uri("/auth/login?rd=/courses")
        .to_request();
    let res = test::call_service(&app, req).await;

    assert_status(&res, 302);
    assert!(location(&res).starts_with("https://idp.example.test/authorize"));
    let state_cookie = response_cookie(&res, OAUTH_STATE_COOKIE).expect("state cookie");
    assert!(!state_cookie.value().is_empty());
    assert_eq!(state_cookie.http_only(), Some(true));
}

#[actix_web::test]
async fn test_callback_creates_session_and_unlocks_courses() {
    let context = TestFixtures::context();
    let app = test_app!(context.clone());

    let login = test::call_service(
        &app,
        test::TestRequest::get()
            .uri("/auth/login?rd=/courses")
            .to_request(),
    )
    .await;
    let state = state_param(&location(&login));
    let state_cookie = response_cookie(&login, OAUTH_STATE_COOKIE).unwrap();

    let callback = test::call_service(
        &app,
        test::TestRequest::get()
            .uri(&format!("/auth/callback?code={VALID_GRANT}&state={state}"))
            .cookie(state_cookie)
            .to_request(),
    )
    .await;

    assert_status(&callback, 302);
    assert_eq!(location(&callback), "/courses");
    let session_cookie = response_cookie(&callback, SESSION_COOKIE).expect("session cookie");
    assert!(!session_cookie.value().is_empty());
    assert_eq!(session_cookie.http_only(), Some(true));
    let csrf_cookie = response_cookie(&callback, CSRF_COOKIE).expect("csrf cookie");
    assert_ne!(csrf_cookie.http_only(), Some(true));
    assert_cookie_cleared(&callback, OAUTH_STATE_COOKIE);

    // The user record exists exactly once
    let user = context
        .stores
        .users
        .find(TEST_PROVIDER, TEST_PROVIDER_ID)
        .await
        .unwrap()
        .expect("user record");
    assert_eq!(user.created_at, user.last_login_at);

    // Session cookie grants access
    let with_session = test::call_service(
        &app,
        test::TestRequest::get()
            .uri("/courses")
            .cookie(Cookie::new(SESSION_COOKIE, session_cookie.value().to_string()))
            .to_request(),
    )
    .await;
    assert_status(&with_session, 200);
    assert!(response_cookie(&with_session, CSRF_COOKIE).is_some());

    // And nothing else does
    let anonymous = test::call_service(&app, test::TestRequest::get().uri("/courses").to_request()).await;
    assert_status(&anonymous, 401);
    let body: Value = test::read_body_json(anonymous).await;
    assert_eq!(body["error"], "unauthorized");
}

#[actix_web::test]
async fn test_callback_via_form_post() {
    let context = TestFixtures::context();
    let app = test_app!(context.clone());

    let login = test::call_service(&app, test::TestRequest::get().uri("/auth/login").to_request()).await;
    let state = state_param(&location(&login));
    let state_cookie = response_cookie(&login, OAUTH_STATE_COOKIE).unwrap();

    let callback = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/auth/callback")
            .cookie(state_cookie)
            .set_form([("code", VALID_GRANT), ("state", state.as_str())])
            .to_request(),
    )
    .await;

    assert_status(&callback, 302);
    assert_eq!(location(&callback), context.settings.provider.success_redirect);
    assert!(response_cookie(&callback, SESSION_COOKIE).is_some());
}

#[actix_web::test]
async fn test_state_mismatch_redirects_to_failure_without_user() {
    let provider = Arc::new(MockProvider::default());
    let context = TestFixtures::context_with_provider(TestFixtures::settings(), provider.clone());
    let app = test_app!(context.clone());

    let login = test::call_service(&app, test::TestRequest::get().uri("/auth/login").to_request()).await;
    let state_cookie = response_cookie(&login, OAUTH_STATE_COOKIE).unwrap();

    let callback = test::call_service(
        &app,
        test::TestRequest::get()
            .uri(&format!("/auth/callback?code={VALID_GRANT}&state=forged"))
            .cookie(state_cookie)
            .to_request(),
    )
    .await;

    assert_status(&callback, 302);
    assert_eq!(location(&callback), "/auth/failure?error=auth_failed");
    assert!(response_cookie(&callback, SESSION_COOKIE).is_none());
    assert!(context
        .stores
        .users
        .find(TEST_PROVIDER, TEST_PROVIDER_ID)
        .await
        .unwrap()
        .is_none());
    // The forged state is refused before the grant reaches the provider
    assert_eq!(provider.exchanges(), 0);
}

#[actix_web::test]
async fn test_callback_without_pending_login_fails() {
    let provider = Arc::new(MockProvider::default());
    let context = TestFixtures::context_with_provider(TestFixtures::settings(), provider.clone());
    let app = test_app!(context.clone());

    let callback = test::call_service(
        &app,
        test::TestRequest::get()
            .uri(&format!("/auth/callback?code={VALID_GRANT}&state=anything"))
            .to_request(),
    )
    .await;
    assert_status(&callback, 302);
    assert_eq!(location(&callback), "/auth/failure?error=auth_failed");
    assert_eq!(provider.exchanges(), 0);

    let failure = test::call_service(
        &app,
        test::TestRequest::get()
            .uri("/auth/failure?error=auth_failed")
            .to_request(),
    )
    .await;
    assert_status(&failure, 401);
    let body: Value = test::read_body_json(failure).await;
    assert_eq!(body["error"], "authentication_failed");
}

#[actix_web::test]
async fn test_logout_destroys_session_and_clears_cookies() {
    let context = TestFixtures::context();
    let app = test_app!(context.clone());
    let (session, cookie, _) = TestFixtures::signed_in(&context).await;

    let logout = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/auth/logout")
            .cookie(cookie.clone())
            .to_request(),
    )
    .await;

    assert_status(&logout, 302);
    assert_cookie_cleared(&logout, SESSION_COOKIE);
    assert_cookie_cleared(&logout, CSRF_COOKIE);
    assert!(context
        .sessions
        .resolve_session(&session.session_id)
        .await
        .is_err());

    let after = test::call_service(
        &app,
        test::TestRequest::get().uri("/courses").cookie(cookie).to_request(),
    )
    .await;
    assert_status(&after, 401);
}

#[actix_web::test]
async fn test_me_returns_signed_in_identity() {
    let context = TestFixtures::context();
    let app = test_app!(context.clone());
    let (_, cookie, _) = TestFixtures::signed_in(&context).await;

    let res = test::call_service(
        &app,
        test::TestRequest::get().uri("/auth/me").cookie(cookie).to_request(),
    )
    .await;
    assert_status(&res, 200);
    let body: Value = test::read_body_json(res).await;
    assert_eq!(body["provider_id"], TEST_PROVIDER_ID);

    let anonymous = test::call_service(&app, test::TestRequest::get().uri("/auth/me").to_request()).await;
    assert_status(&anonymous, 401);
}

#[actix_web::test]
async fn test_cross_site_gets_cannot_end_a_session() {
    let context = TestFixtures::context();
    let app = test_app!(context.clone());
    let (session, cookie, _) = TestFixtures::signed_in(&context).await;

    let logout = test::call_service(
        &app,
        test::TestRequest::get()
            .uri("/auth/logout")
            .cookie(cookie.clone())
            .to_request(),
    )
    .await;
    assert!(logout.status().is_client_error());
    assert!(response_cookie(&logout, SESSION_COOKIE).is_none());

    let login = test::call_service(
        &app,
        test::TestRequest::get()
            .uri("/auth/login")
            .cookie(cookie.clone())
            .to_request(),
    )
    .await;
    assert_status(&login, 302);
    assert!(response_cookie(&login, SESSION_COOKIE).is_none());
    assert!(response_cookie(&login, OAUTH_STATE_COOKIE).is_some());

    assert!(context
        .sessions
        .resolve_session(&session.session_id)
        .await
        .is_ok());
    let courses = test::call_service(
        &app,
        test::TestRequest::get().uri("/courses").cookie(cookie).to_request(),
    )
    .await;
    assert_status(&courses, 200);
}
