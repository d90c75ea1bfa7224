// Integration tests for session expiry, renewal and the public routes
use actix_web::cookie::Cookie;
use actix_web::test;
use chrono::{Duration, Utc};
use serde_json::{json, Value};
use std::sync::Arc;
use tutehub::session::{CSRF_COOKIE, SESSION_COOKIE};
use tutehub::test_app;
use tutehub::storage::Stores;
use tutehub::testing::{
    assert_cookie_cleared, assert_status, response_cookie, TestFixtures, UnavailableSessionStore,
};

#[actix_web::test]
async fn test_expired_session_is_rejected_and_cookie_cleared() {
    let context = TestFixtures::context();
    let app = test_app!(context.clone());

    // Expired ten seconds ago, still retained by the store
    let ttl = context.sessions.ttl();
    let start = Utc::now() - ttl - Duration::seconds(10);
    let session = context
        .sessions
        .create_session_at(TestFixtures::identity(), start)
        .await
        .unwrap();

    let res = test::call_service(
        &app,
        test::TestRequest::get()
            .uri("/courses")
            .cookie(Cookie::new(SESSION_COOKIE, session.session_id.to_string()))
            .to_request(),
    )
    .await;

    assert_status(&res, 401);
    assert_cookie_cleared(&res, SESSION_COOKIE);
    let body: Value = test::read_body_json(res).await;
    assert_eq!(body["error"], "session_expired");
}

#[actix_web::test]
async fn test_unknown_session_id_is_unauthorized() {
    let context = TestFixtures::context();
    let app = test_app!(context.clone());

    let res = test::call_service(
        &app,
        test::TestRequest::get()
            .uri("/api/posts")
            .cookie(Cookie::new(SESSION_COOKIE, "never-issued"))
            .to_request(),
    )
    .await;
    assert_status(&res, 401);
    let body: Value = test::read_body_json(res).await;
    assert_eq!(body["error"], "unauthorized");
}

#[actix_web::test]
async fn test_rolling_renewal_reissues_session_cookie() {
    let mut settings = TestFixtures::settings();
    settings.session.ttl_seconds = 60;
    settings.session.renew_within_seconds = 60;
    let context = TestFixtures::context_with(settings);
    let app = test_app!(context.clone());
    let (session, cookie, _) = TestFixtures::signed_in(&context).await;

    let res = test::call_service(
        &app,
        test::TestRequest::get().uri("/courses").cookie(cookie).to_request(),
    )
    .await;
    assert_status(&res, 200);

    let renewed = response_cookie(&res, SESSION_COOKIE).expect("renewed session cookie");
    assert_eq!(renewed.value(), session.session_id.as_str());
    assert!(response_cookie(&res, CSRF_COOKIE).is_some());

    let stored = context
        .sessions
        .resolve_session(&session.session_id)
        .await
        .unwrap();
    assert!(stored.expires_at >= session.expires_at);
}

#[actix_web::test]
async fn test_public_reads_relax_only_safe_methods() {
    let mut settings = TestFixtures::settings();
    settings.security.public_reads = true;
    let context = TestFixtures::context_with(settings);
    let app = test_app!(context.clone());

    let read = test::call_service(&app, test::TestRequest::get().uri("/courses").to_request()).await;
    assert_status(&read, 200);
    assert!(response_cookie(&read, CSRF_COOKIE).is_none());

    let write = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/courses")
            .set_json(json!({"title": "Intro"}))
            .to_request(),
    )
    .await;
    assert_status(&write, 401);
}

#[actix_web::test]
async fn test_ping_and_unknown_paths() {
    let context = TestFixtures::context();
    let app = test_app!(context.clone());

    let ping = test::call_service(&app, test::TestRequest::get().uri("/ping").to_request()).await;
    assert_status(&ping, 200);
    let body: Value = test::read_body_json(ping).await;
    assert_eq!(body["status"], "ok");

    let unknown = test::call_service(&app, test::TestRequest::get().uri("/admin").to_request()).await;
    assert_status(&unknown, 404);
    let body: Value = test::read_body_json(unknown).await;
    assert_eq!(body["error"], "not_found");

    let wrong_method = test::call_service(
        &app,
        test::TestRequest::delete().uri("/ping").to_request(),
    )
    .await;
    assert_status(&wrong_method, 404);
}

#[actix_web::test]
async fn test_tute_files_are_served_from_folder() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("week1.txt"), "Read chapter 1").unwrap();

    let mut settings = TestFixtures::settings();
    settings.static_files.folder = dir.path().to_string_lossy().into_owned();
    let context = TestFixtures::context_with(settings);
    let app = test_app!(context.clone());

    let res = test::call_service(
        &app,
        test::TestRequest::get().uri("/TuteFiles/week1.txt").to_request(),
    )
    .await;
    assert_status(&res, 200);
    assert_eq!(
        res.headers().get("content-type").unwrap().to_str().unwrap(),
        "text/plain"
    );
    let body = test::read_body(res).await;
    assert_eq!(body, "Read chapter 1");

    let missing = test::call_service(
        &app,
        test::TestRequest::get().uri("/TuteFiles/week2.txt").to_request(),
    )
    .await;
    assert_status(&missing, 404);
}

#[actix_web::test]
async fn test_session_store_outage_is_a_request_scoped_503() {
    let stores = Stores {
        sessions: Arc::new(UnavailableSessionStore),
        ..Stores::in_memory()
    };
    let context = TestFixtures::context_with_stores(stores);
    let app = test_app!(context.clone());

    let courses = test::call_service(
        &app,
        test::TestRequest::get()
            .uri("/courses")
            .cookie(Cookie::new(SESSION_COOKIE, "some-session-id"))
            .to_request(),
    )
    .await;
    assert_status(&courses, 503);
    assert!(response_cookie(&courses, SESSION_COOKIE).is_none());
    let body: Value = test::read_body_json(courses).await;
    assert_eq!(body["error"], "service_unavailable");

    let ping = test::call_service(&app, test::TestRequest::get().uri("/ping").to_request()).await;
    assert_status(&ping, 503);

    // The service keeps answering once the store is down
    let unknown = test::call_service(&app, test::TestRequest::get().uri("/admin").to_request()).await;
    assert_status(&unknown, 404);
}
