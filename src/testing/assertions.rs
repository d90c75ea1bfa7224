//! Assertion helpers for responses produced by the test service

use actix_web::cookie::Cookie;
use actix_web::dev::ServiceResponse;
use actix_web::http::header;

/// Cookie set by the response, if any
#[must_use]
pub fn response_cookie<B>(response: &ServiceResponse<B>, name: &str) -> Option<Cookie<'static>> {
    response
        .response()
        .cookies()
        .find(|cookie| cookie.name() == name)
        .map(Cookie::into_owned)
}

/// `Location` header of a redirect
///
/// # Panics
///
/// Panics if the header is missing or not valid UTF-8.
#[must_use]
pub fn location<B>(response: &ServiceResponse<B>) -> String {
    response
        .headers()
        .get(header::LOCATION)
        .expect("Expected a Location header")
        .to_str()
        .expect("Location header should be ASCII")
        .to_string()
}

/// Assert that an HTTP response has the expected status code
///
/// # Panics
///
/// Panics if the response status does not match the expected status code.
pub fn assert_status<B>(response: &ServiceResponse<B>, expected_status: u16) {
    assert_eq!(
        response.status().as_u16(),
        expected_status,
        "Expected status {expected_status}, got {}",
        response.status()
    );
}

/// Assert that the response tells the browser to drop a cookie
///
/// # Panics
///
/// Panics if the cookie is absent or still carries a value.
pub fn assert_cookie_cleared<B>(response: &ServiceResponse<B>, name: &str) {
    let cookie = response_cookie(response, name)
        .unwrap_or_else(|| panic!("Expected cookie '{name}' to be cleared"));
    assert!(cookie.value().is_empty(), "Cookie '{name}' still has a value");
}
