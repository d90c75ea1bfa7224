//! HTTP response helpers
//!
//! A small builder layer so that every JSON error, redirect and success body
//! leaving the server has the same shape: `{"error": code, "message": text}`
//! for failures.

use actix_web::{cookie::Cookie, http::header, http::StatusCode, HttpResponse};
use serde::Serialize;
use serde_json::{json, Value};

/// Unified response builder
pub struct ResponseBuilder;

impl ResponseBuilder {
    /// Start an error response with the given status
    #[must_use]
    pub fn error(status: StatusCode) -> ErrorResponseBuilder {
        ErrorResponseBuilder::new(status)
    }

    /// `401` with the default body
    #[must_use]
    pub fn unauthorized() -> ErrorResponseBuilder {
        Self::error(StatusCode::UNAUTHORIZED)
    }

    /// `404` with the default body
    #[must_use]
    pub fn not_found() -> ErrorResponseBuilder {
        Self::error(StatusCode::NOT_FOUND)
    }

    /// `302 Found` to `location`, carrying the given cookies
    #[must_use]
    pub fn redirect_with_cookies(location: &str, cookies: Vec<Cookie<'static>>) -> HttpResponse {
        let mut builder = HttpResponse::Found();
        for cookie in cookies {
            builder.cookie(cookie);
        }
        builder
            .append_header((header::LOCATION, location.to_string()))
            .finish()
    }

    /// `200 OK` with a JSON body
    #[must_use]
    pub fn ok<T: Serialize>(body: &T) -> HttpResponse {
        HttpResponse::Ok().json(body)
    }

    /// `201 Created` with a JSON body
    #[must_use]
    pub fn created<T: Serialize>(body: &T) -> HttpResponse {
        HttpResponse::Created().json(body)
    }

    /// `204 No Content`
    #[must_use]
    pub fn no_content() -> HttpResponse {
        HttpResponse::NoContent().finish()
    }
}

/// Builder for JSON error responses
pub struct ErrorResponseBuilder {
    status: StatusCode,
    error_code: Option<String>,
    message: Option<String>,
}

impl ErrorResponseBuilder {
    fn new(status: StatusCode) -> Self {
        Self {
            status,
            error_code: None,
            message: None,
        }
    }

    /// Set a custom error code (e.g. "`csrf_mismatch`")
    #[must_use]
    pub fn with_error_code(mut self, code: &str) -> Self {
        self.error_code = Some(code.to_string());
        self
    }

    /// Set a custom error message
    #[must_use]
    pub fn with_message(mut self, message: &str) -> Self {
        self.message = Some(message.to_string());
        self
    }

    /// Build the final `HttpResponse`
    #[must_use]
    pub fn build(self) -> HttpResponse {
        let error_code = self
            .error_code
            .unwrap_or_else(|| default_error_code(self.status).to_string());
        let message = self
            .message
            .unwrap_or_else(|| default_message(self.status).to_string());

        HttpResponse::build(self.status)
            .insert_header((header::CONTENT_TYPE, "application/json"))
            .json(json!({
                "error": Value::String(error_code),
                "message": Value::String(message),
            }))
    }
}

fn default_error_code(status: StatusCode) -> &'static str {
    match status {
        StatusCode::BAD_REQUEST => "invalid_request",
        StatusCode::UNAUTHORIZED => "unauthorized",
        StatusCode::FORBIDDEN => "forbidden",
        StatusCode::NOT_FOUND => "not_found",
        StatusCode::SERVICE_UNAVAILABLE => "service_unavailable",
        _ => "server_error",
    }
}

fn default_message(status: StatusCode) -> &'static str {
    match status {
        StatusCode::BAD_REQUEST => "The request is malformed or invalid",
        StatusCode::UNAUTHORIZED => "Authentication is required to access this resource",
        StatusCode::FORBIDDEN => "The request was refused",
        StatusCode::NOT_FOUND => "The requested resource does not exist",
        StatusCode::SERVICE_UNAVAILABLE => "The service is temporarily unavailable",
        _ => "An internal server error occurred",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::body::to_bytes;

    #[actix_web::test]
    async fn test_error_builder_defaults() {
        let response = ResponseBuilder::unauthorized().build();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let body = to_bytes(response.into_body()).await.unwrap();
        let json: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "unauthorized");
        assert!(json["message"].as_str().unwrap().contains("Authentication"));
    }

    #[actix_web::test]
    async fn test_error_builder_custom_fields() {
        let response = ResponseBuilder::error(StatusCode::BAD_REQUEST)
            .with_error_code("invalid_body")
            .with_message("Body must be a JSON object")
            .build();

        let body = to_bytes(response.into_body()).await.unwrap();
        let json: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "invalid_body");
        assert_eq!(json["message"], "Body must be a JSON object");
    }

    #[test]
    fn test_redirect_with_cookies() {
        let cookie = Cookie::build("sessionId", "abc").path("/").finish();
        let response = ResponseBuilder::redirect_with_cookies("/courses", vec![cookie]);

        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(
            response.headers().get(header::LOCATION).unwrap(),
            "/courses"
        );
        assert_eq!(response.cookies().count(), 1);
    }
}
