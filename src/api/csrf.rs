//! CSRF protection and security headers.
//!
//! Double-submit cookie scheme: a readable `csrfToken` cookie is issued to
//! every client, and unsafe methods must echo its value in the
//! `x-csrf-token` header. Works because a cross-site attacker can post to
//! the API but cannot read our cookie to copy it into a header.

use axum::{
    body::Body,
    http::{header, HeaderValue, Method, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};

use crate::api::error::ApiError;

pub const CSRF_COOKIE: &str = "csrfToken";
pub const CSRF_HEADER: &str = "x-csrf-token";

/// Verify the double-submit token on unsafe methods and make sure every
/// client leaves with a csrfToken cookie.
pub async fn csrf_protection(request: Request<Body>, next: Next) -> Result<Response, Response> {
    let jar = CookieJar::from_headers(request.headers());
    let cookie_token = jar.get(CSRF_COOKIE).map(|c| c.value().to_string());

    let safe = matches!(
        *request.method(),
        Method::GET | Method::HEAD | Method::OPTIONS
    );

    if !safe {
        let header_token = request
            .headers()
            .get(CSRF_HEADER)
            .and_then(|v| v.to_str().ok());

        let valid = matches!(
            (&cookie_token, header_token),
            (Some(cookie), Some(header)) if !cookie.is_empty() && cookie == header
        );

        if !valid {
            tracing::warn!(method = %request.method(), path = %request.uri().path(), "CSRF token mismatch");
            return Err(ApiError::forbidden("Invalid CSRF token").into_response());
        }
    }

    let mut response = next.run(request).await;

    // Issue a token to clients that do not have one yet. Not http_only: the
    // front end must read it to echo it back.
    if cookie_token.is_none() {
        let cookie = Cookie::build((CSRF_COOKIE, uuid::Uuid::new_v4().to_string()))
            .path("/")
            .same_site(SameSite::Lax)
            .build();
        if let Ok(value) = HeaderValue::from_str(&cookie.to_string()) {
            response.headers_mut().append(header::SET_COOKIE, value);
        }
    }

    Ok(response)
}

/// Attach baseline security headers to every response.
pub async fn security_headers(request: Request<Body>, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();

    headers.insert(
        "X-Content-Type-Options",
        HeaderValue::from_static("nosniff"),
    );
    headers.insert("X-Frame-Options", HeaderValue::from_static("DENY"));
    headers.insert(
        "Referrer-Policy",
        HeaderValue::from_static("strict-origin-when-cross-origin"),
    );
    headers.insert(
        "Strict-Transport-Security",
        HeaderValue::from_static("max-age=31536000; includeSubDomains"),
    );

    response
}
