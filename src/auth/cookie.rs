use axum_extra::extract::cookie::{Cookie, SameSite};
use time::Duration;

pub const SESSION_COOKIE: &str = "token";

/// HTTP-only cookie carrying the session token.
pub fn session_cookie(token: String, max_age: std::time::Duration, secure: bool) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, token))
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .path("/")
        .max_age(Duration::seconds(max_age.as_secs() as i64))
        .build()
}

/// Expired, empty session cookie. Sent on every logout, whether or not the
/// request carried a session.
pub fn removal_cookie() -> Cookie<'static> {
    let mut cookie = Cookie::build((SESSION_COOKIE, ""))
        .http_only(true)
        .path("/")
        .build();
    cookie.make_removal();
    cookie
}
