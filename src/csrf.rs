use axum_extra::extract::cookie::{Cookie, Key, SameSite, SignedCookieJar};
use sha2::{Digest, Sha512};
use uuid::Uuid;

/// Cookie holding the signed token
pub const CSRF_COOKIE: &str = "csrf_token";

/// Shown when a form post fails the token check
pub const INVALID_TOKEN: &str = "The CSRF token is missing or invalid.";

const TOKEN_LIFETIME_HOURS: i64 = 8;

/// Derive the cookie signing key from the configured secret
///
/// Any secret length is accepted; it is stretched to the 64 bytes the
/// signing key needs.
pub fn signing_key(secret: &str) -> Key {
    let digest = Sha512::digest(secret.as_bytes());
    Key::from(&digest)
}

/// A fresh random token
pub fn new_token() -> String {
    Uuid::new_v4().simple().to_string()
}

fn token_cookie(token: String) -> Cookie<'static> {
    Cookie::build((CSRF_COOKIE, token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Strict)
        .max_age(time::Duration::hours(TOKEN_LIFETIME_HOURS))
        .build()
}

/// Return the token already carried by the jar, or add a new one
///
/// Cookies whose signature does not verify are treated as absent and
/// replaced.
pub fn ensure_token(jar: SignedCookieJar) -> (SignedCookieJar, String) {
    if let Some(cookie) = jar.get(CSRF_COOKIE) {
        if !cookie.value().is_empty() {
            let token = cookie.value().to_string();
            return (jar, token);
        }
    }

    let token = new_token();
    let jar = jar.add(token_cookie(token.clone()));
    (jar, token)
}

/// Check a submitted form token against the signed cookie
pub fn verify(jar: &SignedCookieJar, submitted: Option<&str>) -> bool {
    match (jar.get(CSRF_COOKIE), submitted) {
        (Some(cookie), Some(token)) if !token.is_empty() => {
            constant_time_eq(cookie.value().as_bytes(), token.as_bytes())
        }
        _ => false,
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
