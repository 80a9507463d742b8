//! Single shared admin credential: the session cookie carries the same
//! 64-bit digest stored in config, compared byte-for-byte.

use axum_extra::extract::cookie::CookieJar;

pub const SESSION_COOKIE: &str = "athenaeum_session";

/// Whether `jar` carries a cookie matching the configured password digest.
/// An empty configured digest (no password set) never authenticates.
pub fn is_admin(jar: &CookieJar, password_hash: &str) -> bool {
    if password_hash.is_empty() {
        return false;
    }
    jar.get(SESSION_COOKIE)
        .map(|c| c.value() == password_hash)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum_extra::extract::cookie::Cookie;

    #[test]
    fn empty_configured_digest_never_authenticates() {
        let jar = CookieJar::new().add(Cookie::new(SESSION_COOKIE, "anything"));
        assert!(!is_admin(&jar, ""));
    }

    #[test]
    fn matching_cookie_authenticates() {
        let jar = CookieJar::new().add(Cookie::new(SESSION_COOKIE, "deadbeefdeadbeef"));
        assert!(is_admin(&jar, "deadbeefdeadbeef"));
    }

    #[test]
    fn missing_or_mismatched_cookie_does_not_authenticate() {
        let jar = CookieJar::new();
        assert!(!is_admin(&jar, "deadbeefdeadbeef"));
        let jar = CookieJar::new().add(Cookie::new(SESSION_COOKIE, "wrong"));
        assert!(!is_admin(&jar, "deadbeefdeadbeef"));
    }
}
