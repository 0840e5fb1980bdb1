//! Visitor cookie issue, round trip and tamper handling.

use axum_extra::extract::CookieJar;
use axum_extra::extract::cookie::Cookie;

use atelier::application::visitor::{DEFAULT_COOKIE_NAME, VisitorIdentity};

const SECRET: &str = "test-secret-with-enough-entropy";

fn identity() -> VisitorIdentity {
    VisitorIdentity::new(Some(SECRET), DEFAULT_COOKIE_NAME)
}

#[test]
fn fresh_visitor_gets_a_cookie() {
    let (jar, id) = identity().get_or_create(CookieJar::new(), false);

    let cookie = jar.get(DEFAULT_COOKIE_NAME).expect("cookie issued");
    assert!(cookie.value().starts_with(id.as_str()));
    assert_eq!(cookie.http_only(), Some(true));
    assert_ne!(cookie.secure(), Some(true));
}

#[test]
fn returning_visitor_keeps_their_id() {
    let identity = identity();
    let (jar, first) = identity.get_or_create(CookieJar::new(), true);
    let value = jar
        .get(DEFAULT_COOKIE_NAME)
        .expect("cookie issued")
        .value()
        .to_string();
    assert_eq!(
        jar.get(DEFAULT_COOKIE_NAME).and_then(|c| c.secure()),
        Some(true)
    );

    let returning = CookieJar::new().add(Cookie::new(DEFAULT_COOKIE_NAME, value));
    let (_, second) = identity.get_or_create(returning, true);
    assert_eq!(first, second);
}

#[test]
fn tampered_cookie_is_replaced() {
    let identity = identity();
    let (_, original) = identity.get_or_create(CookieJar::new(), false);
    let token = identity.token(&original);

    let (id, signature) = token.split_once(':').expect("id:signature");
    let mut forged_id = id.to_string();
    let last = if forged_id.ends_with('0') { '1' } else { '0' };
    forged_id.pop();
    forged_id.push(last);
    let forged = format!("{forged_id}:{signature}");

    assert!(identity.verify(&forged).is_none());
    let jar = CookieJar::new().add(Cookie::new(DEFAULT_COOKIE_NAME, forged));
    let (jar, replacement) = identity.get_or_create(jar, false);
    assert_ne!(replacement.as_str(), forged_id);
    assert_ne!(replacement, original);
    assert!(jar.get(DEFAULT_COOKIE_NAME).is_some());
}

#[test]
fn cookie_signed_under_another_secret_is_rejected() {
    let other = VisitorIdentity::new(Some("a-different-secret"), DEFAULT_COOKIE_NAME);
    let (_, id) = other.get_or_create(CookieJar::new(), false);

    assert!(identity().verify(&other.token(&id)).is_none());
    assert_eq!(other.verify(&other.token(&id)), Some(id));
}

#[test]
fn malformed_values_are_rejected() {
    let identity = identity();
    for raw in ["", "no-separator", "zz:zz", ":", "abc:def"] {
        assert!(identity.verify(raw).is_none(), "accepted {raw:?}");
    }
}
