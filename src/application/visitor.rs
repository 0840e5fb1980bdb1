//! Anonymous visitor identity carried in a signed cookie.
//!
//! The cookie value is `id:signature` where `id` is 128 random bits in hex and
//! the signature is HMAC-SHA256 of the id under the configured secret. The id
//! only distinguishes repeat visits for view dedup; it authenticates nothing.

use std::fmt;

use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use hmac::{Hmac, KeyInit, Mac};
use rand::RngCore;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use time::Duration;
use tracing::{debug, warn};

type HmacSha256 = Hmac<Sha256>;

pub const DEFAULT_COOKIE_NAME: &str = "atelier_visitor";
const ID_BYTES: usize = 16;
const COOKIE_LIFETIME_DAYS: i64 = 365;

/// Opaque visitor identifier: 32 lowercase hex characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VisitorId(String);

impl VisitorId {
    /// Accept only well-formed ids.
    pub fn parse(raw: &str) -> Option<Self> {
        let well_formed = raw.len() == ID_BYTES * 2
            && raw
                .chars()
                .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c));
        well_formed.then(|| Self(raw.to_string()))
    }

    fn mint() -> Self {
        let mut bytes = [0u8; ID_BYTES];
        OsRng.fill_bytes(&mut bytes);
        Self(hex::encode(bytes))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Hex SHA-256 of the id, as stored by the view counters.
    pub fn hash(&self) -> String {
        hex::encode(Sha256::digest(self.0.as_bytes()))
    }
}

impl fmt::Display for VisitorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone)]
pub struct VisitorIdentity {
    secret: Option<Vec<u8>>,
    cookie_name: String,
}

impl fmt::Debug for VisitorIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VisitorIdentity")
            .field("signed", &self.secret.is_some())
            .field("cookie_name", &self.cookie_name)
            .finish()
    }
}

impl VisitorIdentity {
    /// Without a secret, signatures degrade to a plain hash of the id, which
    /// anyone can forge. Only suitable for development.
    pub fn new(secret: Option<&str>, cookie_name: impl Into<String>) -> Self {
        let secret = secret
            .filter(|value| !value.is_empty())
            .map(|value| value.as_bytes().to_vec());
        if secret.is_none() {
            warn!(
                target = "atelier::application::visitor",
                mode = "degraded",
                "No visitor signing secret configured; visitor cookies are forgeable"
            );
        }
        Self {
            secret,
            cookie_name: cookie_name.into(),
        }
    }

    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    pub fn is_signed(&self) -> bool {
        self.secret.is_some()
    }

    /// Return the visitor id carried by `jar`, minting and setting a fresh
    /// one when the cookie is absent, malformed, or fails verification.
    pub fn get_or_create(&self, jar: CookieJar, secure: bool) -> (CookieJar, VisitorId) {
        if let Some(id) = jar
            .get(&self.cookie_name)
            .and_then(|cookie| self.verify(cookie.value()))
        {
            return (jar, id);
        }

        let id = VisitorId::mint();
        debug!(visitor_hash = %id.hash(), "Issued new visitor identity");
        let jar = jar.add(self.cookie_for(&id, secure));
        (jar, id)
    }

    /// Parse and verify a raw `id:signature` cookie value.
    pub fn verify(&self, raw: &str) -> Option<VisitorId> {
        let (id, signature) = raw.split_once(':')?;
        let id = VisitorId::parse(id)?;
        let expected = self.sign(&id);
        bool::from(expected.as_bytes().ct_eq(signature.as_bytes())).then_some(id)
    }

    /// The cookie value for `id`.
    pub fn token(&self, id: &VisitorId) -> String {
        format!("{}:{}", id.as_str(), self.sign(id))
    }

    fn sign(&self, id: &VisitorId) -> String {
        let Some(secret) = &self.secret else {
            return id.hash();
        };
        match <HmacSha256 as KeyInit>::new_from_slice(secret) {
            Ok(mut mac) => {
                mac.update(id.as_str().as_bytes());
                hex::encode(mac.finalize().into_bytes())
            }
            // HMAC accepts keys of any length; kept total for the type system.
            Err(_) => id.hash(),
        }
    }

    fn cookie_for(&self, id: &VisitorId, secure: bool) -> Cookie<'static> {
        Cookie::build((self.cookie_name.clone(), self.token(id)))
            .http_only(true)
            .secure(secure)
            .same_site(SameSite::Lax)
            .path("/")
            .max_age(Duration::days(COOKIE_LIFETIME_DAYS))
            .build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity() -> VisitorIdentity {
        VisitorIdentity::new(Some("test-secret"), DEFAULT_COOKIE_NAME)
    }

    #[test]
    fn minted_ids_are_128_bit_hex() {
        let id = VisitorId::mint();
        assert_eq!(id.as_str().len(), 32);
        assert!(VisitorId::parse(id.as_str()).is_some());
        assert_ne!(id, VisitorId::mint());
    }

    #[test]
    fn issued_cookie_round_trips() {
        let identity = identity();
        let (jar, first) = identity.get_or_create(CookieJar::new(), false);

        let cookie = jar.get(DEFAULT_COOKIE_NAME).expect("cookie set").clone();
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.same_site(), Some(SameSite::Lax));
        assert_eq!(cookie.path(), Some("/"));
        assert_eq!(cookie.max_age(), Some(Duration::days(365)));

        let returning = CookieJar::new().add(Cookie::new(DEFAULT_COOKIE_NAME, cookie.value().to_string()));
        let (_, second) = identity.get_or_create(returning, false);
        assert_eq!(first, second);
    }

    #[test]
    fn tampered_signature_mints_new_identity() {
        let identity = identity();
        let id = VisitorId::mint();
        let mut token = identity.token(&id);
        let last = token.pop().expect("non-empty token");
        token.push(if last == '0' { '1' } else { '0' });

        let jar = CookieJar::new().add(Cookie::new(DEFAULT_COOKIE_NAME, token));
        let (_, fresh) = identity.get_or_create(jar, false);
        assert_ne!(fresh, id);
    }

    #[test]
    fn signature_from_other_secret_is_rejected() {
        let other = VisitorIdentity::new(Some("another-secret"), DEFAULT_COOKIE_NAME);
        let id = VisitorId::mint();
        assert!(identity().verify(&other.token(&id)).is_none());
    }

    #[test]
    fn degraded_mode_accepts_plain_hash() {
        let identity = VisitorIdentity::new(None, DEFAULT_COOKIE_NAME);
        assert!(!identity.is_signed());

        let id = VisitorId::mint();
        let raw = format!("{}:{}", id.as_str(), id.hash());
        assert_eq!(identity.verify(&raw), Some(id));
    }

    #[test]
    fn malformed_values_are_rejected() {
        let identity = identity();
        for raw in ["", "no-colon", "zz:zz", "ABCDEF0123456789ABCDEF0123456789:sig"] {
            assert!(identity.verify(raw).is_none(), "accepted `{raw}`");
        }
    }

    #[test]
    fn secure_flag_follows_transport() {
        let (jar, _) = identity().get_or_create(CookieJar::new(), true);
        let cookie = jar.get(DEFAULT_COOKIE_NAME).expect("cookie set");
        assert_eq!(cookie.secure(), Some(true));
    }
}
