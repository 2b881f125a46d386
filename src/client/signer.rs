//! Request signing
//!
//! The signature is `HMAC-SHA256(secret, subject_id + api_key + nonce)`,
//! hex-encoded in upper case. Nonces are wall-clock milliseconds, bumped so
//! that no two requests issued by this process ever share one.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::credentials::Credential;

type HmacSha256 = Hmac<Sha256>;

/// Strictly increasing millisecond nonces
#[derive(Debug, Default)]
pub struct NonceSource {
    last: AtomicU64,
}

impl NonceSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next nonce: current time in ms, or `last + 1` if the clock did not advance
    pub fn next(&self) -> u64 {
        let now = chrono::Utc::now().timestamp_millis().max(0) as u64;
        let mut last = self.last.load(Ordering::SeqCst);
        loop {
            let candidate = now.max(last + 1);
            match self
                .last
                .compare_exchange(last, candidate, Ordering::SeqCst, Ordering::SeqCst)
            {
                Ok(_) => return candidate,
                Err(actual) => last = actual,
            }
        }
    }
}

/// Authentication fields for one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedAuth {
    pub key: String,
    pub nonce: String,
    pub signature: String,
}

/// Compute the upper-case hex signature for a credential and nonce
pub fn sign(credential: &Credential, nonce: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(credential.api_secret.as_bytes())
        .unwrap_or_else(|_| unreachable!("HMAC accepts keys of any length"));
    mac.update(credential.subject_id.as_bytes());
    mac.update(credential.api_key.as_bytes());
    mac.update(nonce.as_bytes());
    hex::encode_upper(mac.finalize().into_bytes())
}

/// Sign a request with a fresh nonce
pub fn authenticate(credential: &Credential, nonces: &NonceSource) -> SignedAuth {
    let nonce = nonces.next().to_string();
    SignedAuth {
        key: credential.api_key.clone(),
        signature: sign(credential, &nonce),
        nonce,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credential() -> Credential {
        Credential {
            api_key: "key".to_string(),
            api_secret: "secret".to_string(),
            subject_id: "user".to_string(),
        }
    }

    #[test]
    fn test_signature_matches_reference_hmac() {
        // HMAC-SHA256("secret", "userkey1700000000000")
        let mut mac = HmacSha256::new_from_slice(b"secret").unwrap();
        mac.update(b"userkey1700000000000");
        let expected = hex::encode_upper(mac.finalize().into_bytes());

        assert_eq!(sign(&credential(), "1700000000000"), expected);
        assert_eq!(expected.len(), 64);
        assert!(expected.chars().all(|c| !c.is_ascii_lowercase()));
    }

    #[test]
    fn test_signature_depends_on_nonce() {
        assert_ne!(sign(&credential(), "1"), sign(&credential(), "2"));
    }

    #[test]
    fn test_nonces_strictly_increase() {
        let nonces = NonceSource::new();
        let mut previous = nonces.next();
        for _ in 0..1000 {
            let next = nonces.next();
            assert!(next > previous);
            previous = next;
        }
    }

    #[test]
    fn test_authenticate_never_reuses_nonce() {
        let nonces = NonceSource::new();
        let a = authenticate(&credential(), &nonces);
        let b = authenticate(&credential(), &nonces);
        assert_ne!(a.nonce, b.nonce);
        assert_ne!(a.signature, b.signature);
        assert_eq!(a.key, "key");
    }
}
