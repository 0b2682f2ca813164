use std::fmt;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use sha2::{Digest, Sha256};

use crate::oauth::random::{self, SecretSource};

/// 96 random bytes encode to exactly 128 base64url characters, the RFC 7636 maximum.
const VERIFIER_BYTES: usize = 96;

/// The only challenge method offered. `plain` is deliberately unsupported.
pub const CHALLENGE_METHOD: &str = "S256";

/// PKCE verifier/challenge pair for a single login attempt (RFC 7636).
pub struct PkceChallenge {
    pub verifier: String,
    pub challenge: String,
    pub method: &'static str,
}

impl PkceChallenge {
    pub fn create(source: &dyn SecretSource) -> Self {
        let verifier = random::generate(source, VERIFIER_BYTES);
        let challenge = challenge_for(&verifier);
        PkceChallenge {
            verifier,
            challenge,
            method: CHALLENGE_METHOD,
        }
    }
}

impl fmt::Debug for PkceChallenge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PkceChallenge")
            .field("verifier", &"<redacted>")
            .field("challenge", &self.challenge)
            .field("method", &self.method)
            .finish()
    }
}

/// `base64url_nopad(SHA256(verifier))`
pub fn challenge_for(verifier: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hasher.finalize())
}
