use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::RngCore;

/// Number of random bytes behind a CSRF state value (43 encoded chars).
pub const STATE_BYTES: usize = 32;

/// Source of cryptographically secure random bytes.
///
/// Implementations panic if the underlying entropy source fails.
pub trait SecretSource: Send + Sync {
    fn fill(&self, buf: &mut [u8]);
}

/// The process CSPRNG (`rand::rng()`, seeded from the OS).
#[derive(Debug, Default, Clone, Copy)]
pub struct OsSecretSource;

impl SecretSource for OsSecretSource {
    fn fill(&self, buf: &mut [u8]) {
        rand::rng().fill_bytes(buf);
    }
}

/// Generate `byte_length` random bytes and return them as unpadded base64url.
pub fn generate(source: &dyn SecretSource, byte_length: usize) -> String {
    let mut buf = vec![0u8; byte_length];
    source.fill(&mut buf);
    URL_SAFE_NO_PAD.encode(&buf)
}

/// Generate an opaque CSRF `state` value for one login attempt.
pub fn generate_state(source: &dyn SecretSource) -> String {
    generate(source, STATE_BYTES)
}
