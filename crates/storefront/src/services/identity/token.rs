//! Access and rotation credential encoding.
//!
//! An access credential is `base64url(claims JSON) "." base64url(HMAC-SHA256)`.
//! A rotation credential is 32 random bytes, base64url encoded; only its
//! SHA-256 digest is ever stored.

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256};

use luzimarket_core::AccessClaims;

use super::IdentityError;

type HmacSha256 = Hmac<Sha256>;

/// Length of a rotation credential before encoding.
const ROTATION_TOKEN_BYTES: usize = 32;

/// Signs and verifies access credentials.
#[derive(Clone)]
pub struct TokenSigner {
    secret: SecretString,
}

impl std::fmt::Debug for TokenSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSigner")
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

impl TokenSigner {
    #[must_use]
    pub const fn new(secret: SecretString) -> Self {
        Self { secret }
    }

    fn mac(&self) -> Result<HmacSha256, IdentityError> {
        HmacSha256::new_from_slice(self.secret.expose_secret().as_bytes())
            .map_err(|e| IdentityError::Encoding(e.to_string()))
    }

    /// Produce a signed access credential for `claims`.
    ///
    /// # Errors
    ///
    /// Returns `IdentityError::Encoding` if the claims cannot be serialized.
    pub fn sign(&self, claims: &AccessClaims) -> Result<String, IdentityError> {
        let json = serde_json::to_vec(claims).map_err(|e| IdentityError::Encoding(e.to_string()))?;
        let payload = URL_SAFE_NO_PAD.encode(json);

        let mut mac = self.mac()?;
        mac.update(payload.as_bytes());
        let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

        Ok(format!("{payload}.{signature}"))
    }

    /// Verify signature and expiry, returning the claims.
    ///
    /// Returns `None` for anything that is not a valid, unexpired credential.
    #[must_use]
    pub fn verify(&self, token: &str, now: DateTime<Utc>) -> Option<AccessClaims> {
        let (payload, signature) = token.split_once('.')?;
        let signature = URL_SAFE_NO_PAD.decode(signature).ok()?;

        let mut mac = self.mac().ok()?;
        mac.update(payload.as_bytes());
        mac.verify_slice(&signature).ok()?;

        let json = URL_SAFE_NO_PAD.decode(payload).ok()?;
        let claims: AccessClaims = serde_json::from_slice(&json).ok()?;
        if claims.is_expired(now) {
            return None;
        }
        Some(claims)
    }
}

/// Generate a fresh opaque rotation credential.
#[must_use]
pub fn generate_rotation_token() -> String {
    let bytes: [u8; ROTATION_TOKEN_BYTES] = rand::random();
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Digest under which a rotation credential is stored.
#[must_use]
pub fn hash_rotation_token(token: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(token.as_bytes()))
}
