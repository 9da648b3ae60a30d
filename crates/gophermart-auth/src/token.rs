use chrono::{DateTime, Duration, Utc};
use hmac::digest::Key;
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use thiserror::Error;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

const ID_LEN: usize = 16;
const MAC_LEN: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("malformed token")]
    Malformed,
    #[error("invalid token signature")]
    InvalidSignature,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedToken {
    pub token: String,
    /// Informational only: not covered by the signature.
    pub expires_at: DateTime<Utc>,
}

/// Issues and verifies bearer tokens with a fixed secret and lifetime.
#[derive(Clone)]
pub struct TokenCodec {
    secret: Vec<u8>,
    lifetime: Duration,
}

impl TokenCodec {
    pub fn new(secret: impl Into<Vec<u8>>, lifetime: Duration) -> Self {
        Self {
            secret: secret.into(),
            lifetime,
        }
    }

    pub fn issue(&self, user_id: Uuid) -> IssuedToken {
        issue(user_id, &self.secret, self.lifetime)
    }

    pub fn verify(&self, token: &str) -> Result<Uuid, TokenError> {
        verify(token, &self.secret)
    }

    pub fn lifetime(&self) -> Duration {
        self.lifetime
    }
}

impl std::fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCodec")
            .field("secret", &"<redacted>")
            .field("lifetime", &self.lifetime)
            .finish()
    }
}

/// HMAC key normalisation (RFC 2104): secrets longer than the block are
/// hashed, shorter ones are zero-padded.
fn signing_key(secret: &[u8]) -> Key<HmacSha256> {
    let mut key = Key::<HmacSha256>::default();
    if secret.len() > key.len() {
        let digest = Sha256::digest(secret);
        key[..digest.len()].copy_from_slice(&digest);
    } else {
        key[..secret.len()].copy_from_slice(secret);
    }
    key
}

fn mac_for(secret: &[u8], id: &[u8]) -> HmacSha256 {
    let mut mac = HmacSha256::new(&signing_key(secret));
    mac.update(id);
    mac
}

/// Sign `user_id` and hex-encode `id || hmac(id)`.
pub fn issue(user_id: Uuid, secret: &[u8], lifetime: Duration) -> IssuedToken {
    let id = user_id.as_bytes();
    let code = mac_for(secret, id).finalize().into_bytes();

    let mut raw = Vec::with_capacity(ID_LEN + MAC_LEN);
    raw.extend_from_slice(id);
    raw.extend_from_slice(&code);

    IssuedToken {
        token: hex::encode(raw),
        expires_at: Utc::now() + lifetime,
    }
}

/// Recover the user id from a token. The signature is compared in constant time.
pub fn verify(token: &str, secret: &[u8]) -> Result<Uuid, TokenError> {
    let raw = hex::decode(token).map_err(|_| TokenError::Malformed)?;
    if raw.len() < ID_LEN + MAC_LEN {
        return Err(TokenError::Malformed);
    }

    let (id, presented) = raw.split_at(ID_LEN);
    mac_for(secret, id)
        .verify_slice(presented)
        .map_err(|_| TokenError::InvalidSignature)?;

    Uuid::from_slice(id).map_err(|_| TokenError::Malformed)
}
