use bcrypt::{hash, verify, DEFAULT_COST};
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};

use crate::error::{Error, Result};
use crate::models::AuthPayload;

/// Signing material for session tokens.
#[derive(Clone)]
pub struct AuthKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl_secs: i64,
}

impl AuthKeys {
    pub fn new(secret: &str, ttl_secs: i64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl_secs,
        }
    }

    /// Issue a token whose subject is the user's email.
    pub fn create_jwt(&self, email: &str) -> Result<String> {
        let exp = Utc::now().timestamp() + self.ttl_secs;
        let claims = AuthPayload {
            sub: email.to_owned(),
            exp: usize::try_from(exp).map_err(|_| Error::Auth("token expiry out of range".into()))?,
        };
        encode(&Header::default(), &claims, &self.encoding)
            .map_err(|e| Error::Auth(format!("could not sign token: {e}")))
    }

    pub fn validate_jwt(&self, token: &str) -> Result<AuthPayload> {
        let token_data = decode::<AuthPayload>(token, &self.decoding, &Validation::new(Algorithm::HS256))
            .map_err(|e| Error::Auth(e.to_string()))?;
        Ok(token_data.claims)
    }
}

pub fn hash_password(password: &str) -> Result<String> {
    hash(password, DEFAULT_COST).map_err(|e| Error::Auth(format!("could not hash password: {e}")))
}

/// Malformed hashes count as a mismatch.
pub fn verify_password(password: &str, hash: &str) -> bool {
    verify(password, hash).unwrap_or(false)
}
