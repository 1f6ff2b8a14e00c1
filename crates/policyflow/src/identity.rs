//! Bearer session tokens.
//!
//! A token is `base64url(claims_json) "." hex(hmac_sha256(secret, base64url(claims_json)))`.
//! The claims carry the user id, the role granted at issue time and an
//! expiry. The caller's department is always read from the user row.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use policyflow_core::{CallerContext, CoreError, DocumentStore, Role, User};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;
use tracing::debug;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("missing bearer token")]
    Missing,

    #[error("malformed token")]
    Malformed,

    #[error("invalid token signature")]
    BadSignature,

    #[error("token expired")]
    Expired,

    #[error("unknown user")]
    UnknownUser,

    #[error("invalid signing key")]
    InvalidKey,
}

/// Claims embedded in a session token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    /// User id.
    pub sub: String,
    pub role: Role,
    /// Expiry, unix seconds.
    pub exp: i64,
}

/// Mints and checks session tokens with one shared secret.
#[derive(Clone)]
pub struct TokenIssuer {
    secret: Vec<u8>,
    ttl_secs: i64,
}

impl std::fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenIssuer")
            .field("secret", &"<redacted>")
            .field("ttl_secs", &self.ttl_secs)
            .finish()
    }
}

impl TokenIssuer {
    pub fn new(secret: &str, ttl_secs: u64) -> Self {
        Self {
            secret: secret.as_bytes().to_vec(),
            ttl_secs: i64::try_from(ttl_secs).unwrap_or(i64::MAX),
        }
    }

    pub fn issue(&self, user: &User) -> Result<String, AuthError> {
        self.issue_at(user, Utc::now())
    }

    pub fn issue_at(&self, user: &User, now: DateTime<Utc>) -> Result<String, AuthError> {
        let claims = SessionClaims {
            sub: user.id.clone(),
            role: user.role,
            exp: now.timestamp().saturating_add(self.ttl_secs),
        };
        let json = serde_json::to_vec(&claims).map_err(|_| AuthError::Malformed)?;
        let payload = URL_SAFE_NO_PAD.encode(json);
        let signature = hex::encode(self.mac(payload.as_bytes())?.finalize().into_bytes());
        debug!(user_id = %claims.sub, exp = claims.exp, "session token issued");
        Ok(format!("{}.{}", payload, signature))
    }

    pub fn verify(&self, token: &str) -> Result<SessionClaims, AuthError> {
        self.verify_at(token, Utc::now())
    }

    /// Check the MAC in constant time, then decode the claims and reject
    /// them once `exp` has passed.
    pub fn verify_at(&self, token: &str, now: DateTime<Utc>) -> Result<SessionClaims, AuthError> {
        let (payload, signature) = token.split_once('.').ok_or(AuthError::Malformed)?;
        let signature = hex::decode(signature).map_err(|_| AuthError::Malformed)?;
        self.mac(payload.as_bytes())?
            .verify_slice(&signature)
            .map_err(|_| AuthError::BadSignature)?;

        let json = URL_SAFE_NO_PAD
            .decode(payload)
            .map_err(|_| AuthError::Malformed)?;
        let claims: SessionClaims =
            serde_json::from_slice(&json).map_err(|_| AuthError::Malformed)?;
        if claims.exp <= now.timestamp() {
            return Err(AuthError::Expired);
        }
        Ok(claims)
    }

    fn mac(&self, data: &[u8]) -> Result<HmacSha256, AuthError> {
        let mut mac = HmacSha256::new_from_slice(&self.secret).map_err(|_| AuthError::InvalidKey)?;
        mac.update(data);
        Ok(mac)
    }
}

/// Build the caller context for verified claims. Role comes from the token,
/// department from the current user row.
pub fn resolve_caller(
    store: &dyn DocumentStore,
    claims: &SessionClaims,
) -> Result<CallerContext, ResolveError> {
    match store.get_user(&claims.sub) {
        Ok(user) => Ok(CallerContext::new(user.id, claims.role, user.department_id)),
        Err(CoreError::NotFound(_)) => Err(ResolveError::Auth(AuthError::UnknownUser)),
        Err(e) => Err(ResolveError::Store(e)),
    }
}

/// Failure to turn a token into a caller.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Store(CoreError),
}
