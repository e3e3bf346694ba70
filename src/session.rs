//! Browser session tokens
//!
//! Session tokens are compact HS256 JWTs. The gateway only verifies them;
//! issuing is done by whatever serves the editor page, which shares the
//! secret.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use serde_json::Value;
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Why a session token was rejected
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("session tokens are not configured")]
    NotConfigured,
    #[error("malformed session token")]
    Malformed,
    #[error("unsupported token algorithm")]
    UnsupportedAlgorithm,
    #[error("invalid session token signature")]
    BadSignature,
    #[error("session token expired")]
    Expired,
}

/// Verified token payload
#[derive(Debug, Clone)]
pub struct SessionClaims {
    pub subject: Option<String>,
    pub expires_at: Option<i64>,
    pub payload: Value,
}

/// Token verification seam
pub trait SessionValidator: Send + Sync {
    fn validate(&self, token: &str) -> Result<SessionClaims, SessionError>;
}

#[derive(Deserialize)]
struct JwtHeader {
    alg: String,
}

/// HS256 validator over a shared secret
///
/// Without a secret every token is rejected.
pub struct HmacSessionValidator {
    secret: Option<Vec<u8>>,
}

impl HmacSessionValidator {
    pub fn new(secret: Option<&str>) -> Self {
        Self {
            secret: secret.map(|s| s.as_bytes().to_vec()),
        }
    }

    fn mac(&self) -> Result<HmacSha256, SessionError> {
        let secret = self.secret.as_deref().ok_or(SessionError::NotConfigured)?;
        HmacSha256::new_from_slice(secret).map_err(|_| SessionError::NotConfigured)
    }

    /// Sign `payload` as a compact HS256 token
    pub fn sign(&self, payload: &Value) -> Result<String, SessionError> {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
        let body = URL_SAFE_NO_PAD.encode(payload.to_string());
        let signing_input = format!("{}.{}", header, body);

        let mut mac = self.mac()?;
        mac.update(signing_input.as_bytes());
        let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());
        Ok(format!("{}.{}", signing_input, signature))
    }
}

impl SessionValidator for HmacSessionValidator {
    fn validate(&self, token: &str) -> Result<SessionClaims, SessionError> {
        let mut mac = self.mac()?;

        let mut parts = token.trim().split('.');
        let (Some(header), Some(payload), Some(signature), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(SessionError::Malformed);
        };
        let signing_input = format!("{}.{}", header, payload);

        let header_bytes = URL_SAFE_NO_PAD
            .decode(header)
            .map_err(|_| SessionError::Malformed)?;
        let header: JwtHeader =
            serde_json::from_slice(&header_bytes).map_err(|_| SessionError::Malformed)?;
        if header.alg != "HS256" {
            return Err(SessionError::UnsupportedAlgorithm);
        }

        let signature = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| SessionError::Malformed)?;
        mac.update(signing_input.as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| SessionError::BadSignature)?;

        let payload_bytes = URL_SAFE_NO_PAD
            .decode(payload)
            .map_err(|_| SessionError::Malformed)?;
        let payload: Value =
            serde_json::from_slice(&payload_bytes).map_err(|_| SessionError::Malformed)?;

        let expires_at = payload.get("exp").and_then(Value::as_i64);
        if let Some(exp) = expires_at {
            if exp <= chrono::Utc::now().timestamp() {
                return Err(SessionError::Expired);
            }
        }

        Ok(SessionClaims {
            subject: payload.get("sub").and_then(Value::as_str).map(String::from),
            expires_at,
            payload,
        })
    }
}
