use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use crate::messages::{ApiResponse, MessageKey};

/// Caller identity decoded from a bearer credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Principal {
    pub user_id: i64,
    pub is_admin: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AccessClaims {
    /// Issued as a string by the user service; integers are accepted too.
    #[serde(default)]
    pub user_id: serde_json::Value,
    #[serde(default)]
    pub is_admin: bool,
    pub exp: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("missing credentials")]
    Missing,
    #[error("invalid token: {0}")]
    InvalidToken(String),
    #[error("token has no user_id")]
    MissingUserId,
    #[error("invalid user_id type")]
    InvalidUserId,
}

impl AuthError {
    pub fn response(&self) -> ApiResponse {
        MessageKey::AuthUnauthorized.render(&[("error", self)])
    }
}

/// HS256 validation with the secret shared by all services.
#[derive(Clone)]
pub struct JwtAuthenticator {
    decoding: DecodingKey,
    validation: Validation,
}

impl JwtAuthenticator {
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.required_spec_claims = ["exp".to_string()].into_iter().collect();

        Self {
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    /// Accepts `Bearer <token>` or the bare token.
    pub fn authenticate(&self, authorization: &str) -> Result<Principal, AuthError> {
        let token = authorization.trim();
        let token = token
            .strip_prefix("Bearer ")
            .or_else(|| token.strip_prefix("bearer "))
            .unwrap_or(token)
            .trim();
        if token.is_empty() {
            return Err(AuthError::Missing);
        }

        let data = jsonwebtoken::decode::<AccessClaims>(token, &self.decoding, &self.validation)
            .map_err(|e| AuthError::InvalidToken(e.to_string()))?;

        let user_id = match &data.claims.user_id {
            serde_json::Value::Null => return Err(AuthError::MissingUserId),
            serde_json::Value::Number(n) => n.as_i64().ok_or(AuthError::InvalidUserId)?,
            serde_json::Value::String(s) if s.is_empty() => return Err(AuthError::MissingUserId),
            serde_json::Value::String(s) => s.parse().map_err(|_| AuthError::InvalidUserId)?,
            _ => return Err(AuthError::InvalidUserId),
        };

        Ok(Principal {
            user_id,
            is_admin: data.claims.is_admin,
        })
    }
}
