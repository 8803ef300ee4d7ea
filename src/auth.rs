/// Credential verification.
///
/// Token issuance lives with the external identity service; this module
/// only verifies bearer tokens into `(subject id, role)`. Signing is
/// exposed for tests and local tooling.
// region:    --- Imports
use crate::error::Error;
use axum::async_trait;
use axum::extract::{FromRef, FromRequestParts};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

// endregion: --- Imports

// region:    --- Claims

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    Admin,
    Dealer,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: i64,
    pub role: Role,
    pub email: String,
    pub exp: usize,
}

/// An authenticated caller, shared by the HTTP extractor and the realtime
/// gateway's handshake.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: i64,
    pub role: Role,
    pub email: String,
}

impl AuthUser {
    pub fn require_role(&self, role: Role) -> Result<(), Error> {
        if self.role == role {
            Ok(())
        } else {
            Err(Error::Forbidden)
        }
    }
}

// endregion: --- Claims

// region:    --- Keys

#[derive(Clone)]
pub struct AuthKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl AuthKeys {
    pub fn new(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }
}

const TOKEN_TTL_SECS: i64 = 3600;

pub fn sign_token(keys: &AuthKeys, user: &AuthUser) -> Result<String, Error> {
    let claims = Claims {
        sub: user.id,
        role: user.role,
        email: user.email.clone(),
        exp: (chrono::Utc::now().timestamp() + TOKEN_TTL_SECS) as usize,
    };
    encode(&Header::default(), &claims, &keys.encoding)
        .map_err(|e| Error::Unauthorized(format!("Token signing failed: {}", e)))
}

pub fn verify_token(keys: &AuthKeys, token: &str) -> Result<AuthUser, Error> {
    let data = decode::<Claims>(token, &keys.decoding, &Validation::default())
        .map_err(|e| Error::Unauthorized(format!("Invalid token: {}", e)))?;

    Ok(AuthUser {
        id: data.claims.sub,
        role: data.claims.role,
        email: data.claims.email,
    })
}

// endregion: --- Keys

// region:    --- Extractor

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    AuthKeys: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let keys = AuthKeys::from_ref(state);

        let header = parts
            .headers
            .get(AUTHORIZATION)
            .ok_or_else(|| Error::Unauthorized("Missing Authorization header".to_string()))?
            .to_str()
            .map_err(|_| Error::Unauthorized("Invalid Authorization header".to_string()))?;

        let token = header
            .strip_prefix("Bearer ")
            .ok_or_else(|| Error::Unauthorized("Expected a Bearer token".to_string()))?;

        verify_token(&keys, token)
    }
}

// endregion: --- Extractor

// region:    --- Tests

#[cfg(test)]
mod tests {
    use super::*;

    fn dealer() -> AuthUser {
        AuthUser {
            id: 42,
            role: Role::Dealer,
            email: "dealer@example.com".to_string(),
        }
    }

    #[test]
    fn sign_and_verify_round_trip() {
        let keys = AuthKeys::new("test-secret");
        let token = sign_token(&keys, &dealer()).unwrap();
        let verified = verify_token(&keys, &token).unwrap();
        assert_eq!(verified.id, 42);
        assert_eq!(verified.role, Role::Dealer);
        assert_eq!(verified.email, "dealer@example.com");
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let keys = AuthKeys::new("test-secret");
        let token = sign_token(&keys, &dealer()).unwrap();
        let other = AuthKeys::new("other-secret");
        assert!(matches!(
            verify_token(&other, &token),
            Err(Error::Unauthorized(_))
        ));
    }

    #[test]
    fn garbage_token_is_rejected() {
        let keys = AuthKeys::new("test-secret");
        assert!(matches!(
            verify_token(&keys, "not.a.token"),
            Err(Error::Unauthorized(_))
        ));
    }

    #[test]
    fn role_gate() {
        let user = dealer();
        assert!(user.require_role(Role::Dealer).is_ok());
        assert!(matches!(
            user.require_role(Role::Admin),
            Err(Error::Forbidden)
        ));
    }

    #[test]
    fn role_serializes_uppercase() {
        assert_eq!(
            serde_json::to_value(Role::Admin).unwrap(),
            serde_json::json!("ADMIN")
        );
        assert_eq!(
            serde_json::from_value::<Role>(serde_json::json!("DEALER")).unwrap(),
            Role::Dealer
        );
    }
}

// endregion: --- Tests
