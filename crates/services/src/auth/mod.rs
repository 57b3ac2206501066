use jsonwebtoken::{decode, DecodingKey, Validation};
use meetsfu_config::JwtSettings;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("token expired")]
    TokenExpired,
    #[error("invalid token: {0}")]
    InvalidToken(String),
}

/// Claims presented by the bearer token at connection handshake. The token
/// itself is minted by the (out-of-scope) web front-end's login flow; this
/// service only verifies it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    #[serde(rename = "userId")]
    pub user_id: String,
    pub email: String,
    pub name: String,
    #[serde(default)]
    pub picture: Option<String>,
    pub exp: i64,
}

pub struct AuthVerifier {
    decoding_key: DecodingKey,
}

impl AuthVerifier {
    pub fn new(jwt_settings: &JwtSettings) -> Self {
        Self {
            decoding_key: DecodingKey::from_secret(jwt_settings.secret.as_bytes()),
        }
    }

    /// Verifies a bearer token presented in the WebSocket handshake metadata.
    /// Missing/expired/invalid tokens all surface as `UNAUTHENTICATED` to the
    /// caller, which must close the connection before dispatching any event.
    /// The front-end-minted token carries no `iss` claim, so validation
    /// checks signature and expiry only.
    pub fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        let validation = Validation::default();

        decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                _ => AuthError::InvalidToken(e.to_string()),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    fn settings() -> JwtSettings {
        JwtSettings {
            secret: "test-secret".to_string(),
            issuer: "meetsfu".to_string(),
        }
    }

    fn sign(claims: &Claims, secret: &str) -> String {
        encode(
            &Header::default(),
            claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn verifies_a_well_formed_token() {
        let verifier = AuthVerifier::new(&settings());
        let claims = Claims {
            user_id: "abc123".to_string(),
            email: "alice@example.com".to_string(),
            name: "Alice".to_string(),
            picture: None,
            exp: (chrono_now() + 3600),
        };
        let token = sign(&claims, "test-secret");
        let verified = verifier.verify(&token).unwrap();
        assert_eq!(verified.user_id, "abc123");
    }

    #[test]
    fn rejects_expired_token() {
        let verifier = AuthVerifier::new(&settings());
        let claims = Claims {
            user_id: "abc123".to_string(),
            email: "alice@example.com".to_string(),
            name: "Alice".to_string(),
            picture: None,
            exp: chrono_now() - 3600,
        };
        let token = sign(&claims, "test-secret");
        assert!(matches!(
            verifier.verify(&token),
            Err(AuthError::TokenExpired)
        ));
    }

    #[test]
    fn rejects_wrong_secret() {
        let verifier = AuthVerifier::new(&settings());
        let claims = Claims {
            user_id: "abc123".to_string(),
            email: "alice@example.com".to_string(),
            name: "Alice".to_string(),
            picture: None,
            exp: chrono_now() + 3600,
        };
        let token = sign(&claims, "wrong-secret");
        assert!(verifier.verify(&token).is_err());
    }

    fn chrono_now() -> i64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_secs() as i64
    }
}
