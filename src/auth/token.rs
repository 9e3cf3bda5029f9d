use chrono::Utc;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::{ChatError, ChatResult};

/// Claims of a session token issued by the upstream identity service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Opaque user id.
    pub sub: String,
    pub exp: i64,
    pub iat: i64,
    pub iss: String,
}

/// Checks HS256 session tokens signed with the secret shared with the upstream.
#[derive(Clone)]
pub struct TokenVerifier {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
}

impl TokenVerifier {
    pub fn new(secret: &str, issuer: impl Into<String>) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            issuer: issuer.into(),
        }
    }

    /// Signs a token for `user_id`, the way the upstream does.
    pub fn issue(&self, user_id: &str, ttl: chrono::Duration) -> anyhow::Result<String> {
        let now = Utc::now();
        let claims = Claims {
            sub: user_id.to_owned(),
            exp: (now + ttl).timestamp(),
            iat: now.timestamp(),
            iss: self.issuer.clone(),
        };
        Ok(encode(&Header::default(), &claims, &self.encoding_key)?)
    }

    /// The user id a valid, unexpired token vouches for.
    pub fn verify(&self, token: &str) -> ChatResult<String> {
        let mut validation = Validation::default();
        validation.set_issuer(&[&self.issuer]);

        let claims = decode::<Claims>(token, &self.decoding_key, &validation)
            .map_err(|e| ChatError::Unauthenticated(format!("session token rejected: {e}")))?
            .claims;
        if claims.sub.trim().is_empty() {
            return Err(ChatError::Unauthenticated("session token has no subject".into()));
        }
        Ok(claims.sub)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn verifier(secret: &str) -> TokenVerifier {
        TokenVerifier::new(secret, "test-issuer")
    }

    #[test]
    fn issued_token_verifies_to_its_subject() {
        let verifier = verifier("s3cret");
        let token = verifier.issue("u1", chrono::Duration::minutes(5)).unwrap();
        assert_eq!(verifier.verify(&token).unwrap(), "u1");
    }

    #[test]
    fn foreign_secret_is_rejected() {
        let token = verifier("other").issue("u1", chrono::Duration::minutes(5)).unwrap();
        assert!(matches!(verifier("s3cret").verify(&token), Err(ChatError::Unauthenticated(_))));
    }

    #[test]
    fn foreign_issuer_is_rejected() {
        let token = TokenVerifier::new("s3cret", "elsewhere")
            .issue("u1", chrono::Duration::minutes(5))
            .unwrap();
        assert!(matches!(verifier("s3cret").verify(&token), Err(ChatError::Unauthenticated(_))));
    }

    #[test]
    fn expired_token_is_rejected() {
        let verifier = verifier("s3cret");
        let token = verifier.issue("u1", chrono::Duration::hours(-1)).unwrap();
        assert!(matches!(verifier.verify(&token), Err(ChatError::Unauthenticated(_))));
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(matches!(verifier("s3cret").verify("not-a-token"), Err(ChatError::Unauthenticated(_))));
    }
}
