use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Separator inside a token subject: `<token id>--<user name>--<real name>`
pub const SUBJECT_SEPARATOR: &str = "--";

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Claims {
    pub id: String,
    pub exp: i64,
    pub iat: i64,
}

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("token secret not configured")]
    MissingSecret,

    #[error("token generation error: {0}")]
    Generation(String),

    #[error("invalid token: {0}")]
    Invalid(String),
}

/// Signs and verifies time-limited HS256 tokens
#[derive(Clone)]
pub struct TokenCodec {
    secret: String,
    expiration_secs: u64,
}

impl std::fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCodec")
            .field("expiration_secs", &self.expiration_secs)
            .finish_non_exhaustive()
    }
}

impl TokenCodec {
    pub fn new(secret: impl Into<String>, expiration_secs: u64) -> Self {
        Self { secret: secret.into(), expiration_secs }
    }

    /// Token subject for a user session
    pub fn subject(token_id: &str, user_name: &str, real_name: &str) -> String {
        [token_id, user_name, real_name].join(SUBJECT_SEPARATOR)
    }

    pub fn encode(&self, subject: &str) -> Result<String, TokenError> {
        if self.secret.is_empty() {
            return Err(TokenError::MissingSecret);
        }
        let now = Utc::now();
        let expires_at = i64::try_from(self.expiration_secs)
            .ok()
            .and_then(Duration::try_seconds)
            .and_then(|lifetime| now.checked_add_signed(lifetime))
            .ok_or_else(|| {
                TokenError::Generation(format!("token lifetime of {} seconds is out of range", self.expiration_secs))
            })?;
        let claims = Claims {
            id: subject.to_string(),
            exp: expires_at.timestamp(),
            iat: now.timestamp(),
        };
        encode(&Header::default(), &claims, &EncodingKey::from_secret(self.secret.as_bytes()))
            .map_err(|e| TokenError::Generation(e.to_string()))
    }

    pub fn decode(&self, token: &str) -> Result<Claims, TokenError> {
        if self.secret.is_empty() {
            return Err(TokenError::MissingSecret);
        }
        let mut validation = Validation::default();
        validation.leeway = 0;
        decode::<Claims>(token, &DecodingKey::from_secret(self.secret.as_bytes()), &validation)
            .map(|data| data.claims)
            .map_err(|e| TokenError::Invalid(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_subject() {
        let codec = TokenCodec::new("s3cret", 60);
        let subject = TokenCodec::subject("abc", "laoxu", "Lao Xu");
        let token = codec.encode(&subject).unwrap();
        assert_eq!(codec.decode(&token).unwrap().id, subject);
    }

    #[test]
    fn rejects_foreign_and_expired_tokens() {
        let token = TokenCodec::new("one", 60).encode("x--y--z").unwrap();
        assert!(matches!(TokenCodec::new("two", 60).decode(&token), Err(TokenError::Invalid(_))));

        let expired = encode(
            &Header::default(),
            &Claims { id: "x--y--z".into(), exp: Utc::now().timestamp() - 10, iat: 0 },
            &EncodingKey::from_secret(b"one"),
        )
        .unwrap();
        assert!(TokenCodec::new("one", 60).decode(&expired).is_err());
        assert!(TokenCodec::new("one", 60).decode("garbage").is_err());
    }

    #[test]
    fn oversized_lifetime_is_a_generation_error() {
        for secs in [10_000_000_000_000_000, u64::MAX, i64::MAX as u64] {
            let result = TokenCodec::new("s", secs).encode("a--b--c");
            assert!(matches!(result, Err(TokenError::Generation(_))), "{}", secs);
        }
        // a century still fits
        assert!(TokenCodec::new("s", 100 * 365 * 24 * 3600).encode("a--b--c").is_ok());
    }

    #[test]
    fn empty_secret_is_an_error() {
        assert!(matches!(TokenCodec::new("", 60).encode("x"), Err(TokenError::MissingSecret)));
    }
}
