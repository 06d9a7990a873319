use anyhow::{bail, Context};
use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Collaboration sessions are long-lived, so tokens last a working day.
pub const ACCESS_TOKEN_TTL_HOURS: i64 = 8;

const MIN_SECRET_BYTES: usize = 32;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct AccessTokenClaims {
    sub: String,
    username: String,
    iat: i64,
    exp: i64,
}

impl AccessTokenClaims {
    fn issue(user_id: Uuid, username: &str, issued_at: i64) -> Self {
        Self {
            sub: user_id.to_string(),
            username: username.to_string(),
            iat: issued_at,
            exp: issued_at + Duration::hours(ACCESS_TOKEN_TTL_HOURS).num_seconds(),
        }
    }
}

/// The resolved principal behind a validated access token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedPrincipal {
    pub user_id: Uuid,
    pub username: String,
}

#[derive(Clone)]
pub struct JwtAccessTokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JwtAccessTokenService {
    pub fn new(secret: &str) -> anyhow::Result<Self> {
        if secret.len() < MIN_SECRET_BYTES {
            bail!("jwt secret must be at least {MIN_SECRET_BYTES} characters long");
        }

        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        })
    }

    pub fn issue_access_token(&self, user_id: Uuid, username: &str) -> anyhow::Result<String> {
        let claims = AccessTokenClaims::issue(user_id, username, Utc::now().timestamp());
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .context("failed to encode access token")
    }

    pub fn validate_access_token(&self, token: &str) -> anyhow::Result<AuthenticatedPrincipal> {
        let claims =
            jsonwebtoken::decode::<AccessTokenClaims>(token, &self.decoding_key, &self.validation)
                .context("failed to decode access token")?
                .claims;

        let user_id = Uuid::parse_str(&claims.sub)
            .with_context(|| format!("access token subject '{}' is not a UUID", claims.sub))?;

        Ok(AuthenticatedPrincipal { user_id, username: claims.username })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_SECRET: &str = "coedit_test_secret_that_is_definitely_long_enough";

    fn service() -> JwtAccessTokenService {
        JwtAccessTokenService::new(TEST_SECRET).expect("service should initialize")
    }

    #[test]
    fn issues_and_validates_tokens() {
        let user_id = Uuid::new_v4();
        let token = service().issue_access_token(user_id, "alice").expect("token should be issued");
        let principal =
            service().validate_access_token(&token).expect("token should validate");

        assert_eq!(principal.user_id, user_id);
        assert_eq!(principal.username, "alice");
    }

    #[test]
    fn rejects_tampered_tokens() {
        let token = service()
            .issue_access_token(Uuid::new_v4(), "alice")
            .expect("token should be issued");
        assert!(service().validate_access_token(&format!("{token}x")).is_err());
    }

    #[test]
    fn rejects_tokens_from_other_secret() {
        let other = JwtAccessTokenService::new("another_secret_that_is_also_long_enough!!")
            .expect("service should initialize");
        let token = other
            .issue_access_token(Uuid::new_v4(), "mallory")
            .expect("token should be issued");
        assert!(service().validate_access_token(&token).is_err());
    }

    #[test]
    fn rejects_expired_tokens() {
        let issued_at = 1_000_000; // far in the past
        let claims = AccessTokenClaims::issue(Uuid::new_v4(), "alice", issued_at);
        let token = jsonwebtoken::encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(TEST_SECRET.as_bytes()),
        )
        .expect("token should encode");

        assert!(service().validate_access_token(&token).is_err());
    }

    #[test]
    fn rejects_tokens_without_uuid_subject() {
        let claims = AccessTokenClaims {
            sub: "not-a-uuid".to_string(),
            username: "alice".to_string(),
            iat: Utc::now().timestamp(),
            exp: Utc::now().timestamp() + 600,
        };
        let token = jsonwebtoken::encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(TEST_SECRET.as_bytes()),
        )
        .expect("token should encode");

        assert!(service().validate_access_token(&token).is_err());
    }

    #[test]
    fn rejects_short_secret() {
        assert!(JwtAccessTokenService::new("too_short").is_err());
    }
}
