use async_trait::async_trait;
use jsonwebtoken::{decode, DecodingKey, Validation};

use crate::config::JwtConfig;

use super::{AuthError, Claims, Identity, IdentityResolver, UpgradeRequest};

pub struct JwtValidator {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JwtValidator {
    pub fn new(config: &JwtConfig) -> Self {
        let decoding_key = DecodingKey::from_secret(config.secret.as_bytes());

        let mut validation = Validation::default();

        if let Some(ref issuer) = config.issuer {
            validation.set_issuer(&[issuer]);
        }

        if let Some(ref audience) = config.audience {
            validation.set_audience(&[audience]);
        }

        Self {
            decoding_key,
            validation,
        }
    }

    pub fn validate(&self, token: &str) -> Result<Claims, AuthError> {
        let token_data = decode::<Claims>(token, &self.decoding_key, &self.validation)?;
        Ok(token_data.claims)
    }
}

/// Resolves identity from a signed token's `room` (or `dest`) and `username` (or `sub`) claims
pub struct JwtIdentityResolver {
    validator: JwtValidator,
}

impl JwtIdentityResolver {
    pub fn new(config: &JwtConfig) -> Self {
        Self {
            validator: JwtValidator::new(config),
        }
    }
}

#[async_trait]
impl IdentityResolver for JwtIdentityResolver {
    async fn resolve(&self, request: &UpgradeRequest) -> Result<Identity, AuthError> {
        let token = request.bearer_token().ok_or(AuthError::MissingToken)?;
        let claims = self.validator.validate(token)?;
        let room = claims.room().ok_or(AuthError::MissingField("room"))?;

        Identity::new(room, claims.username())
    }
}
