use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use axum::http::{header, HeaderMap};
use thiserror::Error;

use crate::config::{AuthConfig, AuthMode};

use super::{JwtIdentityResolver, QueryIdentityResolver};

/// Longest room key or username accepted from a client
pub const MAX_IDENTITY_LEN: usize = 128;

/// Shortest HMAC secret the JWT resolver will run with
pub const MIN_JWT_SECRET_LEN: usize = 16;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("missing authentication token")]
    MissingToken,

    #[error("invalid token: {0}")]
    InvalidToken(#[from] jsonwebtoken::errors::Error),

    #[error("missing {0}")]
    MissingField(&'static str),

    #[error("invalid {field}: {reason}")]
    InvalidField {
        field: &'static str,
        reason: &'static str,
    },

    #[error("JWT secret must be at least {min} bytes; set APP_AUTH__JWT__SECRET")]
    WeakSecret { min: usize },
}

/// Who a connection is: the room it joins and its key inside that room.
///
/// Resolved once per connection and never changed afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    room: String,
    username: String,
}

impl Identity {
    pub fn new(room: impl Into<String>, username: impl Into<String>) -> Result<Self, AuthError> {
        let room = room.into();
        let username = username.into();
        validate_key("room", &room)?;
        validate_key("username", &username)?;
        Ok(Self { room, username })
    }

    pub fn room(&self) -> &str {
        &self.room
    }

    pub fn username(&self) -> &str {
        &self.username
    }
}

fn validate_key(field: &'static str, value: &str) -> Result<(), AuthError> {
    if value.trim().is_empty() {
        return Err(AuthError::MissingField(field));
    }
    if value.len() > MAX_IDENTITY_LEN {
        return Err(AuthError::InvalidField {
            field,
            reason: "too long",
        });
    }
    if value.chars().any(char::is_control) {
        return Err(AuthError::InvalidField {
            field,
            reason: "contains control characters",
        });
    }
    Ok(())
}

/// The parts of an upgrade request identity resolution may look at
#[derive(Debug, Clone, Default)]
pub struct UpgradeRequest {
    pub headers: HeaderMap,
    pub query: HashMap<String, String>,
}

impl UpgradeRequest {
    pub fn new(headers: HeaderMap, query: HashMap<String, String>) -> Self {
        Self { headers, query }
    }

    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query
            .get(name)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    /// Token from `?token=` or an `Authorization: Bearer` header
    pub fn bearer_token(&self) -> Option<&str> {
        if let Some(token) = self.query_param("token") {
            return Some(token);
        }

        self.headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|token| !token.is_empty())
    }
}

#[async_trait]
pub trait IdentityResolver: Send + Sync {
    async fn resolve(&self, request: &UpgradeRequest) -> Result<Identity, AuthError>;
}

/// Build the resolver for the configured mode. JWT mode refuses to start
/// with a missing or short secret.
pub fn create_identity_resolver(
    config: &AuthConfig,
) -> Result<Arc<dyn IdentityResolver>, AuthError> {
    match config.mode {
        AuthMode::Jwt => {
            if config.jwt.secret.trim().len() < MIN_JWT_SECRET_LEN {
                return Err(AuthError::WeakSecret {
                    min: MIN_JWT_SECRET_LEN,
                });
            }
            tracing::info!("Using JWT identity resolver");
            Ok(Arc::new(JwtIdentityResolver::new(&config.jwt)))
        }
        AuthMode::Query => {
            tracing::warn!("Using query-parameter identity resolver; not for production use");
            Ok(Arc::new(QueryIdentityResolver::new(
                config.default_username.clone(),
            )))
        }
    }
}
