use async_trait::async_trait;

use super::{AuthError, Identity, IdentityResolver, UpgradeRequest};

/// Trusts `?room=` and `?username=` as given. Local development only.
pub struct QueryIdentityResolver {
    default_username: Option<String>,
}

impl QueryIdentityResolver {
    pub fn new(default_username: Option<String>) -> Self {
        Self { default_username }
    }
}

#[async_trait]
impl IdentityResolver for QueryIdentityResolver {
    async fn resolve(&self, request: &UpgradeRequest) -> Result<Identity, AuthError> {
        let room = request
            .query_param("room")
            .ok_or(AuthError::MissingField("room"))?;
        let username = request
            .query_param("username")
            .or(self.default_username.as_deref())
            .ok_or(AuthError::MissingField("username"))?;

        Identity::new(room, username)
    }
}
