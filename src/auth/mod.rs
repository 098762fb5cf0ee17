mod claims;
mod identity;
mod jwt;
mod query;

pub use claims::Claims;
pub use identity::{
    create_identity_resolver, AuthError, Identity, IdentityResolver, UpgradeRequest,
    MAX_IDENTITY_LEN, MIN_JWT_SECRET_LEN,
};
pub use jwt::{JwtIdentityResolver, JwtValidator};
pub use query::QueryIdentityResolver;
