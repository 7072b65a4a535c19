pub mod role;
pub mod token;

pub use role::Role;
pub use token::{Claims, TokenService};

/// Identity resolved from a bearer token, inserted into request extensions by
/// the auth middleware.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub user_id: String,
    pub role: Role,
}
