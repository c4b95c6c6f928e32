pub mod permission;
pub mod refresh_token;
pub mod role;
pub mod tenant;
pub mod user;

pub use permission::Permission;
pub use refresh_token::RefreshToken;
pub use role::Role;
pub use tenant::Tenant;
pub use user::User;
