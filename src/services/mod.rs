pub mod auth;
pub mod authz;
pub mod jwt;
pub mod policy_sync;
pub mod session;
pub mod tenant;

pub use auth::AuthService;
pub use authz::{AuthzService, PolicyEngine};
pub use jwt::{AccessTokenClaims, JwtService, RefreshTokenClaims, TokenError, TokenResponse};
pub use policy_sync::{DriftReport, PolicySync};
pub use session::SessionService;
pub use tenant::{TenantContext, TenantResolver};
