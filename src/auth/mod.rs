pub mod bootstrap;
pub mod center;
pub mod middleware;
pub mod token;

pub use bootstrap::{register_permissions, spawn_permission_bootstrap, BootstrapReport, PermissionDefault};
pub use center::{AuthSettings, AuthorizationCenter, Identity, PermissionGrant, Session, DEFAULT_USER_FIELD, GROUP_FIELD};
pub use middleware::{require_session, AuthGate, RequestSession};
pub use token::{Claims, TokenCodec, TokenError};
