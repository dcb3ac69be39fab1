pub mod auth_event;
pub mod grant;
pub mod license;
pub mod membership;
pub mod permission;
pub mod principal;
pub mod role;
pub mod security_state;
pub mod session;
pub mod tenant;

pub use auth_event::{AuthEvent, AuthEventFilter, AuthEventType, ClientOrigin, GeoInfo};
pub use grant::{AccessGrant, CreateGrantRequest, GrantEffect, ScopeType};
pub use license::{License, LicenseSeat};
pub use membership::{Membership, MembershipState};
pub use permission::validate_permission_token;
pub use principal::{Principal, PrincipalState};
pub use role::{CreateRoleRequest, Role, RoleResponse, RoleWithPermissions, UpdateRoleRequest};
pub use security_state::LoginSecurityState;
pub use session::{Session, SessionOriginPolicy, TouchOutcome};
pub use tenant::{
    DEFAULT_MAX_CONCURRENT_SESSIONS, DEFAULT_MAX_FAILED_ATTEMPTS, DEFAULT_SESSION_IDLE_MINUTES,
    SecurityPolicy, Tenant,
};
