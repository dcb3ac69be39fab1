//! Services layer: the decision engine and its collaborator seams.

pub mod audit;
pub mod authorization;
mod database;
pub mod error;
pub mod geo;
pub mod grants;
pub mod lockout;
pub mod login;
mod memory;
pub mod metrics;
pub mod notifier;
pub mod rate_limit;
pub mod roles;
pub mod sessions;
pub mod store;

pub use audit::{AuditService, MAX_AUDIT_PAGE_SIZE};
pub use authorization::{reason, AccessDecision, AuthorizationService};
pub use database::PgStore;
pub use error::ServiceError;
pub use geo::{GeoProvider, HttpGeoProvider, StaticGeoProvider};
pub use grants::{GrantService, GrantVerdict};
pub use lockout::{FailureOutcome, LockoutService};
pub use login::{
    CredentialVerifier, EstablishedSession, IdentityProviderClient, LoginOutcome, LoginService,
    StaticVerifier, GENERIC_LOGIN_FAILURE,
};
pub use memory::MemoryStore;
pub use notifier::{LockoutNotifier, NoopNotifier, WebhookNotifier};
pub use rate_limit::{
    LimitAction, LimitPolicies, LimitPolicy, MemoryWindowStore, Permit, RedisWindowStore,
    SlidingWindowLimiter, WindowStore,
};
pub use roles::RoleService;
pub use sessions::{Admission, SessionRegistry};
pub use store::{AuditStore, DirectoryStore, SecurityStateStore};
