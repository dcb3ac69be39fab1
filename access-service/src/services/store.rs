//! Store traits - the exact operations the engine needs from persistence.
//!
//! The engine never talks to a database directly; it issues point lookups
//! and set-based queries through these traits. Backends: Postgres for
//! production, in-memory for tests and embedded use.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use uuid::Uuid;

use crate::models::{
    AccessGrant, AuthEvent, AuthEventFilter, License, LoginSecurityState, Membership, Principal,
    Role, SecurityPolicy, Tenant,
};
use crate::services::ServiceError;

/// Long-lived directory state: tenants, principals, memberships, roles,
/// grants, licenses and the per-tenant permission registry.
#[async_trait]
pub trait DirectoryStore: Send + Sync {
    async fn health_check(&self) -> Result<(), ServiceError>;

    // Provisioning primitives, driven by the surrounding application.
    async fn insert_tenant(&self, tenant: &Tenant) -> Result<(), ServiceError>;
    async fn insert_principal(&self, principal: &Principal) -> Result<(), ServiceError>;
    async fn insert_membership(&self, membership: &Membership) -> Result<(), ServiceError>;
    async fn upsert_security_policy(&self, policy: &SecurityPolicy) -> Result<(), ServiceError>;
    async fn upsert_license(&self, license: &License) -> Result<(), ServiceError>;
    async fn register_permissions(
        &self,
        tenant_id: Uuid,
        permissions: &[String],
    ) -> Result<(), ServiceError>;
    async fn attach_company(&self, membership_id: Uuid, company_id: Uuid)
        -> Result<(), ServiceError>;

    // Lookups.
    async fn find_tenant(&self, tenant_id: Uuid) -> Result<Option<Tenant>, ServiceError>;
    async fn find_security_policy(
        &self,
        tenant_id: Uuid,
    ) -> Result<Option<SecurityPolicy>, ServiceError>;
    async fn find_principal(&self, user_id: Uuid) -> Result<Option<Principal>, ServiceError>;
    async fn find_principal_by_email(
        &self,
        email: &str,
    ) -> Result<Option<Principal>, ServiceError>;
    async fn find_membership(
        &self,
        tenant_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Membership>, ServiceError>;
    async fn find_membership_by_id(
        &self,
        membership_id: Uuid,
    ) -> Result<Option<Membership>, ServiceError>;
    async fn membership_role_ids(&self, membership_id: Uuid) -> Result<Vec<Uuid>, ServiceError>;
    async fn membership_company_ids(&self, membership_id: Uuid)
        -> Result<Vec<Uuid>, ServiceError>;
    /// Roles attached to a membership, in attachment order.
    async fn membership_roles(&self, membership_id: Uuid) -> Result<Vec<Role>, ServiceError>;
    async fn role_permissions(&self, role_ids: &[Uuid]) -> Result<HashSet<String>, ServiceError>;
    async fn is_permission_registered(
        &self,
        tenant_id: Uuid,
        permission: &str,
    ) -> Result<bool, ServiceError>;

    // Role administration.
    async fn find_role(&self, tenant_id: Uuid, role_id: Uuid)
        -> Result<Option<Role>, ServiceError>;
    async fn list_roles(&self, tenant_id: Uuid) -> Result<Vec<Role>, ServiceError>;
    async fn insert_role(&self, role: &Role, permissions: &[String]) -> Result<(), ServiceError>;
    async fn update_role(
        &self,
        tenant_id: Uuid,
        role_id: Uuid,
        role_label: Option<&str>,
        permissions: Option<&[String]>,
    ) -> Result<(), ServiceError>;
    async fn delete_role(&self, tenant_id: Uuid, role_id: Uuid) -> Result<(), ServiceError>;
    async fn attach_role(&self, membership_id: Uuid, role_id: Uuid) -> Result<(), ServiceError>;
    async fn detach_role(&self, membership_id: Uuid, role_id: Uuid) -> Result<bool, ServiceError>;
    async fn set_legacy_primary_role(
        &self,
        membership_id: Uuid,
        role_key: Option<&str>,
    ) -> Result<(), ServiceError>;

    // Grant administration.
    async fn grants_for_scope(
        &self,
        tenant_id: Uuid,
        scope_type: &str,
        scope_key: &str,
    ) -> Result<Vec<AccessGrant>, ServiceError>;
    async fn list_grants(&self, tenant_id: Uuid) -> Result<Vec<AccessGrant>, ServiceError>;
    async fn insert_grant(&self, grant: &AccessGrant) -> Result<(), ServiceError>;
    async fn update_grant_effect(
        &self,
        tenant_id: Uuid,
        grant_id: Uuid,
        effect: &str,
    ) -> Result<bool, ServiceError>;
    async fn delete_grant(&self, tenant_id: Uuid, grant_id: Uuid) -> Result<bool, ServiceError>;

    // License seats.
    async fn find_license(&self, tenant_id: Uuid) -> Result<Option<License>, ServiceError>;
    async fn has_active_seat(&self, tenant_id: Uuid, user_id: Uuid)
        -> Result<bool, ServiceError>;
    async fn active_seat_count(&self, tenant_id: Uuid) -> Result<i64, ServiceError>;
    async fn assign_seat(&self, tenant_id: Uuid, user_id: Uuid) -> Result<(), ServiceError>;
    async fn revoke_seat(&self, tenant_id: Uuid, user_id: Uuid) -> Result<bool, ServiceError>;
}

/// Mutable per-principal login security state. Increments and lock
/// transitions must be atomic per principal: an under-counted failure
/// weakens the lockout guarantee.
#[async_trait]
pub trait SecurityStateStore: Send + Sync {
    /// Atomically increment the failed-attempt counter, returning the new
    /// count.
    async fn record_failed_attempt(
        &self,
        user_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<u32, ServiceError>;

    async fn reset_failed_attempts(&self, user_id: Uuid) -> Result<(), ServiceError>;

    async fn login_security(
        &self,
        user_id: Uuid,
    ) -> Result<Option<LoginSecurityState>, ServiceError>;

    /// Compare-and-set lock transition. Returns true only for the single
    /// caller that moved the account from unlocked to locked.
    async fn try_lock(
        &self,
        user_id: Uuid,
        locked_by: &str,
        reason: &str,
    ) -> Result<bool, ServiceError>;

    async fn clear_lock(&self, user_id: Uuid) -> Result<(), ServiceError>;
}

/// Append-only event store behind the audit service.
#[async_trait]
pub trait AuditStore: Send + Sync {
    async fn append_event(&self, event: &AuthEvent) -> Result<Uuid, ServiceError>;
    async fn list_events(
        &self,
        filter: &AuthEventFilter,
    ) -> Result<(Vec<AuthEvent>, i64), ServiceError>;
}
