//! In-memory store implementing the engine's store traits.
//!
//! Backs tests and single-process deployments. Mutations go through DashMap
//! entries, so per-key updates are serialized the same way the SQL backend
//! serializes them per row.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::Mutex;
use uuid::Uuid;

use crate::models::{
    AccessGrant, AuthEvent, AuthEventFilter, License, LicenseSeat, LoginSecurityState, Membership,
    Principal, Role, SecurityPolicy, Tenant,
};
use crate::services::store::{AuditStore, DirectoryStore, SecurityStateStore};
use crate::services::ServiceError;

#[derive(Default)]
pub struct MemoryStore {
    tenants: DashMap<Uuid, Tenant>,
    policies: DashMap<Uuid, SecurityPolicy>,
    principals: DashMap<Uuid, Principal>,
    memberships: DashMap<Uuid, Membership>,
    membership_roles: DashMap<Uuid, Vec<(Uuid, DateTime<Utc>)>>,
    membership_companies: DashMap<Uuid, Vec<Uuid>>,
    roles: DashMap<Uuid, Role>,
    role_perms: DashMap<Uuid, HashSet<String>>,
    grants: DashMap<Uuid, AccessGrant>,
    licenses: DashMap<Uuid, License>,
    seats: DashMap<(Uuid, Uuid), LicenseSeat>,
    registry: DashMap<Uuid, HashSet<String>>,
    security: DashMap<Uuid, LoginSecurityState>,
    events: Mutex<Vec<AuthEvent>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn membership_by_id(&self, membership_id: Uuid) -> Option<Membership> {
        self.memberships.get(&membership_id).map(|m| m.clone())
    }
}

#[async_trait]
impl DirectoryStore for MemoryStore {
    async fn health_check(&self) -> Result<(), ServiceError> {
        Ok(())
    }

    async fn insert_tenant(&self, tenant: &Tenant) -> Result<(), ServiceError> {
        self.tenants.insert(tenant.tenant_id, tenant.clone());
        Ok(())
    }

    async fn insert_principal(&self, principal: &Principal) -> Result<(), ServiceError> {
        self.principals.insert(principal.user_id, principal.clone());
        Ok(())
    }

    async fn insert_membership(&self, membership: &Membership) -> Result<(), ServiceError> {
        self.memberships
            .insert(membership.membership_id, membership.clone());
        Ok(())
    }

    async fn upsert_security_policy(&self, policy: &SecurityPolicy) -> Result<(), ServiceError> {
        self.policies.insert(policy.tenant_id, policy.clone());
        Ok(())
    }

    async fn upsert_license(&self, license: &License) -> Result<(), ServiceError> {
        self.licenses.insert(license.tenant_id, license.clone());
        Ok(())
    }

    async fn register_permissions(
        &self,
        tenant_id: Uuid,
        permissions: &[String],
    ) -> Result<(), ServiceError> {
        let mut entry = self.registry.entry(tenant_id).or_default();
        for permission in permissions {
            entry.insert(permission.clone());
        }
        Ok(())
    }

    async fn attach_company(
        &self,
        membership_id: Uuid,
        company_id: Uuid,
    ) -> Result<(), ServiceError> {
        let mut entry = self.membership_companies.entry(membership_id).or_default();
        if !entry.contains(&company_id) {
            entry.push(company_id);
        }
        Ok(())
    }

    async fn find_tenant(&self, tenant_id: Uuid) -> Result<Option<Tenant>, ServiceError> {
        Ok(self.tenants.get(&tenant_id).map(|t| t.clone()))
    }

    async fn find_security_policy(
        &self,
        tenant_id: Uuid,
    ) -> Result<Option<SecurityPolicy>, ServiceError> {
        Ok(self.policies.get(&tenant_id).map(|p| p.clone()))
    }

    async fn find_principal(&self, user_id: Uuid) -> Result<Option<Principal>, ServiceError> {
        Ok(self.principals.get(&user_id).map(|p| p.clone()))
    }

    async fn find_principal_by_email(
        &self,
        email: &str,
    ) -> Result<Option<Principal>, ServiceError> {
        let needle = email.to_lowercase();
        Ok(self
            .principals
            .iter()
            .find(|entry| entry.value().email.to_lowercase() == needle)
            .map(|entry| entry.value().clone()))
    }

    async fn find_membership(
        &self,
        tenant_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Membership>, ServiceError> {
        Ok(self
            .memberships
            .iter()
            .find(|entry| {
                entry.value().tenant_id == tenant_id && entry.value().user_id == user_id
            })
            .map(|entry| entry.value().clone()))
    }

    async fn find_membership_by_id(
        &self,
        membership_id: Uuid,
    ) -> Result<Option<Membership>, ServiceError> {
        Ok(self.membership_by_id(membership_id))
    }

    async fn membership_role_ids(&self, membership_id: Uuid) -> Result<Vec<Uuid>, ServiceError> {
        Ok(self
            .membership_roles
            .get(&membership_id)
            .map(|roles| roles.iter().map(|(role_id, _)| *role_id).collect())
            .unwrap_or_default())
    }

    async fn membership_company_ids(
        &self,
        membership_id: Uuid,
    ) -> Result<Vec<Uuid>, ServiceError> {
        Ok(self
            .membership_companies
            .get(&membership_id)
            .map(|companies| companies.clone())
            .unwrap_or_default())
    }

    async fn membership_roles(&self, membership_id: Uuid) -> Result<Vec<Role>, ServiceError> {
        let mut attached: Vec<(Uuid, DateTime<Utc>)> = self
            .membership_roles
            .get(&membership_id)
            .map(|roles| roles.clone())
            .unwrap_or_default();
        attached.sort_by_key(|(_, at)| *at);

        Ok(attached
            .into_iter()
            .filter_map(|(role_id, _)| self.roles.get(&role_id).map(|r| r.clone()))
            .collect())
    }

    async fn role_permissions(&self, role_ids: &[Uuid]) -> Result<HashSet<String>, ServiceError> {
        let mut permissions = HashSet::new();
        for role_id in role_ids {
            if let Some(perms) = self.role_perms.get(role_id) {
                permissions.extend(perms.iter().cloned());
            }
        }
        Ok(permissions)
    }

    async fn is_permission_registered(
        &self,
        tenant_id: Uuid,
        permission: &str,
    ) -> Result<bool, ServiceError> {
        Ok(self
            .registry
            .get(&tenant_id)
            .map(|perms| perms.contains(permission))
            .unwrap_or(false))
    }

    async fn find_role(
        &self,
        tenant_id: Uuid,
        role_id: Uuid,
    ) -> Result<Option<Role>, ServiceError> {
        Ok(self
            .roles
            .get(&role_id)
            .filter(|role| role.tenant_id == tenant_id)
            .map(|role| role.clone()))
    }

    async fn list_roles(&self, tenant_id: Uuid) -> Result<Vec<Role>, ServiceError> {
        let mut roles: Vec<Role> = self
            .roles
            .iter()
            .filter(|entry| entry.value().tenant_id == tenant_id)
            .map(|entry| entry.value().clone())
            .collect();
        roles.sort_by_key(|role| role.created_utc);
        Ok(roles)
    }

    async fn insert_role(&self, role: &Role, permissions: &[String]) -> Result<(), ServiceError> {
        self.roles.insert(role.role_id, role.clone());
        self.role_perms
            .insert(role.role_id, permissions.iter().cloned().collect());
        Ok(())
    }

    async fn update_role(
        &self,
        tenant_id: Uuid,
        role_id: Uuid,
        role_label: Option<&str>,
        permissions: Option<&[String]>,
    ) -> Result<(), ServiceError> {
        if let Some(mut role) = self.roles.get_mut(&role_id) {
            if role.tenant_id != tenant_id {
                return Ok(());
            }
            if let Some(label) = role_label {
                role.role_label = label.to_string();
            }
        }
        if let Some(permissions) = permissions {
            self.role_perms
                .insert(role_id, permissions.iter().cloned().collect());
        }
        Ok(())
    }

    async fn delete_role(&self, tenant_id: Uuid, role_id: Uuid) -> Result<(), ServiceError> {
        let owned = self
            .roles
            .get(&role_id)
            .map(|role| role.tenant_id == tenant_id)
            .unwrap_or(false);
        if !owned {
            return Ok(());
        }
        self.roles.remove(&role_id);
        self.role_perms.remove(&role_id);
        for mut entry in self.membership_roles.iter_mut() {
            entry.value_mut().retain(|(id, _)| *id != role_id);
        }
        self.grants
            .retain(|_, grant| grant.target_role_id != Some(role_id));
        Ok(())
    }

    async fn attach_role(&self, membership_id: Uuid, role_id: Uuid) -> Result<(), ServiceError> {
        let mut entry = self.membership_roles.entry(membership_id).or_default();
        if !entry.iter().any(|(id, _)| *id == role_id) {
            entry.push((role_id, Utc::now()));
        }
        Ok(())
    }

    async fn detach_role(&self, membership_id: Uuid, role_id: Uuid) -> Result<bool, ServiceError> {
        let mut detached = false;
        if let Some(mut entry) = self.membership_roles.get_mut(&membership_id) {
            let before = entry.len();
            entry.retain(|(id, _)| *id != role_id);
            detached = entry.len() != before;
        }
        Ok(detached)
    }

    async fn set_legacy_primary_role(
        &self,
        membership_id: Uuid,
        role_key: Option<&str>,
    ) -> Result<(), ServiceError> {
        if let Some(mut membership) = self.memberships.get_mut(&membership_id) {
            membership.legacy_primary_role = role_key.map(|k| k.to_string());
        }
        Ok(())
    }

    async fn grants_for_scope(
        &self,
        tenant_id: Uuid,
        scope_type: &str,
        scope_key: &str,
    ) -> Result<Vec<AccessGrant>, ServiceError> {
        Ok(self
            .grants
            .iter()
            .filter(|entry| {
                let grant = entry.value();
                grant.tenant_id == tenant_id
                    && grant.scope_type_code == scope_type
                    && grant.scope_key == scope_key
            })
            .map(|entry| entry.value().clone())
            .collect())
    }

    async fn list_grants(&self, tenant_id: Uuid) -> Result<Vec<AccessGrant>, ServiceError> {
        let mut grants: Vec<AccessGrant> = self
            .grants
            .iter()
            .filter(|entry| entry.value().tenant_id == tenant_id)
            .map(|entry| entry.value().clone())
            .collect();
        grants.sort_by_key(|grant| grant.created_utc);
        Ok(grants)
    }

    async fn insert_grant(&self, grant: &AccessGrant) -> Result<(), ServiceError> {
        self.grants.insert(grant.grant_id, grant.clone());
        Ok(())
    }

    async fn update_grant_effect(
        &self,
        tenant_id: Uuid,
        grant_id: Uuid,
        effect: &str,
    ) -> Result<bool, ServiceError> {
        if let Some(mut grant) = self.grants.get_mut(&grant_id) {
            if grant.tenant_id == tenant_id {
                grant.effect_code = effect.to_string();
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn delete_grant(&self, tenant_id: Uuid, grant_id: Uuid) -> Result<bool, ServiceError> {
        let owned = self
            .grants
            .get(&grant_id)
            .map(|grant| grant.tenant_id == tenant_id)
            .unwrap_or(false);
        if !owned {
            return Ok(false);
        }
        Ok(self.grants.remove(&grant_id).is_some())
    }

    async fn find_license(&self, tenant_id: Uuid) -> Result<Option<License>, ServiceError> {
        Ok(self.licenses.get(&tenant_id).map(|l| l.clone()))
    }

    async fn has_active_seat(
        &self,
        tenant_id: Uuid,
        user_id: Uuid,
    ) -> Result<bool, ServiceError> {
        Ok(self
            .seats
            .get(&(tenant_id, user_id))
            .map(|seat| seat.is_active())
            .unwrap_or(false))
    }

    async fn active_seat_count(&self, tenant_id: Uuid) -> Result<i64, ServiceError> {
        Ok(self
            .seats
            .iter()
            .filter(|entry| entry.key().0 == tenant_id && entry.value().is_active())
            .count() as i64)
    }

    async fn assign_seat(&self, tenant_id: Uuid, user_id: Uuid) -> Result<(), ServiceError> {
        self.seats
            .insert((tenant_id, user_id), LicenseSeat::new(tenant_id, user_id));
        Ok(())
    }

    async fn revoke_seat(&self, tenant_id: Uuid, user_id: Uuid) -> Result<bool, ServiceError> {
        let mut revoked = false;
        if let Some(mut seat) = self.seats.get_mut(&(tenant_id, user_id)) {
            if seat.is_active() {
                seat.revoked_utc = Some(Utc::now());
                revoked = true;
            }
        }
        Ok(revoked)
    }
}

#[async_trait]
impl SecurityStateStore for MemoryStore {
    async fn record_failed_attempt(
        &self,
        user_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<u32, ServiceError> {
        let mut entry = self
            .security
            .entry(user_id)
            .or_insert_with(|| LoginSecurityState::new(user_id));
        entry.failed_attempts = entry.failed_attempts.saturating_add(1);
        entry.last_failed_utc = Some(at);
        entry.updated_utc = at;
        Ok(entry.failed_attempts.max(0) as u32)
    }

    async fn reset_failed_attempts(&self, user_id: Uuid) -> Result<(), ServiceError> {
        if let Some(mut entry) = self.security.get_mut(&user_id) {
            entry.failed_attempts = 0;
            entry.updated_utc = Utc::now();
        }
        Ok(())
    }

    async fn login_security(
        &self,
        user_id: Uuid,
    ) -> Result<Option<LoginSecurityState>, ServiceError> {
        Ok(self.security.get(&user_id).map(|s| s.clone()))
    }

    async fn try_lock(
        &self,
        user_id: Uuid,
        locked_by: &str,
        reason: &str,
    ) -> Result<bool, ServiceError> {
        let mut entry = self
            .security
            .entry(user_id)
            .or_insert_with(|| LoginSecurityState::new(user_id));
        if entry.locked_at.is_some() {
            return Ok(false);
        }
        entry.locked_at = Some(Utc::now());
        entry.locked_by = Some(locked_by.to_string());
        entry.lock_reason = Some(reason.to_string());
        entry.updated_utc = Utc::now();
        Ok(true)
    }

    async fn clear_lock(&self, user_id: Uuid) -> Result<(), ServiceError> {
        if let Some(mut entry) = self.security.get_mut(&user_id) {
            entry.locked_at = None;
            entry.locked_by = None;
            entry.lock_reason = None;
            entry.failed_attempts = 0;
            entry.updated_utc = Utc::now();
        }
        Ok(())
    }
}

#[async_trait]
impl AuditStore for MemoryStore {
    async fn append_event(&self, event: &AuthEvent) -> Result<Uuid, ServiceError> {
        let mut events = self
            .events
            .lock()
            .map_err(|e| ServiceError::Internal(anyhow::anyhow!("event log poisoned: {}", e)))?;
        events.push(event.clone());
        Ok(event.event_id)
    }

    async fn list_events(
        &self,
        filter: &AuthEventFilter,
    ) -> Result<(Vec<AuthEvent>, i64), ServiceError> {
        let events = self
            .events
            .lock()
            .map_err(|e| ServiceError::Internal(anyhow::anyhow!("event log poisoned: {}", e)))?;

        let mut matching: Vec<AuthEvent> = events
            .iter()
            .filter(|event| filter.matches(event))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_utc.cmp(&a.created_utc));

        let total = matching.len() as i64;
        let offset = filter.offset.max(0) as usize;
        let limit = filter.limit.max(0) as usize;
        let page = matching.into_iter().skip(offset).take(limit).collect();

        Ok((page, total))
    }
}
