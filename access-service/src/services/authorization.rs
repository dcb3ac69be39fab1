//! Authorization façade - membership, license, grant and role checks in
//! precedence order.

use metrics::counter;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::models::{validate_permission_token, ScopeType};
use crate::services::grants::{GrantService, GrantVerdict};
use crate::services::roles::RoleService;
use crate::services::store::DirectoryStore;
use crate::services::ServiceError;

/// Deny reasons surfaced to callers.
pub mod reason {
    pub const MEMBERSHIP_INACTIVE: &str = "membership_inactive";
    pub const NO_LICENSE_SEAT: &str = "no_license_seat";
    pub const EXPLICIT_GRANT: &str = "explicit_grant";
    pub const ROLE_PERMISSION: &str = "role_permission";
    pub const NO_PERMISSION: &str = "no_permission";
    pub const STORE_UNAVAILABLE: &str = "store_unavailable";
}

/// An authorization decision. Every evaluation terminates in one of these;
/// there is no error path that defaults to allow.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AccessDecision {
    pub allowed: bool,
    pub reason: String,
}

impl AccessDecision {
    pub fn allow(reason: &str) -> Self {
        Self {
            allowed: true,
            reason: reason.to_string(),
        }
    }

    pub fn deny(reason: &str) -> Self {
        Self {
            allowed: false,
            reason: reason.to_string(),
        }
    }
}

#[derive(Clone)]
pub struct AuthorizationService {
    directory: Arc<dyn DirectoryStore>,
    roles: RoleService,
    grants: GrantService,
}

impl AuthorizationService {
    pub fn new(directory: Arc<dyn DirectoryStore>) -> Self {
        Self {
            roles: RoleService::new(directory.clone()),
            grants: GrantService::new(directory.clone()),
            directory,
        }
    }

    /// Decide whether `user_id` may perform `action` in `tenant_id`.
    ///
    /// Order: membership gate, license-seat gate, explicit grants, then
    /// role-derived permissions. An explicit deny always wins over role
    /// membership; an explicit allow can grant access beyond a principal's
    /// roles. Store failures resolve to deny.
    ///
    /// `Err` is returned only for malformed input, before any evaluation.
    pub async fn authorize(
        &self,
        user_id: Uuid,
        tenant_id: Uuid,
        action: &str,
        scope: Option<ScopeType>,
    ) -> Result<AccessDecision, ServiceError> {
        validate_permission_token(action)?;
        let scope_type = scope.unwrap_or(ScopeType::Resource);

        let decision = self
            .evaluate(user_id, tenant_id, action, scope_type)
            .await
            .unwrap_or_else(|e| {
                tracing::error!(
                    user_id = %user_id,
                    tenant_id = %tenant_id,
                    action = %action,
                    error = %e,
                    "Authorization lookup failed; denying"
                );
                AccessDecision::deny(reason::STORE_UNAVAILABLE)
            });

        let labels = [
            (
                "allowed",
                if decision.allowed { "true" } else { "false" }.to_string(),
            ),
            ("reason", decision.reason.clone()),
        ];
        counter!("access_decisions_total", &labels).increment(1);

        Ok(decision)
    }

    async fn evaluate(
        &self,
        user_id: Uuid,
        tenant_id: Uuid,
        action: &str,
        scope_type: ScopeType,
    ) -> Result<AccessDecision, ServiceError> {
        // 1. Membership gate
        let membership = match self.directory.find_membership(tenant_id, user_id).await? {
            Some(membership) if membership.is_active() => membership,
            _ => return Ok(AccessDecision::deny(reason::MEMBERSHIP_INACTIVE)),
        };

        // 2. License-seat gate for seat-gated action classes
        if let Some(license) = self.directory.find_license(tenant_id).await? {
            if license.requires_seat(action)
                && !self.directory.has_active_seat(tenant_id, user_id).await?
            {
                return Ok(AccessDecision::deny(reason::NO_LICENSE_SEAT));
            }
        }

        // 3. Explicit grants
        let role_ids = self
            .directory
            .membership_role_ids(membership.membership_id)
            .await?;
        let company_ids = self
            .directory
            .membership_company_ids(membership.membership_id)
            .await?;

        match self
            .grants
            .decide(tenant_id, user_id, &role_ids, &company_ids, scope_type, action)
            .await?
        {
            GrantVerdict::Allow => return Ok(AccessDecision::allow(reason::EXPLICIT_GRANT)),
            GrantVerdict::Deny => return Ok(AccessDecision::deny(reason::EXPLICIT_GRANT)),
            GrantVerdict::Abstain => {}
        }

        // 4. Role-derived permissions
        let permissions = self.roles.effective_permissions(user_id, tenant_id).await;
        if permissions.contains(action) {
            Ok(AccessDecision::allow(reason::ROLE_PERMISSION))
        } else {
            Ok(AccessDecision::deny(reason::NO_PERMISSION))
        }
    }
}
