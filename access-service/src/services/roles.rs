//! Role-derived permission resolution.

use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

use crate::services::store::DirectoryStore;
use crate::services::ServiceError;

/// Computes the permissions a principal derives from role attachments.
#[derive(Clone)]
pub struct RoleService {
    directory: Arc<dyn DirectoryStore>,
}

impl RoleService {
    pub fn new(directory: Arc<dyn DirectoryStore>) -> Self {
        Self { directory }
    }

    /// Union of permission sets across all roles attached to the principal's
    /// active membership in the tenant.
    ///
    /// Fails closed: a missing or non-active membership, and any lookup
    /// error, yield the empty set. Callers keep their deny-by-default
    /// posture; nothing here can escape as a fault.
    pub async fn effective_permissions(&self, user_id: Uuid, tenant_id: Uuid) -> HashSet<String> {
        match self.lookup(user_id, tenant_id).await {
            Ok(permissions) => permissions,
            Err(e) => {
                tracing::warn!(
                    user_id = %user_id,
                    tenant_id = %tenant_id,
                    error = %e,
                    "Permission lookup failed; treating as empty set"
                );
                HashSet::new()
            }
        }
    }

    async fn lookup(
        &self,
        user_id: Uuid,
        tenant_id: Uuid,
    ) -> Result<HashSet<String>, ServiceError> {
        let membership = match self.directory.find_membership(tenant_id, user_id).await? {
            Some(membership) if membership.is_active() => membership,
            _ => return Ok(HashSet::new()),
        };

        let role_ids = self
            .directory
            .membership_role_ids(membership.membership_id)
            .await?;
        if role_ids.is_empty() {
            return Ok(HashSet::new());
        }

        self.directory.role_permissions(&role_ids).await
    }
}
