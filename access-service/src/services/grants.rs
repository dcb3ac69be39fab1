//! Explicit grant resolution with specificity precedence.

use std::sync::Arc;
use uuid::Uuid;

use crate::models::{AccessGrant, GrantEffect, ScopeType};
use crate::services::store::DirectoryStore;
use crate::services::ServiceError;

/// Outcome of grant resolution. `Abstain` means no grant matched and the
/// caller falls back to role-derived permissions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrantVerdict {
    Allow,
    Deny,
    Abstain,
}

#[derive(Clone)]
pub struct GrantService {
    directory: Arc<dyn DirectoryStore>,
}

impl GrantService {
    pub fn new(directory: Arc<dyn DirectoryStore>) -> Self {
        Self { directory }
    }

    /// Resolve the explicit grants matching `(scope_type, scope_key)` for a
    /// principal with the given role/company attachments.
    ///
    /// Candidates are grants whose target is unset (tenant-wide), the
    /// principal itself, one of its roles, or one of its companies. The most
    /// specific candidates win (principal > role > company > tenant-wide);
    /// conflicting effects at equal specificity resolve to deny.
    pub async fn decide(
        &self,
        tenant_id: Uuid,
        user_id: Uuid,
        role_ids: &[Uuid],
        company_ids: &[Uuid],
        scope_type: ScopeType,
        scope_key: &str,
    ) -> Result<GrantVerdict, ServiceError> {
        let grants = self
            .directory
            .grants_for_scope(tenant_id, scope_type.as_str(), scope_key)
            .await?;

        Ok(resolve(&grants, user_id, role_ids, company_ids))
    }
}

fn resolve(
    grants: &[AccessGrant],
    user_id: Uuid,
    role_ids: &[Uuid],
    company_ids: &[Uuid],
) -> GrantVerdict {
    let mut best_specificity: Option<u8> = None;
    let mut deny_at_best = false;
    let mut allow_at_best = false;

    for grant in grants {
        if !grant.applies_to(user_id, role_ids, company_ids) {
            continue;
        }
        let specificity = grant.specificity();
        if best_specificity.map_or(true, |best| specificity > best) {
            best_specificity = Some(specificity);
            deny_at_best = false;
            allow_at_best = false;
        }
        if best_specificity == Some(specificity) {
            match grant.effect() {
                GrantEffect::Deny => deny_at_best = true,
                GrantEffect::Allow => allow_at_best = true,
            }
        }
    }

    match (best_specificity, deny_at_best, allow_at_best) {
        (None, _, _) => GrantVerdict::Abstain,
        // Deny before allow at equal specificity
        (Some(_), true, _) => GrantVerdict::Deny,
        (Some(_), false, true) => GrantVerdict::Allow,
        (Some(_), false, false) => GrantVerdict::Abstain,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grant(effect: GrantEffect) -> AccessGrant {
        AccessGrant::new(
            Uuid::new_v4(),
            ScopeType::Resource,
            "payroll.approve".to_string(),
            effect,
        )
    }

    #[test]
    fn no_candidates_abstains() {
        assert_eq!(
            resolve(&[], Uuid::new_v4(), &[], &[]),
            GrantVerdict::Abstain
        );
    }

    #[test]
    fn principal_deny_beats_tenant_allow() {
        let user = Uuid::new_v4();
        let grants = vec![
            grant(GrantEffect::Allow),
            grant(GrantEffect::Deny).for_principal(user),
        ];
        assert_eq!(resolve(&grants, user, &[], &[]), GrantVerdict::Deny);
    }

    #[test]
    fn principal_allow_beats_role_deny() {
        let user = Uuid::new_v4();
        let role = Uuid::new_v4();
        let grants = vec![
            grant(GrantEffect::Deny).for_role(role),
            grant(GrantEffect::Allow).for_principal(user),
        ];
        assert_eq!(resolve(&grants, user, &[role], &[]), GrantVerdict::Allow);
    }

    #[test]
    fn role_beats_company() {
        let user = Uuid::new_v4();
        let role = Uuid::new_v4();
        let company = Uuid::new_v4();
        let grants = vec![
            grant(GrantEffect::Deny).for_company(company),
            grant(GrantEffect::Allow).for_role(role),
        ];
        assert_eq!(
            resolve(&grants, user, &[role], &[company]),
            GrantVerdict::Allow
        );
    }

    #[test]
    fn equal_specificity_conflict_denies() {
        let user = Uuid::new_v4();
        let grants = vec![
            grant(GrantEffect::Allow).for_principal(user),
            grant(GrantEffect::Deny).for_principal(user),
        ];
        assert_eq!(resolve(&grants, user, &[], &[]), GrantVerdict::Deny);

        // Order independence
        let grants = vec![
            grant(GrantEffect::Deny).for_principal(user),
            grant(GrantEffect::Allow).for_principal(user),
        ];
        assert_eq!(resolve(&grants, user, &[], &[]), GrantVerdict::Deny);
    }

    #[test]
    fn untargeted_grants_apply_tenant_wide() {
        let grants = vec![grant(GrantEffect::Allow)];
        assert_eq!(
            resolve(&grants, Uuid::new_v4(), &[], &[]),
            GrantVerdict::Allow
        );
    }

    #[test]
    fn grants_for_other_principals_are_ignored() {
        let grants = vec![grant(GrantEffect::Deny).for_principal(Uuid::new_v4())];
        assert_eq!(
            resolve(&grants, Uuid::new_v4(), &[], &[]),
            GrantVerdict::Abstain
        );
    }
}
