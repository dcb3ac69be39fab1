//! Access grant model - explicit scoped allow/deny overrides.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Scope type codes for access grants. Intentionally a small closed set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScopeType {
    /// A resource action, e.g. `payroll.approve`.
    Resource,
    /// A product feature toggle-like scope, e.g. `reports.export`.
    Feature,
}

impl ScopeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScopeType::Resource => "resource",
            ScopeType::Feature => "feature",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "resource" => Some(ScopeType::Resource),
            "feature" => Some(ScopeType::Feature),
            _ => None,
        }
    }
}

/// Grant effect codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GrantEffect {
    Allow,
    Deny,
}

impl GrantEffect {
    pub fn as_str(&self) -> &'static str {
        match self {
            GrantEffect::Allow => "allow",
            GrantEffect::Deny => "deny",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "allow" => Some(GrantEffect::Allow),
            "deny" => Some(GrantEffect::Deny),
            _ => None,
        }
    }
}

/// Access grant entity.
///
/// At most one of the target columns is set; a grant with no target applies
/// tenant-wide. Absence of any matching grant means "defer to role-derived
/// permissions".
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AccessGrant {
    pub grant_id: Uuid,
    pub tenant_id: Uuid,
    pub scope_type_code: String,
    pub scope_key: String,
    pub effect_code: String,
    pub target_user_id: Option<Uuid>,
    pub target_role_id: Option<Uuid>,
    pub target_company_id: Option<Uuid>,
    pub created_utc: DateTime<Utc>,
}

impl AccessGrant {
    /// Create a tenant-wide grant; narrow it with the `for_*` constructors.
    pub fn new(
        tenant_id: Uuid,
        scope_type: ScopeType,
        scope_key: String,
        effect: GrantEffect,
    ) -> Self {
        Self {
            grant_id: Uuid::new_v4(),
            tenant_id,
            scope_type_code: scope_type.as_str().to_string(),
            scope_key,
            effect_code: effect.as_str().to_string(),
            target_user_id: None,
            target_role_id: None,
            target_company_id: None,
            created_utc: Utc::now(),
        }
    }

    pub fn for_principal(mut self, user_id: Uuid) -> Self {
        self.target_user_id = Some(user_id);
        self
    }

    pub fn for_role(mut self, role_id: Uuid) -> Self {
        self.target_role_id = Some(role_id);
        self
    }

    pub fn for_company(mut self, company_id: Uuid) -> Self {
        self.target_company_id = Some(company_id);
        self
    }

    pub fn effect(&self) -> GrantEffect {
        // Unknown codes read back as deny so a corrupt row can never widen access
        GrantEffect::parse(&self.effect_code).unwrap_or(GrantEffect::Deny)
    }

    /// Specificity rank used for precedence: principal > role > company >
    /// tenant-wide.
    pub fn specificity(&self) -> u8 {
        if self.target_user_id.is_some() {
            3
        } else if self.target_role_id.is_some() {
            2
        } else if self.target_company_id.is_some() {
            1
        } else {
            0
        }
    }

    /// Whether this grant applies to a principal with the given attachments.
    pub fn applies_to(&self, user_id: Uuid, role_ids: &[Uuid], company_ids: &[Uuid]) -> bool {
        match (
            self.target_user_id,
            self.target_role_id,
            self.target_company_id,
        ) {
            (Some(target), _, _) => target == user_id,
            (None, Some(target), _) => role_ids.contains(&target),
            (None, None, Some(target)) => company_ids.contains(&target),
            (None, None, None) => true,
        }
    }
}

/// Request to create an access grant.
#[derive(Debug, Deserialize)]
pub struct CreateGrantRequest {
    pub scope_type: ScopeType,
    pub scope_key: String,
    pub effect: GrantEffect,
    pub target_user_id: Option<Uuid>,
    pub target_role_id: Option<Uuid>,
    pub target_company_id: Option<Uuid>,
}

impl CreateGrantRequest {
    /// A grant may be narrowed to at most one target.
    pub fn target_count(&self) -> usize {
        [
            self.target_user_id.is_some(),
            self.target_role_id.is_some(),
            self.target_company_id.is_some(),
        ]
        .iter()
        .filter(|set| **set)
        .count()
    }
}
