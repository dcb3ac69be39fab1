//! PostgreSQL store backing the engine's directory, security-state and
//! audit traits.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPool;
use std::collections::HashSet;
use uuid::Uuid;

use crate::models::{
    AccessGrant, AuthEvent, AuthEventFilter, License, LoginSecurityState, Membership, Principal,
    Role, SecurityPolicy, Tenant,
};
use crate::services::store::{AuditStore, DirectoryStore, SecurityStateStore};
use crate::services::ServiceError;

/// PostgreSQL store wrapper.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl DirectoryStore for PgStore {
    async fn health_check(&self) -> Result<(), ServiceError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn insert_tenant(&self, tenant: &Tenant) -> Result<(), ServiceError> {
        sqlx::query(
            r#"
            INSERT INTO tenants (tenant_id, tenant_slug, tenant_label, created_utc)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(tenant.tenant_id)
        .bind(&tenant.tenant_slug)
        .bind(&tenant.tenant_label)
        .bind(tenant.created_utc)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn insert_principal(&self, principal: &Principal) -> Result<(), ServiceError> {
        sqlx::query(
            r#"
            INSERT INTO principals (user_id, tenant_id, email, display_name, principal_state_code, created_utc)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(principal.user_id)
        .bind(principal.tenant_id)
        .bind(&principal.email)
        .bind(&principal.display_name)
        .bind(&principal.principal_state_code)
        .bind(principal.created_utc)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn insert_membership(&self, membership: &Membership) -> Result<(), ServiceError> {
        sqlx::query(
            r#"
            INSERT INTO memberships (membership_id, tenant_id, user_id, membership_state_code, legacy_primary_role, created_utc)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(membership.membership_id)
        .bind(membership.tenant_id)
        .bind(membership.user_id)
        .bind(&membership.membership_state_code)
        .bind(&membership.legacy_primary_role)
        .bind(membership.created_utc)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn upsert_security_policy(&self, policy: &SecurityPolicy) -> Result<(), ServiceError> {
        sqlx::query(
            r#"
            INSERT INTO security_policies
                (tenant_id, max_failed_attempts, lockout_duration_minutes, updated_utc)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (tenant_id) DO UPDATE SET
                max_failed_attempts = EXCLUDED.max_failed_attempts,
                lockout_duration_minutes = EXCLUDED.lockout_duration_minutes,
                updated_utc = EXCLUDED.updated_utc
            "#,
        )
        .bind(policy.tenant_id)
        .bind(policy.max_failed_attempts)
        .bind(policy.lockout_duration_minutes)
        .bind(policy.updated_utc)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn upsert_license(&self, license: &License) -> Result<(), ServiceError> {
        sqlx::query(
            r#"
            INSERT INTO licenses (tenant_id, seat_capacity, enforced_prefixes, updated_utc)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (tenant_id) DO UPDATE SET
                seat_capacity = EXCLUDED.seat_capacity,
                enforced_prefixes = EXCLUDED.enforced_prefixes,
                updated_utc = EXCLUDED.updated_utc
            "#,
        )
        .bind(license.tenant_id)
        .bind(license.seat_capacity)
        .bind(&license.enforced_prefixes)
        .bind(license.updated_utc)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn register_permissions(
        &self,
        tenant_id: Uuid,
        permissions: &[String],
    ) -> Result<(), ServiceError> {
        sqlx::query(
            r#"
            INSERT INTO permission_registry (tenant_id, permission)
            SELECT $1, UNNEST($2::text[])
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(tenant_id)
        .bind(permissions)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn attach_company(
        &self,
        membership_id: Uuid,
        company_id: Uuid,
    ) -> Result<(), ServiceError> {
        sqlx::query(
            r#"
            INSERT INTO membership_companies (membership_id, company_id)
            VALUES ($1, $2)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(membership_id)
        .bind(company_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_tenant(&self, tenant_id: Uuid) -> Result<Option<Tenant>, ServiceError> {
        let tenant = sqlx::query_as::<_, Tenant>("SELECT * FROM tenants WHERE tenant_id = $1")
            .bind(tenant_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(tenant)
    }

    async fn find_security_policy(
        &self,
        tenant_id: Uuid,
    ) -> Result<Option<SecurityPolicy>, ServiceError> {
        let policy = sqlx::query_as::<_, SecurityPolicy>(
            "SELECT * FROM security_policies WHERE tenant_id = $1",
        )
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(policy)
    }

    async fn find_principal(&self, user_id: Uuid) -> Result<Option<Principal>, ServiceError> {
        let principal =
            sqlx::query_as::<_, Principal>("SELECT * FROM principals WHERE user_id = $1")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(principal)
    }

    async fn find_principal_by_email(
        &self,
        email: &str,
    ) -> Result<Option<Principal>, ServiceError> {
        let principal = sqlx::query_as::<_, Principal>(
            "SELECT * FROM principals WHERE LOWER(email) = LOWER($1)",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(principal)
    }

    async fn find_membership(
        &self,
        tenant_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Membership>, ServiceError> {
        let membership = sqlx::query_as::<_, Membership>(
            "SELECT * FROM memberships WHERE tenant_id = $1 AND user_id = $2",
        )
        .bind(tenant_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(membership)
    }

    async fn find_membership_by_id(
        &self,
        membership_id: Uuid,
    ) -> Result<Option<Membership>, ServiceError> {
        let membership = sqlx::query_as::<_, Membership>(
            "SELECT * FROM memberships WHERE membership_id = $1",
        )
        .bind(membership_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(membership)
    }

    async fn membership_role_ids(&self, membership_id: Uuid) -> Result<Vec<Uuid>, ServiceError> {
        let ids = sqlx::query_scalar::<_, Uuid>(
            "SELECT role_id FROM membership_roles WHERE membership_id = $1",
        )
        .bind(membership_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    async fn membership_company_ids(
        &self,
        membership_id: Uuid,
    ) -> Result<Vec<Uuid>, ServiceError> {
        let ids = sqlx::query_scalar::<_, Uuid>(
            "SELECT company_id FROM membership_companies WHERE membership_id = $1",
        )
        .bind(membership_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    async fn membership_roles(&self, membership_id: Uuid) -> Result<Vec<Role>, ServiceError> {
        let roles = sqlx::query_as::<_, Role>(
            r#"
            SELECT r.* FROM roles r
            JOIN membership_roles mr ON mr.role_id = r.role_id
            WHERE mr.membership_id = $1
            ORDER BY mr.attached_utc ASC
            "#,
        )
        .bind(membership_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(roles)
    }

    async fn role_permissions(&self, role_ids: &[Uuid]) -> Result<HashSet<String>, ServiceError> {
        if role_ids.is_empty() {
            return Ok(HashSet::new());
        }
        let permissions = sqlx::query_scalar::<_, String>(
            "SELECT DISTINCT permission FROM role_permissions WHERE role_id = ANY($1)",
        )
        .bind(role_ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(permissions.into_iter().collect())
    }

    async fn is_permission_registered(
        &self,
        tenant_id: Uuid,
        permission: &str,
    ) -> Result<bool, ServiceError> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM permission_registry WHERE tenant_id = $1 AND permission = $2)",
        )
        .bind(tenant_id)
        .bind(permission)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn find_role(
        &self,
        tenant_id: Uuid,
        role_id: Uuid,
    ) -> Result<Option<Role>, ServiceError> {
        let role = sqlx::query_as::<_, Role>(
            "SELECT * FROM roles WHERE tenant_id = $1 AND role_id = $2",
        )
        .bind(tenant_id)
        .bind(role_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(role)
    }

    async fn list_roles(&self, tenant_id: Uuid) -> Result<Vec<Role>, ServiceError> {
        let roles = sqlx::query_as::<_, Role>(
            "SELECT * FROM roles WHERE tenant_id = $1 ORDER BY created_utc ASC",
        )
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(roles)
    }

    async fn insert_role(&self, role: &Role, permissions: &[String]) -> Result<(), ServiceError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO roles (role_id, tenant_id, role_key, role_label, is_system, created_utc)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(role.role_id)
        .bind(role.tenant_id)
        .bind(&role.role_key)
        .bind(&role.role_label)
        .bind(role.is_system)
        .bind(role.created_utc)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO role_permissions (role_id, permission)
            SELECT $1, UNNEST($2::text[])
            "#,
        )
        .bind(role.role_id)
        .bind(permissions)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn update_role(
        &self,
        tenant_id: Uuid,
        role_id: Uuid,
        role_label: Option<&str>,
        permissions: Option<&[String]>,
    ) -> Result<(), ServiceError> {
        let mut tx = self.pool.begin().await?;

        if let Some(label) = role_label {
            sqlx::query(
                "UPDATE roles SET role_label = $3 WHERE tenant_id = $1 AND role_id = $2",
            )
            .bind(tenant_id)
            .bind(role_id)
            .bind(label)
            .execute(&mut *tx)
            .await?;
        }

        if let Some(permissions) = permissions {
            sqlx::query("DELETE FROM role_permissions WHERE role_id = $1")
                .bind(role_id)
                .execute(&mut *tx)
                .await?;
            sqlx::query(
                r#"
                INSERT INTO role_permissions (role_id, permission)
                SELECT $1, UNNEST($2::text[])
                "#,
            )
            .bind(role_id)
            .bind(permissions)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn delete_role(&self, tenant_id: Uuid, role_id: Uuid) -> Result<(), ServiceError> {
        sqlx::query("DELETE FROM roles WHERE tenant_id = $1 AND role_id = $2")
            .bind(tenant_id)
            .bind(role_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn attach_role(&self, membership_id: Uuid, role_id: Uuid) -> Result<(), ServiceError> {
        sqlx::query(
            r#"
            INSERT INTO membership_roles (membership_id, role_id, attached_utc)
            VALUES ($1, $2, $3)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(membership_id)
        .bind(role_id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn detach_role(&self, membership_id: Uuid, role_id: Uuid) -> Result<bool, ServiceError> {
        let result =
            sqlx::query("DELETE FROM membership_roles WHERE membership_id = $1 AND role_id = $2")
                .bind(membership_id)
                .bind(role_id)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn set_legacy_primary_role(
        &self,
        membership_id: Uuid,
        role_key: Option<&str>,
    ) -> Result<(), ServiceError> {
        sqlx::query("UPDATE memberships SET legacy_primary_role = $2 WHERE membership_id = $1")
            .bind(membership_id)
            .bind(role_key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn grants_for_scope(
        &self,
        tenant_id: Uuid,
        scope_type: &str,
        scope_key: &str,
    ) -> Result<Vec<AccessGrant>, ServiceError> {
        let grants = sqlx::query_as::<_, AccessGrant>(
            r#"
            SELECT * FROM access_grants
            WHERE tenant_id = $1 AND scope_type_code = $2 AND scope_key = $3
            "#,
        )
        .bind(tenant_id)
        .bind(scope_type)
        .bind(scope_key)
        .fetch_all(&self.pool)
        .await?;
        Ok(grants)
    }

    async fn list_grants(&self, tenant_id: Uuid) -> Result<Vec<AccessGrant>, ServiceError> {
        let grants = sqlx::query_as::<_, AccessGrant>(
            "SELECT * FROM access_grants WHERE tenant_id = $1 ORDER BY created_utc ASC",
        )
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(grants)
    }

    async fn insert_grant(&self, grant: &AccessGrant) -> Result<(), ServiceError> {
        sqlx::query(
            r#"
            INSERT INTO access_grants
                (grant_id, tenant_id, scope_type_code, scope_key, effect_code,
                 target_user_id, target_role_id, target_company_id, created_utc)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(grant.grant_id)
        .bind(grant.tenant_id)
        .bind(&grant.scope_type_code)
        .bind(&grant.scope_key)
        .bind(&grant.effect_code)
        .bind(grant.target_user_id)
        .bind(grant.target_role_id)
        .bind(grant.target_company_id)
        .bind(grant.created_utc)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_grant_effect(
        &self,
        tenant_id: Uuid,
        grant_id: Uuid,
        effect: &str,
    ) -> Result<bool, ServiceError> {
        let result = sqlx::query(
            "UPDATE access_grants SET effect_code = $3 WHERE tenant_id = $1 AND grant_id = $2",
        )
        .bind(tenant_id)
        .bind(grant_id)
        .bind(effect)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_grant(&self, tenant_id: Uuid, grant_id: Uuid) -> Result<bool, ServiceError> {
        let result =
            sqlx::query("DELETE FROM access_grants WHERE tenant_id = $1 AND grant_id = $2")
                .bind(tenant_id)
                .bind(grant_id)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn find_license(&self, tenant_id: Uuid) -> Result<Option<License>, ServiceError> {
        let license =
            sqlx::query_as::<_, License>("SELECT * FROM licenses WHERE tenant_id = $1")
                .bind(tenant_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(license)
    }

    async fn has_active_seat(
        &self,
        tenant_id: Uuid,
        user_id: Uuid,
    ) -> Result<bool, ServiceError> {
        let exists = sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM license_seats
                WHERE tenant_id = $1 AND user_id = $2 AND revoked_utc IS NULL
            )
            "#,
        )
        .bind(tenant_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn active_seat_count(&self, tenant_id: Uuid) -> Result<i64, ServiceError> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM license_seats WHERE tenant_id = $1 AND revoked_utc IS NULL",
        )
        .bind(tenant_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn assign_seat(&self, tenant_id: Uuid, user_id: Uuid) -> Result<(), ServiceError> {
        sqlx::query(
            r#"
            INSERT INTO license_seats (tenant_id, user_id, assigned_utc, revoked_utc)
            VALUES ($1, $2, $3, NULL)
            ON CONFLICT (tenant_id, user_id) DO UPDATE SET
                assigned_utc = EXCLUDED.assigned_utc,
                revoked_utc = NULL
            "#,
        )
        .bind(tenant_id)
        .bind(user_id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn revoke_seat(&self, tenant_id: Uuid, user_id: Uuid) -> Result<bool, ServiceError> {
        let result = sqlx::query(
            r#"
            UPDATE license_seats SET revoked_utc = $3
            WHERE tenant_id = $1 AND user_id = $2 AND revoked_utc IS NULL
            "#,
        )
        .bind(tenant_id)
        .bind(user_id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl SecurityStateStore for PgStore {
    async fn record_failed_attempt(
        &self,
        user_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<u32, ServiceError> {
        // Single-statement upsert keeps the increment linearizable per principal
        let count = sqlx::query_scalar::<_, i32>(
            r#"
            INSERT INTO login_security (user_id, failed_attempts, last_failed_utc, updated_utc)
            VALUES ($1, 1, $2, $2)
            ON CONFLICT (user_id) DO UPDATE SET
                failed_attempts = login_security.failed_attempts + 1,
                last_failed_utc = $2,
                updated_utc = $2
            RETURNING failed_attempts
            "#,
        )
        .bind(user_id)
        .bind(at)
        .fetch_one(&self.pool)
        .await?;
        Ok(count.max(0) as u32)
    }

    async fn reset_failed_attempts(&self, user_id: Uuid) -> Result<(), ServiceError> {
        sqlx::query(
            "UPDATE login_security SET failed_attempts = 0, updated_utc = $2 WHERE user_id = $1",
        )
        .bind(user_id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn login_security(
        &self,
        user_id: Uuid,
    ) -> Result<Option<LoginSecurityState>, ServiceError> {
        let state = sqlx::query_as::<_, LoginSecurityState>(
            "SELECT * FROM login_security WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(state)
    }

    async fn try_lock(
        &self,
        user_id: Uuid,
        locked_by: &str,
        reason: &str,
    ) -> Result<bool, ServiceError> {
        let result = sqlx::query(
            r#"
            INSERT INTO login_security (user_id, failed_attempts, locked_at, locked_by, lock_reason, updated_utc)
            VALUES ($1, 0, $4, $2, $3, $4)
            ON CONFLICT (user_id) DO UPDATE SET
                locked_at = $4,
                locked_by = $2,
                lock_reason = $3,
                updated_utc = $4
            WHERE login_security.locked_at IS NULL
            "#,
        )
        .bind(user_id)
        .bind(locked_by)
        .bind(reason)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn clear_lock(&self, user_id: Uuid) -> Result<(), ServiceError> {
        sqlx::query(
            r#"
            UPDATE login_security SET
                locked_at = NULL,
                locked_by = NULL,
                lock_reason = NULL,
                failed_attempts = 0,
                updated_utc = $2
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl AuditStore for PgStore {
    async fn append_event(&self, event: &AuthEvent) -> Result<Uuid, ServiceError> {
        sqlx::query(
            r#"
            INSERT INTO auth_events
                (event_id, tenant_id, user_id, event_type_code, success, reason,
                 ip_address, user_agent, geo, event_data, created_utc)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(event.event_id)
        .bind(event.tenant_id)
        .bind(event.user_id)
        .bind(&event.event_type_code)
        .bind(event.success)
        .bind(&event.reason)
        .bind(&event.ip_address)
        .bind(&event.user_agent)
        .bind(&event.geo)
        .bind(&event.event_data)
        .bind(event.created_utc)
        .execute(&self.pool)
        .await?;
        Ok(event.event_id)
    }

    async fn list_events(
        &self,
        filter: &AuthEventFilter,
    ) -> Result<(Vec<AuthEvent>, i64), ServiceError> {
        let events = sqlx::query_as::<_, AuthEvent>(
            r#"
            SELECT * FROM auth_events
            WHERE ($1::uuid IS NULL OR tenant_id = $1)
              AND ($2::uuid IS NULL OR user_id = $2)
              AND ($3::text IS NULL OR event_type_code = $3)
              AND ($4::boolean IS NULL OR success = $4)
              AND ($5::timestamptz IS NULL OR created_utc >= $5)
              AND ($6::timestamptz IS NULL OR created_utc < $6)
            ORDER BY created_utc DESC
            LIMIT $7 OFFSET $8
            "#,
        )
        .bind(filter.tenant_id)
        .bind(filter.user_id)
        .bind(&filter.event_type)
        .bind(filter.success)
        .bind(filter.from_utc)
        .bind(filter.to_utc)
        .bind(filter.limit)
        .bind(filter.offset)
        .fetch_all(&self.pool)
        .await?;

        let total = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM auth_events
            WHERE ($1::uuid IS NULL OR tenant_id = $1)
              AND ($2::uuid IS NULL OR user_id = $2)
              AND ($3::text IS NULL OR event_type_code = $3)
              AND ($4::boolean IS NULL OR success = $4)
              AND ($5::timestamptz IS NULL OR created_utc >= $5)
              AND ($6::timestamptz IS NULL OR created_utc < $6)
            "#,
        )
        .bind(filter.tenant_id)
        .bind(filter.user_id)
        .bind(&filter.event_type)
        .bind(filter.success)
        .bind(filter.from_utc)
        .bind(filter.to_utc)
        .fetch_one(&self.pool)
        .await?;

        Ok((events, total))
    }
}
