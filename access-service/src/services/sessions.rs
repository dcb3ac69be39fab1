//! Session registry - bounded concurrent-session tracking per principal.
//!
//! Sessions live in process memory keyed by principal, with a token-hash
//! index for touch/revoke. Mutations for one principal run under that
//! principal's map entry, so admission and eviction are serialized per
//! principal and the concurrency cap holds exactly.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use uuid::Uuid;

use crate::models::{ClientOrigin, Session, SessionOriginPolicy, TouchOutcome};

/// Result of admitting a session: whatever got evicted to make room.
#[derive(Debug, Default)]
pub struct Admission {
    pub evicted: Vec<Session>,
}

pub struct SessionRegistry {
    sessions: DashMap<Uuid, Vec<Session>>,
    token_index: DashMap<String, Uuid>,
    idle_timeout: ChronoDuration,
    max_concurrent: usize,
    origin_policy: SessionOriginPolicy,
}

impl SessionRegistry {
    pub fn new(
        idle_timeout_minutes: u32,
        max_concurrent: u32,
        origin_policy: SessionOriginPolicy,
    ) -> Self {
        Self {
            sessions: DashMap::new(),
            token_index: DashMap::new(),
            idle_timeout: ChronoDuration::minutes(i64::from(idle_timeout_minutes.max(1))),
            max_concurrent: max_concurrent.max(1) as usize,
            origin_policy,
        }
    }

    pub fn origin_policy(&self) -> SessionOriginPolicy {
        self.origin_policy
    }

    /// Admit a new session, evicting least-recently-active sessions beyond
    /// the concurrency cap.
    pub fn admit(
        &self,
        user_id: Uuid,
        tenant_id: Uuid,
        token: &str,
        origin: &ClientOrigin,
        now: DateTime<Utc>,
    ) -> Admission {
        let mut session = Session::new(user_id, tenant_id, token, origin);
        session.admitted_utc = now;
        session.last_activity = now;
        let token_hash = session.token_hash.clone();

        let mut admission = Admission::default();
        {
            let mut entry = self.sessions.entry(user_id).or_default();
            while entry.len() >= self.max_concurrent {
                let oldest = entry
                    .iter()
                    .enumerate()
                    .min_by_key(|(_, s)| s.last_activity)
                    .map(|(i, _)| i);
                match oldest {
                    Some(i) => {
                        let evicted = entry.remove(i);
                        self.token_index.remove(&evicted.token_hash);
                        admission.evicted.push(evicted);
                    }
                    None => break,
                }
            }
            entry.push(session);
            self.token_index.insert(token_hash, user_id);
        }

        admission
    }

    /// Validate a session token and refresh its activity timestamp.
    pub fn touch(&self, token: &str, origin: &ClientOrigin, now: DateTime<Utc>) -> TouchOutcome {
        let token_hash = Session::hash_token(token);
        let user_id = match self.token_index.get(&token_hash) {
            Some(entry) => *entry.value(),
            None => return TouchOutcome::NotFound,
        };

        let mut outcome = TouchOutcome::NotFound;
        if let Some(mut entry) = self.sessions.get_mut(&user_id) {
            if let Some(pos) = entry.iter().position(|s| s.token_hash == token_hash) {
                let expired = now - entry[pos].last_activity > self.idle_timeout;
                if expired {
                    entry.remove(pos);
                    self.token_index.remove(&token_hash);
                    return TouchOutcome::Expired;
                }

                let mismatch = match (entry[pos].origin_ip, origin.ip) {
                    (Some(admitted), Some(seen)) => admitted != seen,
                    _ => false,
                };

                if mismatch {
                    match self.origin_policy {
                        SessionOriginPolicy::LogOnly => {
                            entry[pos].last_activity = now;
                            outcome = TouchOutcome::OriginMismatch { revoked: false };
                        }
                        SessionOriginPolicy::Revoke => {
                            entry.remove(pos);
                            self.token_index.remove(&token_hash);
                            outcome = TouchOutcome::OriginMismatch { revoked: true };
                        }
                    }
                } else {
                    entry[pos].last_activity = now;
                    outcome = TouchOutcome::Valid;
                }
            }
        }
        outcome
    }

    /// Drop a session by token. Returns the removed session, if any.
    pub fn revoke(&self, token: &str) -> Option<Session> {
        let token_hash = Session::hash_token(token);
        let user_id = *self.token_index.get(&token_hash)?.value();

        let mut removed = None;
        if let Some(mut entry) = self.sessions.get_mut(&user_id) {
            if let Some(pos) = entry.iter().position(|s| s.token_hash == token_hash) {
                removed = Some(entry.remove(pos));
            }
        }
        self.token_index.remove(&token_hash);
        removed
    }

    /// Remove idle-expired sessions, returning them for audit.
    pub fn purge_expired(&self, now: DateTime<Utc>) -> Vec<Session> {
        let mut expired = Vec::new();
        for mut entry in self.sessions.iter_mut() {
            let mut kept = Vec::with_capacity(entry.len());
            for session in entry.drain(..) {
                if now - session.last_activity > self.idle_timeout {
                    self.token_index.remove(&session.token_hash);
                    expired.push(session);
                } else {
                    kept.push(session);
                }
            }
            *entry.value_mut() = kept;
        }
        self.sessions.retain(|_, sessions| !sessions.is_empty());
        expired
    }

    pub fn active_count(&self, user_id: Uuid) -> usize {
        self.sessions
            .get(&user_id)
            .map(|sessions| sessions.len())
            .unwrap_or(0)
    }
}
