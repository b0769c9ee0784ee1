//! The target registry: which hosts may be acted upon.
//!
//! Validation order is fixed:
//! 1. live self-identifier membership (short-circuits)
//! 2. static loopback patterns (short-circuits)
//! 3. registration lookup by normalized host
//! 4. authorization flag
//! 5. authorization age (warning only)
//!
//! Steps 1 and 2 never consult stored records, so no registration can make
//! this system a valid target.

use std::collections::HashMap;
use std::sync::{LazyLock, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{Duration, Utc};
use regex::Regex;
use tracing::{info, warn};
use uuid::Uuid;

use super::{
    SelfIdentifierSet, TargetDraft, TargetStore, TargetSystem, ValidationResult,
    authorization_template, check_record_id, normalize_host,
};
use crate::errors::TargetError;

static LOCALHOST_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"^localhost$",
        r"^127\.\d+\.\d+\.\d+$",
        r"^::1$",
        r"^0\.0\.0\.0$",
        r"^local$",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

/// Default age after which an authorization draws a re-verification warning.
pub const DEFAULT_AUTHORIZATION_MAX_AGE_DAYS: i64 = 90;

/// Owns every `TargetSystem` and the self-identifier set.
pub struct TargetRegistry {
    targets: RwLock<HashMap<String, TargetSystem>>,
    self_ids: SelfIdentifierSet,
    store: Box<dyn TargetStore>,
    authorization_max_age: Duration,
}

impl TargetRegistry {
    /// Open a registry over `store`, detecting self identifiers from the live system.
    pub fn open(store: Box<dyn TargetStore>) -> Result<Self, TargetError> {
        Self::with_self_identifiers(store, SelfIdentifierSet::detect())
    }

    /// Open a registry with an explicit self-identifier set.
    pub fn with_self_identifiers(
        store: Box<dyn TargetStore>,
        self_ids: SelfIdentifierSet,
    ) -> Result<Self, TargetError> {
        let loaded = store.load_all()?;
        info!(count = loaded.len(), "Loaded target configurations");
        let targets = loaded.into_iter().map(|t| (t.id.clone(), t)).collect();

        Ok(Self {
            targets: RwLock::new(targets),
            self_ids,
            store,
            authorization_max_age: Duration::days(DEFAULT_AUTHORIZATION_MAX_AGE_DAYS),
        })
    }

    /// Override the age threshold for the stale-authorization warning.
    pub fn with_authorization_max_age_days(mut self, days: i64) -> Self {
        self.authorization_max_age = Duration::days(days);
        self
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, TargetSystem>> {
        // Readers only copy data out, so a poisoned map is still consistent.
        self.targets.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HashMap<String, TargetSystem>>, TargetError> {
        self.targets.write().map_err(|_| TargetError::LockPoisoned)
    }

    /// Register a new authorized target.
    ///
    /// The self-target check runs before the authorization check, so a
    /// self-target is refused even when falsely marked authorized.
    pub fn register_target(&self, draft: TargetDraft) -> Result<TargetSystem, TargetError> {
        if draft.host.trim().is_empty() {
            return Err(TargetError::InvalidRecord("target host is empty".to_string()));
        }

        let validation = self.validate_target(&draft.host);
        if validation.is_self_target {
            warn!(host = %draft.host, "refused self-target registration");
            return Err(TargetError::SelfTarget { host: draft.host });
        }

        let has_document = draft
            .authorization_document
            .as_deref()
            .map(|d| !d.trim().is_empty())
            .unwrap_or(false);
        if !draft.authorized || !has_document {
            return Err(TargetError::Authorization(
                "Target must be authorized with documentation. Provide authorization document path or reference."
                    .to_string(),
            ));
        }

        let target = TargetSystem {
            id: format!("target-{}", Uuid::new_v4()),
            name: draft.name,
            host: draft.host.trim().to_string(),
            port: draft.port,
            os: draft.os,
            authorized: true,
            authorization_document: draft.authorization_document,
            authorization_date: Some(draft.authorization_date.unwrap_or_else(Utc::now)),
            authorized_by: draft.authorized_by,
            scope: draft.scope,
            out_of_scope: draft.out_of_scope,
            notes: draft.notes,
            created_at: Utc::now(),
            last_verified: None,
        };

        self.store.save(&target)?;
        self.write()?.insert(target.id.clone(), target.clone());
        info!(target_id = %target.id, host = %target.host, "Registered target");
        Ok(target)
    }

    /// Decide whether `host` may be acted upon. Always returns.
    pub fn validate_target(&self, host: &str) -> ValidationResult {
        let mut result = ValidationResult::default();
        let normalized = normalize_host(host);

        if normalized.is_empty() {
            result.errors.push("Target host is empty.".to_string());
            return result;
        }

        if self.self_ids.contains(&normalized) {
            result.is_self_target = true;
            result
                .errors
                .push("Target is identified as self-system. Self-targeting is prohibited.".to_string());
            return result;
        }

        if LOCALHOST_PATTERNS.iter().any(|p| p.is_match(&normalized)) {
            result.is_self_target = true;
            result
                .errors
                .push("Target matches localhost pattern. Self-targeting is prohibited.".to_string());
            return result;
        }

        let Some(target) = self.find_by_host(&normalized) else {
            result.errors.push(
                "Target is not registered. All targets must be registered with authorization."
                    .to_string(),
            );
            return result;
        };

        if !target.authorized {
            result
                .errors
                .push("Target is registered but not authorized. Authorization required.".to_string());
            return result;
        }

        if let Some(date) = target.authorization_date
            && Utc::now() - date > self.authorization_max_age
        {
            result.warnings.push(format!(
                "Authorization is older than {} days. Consider re-verification.",
                self.authorization_max_age.num_days()
            ));
        }

        result.is_valid = true;
        result.is_authorized = true;
        result
    }

    /// Most recently created target whose normalized host equals `normalized`.
    fn find_by_host(&self, normalized: &str) -> Option<TargetSystem> {
        self.read()
            .values()
            .filter(|t| t.normalized_host() == normalized)
            .max_by_key(|t| t.created_at)
            .cloned()
    }

    pub fn get_target(&self, id: &str) -> Option<TargetSystem> {
        self.read().get(id).cloned()
    }

    /// Every registered target, oldest first.
    pub fn list_targets(&self) -> Vec<TargetSystem> {
        let mut targets: Vec<TargetSystem> = self.read().values().cloned().collect();
        targets.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        targets
    }

    pub fn authorized_targets(&self) -> Vec<TargetSystem> {
        self.list_targets()
            .into_iter()
            .filter(|t| t.authorized)
            .collect()
    }

    /// Apply `f` to a stored target and persist the result.
    fn mutate<F>(&self, id: &str, f: F) -> Result<TargetSystem, TargetError>
    where
        F: FnOnce(&mut TargetSystem),
    {
        let mut targets = self.write()?;
        let target = targets.get_mut(id).ok_or_else(|| TargetError::NotFound {
            id: id.to_string(),
        })?;

        let mut updated = target.clone();
        f(&mut updated);
        self.store.save(&updated)?;
        *target = updated.clone();
        Ok(updated)
    }

    /// Re-authorize a target under a new document.
    pub fn update_authorization(
        &self,
        id: &str,
        document: &str,
        authorized_by: &str,
    ) -> Result<TargetSystem, TargetError> {
        if document.trim().is_empty() {
            return Err(TargetError::Authorization(
                "Authorization document reference must not be empty.".to_string(),
            ));
        }

        let updated = self.mutate(id, |t| {
            let now = Utc::now();
            t.authorized = true;
            t.authorization_document = Some(document.to_string());
            t.authorization_date = Some(now);
            t.authorized_by = Some(authorized_by.to_string());
            t.last_verified = Some(now);
        })?;
        info!(target_id = %id, authorized_by = %authorized_by, "Updated target authorization");
        Ok(updated)
    }

    /// Withdraw authorization. The reason is prepended to the notes as an audit trail.
    pub fn revoke_authorization(&self, id: &str, reason: &str) -> Result<TargetSystem, TargetError> {
        let updated = self.mutate(id, |t| {
            t.authorized = false;
            t.notes = if t.notes.is_empty() {
                format!("Authorization revoked: {}", reason)
            } else {
                format!("Authorization revoked: {}\n{}", reason, t.notes)
            };
        })?;
        warn!(target_id = %id, reason = %reason, "Revoked target authorization");
        Ok(updated)
    }

    pub fn delete_target(&self, id: &str) -> Result<TargetSystem, TargetError> {
        let mut targets = self.write()?;
        if !targets.contains_key(id) {
            return Err(TargetError::NotFound { id: id.to_string() });
        }
        self.store.delete(id)?;
        let removed = targets
            .remove(id)
            .ok_or_else(|| TargetError::NotFound { id: id.to_string() })?;
        info!(target_id = %id, "Deleted target");
        Ok(removed)
    }

    /// All targets as a pretty JSON array.
    pub fn export_targets(&self) -> Result<String, TargetError> {
        Ok(serde_json::to_string_pretty(&self.list_targets())?)
    }

    /// Import targets from a JSON array produced by `export_targets`.
    ///
    /// Each record is re-validated against the live self-identifier set and
    /// the documentation rule `register_target` enforces; failing records
    /// are skipped. Every id is checked before anything is saved, so a bad
    /// id rejects the whole batch. Returns the number imported.
    pub fn import_targets(&self, json: &str) -> Result<usize, TargetError> {
        let incoming: Vec<TargetSystem> = serde_json::from_str(json)?;

        let mut accepted = Vec::with_capacity(incoming.len());
        for target in incoming {
            check_record_id(&target.id)?;
            if self.validate_target(&target.host).is_self_target {
                warn!(host = %target.host, "Skipping self-target during import");
                continue;
            }
            let has_document = target
                .authorization_document
                .as_deref()
                .is_some_and(|d| !d.trim().is_empty());
            if target.authorized && !has_document {
                warn!(
                    target_id = %target.id,
                    host = %target.host,
                    "Skipping authorized target without authorization document"
                );
                continue;
            }
            accepted.push(target);
        }

        let imported = accepted.len();
        for target in accepted {
            self.store.save(&target)?;
            self.write()?.insert(target.id.clone(), target);
        }

        info!(imported, "Imported targets");
        Ok(imported)
    }

    /// Identifiers this system answers to, sorted.
    pub fn self_identifiers(&self) -> Vec<String> {
        self.self_ids.to_sorted_vec()
    }

    pub fn authorization_template(&self, host: &str, name: &str) -> String {
        authorization_template(host, name, Utc::now())
    }
}
