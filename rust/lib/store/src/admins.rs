//! KV-backed approval list (`pending_admins`).
//!
//! Users file an access request, approved admins approve or revoke it.
//! Entries are keyed by the exact email string. The registry is also the
//! `ApprovalList` that gates writes to `sites`.

use std::sync::Arc;

use sites_core::ServiceError;
use sites_kv::KVStore;
use tracing::{info, warn};

use crate::approval::ApprovalList;
use crate::identity::Caller;
use crate::model::{ApprovalEntry, ApprovalStatus};
use crate::timestamp::{Clock, SystemClock};

/// KV key prefix for approval entries.
pub const PENDING_ADMINS_PREFIX: &str = "pending_admins:";

pub struct AdminRegistry {
    kv: Arc<dyn KVStore>,
    clock: Arc<dyn Clock>,
}

impl AdminRegistry {
    pub fn new(kv: Arc<dyn KVStore>) -> Self {
        Self {
            kv,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    fn make_key(email: &str) -> String {
        format!("{}{}", PENDING_ADMINS_PREFIX, email)
    }

    fn put(&self, entry: &ApprovalEntry) -> Result<(), ServiceError> {
        let bytes = serde_json::to_vec(entry)
            .map_err(|e| ServiceError::Internal(format!("serialize: {}", e)))?;
        self.kv
            .set(&Self::make_key(&entry.email), &bytes)
            .map_err(|e| ServiceError::Storage(e.to_string()))
    }

    fn validate_email(email: &str) -> Result<(), ServiceError> {
        if email.is_empty() || !email.contains('@') {
            return Err(ServiceError::Validation(format!("'{}' is not an email address", email)));
        }
        Ok(())
    }

    /// Only approved callers manage the list.
    fn require_approved<'a>(&self, caller: &'a Caller, action: &str) -> Result<&'a str, ServiceError> {
        if let Some(email) = caller.email() {
            if self.is_approved(email)? {
                return Ok(email);
            }
        }
        warn!("pending_admins: {} denied for {}", action, caller);
        Err(ServiceError::PermissionDenied(format!(
            "{} on pending_admins denied for {}",
            action, caller
        )))
    }

    /// Look up an entry by exact email.
    pub fn get(&self, email: &str) -> Result<Option<ApprovalEntry>, ServiceError> {
        match self
            .kv
            .get(&Self::make_key(email))
            .map_err(|e| ServiceError::Storage(e.to_string()))?
        {
            Some(bytes) => {
                let entry = serde_json::from_slice(&bytes)
                    .map_err(|e| ServiceError::Internal(format!("deserialize: {}", e)))?;
                Ok(Some(entry))
            }
            None => Ok(None),
        }
    }

    /// File a pending request for the caller's own email.
    ///
    /// An existing entry (pending, approved or denied) is returned unchanged.
    pub fn request_access(&self, caller: &Caller) -> Result<ApprovalEntry, ServiceError> {
        let email = caller.email().ok_or_else(|| {
            ServiceError::PermissionDenied(format!(
                "access request requires an email claim, got {}",
                caller
            ))
        })?;

        if let Some(existing) = self.get(email)? {
            return Ok(existing);
        }

        let entry = ApprovalEntry {
            email: email.to_string(),
            status: ApprovalStatus::Pending,
            requested_at: Some(self.clock.now()),
            approved_by: None,
            approved_at: None,
        };
        self.put(&entry)?;
        info!("pending_admins: access requested by {}", email);
        Ok(entry)
    }

    /// Approve `email`, creating the entry if needed.
    pub fn approve(&self, caller: &Caller, email: &str) -> Result<ApprovalEntry, ServiceError> {
        let by = self.require_approved(caller, "approve")?;
        Self::validate_email(email)?;
        let entry = self.set_approved(email, by)?;
        info!("pending_admins: {} approved by {}", email, by);
        Ok(entry)
    }

    /// Revoke access for `email` (status `denied`).
    pub fn revoke(&self, caller: &Caller, email: &str) -> Result<ApprovalEntry, ServiceError> {
        let by = self.require_approved(caller, "revoke")?;
        let mut entry = self
            .get(email)?
            .ok_or_else(|| ServiceError::NotFound(format!("no approval entry for '{}'", email)))?;
        entry.status = ApprovalStatus::Denied;
        self.put(&entry)?;
        info!("pending_admins: {} revoked by {}", email, by);
        Ok(entry)
    }

    /// List entries, optionally filtered by status. Approved callers only.
    pub fn list(
        &self,
        caller: &Caller,
        status: Option<ApprovalStatus>,
    ) -> Result<Vec<ApprovalEntry>, ServiceError> {
        self.require_approved(caller, "list")?;

        let entries = self
            .kv
            .scan(PENDING_ADMINS_PREFIX)
            .map_err(|e| ServiceError::Storage(e.to_string()))?;
        let mut result = Vec::with_capacity(entries.len());
        for (_key, bytes) in entries {
            let entry: ApprovalEntry = serde_json::from_slice(&bytes)
                .map_err(|e| ServiceError::Internal(format!("deserialize: {}", e)))?;
            if status.is_none_or(|s| s == entry.status) {
                result.push(entry);
            }
        }
        Ok(result)
    }

    /// Ensure `email` is approved without a caller check. Used at startup.
    pub fn ensure_approved(&self, email: &str, approved_by: &str) -> Result<ApprovalEntry, ServiceError> {
        Self::validate_email(email)?;
        if let Some(existing) = self.get(email)? {
            if existing.is_approved() {
                info!("pending_admins: {} already approved", email);
                return Ok(existing);
            }
        }
        let entry = self.set_approved(email, approved_by)?;
        info!("pending_admins: bootstrapped {}", email);
        Ok(entry)
    }

    fn set_approved(&self, email: &str, by: &str) -> Result<ApprovalEntry, ServiceError> {
        let now = self.clock.now();
        let requested_at = self.get(email)?.and_then(|e| e.requested_at);
        let entry = ApprovalEntry {
            email: email.to_string(),
            status: ApprovalStatus::Approved,
            requested_at,
            approved_by: Some(by.to_string()),
            approved_at: Some(now),
        };
        self.put(&entry)?;
        Ok(entry)
    }
}

impl ApprovalList for AdminRegistry {
    fn is_approved(&self, email: &str) -> Result<bool, ServiceError> {
        if email.is_empty() {
            return Ok(false);
        }
        Ok(self.get(email)?.is_some_and(|e| e.is_approved()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NewSite;
    use crate::sites::SiteOps;

    fn registry() -> (Arc<AdminRegistry>, Arc<dyn KVStore>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let kv: Arc<dyn KVStore> =
            Arc::new(sites_kv::RedbStore::open(&dir.path().join("admins.redb")).unwrap());
        let reg = Arc::new(AdminRegistry::new(Arc::clone(&kv)));
        reg.ensure_approved("root@x.org", "bootstrap").unwrap();
        (reg, kv, dir)
    }

    #[test]
    fn request_then_approve_flow() {
        let (reg, _kv, _dir) = registry();
        let user = Caller::with_email("new@x.org");

        let entry = reg.request_access(&user).unwrap();
        assert_eq!(entry.status, ApprovalStatus::Pending);
        assert!(entry.requested_at.is_some());
        assert!(!reg.is_approved("new@x.org").unwrap());

        // Requesting twice changes nothing.
        assert_eq!(reg.request_access(&user).unwrap(), entry);

        let approved = reg.approve(&Caller::with_email("root@x.org"), "new@x.org").unwrap();
        assert_eq!(approved.status, ApprovalStatus::Approved);
        assert_eq!(approved.approved_by.as_deref(), Some("root@x.org"));
        assert_eq!(approved.requested_at, entry.requested_at);
        assert!(reg.is_approved("new@x.org").unwrap());
    }

    #[test]
    fn only_approved_callers_manage_list() {
        let (reg, _kv, _dir) = registry();
        reg.request_access(&Caller::with_email("p@x.org")).unwrap();

        for caller in [Caller::Anonymous, Caller::with_email("p@x.org")] {
            assert!(reg.approve(&caller, "p@x.org").unwrap_err().is_permission_denied());
            assert!(reg.revoke(&caller, "root@x.org").unwrap_err().is_permission_denied());
            assert!(reg.list(&caller, None).unwrap_err().is_permission_denied());
        }
        assert!(!reg.is_approved("p@x.org").unwrap());
    }

    #[test]
    fn request_requires_email_claim() {
        let (reg, _kv, _dir) = registry();
        assert!(reg.request_access(&Caller::Anonymous).is_err());
        assert!(reg.request_access(&Caller::authenticated("u", None)).is_err());
    }

    #[test]
    fn revoke_sets_denied() {
        let (reg, _kv, _dir) = registry();
        let root = Caller::with_email("root@x.org");
        reg.approve(&root, "b@x.org").unwrap();
        assert!(reg.is_approved("b@x.org").unwrap());

        let entry = reg.revoke(&root, "b@x.org").unwrap();
        assert_eq!(entry.status, ApprovalStatus::Denied);
        assert!(!reg.is_approved("b@x.org").unwrap());

        let err = reg.revoke(&root, "ghost@x.org").unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[test]
    fn list_filters_by_status() {
        let (reg, _kv, _dir) = registry();
        let root = Caller::with_email("root@x.org");
        reg.request_access(&Caller::with_email("p1@x.org")).unwrap();
        reg.request_access(&Caller::with_email("p2@x.org")).unwrap();
        reg.approve(&root, "p2@x.org").unwrap();

        assert_eq!(reg.list(&root, None).unwrap().len(), 3);
        let pending = reg.list(&root, Some(ApprovalStatus::Pending)).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].email, "p1@x.org");
        assert_eq!(reg.list(&root, Some(ApprovalStatus::Approved)).unwrap().len(), 2);
    }

    #[test]
    fn invalid_email_rejected() {
        let (reg, _kv, _dir) = registry();
        let err = reg.approve(&Caller::with_email("root@x.org"), "").unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
        assert!(reg.ensure_approved("nobody", "bootstrap").is_err());
    }

    #[test]
    fn ensure_approved_is_idempotent() {
        let (reg, _kv, _dir) = registry();
        let first = reg.get("root@x.org").unwrap().unwrap();
        let again = reg.ensure_approved("root@x.org", "someone-else").unwrap();
        assert_eq!(first, again);
    }

    #[test]
    fn registry_gates_site_writes() {
        let (reg, kv, _dir) = registry();
        let ops = SiteOps::new(kv, reg.clone());
        let newbie = Caller::with_email("n@x.org");

        reg.request_access(&newbie).unwrap();
        let err = ops.create(&newbie, NewSite::default()).unwrap_err();
        assert!(err.is_permission_denied());

        reg.approve(&Caller::with_email("root@x.org"), "n@x.org").unwrap();
        ops.create(&newbie, NewSite::default()).unwrap();
        assert_eq!(ops.count(&Caller::Anonymous).unwrap(), 1);
    }
}
