//! The approval list capability consulted by write policies.

use std::collections::BTreeSet;
use std::sync::{PoisonError, RwLock};

use sites_core::ServiceError;

/// Answers whether an email is on the approval list with status `approved`.
///
/// Matching is exact, case-sensitive string equality. Implementations must
/// return `false` for the empty string.
pub trait ApprovalList: Send + Sync {
    fn is_approved(&self, email: &str) -> Result<bool, ServiceError>;
}

/// Fixed in-memory approval list.
#[derive(Default)]
pub struct StaticApprovals {
    emails: RwLock<BTreeSet<String>>,
}

impl StaticApprovals {
    pub fn new<I, S>(emails: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            emails: RwLock::new(emails.into_iter().map(Into::into).collect()),
        }
    }

    // Every mutation leaves the set valid, so poisoned locks are recovered.
    pub fn approve(&self, email: &str) {
        let mut emails = self.emails.write().unwrap_or_else(PoisonError::into_inner);
        emails.insert(email.to_string());
    }

    pub fn revoke(&self, email: &str) {
        let mut emails = self.emails.write().unwrap_or_else(PoisonError::into_inner);
        emails.remove(email);
    }
}

impl ApprovalList for StaticApprovals {
    fn is_approved(&self, email: &str) -> Result<bool, ServiceError> {
        if email.is_empty() {
            return Ok(false);
        }
        let emails = self.emails.read().unwrap_or_else(PoisonError::into_inner);
        Ok(emails.contains(email))
    }
}
