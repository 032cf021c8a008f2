//! Persisted entities: site records and approval entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A monitoring site. Stored under `sites:{id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteRecord {
    pub id: String,
    #[serde(default)]
    pub site_number: Option<i64>,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub short_name: Option<String>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub elevation: Option<i64>,
    #[serde(default)]
    pub description: Option<String>,
    /// System-maintained. Client input for this field is never persisted.
    pub last_modified: DateTime<Utc>,
}

/// Payload for creating a site. Every attribute is optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewSite {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub site_number: Option<i64>,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub short_name: Option<String>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub elevation: Option<i64>,
    #[serde(default)]
    pub description: Option<String>,
    /// Accepted so clients can echo full records back; ignored on insert.
    #[serde(default)]
    pub last_modified: Option<DateTime<Utc>>,
}

impl NewSite {
    /// Build the stored record. `last_modified` takes the insert time.
    pub(crate) fn into_record(self, id: String, now: DateTime<Utc>) -> SiteRecord {
        SiteRecord {
            id,
            site_number: self.site_number,
            full_name: self.full_name,
            short_name: self.short_name,
            latitude: self.latitude,
            longitude: self.longitude,
            elevation: self.elevation,
            description: self.description,
            last_modified: now,
        }
    }
}

/// Status of an approval entry. Only `Approved` grants write access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Denied,
    #[serde(other)]
    Other,
}

/// An email on the approval list. Stored under `pending_admins:{email}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalEntry {
    pub email: String,
    pub status: ApprovalStatus,
    #[serde(default)]
    pub requested_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub approved_by: Option<String>,
    #[serde(default)]
    pub approved_at: Option<DateTime<Utc>>,
}

impl ApprovalEntry {
    pub fn is_approved(&self) -> bool {
        self.status == ApprovalStatus::Approved
    }
}
