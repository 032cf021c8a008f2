//! Guarded CRUD over site records.
//!
//! Every call runs the table's policies for the caller. Writes follow one
//! pipeline: pre-check, then load, apply input, before-triggers, post-check
//! and write inside a single KV transaction. Nothing is persisted unless
//! every step passes.

use std::cmp::Ordering;
use std::sync::Arc;

use sites_core::{ListParams, ListResult, ServiceError, merge_patch, new_id};
use sites_kv::{KVError, KVStore, Mutation};
use tracing::{debug, info, warn};

use crate::approval::ApprovalList;
use crate::identity::Caller;
use crate::model::{NewSite, SiteRecord};
use crate::rules::{Operation, Phase, TableRules};
use crate::setup;
use crate::timestamp::{Clock, SystemClock};

/// KV key prefix for site records.
pub const SITES_PREFIX: &str = "sites:";

pub struct SiteOps {
    kv: Arc<dyn KVStore>,
    approvals: Arc<dyn ApprovalList>,
    rules: TableRules,
    clock: Arc<dyn Clock>,
}

impl SiteOps {
    /// Site operations over `kv`, gated by `approvals`, with the `sites`
    /// rule set installed.
    pub fn new(kv: Arc<dyn KVStore>, approvals: Arc<dyn ApprovalList>) -> Self {
        Self {
            kv,
            approvals,
            rules: setup::site_rules(),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn rules(&self) -> &TableRules {
        &self.rules
    }

    fn make_key(id: &str) -> String {
        format!("{}{}", SITES_PREFIX, id)
    }

    fn kv_err(e: KVError) -> ServiceError {
        ServiceError::Storage(e.to_string())
    }

    fn decode(bytes: &[u8]) -> Result<SiteRecord, ServiceError> {
        serde_json::from_slice(bytes).map_err(|e| ServiceError::Internal(format!("deserialize: {}", e)))
    }

    fn authorize(&self, phase: Phase, op: Operation, caller: &Caller) -> Result<(), ServiceError> {
        let result = self.rules.check(phase, op, caller, self.approvals.as_ref());
        if let Err(ServiceError::PermissionDenied(msg)) = &result {
            warn!("sites: {:?} check failed: {}", phase, msg);
        }
        result
    }

    fn load(&self, id: &str) -> Result<Option<SiteRecord>, ServiceError> {
        match self.kv.get(&Self::make_key(id)).map_err(Self::kv_err)? {
            Some(bytes) => Ok(Some(Self::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Record the pipeline result and turn it into the write to apply.
    /// Any error rolls the transaction back.
    fn commit(
        outcome: &mut Result<SiteRecord, ServiceError>,
        result: Result<SiteRecord, ServiceError>,
    ) -> Mutation {
        let bytes = result.and_then(|record| {
            serde_json::to_vec(&record)
                .map(|bytes| (record, bytes))
                .map_err(|e| ServiceError::Internal(format!("serialize: {}", e)))
        });
        match bytes {
            Ok((record, bytes)) => {
                *outcome = Ok(record);
                Mutation::Put(bytes)
            }
            Err(e) => {
                *outcome = Err(e);
                Mutation::Keep
            }
        }
    }

    fn not_found(id: &str) -> ServiceError {
        ServiceError::NotFound(format!("site '{}' not found", id))
    }

    /// Get a site by id. Returns None if not found.
    pub fn get(&self, caller: &Caller, id: &str) -> Result<Option<SiteRecord>, ServiceError> {
        self.authorize(Phase::Using, Operation::Select, caller)?;
        self.load(id)
    }

    /// Get a site or return NotFound.
    pub fn get_or_err(&self, caller: &Caller, id: &str) -> Result<SiteRecord, ServiceError> {
        self.get(caller, id)?.ok_or_else(|| Self::not_found(id))
    }

    /// All sites, ordered by site number (unnumbered last), then id.
    pub fn list_all(&self, caller: &Caller) -> Result<Vec<SiteRecord>, ServiceError> {
        self.authorize(Phase::Using, Operation::Select, caller)?;

        let entries = self.kv.scan(SITES_PREFIX).map_err(Self::kv_err)?;
        let mut records = Vec::with_capacity(entries.len());
        for (_key, bytes) in entries {
            records.push(Self::decode(&bytes)?);
        }
        records.sort_by(by_site_number);
        Ok(records)
    }

    /// Sites with pagination (limit/offset) over the `list_all` order.
    pub fn list(
        &self,
        caller: &Caller,
        params: &ListParams,
    ) -> Result<ListResult<SiteRecord>, ServiceError> {
        let all = self.list_all(caller)?;
        Ok(ListResult::paginate(all, params))
    }

    /// Create a site. Generates an id when none is given; `last_modified`
    /// is the insert time regardless of input.
    pub fn create(&self, caller: &Caller, new: NewSite) -> Result<SiteRecord, ServiceError> {
        self.authorize(Phase::Using, Operation::Insert, caller)?;

        let id = match new.id.as_deref() {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => new_id(),
        };

        let mut outcome = Err(ServiceError::Internal("create did not run".into()));
        self.kv
            .mutate(&Self::make_key(&id), &mut |current| {
                if current.is_some() {
                    outcome = Err(ServiceError::Conflict(format!("site '{}' already exists", id)));
                    return Mutation::Keep;
                }
                let now = self.clock.now();
                let mut record = new.clone().into_record(id.clone(), now);
                self.rules.fire_before(Operation::Insert, None, &mut record, now);
                Self::commit(
                    &mut outcome,
                    self.authorize(Phase::WithCheck, Operation::Insert, caller)
                        .map(|()| record),
                )
            })
            .map_err(Self::kv_err)?;
        let record = outcome?;

        info!("sites: {} created site '{}'", caller, record.id);
        Ok(record)
    }

    /// Apply an RFC 7386 merge patch to a site.
    ///
    /// `last_modified` in the patch is discarded; the update trigger sets it.
    /// The patch may not change `id`.
    pub fn update(
        &self,
        caller: &Caller,
        id: &str,
        patch: &serde_json::Value,
    ) -> Result<SiteRecord, ServiceError> {
        self.authorize(Phase::Using, Operation::Update, caller)?;

        let mut patch = patch.clone();
        let fields = patch
            .as_object_mut()
            .ok_or_else(|| ServiceError::Validation("patch must be a JSON object".into()))?;
        fields.remove("last_modified");

        let mut outcome = Err(ServiceError::Internal("update did not run".into()));
        self.kv
            .mutate(&Self::make_key(id), &mut |current| {
                let updated = match current {
                    Some(bytes) => Self::decode(bytes)
                        .and_then(|existing| self.apply_patch(caller, id, existing, &patch)),
                    None => Err(Self::not_found(id)),
                };
                Self::commit(&mut outcome, updated)
            })
            .map_err(Self::kv_err)?;
        let record = outcome?;

        info!("sites: {} updated site '{}'", caller, id);
        Ok(record)
    }

    /// Merge, trigger and post-check an update against the stored row.
    fn apply_patch(
        &self,
        caller: &Caller,
        id: &str,
        existing: SiteRecord,
        patch: &serde_json::Value,
    ) -> Result<SiteRecord, ServiceError> {
        let mut merged = serde_json::to_value(&existing)
            .map_err(|e| ServiceError::Internal(format!("serialize: {}", e)))?;
        merge_patch(&mut merged, patch);
        let mut record: SiteRecord = serde_json::from_value(merged)
            .map_err(|e| ServiceError::Validation(format!("invalid site patch: {}", e)))?;

        if record.id != id {
            return Err(ServiceError::Validation(format!(
                "site id '{}' cannot be changed to '{}'",
                id, record.id
            )));
        }

        let now = self.clock.now();
        self.rules
            .fire_before(Operation::Update, Some(&existing), &mut record, now);

        self.authorize(Phase::WithCheck, Operation::Update, caller)?;
        Ok(record)
    }

    /// Delete a site by id.
    pub fn delete(&self, caller: &Caller, id: &str) -> Result<(), ServiceError> {
        self.authorize(Phase::Using, Operation::Delete, caller)?;

        let mut found = false;
        self.kv
            .mutate(&Self::make_key(id), &mut |current| {
                found = current.is_some();
                if found { Mutation::Delete } else { Mutation::Keep }
            })
            .map_err(Self::kv_err)?;
        if !found {
            return Err(Self::not_found(id));
        }

        info!("sites: {} deleted site '{}'", caller, id);
        Ok(())
    }

    /// Count all sites.
    pub fn count(&self, caller: &Caller) -> Result<usize, ServiceError> {
        self.authorize(Phase::Using, Operation::Select, caller)?;
        let entries = self.kv.scan(SITES_PREFIX).map_err(Self::kv_err)?;
        debug!("sites: count = {}", entries.len());
        Ok(entries.len())
    }
}

fn by_site_number(a: &SiteRecord, b: &SiteRecord) -> Ordering {
    match (a.site_number, b.site_number) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
    .then_with(|| a.id.cmp(&b.id))
}
