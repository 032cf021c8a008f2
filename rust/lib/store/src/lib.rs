//! Site records guarded by row-security policies.
//!
//! Reads of `sites` are open to every caller. Inserts, updates and deletes
//! require an authenticated caller whose email is approved on the
//! `pending_admins` list. `last_modified` is maintained by the store and
//! never taken from caller input.
//!
//! ```ignore
//! let registry = Arc::new(AdminRegistry::new(kv.clone()));
//! let sites = SiteOps::new(kv, registry);
//! sites.update(&Caller::with_email("admin@x.org"), "blue", &json!({"full_name": "New"}))?;
//! ```

pub mod admins;
pub mod approval;
pub mod identity;
pub mod model;
pub mod rules;
pub mod setup;
pub mod sites;
pub mod timestamp;

pub use admins::AdminRegistry;
pub use approval::{ApprovalList, StaticApprovals};
pub use identity::Caller;
pub use model::{ApprovalEntry, ApprovalStatus, NewSite, SiteRecord};
pub use rules::{Command, Operation, Phase, Policy, Rule, TableRules, Trigger, TriggerAction};
pub use sites::SiteOps;
pub use timestamp::{Clock, FixedClock, SystemClock};
