//! Row-security policies and before-write triggers attached to a table.
//!
//! Policies are permissive: an operation passes if any applicable policy's
//! rule passes. With row security enabled and no applicable policy, the
//! operation is denied. Policies and triggers are keyed by name, so
//! installing one under an existing name replaces it.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use sites_core::ServiceError;

use crate::approval::ApprovalList;
use crate::identity::Caller;
use crate::model::SiteRecord;
use crate::timestamp;

/// A storage operation against a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Select,
    Insert,
    Update,
    Delete,
}

impl Operation {
    pub fn is_write(self) -> bool {
        !matches!(self, Operation::Select)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Operation::Select => "select",
            Operation::Insert => "insert",
            Operation::Update => "update",
            Operation::Delete => "delete",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which operations a policy covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Select,
    Insert,
    Update,
    Delete,
    All,
}

impl Command {
    pub fn applies_to(self, op: Operation) -> bool {
        match self {
            Command::All => true,
            Command::Select => op == Operation::Select,
            Command::Insert => op == Operation::Insert,
            Command::Update => op == Operation::Update,
            Command::Delete => op == Operation::Delete,
        }
    }
}

/// A predicate over the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rule {
    /// Always passes, authenticated or not.
    Public,
    /// Caller has an email claim with an `approved` entry on the approval list.
    ApprovedCaller,
}

impl Rule {
    pub fn evaluate(self, caller: &Caller, approvals: &dyn ApprovalList) -> Result<bool, ServiceError> {
        match self {
            Rule::Public => Ok(true),
            Rule::ApprovedCaller => match caller.email() {
                Some(email) => approvals.is_approved(email),
                None => Ok(false),
            },
        }
    }
}

/// When a policy is evaluated relative to the write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Before the write, against the existing row.
    Using,
    /// After the write is computed, against the resulting row.
    WithCheck,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Policy {
    pub name: String,
    pub command: Command,
    pub using: Rule,
    /// Falls back to `using` when absent.
    pub with_check: Option<Rule>,
}

impl Policy {
    pub fn new(name: impl Into<String>, command: Command, using: Rule) -> Self {
        Self {
            name: name.into(),
            command,
            using,
            with_check: None,
        }
    }

    pub fn with_check(mut self, rule: Rule) -> Self {
        self.with_check = Some(rule);
        self
    }

    fn rule_for(&self, phase: Phase) -> Rule {
        match phase {
            Phase::Using => self.using,
            Phase::WithCheck => self.with_check.unwrap_or(self.using),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerAction {
    /// Set `last_modified` to the current time.
    StampLastModified,
}

/// A before-write hook. Runs after the pre-check and before the post-check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trigger {
    pub name: String,
    pub events: Vec<Operation>,
    pub action: TriggerAction,
}

impl Trigger {
    pub fn before(name: impl Into<String>, events: &[Operation], action: TriggerAction) -> Self {
        Self {
            name: name.into(),
            events: events.to_vec(),
            action,
        }
    }

    fn fires_on(&self, op: Operation) -> bool {
        self.events.contains(&op)
    }
}

/// Policies and triggers attached to one table.
#[derive(Debug, Clone)]
pub struct TableRules {
    table: String,
    row_security: bool,
    policies: BTreeMap<String, Policy>,
    triggers: BTreeMap<String, Trigger>,
}

impl TableRules {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            row_security: false,
            policies: BTreeMap::new(),
            triggers: BTreeMap::new(),
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn enable_row_security(&mut self) {
        self.row_security = true;
    }

    pub fn row_security(&self) -> bool {
        self.row_security
    }

    /// Install a policy, replacing any policy with the same name.
    pub fn install_policy(&mut self, policy: Policy) -> Option<Policy> {
        self.policies.insert(policy.name.clone(), policy)
    }

    pub fn drop_policy(&mut self, name: &str) -> Option<Policy> {
        self.policies.remove(name)
    }

    /// Install a trigger, replacing any trigger with the same name.
    pub fn install_trigger(&mut self, trigger: Trigger) -> Option<Trigger> {
        self.triggers.insert(trigger.name.clone(), trigger)
    }

    pub fn drop_trigger(&mut self, name: &str) -> Option<Trigger> {
        self.triggers.remove(name)
    }

    pub fn policies(&self) -> impl Iterator<Item = &Policy> {
        self.policies.values()
    }

    pub fn triggers(&self) -> impl Iterator<Item = &Trigger> {
        self.triggers.values()
    }

    /// Decide whether `caller` may perform `op` in the given phase.
    ///
    /// Public rules are tried first so that an open operation never
    /// depends on the approval list being reachable.
    pub fn check(
        &self,
        phase: Phase,
        op: Operation,
        caller: &Caller,
        approvals: &dyn ApprovalList,
    ) -> Result<(), ServiceError> {
        if !self.row_security {
            return Ok(());
        }

        let mut rules: Vec<Rule> = self
            .policies
            .values()
            .filter(|p| p.command.applies_to(op))
            .map(|p| p.rule_for(phase))
            .collect();
        rules.sort_by_key(|r| *r != Rule::Public);

        for rule in rules {
            if rule.evaluate(caller, approvals)? {
                return Ok(());
            }
        }

        Err(ServiceError::PermissionDenied(format!(
            "{} on {} denied for {}",
            op, self.table, caller
        )))
    }

    /// Run every before-trigger registered for `op` on the outgoing row.
    pub fn fire_before(
        &self,
        op: Operation,
        previous: Option<&SiteRecord>,
        record: &mut SiteRecord,
        now: DateTime<Utc>,
    ) {
        for trigger in self.triggers.values().filter(|t| t.fires_on(op)) {
            match trigger.action {
                TriggerAction::StampLastModified => {
                    let prev = previous.map(|p| p.last_modified).unwrap_or(now);
                    timestamp::stamp_update(record, prev, now);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::approval::StaticApprovals;

    /// An approval list that is always unreachable.
    struct Broken;

    impl ApprovalList for Broken {
        fn is_approved(&self, _email: &str) -> Result<bool, ServiceError> {
            Err(ServiceError::Storage("approval list offline".into()))
        }
    }

    fn rules() -> TableRules {
        let mut rules = TableRules::new("things");
        rules.enable_row_security();
        rules.install_policy(Policy::new("read", Command::Select, Rule::Public));
        rules.install_policy(
            Policy::new("write", Command::All, Rule::ApprovedCaller).with_check(Rule::ApprovedCaller),
        );
        rules
    }

    #[test]
    fn command_coverage() {
        assert!(Command::All.applies_to(Operation::Delete));
        assert!(Command::Select.applies_to(Operation::Select));
        assert!(!Command::Select.applies_to(Operation::Insert));
        assert!(!Operation::Select.is_write());
        assert!(Operation::Delete.is_write());
    }

    #[test]
    fn disabled_row_security_allows_everything() {
        let rules = TableRules::new("open");
        let approvals = StaticApprovals::default();
        rules
            .check(Phase::Using, Operation::Delete, &Caller::Anonymous, &approvals)
            .unwrap();
    }

    #[test]
    fn enabled_without_policies_denies() {
        let mut rules = TableRules::new("closed");
        rules.enable_row_security();
        let approvals = StaticApprovals::default();
        let err = rules
            .check(Phase::Using, Operation::Select, &Caller::Anonymous, &approvals)
            .unwrap_err();
        assert!(err.is_permission_denied());
    }

    #[test]
    fn reads_do_not_consult_approval_list() {
        let rules = rules();
        rules
            .check(Phase::Using, Operation::Select, &Caller::with_email("a@x.org"), &Broken)
            .unwrap();
    }

    #[test]
    fn writes_follow_approval_list() {
        let rules = rules();
        let approvals = StaticApprovals::new(["a@x.org"]);
        for op in [Operation::Insert, Operation::Update, Operation::Delete] {
            for phase in [Phase::Using, Phase::WithCheck] {
                rules
                    .check(phase, op, &Caller::with_email("a@x.org"), &approvals)
                    .unwrap();
                let err = rules
                    .check(phase, op, &Caller::with_email("b@x.org"), &approvals)
                    .unwrap_err();
                assert!(err.is_permission_denied());
                let err = rules
                    .check(phase, op, &Caller::Anonymous, &approvals)
                    .unwrap_err();
                assert!(err.to_string().contains("anonymous"));
            }
        }
    }

    #[test]
    fn approval_lookup_errors_propagate() {
        let rules = rules();
        let err = rules
            .check(Phase::Using, Operation::Update, &Caller::with_email("a@x.org"), &Broken)
            .unwrap_err();
        assert!(matches!(err, ServiceError::Storage(_)));
    }

    #[test]
    fn with_check_falls_back_to_using() {
        let mut rules = TableRules::new("t");
        rules.enable_row_security();
        rules.install_policy(Policy::new("p", Command::Insert, Rule::ApprovedCaller));
        let approvals = StaticApprovals::default();
        assert!(rules
            .check(Phase::WithCheck, Operation::Insert, &Caller::Anonymous, &approvals)
            .is_err());
    }

    #[test]
    fn install_replaces_by_name() {
        let mut rules = rules();
        let old = rules.install_policy(Policy::new("read", Command::Select, Rule::ApprovedCaller));
        assert_eq!(old.map(|p| p.using), Some(Rule::Public));
        assert_eq!(rules.policies().count(), 2);

        assert!(rules.drop_policy("read").is_some());
        assert!(rules.drop_policy("read").is_none());
        assert_eq!(rules.policies().count(), 1);
    }
}
