//! Rule set for the `sites` table.
//!
//! Re-running `install_site_rules` on the same `TableRules` leaves exactly
//! one read policy, one write policy and one timestamp trigger.

use crate::rules::{Command, Operation, Policy, Rule, TableRules, Trigger, TriggerAction};

pub const SITES_TABLE: &str = "sites";
pub const PUBLIC_READ_POLICY: &str = "Public read access";
pub const APPROVED_WRITE_POLICY: &str = "Approved users write access";
pub const LAST_MODIFIED_TRIGGER: &str = "update_sites_last_modified";

/// Enable row security on `sites` and (re)install its policies and trigger.
pub fn install_site_rules(rules: &mut TableRules) {
    rules.enable_row_security();

    rules.install_policy(Policy::new(PUBLIC_READ_POLICY, Command::Select, Rule::Public));
    rules.install_policy(
        Policy::new(APPROVED_WRITE_POLICY, Command::All, Rule::ApprovedCaller)
            .with_check(Rule::ApprovedCaller),
    );

    rules.install_trigger(Trigger::before(
        LAST_MODIFIED_TRIGGER,
        &[Operation::Update],
        TriggerAction::StampLastModified,
    ));
}

/// A fresh `TableRules` for `sites` with its rules installed.
pub fn site_rules() -> TableRules {
    let mut rules = TableRules::new(SITES_TABLE);
    install_site_rules(&mut rules);
    rules
}
