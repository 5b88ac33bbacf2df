//! Reduce a finding list to a single action.

use super::{Policy, PolicyAction};
use crate::finding::Finding;

/// Worst action across `findings` under `policy`.
///
/// Starts at `Allow` and stops early once `Block` is reached, since nothing
/// can raise the result further. An empty list is `Allow`.
pub fn evaluate(policy: &Policy, findings: &[Finding]) -> PolicyAction {
    let mut worst = PolicyAction::Allow;

    for finding in findings {
        let action = policy.resolve_action(finding.severity(), Some(finding.kind.as_str()));
        worst = worst.max(action);

        if worst == PolicyAction::Block {
            break;
        }
    }

    worst
}
