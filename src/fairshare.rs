//! Fair-Share Evaluator (C4): the exponential (per-association) and
//! ticket-based (tree-wide apportionment) modes.

use crate::config::MIN_USAGE_FACTOR;
use crate::tree::SharesTree;
use crate::types::{AssocId, AssocKind, Job};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FairShareMode {
    Exponential,
    Ticket,
}

/// Computes `usage_efctv(A)` from the already-computed `usage_norm(A)`
/// and the parent's `usage_efctv`, per spec §4.4:
///
/// ```text
/// usage_efctv(A) = usage_norm(A)
///   + (usage_efctv(parent) - usage_norm(A)) * shares_raw(A)/level_shares(A)
/// ```
///
/// with the ratio term zero for `USE_PARENT` children, and
/// `usage_efctv(root_child) = usage_norm`.
///
/// In ticket mode there is no propagation term at all: the ticket path
/// only clamps `usage_norm` upward to
/// `MIN_USAGE_FACTOR * shares_raw/level_shares` (spec §4.4's ticket
/// section; Design Notes open question 1 — the clamp is deliberately
/// lossy near zero and is preserved as specified).
pub fn propagate_usage_efctv(tree: &SharesTree, id: AssocId, mode: FairShareMode) -> f64 {
    let node = tree.get(id).expect("valid association id");
    let usage_norm = node.usage_norm;

    if mode == FairShareMode::Ticket {
        let floor = MIN_USAGE_FACTOR * tree.shares_ratio(id);
        return usage_norm.max(floor);
    }

    match node.parent {
        None => usage_norm,
        Some(parent_id) if parent_id == tree.root_id() => {
            // usage_efctv(root_child) = usage_norm, per spec.
            usage_norm
        }
        Some(parent_id) => {
            let ratio = tree.shares_ratio(id);
            let parent_efctv = tree
                .get(parent_id)
                .and_then(|p| p.usage_efctv)
                .unwrap_or(usage_norm);
            usage_norm + (parent_efctv - usage_norm) * ratio
        }
    }
}

/// `calc_fs_factor` exponential form: `2^(-usage_efctv/shares_norm)`,
/// `0` when `shares_norm <= 0`.
pub fn calc_fs_factor_exponential(usage_efctv: f64, shares_norm: f64) -> f64 {
    if shares_norm <= 0.0 {
        return 0.0;
    }
    2f64.powf(-usage_efctv / shares_norm)
}

/// The ticket-mode apportionment variant: `shares_norm / usage_efctv`
/// (not the power-of-two form). The caller is expected to have already
/// clamped `usage_efctv` away from zero via `propagate_usage_efctv` in
/// `FairShareMode::Ticket`.
pub fn calc_fs_factor_ticket_variant(usage_efctv: f64, shares_norm: f64) -> f64 {
    if usage_efctv <= 0.0 {
        return 0.0;
    }
    shares_norm / usage_efctv
}

/// The external `calc_fs_factor(usage_efctv, shares_norm)` operation
/// (spec §6), mode-selected like the original plugin's single exported
/// function.
pub fn calc_fs_factor(mode: FairShareMode, usage_efctv: f64, shares_norm: f64) -> f64 {
    match mode {
        FairShareMode::Exponential => calc_fs_factor_exponential(usage_efctv, shares_norm),
        FairShareMode::Ticket => calc_fs_factor_ticket_variant(usage_efctv, shares_norm),
    }
}

/// Increments the tree's active-cycle sequence number (skipping zero,
/// which is reserved for "never active"), then ascends the parent chain
/// of every pending job's association tagging `active_seqno` until root
/// is reached or an already-tagged ancestor is found (spec §4.4).
pub fn mark_active(tree: &mut SharesTree, jobs: &[Job]) {
    let mut next = tree.root().active_seqno.wrapping_add(1);
    if next == 0 {
        next = 1;
    }
    tree.root_mut().active_seqno = next;

    for job in jobs {
        if !job.is_pending() {
            continue;
        }
        let mut cur = Some(job.assoc_id);
        while let Some(id) = cur {
            let assoc = match tree.get_mut(id) {
                Some(a) => a,
                None => break,
            };
            if assoc.active_seqno == next {
                break;
            }
            assoc.active_seqno = next;
            if id == tree.root_id() {
                break;
            }
            cur = tree.parent_of(id);
        }
    }
}

/// Distributes `root.tickets` recursively through the active subtree
/// (spec §4.4). Returns the largest `tickets` value observed at any
/// *user* leaf, used as the normalizing denominator for per-job
/// fair-share factors.
pub fn distribute_tickets(tree: &mut SharesTree) -> u64 {
    let root = tree.root_id();
    let mut max_tickets = 0u64;
    let children = tree.children_of(root).to_vec();
    distribute_rec(tree, &children, &mut max_tickets);
    max_tickets
}

fn distribute_rec(tree: &mut SharesTree, children: &[AssocId], max_tickets: &mut u64) {
    if children.is_empty() {
        return;
    }
    let active_seq = tree.root().active_seqno;
    let parent_id = tree.parent_of(children[0]).expect("child has a parent");
    let parent_tickets = tree.get(parent_id).map(|p| p.tickets).unwrap_or(0);

    let active: Vec<AssocId> = children
        .iter()
        .copied()
        .filter(|c| tree.get(*c).map(|a| a.active_seqno == active_seq).unwrap_or(false))
        .collect();

    let mut factors = Vec::with_capacity(active.len());
    let mut s = 0.0f64;
    for &c in &active {
        let usage_efctv = tree.ensure_user_usage_efctv(c, FairShareMode::Ticket);
        let assoc = tree.get(c).unwrap();
        let f = calc_fs_factor_ticket_variant(usage_efctv, assoc.shares_norm);
        s += assoc.shares_norm * f;
        factors.push(f);
    }

    for (i, &c) in active.iter().enumerate() {
        let assoc = tree.get(c).unwrap();
        let tickets = if s > 0.0 {
            (parent_tickets as f64 * assoc.shares_norm * factors[i] / s) as u64
        } else {
            0
        };
        tree.get_mut(c).unwrap().tickets = tickets;

        let is_user_leaf = tree.get(c).unwrap().kind == AssocKind::User;
        if is_user_leaf {
            *max_tickets = (*max_tickets).max(tickets);
        }

        let grandchildren = tree.children_of(c).to_vec();
        distribute_rec(tree, &grandchildren, max_tickets);
    }

    // Inactive children get zero tickets explicitly.
    for &c in children {
        if !active.contains(&c) {
            tree.get_mut(c).unwrap().tickets = 0;
        }
    }
}

/// Resolves `USE_PARENT` links upward to the nearest non-inheriting
/// ancestor, never past root (spec §4.4).
fn resolve_effective_assoc(tree: &SharesTree, id: AssocId) -> AssocId {
    let mut cur = id;
    loop {
        let node = tree.get(cur).expect("valid association id");
        if !node.shares_raw.is_use_parent() || cur == tree.root_id() {
            return cur;
        }
        match node.parent {
            Some(p) => cur = p,
            None => return cur,
        }
    }
}

/// Per-job fair-share factor, mode-selected.
pub fn priority_fs_for_job(
    mode: FairShareMode,
    tree: &mut SharesTree,
    assoc_id: AssocId,
    max_tickets: u64,
) -> f64 {
    match mode {
        FairShareMode::Exponential => {
            let effective = resolve_effective_assoc(tree, assoc_id);
            let usage_efctv = if tree.get(effective).unwrap().kind == AssocKind::User {
                tree.ensure_user_usage_efctv(effective, mode)
            } else {
                tree.get(effective).unwrap().usage_efctv.unwrap_or(0.0)
            };
            let shares_norm = tree.get(effective).unwrap().shares_norm;
            calc_fs_factor_exponential(usage_efctv, shares_norm)
        }
        FairShareMode::Ticket => {
            let node = tree.get(assoc_id).expect("valid association id");
            let active = node.active_seqno == tree.root().active_seqno;
            if !active || max_tickets == 0 {
                0.0
            } else {
                node.tickets as f64 / max_tickets as f64
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AssocKind, Association, Shares};

    fn sibling_tree(shares: [u64; 2], usage: [f64; 2]) -> SharesTree {
        let mut root = Association::new_root(AssocId(0), "root");
        root.usage_raw = usage[0] + usage[1];
        let a = Association::new_child(
            AssocId(1), "a", "acct", Some("a".into()), AssocKind::User, AssocId(0), Shares::Value(shares[0]),
        );
        let b = Association::new_child(
            AssocId(2), "b", "acct", Some("b".into()), AssocKind::User, AssocId(0), Shares::Value(shares[1]),
        );
        let mut tree = SharesTree::build(root, vec![a, b]).unwrap();
        tree.get_mut(AssocId(1)).unwrap().usage_raw = usage[0];
        tree.get_mut(AssocId(2)).unwrap().usage_raw = usage[1];
        tree
    }

    #[test]
    fn heavier_user_gets_lower_fairshare_factor() {
        let mut tree = sibling_tree([1, 1], [2.0, 1.0]);
        tree.walk_setting_effective(FairShareMode::Exponential);

        let heavy = tree.ensure_user_usage_efctv(AssocId(1), FairShareMode::Exponential);
        let light = tree.ensure_user_usage_efctv(AssocId(2), FairShareMode::Exponential);
        let sn_heavy = tree.get(AssocId(1)).unwrap().shares_norm;
        let sn_light = tree.get(AssocId(2)).unwrap().shares_norm;

        let f_heavy = calc_fs_factor_exponential(heavy, sn_heavy);
        let f_light = calc_fs_factor_exponential(light, sn_light);
        assert!(f_light > f_heavy, "lighter user must have strictly greater fair-share factor");
    }

    #[test]
    fn ticket_mode_splits_pool_evenly_for_equal_users() {
        let mut root = Association::new_root(AssocId(0), "root");
        root.usage_raw = 4.0;
        let acct_a = Association::new_child(
            AssocId(1), "acctA", "acctA", None, AssocKind::Account, AssocId(0), Shares::Value(1),
        );
        let acct_b = Association::new_child(
            AssocId(2), "acctB", "acctB", None, AssocKind::Account, AssocId(0), Shares::Value(1),
        );
        let u1 = Association::new_child(
            AssocId(3), "u1", "acctA", Some("u1".into()), AssocKind::User, AssocId(1), Shares::Value(1),
        );
        let u2 = Association::new_child(
            AssocId(4), "u2", "acctA", Some("u2".into()), AssocKind::User, AssocId(1), Shares::Value(1),
        );
        let u3 = Association::new_child(
            AssocId(5), "u3", "acctB", Some("u3".into()), AssocKind::User, AssocId(2), Shares::Value(1),
        );
        let u4 = Association::new_child(
            AssocId(6), "u4", "acctB", Some("u4".into()), AssocKind::User, AssocId(2), Shares::Value(1),
        );
        let mut tree = SharesTree::build(root, vec![acct_a, acct_b, u1, u2, u3, u4]).unwrap();
        for id in [1u32, 2, 3, 4, 5, 6] {
            tree.get_mut(AssocId(id)).unwrap().usage_raw = 1.0;
        }

        let jobs = vec![
            crate::test_support::pending_job(1, AssocId(3)),
            crate::test_support::pending_job(2, AssocId(4)),
            crate::test_support::pending_job(3, AssocId(5)),
            crate::test_support::pending_job(4, AssocId(6)),
        ];
        mark_active(&mut tree, &jobs);
        tree.walk_setting_effective(FairShareMode::Ticket);
        for id in [1u32, 2] {
            let eff = tree.ensure_user_usage_efctv(AssocId(id), FairShareMode::Ticket);
            let _ = eff;
        }
        tree.root_mut().tickets = crate::config::MAX_TICKETS_POOL;
        distribute_tickets(&mut tree);

        let t1 = tree.get(AssocId(3)).unwrap().tickets;
        let t2 = tree.get(AssocId(4)).unwrap().tickets;
        let t3 = tree.get(AssocId(5)).unwrap().tickets;
        let t4 = tree.get(AssocId(6)).unwrap().tickets;
        for t in [t1, t2, t3, t4] {
            let expected = crate::config::MAX_TICKETS_POOL / 4;
            let delta = (t as i64 - expected as i64).abs();
            assert!(delta < (expected as i64 / 100).max(2), "ticket {} far from expected {}", t, expected);
        }
    }
}
