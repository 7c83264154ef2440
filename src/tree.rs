//! The Shares Tree (C1): a hierarchical account/user arena with shares,
//! raw/normalized/effective usage, and ticket bookkeeping.
//!
//! Grounded on this codebase's arena-of-nodes style
//! (`resource_manager::consumer_groups`) rather than a parent-pointer
//! object graph with `Rc`/`RefCell`: nodes live in a flat `Vec` indexed by
//! `AssocId`, children are tracked by id, and structural mutation only
//! ever happens while the caller holds the tree's write lock — recursive
//! walks never observe a tree whose shape changes mid-walk.

use crate::error::{PriorityError, Result};
use crate::fairshare::FairShareMode;
use crate::types::{AssocId, AssocKind, Association};
#[cfg(test)]
use crate::types::Shares;

pub struct SharesTree {
    nodes: Vec<Association>,
    root: AssocId,
}

impl SharesTree {
    /// Build a tree from a root and a flat list of non-root associations,
    /// each already carrying its intended parent id. Computes
    /// `level_shares`/`shares_norm` structurally; usage fields start at
    /// their zero defaults (callers load historical usage separately).
    pub fn build(root: Association, mut rest: Vec<Association>) -> Result<Self> {
        let root_id = root.id;
        let mut nodes = vec![root];
        // Stable index lookup: id.0 must equal the node's position for
        // O(1) access; the loader is expected to hand out ids densely.
        rest.sort_by_key(|a| a.id.0);
        for (i, assoc) in rest.iter().enumerate() {
            if assoc.id.0 as usize != i + 1 {
                return Err(PriorityError::InvalidConfig(format!(
                    "association ids must be dense starting at {}, got {}",
                    i + 1,
                    assoc.id.0
                )));
            }
        }
        nodes.extend(rest);

        let mut tree = Self { nodes, root: root_id };
        tree.relink_children()?;
        tree.recompute_structure();
        Ok(tree)
    }

    fn relink_children(&mut self) -> Result<()> {
        for n in self.nodes.iter_mut() {
            n.children.clear();
        }
        for i in 0..self.nodes.len() {
            if let Some(parent) = self.nodes[i].parent {
                let pidx = parent.0 as usize;
                if pidx >= self.nodes.len() {
                    return Err(PriorityError::InvalidConfig(format!(
                        "association {} references missing parent {}",
                        self.nodes[i].id.0, parent.0
                    )));
                }
                let child_id = self.nodes[i].id;
                self.nodes[pidx].children.push(child_id);
            }
        }
        Ok(())
    }

    /// Recomputes `level_shares`/`shares_norm` top-down. Called after
    /// `build` and whenever the external loader replaces structural
    /// links (spec §6, "Live reloads must arrive under the tree write
    /// lock").
    pub fn recompute_structure(&mut self) {
        let root = self.root;
        self.nodes[root.0 as usize].shares_norm = 1.0;
        self.nodes[root.0 as usize].level_shares = 1;
        let children = self.nodes[root.0 as usize].children.clone();
        for child in children {
            self.recompute_structure_rec(child);
        }
    }

    fn recompute_structure_rec(&mut self, id: AssocId) {
        let parent_id = self.nodes[id.0 as usize]
            .parent
            .expect("non-root always has a parent");
        let siblings = self.nodes[parent_id.0 as usize].children.clone();
        let level_shares: u64 = siblings
            .iter()
            .map(|s| self.nodes[s.0 as usize].shares_raw.raw_or_zero())
            .sum::<u64>()
            .max(1);
        let parent_norm = self.nodes[parent_id.0 as usize].shares_norm;

        let node = &mut self.nodes[id.0 as usize];
        node.level_shares = level_shares;
        if node.shares_raw.is_use_parent() {
            node.shares_norm = parent_norm;
        } else {
            node.shares_norm = parent_norm * (node.shares_raw.raw_or_zero() as f64 / level_shares as f64);
        }

        let children = self.nodes[id.0 as usize].children.clone();
        for child in children {
            self.recompute_structure_rec(child);
        }
    }

    pub fn root_id(&self) -> AssocId {
        self.root
    }

    pub fn root(&self) -> &Association {
        &self.nodes[self.root.0 as usize]
    }

    pub fn root_mut(&mut self) -> &mut Association {
        let idx = self.root.0 as usize;
        &mut self.nodes[idx]
    }

    pub fn get(&self, id: AssocId) -> Option<&Association> {
        self.nodes.get(id.0 as usize)
    }

    pub fn get_mut(&mut self, id: AssocId) -> Option<&mut Association> {
        self.nodes.get_mut(id.0 as usize)
    }

    pub fn children_of(&self, id: AssocId) -> &[AssocId] {
        self.nodes
            .get(id.0 as usize)
            .map(|n| n.children.as_slice())
            .unwrap_or(&[])
    }

    pub fn parent_of(&self, id: AssocId) -> Option<AssocId> {
        self.nodes.get(id.0 as usize).and_then(|n| n.parent)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Association> {
        self.nodes.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Association> {
        self.nodes.iter_mut()
    }

    /// Ancestor chain from `id` up to and including root, nearest first.
    pub fn ancestor_chain(&self, id: AssocId) -> Vec<AssocId> {
        let mut chain = Vec::new();
        let mut cur = Some(id);
        while let Some(c) = cur {
            chain.push(c);
            if c == self.root {
                break;
            }
            cur = self.parent_of(c);
        }
        chain
    }

    /// Computes `usage_norm` and `usage_efctv` for one association (spec
    /// §4.1). `USE_PARENT` children inherit `shares_norm`/`usage_norm`
    /// from the parent verbatim; `usage_efctv` is then derived via the
    /// mode-specific propagation formula (spec §4.4).
    pub fn set_assoc_usage(&mut self, id: AssocId, mode: FairShareMode) {
        if id == self.root {
            let root_usage = self.nodes[id.0 as usize].usage_raw;
            let node = &mut self.nodes[id.0 as usize];
            node.usage_norm = if root_usage > 0.0 { 1.0 } else { 0.0 };
            node.usage_efctv = Some(node.usage_norm);
            return;
        }

        let parent_id = self.nodes[id.0 as usize].parent.unwrap();
        let use_parent = self.nodes[id.0 as usize].shares_raw.is_use_parent();
        let root_usage_raw = self.nodes[self.root.0 as usize].usage_raw;

        if use_parent {
            let (p_norm, p_shares_norm) = {
                let p = &self.nodes[parent_id.0 as usize];
                (p.usage_norm, p.shares_norm)
            };
            let node = &mut self.nodes[id.0 as usize];
            node.usage_norm = p_norm;
            node.shares_norm = p_shares_norm;
        } else {
            let node = &mut self.nodes[id.0 as usize];
            node.usage_norm = if root_usage_raw > 0.0 {
                (node.usage_raw / root_usage_raw).clamp(0.0, 1.0)
            } else {
                0.0
            };
        }

        let usage_efctv = crate::fairshare::propagate_usage_efctv(self, id, mode);
        self.nodes[id.0 as usize].usage_efctv = Some(usage_efctv);
    }

    /// Depth-first walk from root's children (spec §4.1): recomputes
    /// `usage_efctv` on every *account* node, and marks *user* leaves
    /// uncomputed (`None`) so they're priced lazily on first job query.
    pub fn walk_setting_effective(&mut self, mode: FairShareMode) {
        let children = self.nodes[self.root.0 as usize].children.clone();
        for child in children {
            self.walk_rec(child, mode);
        }
    }

    fn walk_rec(&mut self, id: AssocId, mode: FairShareMode) {
        match self.nodes[id.0 as usize].kind {
            AssocKind::Account => {
                self.set_assoc_usage(id, mode);
                let children = self.nodes[id.0 as usize].children.clone();
                for child in children {
                    self.walk_rec(child, mode);
                }
            }
            AssocKind::User => {
                self.nodes[id.0 as usize].usage_efctv = None;
            }
        }
    }

    /// Ensures `usage_efctv` is populated for a user leaf, computing it
    /// lazily on first access (spec §4.1 rationale: avoid O(users) work
    /// when most users have no job this cycle).
    pub fn ensure_user_usage_efctv(&mut self, id: AssocId, mode: FairShareMode) -> f64 {
        if let Some(v) = self.nodes[id.0 as usize].usage_efctv {
            return v;
        }
        self.set_assoc_usage(id, mode);
        self.nodes[id.0 as usize].usage_efctv.unwrap_or(0.0)
    }

    pub fn shares_ratio(&self, id: AssocId) -> f64 {
        let node = &self.nodes[id.0 as usize];
        if node.shares_raw.is_use_parent() || node.level_shares == 0 {
            return 0.0;
        }
        node.shares_raw.raw_or_zero() as f64 / node.level_shares as f64
    }
}
