//! The reconciler.
//!
//! Reconciliation diffs a committed (“current”) fiber subtree against freshly converted fibers
//! and builds a work-in-progress subtree annotated with effect flags. Work proceeds one fiber at a
//! time ([`Reconciler::perform_unit_of_work`]) so that a scheduler can yield between units.
//!
//! A work-in-progress fiber that has a committed counterpart is *reused*: it’s diffed and flagged
//! `UPDATE` if anything observable changed. Freshly converted fibers without a counterpart are
//! *adopted* into the work-in-progress tree as-is; the top-most adopted fiber of a subtree is
//! flagged `PLACEMENT` and its descendants are created along with it during commit.

use crate::convert::convert;
use crate::fiber::{EffectFlags, FiberArena, FiberId, FiberTag, Events};
use crate::lane::Lanes;
use crate::node::Key;
use crate::state::{StateSlot, Updater};
use std::collections::{HashMap, VecDeque};

/// A child in a reconciled child list and its position in the old list, if it was reused.
type Placed = (FiberId, Option<usize>);

/// Builds work-in-progress fibers for one render pass.
pub struct Reconciler<'a, N> {
    fibers: &'a mut FiberArena<N>,
    deletions: &'a mut Vec<FiberId>,
    lanes: Lanes,
    updater: &'a Updater,
}

impl<'a, N: Clone> Reconciler<'a, N> {
    /// Creates a reconciler rendering `lanes`.
    ///
    /// Deleted fibers are appended to `deletions`; new component state slots send their updates
    /// through `updater`.
    pub fn new(
        fibers: &'a mut FiberArena<N>,
        deletions: &'a mut Vec<FiberId>,
        lanes: Lanes,
        updater: &'a Updater,
    ) -> Reconciler<'a, N> {
        Reconciler {
            fibers,
            deletions,
            lanes,
            updater,
        }
    }

    /// Reconciles `current` against a freshly converted fiber and runs the render to completion.
    ///
    /// Returns the work-in-progress fiber that should replace `current`.
    pub fn reconcile(&mut self, current: Option<FiberId>, new: FiberId) -> FiberId {
        let wip = match current {
            Some(current) if self.can_reuse(current, new) => self.reuse(current, new),
            Some(current) => {
                // the parent is committed and takes no part in this render
                let parent = self.fibers[current].parent;
                self.delete(None, current);
                self.fibers[new].parent = parent;
                self.adopt(new)
            }
            None => self.adopt(new),
        };

        let mut next = Some(wip);
        while let Some(unit) = next {
            next = self.perform_unit_of_work(unit, wip);
        }
        wip
    }

    /// Returns true if `current` can be updated in place to match `new`.
    ///
    /// Tags must match; keys must match, and no key only matches no key.
    pub fn can_reuse(&self, current: FiberId, new: FiberId) -> bool {
        let (current, new) = (&self.fibers[current], &self.fibers[new]);
        current.tag == new.tag && current.key == new.key
    }

    /// Processes one unit of work and returns the next one, or None once `root` is complete.
    pub fn perform_unit_of_work(&mut self, unit: FiberId, root: FiberId) -> Option<FiberId> {
        tracing::trace!(fiber = ?unit, "begin work");
        if let Some(child) = self.begin_work(unit) {
            return Some(child);
        }

        let mut node = unit;
        loop {
            self.complete_work(node);
            if node == root {
                return None;
            }
            if let Some(sibling) = self.fibers[node].sibling {
                return Some(sibling);
            }
            node = self.fibers[node].parent?;
        }
    }

    /// Reconciles the children of a work-in-progress fiber and returns its first child.
    pub fn begin_work(&mut self, wip: FiberId) -> Option<FiberId> {
        self.fibers[wip].lanes.remove(self.lanes);
        let current = self.fibers[wip].alternate;

        let new_first = if self.fibers[wip].is_component() {
            self.bind_states(wip);
            self.fibers[wip].template = None;
            match (current, self.fibers[wip].source.clone()) {
                (Some(_), Some(source)) => {
                    tracing::trace!(fiber = ?wip, "render component");
                    let content = source.render();
                    convert(&mut *self.fibers, &content)
                }
                // adopted components keep what the converter rendered
                _ => self.fibers[wip].child,
            }
        } else {
            // a reused fiber without a template keeps its committed children
            match self.fibers[wip].template.take().or(current) {
                Some(template) => self.fibers[template].child,
                None => self.fibers[wip].child,
            }
        };

        let old_first = current.and_then(|current| self.fibers[current].child);
        self.reconcile_children(wip, old_first, new_first, current.is_some());
        self.fibers[wip].child
    }

    /// Bubbles flags and lanes of the direct children up into `wip`.
    pub fn complete_work(&mut self, wip: FiberId) {
        let mut subtree_flags = EffectFlags::empty();
        let mut child_lanes = Lanes::empty();
        for child in self.fibers.children(wip) {
            let child = &self.fibers[child];
            subtree_flags |= child.flags | child.subtree_flags;
            child_lanes |= child.lanes | child.child_lanes;
        }

        let fiber = &mut self.fibers[wip];
        fiber.subtree_flags = subtree_flags;
        fiber.child_lanes = child_lanes;
    }

    /// Makes sure the component has a state slot, bound to `wip`, and binds its cells to it.
    fn bind_states(&mut self, wip: FiberId) {
        let slot = match &self.fibers[wip].states {
            Some(slot) => slot.clone(),
            None => {
                let slot = StateSlot::new(wip, self.updater.clone());
                self.fibers[wip].states = Some(slot.clone());
                slot
            }
        };
        slot.rebind(wip);
        if let Some(source) = &self.fibers[wip].source {
            for cell in source.states() {
                cell.bind(&slot);
            }
        }
    }

    /// Creates the work-in-progress counterpart of `current` and fills it from `new`.
    fn reuse(&mut self, current: FiberId, new: FiberId) -> FiberId {
        let wip = self.fibers.create_work_in_progress(current);

        let new_fiber = &self.fibers[new];
        let props = new_fiber.pending_props.clone();
        let text = new_fiber.text.clone();
        let events = new_fiber.events.clone();
        let source = new_fiber.source.clone();

        let current_fiber = &self.fibers[current];
        let dirty = current_fiber.memoized_props != props
            || current_fiber.text != text
            || !same_events(&current_fiber.memoized_events, &events);

        let fiber = &mut self.fibers[wip];
        fiber.pending_props = props;
        fiber.text = text;
        fiber.events = events;
        if source.is_some() {
            fiber.source = source;
        }
        fiber.template = Some(new);
        if dirty {
            fiber.flags |= EffectFlags::UPDATE;
        }
        wip
    }

    fn adopt(&mut self, new: FiberId) -> FiberId {
        self.fibers[new].flags |= EffectFlags::PLACEMENT;
        new
    }

    fn delete(&mut self, parent: Option<FiberId>, old: FiberId) {
        self.fibers[old].flags |= EffectFlags::DELETION;
        self.deletions.push(old);
        if let Some(parent) = parent {
            self.fibers[parent].flags |= EffectFlags::CHILD_DELETION;
        }
    }

    fn chain(&self, first: Option<FiberId>) -> Vec<FiberId> {
        let mut ids = Vec::new();
        let mut next = first;
        while let Some(id) = next {
            ids.push(id);
            next = self.fibers[id].sibling;
        }
        ids
    }

    /// Reconciles the old child chain against the new one and links the result below `wip`.
    ///
    /// Untracked children (below an adopted fiber) are adopted without flags.
    fn reconcile_children(
        &mut self,
        wip: FiberId,
        old_first: Option<FiberId>,
        new_first: Option<FiberId>,
        track: bool,
    ) {
        let old = self.chain(old_first);
        let new = self.chain(new_first);

        if !track {
            self.fibers.link_children(wip, &new);
            return;
        }

        let mut placed = if new.is_empty() {
            for id in old {
                self.delete(Some(wip), id);
            }
            Vec::new()
        } else if new.iter().any(|id| self.fibers[*id].key.is_some()) {
            self.reconcile_keyed(wip, &old, &new)
        } else {
            self.reconcile_positional(wip, &old, &new)
        };

        self.mark_moves(&mut placed);
        let ids: Vec<_> = placed.iter().map(|(id, _)| *id).collect();
        self.fibers.link_children(wip, &ids);
    }

    fn reconcile_pair(&mut self, wip: FiberId, old: Option<(FiberId, usize)>, new: FiberId) -> Placed {
        match old {
            Some((old, index)) if self.can_reuse(old, new) => (self.reuse(old, new), Some(index)),
            Some((old, _)) => {
                self.delete(Some(wip), old);
                (self.adopt(new), None)
            }
            None => (self.adopt(new), None),
        }
    }

    fn reconcile_keyed(&mut self, wip: FiberId, old: &[FiberId], new: &[FiberId]) -> Vec<Placed> {
        let mut by_key: HashMap<Key, (FiberId, usize)> = HashMap::with_capacity(old.len());
        let mut unkeyed: HashMap<FiberTag, VecDeque<(FiberId, usize)>> = HashMap::new();
        let mut leftover = Vec::new();

        for (index, id) in old.iter().enumerate() {
            let fiber = &self.fibers[*id];
            match &fiber.key {
                Some(key) => {
                    if let Some(duplicate) = by_key.insert(key.clone(), (*id, index)) {
                        tracing::warn!("duplicate key `{}` among siblings", key);
                        leftover.push(duplicate);
                    }
                }
                None => unkeyed
                    .entry(fiber.tag.clone())
                    .or_default()
                    .push_back((*id, index)),
            }
        }

        let mut placed = Vec::with_capacity(new.len());
        for id in new {
            let matched = match &self.fibers[*id].key {
                Some(key) => by_key.remove(key),
                None => unkeyed
                    .get_mut(&self.fibers[*id].tag)
                    .and_then(VecDeque::pop_front),
            };
            placed.push(self.reconcile_pair(wip, matched, *id));
        }

        leftover.extend(by_key.into_values());
        leftover.extend(unkeyed.into_values().flatten());
        self.delete_leftovers(wip, leftover);
        placed
    }

    fn reconcile_positional(&mut self, wip: FiberId, old: &[FiberId], new: &[FiberId]) -> Vec<Placed> {
        let mut placed = Vec::with_capacity(new.len());

        let mut start = 0;
        while start < old.len() && start < new.len() && self.can_reuse(old[start], new[start]) {
            placed.push((self.reuse(old[start], new[start]), Some(start)));
            start += 1;
        }

        // the rest is matched by tag; keyed old children can’t match unkeyed new ones
        let mut leftover = Vec::new();
        let mut buckets: HashMap<FiberTag, VecDeque<(FiberId, usize)>> = HashMap::new();
        for (index, id) in old.iter().enumerate().skip(start) {
            let fiber = &self.fibers[*id];
            if fiber.key.is_some() {
                leftover.push((*id, index));
            } else {
                buckets
                    .entry(fiber.tag.clone())
                    .or_default()
                    .push_back((*id, index));
            }
        }

        for id in &new[start..] {
            let matched = buckets
                .get_mut(&self.fibers[*id].tag)
                .and_then(VecDeque::pop_front);
            placed.push(self.reconcile_pair(wip, matched, *id));
        }

        leftover.extend(buckets.into_values().flatten());
        self.delete_leftovers(wip, leftover);
        placed
    }

    fn delete_leftovers(&mut self, wip: FiberId, mut leftover: Vec<(FiberId, usize)>) {
        leftover.sort_by_key(|(_, index)| *index);
        for (id, _) in leftover {
            self.delete(Some(wip), id);
        }
    }

    /// Flags reused children that moved.
    ///
    /// Walking backwards, a child whose old index lies above the lowest old index seen so far
    /// was overtaken by a later sibling and has to be re-inserted. Moved children are flagged
    /// `PLACEMENT` only; the commit applies their other changes along with the move.
    fn mark_moves(&mut self, placed: &mut [Placed]) {
        let mut low = usize::MAX;
        for (id, old_index) in placed.iter().rev() {
            let old_index = match old_index {
                Some(index) => *index,
                None => continue,
            };
            if old_index > low {
                let fiber = &mut self.fibers[*id];
                fiber.flags.remove(EffectFlags::UPDATE);
                fiber.flags |= EffectFlags::PLACEMENT;
            } else {
                low = old_index;
            }
        }
    }
}

fn same_events(a: &Events, b: &Events) -> bool {
    a.len() == b.len() && a.keys().eq(b.keys())
}
