//! The commit phase.
//!
//! Commits apply the effects computed by the reconciler to the host: deletions first, then a
//! pre-order mutation pass over the work-in-progress tree. A commit never yields.
//!
//! Every fiber only inserts its own host node; children are visited afterwards and find their
//! own position by searching for the next sibling that is already in place. Host failures are
//! logged and skipped so that the fiber tree always ends up consistent with what was rendered.

use crate::backend::HostRenderer;
use crate::fiber::{EffectFlags, FiberArena, FiberId, FiberTag};

/// Counts of applied effects.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommitStats {
    pub placements: usize,
    pub updates: usize,
    pub deletions: usize,
}

/// Applies a finished render to the host.
pub struct Commit<'a, H: HostRenderer> {
    fibers: &'a mut FiberArena<H::Node>,
    /// None if the host is unavailable; bookkeeping still happens.
    host: Option<&'a mut H>,
    stats: CommitStats,
}

impl<'a, H: HostRenderer> Commit<'a, H> {
    pub fn new(fibers: &'a mut FiberArena<H::Node>, host: &'a mut H) -> Commit<'a, H> {
        let host = if host.is_available() {
            Some(host)
        } else {
            tracing::warn!("host renderer is unavailable; committing without host mutations");
            None
        };
        Commit {
            fibers,
            host,
            stats: CommitStats::default(),
        }
    }

    /// Commits a finished work-in-progress tree and the fibers deleted while building it.
    pub fn commit(mut self, root: FiberId, deletions: &[FiberId]) -> CommitStats {
        self.commit_deletions(deletions);
        self.commit_mutations(root);
        self.stats
    }

    /// Effects applied so far.
    pub fn stats(&self) -> CommitStats {
        self.stats
    }

    /// Detaches deleted subtrees from the host and releases their listeners and state.
    pub fn commit_deletions(&mut self, deletions: &[FiberId]) {
        for id in deletions {
            if !self.fibers.contains(*id) {
                continue;
            }
            self.delete_subtree(*id, true);
            self.stats.deletions += 1;
        }
    }

    /// Applies placements and updates to the host.
    pub fn commit_mutations(&mut self, root: FiberId) {
        let mut stack = vec![(root, false)];
        while let Some((id, inside_new)) = stack.pop() {
            let fiber = &self.fibers[id];
            let flags = fiber.flags;
            let created = inside_new || (flags.contains(EffectFlags::PLACEMENT) && fiber.alternate.is_none());
            let descend = created || !fiber.subtree_flags.is_empty();

            if created || flags.contains(EffectFlags::PLACEMENT) {
                self.commit_placement(id);
            } else if flags.contains(EffectFlags::UPDATE) {
                self.commit_update(id);
            }
            if flags.contains(EffectFlags::PLACEMENT) {
                self.stats.placements += 1;
            } else if flags.contains(EffectFlags::UPDATE) {
                self.stats.updates += 1;
            }

            let fiber = &mut self.fibers[id];
            if created || !flags.is_empty() {
                fiber.memoized_props = fiber.pending_props.clone();
                fiber.memoized_events = fiber.events.clone();
            }
            fiber.flags = EffectFlags::empty();
            fiber.subtree_flags = EffectFlags::empty();

            if descend {
                let start = stack.len();
                stack.extend(self.fibers.children(id).map(|child| (child, created)));
                stack[start..].reverse();
            }
        }
    }

    /// Runs a host call, logging failures. Returns None if the host is unavailable or failed.
    fn call<T>(&mut self, op: &str, f: impl FnOnce(&mut H) -> Result<T, H::Error>) -> Option<T> {
        let host = self.host.as_deref_mut()?;
        match f(host) {
            Ok(value) => Some(value),
            Err(err) => {
                tracing::warn!("host renderer failed to {}: {}", op, err);
                None
            }
        }
    }

    fn delete_subtree(&mut self, id: FiberId, detach: bool) {
        let is_host = self.fibers[id].tag.is_host();
        let node = self.fibers[id].state_node.clone();

        if let Some(node) = &node {
            let events: Vec<_> = self.fibers[id].memoized_events.keys().cloned().collect();
            for event in events {
                self.call("remove an event listener", |host| {
                    host.remove_event_listener(node, &event)
                });
            }
        }

        let children: Vec<_> = self.fibers.children(id).collect();
        for child in children {
            self.delete_subtree(child, detach && !is_host);
        }

        if let (true, true, Some(node)) = (detach, is_host, &node) {
            self.call("remove a node", |host| host.remove_node(node));
        }

        let fiber = &mut self.fibers[id];
        fiber.state_node = None;
        fiber.flags = EffectFlags::empty();
        fiber.subtree_flags = EffectFlags::empty();
        let alternate = fiber.alternate;
        if fiber.states.take().is_some() {
            tracing::trace!(fiber = ?id, "dropped component state");
        }
        if let Some(alternate) = alternate.and_then(|id| self.fibers.get_mut(id)) {
            alternate.states = None;
            alternate.state_node = None;
        }
    }

    fn commit_placement(&mut self, id: FiberId) {
        match self.fibers[id].tag {
            FiberTag::Element(_) | FiberTag::Text => {
                let node = match self.fibers[id].state_node.clone() {
                    Some(node) => {
                        // moved
                        self.commit_update(id);
                        node
                    }
                    None => match self.create(id) {
                        Some(node) => node,
                        None => return,
                    },
                };
                self.insert(id, &[node]);
            }
            FiberTag::Component(_) if self.fibers[id].alternate.is_some() => {
                // a moved component takes its host nodes along
                let nodes = self.top_level_host_nodes(id);
                self.insert(id, &nodes);
            }
            FiberTag::Component(_) | FiberTag::HostRoot => (),
        }
    }

    fn create(&mut self, id: FiberId) -> Option<H::Node> {
        let fiber = &self.fibers[id];
        let props = fiber.pending_props.clone();
        let events = fiber.events.clone();

        let (is_text, content) = match &fiber.tag {
            FiberTag::Element(tag) => (false, tag.to_string()),
            FiberTag::Text => (true, fiber.text.clone()),
            _ => return None,
        };
        let node = if is_text {
            self.call("create a text node", |host| host.create_text(&content))?
        } else {
            self.call("create an element", |host| host.create_element(&content))?
        };

        for (name, value) in &props {
            self.call("set an attribute", |host| host.set_attribute(&node, name, value));
        }
        for (name, handler) in &events {
            self.call("add an event listener", |host| {
                host.add_event_listener(&node, name, handler)
            });
        }

        self.fibers[id].state_node = Some(node.clone());
        Some(node)
    }

    fn commit_update(&mut self, id: FiberId) {
        let fiber = &self.fibers[id];
        let node = match &fiber.state_node {
            Some(node) => node.clone(),
            None => return,
        };

        if fiber.tag == FiberTag::Text {
            let text = fiber.text.clone();
            self.call("set text content", |host| host.set_text_content(&node, &text));
            return;
        }

        let removed: Vec<_> = fiber
            .memoized_props
            .keys()
            .filter(|name| !fiber.pending_props.contains_key(*name))
            .cloned()
            .collect();
        let changed: Vec<_> = fiber
            .pending_props
            .iter()
            .filter(|(name, value)| fiber.memoized_props.get(*name) != Some(value))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();
        let old_events: Vec<_> = fiber.memoized_events.keys().cloned().collect();
        let events = fiber.events.clone();

        for name in &removed {
            self.call("remove an attribute", |host| host.remove_attribute(&node, name));
        }
        for (name, value) in &changed {
            self.call("set an attribute", |host| host.set_attribute(&node, name, value));
        }

        // handlers are opaque, so every present listener is replaced
        for name in &old_events {
            self.call("remove an event listener", |host| {
                host.remove_event_listener(&node, name)
            });
        }
        for (name, handler) in &events {
            self.call("add an event listener", |host| {
                host.add_event_listener(&node, name, handler)
            });
        }
    }

    /// Inserts host nodes belonging to `id` at its position in the host parent.
    fn insert(&mut self, id: FiberId, nodes: &[H::Node]) {
        let parent = match self.host_parent(id) {
            Some(parent) => parent,
            None => {
                tracing::warn!("fiber {:?} has no host parent", id);
                return;
            }
        };
        let before = self.host_sibling(id);
        for node in nodes {
            match &before {
                Some(before) => self.call("insert a node", |host| {
                    host.insert_before(&parent, node, Some(before))
                }),
                None => self.call("append a node", |host| host.append_child(&parent, node)),
            };
        }
    }

    /// The host node of the nearest ancestor that can contain host nodes.
    fn host_parent(&self, id: FiberId) -> Option<H::Node> {
        let mut next = self.fibers[id].parent;
        while let Some(parent) = next {
            let fiber = &self.fibers[parent];
            if fiber.tag.is_host_parent() {
                return fiber.state_node.clone();
            }
            next = fiber.parent;
        }
        None
    }

    /// Finds the host node that `id`’s host nodes must be inserted before.
    ///
    /// Looks for the next sibling that is already in place, looking through components and
    /// continuing after the parent if it isn’t a host node itself.
    fn host_sibling(&self, id: FiberId) -> Option<H::Node> {
        let fibers = &*self.fibers;
        let mut node = id;
        'siblings: loop {
            while fibers[node].sibling.is_none() {
                match fibers[node].parent {
                    Some(parent) if !fibers[parent].tag.is_host_parent() => node = parent,
                    _ => return None,
                }
            }
            node = fibers[node].sibling?;

            while !fibers[node].tag.is_host() {
                if fibers[node].flags.contains(EffectFlags::PLACEMENT) {
                    continue 'siblings;
                }
                match fibers[node].child {
                    Some(child) => node = child,
                    None => continue 'siblings,
                }
            }

            let fiber = &fibers[node];
            if !fiber.flags.contains(EffectFlags::PLACEMENT) {
                if let Some(state_node) = &fiber.state_node {
                    return Some(state_node.clone());
                }
            }
        }
    }

    /// Host nodes directly below a component (looking through nested components).
    fn top_level_host_nodes(&self, id: FiberId) -> Vec<H::Node> {
        let mut nodes = Vec::new();
        let mut stack: Vec<_> = self.fibers.children(id).collect();
        stack.reverse();
        while let Some(id) = stack.pop() {
            let fiber = &self.fibers[id];
            if fiber.tag.is_host() {
                // flagged children place themselves
                if !fiber.flags.contains(EffectFlags::PLACEMENT) {
                    nodes.extend(fiber.state_node.clone());
                }
            } else {
                let start = stack.len();
                stack.extend(self.fibers.children(id));
                stack[start..].reverse();
            }
        }
        nodes
    }
}
