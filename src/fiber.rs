//! Fibers: the persistent, mutable nodes the reconciler works on.
//!
//! Fibers live in a [`FiberArena`] and refer to each other by [`FiberId`]. Each logical node has
//! up to two fibers: the committed (“current”) one and a work-in-progress one, linked through
//! `alternate`. A render builds the work-in-progress generation; the commit swaps it in.

use crate::events::EventHandler;
use crate::lane::Lanes;
use crate::node::{ComponentType, Component, Key};
use crate::state::StateSlot;
use bitflags::bitflags;
use core::fmt;
use slotmap::{SecondaryMap, SlotMap};
use std::collections::BTreeMap;
use std::ops::{Index, IndexMut};
use std::sync::Arc;

slotmap::new_key_type! {
    /// Identifies a fiber in a [`FiberArena`].
    pub struct FiberId;
}

/// Attributes, flattened to strings.
pub type Props = BTreeMap<String, String>;

/// Event handlers by event name.
pub type Events = BTreeMap<String, EventHandler>;

/// What kind of node a fiber represents.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FiberTag {
    /// The root of a tree; its host node is the container supplied by the host.
    HostRoot,
    /// A host element with the given tag name.
    Element(Arc<str>),
    /// A text leaf.
    Text,
    /// A component; never owns a host node.
    Component(ComponentType),
}

impl FiberTag {
    /// Returns true for fibers that own a host node of their own.
    pub fn is_host(&self) -> bool {
        matches!(self, FiberTag::Element(_) | FiberTag::Text)
    }

    /// Returns true for fibers whose host node can contain other host nodes.
    pub fn is_host_parent(&self) -> bool {
        matches!(self, FiberTag::Element(_) | FiberTag::HostRoot)
    }
}

bitflags! {
    /// Side effects the commit phase has to apply to a fiber.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct EffectFlags: u8 {
        /// The fiber’s host node must be created (if needed) and inserted.
        const PLACEMENT = 1 << 0;
        /// The fiber’s host node must be updated with new props, text or events.
        const UPDATE = 1 << 1;
        /// The fiber and its subtree are being removed.
        const DELETION = 1 << 2;
        /// Some children of this fiber are being removed.
        const CHILD_DELETION = 1 << 3;
    }
}

/// A unit of reconciliation work and persistent tree node.
///
/// `N` is the host renderer’s node handle type.
pub struct Fiber<N> {
    pub tag: FiberTag,
    pub key: Option<Key>,
    /// Position among siblings.
    pub index: usize,

    /// Non-owning back reference.
    pub parent: Option<FiberId>,
    /// First child.
    pub child: Option<FiberId>,
    /// Next sibling.
    pub sibling: Option<FiberId>,

    /// Attributes to apply in the next commit.
    pub pending_props: Props,
    /// Attributes applied in the last commit.
    pub memoized_props: Props,
    /// Text content (text fibers only).
    pub text: String,
    /// Event handlers to apply in the next commit.
    pub events: Events,
    /// Event handlers currently attached to the host node.
    pub memoized_events: Events,

    pub flags: EffectFlags,
    /// Union of all descendants’ flags.
    pub subtree_flags: EffectFlags,
    /// Pending update priorities of this fiber.
    pub lanes: Lanes,
    /// Union of all descendants’ pending update priorities.
    pub child_lanes: Lanes,

    /// The host node, once placed.
    pub state_node: Option<N>,
    /// The same node in the other generation.
    pub alternate: Option<FiberId>,

    /// Component state, shared with the alternate.
    pub states: Option<Arc<StateSlot>>,
    /// The component that produced this fiber, for re-rendering.
    pub source: Option<Arc<dyn Component>>,

    /// The freshly converted fiber whose children describe this fiber’s next children.
    pub(crate) template: Option<FiberId>,
}

impl<N> Fiber<N> {
    pub fn new(tag: FiberTag, key: Option<Key>) -> Fiber<N> {
        Fiber {
            tag,
            key,
            index: 0,
            parent: None,
            child: None,
            sibling: None,
            pending_props: Props::new(),
            memoized_props: Props::new(),
            text: String::new(),
            events: Events::new(),
            memoized_events: Events::new(),
            flags: EffectFlags::empty(),
            subtree_flags: EffectFlags::empty(),
            lanes: Lanes::empty(),
            child_lanes: Lanes::empty(),
            state_node: None,
            alternate: None,
            states: None,
            source: None,
            template: None,
        }
    }

    pub fn text(text: impl Into<String>) -> Fiber<N> {
        let mut fiber = Fiber::new(FiberTag::Text, None);
        fiber.text = text.into();
        fiber
    }

    pub fn is_component(&self) -> bool {
        matches!(self.tag, FiberTag::Component(_))
    }
}

struct DebugifyMap<'a, T>(&'a BTreeMap<String, T>);
impl<'a, T> fmt::Debug for DebugifyMap<'a, T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_set().entries(self.0.keys()).finish()
    }
}

impl<N: fmt::Debug> fmt::Debug for Fiber<N> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Fiber")
            .field("tag", &self.tag)
            .field("key", &self.key)
            .field("index", &self.index)
            .field("parent", &self.parent)
            .field("child", &self.child)
            .field("sibling", &self.sibling)
            .field("pending_props", &self.pending_props)
            .field("memoized_props", &self.memoized_props)
            .field("text", &self.text)
            .field("events", &DebugifyMap(&self.events))
            .field("flags", &self.flags)
            .field("subtree_flags", &self.subtree_flags)
            .field("lanes", &self.lanes)
            .field("child_lanes", &self.child_lanes)
            .field("state_node", &self.state_node)
            .field("alternate", &self.alternate)
            .finish()
    }
}

/// Storage for all fibers of a root.
pub struct FiberArena<N> {
    fibers: SlotMap<FiberId, Fiber<N>>,
}

impl<N> Default for FiberArena<N> {
    fn default() -> Self {
        FiberArena::new()
    }
}

impl<N> FiberArena<N> {
    pub fn new() -> FiberArena<N> {
        FiberArena {
            fibers: SlotMap::with_key(),
        }
    }

    pub fn insert(&mut self, fiber: Fiber<N>) -> FiberId {
        self.fibers.insert(fiber)
    }

    pub fn get(&self, id: FiberId) -> Option<&Fiber<N>> {
        self.fibers.get(id)
    }

    pub fn get_mut(&mut self, id: FiberId) -> Option<&mut Fiber<N>> {
        self.fibers.get_mut(id)
    }

    pub fn contains(&self, id: FiberId) -> bool {
        self.fibers.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.fibers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fibers.is_empty()
    }

    /// Iterates over the children of a fiber, in order.
    pub fn children(&self, id: FiberId) -> Children<'_, N> {
        Children {
            arena: self,
            next: self.fibers[id].child,
        }
    }

    /// Links a chain of siblings below `parent`, assigning parents and indices.
    pub fn set_children(&mut self, parent: FiberId, first: Option<FiberId>) {
        self.fibers[parent].child = first;
        let mut index = 0;
        let mut next = first;
        while let Some(id) = next {
            let fiber = &mut self.fibers[id];
            fiber.parent = Some(parent);
            fiber.index = index;
            index += 1;
            next = fiber.sibling;
        }
    }

    /// Links `ids` as the children of `parent`, in order.
    pub fn link_children(&mut self, parent: FiberId, ids: &[FiberId]) {
        for (index, id) in ids.iter().enumerate() {
            let fiber = &mut self.fibers[*id];
            fiber.parent = Some(parent);
            fiber.index = index;
            fiber.sibling = ids.get(index + 1).copied();
        }
        self.fibers[parent].child = ids.first().copied();
    }

    /// Iterates over `root` and all its descendants in pre-order.
    pub fn descendants(&self, root: FiberId) -> Descendants<'_, N> {
        Descendants {
            arena: self,
            stack: vec![root],
        }
    }

    /// Frees every fiber that is neither reachable from `root` nor the alternate of a reachable
    /// fiber.
    pub fn collect_garbage(&mut self, root: FiberId) -> usize {
        let mut live = SecondaryMap::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            let fiber = match self.fibers.get(id) {
                Some(fiber) => fiber,
                None => continue,
            };
            live.insert(id, ());
            if let Some(alternate) = fiber.alternate {
                live.insert(alternate, ());
            }
            stack.extend(fiber.child);
            stack.extend(fiber.sibling);
        }

        let before = self.fibers.len();
        self.fibers.retain(|id, _| live.contains_key(id));

        // alternates of freed fibers now dangle; generational ids make that harmless, but
        // clearing them keeps the double buffer symmetric
        let fibers = &mut self.fibers;
        let ids: Vec<_> = fibers.keys().collect();
        for id in ids {
            if let Some(alternate) = fibers[id].alternate {
                if !fibers.contains_key(alternate) {
                    fibers[id].alternate = None;
                }
            }
        }

        before - self.fibers.len()
    }
}

impl<N: Clone> FiberArena<N> {
    /// Returns the work-in-progress counterpart of `current`, reusing its alternate slot if it
    /// has one.
    ///
    /// The returned fiber is a copy of `current` without flags or children; the caller is
    /// responsible for setting new props and reconciling children.
    pub fn create_work_in_progress(&mut self, current: FiberId) -> FiberId {
        let alternate = self.fibers[current]
            .alternate
            .filter(|id| self.fibers.contains_key(*id));

        let wip = match alternate {
            Some(id) => id,
            None => {
                let tag = self.fibers[current].tag.clone();
                let id = self.fibers.insert(Fiber::new(tag, None));
                self.fibers[current].alternate = Some(id);
                id
            }
        };

        let cur = &self.fibers[current];
        let work = Fiber {
            tag: cur.tag.clone(),
            key: cur.key.clone(),
            index: cur.index,
            parent: cur.parent,
            child: None,
            sibling: None,
            pending_props: cur.pending_props.clone(),
            memoized_props: cur.memoized_props.clone(),
            text: cur.text.clone(),
            events: cur.events.clone(),
            memoized_events: cur.memoized_events.clone(),
            flags: EffectFlags::empty(),
            subtree_flags: EffectFlags::empty(),
            lanes: cur.lanes,
            child_lanes: cur.child_lanes,
            state_node: cur.state_node.clone(),
            alternate: Some(current),
            states: cur.states.clone(),
            source: cur.source.clone(),
            template: None,
        };
        self.fibers[wip] = work;

        wip
    }
}

impl<N> Index<FiberId> for FiberArena<N> {
    type Output = Fiber<N>;
    fn index(&self, id: FiberId) -> &Fiber<N> {
        &self.fibers[id]
    }
}

impl<N> IndexMut<FiberId> for FiberArena<N> {
    fn index_mut(&mut self, id: FiberId) -> &mut Fiber<N> {
        &mut self.fibers[id]
    }
}

impl<N: fmt::Debug> fmt::Debug for FiberArena<N> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_map().entries(self.fibers.iter()).finish()
    }
}

/// Iterator over a fiber’s children.
pub struct Children<'a, N> {
    arena: &'a FiberArena<N>,
    next: Option<FiberId>,
}

impl<'a, N> Iterator for Children<'a, N> {
    type Item = FiberId;
    fn next(&mut self) -> Option<FiberId> {
        let id = self.next?;
        self.next = self.arena.fibers[id].sibling;
        Some(id)
    }
}

/// Pre-order iterator over a subtree.
pub struct Descendants<'a, N> {
    arena: &'a FiberArena<N>,
    stack: Vec<FiberId>,
}

impl<'a, N> Iterator for Descendants<'a, N> {
    type Item = FiberId;
    fn next(&mut self) -> Option<FiberId> {
        let id = self.stack.pop()?;
        let start = self.stack.len();
        self.stack.extend(self.arena.children(id));
        self.stack[start..].reverse();
        Some(id)
    }
}
