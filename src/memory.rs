//! An in-memory host renderer.
//!
//! [`MemoryHost`] keeps a small node tree and a log of every mutation it received. It’s used to
//! test the reconciler, and works for headless rendering (e.g. markup snapshots).

use crate::backend::HostRenderer;
use crate::events::{Event, EventHandler};
use core::fmt;
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;
use uuid::Uuid;

/// A node identifier (this is just a UUID).
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(Uuid);

impl NodeId {
    fn new() -> NodeId {
        NodeId(Uuid::new_v4())
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let (a, ..) = self.0.as_fields();
        write!(f, "NodeId({:08x})", a)
    }
}

/// A mutation received by a [`MemoryHost`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostOp {
    CreateElement(NodeId, String),
    CreateText(NodeId, String),
    SetAttribute(NodeId, String, String),
    RemoveAttribute(NodeId, String),
    /// `(parent, node, reference)`
    InsertBefore(NodeId, NodeId, Option<NodeId>),
    AppendChild(NodeId, NodeId),
    RemoveNode(NodeId),
    AddEventListener(NodeId, String),
    RemoveEventListener(NodeId, String),
    SetTextContent(NodeId, String),
}

/// Errors returned by a [`MemoryHost`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum HostError {
    #[error("no such node: {0:?}")]
    NoSuchNode(NodeId),
    #[error("inserting {0:?} would make it its own ancestor")]
    Cycle(NodeId),
}

#[derive(Debug)]
enum NodeKind {
    Element(String),
    Text(String),
}

#[derive(Debug)]
struct MemoryNode {
    kind: NodeKind,
    attributes: BTreeMap<String, String>,
    listeners: BTreeMap<String, EventHandler>,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

impl MemoryNode {
    fn new(kind: NodeKind) -> MemoryNode {
        MemoryNode {
            kind,
            attributes: BTreeMap::new(),
            listeners: BTreeMap::new(),
            parent: None,
            children: Vec::new(),
        }
    }
}

/// An in-memory host renderer.
#[derive(Debug)]
pub struct MemoryHost {
    nodes: HashMap<NodeId, MemoryNode>,
    root: NodeId,
    ops: Vec<HostOp>,
    available: bool,
}

impl Default for MemoryHost {
    fn default() -> Self {
        MemoryHost::new()
    }
}

impl MemoryHost {
    /// Creates a host with an empty `root` container element.
    pub fn new() -> MemoryHost {
        let root = NodeId::new();
        let mut nodes = HashMap::new();
        nodes.insert(root, MemoryNode::new(NodeKind::Element("root".into())));
        MemoryHost {
            nodes,
            root,
            ops: Vec::new(),
            available: true,
        }
    }

    /// The container node.
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Makes the host (un)available; see [`HostRenderer::is_available`].
    pub fn set_available(&mut self, available: bool) {
        self.available = available;
    }

    /// Returns and clears the mutation log.
    pub fn take_ops(&mut self) -> Vec<HostOp> {
        std::mem::take(&mut self.ops)
    }

    /// The mutation log since the last [`take_ops`](Self::take_ops).
    pub fn ops(&self) -> &[HostOp] {
        &self.ops
    }

    /// Number of nodes the host knows about, attached or not (including the container).
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn contains(&self, node: NodeId) -> bool {
        self.nodes.contains_key(&node)
    }

    pub fn children(&self, node: NodeId) -> &[NodeId] {
        self.nodes.get(&node).map_or(&[], |node| &node.children)
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.nodes.get(&node)?.parent
    }

    /// The tag of an element node.
    pub fn tag(&self, node: NodeId) -> Option<&str> {
        match &self.nodes.get(&node)?.kind {
            NodeKind::Element(tag) => Some(tag),
            NodeKind::Text(_) => None,
        }
    }

    /// The content of a text node.
    pub fn text(&self, node: NodeId) -> Option<&str> {
        match &self.nodes.get(&node)?.kind {
            NodeKind::Text(text) => Some(text),
            NodeKind::Element(_) => None,
        }
    }

    pub fn attribute(&self, node: NodeId, name: &str) -> Option<&str> {
        self.nodes.get(&node)?.attributes.get(name).map(String::as_str)
    }

    /// Names of the events a node listens to.
    pub fn listeners(&self, node: NodeId) -> Vec<&str> {
        self.nodes
            .get(&node)
            .map_or_else(Vec::new, |node| node.listeners.keys().map(String::as_str).collect())
    }

    /// Finds the first attached element with the given tag, in document order.
    pub fn first_by_tag(&self, tag: &str) -> Option<NodeId> {
        self.all_by_tag(tag).into_iter().next()
    }

    /// Finds all attached elements with the given tag, in document order.
    pub fn all_by_tag(&self, tag: &str) -> Vec<NodeId> {
        let mut found = Vec::new();
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            if id != self.root && self.tag(id) == Some(tag) {
                found.push(id);
            }
            stack.extend(self.children(id).iter().rev());
        }
        found
    }

    /// Invokes the listener for `event` on `node`. Returns false if there was none.
    pub fn dispatch(&self, node: NodeId, event: &Event) -> bool {
        let handler = self
            .nodes
            .get(&node)
            .and_then(|node| node.listeners.get(&event.name))
            .cloned();
        match handler {
            Some(handler) => {
                handler.call(event);
                true
            }
            None => false,
        }
    }

    /// Serializes a node and its subtree.
    pub fn to_markup(&self, node: NodeId) -> String {
        let mut out = String::new();
        self.write_markup(node, &mut out);
        out
    }

    /// Serializes a node’s children.
    pub fn inner_markup(&self, node: NodeId) -> String {
        let mut out = String::new();
        for child in self.children(node) {
            self.write_markup(*child, &mut out);
        }
        out
    }

    fn write_markup(&self, id: NodeId, out: &mut String) {
        let node = match self.nodes.get(&id) {
            Some(node) => node,
            None => return,
        };
        match &node.kind {
            NodeKind::Text(text) => out.push_str(text),
            NodeKind::Element(tag) => {
                out.push('<');
                out.push_str(tag);
                for (name, value) in &node.attributes {
                    out.push_str(&format!(" {}=\"{}\"", name, value));
                }
                out.push('>');
                for child in &node.children {
                    self.write_markup(*child, out);
                }
                out.push_str(&format!("</{}>", tag));
            }
        }
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut MemoryNode, HostError> {
        self.nodes.get_mut(&id).ok_or(HostError::NoSuchNode(id))
    }

    fn create(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId::new();
        self.nodes.insert(id, MemoryNode::new(kind));
        id
    }

    fn detach(&mut self, id: NodeId) -> Result<(), HostError> {
        if let Some(parent) = self.node_mut(id)?.parent.take() {
            self.node_mut(parent)?.children.retain(|child| *child != id);
        }
        Ok(())
    }

    fn is_ancestor(&self, ancestor: NodeId, mut node: NodeId) -> bool {
        loop {
            if node == ancestor {
                return true;
            }
            match self.parent(node) {
                Some(parent) => node = parent,
                None => return false,
            }
        }
    }

    fn insert(&mut self, parent: NodeId, id: NodeId, reference: Option<NodeId>) -> Result<(), HostError> {
        if !self.nodes.contains_key(&parent) {
            return Err(HostError::NoSuchNode(parent));
        }
        if !self.nodes.contains_key(&id) {
            return Err(HostError::NoSuchNode(id));
        }
        if self.is_ancestor(id, parent) {
            return Err(HostError::Cycle(id));
        }

        self.detach(id)?;
        let children = &mut self.node_mut(parent)?.children;
        let position = match reference {
            Some(reference) => children
                .iter()
                .position(|child| *child == reference)
                .ok_or(HostError::NoSuchNode(reference))?,
            None => children.len(),
        };
        children.insert(position, id);
        self.node_mut(id)?.parent = Some(parent);
        Ok(())
    }

    /// Forgets a node and its subtree.
    fn forget(&mut self, id: NodeId) {
        if let Some(node) = self.nodes.remove(&id) {
            for child in node.children {
                self.forget(child);
            }
        }
    }
}

impl HostRenderer for MemoryHost {
    type Node = NodeId;
    type Error = HostError;

    fn is_available(&self) -> bool {
        self.available
    }

    fn create_element(&mut self, tag: &str) -> Result<NodeId, HostError> {
        let id = self.create(NodeKind::Element(tag.to_string()));
        self.ops.push(HostOp::CreateElement(id, tag.to_string()));
        Ok(id)
    }

    fn create_text(&mut self, text: &str) -> Result<NodeId, HostError> {
        let id = self.create(NodeKind::Text(text.to_string()));
        self.ops.push(HostOp::CreateText(id, text.to_string()));
        Ok(id)
    }

    fn set_attribute(&mut self, node: &NodeId, name: &str, value: &str) -> Result<(), HostError> {
        self.node_mut(*node)?
            .attributes
            .insert(name.to_string(), value.to_string());
        self.ops
            .push(HostOp::SetAttribute(*node, name.to_string(), value.to_string()));
        Ok(())
    }

    fn remove_attribute(&mut self, node: &NodeId, name: &str) -> Result<(), HostError> {
        self.node_mut(*node)?.attributes.remove(name);
        self.ops.push(HostOp::RemoveAttribute(*node, name.to_string()));
        Ok(())
    }

    fn insert_before(
        &mut self,
        parent: &NodeId,
        node: &NodeId,
        reference: Option<&NodeId>,
    ) -> Result<(), HostError> {
        self.insert(*parent, *node, reference.copied())?;
        self.ops
            .push(HostOp::InsertBefore(*parent, *node, reference.copied()));
        Ok(())
    }

    fn append_child(&mut self, parent: &NodeId, node: &NodeId) -> Result<(), HostError> {
        self.insert(*parent, *node, None)?;
        self.ops.push(HostOp::AppendChild(*parent, *node));
        Ok(())
    }

    fn remove_node(&mut self, node: &NodeId) -> Result<(), HostError> {
        self.detach(*node)?;
        self.forget(*node);
        self.ops.push(HostOp::RemoveNode(*node));
        Ok(())
    }

    fn add_event_listener(
        &mut self,
        node: &NodeId,
        event: &str,
        handler: &EventHandler,
    ) -> Result<(), HostError> {
        self.node_mut(*node)?
            .listeners
            .insert(event.to_string(), handler.clone());
        self.ops.push(HostOp::AddEventListener(*node, event.to_string()));
        Ok(())
    }

    fn remove_event_listener(&mut self, node: &NodeId, event: &str) -> Result<(), HostError> {
        self.node_mut(*node)?.listeners.remove(event);
        self.ops.push(HostOp::RemoveEventListener(*node, event.to_string()));
        Ok(())
    }

    fn set_text_content(&mut self, node: &NodeId, text: &str) -> Result<(), HostError> {
        let target = self.node_mut(*node)?;
        if let NodeKind::Text(content) = &mut target.kind {
            *content = text.to_string();
        } else {
            // an element’s text content replaces all of its children
            let children = std::mem::take(&mut target.children);
            for child in children {
                self.forget(child);
            }
            let text_node = self.create(NodeKind::Text(text.to_string()));
            self.insert(*node, text_node, None)?;
        }
        self.ops.push(HostOp::SetTextContent(*node, text.to_string()));
        Ok(())
    }
}
