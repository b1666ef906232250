//! Converts declarative nodes into fresh fiber subtrees.
//!
//! Conversion never looks at previously rendered fibers and never touches the host; diffing is
//! the reconciler’s job.

use crate::fiber::{Fiber, FiberArena, FiberId, FiberTag};
use crate::node::Node;

/// Converts a node into a chain of sibling fibers and returns the first one.
///
/// Sequences are flattened into siblings; empty nodes produce nothing. Components are rendered
/// right away, with whatever their state cells currently read (usually their initial values).
/// The returned chain has no parent; use [`FiberArena::set_children`] to attach it.
pub fn convert<N>(fibers: &mut FiberArena<N>, node: &Node) -> Option<FiberId> {
    let mut chain = Vec::new();
    convert_into(fibers, node, &mut chain);

    for pair in chain.windows(2) {
        fibers[pair[0]].sibling = Some(pair[1]);
    }
    for (index, id) in chain.iter().enumerate() {
        fibers[*id].index = index;
    }
    chain.first().copied()
}

fn convert_into<N>(fibers: &mut FiberArena<N>, node: &Node, out: &mut Vec<FiberId>) {
    match node {
        Node::Empty => (),
        Node::Text(text) => out.push(fibers.insert(Fiber::text(text.as_str()))),
        Node::Element(element) => {
            let mut fiber = Fiber::new(FiberTag::Element(element.tag.clone()), element.key.clone());
            fiber.pending_props = element.attributes.clone();
            fiber.events = element.events.clone();
            let id = fibers.insert(fiber);

            let mut children = Vec::with_capacity(element.children.len());
            for child in &element.children {
                convert_into(fibers, child, &mut children);
            }
            fibers.link_children(id, &children);
            out.push(id);
        }
        Node::Fragment(nodes) => {
            for node in nodes {
                convert_into(fibers, node, out);
            }
        }
        Node::Component(component, key) => {
            let key = key.clone().or_else(|| component.key());
            let mut fiber = Fiber::new(FiberTag::Component(component.component_type()), key);
            fiber.source = Some(component.clone());
            let id = fibers.insert(fiber);

            let content = component.render();
            let mut children = Vec::new();
            convert_into(fibers, &content, &mut children);
            fibers.link_children(id, &children);
            out.push(id);
        }
    }
}
