//! Traits for host renderers.

use crate::events::EventHandler;
use core::fmt;

/// A host renderer: the platform that owns the actual rendered nodes.
///
/// The commit phase is the only caller. All mutations go through this trait; the reconciler never
/// inspects host nodes itself.
pub trait HostRenderer {
    /// A reference to a node in the host.
    type Node: Clone + fmt::Debug;

    /// Error type.
    type Error: fmt::Display;

    /// Returns false if the host can’t currently accept mutations.
    ///
    /// Commits against an unavailable host still advance the committed tree, but skip all host
    /// calls.
    fn is_available(&self) -> bool {
        true
    }

    /// Creates a detached element node.
    fn create_element(&mut self, tag: &str) -> Result<Self::Node, Self::Error>;

    /// Creates a detached text node.
    fn create_text(&mut self, text: &str) -> Result<Self::Node, Self::Error>;

    fn set_attribute(&mut self, node: &Self::Node, name: &str, value: &str) -> Result<(), Self::Error>;

    fn remove_attribute(&mut self, node: &Self::Node, name: &str) -> Result<(), Self::Error>;

    /// Inserts `node` into `parent` before `reference`, or at the end if there is no reference.
    ///
    /// If `node` is already attached somewhere, it must be moved.
    fn insert_before(
        &mut self,
        parent: &Self::Node,
        node: &Self::Node,
        reference: Option<&Self::Node>,
    ) -> Result<(), Self::Error>;

    /// Appends `node` to the end of `parent`’s children, moving it if it’s already attached.
    fn append_child(&mut self, parent: &Self::Node, node: &Self::Node) -> Result<(), Self::Error> {
        self.insert_before(parent, node, None)
    }

    /// Detaches a node (and with it, its subtree) from its parent.
    fn remove_node(&mut self, node: &Self::Node) -> Result<(), Self::Error>;

    fn add_event_listener(
        &mut self,
        node: &Self::Node,
        event: &str,
        handler: &EventHandler,
    ) -> Result<(), Self::Error>;

    fn remove_event_listener(&mut self, node: &Self::Node, event: &str) -> Result<(), Self::Error>;

    fn set_text_content(&mut self, node: &Self::Node, text: &str) -> Result<(), Self::Error>;
}
