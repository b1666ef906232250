//! Declarative tree nodes.

use crate::events::{Event, EventHandler};
use crate::state::BindState;
use core::any::{Any, TypeId};
use core::fmt;
use std::collections::BTreeMap;
use std::sync::Arc;

/// A key used to identify a node among its siblings.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Key(Arc<str>);

impl Key {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Key {
    fn from(key: &str) -> Key {
        Key(key.into())
    }
}

impl From<String> for Key {
    fn from(key: String) -> Key {
        Key(key.into())
    }
}

macro_rules! impl_key_from_int {
    ($($t:ty),+) => {
        $(
            impl From<$t> for Key {
                fn from(key: $t) -> Key {
                    Key(key.to_string().into())
                }
            }
        )+
    }
}
impl_key_from_int!(u32, u64, usize, i32, i64);

/// Identity of a component type; two component fibers are only reusable if these match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ComponentType {
    pub name: &'static str,
    pub id: TypeId,
}

/// Components encapsulate properties and state to render a node tree.
///
/// Components are cheap descriptions and are recreated on every render of their parent; anything
/// that must outlive a render lives in state cells, which are bound to the component’s fiber
/// before `render` is called.
///
/// `render` should be a pure function of the component’s properties and its state cells.
pub trait Component: Any + fmt::Debug + Send + Sync {
    /// Renders the content of this component.
    fn render(&self) -> Node;

    /// A key used to identify this component in a list.
    fn key(&self) -> Option<Key> {
        None
    }

    /// State cells to bind to this component’s fiber before rendering.
    fn states(&self) -> Vec<&dyn BindState> {
        Vec::new()
    }

    /// Identity of the implementing type.
    #[doc(hidden)]
    fn component_type(&self) -> ComponentType {
        ComponentType {
            name: std::any::type_name::<Self>(),
            id: TypeId::of::<Self>(),
        }
    }
}

/// A host element: a tag, attributes, event handlers and children.
#[derive(Debug, Clone)]
pub struct Element {
    pub tag: Arc<str>,
    pub key: Option<Key>,
    pub attributes: BTreeMap<String, String>,
    pub events: BTreeMap<String, EventHandler>,
    pub children: Vec<Node>,
}

impl Element {
    pub fn new(tag: impl Into<Arc<str>>) -> Element {
        Element {
            tag: tag.into(),
            key: None,
            attributes: BTreeMap::new(),
            events: BTreeMap::new(),
            children: Vec::new(),
        }
    }

    pub fn key(mut self, key: impl Into<Key>) -> Element {
        self.key = Some(key.into());
        self
    }

    /// Sets an attribute; values are flattened to strings.
    pub fn attr(mut self, name: impl Into<String>, value: impl ToString) -> Element {
        self.attributes.insert(name.into(), value.to_string());
        self
    }

    /// Adds an event handler, replacing any previous handler for the same event.
    pub fn on<F: 'static + FnMut(&Event) + Send>(mut self, event: impl Into<String>, handler: F) -> Element {
        self.events.insert(event.into(), EventHandler::new(handler));
        self
    }

    pub fn on_handler(mut self, event: impl Into<String>, handler: EventHandler) -> Element {
        self.events.insert(event.into(), handler);
        self
    }

    pub fn child(mut self, child: impl Into<Node>) -> Element {
        self.children.push(child.into());
        self
    }

    pub fn children<I, T>(mut self, children: I) -> Element
    where
        I: IntoIterator<Item = T>,
        T: Into<Node>,
    {
        self.children.extend(children.into_iter().map(Into::into));
        self
    }
}

/// A node in a declarative tree.
#[derive(Debug, Clone)]
pub enum Node {
    /// Renders nothing.
    Empty,
    /// A text leaf.
    Text(String),
    /// A host element.
    Element(Element),
    /// A sequence of sibling nodes (tuples, branches, loops).
    Fragment(Vec<Node>),
    /// A component and an optional key overriding [`Component::key`].
    Component(Arc<dyn Component>, Option<Key>),
}

impl Node {
    /// Renders `node` if `condition` holds.
    pub fn when(condition: bool, node: impl Into<Node>) -> Node {
        if condition {
            node.into()
        } else {
            Node::Empty
        }
    }

    /// Renders one of two branches.
    pub fn either(condition: bool, first: impl Into<Node>, second: impl Into<Node>) -> Node {
        if condition {
            first.into()
        } else {
            second.into()
        }
    }

    /// Attaches a key to an element or component node.
    ///
    /// Other nodes can’t be keyed and are returned unchanged.
    pub fn with_key(self, key: impl Into<Key>) -> Node {
        match self {
            Node::Element(element) => Node::Element(element.key(key)),
            Node::Component(component, _) => Node::Component(component, Some(key.into())),
            node => node,
        }
    }

    /// The key of this node, if it has one.
    pub fn key(&self) -> Option<Key> {
        match self {
            Node::Element(element) => element.key.clone(),
            Node::Component(component, key) => key.clone().or_else(|| component.key()),
            _ => None,
        }
    }
}

impl From<Element> for Node {
    fn from(element: Element) -> Node {
        Node::Element(element)
    }
}

impl From<Vec<Node>> for Node {
    fn from(nodes: Vec<Node>) -> Node {
        Node::Fragment(nodes)
    }
}

impl From<()> for Node {
    fn from(_: ()) -> Node {
        Node::Empty
    }
}

impl<T: Into<Node>> From<Option<T>> for Node {
    fn from(node: Option<T>) -> Node {
        node.map_or(Node::Empty, Into::into)
    }
}

impl From<&str> for Node {
    fn from(text: &str) -> Node {
        Node::Text(text.to_string())
    }
}

impl From<String> for Node {
    fn from(text: String) -> Node {
        Node::Text(text)
    }
}

macro_rules! impl_node_from_display {
    ($($t:ty),+) => {
        $(
            impl From<$t> for Node {
                fn from(value: $t) -> Node {
                    Node::Text(value.to_string())
                }
            }
        )+
    }
}
impl_node_from_display!(i32, i64, u32, u64, usize, f32, f64, bool, char);

macro_rules! impl_node_from_tuple {
    ($($name:ident),+) => {
        impl<$($name: Into<Node>),+> From<($($name,)+)> for Node {
            #[allow(non_snake_case)]
            fn from(($($name,)+): ($($name,)+)) -> Node {
                Node::Fragment(vec![$($name.into()),+])
            }
        }
    }
}
impl_node_from_tuple!(A, B);
impl_node_from_tuple!(A, B, C);
impl_node_from_tuple!(A, B, C, D);
impl_node_from_tuple!(A, B, C, D, E);
impl_node_from_tuple!(A, B, C, D, E, F);

/// Creates an element node builder.
pub fn element(tag: impl Into<Arc<str>>) -> Element {
    Element::new(tag)
}

/// Creates a text node.
pub fn text(text: impl ToString) -> Node {
    Node::Text(text.to_string())
}

/// Wraps a component in a node.
pub fn component<C: Component>(component: C) -> Node {
    Node::Component(Arc::new(component), None)
}

/// A keyed loop: renders each item and keys it with `key_fn`.
pub fn each<I, T, K, F, R>(items: I, mut key_fn: K, mut render: F) -> Node
where
    I: IntoIterator<Item = T>,
    K: FnMut(&T) -> Key,
    F: FnMut(T) -> R,
    R: Into<Node>,
{
    Node::Fragment(
        items
            .into_iter()
            .map(|item| {
                let key = key_fn(&item);
                Into::<Node>::into(render(item)).with_key(key)
            })
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Label(&'static str);

    impl Component for Label {
        fn render(&self) -> Node {
            text(self.0)
        }
        fn key(&self) -> Option<Key> {
            Some(Key::from(self.0))
        }
    }

    #[test]
    fn keys() {
        let node: Node = element("li").key(3u32).into();
        assert_eq!(node.key(), Some(Key::from("3")));

        let node = component(Label("a"));
        assert_eq!(node.key(), Some(Key::from("a")));
        assert_eq!(node.with_key("b").key(), Some(Key::from("b")));

        assert_eq!(text("t").with_key("k").key(), None);
    }

    #[test]
    fn each_keys_items() {
        let list = each(vec!["x", "y"], |s| Key::from(*s), |s| element("li").child(s));
        match list {
            Node::Fragment(items) => {
                let keys: Vec<_> = items.iter().map(Node::key).collect();
                assert_eq!(keys, vec![Some(Key::from("x")), Some(Key::from("y"))]);
            }
            node => panic!("expected a fragment, got {:?}", node),
        }
    }

    #[test]
    fn component_type_identifies_implementor() {
        let a: Arc<dyn Component> = Arc::new(Label("a"));
        let b: Arc<dyn Component> = Arc::new(Label("b"));
        assert_eq!(a.component_type(), b.component_type());
        assert!(a.component_type().name.ends_with("Label"));
        assert_eq!(a.component_type().id, TypeId::of::<Label>());
    }

    #[test]
    fn conditionals() {
        assert!(matches!(Node::when(false, "x"), Node::Empty));
        assert!(matches!(Node::either(false, "x", 2), Node::Text(ref t) if t == "2"));
        assert!(matches!(Node::from(("a", "b")), Node::Fragment(ref v) if v.len() == 2));
    }
}
