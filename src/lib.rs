//! Incremental tree reconciliation.
//!
//! # Conceptual overview
//! Sprig keeps a host UI (a DOM, a native view hierarchy, or just the in-memory [`MemoryHost`]) in
//! sync with a declarative description of it, applying only the mutations that are needed.
//!
//! ## Nodes
//! A [`Node`] is an immutable description of what should be on screen: elements with attributes,
//! event handlers and children, text, sequences of nodes, and components. Nodes are cheap to
//! create and are thrown away after every render. Components are types implementing
//! [`Component`]; they derive a node tree from their properties and their state cells.
//!
//! ## Fibers
//! Rendered nodes are mirrored by fibers, persistent tree nodes stored in a [`FiberArena`]. Each
//! fiber remembers what was last committed to the host, owns the host node (if any), and keeps
//! component state alive across renders. Every logical node has up to two fibers: the committed
//! one and a work-in-progress one, which alternate between renders.
//!
//! ## Rendering
//! A render converts nodes into fresh fibers ([`convert`]), then reconciles them against the
//! committed fibers ([`Reconciler`]): reusable fibers are updated in place, others are placed or
//! deleted, and keyed children are matched by key. The result is a work-in-progress tree annotated
//! with effect flags, which the commit phase ([`Commit`]) applies to the host through the
//! [`HostRenderer`] trait.
//!
//! ## Scheduling
//! Updates carry a priority lane ([`Lanes`]). A [`Root`] renders sync-lane updates immediately
//! and all others cooperatively: [`Root::poll`] works until its frame budget is used up and then
//! returns control to the host. A render interrupted by a more urgent update is discarded and
//! restarted. Commits always run to completion.
//!
//! ## State
//! Component state lives in [`StateCell`]s. Before a component renders, its cells are bound to
//! the component’s fiber; reading a cell then reads the fiber’s stored value, and writing one
//! stores the value and queues a re-render of only that component’s subtree.

pub mod backend;
pub mod commit;
pub mod config;
pub mod convert;
pub mod error;
pub mod events;
pub mod fiber;
pub mod lane;
pub mod memory;
pub mod node;
pub mod reconcile;
pub mod scheduler;
pub mod state;

pub use backend::HostRenderer;
pub use commit::{Commit, CommitStats};
pub use config::Config;
pub use convert::convert;
pub use error::{Error, Result};
pub use events::{Event, EventHandler};
pub use fiber::{EffectFlags, Fiber, FiberArena, FiberId, FiberTag};
pub use lane::Lanes;
pub use memory::{HostOp, MemoryHost, NodeId};
pub use node::{component, each, element, text, Component, Element, Key, Node};
pub use reconcile::Reconciler;
pub use scheduler::{Root, WorkStatus};
pub use state::{BindState, StateCell, StateType, StateValue};
