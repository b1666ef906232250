//! Component-local state.
//!
//! State values live in a [`StateSlot`] owned by the component’s fiber. The slot is shared between
//! a fiber and its alternate, so values survive reconciliation, and it always knows which fiber
//! it’s currently bound to. [`StateCell`]s are the component-side handles: they are bound to the
//! slot right before the component renders, read through it, and enqueue an update request for
//! the slot’s fiber when written to.

use crate::fiber::FiberId;
use crate::lane::Lanes;
use core::fmt;
use crossbeam::channel::Sender;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::{Arc, Weak};

/// A state value.
#[derive(Debug, Clone, PartialEq)]
pub enum StateValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    List(Vec<StateValue>),
}

/// Types that can be stored in a state cell.
pub trait StateType: Clone + Send + Sync + 'static {
    fn into_value(self) -> StateValue;

    /// Returns None if the value holds a different variant.
    fn from_value(value: &StateValue) -> Option<Self>;
}

impl StateType for bool {
    fn into_value(self) -> StateValue {
        StateValue::Bool(self)
    }
    fn from_value(value: &StateValue) -> Option<Self> {
        match value {
            StateValue::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

macro_rules! impl_state_type_int {
    ($($t:ty),+) => {
        $(
            impl StateType for $t {
                fn into_value(self) -> StateValue {
                    StateValue::Int(self as i64)
                }
                fn from_value(value: &StateValue) -> Option<Self> {
                    match value {
                        StateValue::Int(i) => <$t>::try_from(*i).ok(),
                        _ => None,
                    }
                }
            }
        )+
    }
}
impl_state_type_int!(i32, i64, u32, usize);

impl StateType for f64 {
    fn into_value(self) -> StateValue {
        StateValue::Float(self)
    }
    fn from_value(value: &StateValue) -> Option<Self> {
        match value {
            StateValue::Float(f) => Some(*f),
            _ => None,
        }
    }
}

impl StateType for String {
    fn into_value(self) -> StateValue {
        StateValue::Text(self)
    }
    fn from_value(value: &StateValue) -> Option<Self> {
        match value {
            StateValue::Text(s) => Some(s.clone()),
            _ => None,
        }
    }
}

impl<T: StateType> StateType for Vec<T> {
    fn into_value(self) -> StateValue {
        StateValue::List(self.into_iter().map(StateType::into_value).collect())
    }
    fn from_value(value: &StateValue) -> Option<Self> {
        match value {
            StateValue::List(items) => items.iter().map(T::from_value).collect(),
            _ => None,
        }
    }
}

/// A request to re-render the component that owns a state slot.
#[derive(Debug, Clone)]
pub struct UpdateRequest {
    pub(crate) slot: Weak<StateSlot>,
    pub(crate) lane: Lanes,
}

/// The sending half of a root’s update queue.
#[derive(Debug, Clone)]
pub struct Updater {
    sender: Sender<UpdateRequest>,
    /// Lane used for writes that don’t specify one.
    lane: Lanes,
}

impl Updater {
    pub fn new(sender: Sender<UpdateRequest>, lane: Lanes) -> Updater {
        Updater { sender, lane }
    }
}

/// Per-fiber state storage.
pub struct StateSlot {
    /// The fiber this slot is bound to: the committed fiber, or its work-in-progress counterpart
    /// while a render is in progress.
    fiber: Mutex<FiberId>,
    values: Mutex<HashMap<String, StateValue>>,
    updater: Updater,
}

impl StateSlot {
    pub(crate) fn new(fiber: FiberId, updater: Updater) -> Arc<StateSlot> {
        Arc::new(StateSlot {
            fiber: Mutex::new(fiber),
            values: Mutex::new(HashMap::new()),
            updater,
        })
    }

    /// The fiber this slot is currently bound to.
    pub fn fiber(&self) -> FiberId {
        *self.fiber.lock()
    }

    pub(crate) fn rebind(&self, fiber: FiberId) {
        *self.fiber.lock() = fiber;
    }

    pub fn get(&self, name: &str) -> Option<StateValue> {
        self.values.lock().get(name).cloned()
    }

    /// Stores a value and requests a re-render of the owning component.
    fn write(self: &Arc<Self>, name: &str, value: StateValue, lane: Option<Lanes>) {
        self.values.lock().insert(name.to_string(), value);

        let request = UpdateRequest {
            slot: Arc::downgrade(self),
            lane: lane.unwrap_or(self.updater.lane),
        };
        if self.updater.sender.send(request).is_err() {
            tracing::warn!("state `{}` written after its root was dropped", name);
        }
    }
}

impl fmt::Debug for StateSlot {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("StateSlot")
            .field("fiber", &self.fiber())
            .field("values", &*self.values.lock())
            .finish()
    }
}

/// Binds state cells to a fiber’s state slot.
pub trait BindState {
    fn name(&self) -> &str;
    fn bind(&self, slot: &Arc<StateSlot>);
}

struct CellInner<T> {
    name: String,
    initial: T,
    slot: Mutex<Option<Weak<StateSlot>>>,
}

/// A component-local state variable.
///
/// Reads resolve through the bound fiber’s state slot and fall back to the initial value while
/// unbound. Clones share the binding, so a clone captured by an event handler keeps following
/// the component across re-renders.
pub struct StateCell<T> {
    inner: Arc<CellInner<T>>,
}

impl<T> Clone for StateCell<T> {
    fn clone(&self) -> Self {
        StateCell {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: StateType> StateCell<T> {
    pub fn new(name: impl Into<String>, initial: T) -> StateCell<T> {
        StateCell {
            inner: Arc::new(CellInner {
                name: name.into(),
                initial,
                slot: Mutex::new(None),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn is_bound(&self) -> bool {
        self.slot().is_some()
    }

    fn slot(&self) -> Option<Arc<StateSlot>> {
        self.inner.slot.lock().as_ref().and_then(Weak::upgrade)
    }

    pub fn get(&self) -> T {
        self.slot()
            .and_then(|slot| slot.get(&self.inner.name))
            .and_then(|value| T::from_value(&value))
            .unwrap_or_else(|| self.inner.initial.clone())
    }

    /// Writes a value and schedules a re-render on the root’s state lane.
    ///
    /// # Panics
    /// If the cell was never bound, or its component has been unmounted.
    pub fn set(&self, value: T) {
        self.write(value, None);
    }

    /// Writes a value and schedules a re-render on the given lane.
    ///
    /// # Panics
    /// If the cell was never bound, or its component has been unmounted.
    pub fn set_with_lane(&self, value: T, lane: Lanes) {
        self.write(value, Some(lane));
    }

    /// Replaces the value with `f(current)`.
    pub fn update(&self, f: impl FnOnce(T) -> T) {
        let value = f(self.get());
        self.set(value);
    }

    fn write(&self, value: T, lane: Option<Lanes>) {
        let slot = match &*self.inner.slot.lock() {
            None => panic!(
                "state `{}` was written before being bound to a component",
                self.inner.name
            ),
            Some(slot) => match slot.upgrade() {
                Some(slot) => slot,
                None => panic!(
                    "state `{}` was written after its component was unmounted",
                    self.inner.name
                ),
            },
        };
        slot.write(&self.inner.name, value.into_value(), lane);
    }
}

impl<T: StateType> BindState for StateCell<T> {
    fn name(&self) -> &str {
        &self.inner.name
    }

    fn bind(&self, slot: &Arc<StateSlot>) {
        *self.inner.slot.lock() = Some(Arc::downgrade(slot));
    }
}

impl<T> fmt::Debug for StateCell<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let bound = self
            .inner
            .slot
            .lock()
            .as_ref()
            .map_or(false, |slot| slot.strong_count() > 0);
        f.debug_struct("StateCell")
            .field("name", &self.inner.name)
            .field("bound", &bound)
            .finish()
    }
}
