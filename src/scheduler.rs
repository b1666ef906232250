//! Per-root scheduling.
//!
//! A [`Root`] owns a fiber tree, the host renderer it commits to, and the queue of pending
//! updates. Updates are marked on the fibers they target (`lanes`) and their ancestors
//! (`child_lanes`); a render for a lane only revisits the top-most fibers carrying it.
//!
//! The sync lane renders and commits right away. Every other lane is rendered cooperatively by
//! [`Root::poll`], which performs units of work until the frame budget is used up and then
//! returns, to be called again from the host’s idle callback. A render interrupted by a more
//! urgent update is discarded and started over; updates of the same or lower priority wait for
//! it to commit.

use crate::backend::HostRenderer;
use crate::commit::Commit;
use crate::config::Config;
use crate::convert::convert;
use crate::error::{Error, Result};
use crate::fiber::{EffectFlags, Fiber, FiberArena, FiberId, FiberTag};
use crate::lane::Lanes;
use crate::node::Node;
use crate::reconcile::Reconciler;
use crate::state::{UpdateRequest, Updater};
use crossbeam::channel::{self, Receiver};
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Whether a root has work left after [`Root::poll`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkStatus {
    Idle,
    Pending,
}

/// A target whose work-in-progress subtree is being built.
struct ActiveTarget {
    current: FiberId,
    wip: FiberId,
    next: Option<FiberId>,
}

/// An update on its way to the fiber tree.
enum Update {
    Fiber(FiberId, Lanes),
    State(UpdateRequest),
}

impl Update {
    fn lane(&self) -> Lanes {
        match self {
            Update::Fiber(_, lane) => *lane,
            Update::State(request) => request.lane,
        }
    }
}

/// An in-progress render.
struct RenderWork {
    lanes: Lanes,
    targets: VecDeque<FiberId>,
    active: Option<ActiveTarget>,
    /// `(current, work in progress)` pairs ready to be committed.
    finished: Vec<(FiberId, FiberId)>,
    deletions: Vec<FiberId>,
    /// Updates that arrived during the render without interrupting it.
    interleaved: Vec<Update>,
}

/// A rendering root: a fiber tree rendered into a host container.
pub struct Root<H: HostRenderer> {
    host: H,
    config: Config,
    fibers: FiberArena<H::Node>,
    /// The committed host root fiber.
    current: FiberId,
    /// The last node passed to `render`.
    element: Option<Node>,

    pending_lanes: Lanes,
    callback_priority: Option<Lanes>,
    work: Option<RenderWork>,

    updates: Receiver<UpdateRequest>,
    updater: Updater,
}

impl<H: HostRenderer> Root<H> {
    /// Creates a new root rendering into `container`.
    ///
    /// Nothing is rendered until you call [`render`](Self::render).
    pub fn new(host: H, container: H::Node) -> Root<H> {
        Root::with_config(host, container, Config::default())
    }

    pub fn with_config(host: H, container: H::Node, config: Config) -> Root<H> {
        let mut fibers = FiberArena::new();
        let mut root = Fiber::new(FiberTag::HostRoot, None);
        root.state_node = Some(container);
        let current = fibers.insert(root);

        let (sender, updates) = channel::unbounded();
        Root {
            host,
            config,
            fibers,
            current,
            element: None,
            pending_lanes: Lanes::empty(),
            callback_priority: None,
            work: None,
            updates,
            updater: Updater::new(sender, config.state_lane),
        }
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn fibers(&self) -> &FiberArena<H::Node> {
        &self.fibers
    }

    /// The committed host root fiber.
    pub fn current(&self) -> FiberId {
        self.current
    }

    pub fn pending_lanes(&self) -> Lanes {
        self.pending_lanes
    }

    /// The priority of the currently scheduled work, if any.
    pub fn callback_priority(&self) -> Option<Lanes> {
        self.callback_priority
    }

    /// Returns true if a time-sliced render has started and not been committed yet.
    pub fn is_rendering(&self) -> bool {
        self.work.is_some()
    }

    /// Renders a node into the container on the configured render lane.
    pub fn render(&mut self, node: impl Into<Node>) {
        let lane = self.config.render_lane;
        self.render_with_lane(node, lane);
    }

    /// Renders a node into the container on the given lane.
    pub fn render_with_lane(&mut self, node: impl Into<Node>, lane: Lanes) {
        self.element = Some(node.into());
        if lane.is_empty() {
            return;
        }
        self.enqueue(Update::Fiber(self.current, lane));
        self.ensure_scheduled();
    }

    /// Requests a re-render of a mounted fiber’s subtree.
    pub fn request_update(&mut self, fiber: FiberId, lane: Lanes) -> Result<()> {
        if !self.is_mounted(fiber) {
            return Err(Error::UnknownFiber(fiber));
        }
        if lane.is_empty() {
            return Ok(());
        }
        self.enqueue(Update::Fiber(fiber, lane));
        self.ensure_scheduled();
        Ok(())
    }

    /// Processes queued state updates and runs one time slice of pending work.
    pub fn poll(&mut self) -> WorkStatus {
        self.drain_updates();
        self.ensure_scheduled();

        if let Some(priority) = self.callback_priority {
            if self.work.is_none() {
                self.prepare_work(priority);
            }
            if self.work_loop(Some(self.config.frame_budget)) {
                self.commit_work();
                self.drain_updates();
                self.ensure_scheduled();
            } else {
                tracing::trace!("yielding after {:?}", self.config.frame_budget);
            }
        }

        if self.pending_lanes.is_empty() && self.work.is_none() {
            WorkStatus::Idle
        } else {
            WorkStatus::Pending
        }
    }

    /// Polls until there is no more work.
    pub fn flush(&mut self) {
        while self.poll() == WorkStatus::Pending {}
    }

    /// Returns true if `fiber` is part of the committed tree.
    fn is_mounted(&self, fiber: FiberId) -> bool {
        let mut id = fiber;
        while id != self.current {
            let parent = match self.fibers.get(id).and_then(|fiber| fiber.parent) {
                Some(parent) => parent,
                None => return false,
            };
            // superseded fibers keep their parent but are no longer among its children
            let mut child = self.fibers.get(parent).and_then(|parent| parent.child);
            loop {
                match child {
                    Some(child) if child == id => break,
                    Some(other) => child = self.fibers.get(other).and_then(|other| other.sibling),
                    None => return false,
                }
            }
            id = parent;
        }
        true
    }

    /// Applies an update, or queues it behind the render in progress unless it outranks it.
    fn enqueue(&mut self, update: Update) {
        let rendering = self.work.as_ref().map(|work| work.lanes);
        if let Some(lanes) = rendering {
            if !update.lane().outranks(lanes) {
                if let Some(work) = &mut self.work {
                    work.interleaved.push(update);
                }
                return;
            }
            self.discard_work();
        }
        self.apply(update);
    }

    /// Marks an update on the committed fiber it targets.
    fn apply(&mut self, update: Update) {
        match update {
            Update::Fiber(fiber, lane) => {
                // a fiber replaced by a commit hands its updates to its successor
                let target = Some(fiber)
                    .filter(|id| self.is_mounted(*id))
                    .or_else(|| self.fibers.get(fiber).and_then(|fiber| fiber.alternate))
                    .filter(|id| self.is_mounted(*id));
                match target {
                    Some(id) => self.mark_lanes(id, lane),
                    None => tracing::debug!(?fiber, "dropping an update for an unmounted fiber"),
                }
            }
            Update::State(request) => {
                let slot = match request.slot.upgrade() {
                    Some(slot) => slot,
                    None => {
                        tracing::debug!("dropping an update for an unmounted component");
                        return;
                    }
                };
                // slots are bound to committed fibers whenever no render is in progress
                let fiber = slot.fiber();
                if self.is_mounted(fiber) {
                    self.mark_lanes(fiber, request.lane);
                } else {
                    tracing::debug!(?fiber, "dropping an update for an unmounted fiber");
                }
            }
        }
    }

    fn mark_lanes(&mut self, fiber: FiberId, lane: Lanes) {
        self.fibers[fiber].lanes |= lane;
        let mut parent = self.fibers[fiber].parent;
        while let Some(id) = parent {
            self.fibers[id].child_lanes |= lane;
            parent = self.fibers[id].parent;
        }
        self.pending_lanes |= lane;
    }

    fn ensure_scheduled(&mut self) {
        loop {
            if self.pending_lanes.is_empty() {
                self.callback_priority = None;
                return;
            }
            let priority = self.pending_lanes.highest_priority();
            if self.callback_priority == Some(priority) {
                return;
            }
            if self.work.is_some() {
                self.discard_work();
            }
            self.callback_priority = Some(priority);

            if !priority.is_sync() {
                return;
            }
            self.prepare_work(priority);
            self.work_loop(None);
            self.commit_work();
            self.drain_updates();
        }
    }

    /// Collects the top-most fibers carrying any of `lanes`.
    fn collect_targets(&self, lanes: Lanes) -> VecDeque<FiberId> {
        let mut targets = VecDeque::new();
        let mut stack = vec![self.current];
        while let Some(id) = stack.pop() {
            let fiber = &self.fibers[id];
            if fiber.lanes.intersects(lanes) {
                targets.push_back(id);
            } else if fiber.child_lanes.intersects(lanes) {
                let start = stack.len();
                stack.extend(self.fibers.children(id));
                stack[start..].reverse();
            }
        }
        targets
    }

    fn prepare_work(&mut self, lanes: Lanes) {
        let targets = self.collect_targets(lanes);
        tracing::debug!(?lanes, targets = targets.len(), "render started");
        self.work = Some(RenderWork {
            lanes,
            targets,
            active: None,
            finished: Vec::new(),
            deletions: Vec::new(),
            interleaved: Vec::new(),
        });
    }

    /// Performs units of work until the render is complete, or `budget` has elapsed.
    ///
    /// Returns true once there is nothing left to render.
    fn work_loop(&mut self, budget: Option<Duration>) -> bool {
        let start = Instant::now();
        let Root {
            fibers,
            work,
            element,
            updater,
            ..
        } = self;
        let RenderWork {
            lanes,
            targets,
            active,
            finished,
            deletions,
            ..
        } = match work {
            Some(work) => work,
            None => return true,
        };

        loop {
            if active.is_none() {
                match targets.pop_front() {
                    Some(current) => {
                        *active = Some(start_target(&mut *fibers, element.as_ref(), current))
                    }
                    None => return true,
                }
            }
            let target = match active {
                Some(target) => target,
                None => return true,
            };

            if let Some(unit) = target.next {
                let mut reconciler =
                    Reconciler::new(&mut *fibers, &mut *deletions, *lanes, &*updater);
                target.next = reconciler.perform_unit_of_work(unit, target.wip);
            }
            if target.next.is_none() {
                finished.push((target.current, target.wip));
                *active = None;
                if targets.is_empty() {
                    return true;
                }
            }

            if let Some(budget) = budget {
                if start.elapsed() >= budget {
                    return false;
                }
            }
        }
    }

    /// Drops an unfinished render; the committed tree is left as it was.
    fn discard_work(&mut self) {
        let work = match self.work.take() {
            Some(work) => work,
            None => return,
        };
        tracing::debug!(lanes = ?work.lanes, "render discarded");

        for id in &work.deletions {
            if let Some(fiber) = self.fibers.get_mut(*id) {
                fiber.flags.remove(EffectFlags::DELETION);
            }
        }

        // state slots of started targets point at discarded fibers
        let started = work
            .finished
            .iter()
            .map(|(current, _)| *current)
            .chain(work.active.map(|target| target.current));
        for target in started {
            let ids: Vec<_> = self.fibers.descendants(target).collect();
            for id in ids {
                if let Some(slot) = &self.fibers[id].states {
                    slot.rebind(id);
                }
            }
        }
        self.callback_priority = None;

        for update in work.interleaved {
            self.apply(update);
        }
    }

    /// Replaces a committed fiber with its finished counterpart in the committed tree.
    fn splice(&mut self, current: FiberId, wip: FiberId) {
        let (parent, sibling, index) = {
            let fiber = &self.fibers[current];
            (fiber.parent, fiber.sibling, fiber.index)
        };
        let fiber = &mut self.fibers[wip];
        fiber.parent = parent;
        fiber.sibling = sibling;
        fiber.index = index;

        let parent = match parent {
            Some(parent) => parent,
            None => {
                self.current = wip;
                return;
            }
        };
        if self.fibers[parent].child == Some(current) {
            self.fibers[parent].child = Some(wip);
            return;
        }
        let previous = self
            .fibers
            .children(parent)
            .find(|id| self.fibers[*id].sibling == Some(current));
        if let Some(previous) = previous {
            self.fibers[previous].sibling = Some(wip);
        }
    }

    /// Recomputes `child_lanes` of the ancestors of `id`.
    fn bubble_lanes(&mut self, id: FiberId) {
        let mut parent = self.fibers[id].parent;
        while let Some(id) = parent {
            let mut child_lanes = Lanes::empty();
            for child in self.fibers.children(id) {
                child_lanes |= self.fibers[child].lanes | self.fibers[child].child_lanes;
            }
            self.fibers[id].child_lanes = child_lanes;
            parent = self.fibers[id].parent;
        }
    }

    fn commit_work(&mut self) {
        let work = match self.work.take() {
            Some(work) => work,
            None => return,
        };

        for (current, wip) in &work.finished {
            self.splice(*current, *wip);
        }

        let mut commit = Commit::new(&mut self.fibers, &mut self.host);
        commit.commit_deletions(&work.deletions);
        for (_, wip) in &work.finished {
            commit.commit_mutations(*wip);
        }
        let stats = commit.stats();

        for (_, wip) in &work.finished {
            self.bubble_lanes(*wip);
        }
        self.pending_lanes.remove(work.lanes);
        self.callback_priority = None;

        for update in work.interleaved {
            self.apply(update);
        }

        let freed = self.fibers.collect_garbage(self.current);
        tracing::debug!(
            lanes = ?work.lanes,
            placements = stats.placements,
            updates = stats.updates,
            deletions = stats.deletions,
            freed,
            "commit finished"
        );
    }

    /// Marks queued state updates on the fibers that own the written state.
    fn drain_updates(&mut self) {
        let requests: Vec<_> = self.updates.try_iter().collect();
        for request in requests {
            self.enqueue(Update::State(request));
        }
    }
}

/// Creates the work-in-progress counterpart of an update target.
///
/// The host root is re-rendered from the last rendered node; other targets re-render their
/// existing content.
fn start_target<N: Clone>(
    fibers: &mut FiberArena<N>,
    element: Option<&Node>,
    current: FiberId,
) -> ActiveTarget {
    let wip = fibers.create_work_in_progress(current);
    if fibers[current].tag == FiberTag::HostRoot {
        let template = fibers.insert(Fiber::new(FiberTag::HostRoot, None));
        let first = element.and_then(|element| convert(fibers, element));
        fibers.set_children(template, first);
        fibers[wip].template = Some(template);
    }
    ActiveTarget {
        current,
        wip,
        next: Some(wip),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{Event, EventHandler};
    use crate::memory::{HostError, HostOp, MemoryHost, NodeId};
    use crate::node::{component, element, Component};
    use crate::state::{BindState, StateCell};
    use pretty_assertions::assert_eq;
    use std::panic::{self, AssertUnwindSafe};

    fn init_logging() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("sprig=trace")
            .with_test_writer()
            .try_init();
    }

    fn memory_root(config: Config) -> Root<MemoryHost> {
        init_logging();
        let host = MemoryHost::new();
        let container = host.root();
        Root::with_config(host, container, config)
    }

    fn markup(host: &MemoryHost) -> String {
        host.inner_markup(host.root())
    }

    fn find<H: HostRenderer>(root: &Root<H>, tag: &str) -> FiberId {
        let fibers = root.fibers();
        fibers
            .descendants(root.current())
            .find(|id| matches!(&fibers[*id].tag, FiberTag::Element(t) if &**t == tag))
            .unwrap_or_else(|| panic!("no {} fiber", tag))
    }

    #[derive(Debug)]
    struct Counter {
        count: StateCell<i64>,
    }

    impl Counter {
        fn new(count: StateCell<i64>) -> Counter {
            Counter { count }
        }
    }

    impl Component for Counter {
        fn render(&self) -> Node {
            let count = self.count.clone();
            element("button")
                .on("click", move |_| count.update(|n| n + 1))
                .child(self.count.get())
                .into()
        }

        fn states(&self) -> Vec<&dyn BindState> {
            vec![&self.count]
        }
    }

    #[derive(Debug)]
    struct App;

    impl Component for App {
        fn render(&self) -> Node {
            element("div")
                .child(element("h1").child("title"))
                .child(component(Counter::new(StateCell::new("count", 0))))
                .child(element("footer"))
                .into()
        }
    }

    #[test]
    fn sync_renders_commit_immediately() {
        let mut root = memory_root(Config::default());
        root.render(element("p").child("hi"));
        assert_eq!(markup(root.host()), "<p>hi</p>");
        assert_eq!(root.pending_lanes(), Lanes::empty());
        assert_eq!(root.callback_priority(), None);
        assert!(!root.is_rendering());
        assert_eq!(root.poll(), WorkStatus::Idle);
    }

    #[test]
    fn state_writes_rerender_only_the_owning_component() {
        let mut root = memory_root(Config::default());
        root.render(component(App));
        assert_eq!(
            markup(root.host()),
            "<div><h1>title</h1><button>0</button><footer></footer></div>"
        );

        let div = find(&root, "div");
        let before: Vec<_> = root.fibers().children(div).collect();
        let button = root.host().first_by_tag("button").expect("button");
        let text = root.host().children(button)[0];
        root.host_mut().take_ops();

        assert!(root.host().dispatch(button, &Event::new("click")));
        // queued until the root polls
        assert_eq!(root.pending_lanes(), Lanes::empty());
        root.flush();

        assert_eq!(
            markup(root.host()),
            "<div><h1>title</h1><button>1</button><footer></footer></div>"
        );
        assert_eq!(
            root.host_mut().take_ops(),
            vec![HostOp::SetTextContent(text, "1".into())]
        );

        // only the component fiber was replaced
        assert_eq!(find(&root, "div"), div);
        let after: Vec<_> = root.fibers().children(div).collect();
        assert_eq!(after[0], before[0]);
        assert_ne!(after[1], before[1]);
        assert_eq!(after[2], before[2]);
        assert_eq!(root.fibers()[after[1]].alternate, Some(before[1]));

        // and the handler keeps following the component
        root.host().dispatch(button, &Event::new("click"));
        root.flush();
        assert_eq!(root.host().text(text), Some("2"));
    }

    #[test]
    fn scoped_renders_do_not_flag_outside_the_component() {
        let mut root = memory_root(Config::default().with_frame_budget(Duration::ZERO));
        root.render(component(App));
        let h1 = find(&root, "h1");
        let footer = find(&root, "footer");
        let button = root.host().first_by_tag("button").expect("button");

        root.host().dispatch(button, &Event::new("click"));
        while root.poll() == WorkStatus::Pending {
            if root.is_rendering() {
                for id in [h1, footer, root.current()] {
                    let fiber = &root.fibers()[id];
                    assert!(fiber.flags.is_empty(), "{:?} flagged", fiber);
                }
            }
        }
        assert_eq!(root.host().text(root.host().children(button)[0]), Some("1"));
    }

    #[test]
    fn time_sliced_renders_yield_and_resume() {
        let mut root = memory_root(
            Config::default()
                .with_frame_budget(Duration::ZERO)
                .with_render_lane(Lanes::DEFAULT),
        );
        root.render(element("ul").children((0..3).map(|i| element("li").child(i))));
        assert_eq!(root.pending_lanes(), Lanes::DEFAULT);
        assert_eq!(root.callback_priority(), Some(Lanes::DEFAULT));
        assert!(root.host().ops().is_empty());

        assert_eq!(root.poll(), WorkStatus::Pending);
        assert!(root.is_rendering());
        assert_eq!(markup(root.host()), "", "nothing is committed before the render completes");

        let mut polls = 1;
        while root.poll() == WorkStatus::Pending {
            polls += 1;
        }
        assert!(polls > 2);
        assert_eq!(markup(root.host()), "<ul><li>0</li><li>1</li><li>2</li></ul>");
        assert_eq!(root.callback_priority(), None);
        assert_eq!(root.pending_lanes(), Lanes::empty());
    }

    #[test]
    fn urgent_updates_discard_the_render_in_progress() {
        let mut root = memory_root(
            Config::default()
                .with_frame_budget(Duration::ZERO)
                .with_render_lane(Lanes::TRANSITION),
        );
        root.render(element("p").child("slow"));
        assert_eq!(root.poll(), WorkStatus::Pending);
        assert!(root.is_rendering());

        root.render_with_lane(element("p").child("fast"), Lanes::SYNC);
        assert!(!root.is_rendering());
        assert_eq!(markup(root.host()), "<p>fast</p>");
        assert_eq!(root.pending_lanes(), Lanes::TRANSITION);

        root.flush();
        assert_eq!(markup(root.host()), "<p>fast</p>");
        assert_eq!(root.host().all_by_tag("p").len(), 1);
    }

    #[test]
    fn state_written_during_a_slower_render_commits_at_its_own_lane() {
        let mut root = memory_root(Config::default().with_frame_budget(Duration::ZERO));
        root.render(component(App));
        let button = root.host().first_by_tag("button").expect("button");
        let text = root.host().children(button)[0];

        // far enough for the counter to be bound to its work-in-progress fiber
        root.render_with_lane(component(App), Lanes::TRANSITION);
        for _ in 0..7 {
            assert_eq!(root.poll(), WorkStatus::Pending);
            assert!(root.is_rendering());
        }

        root.host().dispatch(button, &Event::new("click"));
        root.poll();
        let mut polls = 1;
        while root.pending_lanes().contains(Lanes::DEFAULT) {
            assert!(polls < 100, "state write never committed");
            root.poll();
            polls += 1;
        }
        assert_eq!(root.host().text(text), Some("1"));
        assert_eq!(root.pending_lanes(), Lanes::TRANSITION);

        root.flush();
        assert_eq!(
            markup(root.host()),
            "<div><h1>title</h1><button>1</button><footer></footer></div>"
        );
    }

    #[test]
    fn lower_priority_requests_wait_for_the_render_in_progress() {
        let mut root = memory_root(
            Config::default()
                .with_frame_budget(Duration::ZERO)
                .with_render_lane(Lanes::DEFAULT),
        );
        root.render(element("ul").children((0..3).map(|i| element("li").child(i))));

        let mut polls = 0;
        while markup(root.host()).is_empty() {
            assert!(polls < 50, "render never committed");
            root.poll();
            root.request_update(root.current(), Lanes::IDLE).expect("mounted");
            polls += 1;
        }
        assert_eq!(markup(root.host()), "<ul><li>0</li><li>1</li><li>2</li></ul>");
        assert!(root.pending_lanes().contains(Lanes::IDLE));

        root.host_mut().take_ops();
        root.flush();
        assert_eq!(root.pending_lanes(), Lanes::empty());
        assert!(root.host().ops().is_empty());
    }

    #[test]
    fn same_priority_requests_coalesce() {
        let mut root = memory_root(
            Config::default()
                .with_frame_budget(Duration::from_secs(10))
                .with_render_lane(Lanes::DEFAULT),
        );
        root.render(element("p").child("a"));
        root.render(element("p").child("b"));
        assert_eq!(root.pending_lanes(), Lanes::DEFAULT);
        assert_eq!(root.poll(), WorkStatus::Idle);
        assert_eq!(markup(root.host()), "<p>b</p>");
        assert_eq!(
            root.host_mut().take_ops().len(),
            4,
            "one element, one text node, two insertions"
        );
    }

    #[test]
    fn request_update_validates_fibers() {
        let mut root = memory_root(Config::default());
        root.render(component(App));
        let div = find(&root, "div");

        assert_eq!(
            root.request_update(FiberId::default(), Lanes::SYNC),
            Err(Error::UnknownFiber(FiberId::default()))
        );
        assert_eq!(root.request_update(div, Lanes::empty()), Ok(()));
        assert_eq!(root.pending_lanes(), Lanes::empty());

        root.host_mut().take_ops();
        assert_eq!(root.request_update(div, Lanes::SYNC), Ok(()));
        assert!(root.host_mut().take_ops().is_empty());
        assert_eq!(root.pending_lanes(), Lanes::empty());

        // the old generation is no longer mounted
        root.render(component(App));
        let stale = root.fibers()[find(&root, "div")].alternate.expect("alternate");
        assert_eq!(
            root.request_update(stale, Lanes::SYNC),
            Err(Error::UnknownFiber(stale))
        );
    }

    #[test]
    fn superseded_component_fibers_are_not_mounted() {
        let mut root = memory_root(Config::default());
        root.render(component(App));
        let div = find(&root, "div");
        let old_counter = root.fibers().children(div).nth(1).expect("counter");

        let button = root.host().first_by_tag("button").expect("button");
        root.host().dispatch(button, &Event::new("click"));
        root.flush();

        let counter = root.fibers().children(div).nth(1).expect("counter");
        assert_ne!(counter, old_counter);
        assert!(root.fibers().contains(old_counter));
        assert_eq!(
            root.request_update(old_counter, Lanes::SYNC),
            Err(Error::UnknownFiber(old_counter))
        );
        assert_eq!(root.request_update(counter, Lanes::SYNC), Ok(()));
    }

    #[derive(Debug)]
    struct Holder(StateCell<i64>);

    impl Component for Holder {
        fn render(&self) -> Node {
            element("span").child(self.0.get()).into()
        }

        fn states(&self) -> Vec<&dyn BindState> {
            vec![&self.0]
        }
    }

    #[test]
    fn unmounting_releases_component_state() {
        let mut root = memory_root(Config::default());
        let cell = StateCell::new("n", 0i64);
        root.render(component(Holder(cell.clone())));
        assert!(cell.is_bound());

        cell.set(5);
        root.flush();
        assert_eq!(markup(root.host()), "<span>5</span>");

        root.render(Node::Empty);
        assert!(!cell.is_bound());
        assert_eq!(cell.get(), 0);
        let result = panic::catch_unwind(AssertUnwindSafe(|| cell.set(1)));
        assert!(result.is_err());
    }

    #[test]
    fn updates_for_unmounted_components_are_dropped() {
        let mut root = memory_root(Config::default());
        let cell = StateCell::new("n", 0i64);
        root.render(component(Holder(cell.clone())));

        cell.set(3);
        root.render(Node::Empty);
        root.flush();
        assert_eq!(root.pending_lanes(), Lanes::empty());
        assert_eq!(markup(root.host()), "");
    }

    #[test]
    fn state_survives_parent_rerenders() {
        let mut root = memory_root(Config::default());
        root.render(component(App));
        let button = root.host().first_by_tag("button").expect("button");
        root.host().dispatch(button, &Event::new("click"));
        root.flush();

        // App creates a fresh counter cell; the value lives in the fiber
        root.render(component(App));
        assert_eq!(
            markup(root.host()),
            "<div><h1>title</h1><button>1</button><footer></footer></div>"
        );
    }

    #[test]
    fn garbage_is_collected_after_commits() {
        let mut root = memory_root(Config::default());
        let list = |n: usize| element("ul").children((0..n).map(|i| element("li").key(i).child(i)));
        root.render(list(4));
        let live = root.fibers().descendants(root.current()).count();
        for n in [4, 2, 6, 4, 4] {
            root.render(list(n));
        }
        assert!(root.fibers().len() <= 2 * live, "{} fibers", root.fibers().len());
    }

    /// Writes state from inside host calls, the way a host-side effect would.
    struct Reentrant {
        inner: MemoryHost,
        hook: Option<StateCell<i64>>,
    }

    impl HostRenderer for Reentrant {
        type Node = NodeId;
        type Error = HostError;

        fn create_element(&mut self, tag: &str) -> Result<NodeId, HostError> {
            self.inner.create_element(tag)
        }
        fn create_text(&mut self, text: &str) -> Result<NodeId, HostError> {
            self.inner.create_text(text)
        }
        fn set_attribute(&mut self, node: &NodeId, name: &str, value: &str) -> Result<(), HostError> {
            self.inner.set_attribute(node, name, value)
        }
        fn remove_attribute(&mut self, node: &NodeId, name: &str) -> Result<(), HostError> {
            self.inner.remove_attribute(node, name)
        }
        fn insert_before(
            &mut self,
            parent: &NodeId,
            node: &NodeId,
            reference: Option<&NodeId>,
        ) -> Result<(), HostError> {
            self.inner.insert_before(parent, node, reference)
        }
        fn remove_node(&mut self, node: &NodeId) -> Result<(), HostError> {
            self.inner.remove_node(node)
        }
        fn add_event_listener(
            &mut self,
            node: &NodeId,
            event: &str,
            handler: &EventHandler,
        ) -> Result<(), HostError> {
            self.inner.add_event_listener(node, event, handler)
        }
        fn remove_event_listener(&mut self, node: &NodeId, event: &str) -> Result<(), HostError> {
            self.inner.remove_event_listener(node, event)
        }
        fn set_text_content(&mut self, node: &NodeId, text: &str) -> Result<(), HostError> {
            if let Some(cell) = self.hook.take() {
                cell.update(|n| n + 1);
            }
            self.inner.set_text_content(node, text)
        }
    }

    #[test]
    fn state_writes_during_commit_are_queued() {
        init_logging();
        let inner = MemoryHost::new();
        let container = inner.root();
        let config = Config::default().with_frame_budget(Duration::from_secs(10));
        let mut root = Root::with_config(Reentrant { inner, hook: None }, container, config);

        let cell = StateCell::new("n", 0i64);
        root.render(component(Holder(cell.clone())));
        root.host_mut().hook = Some(cell.clone());

        cell.set_with_lane(1, Lanes::SYNC);
        root.poll();
        assert_eq!(markup(&root.host().inner), "<span>2</span>");

        let texts: Vec<_> = root
            .host_mut()
            .inner
            .take_ops()
            .into_iter()
            .filter_map(|op| match op {
                HostOp::SetTextContent(_, text) => Some(text),
                _ => None,
            })
            .collect();
        assert_eq!(texts, vec!["1".to_string(), "2".to_string()]);
    }
}
