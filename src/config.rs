//! Scheduler configuration.

use crate::lane::Lanes;
use std::time::Duration;

/// Default time budget of one cooperative time slice.
pub const DEFAULT_FRAME_BUDGET: Duration = Duration::from_millis(5);

/// Configuration for a [`Root`](crate::Root).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// How long a time-sliced render may run before yielding back to the host.
    ///
    /// A zero budget yields after every unit of work.
    pub frame_budget: Duration,

    /// Lane used by [`StateCell::set`](crate::StateCell::set).
    pub state_lane: Lanes,

    /// Lane used by [`Root::render`](crate::Root::render).
    pub render_lane: Lanes,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            frame_budget: DEFAULT_FRAME_BUDGET,
            state_lane: Lanes::DEFAULT,
            render_lane: Lanes::SYNC,
        }
    }
}

impl Config {
    pub fn with_frame_budget(mut self, budget: Duration) -> Self {
        self.frame_budget = budget;
        self
    }

    /// Sets the lane for state writes; must be a single lane.
    pub fn with_state_lane(mut self, lane: Lanes) -> Self {
        debug_assert_eq!(lane, lane.highest_priority(), "state lane must be a single lane");
        self.state_lane = lane;
        self
    }

    /// Sets the lane for root renders; must be a single lane.
    pub fn with_render_lane(mut self, lane: Lanes) -> Self {
        debug_assert_eq!(lane, lane.highest_priority(), "render lane must be a single lane");
        self.render_lane = lane;
        self
    }
}
