//! Priority lanes.

use bitflags::bitflags;

bitflags! {
    /// A set of update priorities.
    ///
    /// Each bit is one priority level; a lower bit position means a higher priority. Pending
    /// updates of the same priority coalesce into the same bit.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Lanes: u32 {
        /// Runs render and commit immediately, without yielding.
        const SYNC = 1 << 0;
        /// Continuous input such as pointer moves.
        const INPUT_CONTINUOUS = 1 << 2;
        /// Regular updates, e.g. state writes from event handlers.
        const DEFAULT = 1 << 4;
        /// Deferrable transitions.
        const TRANSITION = 1 << 6;
        /// Work that only runs when nothing else is pending.
        const IDLE = 1 << 29;
    }
}

impl Lanes {
    /// Returns the highest-priority lane in this set (the lowest set bit), or an empty set.
    pub fn highest_priority(self) -> Lanes {
        let bits = self.bits();
        Lanes::from_bits_retain(bits & bits.wrapping_neg())
    }

    /// Returns true if the highest priority in `self` outranks every lane in `other`.
    pub fn outranks(self, other: Lanes) -> bool {
        let own = self.highest_priority().bits();
        let theirs = other.highest_priority().bits();
        own != 0 && (theirs == 0 || own < theirs)
    }

    /// Returns true if this set only contains the sync lane.
    pub fn is_sync(self) -> bool {
        self == Lanes::SYNC
    }
}
