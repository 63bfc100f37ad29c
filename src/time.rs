//! Millisecond time base used for every timeout on the link
//!
//! Both sides only need a free-running millisecond counter. The counter is allowed to wrap; all
//! arithmetic is done with wrapping subtraction.

/// Free-running millisecond counter, typically incremented by a 1 ms system tick
pub trait Millis {
    /// Current counter value
    fn now_ms(&self) -> u32;
}

impl<F: Fn() -> u32> Millis for F {
    #[inline(always)]
    fn now_ms(&self) -> u32 {
        self()
    }
}

/// True once at least `duration` ms have elapsed since `start`
#[inline]
pub fn is_time_up(now: u32, start: u32, duration: u32) -> bool {
    now.wrapping_sub(start) >= duration
}

/// A bound on a wait, measured from the moment it was started
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Deadline {
    start: u32,
    duration: u32,
}

impl Deadline {
    /// Start a deadline `duration` ms from now
    #[inline]
    pub fn start<C: Millis>(clock: &C, duration: u32) -> Self {
        Deadline {
            start: clock.now_ms(),
            duration,
        }
    }

    /// Counter value when the deadline was started
    #[inline]
    pub fn started_at(&self) -> u32 {
        self.start
    }

    /// Whether the bound has been reached
    #[inline]
    pub fn expired<C: Millis>(&self, clock: &C) -> bool {
        is_time_up(clock.now_ms(), self.start, self.duration)
    }
}
