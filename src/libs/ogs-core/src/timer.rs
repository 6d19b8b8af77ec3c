//! Bounded-retry timer wheel
//!
//! One [`TimerWheel`] is owned by an event loop and serves every procedure
//! timer of that loop (T3513, T3560, ...). Timers are kept in a min-heap keyed
//! by deadline, so thousands of UEs cost one heap entry each instead of one
//! task per timer.
//!
//! Each timer is a [`RetryTimer`]: it fires every `interval`; the first
//! `max_retry` expiries are reported as [`TimerEvent::Expired`] (the caller
//! retransmits), the next one as [`TimerEvent::Exhausted`] (the caller gives
//! up), after which the timer is gone.
//!
//! Expiry processing and [`TimerWheel::stop`] both take `&mut self`, so a
//! stopped timer can never be reported afterwards.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::fmt;
use std::time::{Duration, Instant};

/// Handle returned by [`TimerWheel::start`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerHandle(u64);

impl TimerHandle {
    /// Raw handle value
    pub fn id(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TimerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "timer#{}", self.0)
    }
}

/// Retry bookkeeping for one running timer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryTimer {
    /// Time between expiries
    pub interval: Duration,
    /// Number of expiries reported before giving up
    pub max_retry: u32,
    /// Expiries seen so far
    pub expire_times: u32,
}

impl RetryTimer {
    /// Create a new retry timer
    pub fn new(interval: Duration, max_retry: u32) -> Self {
        Self {
            interval,
            max_retry,
            expire_times: 0,
        }
    }

    /// Record one expiry. Returns `true` while retries remain.
    pub fn expire(&mut self) -> bool {
        self.expire_times += 1;
        self.expire_times <= self.max_retry
    }
}

/// Event produced by [`TimerWheel::poll_expired`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimerEvent<T> {
    /// Timer fired and may be retried; `expire_times` starts at 1
    Expired {
        handle: TimerHandle,
        token: T,
        expire_times: u32,
    },
    /// Retries are used up; the timer has been removed
    Exhausted { handle: TimerHandle, token: T },
}

impl<T> TimerEvent<T> {
    /// Handle of the timer this event belongs to
    pub fn handle(&self) -> TimerHandle {
        match self {
            Self::Expired { handle, .. } | Self::Exhausted { handle, .. } => *handle,
        }
    }

    /// Token given at start
    pub fn token(&self) -> &T {
        match self {
            Self::Expired { token, .. } | Self::Exhausted { token, .. } => token,
        }
    }
}

struct TimerSlot<T> {
    timer: RetryTimer,
    deadline: Instant,
    token: T,
}

/// Min-heap of retry timers owned by a single event loop
pub struct TimerWheel<T: Clone> {
    heap: BinaryHeap<Reverse<(Instant, u64)>>,
    timers: HashMap<u64, TimerSlot<T>>,
    next_id: u64,
}

impl<T: Clone + fmt::Debug> TimerWheel<T> {
    /// Create an empty wheel
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            timers: HashMap::new(),
            next_id: 1,
        }
    }

    /// Start a timer firing every `interval`, giving up after `max_retry`
    /// retries
    pub fn start(&mut self, interval: Duration, max_retry: u32, token: T) -> TimerHandle {
        self.start_at(Instant::now(), interval, max_retry, token)
    }

    /// Same as [`start`](Self::start) with an explicit reference time
    pub fn start_at(
        &mut self,
        now: Instant,
        interval: Duration,
        max_retry: u32,
        token: T,
    ) -> TimerHandle {
        let id = self.next_id;
        self.next_id += 1;

        let deadline = now + interval;
        log::debug!(
            "timer#{} started: interval={:?} max_retry={} token={:?}",
            id, interval, max_retry, token
        );
        self.timers.insert(
            id,
            TimerSlot {
                timer: RetryTimer::new(interval, max_retry),
                deadline,
                token,
            },
        );
        self.heap.push(Reverse((deadline, id)));
        TimerHandle(id)
    }

    /// Stop a running timer.
    ///
    /// Stopping a timer that already stopped or exhausted breaks the caller's
    /// contract; it is logged and reported as `false` without side effects.
    pub fn stop(&mut self, handle: TimerHandle) -> bool {
        match self.timers.remove(&handle.0) {
            Some(slot) => {
                log::debug!(
                    "{} stopped after {} expiries",
                    handle, slot.timer.expire_times
                );
                true
            }
            None => {
                log::error!("{} stopped while not running", handle);
                false
            }
        }
    }

    /// Check whether a timer is still running
    pub fn is_running(&self, handle: TimerHandle) -> bool {
        self.timers.contains_key(&handle.0)
    }

    /// Expiry count of a running timer
    pub fn expire_times(&self, handle: TimerHandle) -> Option<u32> {
        self.timers.get(&handle.0).map(|slot| slot.timer.expire_times)
    }

    /// Number of running timers
    pub fn len(&self) -> usize {
        self.timers.len()
    }

    /// Check if no timer is running
    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }

    /// Earliest pending deadline, for sizing the event loop's sleep
    pub fn next_deadline(&mut self) -> Option<Instant> {
        while let Some(Reverse((deadline, id))) = self.heap.peek().copied() {
            match self.timers.get(&id) {
                Some(slot) if slot.deadline == deadline => return Some(deadline),
                // Stopped or rescheduled
                _ => {
                    self.heap.pop();
                }
            }
        }
        None
    }

    /// Collect every expiry due now
    pub fn poll_expired(&mut self) -> Vec<TimerEvent<T>> {
        self.poll_expired_at(Instant::now())
    }

    /// Collect every expiry due at `now`, in deadline order
    pub fn poll_expired_at(&mut self, now: Instant) -> Vec<TimerEvent<T>> {
        let mut events = Vec::new();

        while let Some(Reverse((deadline, id))) = self.heap.peek().copied() {
            if deadline > now {
                break;
            }
            self.heap.pop();

            let Some(slot) = self.timers.get_mut(&id) else {
                continue;
            };
            if slot.deadline != deadline {
                continue;
            }

            let handle = TimerHandle(id);
            if slot.timer.expire() {
                slot.deadline = deadline + slot.timer.interval;
                self.heap.push(Reverse((slot.deadline, id)));
                events.push(TimerEvent::Expired {
                    handle,
                    token: slot.token.clone(),
                    expire_times: slot.timer.expire_times,
                });
            } else if let Some(slot) = self.timers.remove(&id) {
                log::debug!(
                    "{} exhausted after {} retries",
                    handle, slot.timer.max_retry
                );
                events.push(TimerEvent::Exhausted {
                    handle,
                    token: slot.token,
                });
            }
        }

        events
    }
}

impl<T: Clone + fmt::Debug> Default for TimerWheel<T> {
    fn default() -> Self {
        Self::new()
    }
}
