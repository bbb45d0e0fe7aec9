// The MIT License (MIT)

// Copyright (c) 2026 Journey Developers

// Permission is hereby granted, free of charge, to any person obtaining a copy of
// this software and associated documentation files (the "Software"), to deal in
// the Software without restriction, including without limitation the rights to
// use, copy, modify, merge, publish, distribute, sublicense, and/or sell copies of
// the Software, and to permit persons to whom the Software is furnished to do so,
// subject to the following conditions:

// The above copyright notice and this permission notice shall be included in all
// copies or substantial portions of the Software.

// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
// IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY, FITNESS
// FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE AUTHORS OR
// COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER LIABILITY, WHETHER
// IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM, OUT OF OR IN
// CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE SOFTWARE.

//! The event cell shared between a journey and external cancellers/timers.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use thiserror::Error;

const NORMAL: u8 = 0;
const CANCELLED: u8 = 1;
const TIMEDOUT: u8 = 2;

/// Event status observed by a journey at its checkpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventStatus {
    Normal,
    Cancelled,
    TimedOut,
}

impl EventStatus {
    fn from_raw(raw: u8) -> EventStatus {
        match raw {
            NORMAL => EventStatus::Normal,
            CANCELLED => EventStatus::Cancelled,
            TIMEDOUT => EventStatus::TimedOut,
            _ => unreachable!("corrupted event status"),
        }
    }

    fn as_raw(self) -> u8 {
        match self {
            EventStatus::Normal => NORMAL,
            EventStatus::Cancelled => CANCELLED,
            EventStatus::TimedOut => TIMEDOUT,
        }
    }
}

/// Error delivered at an event checkpoint when the journey's goer holds a
/// non-normal status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("journey event received: {status:?}")]
pub struct EventError {
    status: EventStatus,
}

impl EventError {
    pub(crate) fn new(status: EventStatus) -> EventError {
        debug_assert!(status != EventStatus::Normal);
        EventError { status }
    }

    /// The latched status that triggered the error.
    pub fn status(&self) -> EventStatus {
        self.status
    }
}

/// Shared atomic cell representing a task's event status.
///
/// Returned by `go`; cloneable and usable from any thread. Only the
/// transitions `Normal -> Cancelled` and `Normal -> TimedOut` exist, and the
/// first writer of an armed period wins.
#[derive(Clone)]
pub struct Goer {
    state: Arc<AtomicU8>,
}

impl Goer {
    pub fn new() -> Goer {
        Goer {
            state: Arc::new(AtomicU8::new(NORMAL)),
        }
    }

    /// Atomically reads the latched status and re-arms the cell to `Normal`.
    pub fn reset(&self) -> EventStatus {
        EventStatus::from_raw(self.state.swap(NORMAL, Ordering::AcqRel))
    }

    /// Requests cancellation. Returns true if this call made the transition.
    pub fn cancel(&self) -> bool {
        self.set(EventStatus::Cancelled)
    }

    /// Marks the task as timed out. Returns true if this call made the
    /// transition.
    pub fn timedout(&self) -> bool {
        self.set(EventStatus::TimedOut)
    }

    fn set(&self, status: EventStatus) -> bool {
        self.state
            .compare_exchange(NORMAL, status.as_raw(), Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

impl Default for Goer {
    fn default() -> Goer {
        Goer::new()
    }
}
