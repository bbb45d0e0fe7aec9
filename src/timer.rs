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

//! Scoped timeouts.

use std::time::Duration;

use crate::goer::EventError;
use crate::journey;
use crate::reactor::TimerHandle;
use crate::service::{service, TimeoutTag};

/// Scoped timeout over the current journey.
///
/// Arms a timer on the `TimeoutTag` reactor; if it fires before the scope
/// ends it latches `TimedOut` on the journey's goer, to be delivered at the
/// next event checkpoint. `done` is the checkpointed scope exit; a plain
/// drop only cancels the timer and leaves any latched status for the next
/// checkpoint, so the event is never lost. With nested timeouts the
/// innermost scope delivers first.
pub struct Timeout {
    timer: TimerHandle,
}

impl Timeout {
    /// Must be called inside a journey; panics when no `TimeoutTag` service
    /// is attached.
    pub fn new(ms: u64) -> Timeout {
        let goer = journey::goer();
        let reactor = service::<TimeoutTag>().get();
        let timer = reactor.arm_timer(
            Duration::from_millis(ms),
            Box::new(move || {
                goer.timedout();
            }),
        );
        Timeout { timer }
    }

    /// Cancels the timer and delivers any latched event.
    pub fn done(self) -> Result<(), EventError> {
        self.timer.cancel();
        journey::handle_events()
    }
}

impl Drop for Timeout {
    fn drop(&mut self) {
        self.timer.cancel();
    }
}
