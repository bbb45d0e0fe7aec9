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

//! Stackful coroutine runtime with thread pools, teleportation and
//! cooperative cancellation.
//!
//! A task ("journey") runs a plain synchronous handler on its own coroutine
//! stack. Blocking primitives park the stack and hand a resume continuation
//! to some external source — a timer, a peer task, a channel, a socket —
//! which later reschedules the journey on its current scheduler. The same
//! journey can migrate between pools (`teleport`) or be pinned to a
//! serialised lane (`Alone`).
//!
//! ```no_run
//! use journey::{go, scheduler, wait_for_all, DefaultTag, ThreadPool};
//!
//! let pool = ThreadPool::new(4, "workers");
//! scheduler::<DefaultTag>().attach(&pool);
//!
//! go(|| {
//!     println!("hello from a journey");
//! });
//!
//! wait_for_all();
//! scheduler::<DefaultTag>().detach();
//! ```

pub mod channel;
pub mod coro;
mod gc;
pub mod goer;
pub mod journey;
pub mod net;
pub mod options;
pub mod portal;
pub mod reactor;
pub mod scheduler;
pub mod service;
pub mod timer;
pub mod wait;

pub use crate::channel::Channel;
pub use crate::coro::Coro;
pub use crate::gc::gcnew;
pub use crate::goer::{EventError, EventStatus, Goer};
pub use crate::journey::{
    defer, defer_proceed, disable_events, enable_events, go, go_n, go_opts, go_to, goer,
    handle_events, index, is_inside, proceed_handler, teleport, wait_for_all, EventsGuard, Proceed,
};
pub use crate::options::Options;
pub use crate::portal::{portal, Portal, PortalRef};
pub use crate::scheduler::{
    thread_name, thread_number, Alone, AsScheduler, Scheduler, SchedulerRef, Task, ThreadPool,
};
pub use crate::service::{scheduler, service, AsService, DefaultTag, NetworkTag, TimeoutTag};
pub use crate::timer::Timeout;
pub use crate::wait::{go_any_result, go_any_wait, go_wait, Handler, Waiter};

#[cfg(test)]
mod tests;
