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

//! Composite waits: all, any, any-result and the reusable `Waiter`.
//!
//! Completion is tracked by shared reference-counted state whose last drop
//! (or first winner) fires the parent's one-shot resume continuation.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use log::debug;
use parking_lot::Mutex;

use crate::goer::EventError;
use crate::journey::{self, defer_proceed, go, handle_events, proceed_handler, Proceed};

/// Boxed task handler accepted by the composite waits.
pub type Handler = Box<dyn FnOnce() + Send + 'static>;

struct Group {
    proceed: Mutex<Option<Proceed>>,
}

impl Group {
    fn disarm(&self) {
        self.proceed.lock().take();
    }
}

impl Drop for Group {
    fn drop(&mut self) {
        if let Some(proceed) = self.proceed.get_mut().take() {
            proceed();
        }
    }
}

/// Spawns every handler as a child journey on the default scheduler and
/// parks until all of them finish, success or failure alike. Resumes the
/// parent exactly once.
pub fn go_wait(handlers: Vec<Handler>) -> Result<(), EventError> {
    defer_proceed(move |proceed| {
        let group = Arc::new(Group {
            proceed: Mutex::new(Some(proceed)),
        });
        for handler in handlers {
            let group = group.clone();
            go(move || {
                let _group = group;
                handler();
            });
        }
    })
}

struct Race {
    hits: AtomicUsize,
    proceed: Mutex<Option<Proceed>>,
}

/// Spawns every handler and parks until the first one finishes; returns the
/// winner's index. Later completions are dropped. Losers are not cancelled;
/// callers that need that share a `Goer` across the handlers.
pub fn go_any_wait(handlers: Vec<Handler>) -> Result<usize, EventError> {
    assert!(!handlers.is_empty(), "go_any_wait needs at least one handler");
    let n = handlers.len();
    let winner = Arc::new(AtomicUsize::new(usize::MAX));

    let out = winner.clone();
    defer_proceed(move |proceed| {
        let race = Arc::new(Race {
            hits: AtomicUsize::new(0),
            proceed: Mutex::new(Some(proceed)),
        });
        for (i, handler) in handlers.into_iter().enumerate() {
            let race = race.clone();
            let out = out.clone();
            go(move || {
                handler();
                if race.hits.fetch_add(1, Ordering::AcqRel) == 0 {
                    out.store(i, Ordering::Release);
                    if let Some(proceed) = race.proceed.lock().take() {
                        proceed();
                    }
                }
            });
        }
    })?;

    let index = winner.load(Ordering::Acquire);
    assert!(index < n, "go_any_wait resumed without a winner");
    Ok(index)
}

struct Counter<T> {
    hits: AtomicUsize,
    slot: Arc<Mutex<Option<T>>>,
    proceed: Mutex<Option<Proceed>>,
}

impl<T> Counter<T> {
    fn try_proceed(&self, result: Option<T>) {
        if self.hits.fetch_add(1, Ordering::AcqRel) == 0 {
            if let Some(value) = result {
                *self.slot.lock() = Some(value);
            }
            if let Some(proceed) = self.proceed.lock().take() {
                proceed();
            }
        }
    }
}

impl<T> Drop for Counter<T> {
    fn drop(&mut self) {
        // all children done without a hit: resume the parent empty-handed
        self.try_proceed(None);
    }
}

/// Spawns every handler and parks until the first one that returns `Some`;
/// returns that value, or `None` once all children returned `None`.
pub fn go_any_result<T, F>(handlers: Vec<F>) -> Result<Option<T>, EventError>
where
    T: Send + 'static,
    F: FnOnce() -> Option<T> + Send + 'static,
{
    assert!(
        !handlers.is_empty(),
        "go_any_result needs at least one handler"
    );
    let slot: Arc<Mutex<Option<T>>> = Arc::new(Mutex::new(None));

    let inner = slot.clone();
    defer_proceed(move |proceed| {
        let counter = Arc::new(Counter {
            hits: AtomicUsize::new(0),
            slot: inner,
            proceed: Mutex::new(Some(proceed)),
        });
        for handler in handlers {
            let counter = counter.clone();
            go(move || {
                if let Some(value) = handler() {
                    counter.try_proceed(Some(value));
                }
            });
        }
    })?;

    let result = slot.lock().take();
    Ok(result)
}

/// Movable, reusable all-of wait.
///
/// `go` attaches a child to the current generation; `wait` parks until that
/// generation drains and re-arms. Dropping the waiter disarms the pending
/// resume, so forgotten children cannot wake an unrelated park.
pub struct Waiter {
    group: Option<Arc<Group>>,
}

impl Waiter {
    /// Must be created inside a journey.
    pub fn new() -> Waiter {
        Waiter {
            group: Some(Waiter::make_group()),
        }
    }

    fn make_group() -> Arc<Group> {
        Arc::new(Group {
            proceed: Mutex::new(Some(proceed_handler())),
        })
    }

    /// Adds a child journey to the current generation.
    pub fn go<F>(&self, handler: F) -> &Waiter
    where
        F: FnOnce() + Send + 'static,
    {
        let group = self
            .group
            .as_ref()
            .expect("waiter is disarmed")
            .clone();
        go(move || {
            let _group = group;
            handler();
        });
        self
    }

    /// Parks until all children of the current generation finish, then
    /// re-arms. Returns immediately when there is nothing to wait for.
    pub fn wait(&mut self) -> Result<(), EventError> {
        // entry checkpoint before the group changes hands: once the
        // continuation owns it, it must run
        handle_events()?;
        {
            let group = self.group.as_ref().expect("waiter is disarmed");
            if Arc::strong_count(group) == 1 {
                debug!("[j{}] everything done, nothing to wait for", journey::index());
                return Ok(());
            }
        }
        let group = self.group.take().expect("waiter is disarmed");
        // release the parent's reference while parked; the last child (or
        // this drop, when the children already finished) fires the resume
        let parked = journey::park_then(move || drop(group));
        self.group = Some(Waiter::make_group());
        parked
    }
}

impl Default for Waiter {
    fn default() -> Waiter {
        Waiter::new()
    }
}

impl Drop for Waiter {
    fn drop(&mut self) {
        if let Some(group) = self.group.take() {
            group.disarm();
        }
    }
}
