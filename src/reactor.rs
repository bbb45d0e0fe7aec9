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

//! The reactor: one thread multiplexing timers and socket readiness.
//!
//! A continuation handed to the reactor is one-shot; when its timer fires or
//! its socket becomes ready, the continuation runs on the reactor thread.
//! Continuations are expected to do no more than post a resume onto some
//! scheduler.

use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use log::{debug, error, warn};
use mio::event::Source;
use mio::{Events, Interest, Poll, Registry, Token, Waker};
use parking_lot::Mutex;
use slab::Slab;

use crate::scheduler::{spawn_worker, Task};

const WAKER: Token = Token(usize::MAX);

struct TimerShared {
    cancelled: AtomicBool,
    callback: Mutex<Option<Task>>,
}

/// Handle to an armed timer; cancelling is advisory (a cancelled entry stays
/// in the heap until its deadline but never fires its callback).
pub struct TimerHandle {
    shared: Arc<TimerShared>,
}

impl TimerHandle {
    pub(crate) fn cancel(&self) {
        self.shared.cancelled.store(true, Ordering::Release);
        self.shared.callback.lock().take();
    }
}

struct TimerEntry {
    when: Instant,
    seq: u64,
    shared: Arc<TimerShared>,
}

// Reversed ordering so the BinaryHeap surfaces the earliest deadline.
impl PartialEq for TimerEntry {
    fn eq(&self, other: &TimerEntry) -> bool {
        self.when == other.when && self.seq == other.seq
    }
}

impl Eq for TimerEntry {}

impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &TimerEntry) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimerEntry {
    fn cmp(&self, other: &TimerEntry) -> CmpOrdering {
        other
            .when
            .cmp(&self.when)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// One poll thread serving timers and I/O continuations. Owned by a
/// `ThreadPool` and shared through the service registry.
pub struct Reactor {
    registry: Registry,
    waker: Waker,
    io: Mutex<Slab<Option<Task>>>,
    timers: Mutex<BinaryHeap<TimerEntry>>,
    seq: AtomicU64,
    stop: AtomicBool,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl Reactor {
    pub(crate) fn start(name: &str) -> Arc<Reactor> {
        let poll = Poll::new().expect("failed to create reactor poll");
        let waker = Waker::new(poll.registry(), WAKER).expect("failed to create reactor waker");
        let registry = poll
            .registry()
            .try_clone()
            .expect("failed to clone reactor registry");

        let reactor = Arc::new(Reactor {
            registry,
            waker,
            io: Mutex::new(Slab::new()),
            timers: Mutex::new(BinaryHeap::new()),
            seq: AtomicU64::new(0),
            stop: AtomicBool::new(false),
            thread: Mutex::new(None),
        });

        let runner = reactor.clone();
        let handle = spawn_worker(&format!("{}-reactor", name), 0, move || runner.run(poll));
        *reactor.thread.lock() = Some(handle);
        reactor
    }

    pub(crate) fn shutdown(&self) {
        self.stop.store(true, Ordering::Release);
        self.wake();
        if let Some(handle) = self.thread.lock().take() {
            let _ = handle.join();
        }
    }

    /// Arms a one-shot timer. The callback runs on the reactor thread once
    /// `after` has elapsed, unless the handle cancels it first.
    pub(crate) fn arm_timer(&self, after: Duration, callback: Task) -> TimerHandle {
        let shared = Arc::new(TimerShared {
            cancelled: AtomicBool::new(false),
            callback: Mutex::new(Some(callback)),
        });
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        let earliest = {
            let mut timers = self.timers.lock();
            timers.push(TimerEntry {
                when: Instant::now() + after,
                seq,
                shared: shared.clone(),
            });
            timers.peek().map_or(false, |entry| entry.seq == seq)
        };
        if earliest {
            // the poll timeout shrank
            self.wake();
        }
        TimerHandle { shared }
    }

    /// Reserves a readiness slot. The token stays owned by the caller (one
    /// per socket) until `release_io`.
    pub(crate) fn alloc_token(&self) -> Token {
        Token(self.io.lock().insert(None))
    }

    /// Arms a one-shot readiness wait on an allocated token. On failure the
    /// continuation is handed back so the caller can still resume itself.
    pub(crate) fn arm_io(
        &self,
        source: &mut dyn Source,
        token: Token,
        first: bool,
        interest: Interest,
        callback: Task,
    ) -> Result<(), (io::Error, Task)> {
        {
            let mut io = self.io.lock();
            let slot = io.get_mut(token.0).expect("unknown reactor token");
            debug_assert!(slot.is_none(), "overlapping waits on one reactor token");
            *slot = Some(callback);
        }
        let registered = if first {
            self.registry.register(source, token, interest)
        } else {
            self.registry.reregister(source, token, interest)
        };
        if let Err(err) = registered {
            let callback = self
                .io
                .lock()
                .get_mut(token.0)
                .and_then(|slot| slot.take())
                .expect("reactor slot emptied without an event");
            return Err((err, callback));
        }
        Ok(())
    }

    pub(crate) fn release_io(&self, source: &mut dyn Source, token: Token) {
        let _ = self.registry.deregister(source);
        let mut io = self.io.lock();
        if io.contains(token.0) {
            io.remove(token.0);
        }
    }

    fn wake(&self) {
        if let Err(err) = self.waker.wake() {
            warn!("reactor wake failed: {}", err);
        }
    }

    fn next_timeout(&self) -> Option<Duration> {
        self.timers
            .lock()
            .peek()
            .map(|entry| entry.when.saturating_duration_since(Instant::now()))
    }

    fn fire_timers(&self) {
        loop {
            let entry = {
                let mut timers = self.timers.lock();
                if timers.peek().map_or(true, |entry| entry.when > Instant::now()) {
                    return;
                }
                timers.pop().expect("due timer disappeared")
            };
            if entry.shared.cancelled.load(Ordering::Acquire) {
                continue;
            }
            let callback = entry.shared.callback.lock().take();
            if let Some(callback) = callback {
                callback();
            }
        }
    }

    fn run(&self, mut poll: Poll) {
        let mut events = Events::with_capacity(256);
        loop {
            let timeout = self.next_timeout();
            if let Err(err) = poll.poll(&mut events, timeout) {
                if err.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                error!("reactor poll failed: {}", err);
                break;
            }
            if self.stop.load(Ordering::Acquire) {
                break;
            }
            for event in events.iter() {
                if event.token() == WAKER {
                    continue;
                }
                let callback = {
                    self.io
                        .lock()
                        .get_mut(event.token().0)
                        .and_then(|slot| slot.take())
                };
                match callback {
                    Some(callback) => callback(),
                    None => debug!("spurious readiness for {:?}", event.token()),
                }
            }
            self.fire_timers();
        }
    }
}
