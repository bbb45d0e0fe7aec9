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

//! Schedulers: the thread pool and the serialising strand.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, OnceLock, Weak};
use std::thread::{self, JoinHandle};

use log::{debug, error};
use parking_lot::{Condvar, Mutex};

use crate::reactor::Reactor;

/// Unit of work accepted by a scheduler.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Capability to accept a handler and execute it on some owned worker later.
pub trait Scheduler: Send + Sync {
    fn schedule(&self, task: Task);

    fn name(&self) -> &str {
        "<unknown>"
    }
}

/// Shared handle to a scheduler, as pinned by journeys.
pub type SchedulerRef = Arc<dyn Scheduler>;

/// Conversion into a shared scheduler handle. Implemented by `ThreadPool`,
/// `Alone` and `SchedulerRef` itself so the free functions accept any of
/// them.
pub trait AsScheduler {
    fn as_scheduler(&self) -> SchedulerRef;
}

impl AsScheduler for SchedulerRef {
    fn as_scheduler(&self) -> SchedulerRef {
        self.clone()
    }
}

thread_local! {
    static THREAD_NAME: RefCell<String> = RefCell::new(String::from("main"));
    static THREAD_NUMBER: Cell<usize> = Cell::new(0);
}

/// Name of the pool that owns the current thread ("main" outside any pool).
pub fn thread_name() -> String {
    THREAD_NAME.with(|name| name.borrow().clone())
}

/// One-based worker index within its pool (0 outside any pool).
pub fn thread_number() -> usize {
    THREAD_NUMBER.with(|number| number.get())
}

pub(crate) fn panic_message(err: &Box<dyn Any + Send>) -> &str {
    if let Some(s) = err.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = err.downcast_ref::<String>() {
        s
    } else {
        "Box<Any>"
    }
}

/// Spawns a named worker thread carrying the thread identity TLS.
pub(crate) fn spawn_worker<F>(name: &str, number: usize, f: F) -> JoinHandle<()>
where
    F: FnOnce() + Send + 'static,
{
    let worker_name = name.to_string();
    thread::Builder::new()
        .name(format!("{}#{}", name, number + 1))
        .spawn(move || {
            THREAD_NAME.with(|name| *name.borrow_mut() = worker_name);
            THREAD_NUMBER.with(|n| n.set(number + 1));
            debug!("{}#{}: thread created", thread_name(), thread_number());
            f();
            debug!("{}#{}: thread ended", thread_name(), thread_number());
        })
        .expect("failed to spawn worker thread")
}

struct PoolState {
    queue: VecDeque<Task>,
    // keep-alive: while present, an empty queue just parks the workers.
    // `wait` removes it; the worker that observes the drain reinstates it.
    sentinel: bool,
    to_stop: bool,
}

struct PoolCore {
    name: String,
    state: Mutex<PoolState>,
    work_cond: Condvar,
    drained: Condvar,
    reactor: OnceLock<Arc<Reactor>>,
}

impl Scheduler for PoolCore {
    fn schedule(&self, task: Task) {
        self.state.lock().queue.push_back(task);
        self.work_cond.notify_one();
    }

    fn name(&self) -> &str {
        &self.name
    }
}

fn worker_loop(core: &PoolCore) {
    let mut state = core.state.lock();
    loop {
        if let Some(task) = state.queue.pop_front() {
            drop(state);
            if let Err(err) = panic::catch_unwind(AssertUnwindSafe(move || task())) {
                error!("{}: task panicked: {}", core.name, panic_message(&err));
            }
            state = core.state.lock();
            continue;
        }
        if state.to_stop {
            break;
        }
        if !state.sentinel {
            state.sentinel = true;
            core.drained.notify_all();
        }
        core.work_cond.wait(&mut state);
    }
}

/// N worker threads draining one FIFO run queue.
///
/// Dropping the pool stops and joins the workers (pending tasks are drained
/// first) and shuts down the pool's reactor if one was started.
pub struct ThreadPool {
    core: Arc<PoolCore>,
    threads: Vec<JoinHandle<()>>,
}

impl ThreadPool {
    pub fn new(threads: usize, name: &str) -> ThreadPool {
        assert!(threads >= 1, "thread pool needs at least one thread");
        let core = Arc::new(PoolCore {
            name: name.to_string(),
            state: Mutex::new(PoolState {
                queue: VecDeque::new(),
                sentinel: true,
                to_stop: false,
            }),
            work_cond: Condvar::new(),
            drained: Condvar::new(),
            reactor: OnceLock::new(),
        });
        let handles = (0..threads)
            .map(|number| {
                let core = core.clone();
                spawn_worker(name, number, move || worker_loop(&core))
            })
            .collect();
        debug!("thread pool {} created with {} threads", name, threads);
        ThreadPool {
            core,
            threads: handles,
        }
    }

    pub fn name(&self) -> &str {
        &self.core.name
    }

    /// Blocks the caller until the pool observes its queue drained at least
    /// once since this call began, then re-arms the keep-alive.
    pub fn wait(&self) {
        let mut state = self.core.state.lock();
        state.sentinel = false;
        // wake parked workers so one of them can observe the drain
        self.core.work_cond.notify_all();
        while !state.sentinel {
            self.core.drained.wait(&mut state);
        }
    }

    /// The pool's reactor, started on first use. Serves timers and socket
    /// readiness for journeys that attached this pool as a service.
    pub(crate) fn reactor(&self) -> Arc<Reactor> {
        self.core
            .reactor
            .get_or_init(|| Reactor::start(&self.core.name))
            .clone()
    }
}

impl AsScheduler for ThreadPool {
    fn as_scheduler(&self) -> SchedulerRef {
        self.core.clone()
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        if let Some(reactor) = self.core.reactor.get() {
            reactor.shutdown();
        }
        self.core.state.lock().to_stop = true;
        self.core.work_cond.notify_all();
        for handle in self.threads.drain(..) {
            let _ = handle.join();
        }
        debug!("thread pool {} stopped", self.core.name);
    }
}

struct AloneState {
    queue: VecDeque<Task>,
    running: bool,
}

struct AloneCore {
    name: String,
    backing: SchedulerRef,
    state: Mutex<AloneState>,
    myself: Weak<AloneCore>,
}

impl AloneCore {
    fn post(&self) {
        let core = self.myself.upgrade().expect("strand core is gone");
        self.backing.schedule(Box::new(move || core.run_one()));
    }

    fn run_one(self: Arc<AloneCore>) {
        let task = self
            .state
            .lock()
            .queue
            .pop_front()
            .expect("strand scheduled without pending work");
        if let Err(err) = panic::catch_unwind(AssertUnwindSafe(move || task())) {
            error!("{}: task panicked: {}", self.name, panic_message(&err));
        }
        let more = {
            let mut state = self.state.lock();
            if state.queue.is_empty() {
                state.running = false;
                false
            } else {
                true
            }
        };
        if more {
            self.post();
        }
    }
}

impl Scheduler for AloneCore {
    fn schedule(&self, task: Task) {
        {
            let mut state = self.state.lock();
            state.queue.push_back(task);
            if state.running {
                return;
            }
            state.running = true;
        }
        self.post();
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Serialised execution on top of a backing scheduler: handlers posted here
/// run one at a time, in submission order, on the backing pool's threads.
pub struct Alone {
    core: Arc<AloneCore>,
}

impl Alone {
    pub fn new<S: AsScheduler>(backing: &S, name: &str) -> Alone {
        let backing = backing.as_scheduler();
        let core = Arc::new_cyclic(|myself| AloneCore {
            name: name.to_string(),
            backing,
            state: Mutex::new(AloneState {
                queue: VecDeque::new(),
                running: false,
            }),
            myself: myself.clone(),
        });
        Alone { core }
    }

    pub fn name(&self) -> &str {
        &self.core.name
    }
}

impl AsScheduler for Alone {
    fn as_scheduler(&self) -> SchedulerRef {
        self.core.clone()
    }
}
