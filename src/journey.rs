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

//! The journey: the per-task execution record.
//!
//! A journey owns one coroutine, pins a current scheduler and carries the
//! event cell. All of the user API flows through the journey that is
//! currently executing on this thread; the free functions below panic when
//! called from outside one.
//!
//! The record is a leaked box. After every switch-out the coro guard makes
//! the single ownership decision: a pending deferred continuation means the
//! journey is parked and survives (the continuation runs on the outgoing
//! thread); no continuation means the journey is destroyed.

use std::cell::Cell;
use std::panic::{self, AssertUnwindSafe};
use std::ptr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use log::{debug, error};

use crate::coro::{self, Coro};
use crate::gc::Gc;
use crate::goer::{EventError, EventStatus, Goer};
use crate::options::Options;
use crate::scheduler::{panic_message, AsScheduler, SchedulerRef};
use crate::service::{scheduler, DefaultTag};

static CREATED: AtomicUsize = AtomicUsize::new(0);
static DESTROYED: AtomicUsize = AtomicUsize::new(0);

thread_local!(static CURRENT: Cell<*mut Journey> = Cell::new(ptr::null_mut()));

/// One-shot continuation that resumes a parked journey on its current
/// scheduler. Obtained through `proceed_handler` or `defer_proceed` and
/// invokable from any thread.
pub type Proceed = Box<dyn FnOnce() + Send + 'static>;

pub(crate) struct Journey {
    goer: Goer,
    events_allowed: bool,
    sched: SchedulerRef,
    coro: Coro,
    deferred: Option<Box<dyn FnOnce()>>,
    index: usize,
    pub(crate) gc: Gc,
}

#[derive(Clone, Copy)]
struct JourneyPtr(*mut Journey);

// The pointee is only touched by whoever currently owns the journey's
// execution: the running coroutine, the guard on the outgoing thread, or a
// scheduled resume. These never overlap.
unsafe impl Send for JourneyPtr {}

enum GuardOp {
    Start(Box<dyn FnOnce()>),
    Resume,
}

fn enter_guard(jp: JourneyPtr, op: GuardOp) {
    let j = jp.0;
    let prev = CURRENT.with(|c| c.replace(j));
    match op {
        GuardOp::Start(entry) => unsafe { (*j).coro.start(entry) },
        GuardOp::Resume => unsafe { (*j).coro.resume() },
    }
    // switched out: parked or finished. The current pointer stays set while
    // the continuation runs, so it may still take a proceed_handler.
    let deferred = unsafe { (*j).deferred.take() };
    match deferred {
        Some(continuation) => continuation(),
        None => unsafe {
            drop(Box::from_raw(j));
            DESTROYED.fetch_add(1, Ordering::AcqRel);
        },
    }
    CURRENT.with(|c| c.set(prev));
}

impl Journey {
    fn create<F>(handler: F, sched: SchedulerRef, opts: Options) -> Goer
    where
        F: FnOnce() + Send + 'static,
    {
        let index = CREATED.fetch_add(1, Ordering::AcqRel) + 1;
        let j = Box::into_raw(Box::new(Journey {
            goer: Goer::new(),
            events_allowed: true,
            sched,
            coro: Coro::new(opts.stack_size),
            deferred: None,
            index,
            gc: Gc::new(),
        }));
        let goer = unsafe { (*j).goer.clone() };
        let jp = JourneyPtr(j);
        unsafe { (*j).sched.clone() }.schedule(Box::new(move || {
            enter_guard(
                jp,
                GuardOp::Start(Box::new(move || {
                    debug!("[j{}] started", index);
                    if let Err(err) = panic::catch_unwind(AssertUnwindSafe(handler)) {
                        error!("[j{}] panic in journey: {}", index, panic_message(&err));
                    }
                    debug!("[j{}] ended", index);
                })),
            );
        }));
        goer
    }

    fn proceed(j: *mut Journey) {
        let jp = JourneyPtr(j);
        let sched = unsafe { (*j).sched.clone() };
        sched.schedule(Box::new(move || enter_guard(jp, GuardOp::Resume)));
    }

    fn proceed_handler(j: *mut Journey) -> Proceed {
        let jp = JourneyPtr(j);
        Box::new(move || {
            let jp = jp;
            Journey::proceed(jp.0)
        })
    }

    unsafe fn handle_events(j: *mut Journey) -> Result<(), EventError> {
        if !(*j).events_allowed || thread::panicking() {
            return Ok(());
        }
        match (*j).goer.reset() {
            EventStatus::Normal => Ok(()),
            status => Err(EventError::new(status)),
        }
    }

    /// Parks the coroutine with `continuation` and no checkpoints. The
    /// continuation runs on the outgoing thread once the coroutine has
    /// actually yielded.
    unsafe fn park(j: *mut Journey, continuation: Box<dyn FnOnce()>) {
        debug_assert!((*j).deferred.is_none(), "journey parked twice");
        (*j).deferred = Some(continuation);
        coro::yield_now();
    }

    unsafe fn defer(j: *mut Journey, continuation: Box<dyn FnOnce()>) -> Result<(), EventError> {
        Journey::handle_events(j)?;
        Journey::park(j, continuation);
        Journey::handle_events(j)
    }

    unsafe fn teleport0(j: *mut Journey, dest: SchedulerRef) {
        if Arc::ptr_eq(&(*j).sched, &dest) {
            debug!(
                "[j{}] teleport {}: same destination, skipping",
                (*j).index,
                dest.name()
            );
            return;
        }
        debug!(
            "[j{}] teleport {} -> {}",
            (*j).index,
            (*j).sched.name(),
            dest.name()
        );
        (*j).sched = dest;
        let proceed = Journey::proceed_handler(j);
        Journey::park(j, Box::new(move || proceed()));
    }
}

fn current() -> *mut Journey {
    let j = CURRENT.with(|c| c.get());
    assert!(!j.is_null(), "no journey is currently executing");
    j
}

pub(crate) fn current_gc() -> *mut Gc {
    unsafe { &mut (*current()).gc as *mut Gc }
}

/// Whether the calling code executes inside a journey.
#[inline]
pub fn is_inside() -> bool {
    CURRENT.with(|c| !c.get().is_null())
}

/// Creates a sibling journey running `handler` on the default scheduler.
pub fn go<F>(handler: F) -> Goer
where
    F: FnOnce() + Send + 'static,
{
    Journey::create(handler, scheduler::<DefaultTag>().get(), Options::default())
}

/// Creates a journey pinned to scheduler `sched`.
pub fn go_to<F, S>(handler: F, sched: &S) -> Goer
where
    F: FnOnce() + Send + 'static,
    S: AsScheduler,
{
    Journey::create(handler, sched.as_scheduler(), Options::default())
}

/// Creates a journey with explicit spawn options.
pub fn go_opts<F, S>(handler: F, sched: &S, opts: Options) -> Goer
where
    F: FnOnce() + Send + 'static,
    S: AsScheduler,
{
    Journey::create(handler, sched.as_scheduler(), opts)
}

/// Creates `n` independent journeys running `handler` on the default
/// scheduler. For `n > 1` a single parent journey spawns the children.
pub fn go_n<F>(n: usize, handler: F)
where
    F: Fn() + Clone + Send + 'static,
{
    assert!(n >= 1, "go_n needs at least one journey");
    if n == 1 {
        go(handler);
        return;
    }
    go(move || {
        for _ in 0..n {
            go(handler.clone());
        }
    });
}

/// Monotonic index of the current journey.
pub fn index() -> usize {
    unsafe { (*current()).index }
}

/// The current journey's event cell.
pub fn goer() -> Goer {
    unsafe { (*current()).goer.clone() }
}

/// The scheduler the current journey is pinned to.
pub fn current_scheduler() -> SchedulerRef {
    unsafe { (*current()).sched.clone() }
}

/// Stores `continuation`, yields, and runs it on the outgoing thread.
/// Checkpoints on entry and exit.
pub fn defer<F>(continuation: F) -> Result<(), EventError>
where
    F: FnOnce() + 'static,
{
    unsafe { Journey::defer(current(), Box::new(continuation)) }
}

/// `defer` that hands the continuation a one-shot resume closure for the
/// current journey.
pub fn defer_proceed<F>(continuation: F) -> Result<(), EventError>
where
    F: FnOnce(Proceed) + 'static,
{
    let j = current();
    let jp = JourneyPtr(j);
    unsafe {
        Journey::defer(
            j,
            Box::new(move || continuation(Journey::proceed_handler(jp.0))),
        )
    }
}

/// Checkpoint-free park used by primitives that run their own entry
/// checkpoint before arming any state. Performs the exit checkpoint only.
pub(crate) fn park_proceed<F>(continuation: F) -> Result<(), EventError>
where
    F: FnOnce(Proceed) + 'static,
{
    let j = current();
    let jp = JourneyPtr(j);
    unsafe {
        Journey::park(
            j,
            Box::new(move || continuation(Journey::proceed_handler(jp.0))),
        );
        Journey::handle_events(j)
    }
}

/// Checkpoint-free park with a plain continuation; exit checkpoint only.
/// Unlike `defer`, the continuation is guaranteed to run, so callers may
/// hand it state whose drop has side effects.
pub(crate) fn park_then<F>(continuation: F) -> Result<(), EventError>
where
    F: FnOnce() + 'static,
{
    let j = current();
    unsafe {
        Journey::park(j, Box::new(continuation));
        Journey::handle_events(j)
    }
}

/// One-shot closure that posts "resume this journey on its current
/// scheduler". Valid to invoke from any thread, at most once per park.
pub fn proceed_handler() -> Proceed {
    unsafe { Journey::proceed_handler(current()) }
}

/// Reads and resets the goer; a latched non-normal status becomes an error.
/// Delivery is suppressed while events are disabled or the thread is
/// panicking, and the status stays latched for the next checkpoint.
pub fn handle_events() -> Result<(), EventError> {
    unsafe { Journey::handle_events(current()) }
}

/// Suppresses event delivery at checkpoints until `enable_events`. The
/// entry itself is a checkpoint.
pub fn disable_events() -> Result<(), EventError> {
    let j = current();
    unsafe {
        Journey::handle_events(j)?;
        (*j).events_allowed = false;
    }
    Ok(())
}

/// Re-enables event delivery; the exit itself is a checkpoint, so a status
/// latched while suppressed is delivered here.
pub fn enable_events() -> Result<(), EventError> {
    let j = current();
    unsafe {
        (*j).events_allowed = true;
        Journey::handle_events(j)
    }
}

/// Re-latches a delivered event on the current journey's goer so it is
/// observed again at the next checkpoint.
pub(crate) fn relatch(err: &EventError) {
    let goer = goer();
    match err.status() {
        EventStatus::Cancelled => {
            goer.cancel();
        }
        EventStatus::TimedOut => {
            goer.timedout();
        }
        EventStatus::Normal => {}
    }
}

/// Migrates the remaining execution of the current journey to `dest`;
/// a no-op when already there. Checkpoints on entry and exit.
pub fn teleport<S>(dest: &S) -> Result<(), EventError>
where
    S: AsScheduler,
{
    let j = current();
    unsafe {
        Journey::handle_events(j)?;
        Journey::teleport0(j, dest.as_scheduler());
        Journey::handle_events(j)
    }
}

/// Checkpoint-free teleport for unwind-safe scope exits (portals).
pub(crate) fn teleport_quiet(dest: SchedulerRef) {
    unsafe { Journey::teleport0(current(), dest) }
}

/// Blocks the calling thread until every journey created so far has been
/// destroyed. Test and shutdown helper; must not be called from a journey.
pub fn wait_for_all() {
    assert!(!is_inside(), "wait_for_all would deadlock inside a journey");
    debug!("waiting for journeys to complete");
    while CREATED.load(Ordering::Acquire) != DESTROYED.load(Ordering::Acquire) {
        thread::yield_now();
    }
    debug!("waiting for journeys completed");
}

/// Lexically suppresses event delivery; re-enables on drop. Statuses
/// latched while suppressed are delivered at `finish` or at the next
/// checkpoint after the drop.
pub struct EventsGuard {
    _priv: (),
}

impl EventsGuard {
    pub fn new() -> Result<EventsGuard, EventError> {
        disable_events()?;
        Ok(EventsGuard { _priv: () })
    }

    /// Checkpointed explicit exit.
    pub fn finish(self) -> Result<(), EventError> {
        enable_events()
    }
}

impl Drop for EventsGuard {
    fn drop(&mut self) {
        if is_inside() {
            unsafe { (*current()).events_allowed = true };
        }
    }
}
