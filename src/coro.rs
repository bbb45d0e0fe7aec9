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

//! Stackful coroutine primitive.
//!
//! A `Coro` is pure control flow: a private stack, an entry handler and the
//! suspend/resume pair. It knows nothing about scheduling; the journey layer
//! decides when and where a coroutine is resumed.

use std::any::Any;
use std::cell::Cell;
use std::panic::{self, AssertUnwindSafe};
use std::ptr;

use context::stack::ProtectedFixedSizeStack;
use context::{Context, Transfer};
use log::error;

thread_local!(static CURRENT: Cell<*mut Coro> = Cell::new(ptr::null_mut()));

/// Switch from the currently running coroutine back to the context saved by
/// the most recent `resume`.
///
/// Panics when called outside a coroutine.
pub fn yield_now() {
    let coro = CURRENT.with(|c| c.get());
    assert!(!coro.is_null(), "yield_now() outside of a coroutine");
    unsafe { (*coro).yield0() }
}

/// Whether the calling code executes inside a coroutine.
#[inline]
pub fn is_inside() -> bool {
    CURRENT.with(|c| !c.get().is_null())
}

/// A stackful coroutine.
///
/// Created inactive; `start` runs a handler on the private stack until it
/// yields or returns. Whoever holds the coroutine has the sole right to
/// `resume` it, and it never runs on two threads at once.
pub struct Coro {
    started: bool,
    running: bool,
    // While the coroutine is suspended this holds its parked context;
    // while it runs, the caller's return context. The two sides alternate
    // ownership at every switch.
    context: Option<Context>,
    entry: Option<Box<dyn FnOnce()>>,
    panic: Option<Box<dyn Any + Send>>,
    stack: ProtectedFixedSizeStack,
}

// A coroutine only ever runs on one thread at a time; the raw context may
// migrate with it between resumes.
unsafe impl Send for Coro {}

extern "C" fn trampoline(t: Transfer) -> ! {
    let coro = t.data as *mut Coro;
    unsafe {
        (*coro).context = Some(t.context);
        (*coro).started = true;
        let entry = (*coro).entry.take().expect("coroutine entry is missing");
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(entry)) {
            (*coro).panic = Some(payload);
        }
        (*coro).started = false;
        let back = (*coro).context.take().expect("caller context is missing");
        back.resume(0);
    }
    unreachable!("resumed a finished coroutine");
}

impl Coro {
    /// Creates an inactive coroutine with a guarded stack of `stack_size`
    /// bytes (rounded up to whole pages).
    pub fn new(stack_size: usize) -> Coro {
        let stack = ProtectedFixedSizeStack::new(stack_size)
            .expect("failed to allocate coroutine stack");
        Coro {
            started: false,
            running: false,
            context: None,
            entry: None,
            panic: None,
            stack,
        }
    }

    /// Starts the coroutine with `f` and runs it until the first yield or
    /// until it returns. Legal only when not started.
    pub fn start<F>(&mut self, f: F)
    where
        F: FnOnce() + 'static,
    {
        assert!(
            !self.is_started(),
            "trying to start an already started coroutine"
        );
        self.entry = Some(Box::new(f));
        self.context = Some(unsafe { Context::new(&self.stack, trampoline) });
        self.jump();
    }

    /// Continues execution after a yield. Legal only when started and not
    /// running. A panic captured inside the coroutine is re-raised here.
    pub fn resume(&mut self) {
        assert!(self.started, "cannot resume a coroutine that is not started");
        assert!(!self.running, "cannot resume a coroutine that is running");
        self.jump();
    }

    /// True between the first switch-in and the final switch-out.
    #[inline]
    pub fn is_started(&self) -> bool {
        self.started || self.running
    }

    fn jump(&mut self) {
        let ctx = self.context.take().expect("coroutine context is missing");
        let me = self as *mut Coro;
        let prev = CURRENT.with(|c| c.replace(me));
        self.running = true;
        let t = unsafe { ctx.resume(me as usize) };
        self.running = false;
        CURRENT.with(|c| c.set(prev));
        if self.started {
            // parked at a yield; keep the context for the next resume
            self.context = Some(t.context);
        }
        if let Some(payload) = self.panic.take() {
            panic::resume_unwind(payload);
        }
    }

    fn yield0(&mut self) {
        let back = self.context.take().expect("caller context is missing");
        let t = unsafe { back.resume(0) };
        self.context = Some(t.context);
    }
}

impl Drop for Coro {
    fn drop(&mut self) {
        if self.is_started() {
            error!("destroying a started coroutine; its stack will not unwind");
        }
    }
}

#[cfg(test)]
mod test {
    use std::cell::Cell;
    use std::panic::{self, AssertUnwindSafe};
    use std::rc::Rc;

    use super::*;
    use crate::options::DEFAULT_STACK_SIZE;

    #[test]
    fn test_coro_basic() {
        let steps = Rc::new(Cell::new(0));
        let inner = steps.clone();

        let mut coro = Coro::new(DEFAULT_STACK_SIZE);
        coro.start(move || {
            inner.set(1);
            yield_now();
            inner.set(2);
            yield_now();
            inner.set(3);
        });

        assert_eq!(steps.get(), 1);
        assert!(coro.is_started());
        coro.resume();
        assert_eq!(steps.get(), 2);
        coro.resume();
        assert_eq!(steps.get(), 3);
        assert!(!coro.is_started());
    }

    #[test]
    fn test_runs_to_completion_without_yield() {
        let done = Rc::new(Cell::new(false));
        let inner = done.clone();

        let mut coro = Coro::new(DEFAULT_STACK_SIZE);
        coro.start(move || inner.set(true));

        assert!(done.get());
        assert!(!coro.is_started());
    }

    #[test]
    fn test_panic_is_captured_and_rethrown() {
        let mut coro = Coro::new(256 * 1024);
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            coro.start(|| panic!("inside coroutine"));
        }));
        assert!(result.is_err());
        assert!(!coro.is_started());
    }

    #[test]
    fn test_yield_outside_panics() {
        assert!(panic::catch_unwind(yield_now).is_err());
    }

    #[test]
    fn test_double_start_panics() {
        let mut coro = Coro::new(DEFAULT_STACK_SIZE);
        coro.start(|| {
            yield_now();
        });
        let result = panic::catch_unwind(AssertUnwindSafe(|| coro.start(|| {})));
        assert!(result.is_err());
        coro.resume();
        assert!(!coro.is_started());
    }

    #[test]
    fn test_resume_on_another_thread() {
        let mut coro = Box::new(Coro::new(DEFAULT_STACK_SIZE));
        coro.start(|| {
            yield_now();
        });
        assert!(coro.is_started());

        std::thread::spawn(move || {
            coro.resume();
            assert!(!coro.is_started());
        })
        .join()
        .unwrap();
    }

    #[test]
    fn test_is_inside() {
        assert!(!is_inside());
        let mut coro = Coro::new(DEFAULT_STACK_SIZE);
        coro.start(|| {
            assert!(is_inside());
            yield_now();
            assert!(is_inside());
        });
        assert!(!is_inside());
        coro.resume();
    }
}
