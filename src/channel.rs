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

//! Unbounded MPMC channel with coroutine-blocking receive.
//!
//! Senders never block: a value goes straight into a parked receiver's slot
//! when one is waiting, otherwise onto the FIFO queue. A single mutex covers
//! the queue, the parked receivers and the closed flag, so wakeups cannot be
//! lost. Parked receivers are served first come, first served.

use std::collections::VecDeque;
use std::mem;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::goer::EventError;
use crate::journey::{self, handle_events, park_proceed, Proceed};

struct ParkedReceiver<T> {
    slot: Mutex<Option<T>>,
    proceed: Mutex<Option<Proceed>>,
}

impl<T> ParkedReceiver<T> {
    fn resume(&self) {
        // the channel mutex is only released after the hook is installed,
        // so a popped receiver always has one
        let proceed = self
            .proceed
            .lock()
            .take()
            .expect("parked receiver has no resume hook");
        proceed();
    }
}

struct State<T> {
    queue: VecDeque<T>,
    parked: VecDeque<Arc<ParkedReceiver<T>>>,
    closed: bool,
}

struct Inner<T> {
    state: Mutex<State<T>>,
}

/// Unbounded multi-producer/multi-consumer channel.
///
/// Cloning the handle shares the channel. `put` is usable from any thread;
/// `get` may park and therefore must run inside a journey when the channel
/// is empty.
pub struct Channel<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for Channel<T> {
    fn clone(&self) -> Channel<T> {
        Channel {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Send + 'static> Channel<T> {
    pub fn new() -> Channel<T> {
        Channel {
            inner: Arc::new(Inner {
                state: Mutex::new(State {
                    queue: VecDeque::new(),
                    parked: VecDeque::new(),
                    closed: false,
                }),
            }),
        }
    }

    /// Never blocks. Delivers directly to a parked receiver when one is
    /// waiting. Putting into a closed channel enqueues silently; the value
    /// is still drained by later `get`s.
    pub fn put(&self, value: T) {
        let mut state = self.inner.state.lock();
        if let Some(receiver) = state.parked.pop_front() {
            drop(state);
            *receiver.slot.lock() = Some(value);
            receiver.resume();
        } else {
            state.queue.push_back(value);
        }
    }

    /// Receives the next value; `Ok(None)` is end-of-stream (closed and
    /// drained). Parks the current journey while the channel is empty and
    /// open, so it must run inside a journey in that case.
    pub fn get(&self) -> Result<Option<T>, EventError> {
        if journey::is_inside() {
            handle_events()?;
        }
        let mut state = self.inner.state.lock();
        if let Some(value) = state.queue.pop_front() {
            return Ok(Some(value));
        }
        if state.closed {
            return Ok(None);
        }

        let receiver = Arc::new(ParkedReceiver {
            slot: Mutex::new(None),
            proceed: Mutex::new(None),
        });
        state.parked.push_back(receiver.clone());
        // Keep the channel locked across the park: the lock is released only
        // once the resume hook is installed, inside the continuation on the
        // outgoing thread, so a sender cannot pop a receiver it cannot wake.
        mem::forget(state);
        let inner = self.inner.clone();
        let hook = receiver.clone();
        park_proceed(move |proceed| {
            *hook.proceed.lock() = Some(proceed);
            unsafe { inner.state.force_unlock() };
        })?;

        let value = receiver.slot.lock().take();
        Ok(value)
    }

    /// Marks the channel closed and wakes every parked receiver with
    /// end-of-stream.
    pub fn close(&self) {
        let mut state = self.inner.state.lock();
        if state.closed {
            return;
        }
        state.closed = true;
        let parked: Vec<_> = state.parked.drain(..).collect();
        drop(state);
        for receiver in parked {
            receiver.resume();
        }
    }

    /// Re-opens a closed channel.
    pub fn open(&self) {
        self.inner.state.lock().closed = false;
    }

    pub fn empty(&self) -> bool {
        self.inner.state.lock().queue.is_empty()
    }

    /// Blocking iterator over the channel until end-of-stream. An event
    /// delivered while parked is re-latched on the journey's goer and ends
    /// the iteration, so it surfaces at the next checkpoint.
    pub fn iter(&self) -> Iter<'_, T> {
        Iter { channel: self }
    }
}

impl<T: Send + 'static> Default for Channel<T> {
    fn default() -> Channel<T> {
        Channel::new()
    }
}

pub struct Iter<'a, T> {
    channel: &'a Channel<T>,
}

impl<'a, T: Send + 'static> Iterator for Iter<'a, T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        match self.channel.get() {
            Ok(value) => value,
            Err(err) => {
                journey::relatch(&err);
                None
            }
        }
    }
}

impl<'a, T: Send + 'static> IntoIterator for &'a Channel<T> {
    type Item = T;
    type IntoIter = Iter<'a, T>;

    fn into_iter(self) -> Iter<'a, T> {
        self.iter()
    }
}
