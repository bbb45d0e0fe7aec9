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

//! Task-local garbage collection.
//!
//! Raw heap handles whose lifetime is tied to the owning journey: each
//! allocation registers a deleter, and deleters run in LIFO order when the
//! journey is destroyed.

use crate::journey;

pub(crate) struct Gc {
    deleters: Vec<Box<dyn FnOnce()>>,
}

impl Gc {
    pub(crate) fn new() -> Gc {
        Gc {
            deleters: Vec::new(),
        }
    }

    fn add(&mut self, deleter: Box<dyn FnOnce()>) {
        self.deleters.push(deleter);
    }
}

impl Drop for Gc {
    fn drop(&mut self) {
        while let Some(deleter) = self.deleters.pop() {
            deleter();
        }
    }
}

/// Allocates `value` on the heap, owned by the current journey. The handle
/// stays valid until the journey ends; dereferencing it after that is the
/// caller's bug.
pub fn gcnew<T: Send + 'static>(value: T) -> *mut T {
    let raw = Box::into_raw(Box::new(value));
    unsafe {
        (*journey::current_gc()).add(Box::new(move || drop(Box::from_raw(raw))));
    }
    raw
}
