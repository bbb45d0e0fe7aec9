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

//! Process-wide, tag-indexed registries of schedulers and reactors.
//!
//! Written once at setup, before any journey runs, so user code can reach
//! pools and timer services without threading them through every call.
//! Tests reset the bindings between runs with `detach`.

use std::any::{type_name, TypeId};
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;

use crate::reactor::Reactor;
use crate::scheduler::{AsScheduler, SchedulerRef, ThreadPool};

/// Tag of the scheduler used by plain `go`.
pub struct DefaultTag;

/// Tag of the reactor that serves `Timeout` timers.
pub struct TimeoutTag;

/// Tag of the reactor that serves socket readiness.
pub struct NetworkTag;

static SCHEDULERS: OnceLock<Mutex<HashMap<TypeId, SchedulerRef>>> = OnceLock::new();
static SERVICES: OnceLock<Mutex<HashMap<TypeId, Arc<Reactor>>>> = OnceLock::new();

fn schedulers() -> &'static Mutex<HashMap<TypeId, SchedulerRef>> {
    SCHEDULERS.get_or_init(Default::default)
}

fn services() -> &'static Mutex<HashMap<TypeId, Arc<Reactor>>> {
    SERVICES.get_or_init(Default::default)
}

/// Conversion into a reactor handle for the service registry.
pub trait AsService {
    fn as_service(&self) -> Arc<Reactor>;
}

impl AsService for ThreadPool {
    fn as_service(&self) -> Arc<Reactor> {
        self.reactor()
    }
}

impl AsService for Arc<Reactor> {
    fn as_service(&self) -> Arc<Reactor> {
        self.clone()
    }
}

/// Binding of a type tag to a scheduler.
pub struct SchedulerBinding<Tag> {
    _tag: PhantomData<fn() -> Tag>,
}

/// The scheduler bound to `Tag`.
pub fn scheduler<Tag: 'static>() -> SchedulerBinding<Tag> {
    SchedulerBinding { _tag: PhantomData }
}

impl<Tag: 'static> SchedulerBinding<Tag> {
    pub fn attach<S: AsScheduler>(&self, sched: &S) {
        schedulers()
            .lock()
            .insert(TypeId::of::<Tag>(), sched.as_scheduler());
    }

    pub fn detach(&self) {
        schedulers().lock().remove(&TypeId::of::<Tag>());
    }

    /// Panics when nothing is attached for `Tag`.
    pub fn get(&self) -> SchedulerRef {
        schedulers()
            .lock()
            .get(&TypeId::of::<Tag>())
            .cloned()
            .unwrap_or_else(|| panic!("no scheduler attached for {}", type_name::<Tag>()))
    }
}

/// Binding of a type tag to a reactor service.
pub struct ServiceBinding<Tag> {
    _tag: PhantomData<fn() -> Tag>,
}

/// The reactor service bound to `Tag`.
pub fn service<Tag: 'static>() -> ServiceBinding<Tag> {
    ServiceBinding { _tag: PhantomData }
}

impl<Tag: 'static> ServiceBinding<Tag> {
    pub fn attach<S: AsService>(&self, service: &S) {
        services()
            .lock()
            .insert(TypeId::of::<Tag>(), service.as_service());
    }

    pub fn detach(&self) {
        services().lock().remove(&TypeId::of::<Tag>());
    }

    /// Panics when nothing is attached for `Tag`.
    pub fn get(&self) -> Arc<Reactor> {
        services()
            .lock()
            .get(&TypeId::of::<Tag>())
            .cloned()
            .unwrap_or_else(|| panic!("no service attached for {}", type_name::<Tag>()))
    }
}
