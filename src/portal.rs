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

//! Portals: scoped teleport to a service's home scheduler.

use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::marker::PhantomData;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, OnceLock};
use std::thread;

use log::debug;
use parking_lot::Mutex;

use crate::goer::EventError;
use crate::journey::{self, teleport};
use crate::scheduler::{AsScheduler, SchedulerRef};

/// RAII teleport scope.
///
/// Entering records the journey's current scheduler and teleports to the
/// destination; dropping teleports back. The return trip is checkpoint-free
/// so it also happens on the error-return path; `close` is the checkpointed
/// explicit exit. For panic-safe round trips use `portal::<T>().with`.
pub struct Portal {
    source: SchedulerRef,
}

impl Portal {
    pub fn enter<S: AsScheduler>(destination: &S) -> Result<Portal, EventError> {
        let source = journey::current_scheduler();
        let destination = destination.as_scheduler();
        debug!(
            "[j{}] creating portal {} <=> {}",
            journey::index(),
            source.name(),
            destination.name()
        );
        teleport(&destination)?;
        Ok(Portal { source })
    }

    /// Teleports back with event checkpoints.
    pub fn close(self) -> Result<(), EventError> {
        teleport(&self.source)
        // the drop that follows sees the source as current and is a no-op
    }
}

impl Drop for Portal {
    fn drop(&mut self) {
        if thread::panicking() {
            // unwinding must not cross a context switch; `with` restores the
            // scheduler after catching the panic
            return;
        }
        journey::teleport_quiet(self.source.clone());
    }
}

struct Binding {
    sched: SchedulerRef,
    value: Arc<dyn Any + Send + Sync>,
}

static PORTALS: OnceLock<Mutex<HashMap<TypeId, Binding>>> = OnceLock::new();

fn portals() -> &'static Mutex<HashMap<TypeId, Binding>> {
    PORTALS.get_or_init(Default::default)
}

/// Process-wide binding of a service type to its home scheduler.
pub struct PortalRef<T> {
    _tag: PhantomData<fn() -> T>,
}

/// The portal for service type `T`.
pub fn portal<T: Any + Send + Sync>() -> PortalRef<T> {
    PortalRef { _tag: PhantomData }
}

impl<T: Any + Send + Sync> PortalRef<T> {
    /// Binds `T`'s default instance to its home scheduler.
    pub fn attach<S: AsScheduler>(&self, sched: &S)
    where
        T: Default,
    {
        self.attach_value(sched, T::default());
    }

    /// Binds an explicit instance of `T` to its home scheduler.
    pub fn attach_value<S: AsScheduler>(&self, sched: &S, value: T) {
        portals().lock().insert(
            TypeId::of::<T>(),
            Binding {
                sched: sched.as_scheduler(),
                value: Arc::new(value),
            },
        );
    }

    pub fn detach(&self) {
        portals().lock().remove(&TypeId::of::<T>());
    }

    /// Teleports to `T`'s home scheduler, runs `f` there and teleports back.
    /// The return trip happens on the normal, error and panic exits; a
    /// caught panic resumes once the journey is home again.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> Result<R, EventError> {
        let (sched, value) = {
            let map = portals().lock();
            let binding = map
                .get(&TypeId::of::<T>())
                .unwrap_or_else(|| panic!("no portal attached for {}", type_name::<T>()));
            (binding.sched.clone(), binding.value.clone())
        };
        let value = value
            .downcast::<T>()
            .expect("portal value has an unexpected type");

        let scope = Portal::enter(&sched)?;
        let result = panic::catch_unwind(AssertUnwindSafe(|| f(&value)));
        let closed = scope.close();
        match result {
            Ok(result) => {
                closed?;
                Ok(result)
            }
            Err(payload) => {
                if let Err(err) = closed {
                    journey::relatch(&err);
                }
                panic::resume_unwind(payload)
            }
        }
    }
}
