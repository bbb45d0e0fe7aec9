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

//! Scenario tests over the whole runtime.
//!
//! The scheduler and service registries are process-wide, so every test
//! takes the serialisation lock, attaches its pools, waits for its journeys
//! and detaches again before the pools drop.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::{Mutex, MutexGuard};

use crate::goer::{EventError, EventStatus};
use crate::journey::{
    defer_proceed, disable_events, enable_events, go, go_n, go_to, goer, handle_events, teleport,
    wait_for_all, EventsGuard,
};
use crate::net::{TcpListener, TcpStream};
use crate::portal::{portal, Portal};
use crate::scheduler::{thread_name, Alone, AsScheduler, ThreadPool};
use crate::service::{scheduler, service, DefaultTag, NetworkTag, TimeoutTag};
use crate::timer::Timeout;
use crate::wait::{go_any_result, go_any_wait, go_wait, Handler, Waiter};
use crate::{gcnew, Channel};

static LOCK: Mutex<()> = Mutex::new(());

fn init() -> MutexGuard<'static, ()> {
    let _ = env_logger::builder().is_test(true).try_init();
    LOCK.lock()
}

fn sleep_ms(ms: u64) {
    thread::sleep(Duration::from_millis(ms));
}

struct AttachedPool {
    pool: ThreadPool,
}

impl AttachedPool {
    fn new(threads: usize, name: &str) -> AttachedPool {
        let pool = ThreadPool::new(threads, name);
        scheduler::<DefaultTag>().attach(&pool);
        AttachedPool { pool }
    }
}

impl Drop for AttachedPool {
    fn drop(&mut self) {
        wait_for_all();
        scheduler::<DefaultTag>().detach();
    }
}

#[test]
fn teleport_switches_pools() {
    let _lock = init();
    let tp1 = AttachedPool::new(1, "tp1");
    let tp2 = ThreadPool::new(1, "tp2");

    let ok = Arc::new(AtomicBool::new(false));
    let ok2 = ok.clone();
    let dest = tp2.as_scheduler();
    go(move || {
        assert_eq!(thread_name(), "tp1");
        teleport(&dest).unwrap();
        assert_eq!(thread_name(), "tp2");
        ok2.store(true, Ordering::Release);
    });

    wait_for_all();
    assert!(ok.load(Ordering::Acquire));
    drop(tp1);
}

#[test]
fn teleport_to_same_pool_is_noop() {
    let _lock = init();
    let tp1 = AttachedPool::new(3, "tp1");
    let tp2 = ThreadPool::new(2, "tp2");

    let hops = Arc::new(AtomicUsize::new(0));
    let hops2 = hops.clone();
    let s1 = tp1.pool.as_scheduler();
    let s2 = tp2.as_scheduler();
    go(move || {
        assert_eq!(thread_name(), "tp1");
        teleport(&s2).unwrap();
        assert_eq!(thread_name(), "tp2");
        teleport(&s1).unwrap();
        assert_eq!(thread_name(), "tp1");
        teleport(&s1).unwrap();
        assert_eq!(thread_name(), "tp1");
        hops2.store(3, Ordering::Release);
    });

    wait_for_all();
    assert_eq!(hops.load(Ordering::Acquire), 3);
    drop(tp1);
}

#[test]
fn go_wait_resumes_after_all_children() {
    let _lock = init();
    let tp = AttachedPool::new(3, "wait");

    let done = Arc::new(AtomicUsize::new(0));
    let ok = Arc::new(AtomicBool::new(false));
    let (d1, d2, after, ok2) = (done.clone(), done.clone(), done.clone(), ok.clone());
    go(move || {
        let children: Vec<Handler> = vec![
            Box::new(move || {
                sleep_ms(150);
                d1.fetch_add(1, Ordering::AcqRel);
            }),
            Box::new(move || {
                sleep_ms(300);
                d2.fetch_add(1, Ordering::AcqRel);
            }),
        ];
        go_wait(children).unwrap();
        assert_eq!(after.load(Ordering::Acquire), 2);
        ok2.store(true, Ordering::Release);
    });

    wait_for_all();
    assert!(ok.load(Ordering::Acquire));
    drop(tp);
}

#[test]
fn go_wait_with_no_children_returns() {
    let _lock = init();
    let tp = AttachedPool::new(1, "wait");

    let ok = Arc::new(AtomicBool::new(false));
    let ok2 = ok.clone();
    go(move || {
        go_wait(Vec::new()).unwrap();
        ok2.store(true, Ordering::Release);
    });

    wait_for_all();
    assert!(ok.load(Ordering::Acquire));
    drop(tp);
}

#[test]
fn waiter_is_reusable() {
    let _lock = init();
    let tp = AttachedPool::new(3, "wait");

    let done = Arc::new(AtomicUsize::new(0));
    let ok = Arc::new(AtomicBool::new(false));
    let (d1, d2, ok2) = (done.clone(), done.clone(), ok.clone());
    let observed = done.clone();
    go(move || {
        let mut waiter = Waiter::new();
        waiter.wait().unwrap();
        waiter
            .go(move || {
                sleep_ms(150);
                d1.fetch_add(1, Ordering::AcqRel);
            })
            .go(move || {
                sleep_ms(250);
                d2.fetch_add(1, Ordering::AcqRel);
            });
        waiter.wait().unwrap();
        assert_eq!(observed.load(Ordering::Acquire), 2);
        waiter.wait().unwrap();
        ok2.store(true, Ordering::Release);
    });

    wait_for_all();
    assert!(ok.load(Ordering::Acquire));
    drop(tp);
}

#[test]
fn go_any_wait_returns_first_finisher() {
    let _lock = init();
    let tp = AttachedPool::new(3, "any");

    let winner = Arc::new(AtomicUsize::new(usize::MAX));
    let winner2 = winner.clone();
    go(move || {
        let index = go_any_wait(vec![
            Box::new(|| sleep_ms(500)) as Handler,
            Box::new(|| sleep_ms(50)) as Handler,
        ])
        .unwrap();
        winner2.store(index, Ordering::Release);
    });

    wait_for_all();
    assert_eq!(winner.load(Ordering::Acquire), 1);
    drop(tp);
}

#[test]
fn go_any_result_returns_fastest_some() {
    let _lock = init();
    let tp = AttachedPool::new(3, "result");

    let out = Arc::new(Mutex::new(None));
    let out2 = out.clone();
    go(move || {
        let handlers: Vec<fn() -> Option<i32>> = vec![
            || {
                sleep_ms(400);
                Some(400)
            },
            || {
                sleep_ms(50);
                Some(50)
            },
        ];
        let result = go_any_result(handlers).unwrap();
        *out2.lock() = Some(result);
    });

    wait_for_all();
    assert_eq!(*out.lock(), Some(Some(50)));
    drop(tp);
}

#[test]
fn go_any_result_on_single_thread_pool() {
    let _lock = init();
    let tp = AttachedPool::new(1, "result");

    let out = Arc::new(Mutex::new(None));
    let out2 = out.clone();
    go(move || {
        // one worker: children run sequentially, so the first wins
        let handlers: Vec<fn() -> Option<i32>> = vec![
            || {
                sleep_ms(100);
                Some(100)
            },
            || {
                sleep_ms(10);
                Some(10)
            },
        ];
        let result = go_any_result(handlers).unwrap();
        *out2.lock() = Some(result);
    });

    wait_for_all();
    assert_eq!(*out.lock(), Some(Some(100)));
    drop(tp);
}

#[test]
fn go_any_result_skips_nones() {
    let _lock = init();
    let tp = AttachedPool::new(3, "result");

    let out = Arc::new(Mutex::new(None));
    let out2 = out.clone();
    go(move || {
        let handlers: Vec<fn() -> Option<i32>> = vec![
            || {
                sleep_ms(50);
                None
            },
            || {
                sleep_ms(300);
                Some(300)
            },
        ];
        let result = go_any_result(handlers).unwrap();
        *out2.lock() = Some(result);
    });

    wait_for_all();
    assert_eq!(*out.lock(), Some(Some(300)));
    drop(tp);
}

#[test]
fn go_any_result_all_nones_is_none() {
    let _lock = init();
    let tp = AttachedPool::new(3, "result");

    let out = Arc::new(Mutex::new(Some(Some(0))));
    let out2 = out.clone();
    go(move || {
        let handlers: Vec<fn() -> Option<i32>> = vec![|| None, || None];
        let result = go_any_result(handlers).unwrap();
        *out2.lock() = Some(result);
    });

    wait_for_all();
    assert_eq!(*out.lock(), Some(None));
    drop(tp);
}

#[test]
fn alone_serialises_journeys() {
    let _lock = init();
    let tp = AttachedPool::new(3, "tp");
    let alone = Alone::new(&tp.pool, "alone");

    let busy = Arc::new(AtomicBool::new(false));
    let order = Arc::new(Mutex::new(Vec::new()));
    let lane = alone.as_scheduler();
    let ok = Arc::new(AtomicBool::new(false));
    let ok2 = ok.clone();
    go(move || {
        for i in 0..3 {
            let busy = busy.clone();
            let order = order.clone();
            go_to(
                move || {
                    assert!(!busy.swap(true, Ordering::AcqRel), "strand overlapped");
                    order.lock().push(i);
                    sleep_ms(50);
                    busy.store(false, Ordering::Release);
                },
                &lane,
            );
        }
        teleport(&lane).unwrap();
        ok2.store(true, Ordering::Release);
    });

    wait_for_all();
    assert!(ok.load(Ordering::Acquire));
    drop(tp);
}

#[test]
fn timeout_delivers_at_next_checkpoint() {
    let _lock = init();
    let tp = AttachedPool::new(3, "tp");
    service::<TimeoutTag>().attach(&tp.pool);

    let status = Arc::new(Mutex::new(None));
    let status2 = status.clone();
    go(move || {
        let timeout = Timeout::new(100);
        handle_events().unwrap();
        sleep_ms(250);
        let delivered = handle_events();
        drop(timeout);
        *status2.lock() = Some(delivered.map_err(|err| err.status()));
    });

    wait_for_all();
    assert_eq!(*status.lock(), Some(Err(EventStatus::TimedOut)));
    service::<TimeoutTag>().detach();
    drop(tp);
}

#[test]
fn timeout_done_is_the_scope_checkpoint() {
    let _lock = init();
    let tp = AttachedPool::new(3, "tp");
    service::<TimeoutTag>().attach(&tp.pool);

    let results = Arc::new(Mutex::new(Vec::new()));
    let results2 = results.clone();
    go(move || {
        // expires: work took longer than the budget
        let timeout = Timeout::new(100);
        sleep_ms(250);
        results2
            .lock()
            .push(timeout.done().map_err(|err| err.status()));

        // does not expire: cancelled before firing
        let timeout = Timeout::new(60_000);
        sleep_ms(20);
        results2
            .lock()
            .push(timeout.done().map_err(|err| err.status()));
    });

    wait_for_all();
    assert_eq!(
        *results.lock(),
        vec![Err(EventStatus::TimedOut), Ok(())]
    );
    service::<TimeoutTag>().detach();
    drop(tp);
}

#[test]
fn inner_timeout_delivers_first() {
    let _lock = init();
    let tp = AttachedPool::new(3, "tp");
    service::<TimeoutTag>().attach(&tp.pool);

    let results = Arc::new(Mutex::new(Vec::new()));
    let results2 = results.clone();
    go(move || {
        let outer = Timeout::new(60_000);
        let inner = Timeout::new(50);
        sleep_ms(200);
        results2
            .lock()
            .push(inner.done().map_err(|err| err.status()));
        results2
            .lock()
            .push(outer.done().map_err(|err| err.status()));
    });

    wait_for_all();
    assert_eq!(*results.lock(), vec![Err(EventStatus::TimedOut), Ok(())]);
    service::<TimeoutTag>().detach();
    drop(tp);
}

#[test]
fn cancel_is_delivered_at_first_checkpoint() {
    let _lock = init();
    let tp = AttachedPool::new(2, "tp");

    let gate = Arc::new(AtomicBool::new(false));
    let status = Arc::new(Mutex::new(None));
    let (gate2, status2) = (gate.clone(), status.clone());
    let child = go(move || {
        while !gate2.load(Ordering::Acquire) {
            thread::yield_now();
        }
        *status2.lock() = Some(handle_events().map_err(|err| err.status()));
    });

    assert!(child.cancel());
    gate.store(true, Ordering::Release);

    wait_for_all();
    assert_eq!(*status.lock(), Some(Err(EventStatus::Cancelled)));
    drop(tp);
}

#[test]
fn suppressed_events_stay_latched() {
    let _lock = init();
    let tp = AttachedPool::new(1, "tp");

    let results = Arc::new(Mutex::new(Vec::new()));
    let results2 = results.clone();
    go(move || {
        disable_events().unwrap();
        goer().cancel();
        // suppressed: the status stays latched
        results2.lock().push(handle_events().map_err(|e| e.status()));
        results2.lock().push(enable_events().map_err(|e| e.status()));

        let guard = EventsGuard::new().unwrap();
        goer().cancel();
        results2.lock().push(handle_events().map_err(|e| e.status()));
        results2.lock().push(guard.finish().map_err(|e| e.status()));
    });

    wait_for_all();
    assert_eq!(
        *results.lock(),
        vec![
            Ok(()),
            Err(EventStatus::Cancelled),
            Ok(()),
            Err(EventStatus::Cancelled),
        ]
    );
    drop(tp);
}

#[test]
fn defer_proceed_round_trip() {
    let _lock = init();
    let tp = AttachedPool::new(2, "tp");

    let ok = Arc::new(AtomicBool::new(false));
    let ok2 = ok.clone();
    go(move || {
        defer_proceed(|proceed| {
            // fire the resume from a foreign thread
            thread::spawn(move || {
                sleep_ms(50);
                proceed();
            });
        })
        .unwrap();
        ok2.store(true, Ordering::Release);
    });

    wait_for_all();
    assert!(ok.load(Ordering::Acquire));
    drop(tp);
}

#[test]
fn go_n_spawns_n_journeys() {
    let _lock = init();
    let tp = AttachedPool::new(3, "tp");

    let count = Arc::new(AtomicUsize::new(0));
    let count2 = count.clone();
    go_n(5, move || {
        count2.fetch_add(1, Ordering::AcqRel);
    });

    wait_for_all();
    assert_eq!(count.load(Ordering::Acquire), 5);
    drop(tp);
}

#[test]
fn channel_drains_queue_after_close() {
    let _lock = init();
    let tp = AttachedPool::new(1, "tp");

    let ch = Channel::new();
    ch.put(1);
    ch.put(2);
    ch.put(3);
    ch.close();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen2 = seen.clone();
    let receiver = ch.clone();
    go(move || {
        seen2.lock().extend(receiver.iter());
    });

    wait_for_all();
    assert_eq!(*seen.lock(), vec![1, 2, 3]);
    drop(tp);
}

#[test]
fn channel_delivers_to_parked_receiver() {
    let _lock = init();
    let tp = AttachedPool::new(2, "tp");

    let ch = Channel::new();
    let got = Arc::new(Mutex::new(None));
    let got2 = got.clone();
    let receiver = ch.clone();
    go(move || {
        *got2.lock() = receiver.get().unwrap();
    });

    sleep_ms(100); // let the receiver park
    ch.put(7);

    wait_for_all();
    assert_eq!(*got.lock(), Some(7));
    drop(tp);
}

#[test]
fn channel_close_wakes_parked_receivers() {
    let _lock = init();
    let tp = AttachedPool::new(3, "tp");

    let ch: Channel<i32> = Channel::new();
    let woken = Arc::new(AtomicUsize::new(0));
    for _ in 0..3 {
        let receiver = ch.clone();
        let woken = woken.clone();
        go(move || {
            assert_eq!(receiver.get().unwrap(), None);
            woken.fetch_add(1, Ordering::AcqRel);
        });
    }

    sleep_ms(100); // let all three park
    ch.close();

    wait_for_all();
    assert_eq!(woken.load(Ordering::Acquire), 3);
    drop(tp);
}

#[test]
fn channel_conserves_values_across_receivers() {
    let _lock = init();
    let tp = AttachedPool::new(4, "tp");

    let ch = Channel::new();
    let seen = Arc::new(Mutex::new(Vec::new()));
    for _ in 0..3 {
        let receiver = ch.clone();
        let seen = seen.clone();
        go(move || {
            while let Some(value) = receiver.get().unwrap() {
                seen.lock().push(value);
            }
        });
    }

    for value in 0..300 {
        ch.put(value);
    }
    // receivers may still be draining; close only ends the stream
    ch.close();

    wait_for_all();
    let mut got = seen.lock().clone();
    got.sort_unstable();
    assert_eq!(got, (0..300).collect::<Vec<_>>());
    drop(tp);
}

#[derive(Default)]
struct Probe {
    hits: AtomicUsize,
}

#[test]
fn portal_call_through_runs_on_home_scheduler() {
    let _lock = init();
    let tp1 = AttachedPool::new(1, "tp1");
    let tp2 = ThreadPool::new(1, "tp2");
    portal::<Probe>().attach(&tp2);

    let hits = Arc::new(AtomicUsize::new(0));
    let hits2 = hits.clone();
    go(move || {
        assert_eq!(thread_name(), "tp1");
        let hit = portal::<Probe>()
            .with(|probe| {
                assert_eq!(thread_name(), "tp2");
                probe.hits.fetch_add(1, Ordering::AcqRel) + 1
            })
            .unwrap();
        assert_eq!(thread_name(), "tp1");
        hits2.store(hit, Ordering::Release);
    });

    wait_for_all();
    assert_eq!(hits.load(Ordering::Acquire), 1);
    portal::<Probe>().detach();
    drop(tp1);
}

#[test]
fn portal_returns_home_after_error() {
    let _lock = init();
    let tp1 = AttachedPool::new(1, "tp1");
    let tp2 = ThreadPool::new(1, "tp2");

    let ok = Arc::new(AtomicBool::new(false));
    let ok2 = ok.clone();
    let dest = tp2.as_scheduler();
    go(move || {
        let failed: Result<(), EventError> = (|| {
            let _portal = Portal::enter(&dest)?;
            assert_eq!(thread_name(), "tp2");
            goer().cancel();
            handle_events()?;
            unreachable!("cancel was latched");
        })();
        assert_eq!(
            failed.map_err(|err| err.status()),
            Err(EventStatus::Cancelled)
        );
        // the scope drop teleported us back on the error path
        assert_eq!(thread_name(), "tp1");
        ok2.store(true, Ordering::Release);
    });

    wait_for_all();
    assert!(ok.load(Ordering::Acquire));
    drop(tp1);
}

#[test]
fn portal_returns_home_after_panic() {
    let _lock = init();
    let tp1 = AttachedPool::new(1, "tp1");
    let tp2 = ThreadPool::new(1, "tp2");
    portal::<Probe>().attach(&tp2);

    let ok = Arc::new(AtomicBool::new(false));
    let ok2 = ok.clone();
    go(move || {
        let caught = panic::catch_unwind(AssertUnwindSafe(|| {
            let _ = portal::<Probe>().with(|_| panic!("exception occurred"));
        }));
        assert!(caught.is_err());
        assert_eq!(thread_name(), "tp1");
        ok2.store(true, Ordering::Release);
    });

    wait_for_all();
    assert!(ok.load(Ordering::Acquire));
    portal::<Probe>().detach();
    drop(tp1);
}

#[test]
fn gc_runs_deleters_lifo() {
    let _lock = init();
    let tp = AttachedPool::new(1, "tp");

    struct Tracker {
        tag: u32,
        log: Arc<Mutex<Vec<u32>>>,
    }

    impl Drop for Tracker {
        fn drop(&mut self) {
            self.log.lock().push(self.tag);
        }
    }

    let log = Arc::new(Mutex::new(Vec::new()));
    let log2 = log.clone();
    go(move || {
        let _a = gcnew(Tracker {
            tag: 1,
            log: log2.clone(),
        });
        let _b = gcnew(Tracker {
            tag: 2,
            log: log2.clone(),
        });
    });

    wait_for_all();
    assert_eq!(*log.lock(), vec![2, 1]);
    drop(tp);
}

#[test]
fn pool_wait_blocks_until_drained() {
    let _lock = init();
    let tp = AttachedPool::new(3, "tp");

    tp.pool.wait();
    let done = Arc::new(AtomicBool::new(false));
    let done2 = done.clone();
    go(move || {
        sleep_ms(300);
        done2.store(true, Ordering::Release);
    });
    tp.pool.wait();
    assert!(done.load(Ordering::Acquire));
    tp.pool.wait();
    drop(tp);
}

#[test]
fn tcp_echo_round_trip() {
    let _lock = init();
    let tp = AttachedPool::new(2, "net");
    service::<NetworkTag>().attach(&tp.pool);

    let mut listener = TcpListener::bind("127.0.0.1:0".parse().unwrap()).unwrap();
    let addr = listener.local_addr().unwrap();

    let served = Arc::new(AtomicBool::new(false));
    let served2 = served.clone();
    go(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let mut buf = [0u8; 5];
        stream.read_exact(&mut buf).unwrap();
        stream.write_all(&buf).unwrap();
        served2.store(true, Ordering::Release);
    });

    let echoed = Arc::new(AtomicBool::new(false));
    let echoed2 = echoed.clone();
    go(move || {
        let mut stream = TcpStream::connect(addr).unwrap();
        stream.write_all(b"hello").unwrap();
        let mut buf = [0u8; 5];
        stream.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"hello");
        echoed2.store(true, Ordering::Release);
    });

    wait_for_all();
    assert!(served.load(Ordering::Acquire));
    assert!(echoed.load(Ordering::Acquire));
    service::<NetworkTag>().detach();
    drop(tp);
}
