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

//! Producer/consumer pipeline demo: three producer journeys feed a channel,
//! two consumers drain it, a supervisor closes the stream when the
//! producers are done.
//!
//! Exit codes: 0 success, 1 expected error, 2 unknown error.

use std::panic;
use std::process;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;

use journey::{
    go, scheduler, wait_for_all, Channel, DefaultTag, ThreadPool, Waiter,
};

const PRODUCERS: i64 = 3;
const PER_PRODUCER: i64 = 100;

fn run() -> Result<(), String> {
    env_logger::init();

    let pool = ThreadPool::new(4, "pipeline");
    scheduler::<DefaultTag>().attach(&pool);

    let ch: Channel<i64> = Channel::new();
    let total = Arc::new(AtomicI64::new(0));
    let received = Arc::new(AtomicUsize::new(0));

    for _ in 0..2 {
        let ch = ch.clone();
        let total = total.clone();
        let received = received.clone();
        go(move || {
            for value in &ch {
                total.fetch_add(value, Ordering::AcqRel);
                received.fetch_add(1, Ordering::AcqRel);
            }
        });
    }

    let feed = ch.clone();
    go(move || {
        let mut waiter = Waiter::new();
        for producer in 0..PRODUCERS {
            let ch = feed.clone();
            waiter.go(move || {
                for i in 0..PER_PRODUCER {
                    ch.put(producer * PER_PRODUCER + i);
                }
            });
        }
        waiter.wait().unwrap();
        feed.close();
    });

    wait_for_all();
    scheduler::<DefaultTag>().detach();

    let expected_count = (PRODUCERS * PER_PRODUCER) as usize;
    let n = PRODUCERS * PER_PRODUCER;
    let expected_total = n * (n - 1) / 2;
    println!(
        "received {} values, sum {}",
        received.load(Ordering::Acquire),
        total.load(Ordering::Acquire)
    );
    if received.load(Ordering::Acquire) != expected_count {
        return Err("lost values in the pipeline".to_string());
    }
    if total.load(Ordering::Acquire) != expected_total {
        return Err("pipeline sum mismatch".to_string());
    }
    Ok(())
}

fn main() {
    process::exit(match panic::catch_unwind(run) {
        Ok(Ok(())) => 0,
        Ok(Err(err)) => {
            eprintln!("error: {}", err);
            1
        }
        Err(_) => {
            eprintln!("unknown error");
            2
        }
    });
}
