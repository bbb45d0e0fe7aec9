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

//! TCP echo demo: one server journey answers one client journey over
//! loopback, both written in plain synchronous style.
//!
//! Exit codes: 0 success, 1 expected error, 2 unknown error.

use std::io;
use std::net::SocketAddr;
use std::panic;
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use journey::net::{NetError, TcpListener, TcpStream};
use journey::{go, scheduler, service, wait_for_all, DefaultTag, NetworkTag, ThreadPool};

fn serve(mut listener: TcpListener) -> Result<(), NetError> {
    let (mut stream, peer) = listener.accept()?;
    println!("serving {}", peer);
    let mut buf = [0u8; 256];
    loop {
        let n = stream.read(&mut buf)?;
        if n == 0 {
            return Ok(());
        }
        stream.write_all(&buf[..n])?;
    }
}

fn echo_once(addr: SocketAddr) -> Result<(), NetError> {
    let mut stream = TcpStream::connect(addr)?;
    stream.write_all(b"ping over a coroutine")?;
    let mut buf = [0u8; 21];
    stream.read_exact(&mut buf)?;
    if &buf != b"ping over a coroutine" {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "echo mismatch").into());
    }
    println!("echo verified");
    Ok(())
}

fn run() -> Result<(), NetError> {
    env_logger::init();

    let pool = ThreadPool::new(2, "echo");
    scheduler::<DefaultTag>().attach(&pool);
    service::<NetworkTag>().attach(&pool);

    let listener = TcpListener::bind("127.0.0.1:0".parse().unwrap())?;
    let addr = listener.local_addr()?;
    println!("echo server listening on {}", addr);

    let verified = Arc::new(AtomicBool::new(false));
    go(move || {
        if let Err(err) = serve(listener) {
            eprintln!("server error: {}", err);
        }
    });
    let flag = verified.clone();
    go(move || match echo_once(addr) {
        Ok(()) => flag.store(true, Ordering::Release),
        Err(err) => eprintln!("client error: {}", err),
    });

    wait_for_all();
    scheduler::<DefaultTag>().detach();
    service::<NetworkTag>().detach();

    if verified.load(Ordering::Acquire) {
        Ok(())
    } else {
        Err(io::Error::new(io::ErrorKind::Other, "echo round trip failed").into())
    }
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
