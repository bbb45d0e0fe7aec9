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

//! Coroutine-blocking TCP sockets.
//!
//! Every blocking operation follows the same shape: try the non-blocking
//! call, and on `WouldBlock` park the journey while the reactor registered
//! under `NetworkTag` arms a one-shot readiness wait whose continuation
//! resumes it. The calling code keeps its synchronous style.

use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, ToSocketAddrs};
use std::sync::Arc;

use mio::event::Source;
use mio::{Interest, Token};
use thiserror::Error;

use crate::goer::EventError;
use crate::journey::park_proceed;
use crate::reactor::Reactor;
use crate::service::{service, NetworkTag};

/// Error out of a blocking network operation. I/O failures are never
/// latched in the goer; they surface here directly.
#[derive(Debug, Error)]
pub enum NetError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Event(#[from] EventError),
}

struct SendMut<T: ?Sized>(*mut T);

unsafe impl<T: ?Sized> Send for SendMut<T> {}

/// Parks the current journey until `source` reports `interest`. The slot
/// pointed to by `token` is allocated on first use and stays bound to the
/// socket.
fn wait_ready<S: Source + 'static>(
    reactor: &Arc<Reactor>,
    source: &mut S,
    token: &mut Option<Token>,
    interest: Interest,
) -> Result<(), NetError> {
    let first = token.is_none();
    let tok = match *token {
        Some(tok) => tok,
        None => {
            let tok = reactor.alloc_token();
            *token = Some(tok);
            tok
        }
    };

    let mut failure: Option<io::Error> = None;
    {
        let reactor = reactor.clone();
        let source_ptr = SendMut(source as *mut S);
        let failure_ptr = SendMut(&mut failure as *mut Option<io::Error>);
        park_proceed(move |proceed| {
            let source = unsafe { &mut *source_ptr.0 };
            if let Err((err, proceed)) = reactor.arm_io(source, tok, first, interest, proceed) {
                // nothing will fire; resume ourselves and report the error
                unsafe { *failure_ptr.0 = Some(err) };
                proceed();
            }
        })?;
    }

    match failure.take() {
        Some(err) => Err(err.into()),
        None => Ok(()),
    }
}

/// Coroutine-blocking TCP stream.
pub struct TcpStream {
    io: mio::net::TcpStream,
    reactor: Arc<Reactor>,
    token: Option<Token>,
}

impl TcpStream {
    /// Connects to `addr`, parking until the connection is established or
    /// refused.
    pub fn connect(addr: SocketAddr) -> Result<TcpStream, NetError> {
        let reactor = service::<NetworkTag>().get();
        let io = mio::net::TcpStream::connect(addr)?;
        let mut stream = TcpStream {
            io,
            reactor,
            token: None,
        };
        loop {
            stream.wait(Interest::WRITABLE)?;
            if let Some(err) = stream.io.take_error()? {
                return Err(err.into());
            }
            match stream.io.peer_addr() {
                Ok(_) => return Ok(stream),
                Err(err) if err.kind() == io::ErrorKind::NotConnected => continue,
                Err(err) => return Err(err.into()),
            }
        }
    }

    fn wait(&mut self, interest: Interest) -> Result<(), NetError> {
        let reactor = self.reactor.clone();
        wait_ready(&reactor, &mut self.io, &mut self.token, interest)
    }

    /// Reads up to `buf.len()` bytes; `Ok(0)` means the peer closed.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize, NetError> {
        loop {
            match self.io.read(buf) {
                Ok(n) => return Ok(n),
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                    self.wait(Interest::READABLE)?
                }
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err.into()),
            }
        }
    }

    /// Reads exactly `buf.len()` bytes or fails with `UnexpectedEof`.
    pub fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), NetError> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.read(&mut buf[filled..])? {
                0 => return Err(io::Error::from(io::ErrorKind::UnexpectedEof).into()),
                n => filled += n,
            }
        }
        Ok(())
    }

    pub fn write(&mut self, buf: &[u8]) -> Result<usize, NetError> {
        loop {
            match self.io.write(buf) {
                Ok(n) => return Ok(n),
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                    self.wait(Interest::WRITABLE)?
                }
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err.into()),
            }
        }
    }

    pub fn write_all(&mut self, buf: &[u8]) -> Result<(), NetError> {
        let mut written = 0;
        while written < buf.len() {
            match self.write(&buf[written..])? {
                0 => return Err(io::Error::from(io::ErrorKind::WriteZero).into()),
                n => written += n,
            }
        }
        Ok(())
    }

    pub fn peer_addr(&self) -> io::Result<SocketAddr> {
        self.io.peer_addr()
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.io.local_addr()
    }

    pub fn shutdown(&self, how: Shutdown) -> io::Result<()> {
        self.io.shutdown(how)
    }
}

impl Drop for TcpStream {
    fn drop(&mut self) {
        if let Some(token) = self.token.take() {
            self.reactor.release_io(&mut self.io, token);
        }
    }
}

/// Coroutine-blocking TCP acceptor.
pub struct TcpListener {
    io: mio::net::TcpListener,
    reactor: Arc<Reactor>,
    token: Option<Token>,
}

impl TcpListener {
    pub fn bind(addr: SocketAddr) -> Result<TcpListener, NetError> {
        let reactor = service::<NetworkTag>().get();
        let io = mio::net::TcpListener::bind(addr)?;
        Ok(TcpListener {
            io,
            reactor,
            token: None,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.io.local_addr()
    }

    /// Accepts the next connection, parking while none is pending.
    pub fn accept(&mut self) -> Result<(TcpStream, SocketAddr), NetError> {
        loop {
            match self.io.accept() {
                Ok((io, addr)) => {
                    let stream = TcpStream {
                        io,
                        reactor: self.reactor.clone(),
                        token: None,
                    };
                    return Ok((stream, addr));
                }
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                    let reactor = self.reactor.clone();
                    wait_ready(&reactor, &mut self.io, &mut self.token, Interest::READABLE)?;
                }
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err.into()),
            }
        }
    }
}

impl Drop for TcpListener {
    fn drop(&mut self) {
        if let Some(token) = self.token.take() {
            self.reactor.release_io(&mut self.io, token);
        }
    }
}

/// Resolves `host:port`. Uses the standard resolver inline on the calling
/// worker; no suspension point.
pub fn resolve(host: &str, port: u16) -> Result<Vec<SocketAddr>, NetError> {
    let addrs = (host, port).to_socket_addrs()?;
    Ok(addrs.collect())
}
