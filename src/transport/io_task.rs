// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Single-threaded, non-blocking I/O task driving a set of [`Connection`]s.
//!
//! # Architecture
//!
//! ```text
//! +-------------------------------------------------------------+
//! |                         IoTask                               |
//! |  +-------------------------------------------------------+  |
//! |  |                    mio::Poll                           |  |
//! |  |  - one registration per Connection (via its raw fd)   |  |
//! |  |  - Waker token for cross-thread commands               |  |
//! |  +-------------------------------------------------------+  |
//! |                              |                               |
//! |             readable -> recv        writable -> flush       |
//! |                              |                               |
//! |  +-------------------------------------------------------+  |
//! |  |           IoEvent channel -> owning thread              |  |
//! |  +-------------------------------------------------------+  |
//! +-------------------------------------------------------------+
//! ```
//!
//! Heartbeats never write to the socket from their own thread: they post an
//! `IoCommand::Send` into this task's command channel and rely on the
//! `Waker` to pull the task out of `poll()` immediately.

use std::collections::HashMap;
use std::io;
use std::sync::Mutex;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{unbounded, Receiver, Sender};
use mio::{Events, Interest, Poll, Token, Waker};

use crate::connection::{Connection, InboundEvent};

const WAKER_TOKEN: Token = Token(usize::MAX);
const FIRST_CONNECTION_TOKEN: usize = 0;
const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_millis(100);
const MAX_EVENTS: usize = 128;

/// Commands posted into an [`IoTask`] from another thread.
pub enum IoCommand {
    /// Register a new connection and start polling it.
    Register(Connection),
    /// Enqueue a payload to send on an already-registered connection.
    Send { token: usize, frame: Vec<u8> },
    /// Run a closure against the connection's own role-gated API (login
    /// accept/reject, numbered sequenced sends) on the task that owns it,
    /// so the resulting state transitions happen on the real `Connection`
    /// value rather than bypassing it with a pre-encoded frame.
    Apply {
        token: usize,
        apply: Box<dyn FnOnce(&mut Connection) + Send>,
    },
    /// Close and deregister a connection.
    Close { token: usize },
    /// Stop the task's event loop.
    Shutdown,
}

/// Events emitted by an [`IoTask`] back to the thread that owns it.
#[derive(Debug)]
pub enum IoEvent {
    Readable { token: usize, event: InboundEvent },
    Closed { token: usize },
    Error { token: usize, error: String },
}

#[cfg(unix)]
fn register_for_poll(poll: &Poll, token: Token, stream: &dyn crate::transport::ByteStream) -> io::Result<()> {
    use mio::unix::SourceFd;
    use std::os::unix::io::AsRawFd;
    let fd = stream.as_raw_fd();
    poll.registry()
        .register(&mut SourceFd(&fd), token, Interest::READABLE | Interest::WRITABLE)
}

#[cfg(not(unix))]
fn register_for_poll(_poll: &Poll, _token: Token, _stream: &dyn crate::transport::ByteStream) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "non-blocking registration is only implemented for unix raw file descriptors",
    ))
}

#[cfg(unix)]
fn deregister_from_poll(poll: &Poll, stream: &dyn crate::transport::ByteStream) -> io::Result<()> {
    use mio::unix::SourceFd;
    use std::os::unix::io::AsRawFd;
    let fd = stream.as_raw_fd();
    poll.registry().deregister(&mut SourceFd(&fd))
}

#[cfg(not(unix))]
fn deregister_from_poll(_poll: &Poll, _stream: &dyn crate::transport::ByteStream) -> io::Result<()> {
    Ok(())
}

/// A cheaply cloneable handle that can only post commands, for callers
/// (like a server's accept loop) that never need to drain events
/// themselves. Cloning an [`IoTaskHandle`] itself is deliberately not
/// offered: its event `Receiver` would fan messages out round-robin across
/// clones rather than duplicating them, which is never what a caller wants.
#[derive(Clone)]
pub struct IoCommandSender {
    commands: Sender<IoCommand>,
    waker: std::sync::Arc<Waker>,
}

impl IoCommandSender {
    pub fn send_command(&self, command: IoCommand) -> io::Result<()> {
        self.commands
            .send(command)
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "I/O task has stopped"))?;
        self.waker.wake()
    }
}

/// Handle held by the thread that created an [`IoTask`]; posts commands in
/// and drains events out.
pub struct IoTaskHandle {
    commands: Sender<IoCommand>,
    events: Receiver<IoEvent>,
    waker: std::sync::Arc<Waker>,
    join: Mutex<Option<JoinHandle<()>>>,
}

impl IoTaskHandle {
    pub fn send_command(&self, command: IoCommand) -> io::Result<()> {
        self.commands
            .send(command)
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "I/O task has stopped"))?;
        self.waker.wake()
    }

    /// A command-only handle that can be cloned and handed to other
    /// threads (e.g. an accept loop) without sharing this handle's event
    /// receiver.
    pub fn command_sender(&self) -> IoCommandSender {
        IoCommandSender {
            commands: self.commands.clone(),
            waker: self.waker.clone(),
        }
    }

    /// Non-blocking drain of whatever events are currently queued.
    pub fn try_recv_events(&self) -> Vec<IoEvent> {
        self.events.try_iter().collect()
    }

    /// Ask the task to stop and wait for its thread to exit. Takes `&self`
    /// so a caller holding this handle behind an `Arc` (shared with other
    /// threads for reading events or sending commands) can still shut it
    /// down without needing sole ownership.
    pub fn shutdown(&self) {
        let _ = self.send_command(IoCommand::Shutdown);
        if let Some(join) = self.join.lock().unwrap().take() {
            let _ = join.join();
        }
    }
}

/// The I/O task itself. Runs on its own OS thread, driven entirely by
/// `mio::Poll`.
pub struct IoTask {
    poll: Poll,
    connections: HashMap<usize, Connection>,
    next_token: usize,
    commands: Receiver<IoCommand>,
    events: Sender<IoEvent>,
}

impl IoTask {
    /// Spawn the task on a dedicated thread and return a handle to it.
    pub fn spawn() -> io::Result<IoTaskHandle> {
        let poll = Poll::new()?;
        let waker = std::sync::Arc::new(Waker::new(poll.registry(), WAKER_TOKEN)?);
        let (command_tx, command_rx) = unbounded();
        let (event_tx, event_rx) = unbounded();

        let mut task = IoTask {
            poll,
            connections: HashMap::new(),
            next_token: FIRST_CONNECTION_TOKEN,
            commands: command_rx,
            events: event_tx,
        };

        let join = thread::Builder::new()
            .name("soupbin-io".into())
            .spawn(move || task.run())?;

        Ok(IoTaskHandle {
            commands: command_tx,
            events: event_rx,
            waker,
            join: Mutex::new(Some(join)),
        })
    }

    fn run(&mut self) {
        let mut events = Events::with_capacity(MAX_EVENTS);
        loop {
            match self.poll.poll(&mut events, Some(DEFAULT_POLL_TIMEOUT)) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(_) => break,
            }

            if self.drain_commands() {
                break;
            }

            for event in events.iter() {
                if event.token() == WAKER_TOKEN {
                    continue;
                }
                let token = event.token().0;
                if event.is_readable() {
                    self.handle_readable(token);
                }
                if event.is_writable() {
                    self.handle_writable(token);
                }
            }
        }
    }

    /// Returns `true` if the task should stop.
    fn drain_commands(&mut self) -> bool {
        loop {
            match self.commands.try_recv() {
                Ok(IoCommand::Register(conn)) => self.register(conn),
                Ok(IoCommand::Send { token, frame }) => self.handle_send(token, frame),
                Ok(IoCommand::Apply { token, apply }) => self.handle_apply(token, apply),
                Ok(IoCommand::Close { token }) => self.close_connection(token, None),
                Ok(IoCommand::Shutdown) => return true,
                Err(_) => return false,
            }
        }
    }

    fn register(&mut self, conn: Connection) {
        let token = self.next_token;
        self.next_token += 1;
        if register_for_poll(&self.poll, Token(token), conn.stream()).is_ok() {
            self.connections.insert(token, conn);
        }
    }

    fn handle_send(&mut self, token: usize, frame: Vec<u8>) {
        if let Some(conn) = self.connections.get_mut(&token) {
            conn.enqueue_raw(frame);
            self.try_flush(token);
        }
    }

    fn handle_apply(&mut self, token: usize, apply: Box<dyn FnOnce(&mut Connection) + Send>) {
        if let Some(conn) = self.connections.get_mut(&token) {
            apply(conn);
            self.try_flush(token);
        }
    }

    fn handle_writable(&mut self, token: usize) {
        self.try_flush(token);
    }

    fn try_flush(&mut self, token: usize) {
        let result = match self.connections.get_mut(&token) {
            Some(conn) => conn.flush(),
            None => return,
        };
        match result {
            Ok(_) => {}
            Err(e) => self.close_connection(token, Some(e.to_string())),
        }
    }

    fn handle_readable(&mut self, token: usize) {
        loop {
            let outcome = match self.connections.get_mut(&token) {
                Some(conn) => conn.poll_recv(),
                None => return,
            };
            match outcome {
                Ok(Some(event)) => {
                    let _ = self.events.send(IoEvent::Readable { token, event });
                }
                Ok(None) => return,
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                    self.close_connection(token, None);
                    return;
                }
                Err(e) => {
                    self.close_connection(token, Some(e.to_string()));
                    return;
                }
            }
        }
    }

    fn close_connection(&mut self, token: usize, error: Option<String>) {
        if let Some(mut conn) = self.connections.remove(&token) {
            let _ = deregister_from_poll(&self.poll, conn.stream());
            conn.close();
        }
        let event = match error {
            Some(error) => IoEvent::Error { token, error },
            None => IoEvent::Closed { token },
        };
        let _ = self.events.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_constants_do_not_collide() {
        assert_ne!(WAKER_TOKEN.0, FIRST_CONNECTION_TOKEN);
    }
}
