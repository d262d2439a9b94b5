// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Shared end-to-end test harness: a real `TcpListener`-backed `Listener`
//! and a tiny client-side driver built from the same building blocks a
//! caller is expected to assemble (`Connection` + `IoTask` + `HeartbeatTimer`).

use std::io;
use std::net::{TcpListener, TcpStream};
use std::time::{Duration, Instant};

use soupbin::connection::{Connection, InboundEvent};
use soupbin::server::Listener;
use soupbin::transport::BoxedByteStream;

pub struct TcpTestListener(TcpListener);

impl TcpTestListener {
    pub fn bind_ephemeral() -> io::Result<(Self, std::net::SocketAddr)> {
        let listener = TcpListener::bind("127.0.0.1:0")?;
        let addr = listener.local_addr()?;
        Ok((Self(listener), addr))
    }
}

impl Listener for TcpTestListener {
    fn accept(&mut self) -> io::Result<BoxedByteStream> {
        let (stream, _) = self.0.accept()?;
        Ok(Box::new(stream))
    }

    fn set_nonblocking(&mut self, nonblocking: bool) -> io::Result<()> {
        self.0.set_nonblocking(nonblocking)
    }
}

/// Busy-poll `f` until it returns `Some`, or panic after `timeout`.
pub fn wait_for<T>(timeout: Duration, mut f: impl FnMut() -> Option<T>) -> T {
    let start = Instant::now();
    loop {
        if let Some(value) = f() {
            return value;
        }
        if start.elapsed() > timeout {
            panic!("condition not met within {timeout:?}");
        }
        std::thread::sleep(Duration::from_millis(5));
    }
}

/// A client-side connection driven by hand: no background I/O task, just
/// repeated `flush`/`poll_recv` calls, which is all a single-connection
/// client needs.
pub struct TestClient {
    pub conn: Connection,
}

impl TestClient {
    pub fn dial(
        addr: std::net::SocketAddr,
        username: &str,
        password: &str,
        requested_session: &str,
        requested_sequence_number: u64,
        config: soupbin::config::ConnectionConfig,
    ) -> io::Result<Self> {
        let stream = TcpStream::connect(addr)?;
        let credentials = soupbin::messages::LoginCredentials {
            username: username.to_string(),
            password: password.to_string(),
        };
        let mut conn = Connection::connect(
            Box::new(stream),
            credentials,
            requested_session.to_string(),
            requested_sequence_number,
            config,
        )?;
        conn.flush()?;
        Ok(Self { conn })
    }

    /// Drain whatever inbound events are available right now without
    /// blocking.
    pub fn poll_once(&mut self) -> Vec<InboundEvent> {
        let mut events = Vec::new();
        loop {
            match self.conn.poll_recv() {
                Ok(Some(event)) => events.push(event),
                Ok(None) => break,
                Err(_) => break,
            }
        }
        events
    }

    /// Poll repeatedly until at least one event matching `pred` is seen, or
    /// panic after `timeout`.
    pub fn wait_for_event(
        &mut self,
        timeout: Duration,
        mut pred: impl FnMut(&InboundEvent) -> bool,
    ) -> InboundEvent {
        let start = Instant::now();
        loop {
            for event in self.poll_once() {
                if pred(&event) {
                    return event;
                }
            }
            if start.elapsed() > timeout {
                panic!("expected event not observed within {timeout:?}");
            }
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    /// Collect every `SequencedData` event seen within `timeout`, stopping
    /// early once `expected` have arrived.
    pub fn collect_sequenced(&mut self, expected: usize, timeout: Duration) -> Vec<(u64, Vec<u8>)> {
        let start = Instant::now();
        let mut out = Vec::new();
        while out.len() < expected {
            for event in self.poll_once() {
                if let InboundEvent::SequencedData { sequence_number, payload } = event {
                    out.push((sequence_number, payload));
                }
            }
            if out.len() >= expected {
                break;
            }
            if start.elapsed() > timeout {
                panic!("only {} of {} expected sequenced messages arrived within {:?}", out.len(), expected, timeout);
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        out
    }
}
