// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! The server half of a SoupBinTCP session: accepts connections on a
//! caller-supplied listener, verifies logins, and fans sequenced/
//! unsequenced broadcasts out to every logged-in client.
//!
//! Connections move through two registries: *pending* (accepted, not yet
//! logged in) and *promoted* (logged in, keyed by session id). A pending
//! connection that never logs in just sits there until it disconnects or is
//! closed by `Server::stop`; nothing here times it out on its own.

use std::collections::HashMap;
use std::io;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use crate::codec::{Frame, PacketType};
use crate::config::ServerConfig;
use crate::connection::{Connection, ConnectionRole, InboundEvent};
use crate::error::ServerError;
use crate::heartbeat::HeartbeatTimer;
use crate::message_log::MessageLog;
use crate::messages::{LoginCredentials, RejectReason};
use crate::transport::{BoxedByteStream, IoCommand, IoCommandSender, IoEvent, IoTask};

/// Caller-implemented credential check. `AnyLoginVerifier` accepts every
/// login and is meant for tests and trivial deployments.
pub trait LoginVerifier: Send + Sync {
    fn verify(&self, credentials: &LoginCredentials) -> bool;
}

/// Accepts every set of credentials, mirroring the reference
/// implementation's anonymous verifier.
pub struct AnyLoginVerifier;

impl LoginVerifier for AnyLoginVerifier {
    fn verify(&self, _credentials: &LoginCredentials) -> bool {
        true
    }
}

/// Caller-implemented accept loop boundary; this crate never binds a
/// socket itself.
pub trait Listener: Send {
    fn accept(&mut self) -> io::Result<BoxedByteStream>;
    fn set_nonblocking(&mut self, nonblocking: bool) -> io::Result<()>;
}

struct RosterEntry {
    session_id: Option<String>,
    heartbeat: HeartbeatTimer,
}

struct ServerState {
    config: ServerConfig,
    verifier: Box<dyn LoginVerifier>,
    message_log: MessageLog,
    roster: HashMap<usize, RosterEntry>,
    sessions: HashMap<String, usize>,
    next_session_seq: u64,
}

impl ServerState {
    fn new(config: ServerConfig, verifier: Box<dyn LoginVerifier>) -> Self {
        Self {
            config,
            verifier,
            message_log: MessageLog::new(),
            roster: HashMap::new(),
            sessions: HashMap::new(),
            next_session_seq: 1,
        }
    }

    fn assign_session_id(&mut self) -> String {
        let id = format!("SESS{:06}", self.next_session_seq);
        self.next_session_seq += 1;
        id
    }
}

/// Owns the accept loop and event-handling thread, plus handles into the
/// shared I/O task used by every connection this server accepts.
pub struct Server {
    state: Arc<Mutex<ServerState>>,
    io: Option<Arc<crate::transport::IoTaskHandle>>,
    accept_thread: Option<JoinHandle<()>>,
    driver_thread: Option<JoinHandle<()>>,
    running: Arc<std::sync::atomic::AtomicBool>,
}

impl Server {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            state: Arc::new(Mutex::new(ServerState::new(config, Box::new(AnyLoginVerifier)))),
            io: None,
            accept_thread: None,
            driver_thread: None,
            running: Arc::new(std::sync::atomic::AtomicBool::new(false)),
        }
    }

    pub fn set_login_verifier(&mut self, verifier: Box<dyn LoginVerifier>) {
        self.state.lock().unwrap().verifier = verifier;
    }

    /// Spawn the shared I/O task, an accept loop thread, and an event-driver
    /// thread that reacts to inbound frames (logins, logouts, disconnects).
    pub fn start(&mut self, mut listener: impl Listener + 'static) -> io::Result<()> {
        listener.set_nonblocking(true)?;
        let io = Arc::new(IoTask::spawn()?);
        self.running.store(true, std::sync::atomic::Ordering::Release);

        let accept_io = io.command_sender();
        let accept_state = self.state.clone();
        let accept_running = self.running.clone();
        let accept_thread = thread::Builder::new()
            .name("soupbin-accept".into())
            .spawn(move || {
                while accept_running.load(std::sync::atomic::Ordering::Acquire) {
                    match listener.accept() {
                        Ok(stream) => {
                            let config = accept_state.lock().unwrap().config.connection.clone();
                            match Connection::accept(stream, config) {
                                Ok(conn) => {
                                    let _ = accept_io.send_command(IoCommand::Register(conn));
                                }
                                Err(_) => continue,
                            }
                        }
                        Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                            thread::sleep(std::time::Duration::from_millis(10));
                        }
                        Err(e) => {
                            crate::error!("accept failed, continuing: {e}");
                            thread::sleep(std::time::Duration::from_millis(10));
                        }
                    }
                }
            })?;

        let driver_io = io.clone();
        let driver_commands = io.command_sender();
        let driver_state = self.state.clone();
        let driver_running = self.running.clone();
        let driver_thread = thread::Builder::new()
            .name("soupbin-server-driver".into())
            .spawn(move || {
                while driver_running.load(std::sync::atomic::Ordering::Acquire) {
                    for event in driver_io.try_recv_events() {
                        handle_event(&driver_state, &driver_commands, event);
                    }
                    thread::sleep(std::time::Duration::from_millis(5));
                }
            })?;

        self.io = Some(io);
        self.accept_thread = Some(accept_thread);
        self.driver_thread = Some(driver_thread);
        Ok(())
    }

    /// Send an unsequenced payload to every currently logged-in connection.
    ///
    /// Routed through [`crate::connection::Connection::send_unsequenced`]
    /// rather than a pre-encoded frame, so a connection that somehow is not
    /// `Connected` rejects the send instead of silently receiving traffic.
    pub fn send_unsequenced(&self, payload: &[u8]) {
        let state = self.state.lock().unwrap();
        let io = match &self.io {
            Some(io) => io,
            None => return,
        };
        for token in state.roster.keys().copied() {
            let payload = payload.to_vec();
            let _ = io.send_command(IoCommand::Apply {
                token,
                apply: Box::new(move |conn| {
                    let _ = conn.send_unsequenced(&payload);
                }),
            });
        }
    }

    /// Append `payload` to the message log and fan the same assigned
    /// sequence number out to every logged-in connection, through
    /// [`crate::connection::Connection::send_sequenced_numbered`].
    pub fn send_sequenced(&self, payload: &[u8]) -> u64 {
        let mut state = self.state.lock().unwrap();
        let seq = state.message_log.append(payload.to_vec());
        if let Some(io) = &self.io {
            for token in state.roster.keys().copied() {
                let payload = payload.to_vec();
                let _ = io.send_command(IoCommand::Apply {
                    token,
                    apply: Box::new(move |conn| {
                        let _ = conn.send_sequenced_numbered(seq, &payload);
                    }),
                });
            }
        }
        seq
    }

    /// Replay everything from `from` onward to one named session.
    pub fn repeat_from(&self, session_id: &str, from: u64) -> Result<(), ServerError> {
        let state = self.state.lock().unwrap();
        let token = *state
            .sessions
            .get(session_id)
            .ok_or_else(|| ServerError::UnknownSession(session_id.to_string()))?;
        let io = self.io.as_ref().ok_or_else(|| {
            ServerError::Io(io::Error::new(io::ErrorKind::NotConnected, "server is not started"))
        })?;
        for (seq, payload) in state.message_log.replay_from(from) {
            let _ = io.send_command(IoCommand::Apply {
                token,
                apply: Box::new(move |conn| {
                    let _ = conn.send_sequenced_numbered(seq, &payload);
                }),
            });
        }
        Ok(())
    }

    pub fn session_count(&self) -> usize {
        self.state.lock().unwrap().sessions.len()
    }

    pub fn message_log_len(&self) -> usize {
        self.state.lock().unwrap().message_log.len()
    }

    /// Stop the accept loop, the driver thread, and the I/O task. Active
    /// connections are closed as part of the I/O task shutting down.
    pub fn stop(&mut self) {
        self.running.store(false, std::sync::atomic::Ordering::Release);
        if let Some(io) = self.io.take() {
            io.shutdown();
        }
        if let Some(t) = self.accept_thread.take() {
            let _ = t.join();
        }
        if let Some(t) = self.driver_thread.take() {
            let _ = t.join();
        }
        self.state.lock().unwrap().roster.clear();
        self.state.lock().unwrap().sessions.clear();
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.stop();
    }
}

fn handle_event(state: &Arc<Mutex<ServerState>>, io: &IoCommandSender, event: IoEvent) {
    match event {
        IoEvent::Readable { token, event } => handle_inbound(state, io, token, event),
        IoEvent::Closed { token } | IoEvent::Error { token, .. } => {
            let mut state = state.lock().unwrap();
            if let Some(entry) = state.roster.remove(&token) {
                if let Some(session_id) = entry.session_id {
                    state.sessions.remove(&session_id);
                }
            }
        }
    }
}

fn handle_inbound(state: &Arc<Mutex<ServerState>>, io: &IoCommandSender, token: usize, event: InboundEvent) {
    match event {
        InboundEvent::LoginRequest(req) => {
            let mut state = state.lock().unwrap();
            let accepted = state.verifier.verify(&req.credentials);
            if !accepted {
                let _ = io.send_command(IoCommand::Apply {
                    token,
                    apply: Box::new(|conn| {
                        let _ = conn.send_login_rejected(RejectReason::NotAuthorized);
                    }),
                });
                let _ = io.send_command(IoCommand::Close { token });
                return;
            }

            let session_id = if req.requested_session.is_empty() {
                state.assign_session_id()
            } else {
                req.requested_session.clone()
            };

            let sequence_number = if req.requested_sequence_number == 0 {
                state.message_log.next_sequence_number()
            } else {
                req.requested_sequence_number
            };

            let accept_session_id = session_id.clone();
            let _ = io.send_command(IoCommand::Apply {
                token,
                apply: Box::new(move |conn| {
                    let _ = conn.send_login_accepted(accept_session_id, sequence_number);
                }),
            });

            let heartbeat_interval = state.config.connection.heartbeat_interval;
            let heartbeat_io = io.clone();
            let heartbeat_frame = Frame::new(PacketType::ServerHeartbeat, Vec::new()).encode();
            let heartbeat = HeartbeatTimer::spawn(heartbeat_interval, move || {
                let _ = heartbeat_io.send_command(IoCommand::Send {
                    token,
                    frame: heartbeat_frame.clone(),
                });
            });

            state.sessions.insert(session_id.clone(), token);
            state.roster.insert(
                token,
                RosterEntry {
                    session_id: Some(session_id.clone()),
                    heartbeat,
                },
            );

            if req.requested_sequence_number != 0 {
                let replay: Vec<_> = state.message_log.replay_from(req.requested_sequence_number);
                drop(state);
                for (seq, payload) in replay {
                    let _ = io.send_command(IoCommand::Apply {
                        token,
                        apply: Box::new(move |conn| {
                            let _ = conn.send_sequenced_numbered(seq, &payload);
                        }),
                    });
                }
            }
        }
        InboundEvent::LogoutRequest => {
            let mut state = state.lock().unwrap();
            if let Some(entry) = state.roster.remove(&token) {
                if let Some(session_id) = entry.session_id {
                    state.sessions.remove(&session_id);
                }
            }
            let _ = io.send_command(IoCommand::Close { token });
        }
        InboundEvent::ClientHeartbeat => {
            // Liveness only; nothing to do beyond having received a frame at all.
        }
        _ => {}
    }
}
