// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Per-peer connection state machine.
//!
//! A [`Connection`] is a single value for both protocol roles: the role is
//! fixed at construction and gates which operations are callable, rather
//! than having two separate connection types. This keeps a `Server`'s
//! roster and the test suite able to treat both roles uniformly while the
//! compiler still rejects role-inappropriate calls.

use std::collections::VecDeque;
use std::fmt;
use std::io::{self, Write};
use std::time::Instant;

use crate::codec::{Decoder, Frame, PacketType};
use crate::config::ConnectionConfig;
use crate::error::ConnectionError;
use crate::messages::{LoginAccepted, LoginCredentials, LoginRejected, LoginRequest, RejectReason};
use crate::transport::ByteStream;

/// Which side of the session this connection represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionRole {
    /// The publisher: accepts logins, assigns sequence numbers, replays.
    ServerSide,
    /// The subscriber: logs in, optionally requesting a resume point.
    ClientSide,
}

/// The three states a SoupBinTCP session can be in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Connecting,
    Connected,
    Disconnected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
        };
        f.write_str(s)
    }
}

impl ConnectionState {
    pub fn is_operational(self) -> bool {
        matches!(self, Self::Connected)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Disconnected)
    }
}

/// Outcome of draining the outbound queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushResult {
    /// Everything queued was written.
    Complete,
    /// The stream would have blocked; some data remains queued.
    WouldBlock,
    /// Nothing was queued to begin with.
    Empty,
}

/// A classified inbound message, handed back to whoever is driving this
/// connection (directly, or through [`crate::transport::io_task::IoTask`]).
///
/// This is classification only. Reacting to a login request — verifying
/// credentials, deciding a session id, replaying from the message log — is
/// the [`crate::server::Server`]'s job, not this type's.
#[derive(Debug, Clone)]
pub enum InboundEvent {
    Debug(String),
    LoginRequest(LoginRequest),
    LoginAccepted(LoginAccepted),
    LoginRejected(LoginRejected),
    ServerHeartbeat,
    ClientHeartbeat,
    SequencedData { sequence_number: u64, payload: Vec<u8> },
    UnsequencedData { payload: Vec<u8> },
    LogoutRequest,
    EndOfSession,
}

/// Per-connection traffic counters.
#[derive(Debug, Clone, Default)]
pub struct ConnectionStats {
    pub messages_sent: u64,
    pub messages_received: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
}

/// One peer connection: either the server's view of one logged-in client,
/// or a client's view of its one server connection.
pub struct Connection {
    role: ConnectionRole,
    state: ConnectionState,
    stream: Box<dyn ByteStream>,
    decoder: Decoder,
    send_queue: VecDeque<Vec<u8>>,
    pending_send: Option<(Vec<u8>, usize)>,
    session_id: Option<String>,
    /// `ServerSide`: next sequence number to assign on `send_sequenced`.
    /// `ClientSide`: next sequence number expected on inbound sequenced data.
    sequence_number: u64,
    config: ConnectionConfig,
    stats: ConnectionStats,
    state_changed_at: Instant,
}

impl Connection {
    /// Wrap an accepted stream as the server's view of a not-yet-logged-in
    /// client.
    pub fn accept(stream: Box<dyn ByteStream>, config: ConnectionConfig) -> io::Result<Self> {
        stream.set_nonblocking(true)?;
        stream.set_nodelay(true).ok();
        Ok(Self {
            role: ConnectionRole::ServerSide,
            state: ConnectionState::Connecting,
            stream,
            decoder: Decoder::new(config.max_frame_size),
            send_queue: VecDeque::new(),
            pending_send: None,
            session_id: None,
            sequence_number: 1,
            config,
            stats: ConnectionStats::default(),
            state_changed_at: Instant::now(),
        })
    }

    /// Build the client's view of a connection and enqueue its login
    /// request. The caller still has to drive `flush()` for it to go out.
    pub fn connect(
        stream: Box<dyn ByteStream>,
        credentials: LoginCredentials,
        requested_session: String,
        requested_sequence_number: u64,
        config: ConnectionConfig,
    ) -> io::Result<Self> {
        stream.set_nonblocking(true)?;
        stream.set_nodelay(true).ok();
        let mut conn = Self {
            role: ConnectionRole::ClientSide,
            state: ConnectionState::Connecting,
            stream,
            decoder: Decoder::new(config.max_frame_size),
            send_queue: VecDeque::new(),
            pending_send: None,
            session_id: if requested_session.is_empty() {
                None
            } else {
                Some(requested_session.clone())
            },
            sequence_number: requested_sequence_number,
            config,
            stats: ConnectionStats::default(),
            state_changed_at: Instant::now(),
        };
        let login = LoginRequest {
            credentials,
            requested_session,
            requested_sequence_number,
        };
        conn.enqueue(PacketType::LoginRequest, login.encode());
        Ok(conn)
    }

    pub fn role(&self) -> ConnectionRole {
        self.role
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state.is_operational()
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn sequence_number(&self) -> u64 {
        self.sequence_number
    }

    pub fn stats(&self) -> &ConnectionStats {
        &self.stats
    }

    pub fn time_in_state(&self) -> std::time::Duration {
        self.state_changed_at.elapsed()
    }

    /// The underlying stream, for I/O task registration. Never written to
    /// directly by callers; go through `send_*`/`flush`.
    pub fn stream(&self) -> &dyn ByteStream {
        &*self.stream
    }

    fn set_state(&mut self, state: ConnectionState) {
        if self.state != state {
            self.state = state;
            self.state_changed_at = Instant::now();
        }
    }

    fn require_role(&self, role: ConnectionRole) -> Result<(), ConnectionError> {
        if self.role == role {
            Ok(())
        } else {
            Err(ConnectionError::WrongRole)
        }
    }

    fn require_connected(&self) -> Result<(), ConnectionError> {
        if self.state.is_operational() {
            Ok(())
        } else {
            Err(ConnectionError::NotConnected)
        }
    }

    fn enqueue(&mut self, packet_type: PacketType, payload: Vec<u8>) {
        self.enqueue_raw(Frame::new(packet_type, payload).encode());
    }

    /// Push an already wire-encoded frame directly onto the send queue.
    /// Used by the I/O task to relay a heartbeat-timer-triggered send
    /// without re-encoding it, and internally by every `send_*` helper.
    pub fn enqueue_raw(&mut self, encoded_frame: Vec<u8>) {
        self.send_queue.push_back(encoded_frame);
    }

    /// `ServerSide` only. Assigns and returns the next sequence number from
    /// this connection's own counter (standalone/test use; a `Server`
    /// assigns the number itself via [`Self::send_sequenced_numbered`] so
    /// every connection in its roster shares one counter).
    pub fn send_sequenced(&mut self, payload: &[u8]) -> Result<u64, ConnectionError> {
        self.require_role(ConnectionRole::ServerSide)?;
        self.require_connected()?;
        let seq = self.sequence_number;
        self.sequence_number += 1;
        self.enqueue(PacketType::SequencedData, payload.to_vec());
        Ok(seq)
    }

    /// `ServerSide` only. Sends a sequenced frame whose sequence number was
    /// already assigned elsewhere (by a [`crate::message_log::MessageLog`]).
    pub fn send_sequenced_numbered(&mut self, seq: u64, payload: &[u8]) -> Result<(), ConnectionError> {
        self.require_role(ConnectionRole::ServerSide)?;
        self.require_connected()?;
        if seq >= self.sequence_number {
            self.sequence_number = seq + 1;
        }
        self.enqueue(PacketType::SequencedData, payload.to_vec());
        Ok(())
    }

    /// Either role.
    pub fn send_unsequenced(&mut self, payload: &[u8]) -> Result<(), ConnectionError> {
        self.require_connected()?;
        self.enqueue(PacketType::UnsequencedData, payload.to_vec());
        Ok(())
    }

    /// `ServerSide` only.
    pub fn send_login_accepted(&mut self, session: String, sequence_number: u64) -> Result<(), ConnectionError> {
        self.require_role(ConnectionRole::ServerSide)?;
        let msg = LoginAccepted {
            session: session.clone(),
            sequence_number,
        };
        self.enqueue(PacketType::LoginAccepted, msg.encode());
        self.session_id = Some(session);
        self.sequence_number = sequence_number;
        self.set_state(ConnectionState::Connected);
        Ok(())
    }

    /// `ServerSide` only.
    pub fn send_login_rejected(&mut self, reason: RejectReason) -> Result<(), ConnectionError> {
        self.require_role(ConnectionRole::ServerSide)?;
        let msg = LoginRejected { reason };
        self.enqueue(PacketType::LoginRejected, msg.encode());
        Ok(())
    }

    /// `ClientSide` only.
    pub fn send_logout(&mut self) -> Result<(), ConnectionError> {
        self.require_role(ConnectionRole::ClientSide)?;
        self.enqueue(PacketType::LogoutRequest, Vec::new());
        Ok(())
    }

    /// `ServerSide` only.
    pub fn send_end_of_session(&mut self) -> Result<(), ConnectionError> {
        self.require_role(ConnectionRole::ServerSide)?;
        self.enqueue(PacketType::EndOfSession, Vec::new());
        Ok(())
    }

    /// The frame a heartbeat timer should enqueue for this connection's
    /// role. Exposed as a plain byte vector so a [`crate::heartbeat::HeartbeatTimer`]
    /// callback can post it through a channel without borrowing the
    /// connection across threads.
    pub fn heartbeat_frame(&self) -> Vec<u8> {
        let packet_type = match self.role {
            ConnectionRole::ServerSide => PacketType::ServerHeartbeat,
            ConnectionRole::ClientSide => PacketType::ClientHeartbeat,
        };
        Frame::new(packet_type, Vec::new()).encode()
    }

    /// Drain the outbound queue through the stream.
    pub fn flush(&mut self) -> io::Result<FlushResult> {
        if let Some((buf, offset)) = self.pending_send.take() {
            match self.write_from(&buf, offset) {
                Ok(true) => {}
                Ok(false) => return Ok(FlushResult::WouldBlock),
                Err(e) => {
                    self.handle_io_error(&e);
                    return Err(e);
                }
            }
        }

        if self.send_queue.is_empty() {
            return Ok(FlushResult::Empty);
        }

        while let Some(buf) = self.send_queue.pop_front() {
            match self.write_from(&buf, 0) {
                Ok(true) => {
                    self.stats.messages_sent += 1;
                    self.stats.bytes_sent += buf.len() as u64;
                }
                Ok(false) => {
                    self.pending_send = Some((buf, 0));
                    return Ok(FlushResult::WouldBlock);
                }
                Err(e) => {
                    self.handle_io_error(&e);
                    return Err(e);
                }
            }
        }
        Ok(FlushResult::Complete)
    }

    /// Write `buf[offset..]`, returning `Ok(true)` on full completion and
    /// `Ok(false)` on `WouldBlock` (with `pending_send` left for the caller
    /// to restore).
    fn write_from(&mut self, buf: &[u8], offset: usize) -> io::Result<bool> {
        let mut written = offset;
        loop {
            match self.stream.write(&buf[written..]) {
                Ok(0) => return Err(io::Error::from(io::ErrorKind::WriteZero)),
                Ok(n) => {
                    written += n;
                    if written == buf.len() {
                        return Ok(true);
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    self.pending_send = Some((buf.to_vec(), written));
                    return Ok(false);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }

    /// Decode and classify exactly one inbound frame, if one is fully
    /// available. Applies this connection's own state transitions (login
    /// accepted/rejected) before handing the event back.
    pub fn poll_recv(&mut self) -> io::Result<Option<InboundEvent>> {
        let frame = match self.decoder.decode(&mut self.stream) {
            Ok(Some(frame)) => frame,
            Ok(None) => return Ok(None),
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                self.set_state(ConnectionState::Disconnected);
                return Err(e);
            }
            Err(e) => {
                self.handle_io_error(&e);
                return Err(e);
            }
        };
        self.stats.messages_received += 1;
        self.stats.bytes_received += frame.payload.len() as u64;
        self.classify(frame).map(Some)
    }

    fn classify(&mut self, frame: Frame) -> io::Result<InboundEvent> {
        match frame.packet_type {
            PacketType::Debug => Ok(InboundEvent::Debug(
                String::from_utf8_lossy(&frame.payload).into_owned(),
            )),
            PacketType::LoginRequest => {
                let req = LoginRequest::decode(&frame.payload).map_err(io::Error::from)?;
                Ok(InboundEvent::LoginRequest(req))
            }
            PacketType::LoginAccepted => {
                let msg = LoginAccepted::decode(&frame.payload).map_err(io::Error::from)?;
                self.session_id = Some(msg.session.clone());
                self.sequence_number = msg.sequence_number;
                self.set_state(ConnectionState::Connected);
                Ok(InboundEvent::LoginAccepted(msg))
            }
            PacketType::LoginRejected => {
                let msg = LoginRejected::decode(&frame.payload).map_err(io::Error::from)?;
                self.set_state(ConnectionState::Disconnected);
                Ok(InboundEvent::LoginRejected(msg))
            }
            PacketType::ServerHeartbeat => Ok(InboundEvent::ServerHeartbeat),
            PacketType::ClientHeartbeat => Ok(InboundEvent::ClientHeartbeat),
            PacketType::SequencedData => {
                let seq = self.sequence_number;
                self.sequence_number += 1;
                Ok(InboundEvent::SequencedData {
                    sequence_number: seq,
                    payload: frame.payload,
                })
            }
            PacketType::UnsequencedData => Ok(InboundEvent::UnsequencedData { payload: frame.payload }),
            PacketType::LogoutRequest => Ok(InboundEvent::LogoutRequest),
            PacketType::EndOfSession => {
                self.set_state(ConnectionState::Disconnected);
                Ok(InboundEvent::EndOfSession)
            }
        }
    }

    fn handle_io_error(&mut self, _error: &io::Error) {
        self.set_state(ConnectionState::Disconnected);
    }

    /// Idempotent shutdown of the underlying stream.
    pub fn close(&mut self) {
        if self.state.is_terminal() {
            return;
        }
        let _ = self.stream.shutdown(std::net::Shutdown::Both);
        self.set_state(ConnectionState::Disconnected);
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("role", &self.role)
            .field("state", &self.state)
            .field("session_id", &self.session_id)
            .field("sequence_number", &self.sequence_number)
            .field("send_queue_len", &self.send_queue.len())
            .finish()
    }
}
