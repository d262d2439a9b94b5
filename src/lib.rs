// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # soupbin - SoupBinTCP session layer
//!
//! A pure Rust implementation of the SoupBinTCP session-layer protocol: a
//! lightweight framing and session-management protocol carried over a
//! reliable, ordered, duplex byte stream (normally TCP). SoupBinTCP sits
//! between a publisher ("server") and one or more subscribers ("clients").
//!
//! ## Quick Start
//!
//! ```no_run
//! use soupbin::config::ConnectionConfig;
//! use soupbin::connection::Connection;
//! use soupbin::messages::LoginCredentials;
//! use std::net::TcpStream;
//!
//! # fn main() -> std::io::Result<()> {
//! let stream = TcpStream::connect("127.0.0.1:9012")?;
//! let credentials = LoginCredentials {
//!     username: "user1".into(),
//!     password: "pass1".into(),
//! };
//! let mut conn = Connection::connect(
//!     Box::new(stream),
//!     credentials,
//!     String::new(),
//!     0,
//!     ConnectionConfig::default(),
//! )?;
//! conn.flush()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! +-------------------------------------------------------------------+
//! |                         Application Layer                         |
//! |     opaque payload bytes handed to send_sequenced/send_unsequenced |
//! +-------------------------------------------------------------------+
//! |                          Session Layer (this crate)                |
//! |   Codec | HeartbeatTimer | Connection | MessageLog | Server        |
//! +-------------------------------------------------------------------+
//! |                    Byte Stream (caller-supplied)                   |
//! |         TCP | TLS-wrapped TCP | in-memory pipe (tests)             |
//! +-------------------------------------------------------------------+
//! ```
//!
//! ## Key Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`connection::Connection`] | Per-peer session state machine, either role |
//! | [`server::Server`] | Accepts connections, verifies logins, fans out broadcasts |
//! | [`message_log::MessageLog`] | Append-only sequenced log backing replay |
//! | [`heartbeat::HeartbeatTimer`] | Dedicated-thread interval timer |
//! | [`codec::Decoder`] | Incremental frame decoder driven against a `Read` |
//!
//! ## Modules Overview
//!
//! - [`codec`] - Wire framing and the ALPHA/NUMERIC field conventions
//! - [`messages`] - Typed views over login/rejection payloads
//! - [`connection`] - Per-peer connection state machine (both roles)
//! - [`heartbeat`] - Interval timer driving liveness traffic
//! - [`message_log`] - Server-side sequenced broadcast log with replay
//! - [`server`] - Accept loop, login verification, roster, fan-out
//! - [`transport`] - Abstract duplex stream and the non-blocking I/O task
//! - [`config`] - Plain configuration structs for connections and servers
//! - [`error`] - The crate's error hierarchy
//! - [`logging`] - Compile-time configurable logging system (zero-cost when disabled)

/// Runtime configuration for connections and servers.
pub mod config;
/// Pure wire codec: framing, packet types, and ALPHA/NUMERIC field helpers.
pub mod codec;
/// Per-peer connection state machine covering both protocol roles.
pub mod connection;
/// The crate's error hierarchy (`CodecError`, `ConnectionError`, `LoginError`, `ServerError`).
pub mod error;
/// Dedicated-thread interval timer used for heartbeat scheduling.
pub mod heartbeat;
/// Compile-time configurable logging system (zero-cost when disabled).
pub mod logging;
/// Append-only sequenced message log backing a server's replay support.
pub mod message_log;
/// Typed views over the login/login-accepted/login-rejected payloads.
pub mod messages;
/// Accepts connections, verifies logins, and fans sequenced/unsequenced broadcasts out.
pub mod server;
/// Transport-facing pieces: the abstract duplex stream trait and the I/O task.
pub mod transport;

pub use codec::{Decoder, Frame, PacketType};
pub use config::{ConnectionConfig, ServerConfig};
pub use connection::{Connection, ConnectionRole, ConnectionState, InboundEvent};
pub use error::{CodecError, ConnectionError, LoginError, ServerError};
pub use message_log::MessageLog;
pub use messages::{LoginAccepted, LoginCredentials, LoginRejected, LoginRequest, RejectReason};
pub use server::{AnyLoginVerifier, Listener, LoginVerifier, Server};
