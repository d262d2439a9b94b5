// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Error types for the SoupBinTCP session layer.
//!
//! Every error kind here ends in the same place: the owning connection is
//! closed locally. Nothing in this crate panics outside `#[cfg(test)]` code.

use std::fmt;
use std::io;

/// Errors that can occur while decoding or encoding a frame.
#[derive(Debug)]
pub enum CodecError {
    /// The length prefix claimed a frame larger than the configured max.
    FrameTooLarge(usize),
    /// The type byte did not match any known SoupBinTCP packet type.
    UnknownPacketType(u8),
    /// A NUMERIC field contained something other than ASCII digits/spaces.
    InvalidNumericField,
    /// The frame was shorter than its own field layout requires.
    Truncated,
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FrameTooLarge(len) => write!(f, "frame of {} bytes exceeds max frame size", len),
            Self::UnknownPacketType(b) => write!(f, "unknown packet type byte {:#04x}", b),
            Self::InvalidNumericField => write!(f, "invalid NUMERIC field"),
            Self::Truncated => write!(f, "frame truncated"),
        }
    }
}

impl std::error::Error for CodecError {}

impl From<CodecError> for io::Error {
    fn from(e: CodecError) -> Self {
        io::Error::new(io::ErrorKind::InvalidData, e.to_string())
    }
}

/// Errors produced by [`crate::connection::Connection`] operations.
#[derive(Debug)]
pub enum ConnectionError {
    /// The connection is not in the `Connected` state.
    NotConnected,
    /// The operation is not valid for this connection's role.
    WrongRole,
    /// Underlying I/O failure.
    Io(io::Error),
    /// Framing/decoding failure.
    Codec(CodecError),
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotConnected => write!(f, "connection is not connected"),
            Self::WrongRole => write!(f, "operation not valid for this connection's role"),
            Self::Io(e) => write!(f, "I/O error: {}", e),
            Self::Codec(e) => write!(f, "codec error: {}", e),
        }
    }
}

impl std::error::Error for ConnectionError {}

impl From<io::Error> for ConnectionError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<CodecError> for ConnectionError {
    fn from(e: CodecError) -> Self {
        Self::Codec(e)
    }
}

/// The two login rejection reasons defined by the protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginError {
    /// Credentials did not pass the [`crate::server::LoginVerifier`].
    NotAuthorized,
    /// The requested session id could not be resumed.
    SessionUnavailable,
}

impl fmt::Display for LoginError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotAuthorized => write!(f, "not authorized"),
            Self::SessionUnavailable => write!(f, "session not available"),
        }
    }
}

impl std::error::Error for LoginError {}

/// Server-level errors.
#[derive(Debug)]
pub enum ServerError {
    /// Underlying I/O failure (accept loop, etc).
    Io(io::Error),
    /// A named session was referenced but is not in the active roster.
    UnknownSession(String),
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {}", e),
            Self::UnknownSession(s) => write!(f, "unknown session: {}", s),
        }
    }
}

impl std::error::Error for ServerError {}

impl From<io::Error> for ServerError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}
