// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Pure wire codec for SoupBinTCP frames.
//!
//! A frame on the wire is a 2-byte big-endian length prefix, a 1-byte ASCII
//! packet type, and a payload. The length counts the type byte plus the
//! payload but not itself. Every other field in the protocol is fixed-width
//! ASCII, either left-justified space-padded ("ALPHA") or right-justified
//! space-padded decimal ("NUMERIC").
//!
//! This module does no I/O. [`Decoder`] is the only stateful piece, and it
//! is driven by a caller holding a `Read` (see [`Decoder::decode`]).

use crate::error::CodecError;
use std::io::{self, Read};

/// Default cap on a single frame's length field (protocol max: `u16::MAX`).
pub const MAX_FRAME_SIZE: usize = u16::MAX as usize;

/// The closed set of SoupBinTCP packet type bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketType {
    Debug,
    LoginRequest,
    LoginAccepted,
    LoginRejected,
    ServerHeartbeat,
    ClientHeartbeat,
    SequencedData,
    UnsequencedData,
    LogoutRequest,
    EndOfSession,
}

impl PacketType {
    /// The ASCII byte that represents this packet type on the wire.
    pub fn as_byte(self) -> u8 {
        match self {
            Self::Debug => b'+',
            Self::LoginRequest => b'L',
            Self::LoginAccepted => b'A',
            Self::LoginRejected => b'J',
            Self::ServerHeartbeat => b'H',
            Self::ClientHeartbeat => b'R',
            Self::SequencedData => b'S',
            Self::UnsequencedData => b'U',
            Self::LogoutRequest => b'O',
            Self::EndOfSession => b'Z',
        }
    }
}

impl TryFrom<u8> for PacketType {
    type Error = CodecError;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        match byte {
            b'+' => Ok(Self::Debug),
            b'L' => Ok(Self::LoginRequest),
            b'A' => Ok(Self::LoginAccepted),
            b'J' => Ok(Self::LoginRejected),
            b'H' => Ok(Self::ServerHeartbeat),
            b'R' => Ok(Self::ClientHeartbeat),
            b'S' => Ok(Self::SequencedData),
            b'U' => Ok(Self::UnsequencedData),
            b'O' => Ok(Self::LogoutRequest),
            b'Z' => Ok(Self::EndOfSession),
            other => Err(CodecError::UnknownPacketType(other)),
        }
    }
}

impl From<PacketType> for u8 {
    fn from(pt: PacketType) -> Self {
        pt.as_byte()
    }
}

/// A fully decoded SoupBinTCP frame: its type and the payload bytes after
/// the type byte (i.e. not including the length prefix or the type byte
/// itself).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub packet_type: PacketType,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn new(packet_type: PacketType, payload: Vec<u8>) -> Self {
        Self {
            packet_type,
            payload,
        }
    }

    /// Encode this frame as a standalone wire-ready buffer (length prefix
    /// included).
    pub fn encode(&self) -> Vec<u8> {
        encode(self.packet_type, &self.payload)
    }
}

/// Encode a packet type and payload into a standalone wire-ready buffer.
pub fn encode(packet_type: PacketType, payload: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(2 + 1 + payload.len());
    encode_into(packet_type, payload, &mut buf);
    buf
}

/// Largest payload `encode`/`encode_into` will accept. The 2-byte length
/// prefix covers the packet type byte plus the payload, so the payload
/// itself must leave room for that one byte under `u16::MAX`.
pub const MAX_PAYLOAD_LEN: usize = u16::MAX as usize - 1;

/// Encode into an existing buffer, appending rather than replacing.
///
/// `payload` must be at most [`MAX_PAYLOAD_LEN`] bytes; a longer payload
/// would overflow the 2-byte length prefix and silently wrap into a
/// corrupt, truncated frame.
pub fn encode_into(packet_type: PacketType, payload: &[u8], out: &mut Vec<u8>) {
    debug_assert!(
        payload.len() <= MAX_PAYLOAD_LEN,
        "payload of {} bytes exceeds MAX_PAYLOAD_LEN ({})",
        payload.len(),
        MAX_PAYLOAD_LEN
    );
    let body_len = 1 + payload.len();
    out.extend_from_slice(&(body_len as u16).to_be_bytes());
    out.push(packet_type.as_byte());
    out.extend_from_slice(payload);
}

/// Write `s` left-justified, space-padded, into `buf[offset..offset+width]`.
///
/// Truncates `s` to `width` bytes if it is longer.
pub fn write_alpha(buf: &mut [u8], offset: usize, width: usize, s: &str) {
    let field = &mut buf[offset..offset + width];
    field.fill(b' ');
    let bytes = s.as_bytes();
    let n = bytes.len().min(width);
    field[..n].copy_from_slice(&bytes[..n]);
}

/// Read an ALPHA field, trimming trailing padding spaces.
pub fn read_alpha(buf: &[u8], offset: usize, width: usize) -> String {
    let field = &buf[offset..offset + width];
    let trimmed = field
        .iter()
        .rposition(|&b| b != b' ')
        .map(|i| &field[..=i])
        .unwrap_or(&[]);
    String::from_utf8_lossy(trimmed).into_owned()
}

/// Write `n` right-justified, space-padded, into `buf[offset..offset+width]`.
pub fn write_numeric(buf: &mut [u8], offset: usize, width: usize, n: u64) {
    let field = &mut buf[offset..offset + width];
    field.fill(b' ');
    let digits = n.to_string();
    let len = digits.len().min(width);
    let start = width - len;
    field[start..].copy_from_slice(&digits.as_bytes()[digits.len() - len..]);
}

/// Read a NUMERIC field. A field of all spaces decodes as `0`.
pub fn read_numeric(buf: &[u8], offset: usize, width: usize) -> Result<u64, CodecError> {
    let field = &buf[offset..offset + width];
    let trimmed: &[u8] = {
        let start = field.iter().position(|&b| b != b' ').unwrap_or(field.len());
        &field[start..]
    };
    if trimmed.is_empty() {
        return Ok(0);
    }
    if !trimmed.iter().all(u8::is_ascii_digit) {
        return Err(CodecError::InvalidNumericField);
    }
    std::str::from_utf8(trimmed)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or(CodecError::InvalidNumericField)
}

/// Incremental decode state, so a partial TCP read never loses progress.
#[derive(Debug, Clone)]
enum ReadState {
    ReadingLength { buf: [u8; 2], have: usize },
    ReadingBody { expected_len: usize, buf: Vec<u8> },
}

impl Default for ReadState {
    fn default() -> Self {
        Self::ReadingLength {
            buf: [0; 2],
            have: 0,
        }
    }
}

/// Stateful incremental frame decoder driven against a `Read` source.
///
/// Survives being fed partial reads (e.g. a TCP stream returning fewer
/// bytes than requested, or `WouldBlock`) by resuming exactly where the
/// previous call left off.
#[derive(Debug, Clone)]
pub struct Decoder {
    state: ReadState,
    max_frame_size: usize,
    frames_decoded: u64,
    bytes_decoded: u64,
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new(MAX_FRAME_SIZE)
    }
}

impl Decoder {
    pub fn new(max_frame_size: usize) -> Self {
        Self {
            state: ReadState::default(),
            max_frame_size,
            frames_decoded: 0,
            bytes_decoded: 0,
        }
    }

    pub fn frames_decoded(&self) -> u64 {
        self.frames_decoded
    }

    pub fn bytes_decoded(&self) -> u64 {
        self.bytes_decoded
    }

    pub fn reset(&mut self) {
        self.state = ReadState::default();
    }

    /// Attempt to decode one frame from `reader`.
    ///
    /// Returns `Ok(None)` if the reader blocked or was interrupted before a
    /// full frame arrived (the decoder has remembered its progress and a
    /// later call will continue). Returns an `io::Error` of kind
    /// `InvalidData` for a framing violation (oversize length, unknown
    /// type byte) and `UnexpectedEof` if the stream ended mid-frame.
    pub fn decode<R: Read + ?Sized>(&mut self, reader: &mut R) -> io::Result<Option<Frame>> {
        loop {
            match &mut self.state {
                ReadState::ReadingLength { buf, have } => {
                    while *have < 2 {
                        match reader.read(&mut buf[*have..2]) {
                            Ok(0) => {
                                if *have == 0 {
                                    return Err(io::Error::from(io::ErrorKind::UnexpectedEof));
                                }
                                return Err(io::Error::new(
                                    io::ErrorKind::UnexpectedEof,
                                    "connection closed mid-length-prefix",
                                ));
                            }
                            Ok(n) => {
                                *have += n;
                                self.bytes_decoded += n as u64;
                            }
                            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(None),
                            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                            Err(e) => return Err(e),
                        }
                    }
                    let body_len = u16::from_be_bytes(*buf) as usize;
                    if body_len == 0 {
                        return Err(CodecError::Truncated.into());
                    }
                    if body_len > self.max_frame_size {
                        self.state = ReadState::default();
                        return Err(CodecError::FrameTooLarge(body_len).into());
                    }
                    self.state = ReadState::ReadingBody {
                        expected_len: body_len,
                        buf: Vec::with_capacity(body_len),
                    };
                }
                ReadState::ReadingBody { expected_len, buf } => {
                    while buf.len() < *expected_len {
                        let start = buf.len();
                        buf.resize(*expected_len, 0);
                        match reader.read(&mut buf[start..]) {
                            Ok(0) => {
                                return Err(io::Error::new(
                                    io::ErrorKind::UnexpectedEof,
                                    "connection closed mid-frame",
                                ));
                            }
                            Ok(n) => {
                                buf.truncate(start + n);
                                self.bytes_decoded += n as u64;
                            }
                            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                                buf.truncate(start);
                                return Ok(None);
                            }
                            Err(e) if e.kind() == io::ErrorKind::Interrupted => {
                                buf.truncate(start);
                                continue;
                            }
                            Err(e) => {
                                buf.truncate(start);
                                return Err(e);
                            }
                        }
                    }
                    let mut body = std::mem::take(buf);
                    let type_byte = body[0];
                    let payload = body.split_off(1);
                    let packet_type = match PacketType::try_from(type_byte) {
                        Ok(pt) => pt,
                        Err(e) => {
                            self.state = ReadState::default();
                            return Err(e.into());
                        }
                    };
                    self.state = ReadState::default();
                    self.frames_decoded += 1;
                    return Ok(Some(Frame::new(packet_type, payload)));
                }
            }
        }
    }
}
