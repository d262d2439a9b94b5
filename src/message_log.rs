// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Append-only sequenced message log backing a server's replay support.
//!
//! Every sequenced message a server sends is recorded here under its
//! sequence number before it ever reaches a socket, so a client that
//! reconnects and requests a resume point can be replayed exactly what it
//! missed regardless of whether it is still attached to the connection
//! that originally sent the message.

use std::collections::BTreeMap;

use parking_lot::Mutex;

/// Sequenced message store, keyed by the sequence number the server
/// assigned when it sent the message.
///
/// Reads and writes both go through the same lock so a `replay_from` call
/// never observes a partial append.
pub struct MessageLog {
    inner: Mutex<LogInner>,
}

struct LogInner {
    messages: BTreeMap<u64, Vec<u8>>,
    next_sequence_number: u64,
}

impl MessageLog {
    /// An empty log whose first appended message will be sequence number 1.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(LogInner {
                messages: BTreeMap::new(),
                next_sequence_number: 1,
            }),
        }
    }

    /// Append `payload`, assigning it the next sequence number, and return
    /// that number.
    pub fn append(&self, payload: Vec<u8>) -> u64 {
        let mut inner = self.inner.lock();
        let seq = inner.next_sequence_number;
        inner.messages.insert(seq, payload);
        inner.next_sequence_number = seq + 1;
        seq
    }

    /// The sequence number that will be assigned to the next appended
    /// message.
    pub fn next_sequence_number(&self) -> u64 {
        self.inner.lock().next_sequence_number
    }

    /// How many messages have been appended so far.
    pub fn len(&self) -> usize {
        self.inner.lock().messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All messages with sequence number `>= from`, in order. A `from` of
    /// `0` or `1` on a fresh log both mean "replay everything".
    pub fn replay_from(&self, from: u64) -> Vec<(u64, Vec<u8>)> {
        let inner = self.inner.lock();
        inner
            .messages
            .range(from.max(1)..)
            .map(|(seq, payload)| (*seq, payload.clone()))
            .collect()
    }

    /// Drop every message before `before`. A server may call this
    /// periodically to bound memory once it is confident no client will
    /// ever request a replay from that far back.
    pub fn truncate_before(&self, before: u64) {
        let mut inner = self.inner.lock();
        inner.messages.retain(|seq, _| *seq >= before);
    }
}

impl Default for MessageLog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_assigns_increasing_sequence_numbers() {
        let log = MessageLog::new();
        assert_eq!(log.append(b"a".to_vec()), 1);
        assert_eq!(log.append(b"b".to_vec()), 2);
        assert_eq!(log.append(b"c".to_vec()), 3);
        assert_eq!(log.len(), 3);
    }

    #[test]
    fn replay_from_start_returns_everything() {
        let log = MessageLog::new();
        log.append(b"a".to_vec());
        log.append(b"b".to_vec());
        let replayed = log.replay_from(0);
        assert_eq!(replayed, vec![(1, b"a".to_vec()), (2, b"b".to_vec())]);
    }

    #[test]
    fn replay_from_middle_skips_earlier_messages() {
        let log = MessageLog::new();
        log.append(b"a".to_vec());
        log.append(b"b".to_vec());
        log.append(b"c".to_vec());
        let replayed = log.replay_from(2);
        assert_eq!(replayed, vec![(2, b"b".to_vec()), (3, b"c".to_vec())]);
    }

    #[test]
    fn replay_from_beyond_end_is_empty() {
        let log = MessageLog::new();
        log.append(b"a".to_vec());
        assert!(log.replay_from(5).is_empty());
    }

    #[test]
    fn next_sequence_number_tracks_appends() {
        let log = MessageLog::new();
        assert_eq!(log.next_sequence_number(), 1);
        log.append(b"a".to_vec());
        assert_eq!(log.next_sequence_number(), 2);
    }

    #[test]
    fn truncate_before_drops_old_entries_but_keeps_counter() {
        let log = MessageLog::new();
        log.append(b"a".to_vec());
        log.append(b"b".to_vec());
        log.append(b"c".to_vec());
        log.truncate_before(3);
        assert_eq!(log.len(), 1);
        assert_eq!(log.next_sequence_number(), 4);
        assert_eq!(log.replay_from(0), vec![(3, b"c".to_vec())]);
    }

    #[test]
    fn empty_log_reports_empty() {
        let log = MessageLog::new();
        assert!(log.is_empty());
    }
}
