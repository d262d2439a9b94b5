// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Bit-exact wire format checks against the protocol's published contract.

use soupbin::codec::{encode, PacketType};

#[test]
fn debug_frame_matches_published_wire_bytes() {
    let payload: Vec<u8> = (0..10).collect();
    let bytes = encode(PacketType::Debug, &payload);
    assert_eq!(
        bytes,
        vec![0x00, 0x0B, b'+', 0, 1, 2, 3, 4, 5, 6, 7, 8, 9]
    );
}

#[test]
fn empty_payload_frame_is_three_bytes() {
    let bytes = encode(PacketType::ServerHeartbeat, &[]);
    assert_eq!(bytes, vec![0x00, 0x01, b'H']);
}
