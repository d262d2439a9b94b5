// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Runtime configuration for connections and servers.
//!
//! SoupBinTCP has no persisted QoS/profile document format of its own, so
//! this is a pair of plain structs with `Default` impls, not a file loader.

use std::time::Duration;

use crate::codec::MAX_FRAME_SIZE;

/// The reference implementation hard-codes a one-second heartbeat.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(1);

/// Configuration shared by both connection roles.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Interval between outbound heartbeats.
    pub heartbeat_interval: Duration,
    /// Upper bound on a single frame's length field.
    pub max_frame_size: usize,
    /// How long `connect()` waits for the peer before giving up. Only
    /// meaningful to a caller wiring up its own `ByteStream`; this crate
    /// does not perform the connect itself.
    pub connect_timeout: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            max_frame_size: MAX_FRAME_SIZE,
            connect_timeout: Duration::from_secs(10),
        }
    }
}

/// Configuration for a [`crate::server::Server`].
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Config applied to every accepted connection.
    pub connection: ConnectionConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            connection: ConnectionConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_heartbeat_interval() {
        let cfg = ConnectionConfig::default();
        assert_eq!(cfg.heartbeat_interval, Duration::from_secs(1));
        assert_eq!(cfg.max_frame_size, MAX_FRAME_SIZE);
    }

    #[test]
    fn server_config_propagates_connection_defaults() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.connection.heartbeat_interval, Duration::from_secs(1));
    }
}
