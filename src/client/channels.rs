// src/client/channels.rs
//
// Bookkeeping for the logical CAN channels opened on a connection.
// Pure data model: no I/O, mutated only by the engine operation that
// observed the corresponding adapter reply.

use std::collections::HashMap;

use serde::Serialize;

use crate::error::{Error, Result};
use crate::protocol::{Arbitration, ChannelProtocol};

/// One logical CAN channel multiplexed on the adapter connection.
///
/// Handles are adapter-assigned and opaque beyond equality.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Channel {
    pub handle: u8,
    pub protocol: ChannelProtocol,
    pub bitrate: u32,
    /// Data-phase bitrate; present only for FD protocols.
    pub data_bitrate: Option<u32>,
    /// Current arbitration filter, set after a successful `set_arbitration`.
    pub arbitration: Option<Arbitration>,
}

/// In-memory table of open channels, keyed by handle.
#[derive(Debug, Default)]
pub struct ChannelTable {
    channels: HashMap<u8, Channel>,
}

impl ChannelTable {
    pub fn new() -> ChannelTable {
        ChannelTable::default()
    }

    /// Record a freshly opened channel. At most one channel exists per
    /// handle; re-registering a handle replaces the stale entry.
    pub fn register(
        &mut self,
        handle: u8,
        protocol: ChannelProtocol,
        bitrate: u32,
        data_bitrate: Option<u32>,
    ) {
        self.channels.insert(
            handle,
            Channel {
                handle,
                protocol,
                bitrate,
                data_bitrate,
                arbitration: None,
            },
        );
    }

    /// Replace the arbitration filter of an open channel.
    pub fn set_arbitration(&mut self, handle: u8, arbitration: Arbitration) -> Result<()> {
        let channel = self
            .channels
            .get_mut(&handle)
            .ok_or(Error::UnknownChannel { handle })?;
        channel.arbitration = Some(arbitration);
        Ok(())
    }

    /// Drop a channel. Idempotent: forgetting an unknown handle is a no-op.
    pub fn forget(&mut self, handle: u8) -> bool {
        self.channels.remove(&handle).is_some()
    }

    pub fn get(&self, handle: u8) -> Option<&Channel> {
        self.channels.get(&handle)
    }

    /// Snapshot of the open channels, ordered by handle.
    pub fn snapshot(&self) -> Vec<Channel> {
        let mut channels: Vec<Channel> = self.channels.values().cloned().collect();
        channels.sort_by_key(|c| c.handle);
        channels
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn clear(&mut self) {
        self.channels.clear();
    }
}
