// src/lib.rs
//
// ECUconnect: client engine for CANyonero CAN bus diagnostic adapters.
//
// The CANyonero protocol multiplexes typed binary PDUs (device info,
// voltage, ping, JSON-RPC, logical CAN channels, frame send/receive) over
// one byte-stream connection to the adapter. This crate provides the wire
// codec, the incremental stream reassembler, the transport boundary, and a
// client engine offering request/response operations with timeouts.
//
//   Transport -> PduStream -> PDU queue -> wait_for() callers
//   caller -> Pdu builder -> frame() -> Transport

pub mod addressing;
pub mod client;
pub mod error;
pub mod logging;
pub mod protocol;
pub mod transport;

pub use addressing::{Addressing, AddressingMode};
pub use client::{
    open_channel_with_retry, Channel, ChannelConfig, Client, ResponseMatcher, DEFAULT_TIMEOUT,
};
pub use error::{Error, Result};
pub use protocol::{
    Arbitration, ChannelProtocol, DeviceInfo, Pdu, PduType, ReceivedFrame, MAX_PDU_PAYLOAD,
    MAX_PDU_SIZE,
};
pub use transport::{Endpoint, StreamTransport, Transport, TransportKind, DEFAULT_ENDPOINT};
