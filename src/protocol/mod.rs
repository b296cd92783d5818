// src/protocol/mod.rs
//
// CANyonero binary protocol: PDU type catalogue, request builders and reply
// accessors.
//
// Protocol unit on the wire:
//   [ATT:1][TYP:1][LEN:2 BE][payload...]
//
// ATT is hardcoded to 0x1F. The header is 4 bytes, the maximum payload
// length is 0xFFFF, therefore the maximum PDU length is 0x10003.

pub mod codec;
pub mod rpc;
pub mod stream;

use serde::Serialize;

use crate::error::{Error, Result};

/// Frame attention marker, first byte of every frame.
pub const PDU_ATT: u8 = 0x1F;
/// Fixed header length: ATT + type + 16-bit payload length.
pub const PDU_HEADER_SIZE: usize = 4;
/// Maximum payload length expressible in the 16-bit length field.
pub const MAX_PDU_PAYLOAD: usize = 0xFFFF;
/// Maximum encoded frame length: header plus maximum payload.
pub const MAX_PDU_SIZE: usize = PDU_HEADER_SIZE + MAX_PDU_PAYLOAD;

/// PDU types, as sent on the wire in the TYP header byte.
///
/// Commands (tester -> adapter) live in 0x10..0x43, positive replies in
/// 0x80..0xB7, negative replies in 0xE0..0xEF.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[repr(u8)]
pub enum PduType {
    /// Tests the command processor. May carry an arbitrary payload which
    /// the adapter echoes back in `Pong`.
    Ping = 0x10,
    /// Requests the device information record.
    RequestInfo = 0x11,
    /// Requests the battery voltage.
    ReadVoltage = 0x12,
    /// Opens a logical channel: protocol, bitrate, separation times.
    OpenChannel = 0x30,
    /// Closes a logical channel by handle.
    CloseChannel = 0x31,
    /// Opens an FD-capable logical channel: adds the data-phase bitrate.
    OpenFdChannel = 0x32,
    /// Sends vehicle protocol data over a logical channel.
    Send = 0x33,
    /// Sets request/reply arbitration for a logical channel.
    SetArbitration = 0x34,
    /// Begins sending a periodic out-of-band message.
    StartPeriodicMessage = 0x35,
    /// Ends a periodic message by handle.
    EndPeriodicMessage = 0x36,
    /// Like `Send`, with an LZ4-compressed payload.
    SendCompressed = 0x37,
    /// JSON-RPC call carried as a UTF-8 payload.
    RpcCall = 0x38,
    /// Reboots the adapter.
    Reset = 0x43,

    /// Generic positive acknowledgement.
    Ok = 0x80,
    /// Reply to `Ping`, echoing its payload.
    Pong = 0x90,
    /// Device information: five newline-separated UTF-8 strings.
    Info = 0x91,
    /// Battery voltage in millivolts (u16 BE).
    Voltage = 0x92,
    /// Channel opened; payload starts with the new handle.
    ChannelOpened = 0xB0,
    /// Channel closed; payload starts with the handle.
    ChannelClosed = 0xB1,
    /// Data received on a channel: handle, CAN id, extension, data.
    Received = 0xB2,
    /// Like `Received`, with the data LZ4-compressed.
    ReceivedCompressed = 0xB3,
    /// Periodic message registered; payload carries its handle.
    PeriodicMessageStarted = 0xB5,
    /// Periodic message stopped; payload carries its handle.
    PeriodicMessageEnded = 0xB6,
    /// JSON-RPC response carried as a UTF-8 payload.
    RpcResponse = 0xB7,

    /// Unspecified error, e.g. a protocol violation.
    ErrorUnspecified = 0xE0,
    /// Hardware error, e.g. a bitrate that could not be set.
    ErrorHardware = 0xE1,
    /// Invalid channel selected.
    ErrorInvalidChannel = 0xE2,
    /// Invalid periodic message handle.
    ErrorInvalidPeriodic = 0xE3,
    /// No response received from the vehicle side.
    ErrorNoResponse = 0xE4,
    /// Malformed or unsupported RPC call.
    ErrorInvalidRpc = 0xE5,
    /// Invalid command sent.
    ErrorInvalidCommand = 0xEF,
}

impl PduType {
    /// Map a wire type byte back to the catalogue.
    pub fn from_wire(byte: u8) -> Option<PduType> {
        use PduType as T;
        Some(match byte {
            0x10 => T::Ping,
            0x11 => T::RequestInfo,
            0x12 => T::ReadVoltage,
            0x30 => T::OpenChannel,
            0x31 => T::CloseChannel,
            0x32 => T::OpenFdChannel,
            0x33 => T::Send,
            0x34 => T::SetArbitration,
            0x35 => T::StartPeriodicMessage,
            0x36 => T::EndPeriodicMessage,
            0x37 => T::SendCompressed,
            0x38 => T::RpcCall,
            0x43 => T::Reset,
            0x80 => T::Ok,
            0x90 => T::Pong,
            0x91 => T::Info,
            0x92 => T::Voltage,
            0xB0 => T::ChannelOpened,
            0xB1 => T::ChannelClosed,
            0xB2 => T::Received,
            0xB3 => T::ReceivedCompressed,
            0xB5 => T::PeriodicMessageStarted,
            0xB6 => T::PeriodicMessageEnded,
            0xB7 => T::RpcResponse,
            0xE0 => T::ErrorUnspecified,
            0xE1 => T::ErrorHardware,
            0xE2 => T::ErrorInvalidChannel,
            0xE3 => T::ErrorInvalidPeriodic,
            0xE4 => T::ErrorNoResponse,
            0xE5 => T::ErrorInvalidRpc,
            0xEF => T::ErrorInvalidCommand,
            _ => return None,
        })
    }

    /// Whether this type is one of the negative reply codes.
    pub fn is_error(self) -> bool {
        matches!(
            self,
            PduType::ErrorUnspecified
                | PduType::ErrorHardware
                | PduType::ErrorInvalidChannel
                | PduType::ErrorInvalidPeriodic
                | PduType::ErrorNoResponse
                | PduType::ErrorInvalidRpc
                | PduType::ErrorInvalidCommand
        )
    }
}

/// Protocol spoken on a logical channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[repr(u8)]
#[serde(rename_all = "snake_case")]
pub enum ChannelProtocol {
    /// Raw CAN frames (max 8 bytes).
    Raw = 0x00,
    /// ISO 15765-2 (max 4095 bytes).
    Isotp = 0x01,
    /// ISO 9141 K-Line.
    KLine = 0x02,
    /// Raw CAN FD (max 64 bytes).
    RawFd = 0x03,
    /// ISO-TP over CAN FD.
    IsotpFd = 0x04,
    /// Raw CAN with automatic flow control.
    RawWithFc = 0x05,
    /// Ethernet frames.
    Enet = 0x06,
}

impl ChannelProtocol {
    /// FD-capable protocols require a data-phase bitrate when opening.
    pub fn is_fd(self) -> bool {
        matches!(self, ChannelProtocol::RawFd | ChannelProtocol::IsotpFd)
    }

    /// Parse the protocol names used on the command line.
    pub fn from_name(name: &str) -> Option<ChannelProtocol> {
        Some(match name.to_ascii_lowercase().as_str() {
            "raw" => ChannelProtocol::Raw,
            "isotp" => ChannelProtocol::Isotp,
            "kline" => ChannelProtocol::KLine,
            "raw_fd" => ChannelProtocol::RawFd,
            "isotp_fd" => ChannelProtocol::IsotpFd,
            "raw_with_fc" => ChannelProtocol::RawWithFc,
            "enet" => ChannelProtocol::Enet,
            _ => return None,
        })
    }
}

impl std::fmt::Display for ChannelProtocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ChannelProtocol::Raw => "raw",
            ChannelProtocol::Isotp => "isotp",
            ChannelProtocol::KLine => "kline",
            ChannelProtocol::RawFd => "raw_fd",
            ChannelProtocol::IsotpFd => "isotp_fd",
            ChannelProtocol::RawWithFc => "raw_with_fc",
            ChannelProtocol::Enet => "enet",
        };
        f.write_str(name)
    }
}

/// Request/reply addressing for a logical channel.
///
/// Serialized as `[request:4 BE][request_ext:1][reply_pattern:4 BE]
/// [reply_mask:4 BE][reply_ext:1]`, 14 bytes total.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Arbitration {
    /// Request (or source) CAN id.
    pub request: u32,
    /// Request extension byte (CAN extended addressing).
    pub request_extension: u8,
    /// Reply pattern (or destination) CAN id.
    pub reply_pattern: u32,
    /// Reply mask; bits set here must match between pattern and inbound id.
    pub reply_mask: u32,
    /// Reply extension byte.
    pub reply_extension: u8,
}

impl Arbitration {
    /// Serialized size in bytes.
    pub const SIZE: usize = 4 + 1 + 4 + 4 + 1;

    pub fn new(request: u32, reply_pattern: u32, reply_mask: u32) -> Self {
        Arbitration {
            request,
            request_extension: 0,
            reply_pattern,
            reply_mask,
            reply_extension: 0,
        }
    }

    /// Whether an inbound CAN id passes this filter.
    pub fn accepts(&self, rx_id: u32) -> bool {
        (rx_id & self.reply_mask) == (self.reply_pattern & self.reply_mask)
    }

    fn write_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.request.to_be_bytes());
        out.push(self.request_extension);
        out.extend_from_slice(&self.reply_pattern.to_be_bytes());
        out.extend_from_slice(&self.reply_mask.to_be_bytes());
        out.push(self.reply_extension);
    }

    /// Parse from a serialized 14-byte block.
    pub fn from_bytes(bytes: &[u8]) -> Result<Arbitration> {
        if bytes.len() < Self::SIZE {
            return Err(Error::malformed(format!(
                "arbitration block too short: {} bytes, need {}",
                bytes.len(),
                Self::SIZE
            )));
        }
        Ok(Arbitration {
            request: u32::from_be_bytes(bytes[0..4].try_into().unwrap()),
            request_extension: bytes[4],
            reply_pattern: u32::from_be_bytes(bytes[5..9].try_into().unwrap()),
            reply_mask: u32::from_be_bytes(bytes[9..13].try_into().unwrap()),
            reply_extension: bytes[13],
        })
    }
}

impl Default for Arbitration {
    fn default() -> Self {
        Arbitration {
            request: 0,
            request_extension: 0,
            reply_pattern: 0,
            reply_mask: 0xFFFF_FFFF,
            reply_extension: 0,
        }
    }
}

/// Device information record from an `Info` reply.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct DeviceInfo {
    pub vendor: String,
    pub model: String,
    pub hardware: String,
    pub serial: String,
    pub firmware: String,
}

impl DeviceInfo {
    /// Parse the newline-separated info payload. Missing trailing fields
    /// are left empty.
    pub fn from_payload(payload: &[u8]) -> DeviceInfo {
        let text = String::from_utf8_lossy(payload);
        let mut lines = text.split('\n');
        DeviceInfo {
            vendor: lines.next().unwrap_or_default().to_string(),
            model: lines.next().unwrap_or_default().to_string(),
            hardware: lines.next().unwrap_or_default().to_string(),
            serial: lines.next().unwrap_or_default().to_string(),
            firmware: lines.next().unwrap_or_default().to_string(),
        }
    }
}

/// A frame received on a logical channel, decoded from `Received` or
/// `ReceivedCompressed`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReceivedFrame {
    /// Channel handle the frame arrived on.
    pub channel: u8,
    /// CAN identifier.
    pub id: u32,
    /// Address extension byte.
    pub extension: u8,
    /// Frame data, decompressed if necessary.
    pub data: Vec<u8>,
}

/// Separation time (STmin) code table.
///
/// The open-channel PDU carries RX/TX separation times as 4-bit codes:
/// 0x00 = none, 0x01..0x06 = 1000..6000 us, 0x07..0x0F = 100..900 us.
pub fn separation_time_code_from_microseconds(microseconds: u16) -> u8 {
    match microseconds {
        0..=99 => 0x00,
        100..=199 => 0x07,
        200..=299 => 0x08,
        300..=399 => 0x09,
        400..=499 => 0x0A,
        500..=599 => 0x0B,
        600..=699 => 0x0C,
        700..=799 => 0x0D,
        800..=899 => 0x0E,
        900..=999 => 0x0F,
        1000..=1999 => 0x01,
        2000..=2999 => 0x02,
        3000..=3999 => 0x03,
        4000..=4999 => 0x04,
        5000..=5999 => 0x05,
        _ => 0x06,
    }
}

/// Inverse of [`separation_time_code_from_microseconds`]. Unknown codes
/// saturate to 6000 us.
pub fn microseconds_from_separation_time_code(code: u8) -> u16 {
    match code {
        0x00 => 0,
        0x01..=0x06 => code as u16 * 1000,
        0x07..=0x0F => (code as u16 - 6) * 100,
        _ => 6000,
    }
}

/// One protocol data unit: a type tag plus its raw payload.
///
/// Constructed either by the codec when decoding inbound frames or by the
/// request builders below; consumed once (encoded or matched) and dropped.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Pdu {
    pdu_type: PduType,
    payload: Vec<u8>,
}

impl Pdu {
    pub fn new(pdu_type: PduType, payload: Vec<u8>) -> Pdu {
        Pdu { pdu_type, payload }
    }

    pub fn pdu_type(&self) -> PduType {
        self.pdu_type
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    // ------------------------------------------------------------------
    // Request builders (tester -> adapter)
    // ------------------------------------------------------------------

    pub fn ping(payload: Vec<u8>) -> Pdu {
        Pdu::new(PduType::Ping, payload)
    }

    pub fn request_info() -> Pdu {
        Pdu::new(PduType::RequestInfo, Vec::new())
    }

    pub fn read_voltage() -> Pdu {
        Pdu::new(PduType::ReadVoltage, Vec::new())
    }

    pub fn reset() -> Pdu {
        Pdu::new(PduType::Reset, Vec::new())
    }

    pub fn open_channel(
        protocol: ChannelProtocol,
        bitrate: u32,
        rx_separation_code: u8,
        tx_separation_code: u8,
    ) -> Pdu {
        let mut payload = Vec::with_capacity(6);
        payload.push(protocol as u8);
        payload.extend_from_slice(&bitrate.to_be_bytes());
        // RX code in the high nibble, TX in the low nibble.
        payload.push((rx_separation_code << 4) | (tx_separation_code & 0x0F));
        Pdu::new(PduType::OpenChannel, payload)
    }

    pub fn open_fd_channel(
        protocol: ChannelProtocol,
        bitrate: u32,
        data_bitrate: u32,
        rx_separation_code: u8,
        tx_separation_code: u8,
    ) -> Pdu {
        let mut payload = Vec::with_capacity(10);
        payload.push(protocol as u8);
        payload.extend_from_slice(&bitrate.to_be_bytes());
        payload.extend_from_slice(&data_bitrate.to_be_bytes());
        payload.push((rx_separation_code << 4) | (tx_separation_code & 0x0F));
        Pdu::new(PduType::OpenFdChannel, payload)
    }

    pub fn close_channel(handle: u8) -> Pdu {
        Pdu::new(PduType::CloseChannel, vec![handle])
    }

    pub fn send(handle: u8, data: &[u8]) -> Pdu {
        let mut payload = Vec::with_capacity(1 + data.len());
        payload.push(handle);
        payload.extend_from_slice(data);
        Pdu::new(PduType::Send, payload)
    }

    /// Builds a `SendCompressed` PDU, compressing `data` with LZ4.
    pub fn send_compressed(handle: u8, data: &[u8]) -> Pdu {
        let compressed = lz4_flex::block::compress(data);
        let mut payload = Vec::with_capacity(3 + compressed.len());
        payload.push(handle);
        payload.extend_from_slice(&(data.len() as u16).to_be_bytes());
        payload.extend_from_slice(&compressed);
        Pdu::new(PduType::SendCompressed, payload)
    }

    pub fn set_arbitration(handle: u8, arbitration: &Arbitration) -> Pdu {
        let mut payload = Vec::with_capacity(1 + Arbitration::SIZE);
        payload.push(handle);
        arbitration.write_to(&mut payload);
        Pdu::new(PduType::SetArbitration, payload)
    }

    pub fn start_periodic_message(
        interval: u8,
        arbitration: &Arbitration,
        data: &[u8],
    ) -> Pdu {
        let mut payload = Vec::with_capacity(1 + Arbitration::SIZE + data.len());
        payload.push(interval);
        arbitration.write_to(&mut payload);
        payload.extend_from_slice(data);
        Pdu::new(PduType::StartPeriodicMessage, payload)
    }

    pub fn end_periodic_message(handle: u8) -> Pdu {
        Pdu::new(PduType::EndPeriodicMessage, vec![handle])
    }

    pub fn rpc_call(json: String) -> Pdu {
        Pdu::new(PduType::RpcCall, json.into_bytes())
    }

    // ------------------------------------------------------------------
    // Reply accessors (adapter -> tester)
    // ------------------------------------------------------------------

    /// Channel (or periodic message) handle carried in the first payload
    /// byte of handle-bearing PDUs.
    pub fn handle(&self) -> Result<u8> {
        self.payload
            .first()
            .copied()
            .ok_or_else(|| Error::malformed("PDU payload missing handle byte"))
    }

    /// Device information from an `Info` reply.
    pub fn device_info(&self) -> Result<DeviceInfo> {
        if self.pdu_type != PduType::Info {
            return Err(Error::malformed(format!(
                "expected Info PDU, got {:?}",
                self.pdu_type
            )));
        }
        Ok(DeviceInfo::from_payload(&self.payload))
    }

    /// Battery voltage in millivolts from a `Voltage` reply.
    pub fn voltage_millivolts(&self) -> Result<u16> {
        if self.pdu_type != PduType::Voltage || self.payload.len() < 2 {
            return Err(Error::malformed("invalid voltage payload"));
        }
        Ok(u16::from_be_bytes([self.payload[0], self.payload[1]]))
    }

    /// Decode a `Received` or `ReceivedCompressed` payload, decompressing
    /// the data portion for the latter.
    pub fn received_frame(&self) -> Result<ReceivedFrame> {
        if self.payload.len() < 6 {
            return Err(Error::malformed("received payload shorter than header"));
        }
        let channel = self.payload[0];
        let id = u32::from_be_bytes(self.payload[1..5].try_into().unwrap());
        let extension = self.payload[5];
        let data = match self.pdu_type {
            PduType::Received => self.payload[6..].to_vec(),
            PduType::ReceivedCompressed => {
                if self.payload.len() < 8 {
                    return Err(Error::malformed(
                        "compressed received payload missing length field",
                    ));
                }
                let uncompressed_len =
                    u16::from_be_bytes([self.payload[6], self.payload[7]]) as usize;
                lz4_flex::block::decompress(&self.payload[8..], uncompressed_len).map_err(
                    |e| Error::malformed(format!("LZ4 decompression failed: {e}")),
                )?
            }
            other => {
                return Err(Error::malformed(format!(
                    "expected Received PDU, got {other:?}"
                )))
            }
        };
        Ok(ReceivedFrame {
            channel,
            id,
            extension,
            data,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_pdu_type_wire_roundtrip() {
        for byte in 0..=0xFFu8 {
            if let Some(ty) = PduType::from_wire(byte) {
                assert_eq!(ty as u8, byte);
            }
        }
        assert_eq!(PduType::from_wire(0x38), Some(PduType::RpcCall));
        assert_eq!(PduType::from_wire(0xB7), Some(PduType::RpcResponse));
        assert_eq!(PduType::from_wire(0x44), None);
    }

    #[test]
    fn test_arbitration_acceptance() {
        let arb = Arbitration::new(0x7E0, 0x7E8, 0x7FF);
        assert!(arb.accepts(0x7E8));
        assert!(!arb.accepts(0x7E9));

        let wild = Arbitration::new(0x7E0, 0x7E0, 0x7F0);
        assert!(wild.accepts(0x7E0));
        assert!(wild.accepts(0x7E8));
        assert!(wild.accepts(0x7EF));
        assert!(!wild.accepts(0x7F0));
    }

    #[test]
    fn test_arbitration_bytes_roundtrip() {
        let arb = Arbitration {
            request: 0x18DA00F1,
            request_extension: 0x10,
            reply_pattern: 0x18DAF100,
            reply_mask: 0x1FFF_FFFF,
            reply_extension: 0x20,
        };
        let mut bytes = Vec::new();
        arb.write_to(&mut bytes);
        assert_eq!(bytes.len(), Arbitration::SIZE);
        assert_eq!(Arbitration::from_bytes(&bytes).unwrap(), arb);
    }

    #[test]
    fn test_separation_time_codes() {
        assert_eq!(separation_time_code_from_microseconds(0), 0x00);
        assert_eq!(separation_time_code_from_microseconds(150), 0x07);
        assert_eq!(separation_time_code_from_microseconds(900), 0x0F);
        assert_eq!(separation_time_code_from_microseconds(1000), 0x01);
        assert_eq!(separation_time_code_from_microseconds(5999), 0x05);
        assert_eq!(separation_time_code_from_microseconds(60000), 0x06);

        for code in 0x00..=0x0Fu8 {
            let us = microseconds_from_separation_time_code(code);
            assert_eq!(separation_time_code_from_microseconds(us), code);
        }
    }

    #[test]
    fn test_open_channel_payload_layout() {
        let pdu = Pdu::open_channel(ChannelProtocol::Raw, 500_000, 0x0A, 0x01);
        assert_eq!(pdu.pdu_type(), PduType::OpenChannel);
        assert_eq!(pdu.payload()[0], 0x00);
        assert_eq!(&pdu.payload()[1..5], &500_000u32.to_be_bytes());
        assert_eq!(pdu.payload()[5], 0xA1);
    }

    #[test]
    fn test_open_fd_channel_payload_layout() {
        let pdu = Pdu::open_fd_channel(ChannelProtocol::RawFd, 500_000, 2_000_000, 0, 0);
        assert_eq!(pdu.pdu_type(), PduType::OpenFdChannel);
        assert_eq!(pdu.payload().len(), 10);
        assert_eq!(pdu.payload()[0], 0x03);
        assert_eq!(&pdu.payload()[1..5], &500_000u32.to_be_bytes());
        assert_eq!(&pdu.payload()[5..9], &2_000_000u32.to_be_bytes());
    }

    #[test]
    fn test_device_info_parse() {
        let payload = b"Wired Square\nECUconnect\nESP32-S3 rev2\nSN0042\n1.4.0";
        let info = DeviceInfo::from_payload(payload);
        assert_eq!(info.vendor, "Wired Square");
        assert_eq!(info.model, "ECUconnect");
        assert_eq!(info.hardware, "ESP32-S3 rev2");
        assert_eq!(info.serial, "SN0042");
        assert_eq!(info.firmware, "1.4.0");

        let partial = DeviceInfo::from_payload(b"Vendor\nModel");
        assert_eq!(partial.vendor, "Vendor");
        assert_eq!(partial.firmware, "");
    }

    #[test]
    fn test_received_frame_decode() {
        let mut payload = vec![0x01];
        payload.extend_from_slice(&0x7E8u32.to_be_bytes());
        payload.push(0x00);
        payload.extend_from_slice(&[0x41, 0x0C, 0x1A, 0xF8]);
        let pdu = Pdu::new(PduType::Received, payload);

        let frame = pdu.received_frame().unwrap();
        assert_eq!(frame.channel, 0x01);
        assert_eq!(frame.id, 0x7E8);
        assert_eq!(frame.extension, 0x00);
        assert_eq!(frame.data, vec![0x41, 0x0C, 0x1A, 0xF8]);
    }

    #[test]
    fn test_received_compressed_frame_decode() {
        let data: Vec<u8> = (0..200u16).map(|i| (i % 7) as u8).collect();
        let compressed = lz4_flex::block::compress(&data);

        let mut payload = vec![0x02];
        payload.extend_from_slice(&0x123u32.to_be_bytes());
        payload.push(0x55);
        payload.extend_from_slice(&(data.len() as u16).to_be_bytes());
        payload.extend_from_slice(&compressed);
        let pdu = Pdu::new(PduType::ReceivedCompressed, payload);

        let frame = pdu.received_frame().unwrap();
        assert_eq!(frame.channel, 0x02);
        assert_eq!(frame.id, 0x123);
        assert_eq!(frame.extension, 0x55);
        assert_eq!(frame.data, data);
    }

    #[test]
    fn test_send_compressed_roundtrip() {
        let data = b"periodic tester present periodic tester present".to_vec();
        let pdu = Pdu::send_compressed(0x01, &data);
        assert_eq!(pdu.pdu_type(), PduType::SendCompressed);
        assert_eq!(pdu.payload()[0], 0x01);
        let uncompressed_len =
            u16::from_be_bytes([pdu.payload()[1], pdu.payload()[2]]) as usize;
        assert_eq!(uncompressed_len, data.len());
        let restored =
            lz4_flex::block::decompress(&pdu.payload()[3..], uncompressed_len).unwrap();
        assert_eq!(restored, data);
    }

    #[test]
    fn test_truncated_payload_accessors() {
        assert!(Pdu::new(PduType::Voltage, vec![0x12]).voltage_millivolts().is_err());
        assert!(Pdu::new(PduType::ChannelOpened, vec![]).handle().is_err());
        assert!(Pdu::new(PduType::Received, vec![0x01, 0x02]).received_frame().is_err());
    }
}
