// src/protocol/codec.rs
//
// Wire codec for CANyonero frames.
//
// Frame format:
//   [ATT:1 = 0x1F][TYP:1][LEN:2 BE][payload...]
//
// Encoding is total and deterministic. Decoding validates structure only;
// size-limit enforcement belongs to the stream reassembler.

use crate::error::{Error, Result};
use crate::protocol::{Pdu, PduType, MAX_PDU_PAYLOAD, PDU_ATT, PDU_HEADER_SIZE};

/// Outcome of scanning a receive buffer for the next frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScanResult {
    /// The buffer holds the prefix of a frame; wait for more bytes.
    NeedMoreBytes,
    /// The first `n` bytes form one complete frame.
    CompleteFrame(usize),
    /// The first `n` bytes are garbage; drop them and scan again.
    Resync(usize),
}

/// Scan a buffer for the next complete frame.
///
/// Bytes before the first attention marker are reported as [`ScanResult::Resync`]
/// garbage; the caller drops them and rescans. Never inspects the payload.
pub fn scan(buffer: &[u8]) -> ScanResult {
    let att = match buffer.iter().position(|b| *b == PDU_ATT) {
        Some(pos) => pos,
        // No marker anywhere: the whole buffer is garbage.
        None => return ScanResult::Resync(buffer.len()),
    };
    if att > 0 {
        return ScanResult::Resync(att);
    }

    if buffer.len() < PDU_HEADER_SIZE {
        return ScanResult::NeedMoreBytes;
    }
    let length = u16::from_be_bytes([buffer[2], buffer[3]]) as usize;
    let total = PDU_HEADER_SIZE + length;
    if buffer.len() < total {
        return ScanResult::NeedMoreBytes;
    }
    ScanResult::CompleteFrame(total)
}

/// Whether the buffer already declares a frame larger than `max_pdu_size`.
///
/// Answerable as soon as the four header bytes are present, before the full
/// frame has arrived.
pub fn exceeds_max_pdu_size(buffer: &[u8], max_pdu_size: usize) -> Option<usize> {
    if buffer.len() < PDU_HEADER_SIZE || buffer[0] != PDU_ATT {
        return None;
    }
    let declared = PDU_HEADER_SIZE + u16::from_be_bytes([buffer[2], buffer[3]]) as usize;
    (declared > max_pdu_size).then_some(declared)
}

impl Pdu {
    /// Encode this PDU into its wire frame.
    pub fn frame(&self) -> Vec<u8> {
        debug_assert!(self.payload().len() <= MAX_PDU_PAYLOAD);
        let mut frame = Vec::with_capacity(PDU_HEADER_SIZE + self.payload().len());
        frame.push(PDU_ATT);
        frame.push(self.pdu_type() as u8);
        frame.extend_from_slice(&(self.payload().len() as u16).to_be_bytes());
        frame.extend_from_slice(self.payload());
        frame
    }

    /// Decode one complete frame. Fails on a missing marker, an inconsistent
    /// declared length, or a type byte outside the catalogue.
    pub fn from_frame(frame: &[u8]) -> Result<Pdu> {
        if frame.len() < PDU_HEADER_SIZE {
            return Err(Error::malformed(format!(
                "frame too short: {} bytes, need at least {}",
                frame.len(),
                PDU_HEADER_SIZE
            )));
        }
        if frame[0] != PDU_ATT {
            return Err(Error::malformed(format!(
                "invalid attention marker: {:02X}",
                frame[0]
            )));
        }
        let length = u16::from_be_bytes([frame[2], frame[3]]) as usize;
        if frame.len() != PDU_HEADER_SIZE + length {
            return Err(Error::malformed(format!(
                "declared payload length {} does not match frame of {} bytes",
                length,
                frame.len()
            )));
        }
        let pdu_type = PduType::from_wire(frame[1]).ok_or_else(|| {
            Error::malformed(format!("unknown PDU type byte: {:02X}", frame[1]))
        })?;
        Ok(Pdu::new(pdu_type, frame[PDU_HEADER_SIZE..].to_vec()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_encode_layout() {
        let frame = Pdu::ping(vec![0xA5; 4]).frame();
        assert_eq!(frame[0], 0x1F);
        assert_eq!(frame[1], 0x10);
        assert_eq!(frame[2], 0x00);
        assert_eq!(frame[3], 0x04);
        assert_eq!(&frame[4..], &[0xA5; 4]);
    }

    #[test]
    fn test_decode_encode_roundtrip() {
        let pdus = [
            Pdu::request_info(),
            Pdu::ping(vec![1, 2, 3]),
            Pdu::send(0x01, &[0x02, 0x10, 0x03]),
            Pdu::open_channel(crate::protocol::ChannelProtocol::Isotp, 500_000, 0, 0),
            Pdu::new(PduType::Voltage, vec![0x30, 0x39]),
            Pdu::new(PduType::Pong, Vec::new()),
        ];
        for pdu in pdus {
            assert_eq!(Pdu::from_frame(&pdu.frame()).unwrap(), pdu);
        }
    }

    #[test]
    fn test_decode_rejects_bad_marker() {
        assert!(Pdu::from_frame(&[0x20, 0x10, 0x00, 0x00]).is_err());
    }

    #[test]
    fn test_decode_rejects_length_mismatch() {
        // Declares 4 payload bytes but carries 2.
        assert!(Pdu::from_frame(&[0x1F, 0x10, 0x00, 0x04, 0xAA, 0xBB]).is_err());
    }

    #[test]
    fn test_decode_rejects_unknown_type() {
        assert!(Pdu::from_frame(&[0x1F, 0x7E, 0x00, 0x00]).is_err());
    }

    #[test]
    fn test_scan_empty_and_partial() {
        assert_eq!(scan(&[]), ScanResult::Resync(0));
        assert_eq!(scan(&[0x1F]), ScanResult::NeedMoreBytes);
        assert_eq!(scan(&[0x1F, 0x90, 0x00]), ScanResult::NeedMoreBytes);
        // Header complete, payload still in flight.
        assert_eq!(scan(&[0x1F, 0x90, 0x00, 0x02, 0xAA]), ScanResult::NeedMoreBytes);
    }

    #[test]
    fn test_scan_complete() {
        assert_eq!(scan(&[0x1F, 0x90, 0x00, 0x00]), ScanResult::CompleteFrame(4));
        assert_eq!(
            scan(&[0x1F, 0x90, 0x00, 0x02, 0xAA, 0xBB, 0x1F]),
            ScanResult::CompleteFrame(6)
        );
    }

    #[test]
    fn test_scan_garbage() {
        assert_eq!(scan(&[0x00, 0x01, 0x02]), ScanResult::Resync(3));
        assert_eq!(scan(&[0xFF, 0xFE, 0x1F, 0x90]), ScanResult::Resync(2));
    }

    #[test]
    fn test_exceeds_max_pdu_size() {
        // Declared 0x0100 payload against a 0x40 cap.
        let header = [0x1F, 0x33, 0x01, 0x00];
        assert_eq!(exceeds_max_pdu_size(&header, 0x40), Some(0x104));
        assert_eq!(exceeds_max_pdu_size(&header, 0x104), None);
        // Garbage prefixes and short buffers are not judged.
        assert_eq!(exceeds_max_pdu_size(&[0x00, 0x33, 0xFF, 0xFF], 0x40), None);
        assert_eq!(exceeds_max_pdu_size(&[0x1F, 0x33], 0x40), None);
    }
}
