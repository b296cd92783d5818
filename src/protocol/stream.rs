// src/protocol/stream.rs
//
// Incremental stream reassembler: turns arbitrary byte chunks from the
// transport into complete PDUs, resynchronizing across garbage.

use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::protocol::codec::{self, ScanResult};
use crate::protocol::{Pdu, MAX_PDU_SIZE};

/// Reassembles PDUs from a byte stream delivered in arbitrary chunks.
///
/// The internal buffer is owned exclusively by one reader; after every
/// [`feed`](PduStream::feed) it holds only bytes not yet resolved into a
/// PDU or discarded as resync garbage.
#[derive(Debug)]
pub struct PduStream {
    buffer: Vec<u8>,
    max_pdu_size: usize,
}

impl Default for PduStream {
    fn default() -> Self {
        PduStream::new(MAX_PDU_SIZE)
    }
}

impl PduStream {
    pub fn new(max_pdu_size: usize) -> PduStream {
        PduStream {
            buffer: Vec::with_capacity(4096),
            max_pdu_size,
        }
    }

    /// Append a chunk and drain every complete PDU it completes.
    ///
    /// A declared frame size above the configured maximum fails the whole
    /// stream with [`Error::FrameTooLarge`]; the connection must be torn
    /// down, per-frame skipping is not attempted.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<Vec<Pdu>> {
        self.buffer.extend_from_slice(chunk);
        let mut pdus = Vec::new();

        while !self.buffer.is_empty() {
            if let Some(declared) = codec::exceeds_max_pdu_size(&self.buffer, self.max_pdu_size)
            {
                return Err(Error::FrameTooLarge {
                    declared,
                    max: self.max_pdu_size,
                });
            }

            match codec::scan(&self.buffer) {
                ScanResult::CompleteFrame(len) => {
                    match Pdu::from_frame(&self.buffer[..len]) {
                        Ok(pdu) => pdus.push(pdu),
                        // Structurally framed but undecodable (e.g. a type
                        // byte outside the catalogue): protocol noise.
                        Err(e) => warn!("dropping undecodable frame: {e}"),
                    }
                    self.buffer.drain(..len);
                }
                ScanResult::Resync(drop) => {
                    debug!("resync: dropping {drop} garbage bytes");
                    self.buffer.drain(..drop);
                }
                ScanResult::NeedMoreBytes => break,
            }
        }
        Ok(pdus)
    }

    /// Bytes currently buffered awaiting the rest of a frame.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::PduType;
    use pretty_assertions::assert_eq;

    fn sample_pdus() -> Vec<Pdu> {
        vec![
            Pdu::ping(vec![0xA5; 8]),
            Pdu::new(PduType::Pong, vec![0xA5; 8]),
            Pdu::new(PduType::Voltage, vec![0x33, 0x45]),
            Pdu::request_info(),
            Pdu::send(0x01, &[0x02, 0x09, 0x02]),
        ]
    }

    #[test]
    fn test_single_chunk_many_pdus() {
        let pdus = sample_pdus();
        let mut wire = Vec::new();
        for pdu in &pdus {
            wire.extend_from_slice(&pdu.frame());
        }

        let mut stream = PduStream::default();
        let out = stream.feed(&wire).unwrap();
        assert_eq!(out, pdus);
        assert_eq!(stream.pending(), 0);
    }

    #[test]
    fn test_chunk_boundary_independence() {
        let pdus = sample_pdus();
        let mut wire = Vec::new();
        for pdu in &pdus {
            wire.extend_from_slice(&pdu.frame());
        }

        // Any chunking must produce the same ordered PDU list.
        for chunk_size in [1, 2, 3, 5, 7, 16, 64] {
            let mut stream = PduStream::default();
            let mut out = Vec::new();
            for chunk in wire.chunks(chunk_size) {
                out.extend(stream.feed(chunk).unwrap());
            }
            assert_eq!(out, pdus, "chunk size {chunk_size}");
            assert_eq!(stream.pending(), 0);
        }
    }

    #[test]
    fn test_resync_after_garbage() {
        let pdu = Pdu::ping(vec![1, 2, 3]);
        let mut wire = vec![0x00, 0xDE, 0xAD, 0xBE, 0xEF];
        wire.extend_from_slice(&pdu.frame());

        let mut stream = PduStream::default();
        let out = stream.feed(&wire).unwrap();
        assert_eq!(out, vec![pdu]);
        assert_eq!(stream.pending(), 0);
    }

    #[test]
    fn test_garbage_only_is_discarded() {
        let mut stream = PduStream::default();
        assert_eq!(stream.feed(&[0xDE, 0xAD, 0xBE, 0xEF]).unwrap(), vec![]);
        assert_eq!(stream.pending(), 0);
    }

    #[test]
    fn test_garbage_containing_marker_waits_for_header() {
        let mut stream = PduStream::default();
        // Trailing 0x1F could be the start of a frame; it must stay buffered.
        assert_eq!(stream.feed(&[0xAA, 0xBB, 0x1F]).unwrap(), vec![]);
        assert_eq!(stream.pending(), 1);

        let rest = &Pdu::request_info().frame()[1..];
        let out = stream.feed(rest).unwrap();
        assert_eq!(out, vec![Pdu::request_info()]);
    }

    #[test]
    fn test_oversize_frame_is_fatal() {
        // Header declares 0x200 payload bytes against a 0x100 cap; the
        // payload itself never needs to arrive.
        let mut stream = PduStream::new(0x100);
        let err = stream.feed(&[0x1F, 0x33, 0x02, 0x00]).unwrap_err();
        assert_eq!(
            err,
            Error::FrameTooLarge {
                declared: 0x204,
                max: 0x100
            }
        );
    }

    #[test]
    fn test_oversize_check_precedes_completion() {
        // Even a fully buffered, structurally valid frame above the limit
        // must fail rather than decode.
        let pdu = Pdu::ping(vec![0; 64]);
        let mut stream = PduStream::new(32);
        assert!(stream.feed(&pdu.frame()).is_err());
    }

    #[test]
    fn test_unknown_type_frame_dropped_stream_survives() {
        let good = Pdu::ping(vec![9]);
        let mut wire = vec![0x1F, 0x7E, 0x00, 0x01, 0xFF]; // unknown type 0x7E
        wire.extend_from_slice(&good.frame());

        let mut stream = PduStream::default();
        let out = stream.feed(&wire).unwrap();
        assert_eq!(out, vec![good]);
    }

    #[test]
    fn test_split_across_many_feeds() {
        let pdu = Pdu::ping((0u8..100).collect());
        let frame = pdu.frame();
        let mut stream = PduStream::default();

        let mut out = Vec::new();
        for byte in &frame {
            out.extend(stream.feed(std::slice::from_ref(byte)).unwrap());
        }
        assert_eq!(out, vec![pdu]);
    }
}
