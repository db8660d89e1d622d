//! # MSP Frame Decoder
//!
//! Streaming decoder for MSP v1 frames. Bytes arrive from the serial port in
//! arbitrary chunks; the parser buffers them, skips garbage before a
//! preamble, validates the checksum and yields one complete frame at a time.
//! A corrupt frame is dropped and the scan resumes one byte after the failed
//! preamble, so a noisy link cannot wedge the stream.

use bytes::{Buf, BytesMut};
use tracing::warn;

use super::checksum::msp_checksum;
use super::protocol::Direction;

/// A decoded MSP frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MspFrame {
    pub direction: Direction,
    pub id: u8,
    pub payload: Vec<u8>,
}

/// Streaming MSP frame parser.
///
/// # Examples
///
/// ```
/// use msp_bridge::msp::decoder::FrameParser;
/// use msp_bridge::msp::encoder::encode_request;
///
/// let mut parser = FrameParser::new();
/// parser.extend(&encode_request(100));
/// let frame = parser.next_frame().expect("one frame buffered");
/// assert_eq!(frame.id, 100);
/// assert!(parser.next_frame().is_none());
/// ```
#[derive(Debug, Default)]
pub struct FrameParser {
    buf: BytesMut,
    checksum_errors: u64,
}

impl FrameParser {
    pub fn new() -> Self {
        Self {
            buf: BytesMut::with_capacity(512),
            checksum_errors: 0,
        }
    }

    /// Feed received bytes into the parser.
    pub fn extend(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Number of frames dropped due to checksum mismatch so far.
    pub fn checksum_errors(&self) -> u64 {
        self.checksum_errors
    }

    /// Pull the next complete frame out of the buffer, if any.
    ///
    /// Returns `None` when the buffer holds no complete frame yet; call
    /// [`extend`](Self::extend) with more bytes and try again.
    pub fn next_frame(&mut self) -> Option<MspFrame> {
        loop {
            self.skip_to_preamble();

            // Header: $ M dir size id
            if self.buf.len() < 5 {
                return None;
            }

            let direction = match Direction::from_byte(self.buf[2]) {
                Some(direction) => direction,
                None => {
                    // False preamble; resume scanning past the '$'
                    self.buf.advance(1);
                    continue;
                }
            };

            let size = self.buf[3] as usize;
            let frame_len = 6 + size;
            if self.buf.len() < frame_len {
                return None;
            }

            let id = self.buf[4];
            let payload = self.buf[5..5 + size].to_vec();
            let received_crc = self.buf[5 + size];
            let calculated_crc = msp_checksum(size as u8, id, &payload);

            if calculated_crc != received_crc {
                self.checksum_errors += 1;
                warn!(
                    "Dropping MSP frame id {}: checksum mismatch (expected 0x{:02X}, got 0x{:02X})",
                    id, calculated_crc, received_crc
                );
                self.buf.advance(1);
                continue;
            }

            self.buf.advance(frame_len);
            return Some(MspFrame {
                direction,
                id,
                payload,
            });
        }
    }

    /// Discard bytes until the buffer starts with `$M` (or is too short to tell).
    fn skip_to_preamble(&mut self) {
        while self.buf.len() >= 2 && &self.buf[..2] != b"$M" {
            self.buf.advance(1);
        }
        // A lone trailing '$' is kept; it may be the start of the next frame
        if self.buf.len() == 1 && self.buf[0] != b'$' {
            self.buf.advance(1);
        }
    }
}
