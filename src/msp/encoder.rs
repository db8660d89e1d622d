//! # MSP Frame Encoder
//!
//! Builds complete MSP v1 frames from a direction, message id and payload.

use super::checksum::msp_checksum;
use super::protocol::{Direction, MSP_MAX_PAYLOAD_SIZE, MSP_PREAMBLE};
use crate::error::{MspBridgeError, Result};

/// Encode a complete MSP frame.
///
/// Frame layout: `$M` + direction + size + id + payload + checksum.
///
/// # Arguments
///
/// * `direction` - Frame direction marker
/// * `id` - Message id
/// * `payload` - Payload bytes (max 255)
///
/// # Errors
///
/// Returns error if the payload exceeds the single-byte size field.
pub fn encode_frame(direction: Direction, id: u8, payload: &[u8]) -> Result<Vec<u8>> {
    if payload.len() > MSP_MAX_PAYLOAD_SIZE {
        return Err(MspBridgeError::Protocol(format!(
            "payload size {} exceeds maximum {}",
            payload.len(),
            MSP_MAX_PAYLOAD_SIZE
        )));
    }

    let size = payload.len() as u8;
    let mut frame = Vec::with_capacity(6 + payload.len());
    frame.extend_from_slice(&MSP_PREAMBLE);
    frame.push(direction as u8);
    frame.push(size);
    frame.push(id);
    frame.extend_from_slice(payload);
    frame.push(msp_checksum(size, id, payload));

    Ok(frame)
}

/// Encode a request frame (empty payload, `<` direction).
pub fn encode_request(id: u8) -> Vec<u8> {
    let mut frame = Vec::with_capacity(6);
    frame.extend_from_slice(&MSP_PREAMBLE);
    frame.push(Direction::Request as u8);
    frame.push(0);
    frame.push(id);
    frame.push(msp_checksum(0, id, &[]));
    frame
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::msp::protocol::MSP_IDENT;

    #[test]
    fn test_request_frame_layout() {
        let frame = encode_request(MSP_IDENT);

        // $ M < 0 100 crc
        assert_eq!(frame.len(), 6);
        assert_eq!(&frame[..2], b"$M");
        assert_eq!(frame[2], b'<');
        assert_eq!(frame[3], 0); // size
        assert_eq!(frame[4], 100); // id
        assert_eq!(frame[5], 100); // 0 ^ 100
    }

    #[test]
    fn test_command_frame_with_payload() {
        let payload = [0xDC, 0x05]; // 1500 LE
        let frame = encode_frame(Direction::Request, 200, &payload).unwrap();

        assert_eq!(frame.len(), 8);
        assert_eq!(frame[3], 2);
        assert_eq!(frame[4], 200);
        assert_eq!(&frame[5..7], &payload);
        assert_eq!(frame[7], 2 ^ 200 ^ 0xDC ^ 0x05);
    }

    #[test]
    fn test_response_direction_byte() {
        let frame = encode_frame(Direction::Response, 101, &[1]).unwrap();
        assert_eq!(frame[2], b'>');
    }

    #[test]
    fn test_payload_too_large() {
        let payload = vec![0u8; 256];
        assert!(encode_frame(Direction::Request, 200, &payload).is_err());
    }

    #[test]
    fn test_max_payload() {
        let payload = vec![0u8; 255];
        let frame = encode_frame(Direction::Request, 200, &payload).unwrap();
        assert_eq!(frame.len(), 6 + 255);
        assert_eq!(frame[3], 255);
    }
}
