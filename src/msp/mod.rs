//! # MSP Wire Protocol Module
//!
//! Implementation of the MultiWii Serial Protocol (MSP v1) wire format.
//!
//! This module handles:
//! - Frame encoding (`$M` preamble, direction, size, id, payload, checksum)
//! - Streaming frame decoding with resynchronisation
//! - XOR checksum calculation
//! - Typed message payloads (identification, status, box names, RC, ...)

pub mod protocol;
pub mod checksum;
pub mod encoder;
pub mod decoder;
pub mod messages;
