//! # MSP Bridge Library
//!
//! Session-layer client for flight-controller firmware speaking the
//! MultiWii Serial Protocol (MSP) over a point-to-point serial link.
//!
//! This library provides board identity and capability discovery, sensor
//! presence queries, named-status polling, RC/motor command issuance with
//! channel remapping, a persisted feature-toggle protocol, and a blocking
//! arm/disarm handshake on top of a subscription-based transport client.

pub mod config;
pub mod error;
pub mod msp;
pub mod client;
pub mod serial;
pub mod fc;
