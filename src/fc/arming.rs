//! # Arm/Disarm Handshake Support
//!
//! The phase machine for the blocking arm/disarm handshake and the MultiWii
//! stick command that requests the transition.

use crate::msp::protocol::{MAX_MAPPABLE_RX_INPUTS, RC_VALUE_CENTER, RC_VALUE_MAX, RC_VALUE_MIN};

/// Where the arm/disarm handshake currently stands.
///
/// `arm`/`disarm` move to the requested phase; the blocking variants settle
/// on `Armed`/`Disarmed` once the board confirms, or `Failed` when the
/// deadline elapses or FAILSAFE is raised while awaiting arm.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ArmPhase {
    #[default]
    Disarmed,
    ArmRequested,
    Armed,
    DisarmRequested,
    Failed,
}

/// Logical channel values for the arm/disarm stick command: throttle at the
/// bottom with yaw full right to arm, yaw full left to disarm.
pub fn arm_stick_values(arm: bool) -> [u16; MAX_MAPPABLE_RX_INPUTS] {
    let yaw = if arm { RC_VALUE_MAX } else { RC_VALUE_MIN };
    [
        RC_VALUE_CENTER, // roll
        RC_VALUE_CENTER, // pitch
        yaw,
        RC_VALUE_MIN, // throttle
        RC_VALUE_MIN, // aux1..aux4
        RC_VALUE_MIN,
        RC_VALUE_MIN,
        RC_VALUE_MIN,
    ]
}
