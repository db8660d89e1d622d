//! # Feature Set Arithmetic
//!
//! Named views over the firmware feature bitmask and the target-set
//! computation used by the reconfiguration protocol.

use std::collections::HashSet;

use crate::error::{MspBridgeError, Result};
use crate::msp::protocol::FEATURES;

/// Outcome of a feature reconfiguration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeatureUpdate {
    /// The feature set changed; it was written, persisted and the firmware
    /// rebooted.
    Applied,
    /// The requested changes were already in effect; nothing was written.
    Unchanged,
}

/// Expand a firmware bitmask into the named features it enables.
///
/// Bits beyond the known feature table are ignored.
pub fn names_from_mask(mask: u32) -> HashSet<String> {
    FEATURES
        .iter()
        .enumerate()
        .filter(|(bit, _)| mask & (1 << bit) != 0)
        .map(|(_, name)| name.to_string())
        .collect()
}

/// Collapse named features into the firmware bitmask.
///
/// # Errors
///
/// Returns a protocol error for a name the firmware feature table does not
/// define, since it has no bit to set.
pub fn mask_from_names(names: &HashSet<String>) -> Result<u32> {
    let mut mask = 0u32;
    for name in names {
        let bit = FEATURES
            .iter()
            .position(|known| known == name)
            .ok_or_else(|| MspBridgeError::Protocol(format!("unknown feature name: {}", name)))?;
        mask |= 1 << bit;
    }
    Ok(mask)
}

/// Compute the target feature set `(live ∖ remove) ∪ add`.
pub fn compute_target(
    live: &HashSet<String>,
    add: &HashSet<String>,
    remove: &HashSet<String>,
) -> HashSet<String> {
    live.difference(remove).cloned().chain(add.iter().cloned()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(names: &[&str]) -> HashSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_names_from_mask() {
        // bit 0 = RX_PPM, bit 1 = VBAT
        assert_eq!(names_from_mask(0b11), set(&["RX_PPM", "VBAT"]));
        assert_eq!(names_from_mask(0), HashSet::new());
    }

    #[test]
    fn test_names_from_mask_ignores_unknown_bits() {
        assert_eq!(names_from_mask(1 << 31), HashSet::new());
    }

    #[test]
    fn test_mask_roundtrip() {
        let names = set(&["RX_MSP", "FAILSAFE", "VBAT"]);
        let mask = mask_from_names(&names).unwrap();
        assert_eq!(names_from_mask(mask), names);
    }

    #[test]
    fn test_mask_from_unknown_name() {
        assert!(mask_from_names(&set(&["NOT_A_FEATURE"])).is_err());
    }

    #[test]
    fn test_compute_target_add_and_remove() {
        let live = set(&["RX_SERIAL", "VBAT"]);
        let target = compute_target(&live, &set(&["RX_MSP"]), &set(&["RX_SERIAL"]));
        assert_eq!(target, set(&["RX_MSP", "VBAT"]));
    }

    #[test]
    fn test_compute_target_empty_sets_is_identity() {
        let live = set(&["VBAT"]);
        assert_eq!(compute_target(&live, &HashSet::new(), &HashSet::new()), live);
    }

    #[test]
    fn test_compute_target_removing_inactive_is_identity() {
        let live = set(&["VBAT"]);
        let target = compute_target(&live, &set(&["VBAT"]), &set(&["GPS"]));
        assert_eq!(target, live);
    }

    #[test]
    fn test_add_wins_over_remove() {
        // A name in both sets ends up present: removal applies to the live
        // set, addition applies after
        let live = set(&["VBAT"]);
        let target = compute_target(&live, &set(&["VBAT"]), &set(&["VBAT"]));
        assert_eq!(target, set(&["VBAT"]));
    }
}
