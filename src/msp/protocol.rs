//! # MSP Protocol Constants and Types
//!
//! Core protocol definitions for MSP v1 (MultiWii Serial Protocol).

/// MSP frame preamble (always `$M`)
pub const MSP_PREAMBLE: [u8; 2] = [b'$', b'M'];

/// Maximum MSP payload size (size field is a single byte)
pub const MSP_MAX_PAYLOAD_SIZE: usize = 255;

/// Number of RC inputs the firmware channel map covers
pub const MAX_MAPPABLE_RX_INPUTS: usize = 8;

/// Fixed motor count of the MultiWii motor command
pub const N_MOTOR: usize = 8;

/// Conventional RC pulse range lower bound (microseconds)
pub const RC_VALUE_MIN: u16 = 1000;

/// Conventional RC pulse midpoint (microseconds)
pub const RC_VALUE_CENTER: u16 = 1500;

/// Conventional RC pulse range upper bound (microseconds)
pub const RC_VALUE_MAX: u16 = 2000;

// Message identifiers (requests & replies)
pub const MSP_API_VERSION: u8 = 1;
pub const MSP_FEATURE: u8 = 36;
pub const MSP_SET_FEATURE: u8 = 37;
pub const MSP_RX_MAP: u8 = 64;
pub const MSP_REBOOT: u8 = 68;
pub const MSP_IDENT: u8 = 100;
pub const MSP_STATUS: u8 = 101;
pub const MSP_RAW_IMU: u8 = 102;
pub const MSP_MOTOR: u8 = 104;
pub const MSP_RC: u8 = 105;
pub const MSP_ATTITUDE: u8 = 108;
pub const MSP_ANALOG: u8 = 110;
pub const MSP_BOXNAMES: u8 = 116;

// Message identifiers (commands)
pub const MSP_SET_RAW_RC: u8 = 200;
pub const MSP_SET_MOTOR: u8 = 214;
pub const MSP_EEPROM_WRITE: u8 = 250;

/// Frame direction marker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Direction {
    /// Sent to the flight controller (request or command)
    Request = b'<',
    /// Sent by the flight controller (reply)
    Response = b'>',
    /// Sent by the flight controller when a message could not be processed
    Error = b'!',
}

impl Direction {
    /// Parse a direction byte, `None` for anything that is not `<`, `>` or `!`.
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            b'<' => Some(Direction::Request),
            b'>' => Some(Direction::Response),
            b'!' => Some(Direction::Error),
            _ => None,
        }
    }
}

/// Protocol capability advertised in the identification reply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum Capability {
    /// Receiver binding supported
    Bind = 1 << 0,
    /// Dynamic motor balancing supported
    DynBal = 1 << 2,
    /// Flaps supported
    Flap = 1 << 3,
    /// Navigation capable
    NavCap = 1 << 4,
    /// Extended auxiliary channels
    ExtAux = 1 << 5,
}

/// Capability flags decoded from the identification reply.
///
/// A fixed-size set over the closed [`Capability`] enumeration, stored as the
/// firmware bitmask it arrived as.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CapabilitySet(u32);

impl CapabilitySet {
    pub fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub fn bits(&self) -> u32 {
        self.0
    }

    /// Membership test, O(1), no I/O.
    pub fn contains(&self, cap: Capability) -> bool {
        self.0 & (cap as u32) != 0
    }
}

/// Physical sensor reported present by the firmware
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum Sensor {
    Accelerometer = 1 << 0,
    Barometer = 1 << 1,
    Magnetometer = 1 << 2,
    Gps = 1 << 3,
    Sonar = 1 << 4,
}

/// Sensor-presence flags decoded from the status reply.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SensorSet(u16);

impl SensorSet {
    pub fn from_bits(bits: u16) -> Self {
        Self(bits)
    }

    pub fn bits(&self) -> u16 {
        self.0
    }

    /// Membership test, O(1), no I/O.
    pub fn contains(&self, sensor: Sensor) -> bool {
        self.0 & (sensor as u16) != 0
    }
}

/// Firmware feature names, in bitmask bit order.
///
/// The feature-set messages carry a bitmask; bit `i` toggles `FEATURES[i]`.
pub const FEATURES: &[&str] = &[
    "RX_PPM",
    "VBAT",
    "INFLIGHT_ACC_CAL",
    "RX_SERIAL",
    "MOTOR_STOP",
    "SERVO_TILT",
    "SOFTSERIAL",
    "GPS",
    "FAILSAFE",
    "SONAR",
    "TELEMETRY",
    "CURRENT_METER",
    "3D",
    "RX_PARALLEL_PWM",
    "RX_MSP",
    "RSSI_ADC",
    "LED_STRIP",
    "DISPLAY",
    "ONESHOT125",
    "BLACKBOX",
    "CHANNEL_FORWARDING",
];

/// The mutually exclusive receiver-source features.
pub const RX_SOURCE_FEATURES: &[&str] = &["RX_MSP", "RX_PARALLEL_PWM", "RX_PPM", "RX_SERIAL"];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preamble() {
        assert_eq!(MSP_PREAMBLE, [0x24, 0x4D]); // "$M"
    }

    #[test]
    fn test_direction_roundtrip() {
        assert_eq!(Direction::from_byte(b'<'), Some(Direction::Request));
        assert_eq!(Direction::from_byte(b'>'), Some(Direction::Response));
        assert_eq!(Direction::from_byte(b'!'), Some(Direction::Error));
        assert_eq!(Direction::from_byte(b'M'), None);
    }

    #[test]
    fn test_message_ids() {
        assert_eq!(MSP_IDENT, 100);
        assert_eq!(MSP_STATUS, 101);
        assert_eq!(MSP_BOXNAMES, 116);
        assert_eq!(MSP_SET_RAW_RC, 200);
        assert_eq!(MSP_EEPROM_WRITE, 250);
    }

    #[test]
    fn test_capability_set_membership() {
        let caps = CapabilitySet::from_bits((Capability::Bind as u32) | (Capability::Flap as u32));
        assert!(caps.contains(Capability::Bind));
        assert!(caps.contains(Capability::Flap));
        assert!(!caps.contains(Capability::DynBal));
    }

    #[test]
    fn test_empty_capability_set() {
        let caps = CapabilitySet::default();
        assert!(!caps.contains(Capability::Bind));
        assert_eq!(caps.bits(), 0);
    }

    #[test]
    fn test_sensor_set_membership() {
        let sensors = SensorSet::from_bits(0b00101); // acc + mag
        assert!(sensors.contains(Sensor::Accelerometer));
        assert!(sensors.contains(Sensor::Magnetometer));
        assert!(!sensors.contains(Sensor::Barometer));
        assert!(!sensors.contains(Sensor::Gps));
        assert!(!sensors.contains(Sensor::Sonar));
    }

    #[test]
    fn test_feature_table_bit_positions() {
        // Bit positions the reconfiguration protocol relies on
        assert_eq!(FEATURES[0], "RX_PPM");
        assert_eq!(FEATURES[3], "RX_SERIAL");
        assert_eq!(FEATURES[13], "RX_PARALLEL_PWM");
        assert_eq!(FEATURES[14], "RX_MSP");
        assert_eq!(FEATURES.len(), 21);
    }

    #[test]
    fn test_rx_source_features_are_known() {
        for name in RX_SOURCE_FEATURES {
            assert!(FEATURES.contains(name), "{} missing from feature table", name);
        }
    }
}
