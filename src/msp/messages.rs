//! # Typed MSP Messages
//!
//! Payload structs for the MSP messages this crate speaks, with decoding
//! from and encoding to raw payload bytes. All multi-byte fields are
//! little-endian on the wire.

use super::protocol::{
    CapabilitySet, SensorSet, MAX_MAPPABLE_RX_INPUTS, MSP_ANALOG, MSP_API_VERSION, MSP_ATTITUDE,
    MSP_BOXNAMES, MSP_EEPROM_WRITE, MSP_FEATURE, MSP_IDENT, MSP_MOTOR, MSP_RAW_IMU, MSP_RC,
    MSP_REBOOT, MSP_RX_MAP, MSP_SET_FEATURE, MSP_SET_MOTOR, MSP_SET_RAW_RC, MSP_STATUS, N_MOTOR,
};
use crate::error::{MspBridgeError, Result};

/// Association between a payload type and its wire message id.
pub trait MspMessage {
    const ID: u8;
}

/// Decode a payload into a typed message.
pub trait Decode: Sized {
    fn decode(payload: &[u8]) -> Result<Self>;
}

/// Encode a typed message into a payload.
pub trait Encode {
    fn encode(&self) -> Vec<u8>;
}

fn short_payload(what: &str, payload: &[u8]) -> MspBridgeError {
    MspBridgeError::Protocol(format!("{} payload too short: {} bytes", what, payload.len()))
}

fn u16_at(payload: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([payload[offset], payload[offset + 1]])
}

fn i16_at(payload: &[u8], offset: usize) -> i16 {
    i16::from_le_bytes([payload[offset], payload[offset + 1]])
}

fn u32_at(payload: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        payload[offset],
        payload[offset + 1],
        payload[offset + 2],
        payload[offset + 3],
    ])
}

/// MSP_API_VERSION reply. Only Cleanflight-family firmware answers this,
/// which is what makes it usable as a firmware-kind probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApiVersion {
    pub protocol: u8,
    pub major: u8,
    pub minor: u8,
}

impl MspMessage for ApiVersion {
    const ID: u8 = MSP_API_VERSION;
}

impl Decode for ApiVersion {
    fn decode(payload: &[u8]) -> Result<Self> {
        if payload.len() < 3 {
            return Err(short_payload("api version", payload));
        }
        Ok(Self {
            protocol: payload[0],
            major: payload[1],
            minor: payload[2],
        })
    }
}

/// MSP_IDENT reply: firmware version, craft type and capability bitset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ident {
    /// Firmware version (e.g. 231 for MultiWii 2.31)
    pub version: u8,
    /// Multirotor/craft type code
    pub multitype: u8,
    /// MSP protocol version
    pub msp_version: u8,
    /// Protocol capability flags
    pub capabilities: CapabilitySet,
}

impl MspMessage for Ident {
    const ID: u8 = MSP_IDENT;
}

impl Decode for Ident {
    fn decode(payload: &[u8]) -> Result<Self> {
        if payload.len() < 7 {
            return Err(short_payload("ident", payload));
        }
        Ok(Self {
            version: payload[0],
            multitype: payload[1],
            msp_version: payload[2],
            capabilities: CapabilitySet::from_bits(u32_at(payload, 3)),
        })
    }
}

/// MSP_STATUS reply: loop timing, sensor presence and the active-box bitset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Status {
    /// Main loop cycle time in microseconds
    pub cycle_time: u16,
    /// I2C error counter
    pub i2c_errors: u16,
    /// Sensor-presence flags
    pub sensors: SensorSet,
    /// Active-status bitset; bit positions follow box-name reply order
    pub active_boxes: u32,
    /// Currently selected configuration profile
    pub config_profile: u8,
}

impl MspMessage for Status {
    const ID: u8 = MSP_STATUS;
}

impl Decode for Status {
    fn decode(payload: &[u8]) -> Result<Self> {
        if payload.len() < 11 {
            return Err(short_payload("status", payload));
        }
        Ok(Self {
            cycle_time: u16_at(payload, 0),
            i2c_errors: u16_at(payload, 2),
            sensors: SensorSet::from_bits(u16_at(payload, 4)),
            active_boxes: u32_at(payload, 6),
            config_profile: payload[10],
        })
    }
}

/// MSP_BOXNAMES reply: the board's status names, `;`-separated in the order
/// that assigns their bit positions in [`Status::active_boxes`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoxNames {
    pub names: Vec<String>,
}

impl MspMessage for BoxNames {
    const ID: u8 = MSP_BOXNAMES;
}

impl Decode for BoxNames {
    fn decode(payload: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(payload)
            .map_err(|e| MspBridgeError::Protocol(format!("box names not UTF-8: {}", e)))?;
        // MultiWii terminates the list with a trailing ';'
        let names = text
            .split(';')
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .collect();
        Ok(Self { names })
    }
}

/// MSP_RX_MAP reply: the raw-channel index each logical RC input feeds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RxMap {
    pub map: Vec<u8>,
}

impl MspMessage for RxMap {
    const ID: u8 = MSP_RX_MAP;
}

impl Decode for RxMap {
    fn decode(payload: &[u8]) -> Result<Self> {
        if payload.len() < MAX_MAPPABLE_RX_INPUTS {
            return Err(short_payload("rx map", payload));
        }
        Ok(Self {
            map: payload[..MAX_MAPPABLE_RX_INPUTS].to_vec(),
        })
    }
}

impl RxMap {
    /// True when the map is a permutation of `0..MAX_MAPPABLE_RX_INPUTS`.
    pub fn is_permutation(&self) -> bool {
        let mut seen = [false; MAX_MAPPABLE_RX_INPUTS];
        for &idx in &self.map {
            match seen.get_mut(idx as usize) {
                Some(slot) if !*slot => *slot = true,
                _ => return false,
            }
        }
        self.map.len() == MAX_MAPPABLE_RX_INPUTS
    }
}

/// MSP_FEATURE reply: the live feature bitmask.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureMask {
    pub mask: u32,
}

impl MspMessage for FeatureMask {
    const ID: u8 = MSP_FEATURE;
}

impl Decode for FeatureMask {
    fn decode(payload: &[u8]) -> Result<Self> {
        if payload.len() < 4 {
            return Err(short_payload("feature mask", payload));
        }
        Ok(Self {
            mask: u32_at(payload, 0),
        })
    }
}

/// MSP_SET_FEATURE command: write a new feature bitmask.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetFeature {
    pub mask: u32,
}

impl MspMessage for SetFeature {
    const ID: u8 = MSP_SET_FEATURE;
}

impl Encode for SetFeature {
    fn encode(&self) -> Vec<u8> {
        self.mask.to_le_bytes().to_vec()
    }
}

/// MSP_SET_RAW_RC command: raw RC channel values in firmware order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetRawRc {
    pub channels: Vec<u16>,
}

impl MspMessage for SetRawRc {
    const ID: u8 = MSP_SET_RAW_RC;
}

impl Encode for SetRawRc {
    fn encode(&self) -> Vec<u8> {
        let mut payload = Vec::with_capacity(self.channels.len() * 2);
        for &value in &self.channels {
            payload.extend_from_slice(&value.to_le_bytes());
        }
        payload
    }
}

impl Decode for SetRawRc {
    fn decode(payload: &[u8]) -> Result<Self> {
        if payload.len() % 2 != 0 {
            return Err(MspBridgeError::Protocol(format!(
                "raw rc payload has odd length {}",
                payload.len()
            )));
        }
        let channels = payload.chunks_exact(2).map(|c| u16_at(c, 0)).collect();
        Ok(Self { channels })
    }
}

/// MSP_SET_MOTOR command: fixed-width motor outputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetMotor {
    pub motors: [u16; N_MOTOR],
}

impl MspMessage for SetMotor {
    const ID: u8 = MSP_SET_MOTOR;
}

impl Encode for SetMotor {
    fn encode(&self) -> Vec<u8> {
        let mut payload = Vec::with_capacity(N_MOTOR * 2);
        for &value in &self.motors {
            payload.extend_from_slice(&value.to_le_bytes());
        }
        payload
    }
}

/// MSP_RC telemetry: the RC channel values the firmware currently sees.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rc {
    pub channels: Vec<u16>,
}

impl MspMessage for Rc {
    const ID: u8 = MSP_RC;
}

impl Decode for Rc {
    fn decode(payload: &[u8]) -> Result<Self> {
        let channels = payload.chunks_exact(2).map(|c| u16_at(c, 0)).collect();
        Ok(Self { channels })
    }
}

/// MSP_MOTOR telemetry: current motor outputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Motor {
    pub motors: [u16; N_MOTOR],
}

impl MspMessage for Motor {
    const ID: u8 = MSP_MOTOR;
}

impl Decode for Motor {
    fn decode(payload: &[u8]) -> Result<Self> {
        if payload.len() < N_MOTOR * 2 {
            return Err(short_payload("motor", payload));
        }
        let mut motors = [0u16; N_MOTOR];
        for (i, value) in motors.iter_mut().enumerate() {
            *value = u16_at(payload, i * 2);
        }
        Ok(Self { motors })
    }
}

/// MSP_ATTITUDE telemetry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Attitude {
    /// Roll angle in degrees
    pub roll: f32,
    /// Pitch angle in degrees
    pub pitch: f32,
    /// Heading in degrees
    pub heading: i16,
}

impl MspMessage for Attitude {
    const ID: u8 = MSP_ATTITUDE;
}

impl Decode for Attitude {
    fn decode(payload: &[u8]) -> Result<Self> {
        if payload.len() < 6 {
            return Err(short_payload("attitude", payload));
        }
        // Angles arrive in tenths of a degree
        Ok(Self {
            roll: i16_at(payload, 0) as f32 / 10.0,
            pitch: i16_at(payload, 2) as f32 / 10.0,
            heading: i16_at(payload, 4),
        })
    }
}

/// MSP_ANALOG telemetry: battery and link quality.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Analog {
    /// Battery voltage in volts
    pub vbat: f32,
    /// Consumed capacity in mAh
    pub power_meter: u16,
    /// Receiver signal strength (0-1023)
    pub rssi: u16,
    /// Current draw in amperes
    pub amperage: f32,
}

impl MspMessage for Analog {
    const ID: u8 = MSP_ANALOG;
}

impl Decode for Analog {
    fn decode(payload: &[u8]) -> Result<Self> {
        if payload.len() < 7 {
            return Err(short_payload("analog", payload));
        }
        Ok(Self {
            // Voltage arrives in tenths of a volt, current in hundredths of an amp
            vbat: payload[0] as f32 / 10.0,
            power_meter: u16_at(payload, 1),
            rssi: u16_at(payload, 3),
            amperage: i16_at(payload, 5) as f32 / 100.0,
        })
    }
}

/// MSP_RAW_IMU telemetry: raw accelerometer/gyro/magnetometer vectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawImu {
    pub acc: [i16; 3],
    pub gyro: [i16; 3],
    pub mag: [i16; 3],
}

impl MspMessage for RawImu {
    const ID: u8 = MSP_RAW_IMU;
}

impl Decode for RawImu {
    fn decode(payload: &[u8]) -> Result<Self> {
        if payload.len() < 18 {
            return Err(short_payload("raw imu", payload));
        }
        let vec3 = |offset: usize| {
            [
                i16_at(payload, offset),
                i16_at(payload, offset + 2),
                i16_at(payload, offset + 4),
            ]
        };
        Ok(Self {
            acc: vec3(0),
            gyro: vec3(6),
            mag: vec3(12),
        })
    }
}

/// MSP_REBOOT command (no payload).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Reboot;

impl MspMessage for Reboot {
    const ID: u8 = MSP_REBOOT;
}

impl Encode for Reboot {
    fn encode(&self) -> Vec<u8> {
        Vec::new()
    }
}

/// MSP_EEPROM_WRITE command (no payload).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteEeprom;

impl MspMessage for WriteEeprom {
    const ID: u8 = MSP_EEPROM_WRITE;
}

impl Encode for WriteEeprom {
    fn encode(&self) -> Vec<u8> {
        Vec::new()
    }
}
