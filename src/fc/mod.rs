//! # Flight Controller Session Module
//!
//! The session-layer controller on top of the transport client.
//!
//! This module handles:
//! - Connection wait and session initialisation (identity, sensors, box
//!   registry, channel map)
//! - Capability/sensor/status predicates
//! - RC and motor commands with logical-to-raw channel remapping
//! - The arm/disarm handshake with bounded confirmation polling
//! - The feature diff-and-commit protocol (write, persist, reboot,
//!   re-initialise)
//!
//! Session state (identity, sensors, box registry, channel map) is only
//! valid between `initialise()` and the next reboot. Every reboot (explicit
//! or as a side effect of a feature commit) invalidates it in bulk, and
//! queries made before re-initialisation answer conservatively (`false`) or
//! fail with a protocol error.

pub mod arming;
pub mod features;

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::client::{Client, SubscriptionInfo};
use crate::config::{Config, SessionConfig};
use crate::error::{MspBridgeError, Result};
use crate::msp::messages::{
    ApiVersion, Decode, Encode, FeatureMask, Ident, MspMessage, Reboot, RxMap, SetFeature,
    SetMotor, SetRawRc, Status, WriteEeprom,
};
use crate::msp::protocol::{
    Capability, Sensor, SensorSet, MAX_MAPPABLE_RX_INPUTS, N_MOTOR, RX_SOURCE_FEATURES,
};
use crate::serial::MspSerial;

use arming::{arm_stick_values, ArmPhase};
use features::FeatureUpdate;

/// Status name the firmware reports while armed.
const BOX_ARM: &str = "ARM";

/// Status name the firmware reports while in failsafe.
const BOX_FAILSAFE: &str = "FAILSAFE";

/// Firmware family the board runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FirmwareKind {
    MultiWii,
    Cleanflight,
}

/// Session-layer flight controller client.
pub struct FlightController {
    client: Client,
    session: SessionConfig,
    firmware: Option<FirmwareKind>,
    ident: Option<Ident>,
    sensors: SensorSet,
    box_name_ids: HashMap<String, usize>,
    channel_map: Vec<u8>,
    arm_phase: ArmPhase,
}

impl FlightController {
    /// Build a controller over an already-connected transport client.
    pub fn new(client: Client, session: SessionConfig) -> Self {
        Self {
            client,
            session,
            firmware: None,
            ident: None,
            sensors: SensorSet::default(),
            box_name_ids: HashMap::new(),
            channel_map: Vec::new(),
            arm_phase: ArmPhase::default(),
        }
    }

    /// Open the configured serial device and build a controller over it.
    pub fn connect(config: &Config) -> Result<Self> {
        let serial = MspSerial::open(&config.serial.port, config.serial.baud_rate)?;
        let client = Client::new(serial.into_port(), config.serial.request_timeout());
        Ok(Self::new(client, config.session.clone()))
    }

    /// Block until the board answers an identification request, retrying at
    /// the configured interval, or fail once the connect deadline elapses.
    pub async fn wait_for_connection(&mut self) -> Result<()> {
        let deadline = Instant::now() + self.session.connect_timeout();
        loop {
            match self.client.request::<Ident>(Duration::ZERO).await {
                Ok(_) => return Ok(()),
                Err(MspBridgeError::RequestTimeout { .. })
                | Err(MspBridgeError::CommandRejected { .. }) => {
                    if Instant::now() >= deadline {
                        return Err(MspBridgeError::RequestTimeout { id: Ident::ID });
                    }
                    debug!("Board not answering yet, retrying identification");
                    tokio::time::sleep(self.session.connect_retry_interval()).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Populate the session: firmware kind, identity, sensor set, box
    /// registry and channel map.
    ///
    /// Must be re-run after every reboot; all of the fetched state is
    /// invalidated by one.
    pub async fn initialise(&mut self) -> Result<()> {
        // Cleanflight answers the api-version probe, MultiWii does not
        self.firmware = match self.client.request::<ApiVersion>(Duration::ZERO).await {
            Ok(api) => {
                debug!("API version {}.{} (protocol {})", api.major, api.minor, api.protocol);
                Some(FirmwareKind::Cleanflight)
            }
            Err(MspBridgeError::RequestTimeout { .. })
            | Err(MspBridgeError::CommandRejected { .. }) => Some(FirmwareKind::MultiWii),
            Err(e) => return Err(e),
        };

        let ident = self.client.request::<Ident>(Duration::ZERO).await?;
        let status = self.client.request::<Status>(Duration::ZERO).await?;
        self.sensors = status.sensors;
        self.ident = Some(ident);

        self.init_boxes().await?;

        let rx_map = self.client.request::<RxMap>(Duration::ZERO).await?;
        if !rx_map.is_permutation() {
            return Err(MspBridgeError::Protocol(format!(
                "channel map {:?} is not a permutation of 0..{}",
                rx_map.map, MAX_MAPPABLE_RX_INPUTS
            )));
        }
        self.channel_map = rx_map.map;

        info!(
            "Session initialised: {:?} firmware v{}, {} boxes, channel map {:?}",
            self.firmware.unwrap_or(FirmwareKind::MultiWii),
            ident.version,
            self.box_name_ids.len(),
            self.channel_map
        );
        Ok(())
    }

    /// Determine whether the board runs the given firmware family.
    ///
    /// Conservatively `false` before `initialise()`.
    pub fn is_firmware(&self, kind: FirmwareKind) -> bool {
        self.firmware == Some(kind)
    }

    pub fn is_firmware_multiwii(&self) -> bool {
        self.is_firmware(FirmwareKind::MultiWii)
    }

    pub fn is_firmware_cleanflight(&self) -> bool {
        self.is_firmware(FirmwareKind::Cleanflight)
    }

    /// Fetch the board's status-name list and assign each name its bit
    /// position in reply order. Re-run after any reboot.
    pub async fn init_boxes(&mut self) -> Result<()> {
        let boxes = self.client.request::<crate::msp::messages::BoxNames>(Duration::ZERO).await?;
        self.box_name_ids = boxes
            .names
            .into_iter()
            .enumerate()
            .map(|(id, name)| (name, id))
            .collect();
        Ok(())
    }

    /// Status-name to identifier mapping, as reported by the board.
    pub fn box_name_ids(&self) -> &HashMap<String, usize> {
        &self.box_name_ids
    }

    /// Membership test against the fetched capability set. Pure, no I/O;
    /// `false` until identity has been fetched.
    pub fn has_capability(&self, cap: Capability) -> bool {
        self.ident
            .map(|ident| ident.capabilities.contains(cap))
            .unwrap_or(false)
    }

    pub fn has_bind(&self) -> bool {
        self.has_capability(Capability::Bind)
    }

    pub fn has_dyn_bal(&self) -> bool {
        self.has_capability(Capability::DynBal)
    }

    pub fn has_flap(&self) -> bool {
        self.has_capability(Capability::Flap)
    }

    /// Membership test against the fetched sensor set. Pure, no I/O;
    /// `false` until the status has been fetched.
    pub fn has_sensor(&self, sensor: Sensor) -> bool {
        self.sensors.contains(sensor)
    }

    pub fn has_accelerometer(&self) -> bool {
        self.has_sensor(Sensor::Accelerometer)
    }

    pub fn has_barometer(&self) -> bool {
        self.has_sensor(Sensor::Barometer)
    }

    pub fn has_magnetometer(&self) -> bool {
        self.has_sensor(Sensor::Magnetometer)
    }

    pub fn has_gps(&self) -> bool {
        self.has_sensor(Sensor::Gps)
    }

    pub fn has_sonar(&self) -> bool {
        self.has_sensor(Sensor::Sonar)
    }

    /// Query whether the named status is currently active on the board.
    ///
    /// Fetches a live status; a name the registry does not know answers
    /// `false` rather than failing, since the registry may be legitimately
    /// empty before initialisation.
    pub async fn is_status_active(&mut self, name: &str) -> Result<bool> {
        let status = self.client.request::<Status>(Duration::ZERO).await?;
        Ok(self.box_active(&status, name))
    }

    pub async fn is_armed(&mut self) -> Result<bool> {
        self.is_status_active(BOX_ARM).await
    }

    pub async fn is_status_failsafe(&mut self) -> Result<bool> {
        self.is_status_active(BOX_FAILSAFE).await
    }

    fn box_active(&self, status: &Status, name: &str) -> bool {
        match self.box_name_ids.get(name) {
            Some(&id) => status.active_boxes & (1 << id) != 0,
            None => false,
        }
    }

    /// Send RC channels in logical order (roll, pitch, yaw, throttle,
    /// aux1..aux4), remapped to the firmware's raw channel order via the
    /// fetched channel map. Overflow auxiliaries are appended unmapped.
    ///
    /// Values are conventionally 1000-2000 but are passed through without
    /// clamping; range enforcement belongs to the firmware.
    pub async fn set_rc(
        &mut self,
        roll: u16,
        pitch: u16,
        yaw: u16,
        throttle: u16,
        aux: [u16; 4],
        extra_aux: &[u16],
    ) -> Result<()> {
        let logical = [roll, pitch, yaw, throttle, aux[0], aux[1], aux[2], aux[3]];
        let mut raw = self.map_to_raw(&logical)?;
        raw.extend_from_slice(extra_aux);
        self.set_rc_raw(&raw).await
    }

    /// Send a pre-ordered raw RC channel vector unchanged; the caller
    /// asserts it already matches firmware channel order.
    pub async fn set_rc_raw(&mut self, channels: &[u16]) -> Result<()> {
        self.client
            .send(&SetRawRc {
                channels: channels.to_vec(),
            })
            .await
    }

    /// Send a fixed-width motor command. No reordering is applied.
    pub async fn set_motors(&mut self, motors: [u16; N_MOTOR]) -> Result<()> {
        self.client.send(&SetMotor { motors }).await
    }

    fn map_to_raw(&self, logical: &[u16; MAX_MAPPABLE_RX_INPUTS]) -> Result<Vec<u16>> {
        if self.channel_map.len() != MAX_MAPPABLE_RX_INPUTS {
            return Err(MspBridgeError::Protocol(
                "channel map not initialised; run initialise() first".to_string(),
            ));
        }
        let mut raw = vec![0u16; MAX_MAPPABLE_RX_INPUTS];
        for (i, &value) in logical.iter().enumerate() {
            raw[self.channel_map[i] as usize] = value;
        }
        Ok(raw)
    }

    /// Request an arm (`true`) or disarm (`false`) transition with a
    /// one-shot stick command. Returns once the command is on the wire;
    /// no confirmation is awaited.
    pub async fn arm(&mut self, arm: bool) -> Result<()> {
        let [roll, pitch, yaw, throttle, a1, a2, a3, a4] = arm_stick_values(arm);
        self.set_rc(roll, pitch, yaw, throttle, [a1, a2, a3, a4], &[]).await?;
        self.arm_phase = if arm {
            ArmPhase::ArmRequested
        } else {
            ArmPhase::DisarmRequested
        };
        Ok(())
    }

    /// Arm and block until the board confirms, the arm deadline elapses, or
    /// FAILSAFE is observed (terminal: arming over a failsafe condition is
    /// refused).
    ///
    /// The initial command is sent exactly once; only the confirmation poll
    /// repeats. `Ok(true)` means the board reports armed.
    pub async fn arm_block(&mut self) -> Result<bool> {
        self.arm(true).await?;
        let deadline = Instant::now() + self.session.arm_timeout();

        loop {
            let status = self.client.request::<Status>(Duration::ZERO).await?;
            if self.box_active(&status, BOX_FAILSAFE) {
                warn!("FAILSAFE active while awaiting arm confirmation");
                self.arm_phase = ArmPhase::Failed;
                return Ok(false);
            }
            if self.box_active(&status, BOX_ARM) {
                self.arm_phase = ArmPhase::Armed;
                return Ok(true);
            }
            if Instant::now() >= deadline {
                warn!("Board did not confirm arm before deadline");
                self.arm_phase = ArmPhase::Failed;
                return Ok(false);
            }
            tokio::time::sleep(self.session.status_poll_interval()).await;
        }
    }

    /// Disarm and block until the board confirms or the deadline elapses.
    pub async fn disarm_block(&mut self) -> Result<bool> {
        self.arm(false).await?;
        let deadline = Instant::now() + self.session.arm_timeout();

        loop {
            let status = self.client.request::<Status>(Duration::ZERO).await?;
            if !self.box_active(&status, BOX_ARM) {
                self.arm_phase = ArmPhase::Disarmed;
                return Ok(true);
            }
            if Instant::now() >= deadline {
                warn!("Board did not confirm disarm before deadline");
                self.arm_phase = ArmPhase::Failed;
                return Ok(false);
            }
            tokio::time::sleep(self.session.status_poll_interval()).await;
        }
    }

    /// Current arm/disarm handshake phase.
    pub fn arm_phase(&self) -> ArmPhase {
        self.arm_phase
    }

    /// Enable `add` and disable `remove` on the firmware.
    ///
    /// The target set is `(live ∖ remove) ∪ add`. When it equals the live
    /// set the call is a no-op and nothing is written. Otherwise the new set
    /// is written, persisted to EEPROM and the firmware rebooted; the
    /// session is re-initialised before returning since the reboot
    /// invalidates it.
    ///
    /// Mutual exclusion between features is not resolved here beyond
    /// applying exactly the given sets; use the convenience wrappers (e.g.
    /// [`enable_rx_msp`](Self::enable_rx_msp)) for the receiver-source
    /// group.
    pub async fn update_features(
        &mut self,
        add: &HashSet<String>,
        remove: &HashSet<String>,
    ) -> Result<FeatureUpdate> {
        let live_mask = self.client.request::<FeatureMask>(Duration::ZERO).await?.mask;
        let live = features::names_from_mask(live_mask);
        let target = features::compute_target(&live, add, remove);

        if target == live {
            debug!("Feature update is a no-op, skipping write/persist/reboot");
            return Ok(FeatureUpdate::Unchanged);
        }

        let mask = features::mask_from_names(&target)?;
        info!("Writing feature mask 0x{:08X} (was 0x{:08X})", mask, live_mask);
        self.client.command(&SetFeature { mask }, Duration::ZERO).await?;
        self.client.command(&WriteEeprom, Duration::ZERO).await?;

        // Once the reboot is issued there is no rollback; failure past this
        // point leaves board state ambiguous until identity is re-queried
        self.reboot().await?;
        self.wait_for_connection().await?;
        self.initialise().await?;

        Ok(FeatureUpdate::Applied)
    }

    /// Select MSP as the receiver source. The RX-source features are
    /// mutually exclusive, so the other three are removed in the same
    /// commit.
    pub async fn enable_rx_msp(&mut self) -> Result<FeatureUpdate> {
        let add = std::iter::once("RX_MSP".to_string()).collect();
        let remove = RX_SOURCE_FEATURES
            .iter()
            .filter(|&&name| name != "RX_MSP")
            .map(|name| name.to_string())
            .collect();
        self.update_features(&add, &remove).await
    }

    /// Reboot the firmware. Fire-and-forget; the session state is cleared
    /// because the reboot invalidates it.
    pub async fn reboot(&mut self) -> Result<()> {
        self.client.send(&Reboot).await?;
        self.clear_session_state();
        Ok(())
    }

    /// Persist the current configuration to the board's EEPROM.
    pub async fn write_eeprom(&mut self) -> Result<()> {
        self.client.command(&WriteEeprom, Duration::ZERO).await
    }

    fn clear_session_state(&mut self) {
        self.firmware = None;
        self.ident = None;
        self.sensors = SensorSet::default();
        self.box_name_ids.clear();
        self.channel_map.clear();
        self.arm_phase = ArmPhase::default();
    }

    // Subscription / request glue over the transport client

    /// Register a typed callback for message `M`, optionally re-requested
    /// every `period`. See [`Client::subscribe`].
    pub fn subscribe<M, F>(&mut self, callback: F, period: Option<Duration>) -> u8
    where
        M: MspMessage + Decode + 'static,
        F: FnMut(&M) + Send + 'static,
    {
        self.client.subscribe(callback, period)
    }

    /// Check if a message id is subscribed.
    pub fn has_subscription(&self, id: u8) -> bool {
        self.client.has_subscription(id)
    }

    /// Get the registered subscription for `id`, if any.
    pub fn get_subscription(&self, id: u8) -> Option<SubscriptionInfo> {
        self.client.get_subscription(id)
    }

    /// Drive one dispatch cycle of the transport pump.
    pub async fn handle(&mut self) -> Result<u8> {
        self.client.handle().await
    }

    /// Send a bare request for a message id without awaiting the reply.
    pub async fn send_request(&mut self, id: u8) -> Result<()> {
        self.client.send_request(id).await
    }

    /// Request message `M` and block for its decoded reply.
    pub async fn request<M>(&mut self, timeout: Duration) -> Result<M>
    where
        M: MspMessage + Decode,
    {
        self.client.request(timeout).await
    }

    /// Request by raw id and block for the reply payload.
    pub async fn request_raw(&mut self, id: u8, timeout: Duration) -> Result<Vec<u8>> {
        self.client.request_raw(id, timeout).await
    }

    /// Send a reply frame for message `M`.
    pub async fn respond<M>(&mut self, message: &M) -> Result<()>
    where
        M: MspMessage + Encode,
    {
        self.client.respond(message).await
    }

    /// Send a reply frame with a raw payload.
    pub async fn respond_raw(&mut self, id: u8, payload: &[u8]) -> Result<()> {
        self.client.respond_raw(id, payload).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use crate::msp::protocol::{MSP_RC, MSP_STATUS};
    use crate::serial::port_trait::mocks::{ArmBehavior, BoardState, SimulatedBoard};

    fn test_session_config() -> SessionConfig {
        SessionConfig {
            connect_timeout_ms: 1_000,
            connect_retry_interval_ms: 50,
            arm_timeout_ms: 500,
            status_poll_interval_ms: 50,
        }
    }

    fn fc_over_board(state: BoardState) -> (FlightController, Arc<Mutex<BoardState>>) {
        let board = SimulatedBoard::new(state);
        let handle = board.handle();
        let client = Client::new(Box::new(board), Duration::from_millis(100));
        (FlightController::new(client, test_session_config()), handle)
    }

    fn names(list: &[&str]) -> HashSet<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_initialise_populates_session() {
        let (mut fc, _board) = fc_over_board(BoardState {
            capabilities: (Capability::Bind as u32) | (Capability::Flap as u32),
            sensors: 0b00011, // acc + baro
            ..BoardState::default()
        });

        fc.initialise().await.unwrap();

        assert!(fc.is_firmware_cleanflight());
        assert!(!fc.is_firmware_multiwii());
        assert!(fc.has_bind());
        assert!(fc.has_flap());
        assert!(!fc.has_dyn_bal());
        assert!(fc.has_accelerometer());
        assert!(fc.has_barometer());
        assert!(!fc.has_gps());
        assert_eq!(fc.box_name_ids()["ARM"], 0);
        assert_eq!(fc.box_name_ids()["FAILSAFE"], 2);
    }

    #[tokio::test]
    async fn test_firmware_probe_multiwii_via_rejection() {
        let (mut fc, _board) = fc_over_board(BoardState {
            api_version: None,
            ..BoardState::default()
        });

        fc.initialise().await.unwrap();
        assert!(fc.is_firmware_multiwii());
    }

    #[tokio::test(start_paused = true)]
    async fn test_firmware_probe_multiwii_via_timeout() {
        let (mut fc, _board) = fc_over_board(BoardState {
            api_version: None,
            reject_unknown: false,
            ..BoardState::default()
        });

        fc.initialise().await.unwrap();
        assert!(fc.is_firmware_multiwii());
    }

    #[tokio::test]
    async fn test_queries_before_initialise_are_conservative() {
        let (fc, _board) = fc_over_board(BoardState::default());

        assert!(!fc.has_capability(Capability::Bind));
        assert!(!fc.has_sensor(Sensor::Accelerometer));
        assert!(!fc.is_firmware_cleanflight());
        assert!(!fc.is_firmware_multiwii());
        assert!(fc.box_name_ids().is_empty());
    }

    #[tokio::test]
    async fn test_wait_for_connection_succeeds() {
        let (mut fc, _board) = fc_over_board(BoardState::default());
        fc.wait_for_connection().await.unwrap();
    }

    #[tokio::test]
    async fn test_is_status_active() {
        let (mut fc, board) = fc_over_board(BoardState::default());
        fc.initialise().await.unwrap();

        assert!(!fc.is_armed().await.unwrap());
        board.lock().unwrap().armed = true;
        assert!(fc.is_armed().await.unwrap());
        assert!(!fc.is_status_failsafe().await.unwrap());
    }

    #[tokio::test]
    async fn test_is_status_active_unknown_name_is_false() {
        let (mut fc, _board) = fc_over_board(BoardState::default());
        fc.initialise().await.unwrap();

        // Not a failure: the registry simply does not know the name
        assert!(!fc.is_status_active("UNKNOWN_NAME").await.unwrap());
    }

    #[tokio::test]
    async fn test_set_rc_remaps_channels() {
        let (mut fc, board) = fc_over_board(BoardState {
            channel_map: [1, 0, 2, 3, 4, 5, 6, 7],
            ..BoardState::default()
        });
        fc.initialise().await.unwrap();

        fc.set_rc(1500, 1600, 1700, 1800, [1000; 4], &[]).await.unwrap();

        let state = board.lock().unwrap();
        // Roll and pitch swap raw slots, everything else is unchanged
        assert_eq!(
            state.rc_frames[0],
            vec![1600, 1500, 1700, 1800, 1000, 1000, 1000, 1000]
        );
    }

    #[tokio::test]
    async fn test_set_rc_identity_map_and_extra_aux() {
        let (mut fc, board) = fc_over_board(BoardState::default());
        fc.initialise().await.unwrap();

        fc.set_rc(1500, 1500, 1500, 1200, [1000, 1100, 1200, 1300], &[1400, 1450])
            .await
            .unwrap();

        let state = board.lock().unwrap();
        assert_eq!(
            state.rc_frames[0],
            vec![1500, 1500, 1500, 1200, 1000, 1100, 1200, 1300, 1400, 1450]
        );
    }

    #[tokio::test]
    async fn test_set_rc_without_channel_map_fails() {
        let (mut fc, _board) = fc_over_board(BoardState::default());

        let err = fc.set_rc(1500, 1500, 1500, 1000, [1000; 4], &[]).await.unwrap_err();
        assert!(matches!(err, MspBridgeError::Protocol(_)));
    }

    #[tokio::test]
    async fn test_set_rc_raw_is_passed_through() {
        let (mut fc, board) = fc_over_board(BoardState {
            channel_map: [1, 0, 2, 3, 4, 5, 6, 7],
            ..BoardState::default()
        });

        // No remapping and no initialisation requirement for raw frames
        fc.set_rc_raw(&[1111, 2222, 1333]).await.unwrap();

        let state = board.lock().unwrap();
        assert_eq!(state.rc_frames[0], vec![1111, 2222, 1333]);
    }

    #[tokio::test]
    async fn test_set_motors() {
        let (mut fc, board) = fc_over_board(BoardState::default());

        fc.set_motors([1000, 1100, 1200, 1300, 1400, 1500, 1600, 1700])
            .await
            .unwrap();

        let state = board.lock().unwrap();
        assert_eq!(
            state.motor_frames[0],
            vec![1000, 1100, 1200, 1300, 1400, 1500, 1600, 1700]
        );
    }

    #[tokio::test]
    async fn test_initialise_rejects_invalid_channel_map() {
        let (mut fc, _board) = fc_over_board(BoardState {
            channel_map: [0, 0, 2, 3, 4, 5, 6, 7],
            ..BoardState::default()
        });

        let err = fc.initialise().await.unwrap_err();
        assert!(matches!(err, MspBridgeError::Protocol(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_arm_block_confirms() {
        let (mut fc, _board) = fc_over_board(BoardState::default());
        fc.initialise().await.unwrap();

        assert!(fc.arm_block().await.unwrap());
        assert_eq!(fc.arm_phase(), ArmPhase::Armed);
        assert!(fc.is_armed().await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_arm_block_deadline_elapses() {
        let (mut fc, board) = fc_over_board(BoardState {
            arm_behavior: ArmBehavior::Ignore,
            ..BoardState::default()
        });
        fc.initialise().await.unwrap();

        assert!(!fc.arm_block().await.unwrap());
        assert_eq!(fc.arm_phase(), ArmPhase::Failed);
        // The one-shot command was sent exactly once, never retried
        assert_eq!(board.lock().unwrap().rc_frames.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_arm_block_aborts_on_failsafe() {
        let (mut fc, _board) = fc_over_board(BoardState {
            arm_behavior: ArmBehavior::Failsafe,
            ..BoardState::default()
        });
        fc.initialise().await.unwrap();

        assert!(!fc.arm_block().await.unwrap());
        assert_eq!(fc.arm_phase(), ArmPhase::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disarm_block_confirms() {
        let (mut fc, board) = fc_over_board(BoardState::default());
        fc.initialise().await.unwrap();
        board.lock().unwrap().armed = true;

        assert!(fc.disarm_block().await.unwrap());
        assert_eq!(fc.arm_phase(), ArmPhase::Disarmed);
        assert!(!fc.is_armed().await.unwrap());
    }

    #[tokio::test]
    async fn test_arm_sets_requested_phase() {
        let (mut fc, _board) = fc_over_board(BoardState::default());
        fc.initialise().await.unwrap();

        fc.arm(true).await.unwrap();
        assert_eq!(fc.arm_phase(), ArmPhase::ArmRequested);
        fc.arm(false).await.unwrap();
        assert_eq!(fc.arm_phase(), ArmPhase::DisarmRequested);
    }

    #[tokio::test]
    async fn test_update_features_empty_is_noop() {
        let (mut fc, board) = fc_over_board(BoardState::default());
        fc.initialise().await.unwrap();

        let outcome = fc
            .update_features(&HashSet::new(), &HashSet::new())
            .await
            .unwrap();

        assert_eq!(outcome, FeatureUpdate::Unchanged);
        let state = board.lock().unwrap();
        assert!(state.feature_writes.is_empty());
        assert_eq!(state.eeprom_writes, 0);
        assert_eq!(state.reboots, 0);
    }

    #[tokio::test]
    async fn test_update_features_already_satisfied_is_noop() {
        // VBAT is bit 1
        let (mut fc, board) = fc_over_board(BoardState {
            features: 0b10,
            ..BoardState::default()
        });
        fc.initialise().await.unwrap();

        // Adding an active feature and removing an inactive one changes nothing
        let outcome = fc
            .update_features(&names(&["VBAT"]), &names(&["GPS"]))
            .await
            .unwrap();

        assert_eq!(outcome, FeatureUpdate::Unchanged);
        let state = board.lock().unwrap();
        assert!(state.feature_writes.is_empty());
        assert_eq!(state.reboots, 0);
    }

    #[tokio::test]
    async fn test_update_features_applies_persists_reboots() {
        let (mut fc, board) = fc_over_board(BoardState::default());
        fc.initialise().await.unwrap();

        let outcome = fc
            .update_features(&names(&["VBAT"]), &HashSet::new())
            .await
            .unwrap();

        assert_eq!(outcome, FeatureUpdate::Applied);
        {
            let state = board.lock().unwrap();
            assert_eq!(state.feature_writes, vec![0b10]);
            assert_eq!(state.eeprom_writes, 1);
            assert_eq!(state.reboots, 1);
        }
        // The session was re-initialised after the reboot
        assert!(fc.is_firmware_cleanflight());
        assert!(!fc.box_name_ids().is_empty());
    }

    #[tokio::test]
    async fn test_enable_rx_msp_is_exclusive() {
        // RX_PPM (bit 0) and RX_SERIAL (bit 3) active beforehand
        let (mut fc, board) = fc_over_board(BoardState {
            features: 0b1001,
            ..BoardState::default()
        });
        fc.initialise().await.unwrap();

        let outcome = fc.enable_rx_msp().await.unwrap();
        assert_eq!(outcome, FeatureUpdate::Applied);

        let mask = board.lock().unwrap().features;
        let active = features::names_from_mask(mask);
        assert!(active.contains("RX_MSP"));
        assert!(!active.contains("RX_PPM"));
        assert!(!active.contains("RX_SERIAL"));
        assert!(!active.contains("RX_PARALLEL_PWM"));
    }

    #[tokio::test]
    async fn test_update_features_unknown_add_fails() {
        let (mut fc, _board) = fc_over_board(BoardState::default());
        fc.initialise().await.unwrap();

        let err = fc
            .update_features(&names(&["NOT_A_FEATURE"]), &HashSet::new())
            .await
            .unwrap_err();
        assert!(matches!(err, MspBridgeError::Protocol(_)));
    }

    #[tokio::test]
    async fn test_reboot_invalidates_session_state() {
        let (mut fc, _board) = fc_over_board(BoardState {
            capabilities: Capability::Bind as u32,
            ..BoardState::default()
        });
        fc.initialise().await.unwrap();
        assert!(fc.has_bind());

        fc.reboot().await.unwrap();

        // Any query before re-initialisation is undefined by contract; the
        // predicates answer conservatively and commands that need session
        // state fail
        assert!(!fc.has_bind());
        assert!(fc.box_name_ids().is_empty());
        assert!(fc.set_rc(1500, 1500, 1500, 1000, [1000; 4], &[]).await.is_err());

        // Re-initialisation restores the session
        fc.initialise().await.unwrap();
        assert!(fc.has_bind());
    }

    #[tokio::test]
    async fn test_write_eeprom() {
        let (mut fc, board) = fc_over_board(BoardState::default());

        fc.write_eeprom().await.unwrap();
        assert_eq!(board.lock().unwrap().eeprom_writes, 1);
    }

    #[tokio::test]
    async fn test_subscription_glue_delegates() {
        let (mut fc, _board) = fc_over_board(BoardState::default());

        let id = fc.subscribe::<Status, _>(|_| {}, None);
        assert_eq!(id, MSP_STATUS);
        assert!(fc.has_subscription(MSP_STATUS));
        assert!(fc.get_subscription(MSP_RC).is_none());
    }

    #[tokio::test]
    async fn test_handle_dispatches_subscription() {
        let (mut fc, _board) = fc_over_board(BoardState::default());

        let seen = Arc::new(Mutex::new(0u32));
        let seen_in_cb = Arc::clone(&seen);
        fc.subscribe::<Status, _>(move |_| *seen_in_cb.lock().unwrap() += 1, None);

        // Solicit a status reply, then pump exactly one message
        fc.send_request(MSP_STATUS).await.unwrap();
        let id = fc.handle().await.unwrap();

        assert_eq!(id, MSP_STATUS);
        assert_eq!(*seen.lock().unwrap(), 1);
    }
}
