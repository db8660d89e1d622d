//! # Transport Client Module
//!
//! Owns the serial link and implements the session-transport contract:
//! - Typed callback subscriptions keyed by message id, with optional
//!   periodic resend of the matching request
//! - A blocking single-message pump ([`Client::handle`])
//! - Request/response correlation with a bounded timeout
//! - Raw send/respond primitives keyed by numeric message id
//!
//! The client never spawns background tasks. Periodic subscription requests
//! are sent from the top of each [`Client::handle`] call, so the caller's
//! pump loop is the only scheduler and controls all interleaving.

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, trace, warn};

use crate::error::{MspBridgeError, Result};
use crate::msp::decoder::{FrameParser, MspFrame};
use crate::msp::encoder::{encode_frame, encode_request};
use crate::msp::messages::{Decode, Encode, MspMessage};
use crate::msp::protocol::Direction;
use crate::serial::port_trait::SerialPortIO;

/// Type-erased subscription entry: decode-and-dispatch closure plus the
/// periodic resend schedule.
struct Subscription {
    handler: Box<dyn FnMut(&[u8]) + Send>,
    period: Option<Duration>,
    next_due: Instant,
}

/// Queryable view of a registered subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionInfo {
    pub id: u8,
    pub period: Option<Duration>,
}

/// MSP transport client.
pub struct Client {
    port: Box<dyn SerialPortIO>,
    parser: FrameParser,
    subscriptions: HashMap<u8, Subscription>,
    default_timeout: Duration,
}

impl Client {
    /// Create a client over an opened port.
    ///
    /// `default_timeout` is the request budget used when a caller passes
    /// `Duration::ZERO`; it must itself be non-zero (enforced by config
    /// validation), so no request ever blocks unboundedly.
    pub fn new(port: Box<dyn SerialPortIO>, default_timeout: Duration) -> Self {
        Self {
            port,
            parser: FrameParser::new(),
            subscriptions: HashMap::new(),
            default_timeout,
        }
    }

    /// Register a typed callback for message `M`.
    ///
    /// With `period = Some(d)`, a request for `M::ID` is sent every `d`,
    /// scheduled at the top of each [`handle`](Self::handle) call. A later
    /// registration for the same id replaces the earlier one.
    ///
    /// Returns the message id the subscription is registered under.
    pub fn subscribe<M, F>(&mut self, mut callback: F, period: Option<Duration>) -> u8
    where
        M: MspMessage + Decode + 'static,
        F: FnMut(&M) + Send + 'static,
    {
        let handler = Box::new(move |payload: &[u8]| match M::decode(payload) {
            Ok(message) => callback(&message),
            Err(e) => warn!("Dropping undecodable message id {}: {}", M::ID, e),
        });
        self.subscribe_raw(M::ID, handler, period)
    }

    /// Register a raw-payload callback for `id`. Same replace semantics as
    /// [`subscribe`](Self::subscribe).
    pub fn subscribe_raw(
        &mut self,
        id: u8,
        handler: Box<dyn FnMut(&[u8]) + Send>,
        period: Option<Duration>,
    ) -> u8 {
        if self.subscriptions.contains_key(&id) {
            debug!("Replacing existing subscription for message id {}", id);
        }
        self.subscriptions.insert(
            id,
            Subscription {
                handler,
                period,
                next_due: Instant::now(),
            },
        );
        id
    }

    /// Check if a message id is subscribed.
    pub fn has_subscription(&self, id: u8) -> bool {
        self.subscriptions.contains_key(&id)
    }

    /// Get the registered subscription for `id`, if any.
    pub fn get_subscription(&self, id: u8) -> Option<SubscriptionInfo> {
        self.subscriptions
            .get(&id)
            .map(|sub| SubscriptionInfo { id, period: sub.period })
    }

    /// Drive one dispatch cycle: send due periodic requests, then receive
    /// exactly one message and invoke its matching subscription.
    ///
    /// Returns the id of the dispatched message. A message without a
    /// subscription is logged and counts as a completed cycle.
    pub async fn handle(&mut self) -> Result<u8> {
        self.send_due_periodic().await?;

        let frame = self.read_frame().await?;
        let id = frame.id;
        self.dispatch(frame);
        Ok(id)
    }

    /// Send a bare request frame for `id` without waiting for the reply.
    pub async fn send_request(&mut self, id: u8) -> Result<()> {
        self.write(&encode_request(id)).await
    }

    /// Send message `M`'s request and block until its reply arrives,
    /// decoded, or `timeout` elapses. `Duration::ZERO` selects the
    /// configured default budget.
    pub async fn request<M>(&mut self, timeout: Duration) -> Result<M>
    where
        M: MspMessage + Decode,
    {
        let payload = self.request_raw(M::ID, timeout).await?;
        M::decode(&payload)
    }

    /// Send a request for `id` and block until the correlated reply payload
    /// arrives or `timeout` elapses.
    ///
    /// Messages with other ids received while waiting are dispatched to
    /// their subscriptions, so telemetry is not lost under a request.
    pub async fn request_raw(&mut self, id: u8, timeout: Duration) -> Result<Vec<u8>> {
        self.send_request(id).await?;
        self.await_reply(id, timeout).await
    }

    /// Send an encoded command without waiting for an acknowledgement.
    pub async fn send<M>(&mut self, message: &M) -> Result<()>
    where
        M: MspMessage + Encode,
    {
        let frame = encode_frame(Direction::Request, M::ID, &message.encode())?;
        self.write(&frame).await
    }

    /// Send an encoded command and block until the firmware acknowledges it
    /// (an empty reply carrying the same id) or `timeout` elapses.
    pub async fn command<M>(&mut self, message: &M, timeout: Duration) -> Result<()>
    where
        M: MspMessage + Encode,
    {
        self.send(message).await?;
        self.await_reply(M::ID, timeout).await?;
        Ok(())
    }

    /// Send a reply frame for message `M`. Fire-and-forget: MSP responses
    /// are not acknowledged.
    pub async fn respond<M>(&mut self, message: &M) -> Result<()>
    where
        M: MspMessage + Encode,
    {
        self.respond_raw(M::ID, &message.encode()).await
    }

    /// Send a reply frame with a raw payload.
    pub async fn respond_raw(&mut self, id: u8, payload: &[u8]) -> Result<()> {
        let frame = encode_frame(Direction::Response, id, payload)?;
        self.write(&frame).await
    }

    /// Pump frames until the reply for `id` arrives, within `wait`.
    async fn await_reply(&mut self, id: u8, wait: Duration) -> Result<Vec<u8>> {
        let wait = if wait.is_zero() { self.default_timeout } else { wait };
        tokio::time::timeout(wait, self.read_until_reply(id))
            .await
            .map_err(|_| MspBridgeError::RequestTimeout { id })?
    }

    async fn read_until_reply(&mut self, id: u8) -> Result<Vec<u8>> {
        loop {
            let frame = self.read_frame().await?;
            match frame.direction {
                Direction::Response if frame.id == id => return Ok(frame.payload),
                Direction::Error if frame.id == id => {
                    return Err(MspBridgeError::CommandRejected { id });
                }
                _ => self.dispatch(frame),
            }
        }
    }

    /// Read bytes until the parser yields one complete frame.
    async fn read_frame(&mut self) -> Result<MspFrame> {
        loop {
            if let Some(frame) = self.parser.next_frame() {
                trace!("Received MSP frame id {} ({} bytes)", frame.id, frame.payload.len());
                return Ok(frame);
            }

            let mut buf = [0u8; 256];
            let n = self.port.read(&mut buf).await?;
            if n == 0 {
                return Err(MspBridgeError::Serial("connection closed".to_string()));
            }
            self.parser.extend(&buf[..n]);
        }
    }

    fn dispatch(&mut self, frame: MspFrame) {
        match self.subscriptions.get_mut(&frame.id) {
            Some(sub) => (sub.handler)(&frame.payload),
            None => debug!("No subscription for message id {}, dropping", frame.id),
        }
    }

    /// Send requests for periodic subscriptions that have come due.
    async fn send_due_periodic(&mut self) -> Result<()> {
        let now = Instant::now();
        let mut due = Vec::new();
        for (&id, sub) in self.subscriptions.iter_mut() {
            if let Some(period) = sub.period {
                if now >= sub.next_due {
                    sub.next_due = now + period;
                    due.push(id);
                }
            }
        }
        for id in due {
            self.send_request(id).await?;
        }
        Ok(())
    }

    async fn write(&mut self, frame: &[u8]) -> Result<()> {
        self.port.write_all(frame).await?;
        self.port.flush().await?;
        Ok(())
    }
}
