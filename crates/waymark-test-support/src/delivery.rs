//! Test delivery channels — mock `DeliveryChannel` implementations.

use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;

use waymark_core::delivery::{Channel, Contact, DeliveryChannel};
use waymark_core::error::EngineError;
use waymark_core::track::Track;

/// One message a recording channel accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    /// Track the send belonged to.
    pub track: Track,
    /// Transport used.
    pub channel: Channel,
    /// Recipient display name.
    pub recipient: String,
    /// Message body.
    pub body: String,
    /// Subject line, if any.
    pub subject: Option<String>,
}

/// A delivery channel that records every send. Sends whose body is listed in
/// the failure set are rejected instead, so tests can exercise partial
/// failures within one sweep.
#[derive(Debug, Default)]
pub struct RecordingDeliveryChannel {
    sent: Mutex<Vec<SentMessage>>,
    fail_bodies: HashSet<String>,
}

impl RecordingDeliveryChannel {
    /// Creates a channel that accepts every send.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a channel that rejects sends whose body matches one of the
    /// given strings and accepts everything else.
    #[must_use]
    pub fn failing_for_bodies(bodies: &[&str]) -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail_bodies: bodies.iter().map(|b| (*b).to_owned()).collect(),
        }
    }

    /// Snapshot of all accepted sends.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn sent_messages(&self) -> Vec<SentMessage> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl DeliveryChannel for RecordingDeliveryChannel {
    async fn send(
        &self,
        track: Track,
        channel: Channel,
        recipient: &Contact,
        body: &str,
        subject: Option<&str>,
    ) -> Result<(), EngineError> {
        if self.fail_bodies.contains(body) {
            return Err(EngineError::Delivery(format!(
                "provider rejected message to {}",
                recipient.name
            )));
        }
        self.sent.lock().unwrap().push(SentMessage {
            track,
            channel,
            recipient: recipient.name.clone(),
            body: body.to_owned(),
            subject: subject.map(ToOwned::to_owned),
        });
        Ok(())
    }
}

/// A delivery channel that rejects every send.
#[derive(Debug)]
pub struct FailingDeliveryChannel;

#[async_trait]
impl DeliveryChannel for FailingDeliveryChannel {
    async fn send(
        &self,
        _track: Track,
        _channel: Channel,
        _recipient: &Contact,
        _body: &str,
        _subject: Option<&str>,
    ) -> Result<(), EngineError> {
        Err(EngineError::Delivery("provider unreachable".into()))
    }
}
