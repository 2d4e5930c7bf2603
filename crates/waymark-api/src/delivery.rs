//! Delivery channel wiring for the API binary.

use async_trait::async_trait;
use tracing::info;

use waymark_core::delivery::{Channel, Contact, DeliveryChannel};
use waymark_core::error::EngineError;
use waymark_core::track::Track;

/// Stand-in delivery channel that emits each outbound message as a
/// structured log event. Real SMS/email providers implement
/// [`DeliveryChannel`] behind the same seam and are wired in here.
#[derive(Debug, Clone, Copy)]
pub struct LogDeliveryChannel;

#[async_trait]
impl DeliveryChannel for LogDeliveryChannel {
    async fn send(
        &self,
        track: Track,
        channel: Channel,
        recipient: &Contact,
        body: &str,
        subject: Option<&str>,
    ) -> Result<(), EngineError> {
        info!(
            %track,
            %channel,
            recipient = %recipient.name,
            subject = subject.unwrap_or_default(),
            body,
            "outbound message"
        );
        Ok(())
    }
}
