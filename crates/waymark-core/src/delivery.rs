//! Outbound delivery channel abstraction.
//!
//! Real SMS/email/push providers live behind this trait. The engine only
//! cares about success or failure of a single send.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::track::Track;

/// The transport a messaging step goes out on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    /// Text message.
    Sms,
    /// Email (the only channel that carries a subject).
    Email,
}

impl Channel {
    /// Returns the canonical lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sms => "sms",
            Self::Email => "email",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Channel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sms" => Ok(Self::Sms),
            "email" => Ok(Self::Email),
            other => Err(format!("unknown channel: {other}")),
        }
    }
}

/// A resolvable recipient from a track's contact roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    /// Display name used in templates and logs.
    pub name: String,
    /// Phone number for the sms channel.
    #[serde(default)]
    pub phone: Option<String>,
    /// Address for the email channel.
    #[serde(default)]
    pub email: Option<String>,
}

/// Abstraction over the external message provider.
#[async_trait]
pub trait DeliveryChannel: Send + Sync {
    /// Delivers one message. Implementations must not retry internally; the
    /// engine records the outcome and leaves recovery to the sweep or an
    /// admin action.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Delivery` when the provider rejects or cannot
    /// reach the recipient.
    async fn send(
        &self,
        track: Track,
        channel: Channel,
        recipient: &Contact,
        body: &str,
        subject: Option<&str>,
    ) -> Result<(), EngineError>;
}
