//! # Channel Senders
//!
//! The seam between campaign dispatch and SMS/email transport. Transport
//! problems never surface as errors here: a sender reports them as an
//! unsuccessful [`SendReceipt`] and the recipient is stored undelivered.

use async_trait::async_trait;
use tracing::info;
use uuid::Uuid;

use perk_core::CampaignChannel;

/// Context passed along with every message.
#[derive(Debug, Clone)]
pub struct SendMetadata {
    pub campaign_id: String,
    pub customer_id: String,
    /// Always `Sms` or `Email`.
    pub channel: CampaignChannel,
    pub variant_id: Option<String>,
    /// Email subject; `None` for SMS.
    pub subject: Option<String>,
}

/// What the transport said about one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendReceipt {
    pub success: bool,
    pub provider_id: Option<String>,
}

impl SendReceipt {
    pub fn delivered(provider_id: impl Into<String>) -> Self {
        SendReceipt {
            success: true,
            provider_id: Some(provider_id.into()),
        }
    }

    pub fn failed() -> Self {
        SendReceipt {
            success: false,
            provider_id: None,
        }
    }
}

/// Delivers one rendered message over one channel.
#[async_trait]
pub trait ChannelSender: Send + Sync {
    async fn send(&self, destination: &str, message: &str, metadata: &SendMetadata) -> SendReceipt;
}

/// Logs each message instead of sending it.
///
/// Used by the worker until a real transport is configured.
pub struct LoggingSender;

#[async_trait]
impl ChannelSender for LoggingSender {
    async fn send(&self, destination: &str, message: &str, metadata: &SendMetadata) -> SendReceipt {
        let provider_id = format!("log-{}", Uuid::new_v4());
        info!(
            campaign_id = %metadata.campaign_id,
            customer_id = %metadata.customer_id,
            channel = %metadata.channel,
            variant_id = ?metadata.variant_id,
            destination = %destination,
            subject = ?metadata.subject,
            len = message.len(),
            provider_id = %provider_id,
            "Campaign message"
        );
        SendReceipt::delivered(provider_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_logging_sender_always_delivers() {
        let metadata = SendMetadata {
            campaign_id: "camp".into(),
            customer_id: "c1".into(),
            channel: CampaignChannel::Sms,
            variant_id: None,
            subject: None,
        };
        let receipt = LoggingSender.send("+15550100", "hello", &metadata).await;
        assert!(receipt.success);
        assert!(receipt.provider_id.unwrap().starts_with("log-"));
    }
}
