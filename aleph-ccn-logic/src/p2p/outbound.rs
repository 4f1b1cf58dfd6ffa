use super::P2pClient;
use crate::{settings::P2pSettings, types::MessageEnvelope};
use anyhow::Result;
use governor::{DefaultKeyedRateLimiter, Quota};
use std::{num::NonZeroU32, sync::Arc};

/// Publishes locally-accepted messages to the pub/sub topic, token-bucket
/// limited per channel.
pub struct Publisher {
    client: Arc<P2pClient>,
    topic: String,
    limiter: DefaultKeyedRateLimiter<String>,
}

impl Publisher {
    pub fn new(client: Arc<P2pClient>, settings: &P2pSettings) -> Self {
        let rate = NonZeroU32::new(settings.publish_rate.max(1)).expect("non-zero publish rate");
        Self {
            client,
            topic: settings.topic.clone(),
            limiter: DefaultKeyedRateLimiter::keyed(Quota::per_second(rate)),
        }
    }

    pub async fn publish(&self, envelope: &MessageEnvelope) -> Result<()> {
        let channel = envelope.channel.clone().unwrap_or_default();
        self.limiter.until_key_ready(&channel).await;
        self.client
            .publish(&self.topic, &serde_json::to_value(envelope)?)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limiter_is_per_channel() {
        let limiter: DefaultKeyedRateLimiter<String> =
            DefaultKeyedRateLimiter::keyed(Quota::per_second(NonZeroU32::new(2).unwrap()));

        let a = "channel-a".to_string();
        let b = "channel-b".to_string();

        assert!(limiter.check_key(&a).is_ok());
        assert!(limiter.check_key(&a).is_ok());
        // channel-a burst is exhausted, channel-b is untouched
        assert!(limiter.check_key(&a).is_err());
        assert!(limiter.check_key(&b).is_ok());
    }
}
