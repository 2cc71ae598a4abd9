use crate::config::PublishConfig;
use crate::publish::{partition_for, ArticleRecord, Broker, CompletionSignal, PublishError};
use crate::state::ArticleStore;
use crate::ConfigError;
use chrono::SecondsFormat;
use std::sync::Arc;

/// Routes completed articles to partitioned broker channels
///
/// Holds no state of its own beyond routing parameters; cloning shares the
/// broker.
#[derive(Clone)]
pub struct Publisher {
    broker: Arc<dyn Broker>,
    channel: String,
    partitions: u32,
}

impl Publisher {
    /// Creates a publisher
    ///
    /// # Returns
    ///
    /// * `Err(ConfigError::InvalidPartitionCount)` - `partitions` is zero
    pub fn new(
        broker: Arc<dyn Broker>,
        channel: impl Into<String>,
        partitions: u32,
    ) -> Result<Self, ConfigError> {
        if partitions == 0 {
            return Err(ConfigError::InvalidPartitionCount(partitions));
        }

        Ok(Self {
            broker,
            channel: channel.into(),
            partitions,
        })
    }

    pub fn from_config(broker: Arc<dyn Broker>, config: &PublishConfig) -> Result<Self, ConfigError> {
        Self::new(broker, config.channel.clone(), config.partitions)
    }

    pub fn partition_for(&self, url: &str) -> u32 {
        partition_for(url, self.partitions)
    }

    /// Channel carrying articles of one partition: `{channel}:{partition}`
    pub fn article_channel(&self, partition: u32) -> String {
        format!("{}:{}", self.channel, partition)
    }

    /// Channel carrying session summaries: `{channel}_day_done`
    pub fn completion_channel(&self) -> String {
        format!("{}_day_done", self.channel)
    }

    /// Builds the outbound record for `url` from accumulated session data
    ///
    /// Fails with [`PublishError::MissingData`] when the article has no
    /// parsed date or no text.
    pub fn build_record(&self, url: &str, store: &ArticleStore) -> Result<ArticleRecord, PublishError> {
        let article = store.get(url).ok_or_else(|| PublishError::MissingData {
            url: url.to_string(),
            missing: "text",
        })?;

        let date = article.published_at.ok_or_else(|| PublishError::MissingData {
            url: url.to_string(),
            missing: "date",
        })?;

        if !article.has_text() {
            return Err(PublishError::MissingData {
                url: url.to_string(),
                missing: "text",
            });
        }

        Ok(ArticleRecord {
            url: url.to_string(),
            date: date.and_utc().to_rfc3339_opts(SecondsFormat::Secs, true),
            text: article.text(),
        })
    }

    /// Publishes the article accumulated for `url`
    ///
    /// Returns the partition the article was sent to.
    pub async fn publish(&self, url: &str, store: &ArticleStore) -> Result<u32, PublishError> {
        let record = self.build_record(url, store)?;
        let partition = self.partition_for(url);
        let channel = self.article_channel(partition);

        let payload = serde_json::to_vec(&record)?;
        self.broker.publish(&channel, payload).await?;

        tracing::debug!(url, channel = %channel, "Published article");
        Ok(partition)
    }

    /// Publishes the end-of-session summary
    pub async fn publish_completion(&self, signal: &CompletionSignal) -> Result<(), PublishError> {
        let payload = serde_json::to_vec(signal)?;
        self.broker
            .publish(&self.completion_channel(), payload)
            .await?;
        Ok(())
    }
}
