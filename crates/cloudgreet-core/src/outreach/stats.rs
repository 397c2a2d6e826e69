//! Outreach Stats Aggregator

use chrono::{DateTime, Utc};
use cloudgreet_common::types::{Channel, StatsRange, TenantId};
use cloudgreet_common::Result;
use cloudgreet_storage::models::ChannelCounts;
use cloudgreet_storage::repository::SendRepository;
use serde::Serialize;
use std::sync::Arc;

/// `count / total * 100` rounded to one decimal, `0` when `total` is zero
pub fn percentage(count: i64, total: i64) -> f64 {
    if total <= 0 {
        return 0.0;
    }
    let value = count as f64 / total as f64 * 100.0;
    (value * 10.0).round() / 10.0
}

/// Counters and rates for one channel
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelStats {
    pub channel: Channel,
    pub total_sent: i64,
    pub delivered: i64,
    pub replies: i64,
    pub failed: i64,
    pub reply_rate: f64,
    pub delivery_rate: f64,
}

impl From<&ChannelCounts> for ChannelStats {
    fn from(counts: &ChannelCounts) -> Self {
        Self {
            channel: counts.channel,
            total_sent: counts.total_sent,
            delivered: counts.delivered,
            replies: counts.replies,
            failed: counts.failed,
            reply_rate: percentage(counts.replies, counts.total_sent),
            delivery_rate: percentage(counts.delivered, counts.total_sent),
        }
    }
}

/// Tenant-wide outreach performance over a range
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutreachStats {
    pub range: StatsRange,
    pub total_sent: i64,
    pub delivered: i64,
    pub replies: i64,
    pub failed: i64,
    pub reply_rate: f64,
    pub delivery_rate: f64,
    pub by_channel: Vec<ChannelStats>,
}

impl OutreachStats {
    /// Fold per-channel counters. Every channel is listed, in email, sms,
    /// call order, whether or not it has sends.
    pub fn aggregate(range: StatsRange, counts: &[ChannelCounts]) -> Self {
        let by_channel: Vec<ChannelStats> = Channel::ALL
            .iter()
            .map(|channel| {
                counts
                    .iter()
                    .find(|c| c.channel == *channel)
                    .map(ChannelStats::from)
                    .unwrap_or_else(|| ChannelStats::from(&ChannelCounts::empty(*channel)))
            })
            .collect();

        let total_sent = by_channel.iter().map(|c| c.total_sent).sum();
        let delivered = by_channel.iter().map(|c| c.delivered).sum();
        let replies = by_channel.iter().map(|c| c.replies).sum();
        let failed = by_channel.iter().map(|c| c.failed).sum();

        Self {
            range,
            total_sent,
            delivered,
            replies,
            failed,
            reply_rate: percentage(replies, total_sent),
            delivery_rate: percentage(delivered, total_sent),
            by_channel,
        }
    }
}

/// Reads send records into stats
#[derive(Clone)]
pub struct StatsAggregator {
    sends: Arc<dyn SendRepository>,
}

impl StatsAggregator {
    pub fn new(sends: Arc<dyn SendRepository>) -> Self {
        Self { sends }
    }

    /// Stats for the range ending at `now`
    pub async fn stats(
        &self,
        tenant_id: TenantId,
        range: StatsRange,
        now: DateTime<Utc>,
    ) -> Result<OutreachStats> {
        let counts = self
            .sends
            .channel_counts(tenant_id, range.since(now))
            .await?;
        Ok(OutreachStats::aggregate(range, &counts))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_percentage_zero_total() {
        assert_eq!(percentage(0, 0), 0.0);
        assert_eq!(percentage(5, 0), 0.0);
        assert!(percentage(0, 0).is_finite());
    }

    #[test]
    fn test_percentage_rounds_to_one_decimal() {
        assert_eq!(percentage(1, 3), 33.3);
        assert_eq!(percentage(2, 3), 66.7);
        assert_eq!(percentage(3, 3), 100.0);
    }

    #[test]
    fn test_empty_stats_list_every_channel() {
        let stats = OutreachStats::aggregate(StatsRange::Week, &[]);
        assert_eq!(stats.total_sent, 0);
        assert_eq!(stats.reply_rate, 0.0);
        assert_eq!(stats.delivery_rate, 0.0);
        let channels: Vec<Channel> = stats.by_channel.iter().map(|c| c.channel).collect();
        assert_eq!(channels, vec![Channel::Email, Channel::Sms, Channel::Call]);
    }

    #[test]
    fn test_aggregate_totals() {
        let counts = vec![
            ChannelCounts {
                channel: Channel::Sms,
                total_sent: 4,
                delivered: 3,
                replies: 1,
                failed: 1,
            },
            ChannelCounts {
                channel: Channel::Email,
                total_sent: 6,
                delivered: 5,
                replies: 2,
                failed: 0,
            },
        ];
        let stats = OutreachStats::aggregate(StatsRange::Month, &counts);

        assert_eq!(stats.total_sent, 10);
        assert_eq!(stats.delivered, 8);
        assert_eq!(stats.replies, 3);
        assert_eq!(stats.reply_rate, 30.0);
        assert_eq!(stats.delivery_rate, 80.0);
        assert_eq!(stats.by_channel[0].channel, Channel::Email);
        assert_eq!(stats.by_channel[1].reply_rate, 25.0);
        assert_eq!(stats.by_channel[2].total_sent, 0);
    }

    #[test]
    fn test_serialized_shape() {
        let stats = OutreachStats::aggregate(StatsRange::Quarter, &[]);
        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["range"], "90d");
        assert_eq!(json["replyRate"], 0.0);
        assert!(json["byChannel"].is_array());
        assert_eq!(json["byChannel"][0]["totalSent"], 0);
    }
}
