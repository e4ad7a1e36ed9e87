//! Per-channel pause deadlines.
//!
//! A channel is paused while `now < paused_until`. Proposals merge by
//! maximum so a shorter, later proposal never cuts an existing pause short.
//! Deadlines live in a sharded map: each channel's merge runs under its own
//! entry lock, and checking one channel never waits on another channel's
//! job bookkeeping.

use dashmap::DashMap;
use tokio::time::Instant;

#[derive(Debug, Default)]
pub struct ChannelPauses {
    deadlines: DashMap<String, Instant>,
}

impl ChannelPauses {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge a proposed deadline and return the effective one.
    pub fn propose(&self, channel: &str, until: Instant) -> Instant {
        let mut deadline = self.deadlines.entry(channel.to_owned()).or_insert(until);
        if until > *deadline {
            *deadline = until;
        }
        *deadline
    }

    /// Current deadline if the channel is still paused at `now`.
    ///
    /// Expired deadlines are cleared on read.
    pub fn paused_until(&self, channel: &str, now: Instant) -> Option<Instant> {
        let deadline = self.deadlines.get(channel).map(|d| *d)?;
        if now < deadline {
            return Some(deadline);
        }
        // Re-check under the entry lock: a concurrent proposal may have
        // extended the deadline since the read above.
        self.deadlines.remove_if(channel, |_, d| *d <= now);
        None
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn unpaused_channel_reports_none() {
        let pauses = ChannelPauses::new();
        assert_eq!(pauses.paused_until("c", Instant::now()), None);
    }

    #[tokio::test(start_paused = true)]
    async fn longer_proposal_wins_regardless_of_order() {
        let now = Instant::now();
        let short = now + Duration::from_secs(5);
        let long = now + Duration::from_secs(12);

        let pauses = ChannelPauses::new();
        assert_eq!(pauses.propose("c", long), long);
        assert_eq!(pauses.propose("c", short), long);
        assert_eq!(pauses.paused_until("c", now), Some(long));

        let pauses = ChannelPauses::new();
        pauses.propose("c", short);
        assert_eq!(pauses.propose("c", long), long);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_proposals_keep_maximum() {
        let pauses = Arc::new(ChannelPauses::new());
        let now = Instant::now();

        let handles: Vec<_> = (1..=20u64)
            .map(|secs| {
                let pauses = Arc::clone(&pauses);
                tokio::spawn(async move {
                    pauses.propose("c", now + Duration::from_secs(secs));
                })
            })
            .collect();
        for h in handles {
            h.await.unwrap();
        }

        assert_eq!(
            pauses.paused_until("c", now),
            Some(now + Duration::from_secs(20))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn expired_deadline_is_cleared() {
        let pauses = ChannelPauses::new();
        let now = Instant::now();
        pauses.propose("c", now + Duration::from_secs(1));

        assert_eq!(pauses.paused_until("c", now + Duration::from_secs(1)), None);
        assert!(pauses.deadlines.is_empty());

        // A fresh shorter pause applies once the old one has lapsed.
        let later = now + Duration::from_secs(2);
        pauses.propose("c", later + Duration::from_millis(100));
        assert!(pauses.paused_until("c", later).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn channels_are_independent() {
        let pauses = ChannelPauses::new();
        let now = Instant::now();
        pauses.propose("a", now + Duration::from_secs(5));
        assert!(pauses.paused_until("a", now).is_some());
        assert!(pauses.paused_until("b", now).is_none());
    }
}
