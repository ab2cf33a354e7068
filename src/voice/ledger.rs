use std::{collections::HashMap, time::Duration};

use chrono::{DateTime, Utc};
use poise::serenity_prelude::GuildId;
use tokio::{sync::Mutex, time::Instant};
use tracing::info;

#[derive(Debug, Clone, Copy)]
pub struct IssueRecord {
    pub at: Instant,
    pub recorded_at: DateTime<Utc>,
}

/// Guilds whose voice connection recently failed hard, and when.
///
/// An entry blocks new connection attempts for `window`. Expired entries are pruned lazily on
/// lookup.
#[derive(Debug)]
pub struct ConnectionIssueLedger {
    window: Duration,
    entries: Mutex<HashMap<GuildId, IssueRecord>>,
}

impl ConnectionIssueLedger {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub async fn record(&self, guild: GuildId) -> IssueRecord {
        let record = IssueRecord {
            at: Instant::now(),
            recorded_at: Utc::now(),
        };
        self.entries.lock().await.insert(guild, record);
        info!(
            "Recorded voice connection issue for guild {guild}, cooling down for {}s",
            self.window.as_secs()
        );
        record
    }

    pub async fn get(&self, guild: GuildId) -> Option<IssueRecord> {
        let mut entries = self.entries.lock().await;
        let record = *entries.get(&guild)?;

        if record.at.elapsed() >= self.window {
            entries.remove(&guild);
            return None;
        }
        Some(record)
    }

    /// Time left before the guild may try connecting again
    pub async fn remaining(&self, guild: GuildId) -> Option<Duration> {
        let record = self.get(guild).await?;
        Some(self.window.saturating_sub(record.at.elapsed()))
    }

    pub async fn clear(&self, guild: GuildId) -> bool {
        self.entries.lock().await.remove(&guild).is_some()
    }

    pub async fn clear_all(&self) -> usize {
        let mut entries = self.entries.lock().await;
        let count = entries.len();
        entries.clear();
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GUILD: GuildId = GuildId::new(1);

    #[tokio::test(start_paused = true)]
    async fn entries_expire_after_window() {
        let ledger = ConnectionIssueLedger::new(Duration::from_secs(120));
        assert!(ledger.remaining(GUILD).await.is_none());

        ledger.record(GUILD).await;
        assert_eq!(
            ledger.remaining(GUILD).await,
            Some(Duration::from_secs(120))
        );

        tokio::time::advance(Duration::from_secs(90)).await;
        assert_eq!(ledger.remaining(GUILD).await, Some(Duration::from_secs(30)));

        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(ledger.remaining(GUILD).await.is_none());
        assert!(!ledger.clear(GUILD).await, "expired entry should be pruned");
    }

    #[tokio::test]
    async fn clearing() {
        let ledger = ConnectionIssueLedger::new(Duration::from_secs(120));
        ledger.record(GUILD).await;
        ledger.record(GuildId::new(2)).await;

        assert!(ledger.clear(GUILD).await);
        assert!(!ledger.clear(GUILD).await);
        assert_eq!(ledger.clear_all().await, 1);
        assert!(ledger.get(GuildId::new(2)).await.is_none());
    }
}
