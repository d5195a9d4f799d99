use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Snapshot of the sync service's state, pushed to subscribers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStatus {
    pub is_online: bool,
    pub last_sync: Option<DateTime<Utc>>,
    pub pending_changes: usize,
    pub is_syncing: bool,
    /// Pending entries that hit the retry ceiling.
    pub needs_attention: usize,
}

/// Coarse state for a status badge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncBadge {
    Offline,
    Syncing,
    NeedsAttention,
    Pending,
    Synced,
}

impl SyncStatus {
    /// Local and remote are expected to agree.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.is_online && !self.is_syncing && self.pending_changes == 0
    }

    #[must_use]
    pub fn badge(&self) -> SyncBadge {
        if !self.is_online {
            SyncBadge::Offline
        } else if self.is_syncing {
            SyncBadge::Syncing
        } else if self.needs_attention > 0 {
            SyncBadge::NeedsAttention
        } else if self.pending_changes > 0 {
            SyncBadge::Pending
        } else {
            SyncBadge::Synced
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offline_wins_over_pending() {
        let status = SyncStatus {
            is_online: false,
            pending_changes: 4,
            ..SyncStatus::default()
        };
        assert_eq!(status.badge(), SyncBadge::Offline);
        assert!(!status.is_settled());
    }

    #[test]
    fn attention_is_reported_before_plain_pending() {
        let status = SyncStatus {
            is_online: true,
            pending_changes: 2,
            needs_attention: 1,
            ..SyncStatus::default()
        };
        assert_eq!(status.badge(), SyncBadge::NeedsAttention);
    }

    #[test]
    fn online_and_empty_is_synced() {
        let status = SyncStatus {
            is_online: true,
            ..SyncStatus::default()
        };
        assert_eq!(status.badge(), SyncBadge::Synced);
        assert!(status.is_settled());
    }
}
