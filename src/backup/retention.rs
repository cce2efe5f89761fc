//! Tiered backup retention
//!
//! Backups age through three buckets: recent backups are kept daily, a
//! Monday backup survives into the weekly window, a first-of-the-month
//! backup survives into the monthly window, and everything past the last
//! window expires. The newest backup overall is never deleted, so there
//! is always at least one recoverable state.

use chrono::{DateTime, Datelike, Utc, Weekday};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Tiered retention policy
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RetentionPolicy {
    /// Days of daily backups to keep
    pub retain_days: u32,
    /// Weekly (Monday) backups to keep past the daily window
    pub retain_weekly: u32,
    /// Monthly (first-of-month) backups to keep past the weekly window
    pub retain_monthly: u32,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            retain_days: 7,
            retain_weekly: 4,
            retain_monthly: 6,
        }
    }
}

impl RetentionPolicy {
    pub fn with_retain_days(mut self, days: u32) -> Self {
        self.retain_days = days;
        self
    }

    pub fn with_retain_weekly(mut self, weekly: u32) -> Self {
        self.retain_weekly = weekly;
        self
    }

    pub fn with_retain_monthly(mut self, monthly: u32) -> Self {
        self.retain_monthly = monthly;
        self
    }

    fn weekly_window_days(&self) -> i64 {
        self.retain_days as i64 + 7 * self.retain_weekly as i64
    }

    fn monthly_window_days(&self) -> i64 {
        self.weekly_window_days() + 30 * self.retain_monthly as i64
    }
}

/// One known backup, as seen by the cleanup planner
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupEntry {
    pub backup_id: String,
    pub created_at: DateTime<Utc>,
}

/// Retention bucket a backup falls into by age and calendar position
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetentionBucket {
    Daily,
    Weekly,
    Monthly,
    Expired,
}

/// Classify one backup by its age relative to `now`
///
/// Inside the weekly window only Monday backups qualify; inside the
/// monthly window only first-of-month backups qualify. A Tuesday backup
/// older than the daily window is already expired.
pub fn classify(
    created_at: DateTime<Utc>,
    now: DateTime<Utc>,
    policy: &RetentionPolicy,
) -> RetentionBucket {
    let age_days = (now - created_at).num_days();

    if age_days < policy.retain_days as i64 {
        return RetentionBucket::Daily;
    }
    if age_days < policy.weekly_window_days() && created_at.weekday() == Weekday::Mon {
        return RetentionBucket::Weekly;
    }
    if age_days < policy.monthly_window_days() && created_at.day() == 1 {
        return RetentionBucket::Monthly;
    }
    RetentionBucket::Expired
}

/// Decide which backups to delete
///
/// Keeps the most-recent `retain_days` / `retain_weekly` / `retain_monthly`
/// entries of each bucket and deletes the rest. The newest backup overall
/// is always kept, which also covers the sole-remaining-backup case.
pub fn plan_cleanup(
    entries: &[BackupEntry],
    policy: &RetentionPolicy,
    now: DateTime<Utc>,
) -> Vec<String> {
    let mut sorted: Vec<&BackupEntry> = entries.iter().collect();
    // Newest first; id is the tie-break so the plan is deterministic.
    sorted.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| b.backup_id.cmp(&a.backup_id))
    });

    let mut deletions = Vec::new();
    let mut kept_daily = 0u32;
    let mut kept_weekly = 0u32;
    let mut kept_monthly = 0u32;

    for (position, entry) in sorted.iter().enumerate() {
        let bucket = classify(entry.created_at, now, policy);
        let mut keep = match bucket {
            RetentionBucket::Daily if kept_daily < policy.retain_days => {
                kept_daily += 1;
                true
            }
            RetentionBucket::Weekly if kept_weekly < policy.retain_weekly => {
                kept_weekly += 1;
                true
            }
            RetentionBucket::Monthly if kept_monthly < policy.retain_monthly => {
                kept_monthly += 1;
                true
            }
            _ => false,
        };

        // Last-backup-standing guarantee: the newest backup survives even
        // when it falls outside every retention window.
        if position == 0 {
            keep = true;
        }

        if !keep {
            debug!(backup_id = %entry.backup_id, ?bucket, "backup expired by retention policy");
            deletions.push(entry.backup_id.clone());
        }
    }

    deletions
}
