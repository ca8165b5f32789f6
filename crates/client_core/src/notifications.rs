//! Session-scoped notification queue.
//!
//! Entries carry a stable identity (flag + outcome kind) so a repeated
//! outcome replaces its predecessor instead of stacking. Expiry is driven by
//! an external ticking collaborator calling [`NotificationQueue::prune_expired`];
//! the queue itself only appends and removes by identity.

use std::time::{Duration, Instant};

use shared::domain::FlagId;

/// How long a notification stays visible unless dismissed sooner.
pub const NOTIFICATION_TTL: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotificationKind {
    Submitted,
    InvalidFlag,
    SubmissionError,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Success,
    Warning,
    Danger,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NotificationId {
    pub flag: FlagId,
    pub kind: NotificationKind,
}

#[derive(Debug, Clone)]
pub struct Notification {
    pub id: NotificationId,
    pub severity: Severity,
    pub title: String,
    pub body: String,
    pub expires_at: Instant,
}

#[derive(Debug)]
pub struct NotificationQueue {
    entries: Vec<Notification>,
    ttl: Duration,
}

impl Default for NotificationQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationQueue {
    pub fn new() -> Self {
        Self::with_ttl(NOTIFICATION_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            entries: Vec::new(),
            ttl,
        }
    }

    /// Append a notification, replacing any live entry with the same
    /// identity (the replacement also restarts the expiry window).
    pub fn push(
        &mut self,
        id: NotificationId,
        severity: Severity,
        title: impl Into<String>,
        body: impl Into<String>,
        now: Instant,
    ) {
        let notification = Notification {
            id,
            severity,
            title: title.into(),
            body: body.into(),
            expires_at: now + self.ttl,
        };

        if let Some(existing) = self.entries.iter_mut().find(|n| n.id == notification.id) {
            *existing = notification;
        } else {
            self.entries.push(notification);
        }
    }

    pub fn dismiss(&mut self, id: &NotificationId) {
        self.entries.retain(|n| &n.id != id);
    }

    pub fn prune_expired(&mut self, now: Instant) {
        self.entries.retain(|n| n.expires_at > now);
    }

    /// Live entries at `now`. Entries past their expiry are skipped even if
    /// the ticking collaborator has not pruned them yet.
    pub fn active(&self, now: Instant) -> Vec<Notification> {
        self.entries
            .iter()
            .filter(|n| n.expires_at > now)
            .cloned()
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}
