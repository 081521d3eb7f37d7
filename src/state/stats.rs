//! Runtime statistics for LUSERS, STATS and the admin surface.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Live counters. All updates are relaxed; readers take a snapshot.
#[derive(Debug, Default)]
pub struct StatsTracker {
    local_users: AtomicUsize,
    remote_users: AtomicUsize,
    invisible: AtomicUsize,
    opers: AtomicUsize,
    channels: AtomicUsize,
    servers: AtomicUsize,
    unregistered: AtomicUsize,
    max_local_users: AtomicUsize,
    commands_processed: AtomicU64,
    started_at: AtomicU64,
}

/// A point-in-time view of the counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub local_users: usize,
    pub remote_users: usize,
    pub invisible: usize,
    pub opers: usize,
    pub channels: usize,
    pub servers: usize,
    pub unregistered: usize,
    pub max_local_users: usize,
    pub commands_processed: u64,
    pub uptime_secs: u64,
}

impl StatsSnapshot {
    pub fn total_users(&self) -> usize {
        self.local_users + self.remote_users
    }

    pub fn visible(&self) -> usize {
        self.total_users().saturating_sub(self.invisible)
    }
}

impl StatsTracker {
    pub fn new() -> Self {
        let tracker = Self::default();
        tracker
            .started_at
            .store(chrono::Utc::now().timestamp() as u64, Ordering::Relaxed);
        tracker
    }

    pub fn connection_opened(&self) {
        self.unregistered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_abandoned(&self) {
        saturating_dec(&self.unregistered);
    }

    pub fn user_registered(&self) {
        saturating_dec(&self.unregistered);
        let count = self.local_users.fetch_add(1, Ordering::Relaxed) + 1;
        self.max_local_users.fetch_max(count, Ordering::Relaxed);
    }

    pub fn user_disconnected(&self, was_invisible: bool, was_oper: bool) {
        saturating_dec(&self.local_users);
        if was_invisible {
            saturating_dec(&self.invisible);
        }
        if was_oper {
            saturating_dec(&self.opers);
        }
    }

    pub fn remote_user_added(&self) {
        self.remote_users.fetch_add(1, Ordering::Relaxed);
    }

    pub fn remote_user_removed(&self, was_oper: bool) {
        saturating_dec(&self.remote_users);
        if was_oper {
            saturating_dec(&self.opers);
        }
    }

    pub fn set_invisible(&self, on: bool) {
        if on {
            self.invisible.fetch_add(1, Ordering::Relaxed);
        } else {
            saturating_dec(&self.invisible);
        }
    }

    pub fn opered(&self) {
        self.opers.fetch_add(1, Ordering::Relaxed);
    }

    pub fn deopered(&self) {
        saturating_dec(&self.opers);
    }

    pub fn channel_created(&self) {
        self.channels.fetch_add(1, Ordering::Relaxed);
    }

    pub fn channel_destroyed(&self) {
        saturating_dec(&self.channels);
    }

    pub fn server_linked(&self) {
        self.servers.fetch_add(1, Ordering::Relaxed);
    }

    pub fn server_delinked(&self) {
        saturating_dec(&self.servers);
    }

    pub fn command_processed(&self) {
        self.commands_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let started = self.started_at.load(Ordering::Relaxed);
        let now = chrono::Utc::now().timestamp() as u64;
        StatsSnapshot {
            local_users: self.local_users.load(Ordering::Relaxed),
            remote_users: self.remote_users.load(Ordering::Relaxed),
            invisible: self.invisible.load(Ordering::Relaxed),
            opers: self.opers.load(Ordering::Relaxed),
            channels: self.channels.load(Ordering::Relaxed),
            servers: self.servers.load(Ordering::Relaxed),
            unregistered: self.unregistered.load(Ordering::Relaxed),
            max_local_users: self.max_local_users.load(Ordering::Relaxed),
            commands_processed: self.commands_processed.load(Ordering::Relaxed),
            uptime_secs: now.saturating_sub(started),
        }
    }
}

fn saturating_dec(counter: &AtomicUsize) {
    let _ = counter.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| v.checked_sub(1));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registration_flow() {
        let stats = StatsTracker::new();
        stats.connection_opened();
        assert_eq!(stats.snapshot().unregistered, 1);
        stats.user_registered();
        let snap = stats.snapshot();
        assert_eq!(snap.unregistered, 0);
        assert_eq!(snap.local_users, 1);
        assert_eq!(snap.max_local_users, 1);
        stats.user_disconnected(false, false);
        assert_eq!(stats.snapshot().local_users, 0);
        assert_eq!(stats.snapshot().max_local_users, 1);
    }

    #[test]
    fn counters_never_underflow() {
        let stats = StatsTracker::new();
        stats.user_disconnected(true, true);
        let snap = stats.snapshot();
        assert_eq!(snap.local_users, 0);
        assert_eq!(snap.invisible, 0);
        assert_eq!(snap.opers, 0);
    }

    #[test]
    fn visibility_accounting() {
        let stats = StatsTracker::new();
        stats.connection_opened();
        stats.user_registered();
        stats.remote_user_added();
        stats.set_invisible(true);
        let snap = stats.snapshot();
        assert_eq!(snap.total_users(), 2);
        assert_eq!(snap.visible(), 1);
    }
}
