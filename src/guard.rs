// 🛡️ Re-entrancy guards for user-triggered operations
//
// ConfirmGuard: destructive actions need a second trigger inside a window.
// BusyFlag:     a trigger stays disabled while its async job is running.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Default double-trigger window for deletes
pub const CONFIRM_WINDOW: Duration = Duration::from_secs(2);

// ============================================================================
// CONFIRM GUARD
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirm {
    /// First trigger: the action is armed, ask again to confirm
    Armed,
    /// Second trigger inside the window: go ahead
    Confirmed,
}

/// Two-step confirmation keyed by target (e.g. a library entry id)
#[derive(Debug, Clone)]
pub struct ConfirmGuard {
    window: Duration,
    armed: Option<(String, Instant)>,
}

impl ConfirmGuard {
    pub fn new(window: Duration) -> Self {
        ConfirmGuard { window, armed: None }
    }

    pub fn trigger(&mut self, key: &str) -> Confirm {
        self.trigger_at(key, Instant::now())
    }

    /// Same as `trigger` with an explicit clock
    pub fn trigger_at(&mut self, key: &str, now: Instant) -> Confirm {
        match &self.armed {
            Some((armed_key, at)) if armed_key == key && now.duration_since(*at) <= self.window => {
                self.armed = None;
                Confirm::Confirmed
            }
            _ => {
                self.armed = Some((key.to_string(), now));
                Confirm::Armed
            }
        }
    }

    /// Key currently waiting for confirmation, if its window is still open
    pub fn pending_at(&self, now: Instant) -> Option<&str> {
        self.armed
            .as_ref()
            .filter(|(_, at)| now.duration_since(*at) <= self.window)
            .map(|(k, _)| k.as_str())
    }

    pub fn pending(&self) -> Option<&str> {
        self.pending_at(Instant::now())
    }

    pub fn reset(&mut self) {
        self.armed = None;
    }
}

impl Default for ConfirmGuard {
    fn default() -> Self {
        Self::new(CONFIRM_WINDOW)
    }
}

// ============================================================================
// BUSY FLAG
// ============================================================================

/// Shared "operation in flight" flag
#[derive(Debug, Clone, Default)]
pub struct BusyFlag {
    busy: Arc<AtomicBool>,
}

/// Held while the operation runs; clears the flag on drop
#[derive(Debug)]
pub struct BusyToken {
    busy: Arc<AtomicBool>,
}

impl BusyFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// `None` when another run is already in progress
    pub fn try_acquire(&self) -> Option<BusyToken> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| BusyToken {
                busy: Arc::clone(&self.busy),
            })
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

impl Drop for BusyToken {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_trigger_inside_window_confirms() {
        let mut guard = ConfirmGuard::default();
        let t0 = Instant::now();

        assert_eq!(guard.trigger_at("tier_1", t0), Confirm::Armed);
        assert_eq!(guard.pending_at(t0), Some("tier_1"));
        assert_eq!(guard.trigger_at("tier_1", t0 + Duration::from_millis(500)), Confirm::Confirmed);
        assert_eq!(guard.pending_at(t0), None);
    }

    #[test]
    fn test_expired_window_rearms() {
        let mut guard = ConfirmGuard::new(Duration::from_secs(2));
        let t0 = Instant::now();

        guard.trigger_at("tier_1", t0);
        let late = t0 + Duration::from_secs(3);

        assert_eq!(guard.pending_at(late), None);
        assert_eq!(guard.trigger_at("tier_1", late), Confirm::Armed);
    }

    #[test]
    fn test_other_key_rearms() {
        let mut guard = ConfirmGuard::default();
        let t0 = Instant::now();

        guard.trigger_at("tier_1", t0);
        assert_eq!(guard.trigger_at("tier_2", t0), Confirm::Armed);
        assert_eq!(guard.trigger_at("tier_1", t0), Confirm::Armed);
    }

    #[test]
    fn test_busy_flag_blocks_reentry() {
        let flag = BusyFlag::new();

        let token = flag.try_acquire();
        assert!(token.is_some());
        assert!(flag.is_busy());
        assert!(flag.clone().try_acquire().is_none());

        drop(token);

        assert!(!flag.is_busy());
        assert!(flag.try_acquire().is_some());
    }
}
