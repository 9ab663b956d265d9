//! Shared runtime state of the rotation engine

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Mutex, MutexGuard, PoisonError,
    },
    time::Instant,
};
use chrono::{DateTime, Utc};
use tracing::debug;

use super::{RefreshRegistry, RotationState};

/// In-memory state owned by the engine.
///
/// `rotation` is the authoritative copy of the persisted record; everything
/// else here is ephemeral and may be lost across a restart.
#[derive(Debug)]
pub struct AppState {
    rotation: Mutex<RotationState>,
    refresh_registry: Mutex<RefreshRegistry>,
    /// Single-slot lock guarding navigation
    navigating: AtomicBool,
    /// Server metadata
    pub start_time: Instant,
    /// Last command tracking
    last_command: Mutex<Option<(String, DateTime<Utc>)>>,
}

impl AppState {
    /// Create a new AppState holding a default rotation record
    pub fn new() -> Self {
        Self {
            rotation: Mutex::new(RotationState::default()),
            refresh_registry: Mutex::new(RefreshRegistry::new()),
            navigating: AtomicBool::new(false),
            start_time: Instant::now(),
            last_command: Mutex::new(None),
        }
    }

    fn rotation_guard(&self) -> MutexGuard<'_, RotationState> {
        self.rotation.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Clone of the current rotation record
    pub fn snapshot(&self) -> RotationState {
        self.rotation_guard().clone()
    }

    /// Read the rotation record without cloning it
    pub fn read<R>(&self, reader: impl FnOnce(&RotationState) -> R) -> R {
        reader(&self.rotation_guard())
    }

    /// Mutate the rotation record in place
    pub fn update<R>(&self, updater: impl FnOnce(&mut RotationState) -> R) -> R {
        updater(&mut self.rotation_guard())
    }

    /// Swap in a freshly loaded record
    pub fn replace(&self, state: RotationState) {
        *self.rotation_guard() = state;
    }

    /// Access the refresh registry
    pub fn refresh_registry(&self) -> MutexGuard<'_, RefreshRegistry> {
        self.refresh_registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Claim the navigation slot. Returns `None` while another navigation
    /// holds it; the slot is released when the guard drops.
    pub fn try_begin_navigation(&self) -> Option<NavigationGuard<'_>> {
        self.navigating
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| NavigationGuard { flag: &self.navigating })
    }

    pub fn is_navigating(&self) -> bool {
        self.navigating.load(Ordering::Acquire)
    }

    /// Record the last command handled, for status reporting
    pub fn record_command(&self, command: &str) {
        let mut last = self
            .last_command
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *last = Some((command.to_string(), Utc::now()));
    }

    /// Get last command information
    pub fn last_command(&self) -> Option<(String, DateTime<Utc>)> {
        self.last_command
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Calculate server uptime as a formatted string
    pub fn get_uptime(&self) -> String {
        let duration = self.start_time.elapsed();
        let hours = duration.as_secs() / 3600;
        let minutes = (duration.as_secs() % 3600) / 60;
        let seconds = duration.as_secs() % 60;

        if hours > 0 {
            format!("{}h {}m {}s", hours, minutes, seconds)
        } else if minutes > 0 {
            format!("{}m {}s", minutes, seconds)
        } else {
            format!("{}s", seconds)
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

/// Holds the navigation slot for the duration of one navigation
#[derive(Debug)]
pub struct NavigationGuard<'a> {
    flag: &'a AtomicBool,
}

impl Drop for NavigationGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
        debug!("Navigation slot released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn navigation_slot_admits_one_holder() {
        let state = AppState::new();
        let guard = state.try_begin_navigation();
        assert!(guard.is_some());
        assert!(state.is_navigating());
        assert!(state.try_begin_navigation().is_none());

        drop(guard);
        assert!(!state.is_navigating());
        assert!(state.try_begin_navigation().is_some());
    }

    #[test]
    fn update_mutates_authoritative_copy() {
        let state = AppState::new();
        state.update(|s| s.current_index = 4);
        assert_eq!(state.snapshot().current_index, 4);
        assert_eq!(state.read(|s| s.current_index), 4);
    }
}
