//! Canonical volume state published to presentation layers.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use super::state::VolumeState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeReason {
    /// Volume or mute moved beyond the change epsilon
    VolumeChanged,
    /// A volume key was handled but the mixer did not move (limit reached)
    KeyFeedback,
}

impl fmt::Display for ChangeReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeReason::VolumeChanged => write!(f, "volume changed"),
            ChangeReason::KeyFeedback => write!(f, "key feedback"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StateChange {
    pub state: VolumeState,
    pub reason: ChangeReason,
}

pub type StateCallback = Box<dyn Fn(&StateChange) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionToken(u64);

/// Deduplicating fan-out of [`VolumeState`] changes
pub struct VolumeStateStream {
    current: VolumeState,
    last_published: VolumeState,
    subscribers: BTreeMap<SubscriptionToken, StateCallback>,
    next_token: u64,
}

impl VolumeStateStream {
    pub fn new(initial: VolumeState) -> Self {
        Self {
            current: initial,
            last_published: initial,
            subscribers: BTreeMap::new(),
            next_token: 1,
        }
    }

    pub fn current(&self) -> VolumeState {
        self.current
    }

    pub fn subscribe<F>(&mut self, callback: F) -> SubscriptionToken
    where
        F: Fn(&StateChange) + Send + Sync + 'static,
    {
        let token = SubscriptionToken(self.next_token);
        self.next_token += 1;
        self.subscribers.insert(token, Box::new(callback));
        token
    }

    pub fn unsubscribe(&mut self, token: SubscriptionToken) -> bool {
        self.subscribers.remove(&token).is_some()
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Replace the baseline without notifying anyone
    pub fn reset(&mut self, state: VolumeState) {
        self.current = state;
        self.last_published = state;
    }

    /// Record a fresh reading. Subscribers are notified only when volume or mute
    /// differs from the last published state; a device-only change just moves
    /// the current snapshot. Returns whether anything was published.
    pub fn publish(&mut self, state: VolumeState) -> bool {
        if state.has_device_change(&self.current) {
            debug!("Output device now {:?}", state.device());
        }
        self.current = state;

        if !state.has_volume_or_mute_change(&self.last_published) {
            return false;
        }

        self.last_published = state;
        debug!("Publishing volume state {}", state);
        self.notify(ChangeReason::VolumeChanged);
        true
    }

    /// Re-send the current state so the HUD reacts to a press that hit a limit
    pub fn emit_feedback(&self) {
        debug!("Publishing key feedback at {}", self.current);
        self.notify(ChangeReason::KeyFeedback);
    }

    fn notify(&self, reason: ChangeReason) {
        let change = StateChange {
            state: self.current,
            reason,
        };
        for callback in self.subscribers.values() {
            callback(&change);
        }
    }
}

impl Default for VolumeStateStream {
    fn default() -> Self {
        Self::new(VolumeState::default())
    }
}

/// Single-slot trailing debounce: every `schedule` replaces the pending deadline
#[derive(Debug, Clone)]
pub struct Debouncer {
    window: Duration,
    deadline: Option<Instant>,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            deadline: None,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// New window applies from the next `schedule`
    pub fn set_window(&mut self, window: Duration) {
        self.window = window;
    }

    pub fn schedule(&mut self) {
        self.deadline = Some(Instant::now() + self.window);
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Clear the slot if its deadline has passed; returns whether it fired
    pub fn fire(&mut self) -> bool {
        match self.deadline {
            Some(deadline) if deadline <= Instant::now() => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }
}

/// Resolves at `deadline`, or never when nothing is pending
pub async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
