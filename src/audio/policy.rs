//! Volume stepping rules for the hardware volume keys.
//!
//! [`StepPolicy::plan`] is pure: it turns the current mixer reading and a key
//! press into an ordered list of mixer writes. Executing the writes is the
//! controller's job.

use std::collections::HashMap;

use super::device::DeviceId;
use super::levels::{FINE_STEPS, STANDARD_STEPS};
use super::state::clamp_volume;
use crate::config::VolumeConfig;

/// Volume restored on unmute when nothing was ever observed for the device
pub const DEFAULT_UNMUTE_FALLBACK: f32 = 0.25;

/// Volume-affecting keys the policy knows how to step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolumeKey {
    SoundUp,
    SoundDown,
    Mute,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Granularity {
    Coarse,
    /// Shift+Option held
    Fine,
}

/// What the mixer reported just before the key was handled
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MixerSnapshot {
    pub volume: f32,
    pub is_muted: bool,
    pub has_mute_control: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MixerWrite {
    SetMute(bool),
    SetVolume(f32),
}

/// Ordered writes plus the state they lead to
#[derive(Debug, Clone, PartialEq)]
pub struct StepPlan {
    pub writes: Vec<MixerWrite>,
    pub volume: f32,
    pub is_muted: bool,
}

impl StepPlan {
    fn unchanged(snapshot: &MixerSnapshot) -> Self {
        Self {
            writes: Vec::new(),
            volume: snapshot.volume,
            is_muted: snapshot.is_muted,
        }
    }

    pub fn is_noop(&self) -> bool {
        self.writes.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepPolicy {
    coarse_step: f32,
    fine_step: f32,
    unmute_fallback: f32,
}

impl Default for StepPolicy {
    fn default() -> Self {
        Self {
            coarse_step: 1.0 / STANDARD_STEPS as f32,
            fine_step: 1.0 / FINE_STEPS as f32,
            unmute_fallback: DEFAULT_UNMUTE_FALLBACK,
        }
    }
}

impl StepPolicy {
    pub fn new(coarse_steps: u32, fine_steps: u32, unmute_fallback: f32) -> Self {
        Self {
            coarse_step: 1.0 / coarse_steps.max(1) as f32,
            fine_step: 1.0 / fine_steps.max(1) as f32,
            unmute_fallback: clamp_volume(unmute_fallback),
        }
    }

    pub fn from_config(config: &VolumeConfig) -> Self {
        Self::new(
            config.coarse_steps,
            config.fine_steps,
            config.unmute_fallback,
        )
    }

    pub fn step_size(&self, granularity: Granularity) -> f32 {
        match granularity {
            Granularity::Coarse => self.coarse_step,
            Granularity::Fine => self.fine_step,
        }
    }

    pub fn unmute_fallback(&self) -> f32 {
        self.unmute_fallback
    }

    pub fn plan(
        &self,
        snapshot: MixerSnapshot,
        key: VolumeKey,
        granularity: Granularity,
        last_non_zero: Option<f32>,
    ) -> StepPlan {
        match key {
            VolumeKey::SoundUp => self.plan_step(snapshot, self.step_size(granularity)),
            VolumeKey::SoundDown => self.plan_step(snapshot, -self.step_size(granularity)),
            VolumeKey::Mute if snapshot.has_mute_control => {
                self.plan_mute_toggle(snapshot, last_non_zero)
            }
            VolumeKey::Mute => self.plan_emulated_mute(snapshot, last_non_zero),
        }
    }

    fn restore_volume(&self, last_non_zero: Option<f32>) -> f32 {
        last_non_zero
            .filter(|volume| *volume > 0.0)
            .unwrap_or(self.unmute_fallback)
    }

    fn plan_step(&self, snapshot: MixerSnapshot, delta: f32) -> StepPlan {
        // Volume stays put under a real mute so unmuting restores the old level
        if delta < 0.0 && snapshot.has_mute_control && snapshot.is_muted {
            return StepPlan::unchanged(&snapshot);
        }

        let target = clamp_volume(snapshot.volume + delta);
        let mut plan = StepPlan::unchanged(&snapshot);

        if snapshot.has_mute_control && snapshot.is_muted && target > 0.0 {
            plan.writes.push(MixerWrite::SetMute(false));
            plan.is_muted = false;
        }

        if target != snapshot.volume {
            plan.writes.push(MixerWrite::SetVolume(target));
            plan.volume = target;
        }

        if snapshot.has_mute_control && !snapshot.is_muted && target == 0.0 {
            plan.writes.push(MixerWrite::SetMute(true));
            plan.is_muted = true;
        }

        plan
    }

    fn plan_mute_toggle(&self, snapshot: MixerSnapshot, last_non_zero: Option<f32>) -> StepPlan {
        let target_mute = !snapshot.is_muted;
        let mut plan = StepPlan::unchanged(&snapshot);
        plan.writes.push(MixerWrite::SetMute(target_mute));
        plan.is_muted = target_mute;

        if !target_mute && snapshot.volume <= 0.0 {
            let restore = self.restore_volume(last_non_zero);
            plan.writes.push(MixerWrite::SetVolume(restore));
            plan.volume = restore;
        }

        plan
    }

    fn plan_emulated_mute(&self, snapshot: MixerSnapshot, last_non_zero: Option<f32>) -> StepPlan {
        let target = if snapshot.volume > 0.0 {
            0.0
        } else {
            self.restore_volume(last_non_zero)
        };

        let mut plan = StepPlan::unchanged(&snapshot);
        if target != snapshot.volume {
            plan.writes.push(MixerWrite::SetVolume(target));
            plan.volume = target;
        }
        plan
    }
}

/// Last audible volume seen per device, kept for the life of the process.
/// Device ids are not reused predictably, so stale entries only ever miss.
#[derive(Debug, Default, Clone)]
pub struct LastVolumeCache {
    entries: HashMap<DeviceId, f32>,
}

impl LastVolumeCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember `volume` for `device`; silent values are ignored
    pub fn record(&mut self, device: DeviceId, volume: f32) {
        if volume > 0.0 {
            self.entries.insert(device, clamp_volume(volume));
        }
    }

    pub fn get(&self, device: DeviceId) -> Option<f32> {
        self.entries.get(&device).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(volume: f32, is_muted: bool, has_mute_control: bool) -> MixerSnapshot {
        MixerSnapshot {
            volume,
            is_muted,
            has_mute_control,
        }
    }

    #[test]
    fn test_default_step_sizes() {
        let policy = StepPolicy::default();
        assert_eq!(policy.step_size(Granularity::Coarse), 0.0625);
        assert_eq!(policy.step_size(Granularity::Fine), 0.015625);
        assert_eq!(policy.unmute_fallback(), 0.25);
    }

    #[test]
    fn test_step_up_writes_volume_only() {
        let plan = StepPolicy::default().plan(
            snapshot(0.5, false, true),
            VolumeKey::SoundUp,
            Granularity::Coarse,
            None,
        );

        assert_eq!(plan.writes, vec![MixerWrite::SetVolume(0.5625)]);
        assert!(!plan.is_muted);
    }

    #[test]
    fn test_step_up_at_ceiling_is_noop() {
        let current = snapshot(1.0, false, true);
        let plan =
            StepPolicy::default().plan(current, VolumeKey::SoundUp, Granularity::Fine, None);

        assert!(plan.is_noop());
        assert_eq!(plan.volume, current.volume);
    }

    #[test]
    fn test_step_down_to_zero_mutes() {
        let plan = StepPolicy::default().plan(
            snapshot(0.05, false, true),
            VolumeKey::SoundDown,
            Granularity::Coarse,
            None,
        );

        assert_eq!(
            plan.writes,
            vec![MixerWrite::SetVolume(0.0), MixerWrite::SetMute(true)]
        );
        assert!(plan.is_muted);
    }

    #[test]
    fn test_step_up_from_muted_zero_unmutes_first() {
        let plan = StepPolicy::default().plan(
            snapshot(0.0, true, true),
            VolumeKey::SoundUp,
            Granularity::Coarse,
            None,
        );

        assert_eq!(
            plan.writes,
            vec![MixerWrite::SetMute(false), MixerWrite::SetVolume(0.0625)]
        );
    }

    #[test]
    fn test_step_down_while_muted_keeps_volume() {
        let current = snapshot(0.5625, true, true);
        let plan =
            StepPolicy::default().plan(current, VolumeKey::SoundDown, Granularity::Coarse, None);

        assert!(plan.is_noop());
        assert_eq!(plan.volume, 0.5625);
        assert!(plan.is_muted);
    }

    #[test]
    fn test_step_down_without_mute_control_never_mutes() {
        let plan = StepPolicy::default().plan(
            snapshot(0.03, false, false),
            VolumeKey::SoundDown,
            Granularity::Coarse,
            None,
        );

        assert_eq!(plan.writes, vec![MixerWrite::SetVolume(0.0)]);
        assert!(!plan.is_muted);
    }

    #[test]
    fn test_unmute_at_zero_restores_cached_volume() {
        let plan = StepPolicy::default().plan(
            snapshot(0.0, true, true),
            VolumeKey::Mute,
            Granularity::Coarse,
            Some(0.6),
        );

        assert_eq!(
            plan.writes,
            vec![MixerWrite::SetMute(false), MixerWrite::SetVolume(0.6)]
        );
    }

    #[test]
    fn test_unmute_at_zero_uses_fallback_without_cache() {
        let plan = StepPolicy::new(16, 64, 0.4).plan(
            snapshot(0.0, true, true),
            VolumeKey::Mute,
            Granularity::Coarse,
            None,
        );

        assert_eq!(plan.volume, 0.4);
    }

    #[test]
    fn test_emulated_mute_round_trip() {
        let policy = StepPolicy::default();

        let mute = policy.plan(
            snapshot(0.4, false, false),
            VolumeKey::Mute,
            Granularity::Coarse,
            Some(0.4),
        );
        assert_eq!(mute.writes, vec![MixerWrite::SetVolume(0.0)]);

        let unmute = policy.plan(
            snapshot(0.0, false, false),
            VolumeKey::Mute,
            Granularity::Coarse,
            Some(0.4),
        );
        assert_eq!(unmute.writes, vec![MixerWrite::SetVolume(0.4)]);
    }

    #[test]
    fn test_targets_stay_in_range() {
        let policy = StepPolicy::default();
        for granularity in [Granularity::Coarse, Granularity::Fine] {
            for i in 0..=100 {
                let volume = i as f32 / 100.0;
                for key in [VolumeKey::SoundUp, VolumeKey::SoundDown] {
                    let plan = policy.plan(snapshot(volume, false, true), key, granularity, None);
                    assert!((0.0..=1.0).contains(&plan.volume));
                }
            }
        }
    }

    #[test]
    fn test_cache_ignores_silence() {
        let device = DeviceId::from_raw(9).unwrap();
        let mut cache = LastVolumeCache::new();

        cache.record(device, 0.0);
        assert!(cache.get(device).is_none());

        cache.record(device, 0.7);
        cache.record(device, 0.0);
        assert_eq!(cache.get(device), Some(0.7));
        assert_eq!(cache.len(), 1);
    }
}
