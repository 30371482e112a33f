use tracing::{debug, warn};

use super::device::DeviceId;
use super::policy::{Granularity, LastVolumeCache, MixerSnapshot, MixerWrite, StepPolicy};
use super::state::clamp_volume;
use crate::keys::MediaKey;
use crate::system::AudioHardware;

/// Outcome of handling one media key press
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKeyHandlingResult {
    /// Let the event continue to the OS and other applications
    PassThrough,
    /// The event was absorbed. `did_change` is false when no mixer value
    /// actually moved, in which case no property notification will follow.
    Consumed { did_change: bool },
}

impl MediaKeyHandlingResult {
    pub fn is_consumed(&self) -> bool {
        matches!(self, MediaKeyHandlingResult::Consumed { .. })
    }
}

/// Applies volume key presses to the default output device.
///
/// Every press re-reads the default device and its controls, so a routing
/// change between presses is picked up without any notification.
pub struct VolumeKeyController<A: AudioHardware> {
    audio_system: A,
    policy: StepPolicy,
    last_volumes: LastVolumeCache,
}

impl<A: AudioHardware> VolumeKeyController<A> {
    pub fn new(audio_system: A, policy: StepPolicy) -> Self {
        Self {
            audio_system,
            policy,
            last_volumes: LastVolumeCache::new(),
        }
    }

    pub fn handle(&mut self, key: MediaKey, granularity: Granularity) -> MediaKeyHandlingResult {
        let Some(volume_key) = key.volume_key() else {
            return MediaKeyHandlingResult::PassThrough;
        };

        let Some(device) = self.audio_system.default_output_device() else {
            debug!("No default output device, passing {} through", key);
            return MediaKeyHandlingResult::PassThrough;
        };

        let Some(volume_control) = self.audio_system.resolve_volume_control(device) else {
            debug!("Device {} has no volume control, passing {} through", device, key);
            return MediaKeyHandlingResult::PassThrough;
        };

        let volume = clamp_volume(
            self.audio_system
                .get_volume(device, volume_control)
                .unwrap_or(0.0),
        );
        let mute_control = self.audio_system.resolve_mute_control(device);
        let is_muted = mute_control
            .and_then(|control| self.audio_system.get_mute(device, control))
            .unwrap_or(false);

        self.last_volumes.record(device, volume);

        let snapshot = MixerSnapshot {
            volume,
            is_muted,
            has_mute_control: mute_control.is_some(),
        };
        let plan = self
            .policy
            .plan(snapshot, volume_key, granularity, self.last_volumes.get(device));

        debug!(
            "{} on {}: {:.4}{} -> {:.4}{} ({} writes)",
            key,
            device,
            snapshot.volume,
            if snapshot.is_muted { " muted" } else { "" },
            plan.volume,
            if plan.is_muted { " muted" } else { "" },
            plan.writes.len()
        );

        if plan.is_noop() {
            return MediaKeyHandlingResult::Consumed { did_change: false };
        }

        let mut applied = 0;
        let mut did_change = false;
        let mut current = snapshot;

        for write in &plan.writes {
            let accepted = match *write {
                MixerWrite::SetMute(muted) => match mute_control {
                    Some(control) => self.audio_system.set_mute(device, control, muted),
                    None => false,
                },
                MixerWrite::SetVolume(target) => {
                    self.audio_system.set_volume(device, volume_control, target)
                }
            };

            // A rejected write aborts the rest of the plan; the next press
            // starts again from a fresh read
            if !accepted {
                warn!("Mixer rejected {:?} on device {}", write, device);
                break;
            }

            applied += 1;
            match *write {
                MixerWrite::SetMute(muted) => {
                    did_change |= muted != current.is_muted;
                    current.is_muted = muted;
                }
                MixerWrite::SetVolume(target) => {
                    did_change |= target != current.volume;
                    current.volume = target;
                    self.last_volumes.record(device, target);
                }
            }
        }

        if applied == 0 {
            MediaKeyHandlingResult::PassThrough
        } else {
            MediaKeyHandlingResult::Consumed { did_change }
        }
    }

    pub fn set_policy(&mut self, policy: StepPolicy) {
        self.policy = policy;
    }

    pub fn policy(&self) -> &StepPolicy {
        &self.policy
    }

    /// Last audible volume seen for `device`
    pub fn last_volume(&self, device: DeviceId) -> Option<f32> {
        self.last_volumes.get(device)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::VolumeControl;
    use crate::system::MockAudioHardware;

    fn setup(volume: f32, muted: Option<bool>) -> (MockAudioHardware, DeviceId) {
        let audio = MockAudioHardware::new();
        let device = audio.add_device(1, Some(VolumeControl::main()), volume, muted);
        audio.set_default_output(Some(device));
        (audio, device)
    }

    #[test]
    fn test_brightness_keys_pass_through() {
        let (audio, _) = setup(0.5, Some(false));
        let mut controller = VolumeKeyController::new(audio.clone(), StepPolicy::default());

        for key in [MediaKey::BrightnessUp, MediaKey::BrightnessDown] {
            assert_eq!(
                controller.handle(key, Granularity::Coarse),
                MediaKeyHandlingResult::PassThrough
            );
        }
        assert_eq!(audio.write_count(), 0);
    }

    #[test]
    fn test_no_device_passes_through() {
        let audio = MockAudioHardware::new();
        let mut controller = VolumeKeyController::new(audio, StepPolicy::default());

        assert_eq!(
            controller.handle(MediaKey::SoundUp, Granularity::Coarse),
            MediaKeyHandlingResult::PassThrough
        );
    }

    #[test]
    fn test_device_without_volume_control_passes_through() {
        let audio = MockAudioHardware::new();
        let device = audio.add_device(4, None, 0.0, Some(false));
        audio.set_default_output(Some(device));
        let mut controller = VolumeKeyController::new(audio, StepPolicy::default());

        assert_eq!(
            controller.handle(MediaKey::Mute, Granularity::Coarse),
            MediaKeyHandlingResult::PassThrough
        );
    }

    #[test]
    fn test_step_up_consumes_and_changes() {
        let (audio, device) = setup(0.5, Some(false));
        let mut controller = VolumeKeyController::new(audio.clone(), StepPolicy::default());

        let result = controller.handle(MediaKey::SoundUp, Granularity::Coarse);

        assert_eq!(result, MediaKeyHandlingResult::Consumed { did_change: true });
        assert_eq!(audio.volume_of(device), Some(0.5625));
        assert_eq!(controller.last_volume(device), Some(0.5625));
    }

    #[test]
    fn test_step_at_ceiling_consumes_without_change() {
        let (audio, _) = setup(1.0, Some(false));
        let mut controller = VolumeKeyController::new(audio.clone(), StepPolicy::default());

        let result = controller.handle(MediaKey::SoundUp, Granularity::Coarse);

        assert_eq!(result, MediaKeyHandlingResult::Consumed { did_change: false });
        assert_eq!(audio.write_count(), 0);
    }

    #[test]
    fn test_rejected_write_passes_through() {
        let (audio, device) = setup(0.5, Some(false));
        audio.set_write_failure(true);
        let mut controller = VolumeKeyController::new(audio.clone(), StepPolicy::default());

        let result = controller.handle(MediaKey::SoundDown, Granularity::Coarse);

        assert_eq!(result, MediaKeyHandlingResult::PassThrough);
        assert_eq!(audio.volume_of(device), Some(0.5));
    }

    #[test]
    fn test_mute_unmute_restores_after_volume_hit_zero() {
        let (audio, device) = setup(0.6, Some(false));
        let mut controller = VolumeKeyController::new(audio.clone(), StepPolicy::default());

        controller.handle(MediaKey::Mute, Granularity::Coarse);
        assert_eq!(audio.mute_of(device), Some(true));

        // Something else dropped the volume to zero while muted
        audio.set_volume_directly(device, 0.0);

        let result = controller.handle(MediaKey::Mute, Granularity::Coarse);
        assert_eq!(result, MediaKeyHandlingResult::Consumed { did_change: true });
        assert_eq!(audio.mute_of(device), Some(false));
        assert_eq!(audio.volume_of(device), Some(0.6));
    }
}
