use std::fmt;

use super::device::DeviceId;

/// Volumes closer than this are the same state
pub const STATE_EPSILON: f32 = 0.0001;

/// Volume deltas at or below this are not worth re-publishing
pub const CHANGE_EPSILON: f32 = 0.001;

/// Snapshot of the default output device's volume and mute state
#[derive(Debug, Clone, Copy, Default)]
pub struct VolumeState {
    volume: f32,
    is_muted: bool,
    device: Option<DeviceId>,
}

impl VolumeState {
    /// Build a state, clamping the raw volume into `[0, 1]`
    pub fn new(volume: f32, is_muted: bool, device: Option<DeviceId>) -> Self {
        Self {
            volume: clamp_volume(volume),
            is_muted,
            device,
        }
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn is_muted(&self) -> bool {
        self.is_muted
    }

    pub fn device(&self) -> Option<DeviceId> {
        self.device
    }

    /// True when volume moved by more than [`CHANGE_EPSILON`] or mute flipped
    pub fn has_volume_or_mute_change(&self, previous: &VolumeState) -> bool {
        self.is_muted != previous.is_muted || (self.volume - previous.volume).abs() > CHANGE_EPSILON
    }

    pub fn has_device_change(&self, previous: &VolumeState) -> bool {
        self.device != previous.device
    }

    pub fn level(&self) -> VolumeLevel {
        VolumeLevel::classify(self.volume, self.is_muted)
    }
}

impl PartialEq for VolumeState {
    fn eq(&self, other: &Self) -> bool {
        (self.volume - other.volume).abs() < STATE_EPSILON
            && self.is_muted == other.is_muted
            && self.device == other.device
    }
}

impl fmt::Display for VolumeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let device = match self.device {
            Some(device) => device.to_string(),
            None => "none".to_string(),
        };
        write!(
            f,
            "{:.1}%{} on {}",
            self.volume * 100.0,
            if self.is_muted { " (muted)" } else { "" },
            device
        )
    }
}

/// Clamp a raw HAL reading into `[0, 1]`; NaN reads as silence
pub fn clamp_volume(volume: f32) -> f32 {
    if volume.is_nan() {
        0.0
    } else {
        volume.clamp(0.0, 1.0)
    }
}

/// Coarse loudness bucket, the same split the HUD icon uses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolumeLevel {
    Muted,
    Silent,
    Low,
    Medium,
    High,
}

impl VolumeLevel {
    pub fn classify(volume: f32, is_muted: bool) -> Self {
        if is_muted {
            VolumeLevel::Muted
        } else if volume == 0.0 {
            VolumeLevel::Silent
        } else if volume < 0.33 {
            VolumeLevel::Low
        } else if volume < 0.66 {
            VolumeLevel::Medium
        } else {
            VolumeLevel::High
        }
    }
}

impl fmt::Display for VolumeLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VolumeLevel::Muted => write!(f, "muted"),
            VolumeLevel::Silent => write!(f, "silent"),
            VolumeLevel::Low => write!(f, "low"),
            VolumeLevel::Medium => write!(f, "medium"),
            VolumeLevel::High => write!(f, "high"),
        }
    }
}
