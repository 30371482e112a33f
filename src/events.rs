use std::fmt;

use tokio::sync::mpsc;

use crate::audio::DeviceId;
use crate::keys::MediaKey;

/// Everything the engine loop reacts to. HAL notification callbacks, the tap
/// thread and the permission poller only ever send these; they never touch
/// engine state directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HudEvent {
    DefaultDeviceChanged,
    /// Stream layout or liveness of a device changed
    DeviceReconfigured(DeviceId),
    /// Volume or mute of a device changed
    PropertyChanged(DeviceId),
    /// A volume key was consumed without moving the mixer
    KeyFeedback(MediaKey),
    PermissionGranted,
}

impl fmt::Display for HudEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HudEvent::DefaultDeviceChanged => write!(f, "default output changed"),
            HudEvent::DeviceReconfigured(device) => write!(f, "device {} reconfigured", device),
            HudEvent::PropertyChanged(device) => write!(f, "property changed on {}", device),
            HudEvent::KeyFeedback(key) => write!(f, "key feedback ({})", key),
            HudEvent::PermissionGranted => write!(f, "permission granted"),
        }
    }
}

pub type EventSender = mpsc::UnboundedSender<HudEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<HudEvent>;

pub fn event_channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}
