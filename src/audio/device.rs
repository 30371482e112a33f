use std::fmt;

/// Opaque handle of an audio device as reported by the HAL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceId(u32);

impl DeviceId {
    /// Raw value the HAL uses for "no such object"
    pub const UNKNOWN_RAW: u32 = 0;

    /// Wrap a raw HAL object id, rejecting the unknown-object sentinel
    pub fn from_raw(raw: u32) -> Option<Self> {
        if raw == Self::UNKNOWN_RAW {
            None
        } else {
            Some(Self(raw))
        }
    }

    pub fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Which element of the output scope carries the volume scalar
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VolumeElement {
    Main,
    Channel(u32),
}

impl VolumeElement {
    pub fn raw(self) -> u32 {
        match self {
            VolumeElement::Main => 0,
            VolumeElement::Channel(channel) => channel,
        }
    }
}

impl fmt::Display for VolumeElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VolumeElement::Main => write!(f, "main"),
            VolumeElement::Channel(channel) => write!(f, "channel {}", channel),
        }
    }
}

/// Resolved volume property on a device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VolumeControl {
    pub element: VolumeElement,
}

impl VolumeControl {
    pub fn main() -> Self {
        Self {
            element: VolumeElement::Main,
        }
    }

    pub fn channel(channel: u32) -> Self {
        Self {
            element: VolumeElement::Channel(channel),
        }
    }
}

/// Resolved mute property on a device (output scope, main element)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MuteControl;

/// Property handles resolved for one device. Not every device exposes the same
/// control surface, so this is rebuilt whenever routing changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceBindings {
    pub device: DeviceId,
    pub volume: Option<VolumeControl>,
    pub mute: Option<MuteControl>,
}

impl DeviceBindings {
    pub fn new(device: DeviceId) -> Self {
        Self {
            device,
            volume: None,
            mute: None,
        }
    }

    pub fn with_volume(mut self, volume: Option<VolumeControl>) -> Self {
        self.volume = volume;
        self
    }

    pub fn with_mute(mut self, mute: Option<MuteControl>) -> Self {
        self.mute = mute;
        self
    }

    pub fn has_volume_control(&self) -> bool {
        self.volume.is_some()
    }

    pub fn has_mute_control(&self) -> bool {
        self.mute.is_some()
    }
}

impl fmt::Display for DeviceBindings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "device {}: volume [{}], mute [{}]",
            self.device,
            match self.volume {
                Some(control) => control.element.to_string(),
                None => "unsupported".to_string(),
            },
            if self.mute.is_some() {
                "native"
            } else {
                "emulated"
            }
        )
    }
}
