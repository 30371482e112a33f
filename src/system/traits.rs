use anyhow::Result;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use crate::audio::{DeviceBindings, DeviceId, MuteControl, VolumeControl, VolumeElement};
use crate::keys::ModifierFlags;

/// Callback invoked from the HAL notification thread; it must not block
pub type ListenerCallback = Arc<dyn Fn() + Send + Sync>;

/// Object a property listener is attached to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListenerScope {
    System,
    Device(DeviceId),
}

/// Properties the engine listens to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropertySelector {
    DefaultOutputDevice,
    Volume(VolumeElement),
    Mute,
    StreamConfiguration,
    DeviceIsAlive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PropertyAddress {
    pub scope: ListenerScope,
    pub selector: PropertySelector,
}

impl PropertyAddress {
    pub fn system(selector: PropertySelector) -> Self {
        Self {
            scope: ListenerScope::System,
            selector,
        }
    }

    pub fn device(device: DeviceId, selector: PropertySelector) -> Self {
        Self {
            scope: ListenerScope::Device(device),
            selector,
        }
    }
}

impl fmt::Display for PropertyAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.scope {
            ListenerScope::System => write!(f, "system/{:?}", self.selector),
            ListenerScope::Device(device) => write!(f, "{}/{:?}", device, self.selector),
        }
    }
}

/// Handle returned by [`AudioHardware::add_listener`], required to remove it again
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerToken(pub(crate) u64);

impl ListenerToken {
    pub fn id(&self) -> u64 {
        self.0
    }
}

/// Trait for mixer property operations - abstracts the CoreAudio property store
pub trait AudioHardware: Send + Sync {
    /// Current default output device, `None` when the HAL reports none or errors
    fn default_output_device(&self) -> Option<DeviceId>;

    /// Main output element first, channel 1 as fallback
    fn resolve_volume_control(&self, device: DeviceId) -> Option<VolumeControl>;

    fn resolve_mute_control(&self, device: DeviceId) -> Option<MuteControl>;

    fn get_volume(&self, device: DeviceId, control: VolumeControl) -> Option<f32>;

    /// Writes `volume` clamped to `[0, 1]`; returns whether the HAL accepted it
    fn set_volume(&self, device: DeviceId, control: VolumeControl, volume: f32) -> bool;

    fn get_mute(&self, device: DeviceId, control: MuteControl) -> Option<bool>;

    fn set_mute(&self, device: DeviceId, control: MuteControl, muted: bool) -> bool;

    /// Register a property listener. The callback stays registered until the
    /// returned token is passed to [`AudioHardware::remove_listener`].
    fn add_listener(
        &self,
        address: PropertyAddress,
        callback: ListenerCallback,
    ) -> Result<ListenerToken>;

    fn remove_listener(&self, token: ListenerToken) -> Result<()>;

    /// Resolve every control a device exposes
    fn resolve_bindings(&self, device: DeviceId) -> DeviceBindings {
        DeviceBindings::new(device)
            .with_volume(self.resolve_volume_control(device))
            .with_mute(self.resolve_mute_control(device))
    }
}

impl<T: AudioHardware + ?Sized> AudioHardware for Arc<T> {
    fn default_output_device(&self) -> Option<DeviceId> {
        (**self).default_output_device()
    }

    fn resolve_volume_control(&self, device: DeviceId) -> Option<VolumeControl> {
        (**self).resolve_volume_control(device)
    }

    fn resolve_mute_control(&self, device: DeviceId) -> Option<MuteControl> {
        (**self).resolve_mute_control(device)
    }

    fn get_volume(&self, device: DeviceId, control: VolumeControl) -> Option<f32> {
        (**self).get_volume(device, control)
    }

    fn set_volume(&self, device: DeviceId, control: VolumeControl, volume: f32) -> bool {
        (**self).set_volume(device, control, volume)
    }

    fn get_mute(&self, device: DeviceId, control: MuteControl) -> Option<bool> {
        (**self).get_mute(device, control)
    }

    fn set_mute(&self, device: DeviceId, control: MuteControl, muted: bool) -> bool {
        (**self).set_mute(device, control, muted)
    }

    fn add_listener(
        &self,
        address: PropertyAddress,
        callback: ListenerCallback,
    ) -> Result<ListenerToken> {
        (**self).add_listener(address, callback)
    }

    fn remove_listener(&self, token: ListenerToken) -> Result<()> {
        (**self).remove_listener(token)
    }
}

/// Raw event delivered by the low-level key event tap
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TapEvent {
    /// An `NSSystemDefined` event with its subtype and packed payload
    SystemDefined {
        subtype: i16,
        data1: i64,
        flags: ModifierFlags,
    },
    DisabledByTimeout,
    DisabledByUserInput,
    Other,
}

/// What the tap should do with the event it just delivered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TapVerdict {
    PassThrough,
    /// Swallow the event so no other application sees it
    Consume,
    /// The OS disabled the tap; turn it back on
    Reenable,
}

/// Receiver for tap events. Runs on the tap's own thread and must stay non-blocking.
pub trait TapEventSink: Send {
    fn on_event(&mut self, event: TapEvent) -> TapVerdict;
}

/// Failed install hands the sink back so the caller can retry later.
/// `sink` is only `None` if the tap thread died while holding it.
pub struct TapInstallFailure {
    pub sink: Option<Box<dyn TapEventSink>>,
    pub reason: String,
}

impl fmt::Debug for TapInstallFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TapInstallFailure")
            .field("reason", &self.reason)
            .finish()
    }
}

/// Trait for installing the system-wide key event tap
pub trait EventTapBackend: Send + Sync {
    fn install(
        &self,
        sink: Box<dyn TapEventSink>,
    ) -> std::result::Result<Box<dyn InstalledTap>, TapInstallFailure>;
}

/// A running tap. Removing it stops event delivery and returns the sink,
/// or `None` if the tap thread died while holding it.
pub trait InstalledTap: Send {
    fn remove(self: Box<Self>) -> Option<Box<dyn TapEventSink>>;
}

/// Trait for the accessibility / input-monitoring permission the tap needs
pub trait PermissionChecker: Send + Sync {
    fn is_trusted(&self) -> bool;

    /// Ask the OS to prompt the user and open the relevant settings pane
    fn request(&self) -> Result<()>;
}

impl<T: PermissionChecker + ?Sized> PermissionChecker for Arc<T> {
    fn is_trusted(&self) -> bool {
        (**self).is_trusted()
    }

    fn request(&self) -> Result<()> {
        (**self).request()
    }
}

/// Trait for file system operations - abstracts std::fs for testability
pub trait FileSystemInterface {
    /// Read the entire contents of a configuration file
    fn read_config_file(&self, path: &Path) -> Result<String>;

    /// Write configuration content to a file
    fn write_config_file(&self, path: &Path, content: &str) -> Result<()>;

    /// Check if a configuration file exists
    fn config_file_exists(&self, path: &Path) -> bool;

    /// Create the directory structure for config files
    fn create_config_dir(&self, path: &Path) -> Result<()>;

    /// Get the last modified time of a config file (for watching changes)
    fn get_config_modified_time(&self, path: &Path) -> Result<std::time::SystemTime>;
}
