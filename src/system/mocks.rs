use anyhow::Result;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::audio::{DeviceId, MixerWrite, MuteControl, VolumeControl};
use crate::system::traits::{
    AudioHardware, EventTapBackend, FileSystemInterface, InstalledTap, ListenerCallback,
    ListenerScope, ListenerToken, PermissionChecker, PropertyAddress, PropertySelector, TapEvent,
    TapEventSink, TapInstallFailure, TapVerdict,
};

#[derive(Debug, Clone)]
struct MockDevice {
    volume_control: Option<VolumeControl>,
    has_mute: bool,
    volume: f32,
    muted: bool,
}

/// Mock mixer for testing - devices, default output and listeners under test control.
/// Writes through the trait fire the matching listeners when a value changes,
/// the way the HAL does.
#[derive(Clone)]
pub struct MockAudioHardware {
    devices: Arc<Mutex<HashMap<DeviceId, MockDevice>>>,
    default_output: Arc<Mutex<Option<DeviceId>>>,
    listeners: Arc<Mutex<HashMap<u64, (PropertyAddress, ListenerCallback)>>>,
    next_token: Arc<AtomicU64>,
    writes: Arc<Mutex<Vec<(DeviceId, MixerWrite)>>>,
    should_fail_write: Arc<AtomicBool>,
    should_fail_listener: Arc<AtomicBool>,
}

impl MockAudioHardware {
    pub fn new() -> Self {
        Self {
            devices: Arc::new(Mutex::new(HashMap::new())),
            default_output: Arc::new(Mutex::new(None)),
            listeners: Arc::new(Mutex::new(HashMap::new())),
            next_token: Arc::new(AtomicU64::new(1)),
            writes: Arc::new(Mutex::new(Vec::new())),
            should_fail_write: Arc::new(AtomicBool::new(false)),
            should_fail_listener: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Add a device. `muted: None` models a device without a mute control.
    pub fn add_device(
        &self,
        raw_id: u32,
        volume_control: Option<VolumeControl>,
        volume: f32,
        muted: Option<bool>,
    ) -> DeviceId {
        let device = DeviceId::from_raw(raw_id).expect("mock device ids must be non-zero");
        self.devices.lock().unwrap().insert(
            device,
            MockDevice {
                volume_control,
                has_mute: muted.is_some(),
                volume,
                muted: muted.unwrap_or(false),
            },
        );
        device
    }

    /// Drop a device and fire its liveness listeners
    pub fn remove_device(&self, device: DeviceId) {
        self.devices.lock().unwrap().remove(&device);
        self.fire(PropertyAddress::device(device, PropertySelector::DeviceIsAlive));
    }

    /// Change the default output; fires the system listener when it differs
    pub fn set_default_output(&self, device: Option<DeviceId>) {
        let changed = {
            let mut current = self.default_output.lock().unwrap();
            let changed = *current != device;
            *current = device;
            changed
        };
        if changed {
            self.fire(PropertyAddress::system(PropertySelector::DefaultOutputDevice));
        }
    }

    /// Simulate a volume change made outside the engine (another app, the OS)
    pub fn set_volume_directly(&self, device: DeviceId, volume: f32) {
        let element = {
            let mut devices = self.devices.lock().unwrap();
            let Some(state) = devices.get_mut(&device) else {
                return;
            };
            if state.volume == volume {
                return;
            }
            state.volume = volume;
            state.volume_control.map(|control| control.element)
        };
        if let Some(element) = element {
            self.fire(PropertyAddress::device(device, PropertySelector::Volume(element)));
        }
    }

    pub fn set_mute_directly(&self, device: DeviceId, muted: bool) {
        let changed = {
            let mut devices = self.devices.lock().unwrap();
            match devices.get_mut(&device) {
                Some(state) if state.muted != muted => {
                    state.muted = muted;
                    true
                }
                _ => false,
            }
        };
        if changed {
            self.fire(PropertyAddress::device(device, PropertySelector::Mute));
        }
    }

    /// Fire the stream-configuration listeners of a device
    pub fn reconfigure_device(&self, device: DeviceId) {
        self.fire(PropertyAddress::device(
            device,
            PropertySelector::StreamConfiguration,
        ));
    }

    /// Invoke every callback registered for `address`
    pub fn fire(&self, address: PropertyAddress) {
        let callbacks: Vec<ListenerCallback> = self
            .listeners
            .lock()
            .unwrap()
            .values()
            .filter(|(registered, _)| *registered == address)
            .map(|(_, callback)| Arc::clone(callback))
            .collect();
        for callback in callbacks {
            callback();
        }
    }

    pub fn volume_of(&self, device: DeviceId) -> Option<f32> {
        self.devices.lock().unwrap().get(&device).map(|d| d.volume)
    }

    pub fn mute_of(&self, device: DeviceId) -> Option<bool> {
        self.devices
            .lock()
            .unwrap()
            .get(&device)
            .filter(|d| d.has_mute)
            .map(|d| d.muted)
    }

    /// Accepted writes, in order
    pub fn get_writes(&self) -> Vec<(DeviceId, MixerWrite)> {
        self.writes.lock().unwrap().clone()
    }

    pub fn write_count(&self) -> usize {
        self.writes.lock().unwrap().len()
    }

    pub fn clear_writes(&self) {
        self.writes.lock().unwrap().clear();
    }

    /// Configure the mock to reject every mixer write
    pub fn set_write_failure(&self, should_fail: bool) {
        self.should_fail_write.store(should_fail, Ordering::Relaxed);
    }

    /// Configure the mock to reject listener registration
    pub fn set_listener_failure(&self, should_fail: bool) {
        self.should_fail_listener.store(should_fail, Ordering::Relaxed);
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().unwrap().len()
    }

    /// Listeners registered on `device`, any selector
    pub fn device_listener_count(&self, device: DeviceId) -> usize {
        self.listeners
            .lock()
            .unwrap()
            .values()
            .filter(|(address, _)| address.scope == ListenerScope::Device(device))
            .count()
    }
}

impl AudioHardware for MockAudioHardware {
    fn default_output_device(&self) -> Option<DeviceId> {
        let device = (*self.default_output.lock().unwrap())?;
        self.devices
            .lock()
            .unwrap()
            .contains_key(&device)
            .then_some(device)
    }

    fn resolve_volume_control(&self, device: DeviceId) -> Option<VolumeControl> {
        self.devices
            .lock()
            .unwrap()
            .get(&device)
            .and_then(|d| d.volume_control)
    }

    fn resolve_mute_control(&self, device: DeviceId) -> Option<MuteControl> {
        self.devices
            .lock()
            .unwrap()
            .get(&device)
            .filter(|d| d.has_mute)
            .map(|_| MuteControl)
    }

    fn get_volume(&self, device: DeviceId, control: VolumeControl) -> Option<f32> {
        self.devices
            .lock()
            .unwrap()
            .get(&device)
            .filter(|d| d.volume_control == Some(control))
            .map(|d| d.volume)
    }

    fn set_volume(&self, device: DeviceId, control: VolumeControl, volume: f32) -> bool {
        if self.should_fail_write.load(Ordering::Relaxed) {
            return false;
        }

        let volume = volume.clamp(0.0, 1.0);
        let changed = {
            let mut devices = self.devices.lock().unwrap();
            let Some(state) = devices.get_mut(&device) else {
                return false;
            };
            if state.volume_control != Some(control) {
                return false;
            }
            let changed = state.volume != volume;
            state.volume = volume;
            changed
        };

        self.writes
            .lock()
            .unwrap()
            .push((device, MixerWrite::SetVolume(volume)));
        if changed {
            self.fire(PropertyAddress::device(
                device,
                PropertySelector::Volume(control.element),
            ));
        }
        true
    }

    fn get_mute(&self, device: DeviceId, _control: MuteControl) -> Option<bool> {
        self.mute_of(device)
    }

    fn set_mute(&self, device: DeviceId, _control: MuteControl, muted: bool) -> bool {
        if self.should_fail_write.load(Ordering::Relaxed) {
            return false;
        }

        let changed = {
            let mut devices = self.devices.lock().unwrap();
            let Some(state) = devices.get_mut(&device).filter(|d| d.has_mute) else {
                return false;
            };
            let changed = state.muted != muted;
            state.muted = muted;
            changed
        };

        self.writes
            .lock()
            .unwrap()
            .push((device, MixerWrite::SetMute(muted)));
        if changed {
            self.fire(PropertyAddress::device(device, PropertySelector::Mute));
        }
        true
    }

    fn add_listener(
        &self,
        address: PropertyAddress,
        callback: ListenerCallback,
    ) -> Result<ListenerToken> {
        if self.should_fail_listener.load(Ordering::Relaxed) {
            return Err(anyhow::anyhow!("Mock listener registration failure"));
        }

        let id = self.next_token.fetch_add(1, Ordering::Relaxed);
        self.listeners.lock().unwrap().insert(id, (address, callback));
        Ok(ListenerToken(id))
    }

    fn remove_listener(&self, token: ListenerToken) -> Result<()> {
        self.listeners
            .lock()
            .unwrap()
            .remove(&token.id())
            .map(|_| ())
            .ok_or_else(|| anyhow::anyhow!("Unknown listener token {}", token.id()))
    }
}

impl Default for MockAudioHardware {
    fn default() -> Self {
        Self::new()
    }
}

type SinkSlot = Arc<Mutex<Option<Box<dyn TapEventSink>>>>;

/// Mock event tap - holds the installed sink so tests can push events through it
#[derive(Clone)]
pub struct MockEventTap {
    installed: SinkSlot,
    install_calls: Arc<AtomicUsize>,
    should_fail_install: Arc<AtomicBool>,
    reenable_count: Arc<AtomicUsize>,
}

impl MockEventTap {
    pub fn new() -> Self {
        Self {
            installed: Arc::new(Mutex::new(None)),
            install_calls: Arc::new(AtomicUsize::new(0)),
            should_fail_install: Arc::new(AtomicBool::new(false)),
            reenable_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Deliver an event to the installed sink; `None` when no tap is installed
    pub fn send(&self, event: TapEvent) -> Option<TapVerdict> {
        let mut installed = self.installed.lock().unwrap();
        let sink = installed.as_mut()?;
        let verdict = sink.on_event(event);
        if verdict == TapVerdict::Reenable {
            self.reenable_count.fetch_add(1, Ordering::Relaxed);
        }
        Some(verdict)
    }

    pub fn is_installed(&self) -> bool {
        self.installed.lock().unwrap().is_some()
    }

    /// Successful installs so far
    pub fn install_count(&self) -> usize {
        self.install_calls.load(Ordering::Relaxed)
    }

    pub fn reenable_count(&self) -> usize {
        self.reenable_count.load(Ordering::Relaxed)
    }

    pub fn set_install_failure(&self, should_fail: bool) {
        self.should_fail_install.store(should_fail, Ordering::Relaxed);
    }
}

impl EventTapBackend for MockEventTap {
    fn install(
        &self,
        sink: Box<dyn TapEventSink>,
    ) -> std::result::Result<Box<dyn InstalledTap>, TapInstallFailure> {
        if self.should_fail_install.load(Ordering::Relaxed) {
            return Err(TapInstallFailure {
                sink: Some(sink),
                reason: "Mock tap install failure".to_string(),
            });
        }

        *self.installed.lock().unwrap() = Some(sink);
        self.install_calls.fetch_add(1, Ordering::Relaxed);
        Ok(Box::new(MockInstalledTap {
            slot: Arc::clone(&self.installed),
        }))
    }
}

impl Default for MockEventTap {
    fn default() -> Self {
        Self::new()
    }
}

struct MockInstalledTap {
    slot: SinkSlot,
}

impl InstalledTap for MockInstalledTap {
    fn remove(self: Box<Self>) -> Option<Box<dyn TapEventSink>> {
        self.slot.lock().unwrap().take()
    }
}

/// Mock accessibility permission
#[derive(Clone)]
pub struct MockPermissions {
    trusted: Arc<AtomicBool>,
    checks: Arc<AtomicUsize>,
    grant_after_checks: Arc<Mutex<Option<usize>>>,
    request_calls: Arc<AtomicUsize>,
}

impl MockPermissions {
    pub fn new(trusted: bool) -> Self {
        Self {
            trusted: Arc::new(AtomicBool::new(trusted)),
            checks: Arc::new(AtomicUsize::new(0)),
            grant_after_checks: Arc::new(Mutex::new(None)),
            request_calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn granted() -> Self {
        Self::new(true)
    }

    pub fn denied() -> Self {
        Self::new(false)
    }

    pub fn set_trusted(&self, trusted: bool) {
        self.trusted.store(trusted, Ordering::Relaxed);
    }

    /// Become trusted on the `checks`-th call to `is_trusted`
    pub fn grant_after(&self, checks: usize) {
        *self.grant_after_checks.lock().unwrap() = Some(checks);
    }

    pub fn check_count(&self) -> usize {
        self.checks.load(Ordering::Relaxed)
    }

    pub fn request_count(&self) -> usize {
        self.request_calls.load(Ordering::Relaxed)
    }
}

impl PermissionChecker for MockPermissions {
    fn is_trusted(&self) -> bool {
        let checks = self.checks.fetch_add(1, Ordering::Relaxed) + 1;
        if let Some(threshold) = *self.grant_after_checks.lock().unwrap() {
            if checks >= threshold {
                self.trusted.store(true, Ordering::Relaxed);
            }
        }
        self.trusted.load(Ordering::Relaxed)
    }

    fn request(&self) -> Result<()> {
        self.request_calls.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

/// Mock file system for testing - provides controllable file operations
#[derive(Clone)]
pub struct MockFileSystem {
    pub files: Arc<Mutex<HashMap<PathBuf, String>>>,
    pub read_calls: Arc<Mutex<Vec<PathBuf>>>,
    pub write_calls: Arc<Mutex<Vec<(PathBuf, String)>>>,
    pub directory_creation_calls: Arc<Mutex<Vec<PathBuf>>>,
    pub should_fail_read: Arc<Mutex<bool>>,
    pub should_fail_write: Arc<Mutex<bool>>,
    pub should_fail_create_dir: Arc<Mutex<bool>>,
}

impl MockFileSystem {
    pub fn new() -> Self {
        Self {
            files: Arc::new(Mutex::new(HashMap::new())),
            read_calls: Arc::new(Mutex::new(Vec::new())),
            write_calls: Arc::new(Mutex::new(Vec::new())),
            directory_creation_calls: Arc::new(Mutex::new(Vec::new())),
            should_fail_read: Arc::new(Mutex::new(false)),
            should_fail_write: Arc::new(Mutex::new(false)),
            should_fail_create_dir: Arc::new(Mutex::new(false)),
        }
    }

    pub fn add_file<P: AsRef<Path>>(&self, path: P, content: String) {
        self.files
            .lock()
            .unwrap()
            .insert(path.as_ref().to_path_buf(), content);
    }

    pub fn get_read_calls(&self) -> Vec<PathBuf> {
        self.read_calls.lock().unwrap().clone()
    }

    pub fn get_write_calls(&self) -> Vec<(PathBuf, String)> {
        self.write_calls.lock().unwrap().clone()
    }

    pub fn get_directory_creation_calls(&self) -> Vec<PathBuf> {
        self.directory_creation_calls.lock().unwrap().clone()
    }

    pub fn set_read_failure(&self, should_fail: bool) {
        *self.should_fail_read.lock().unwrap() = should_fail;
    }

    pub fn set_write_failure(&self, should_fail: bool) {
        *self.should_fail_write.lock().unwrap() = should_fail;
    }

    pub fn set_create_dir_failure(&self, should_fail: bool) {
        *self.should_fail_create_dir.lock().unwrap() = should_fail;
    }

    pub fn file_exists<P: AsRef<Path>>(&self, path: P) -> bool {
        self.files.lock().unwrap().contains_key(path.as_ref())
    }
}

impl FileSystemInterface for MockFileSystem {
    fn read_config_file(&self, path: &Path) -> Result<String> {
        self.read_calls.lock().unwrap().push(path.to_path_buf());

        if *self.should_fail_read.lock().unwrap() {
            return Err(anyhow::anyhow!("Mock read failure"));
        }

        self.files
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("File not found: {}", path.display()))
    }

    fn write_config_file(&self, path: &Path, content: &str) -> Result<()> {
        self.write_calls
            .lock()
            .unwrap()
            .push((path.to_path_buf(), content.to_string()));

        if *self.should_fail_write.lock().unwrap() {
            return Err(anyhow::anyhow!("Mock write failure"));
        }

        self.files
            .lock()
            .unwrap()
            .insert(path.to_path_buf(), content.to_string());
        Ok(())
    }

    fn config_file_exists(&self, path: &Path) -> bool {
        self.files.lock().unwrap().contains_key(path)
    }

    fn create_config_dir(&self, path: &Path) -> Result<()> {
        self.directory_creation_calls
            .lock()
            .unwrap()
            .push(path.to_path_buf());

        if *self.should_fail_create_dir.lock().unwrap() {
            return Err(anyhow::anyhow!("Mock create directory failure"));
        }

        Ok(())
    }

    fn get_config_modified_time(&self, path: &Path) -> Result<std::time::SystemTime> {
        if !self.config_file_exists(path) {
            return Err(anyhow::anyhow!("File not found: {}", path.display()));
        }
        // Fixed time keeps modification checks deterministic
        Ok(std::time::SystemTime::UNIX_EPOCH + std::time::Duration::from_secs(1000))
    }
}

impl Default for MockFileSystem {
    fn default() -> Self {
        Self::new()
    }
}
