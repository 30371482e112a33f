use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::device::{DeviceBindings, DeviceId};
use crate::events::{EventSender, HudEvent};
use crate::system::{
    AudioHardware, ListenerCallback, ListenerToken, PropertyAddress, PropertySelector,
};

/// Tracks the default output device and keeps property listeners bound to it.
///
/// The system-scope listener lives from `start` to `stop`. Per-device listeners
/// (volume, mute, stream configuration, liveness) are dropped and re-registered
/// every time the bindings are re-resolved.
pub struct DeviceChangeWatcher<A: AudioHardware> {
    audio_system: A,
    events: EventSender,
    watch_liveness: bool,
    system_listener: Option<ListenerToken>,
    device_listeners: Vec<ListenerToken>,
    bindings: Option<DeviceBindings>,
}

impl<A: AudioHardware> DeviceChangeWatcher<A> {
    pub fn new(audio_system: A, events: EventSender, watch_liveness: bool) -> Self {
        Self {
            audio_system,
            events,
            watch_liveness,
            system_listener: None,
            device_listeners: Vec::new(),
            bindings: None,
        }
    }

    pub fn start(&mut self) -> Result<()> {
        if self.system_listener.is_some() {
            return Ok(());
        }

        info!("Registering default output device listener");
        let address = PropertyAddress::system(PropertySelector::DefaultOutputDevice);
        let token = self
            .audio_system
            .add_listener(address, self.forward(HudEvent::DefaultDeviceChanged))
            .context("Failed to register default output device listener")?;
        self.system_listener = Some(token);

        self.rebind();
        Ok(())
    }

    pub fn stop(&mut self) {
        self.unsubscribe_device();

        if let Some(token) = self.system_listener.take() {
            if let Err(e) = self.audio_system.remove_listener(token) {
                warn!("Failed to remove default output device listener: {}", e);
            }
            info!("Default output device listener removed");
        }

        self.bindings = None;
    }

    pub fn is_running(&self) -> bool {
        self.system_listener.is_some()
    }

    /// Drop the current device's listeners, resolve the default output device
    /// again and subscribe to it
    pub fn rebind(&mut self) -> Option<DeviceBindings> {
        self.unsubscribe_device();

        self.bindings = self
            .audio_system
            .default_output_device()
            .map(|device| self.audio_system.resolve_bindings(device));

        match self.bindings {
            Some(bindings) => {
                info!("Bound to {}", bindings);
                self.subscribe_device(bindings);
            }
            None => warn!("No default output device to bind to"),
        }

        self.bindings
    }

    /// Stream-configuration or liveness change. Returns whether the bindings
    /// were refreshed; changes on devices other than the current one are ignored.
    pub fn handle_reconfigured(&mut self, device: DeviceId) -> bool {
        if self.current_device() != Some(device) {
            debug!("Ignoring reconfiguration of untracked device {}", device);
            return false;
        }

        debug!("Device {} reconfigured, re-resolving controls", device);
        self.rebind();
        true
    }

    pub fn bindings(&self) -> Option<DeviceBindings> {
        self.bindings
    }

    pub fn current_device(&self) -> Option<DeviceId> {
        self.bindings.map(|bindings| bindings.device)
    }

    pub fn audio_system(&self) -> &A {
        &self.audio_system
    }

    /// Number of per-device listeners currently registered
    pub fn device_listener_count(&self) -> usize {
        self.device_listeners.len()
    }

    fn forward(&self, event: HudEvent) -> ListenerCallback {
        let events = self.events.clone();
        Arc::new(move || {
            let _ = events.send(event);
        })
    }

    fn subscribe_device(&mut self, bindings: DeviceBindings) {
        let device = bindings.device;
        let mut selectors = Vec::with_capacity(4);

        if let Some(volume) = bindings.volume {
            selectors.push((
                PropertySelector::Volume(volume.element),
                HudEvent::PropertyChanged(device),
            ));
        }
        if bindings.mute.is_some() {
            selectors.push((PropertySelector::Mute, HudEvent::PropertyChanged(device)));
        }
        selectors.push((
            PropertySelector::StreamConfiguration,
            HudEvent::DeviceReconfigured(device),
        ));
        if self.watch_liveness {
            selectors.push((
                PropertySelector::DeviceIsAlive,
                HudEvent::DeviceReconfigured(device),
            ));
        }

        for (selector, event) in selectors {
            let address = PropertyAddress::device(device, selector);
            match self.audio_system.add_listener(address, self.forward(event)) {
                Ok(token) => self.device_listeners.push(token),
                Err(e) => warn!("Failed to register listener for {}: {}", address, e),
            }
        }

        debug!(
            "Registered {} listeners on device {}",
            self.device_listeners.len(),
            device
        );
    }

    fn unsubscribe_device(&mut self) {
        for token in self.device_listeners.drain(..) {
            if let Err(e) = self.audio_system.remove_listener(token) {
                warn!("Failed to remove device listener {}: {}", token.id(), e);
            }
        }
    }
}

impl<A: AudioHardware> Drop for DeviceChangeWatcher<A> {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::VolumeControl;
    use crate::events::event_channel;
    use crate::system::MockAudioHardware;

    #[test]
    fn test_start_binds_default_device() {
        let audio = MockAudioHardware::new();
        let device = audio.add_device(10, Some(VolumeControl::main()), 0.3, Some(false));
        audio.set_default_output(Some(device));
        let (events, _rx) = event_channel();
        let mut watcher = DeviceChangeWatcher::new(audio.clone(), events, true);

        watcher.start().unwrap();

        assert_eq!(watcher.current_device(), Some(device));
        // volume, mute, stream configuration, liveness
        assert_eq!(watcher.device_listener_count(), 4);
        assert_eq!(audio.listener_count(), 5);
    }

    #[test]
    fn test_liveness_watching_can_be_disabled() {
        let audio = MockAudioHardware::new();
        let device = audio.add_device(10, Some(VolumeControl::main()), 0.3, None);
        audio.set_default_output(Some(device));
        let (events, _rx) = event_channel();
        let mut watcher = DeviceChangeWatcher::new(audio, events, false);

        watcher.start().unwrap();

        // volume, stream configuration
        assert_eq!(watcher.device_listener_count(), 2);
    }

    #[test]
    fn test_rebind_moves_listeners_to_new_device() {
        let audio = MockAudioHardware::new();
        let first = audio.add_device(10, Some(VolumeControl::main()), 0.3, Some(false));
        let second = audio.add_device(11, Some(VolumeControl::channel(1)), 0.8, None);
        audio.set_default_output(Some(first));
        let (events, mut rx) = event_channel();
        let mut watcher = DeviceChangeWatcher::new(audio.clone(), events, true);
        watcher.start().unwrap();

        audio.set_default_output(Some(second));
        assert_eq!(rx.try_recv().ok(), Some(HudEvent::DefaultDeviceChanged));

        watcher.rebind();
        assert_eq!(watcher.current_device(), Some(second));
        assert_eq!(audio.device_listener_count(first), 0);
        assert_eq!(audio.device_listener_count(second), 3);
    }

    #[test]
    fn test_reconfiguration_of_other_device_is_ignored() {
        let audio = MockAudioHardware::new();
        let first = audio.add_device(10, Some(VolumeControl::main()), 0.3, Some(false));
        let other = audio.add_device(12, Some(VolumeControl::main()), 0.3, Some(false));
        audio.set_default_output(Some(first));
        let (events, _rx) = event_channel();
        let mut watcher = DeviceChangeWatcher::new(audio, events, true);
        watcher.start().unwrap();

        assert!(!watcher.handle_reconfigured(other));
        assert!(watcher.handle_reconfigured(first));
    }

    #[test]
    fn test_stop_removes_every_listener() {
        let audio = MockAudioHardware::new();
        let device = audio.add_device(10, Some(VolumeControl::main()), 0.3, Some(false));
        audio.set_default_output(Some(device));
        let (events, _rx) = event_channel();
        let mut watcher = DeviceChangeWatcher::new(audio.clone(), events, true);
        watcher.start().unwrap();

        watcher.stop();

        assert!(!watcher.is_running());
        assert_eq!(audio.listener_count(), 0);
        assert!(watcher.bindings().is_none());
    }
}
