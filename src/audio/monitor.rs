use anyhow::Result;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

use super::device::DeviceBindings;
use super::listener::DeviceChangeWatcher;
use super::state::VolumeState;
use super::stream::{Debouncer, StateChange, SubscriptionToken, VolumeStateStream};
use crate::config::MonitorConfig;
use crate::events::{EventSender, HudEvent};
use crate::system::AudioHardware;

/// Turns raw mixer notifications into the published volume state stream.
/// Owned by the engine loop, which feeds it every [`HudEvent`].
pub struct VolumeMonitor<A: AudioHardware> {
    watcher: DeviceChangeWatcher<A>,
    stream: VolumeStateStream,
    debouncer: Debouncer,
}

impl<A: AudioHardware> VolumeMonitor<A> {
    pub fn new(audio_system: A, events: EventSender, config: &MonitorConfig) -> Self {
        Self {
            watcher: DeviceChangeWatcher::new(audio_system, events, config.watch_device_liveness),
            stream: VolumeStateStream::default(),
            debouncer: Debouncer::new(config.debounce_window()),
        }
    }

    pub fn start(&mut self) -> Result<()> {
        info!("Starting volume monitor");
        self.watcher.start()?;

        let initial = self.read_state().unwrap_or_default();
        self.stream.reset(initial);
        info!("Initial volume state: {} ({})", initial, initial.level());
        Ok(())
    }

    /// Pending debounce is cancelled before listeners are released
    pub fn stop(&mut self) {
        info!("Stopping volume monitor");
        self.debouncer.cancel();
        self.watcher.stop();
    }

    pub fn handle_event(&mut self, event: HudEvent) {
        match event {
            HudEvent::DefaultDeviceChanged => {
                self.watcher.rebind();
                self.refresh();
            }
            HudEvent::DeviceReconfigured(device) => {
                if self.watcher.handle_reconfigured(device) {
                    self.refresh();
                }
            }
            HudEvent::PropertyChanged(device) => {
                if self.watcher.current_device() == Some(device) {
                    self.debouncer.schedule();
                } else {
                    debug!("Ignoring property change on untracked device {}", device);
                }
            }
            HudEvent::KeyFeedback(_) => {
                // A pending debounce means `current` lags the mixer
                if self.debouncer.is_pending() {
                    self.refresh();
                }
                self.stream.emit_feedback();
            }
            HudEvent::PermissionGranted => {}
        }
    }

    /// Read the mixer now and publish if it moved; cancels any pending debounce.
    /// Without a bound device the last published state is kept.
    pub fn refresh(&mut self) -> bool {
        self.debouncer.cancel();
        match self.read_state() {
            Some(state) => self.stream.publish(state),
            None => {
                debug!("No output device bound, keeping {}", self.stream.current());
                false
            }
        }
    }

    /// Called when the debounce deadline passes
    pub fn on_debounce_elapsed(&mut self) -> bool {
        if self.debouncer.fire() {
            self.refresh()
        } else {
            false
        }
    }

    pub fn debounce_deadline(&self) -> Option<Instant> {
        self.debouncer.deadline()
    }

    pub fn set_debounce_window(&mut self, window: Duration) {
        self.debouncer.set_window(window);
    }

    pub fn current(&self) -> VolumeState {
        self.stream.current()
    }

    pub fn bindings(&self) -> Option<DeviceBindings> {
        self.watcher.bindings()
    }

    pub fn subscribe<F>(&mut self, callback: F) -> SubscriptionToken
    where
        F: Fn(&StateChange) + Send + Sync + 'static,
    {
        self.stream.subscribe(callback)
    }

    pub fn unsubscribe(&mut self, token: SubscriptionToken) -> bool {
        self.stream.unsubscribe(token)
    }

    fn read_state(&self) -> Option<VolumeState> {
        let bindings = self.watcher.bindings()?;

        let audio = self.watcher.audio_system();
        let volume = bindings
            .volume
            .and_then(|control| audio.get_volume(bindings.device, control))
            .unwrap_or(0.0);
        let is_muted = bindings
            .mute
            .and_then(|control| audio.get_mute(bindings.device, control))
            .unwrap_or(false);

        Some(VolumeState::new(volume, is_muted, Some(bindings.device)))
    }
}
