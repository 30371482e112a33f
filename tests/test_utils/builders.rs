//! Test utility builders for mock mixers, key events and configuration
//!
//! Individual methods may not be used by all tests, so dead code warnings are suppressed.

#![allow(dead_code)]

use volume_hud_engine::audio::{DeviceId, VolumeControl};
use volume_hud_engine::config::Config;
use volume_hud_engine::keys::ModifierFlags;
use volume_hud_engine::system::{MockAudioHardware, TapEvent};

/// Builder for an output device on a [`MockAudioHardware`]
pub struct DeviceBuilder {
    raw_id: u32,
    volume_control: Option<VolumeControl>,
    volume: f32,
    muted: Option<bool>,
    make_default: bool,
}

impl DeviceBuilder {
    pub fn new(raw_id: u32) -> Self {
        Self {
            raw_id,
            volume_control: Some(VolumeControl::main()),
            volume: 0.5,
            muted: Some(false),
            make_default: true,
        }
    }

    pub fn volume(mut self, volume: f32) -> Self {
        self.volume = volume;
        self
    }

    pub fn muted(mut self) -> Self {
        self.muted = Some(true);
        self
    }

    /// Device without a settable mute control
    pub fn without_mute(mut self) -> Self {
        self.muted = None;
        self
    }

    pub fn without_volume(mut self) -> Self {
        self.volume_control = None;
        self
    }

    /// Volume only on channel 1, like many USB interfaces
    pub fn channel_volume(mut self) -> Self {
        self.volume_control = Some(VolumeControl::channel(1));
        self
    }

    pub fn not_default(mut self) -> Self {
        self.make_default = false;
        self
    }

    pub fn build(self, audio: &MockAudioHardware) -> DeviceId {
        let device = audio.add_device(self.raw_id, self.volume_control, self.volume, self.muted);
        if self.make_default {
            audio.set_default_output(Some(device));
        }
        device
    }
}

/// Builder for raw tap events
pub struct KeyEventBuilder {
    code: i64,
    down: bool,
    repeat: bool,
    flags: u64,
    subtype: i16,
}

impl KeyEventBuilder {
    pub const SOUND_UP: i64 = 0;
    pub const SOUND_DOWN: i64 = 1;
    pub const BRIGHTNESS_UP: i64 = 2;
    pub const MUTE: i64 = 7;

    pub fn new(code: i64) -> Self {
        Self {
            code,
            down: true,
            repeat: false,
            flags: 0,
            subtype: 8,
        }
    }

    pub fn sound_up() -> Self {
        Self::new(Self::SOUND_UP)
    }

    pub fn sound_down() -> Self {
        Self::new(Self::SOUND_DOWN)
    }

    pub fn mute() -> Self {
        Self::new(Self::MUTE)
    }

    pub fn up(mut self) -> Self {
        self.down = false;
        self
    }

    pub fn repeat(mut self) -> Self {
        self.repeat = true;
        self
    }

    /// Shift+Option, the quarter-step modifier combination
    pub fn fine(mut self) -> Self {
        self.flags = ModifierFlags::SHIFT | ModifierFlags::OPTION;
        self
    }

    pub fn subtype(mut self, subtype: i16) -> Self {
        self.subtype = subtype;
        self
    }

    pub fn build(self) -> TapEvent {
        let state: i64 = if self.down { 0x0A } else { 0x0B };
        TapEvent::SystemDefined {
            subtype: self.subtype,
            data1: (self.code << 16) | (state << 8) | i64::from(self.repeat),
            flags: ModifierFlags::from_bits(self.flags),
        }
    }
}

/// Builder for engine configuration
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    pub fn coarse_steps(mut self, steps: u32) -> Self {
        self.config.volume.coarse_steps = steps;
        self
    }

    pub fn fine_steps(mut self, steps: u32) -> Self {
        self.config.volume.fine_steps = steps;
        self
    }

    pub fn unmute_fallback(mut self, fallback: f32) -> Self {
        self.config.volume.unmute_fallback = fallback;
        self
    }

    pub fn debounce_ms(mut self, debounce_ms: u64) -> Self {
        self.config.monitor.debounce_ms = debounce_ms;
        self
    }

    pub fn watch_liveness(mut self, watch: bool) -> Self {
        self.config.monitor.watch_device_liveness = watch;
        self
    }

    pub fn poll(mut self, interval_ms: u64, max_attempts: u32) -> Self {
        self.config.permissions.poll_interval_ms = interval_ms;
        self.config.permissions.poll_max_attempts = max_attempts;
        self
    }

    pub fn prompt_on_start(mut self, prompt: bool) -> Self {
        self.config.permissions.prompt_on_start = prompt;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }

    pub fn to_toml(self) -> String {
        toml::to_string_pretty(&self.config).expect("config serializes")
    }
}
