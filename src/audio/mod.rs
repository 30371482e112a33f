pub mod controller;
pub mod device;
pub mod levels;
pub mod listener;
pub mod monitor;
pub mod policy;
pub mod state;
pub mod stream;

pub use controller::{MediaKeyHandlingResult, VolumeKeyController};
pub use device::{DeviceBindings, DeviceId, MuteControl, VolumeControl, VolumeElement};
pub use listener::DeviceChangeWatcher;
pub use monitor::VolumeMonitor;
pub use policy::{
    Granularity, LastVolumeCache, MixerSnapshot, MixerWrite, StepPlan, StepPolicy, VolumeKey,
};
pub use state::{VolumeLevel, VolumeState};
pub use stream::{
    ChangeReason, Debouncer, StateChange, SubscriptionToken, VolumeStateStream,
    sleep_until_deadline,
};
