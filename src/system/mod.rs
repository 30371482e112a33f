pub mod adapters;
pub mod traits;

#[cfg(target_os = "macos")]
pub mod core_audio;
#[cfg(target_os = "macos")]
pub mod event_tap;
#[cfg(target_os = "macos")]
pub mod permissions;

// Mock implementations for testing
#[cfg(any(test, feature = "test-mocks"))]
pub mod mocks;

pub use adapters::*;
pub use traits::*;

#[cfg(target_os = "macos")]
pub use core_audio::CoreAudioHardware;
#[cfg(target_os = "macos")]
pub use event_tap::CGEventTapBackend;
#[cfg(target_os = "macos")]
pub use permissions::AccessibilityPermissions;

#[cfg(any(test, feature = "test-mocks"))]
pub use mocks::*;
