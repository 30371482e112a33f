pub mod audio;
pub mod config;
pub mod error;
pub mod events;
pub mod keys;
pub mod logging;
pub mod service;
pub mod system;

pub use audio::{VolumeKeyController, VolumeMonitor, VolumeState, VolumeStateStream};
pub use config::Config;
pub use error::InterceptorError;
pub use events::HudEvent;
pub use keys::MediaKeyInterceptor;
pub use service::HudService;
