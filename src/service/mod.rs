pub mod daemon;
pub mod signals;

pub use daemon::HudService;
pub use signals::{SignalHandler, SignalType};
