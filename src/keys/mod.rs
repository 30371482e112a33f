pub mod interceptor;
pub mod media_key;

pub use interceptor::{KeyEventSink, MediaKeyInterceptor};
pub use media_key::{KeyPress, MediaKey, ModifierFlags, decode_system_defined};
