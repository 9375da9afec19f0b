mod debounce;
mod events;
mod session;

pub use debounce::{Viewport, ViewportDebouncer};
pub use events::{LogLine, SessionCommand, SessionEvent, SessionPhase};
pub use session::{Session, SessionOptions};
