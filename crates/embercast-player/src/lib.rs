pub mod guard;
pub mod sink;

pub use guard::{GuardState, PlaybackGuard};
pub use sink::{MediaSink, PlaceholderSink, PlaybackSurface};
