use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

// MARK: - MediaSink trait

/// Interface to the media-rendering element.
///
/// `play`/`pause` are fire-and-forget: the sink gives no completion
/// guarantee, and failures are its own to log.
#[async_trait]
pub trait MediaSink: Send + Sync {
    /// Resume media playback.
    async fn play(&self);

    /// Pause media playback.
    async fn pause(&self);
}

// MARK: - PlaceholderSink

/// Sink that only logs. Stands in until a real pipeline is wired up.
#[derive(Default)]
pub struct PlaceholderSink;

#[async_trait]
impl MediaSink for PlaceholderSink {
    async fn play(&self) {
        debug!("media sink: play");
    }

    async fn pause(&self) {
        debug!("media sink: pause");
    }
}

// MARK: - PlaybackSurface

/// Handle to the single media-rendering sink.
///
/// Created once at startup and mutated only by the playback guard's
/// resume/suspend operations. Starts out playing.
pub struct PlaybackSurface {
    sink: Arc<dyn MediaSink>,
    playing: bool,
}

impl PlaybackSurface {
    pub fn new(sink: Arc<dyn MediaSink>) -> Self {
        Self {
            sink,
            playing: true,
        }
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    /// Resume playback. No-op (and no `play()` call) when already playing.
    pub async fn resume(&mut self) {
        if !self.playing {
            self.sink.play().await;
            self.playing = true;
        }
    }

    /// Suspend playback. No-op (and no `pause()` call) when already paused.
    pub async fn suspend(&mut self) {
        if self.playing {
            self.sink.pause().await;
            self.playing = false;
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;

    use super::MediaSink;

    /// Counts play/pause calls so tests can assert idempotence.
    #[derive(Default)]
    pub(crate) struct RecordingSink {
        pub(crate) plays: AtomicUsize,
        pub(crate) pauses: AtomicUsize,
    }

    impl RecordingSink {
        pub(crate) fn pair() -> (Arc<Self>, Arc<dyn MediaSink>) {
            let sink = Arc::new(Self::default());
            (sink.clone(), sink.clone() as Arc<dyn MediaSink>)
        }

        pub(crate) fn play_count(&self) -> usize {
            self.plays.load(Ordering::SeqCst)
        }

        pub(crate) fn pause_count(&self) -> usize {
            self.pauses.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl MediaSink for RecordingSink {
        async fn play(&self) {
            self.plays.fetch_add(1, Ordering::SeqCst);
        }

        async fn pause(&self) {
            self.pauses.fetch_add(1, Ordering::SeqCst);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::RecordingSink;
    use super::*;

    #[tokio::test]
    async fn surface_starts_playing_and_double_suspend_pauses_once() {
        let (counts, sink) = RecordingSink::pair();
        let mut surface = PlaybackSurface::new(sink);
        assert!(surface.is_playing());

        surface.suspend().await;
        surface.suspend().await;
        assert!(!surface.is_playing());
        assert_eq!(counts.pause_count(), 1);

        surface.resume().await;
        surface.resume().await;
        assert!(surface.is_playing());
        assert_eq!(counts.play_count(), 1);
    }
}
