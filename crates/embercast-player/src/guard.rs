//! Visibility-driven playback guard.
//!
//! Keeps the media surface playing while the receiving surface is visible,
//! and pauses-then-closes after a bounded grace period once visibility is
//! lost. Driven serially by the application's event loop; the idle deadline
//! is the only suspension point and clearing it is synchronous, so a
//! cancelled timer can never be observed firing.

use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info};

use crate::sink::PlaybackSurface;

// MARK: - GuardState

/// ```text
/// PLAYING ──hidden──▶ PAUSED_WAITING ──deadline──▶ CLOSED
///    ▲                     │
///    └──────visible────────┘
/// ```
///
/// Duplicate events are absorbed: a second `hidden` keeps the existing
/// deadline, a second `visible` while playing does nothing, and `CLOSED`
/// is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardState {
    Playing,
    PausedWaiting { deadline: Instant },
    Closed,
}

// MARK: - PlaybackGuard

pub struct PlaybackGuard {
    state: GuardState,
    grace: Duration,
    surface: PlaybackSurface,
}

impl PlaybackGuard {
    pub fn new(surface: PlaybackSurface, grace: Duration) -> Self {
        Self {
            state: GuardState::Playing,
            grace,
            surface,
        }
    }

    pub fn state(&self) -> GuardState {
        self.state
    }

    pub fn is_closed(&self) -> bool {
        matches!(self.state, GuardState::Closed)
    }

    pub fn is_playing(&self) -> bool {
        self.surface.is_playing()
    }

    /// The pending idle deadline, if any. At most one exists at a time.
    pub fn deadline(&self) -> Option<Instant> {
        match self.state {
            GuardState::PausedWaiting { deadline } => Some(deadline),
            _ => None,
        }
    }

    /// Feed one visibility report. Both visibility sources funnel through
    /// here, so overlapping duplicates for the same transition are expected.
    pub async fn on_visibility(&mut self, now_visible: bool) {
        match (self.state, now_visible) {
            (GuardState::Closed, _) => {}
            (GuardState::Playing, true) => {}
            (GuardState::Playing, false) => {
                self.surface.suspend().await;
                let deadline = Instant::now() + self.grace;
                self.state = GuardState::PausedWaiting { deadline };
                debug!("Surface hidden — paused, teardown in {:?}", self.grace);
            }
            (GuardState::PausedWaiting { .. }, true) => {
                self.surface.resume().await;
                self.state = GuardState::Playing;
                debug!("Surface visible again — resumed");
            }
            (GuardState::PausedWaiting { .. }, false) => {
                // Duplicate hidden report; the armed deadline stands.
            }
        }
    }

    /// Called by the host loop when the pending deadline elapses. Returns
    /// `true` exactly once, on the transition into `Closed`; firing with no
    /// pending deadline is a no-op.
    pub fn on_deadline(&mut self) -> bool {
        match self.state {
            GuardState::PausedWaiting { .. } => {
                self.state = GuardState::Closed;
                info!("Visibility grace period elapsed — closing receiver");
                true
            }
            _ => false,
        }
    }
}
