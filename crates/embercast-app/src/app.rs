use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use embercast_core::{ReceiverConfig, SenderId, SenderInfo, SystemVolume, VisibilityState};
use embercast_discovery::{detect_local_ip, EmbercastAdvertiser};
use embercast_player::{PlaceholderSink, PlaybackGuard, PlaybackSurface};
use embercast_transport::{BusMessage, CastReceiver, DisconnectReason, ReceiverEvent};
use tokio::time::{sleep_until, Instant};
use tracing::{info, warn};

use crate::hud::{wants_banner, Hud};

/// Namespace of the show/hide banner protocol.
pub const DISPLAY_NAMESPACE: &str = "urn:x-cast:app.embercast.display";

/// Main receiver loop.
///
/// # Flow
/// 1. Load configuration (`EMBERCAST_CONFIG` + `EMBERCAST_*` overrides)
/// 2. Bind the signaling listener via `CastReceiver::start`
/// 3. Advertise over mDNS so senders can auto-discover this receiver
/// 4. Consume lifecycle events, display-bus messages and the guard's idle
///    deadline from one `select!` loop until the guard closes
pub async fn run() -> Result<()> {
    let config = ReceiverConfig::from_env()?;
    info!(
        "Config: status='{}' max_inactivity={:?} visibility_grace={:?}",
        config.status_text,
        config.max_inactivity(),
        config.visibility_grace()
    );

    let (receiver, mut events) = CastReceiver::start(&config).await?;
    let mut display_bus = receiver.message_bus(DISPLAY_NAMESPACE);

    // ── Advertise via mDNS so senders can auto-discover this receiver ──────
    let advertiser = EmbercastAdvertiser::register(
        &config.instance_name,
        receiver.local_addr().port(),
        detect_local_ip(),
        &config.status_text,
    )
    .map_err(|e| warn!("mDNS advertising unavailable: {e}"))
    .ok();

    // Single initialization point for everything the event handlers touch.
    let surface = PlaybackSurface::new(Arc::new(PlaceholderSink));
    let guard = PlaybackGuard::new(surface, config.visibility_grace());
    let mut app = ReceiverApp::new(guard);

    // ── Event loop ─────────────────────────────────────────────────────────
    // Everything guard-relevant arrives on this one task, so delivery is
    // serial and the deadline arm can never race a cancellation.
    loop {
        let idle_at = app.idle_deadline();
        tokio::select! {
            event = events.recv() => {
                match event {
                    Some(event) => app.dispatch(event).await,
                    None => {
                        info!("Event channel closed — shutting down");
                        break;
                    }
                }
            }

            message = display_bus.recv() => {
                match message {
                    Some(message) => app.on_display_message(message),
                    None => break,
                }
            }

            _ = sleep_until(idle_at.unwrap_or_else(far_future)), if idle_at.is_some() => {
                if app.on_idle_deadline() {
                    break;
                }
            }
        }
    }

    // ── Teardown ───────────────────────────────────────────────────────────
    if let Some(advertiser) = advertiser {
        advertiser.unregister();
    }
    receiver.shutdown();
    info!("Receiver torn down.");
    Ok(())
}

fn far_future() -> Instant {
    Instant::now() + Duration::from_secs(86_400)
}

// ── ReceiverApp ───────────────────────────────────────────────────────────────

/// Application context: the playback guard and the HUD banner, plus one
/// handler per session-manager event name. Built once in [`run`]; no
/// ambient globals.
struct ReceiverApp {
    guard: PlaybackGuard,
    hud: Hud,
}

impl ReceiverApp {
    fn new(guard: PlaybackGuard) -> Self {
        Self {
            guard,
            hud: Hud::default(),
        }
    }

    fn idle_deadline(&self) -> Option<Instant> {
        self.guard.deadline()
    }

    async fn dispatch(&mut self, event: ReceiverEvent) {
        match event {
            ReceiverEvent::Ready { addr } => self.on_ready(addr),
            ReceiverEvent::SenderConnected { sender } => self.on_sender_connected(sender),
            ReceiverEvent::SenderDisconnected { sender_id, reason } => {
                self.on_sender_disconnected(sender_id, reason)
            }
            ReceiverEvent::SystemVolumeChanged { volume } => {
                self.on_system_volume_changed(volume)
            }
            ReceiverEvent::VisibilityChanged { state } => {
                self.on_visibility_changed(state).await
            }
        }
    }

    fn on_ready(&mut self, addr: SocketAddr) {
        info!("Cast receiver is ready at {addr}");
    }

    fn on_sender_connected(&mut self, sender: SenderInfo) {
        info!(
            "Sender connected: '{}' from {} (id={})",
            sender.device_name, sender.address, sender.id
        );
    }

    fn on_sender_disconnected(&mut self, sender_id: SenderId, reason: DisconnectReason) {
        info!("Sender disconnected: {sender_id} ({reason})");
    }

    fn on_system_volume_changed(&mut self, volume: SystemVolume) {
        info!(
            "System volume: {:.2} (muted: {})",
            volume.level, volume.muted
        );
    }

    async fn on_visibility_changed(&mut self, state: VisibilityState) {
        info!("Visibility changed: {state}");
        self.guard.on_visibility(state.is_visible()).await;
    }

    fn on_display_message(&mut self, message: BusMessage) {
        let show = wants_banner(&message.payload);
        info!(
            "Display message from {}: {:?} → banner {}",
            message.sender_id,
            message.payload,
            if show { "shown" } else { "hidden" }
        );
        self.hud.set_banner(show);
    }

    fn on_idle_deadline(&mut self) -> bool {
        self.guard.on_deadline()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn app() -> ReceiverApp {
        let surface = PlaybackSurface::new(Arc::new(PlaceholderSink));
        ReceiverApp::new(PlaybackGuard::new(surface, Duration::from_millis(10_000)))
    }

    fn message(payload: &str) -> BusMessage {
        BusMessage {
            sender_id: SenderId::from("sender-0"),
            payload: payload.to_owned(),
        }
    }

    #[tokio::test]
    async fn display_messages_drive_the_banner() {
        let mut app = app();

        app.on_display_message(message(r#"{"display":"show"}"#));
        assert!(app.hud.banner_visible());

        app.on_display_message(message(r#"{"display":"anything-else"}"#));
        assert!(!app.hud.banner_visible());

        app.on_display_message(message(r#"{"display":"show"}"#));
        app.on_display_message(message("{}"));
        assert!(!app.hud.banner_visible());
    }

    #[tokio::test(start_paused = true)]
    async fn dispatch_feeds_visibility_into_the_guard() {
        let mut app = app();

        app.dispatch(ReceiverEvent::VisibilityChanged {
            state: VisibilityState::Hidden,
        })
        .await;
        assert!(!app.guard.is_playing());
        let deadline = app.idle_deadline().expect("deadline armed");

        tokio::time::advance(Duration::from_millis(10_000)).await;
        assert!(Instant::now() >= deadline);
        assert!(app.on_idle_deadline());
        assert!(app.guard.is_closed());
    }
}
