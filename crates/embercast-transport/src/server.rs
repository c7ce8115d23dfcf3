//! TCP signaling server and sender registry.
//!
//! [`CastReceiver::start`] binds the listener and hands back an event
//! channel; one task per connection reads frames, enforces the idle-sender
//! policy, and translates wire traffic into [`ReceiverEvent`]s. All events
//! converge on a single mpsc receiver, so the application consumes them
//! serially.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use embercast_core::{
    ReceiverConfig, SenderId, SenderInfo, SystemVolume, TransportError, VisibilityState,
};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::bus::{BusMessage, BusRouter, MessageBus};
use crate::wire::{read_frame, write_frame, CastFrame, FrameType};

// MARK: - ReceiverEvent

/// Lifecycle notifications surfaced to the application, one per callback
/// the session manager exposes.
#[derive(Debug, Clone, PartialEq)]
pub enum ReceiverEvent {
    /// The listener is bound and the system is ready to receive messages.
    Ready { addr: SocketAddr },
    SenderConnected { sender: SenderInfo },
    SenderDisconnected {
        sender_id: SenderId,
        reason: DisconnectReason,
    },
    SystemVolumeChanged { volume: SystemVolume },
    VisibilityChanged { state: VisibilityState },
}

// MARK: - DisconnectReason

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The sender sent an explicit `close` frame.
    Closed,
    /// No frame arrived within the `max_inactivity` window.
    IdleTimeout,
    /// The socket dropped without a `close` frame.
    ConnectionLost,
    /// The sender violated the wire protocol.
    ProtocolError,
}

impl std::fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::IdleTimeout => write!(f, "idle timeout"),
            Self::ConnectionLost => write!(f, "connection lost"),
            Self::ProtocolError => write!(f, "protocol error"),
        }
    }
}

// MARK: - Sender registry

pub(crate) struct SenderEntry {
    pub(crate) info: SenderInfo,
    pub(crate) outbound: mpsc::Sender<CastFrame>,
}

/// Shared registry of connected senders, visible to every bus handle.
pub(crate) type SenderTable = Arc<Mutex<HashMap<SenderId, SenderEntry>>>;

/// Per-connection slice of the receiver configuration.
#[derive(Clone)]
struct ConnectionPolicy {
    status_text: String,
    max_inactivity: Duration,
}

// MARK: - CastReceiver

/// Handle to the running signaling server.
///
/// Dropping the handle leaves connections running; call
/// [`shutdown`](CastReceiver::shutdown) for an orderly stop.
pub struct CastReceiver {
    local_addr: SocketAddr,
    senders: SenderTable,
    router: BusRouter,
    accept_task: JoinHandle<()>,
}

impl CastReceiver {
    /// Bind the listener and start accepting senders.
    ///
    /// Emits [`ReceiverEvent::Ready`] on the returned channel once the
    /// system is accepting connections.
    pub async fn start(config: &ReceiverConfig) -> Result<(Self, mpsc::Receiver<ReceiverEvent>)> {
        let listener = TcpListener::bind(("0.0.0.0", config.port))
            .await
            .with_context(|| format!("binding signaling port {}", config.port))?;
        let local_addr = listener.local_addr()?;

        let (event_tx, event_rx) = mpsc::channel(64);
        let senders: SenderTable = Arc::default();
        let router = BusRouter::default();
        let policy = ConnectionPolicy {
            status_text: config.status_text.clone(),
            max_inactivity: config.max_inactivity(),
        };

        let accept_task = tokio::spawn(accept_loop(
            listener,
            senders.clone(),
            router.clone(),
            event_tx.clone(),
            policy,
        ));

        let _ = event_tx.send(ReceiverEvent::Ready { addr: local_addr }).await;
        info!("Cast receiver listening on {local_addr}");

        Ok((
            Self {
                local_addr,
                senders,
                router,
                accept_task,
            },
            event_rx,
        ))
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Open the message bus for `namespace`. Inbound frames for namespaces
    /// nobody opened are discarded with a debug log.
    pub fn message_bus(&self, namespace: &str) -> MessageBus {
        self.router.open(namespace, self.senders.clone())
    }

    /// Snapshot of the currently connected senders.
    pub fn connected_senders(&self) -> Vec<SenderInfo> {
        self.senders
            .lock()
            .unwrap()
            .values()
            .map(|entry| entry.info.clone())
            .collect()
    }

    /// Stop accepting new senders. Existing connection tasks finish on
    /// their own when their sockets drop.
    pub fn shutdown(self) {
        self.accept_task.abort();
        info!("Cast receiver stopped");
    }
}

// MARK: - Accept loop

async fn accept_loop(
    listener: TcpListener,
    senders: SenderTable,
    router: BusRouter,
    events: mpsc::Sender<ReceiverEvent>,
    policy: ConnectionPolicy,
) {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                if let Err(e) = stream.set_nodelay(true) {
                    debug!("set_nodelay failed for {peer}: {e}");
                }
                tokio::spawn(serve_sender(
                    stream,
                    peer.to_string(),
                    senders.clone(),
                    router.clone(),
                    events.clone(),
                    policy.clone(),
                ));
            }
            Err(e) => {
                warn!("Accept failed: {e}");
            }
        }
    }
}

// MARK: - Per-sender connection

/// Runs one sender connection: handshake, then the frame loop until the
/// sender closes, goes idle, or breaks protocol.
async fn serve_sender<S>(
    stream: S,
    peer: String,
    senders: SenderTable,
    router: BusRouter,
    events: mpsc::Sender<ReceiverEvent>,
    policy: ConnectionPolicy,
) where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (mut reader, mut writer) = tokio::io::split(stream);

    // ── Handshake: first frame must be `connect` ──────────────────────────
    let hello = match tokio::time::timeout(policy.max_inactivity, read_frame(&mut reader)).await {
        Ok(Ok(frame)) => frame,
        Ok(Err(e)) => {
            debug!("{peer}: handshake read failed: {e}");
            return;
        }
        Err(_) => {
            debug!("{peer}: no connect frame within {:?}", policy.max_inactivity);
            return;
        }
    };
    if hello.frame_type != FrameType::Connect {
        warn!(
            "{peer}: first frame was {:?}, expected connect — dropping",
            hello.frame_type
        );
        let _ = write_frame(&mut writer, &CastFrame::connect_rejected("expected connect")).await;
        return;
    }

    let device_name = hello.device_name.unwrap_or_else(|| "unknown".to_owned());
    let id = SenderId::random();
    let info = SenderInfo::new(id.clone(), device_name, peer.clone());

    if let Err(e) = write_frame(
        &mut writer,
        &CastFrame::connect_ack(id.as_str(), &policy.status_text),
    )
    .await
    {
        warn!("{peer}: connect_ack failed: {e}");
        return;
    }

    let (out_tx, mut out_rx) = mpsc::channel::<CastFrame>(64);
    senders.lock().unwrap().insert(
        id.clone(),
        SenderEntry {
            info: info.clone(),
            outbound: out_tx,
        },
    );
    let _ = events
        .send(ReceiverEvent::SenderConnected {
            sender: info.clone(),
        })
        .await;
    info!("Sender '{}' connected from {} (id={})", info.device_name, peer, id);

    // ── Writer task drains the outbound queue ─────────────────────────────
    let writer_task = tokio::spawn(async move {
        while let Some(frame) = out_rx.recv().await {
            if let Err(e) = write_frame(&mut writer, &frame).await {
                debug!("Outbound write failed: {e}");
                break;
            }
        }
    });

    // ── Background read loop ──────────────────────────────────────────────
    // Frames are forwarded over a channel so the select below only ever
    // cancels a (cancel-safe) channel recv, never a half-read frame.
    let (frame_tx, mut frame_rx) = mpsc::channel::<Result<CastFrame, TransportError>>(64);
    let read_task = tokio::spawn(async move {
        loop {
            let frame = read_frame(&mut reader).await;
            let done = frame.is_err();
            if frame_tx.send(frame).await.is_err() || done {
                return;
            }
        }
    });

    // ── Frame loop with idle-sender policy ────────────────────────────────
    // Every inbound frame counts as activity; the check runs at half the
    // inactivity window so a silent sender is caught within ~1.5× of it.
    let mut last_activity = Instant::now();
    let mut idle_check = tokio::time::interval(policy.max_inactivity / 2);
    idle_check.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    let reason = loop {
        tokio::select! {
            frame = frame_rx.recv() => {
                let frame = match frame {
                    Some(Ok(frame)) => frame,
                    Some(Err(TransportError::ConnectionClosed)) | None => {
                        break DisconnectReason::ConnectionLost;
                    }
                    Some(Err(e)) => {
                        warn!("Sender {id}: bad frame: {e}");
                        break DisconnectReason::ProtocolError;
                    }
                };
                last_activity = Instant::now();
                match frame.frame_type {
                    FrameType::Keepalive => {
                        debug!("Sender {id}: keepalive (ts={:?})", frame.timestamp_ms);
                    }
                    FrameType::Visibility => {
                        let state = VisibilityState::from_report(frame.visible);
                        let _ = events.send(ReceiverEvent::VisibilityChanged { state }).await;
                    }
                    FrameType::DocumentState => {
                        let state = VisibilityState::from_document_state(frame.state.as_deref());
                        let _ = events.send(ReceiverEvent::VisibilityChanged { state }).await;
                    }
                    FrameType::Message => {
                        let namespace = frame.namespace.unwrap_or_default();
                        let payload = frame.payload.unwrap_or_default();
                        router.route(&namespace, BusMessage { sender_id: id.clone(), payload }).await;
                    }
                    FrameType::Volume => {
                        let volume = SystemVolume::new(
                            frame.level.unwrap_or(0.0),
                            frame.muted.unwrap_or(false),
                        );
                        let _ = events.send(ReceiverEvent::SystemVolumeChanged { volume }).await;
                    }
                    FrameType::Close => break DisconnectReason::Closed,
                    FrameType::Connect | FrameType::ConnectAck => {
                        debug!("Sender {id}: ignoring {:?} after handshake", frame.frame_type);
                    }
                }
            }
            _ = idle_check.tick() => {
                if last_activity.elapsed() > policy.max_inactivity {
                    warn!(
                        "Sender {id} silent for more than {:?} — disconnecting",
                        policy.max_inactivity
                    );
                    break DisconnectReason::IdleTimeout;
                }
            }
        }
    };

    senders.lock().unwrap().remove(&id);
    read_task.abort();
    writer_task.abort();
    let _ = events
        .send(ReceiverEvent::SenderDisconnected {
            sender_id: id.clone(),
            reason,
        })
        .await;
    info!("Sender {id} disconnected ({reason})");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> ConnectionPolicy {
        ConnectionPolicy {
            status_text: "Ready to play".to_owned(),
            max_inactivity: Duration::from_secs(5),
        }
    }

    /// Spawns `serve_sender` on one end of an in-memory duplex, returning
    /// the client end plus the shared context.
    fn spawn_connection(
        policy: ConnectionPolicy,
    ) -> (
        tokio::io::DuplexStream,
        SenderTable,
        BusRouter,
        mpsc::Receiver<ReceiverEvent>,
    ) {
        let (client, server) = tokio::io::duplex(4096);
        let senders: SenderTable = Arc::default();
        let router = BusRouter::default();
        let (event_tx, event_rx) = mpsc::channel(64);
        tokio::spawn(serve_sender(
            server,
            "127.0.0.1:49152".to_owned(),
            senders.clone(),
            router.clone(),
            event_tx,
            policy,
        ));
        (client, senders, router, event_rx)
    }

    async fn handshake(client: &mut tokio::io::DuplexStream) -> CastFrame {
        write_frame(client, &CastFrame::connect("Test Phone"))
            .await
            .unwrap();
        read_frame(client).await.unwrap()
    }

    #[tokio::test]
    async fn handshake_registers_sender_and_reports_status() {
        let (mut client, senders, _router, mut events) = spawn_connection(policy());

        let ack = handshake(&mut client).await;
        assert_eq!(ack.frame_type, FrameType::ConnectAck);
        assert_eq!(ack.accepted, Some(true));
        assert_eq!(ack.status_text.as_deref(), Some("Ready to play"));

        match events.recv().await {
            Some(ReceiverEvent::SenderConnected { sender }) => {
                assert_eq!(sender.device_name, "Test Phone");
                assert_eq!(Some(sender.id.as_str()), ack.sender_id.as_deref());
            }
            other => panic!("expected SenderConnected, got {other:?}"),
        }
        assert_eq!(senders.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn non_connect_first_frame_is_rejected() {
        let (mut client, senders, _router, mut events) = spawn_connection(policy());

        write_frame(&mut client, &CastFrame::keepalive(1)).await.unwrap();
        let ack = read_frame(&mut client).await.unwrap();
        assert_eq!(ack.frame_type, FrameType::ConnectAck);
        assert_eq!(ack.accepted, Some(false));

        // The connection ends without ever registering the sender.
        assert!(matches!(
            read_frame(&mut client).await,
            Err(TransportError::ConnectionClosed)
        ));
        assert!(events.try_recv().is_err());
        assert!(senders.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn visibility_and_volume_frames_become_events() {
        let (mut client, _senders, _router, mut events) = spawn_connection(policy());
        handshake(&mut client).await;
        let _ = events.recv().await; // SenderConnected

        write_frame(&mut client, &CastFrame::visibility(false)).await.unwrap();
        assert_eq!(
            events.recv().await,
            Some(ReceiverEvent::VisibilityChanged {
                state: VisibilityState::Hidden
            })
        );

        // Legacy source reporting the same transition back.
        write_frame(&mut client, &CastFrame::document_state("visible"))
            .await
            .unwrap();
        assert_eq!(
            events.recv().await,
            Some(ReceiverEvent::VisibilityChanged {
                state: VisibilityState::Visible
            })
        );

        write_frame(&mut client, &CastFrame::volume(0.4, true)).await.unwrap();
        assert_eq!(
            events.recv().await,
            Some(ReceiverEvent::SystemVolumeChanged {
                volume: SystemVolume::new(0.4, true)
            })
        );
    }

    #[tokio::test]
    async fn close_frame_unregisters_the_sender() {
        let (mut client, senders, _router, mut events) = spawn_connection(policy());
        handshake(&mut client).await;
        let _ = events.recv().await; // SenderConnected

        write_frame(&mut client, &CastFrame::close()).await.unwrap();
        match events.recv().await {
            Some(ReceiverEvent::SenderDisconnected { reason, .. }) => {
                assert_eq!(reason, DisconnectReason::Closed);
            }
            other => panic!("expected SenderDisconnected, got {other:?}"),
        }
        assert!(senders.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn silent_sender_is_disconnected_after_max_inactivity() {
        let (mut client, _senders, _router, mut events) = spawn_connection(policy());
        handshake(&mut client).await;
        let _ = events.recv().await; // SenderConnected

        // No further frames: paused time fast-forwards through the idle
        // checks until the policy trips.
        match events.recv().await {
            Some(ReceiverEvent::SenderDisconnected { reason, .. }) => {
                assert_eq!(reason, DisconnectReason::IdleTimeout);
            }
            other => panic!("expected SenderDisconnected, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn receiver_accepts_tcp_senders() {
        let config = ReceiverConfig {
            port: 0,
            ..Default::default()
        };
        let (receiver, mut events) = CastReceiver::start(&config).await.unwrap();
        assert!(matches!(
            events.recv().await,
            Some(ReceiverEvent::Ready { .. })
        ));

        let mut client =
            tokio::net::TcpStream::connect(("127.0.0.1", receiver.local_addr().port()))
                .await
                .unwrap();
        write_frame(&mut client, &CastFrame::connect("Integration Phone"))
            .await
            .unwrap();
        let ack = read_frame(&mut client).await.unwrap();
        assert_eq!(ack.accepted, Some(true));

        match events.recv().await {
            Some(ReceiverEvent::SenderConnected { sender }) => {
                assert_eq!(sender.device_name, "Integration Phone");
            }
            other => panic!("expected SenderConnected, got {other:?}"),
        }
        assert_eq!(receiver.connected_senders().len(), 1);
        receiver.shutdown();
    }

    #[tokio::test]
    async fn bus_routes_inbound_and_outbound_payloads() {
        let (mut client, senders, router, mut events) = spawn_connection(policy());
        let mut bus = router.open("urn:x-cast:app.embercast.display", senders.clone());
        assert_eq!(bus.namespace(), "urn:x-cast:app.embercast.display");

        handshake(&mut client).await;
        let sender_id = match events.recv().await {
            Some(ReceiverEvent::SenderConnected { sender }) => sender.id,
            other => panic!("expected SenderConnected, got {other:?}"),
        };

        // Inbound: routed to the open bus.
        write_frame(
            &mut client,
            &CastFrame::message("urn:x-cast:app.embercast.display", r#"{"display":"show"}"#),
        )
        .await
        .unwrap();
        let msg = bus.recv().await.unwrap();
        assert_eq!(msg.sender_id, sender_id);
        assert_eq!(msg.payload, r#"{"display":"show"}"#);

        // Inbound on a namespace nobody opened: dropped, connection stays up.
        write_frame(&mut client, &CastFrame::message("urn:x-cast:other", "x"))
            .await
            .unwrap();

        // Outbound unicast and broadcast both land on the wire.
        bus.send(&sender_id, "pong");
        let frame = read_frame(&mut client).await.unwrap();
        assert_eq!(frame.frame_type, FrameType::Message);
        assert_eq!(frame.payload.as_deref(), Some("pong"));

        bus.broadcast("all");
        let frame = read_frame(&mut client).await.unwrap();
        assert_eq!(frame.payload.as_deref(), Some("all"));
    }
}
