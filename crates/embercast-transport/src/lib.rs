//! Signaling transport for the Embercast receiver.
//!
//! Senders connect over TCP and exchange length-prefixed JSON frames with
//! the receiver. The transport owns the listener, the registry of connected
//! senders, and the idle-sender policy; application-level traffic flows
//! through per-namespace [`MessageBus`] handles.

pub mod bus;
pub mod server;
pub mod wire;

pub use bus::{BusMessage, MessageBus};
pub use server::{CastReceiver, DisconnectReason, ReceiverEvent};
pub use wire::{read_frame, write_frame, CastFrame, FrameType, MAX_FRAME_LEN};
