//! # ember-transport
//!
//! Transport core of a real-time, loss-tolerant video link.
//!
//! Encoder output is fragmented into bounded chunks, packed with built-in
//! redundancy into datagrams, and carried over an unreliable channel with no
//! retransmission round-trip. Every datagram also piggybacks the sending
//! peer's feedback about the opposite direction.
//!
//! ## Crate structure
//!
//! - [`codec`]: Sticky-error parser, bounded serializer, big-endian integers
//! - [`wire`]: Bounded arrays, length-prefixed byte strings, the `Wire` triad
//! - [`chunk`]: Chunk wire format and the NAL chunker
//! - [`packet`]: Sender/receiver sections and the datagram
//! - [`key`]: Session key bootstrap message
//! - [`ring`]: FIFO and windowed ring buffers over absolute positions
//! - [`sender`]: Sender state machine
//! - [`receiver`]: Receiver state machine and NAL reassembly
//! - [`peer`]: Full-duplex endpoint
//! - [`stats`]: Sender and receiver counters
//! - [`config`]: TOML configuration

pub mod chunk;
pub mod codec;
pub mod config;
pub mod key;
pub mod packet;
pub mod peer;
pub mod receiver;
pub mod ring;
pub mod sender;
pub mod stats;
pub mod wire;

pub use config::TransportConfig;
pub use packet::Packet;
pub use peer::Peer;
pub use receiver::{DeliveredNal, ReceiverEvent};
