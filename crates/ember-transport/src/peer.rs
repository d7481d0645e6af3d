//! # Peer
//!
//! One end of a full-duplex link: a [`Sender`] for this side's video, a
//! [`Receiver`] for the other side's, and the glue that makes every outgoing
//! datagram carry this side's feedback while every incoming datagram's
//! feedback reaches the local sender.
//!
//! No sockets, no clocks. The caller decides when to transmit and moves
//! bytes between [`poll_transmit`](Peer::poll_transmit) /
//! [`heartbeat`](Peer::heartbeat) and [`receive`](Peer::receive).

use bytes::Bytes;
use tracing::trace;

use crate::codec::DecodeError;
use crate::config::TransportConfig;
use crate::packet::{Packet, SenderSection};
use crate::receiver::{Receiver, ReceiverEvent};
use crate::sender::Sender;
use crate::wire::{CapacityError, NetString};

#[derive(Debug)]
pub struct Peer {
    sender: Sender,
    receiver: Receiver,
    /// Sent once, on the next outgoing datagram.
    side_channel: NetString,
}

impl Peer {
    pub fn new(config: &TransportConfig) -> Self {
        Peer {
            sender: Sender::new(config.sender()),
            receiver: Receiver::new(config.receiver()),
            side_channel: NetString::default(),
        }
    }

    /// Queue one encoded NAL unit. Returns the number of chunks produced.
    pub fn push_nal(&mut self, nal: &[u8]) -> usize {
        self.sender.push_nal(nal)
    }

    /// Attach advisory bytes to the next outgoing datagram, replacing any
    /// message not yet sent.
    pub fn set_side_channel(&mut self, message: impl Into<Bytes>) -> Result<(), CapacityError> {
        self.side_channel = NetString::try_new(message)?;
        Ok(())
    }

    /// Next data datagram, or `None` when nothing is waiting to be sent.
    pub fn poll_transmit(&mut self) -> Option<Bytes> {
        let section = self.sender.next_section()?;
        Some(self.build(section))
    }

    /// Datagram carrying only feedback (and any pending side-channel message).
    pub fn heartbeat(&mut self) -> Bytes {
        let section = self.sender.heartbeat_section();
        self.build(section)
    }

    /// Process one datagram from the other side.
    pub fn receive(&mut self, datagram: &[u8]) -> Result<(), DecodeError> {
        let feedback = self.receiver.receive_with_feedback(datagram)?;
        self.sender.handle_feedback(&feedback);
        Ok(())
    }

    pub fn drain_events(&mut self) -> impl Iterator<Item = ReceiverEvent> + '_ {
        self.receiver.drain_events()
    }

    pub fn sender(&self) -> &Sender {
        &self.sender
    }

    pub fn receiver(&self) -> &Receiver {
        &self.receiver
    }

    fn build(&mut self, sender_section: SenderSection) -> Bytes {
        let packet = Packet {
            sender_section,
            receiver_section: self.receiver.feedback(),
            side_channel: std::mem::take(&mut self.side_channel),
        };
        let bytes = packet.encode();
        trace!(
            seq = packet.sender_section.sequence_number,
            chunks = packet.sender_section.frames.len(),
            len = bytes.len(),
            "transmit"
        );
        bytes
    }
}
