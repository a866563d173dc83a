//! The lower transport layer's view of a message: either an access PDU
//! (application payload) or a control PDU (transport-layer signalling),
//! carrying the fields common to both plus variant-specific ones.
//!
//! The original source models this with a `Message` base class and
//! `AccessMessage`/`ControlMessage` subclasses reached via virtual dispatch.
//! Per the redesign notes, this is a tagged enum instead: operations that
//! apply uniformly (sequence number, addressing, segmented flag) live on
//! [`MessageMeta`], factored out of the variant.
use crate::address::{Address, UnicastAddress};
use crate::lower::{Aid, SeqZero};
use crate::mesh::{SequenceNumber, TTL};
use alloc::collections::BTreeMap;
use alloc::vec::Vec;

/// Fields shared by every message this layer processes, regardless of
/// whether it's an access or control message.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct MessageMeta {
    pub src: UnicastAddress,
    pub dst: Address,
    pub ttl: TTL,
    pub seq: SequenceNumber,
    pub segmented: bool,
}

impl MessageMeta {
    #[must_use]
    pub fn seq_zero(&self) -> SeqZero {
        SeqZero::from_sequence_number(self.seq.value())
    }
}

/// An application-layer message: an (already encrypted) upper-transport PDU,
/// plus the fields the lower transport header needs to segment or identify
/// it.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct AccessMessage {
    pub meta: MessageMeta,
    pub akf: bool,
    pub aid: Aid,
    /// Size of the upper MIC: `false` = 32 bit, `true` = 64 bit. Only
    /// meaningful when `meta.segmented` is set; unsegmented access PDUs
    /// always carry a 32 bit MIC.
    pub aszmic: bool,
    pub upper_pdu: Vec<u8>,
    /// `SegO -> segment payload`, populated as segments are produced
    /// (outbound) or collected (inbound). Empty for an unsegmented message.
    pub segments: BTreeMap<u8, Vec<u8>>,
}

/// A transport-control message (friend poll/update, heartbeat, segment ack,
/// …).
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct ControlMessage {
    pub meta: MessageMeta,
    pub opcode: u8,
    /// Parameters placed between the 1 byte header and `transport_pdu` for
    /// an *unsegmented* control PDU. Unused (and must be empty) for a
    /// segmented control message.
    pub parameters: Vec<u8>,
    pub transport_pdu: Vec<u8>,
    pub segments: BTreeMap<u8, Vec<u8>>,
}

/// Either message kind the lower transport layer hands to, or receives
/// from, the surrounding stack.
#[derive(Clone, Eq, PartialEq, Debug)]
pub enum Message {
    Access(AccessMessage),
    Control(ControlMessage),
}

impl Message {
    #[must_use]
    pub fn meta(&self) -> &MessageMeta {
        match self {
            Message::Access(a) => &a.meta,
            Message::Control(c) => &c.meta,
        }
    }

    #[must_use]
    pub fn meta_mut(&mut self) -> &mut MessageMeta {
        match self {
            Message::Access(a) => &mut a.meta,
            Message::Control(c) => &mut c.meta,
        }
    }
}

impl From<AccessMessage> for Message {
    fn from(a: AccessMessage) -> Self {
        Message::Access(a)
    }
}

impl From<ControlMessage> for Message {
    fn from(c: ControlMessage) -> Self {
        Message::Control(c)
    }
}

/// Keys a reassembly session by the sender and the SeqZero of the message
/// it's reassembling. Two sessions with different `SessionKey`s never
/// interfere, which is what fixes the original source's single
/// per-direction `BlockAck` field (see DESIGN.md).
#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug)]
pub struct SessionKey {
    pub src: UnicastAddress,
    pub seq_zero: SeqZero,
}
