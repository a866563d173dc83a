//! The abstract capabilities the lower transport layer consumes from its
//! host stack (§6). Replacing the original source's virtual-method
//! callback interface: one trait method per required operation instead of
//! a single polymorphic callback object.
use crate::mesh::{IVIndex, SequenceNumber};
use crate::message::ControlMessage;

/// Delivers finished lower-transport traffic the surrounding stack must act
/// on. The only callback the lower transport layer originates on its own
/// initiative is the segment-ack; everything else is a direct return value
/// of `segment_outbound`/`handle_inbound_pdu`.
pub trait LowerTransportCallbacks {
    /// Submits a finished BlockAck control message for onward network-layer
    /// processing.
    fn send_segment_acknowledgment(&mut self, message: ControlMessage);
}

/// Source of outbound sequence numbers. Implementations own persistence and
/// the relationship to the current IV index; this layer only consumes the
/// returned value and treats it as uniquely owned by the PDU it constructs.
pub trait SequenceNumberSource {
    fn next_sequence_number(&mut self) -> SequenceNumber;
    fn current_iv_index(&self) -> IVIndex;
}

/// Marker trait for the network layer's PDU wrapping step
/// (`createNetworkLayerPDU` in the original source). This crate never
/// implements it — network-layer framing and encryption are out of
/// scope — it only names the boundary so a host stack can plug its network
/// layer in without this crate depending on it.
pub trait NetworkLayerPdu {}
