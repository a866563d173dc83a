//! Bluetooth Mesh transport-control opcodes.

/// 7 bit Control Opcode carried in the lower-transport control header.
#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug)]
#[repr(u8)]
pub enum ControlOpcode {
    /// Segment Acknowledgement. Handled entirely by the lower transport layer
    /// (never reaches the upper transport or access layer).
    SegmentAcknowledgment = 0x00,
    FriendPoll = 0x01,
    FriendUpdate = 0x02,
    FriendRequest = 0x03,
    FriendOffer = 0x04,
    FriendClear = 0x05,
    FriendClearConfirm = 0x06,
    FriendSubscriptionListAdd = 0x07,
    FriendSubscriptionListRemove = 0x08,
    FriendSubscriptionListConfirm = 0x09,
    Heartbeat = 0x0A,
}

impl ControlOpcode {
    /// Decodes a 7 bit opcode. Unrecognized-but-well-formed opcodes are kept
    /// as `Other` rather than rejected: this layer doesn't dispatch on
    /// opcode semantics other than `SegmentAcknowledgment`, so an unknown
    /// opcode is still a valid lower-transport PDU to segment/reassemble.
    #[must_use]
    pub fn new(opcode: u8) -> ControlOpcodeOrOther {
        match opcode & 0x7F {
            0x00 => ControlOpcodeOrOther::Known(ControlOpcode::SegmentAcknowledgment),
            0x01 => ControlOpcodeOrOther::Known(ControlOpcode::FriendPoll),
            0x02 => ControlOpcodeOrOther::Known(ControlOpcode::FriendUpdate),
            0x03 => ControlOpcodeOrOther::Known(ControlOpcode::FriendRequest),
            0x04 => ControlOpcodeOrOther::Known(ControlOpcode::FriendOffer),
            0x05 => ControlOpcodeOrOther::Known(ControlOpcode::FriendClear),
            0x06 => ControlOpcodeOrOther::Known(ControlOpcode::FriendClearConfirm),
            0x07 => ControlOpcodeOrOther::Known(ControlOpcode::FriendSubscriptionListAdd),
            0x08 => ControlOpcodeOrOther::Known(ControlOpcode::FriendSubscriptionListRemove),
            0x09 => ControlOpcodeOrOther::Known(ControlOpcode::FriendSubscriptionListConfirm),
            0x0A => ControlOpcodeOrOther::Known(ControlOpcode::Heartbeat),
            other => ControlOpcodeOrOther::Other(other),
        }
    }
}

impl From<ControlOpcode> for u8 {
    fn from(opcode: ControlOpcode) -> Self {
        opcode as u8
    }
}

/// Either a known [`ControlOpcode`] or a raw 7 bit value this layer doesn't
/// assign meaning to. The lower transport must still be able to segment and
/// reassemble PDUs carrying opcodes it has never heard of — per §9's note
/// on the source's fallthrough switch, unrecognized opcodes fall through to
/// identical (pass-through) handling, never an error.
#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug)]
pub enum ControlOpcodeOrOther {
    Known(ControlOpcode),
    Other(u8),
}

impl ControlOpcodeOrOther {
    #[must_use]
    pub fn value(self) -> u8 {
        match self {
            ControlOpcodeOrOther::Known(k) => k.into(),
            ControlOpcodeOrOther::Other(o) => o,
        }
    }

    #[must_use]
    pub fn is_segment_ack(self) -> bool {
        matches!(
            self,
            ControlOpcodeOrOther::Known(ControlOpcode::SegmentAcknowledgment)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segment_ack_opcode_is_zero() {
        assert_eq!(u8::from(ControlOpcode::SegmentAcknowledgment), 0x00);
        assert!(ControlOpcode::new(0x00).is_segment_ack());
    }

    #[test]
    fn unknown_opcode_round_trips() {
        let decoded = ControlOpcode::new(0x42);
        assert_eq!(decoded, ControlOpcodeOrOther::Other(0x42));
        assert_eq!(decoded.value(), 0x42);
    }

    #[test]
    fn decode_masks_top_bit() {
        assert!(ControlOpcode::new(0x80).is_segment_ack());
    }
}
