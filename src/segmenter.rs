//! Outbound segmenter (component B): turns one upper-transport PDU into
//! either a single unsegmented lower PDU or an ordered `SegO -> wire bytes`
//! map of segmented PDUs.
use crate::error::Error;
use crate::lower::{
    Aid, BlockAck, SegN, SegO, SegmentedAccessPdu, SegmentedControlPdu, SeqZero,
    UnsegmentedAccessPdu, UnsegmentedControlPdu, MAX_SEGMENTED_ACCESS_PAYLOAD,
    MAX_SEGMENTED_CONTROL_PAYLOAD, MAX_SEGMENTS, MAX_UNSEGMENTED_CONTROL_PAYLOAD,
};
use alloc::collections::BTreeMap;
use alloc::vec;
use alloc::vec::Vec;
use core::cmp::min;

/// Result of segmenting one outbound message.
#[derive(Clone, Eq, PartialEq, Debug)]
pub enum Segmentation {
    Unsegmented(Vec<u8>),
    Segmented {
        seg_n: SegN,
        /// `SegO -> wire-encoded segment PDU`, in ascending SegO order.
        /// Entries present in the `skip` bitmap passed to the segmenter are
        /// omitted (retransmission after a partial ack).
        segments: BTreeMap<u8, Vec<u8>>,
    },
}

fn ceil_div(len: usize, max: usize) -> usize {
    (len + max - 1) / max
}

/// Segments an access-layer upper PDU. `skip` marks SegOs already
/// acknowledged by the peer and excluded from the output — this mirrors
/// the original source's segment iterator, which skips acked segments when
/// re-iterating for retransmission. Pass `BlockAck::default()` for a
/// brand-new message.
pub fn segment_access(
    upper_pdu: &[u8],
    akf: bool,
    aid: Aid,
    aszmic: bool,
    seq_zero: SeqZero,
    skip: BlockAck,
) -> Result<Segmentation, Error> {
    if upper_pdu.len() <= MAX_SEGMENTED_ACCESS_PAYLOAD {
        let pdu = UnsegmentedAccessPdu { akf, aid, upper_pdu };
        let mut buf = vec![0u8; pdu.wire_len()];
        pdu.encode(&mut buf)?;
        return Ok(Segmentation::Unsegmented(buf));
    }

    let seg_count = ceil_div(upper_pdu.len(), MAX_SEGMENTED_ACCESS_PAYLOAD);
    if seg_count > MAX_SEGMENTS {
        return Err(Error::PayloadTooLarge {
            segments: seg_count,
        });
    }
    let seg_n = SegN::new((seg_count - 1) as u8);
    let mut segments = BTreeMap::new();
    for seg_o_value in 0..seg_count as u8 {
        let seg_o = SegO::new(seg_o_value);
        if skip.get(seg_o) {
            continue;
        }
        let start = usize::from(seg_o_value) * MAX_SEGMENTED_ACCESS_PAYLOAD;
        let end = min(upper_pdu.len(), start + MAX_SEGMENTED_ACCESS_PAYLOAD);
        let pdu = SegmentedAccessPdu {
            akf,
            aid,
            szmic: aszmic,
            seq_zero,
            seg_o,
            seg_n,
            segment: &upper_pdu[start..end],
        };
        let mut buf = vec![0u8; pdu.wire_len()];
        pdu.encode(&mut buf)?;
        segments.insert(seg_o_value, buf);
    }
    Ok(Segmentation::Segmented { seg_n, segments })
}

/// Segments a transport-control PDU. `parameters` is only used for the
/// unsegmented case (prepended between the opcode byte and
/// `transport_pdu`); a segmented control message carries no separate
/// parameters field, per §4.2.
pub fn segment_control(
    opcode: u8,
    parameters: &[u8],
    transport_pdu: &[u8],
    seq_zero: SeqZero,
    skip: BlockAck,
) -> Result<Segmentation, Error> {
    let unsegmented_len = parameters.len() + transport_pdu.len();
    if unsegmented_len <= MAX_UNSEGMENTED_CONTROL_PAYLOAD {
        let mut combined = Vec::with_capacity(unsegmented_len);
        combined.extend_from_slice(parameters);
        combined.extend_from_slice(transport_pdu);
        let pdu = UnsegmentedControlPdu {
            opcode,
            parameters: &combined,
        };
        let mut buf = vec![0u8; pdu.wire_len()];
        pdu.encode(&mut buf)?;
        return Ok(Segmentation::Unsegmented(buf));
    }

    let seg_count = ceil_div(transport_pdu.len(), MAX_SEGMENTED_CONTROL_PAYLOAD);
    if seg_count > MAX_SEGMENTS {
        return Err(Error::PayloadTooLarge {
            segments: seg_count,
        });
    }
    let seg_n = SegN::new((seg_count - 1) as u8);
    let mut segments = BTreeMap::new();
    for seg_o_value in 0..seg_count as u8 {
        let seg_o = SegO::new(seg_o_value);
        if skip.get(seg_o) {
            continue;
        }
        let start = usize::from(seg_o_value) * MAX_SEGMENTED_CONTROL_PAYLOAD;
        let end = min(transport_pdu.len(), start + MAX_SEGMENTED_CONTROL_PAYLOAD);
        let pdu = SegmentedControlPdu {
            opcode,
            seq_zero,
            seg_o,
            seg_n,
            segment: &transport_pdu[start..end],
        };
        let mut buf = vec![0u8; pdu.wire_len()];
        pdu.encode(&mut buf)?;
        segments.insert(seg_o_value, buf);
    }
    Ok(Segmentation::Segmented { seg_n, segments })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn s1_short_access_pdu_stays_unsegmented() {
        let result = segment_access(
            &[0xAA, 0xBB, 0xCC],
            true,
            Aid::new_masked(0x05),
            false,
            SeqZero::new(0),
            BlockAck::default(),
        )
        .unwrap();
        assert_eq!(result, Segmentation::Unsegmented(vec![0x45, 0xAA, 0xBB, 0xCC]));
    }

    #[test]
    fn access_pdu_one_byte_over_the_segmented_max_still_splits() {
        // 13 bytes is under the old (invented) unsegmented threshold of 15
        // but over MAX_SEGMENTED_ACCESS_PAYLOAD (12), which is the only
        // threshold §4.2 names for access PDUs.
        let data = [0u8; 13];
        let result = segment_access(
            &data,
            false,
            Aid::new_masked(0),
            false,
            SeqZero::new(0),
            BlockAck::default(),
        )
        .unwrap();
        match result {
            Segmentation::Segmented { seg_n, segments } => {
                assert_eq!(seg_n, SegN::new(1));
                assert_eq!(segments.len(), 2);
            }
            Segmentation::Unsegmented(_) => panic!("expected segmented output"),
        }
    }

    #[test]
    fn s2_sixteen_byte_access_pdu_splits_in_two() {
        let data: Vec<u8> = (0..16).collect();
        let result = segment_access(
            &data,
            false,
            Aid::new_masked(0),
            false,
            SeqZero::new(0x0001),
            BlockAck::default(),
        )
        .unwrap();
        match result {
            Segmentation::Segmented { seg_n, segments } => {
                assert_eq!(seg_n, SegN::new(1));
                assert_eq!(segments.len(), 2);
                assert_eq!(&segments[&0][..4], &[0x80, 0x00, 0x04, 0x01]);
                assert_eq!(&segments[&0][4..], &data[0..12]);
                assert_eq!(&segments[&1][..4], &[0x80, 0x00, 0x04, 0x21]);
                assert_eq!(&segments[&1][4..], &data[12..16]);
            }
            Segmentation::Unsegmented(_) => panic!("expected segmented output"),
        }
    }

    #[test]
    fn retransmission_skips_already_acked_segments() {
        let data: Vec<u8> = (0..24).collect();
        let mut acked = BlockAck::default();
        acked.set(SegO::new(0));
        let result = segment_access(
            &data,
            false,
            Aid::new_masked(0),
            false,
            SeqZero::new(0),
            acked,
        )
        .unwrap();
        match result {
            Segmentation::Segmented { segments, .. } => {
                assert!(!segments.contains_key(&0));
                assert!(segments.contains_key(&1));
            }
            Segmentation::Unsegmented(_) => panic!("expected segmented output"),
        }
    }

    #[test]
    fn oversized_payload_is_rejected() {
        let data = vec![0u8; MAX_SEGMENTED_ACCESS_PAYLOAD * 33];
        let err = segment_access(
            &data,
            false,
            Aid::new_masked(0),
            false,
            SeqZero::new(0),
            BlockAck::default(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::PayloadTooLarge { .. }));
    }

    #[test]
    fn control_segments_never_carry_parameters() {
        let transport_pdu = vec![0u8; MAX_SEGMENTED_CONTROL_PAYLOAD + 1];
        let result = segment_control(0x01, &[], &transport_pdu, SeqZero::new(0), BlockAck::default())
            .unwrap();
        assert!(matches!(result, Segmentation::Segmented { .. }));
    }
}
