//! Crate-wide error type for the lower transport layer.
//!
//! `thiserror` requires `std::error::Error`, which isn't available to a
//! `#![no_std]` crate with the `std` feature off, so this follows the same
//! plain-enum-plus-manual-`Display` convention the no_std corpus (e.g.
//! `btmesh-bearer::BearerError`) uses instead; `std::error::Error` is
//! implemented separately, gated behind the `std` feature.
use crate::lower::SegN;
use core::fmt;

/// Every way inbound parsing or outbound segmentation can fail.
///
/// Inbound parse errors (`MalformedHeader`, `SessionConflict`,
/// `DuplicateSegment`) are meant to be logged and discarded by the caller,
/// never propagated as a hard failure of the surrounding stack. Outbound
/// errors (`PayloadTooLarge`) are returned synchronously to the caller of
/// `segment_outbound`.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum Error {
    MalformedHeader { expected: usize, actual: usize },
    PayloadTooLarge { segments: usize },
    SessionConflict { existing: SegN, incoming: SegN },
    DuplicateSegment,
    IncompleteTimeout,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::MalformedHeader { expected, actual } => write!(
                f,
                "lower transport header malformed: expected {} bytes, got {}",
                expected, actual
            ),
            Error::PayloadTooLarge { segments } => write!(
                f,
                "payload requires {} segments, more than the 32 a 5-bit SegN can address",
                segments
            ),
            Error::SessionConflict { existing, incoming } => write!(
                f,
                "segment for SeqZero conflicts with the in-progress session (SegN {:?} != {:?})",
                existing, incoming
            ),
            Error::DuplicateSegment => {
                write!(f, "segment SegO already present in this session, ignored")
            }
            Error::IncompleteTimeout => {
                write!(f, "reassembly session timed out before completion")
            }
        }
    }
}

#[cfg(feature = "std")]
extern crate std;

#[cfg(feature = "std")]
impl std::error::Error for Error {}
