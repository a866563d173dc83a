//! Inbound reassembler (component C): collects segments keyed by
//! `(source, SeqZero)` into a coherent upper-transport PDU, tracking
//! arrival with a [`BlockAck`] bitmap.
use crate::ack::AckTimer;
use crate::address::{Address, UnicastAddress};
use crate::config::SarConfig;
use crate::control::ControlOpcodeOrOther;
use crate::error::Error;
use crate::lower::{Aid, BlockAck, SegN, SegO, SegmentedAccessPdu, SegmentedControlPdu, SeqZero};
use crate::message::{AccessMessage, ControlMessage, Message, MessageMeta, SessionKey};
use crate::mesh::{SequenceNumber, TTL};
use crate::timestamp::Instant;
use alloc::collections::{BTreeMap, VecDeque};
use alloc::vec::Vec;
use core::time::Duration;

/// Recovers the message's full 24-bit sequence number from the 13-bit
/// `SeqZero` carried on a segment and the 24-bit sequence number of any
/// segment belonging to that message (§4.3).
///
/// `receivedSeq24`'s low 13 bits may be smaller than `seqZero` when the
/// segment carrying the lowest sequence number hasn't arrived yet; in that
/// case the message started one 13-bit block earlier. That subtraction
/// wraps modulo 2^11 (the number of 13-bit blocks spanning 24 bits) rather
/// than erroring, since the 24-bit sequence-number space itself wraps
/// across an IV index update (Open Question 3).
#[must_use]
pub fn recover_full_seq(received_seq24: u32, seq_zero: SeqZero) -> u32 {
    const SEQ_ZERO_BITS: u32 = 13;
    const UPPER_BITS_MASK: u32 = (1 << 11) - 1;
    let seq_zero = u32::from(seq_zero.value());
    let mut upper = received_seq24 >> SEQ_ZERO_BITS;
    if (received_seq24 & ((1 << SEQ_ZERO_BITS) - 1)) < seq_zero {
        upper = upper.wrapping_sub(1) & UPPER_BITS_MASK;
    }
    (upper << SEQ_ZERO_BITS) | seq_zero
}

/// Enough of a finished session to re-send its ack for a late-arriving
/// duplicate segment, without keeping the whole session (and its segment
/// buffer) alive just for that.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct CachedAck {
    pub block_ack: BlockAck,
    pub dst: Address,
    pub ttl: TTL,
}

#[derive(Clone, Eq, PartialEq, Debug)]
pub enum SessionKind {
    Access { akf: bool, aid: Aid, aszmic: bool },
    Control { opcode: ControlOpcodeOrOther },
}

/// Everything this layer knows about a message being reassembled, per §3's
/// data model. Never mutates an already-written segment; duplicate arrivals
/// for a populated `SegO` are idempotent.
#[derive(Clone, Debug)]
pub struct ReassemblySession {
    pub src: UnicastAddress,
    pub dst: Address,
    pub ttl: TTL,
    pub seq_zero: SeqZero,
    pub seg_n: SegN,
    pub block_ack: BlockAck,
    pub buffer: BTreeMap<u8, Vec<u8>>,
    pub kind: SessionKind,
    pub ack_timer: AckTimer,
    pub started_at: Instant,
    /// 24-bit sequence number of the most recently received segment,
    /// combined with `seq_zero` on completion to recover the message's own
    /// sequence number.
    pub last_received_seq: SequenceNumber,
}

impl ReassemblySession {
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.block_ack.is_complete(self.seg_n)
    }

    fn assemble_payload(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for seg_o in 0..=self.seg_n.value() {
            if let Some(segment) = self.buffer.get(&seg_o) {
                out.extend_from_slice(segment);
            }
        }
        out
    }
}

/// Outcome of feeding one segment to a [`ReassemblyTable`].
#[derive(Clone, Eq, PartialEq, Debug)]
pub enum SegmentOutcome {
    /// First segment of a brand-new session; the ack timer has already been
    /// armed internally, and is returned so the caller can also schedule
    /// the matching wakeup with its `TimerScheduler`.
    Started { ack_deadline: Instant },
    /// Session updated, not yet complete.
    Progress,
    /// This segment completed the session. The session is removed from the
    /// table (its final `BlockAck` is retained in the late-duplicate
    /// cache) and an ack should be sent if `emit_ack` is true.
    Completed {
        message: Message,
        emit_ack: bool,
        block_ack: BlockAck,
    },
    /// The segment's header fields are inconsistent with the session
    /// already in progress for this `SessionKey`; dropped, session kept.
    Conflict(Error),
    /// `SegO` was already populated; ignored (idempotent). Carries
    /// `Error::DuplicateSegment` so the caller can log/report it uniformly
    /// with `Conflict`'s `Error` payload, even though the policy is to keep
    /// going rather than treat it as a failure.
    Duplicate(Error),
    /// A segment arrived for a `SessionKey` whose session already
    /// completed. Answered with the cached ack rather than reopening a
    /// session or silently dropping it (Open Question 1).
    LateDuplicate(CachedAck),
}

/// Owns every in-progress reassembly session for one PDU kind (access or
/// control) and a small cache of just-completed sessions' final acks.
pub struct ReassemblyTable {
    sessions: BTreeMap<SessionKey, ReassemblySession>,
    completed_cache: VecDeque<(SessionKey, CachedAck)>,
    cache_capacity: usize,
}

impl ReassemblyTable {
    #[must_use]
    pub fn new(cache_capacity: usize) -> Self {
        ReassemblyTable {
            sessions: BTreeMap::new(),
            completed_cache: VecDeque::new(),
            cache_capacity,
        }
    }

    #[must_use]
    pub fn session(&self, key: &SessionKey) -> Option<&ReassemblySession> {
        self.sessions.get(key)
    }

    #[must_use]
    pub fn session_mut(&mut self, key: &SessionKey) -> Option<&mut ReassemblySession> {
        self.sessions.get_mut(key)
    }

    pub fn remove(&mut self, key: &SessionKey) -> Option<ReassemblySession> {
        self.sessions.remove(key)
    }

    /// Sweeps every session past its incomplete-message deadline (§4.5),
    /// dropping it and returning its key.
    pub fn sweep_incomplete(&mut self, now: Instant, config: &SarConfig) -> Vec<SessionKey> {
        let expired: Vec<SessionKey> = self
            .sessions
            .iter()
            .filter(|(_, session)| {
                let timeout = Duration::from_millis(u64::from(
                    config.incomplete_timeout_ms(u32::from(session.ttl.value())),
                ));
                now.checked_duration_since(session.started_at)
                    .map(|elapsed| elapsed >= timeout)
                    .unwrap_or(false)
            })
            .map(|(key, _)| *key)
            .collect();
        for key in &expired {
            self.sessions.remove(key);
        }
        expired
    }

    fn remember_completed(&mut self, key: SessionKey, cached: CachedAck) {
        if self.cache_capacity == 0 {
            return;
        }
        self.completed_cache.push_back((key, cached));
        while self.completed_cache.len() > self.cache_capacity {
            self.completed_cache.pop_front();
        }
    }

    fn cached_ack(&self, key: &SessionKey) -> Option<CachedAck> {
        self.completed_cache
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, ack)| *ack)
    }

    /// Feeds one segmented-access PDU into the table. `src`/`dst`/`ttl` come
    /// from the enclosing network PDU (§4.3 step 2); `received_seq` is that
    /// PDU's own 24-bit sequence number, used to recover the message's
    /// sequence number on completion.
    #[allow(clippy::too_many_arguments)]
    pub fn process_segmented_access(
        &mut self,
        src: UnicastAddress,
        dst: Address,
        ttl: TTL,
        received_seq: SequenceNumber,
        pdu: &SegmentedAccessPdu<'_>,
        now: Instant,
        config: &SarConfig,
    ) -> SegmentOutcome {
        let key = SessionKey {
            src,
            seq_zero: pdu.seq_zero,
        };
        if !self.sessions.contains_key(&key) {
            if let Some(cached) = self.cached_ack(&key) {
                return SegmentOutcome::LateDuplicate(cached);
            }
            let mut session = ReassemblySession {
                src,
                dst,
                ttl,
                seq_zero: pdu.seq_zero,
                seg_n: pdu.seg_n,
                block_ack: BlockAck::default(),
                buffer: BTreeMap::new(),
                kind: SessionKind::Access {
                    akf: pdu.akf,
                    aid: pdu.aid,
                    aszmic: pdu.szmic,
                },
                ack_timer: AckTimer::default(),
                started_at: now,
                last_received_seq: received_seq,
            };
            let delay = Duration::from_millis(u64::from(
                config.ack_delay_ms(u32::from(ttl.value())),
            ));
            let deadline = session.ack_timer.arm(now, delay);
            self.sessions.insert(key, session);
            self.insert_segment(key, pdu.seg_o, pdu.segment, received_seq);
            return self.finish_after_insert(key, deadline, true);
        }

        let session = self.sessions.get(&key).expect("checked above");
        let expected_kind = SessionKind::Access {
            akf: pdu.akf,
            aid: pdu.aid,
            aszmic: pdu.szmic,
        };
        if session.seg_n != pdu.seg_n || session.kind != expected_kind {
            return SegmentOutcome::Conflict(Error::SessionConflict {
                existing: session.seg_n,
                incoming: pdu.seg_n,
            });
        }
        if session.buffer.contains_key(&pdu.seg_o.value()) {
            return SegmentOutcome::Duplicate(Error::DuplicateSegment);
        }
        self.insert_segment(key, pdu.seg_o, pdu.segment, received_seq);
        self.finish_after_insert(key, Instant::default(), false)
    }

    /// Feeds one segmented-control PDU into the table. Symmetric to
    /// [`Self::process_segmented_access`].
    #[allow(clippy::too_many_arguments)]
    pub fn process_segmented_control(
        &mut self,
        src: UnicastAddress,
        dst: Address,
        ttl: TTL,
        received_seq: SequenceNumber,
        pdu: &SegmentedControlPdu<'_>,
        now: Instant,
        config: &SarConfig,
    ) -> SegmentOutcome {
        let key = SessionKey {
            src,
            seq_zero: pdu.seq_zero,
        };
        let opcode = crate::control::ControlOpcode::new(pdu.opcode);
        if !self.sessions.contains_key(&key) {
            if let Some(cached) = self.cached_ack(&key) {
                return SegmentOutcome::LateDuplicate(cached);
            }
            let mut session = ReassemblySession {
                src,
                dst,
                ttl,
                seq_zero: pdu.seq_zero,
                seg_n: pdu.seg_n,
                block_ack: BlockAck::default(),
                buffer: BTreeMap::new(),
                kind: SessionKind::Control { opcode },
                ack_timer: AckTimer::default(),
                started_at: now,
                last_received_seq: received_seq,
            };
            let delay = Duration::from_millis(u64::from(
                config.ack_delay_ms(u32::from(ttl.value())),
            ));
            let deadline = session.ack_timer.arm(now, delay);
            self.sessions.insert(key, session);
            self.insert_segment(key, pdu.seg_o, pdu.segment, received_seq);
            return self.finish_after_insert(key, deadline, true);
        }

        let session = self.sessions.get(&key).expect("checked above");
        let expected_kind = SessionKind::Control { opcode };
        if session.seg_n != pdu.seg_n || session.kind != expected_kind {
            return SegmentOutcome::Conflict(Error::SessionConflict {
                existing: session.seg_n,
                incoming: pdu.seg_n,
            });
        }
        if session.buffer.contains_key(&pdu.seg_o.value()) {
            return SegmentOutcome::Duplicate(Error::DuplicateSegment);
        }
        self.insert_segment(key, pdu.seg_o, pdu.segment, received_seq);
        self.finish_after_insert(key, Instant::default(), false)
    }

    fn insert_segment(
        &mut self,
        key: SessionKey,
        seg_o: SegO,
        segment: &[u8],
        received_seq: SequenceNumber,
    ) {
        if let Some(session) = self.sessions.get_mut(&key) {
            session.buffer.insert(seg_o.value(), segment.to_vec());
            session.block_ack.set(seg_o);
            session.last_received_seq = received_seq;
        }
    }

    fn finish_after_insert(
        &mut self,
        key: SessionKey,
        deadline: Instant,
        started: bool,
    ) -> SegmentOutcome {
        let complete = self
            .sessions
            .get(&key)
            .map(ReassemblySession::is_complete)
            .unwrap_or(false);
        if !complete {
            return if started {
                SegmentOutcome::Started {
                    ack_deadline: deadline,
                }
            } else {
                SegmentOutcome::Progress
            };
        }

        let mut session = self.sessions.remove(&key).expect("just checked complete");
        let emit_ack = session.ack_timer.complete_early();
        let block_ack = session.block_ack;
        self.remember_completed(
            key,
            CachedAck {
                block_ack,
                dst: session.dst,
                ttl: session.ttl,
            },
        );

        let full_seq = recover_full_seq(session.last_received_seq.value(), session.seq_zero);
        let meta = MessageMeta {
            src: session.src,
            dst: session.dst,
            ttl: session.ttl,
            seq: SequenceNumber::new(full_seq),
            segmented: true,
        };
        let payload = session.assemble_payload();
        let message = match session.kind {
            SessionKind::Access { akf, aid, aszmic } => Message::Access(AccessMessage {
                meta,
                akf,
                aid,
                aszmic,
                upper_pdu: payload,
                segments: session.buffer,
            }),
            SessionKind::Control { opcode } => Message::Control(ControlMessage {
                meta,
                opcode: opcode.value(),
                parameters: Vec::new(),
                transport_pdu: payload,
                segments: session.buffer,
            }),
        };
        SegmentOutcome::Completed {
            message,
            emit_ack,
            block_ack,
        }
    }
}
