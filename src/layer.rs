//! `LowerTransportLayer` facade (component E): owns the access and control
//! reassembly tables and wires them to a [`TimerScheduler`], exposing the
//! three entry points a host stack calls — `segment_outbound`,
//! `handle_inbound_pdu`, `poll_timers`. Contains no codec or reassembly
//! logic of its own; it only schedules and dispatches.
use crate::address::Address;
use crate::callbacks::{LowerTransportCallbacks, SequenceNumberSource};
use crate::config::SarConfig;
use crate::control::ControlOpcode;
use crate::error::Error;
use crate::lower::{self, BlockAck, Pdu, SegmentAckPayload, SAR_ACK_OPCODE};
use crate::mesh::{SequenceNumber, TTL};
use crate::message::{AccessMessage, ControlMessage, Message, MessageMeta, SessionKey};
use crate::reassembler::{CachedAck, ReassemblyTable, SegmentOutcome};
use crate::segmenter::{self, Segmentation};
use crate::timer::TimerScheduler;
use crate::timestamp::Instant;
use crate::address::UnicastAddress;
use alloc::collections::BTreeMap;
use alloc::vec::Vec;
use core::time::Duration;

/// What a scheduled deadline means, so [`LowerTransportLayer::poll_timers`]
/// can dispatch a fired deadline back to the right table and session
/// without rescanning every session on every poll.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
enum TimerToken {
    /// The ack-arming delay (§4.4) elapsed for this session.
    Ack { control: bool, key: SessionKey },
    /// The incomplete-message bound (§4.5) elapsed for this session.
    Incomplete { control: bool, key: SessionKey },
}

/// Outstanding timer handles for one direction's session table, so a
/// completed or removed session's still-pending deadlines can be cancelled
/// instead of left to fire against whatever session later reuses the same
/// `SessionKey` (SeqZero repeats every 8192 messages).
struct SessionTimerHandles<H> {
    ack: BTreeMap<SessionKey, H>,
    incomplete: BTreeMap<SessionKey, H>,
}

impl<H> Default for SessionTimerHandles<H> {
    fn default() -> Self {
        SessionTimerHandles {
            ack: BTreeMap::new(),
            incomplete: BTreeMap::new(),
        }
    }
}

/// One session's reassembly outer bound expired before it completed; the
/// session and its partial buffer were dropped.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct TimedOutSession {
    pub control: bool,
    pub key: SessionKey,
    pub error: Error,
}

/// Ties the outbound segmenter, the two inbound reassembly tables (access
/// and control), and a [`TimerScheduler`] together. `!Sync` by convention: a
/// host stack that needs concurrent access owns one of these behind its own
/// single actor/task, the way a single-threaded event loop would.
pub struct LowerTransportLayer<Sched: TimerScheduler<TimerToken>> {
    access: ReassemblyTable,
    control: ReassemblyTable,
    config: SarConfig,
    scheduler: Sched,
    access_timers: SessionTimerHandles<Sched::Handle>,
    control_timers: SessionTimerHandles<Sched::Handle>,
}

impl<Sched: TimerScheduler<TimerToken>> LowerTransportLayer<Sched> {
    #[must_use]
    pub fn new(config: SarConfig, scheduler: Sched) -> Self {
        LowerTransportLayer {
            access: ReassemblyTable::new(config.completed_session_cache_size),
            control: ReassemblyTable::new(config.completed_session_cache_size),
            config,
            scheduler,
            access_timers: SessionTimerHandles::default(),
            control_timers: SessionTimerHandles::default(),
        }
    }

    /// Segments one outbound message, generalizing over access and control.
    /// `skip` marks SegOs already acknowledged by the peer for a
    /// retransmission; pass `BlockAck::default()` for a brand-new message.
    pub fn segment_outbound(&self, message: &Message, skip: BlockAck) -> Result<Segmentation, Error> {
        let seq_zero = message.meta().seq_zero();
        match message {
            Message::Access(access) => segmenter::segment_access(
                &access.upper_pdu,
                access.akf,
                access.aid,
                access.aszmic,
                seq_zero,
                skip,
            ),
            Message::Control(control) => segmenter::segment_control(
                control.opcode,
                &control.parameters,
                &control.transport_pdu,
                seq_zero,
                skip,
            ),
        }
    }

    /// Feeds one raw lower-transport PDU in from the network layer.
    /// `src`/`dst`/`ttl`/`seq` come from the enclosing network PDU header.
    /// Returns the completed message once every segment (or the single
    /// unsegmented PDU) has arrived; `Ok(None)` means the PDU was consumed
    /// (segment buffered, duplicate, or conflicting) without completing a
    /// message.
    #[allow(clippy::too_many_arguments)]
    pub fn handle_inbound_pdu<CB, SN>(
        &mut self,
        src: UnicastAddress,
        dst: Address,
        ttl: TTL,
        seq: SequenceNumber,
        bytes: &[u8],
        is_control: bool,
        now: Instant,
        callbacks: &mut CB,
        seq_source: &mut SN,
    ) -> Result<Option<Message>, Error>
    where
        CB: LowerTransportCallbacks,
        SN: SequenceNumberSource,
    {
        let pdu = lower::decode(bytes, is_control)?;
        match pdu {
            Pdu::UnsegAccess(p) => Ok(Some(Message::Access(AccessMessage {
                meta: MessageMeta {
                    src,
                    dst,
                    ttl,
                    seq,
                    segmented: false,
                },
                akf: p.akf,
                aid: p.aid,
                aszmic: false,
                upper_pdu: p.upper_pdu.to_vec(),
                segments: BTreeMap::new(),
            }))),
            Pdu::UnsegControl(p) => {
                let opcode = ControlOpcode::new(p.opcode);
                Ok(Some(Message::Control(ControlMessage {
                    meta: MessageMeta {
                        src,
                        dst,
                        ttl,
                        seq,
                        segmented: false,
                    },
                    opcode: opcode.value(),
                    parameters: p.parameters.to_vec(),
                    transport_pdu: Vec::new(),
                    segments: BTreeMap::new(),
                })))
            }
            Pdu::SegAccess(p) => {
                let key = SessionKey {
                    src,
                    seq_zero: p.seq_zero,
                };
                let outcome =
                    self.access
                        .process_segmented_access(src, dst, ttl, seq, &p, now, &self.config);
                self.dispatch_outcome(false, key, ttl, now, outcome, callbacks, seq_source)
            }
            Pdu::SegControl(p) => {
                let key = SessionKey {
                    src,
                    seq_zero: p.seq_zero,
                };
                let outcome = self.control.process_segmented_control(
                    src,
                    dst,
                    ttl,
                    seq,
                    &p,
                    now,
                    &self.config,
                );
                self.dispatch_outcome(true, key, ttl, now, outcome, callbacks, seq_source)
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn dispatch_outcome<CB, SN>(
        &mut self,
        control: bool,
        key: SessionKey,
        ttl: TTL,
        now: Instant,
        outcome: SegmentOutcome,
        callbacks: &mut CB,
        seq_source: &mut SN,
    ) -> Result<Option<Message>, Error>
    where
        CB: LowerTransportCallbacks,
        SN: SequenceNumberSource,
    {
        let LowerTransportLayer {
            scheduler,
            access_timers,
            control_timers,
            config,
            ..
        } = self;
        let timers = if control {
            &mut *control_timers
        } else {
            &mut *access_timers
        };

        match outcome {
            SegmentOutcome::Started { ack_deadline } => {
                #[cfg(feature = "log")]
                log::debug!("session {:?} (control={}) started", key, control);
                let ack_delay = ack_deadline.checked_duration_since(now).unwrap_or_default();
                let ack_handle =
                    scheduler.post_delayed(now, ack_delay, TimerToken::Ack { control, key });
                if let Some(stale) = timers.ack.insert(key, ack_handle) {
                    scheduler.cancel(stale);
                }
                let incomplete_delay = Duration::from_millis(u64::from(
                    config.incomplete_timeout_ms(u32::from(ttl.value())),
                ));
                let incomplete_handle = scheduler.post_delayed(
                    now,
                    incomplete_delay,
                    TimerToken::Incomplete { control, key },
                );
                if let Some(stale) = timers.incomplete.insert(key, incomplete_handle) {
                    scheduler.cancel(stale);
                }
                Ok(None)
            }
            SegmentOutcome::Progress => Ok(None),
            SegmentOutcome::Completed {
                message,
                emit_ack,
                block_ack,
            } => {
                if let Some(handle) = timers.ack.remove(&key) {
                    scheduler.cancel(handle);
                }
                if let Some(handle) = timers.incomplete.remove(&key) {
                    scheduler.cancel(handle);
                }
                if emit_ack {
                    Self::send_ack(control, key.src, message.meta().dst, ttl, key.seq_zero, block_ack, callbacks, seq_source);
                }
                Ok(Some(message))
            }
            SegmentOutcome::Conflict(err) => {
                #[cfg(feature = "log")]
                log::warn!("session {:?} (control={}) conflict: {}", key, control, err);
                Ok(None)
            }
            SegmentOutcome::Duplicate(err) => {
                #[cfg(feature = "log")]
                log::trace!("session {:?} (control={}) duplicate segment ignored: {}", key, control, err);
                #[cfg(not(feature = "log"))]
                let _ = err;
                Ok(None)
            }
            SegmentOutcome::LateDuplicate(cached) => {
                #[cfg(feature = "log")]
                log::debug!(
                    "session {:?} (control={}) late duplicate, re-sending cached ack",
                    key,
                    control
                );
                let CachedAck {
                    block_ack,
                    dst,
                    ttl,
                } = cached;
                Self::send_ack(
                    control,
                    key.src,
                    dst,
                    ttl,
                    key.seq_zero,
                    block_ack,
                    callbacks,
                    seq_source,
                );
                Ok(None)
            }
        }
    }

    /// Sends a Segment Acknowledgement back to `ack_dst` (the segments'
    /// original sender), addressed from `local_dst` (the segments' original
    /// destination). Only unicast-destined messages are acknowledged, per
    /// the Mesh profile — group- and virtual-addressed segmented messages
    /// are never acked.
    #[allow(clippy::too_many_arguments)]
    fn send_ack<CB, SN>(
        control: bool,
        ack_dst: UnicastAddress,
        local_dst: Address,
        ttl: TTL,
        seq_zero: crate::lower::SeqZero,
        block_ack: BlockAck,
        callbacks: &mut CB,
        seq_source: &mut SN,
    ) where
        CB: LowerTransportCallbacks,
        SN: SequenceNumberSource,
    {
        let local_src = match local_dst {
            Address::Unicast(u) => u,
            _ => return,
        };
        let payload = SegmentAckPayload {
            obo: false,
            seq_zero,
            block_ack,
        };
        let packed = payload.pack();
        let message = ControlMessage {
            meta: MessageMeta {
                src: local_src,
                dst: Address::from(ack_dst),
                ttl,
                seq: seq_source.next_sequence_number(),
                segmented: false,
            },
            opcode: SAR_ACK_OPCODE,
            parameters: packed.to_vec(),
            transport_pdu: Vec::new(),
            segments: BTreeMap::new(),
        };
        let _ = control;
        callbacks.send_segment_acknowledgment(message);
    }

    /// Drains fired deadlines from the scheduler and applies their effect:
    /// an elapsed ack timer emits a (possibly partial) BlockAck, an elapsed
    /// incomplete-message bound drops the session and is reported back to
    /// the caller as an `Error::IncompleteTimeout`. Also sweeps both tables
    /// directly as a safety net against a scheduler that dropped a token.
    pub fn poll_timers<CB, SN>(
        &mut self,
        now: Instant,
        callbacks: &mut CB,
        seq_source: &mut SN,
    ) -> Vec<TimedOutSession>
    where
        CB: LowerTransportCallbacks,
        SN: SequenceNumberSource,
    {
        let mut timed_out = Vec::new();
        let LowerTransportLayer {
            access,
            control: control_table,
            config,
            scheduler,
            access_timers,
            control_timers,
        } = self;

        for token in scheduler.poll(now) {
            match token {
                TimerToken::Ack { control, key } => {
                    let (table, timers) = if control {
                        (&mut *control_table, &mut *control_timers)
                    } else {
                        (&mut *access, &mut *access_timers)
                    };
                    timers.ack.remove(&key);
                    let fired = table.session_mut(&key).map(|session| {
                        let should_ack = session.ack_timer.fire();
                        (should_ack, session.dst, session.ttl, session.block_ack)
                    });
                    if let Some((true, dst, ttl, block_ack)) = fired {
                        Self::send_ack(control, key.src, dst, ttl, key.seq_zero, block_ack, callbacks, seq_source);
                    }
                }
                TimerToken::Incomplete { control, key } => {
                    let (table, timers) = if control {
                        (&mut *control_table, &mut *control_timers)
                    } else {
                        (&mut *access, &mut *access_timers)
                    };
                    timers.incomplete.remove(&key);
                    let should_remove = table.session(&key).map_or(false, |s| !s.is_complete());
                    if should_remove {
                        #[cfg(feature = "log")]
                        log::debug!(
                            "session {:?} (control={}) timed out incomplete",
                            key,
                            control
                        );
                        table.remove(&key);
                        if let Some(handle) = timers.ack.remove(&key) {
                            scheduler.cancel(handle);
                        }
                        timed_out.push(TimedOutSession {
                            control,
                            key,
                            error: Error::IncompleteTimeout,
                        });
                    }
                }
            }
        }

        for (control, table, timers) in [
            (false, &mut *access, &mut *access_timers),
            (true, &mut *control_table, &mut *control_timers),
        ] {
            let expired = table.sweep_incomplete(now, config);
            for key in &expired {
                #[cfg(feature = "log")]
                log::debug!(
                    "session {:?} (control={}) swept on incomplete timeout",
                    key,
                    control
                );
                if let Some(handle) = timers.ack.remove(key) {
                    scheduler.cancel(handle);
                }
                if let Some(handle) = timers.incomplete.remove(key) {
                    scheduler.cancel(handle);
                }
                timed_out.push(TimedOutSession {
                    control,
                    key: *key,
                    error: Error::IncompleteTimeout,
                });
            }
        }

        timed_out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lower::{Aid, SeqZero};
    use crate::timer::VirtualScheduler;

    #[derive(Default)]
    struct RecordingCallbacks {
        acks: Vec<ControlMessage>,
    }

    impl LowerTransportCallbacks for RecordingCallbacks {
        fn send_segment_acknowledgment(&mut self, message: ControlMessage) {
            self.acks.push(message);
        }
    }

    struct CountingSequenceSource(u32);

    impl SequenceNumberSource for CountingSequenceSource {
        fn next_sequence_number(&mut self) -> SequenceNumber {
            let seq = SequenceNumber::new(self.0);
            self.0 += 1;
            seq
        }

        fn current_iv_index(&self) -> crate::mesh::IVIndex {
            crate::mesh::IVIndex(0)
        }
    }

    fn layer() -> LowerTransportLayer<VirtualScheduler<TimerToken>> {
        LowerTransportLayer::new(SarConfig::default(), VirtualScheduler::new())
    }

    #[test]
    fn segmenting_then_feeding_every_segment_reassembles_and_acks() {
        let mut sender = layer();
        let upper_pdu: Vec<u8> = (0..16).collect();
        let outbound = Message::Access(AccessMessage {
            meta: MessageMeta {
                src: UnicastAddress::new(1),
                dst: Address::Unicast(UnicastAddress::new(2)),
                ttl: TTL::new(4),
                seq: SequenceNumber::new(0x000001),
                segmented: true,
            },
            akf: false,
            aid: Aid::new_masked(0),
            aszmic: false,
            upper_pdu: upper_pdu.clone(),
            segments: BTreeMap::new(),
        });
        let segmentation = sender
            .segment_outbound(&outbound, BlockAck::default())
            .unwrap();
        let segments = match segmentation {
            Segmentation::Segmented { segments, .. } => segments,
            Segmentation::Unsegmented(_) => panic!("expected a segmented message"),
        };
        assert_eq!(segments.len(), 2);

        let mut receiver = layer();
        let mut callbacks = RecordingCallbacks::default();
        let mut seq_source = CountingSequenceSource(0);
        let mut assembled = None;
        for (_, wire) in &segments {
            let result = receiver
                .handle_inbound_pdu(
                    UnicastAddress::new(1),
                    Address::Unicast(UnicastAddress::new(2)),
                    TTL::new(4),
                    SequenceNumber::new(0x000001),
                    wire,
                    false,
                    Instant::from_millis(0),
                    &mut callbacks,
                    &mut seq_source,
                )
                .unwrap();
            if let Some(message) = result {
                assembled = Some(message);
            }
        }

        match assembled.expect("message should have completed") {
            Message::Access(access) => assert_eq!(access.upper_pdu, upper_pdu),
            Message::Control(_) => panic!("expected an access message"),
        }
        assert_eq!(callbacks.acks.len(), 1);
        assert_eq!(callbacks.acks[0].opcode, SAR_ACK_OPCODE);
    }

    #[test]
    fn ack_timer_fires_through_poll_timers_on_missing_segment() {
        let mut receiver = layer();
        let mut callbacks = RecordingCallbacks::default();
        let mut seq_source = CountingSequenceSource(0);

        let mut segments = BTreeMap::new();
        if let Segmentation::Segmented { segments: s, .. } = crate::segmenter::segment_access(
            &(0..20).collect::<Vec<u8>>(),
            false,
            Aid::new_masked(0),
            false,
            SeqZero::new(5),
            BlockAck::default(),
        )
        .unwrap()
        {
            segments = s;
        }
        // Only feed SegO 0; SegO 1 never arrives.
        let wire = &segments[&0];
        let result = receiver
            .handle_inbound_pdu(
                UnicastAddress::new(3),
                Address::Unicast(UnicastAddress::new(4)),
                TTL::new(2),
                SequenceNumber::new(5),
                wire,
                false,
                Instant::from_millis(0),
                &mut callbacks,
                &mut seq_source,
            )
            .unwrap();
        assert!(result.is_none());
        assert!(callbacks.acks.is_empty());

        // Ack delay for TTL=2 is 150 + 50*2 = 250ms; fires before the 10s
        // incomplete timeout.
        let timed_out = receiver.poll_timers(Instant::from_millis(250), &mut callbacks, &mut seq_source);
        assert!(timed_out.is_empty());
        assert_eq!(callbacks.acks.len(), 1);
        assert_eq!(callbacks.acks[0].opcode, SAR_ACK_OPCODE);
    }

    #[test]
    fn incomplete_session_reports_timeout_and_cancels_its_ack_timer() {
        let mut receiver = layer();
        let mut callbacks = RecordingCallbacks::default();
        let mut seq_source = CountingSequenceSource(0);

        let mut segments = BTreeMap::new();
        if let Segmentation::Segmented { segments: s, .. } = crate::segmenter::segment_access(
            &(0..20).collect::<Vec<u8>>(),
            false,
            Aid::new_masked(0),
            false,
            SeqZero::new(7),
            BlockAck::default(),
        )
        .unwrap()
        {
            segments = s;
        }
        let wire = &segments[&0];
        receiver
            .handle_inbound_pdu(
                UnicastAddress::new(3),
                Address::Unicast(UnicastAddress::new(4)),
                TTL::new(2),
                SequenceNumber::new(7),
                wire,
                false,
                Instant::from_millis(0),
                &mut callbacks,
                &mut seq_source,
            )
            .unwrap();

        // Incomplete bound for TTL=2 is 10_000 + 100*2 = 10_200ms, well past
        // the 250ms ack delay, so by the time this fires the ack has already
        // been sent once; only the incomplete timeout should be reported.
        let timed_out = receiver.poll_timers(Instant::from_millis(10_200), &mut callbacks, &mut seq_source);
        assert_eq!(timed_out.len(), 1);
        assert!(!timed_out[0].control);
        assert_eq!(timed_out[0].error, Error::IncompleteTimeout);
        assert_eq!(callbacks.acks.len(), 1);

        // The session is gone; a further poll at the same deadline reports
        // nothing new (the stale ack/incomplete handles were cancelled, not
        // left to misfire against a later session reusing this SeqZero).
        let second = receiver.poll_timers(Instant::from_millis(20_000), &mut callbacks, &mut seq_source);
        assert!(second.is_empty());
    }
}
