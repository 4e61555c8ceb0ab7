use crate::config::Config;
use crate::types::HandshakeType;

use super::{DtlsHandshakeFragment, FragmentStream};

/// Result of offering a fragment to a [`FragmentCollector`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddOutcome {
    Added,
    /// Same offset, length and content as a fragment already added.
    Duplicate,
    Rejected(Rejection),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// The fragment announces a different message length than the collector holds.
    LengthMismatch { expected: u32, got: u32 },
    TypeMismatch { expected: u8, got: u8 },
    /// The overlap disagrees with stored bytes and rewriting is not accepted.
    ContentRewrite,
    /// The fragment would leave a gap and only fitting fragments are accepted.
    NotFitting,
    /// `fragment_length` disagrees with the content, or the fragment ends past the
    /// message length.
    OutOfBounds,
}

/// Reassembly state for one handshake message.
#[derive(Debug, Clone)]
pub struct FragmentCollector {
    handshake_type: u8,
    message_length: u32,
    message_seq: u16,
    epoch: u16,

    stream: FragmentStream,
    // (offset, content) of every fragment merged since the last reset.
    seen: Vec<(u32, Vec<u8>)>,

    accept_only_fitting: bool,
    accept_content_rewriting: bool,
    track_retransmissions: bool,
    fill_byte: u8,

    interpreted: bool,
    retransmission: bool,
    unreassemblable: bool,
}

impl FragmentCollector {
    /// A collector shaped after `first`. The fragment itself is not added.
    pub fn new(config: &Config, first: &DtlsHandshakeFragment) -> Self {
        let message_length = first.message_length();
        FragmentCollector {
            handshake_type: first.handshake_type.value_or_default(),
            message_length,
            message_seq: first.message_seq(),
            epoch: first.epoch,
            stream: FragmentStream::new(message_length as usize),
            seen: Vec::new(),
            accept_only_fitting: config.accept_only_fitting_dtls_fragments(),
            accept_content_rewriting: config.accept_content_rewriting_dtls_fragments(),
            track_retransmissions: config.track_dtls_retransmissions(),
            fill_byte: config.fragment_fill_byte(),
            interpreted: false,
            retransmission: false,
            unreassemblable: false,
        }
    }

    pub fn handshake_type(&self) -> HandshakeType {
        HandshakeType::from_u8(self.handshake_type)
    }

    pub fn message_length(&self) -> u32 {
        self.message_length
    }

    pub fn message_seq(&self) -> u16 {
        self.message_seq
    }

    pub fn epoch(&self) -> u16 {
        self.epoch
    }

    pub fn stream(&self) -> &FragmentStream {
        &self.stream
    }

    /// Add a fragment. Returns `false` for an identical repeat and for a rejected
    /// fragment.
    pub fn add_fragment(&mut self, fragment: &DtlsHandshakeFragment) -> bool {
        self.try_add_fragment(fragment) == AddOutcome::Added
    }

    /// Add a fragment and report what happened to it.
    pub fn try_add_fragment(&mut self, fragment: &DtlsHandshakeFragment) -> AddOutcome {
        let offset = fragment.fragment_offset();
        let content = fragment.content();

        if let Err(rejection) = self.check_fitting(fragment, &content) {
            if matches!(
                rejection,
                Rejection::LengthMismatch { .. } | Rejection::TypeMismatch { .. }
            ) {
                warn!(
                    "Inconsistent fragment for message_seq {}: {:?}",
                    self.message_seq, rejection
                );
                self.unreassemblable = true;
            }
            return AddOutcome::Rejected(rejection);
        }

        // A fragment after the message was handed upwards starts a new copy of it.
        if self.interpreted && self.track_retransmissions {
            debug!(
                "Retransmission of message_seq {} epoch {}",
                self.message_seq, self.epoch
            );
            self.reset();
            self.retransmission = true;
        } else if self.is_duplicate(offset, &content) {
            trace!("Duplicate fragment at offset {}", offset);
            return AddOutcome::Duplicate;
        }

        let at = offset as usize;
        if self.stream.conflicts_with(&content, at) {
            if !self.accept_content_rewriting {
                warn!("Rejected fragment rewriting message_seq {}", self.message_seq);
                return AddOutcome::Rejected(Rejection::ContentRewrite);
            }
            // Stored bytes are kept.
            warn!(
                "Fragment at offset {} rewrites message_seq {}, keeping earlier bytes",
                offset, self.message_seq
            );
        }

        if self.accept_only_fitting && !self.stream.can_insert_byte_array(&content, at) {
            warn!("Would not add non-fitting fragment at offset {}", offset);
            return AddOutcome::Rejected(Rejection::NotFitting);
        }

        self.stream.insert_byte_array(&content, at);
        self.seen.push((offset, content));
        AddOutcome::Added
    }

    fn check_fitting(&self, fragment: &DtlsHandshakeFragment, content: &[u8]) -> Result<(), Rejection> {
        let got = fragment.message_length();
        if got != self.message_length {
            return Err(Rejection::LengthMismatch {
                expected: self.message_length,
                got,
            });
        }
        let got = fragment.handshake_type.value_or_default();
        if got != self.handshake_type {
            return Err(Rejection::TypeMismatch {
                expected: self.handshake_type,
                got,
            });
        }
        let end = fragment.fragment_offset() as u64 + content.len() as u64;
        if fragment.fragment_length() as usize != content.len() || end > self.message_length as u64 {
            return Err(Rejection::OutOfBounds);
        }
        Ok(())
    }

    fn is_duplicate(&self, offset: u32, content: &[u8]) -> bool {
        self.seen
            .iter()
            .any(|(o, c)| *o == offset && c.as_slice() == content)
    }

    fn reset(&mut self) {
        self.stream = FragmentStream::new(self.message_length as usize);
        self.seen.clear();
        self.interpreted = false;
        self.retransmission = false;
        self.unreassemblable = false;
    }

    pub fn is_message_complete(&self) -> bool {
        // The length is a u32, never negative.
        self.stream
            .is_complete(self.message_length as i64)
            .unwrap_or(false)
    }

    /// Fragments with inconsistent lengths or types were offered.
    pub fn is_unreassemblable(&self) -> bool {
        self.unreassemblable
    }

    pub fn is_interpreted(&self) -> bool {
        self.interpreted
    }

    pub fn set_interpreted(&mut self, interpreted: bool) {
        self.interpreted = interpreted;
    }

    pub fn is_retransmission(&self) -> bool {
        self.retransmission
    }

    /// One fragment covering the whole message, with gaps replaced by the configured fill
    /// byte. Marks the message interpreted.
    pub fn build_combined_fragment(&mut self) -> DtlsHandshakeFragment {
        if !self.is_message_complete() {
            warn!(
                "Combining incomplete message_seq {} ({} of {} bytes)",
                self.message_seq,
                self.stream.covered(),
                self.message_length
            );
        }

        let content = self.stream.get_complete_filled_stream(self.fill_byte);
        let mut combined = DtlsHandshakeFragment::new(
            self.handshake_type(),
            self.message_length,
            self.message_seq,
            0,
            &content,
        )
        .with_epoch(self.epoch);
        combined.retransmission = self.retransmission;

        self.interpreted = true;
        combined
    }
}
