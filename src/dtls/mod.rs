//! DTLS handshake fragmentation and reassembly.
//!
//! Outgoing handshake messages are split by the [`MessageFragmenter`]. Incoming fragments
//! are merged per message in a [`FragmentCollector`] backed by a [`FragmentStream`], and the
//! [`FragmentManager`] dispatches fragments to collectors by message sequence and epoch.
//!
//! Reassembly is deterministic for overlapping input: the first byte written at an offset
//! is the one kept.

mod collector;
mod fragment;
mod fragmenter;
mod manager;
mod stream;

pub use collector::{AddOutcome, FragmentCollector, Rejection};
pub use fragment::{DtlsHandshakeFragment, ParsedFragments, HANDSHAKE_HEADER_LEN};
pub use fragmenter::{fragment_message, MessageFragmenter};
pub use manager::{FragmentKey, FragmentManager};
pub use stream::FragmentStream;
