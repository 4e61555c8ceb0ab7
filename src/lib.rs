//! tlsprobe
//!
//! Protocol core for probing TLS, DTLS and QUIC implementations. Every protocol field is
//! computed the way a conforming peer would compute it, but stays open to modification
//! before it reaches the wire.
//!
//! Three engines share the crate:
//!
//! * [`record::RecordProtection`] protects and unprotects TLS/DTLS records (CBC with
//!   MAC-then-encrypt or encrypt-then-MAC, TLS 1.2 AEAD and TLS 1.3). Authentication
//!   results are reported as flags on [`record::RecordCryptoComputations`] instead of
//!   being enforced.
//! * [`dtls::FragmentManager`] reassembles DTLS handshake fragments arriving in any order,
//!   duplicated or overlapping, and [`dtls::MessageFragmenter`] splits outgoing messages.
//! * [`quic::QuicPacketProtection`] applies and removes QUIC header and packet protection
//!   for every encryption level of a [`quic::QuicContext`].
//!
//! Engines are synchronous and hold no global state. Each connection builds its own
//! instances from a [`Config`].

#![forbid(unsafe_code)]
#![warn(clippy::all)]
// #![deny(missing_docs)]

#[macro_use]
extern crate log;

mod buffer;
pub use buffer::Buf;

mod config;
pub use config::{Config, ConfigBuilder};

mod error;
pub use error::Error;

mod rng;
mod util;

pub mod crypto;
pub mod dtls;
pub mod modvar;
pub mod quic;
pub mod record;
pub mod types;
