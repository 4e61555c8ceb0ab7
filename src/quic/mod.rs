//! QUIC packet protection (RFC 9001 §5).
//!
//! A [`QuicPacket`] is parsed from (or built for) the wire, then run through
//! [`QuicPacketProtection`]: header protection hides the flags' low bits and the truncated
//! packet number, and the payload is sealed with the AEAD of the packet's encryption level.
//! Keys and the largest received packet number of every level live in a [`QuicContext`].

use std::fmt;

mod keys;
mod number;
mod packet;
mod protection;
mod varint;

pub use keys::{QuicContext, QuicKeySet, QuicKeys};
pub use number::{decode_packet_number, encode_packet_number, packet_number_length};
pub use packet::{ParsedPackets, QuicPacket};
pub use protection::{retry_integrity_tag, QuicPacketProtection, RETRY_TAG_LEN};
pub use varint::{parse_varint, put_varint, varint_len, MAX_VARINT};

/// QUIC version 1 (RFC 9000).
pub const QUIC_VERSION_1: u32 = 0x0000_0001;

/// QUIC version 2 (RFC 9369). Same packet layout, different long header type bits.
pub const QUIC_VERSION_2: u32 = 0x6b33_43cf;

/// Length of the header protection sample.
pub const SAMPLE_LEN: usize = 16;

/// QUIC packet types. The long header encoding depends on the version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketType {
    Initial,
    ZeroRtt,
    Handshake,
    Retry,
    /// Short header.
    OneRtt,
}

impl PacketType {
    /// Type from the two type bits of a long header of `version`.
    ///
    /// Unknown versions are read with the version 1 encoding.
    pub fn from_long_bits(version: u32, bits: u8) -> Self {
        match (version == QUIC_VERSION_2, bits & 0x03) {
            (false, 0b00) | (true, 0b01) => PacketType::Initial,
            (false, 0b01) | (true, 0b10) => PacketType::ZeroRtt,
            (false, 0b10) | (true, 0b11) => PacketType::Handshake,
            _ => PacketType::Retry,
        }
    }

    /// Type bits for a long header of `version`, `None` for short header packets.
    pub fn long_bits(&self, version: u32) -> Option<u8> {
        let v1 = match self {
            PacketType::Initial => 0b00,
            PacketType::ZeroRtt => 0b01,
            PacketType::Handshake => 0b10,
            PacketType::Retry => 0b11,
            PacketType::OneRtt => return None,
        };
        if version == QUIC_VERSION_2 {
            // Initial=01, 0-RTT=10, Handshake=11, Retry=00.
            Some((v1 + 1) & 0x03)
        } else {
            Some(v1)
        }
    }

    pub fn is_long_header(&self) -> bool {
        !matches!(self, PacketType::OneRtt)
    }

    /// Mask for the flag bits covered by header protection.
    pub fn protected_flags_mask(&self) -> u8 {
        if self.is_long_header() {
            0x0f
        } else {
            0x1f
        }
    }

    /// Encryption level protecting this packet. Retry packets are not protected.
    pub fn level(&self) -> Option<EncryptionLevel> {
        match self {
            PacketType::Initial => Some(EncryptionLevel::Initial),
            PacketType::ZeroRtt => Some(EncryptionLevel::ZeroRtt),
            PacketType::Handshake => Some(EncryptionLevel::Handshake),
            PacketType::OneRtt => Some(EncryptionLevel::OneRtt),
            PacketType::Retry => None,
        }
    }
}

impl fmt::Display for PacketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Packet number space and key set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EncryptionLevel {
    Initial,
    Handshake,
    ZeroRtt,
    OneRtt,
}

impl EncryptionLevel {
    pub const ALL: [EncryptionLevel; 4] = [
        EncryptionLevel::Initial,
        EncryptionLevel::Handshake,
        EncryptionLevel::ZeroRtt,
        EncryptionLevel::OneRtt,
    ];

    pub(crate) fn index(&self) -> usize {
        match self {
            EncryptionLevel::Initial => 0,
            EncryptionLevel::Handshake => 1,
            EncryptionLevel::ZeroRtt => 2,
            EncryptionLevel::OneRtt => 3,
        }
    }
}
