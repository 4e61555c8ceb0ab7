//! Wire-level identifiers shared by the record, fragment and QUIC layers.

use std::cmp::Ordering;
use std::fmt;

use nom::number::complete::{be_u16, be_u8};
use nom::IResult;

// ============================================================================
// Content Type
// ============================================================================

/// TLS/DTLS record content types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentType {
    ChangeCipherSpec,
    Alert,
    Handshake,
    ApplicationData,
    /// RFC 6520.
    Heartbeat,
    /// Anything else. Kept verbatim so malformed peers can be mirrored.
    Unknown(u8),
}

impl Default for ContentType {
    fn default() -> Self {
        Self::Unknown(0)
    }
}

impl ContentType {
    /// Convert a u8 value to a `ContentType`.
    pub fn from_u8(value: u8) -> Self {
        match value {
            20 => ContentType::ChangeCipherSpec,
            21 => ContentType::Alert,
            22 => ContentType::Handshake,
            23 => ContentType::ApplicationData,
            24 => ContentType::Heartbeat,
            _ => ContentType::Unknown(value),
        }
    }

    /// Convert this `ContentType` to its u8 value.
    pub fn as_u8(&self) -> u8 {
        match self {
            ContentType::ChangeCipherSpec => 20,
            ContentType::Alert => 21,
            ContentType::Handshake => 22,
            ContentType::ApplicationData => 23,
            ContentType::Heartbeat => 24,
            ContentType::Unknown(value) => *value,
        }
    }

    /// Parse a `ContentType` from wire format.
    pub fn parse(input: &[u8]) -> IResult<&[u8], ContentType> {
        let (input, byte) = be_u8(input)?;
        Ok((input, Self::from_u8(byte)))
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContentType::Unknown(v) => write!(f, "Unknown({})", v),
            _ => write!(f, "{:?}", self),
        }
    }
}

// ============================================================================
// Protocol Version
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(non_camel_case_types)]
pub enum ProtocolVersion {
    SSL3_0,
    TLS1_0,
    TLS1_1,
    TLS1_2,
    TLS1_3,
    DTLS1_0,
    DTLS1_2,
    Unknown(u16),
}

impl Default for ProtocolVersion {
    fn default() -> Self {
        Self::Unknown(0)
    }
}

impl ProtocolVersion {
    pub fn from_u16(value: u16) -> Self {
        match value {
            0x0300 => ProtocolVersion::SSL3_0,
            0x0301 => ProtocolVersion::TLS1_0,
            0x0302 => ProtocolVersion::TLS1_1,
            0x0303 => ProtocolVersion::TLS1_2,
            0x0304 => ProtocolVersion::TLS1_3,
            0xFEFF => ProtocolVersion::DTLS1_0,
            0xFEFD => ProtocolVersion::DTLS1_2,
            _ => ProtocolVersion::Unknown(value),
        }
    }

    pub fn as_u16(&self) -> u16 {
        match self {
            ProtocolVersion::SSL3_0 => 0x0300,
            ProtocolVersion::TLS1_0 => 0x0301,
            ProtocolVersion::TLS1_1 => 0x0302,
            ProtocolVersion::TLS1_2 => 0x0303,
            ProtocolVersion::TLS1_3 => 0x0304,
            ProtocolVersion::DTLS1_0 => 0xFEFF,
            ProtocolVersion::DTLS1_2 => 0xFEFD,
            ProtocolVersion::Unknown(value) => *value,
        }
    }

    pub fn as_bytes(&self) -> [u8; 2] {
        self.as_u16().to_be_bytes()
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], ProtocolVersion> {
        let (input, version) = be_u16(input)?;
        Ok((input, Self::from_u16(version)))
    }

    /// Whether records of this version carry an explicit epoch and sequence number.
    pub fn is_dtls(&self) -> bool {
        match self {
            ProtocolVersion::DTLS1_0 | ProtocolVersion::DTLS1_2 => true,
            // Unknown values in the DTLS range still use the DTLS header.
            ProtocolVersion::Unknown(v) => *v >= 0xFE00,
            _ => false,
        }
    }

    pub fn is_tls13(&self) -> bool {
        matches!(self, ProtocolVersion::TLS1_3)
    }

    /// SSL 3.0 records: no version in the MAC input, SSL MAC, lenient CBC padding.
    pub fn is_ssl(&self) -> bool {
        matches!(self, ProtocolVersion::SSL3_0)
    }

    /// SSL3 and TLS 1.0 chain the CBC IV across records, everything newer sends it
    /// explicitly in each record.
    pub fn uses_explicit_iv(&self) -> bool {
        !matches!(self, ProtocolVersion::SSL3_0 | ProtocolVersion::TLS1_0)
    }

    /// Version bytes written into a protected record header.
    ///
    /// TLS 1.3 freezes the legacy record version at TLS 1.2.
    pub fn record_version(&self) -> ProtocolVersion {
        match self {
            ProtocolVersion::TLS1_3 => ProtocolVersion::TLS1_2,
            v => *v,
        }
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolVersion::SSL3_0 => write!(f, "SSL 3.0"),
            ProtocolVersion::TLS1_0 => write!(f, "TLS 1.0"),
            ProtocolVersion::TLS1_1 => write!(f, "TLS 1.1"),
            ProtocolVersion::TLS1_2 => write!(f, "TLS 1.2"),
            ProtocolVersion::TLS1_3 => write!(f, "TLS 1.3"),
            ProtocolVersion::DTLS1_0 => write!(f, "DTLS 1.0"),
            ProtocolVersion::DTLS1_2 => write!(f, "DTLS 1.2"),
            ProtocolVersion::Unknown(v) => write!(f, "Unknown(0x{:04x})", v),
        }
    }
}

// ============================================================================
// Sequence Number
// ============================================================================

/// Record sequence number (epoch + sequence).
///
/// For TLS the epoch is always 0 and the sequence is implicit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct Sequence {
    /// The epoch (incremented on key change).
    pub epoch: u16,
    /// The sequence number within the epoch (technically u48 for DTLS).
    pub sequence_number: u64,
}

impl Sequence {
    /// Create a new sequence with the given epoch and sequence number 0.
    pub fn new(epoch: u16) -> Self {
        Self {
            epoch,
            sequence_number: 0,
        }
    }

    pub fn with_number(epoch: u16, sequence_number: u64) -> Self {
        Self {
            epoch,
            sequence_number,
        }
    }

    /// The 64-bit value used in MAC input, AAD and nonces.
    ///
    /// DTLS puts the epoch in the top 16 bits of the 48-bit sequence number.
    pub fn as_u64(&self, dtls: bool) -> u64 {
        if dtls {
            ((self.epoch as u64) << 48) | (self.sequence_number & 0xffff_ffff_ffff)
        } else {
            self.sequence_number
        }
    }
}

impl fmt::Display for Sequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[epoch: {}, sequence_number: {}]",
            self.epoch, self.sequence_number,
        )
    }
}

impl Ord for Sequence {
    fn cmp(&self, other: &Self) -> Ordering {
        self.epoch
            .cmp(&other.epoch)
            .then(self.sequence_number.cmp(&other.sequence_number))
    }
}

impl PartialOrd for Sequence {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// ============================================================================
// Connection End
// ============================================================================

/// Which endpoint produced (or will produce) a record or packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionEnd {
    Client,
    Server,
}

impl ConnectionEnd {
    /// The other endpoint.
    pub fn peer(&self) -> ConnectionEnd {
        match self {
            ConnectionEnd::Client => ConnectionEnd::Server,
            ConnectionEnd::Server => ConnectionEnd::Client,
        }
    }
}

// ============================================================================
// Handshake Type
// ============================================================================

/// Handshake message type carried in the DTLS fragment header.
///
/// Only the value is interpreted here; message bodies are opaque.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandshakeType {
    HelloRequest,
    ClientHello,
    ServerHello,
    HelloVerifyRequest,
    NewSessionTicket,
    EndOfEarlyData,
    EncryptedExtensions,
    Certificate,
    ServerKeyExchange,
    CertificateRequest,
    ServerHelloDone,
    CertificateVerify,
    ClientKeyExchange,
    Finished,
    KeyUpdate,
    Unknown(u8),
}

impl Default for HandshakeType {
    fn default() -> Self {
        Self::Unknown(0)
    }
}

impl HandshakeType {
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => HandshakeType::HelloRequest,
            1 => HandshakeType::ClientHello,
            2 => HandshakeType::ServerHello,
            3 => HandshakeType::HelloVerifyRequest,
            4 => HandshakeType::NewSessionTicket,
            5 => HandshakeType::EndOfEarlyData,
            8 => HandshakeType::EncryptedExtensions,
            11 => HandshakeType::Certificate,
            12 => HandshakeType::ServerKeyExchange,
            13 => HandshakeType::CertificateRequest,
            14 => HandshakeType::ServerHelloDone,
            15 => HandshakeType::CertificateVerify,
            16 => HandshakeType::ClientKeyExchange,
            20 => HandshakeType::Finished,
            24 => HandshakeType::KeyUpdate,
            _ => HandshakeType::Unknown(value),
        }
    }

    pub fn as_u8(&self) -> u8 {
        match self {
            HandshakeType::HelloRequest => 0,
            HandshakeType::ClientHello => 1,
            HandshakeType::ServerHello => 2,
            HandshakeType::HelloVerifyRequest => 3,
            HandshakeType::NewSessionTicket => 4,
            HandshakeType::EndOfEarlyData => 5,
            HandshakeType::EncryptedExtensions => 8,
            HandshakeType::Certificate => 11,
            HandshakeType::ServerKeyExchange => 12,
            HandshakeType::CertificateRequest => 13,
            HandshakeType::ServerHelloDone => 14,
            HandshakeType::CertificateVerify => 15,
            HandshakeType::ClientKeyExchange => 16,
            HandshakeType::Finished => 20,
            HandshakeType::KeyUpdate => 24,
            HandshakeType::Unknown(value) => *value,
        }
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], HandshakeType> {
        let (input, value) = be_u8(input)?;
        Ok((input, Self::from_u8(value)))
    }
}
