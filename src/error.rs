use thiserror::Error;

use crate::quic::{EncryptionLevel, PacketType};

/// Errors surfaced by the protection and reassembly engines.
///
/// Authentication failures on records are *not* errors; they are reported through the
/// validity flags of [`RecordCryptoComputations`][crate::record::RecordCryptoComputations].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum Error {
    /// Input ended before the declared structure was complete.
    #[error("Parse incomplete")]
    ParseIncomplete,

    /// Input did not match the expected wire format.
    #[error("Parse error: {0:?}")]
    Parse(nom::error::ErrorKind),

    /// A negative length was handed to an operation that requires a length.
    #[error("Negative length: {0}")]
    NegativeLength(i64),

    /// A length does not fit the wire field that carries it.
    #[error("{what} length {len} exceeds {max}")]
    LengthOverflow {
        what: &'static str,
        len: usize,
        max: usize,
    },

    /// Fragments must carry at least one byte of content per fragment.
    #[error("Invalid max fragment length: {0}")]
    InvalidFragmentLength(usize),

    #[error("Unsupported cipher suite: 0x{0:04x}")]
    UnsupportedCipherSuite(u16),

    #[error("Unsupported protocol version: 0x{0:04x}")]
    UnsupportedVersion(u16),

    /// Key material does not have the size the algorithm needs.
    #[error("Invalid {what} length: expected {expected}, got {actual}")]
    InvalidKeyLength {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    /// A field that must be computed or set before this step is empty.
    #[error("Missing field: {0}")]
    MissingField(&'static str),

    #[error("Unknown field: {0}")]
    UnknownField(String),

    #[error("Modification does not match the type of field {0}")]
    FieldTypeMismatch(String),

    /// No keys are installed for the requested QUIC encryption level.
    #[error("No keys for {0:?}")]
    MissingKeys(EncryptionLevel),

    /// The QUIC packet is too short to carry a header protection sample.
    #[error("Packet too short for header protection sample: {0} bytes")]
    PacketTooShort(usize),

    /// QUIC payload authentication failed. The packet must be discarded.
    #[error("Decryption failed for {0:?} packet")]
    QuicDecryption(PacketType),

    /// The packet type carries no packet protection (Retry).
    #[error("{0:?} packets are not protected")]
    NotProtected(PacketType),

    /// The operation applies to a different packet type.
    #[error("Unexpected {0:?} packet")]
    UnexpectedPacketType(PacketType),

    /// No Retry integrity key is defined for this QUIC version.
    #[error("Unsupported QUIC version: 0x{0:08x}")]
    UnsupportedQuicVersion(u32),

    #[error("Retry integrity tag mismatch")]
    RetryIntegrity,

    #[error("Value out of varint range: {0}")]
    VarintOutOfRange(u64),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Crypto error: {0}")]
    Crypto(String),
}

impl<'a> From<nom::Err<nom::error::Error<&'a [u8]>>> for Error {
    fn from(value: nom::Err<nom::error::Error<&'a [u8]>>) -> Self {
        match value {
            nom::Err::Incomplete(_) => Error::ParseIncomplete,
            nom::Err::Error(x) | nom::Err::Failure(x) => match x.code {
                nom::error::ErrorKind::Eof => Error::ParseIncomplete,
                kind => Error::Parse(kind),
            },
        }
    }
}
