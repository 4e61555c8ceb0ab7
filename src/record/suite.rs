use nom::number::complete::be_u16;
use nom::IResult;

use crate::crypto::{BulkCipher, MacAlgorithm};

/// Cipher suites the record engine can protect, by IANA value.
///
/// Only the record protection half of a suite matters here; key exchange and
/// authentication are handled elsewhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(non_camel_case_types)]
pub enum CipherSuite {
    TLS_NULL_WITH_NULL_NULL, // 0x0000

    // Stream + HMAC
    TLS_RSA_WITH_RC4_128_MD5,       // 0x0004
    TLS_RSA_WITH_RC4_128_SHA,       // 0x0005
    TLS_ECDHE_RSA_WITH_RC4_128_SHA, // 0xC011

    // CBC + HMAC
    TLS_RSA_WITH_AES_128_CBC_SHA,            // 0x002F
    TLS_RSA_WITH_AES_256_CBC_SHA,            // 0x0035
    TLS_RSA_WITH_AES_128_CBC_SHA256,         // 0x003C
    TLS_RSA_WITH_AES_256_CBC_SHA256,         // 0x003D
    TLS_ECDHE_RSA_WITH_AES_128_CBC_SHA,      // 0xC013
    TLS_ECDHE_ECDSA_WITH_AES_256_CBC_SHA384, // 0xC024

    // TLS 1.2 AEAD
    TLS_RSA_WITH_AES_128_GCM_SHA256,               // 0x009C
    TLS_RSA_WITH_AES_256_GCM_SHA384,               // 0x009D
    TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256,       // 0xC02B
    TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384,         // 0xC030
    TLS_ECDHE_RSA_WITH_CHACHA20_POLY1305_SHA256,   // 0xCCA8

    // TLS 1.3
    TLS_AES_128_GCM_SHA256,       // 0x1301
    TLS_AES_256_GCM_SHA384,       // 0x1302
    TLS_CHACHA20_POLY1305_SHA256, // 0x1303

    /// Unknown or unsupported cipher suite by its IANA value
    Unknown(u16),
}

impl Default for CipherSuite {
    fn default() -> Self {
        Self::Unknown(0xffff)
    }
}

impl CipherSuite {
    /// Convert the 16-bit IANA value to a `CipherSuite`.
    pub fn from_u16(value: u16) -> Self {
        match value {
            0x0000 => CipherSuite::TLS_NULL_WITH_NULL_NULL,
            0x0004 => CipherSuite::TLS_RSA_WITH_RC4_128_MD5,
            0x0005 => CipherSuite::TLS_RSA_WITH_RC4_128_SHA,
            0xC011 => CipherSuite::TLS_ECDHE_RSA_WITH_RC4_128_SHA,
            0x002F => CipherSuite::TLS_RSA_WITH_AES_128_CBC_SHA,
            0x0035 => CipherSuite::TLS_RSA_WITH_AES_256_CBC_SHA,
            0x003C => CipherSuite::TLS_RSA_WITH_AES_128_CBC_SHA256,
            0x003D => CipherSuite::TLS_RSA_WITH_AES_256_CBC_SHA256,
            0xC013 => CipherSuite::TLS_ECDHE_RSA_WITH_AES_128_CBC_SHA,
            0xC024 => CipherSuite::TLS_ECDHE_ECDSA_WITH_AES_256_CBC_SHA384,
            0x009C => CipherSuite::TLS_RSA_WITH_AES_128_GCM_SHA256,
            0x009D => CipherSuite::TLS_RSA_WITH_AES_256_GCM_SHA384,
            0xC02B => CipherSuite::TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256,
            0xC030 => CipherSuite::TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384,
            0xCCA8 => CipherSuite::TLS_ECDHE_RSA_WITH_CHACHA20_POLY1305_SHA256,
            0x1301 => CipherSuite::TLS_AES_128_GCM_SHA256,
            0x1302 => CipherSuite::TLS_AES_256_GCM_SHA384,
            0x1303 => CipherSuite::TLS_CHACHA20_POLY1305_SHA256,
            _ => CipherSuite::Unknown(value),
        }
    }

    /// Return the 16-bit IANA value for this cipher suite.
    pub fn as_u16(&self) -> u16 {
        match self {
            CipherSuite::TLS_NULL_WITH_NULL_NULL => 0x0000,
            CipherSuite::TLS_RSA_WITH_RC4_128_MD5 => 0x0004,
            CipherSuite::TLS_RSA_WITH_RC4_128_SHA => 0x0005,
            CipherSuite::TLS_ECDHE_RSA_WITH_RC4_128_SHA => 0xC011,
            CipherSuite::TLS_RSA_WITH_AES_128_CBC_SHA => 0x002F,
            CipherSuite::TLS_RSA_WITH_AES_256_CBC_SHA => 0x0035,
            CipherSuite::TLS_RSA_WITH_AES_128_CBC_SHA256 => 0x003C,
            CipherSuite::TLS_RSA_WITH_AES_256_CBC_SHA256 => 0x003D,
            CipherSuite::TLS_ECDHE_RSA_WITH_AES_128_CBC_SHA => 0xC013,
            CipherSuite::TLS_ECDHE_ECDSA_WITH_AES_256_CBC_SHA384 => 0xC024,
            CipherSuite::TLS_RSA_WITH_AES_128_GCM_SHA256 => 0x009C,
            CipherSuite::TLS_RSA_WITH_AES_256_GCM_SHA384 => 0x009D,
            CipherSuite::TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256 => 0xC02B,
            CipherSuite::TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384 => 0xC030,
            CipherSuite::TLS_ECDHE_RSA_WITH_CHACHA20_POLY1305_SHA256 => 0xCCA8,
            CipherSuite::TLS_AES_128_GCM_SHA256 => 0x1301,
            CipherSuite::TLS_AES_256_GCM_SHA384 => 0x1302,
            CipherSuite::TLS_CHACHA20_POLY1305_SHA256 => 0x1303,
            CipherSuite::Unknown(value) => *value,
        }
    }

    /// Parse a `CipherSuite` from network byte order.
    pub fn parse(input: &[u8]) -> IResult<&[u8], CipherSuite> {
        let (input, value) = be_u16(input)?;
        Ok((input, CipherSuite::from_u16(value)))
    }

    /// Bulk cipher, `None` for unknown suites.
    pub fn bulk_cipher(&self) -> Option<BulkCipher> {
        use CipherSuite::*;
        Some(match self {
            TLS_NULL_WITH_NULL_NULL => BulkCipher::Null,
            TLS_RSA_WITH_RC4_128_MD5
            | TLS_RSA_WITH_RC4_128_SHA
            | TLS_ECDHE_RSA_WITH_RC4_128_SHA => BulkCipher::Rc4_128,
            TLS_RSA_WITH_AES_128_CBC_SHA
            | TLS_RSA_WITH_AES_128_CBC_SHA256
            | TLS_ECDHE_RSA_WITH_AES_128_CBC_SHA => BulkCipher::Aes128Cbc,
            TLS_RSA_WITH_AES_256_CBC_SHA
            | TLS_RSA_WITH_AES_256_CBC_SHA256
            | TLS_ECDHE_ECDSA_WITH_AES_256_CBC_SHA384 => BulkCipher::Aes256Cbc,
            TLS_RSA_WITH_AES_128_GCM_SHA256
            | TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256
            | TLS_AES_128_GCM_SHA256 => BulkCipher::Aes128Gcm,
            TLS_RSA_WITH_AES_256_GCM_SHA384
            | TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384
            | TLS_AES_256_GCM_SHA384 => BulkCipher::Aes256Gcm,
            TLS_ECDHE_RSA_WITH_CHACHA20_POLY1305_SHA256 | TLS_CHACHA20_POLY1305_SHA256 => {
                BulkCipher::ChaCha20Poly1305
            }
            Unknown(_) => return None,
        })
    }

    /// Record MAC. AEAD suites use [`MacAlgorithm::Null`].
    ///
    /// This is the TLS MAC; see [`MacAlgorithm::for_version`] for SSL 3.0.
    pub fn mac_algorithm(&self) -> MacAlgorithm {
        use CipherSuite::*;
        match self {
            TLS_RSA_WITH_RC4_128_MD5 => MacAlgorithm::HmacMd5,
            TLS_RSA_WITH_RC4_128_SHA
            | TLS_ECDHE_RSA_WITH_RC4_128_SHA
            | TLS_RSA_WITH_AES_128_CBC_SHA
            | TLS_RSA_WITH_AES_256_CBC_SHA
            | TLS_ECDHE_RSA_WITH_AES_128_CBC_SHA => MacAlgorithm::HmacSha1,
            TLS_RSA_WITH_AES_128_CBC_SHA256 | TLS_RSA_WITH_AES_256_CBC_SHA256 => {
                MacAlgorithm::HmacSha256
            }
            TLS_ECDHE_ECDSA_WITH_AES_256_CBC_SHA384 => MacAlgorithm::HmacSha384,
            _ => MacAlgorithm::Null,
        }
    }

    /// TLS 1.3 suites only protect TLS 1.3 records.
    pub fn is_tls13(&self) -> bool {
        matches!(
            self,
            CipherSuite::TLS_AES_128_GCM_SHA256
                | CipherSuite::TLS_AES_256_GCM_SHA384
                | CipherSuite::TLS_CHACHA20_POLY1305_SHA256
        )
    }

    /// Returns true if this cipher suite is supported by this implementation.
    pub fn is_supported(&self) -> bool {
        self.bulk_cipher().is_some()
    }

    /// All supported cipher suites.
    pub const fn all() -> &'static [CipherSuite] {
        &[
            CipherSuite::TLS_NULL_WITH_NULL_NULL,
            CipherSuite::TLS_RSA_WITH_RC4_128_MD5,
            CipherSuite::TLS_RSA_WITH_RC4_128_SHA,
            CipherSuite::TLS_ECDHE_RSA_WITH_RC4_128_SHA,
            CipherSuite::TLS_RSA_WITH_AES_128_CBC_SHA,
            CipherSuite::TLS_RSA_WITH_AES_256_CBC_SHA,
            CipherSuite::TLS_RSA_WITH_AES_128_CBC_SHA256,
            CipherSuite::TLS_RSA_WITH_AES_256_CBC_SHA256,
            CipherSuite::TLS_ECDHE_RSA_WITH_AES_128_CBC_SHA,
            CipherSuite::TLS_ECDHE_ECDSA_WITH_AES_256_CBC_SHA384,
            CipherSuite::TLS_RSA_WITH_AES_128_GCM_SHA256,
            CipherSuite::TLS_RSA_WITH_AES_256_GCM_SHA384,
            CipherSuite::TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256,
            CipherSuite::TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384,
            CipherSuite::TLS_ECDHE_RSA_WITH_CHACHA20_POLY1305_SHA256,
            CipherSuite::TLS_AES_128_GCM_SHA256,
            CipherSuite::TLS_AES_256_GCM_SHA384,
            CipherSuite::TLS_CHACHA20_POLY1305_SHA256,
        ]
    }
}
