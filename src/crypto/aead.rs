//! AEAD record formatting types and constants.
//!
//! Nonce and additional-data construction for TLS 1.2/DTLS 1.2 (explicit nonce and
//! XOR-nonce families) and TLS 1.3. QUIC builds its nonce with [`Nonce::xor`] too.

use arrayvec::ArrayVec;

use crate::types::{ContentType, ProtocolVersion};

/// Explicit nonce length for GCM/CCM records in TLS 1.2 and DTLS 1.2.
pub const EXPLICIT_NONCE_LEN: usize = 8;

/// Implicit salt length for GCM/CCM records.
pub const GCM_SALT_LEN: usize = 4;

/// Authentication tag length for every supported AEAD.
pub const AEAD_TAG_LEN: usize = 16;

/// Length of the full AEAD nonce.
pub const NONCE_LEN: usize = 12;

/// Full AEAD nonce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Nonce(pub [u8; NONCE_LEN]);

impl Nonce {
    /// Combine a 4-byte salt and an 8-byte explicit nonce (GCM/CCM, RFC 5288).
    pub fn new(salt: &[u8; GCM_SALT_LEN], explicit_nonce: &[u8; EXPLICIT_NONCE_LEN]) -> Self {
        let mut nonce = [0u8; NONCE_LEN];
        nonce[..4].copy_from_slice(salt);
        nonce[4..].copy_from_slice(explicit_nonce);
        Self(nonce)
    }

    /// XOR the IV with the sequence number left-padded to 12 bytes.
    ///
    /// RFC 7905 (ChaCha20-Poly1305 in TLS 1.2), RFC 8446 §5.3 and RFC 9001 §5.3.
    pub fn xor(iv: &[u8; NONCE_LEN], seq: u64) -> Self {
        let mut nonce = *iv;
        for (n, s) in nonce[4..].iter_mut().zip(seq.to_be_bytes()) {
            *n ^= s;
        }
        Self(nonce)
    }

    /// Build from an arbitrary slice, as produced by an overridden nonce field.
    ///
    /// Short input is right-aligned, long input keeps the trailing 12 bytes.
    pub fn from_slice_lossy(data: &[u8]) -> Self {
        let mut nonce = [0u8; NONCE_LEN];
        let n = data.len().min(NONCE_LEN);
        nonce[NONCE_LEN - n..].copy_from_slice(&data[data.len() - n..]);
        Self(nonce)
    }
}

impl AsRef<[u8]> for Nonce {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Additional authenticated data for a record.
///
/// 13 bytes for TLS 1.2/DTLS 1.2, 5 bytes (the record header) for TLS 1.3.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Aad(pub ArrayVec<u8, 13>);

impl Aad {
    /// `seq(8) ‖ type ‖ version ‖ length`.
    ///
    /// `seq` is the 64-bit value from [`Sequence::as_u64`][crate::types::Sequence::as_u64],
    /// which already carries the DTLS epoch.
    pub fn new_tls12(
        seq: u64,
        content_type: ContentType,
        version: ProtocolVersion,
        len: u16,
    ) -> Self {
        let mut aad = ArrayVec::new();
        aad.extend(seq.to_be_bytes());
        aad.push(content_type.as_u8());
        aad.extend(version.as_bytes());
        aad.extend(len.to_be_bytes());
        Aad(aad)
    }

    /// SSL 3.0 MAC prefix: `seq(8) ‖ type ‖ length`, without the version.
    pub fn new_ssl3(seq: u64, content_type: ContentType, len: u16) -> Self {
        let mut aad = ArrayVec::new();
        aad.extend(seq.to_be_bytes());
        aad.push(content_type.as_u8());
        aad.extend(len.to_be_bytes());
        Aad(aad)
    }

    /// The TLS 1.3 record header: `type ‖ legacy_version ‖ length`.
    pub fn new_tls13(content_type: ContentType, version: ProtocolVersion, len: u16) -> Self {
        let mut aad = ArrayVec::new();
        aad.push(content_type.as_u8());
        aad.extend(version.as_bytes());
        aad.extend(len.to_be_bytes());
        Aad(aad)
    }

    /// Wrap raw bytes, as produced by an overridden field. Capped at 13 bytes.
    pub fn from_slice_lossy(data: &[u8]) -> Self {
        let mut aad = ArrayVec::new();
        aad.extend(data.iter().copied().take(13));
        Aad(aad)
    }
}

impl AsRef<[u8]> for Aad {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}
