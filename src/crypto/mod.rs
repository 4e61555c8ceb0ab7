//! Cryptographic seams used by the record and QUIC engines.
//!
//! The engines only see the small traits in this module. [`BulkCipher`] and
//! [`MacAlgorithm`] pick the RustCrypto implementation for a given algorithm id.

use std::fmt::Debug;

use crate::buffer::Buf;
use crate::types::ProtocolVersion;
use crate::Error;

mod aead;
mod rust_crypto;

pub use aead::{Aad, Nonce, AEAD_TAG_LEN, EXPLICIT_NONCE_LEN, GCM_SALT_LEN, NONCE_LEN};
pub use rust_crypto::{AesHeaderProtection, ChaChaHeaderProtection};

/// Marker for types that can be held by a connection context.
pub trait CryptoSafe: Send + Sync + Debug {}

impl<T: Send + Sync + Debug> CryptoSafe for T {}

/// AEAD cipher.
pub trait Cipher: CryptoSafe {
    /// Encrypt in place and append the tag.
    fn encrypt(&mut self, plaintext: &mut Buf, aad: &[u8], nonce: Nonce) -> Result<(), String>;

    /// Verify and strip the tag, decrypting in place.
    ///
    /// On failure the buffer content is unspecified.
    fn decrypt(&mut self, ciphertext: &mut Buf, aad: &[u8], nonce: Nonce) -> Result<(), String>;
}

/// Raw block cipher for CBC record protection.
pub trait BlockCipher: CryptoSafe {
    fn block_size(&self) -> usize;

    fn encrypt_block(&self, block: &mut [u8]);

    fn decrypt_block(&self, block: &mut [u8]);
}

/// Keystream of a stream cipher. The state carries over from one record to the next.
pub trait KeyStream: CryptoSafe {
    /// XOR the next `data.len()` keystream bytes into `data`.
    fn apply_keystream(&mut self, data: &mut [u8]);
}

/// QUIC header protection (RFC 9001 §5.4).
pub trait HeaderProtection: CryptoSafe {
    /// Compute a 5-byte mask from a 16-byte sample.
    ///
    /// - `mask[0]` is XORed with the first byte of the packet header
    ///   (lower 4 bits for long headers, lower 5 bits for short headers)
    /// - `mask[1..5]` are XORed with the packet number bytes
    fn mask(&self, sample: &[u8; 16]) -> [u8; 5];
}

/// CBC-encrypt `data` in place. `data.len()` must be a multiple of the block size.
///
/// Returns the last ciphertext block, which is the chained IV for the next record.
pub fn cbc_encrypt(cipher: &dyn BlockCipher, iv: &[u8], data: &mut [u8]) -> Vec<u8> {
    let bs = cipher.block_size();
    let mut prev = iv.to_vec();
    for block in data.chunks_exact_mut(bs) {
        for (b, p) in block.iter_mut().zip(&prev) {
            *b ^= *p;
        }
        cipher.encrypt_block(block);
        prev.copy_from_slice(block);
    }
    prev
}

/// CBC-decrypt `data` in place. `data.len()` must be a multiple of the block size.
pub fn cbc_decrypt(cipher: &dyn BlockCipher, iv: &[u8], data: &mut [u8]) {
    let bs = cipher.block_size();
    let mut prev = iv.to_vec();
    let mut current = vec![0u8; bs];
    for block in data.chunks_exact_mut(bs) {
        current.copy_from_slice(block);
        cipher.decrypt_block(block);
        for (b, p) in block.iter_mut().zip(&prev) {
            *b ^= *p;
        }
        std::mem::swap(&mut prev, &mut current);
    }
}

/// Bulk encryption algorithm of a cipher suite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BulkCipher {
    Null,
    Rc4_128,
    Aes128Cbc,
    Aes256Cbc,
    Aes128Gcm,
    Aes256Gcm,
    ChaCha20Poly1305,
}

impl BulkCipher {
    pub fn key_len(&self) -> usize {
        match self {
            BulkCipher::Null => 0,
            BulkCipher::Rc4_128 | BulkCipher::Aes128Cbc | BulkCipher::Aes128Gcm => 16,
            BulkCipher::Aes256Cbc | BulkCipher::Aes256Gcm | BulkCipher::ChaCha20Poly1305 => 32,
        }
    }

    pub fn is_aead(&self) -> bool {
        matches!(
            self,
            BulkCipher::Aes128Gcm | BulkCipher::Aes256Gcm | BulkCipher::ChaCha20Poly1305
        )
    }

    pub fn is_block(&self) -> bool {
        matches!(self, BulkCipher::Aes128Cbc | BulkCipher::Aes256Cbc)
    }

    pub fn is_stream(&self) -> bool {
        matches!(self, BulkCipher::Rc4_128)
    }

    /// Block size, or 0 for non-block ciphers.
    pub fn block_size(&self) -> usize {
        if self.is_block() {
            16
        } else {
            0
        }
    }

    /// Implicit IV length carried in the key block for TLS 1.2 style records.
    pub fn fixed_iv_len(&self) -> usize {
        match self {
            BulkCipher::Null | BulkCipher::Rc4_128 => 0,
            BulkCipher::Aes128Cbc | BulkCipher::Aes256Cbc => 16,
            BulkCipher::Aes128Gcm | BulkCipher::Aes256Gcm => GCM_SALT_LEN,
            BulkCipher::ChaCha20Poly1305 => NONCE_LEN,
        }
    }

    /// Whether the TLS 1.2 record carries an explicit nonce (RFC 5288).
    pub fn has_explicit_nonce(&self) -> bool {
        matches!(self, BulkCipher::Aes128Gcm | BulkCipher::Aes256Gcm)
    }

    pub fn create_cipher(&self, key: &[u8]) -> Result<Box<dyn Cipher>, Error> {
        self.check_key(key)?;
        match self {
            BulkCipher::Aes128Gcm | BulkCipher::Aes256Gcm => {
                Ok(Box::new(rust_crypto::AesGcm::new(key).map_err(Error::Crypto)?))
            }
            BulkCipher::ChaCha20Poly1305 => Ok(Box::new(
                rust_crypto::ChaCha20Poly1305Cipher::new(key).map_err(Error::Crypto)?,
            )),
            _ => Err(Error::Crypto(format!("{:?} is not an AEAD", self))),
        }
    }

    pub fn create_block_cipher(&self, key: &[u8]) -> Result<Box<dyn BlockCipher>, Error> {
        self.check_key(key)?;
        match self {
            BulkCipher::Aes128Cbc | BulkCipher::Aes256Cbc => {
                Ok(Box::new(rust_crypto::AesBlock::new(key).map_err(Error::Crypto)?))
            }
            _ => Err(Error::Crypto(format!("{:?} is not a block cipher", self))),
        }
    }

    pub fn create_stream_cipher(&self, key: &[u8]) -> Result<Box<dyn KeyStream>, Error> {
        self.check_key(key)?;
        match self {
            BulkCipher::Rc4_128 => Ok(Box::new(
                rust_crypto::Rc4Stream::new(key).map_err(Error::Crypto)?,
            )),
            _ => Err(Error::Crypto(format!("{:?} is not a stream cipher", self))),
        }
    }

    /// QUIC header protection matching this AEAD.
    pub fn create_header_protection(
        &self,
        hp_key: &[u8],
    ) -> Result<Box<dyn HeaderProtection>, Error> {
        self.check_key(hp_key)?;
        match self {
            BulkCipher::Aes128Gcm | BulkCipher::Aes256Gcm => Ok(Box::new(
                AesHeaderProtection::new(hp_key).map_err(Error::Crypto)?,
            )),
            BulkCipher::ChaCha20Poly1305 => Ok(Box::new(
                ChaChaHeaderProtection::new(hp_key).map_err(Error::Crypto)?,
            )),
            _ => Err(Error::Crypto(format!(
                "{:?} has no header protection",
                self
            ))),
        }
    }

    fn check_key(&self, key: &[u8]) -> Result<(), Error> {
        if key.len() != self.key_len() {
            return Err(Error::InvalidKeyLength {
                what: "cipher key",
                expected: self.key_len(),
                actual: key.len(),
            });
        }
        Ok(())
    }
}

/// MAC algorithm of a cipher suite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MacAlgorithm {
    /// AEAD suites and the null suite.
    Null,
    HmacMd5,
    HmacSha1,
    HmacSha256,
    HmacSha384,
    /// SSL 3.0 MAC (RFC 6101 §5.2.3.1) over MD5.
    SslMacMd5,
    /// SSL 3.0 MAC over SHA-1.
    SslMacSha1,
}

impl MacAlgorithm {
    /// Output length, also the MAC key length.
    pub fn size(&self) -> usize {
        match self {
            MacAlgorithm::Null => 0,
            MacAlgorithm::HmacMd5 | MacAlgorithm::SslMacMd5 => 16,
            MacAlgorithm::HmacSha1 | MacAlgorithm::SslMacSha1 => 20,
            MacAlgorithm::HmacSha256 => 32,
            MacAlgorithm::HmacSha384 => 48,
        }
    }

    /// The MAC a suite's hash turns into under `version`.
    ///
    /// SSL 3.0 predates HMAC and uses its own pad1/pad2 construction. Only MD5 and
    /// SHA-1 have one; the other hashes stay HMAC.
    pub fn for_version(self, version: ProtocolVersion) -> Self {
        if !version.is_ssl() {
            return self;
        }
        match self {
            MacAlgorithm::HmacMd5 => MacAlgorithm::SslMacMd5,
            MacAlgorithm::HmacSha1 => MacAlgorithm::SslMacSha1,
            other => other,
        }
    }

    pub fn compute(&self, key: &[u8], data: &[u8]) -> Result<Vec<u8>, Error> {
        rust_crypto::hmac(*self, key, data).map_err(Error::Crypto)
    }
}
