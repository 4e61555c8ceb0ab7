//! Cipher implementations using RustCrypto.
use aes::cipher::{BlockDecrypt, BlockEncrypt};
use aes::{Aes128, Aes256, Block};
use aes_gcm::aead::generic_array::GenericArray;
use aes_gcm::aead::{AeadInPlace, KeyInit};
use aes_gcm::{Aes128Gcm, Aes256Gcm};
use chacha20::cipher::consts::U16;
use chacha20::cipher::{KeyIvInit, StreamCipher, StreamCipherSeek};
use chacha20poly1305::ChaCha20Poly1305;
use hmac::{Hmac, Mac};
use md5::Md5;
use rc4::Rc4;
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha384};
use zeroize::Zeroize;

use super::{
    BlockCipher, Cipher, HeaderProtection, KeyStream, MacAlgorithm, Nonce, AEAD_TAG_LEN,
};
use crate::buffer::Buf;

/// AES-GCM cipher implementation using RustCrypto.
pub(super) enum AesGcm {
    Aes128(Box<Aes128Gcm>),
    Aes256(Box<Aes256Gcm>),
}

impl std::fmt::Debug for AesGcm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AesGcm::Aes128(_) => f.debug_tuple("AesGcm::Aes128").finish(),
            AesGcm::Aes256(_) => f.debug_tuple("AesGcm::Aes256").finish(),
        }
    }
}

impl AesGcm {
    pub(super) fn new(key: &[u8]) -> Result<Self, String> {
        match key.len() {
            16 => Aes128Gcm::new_from_slice(key)
                .map(|c| AesGcm::Aes128(Box::new(c)))
                .map_err(|_| "Invalid AES-128-GCM key".to_string()),
            32 => Aes256Gcm::new_from_slice(key)
                .map(|c| AesGcm::Aes256(Box::new(c)))
                .map_err(|_| "Invalid AES-256-GCM key".to_string()),
            _ => Err(format!("Invalid key size for AES-GCM: {}", key.len())),
        }
    }
}

impl Cipher for AesGcm {
    fn encrypt(&mut self, data: &mut Buf, aad: &[u8], nonce: Nonce) -> Result<(), String> {
        let nonce = GenericArray::from_slice(&nonce.0);
        match self {
            AesGcm::Aes128(cipher) => cipher.encrypt_in_place(nonce, aad, data),
            AesGcm::Aes256(cipher) => cipher.encrypt_in_place(nonce, aad, data),
        }
        .map_err(|_| "AES-GCM encryption failed".to_string())
    }

    fn decrypt(&mut self, data: &mut Buf, aad: &[u8], nonce: Nonce) -> Result<(), String> {
        if data.len() < AEAD_TAG_LEN {
            return Err(format!("Ciphertext too short: {}", data.len()));
        }

        let nonce = GenericArray::from_slice(&nonce.0);
        // decrypt_in_place removes the tag and shortens the buffer
        match self {
            AesGcm::Aes128(cipher) => cipher.decrypt_in_place(nonce, aad, data),
            AesGcm::Aes256(cipher) => cipher.decrypt_in_place(nonce, aad, data),
        }
        .map_err(|_| "AES-GCM decryption failed".to_string())
    }
}

/// ChaCha20-Poly1305 (RFC 8439).
pub(super) struct ChaCha20Poly1305Cipher {
    cipher: Box<ChaCha20Poly1305>,
}

impl std::fmt::Debug for ChaCha20Poly1305Cipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChaCha20Poly1305Cipher").finish()
    }
}

impl ChaCha20Poly1305Cipher {
    pub(super) fn new(key: &[u8]) -> Result<Self, String> {
        let cipher = ChaCha20Poly1305::new_from_slice(key)
            .map_err(|_| format!("Invalid key size for ChaCha20-Poly1305: {}", key.len()))?;
        Ok(Self {
            cipher: Box::new(cipher),
        })
    }
}

impl Cipher for ChaCha20Poly1305Cipher {
    fn encrypt(&mut self, data: &mut Buf, aad: &[u8], nonce: Nonce) -> Result<(), String> {
        let nonce = chacha20poly1305::Nonce::from_slice(&nonce.0);
        self.cipher
            .encrypt_in_place(nonce, aad, data)
            .map_err(|_| "ChaCha20-Poly1305 encryption failed".to_string())
    }

    fn decrypt(&mut self, data: &mut Buf, aad: &[u8], nonce: Nonce) -> Result<(), String> {
        if data.len() < AEAD_TAG_LEN {
            return Err(format!("Ciphertext too short: {}", data.len()));
        }

        let nonce = chacha20poly1305::Nonce::from_slice(&nonce.0);
        self.cipher
            .decrypt_in_place(nonce, aad, data)
            .map_err(|_| "ChaCha20-Poly1305 decryption failed".to_string())
    }
}

/// AES block primitive for CBC records.
pub(super) enum AesBlock {
    Aes128(Box<Aes128>),
    Aes256(Box<Aes256>),
}

impl std::fmt::Debug for AesBlock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AesBlock::Aes128(_) => f.debug_tuple("AesBlock::Aes128").finish(),
            AesBlock::Aes256(_) => f.debug_tuple("AesBlock::Aes256").finish(),
        }
    }
}

impl AesBlock {
    pub(super) fn new(key: &[u8]) -> Result<Self, String> {
        match key.len() {
            16 => Aes128::new_from_slice(key)
                .map(|c| AesBlock::Aes128(Box::new(c)))
                .map_err(|_| "Invalid AES-128 key".to_string()),
            32 => Aes256::new_from_slice(key)
                .map(|c| AesBlock::Aes256(Box::new(c)))
                .map_err(|_| "Invalid AES-256 key".to_string()),
            _ => Err(format!("Invalid key size for AES: {}", key.len())),
        }
    }
}

impl BlockCipher for AesBlock {
    fn block_size(&self) -> usize {
        16
    }

    fn encrypt_block(&self, block: &mut [u8]) {
        let block = Block::from_mut_slice(block);
        match self {
            AesBlock::Aes128(c) => c.encrypt_block(block),
            AesBlock::Aes256(c) => c.encrypt_block(block),
        }
    }

    fn decrypt_block(&self, block: &mut [u8]) {
        let block = Block::from_mut_slice(block);
        match self {
            AesBlock::Aes128(c) => c.decrypt_block(block),
            AesBlock::Aes256(c) => c.decrypt_block(block),
        }
    }
}

/// RC4 with a 128-bit key.
pub(super) struct Rc4Stream {
    cipher: Box<Rc4<U16>>,
}

impl std::fmt::Debug for Rc4Stream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rc4Stream").finish()
    }
}

impl Rc4Stream {
    pub(super) fn new(key: &[u8]) -> Result<Self, String> {
        let cipher = Rc4::<U16>::new_from_slice(key)
            .map_err(|_| format!("Invalid key size for RC4: {}", key.len()))?;
        Ok(Self {
            cipher: Box::new(cipher),
        })
    }
}

impl KeyStream for Rc4Stream {
    fn apply_keystream(&mut self, data: &mut [u8]) {
        self.cipher.apply_keystream(data);
    }
}

/// AES-ECB header protection (RFC 9001 §5.4.3).
#[derive(Debug)]
pub struct AesHeaderProtection {
    cipher: AesBlock,
}

impl AesHeaderProtection {
    pub fn new(hp_key: &[u8]) -> Result<Self, String> {
        Ok(Self {
            cipher: AesBlock::new(hp_key)?,
        })
    }
}

impl HeaderProtection for AesHeaderProtection {
    fn mask(&self, sample: &[u8; 16]) -> [u8; 5] {
        let mut block = *sample;
        self.cipher.encrypt_block(&mut block);
        let mut mask = [0u8; 5];
        mask.copy_from_slice(&block[..5]);
        mask
    }
}

/// ChaCha20 header protection (RFC 9001 §5.4.4).
pub struct ChaChaHeaderProtection {
    key: [u8; 32],
}

impl std::fmt::Debug for ChaChaHeaderProtection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChaChaHeaderProtection").finish()
    }
}

impl ChaChaHeaderProtection {
    pub fn new(hp_key: &[u8]) -> Result<Self, String> {
        let key: [u8; 32] = hp_key
            .try_into()
            .map_err(|_| format!("Invalid key size for ChaCha20: {}", hp_key.len()))?;
        Ok(Self { key })
    }
}

impl Drop for ChaChaHeaderProtection {
    fn drop(&mut self) {
        self.key.zeroize();
    }
}

impl HeaderProtection for ChaChaHeaderProtection {
    fn mask(&self, sample: &[u8; 16]) -> [u8; 5] {
        let counter = u32::from_le_bytes([sample[0], sample[1], sample[2], sample[3]]);
        let mut nonce = [0u8; 12];
        nonce.copy_from_slice(&sample[4..16]);

        // The keystream starts at block `counter`.
        let mut cipher = chacha20::ChaCha20::new((&self.key).into(), (&nonce).into());
        cipher.seek(counter as u64 * 64);

        let mut mask = [0u8; 5];
        cipher.apply_keystream(&mut mask);
        mask
    }
}

pub(super) fn hmac(alg: MacAlgorithm, key: &[u8], data: &[u8]) -> Result<Vec<u8>, String> {
    fn run<M: Mac + KeyInit>(key: &[u8], data: &[u8]) -> Result<Vec<u8>, String> {
        let mut mac =
            <M as KeyInit>::new_from_slice(key).map_err(|_| "Invalid HMAC key".to_string())?;
        mac.update(data);
        Ok(mac.finalize().into_bytes().to_vec())
    }

    match alg {
        MacAlgorithm::Null => Ok(Vec::new()),
        MacAlgorithm::HmacMd5 => run::<Hmac<Md5>>(key, data),
        MacAlgorithm::HmacSha1 => run::<Hmac<Sha1>>(key, data),
        MacAlgorithm::HmacSha256 => run::<Hmac<Sha256>>(key, data),
        MacAlgorithm::HmacSha384 => run::<Hmac<Sha384>>(key, data),
        MacAlgorithm::SslMacMd5 | MacAlgorithm::SslMacSha1 => Ok(ssl_mac(alg, key, data)),
    }
}

/// `hash(secret ‖ pad2 ‖ hash(secret ‖ pad1 ‖ data))` with 0x36/0x5c pads of 48 bytes
/// for MD5 and 40 for SHA-1.
pub(super) fn ssl_mac(alg: MacAlgorithm, secret: &[u8], data: &[u8]) -> Vec<u8> {
    fn run<D: Digest>(secret: &[u8], pad_len: usize, data: &[u8]) -> Vec<u8> {
        let inner = D::new()
            .chain_update(secret)
            .chain_update(vec![0x36; pad_len])
            .chain_update(data)
            .finalize();
        D::new()
            .chain_update(secret)
            .chain_update(vec![0x5c; pad_len])
            .chain_update(inner)
            .finalize()
            .to_vec()
    }

    match alg {
        MacAlgorithm::SslMacMd5 => run::<Md5>(secret, 48, data),
        _ => run::<Sha1>(secret, 40, data),
    }
}
