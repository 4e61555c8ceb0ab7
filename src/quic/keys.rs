use zeroize::Zeroize;

use crate::crypto::{BulkCipher, NONCE_LEN};
use crate::types::ConnectionEnd;
use crate::Error;

use super::EncryptionLevel;

/// Packet protection secrets of one sender at one encryption level.
#[derive(Clone, PartialEq, Eq)]
pub struct QuicKeys {
    pub key: Vec<u8>,
    pub iv: Vec<u8>,
    /// Header protection key.
    pub hp: Vec<u8>,
}

impl QuicKeys {
    pub fn new(key: &[u8], iv: &[u8], hp: &[u8]) -> Self {
        QuicKeys {
            key: key.to_vec(),
            iv: iv.to_vec(),
            hp: hp.to_vec(),
        }
    }

    pub(crate) fn iv_array(&self) -> Result<[u8; NONCE_LEN], Error> {
        self.iv
            .as_slice()
            .try_into()
            .map_err(|_| Error::InvalidKeyLength {
                what: "quic iv",
                expected: NONCE_LEN,
                actual: self.iv.len(),
            })
    }

    fn check(&self, cipher: BulkCipher) -> Result<(), Error> {
        let expected = cipher.key_len();
        for (what, v) in [("quic key", &self.key), ("quic hp key", &self.hp)] {
            if v.len() != expected {
                return Err(Error::InvalidKeyLength {
                    what,
                    expected,
                    actual: v.len(),
                });
            }
        }
        self.iv_array().map(|_| ())
    }
}

impl Drop for QuicKeys {
    fn drop(&mut self) {
        self.key.zeroize();
        self.iv.zeroize();
        self.hp.zeroize();
    }
}

impl std::fmt::Debug for QuicKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuicKeys")
            .field("key_len", &self.key.len())
            .finish()
    }
}

/// Both directions of one encryption level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuicKeySet {
    cipher: BulkCipher,
    client: QuicKeys,
    server: QuicKeys,
}

impl QuicKeySet {
    /// Validate and bundle the keys. `cipher` must be an AEAD.
    pub fn new(cipher: BulkCipher, client: QuicKeys, server: QuicKeys) -> Result<Self, Error> {
        if !cipher.is_aead() {
            return Err(Error::Crypto(format!("{:?} cannot protect QUIC packets", cipher)));
        }
        client.check(cipher)?;
        server.check(cipher)?;
        Ok(QuicKeySet {
            cipher,
            client,
            server,
        })
    }

    pub fn cipher(&self) -> BulkCipher {
        self.cipher
    }

    /// Keys of the endpoint that sends with them.
    pub fn keys(&self, sender: ConnectionEnd) -> &QuicKeys {
        match sender {
            ConnectionEnd::Client => &self.client,
            ConnectionEnd::Server => &self.server,
        }
    }
}

#[derive(Debug, Default)]
struct LevelState {
    keys: Option<QuicKeySet>,
    largest_received: Option<u64>,
    largest_acked: Option<u64>,
    next_packet_number: u64,
}

/// Per-connection QUIC state: keys and packet number bookkeeping for every encryption
/// level. Levels never share state.
#[derive(Debug, Default)]
pub struct QuicContext {
    levels: [LevelState; 4],
}

impl QuicContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn install_keys(&mut self, level: EncryptionLevel, keys: QuicKeySet) {
        debug!("Installed {:?} keys for {:?}", keys.cipher(), level);
        self.levels[level.index()].keys = Some(keys);
    }

    /// Drop the keys of a level. Packet number state is kept.
    pub fn discard_keys(&mut self, level: EncryptionLevel) {
        debug!("Discarded keys for {:?}", level);
        self.levels[level.index()].keys = None;
    }

    pub fn keys(&self, level: EncryptionLevel) -> Result<&QuicKeySet, Error> {
        self.levels[level.index()]
            .keys
            .as_ref()
            .ok_or(Error::MissingKeys(level))
    }

    pub fn largest_received(&self, level: EncryptionLevel) -> Option<u64> {
        self.levels[level.index()].largest_received
    }

    /// Ratchet the largest received packet number. Only moves forward.
    pub(crate) fn update_largest_received(&mut self, level: EncryptionLevel, pn: u64) {
        let slot = &mut self.levels[level.index()].largest_received;
        if slot.map_or(true, |l| pn > l) {
            trace!("Largest received {:?} -> {}", level, pn);
            *slot = Some(pn);
        }
    }

    pub fn largest_acked(&self, level: EncryptionLevel) -> Option<u64> {
        self.levels[level.index()].largest_acked
    }

    /// Record an acknowledgement from the peer, used to size outgoing packet numbers.
    pub fn on_ack(&mut self, level: EncryptionLevel, largest_acked: u64) {
        let slot = &mut self.levels[level.index()].largest_acked;
        if slot.map_or(true, |l| largest_acked > l) {
            *slot = Some(largest_acked);
        }
    }

    /// Take the next outgoing packet number of a level.
    pub fn next_packet_number(&mut self, level: EncryptionLevel) -> u64 {
        let state = &mut self.levels[level.index()];
        let pn = state.next_packet_number;
        state.next_packet_number += 1;
        pn
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(len: usize) -> QuicKeys {
        QuicKeys::new(&vec![1; len], &[2; 12], &vec![3; len])
    }

    #[test]
    fn key_lengths_checked() {
        assert!(QuicKeySet::new(BulkCipher::Aes128Gcm, keys(16), keys(16)).is_ok());
        let err = QuicKeySet::new(BulkCipher::Aes256Gcm, keys(32), keys(16)).unwrap_err();
        assert!(matches!(err, Error::InvalidKeyLength { what: "quic key", .. }));

        let short_iv = QuicKeys::new(&[1; 16], &[2; 8], &[3; 16]);
        assert!(QuicKeySet::new(BulkCipher::Aes128Gcm, keys(16), short_iv).is_err());
        assert!(QuicKeySet::new(BulkCipher::Aes128Cbc, keys(16), keys(16)).is_err());
    }

    #[test]
    fn levels_are_independent() {
        let mut ctx = QuicContext::new();
        ctx.install_keys(
            EncryptionLevel::Handshake,
            QuicKeySet::new(BulkCipher::Aes128Gcm, keys(16), keys(16)).unwrap(),
        );
        assert!(ctx.keys(EncryptionLevel::Handshake).is_ok());
        assert_eq!(
            ctx.keys(EncryptionLevel::OneRtt).unwrap_err(),
            Error::MissingKeys(EncryptionLevel::OneRtt)
        );

        ctx.update_largest_received(EncryptionLevel::Initial, 7);
        ctx.update_largest_received(EncryptionLevel::Initial, 3);
        assert_eq!(ctx.largest_received(EncryptionLevel::Initial), Some(7));
        assert_eq!(ctx.largest_received(EncryptionLevel::Handshake), None);

        assert_eq!(ctx.next_packet_number(EncryptionLevel::OneRtt), 0);
        assert_eq!(ctx.next_packet_number(EncryptionLevel::OneRtt), 1);
        assert_eq!(ctx.next_packet_number(EncryptionLevel::Initial), 0);
    }
}
