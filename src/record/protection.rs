use crate::buffer::Buf;
use crate::config::Config;
use crate::crypto::{
    cbc_decrypt, cbc_encrypt, Aad, BlockCipher, BulkCipher, Cipher, KeyStream, MacAlgorithm,
    Nonce, AEAD_TAG_LEN, EXPLICIT_NONCE_LEN, NONCE_LEN,
};
use crate::rng::SeededRng;
use crate::types::{ConnectionEnd, ContentType, ProtocolVersion, Sequence};
use crate::Error;

use super::{CipherSuite, KeySet, Record};

/// Largest total CBC padding expressible with the one-byte padding length.
const MAX_PADDING: usize = 256;

/// The record length field is 16 bits.
const MAX_RECORD_LENGTH: usize = u16::MAX as usize;

/// Record protection for one connection and epoch.
///
/// `local` is the endpoint running this code: records are protected with its write keys
/// and unprotected with the peer's.
pub struct RecordProtection {
    version: ProtocolVersion,
    suite: CipherSuite,
    local: ConnectionEnd,
    keys: KeySet,
    encrypt_then_mac: bool,
    additional_padding: u8,
    rng: SeededRng,
    cipher: RecordCipher,
}

enum RecordCipher {
    Null,
    Stream {
        mac: MacAlgorithm,
        write: Box<dyn KeyStream>,
        read: Box<dyn KeyStream>,
    },
    Block {
        mac: MacAlgorithm,
        write: Box<dyn BlockCipher>,
        read: Box<dyn BlockCipher>,
        // Chained IVs for SSL3/TLS 1.0.
        write_iv: Vec<u8>,
        read_iv: Vec<u8>,
    },
    Aead {
        bulk: BulkCipher,
        write: Box<dyn Cipher>,
        read: Box<dyn Cipher>,
    },
}

impl RecordProtection {
    /// Set up protection for `suite`. Fails when key sizes do not match the suite.
    pub fn new(
        config: &Config,
        version: ProtocolVersion,
        suite: CipherSuite,
        local: ConnectionEnd,
        keys: KeySet,
    ) -> Result<Self, Error> {
        let bulk = suite
            .bulk_cipher()
            .ok_or(Error::UnsupportedCipherSuite(suite.as_u16()))?;

        if suite.is_tls13() != version.is_tls13() && bulk != BulkCipher::Null {
            return Err(Error::UnsupportedVersion(version.as_u16()));
        }

        let peer = local.peer();
        let mac = suite.mac_algorithm().for_version(version);
        let cipher = if bulk == BulkCipher::Null {
            RecordCipher::Null
        } else if bulk.is_stream() {
            for end in [local, peer] {
                check_len("mac secret", mac.size(), keys.mac_secret(end))?;
            }
            RecordCipher::Stream {
                mac,
                write: bulk.create_stream_cipher(keys.key(local))?,
                read: bulk.create_stream_cipher(keys.key(peer))?,
            }
        } else if bulk.is_block() {
            for end in [local, peer] {
                check_len("mac secret", mac.size(), keys.mac_secret(end))?;
                if !version.uses_explicit_iv() {
                    check_len("iv", bulk.block_size(), keys.iv(end))?;
                }
            }
            RecordCipher::Block {
                mac,
                write: bulk.create_block_cipher(keys.key(local))?,
                read: bulk.create_block_cipher(keys.key(peer))?,
                write_iv: keys.iv(local).to_vec(),
                read_iv: keys.iv(peer).to_vec(),
            }
        } else {
            let iv_len = if version.is_tls13() {
                NONCE_LEN
            } else {
                bulk.fixed_iv_len()
            };
            for end in [local, peer] {
                check_len("iv", iv_len, keys.iv(end))?;
            }
            RecordCipher::Aead {
                bulk,
                write: bulk.create_cipher(keys.key(local))?,
                read: bulk.create_cipher(keys.key(peer))?,
            }
        };

        debug!(
            "Record protection {} {:?} as {:?}",
            version, suite, local
        );

        Ok(RecordProtection {
            version,
            suite,
            local,
            keys,
            encrypt_then_mac: false,
            additional_padding: config.default_additional_padding(),
            rng: SeededRng::new(config.rng_seed()),
            cipher,
        })
    }

    /// Use encrypt-then-MAC (RFC 7366) for CBC suites.
    pub fn with_encrypt_then_mac(mut self, enabled: bool) -> Self {
        self.encrypt_then_mac = enabled;
        self
    }

    pub fn version(&self) -> ProtocolVersion {
        self.version
    }

    pub fn suite(&self) -> CipherSuite {
        self.suite
    }

    fn dtls(&self) -> bool {
        self.version.is_dtls()
    }

    /// Build and protect a record carrying `plaintext`.
    pub fn protect(
        &mut self,
        content_type: ContentType,
        plaintext: &[u8],
        sequence: Sequence,
    ) -> Result<Record, Error> {
        let mut record = Record::new(
            content_type,
            self.version.record_version(),
            sequence,
            plaintext,
        );
        self.protect_record(&mut record)?;
        Ok(record)
    }

    /// Protect `record.clean_protocol_message_bytes` into `record.protocol_message_bytes`
    /// and serialize the complete record.
    ///
    /// Header fields are read back after computation, so overrides registered on the
    /// record end up on the wire.
    pub fn protect_record(&mut self, record: &mut Record) -> Result<(), Error> {
        record.computations.reset_flags();

        let payload = match &self.cipher {
            RecordCipher::Null => record.clean_protocol_message_bytes.value_or_default(),
            RecordCipher::Stream { .. } => self.protect_stream(record)?,
            RecordCipher::Block { .. } => self.protect_block(record)?,
            RecordCipher::Aead { .. } => {
                if self.version.is_tls13() {
                    self.protect_aead_tls13(record)?
                } else {
                    self.protect_aead(record)?
                }
            }
        };

        let payload = record.protocol_message_bytes.compute(payload);
        // TLS 1.3 sets the length before encryption since it is part of the AAD.
        if !record.length.is_set() || !self.version.is_tls13() {
            record.length.compute(record_length("record", payload.len())?);
        }
        let bytes = record.finalize(self.dtls());
        trace!(
            "Protected record {}: {}",
            record.sequence(),
            hex::encode(&bytes)
        );

        Ok(())
    }

    /// Decrypt and verify `record.protocol_message_bytes`.
    ///
    /// Never fails for adversarial input. The outcome is reported through the validity
    /// flags of `record.computations`, and `record.clean_protocol_message_bytes` holds
    /// the plaintext. For AEAD suites the plaintext is only set when the tag verified.
    pub fn unprotect(&mut self, record: &mut Record) {
        record.computations.reset_flags();

        match &self.cipher {
            RecordCipher::Null => {
                let bytes = record.protocol_message_bytes.value_or_default();
                record.clean_protocol_message_bytes.compute(bytes);
            }
            RecordCipher::Stream { .. } => self.unprotect_stream(record),
            RecordCipher::Block { .. } => {
                if self.encrypt_then_mac {
                    self.unprotect_block_etm(record)
                } else {
                    self.unprotect_block(record)
                }
            }
            RecordCipher::Aead { .. } => {
                if self.version.is_tls13() {
                    self.unprotect_aead_tls13(record)
                } else {
                    self.unprotect_aead(record)
                }
            }
        }

        let c = &record.computations;
        trace!(
            "Unprotected record {}: padding {:?} mac {:?} tag {:?}",
            record.sequence(),
            c.padding_valid,
            c.mac_valid,
            c.authentication_tag_valid
        );
    }

    // ------------------------------------------------------------------------
    // MAC
    // ------------------------------------------------------------------------

    fn mac_algorithm(&self) -> MacAlgorithm {
        match &self.cipher {
            RecordCipher::Stream { mac, .. } | RecordCipher::Block { mac, .. } => *mac,
            _ => MacAlgorithm::Null,
        }
    }

    /// MAC input prefix: `seq ‖ type ‖ version ‖ length`, without the version for SSL 3.0.
    fn meta_data(&self, record: &Record, len: usize) -> Vec<u8> {
        let seq = record.sequence().as_u64(self.dtls());
        let len = u16::try_from(len).unwrap_or_else(|_| {
            warn!("MAC input of {} bytes, length field saturated", len);
            u16::MAX
        });
        let aad = if self.version.is_ssl() {
            Aad::new_ssl3(seq, record.content_type(), len)
        } else {
            Aad::new_tls12(seq, record.content_type(), record.version(), len)
        };
        aad.as_ref().to_vec()
    }

    fn compute_mac(&self, record: &mut Record, data: &[u8], write: bool) -> Result<Vec<u8>, Error> {
        let end = if write { self.local } else { self.local.peer() };
        let mac = self.mac_algorithm();
        let key = record
            .computations
            .mac_key
            .compute(self.keys.mac_secret(end).to_vec());
        let meta = record.computations.authenticated_meta_data.value_or_default();

        let mut input = meta;
        input.extend_from_slice(data);
        mac.compute(&key, &input)
    }

    /// Compare the MAC carried by the record with the one over `content`.
    fn verify_mac(&self, record: &mut Record, content: &[u8], received: &[u8]) -> bool {
        let meta = self.meta_data(record, content.len());
        record.computations.authenticated_meta_data.compute(meta);
        let non_meta = record
            .computations
            .authenticated_non_meta_data
            .compute(content.to_vec());
        match self.compute_mac(record, &non_meta, false) {
            Ok(expected) => expected == received,
            Err(e) => {
                warn!("MAC computation failed: {}", e);
                false
            }
        }
    }

    // ------------------------------------------------------------------------
    // Stream
    // ------------------------------------------------------------------------

    fn stream_cipher(&mut self, write: bool) -> &mut dyn KeyStream {
        match &mut self.cipher {
            RecordCipher::Stream {
                write: w, read: r, ..
            } => {
                if write {
                    &mut **w
                } else {
                    &mut **r
                }
            }
            _ => unreachable!("stream cipher state"),
        }
    }

    /// MAC-then-encrypt: `keystream ⊕ (content ‖ mac)`.
    fn protect_stream(&mut self, record: &mut Record) -> Result<Vec<u8>, Error> {
        let clean = record.clean_protocol_message_bytes.value_or_default();
        record
            .computations
            .cipher_key
            .compute(self.keys.key(self.local).to_vec());

        let meta = self.meta_data(record, clean.len());
        record.computations.authenticated_meta_data.compute(meta);
        let non_meta = record
            .computations
            .authenticated_non_meta_data
            .compute(clean.clone());
        let mac = self.compute_mac(record, &non_meta, true)?;
        let mac = record.computations.mac.compute(mac);

        let mut plain = clean;
        plain.extend_from_slice(&mac);
        let mut data = record.computations.plain_record_bytes.compute(plain);
        self.stream_cipher(true).apply_keystream(&mut data);
        Ok(record.computations.ciphertext.compute(data))
    }

    /// Only the MAC flag is set, stream records have no padding.
    fn unprotect_stream(&mut self, record: &mut Record) {
        let mac_len = self.mac_algorithm().size();
        let pmb = record.protocol_message_bytes.value_or_default();
        record
            .computations
            .cipher_key
            .compute(self.keys.key(self.local.peer()).to_vec());

        let mut data = record.computations.ciphertext.compute(pmb);
        self.stream_cipher(false).apply_keystream(&mut data);
        let plain = record.computations.plain_record_bytes.compute(data);

        let Some(content_len) = plain.len().checked_sub(mac_len) else {
            debug!("Stream record shorter than MAC: {} bytes", plain.len());
            record.computations.mac_valid = Some(false);
            return;
        };
        let (content, received) = plain.split_at(content_len);
        let received = record.computations.mac.compute(received.to_vec());

        let mac_valid = self.verify_mac(record, content, &received);
        record.computations.mac_valid = Some(mac_valid);
        record
            .clean_protocol_message_bytes
            .compute(content.to_vec());
    }

    // ------------------------------------------------------------------------
    // CBC
    // ------------------------------------------------------------------------

    fn block_ciphers(&self) -> (&dyn BlockCipher, &dyn BlockCipher) {
        match &self.cipher {
            RecordCipher::Block { write, read, .. } => (&**write, &**read),
            _ => unreachable!("block cipher state"),
        }
    }

    fn padding(&self, record: &mut Record, len: usize, bs: usize) -> Vec<u8> {
        let additional = record
            .computations
            .additional_padding_length
            .compute(self.additional_padding) as usize;

        let mut total = bs - (len % bs) + (additional / bs) * bs;
        while total > MAX_PADDING {
            total -= bs;
        }
        let padding = vec![(total - 1) as u8; total];
        record.computations.padding.compute(padding)
    }

    fn protect_block(&mut self, record: &mut Record) -> Result<Vec<u8>, Error> {
        let clean = record.clean_protocol_message_bytes.value_or_default();
        let explicit = self.version.uses_explicit_iv();
        let etm = self.encrypt_then_mac;
        let bs = BLOCK;

        record
            .computations
            .cipher_key
            .compute(self.keys.key(self.local).to_vec());

        let iv = if explicit {
            let fresh = self.rng.bytes(bs);
            record.computations.cbc_initialisation_vector.compute(fresh)
        } else {
            let chained = match &self.cipher {
                RecordCipher::Block { write_iv, .. } => write_iv.clone(),
                _ => unreachable!("block cipher state"),
            };
            record.computations.cbc_initialisation_vector.compute(chained)
        };

        let mut plain = clean.clone();
        if !etm {
            let meta = self.meta_data(record, clean.len());
            record.computations.authenticated_meta_data.compute(meta);
            let non_meta = record
                .computations
                .authenticated_non_meta_data
                .compute(clean.clone());
            let mac = self.compute_mac(record, &non_meta, true)?;
            let mac = record.computations.mac.compute(mac);
            plain.extend_from_slice(&mac);
        }
        let padding = self.padding(record, plain.len(), bs);
        plain.extend_from_slice(&padding);

        let mut data = record.computations.plain_record_bytes.compute(plain);
        if data.len() % bs != 0 {
            debug!("Expanding CBC plaintext of {} bytes to block size", data.len());
            data.resize(data.len() + bs - data.len() % bs, 0);
        }

        let mut chain_iv = iv.clone();
        chain_iv.resize(bs, 0);
        let (write, _) = self.block_ciphers();
        let last = cbc_encrypt(write, &chain_iv, &mut data);
        if !explicit {
            if let RecordCipher::Block { write_iv, .. } = &mut self.cipher {
                *write_iv = last;
            }
        }
        let ciphertext = record.computations.ciphertext.compute(data);

        let mut out = Vec::with_capacity(bs + ciphertext.len() + 48);
        if explicit {
            out.extend_from_slice(&iv);
        }
        out.extend_from_slice(&ciphertext);

        if etm {
            let meta = self.meta_data(record, out.len());
            record.computations.authenticated_meta_data.compute(meta);
            let non_meta = record
                .computations
                .authenticated_non_meta_data
                .compute(out.clone());
            let mac = self.compute_mac(record, &non_meta, true)?;
            let mac = record.computations.mac.compute(mac);
            out.extend_from_slice(&mac);
        }

        Ok(out)
    }

    /// Split `[iv] ‖ ciphertext` and decrypt. `None` when the ciphertext cannot be
    /// decrypted at all.
    fn decrypt_cbc(&mut self, record: &mut Record, body: &[u8]) -> Option<Vec<u8>> {
        let bs = BLOCK;
        let explicit = self.version.uses_explicit_iv();

        let (iv, ciphertext) = if explicit {
            if body.len() < bs {
                return None;
            }
            (body[..bs].to_vec(), &body[bs..])
        } else {
            let chained = match &self.cipher {
                RecordCipher::Block { read_iv, .. } => read_iv.clone(),
                _ => unreachable!("block cipher state"),
            };
            (chained, body)
        };

        if ciphertext.is_empty() || ciphertext.len() % bs != 0 {
            return None;
        }

        let iv = record.computations.cbc_initialisation_vector.compute(iv);
        let mut data = record
            .computations
            .ciphertext
            .compute(ciphertext.to_vec());
        if data.is_empty() || data.len() % bs != 0 || iv.len() != bs {
            return None;
        }

        if !explicit {
            let next = data[data.len() - bs..].to_vec();
            if let RecordCipher::Block { read_iv, .. } = &mut self.cipher {
                *read_iv = next;
            }
        }

        let (_, read) = self.block_ciphers();
        cbc_decrypt(read, &iv, &mut data);
        Some(record.computations.plain_record_bytes.compute(data))
    }

    /// Padding length announced by the last byte and whether the padding is valid.
    /// `room` is how many trailing bytes padding may occupy.
    ///
    /// TLS requires every padding byte to repeat the length. SSL 3.0 leaves the
    /// padding content arbitrary, so only the announced length has to fit.
    fn check_padding(&self, record: &mut Record, plain: &[u8], room: usize) -> (bool, usize) {
        let Some(&last) = plain.last() else {
            return (false, 0);
        };
        let total = last as usize + 1;
        if total > room {
            record.computations.padding.compute(Vec::new());
            return (false, 0);
        }
        let padding = &plain[plain.len() - total..];
        let valid = self.version.is_ssl() || padding.iter().all(|b| *b == last);
        record.computations.padding.compute(padding.to_vec());
        (valid, total)
    }

    fn unprotect_block(&mut self, record: &mut Record) {
        let mac_len = self.mac_algorithm().size();
        let pmb = record.protocol_message_bytes.value_or_default();

        let Some(plain) = self.decrypt_cbc(record, &pmb) else {
            debug!("CBC record not decryptable: {} bytes", pmb.len());
            record.computations.fail_block();
            return;
        };

        let room = plain.len().saturating_sub(mac_len);
        let (padding_valid, pad_total) = self.check_padding(record, &plain, room);
        record.computations.padding_valid = Some(padding_valid);

        // The MAC is checked even when the padding was bad.
        let Some(content_len) = plain.len().checked_sub(pad_total + mac_len) else {
            record.computations.mac_valid = Some(false);
            return;
        };
        let content = &plain[..content_len];
        let received = record
            .computations
            .mac
            .compute(plain[content_len..content_len + mac_len].to_vec());

        let mac_valid = self.verify_mac(record, content, &received);
        record.computations.mac_valid = Some(mac_valid);
        record
            .clean_protocol_message_bytes
            .compute(content.to_vec());
    }

    fn unprotect_block_etm(&mut self, record: &mut Record) {
        let mac_len = self.mac_algorithm().size();
        let pmb = record.protocol_message_bytes.value_or_default();

        let Some(body_len) = pmb.len().checked_sub(mac_len) else {
            debug!("EtM record shorter than MAC: {} bytes", pmb.len());
            record.computations.fail_block();
            return;
        };
        let (body, received) = pmb.split_at(body_len);
        let received = record.computations.mac.compute(received.to_vec());

        let mac_valid = self.verify_mac(record, body, &received);
        record.computations.mac_valid = Some(mac_valid);

        let Some(plain) = self.decrypt_cbc(record, body) else {
            record.computations.padding_valid = Some(false);
            return;
        };
        let (padding_valid, pad_total) = self.check_padding(record, &plain, plain.len());
        record.computations.padding_valid = Some(padding_valid);
        record
            .clean_protocol_message_bytes
            .compute(plain[..plain.len() - pad_total].to_vec());
    }

    // ------------------------------------------------------------------------
    // AEAD
    // ------------------------------------------------------------------------

    fn aead_bulk(&self) -> BulkCipher {
        match &self.cipher {
            RecordCipher::Aead { bulk, .. } => *bulk,
            _ => unreachable!("aead cipher state"),
        }
    }

    fn aead_cipher(&mut self, write: bool) -> &mut dyn Cipher {
        match &mut self.cipher {
            RecordCipher::Aead {
                write: w, read: r, ..
            } => {
                if write {
                    &mut **w
                } else {
                    &mut **r
                }
            }
            _ => unreachable!("aead cipher state"),
        }
    }

    /// Nonce for TLS 1.2 style AEAD records, plus the explicit part sent on the wire.
    ///
    /// `received_explicit` is the explicit nonce read from an incoming record.
    fn aead_nonce(
        &self,
        record: &mut Record,
        write: bool,
        received_explicit: Option<&[u8]>,
    ) -> (Nonce, Vec<u8>) {
        let end = if write { self.local } else { self.local.peer() };
        let iv = self.keys.iv(end);
        let seq = record.sequence().as_u64(self.dtls());

        let c = &mut record.computations;
        let (nonce, explicit) = if self.aead_bulk().has_explicit_nonce() {
            let salt = c.aead_salt.compute(iv.to_vec());
            let explicit = match received_explicit {
                Some(e) => e.to_vec(),
                None => seq.to_be_bytes().to_vec(),
            };
            let explicit = c.explicit_nonce.compute(explicit);
            let mut nonce = salt;
            nonce.extend_from_slice(&explicit);
            (nonce, explicit)
        } else {
            (xor_nonce(iv, seq).0.to_vec(), Vec::new())
        };

        let nonce = c.gcm_nonce.compute(nonce);
        (Nonce::from_slice_lossy(&nonce), explicit)
    }

    fn protect_aead(&mut self, record: &mut Record) -> Result<Vec<u8>, Error> {
        let clean = record.clean_protocol_message_bytes.value_or_default();
        record
            .computations
            .cipher_key
            .compute(self.keys.key(self.local).to_vec());

        let (nonce, explicit) = self.aead_nonce(record, true, None);
        let plain = record.computations.plain_record_bytes.compute(clean);
        let aad = self.meta_data(record, plain.len());
        let aad = record.computations.authenticated_meta_data.compute(aad);

        let mut buf = Buf::from(plain);
        self.aead_cipher(true)
            .encrypt(&mut buf, &aad, nonce)
            .map_err(Error::Crypto)?;

        let tag = buf.split_off(buf.len() - AEAD_TAG_LEN);
        let ciphertext = record.computations.ciphertext.compute(buf.into_vec());
        let tag = record.computations.authentication_tag.compute(tag);

        let mut out = explicit;
        out.extend_from_slice(&ciphertext);
        out.extend_from_slice(&tag);
        Ok(out)
    }

    fn unprotect_aead(&mut self, record: &mut Record) {
        let pmb = record.protocol_message_bytes.value_or_default();
        let explicit_len = if self.aead_bulk().has_explicit_nonce() {
            EXPLICIT_NONCE_LEN
        } else {
            0
        };

        if pmb.len() < explicit_len + AEAD_TAG_LEN {
            debug!("AEAD record too short: {} bytes", pmb.len());
            record.computations.authentication_tag_valid = Some(false);
            return;
        }

        let received_explicit = (explicit_len > 0).then(|| &pmb[..explicit_len]);
        let (nonce, _) = self.aead_nonce(record, false, received_explicit);

        let sealed = &pmb[explicit_len..];
        let (ciphertext, tag) = sealed.split_at(sealed.len() - AEAD_TAG_LEN);
        let ciphertext = record.computations.ciphertext.compute(ciphertext.to_vec());
        let tag = record.computations.authentication_tag.compute(tag.to_vec());

        let aad = self.meta_data(record, ciphertext.len());
        let aad = record.computations.authenticated_meta_data.compute(aad);

        let mut buf = Buf::from(ciphertext);
        buf.extend_from_slice(&tag);
        match self.aead_cipher(false).decrypt(&mut buf, &aad, nonce) {
            Ok(()) => {
                record.computations.authentication_tag_valid = Some(true);
                let plain = buf.into_vec();
                record.computations.plain_record_bytes.compute(plain.clone());
                record.clean_protocol_message_bytes.compute(plain);
            }
            Err(e) => {
                debug!("AEAD tag mismatch: {}", e);
                record.computations.authentication_tag_valid = Some(false);
                record.clean_protocol_message_bytes.clear();
            }
        }
    }

    fn protect_aead_tls13(&mut self, record: &mut Record) -> Result<Vec<u8>, Error> {
        let clean = record.clean_protocol_message_bytes.value_or_default();
        record
            .computations
            .cipher_key
            .compute(self.keys.key(self.local).to_vec());

        let additional = record
            .computations
            .additional_padding_length
            .compute(self.additional_padding);
        let padding = record
            .computations
            .padding
            .compute(vec![0; additional as usize]);

        let mut inner = clean;
        inner.push(record.content_type.value_or_default());
        inner.extend_from_slice(&padding);
        let inner = record.computations.plain_record_bytes.compute(inner);

        record
            .content_type
            .compute(ContentType::ApplicationData.as_u8());
        record
            .protocol_version
            .compute(ProtocolVersion::TLS1_2.as_u16());
        let length = record_length("TLS 1.3 record", inner.len() + AEAD_TAG_LEN)?;
        let length = record.length.compute(length);

        let aad = Aad::new_tls13(record.content_type(), record.version(), length);
        let aad = record
            .computations
            .authenticated_meta_data
            .compute(aad.as_ref().to_vec());

        let nonce = self.tls13_nonce(record, true);

        let mut buf = Buf::from(inner);
        self.aead_cipher(true)
            .encrypt(&mut buf, &aad, nonce)
            .map_err(Error::Crypto)?;

        let tag = buf.split_off(buf.len() - AEAD_TAG_LEN);
        let ciphertext = record.computations.ciphertext.compute(buf.into_vec());
        let tag = record.computations.authentication_tag.compute(tag);

        let mut out = ciphertext;
        out.extend_from_slice(&tag);
        Ok(out)
    }

    fn tls13_nonce(&self, record: &mut Record, write: bool) -> Nonce {
        let end = if write { self.local } else { self.local.peer() };
        let nonce = xor_nonce(self.keys.iv(end), record.sequence().sequence_number);
        let nonce = record.computations.gcm_nonce.compute(nonce.0.to_vec());
        Nonce::from_slice_lossy(&nonce)
    }

    fn unprotect_aead_tls13(&mut self, record: &mut Record) {
        let pmb = record.protocol_message_bytes.value_or_default();
        if pmb.len() < AEAD_TAG_LEN {
            debug!("TLS 1.3 record too short: {} bytes", pmb.len());
            record.computations.authentication_tag_valid = Some(false);
            return;
        }

        let (ciphertext, tag) = pmb.split_at(pmb.len() - AEAD_TAG_LEN);
        let ciphertext = record.computations.ciphertext.compute(ciphertext.to_vec());
        let tag = record.computations.authentication_tag.compute(tag.to_vec());

        let aad = Aad::new_tls13(
            record.content_type(),
            record.version(),
            record.length.value_or_default(),
        );
        let aad = record
            .computations
            .authenticated_meta_data
            .compute(aad.as_ref().to_vec());
        let nonce = self.tls13_nonce(record, false);

        let mut buf = Buf::from(ciphertext);
        buf.extend_from_slice(&tag);
        if let Err(e) = self.aead_cipher(false).decrypt(&mut buf, &aad, nonce) {
            debug!("AEAD tag mismatch: {}", e);
            record.computations.authentication_tag_valid = Some(false);
            record.clean_protocol_message_bytes.clear();
            return;
        }
        record.computations.authentication_tag_valid = Some(true);

        let inner = buf.into_vec();
        record.computations.plain_record_bytes.compute(inner.clone());

        // Strip zero padding, the last non-zero byte is the real content type.
        let Some(pos) = inner.iter().rposition(|b| *b != 0) else {
            warn!("TLS 1.3 inner plaintext without content type");
            record.computations.padding.compute(inner);
            record.content_type.compute(0);
            record.clean_protocol_message_bytes.compute(Vec::new());
            return;
        };
        record.computations.padding.compute(inner[pos + 1..].to_vec());
        record.content_type.compute(inner[pos]);
        record
            .clean_protocol_message_bytes
            .compute(inner[..pos].to_vec());
    }
}

impl std::fmt::Debug for RecordProtection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordProtection")
            .field("version", &self.version)
            .field("suite", &self.suite)
            .field("local", &self.local)
            .field("encrypt_then_mac", &self.encrypt_then_mac)
            .finish()
    }
}

/// Block size of every supported CBC cipher.
const BLOCK: usize = 16;

fn xor_nonce(iv: &[u8], seq: u64) -> Nonce {
    let mut full = [0u8; NONCE_LEN];
    let n = iv.len().min(NONCE_LEN);
    full[..n].copy_from_slice(&iv[..n]);
    Nonce::xor(&full, seq)
}

fn record_length(what: &'static str, len: usize) -> Result<u16, Error> {
    u16::try_from(len).map_err(|_| Error::LengthOverflow {
        what,
        len,
        max: MAX_RECORD_LENGTH,
    })
}

fn check_len(what: &'static str, expected: usize, actual: &[u8]) -> Result<(), Error> {
    if actual.len() != expected {
        return Err(Error::InvalidKeyLength {
            what,
            expected,
            actual: actual.len(),
        });
    }
    Ok(())
}
