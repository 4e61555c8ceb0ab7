use crate::buffer::Buf;
use crate::config::Config;
use crate::crypto::{BulkCipher, HeaderProtection, Nonce, AEAD_TAG_LEN};
use crate::types::ConnectionEnd;
use crate::Error;

use super::number::{decode_packet_number, encode_packet_number, packet_number_length};
use super::{
    EncryptionLevel, PacketType, QuicContext, QuicPacket, QUIC_VERSION_1, QUIC_VERSION_2,
    SAMPLE_LEN,
};

/// Offset of the header protection sample from the start of the packet number.
const SAMPLE_OFFSET: usize = 4;

/// Length of the Retry integrity tag.
pub const RETRY_TAG_LEN: usize = AEAD_TAG_LEN;

// Fixed AES-128-GCM key and nonce of the Retry integrity tag (RFC 9001 §5.8).
const RETRY_KEY_V1: [u8; 16] = [
    0xbe, 0x0c, 0x69, 0x0b, 0x9f, 0x66, 0x57, 0x5a, 0x1d, 0x76, 0x6b, 0x54, 0xe3, 0x68, 0xc8,
    0x4e,
];
const RETRY_NONCE_V1: [u8; 12] = [
    0x46, 0x15, 0x99, 0xd3, 0x5d, 0x63, 0x2b, 0xf2, 0x23, 0x98, 0x25, 0xbb,
];

// RFC 9369 §3.3.3.
const RETRY_KEY_V2: [u8; 16] = [
    0x8f, 0xb4, 0xb0, 0x1b, 0x56, 0xac, 0x48, 0xe2, 0x60, 0xfb, 0xcb, 0xce, 0xad, 0x7c, 0xcc,
    0x92,
];
const RETRY_NONCE_V2: [u8; 12] = [
    0xd8, 0x69, 0x69, 0xbc, 0x2d, 0x7c, 0x6d, 0x99, 0x90, 0xef, 0xb0, 0x4a,
];

/// Header and payload protection of QUIC packets (RFC 9001 §5).
///
/// Outgoing packets use the keys of `local`. Incoming packets use the keys of the peer,
/// or of `local` when the configuration echoes QUIC packets back at their sender.
#[derive(Debug, Clone)]
pub struct QuicPacketProtection {
    local: ConnectionEnd,
    echo: bool,
}

impl QuicPacketProtection {
    pub fn new(config: &Config, local: ConnectionEnd) -> Self {
        QuicPacketProtection {
            local,
            echo: config.echo_quic(),
        }
    }

    pub fn local(&self) -> ConnectionEnd {
        self.local
    }

    fn receive_sender(&self) -> ConnectionEnd {
        if self.echo {
            self.local
        } else {
            self.local.peer()
        }
    }

    fn level(packet: &QuicPacket) -> Result<EncryptionLevel, Error> {
        packet
            .packet_type
            .level()
            .ok_or(Error::NotProtected(packet.packet_type))
    }

    fn header_protection(
        ctx: &QuicContext,
        level: EncryptionLevel,
        sender: ConnectionEnd,
    ) -> Result<Box<dyn HeaderProtection>, Error> {
        let keyset = ctx.keys(level)?;
        keyset
            .cipher()
            .create_header_protection(&keyset.keys(sender).hp)
    }

    /// Remove header protection from a parsed packet and recover its packet number.
    ///
    /// Fills the unprotected flags, packet number fields, the unprotected header (the AAD)
    /// and the protected payload. The largest received packet number is only read here.
    pub fn remove_header_protection(
        &self,
        ctx: &QuicContext,
        packet: &mut QuicPacket,
    ) -> Result<(), Error> {
        let level = Self::level(packet)?;
        let hp = Self::header_protection(ctx, level, self.receive_sender())?;

        let data = packet.received_pn_and_payload().to_vec();
        if data.len() < SAMPLE_OFFSET + SAMPLE_LEN {
            return Err(Error::PacketTooShort(data.len()));
        }
        let sample = packet
            .header_protection_sample
            .compute(data[SAMPLE_OFFSET..SAMPLE_OFFSET + SAMPLE_LEN].to_vec());
        let mask = hp.mask(&sample_array(&sample));

        let protected_flags = packet.protected_flags.value_or_default();
        let flags = packet
            .unprotected_flags
            .compute(protected_flags ^ (mask[0] & packet.packet_type.protected_flags_mask()));

        let pn_len = packet.packet_number_length.compute((flags & 0x03) + 1);
        let pn_len = usize::from(pn_len.clamp(1, 4));

        let protected_pn = packet
            .protected_packet_number
            .compute(data[..pn_len].to_vec());
        let unprotected_pn: Vec<u8> = protected_pn
            .iter()
            .zip(&mask[1..])
            .map(|(b, m)| b ^ m)
            .collect();
        let unprotected_pn = packet.unprotected_packet_number.compute(unprotected_pn);

        let truncated = unprotected_pn
            .iter()
            .fold(0u64, |acc, b| (acc << 8) | u64::from(*b));
        let full = decode_packet_number(truncated, pn_len, ctx.largest_received(level));
        let full = packet.restored_packet_number.compute(full);
        trace!(
            "{} packet number {} ({} bytes, truncated {:#x})",
            packet.packet_type,
            full,
            pn_len,
            truncated
        );

        let mut header = packet.received_header().to_vec();
        if let Some(first) = header.first_mut() {
            *first = flags;
        }
        header.extend_from_slice(&unprotected_pn);
        packet.unprotected_header.compute(header);

        packet.protected_payload.compute(data[pn_len..].to_vec());

        Ok(())
    }

    /// Decrypt the payload of a packet whose header protection was removed.
    ///
    /// On success the largest received packet number of the level is ratcheted forward.
    /// An authentication failure leaves the context untouched.
    pub fn decrypt(&self, ctx: &mut QuicContext, packet: &mut QuicPacket) -> Result<(), Error> {
        let level = Self::level(packet)?;
        let (mut cipher, iv) = {
            let keyset = ctx.keys(level)?;
            let keys = keyset.keys(self.receive_sender());
            (keyset.cipher().create_cipher(&keys.key)?, keys.iv_array()?)
        };

        let pn = packet
            .restored_packet_number
            .value()
            .ok_or(Error::MissingField("restored_packet_number"))?;
        let aad = packet.unprotected_header.value_or_default();
        let nonce = Nonce::xor(&iv, pn);

        let mut buf = Buf::from(packet.protected_payload.value_or_default());
        if let Err(e) = cipher.decrypt(&mut buf, &aad, nonce) {
            debug!(
                "Failed to decrypt {} packet {}: {} (aad {})",
                packet.packet_type,
                pn,
                e,
                hex::encode(&aad)
            );
            return Err(Error::QuicDecryption(packet.packet_type));
        }

        packet.unprotected_payload.compute(buf.to_vec());
        ctx.update_largest_received(level, pn);
        Ok(())
    }

    /// Remove header protection and decrypt.
    pub fn unprotect(&self, ctx: &mut QuicContext, packet: &mut QuicPacket) -> Result<(), Error> {
        self.remove_header_protection(ctx, packet)?;
        self.decrypt(ctx, packet)
    }

    /// Encrypt the payload of an outgoing packet.
    ///
    /// Picks the packet number length (unless one is set on the packet), writes the
    /// flags and `Length` field, builds the header used as AAD and seals the payload.
    /// Payloads too short to sample are padded with PADDING frames.
    pub fn encrypt(&self, ctx: &QuicContext, packet: &mut QuicPacket) -> Result<(), Error> {
        let level = Self::level(packet)?;
        let keyset = ctx.keys(level)?;
        let keys = keyset.keys(self.local);
        let mut cipher = keyset.cipher().create_cipher(&keys.key)?;
        let iv = keys.iv_array()?;

        let pn = packet
            .restored_packet_number
            .value()
            .ok_or(Error::MissingField("restored_packet_number"))?;
        let pn_len = match packet.packet_number_length.original() {
            Some(len) => *len,
            None => packet_number_length(pn, ctx.largest_acked(level)) as u8,
        };
        let pn_len = usize::from(packet.packet_number_length.compute(pn_len).clamp(1, 4));
        let pn_bytes = packet
            .unprotected_packet_number
            .compute(encode_packet_number(pn, pn_len).to_vec());

        let mut payload = packet.unprotected_payload.value_or_default();
        let min_payload = SAMPLE_OFFSET.saturating_sub(pn_len);
        if payload.len() < min_payload {
            trace!("Padding payload {} -> {}", payload.len(), min_payload);
            payload.resize(min_payload, 0);
        }

        let version = packet.version.value_or_default();
        let base_flags = packet.unprotected_flags.original().copied().unwrap_or(
            match packet.packet_type.long_bits(version) {
                Some(bits) => 0xc0 | (bits << 4),
                None => 0x40,
            },
        );
        let flags = packet
            .unprotected_flags
            .compute((base_flags & !0x03) | (pn_len as u8 - 1));

        let length = packet
            .length
            .compute((pn_len + payload.len() + AEAD_TAG_LEN) as u64);

        let mut header = vec![flags];
        header.extend_from_slice(&packet.build_header_body(length)?);
        header.extend_from_slice(&pn_bytes);
        let header = packet.unprotected_header.compute(header);

        let mut buf = Buf::from(payload);
        cipher
            .encrypt(&mut buf, &header, Nonce::xor(&iv, pn))
            .map_err(Error::Crypto)?;
        packet.protected_payload.compute(buf.to_vec());

        trace!(
            "Encrypted {} packet {} ({} byte payload)",
            packet.packet_type,
            pn,
            buf.len()
        );
        Ok(())
    }

    /// Apply header protection to an encrypted packet and assemble its wire bytes.
    pub fn add_header_protection(
        &self,
        ctx: &QuicContext,
        packet: &mut QuicPacket,
    ) -> Result<(), Error> {
        let level = Self::level(packet)?;
        let hp = Self::header_protection(ctx, level, self.local)?;

        let pn_len = usize::from(packet.packet_number_length.value_or_default().clamp(1, 4));
        let ciphertext = packet.protected_payload.value_or_default();
        let offset = SAMPLE_OFFSET - pn_len;
        if ciphertext.len() < offset + SAMPLE_LEN {
            return Err(Error::PacketTooShort(pn_len + ciphertext.len()));
        }
        let sample = packet
            .header_protection_sample
            .compute(ciphertext[offset..offset + SAMPLE_LEN].to_vec());
        let mask = hp.mask(&sample_array(&sample));

        let header = packet.unprotected_header.value_or_default();
        if header.len() <= pn_len {
            return Err(Error::MissingField("unprotected_header"));
        }
        let pn_offset = header.len() - pn_len;

        let flags = packet
            .protected_flags
            .compute(header[0] ^ (mask[0] & packet.packet_type.protected_flags_mask()));
        let protected_pn: Vec<u8> = header[pn_offset..]
            .iter()
            .zip(&mask[1..])
            .map(|(b, m)| b ^ m)
            .collect();
        let protected_pn = packet.protected_packet_number.compute(protected_pn);

        let mut out = Vec::with_capacity(header.len() + ciphertext.len());
        out.push(flags);
        out.extend_from_slice(&header[1..pn_offset]);
        out.extend_from_slice(&protected_pn);
        out.extend_from_slice(&ciphertext);
        packet.complete_packet_bytes.compute(out);

        Ok(())
    }

    /// Encrypt and header-protect, returning the packet's wire bytes.
    pub fn protect(&self, ctx: &QuicContext, packet: &mut QuicPacket) -> Result<Vec<u8>, Error> {
        self.encrypt(ctx, packet)?;
        self.add_header_protection(ctx, packet)?;
        Ok(packet.complete_packet_bytes.value_or_default())
    }

    /// Compute the integrity tag of a Retry packet and return its wire bytes.
    ///
    /// `original_dcid` is the destination connection ID of the Initial the Retry answers.
    pub fn protect_retry(
        &self,
        packet: &mut QuicPacket,
        original_dcid: &[u8],
    ) -> Result<Vec<u8>, Error> {
        if packet.packet_type != PacketType::Retry {
            return Err(Error::UnexpectedPacketType(packet.packet_type));
        }
        let tag = retry_integrity_tag(packet, original_dcid)?;
        let tag = packet.retry_integrity_tag.compute(tag);

        let mut out = packet.build_retry_body()?;
        out.extend_from_slice(&tag);
        Ok(packet.complete_packet_bytes.compute(out))
    }

    /// Check the integrity tag of a received Retry packet.
    pub fn verify_retry(&self, packet: &QuicPacket, original_dcid: &[u8]) -> Result<(), Error> {
        if packet.packet_type != PacketType::Retry {
            return Err(Error::UnexpectedPacketType(packet.packet_type));
        }
        let expected = retry_integrity_tag(packet, original_dcid)?;
        let received = packet.retry_integrity_tag.value_or_default();
        if received != expected {
            debug!(
                "Retry integrity tag mismatch: got {}, expected {}",
                hex::encode(&received),
                hex::encode(&expected)
            );
            return Err(Error::RetryIntegrity);
        }
        Ok(())
    }
}

/// AES-128-GCM tag over `len(odcid) ‖ odcid ‖ retry packet without tag`, with the fixed
/// key and nonce of the packet's version and an empty plaintext.
pub fn retry_integrity_tag(packet: &QuicPacket, original_dcid: &[u8]) -> Result<Vec<u8>, Error> {
    let (key, nonce) = match packet.version.value_or_default() {
        QUIC_VERSION_1 => (RETRY_KEY_V1, RETRY_NONCE_V1),
        QUIC_VERSION_2 => (RETRY_KEY_V2, RETRY_NONCE_V2),
        v => return Err(Error::UnsupportedQuicVersion(v)),
    };

    let odcid_len = u8::try_from(original_dcid.len()).map_err(|_| Error::LengthOverflow {
        what: "original connection ID",
        len: original_dcid.len(),
        max: u8::MAX as usize,
    })?;
    let mut pseudo = vec![odcid_len];
    pseudo.extend_from_slice(original_dcid);
    pseudo.extend_from_slice(&packet.build_retry_body()?);

    let mut cipher = BulkCipher::Aes128Gcm.create_cipher(&key)?;
    let mut tag = Buf::new();
    cipher
        .encrypt(&mut tag, &pseudo, Nonce(nonce))
        .map_err(Error::Crypto)?;
    Ok(tag.to_vec())
}

// Overridden samples of the wrong size are zero padded or cut.
fn sample_array(sample: &[u8]) -> [u8; SAMPLE_LEN] {
    let mut out = [0u8; SAMPLE_LEN];
    let n = sample.len().min(SAMPLE_LEN);
    out[..n].copy_from_slice(&sample[..n]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::BulkCipher;
    use crate::modvar::{BytesModification, IntModification};
    use crate::quic::{QuicKeySet, QuicKeys};

    fn unhex(s: &str) -> Vec<u8> {
        hex::decode(s).unwrap()
    }

    const DCID: &str = "8394c8f03e515708";

    // RFC 9001 A.1
    fn initial_keys() -> QuicKeySet {
        let client = QuicKeys::new(
            &unhex("1f369613dd76d5467730efcbe3b1a22d"),
            &unhex("fa044b2f42a3fd3b46fb255c"),
            &unhex("9f50449e04a0e810283a1e9933adedd2"),
        );
        let server = QuicKeys::new(
            &unhex("cf3a5331653c364c88f0f379b6067e37"),
            &unhex("0ac1493ca1905853b0bba03e"),
            &unhex("c206b8d9b9f0f37644430b490eeaa314"),
        );
        QuicKeySet::new(BulkCipher::Aes128Gcm, client, server).unwrap()
    }

    fn context() -> QuicContext {
        let mut ctx = QuicContext::new();
        ctx.install_keys(EncryptionLevel::Initial, initial_keys());
        ctx
    }

    fn protection(local: ConnectionEnd) -> QuicPacketProtection {
        QuicPacketProtection::new(&Config::default(), local)
    }

    #[test]
    fn rfc9001_client_initial_header() {
        let _ = env_logger::try_init();
        let ctx = context();
        let client = protection(ConnectionEnd::Client);

        let mut packet = QuicPacket::new_long(
            QUIC_VERSION_1,
            PacketType::Initial,
            &unhex(DCID),
            &[],
            2,
            &[0; 1162],
        )
        .with_packet_number_length(4);
        client.encrypt(&ctx, &mut packet).unwrap();
        assert_eq!(
            packet.unprotected_header.value().unwrap(),
            unhex("c300000001088394c8f03e5157080000449e00000002")
        );

        // Swap in ciphertext starting with the sample from the RFC.
        let mut ciphertext = unhex("d1b1c98dd7689fb8ec11d242b123dc9b");
        ciphertext.resize(1178, 0);
        packet.protected_payload.set(ciphertext);
        client.add_header_protection(&ctx, &mut packet).unwrap();

        let wire = packet.complete_packet_bytes.value().unwrap();
        assert_eq!(wire.len(), 1200);
        assert_eq!(
            wire[..22],
            unhex("c000000001088394c8f03e5157080000449e7b9aec34")[..]
        );

        let (rest, mut parsed) = QuicPacket::parse(&wire, 0).unwrap();
        assert!(rest.is_empty());
        protection(ConnectionEnd::Server)
            .remove_header_protection(&ctx, &mut parsed)
            .unwrap();
        assert_eq!(parsed.unprotected_flags.value(), Some(0xc3));
        assert_eq!(parsed.packet_number_length.value(), Some(4));
        assert_eq!(parsed.restored_packet_number.value(), Some(2));
        assert_eq!(
            parsed.unprotected_header.value(),
            packet.unprotected_header.value()
        );
    }

    #[test]
    fn rfc9001_chacha20_short_header() {
        let _ = env_logger::try_init();
        // RFC 9001 A.5
        let keys = || {
            QuicKeys::new(
                &unhex("c6d98ff3441c3fe1b2182094f69caa2ed4b716b65488960a7a984979fb23e1c8"),
                &unhex("e0459b3474bdd0e44a41c144"),
                &unhex("25a282b9e82f06f21f488917a4fc8f1b73573685608597d0efcb076b0ab7a7a4"),
            )
        };
        let mut ctx = QuicContext::new();
        ctx.install_keys(
            EncryptionLevel::OneRtt,
            QuicKeySet::new(BulkCipher::ChaCha20Poly1305, keys(), keys()).unwrap(),
        );

        let mut packet =
            QuicPacket::new_short(&[], 654_360_564, &[0x01]).with_packet_number_length(3);
        let wire = protection(ConnectionEnd::Server)
            .protect(&ctx, &mut packet)
            .unwrap();
        assert_eq!(wire, unhex("4cfe4189655e5cd55c41f69080575d7999c25a5bfb"));

        ctx.update_largest_received(EncryptionLevel::OneRtt, 654_360_563);
        let (_, mut parsed) = QuicPacket::parse(&wire, 0).unwrap();
        protection(ConnectionEnd::Client)
            .unprotect(&mut ctx, &mut parsed)
            .unwrap();
        assert_eq!(parsed.restored_packet_number.value(), Some(654_360_564));
        assert_eq!(parsed.unprotected_payload.value(), Some(vec![0x01]));
        assert_eq!(
            ctx.largest_received(EncryptionLevel::OneRtt),
            Some(654_360_564)
        );
    }

    #[test]
    fn failed_decryption_keeps_largest_received() {
        let _ = env_logger::try_init();
        let mut ctx = context();
        let mut packet = QuicPacket::new_long(
            QUIC_VERSION_1,
            PacketType::Initial,
            &unhex(DCID),
            &[],
            7,
            b"crypto frame",
        );
        let mut wire = protection(ConnectionEnd::Client)
            .protect(&ctx, &mut packet)
            .unwrap();
        let last = wire.len() - 1;
        wire[last] ^= 0x01;

        let (_, mut parsed) = QuicPacket::parse(&wire, 0).unwrap();
        let err = protection(ConnectionEnd::Server)
            .unprotect(&mut ctx, &mut parsed)
            .unwrap_err();
        assert_eq!(err, Error::QuicDecryption(PacketType::Initial));
        assert_eq!(ctx.largest_received(EncryptionLevel::Initial), None);
        assert!(!parsed.unprotected_payload.is_set());
    }

    #[test]
    fn tiny_payload_is_padded() {
        let ctx = context();
        let mut packet = QuicPacket::new_long(
            QUIC_VERSION_1,
            PacketType::Initial,
            &unhex(DCID),
            &[],
            0,
            &[0x01],
        );
        let wire = protection(ConnectionEnd::Client)
            .protect(&ctx, &mut packet)
            .unwrap();
        assert_eq!(packet.packet_number_length.value(), Some(1));
        // 1 byte packet number, 3 byte padded payload, 16 byte tag.
        assert_eq!(packet.length.value(), Some(20));
        assert_eq!(wire.len(), packet.unprotected_header.value().unwrap().len() + 19);
    }

    #[test]
    fn echo_reads_own_packets() {
        let mut ctx = context();
        let mut packet = QuicPacket::new_long(
            QUIC_VERSION_1,
            PacketType::Initial,
            &unhex(DCID),
            &[],
            1,
            b"hello",
        );
        let wire = protection(ConnectionEnd::Client)
            .protect(&ctx, &mut packet)
            .unwrap();

        let (_, mut parsed) = QuicPacket::parse(&wire, 0).unwrap();
        assert!(protection(ConnectionEnd::Client)
            .unprotect(&mut ctx, &mut parsed)
            .is_err());

        let config = Config::builder().echo_quic(true).build().unwrap();
        let echo = QuicPacketProtection::new(&config, ConnectionEnd::Client);
        let (_, mut parsed) = QuicPacket::parse(&wire, 0).unwrap();
        echo.unprotect(&mut ctx, &mut parsed).unwrap();
        assert_eq!(parsed.unprotected_payload.value(), Some(b"hello".to_vec()));
    }

    #[test]
    fn overridden_fields_reach_the_wire() {
        let ctx = context();
        let mut packet = QuicPacket::new_long(
            QUIC_VERSION_1,
            PacketType::Initial,
            &unhex(DCID),
            &[],
            1,
            b"hello",
        );
        packet.length.add_modification(IntModification::Add(5));
        packet
            .destination_connection_id
            .add_modification(BytesModification::Explicit(vec![0xaa; 4]));
        let wire = protection(ConnectionEnd::Client)
            .protect(&ctx, &mut packet)
            .unwrap();

        assert_eq!(&wire[5..10], &[4, 0xaa, 0xaa, 0xaa, 0xaa]);
        // Length field: 1 + 5 + 16, plus 5.
        assert_eq!(&wire[12..14], &[0x40, 27]);
    }

    #[test]
    fn missing_keys_and_retry() {
        let mut ctx = QuicContext::new();
        let mut packet = QuicPacket::new_short(&[1, 2], 0, b"data");
        assert_eq!(
            protection(ConnectionEnd::Client)
                .protect(&ctx, &mut packet)
                .unwrap_err(),
            Error::MissingKeys(EncryptionLevel::OneRtt)
        );

        let mut retry = vec![0xf0, 0, 0, 0, 1, 0, 0, 1, 2, 3];
        retry.extend_from_slice(&[0; RETRY_TAG_LEN]);
        let (_, mut parsed) = QuicPacket::parse(&retry, 0).unwrap();
        assert_eq!(
            protection(ConnectionEnd::Client)
                .unprotect(&mut ctx, &mut parsed)
                .unwrap_err(),
            Error::NotProtected(PacketType::Retry)
        );
    }

    #[test]
    fn rfc9001_retry_integrity_tag() {
        let _ = env_logger::try_init();
        // RFC 9001 A.4
        let wire =
            unhex("ff000000010008f067a5502a4262b5746f6b656e04a265ba2eff4d829058fb3f0f2496ba");
        let server = protection(ConnectionEnd::Server);

        let mut retry =
            QuicPacket::new_retry(QUIC_VERSION_1, &[], &unhex("f067a5502a4262b5"), b"token");
        retry.unprotected_flags.set(0xff);
        assert_eq!(server.protect_retry(&mut retry, &unhex(DCID)).unwrap(), wire);

        let client = protection(ConnectionEnd::Client);
        let (_, parsed) = QuicPacket::parse(&wire, 0).unwrap();
        client.verify_retry(&parsed, &unhex(DCID)).unwrap();
        assert_eq!(
            client.verify_retry(&parsed, &[0x83]).unwrap_err(),
            Error::RetryIntegrity
        );

        let mut tampered = wire.clone();
        tampered[20] ^= 0x01;
        let (_, parsed) = QuicPacket::parse(&tampered, 0).unwrap();
        assert_eq!(
            client.verify_retry(&parsed, &unhex(DCID)).unwrap_err(),
            Error::RetryIntegrity
        );
    }

    #[test]
    fn retry_tag_depends_on_version() {
        let server = protection(ConnectionEnd::Server);
        let mut v1 = QuicPacket::new_retry(QUIC_VERSION_1, &[1], &[2], b"t");
        let mut v2 = QuicPacket::new_retry(QUIC_VERSION_2, &[1], &[2], b"t");
        let wire_v1 = server.protect_retry(&mut v1, &[9; 8]).unwrap();
        let wire_v2 = server.protect_retry(&mut v2, &[9; 8]).unwrap();
        assert_eq!(wire_v2[0], 0xc0);
        assert_ne!(wire_v1[wire_v1.len() - 16..], wire_v2[wire_v2.len() - 16..]);

        let (_, parsed) = QuicPacket::parse(&wire_v2, 0).unwrap();
        assert_eq!(parsed.packet_type, PacketType::Retry);
        server.verify_retry(&parsed, &[9; 8]).unwrap();

        let mut unknown = QuicPacket::new_retry(0x0a0a_0a0a, &[], &[], b"");
        assert_eq!(
            server.protect_retry(&mut unknown, &[]).unwrap_err(),
            Error::UnsupportedQuicVersion(0x0a0a_0a0a)
        );
        let mut initial =
            QuicPacket::new_long(QUIC_VERSION_1, PacketType::Initial, &[], &[], 0, b"");
        assert_eq!(
            server.protect_retry(&mut initial, &[]).unwrap_err(),
            Error::UnexpectedPacketType(PacketType::Initial)
        );
    }

    #[test]
    fn version_2_initial_round_trip() {
        let mut ctx = context();
        let mut packet = QuicPacket::new_long(
            QUIC_VERSION_2,
            PacketType::Initial,
            &unhex(DCID),
            &[],
            3,
            b"v2 crypto frame",
        );
        let wire = protection(ConnectionEnd::Client)
            .protect(&ctx, &mut packet)
            .unwrap();
        // Long header, type bits 01, one byte packet number.
        assert_eq!(packet.unprotected_header.value().unwrap()[0], 0xd0);
        assert_eq!(wire[1..5], QUIC_VERSION_2.to_be_bytes());

        let (_, mut parsed) = QuicPacket::parse(&wire, 0).unwrap();
        assert_eq!(parsed.packet_type, PacketType::Initial);
        protection(ConnectionEnd::Server)
            .unprotect(&mut ctx, &mut parsed)
            .unwrap();
        assert_eq!(
            parsed.unprotected_payload.value(),
            Some(b"v2 crypto frame".to_vec())
        );
        assert_eq!(ctx.largest_received(EncryptionLevel::Initial), Some(3));
    }
}
