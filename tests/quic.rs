//! QUIC packet protection between two endpoints.

use tlsprobe::crypto::BulkCipher;
use tlsprobe::quic::{
    retry_integrity_tag, EncryptionLevel, PacketType, QuicContext, QuicKeySet, QuicKeys,
    QuicPacket, QuicPacketProtection, QUIC_VERSION_1, QUIC_VERSION_2, RETRY_TAG_LEN,
};
use tlsprobe::types::ConnectionEnd;
use tlsprobe::{Config, Error};

const CLIENT_CID: &[u8] = &[0xc1, 0xc2, 0xc3, 0xc4, 0xc5, 0xc6, 0xc7, 0xc8];
const SERVER_CID: &[u8] = &[0x51, 0x52, 0x53, 0x54];

fn keys(cipher: BulkCipher, seed: u8) -> QuicKeys {
    let len = cipher.key_len();
    QuicKeys::new(&vec![seed; len], &[seed ^ 0x55; 12], &vec![seed ^ 0xaa; len])
}

fn keyset(cipher: BulkCipher, seed: u8) -> QuicKeySet {
    QuicKeySet::new(cipher, keys(cipher, seed), keys(cipher, seed + 1)).unwrap()
}

fn context(cipher: BulkCipher) -> QuicContext {
    let mut ctx = QuicContext::new();
    for (i, level) in EncryptionLevel::ALL.iter().enumerate() {
        ctx.install_keys(*level, keyset(cipher, 0x10 * (i as u8 + 1)));
    }
    ctx
}

fn endpoints() -> (QuicPacketProtection, QuicPacketProtection) {
    let config = Config::default();
    (
        QuicPacketProtection::new(&config, ConnectionEnd::Client),
        QuicPacketProtection::new(&config, ConnectionEnd::Server),
    )
}

fn packet(packet_type: PacketType, pn: u64, payload: &[u8]) -> QuicPacket {
    versioned_packet(QUIC_VERSION_1, packet_type, pn, payload)
}

fn versioned_packet(version: u32, packet_type: PacketType, pn: u64, payload: &[u8]) -> QuicPacket {
    match packet_type {
        PacketType::OneRtt => QuicPacket::new_short(SERVER_CID, pn, payload),
        t => QuicPacket::new_long(version, t, SERVER_CID, CLIENT_CID, pn, payload),
    }
}

#[test]
fn round_trip_every_cipher_and_level() {
    let _ = env_logger::try_init();
    for cipher in [
        BulkCipher::Aes128Gcm,
        BulkCipher::Aes256Gcm,
        BulkCipher::ChaCha20Poly1305,
    ] {
        let mut client_ctx = context(cipher);
        let mut server_ctx = context(cipher);
        let (client, server) = endpoints();

        for packet_type in [
            PacketType::Initial,
            PacketType::ZeroRtt,
            PacketType::Handshake,
            PacketType::OneRtt,
        ] {
            let level = packet_type.level().unwrap();
            for len in [0usize, 1, 16, 200] {
                let payload: Vec<u8> = (0..len).map(|i| i as u8 | 0x01).collect();
                let pn = client_ctx.next_packet_number(level);
                let mut out = packet(packet_type, pn, &payload);
                let wire = client.protect(&client_ctx, &mut out).unwrap();

                let (rest, mut received) = QuicPacket::parse(&wire, SERVER_CID.len()).unwrap();
                assert!(rest.is_empty());
                assert_eq!(received.packet_type, packet_type);
                server.unprotect(&mut server_ctx, &mut received).unwrap();

                assert_eq!(received.restored_packet_number.value(), Some(pn));
                let plain = received.unprotected_payload.value().unwrap();
                // Short payloads come back with their PADDING frames.
                assert_eq!(&plain[..len], &payload[..], "{:?} {:?}", cipher, packet_type);
                assert!(plain[len..].iter().all(|b| *b == 0));
                assert_eq!(server_ctx.largest_received(level), Some(pn));
            }
        }
    }
}

#[test]
fn coalesced_datagram() {
    let _ = env_logger::try_init();
    let cipher = BulkCipher::Aes128Gcm;
    let client_ctx = context(cipher);
    let mut server_ctx = context(cipher);
    let (client, server) = endpoints();

    let mut datagram = Vec::new();
    let mut initial = packet(PacketType::Initial, 0, b"client hello");
    datagram.extend(client.protect(&client_ctx, &mut initial).unwrap());
    let mut handshake = packet(PacketType::Handshake, 0, b"finished");
    datagram.extend(client.protect(&client_ctx, &mut handshake).unwrap());
    let mut short = packet(PacketType::OneRtt, 0, b"stream data");
    datagram.extend(client.protect(&client_ctx, &mut short).unwrap());

    let parsed = QuicPacket::parse_datagram(&datagram, SERVER_CID.len());
    assert!(parsed.unparsable.is_empty());
    assert_eq!(parsed.packets.len(), 3);

    let expected: [&[u8]; 3] = [b"client hello", b"finished", b"stream data"];
    for (mut p, want) in parsed.packets.into_iter().zip(expected) {
        server.unprotect(&mut server_ctx, &mut p).unwrap();
        assert_eq!(p.unprotected_payload.value().unwrap(), want);
    }
}

#[test]
fn packet_numbers_shrink_after_acks() {
    let cipher = BulkCipher::Aes128Gcm;
    let mut client_ctx = context(cipher);
    let mut server_ctx = context(cipher);
    let (client, server) = endpoints();
    let level = EncryptionLevel::Handshake;

    let mut first = packet(PacketType::Handshake, 995, b"first");
    let wire = client.protect(&client_ctx, &mut first).unwrap();
    assert_eq!(first.packet_number_length.value(), Some(2));
    let (_, mut received) = QuicPacket::parse(&wire, 0).unwrap();
    server.unprotect(&mut server_ctx, &mut received).unwrap();
    assert_eq!(received.restored_packet_number.value(), Some(995));

    client_ctx.on_ack(level, 995);
    let mut second = packet(PacketType::Handshake, 1000, b"second");
    let wire = client.protect(&client_ctx, &mut second).unwrap();
    assert_eq!(second.packet_number_length.value(), Some(1));
    let (_, mut received) = QuicPacket::parse(&wire, 0).unwrap();
    server.unprotect(&mut server_ctx, &mut received).unwrap();
    assert_eq!(received.restored_packet_number.value(), Some(1000));
    assert_eq!(server_ctx.largest_received(level), Some(1000));
    assert_eq!(server_ctx.largest_received(EncryptionLevel::Initial), None);
}

#[test]
fn mismatched_keys_fail_decryption() {
    let _ = env_logger::try_init();
    let cipher = BulkCipher::ChaCha20Poly1305;
    let client_ctx = context(cipher);
    let (client, server) = endpoints();

    // Same header protection key, different packet key.
    let mut server_ctx = QuicContext::new();
    let mut wrong = keys(cipher, 0x10);
    wrong.key[0] ^= 0xff;
    server_ctx.install_keys(
        EncryptionLevel::Initial,
        QuicKeySet::new(cipher, wrong, keys(cipher, 0x11)).unwrap(),
    );

    let mut out = packet(PacketType::Initial, 3, b"payload");
    let wire = client.protect(&client_ctx, &mut out).unwrap();
    let (_, mut received) = QuicPacket::parse(&wire, 0).unwrap();

    let err = server.unprotect(&mut server_ctx, &mut received).unwrap_err();
    assert_eq!(err, Error::QuicDecryption(PacketType::Initial));
    // Header protection came off fine.
    assert_eq!(received.restored_packet_number.value(), Some(3));
    assert_eq!(server_ctx.largest_received(EncryptionLevel::Initial), None);
}

#[test]
fn discarded_keys_are_missing() {
    let cipher = BulkCipher::Aes256Gcm;
    let mut ctx = context(cipher);
    let (client, _) = endpoints();
    ctx.discard_keys(EncryptionLevel::Initial);

    let mut out = packet(PacketType::Initial, 0, b"late");
    assert_eq!(
        client.protect(&ctx, &mut out).unwrap_err(),
        Error::MissingKeys(EncryptionLevel::Initial)
    );
    let mut out = packet(PacketType::Handshake, 0, b"fine");
    assert!(client.protect(&ctx, &mut out).is_ok());
}

#[test]
fn too_short_to_sample() {
    let ctx = context(BulkCipher::Aes128Gcm);
    let (_, server) = endpoints();
    // Handshake packet whose Length covers only 10 bytes.
    let mut wire = vec![0xe0, 0, 0, 0, 1, 0, 0, 10];
    wire.extend_from_slice(&[0; 10]);
    let (_, mut p) = QuicPacket::parse(&wire, 0).unwrap();
    assert_eq!(
        server.remove_header_protection(&ctx, &mut p).unwrap_err(),
        Error::PacketTooShort(10)
    );
}

#[test]
fn version_2_long_headers() {
    let _ = env_logger::try_init();
    let cipher = BulkCipher::Aes128Gcm;
    let client_ctx = context(cipher);
    let mut server_ctx = context(cipher);
    let (client, server) = endpoints();

    for (packet_type, bits) in [
        (PacketType::Initial, 0b01),
        (PacketType::ZeroRtt, 0b10),
        (PacketType::Handshake, 0b11),
    ] {
        let mut out = versioned_packet(QUIC_VERSION_2, packet_type, 1, b"quic v2");
        let wire = client.protect(&client_ctx, &mut out).unwrap();
        assert_eq!(out.unprotected_flags.value().unwrap() >> 4 & 0x03, bits);

        let (_, mut received) = QuicPacket::parse(&wire, 0).unwrap();
        assert_eq!(received.packet_type, packet_type);
        assert_eq!(received.version.value(), Some(QUIC_VERSION_2));
        server.unprotect(&mut server_ctx, &mut received).unwrap();
        assert_eq!(received.unprotected_payload.value().unwrap(), b"quic v2");
    }

    // The same bits read as version 1 name a different type.
    let mut out = versioned_packet(QUIC_VERSION_2, PacketType::Initial, 1, b"quic v2");
    let mut wire = client.protect(&client_ctx, &mut out).unwrap();
    wire[1..5].copy_from_slice(&QUIC_VERSION_1.to_be_bytes());
    let (_, received) = QuicPacket::parse(&wire, 0).unwrap();
    assert_eq!(received.packet_type, PacketType::ZeroRtt);
}

#[test]
fn retry_integrity() {
    let _ = env_logger::try_init();
    let (client, server) = endpoints();
    let original_dcid = [0x5a; 8];

    for version in [QUIC_VERSION_1, QUIC_VERSION_2] {
        let mut retry = QuicPacket::new_retry(version, CLIENT_CID, SERVER_CID, b"retry token");
        let wire = server.protect_retry(&mut retry, &original_dcid).unwrap();
        assert_eq!(
            wire[wire.len() - RETRY_TAG_LEN..],
            retry.retry_integrity_tag.value().unwrap()[..]
        );

        let (rest, received) = QuicPacket::parse(&wire, 0).unwrap();
        assert!(rest.is_empty());
        assert_eq!(received.packet_type, PacketType::Retry);
        assert_eq!(received.token.value().unwrap(), b"retry token");
        client.verify_retry(&received, &original_dcid).unwrap();
        assert_eq!(
            retry_integrity_tag(&received, &original_dcid).unwrap(),
            received.retry_integrity_tag.value().unwrap()
        );

        // Every bit of the packet is covered by the tag.
        for i in 0..(wire.len() - RETRY_TAG_LEN) * 8 {
            let mut tampered = wire.clone();
            tampered[i / 8] ^= 1 << (i % 8);
            // Flipping the form or type bits turns it into another packet entirely.
            let Ok((_, p)) = QuicPacket::parse(&tampered, 0) else {
                continue;
            };
            if p.packet_type != PacketType::Retry {
                continue;
            }
            let err = client.verify_retry(&p, &original_dcid).unwrap_err();
            match p.version.value() {
                Some(v) if v == version => assert_eq!(err, Error::RetryIntegrity, "bit {}", i),
                Some(v) => assert_eq!(err, Error::UnsupportedQuicVersion(v)),
                None => unreachable!(),
            }
        }
    }
}
