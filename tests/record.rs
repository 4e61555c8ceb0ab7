//! Record protection round trips and tamper detection.

use tlsprobe::modvar::{apply_overrides, BytesModification, Override};
use tlsprobe::record::{parse_records, CipherSuite, KeySet, Record, RecordProtection};
use tlsprobe::types::{ConnectionEnd, ContentType, ProtocolVersion, Sequence};
use tlsprobe::{Config, Error};

const LENGTHS: &[usize] = &[0, 1, 16, 64];

fn keys(suite: CipherSuite, version: ProtocolVersion) -> KeySet {
    let bulk = suite.bulk_cipher().unwrap();
    let mac = suite.mac_algorithm().size();
    let iv = if version.is_tls13() {
        12
    } else {
        bulk.fixed_iv_len()
    };
    KeySet {
        client_write_mac_secret: (0..mac as u8).collect(),
        server_write_mac_secret: (0..mac as u8).rev().collect(),
        client_write_key: vec![0x11; bulk.key_len()],
        server_write_key: vec![0x22; bulk.key_len()],
        client_write_iv: vec![0x33; iv],
        server_write_iv: vec![0x44; iv],
    }
}

fn pair(
    suite: CipherSuite,
    version: ProtocolVersion,
    etm: bool,
) -> (RecordProtection, RecordProtection) {
    let config = Config::builder().rng_seed(Some(42)).build().unwrap();
    let k = keys(suite, version);
    let client = RecordProtection::new(&config, version, suite, ConnectionEnd::Client, k.clone())
        .unwrap()
        .with_encrypt_then_mac(etm);
    let server = RecordProtection::new(&config, version, suite, ConnectionEnd::Server, k)
        .unwrap()
        .with_encrypt_then_mac(etm);
    (client, server)
}

// The receiving side of a TLS connection tracks sequence numbers itself.
fn receive(bytes: &[u8], version: ProtocolVersion, seq: u64) -> Record {
    let dtls = version.is_dtls();
    let parsed = parse_records(bytes, dtls);
    assert!(parsed.unparsable.is_empty());
    assert_eq!(parsed.records.len(), 1);
    let mut record = parsed.records.into_iter().next().unwrap();
    if !dtls {
        record.sequence_number.set(seq);
    }
    record
}

fn assert_valid(record: &Record, suite: CipherSuite) {
    let c = &record.computations;
    let bulk = suite.bulk_cipher().unwrap();
    if bulk.is_block() {
        assert_eq!(c.padding_valid, Some(true), "{:?}", suite);
        assert_eq!(c.mac_valid, Some(true), "{:?}", suite);
    } else if bulk.is_stream() {
        assert_eq!(c.padding_valid, None, "{:?}", suite);
        assert_eq!(c.mac_valid, Some(true), "{:?}", suite);
    } else {
        assert_eq!(c.authentication_tag_valid, Some(true), "{:?}", suite);
    }
}

fn round_trip(suite: CipherSuite, version: ProtocolVersion, etm: bool) {
    let (mut client, mut server) = pair(suite, version, etm);

    for (seq, len) in LENGTHS.iter().enumerate() {
        let seq = seq as u64;
        let plaintext: Vec<u8> = (0..*len).map(|i| (i * 7) as u8).collect();
        let sequence = Sequence::with_number(1, seq);
        let sent = client
            .protect(ContentType::ApplicationData, &plaintext, sequence)
            .unwrap();
        let bytes = sent.complete_record_bytes.value().unwrap();

        let mut record = receive(&bytes, version, seq);
        server.unprotect(&mut record);

        assert_valid(&record, suite);
        assert_eq!(
            record.clean_protocol_message_bytes.value(),
            Some(plaintext),
            "{:?} {} len {}",
            suite,
            version,
            len
        );
        assert_eq!(record.content_type(), ContentType::ApplicationData);
    }
}

#[test]
fn cbc_round_trips() {
    let _ = env_logger::try_init();
    for suite in [
        CipherSuite::TLS_RSA_WITH_AES_128_CBC_SHA,
        CipherSuite::TLS_RSA_WITH_AES_256_CBC_SHA,
        CipherSuite::TLS_RSA_WITH_AES_128_CBC_SHA256,
        CipherSuite::TLS_RSA_WITH_AES_256_CBC_SHA256,
        CipherSuite::TLS_ECDHE_RSA_WITH_AES_128_CBC_SHA,
        CipherSuite::TLS_ECDHE_ECDSA_WITH_AES_256_CBC_SHA384,
    ] {
        for version in [
            ProtocolVersion::TLS1_0,
            ProtocolVersion::TLS1_2,
            ProtocolVersion::DTLS1_2,
        ] {
            round_trip(suite, version, false);
            round_trip(suite, version, true);
        }
    }
}

#[test]
fn aead_round_trips() {
    let _ = env_logger::try_init();
    for suite in [
        CipherSuite::TLS_RSA_WITH_AES_128_GCM_SHA256,
        CipherSuite::TLS_RSA_WITH_AES_256_GCM_SHA384,
        CipherSuite::TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256,
        CipherSuite::TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384,
        CipherSuite::TLS_ECDHE_RSA_WITH_CHACHA20_POLY1305_SHA256,
    ] {
        round_trip(suite, ProtocolVersion::TLS1_2, false);
        round_trip(suite, ProtocolVersion::DTLS1_2, false);
    }
}

#[test]
fn tls13_round_trips() {
    let _ = env_logger::try_init();
    for suite in [
        CipherSuite::TLS_AES_128_GCM_SHA256,
        CipherSuite::TLS_AES_256_GCM_SHA384,
        CipherSuite::TLS_CHACHA20_POLY1305_SHA256,
    ] {
        round_trip(suite, ProtocolVersion::TLS1_3, false);
    }
}

#[test]
fn null_cipher_passes_through() {
    let config = Config::default();
    let mut client = RecordProtection::new(
        &config,
        ProtocolVersion::TLS1_2,
        CipherSuite::TLS_NULL_WITH_NULL_NULL,
        ConnectionEnd::Client,
        KeySet::default(),
    )
    .unwrap();
    let record = client
        .protect(ContentType::Handshake, b"hello", Sequence::new(0))
        .unwrap();
    assert_eq!(
        record.complete_record_bytes.value().unwrap(),
        [&[22, 3, 3, 0, 5][..], b"hello"].concat()
    );
}

#[test]
fn stream_round_trips() {
    let _ = env_logger::try_init();
    for suite in [
        CipherSuite::TLS_RSA_WITH_RC4_128_MD5,
        CipherSuite::TLS_RSA_WITH_RC4_128_SHA,
        CipherSuite::TLS_ECDHE_RSA_WITH_RC4_128_SHA,
    ] {
        for version in [
            ProtocolVersion::SSL3_0,
            ProtocolVersion::TLS1_0,
            ProtocolVersion::TLS1_2,
        ] {
            round_trip(suite, version, false);
        }
    }
}

fn invalid(record: &Record) -> bool {
    let c = &record.computations;
    c.mac_valid == Some(false)
        || c.padding_valid == Some(false)
        || c.authentication_tag_valid == Some(false)
}

#[test]
fn flipped_bit_is_flagged() {
    let _ = env_logger::try_init();
    let cases = [
        (CipherSuite::TLS_RSA_WITH_AES_128_CBC_SHA, ProtocolVersion::TLS1_2, false),
        (CipherSuite::TLS_RSA_WITH_AES_128_CBC_SHA256, ProtocolVersion::DTLS1_2, true),
        (CipherSuite::TLS_RSA_WITH_AES_128_GCM_SHA256, ProtocolVersion::DTLS1_2, false),
        (CipherSuite::TLS_ECDHE_RSA_WITH_CHACHA20_POLY1305_SHA256, ProtocolVersion::TLS1_2, false),
        (CipherSuite::TLS_AES_128_GCM_SHA256, ProtocolVersion::TLS1_3, false),
    ];

    for (suite, version, etm) in cases {
        let (mut client, mut server) = pair(suite, version, etm);
        let sent = client
            .protect(ContentType::ApplicationData, &[0x5a; 40], Sequence::new(0))
            .unwrap();
        let bytes = sent.complete_record_bytes.value().unwrap();
        let body = sent.protocol_message_bytes.value().unwrap().len();
        let header = bytes.len() - body;

        for bit in 0..body * 8 {
            let mut tampered = bytes.clone();
            tampered[header + bit / 8] ^= 1 << (bit % 8);

            let mut record = receive(&tampered, version, 0);
            server.unprotect(&mut record);
            assert!(invalid(&record), "{:?} {} bit {}", suite, version, bit);
        }
    }
}

#[test]
fn stream_tamper_is_flagged() {
    let _ = env_logger::try_init();
    let suite = CipherSuite::TLS_RSA_WITH_RC4_128_SHA;
    let version = ProtocolVersion::TLS1_0;

    // The keystream moves on with every record, so each flip needs a fresh pair.
    let (mut client, _) = pair(suite, version, false);
    let sent = client
        .protect(ContentType::ApplicationData, &[0x5a; 12], Sequence::new(0))
        .unwrap();
    let bytes = sent.complete_record_bytes.value().unwrap();
    let body = sent.protocol_message_bytes.value().unwrap().len();
    let header = bytes.len() - body;

    for bit in 0..body * 8 {
        let (_, mut server) = pair(suite, version, false);
        let mut tampered = bytes.clone();
        tampered[header + bit / 8] ^= 1 << (bit % 8);

        let mut record = receive(&tampered, version, 0);
        server.unprotect(&mut record);
        let c = &record.computations;
        assert_eq!(c.mac_valid, Some(false), "bit {}", bit);
        assert_eq!(c.padding_valid, None);
        assert_eq!(c.authentication_tag_valid, None);
    }

    // Shorter than the MAC.
    let (_, mut server) = pair(suite, version, false);
    let mut record = receive(&[23, 3, 1, 0, 4, 1, 2, 3, 4], version, 0);
    server.unprotect(&mut record);
    assert_eq!(record.computations.mac_valid, Some(false));
}

#[test]
fn oversized_payload_is_rejected() {
    let (mut client, _) = pair(
        CipherSuite::TLS_RSA_WITH_RC4_128_SHA,
        ProtocolVersion::TLS1_2,
        false,
    );
    // 65520 bytes plus a 20 byte MAC no longer fit the length field.
    let err = client
        .protect(ContentType::ApplicationData, &vec![0; 65520], Sequence::new(0))
        .unwrap_err();
    assert!(matches!(err, Error::LengthOverflow { len: 65540, .. }), "{:?}", err);
}

#[test]
fn truncated_ciphertext_fails_closed() {
    let (mut client, mut server) = pair(
        CipherSuite::TLS_RSA_WITH_AES_256_CBC_SHA256,
        ProtocolVersion::TLS1_2,
        false,
    );
    let sent = client
        .protect(ContentType::ApplicationData, &[1; 20], Sequence::new(0))
        .unwrap();
    let mut record = sent.clone();
    record
        .protocol_message_bytes
        .add_modification(BytesModification::Delete { start: 20, count: 1000 });
    server.unprotect(&mut record);

    assert_eq!(record.computations.padding_valid, Some(false));
    assert_eq!(record.computations.mac_valid, Some(false));
}

#[test]
fn overrides_reach_the_wire() {
    let (mut client, _) = pair(
        CipherSuite::TLS_RSA_WITH_AES_128_GCM_SHA256,
        ProtocolVersion::DTLS1_2,
        false,
    );
    let mut record = Record::new(
        ContentType::ApplicationData,
        ProtocolVersion::DTLS1_2,
        Sequence::with_number(1, 9),
        b"payload",
    );
    apply_overrides(
        &mut record,
        &[Override::new(
            "content_type",
            tlsprobe::modvar::IntModification::Explicit(0x99),
        )],
    )
    .unwrap();
    client.protect_record(&mut record).unwrap();
    let bytes = record.complete_record_bytes.value().unwrap();
    assert_eq!(bytes[0], 0x99);

    let err = apply_overrides(
        &mut record,
        &[Override::new("no_such_field", BytesModification::Append(vec![1]))],
    )
    .unwrap_err();
    assert!(matches!(err, Error::UnknownField(_)));
}

#[test]
fn coalesced_records_split() {
    let (mut client, _) = pair(
        CipherSuite::TLS_RSA_WITH_AES_128_CBC_SHA,
        ProtocolVersion::DTLS1_2,
        false,
    );
    let mut datagram = Vec::new();
    for seq in 0..3 {
        let sent = client
            .protect(
                ContentType::ApplicationData,
                b"abc",
                Sequence::with_number(1, seq),
            )
            .unwrap();
        datagram.extend(sent.complete_record_bytes.value().unwrap());
    }
    datagram.extend_from_slice(&[23, 0xfe]);

    let parsed = parse_records(&datagram, true);
    assert_eq!(parsed.records.len(), 3);
    assert_eq!(parsed.unparsable, vec![23, 0xfe]);
    let seqs: Vec<u64> = parsed
        .records
        .iter()
        .map(|r| r.sequence().sequence_number)
        .collect();
    assert_eq!(seqs, vec![0, 1, 2]);
}
