#![no_main]

//! Fuzz target for record unprotection.
//!
//! Arbitrary bytes are parsed as DTLS 1.2 records and run through CBC (both MAC
//! orders), GCM and TLS 1.3 unprotection. Bad input must only ever clear validity
//! flags.

use libfuzzer_sys::fuzz_target;

use tlsprobe::record::{parse_records, CipherSuite, KeySet, RecordProtection};
use tlsprobe::types::{ConnectionEnd, ProtocolVersion};
use tlsprobe::Config;

fn protection(suite: CipherSuite, version: ProtocolVersion, etm: bool) -> Option<RecordProtection> {
    let bulk = suite.bulk_cipher()?;
    let mac = suite.mac_algorithm().size();
    let iv = if version.is_tls13() { 12 } else { bulk.fixed_iv_len() };
    let keys = KeySet {
        client_write_mac_secret: vec![1; mac],
        server_write_mac_secret: vec![2; mac],
        client_write_key: vec![3; bulk.key_len()],
        server_write_key: vec![4; bulk.key_len()],
        client_write_iv: vec![5; iv],
        server_write_iv: vec![6; iv],
    };
    let config = Config::builder().rng_seed(Some(0)).build().ok()?;
    RecordProtection::new(&config, version, suite, ConnectionEnd::Server, keys)
        .ok()
        .map(|p| p.with_encrypt_then_mac(etm))
}

fuzz_target!(|data: &[u8]| {
    let engines = [
        (CipherSuite::TLS_RSA_WITH_AES_128_CBC_SHA, ProtocolVersion::DTLS1_2, false),
        (CipherSuite::TLS_RSA_WITH_AES_256_CBC_SHA256, ProtocolVersion::DTLS1_2, true),
        (CipherSuite::TLS_RSA_WITH_AES_128_CBC_SHA, ProtocolVersion::TLS1_0, false),
        (CipherSuite::TLS_RSA_WITH_AES_128_GCM_SHA256, ProtocolVersion::DTLS1_2, false),
        (CipherSuite::TLS_ECDHE_RSA_WITH_CHACHA20_POLY1305_SHA256, ProtocolVersion::DTLS1_2, false),
        (CipherSuite::TLS_AES_128_GCM_SHA256, ProtocolVersion::TLS1_3, false),
    ];

    for (suite, version, etm) in engines {
        let Some(mut engine) = protection(suite, version, etm) else {
            return;
        };
        let parsed = parse_records(data, version.is_dtls());
        for mut record in parsed.records {
            engine.unprotect(&mut record);
        }
    }
});
