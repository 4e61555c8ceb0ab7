#![no_main]

//! Fuzz target for QUIC packet parsing and unprotection.
//!
//! The input is split into packets as a received datagram and every packet goes
//! through header protection removal and decryption with fixed keys on every level.

use libfuzzer_sys::fuzz_target;

use tlsprobe::crypto::BulkCipher;
use tlsprobe::quic::{EncryptionLevel, QuicContext, QuicKeySet, QuicKeys, QuicPacket, QuicPacketProtection};
use tlsprobe::types::ConnectionEnd;
use tlsprobe::Config;

fn context(cipher: BulkCipher) -> Option<QuicContext> {
    let len = cipher.key_len();
    let mut ctx = QuicContext::new();
    for level in EncryptionLevel::ALL {
        let client = QuicKeys::new(&vec![1; len], &[2; 12], &vec![3; len]);
        let server = QuicKeys::new(&vec![4; len], &[5; 12], &vec![6; len]);
        ctx.install_keys(level, QuicKeySet::new(cipher, client, server).ok()?);
    }
    Some(ctx)
}

fuzz_target!(|data: &[u8]| {
    let protection = QuicPacketProtection::new(&Config::default(), ConnectionEnd::Server);

    for cipher in [BulkCipher::Aes128Gcm, BulkCipher::ChaCha20Poly1305] {
        let Some(mut ctx) = context(cipher) else {
            return;
        };
        let parsed = QuicPacket::parse_datagram(data, 8);
        for mut packet in parsed.packets {
            let _ = protection.unprotect(&mut ctx, &mut packet);
        }
    }
});
