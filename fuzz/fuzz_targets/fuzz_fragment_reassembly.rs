#![no_main]

//! Fuzz target for DTLS handshake fragment reassembly.
//!
//! The first byte selects collector options, the rest is parsed as a sequence of
//! handshake fragments and fed to a fragment manager.

use libfuzzer_sys::fuzz_target;

use tlsprobe::dtls::{DtlsHandshakeFragment, FragmentManager};
use tlsprobe::Config;

fuzz_target!(|data: &[u8]| {
    let Some((&options, rest)) = data.split_first() else {
        return;
    };

    let Ok(config) = Config::builder()
        .accept_only_fitting_dtls_fragments(options & 0x01 != 0)
        .accept_content_rewriting_dtls_fragments(options & 0x02 != 0)
        .track_dtls_retransmissions(options & 0x04 != 0)
        .fragment_fill_byte(options)
        .build()
    else {
        return;
    };

    let mut manager = FragmentManager::new(&config);
    let parsed = DtlsHandshakeFragment::parse_all(rest, u16::from(options >> 4));

    for (i, fragment) in parsed.fragments.iter().enumerate() {
        manager.add_message_fragment(fragment);
        if i % 3 == 2 {
            for combined in manager.get_ordered_combined_uninterpreted_message_fragments(false) {
                assert_eq!(combined.content().len(), combined.message_length() as usize);
            }
        }
    }

    let _ = manager.get_ordered_combined_uninterpreted_message_fragments(true);
});
