//! Packet number truncation and recovery (RFC 9000 §17.1, Appendix A.2 and A.3).

use arrayvec::ArrayVec;

/// Recover a full packet number from its truncated wire form.
///
/// `largest` is the largest packet number successfully processed in the same packet number
/// space, `None` before the first packet. The result is the candidate closest to
/// `largest + 1` that shares the low `8 * pn_len` bits with `truncated`.
pub fn decode_packet_number(truncated: u64, pn_len: usize, largest: Option<u64>) -> u64 {
    let expected = largest.map_or(0, |l| l + 1);
    let pn_nbits = 8 * pn_len.clamp(1, 4) as u32;
    let pn_win = 1u64 << pn_nbits;
    let pn_hwin = pn_win / 2;
    let pn_mask = pn_win - 1;

    let candidate = (expected & !pn_mask) | (truncated & pn_mask);

    if candidate + pn_hwin <= expected && candidate < (1u64 << 62) - pn_win {
        candidate + pn_win
    } else if candidate > expected + pn_hwin && candidate >= pn_win {
        candidate - pn_win
    } else {
        candidate
    }
}

/// Bytes needed to send `full` so the peer can recover it, given the largest packet
/// number it acknowledged.
///
/// The encoding must cover twice the number of unacknowledged packets.
pub fn packet_number_length(full: u64, largest_acked: Option<u64>) -> usize {
    let num_unacked = match largest_acked {
        Some(acked) => full.saturating_sub(acked).max(1),
        None => full.saturating_add(1),
    };
    (1..=4)
        .find(|len| num_unacked <= 1u64 << (8 * len - 1))
        .unwrap_or(4)
}

/// Low `pn_len` bytes of `full`, big-endian.
pub fn encode_packet_number(full: u64, pn_len: usize) -> ArrayVec<u8, 4> {
    let len = pn_len.clamp(1, 4);
    let bytes = full.to_be_bytes();
    bytes[8 - len..].iter().copied().collect()
}
