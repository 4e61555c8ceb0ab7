//! Variable-length integers (RFC 9000 §16).
//!
//! | 2MSB | Length | Usable bits |
//! |------|--------|-------------|
//! | 00   | 1      | 6           |
//! | 01   | 2      | 14          |
//! | 10   | 4      | 30          |
//! | 11   | 8      | 62          |

use nom::bytes::complete::take;
use nom::number::complete::be_u8;
use nom::IResult;

use crate::Error;

/// Largest value a varint can hold (2^62 - 1).
pub const MAX_VARINT: u64 = (1 << 62) - 1;

/// Bytes needed for the minimal encoding of `value`.
pub const fn varint_len(value: u64) -> usize {
    if value <= 63 {
        1
    } else if value <= 16383 {
        2
    } else if value <= 1_073_741_823 {
        4
    } else {
        8
    }
}

pub fn parse_varint(input: &[u8]) -> IResult<&[u8], u64> {
    let (_, first) = be_u8(input)?;
    let len = 1usize << (first >> 6);
    let (input, bytes) = take(len)(input)?;

    let value = bytes[1..]
        .iter()
        .fold(u64::from(first & 0x3f), |acc, b| (acc << 8) | u64::from(*b));

    Ok((input, value))
}

/// Append the minimal encoding of `value`.
pub fn put_varint(out: &mut Vec<u8>, value: u64) -> Result<(), Error> {
    put_varint_with_len(out, value, varint_len(value))
}

/// Append `value` encoded in exactly `len` bytes (1, 2, 4 or 8).
///
/// Non-minimal encodings are legal on the wire.
pub fn put_varint_with_len(out: &mut Vec<u8>, value: u64, len: usize) -> Result<(), Error> {
    if value > MAX_VARINT || !matches!(len, 1 | 2 | 4 | 8) || varint_len(value) > len {
        return Err(Error::VarintOutOfRange(value));
    }
    let tag = match len {
        1 => 0x00,
        2 => 0x40,
        4 => 0x80,
        _ => 0xc0,
    };
    let bytes = value.to_be_bytes();
    let start = out.len();
    out.extend_from_slice(&bytes[8 - len..]);
    out[start] |= tag;
    Ok(())
}
