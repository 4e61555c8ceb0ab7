//! TLS and DTLS records and their protection.
//!
//! A [`Record`] carries every header and payload field as a [`Modifiable`] so a caller can
//! corrupt any of them between computation and serialization. [`RecordProtection`] turns
//! clean bytes into protected bytes and back for one direction pair of a connection.

use nom::bytes::complete::take;
use nom::number::complete::{be_u16, be_u8};
use nom::IResult;

use crate::modvar::{FieldMut, FieldRegistry, Modifiable};
use crate::types::{ContentType, ProtocolVersion, Sequence};
use crate::util::{be_u48, put_u48};

mod computations;
mod keys;
mod protection;
mod suite;

pub use computations::RecordCryptoComputations;
pub use keys::KeySet;
pub use protection::RecordProtection;
pub use suite::CipherSuite;

/// TLS record header length.
pub const TLS_HEADER_LEN: usize = 5;

/// DTLS record header length.
pub const DTLS_HEADER_LEN: usize = 13;

/// One TLS or DTLS record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Record {
    pub content_type: Modifiable<u8>,
    pub protocol_version: Modifiable<u16>,
    /// Length of the transported payload.
    pub length: Modifiable<u16>,
    /// DTLS only.
    pub epoch: Modifiable<u16>,
    /// Explicit (48-bit) in DTLS, implicit in TLS.
    pub sequence_number: Modifiable<u64>,
    /// Payload as transported (ciphertext for protected records).
    pub protocol_message_bytes: Modifiable<Vec<u8>>,
    /// Payload fully decrypted and unpadded.
    pub clean_protocol_message_bytes: Modifiable<Vec<u8>>,
    pub complete_record_bytes: Modifiable<Vec<u8>>,
    pub computations: RecordCryptoComputations,
}

impl Record {
    /// A record about to be protected.
    pub fn new(
        content_type: ContentType,
        version: ProtocolVersion,
        sequence: Sequence,
        clean: &[u8],
    ) -> Self {
        Record {
            content_type: Modifiable::with_value(content_type.as_u8()),
            protocol_version: Modifiable::with_value(version.as_u16()),
            epoch: Modifiable::with_value(sequence.epoch),
            sequence_number: Modifiable::with_value(sequence.sequence_number),
            clean_protocol_message_bytes: Modifiable::with_value(clean.to_vec()),
            ..Default::default()
        }
    }

    pub fn content_type(&self) -> ContentType {
        ContentType::from_u8(self.content_type.value_or_default())
    }

    pub fn version(&self) -> ProtocolVersion {
        ProtocolVersion::from_u16(self.protocol_version.value_or_default())
    }

    pub fn sequence(&self) -> Sequence {
        Sequence::with_number(
            self.epoch.value_or_default(),
            self.sequence_number.value_or_default(),
        )
    }

    /// Parse one record. `dtls` selects the 13-byte header.
    pub fn parse(input: &[u8], dtls: bool) -> IResult<&[u8], Record> {
        let original = input;
        let (input, content_type) = be_u8(input)?;
        let (input, version) = be_u16(input)?;
        let (input, epoch, sequence_number) = if dtls {
            let (input, epoch) = be_u16(input)?;
            let (input, seq) = be_u48(input)?;
            (input, Some(epoch), Some(seq))
        } else {
            (input, None, None)
        };
        let (input, length) = be_u16(input)?;
        let (input, fragment) = take(length as usize)(input)?;

        let consumed = original.len() - input.len();

        let mut record = Record {
            content_type: Modifiable::with_value(content_type),
            protocol_version: Modifiable::with_value(version),
            length: Modifiable::with_value(length),
            protocol_message_bytes: Modifiable::with_value(fragment.to_vec()),
            complete_record_bytes: Modifiable::with_value(original[..consumed].to_vec()),
            ..Default::default()
        };
        if let Some(epoch) = epoch {
            record.epoch.set(epoch);
        }
        if let Some(seq) = sequence_number {
            record.sequence_number.set(seq);
        }

        Ok((input, record))
    }

    /// Serialize header and protocol message bytes using the current (possibly
    /// overridden) values.
    pub fn serialize(&self, dtls: bool, output: &mut Vec<u8>) {
        output.push(self.content_type.value_or_default());
        output.extend_from_slice(&self.protocol_version.value_or_default().to_be_bytes());
        if dtls {
            output.extend_from_slice(&self.epoch.value_or_default().to_be_bytes());
            put_u48(output, self.sequence_number.value_or_default());
        }
        output.extend_from_slice(&self.length.value_or_default().to_be_bytes());
        output.extend_from_slice(&self.protocol_message_bytes.value_or_default());
    }

    /// Serialize into `complete_record_bytes` and return the resolved bytes.
    pub fn finalize(&mut self, dtls: bool) -> Vec<u8> {
        let mut out = Vec::new();
        self.serialize(dtls, &mut out);
        self.complete_record_bytes.compute(out)
    }
}

const FIELDS: &[&str] = &[
    "content_type",
    "protocol_version",
    "length",
    "epoch",
    "sequence_number",
    "protocol_message_bytes",
    "clean_protocol_message_bytes",
    "complete_record_bytes",
];

/// Record fields by name. Names prefixed with `computations.` reach the
/// [`RecordCryptoComputations`].
impl FieldRegistry for Record {
    fn field_names(&self) -> &'static [&'static str] {
        FIELDS
    }

    fn field_mut(&mut self, name: &str) -> Option<FieldMut<'_>> {
        if let Some(inner) = name.strip_prefix("computations.") {
            return self.computations.field_mut(inner);
        }
        Some(match name {
            "content_type" => FieldMut::U8(&mut self.content_type),
            "protocol_version" => FieldMut::U16(&mut self.protocol_version),
            "length" => FieldMut::U16(&mut self.length),
            "epoch" => FieldMut::U16(&mut self.epoch),
            "sequence_number" => FieldMut::U64(&mut self.sequence_number),
            "protocol_message_bytes" => FieldMut::Bytes(&mut self.protocol_message_bytes),
            "clean_protocol_message_bytes" => {
                FieldMut::Bytes(&mut self.clean_protocol_message_bytes)
            }
            "complete_record_bytes" => FieldMut::Bytes(&mut self.complete_record_bytes),
            _ => return None,
        })
    }
}

/// Records split from a datagram or stream chunk.
#[derive(Debug, Default)]
pub struct ParsedRecords {
    pub records: Vec<Record>,
    /// Bytes after the last complete record. Not an error for a stream, suspicious
    /// for a datagram.
    pub unparsable: Vec<u8>,
}

/// Split `input` into records until it is exhausted or a record is truncated.
pub fn parse_records(mut input: &[u8], dtls: bool) -> ParsedRecords {
    let mut parsed = ParsedRecords::default();

    while !input.is_empty() {
        match Record::parse(input, dtls) {
            Ok((rest, record)) => {
                parsed.records.push(record);
                input = rest;
            }
            Err(_) => {
                trace!("Unparsable record bytes: {}", input.len());
                parsed.unparsable = input.to_vec();
                break;
            }
        }
    }

    parsed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modvar::{apply_overrides, IntModification, Override};

    const RECORD: &[u8] = &[
        0x16, // ContentType::Handshake
        0xFE, 0xFD, // ProtocolVersion::DTLS1_2
        0x00, 0x01, // epoch
        0x00, 0x00, 0x00, 0x00, 0x00, 0x01, // sequence_number
        0x00, 0x10, // length
        // fragment
        0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0A, 0x0B, 0x0C, 0x0D, 0x0E, 0x0F,
        0x10,
    ];

    #[test]
    fn parse_dtls_record() {
        let (rest, record) = Record::parse(RECORD, true).unwrap();
        assert!(rest.is_empty());
        assert_eq!(record.content_type(), ContentType::Handshake);
        assert_eq!(record.version(), ProtocolVersion::DTLS1_2);
        assert_eq!(record.sequence(), Sequence::with_number(1, 1));
        assert_eq!(record.protocol_message_bytes.value().unwrap(), &RECORD[13..]);

        let mut out = Vec::new();
        record.serialize(true, &mut out);
        assert_eq!(out, RECORD);
    }

    #[test]
    fn truncated_record_is_unparsable() {
        let parsed = parse_records(&RECORD[..20], true);
        assert!(parsed.records.is_empty());
        assert_eq!(parsed.unparsable.len(), 20);
    }

    #[test]
    fn multiple_tls_records() {
        let data = [23, 3, 3, 0, 1, 0xaa, 21, 3, 3, 0, 2, 1, 2, 22];
        let parsed = parse_records(&data, false);
        assert_eq!(parsed.records.len(), 2);
        assert_eq!(parsed.records[1].content_type(), ContentType::Alert);
        assert_eq!(parsed.unparsable, [22]);
    }

    #[test]
    fn overridden_length_is_serialized() {
        let (_, mut record) = Record::parse(RECORD, true).unwrap();
        apply_overrides(
            &mut record,
            &[Override::new("length", IntModification::Add(1))],
        )
        .unwrap();

        let bytes = record.finalize(true);
        assert_eq!(&bytes[11..13], &[0x00, 0x11]);
        // Payload itself is unchanged.
        assert_eq!(bytes.len(), RECORD.len());
    }
}
