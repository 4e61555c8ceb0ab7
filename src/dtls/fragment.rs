use nom::bytes::complete::take;
use nom::number::complete::{be_u16, be_u24, be_u8};
use nom::IResult;

use crate::modvar::{FieldMut, FieldRegistry, Modifiable};
use crate::types::HandshakeType;
use crate::util::put_u24;

/// `type(1) ‖ length(3) ‖ message_seq(2) ‖ fragment_offset(3) ‖ fragment_length(3)`.
pub const HANDSHAKE_HEADER_LEN: usize = 12;

/// One DTLS handshake fragment.
///
/// Every header field is modifiable. The accessors return the resolved values, so an
/// overridden header is what the collector and the serializer see.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DtlsHandshakeFragment {
    pub handshake_type: Modifiable<u8>,
    /// Length of the complete message body.
    pub length: Modifiable<u32>,
    pub message_seq: Modifiable<u16>,
    pub fragment_offset: Modifiable<u32>,
    pub fragment_length: Modifiable<u32>,
    pub content: Modifiable<Vec<u8>>,

    /// Epoch of the record that carried the fragment.
    pub epoch: u16,
    /// Upper bound for content when used as a shell by the fragmenter.
    pub max_fragment_length: Option<usize>,
    /// Set on combined fragments rebuilt after the message was already consumed once.
    pub retransmission: bool,
}

impl DtlsHandshakeFragment {
    pub fn new(
        handshake_type: HandshakeType,
        length: u32,
        message_seq: u16,
        fragment_offset: u32,
        content: &[u8],
    ) -> Self {
        DtlsHandshakeFragment {
            handshake_type: Modifiable::with_value(handshake_type.as_u8()),
            length: Modifiable::with_value(length),
            message_seq: Modifiable::with_value(message_seq),
            fragment_offset: Modifiable::with_value(fragment_offset),
            fragment_length: Modifiable::with_value(content.len() as u32),
            content: Modifiable::with_value(content.to_vec()),
            ..Default::default()
        }
    }

    /// An empty fragment used to control sizing in
    /// [`MessageFragmenter::fragment_message_into_shells`][super::MessageFragmenter::fragment_message_into_shells].
    pub fn shell(max_fragment_length: Option<usize>) -> Self {
        DtlsHandshakeFragment {
            max_fragment_length,
            ..Default::default()
        }
    }

    pub fn with_epoch(mut self, epoch: u16) -> Self {
        self.epoch = epoch;
        self
    }

    pub fn handshake_type(&self) -> HandshakeType {
        HandshakeType::from_u8(self.handshake_type.value_or_default())
    }

    pub fn message_length(&self) -> u32 {
        self.length.value_or_default()
    }

    pub fn message_seq(&self) -> u16 {
        self.message_seq.value_or_default()
    }

    pub fn fragment_offset(&self) -> u32 {
        self.fragment_offset.value_or_default()
    }

    pub fn fragment_length(&self) -> u32 {
        self.fragment_length.value_or_default()
    }

    pub fn content(&self) -> Vec<u8> {
        self.content.value_or_default()
    }

    /// True when the fragment claims to carry the complete message.
    pub fn is_whole_message(&self) -> bool {
        self.fragment_offset() == 0 && self.fragment_length() >= self.message_length()
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], DtlsHandshakeFragment> {
        let (input, handshake_type) = be_u8(input)?;
        let (input, length) = be_u24(input)?;
        let (input, message_seq) = be_u16(input)?;
        let (input, fragment_offset) = be_u24(input)?;
        let (input, fragment_length) = be_u24(input)?;
        let (input, content) = take(fragment_length as usize)(input)?;

        Ok((
            input,
            DtlsHandshakeFragment {
                handshake_type: Modifiable::with_value(handshake_type),
                length: Modifiable::with_value(length),
                message_seq: Modifiable::with_value(message_seq),
                fragment_offset: Modifiable::with_value(fragment_offset),
                fragment_length: Modifiable::with_value(fragment_length),
                content: Modifiable::with_value(content.to_vec()),
                ..Default::default()
            },
        ))
    }

    /// Parse every fragment in a handshake record payload.
    pub fn parse_all(mut input: &[u8], epoch: u16) -> ParsedFragments {
        let mut parsed = ParsedFragments::default();

        while !input.is_empty() {
            match Self::parse(input) {
                Ok((rest, fragment)) => {
                    parsed.fragments.push(fragment.with_epoch(epoch));
                    input = rest;
                }
                Err(_) => {
                    debug!("Unparsable handshake fragment bytes: {}", input.len());
                    parsed.unparsable = input.to_vec();
                    break;
                }
            }
        }

        parsed
    }

    /// Serialize using the resolved header values. `fragment_length` is written as
    /// resolved, even when it disagrees with the content.
    pub fn serialize(&self, output: &mut Vec<u8>) {
        output.push(self.handshake_type.value_or_default());
        put_u24(output, self.message_length());
        output.extend_from_slice(&self.message_seq().to_be_bytes());
        put_u24(output, self.fragment_offset());
        put_u24(output, self.fragment_length());
        output.extend_from_slice(&self.content());
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HANDSHAKE_HEADER_LEN + self.fragment_length() as usize);
        self.serialize(&mut out);
        out
    }
}

/// Fragments split from a handshake record payload.
#[derive(Debug, Default)]
pub struct ParsedFragments {
    pub fragments: Vec<DtlsHandshakeFragment>,
    pub unparsable: Vec<u8>,
}

const FIELDS: &[&str] = &[
    "handshake_type",
    "length",
    "message_seq",
    "fragment_offset",
    "fragment_length",
    "content",
];

impl FieldRegistry for DtlsHandshakeFragment {
    fn field_names(&self) -> &'static [&'static str] {
        FIELDS
    }

    fn field_mut(&mut self, name: &str) -> Option<FieldMut<'_>> {
        Some(match name {
            "handshake_type" => FieldMut::U8(&mut self.handshake_type),
            "length" => FieldMut::U32(&mut self.length),
            "message_seq" => FieldMut::U16(&mut self.message_seq),
            "fragment_offset" => FieldMut::U32(&mut self.fragment_offset),
            "fragment_length" => FieldMut::U32(&mut self.fragment_length),
            "content" => FieldMut::Bytes(&mut self.content),
            _ => return None,
        })
    }
}
