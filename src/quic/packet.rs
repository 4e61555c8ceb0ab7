use nom::bytes::complete::take;
use nom::error::{Error as NomError, ErrorKind};
use nom::number::complete::{be_u32, be_u8};
use nom::{Err, IResult};

use crate::modvar::{FieldMut, FieldRegistry, Modifiable};
use crate::Error;

use super::varint::{parse_varint, put_varint, put_varint_with_len};
use super::{PacketType, RETRY_TAG_LEN};

/// A QUIC packet on its way through protection.
///
/// Parsed packets hold the header bytes as received and the still protected
/// `packet number ‖ payload`. Built packets hold the header fields and the plaintext
/// payload. The protection pipeline fills in the rest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuicPacket {
    pub packet_type: PacketType,

    pub protected_flags: Modifiable<u8>,
    pub unprotected_flags: Modifiable<u8>,
    /// Long header only.
    pub version: Modifiable<u32>,
    pub destination_connection_id: Modifiable<Vec<u8>>,
    /// Long header only.
    pub source_connection_id: Modifiable<Vec<u8>>,
    /// Initial and Retry only.
    pub token: Modifiable<Vec<u8>>,
    /// Retry only.
    pub retry_integrity_tag: Modifiable<Vec<u8>>,
    /// Long header `Length` field: packet number plus protected payload.
    pub length: Modifiable<u64>,

    pub packet_number_length: Modifiable<u8>,
    pub protected_packet_number: Modifiable<Vec<u8>>,
    pub unprotected_packet_number: Modifiable<Vec<u8>>,
    /// Full packet number.
    pub restored_packet_number: Modifiable<u64>,

    pub header_protection_sample: Modifiable<Vec<u8>>,
    /// Unprotected header from the flags through the packet number; the AEAD AAD.
    pub unprotected_header: Modifiable<Vec<u8>>,
    pub protected_payload: Modifiable<Vec<u8>>,
    pub unprotected_payload: Modifiable<Vec<u8>>,
    pub complete_packet_bytes: Modifiable<Vec<u8>>,

    // Header as received, from the (protected) flags to the packet number.
    received_header: Vec<u8>,
    // Received bytes after the header: protected packet number and payload.
    received_pn_and_payload: Vec<u8>,
}

impl QuicPacket {
    fn empty(packet_type: PacketType) -> Self {
        QuicPacket {
            packet_type,
            protected_flags: Modifiable::new(),
            unprotected_flags: Modifiable::new(),
            version: Modifiable::new(),
            destination_connection_id: Modifiable::new(),
            source_connection_id: Modifiable::new(),
            token: Modifiable::new(),
            retry_integrity_tag: Modifiable::new(),
            length: Modifiable::new(),
            packet_number_length: Modifiable::new(),
            protected_packet_number: Modifiable::new(),
            unprotected_packet_number: Modifiable::new(),
            restored_packet_number: Modifiable::new(),
            header_protection_sample: Modifiable::new(),
            unprotected_header: Modifiable::new(),
            protected_payload: Modifiable::new(),
            unprotected_payload: Modifiable::new(),
            complete_packet_bytes: Modifiable::new(),
            received_header: Vec::new(),
            received_pn_and_payload: Vec::new(),
        }
    }

    /// A long header packet of `version` to be protected.
    ///
    /// The packet number length is left to the protection pipeline unless set here.
    pub fn new_long(
        version: u32,
        packet_type: PacketType,
        destination_connection_id: &[u8],
        source_connection_id: &[u8],
        packet_number: u64,
        payload: &[u8],
    ) -> Self {
        let mut p = Self::empty(packet_type);
        let bits = packet_type.long_bits(version).unwrap_or(0);
        p.unprotected_flags.set(0xc0 | (bits << 4));
        p.version.set(version);
        p.destination_connection_id.set(destination_connection_id.to_vec());
        p.source_connection_id.set(source_connection_id.to_vec());
        if packet_type == PacketType::Initial {
            p.token.set(Vec::new());
        }
        p.restored_packet_number.set(packet_number);
        p.unprotected_payload.set(payload.to_vec());
        p
    }

    /// A Retry packet. Its integrity tag is computed by
    /// [`QuicPacketProtection::protect_retry`][super::QuicPacketProtection::protect_retry].
    pub fn new_retry(
        version: u32,
        destination_connection_id: &[u8],
        source_connection_id: &[u8],
        token: &[u8],
    ) -> Self {
        let mut p = Self::empty(PacketType::Retry);
        let bits = PacketType::Retry.long_bits(version).unwrap_or(0);
        p.unprotected_flags.set(0xc0 | (bits << 4));
        p.version.set(version);
        p.destination_connection_id.set(destination_connection_id.to_vec());
        p.source_connection_id.set(source_connection_id.to_vec());
        p.token.set(token.to_vec());
        p
    }

    /// A short header (1-RTT) packet to be protected. Spin and key phase bits are zero.
    pub fn new_short(destination_connection_id: &[u8], packet_number: u64, payload: &[u8]) -> Self {
        let mut p = Self::empty(PacketType::OneRtt);
        p.unprotected_flags.set(0x40);
        p.destination_connection_id.set(destination_connection_id.to_vec());
        p.restored_packet_number.set(packet_number);
        p.unprotected_payload.set(payload.to_vec());
        p
    }

    pub fn with_token(mut self, token: &[u8]) -> Self {
        self.token.set(token.to_vec());
        self
    }

    pub fn with_packet_number_length(mut self, len: u8) -> Self {
        self.packet_number_length.set(len);
        self
    }

    pub fn is_long_header(&self) -> bool {
        self.packet_type.is_long_header()
    }

    /// Header bytes as received, empty for built packets.
    pub fn received_header(&self) -> &[u8] {
        &self.received_header
    }

    /// Protected packet number and payload as received, empty for built packets.
    pub fn received_pn_and_payload(&self) -> &[u8] {
        &self.received_pn_and_payload
    }

    /// Parse one packet. `short_dcid_len` is the connection ID length the local endpoint
    /// issued, short headers do not carry it.
    ///
    /// The rest of a datagram after a long header packet (coalesced packets) is returned
    /// as the remaining input.
    pub fn parse(input: &[u8], short_dcid_len: usize) -> IResult<&[u8], QuicPacket> {
        let original = input;
        let (input, flags) = be_u8(input)?;

        if flags & 0x80 == 0 {
            let (pn_and_payload, dcid) = take(short_dcid_len)(input)?;
            let header_len = 1 + short_dcid_len;

            let mut p = Self::empty(PacketType::OneRtt);
            p.protected_flags.set(flags);
            p.destination_connection_id.set(dcid.to_vec());
            p.received_header = original[..header_len].to_vec();
            p.received_pn_and_payload = pn_and_payload.to_vec();
            p.complete_packet_bytes.set(original.to_vec());
            return Ok((&[], p));
        }

        let (input, version) = be_u32(input)?;
        if version == 0 {
            // Version negotiation carries no protected payload.
            return Err(Err::Error(NomError::new(original, ErrorKind::Verify)));
        }
        let (input, dcid_len) = be_u8(input)?;
        let (input, dcid) = take(dcid_len)(input)?;
        let (input, scid_len) = be_u8(input)?;
        let (input, scid) = take(scid_len)(input)?;

        let packet_type = PacketType::from_long_bits(version, flags >> 4);
        let mut p = Self::empty(packet_type);
        p.protected_flags.set(flags);
        p.version.set(version);
        p.destination_connection_id.set(dcid.to_vec());
        p.source_connection_id.set(scid.to_vec());

        if packet_type == PacketType::Retry {
            // Retry token and integrity tag run to the end of the datagram.
            let Some(token_len) = input.len().checked_sub(RETRY_TAG_LEN) else {
                return Err(Err::Error(NomError::new(input, ErrorKind::Eof)));
            };
            let (token, tag) = input.split_at(token_len);
            p.unprotected_flags.set(flags);
            p.token.set(token.to_vec());
            p.retry_integrity_tag.set(tag.to_vec());
            p.received_header = original[..original.len() - input.len()].to_vec();
            p.complete_packet_bytes.set(original.to_vec());
            return Ok((&[], p));
        }

        let input = if packet_type == PacketType::Initial {
            let (input, token_len) = parse_varint(input)?;
            let (input, token) = take(token_len)(input)?;
            p.token.set(token.to_vec());
            input
        } else {
            input
        };

        let (input, length) = parse_varint(input)?;
        let header_len = original.len() - input.len();
        let (rest, pn_and_payload) = take(length)(input)?;

        p.length.set(length);
        p.received_header = original[..header_len].to_vec();
        p.received_pn_and_payload = pn_and_payload.to_vec();
        let consumed = original.len() - rest.len();
        p.complete_packet_bytes.set(original[..consumed].to_vec());

        Ok((rest, p))
    }

    /// Split a datagram into its (coalesced) packets.
    pub fn parse_datagram(mut input: &[u8], short_dcid_len: usize) -> ParsedPackets {
        let mut parsed = ParsedPackets::default();

        while !input.is_empty() {
            match Self::parse(input, short_dcid_len) {
                Ok((rest, packet)) => {
                    trace!("Parsed {} packet", packet.packet_type);
                    parsed.packets.push(packet);
                    input = rest;
                }
                Err(_) => {
                    debug!("Unparsable QUIC bytes: {}", input.len());
                    parsed.unparsable = input.to_vec();
                    break;
                }
            }
        }

        parsed
    }

    /// Header bytes after the flags and before the packet number, built from the resolved
    /// field values. `length` is the `Length` field for long headers.
    pub(crate) fn build_header_body(&self, length: u64) -> Result<Vec<u8>, Error> {
        let mut out = Vec::new();
        let dcid = self.destination_connection_id.value_or_default();

        if !self.is_long_header() {
            out.extend_from_slice(&dcid);
            return Ok(out);
        }

        let scid = self.source_connection_id.value_or_default();
        out.extend_from_slice(&self.version.value_or_default().to_be_bytes());
        put_connection_id(&mut out, &dcid)?;
        put_connection_id(&mut out, &scid)?;
        if self.packet_type == PacketType::Initial {
            let token = self.token.value_or_default();
            put_varint(&mut out, token.len() as u64)?;
            out.extend_from_slice(&token);
        }
        // Two bytes whenever possible, so the header size does not depend on the payload.
        if length < 16384 {
            put_varint_with_len(&mut out, length, 2)?;
        } else {
            put_varint(&mut out, length)?;
        }
        Ok(out)
    }

    /// Retry packet without its integrity tag, built from the resolved field values.
    pub(crate) fn build_retry_body(&self) -> Result<Vec<u8>, Error> {
        let dcid = self.destination_connection_id.value_or_default();
        let scid = self.source_connection_id.value_or_default();
        let mut out = vec![self.unprotected_flags.value_or_default()];
        out.extend_from_slice(&self.version.value_or_default().to_be_bytes());
        put_connection_id(&mut out, &dcid)?;
        put_connection_id(&mut out, &scid)?;
        out.extend_from_slice(&self.token.value_or_default());
        Ok(out)
    }
}

/// Length-prefixed connection ID of a long header.
fn put_connection_id(out: &mut Vec<u8>, cid: &[u8]) -> Result<(), Error> {
    let len = u8::try_from(cid.len()).map_err(|_| Error::LengthOverflow {
        what: "connection ID",
        len: cid.len(),
        max: u8::MAX as usize,
    })?;
    out.push(len);
    out.extend_from_slice(cid);
    Ok(())
}

/// Packets split from one datagram.
#[derive(Debug, Default)]
pub struct ParsedPackets {
    pub packets: Vec<QuicPacket>,
    pub unparsable: Vec<u8>,
}

const FIELDS: &[&str] = &[
    "protected_flags",
    "unprotected_flags",
    "version",
    "destination_connection_id",
    "source_connection_id",
    "token",
    "retry_integrity_tag",
    "length",
    "packet_number_length",
    "protected_packet_number",
    "unprotected_packet_number",
    "restored_packet_number",
    "header_protection_sample",
    "unprotected_header",
    "protected_payload",
    "unprotected_payload",
    "complete_packet_bytes",
];

impl FieldRegistry for QuicPacket {
    fn field_names(&self) -> &'static [&'static str] {
        FIELDS
    }

    fn field_mut(&mut self, name: &str) -> Option<FieldMut<'_>> {
        Some(match name {
            "protected_flags" => FieldMut::U8(&mut self.protected_flags),
            "unprotected_flags" => FieldMut::U8(&mut self.unprotected_flags),
            "version" => FieldMut::U32(&mut self.version),
            "destination_connection_id" => FieldMut::Bytes(&mut self.destination_connection_id),
            "source_connection_id" => FieldMut::Bytes(&mut self.source_connection_id),
            "token" => FieldMut::Bytes(&mut self.token),
            "retry_integrity_tag" => FieldMut::Bytes(&mut self.retry_integrity_tag),
            "length" => FieldMut::U64(&mut self.length),
            "packet_number_length" => FieldMut::U8(&mut self.packet_number_length),
            "protected_packet_number" => FieldMut::Bytes(&mut self.protected_packet_number),
            "unprotected_packet_number" => FieldMut::Bytes(&mut self.unprotected_packet_number),
            "restored_packet_number" => FieldMut::U64(&mut self.restored_packet_number),
            "header_protection_sample" => FieldMut::Bytes(&mut self.header_protection_sample),
            "unprotected_header" => FieldMut::Bytes(&mut self.unprotected_header),
            "protected_payload" => FieldMut::Bytes(&mut self.protected_payload),
            "unprotected_payload" => FieldMut::Bytes(&mut self.unprotected_payload),
            "complete_packet_bytes" => FieldMut::Bytes(&mut self.complete_packet_bytes),
            _ => return None,
        })
    }
}
