use nom::number::complete::{be_u24, be_u8};
use nom::IResult;

use crate::config::Config;
use crate::types::HandshakeType;
use crate::Error;

use super::DtlsHandshakeFragment;

/// Handshake lengths and offsets are 24-bit fields.
const MAX_MESSAGE_LENGTH: usize = (1 << 24) - 1;

fn message_length(body: &[u8]) -> Result<u32, Error> {
    if body.len() > MAX_MESSAGE_LENGTH {
        return Err(Error::LengthOverflow {
            what: "handshake message",
            len: body.len(),
            max: MAX_MESSAGE_LENGTH,
        });
    }
    Ok(body.len() as u32)
}

/// Split `body` into sequential fragments of at most `max_fragment_length` bytes.
///
/// An empty body produces one empty fragment.
pub fn fragment_message(
    handshake_type: HandshakeType,
    message_seq: u16,
    body: &[u8],
    max_fragment_length: usize,
) -> Result<Vec<DtlsHandshakeFragment>, Error> {
    if max_fragment_length == 0 {
        return Err(Error::InvalidFragmentLength(0));
    }

    let total = message_length(body)?;
    if body.is_empty() {
        return Ok(vec![DtlsHandshakeFragment::new(
            handshake_type,
            0,
            message_seq,
            0,
            &[],
        )]);
    }

    let fragments = body
        .chunks(max_fragment_length)
        .scan(0usize, |offset, chunk| {
            let f = DtlsHandshakeFragment::new(
                handshake_type,
                total,
                message_seq,
                *offset as u32,
                chunk,
            );
            *offset += chunk.len();
            Some(f)
        })
        .collect();

    Ok(fragments)
}

/// Outgoing side of DTLS handshake fragmentation for one connection.
#[derive(Debug, Clone)]
pub struct MessageFragmenter {
    max_fragment_length: usize,
    create_dynamically: bool,
    use_all_provided: bool,
    next_message_seq: u16,
}

impl MessageFragmenter {
    pub fn new(config: &Config) -> Self {
        MessageFragmenter {
            max_fragment_length: config.dtls_max_fragment_length(),
            create_dynamically: config.create_fragments_dynamically(),
            use_all_provided: config.use_all_provided_dtls_fragments(),
            next_message_seq: 0,
        }
    }

    /// Sequence number the next handshake message will be sent with.
    pub fn next_message_seq(&self) -> u16 {
        self.next_message_seq
    }

    pub fn set_next_message_seq(&mut self, seq: u16) {
        self.next_message_seq = seq;
    }

    /// Fragment a serialized `type ‖ length(3) ‖ body` handshake message and advance the
    /// outgoing message sequence.
    ///
    /// The `length` written into the fragments is the one in `message`, even if it
    /// disagrees with the body.
    pub fn fragment_handshake_message(
        &mut self,
        message: &[u8],
    ) -> Result<Vec<DtlsHandshakeFragment>, Error> {
        let (body, (handshake_type, length)) = parse_handshake_header(message)?;
        if length as usize != body.len() {
            warn!(
                "Handshake {:?} declares {} bytes, carries {}",
                handshake_type,
                length,
                body.len()
            );
        }

        let seq = self.next_message_seq;
        let mut fragments =
            fragment_message(handshake_type, seq, body, self.max_fragment_length)?;
        if length as usize != body.len() {
            for f in &mut fragments {
                f.length.set(length);
            }
        }

        self.next_message_seq = self.next_message_seq.wrapping_add(1);
        debug!(
            "Fragmented {:?} message_seq {} into {}",
            handshake_type,
            seq,
            fragments.len()
        );
        Ok(fragments)
    }

    /// Distribute `body` over caller-provided shells, in order.
    ///
    /// Each shell takes at most its own `max_fragment_length` (or the configured default).
    /// Modifications registered on a shell's fields stay in effect. Content left over after
    /// the last shell is fragmented with the default size when dynamic creation is
    /// enabled, and dropped otherwise. Shells left over after the content ran out are
    /// dropped unless all provided fragments are to be used, in which case they are sent
    /// empty.
    pub fn fragment_message_into_shells(
        &self,
        handshake_type: HandshakeType,
        message_seq: u16,
        body: &[u8],
        shells: Vec<DtlsHandshakeFragment>,
    ) -> Result<Vec<DtlsHandshakeFragment>, Error> {
        message_length(body)?;
        let total = body.len();
        let mut offset = 0;
        let mut out = Vec::with_capacity(shells.len());

        for mut shell in shells {
            let max = shell.max_fragment_length.unwrap_or(self.max_fragment_length);
            if max == 0 {
                return Err(Error::InvalidFragmentLength(0));
            }

            let remaining = total - offset;
            if remaining == 0 && !out.is_empty() && !self.use_all_provided {
                trace!("Dropping unused fragment shell");
                continue;
            }

            let len = remaining.min(max);
            fill_shell(
                &mut shell,
                handshake_type,
                message_seq,
                total as u32,
                offset,
                &body[offset..offset + len],
            );
            offset += len;
            out.push(shell);
        }

        if offset < total {
            if self.create_dynamically {
                let extra = fragment_message(
                    handshake_type,
                    message_seq,
                    &body[offset..],
                    self.max_fragment_length,
                )?;
                for mut f in extra {
                    let shifted = f.fragment_offset() + offset as u32;
                    f.fragment_offset.set(shifted);
                    f.length.set(total as u32);
                    out.push(f);
                }
            } else {
                warn!(
                    "Dropping {} bytes of {:?} that did not fit the provided fragments",
                    total - offset,
                    handshake_type
                );
            }
        }

        if out.is_empty() {
            out.push(self.wrap_in_single_fragment(handshake_type, message_seq, &[])?);
        }

        Ok(out)
    }

    /// The whole body in one fragment.
    pub fn wrap_in_single_fragment(
        &self,
        handshake_type: HandshakeType,
        message_seq: u16,
        body: &[u8],
    ) -> Result<DtlsHandshakeFragment, Error> {
        let total = message_length(body)?;
        Ok(DtlsHandshakeFragment::new(
            handshake_type,
            total,
            message_seq,
            0,
            body,
        ))
    }
}

fn fill_shell(
    shell: &mut DtlsHandshakeFragment,
    handshake_type: HandshakeType,
    message_seq: u16,
    total: u32,
    offset: usize,
    content: &[u8],
) {
    shell.handshake_type.compute(handshake_type.as_u8());
    shell.length.compute(total);
    shell.message_seq.compute(message_seq);
    shell.fragment_offset.compute(offset as u32);
    shell.fragment_length.compute(content.len() as u32);
    shell.content.compute(content.to_vec());
}

fn parse_handshake_header(input: &[u8]) -> IResult<&[u8], (HandshakeType, u32)> {
    let (body, handshake_type) = be_u8(input)?;
    let (body, length) = be_u24(body)?;
    Ok((body, (HandshakeType::from_u8(handshake_type), length)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(n: usize) -> Vec<u8> {
        (0..n).map(|i| i as u8).collect()
    }

    fn check_sequential(fragments: &[DtlsHandshakeFragment], body: &[u8], max: usize) {
        let mut offset = 0;
        let mut joined = Vec::new();
        for f in fragments {
            let content = f.content();
            assert_eq!(f.fragment_length() as usize, content.len());
            assert!(content.len() <= max);
            assert_eq!(f.fragment_offset() as usize, offset);
            assert_eq!(f.message_length() as usize, body.len());
            offset += content.len();
            joined.extend_from_slice(&content);
        }
        assert_eq!(joined, body);
    }

    #[test]
    fn uniform_fragments() {
        let b = body(300);
        let fragments = fragment_message(HandshakeType::ClientHello, 0, &b, 128).unwrap();
        assert_eq!(fragments.len(), 3);
        assert_eq!(fragments[2].content().len(), 44);
        check_sequential(&fragments, &b, 128);
    }

    #[test]
    fn empty_body_single_fragment() {
        let fragments = fragment_message(HandshakeType::ServerHelloDone, 4, &[], 100).unwrap();
        assert_eq!(fragments.len(), 1);
        assert_eq!(fragments[0].fragment_length(), 0);
        assert_eq!(fragments[0].message_seq(), 4);
    }

    #[test]
    fn zero_max_rejected() {
        assert_eq!(
            fragment_message(HandshakeType::Finished, 0, &[1], 0).unwrap_err(),
            Error::InvalidFragmentLength(0)
        );
    }

    #[test]
    fn shells_with_dynamic_remainder() {
        let config = Config::builder().dtls_max_fragment_length(100).build().unwrap();
        let fragmenter = MessageFragmenter::new(&config);
        let b = body(300);
        let shells = (0..2).map(|_| DtlsHandshakeFragment::shell(Some(64))).collect();
        let fragments = fragmenter
            .fragment_message_into_shells(HandshakeType::ClientHello, 0, &b, shells)
            .unwrap();
        // 64 + 64 from shells, 100 + 72 created dynamically.
        assert_eq!(fragments.len(), 4);
        check_sequential(&fragments, &b, 100);
    }

    #[test]
    fn shells_without_dynamic_creation_drop_content() {
        let config = Config::builder()
            .create_fragments_dynamically(false)
            .build()
            .unwrap();
        let fragmenter = MessageFragmenter::new(&config);
        let shells = vec![DtlsHandshakeFragment::shell(Some(10))];
        let fragments = fragmenter
            .fragment_message_into_shells(HandshakeType::Certificate, 0, &body(25), shells)
            .unwrap();
        assert_eq!(fragments.len(), 1);
        assert_eq!(fragments[0].content(), body(10));
        assert_eq!(fragments[0].message_length(), 25);
    }

    #[test]
    fn unused_shells() {
        let shells = || (0..4).map(|_| DtlsHandshakeFragment::shell(Some(64))).collect();

        let fragmenter = MessageFragmenter::new(&Config::default());
        let fragments = fragmenter
            .fragment_message_into_shells(HandshakeType::ClientHello, 0, &body(70), shells())
            .unwrap();
        assert_eq!(fragments.len(), 2);

        let config = Config::builder()
            .use_all_provided_dtls_fragments(true)
            .build()
            .unwrap();
        let fragmenter = MessageFragmenter::new(&config);
        let fragments = fragmenter
            .fragment_message_into_shells(HandshakeType::ClientHello, 0, &body(70), shells())
            .unwrap();
        assert_eq!(fragments.len(), 4);
        assert_eq!(fragments[3].fragment_length(), 0);
        assert_eq!(fragments[3].fragment_offset(), 70);
    }

    #[test]
    fn handshake_message_advances_seq() {
        let mut fragmenter = MessageFragmenter::new(&Config::default());
        let mut message = vec![20, 0, 0, 3];
        message.extend_from_slice(&[7, 8, 9]);

        let first = fragmenter.fragment_handshake_message(&message).unwrap();
        let second = fragmenter.fragment_handshake_message(&message).unwrap();
        assert_eq!(first[0].message_seq(), 0);
        assert_eq!(second[0].message_seq(), 1);
        assert_eq!(second[0].handshake_type(), HandshakeType::Finished);
        assert!(second[0].is_whole_message());
        assert_eq!(fragmenter.next_message_seq(), 2);

        assert!(fragmenter.fragment_handshake_message(&[20, 0]).is_err());
    }

    #[test]
    fn single_fragment() {
        let fragmenter = MessageFragmenter::new(&Config::default());
        let f = fragmenter
            .wrap_in_single_fragment(HandshakeType::ClientHello, 0, &body(5000))
            .unwrap();
        assert_eq!(f.fragment_offset(), 0);
        assert_eq!(f.fragment_length(), 5000);
        assert!(f.is_whole_message());
    }

    #[test]
    fn oversized_message_rejected() {
        let huge = vec![0u8; MAX_MESSAGE_LENGTH + 1];
        let expected = Error::LengthOverflow {
            what: "handshake message",
            len: MAX_MESSAGE_LENGTH + 1,
            max: MAX_MESSAGE_LENGTH,
        };
        assert_eq!(
            fragment_message(HandshakeType::Certificate, 0, &huge, 1 << 20).unwrap_err(),
            expected
        );

        let fragmenter = MessageFragmenter::new(&Config::default());
        assert_eq!(
            fragmenter
                .wrap_in_single_fragment(HandshakeType::Certificate, 0, &huge)
                .unwrap_err(),
            expected
        );
        assert_eq!(
            fragmenter
                .fragment_message_into_shells(HandshakeType::Certificate, 0, &huge, vec![])
                .unwrap_err(),
            expected
        );

        // The largest expressible length still fits.
        let max = vec![0u8; MAX_MESSAGE_LENGTH];
        let fragments = fragment_message(HandshakeType::Certificate, 0, &max, 1 << 23).unwrap();
        assert_eq!(fragments.len(), 2);
        assert_eq!(fragments[1].message_length() as usize, MAX_MESSAGE_LENGTH);
    }
}
