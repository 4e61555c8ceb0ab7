use crate::Error;

/// Largest handshake message a DTLS fragment header can describe (24-bit length).
const MAX_HANDSHAKE_LENGTH: usize = 0xff_ffff;

/// Engine configuration.
///
/// One `Config` is typically shared by every connection of a test run. All state the
/// engines mutate lives in per-connection objects, never here.
#[derive(Debug, Clone)]
pub struct Config {
    dtls_max_fragment_length: usize,
    accept_only_fitting_dtls_fragments: bool,
    accept_content_rewriting_dtls_fragments: bool,
    track_dtls_retransmissions: bool,
    create_fragments_dynamically: bool,
    use_all_provided_dtls_fragments: bool,
    fragment_fill_byte: u8,
    default_additional_padding: u8,
    echo_quic: bool,
    rng_seed: Option<u64>,
}

impl Config {
    /// Create a new configuration builder.
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder {
            dtls_max_fragment_length: 1400,
            accept_only_fitting_dtls_fragments: false,
            accept_content_rewriting_dtls_fragments: true,
            track_dtls_retransmissions: true,
            create_fragments_dynamically: true,
            use_all_provided_dtls_fragments: false,
            fragment_fill_byte: 0,
            default_additional_padding: 0,
            echo_quic: false,
            rng_seed: None,
        }
    }

    /// Max content bytes per outgoing DTLS handshake fragment.
    #[inline(always)]
    pub fn dtls_max_fragment_length(&self) -> usize {
        self.dtls_max_fragment_length
    }

    /// Reject incoming fragments that would leave a gap in the reassembly buffer.
    #[inline(always)]
    pub fn accept_only_fitting_dtls_fragments(&self) -> bool {
        self.accept_only_fitting_dtls_fragments
    }

    /// Accept fragments whose overlap disagrees with already stored bytes.
    ///
    /// Stored bytes are never overwritten; this only decides whether the rest of the
    /// fragment still contributes.
    #[inline(always)]
    pub fn accept_content_rewriting_dtls_fragments(&self) -> bool {
        self.accept_content_rewriting_dtls_fragments
    }

    /// Restart reassembly when fragments of an already consumed message arrive.
    #[inline(always)]
    pub fn track_dtls_retransmissions(&self) -> bool {
        self.track_dtls_retransmissions
    }

    /// Append extra fragments when caller-provided shells cannot hold the message.
    #[inline(always)]
    pub fn create_fragments_dynamically(&self) -> bool {
        self.create_fragments_dynamically
    }

    /// Keep caller-provided shells even when no content is left for them.
    #[inline(always)]
    pub fn use_all_provided_dtls_fragments(&self) -> bool {
        self.use_all_provided_dtls_fragments
    }

    /// Byte used for gaps when an incomplete message is combined.
    #[inline(always)]
    pub fn fragment_fill_byte(&self) -> u8 {
        self.fragment_fill_byte
    }

    /// Extra CBC padding bytes added on top of the minimum.
    #[inline(always)]
    pub fn default_additional_padding(&self) -> u8 {
        self.default_additional_padding
    }

    /// Passive/echo mode: received QUIC packets are treated as produced by the local
    /// endpoint instead of the peer.
    #[inline(always)]
    pub fn echo_quic(&self) -> bool {
        self.echo_quic
    }

    /// Seed for non-secret randomness (explicit IVs).
    #[inline(always)]
    pub fn rng_seed(&self) -> Option<u64> {
        self.rng_seed
    }
}

/// Builder for [`Config`].
pub struct ConfigBuilder {
    dtls_max_fragment_length: usize,
    accept_only_fitting_dtls_fragments: bool,
    accept_content_rewriting_dtls_fragments: bool,
    track_dtls_retransmissions: bool,
    create_fragments_dynamically: bool,
    use_all_provided_dtls_fragments: bool,
    fragment_fill_byte: u8,
    default_additional_padding: u8,
    echo_quic: bool,
    rng_seed: Option<u64>,
}

impl ConfigBuilder {
    /// Set the max content bytes per DTLS fragment.
    ///
    /// Defaults to 1400.
    pub fn dtls_max_fragment_length(mut self, len: usize) -> Self {
        self.dtls_max_fragment_length = len;
        self
    }

    /// Defaults to false.
    pub fn accept_only_fitting_dtls_fragments(mut self, v: bool) -> Self {
        self.accept_only_fitting_dtls_fragments = v;
        self
    }

    /// Defaults to true.
    pub fn accept_content_rewriting_dtls_fragments(mut self, v: bool) -> Self {
        self.accept_content_rewriting_dtls_fragments = v;
        self
    }

    /// Defaults to true.
    pub fn track_dtls_retransmissions(mut self, v: bool) -> Self {
        self.track_dtls_retransmissions = v;
        self
    }

    /// Defaults to true.
    pub fn create_fragments_dynamically(mut self, v: bool) -> Self {
        self.create_fragments_dynamically = v;
        self
    }

    /// Defaults to false.
    pub fn use_all_provided_dtls_fragments(mut self, v: bool) -> Self {
        self.use_all_provided_dtls_fragments = v;
        self
    }

    /// Defaults to 0x00.
    pub fn fragment_fill_byte(mut self, v: u8) -> Self {
        self.fragment_fill_byte = v;
        self
    }

    /// Set the extra CBC padding.
    ///
    /// The padding length byte caps the total at 255, so the effective amount is
    /// reduced to keep the padding a multiple of the block size.
    /// Defaults to 0.
    pub fn default_additional_padding(mut self, v: u8) -> Self {
        self.default_additional_padding = v;
        self
    }

    /// Defaults to false.
    pub fn echo_quic(mut self, v: bool) -> Self {
        self.echo_quic = v;
        self
    }

    /// Seed the RNG used for explicit IVs.
    ///
    /// Defaults to `None` (thread rng).
    pub fn rng_seed(mut self, seed: Option<u64>) -> Self {
        self.rng_seed = seed;
        self
    }

    /// Build the configuration.
    ///
    /// Returns `Error::Config` for a fragment length of 0 or above the 24-bit limit.
    pub fn build(self) -> Result<Config, Error> {
        if self.dtls_max_fragment_length == 0
            || self.dtls_max_fragment_length > MAX_HANDSHAKE_LENGTH
        {
            return Err(Error::Config(format!(
                "dtls_max_fragment_length out of range: {}",
                self.dtls_max_fragment_length
            )));
        }

        Ok(Config {
            dtls_max_fragment_length: self.dtls_max_fragment_length,
            accept_only_fitting_dtls_fragments: self.accept_only_fitting_dtls_fragments,
            accept_content_rewriting_dtls_fragments: self.accept_content_rewriting_dtls_fragments,
            track_dtls_retransmissions: self.track_dtls_retransmissions,
            create_fragments_dynamically: self.create_fragments_dynamically,
            use_all_provided_dtls_fragments: self.use_all_provided_dtls_fragments,
            fragment_fill_byte: self.fragment_fill_byte,
            default_additional_padding: self.default_additional_padding,
            echo_quic: self.echo_quic,
            rng_seed: self.rng_seed,
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Config::builder()
            .build()
            .expect("Default config should always validate")
    }
}
