use crate::modvar::{FieldMut, FieldRegistry, Modifiable};

/// Values derived while protecting or unprotecting one record.
///
/// The three validity flags are kept apart so a caller can tell a padding failure from
/// a MAC failure from a tag failure. They are `None` until a decrypt attempt has run.
/// After [`RecordProtection::unprotect`][crate::record::RecordProtection::unprotect]
/// the flags relevant to the cipher family are `Some`: padding and MAC for CBC,
/// the tag for AEAD.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordCryptoComputations {
    pub cipher_key: Modifiable<Vec<u8>>,
    pub mac_key: Modifiable<Vec<u8>>,
    pub mac: Modifiable<Vec<u8>>,
    /// Implicit 4-byte GCM salt.
    pub aead_salt: Modifiable<Vec<u8>>,
    pub explicit_nonce: Modifiable<Vec<u8>>,
    /// Full 12-byte AEAD nonce, for every AEAD family.
    pub gcm_nonce: Modifiable<Vec<u8>>,
    pub padding: Modifiable<Vec<u8>>,
    pub additional_padding_length: Modifiable<u8>,
    /// Input to the block cipher or AEAD: content, MAC and padding (or TLS 1.3 inner
    /// plaintext).
    pub plain_record_bytes: Modifiable<Vec<u8>>,
    /// MAC/AAD prefix: sequence, type, version and length.
    pub authenticated_meta_data: Modifiable<Vec<u8>>,
    /// Bytes covered by the MAC after the metadata.
    pub authenticated_non_meta_data: Modifiable<Vec<u8>>,
    pub ciphertext: Modifiable<Vec<u8>>,
    pub cbc_initialisation_vector: Modifiable<Vec<u8>>,
    pub authentication_tag: Modifiable<Vec<u8>>,

    pub padding_valid: Option<bool>,
    pub mac_valid: Option<bool>,
    pub authentication_tag_valid: Option<bool>,
}

impl RecordCryptoComputations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget the result of the previous decrypt attempt.
    pub fn reset_flags(&mut self) {
        self.padding_valid = None;
        self.mac_valid = None;
        self.authentication_tag_valid = None;
    }

    /// Mark a CBC record that could not even be decrypted.
    pub(crate) fn fail_block(&mut self) {
        self.padding_valid = Some(false);
        self.mac_valid = Some(false);
    }
}

const FIELDS: &[&str] = &[
    "cipher_key",
    "mac_key",
    "mac",
    "aead_salt",
    "explicit_nonce",
    "gcm_nonce",
    "padding",
    "additional_padding_length",
    "plain_record_bytes",
    "authenticated_meta_data",
    "authenticated_non_meta_data",
    "ciphertext",
    "cbc_initialisation_vector",
    "authentication_tag",
];

impl FieldRegistry for RecordCryptoComputations {
    fn field_names(&self) -> &'static [&'static str] {
        FIELDS
    }

    fn field_mut(&mut self, name: &str) -> Option<FieldMut<'_>> {
        let f = match name {
            "cipher_key" => &mut self.cipher_key,
            "mac_key" => &mut self.mac_key,
            "mac" => &mut self.mac,
            "aead_salt" => &mut self.aead_salt,
            "explicit_nonce" => &mut self.explicit_nonce,
            "gcm_nonce" => &mut self.gcm_nonce,
            "padding" => &mut self.padding,
            "additional_padding_length" => {
                return Some(FieldMut::U8(&mut self.additional_padding_length))
            }
            "plain_record_bytes" => &mut self.plain_record_bytes,
            "authenticated_meta_data" => &mut self.authenticated_meta_data,
            "authenticated_non_meta_data" => &mut self.authenticated_non_meta_data,
            "ciphertext" => &mut self.ciphertext,
            "cbc_initialisation_vector" => &mut self.cbc_initialisation_vector,
            "authentication_tag" => &mut self.authentication_tag,
            _ => return None,
        };
        Some(FieldMut::Bytes(f))
    }
}
