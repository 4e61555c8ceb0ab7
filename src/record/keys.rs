use zeroize::Zeroize;

use crate::types::ConnectionEnd;

/// Symmetric record keys for one epoch, already derived by the handshake layer.
///
/// For TLS 1.2 style suites the IVs are the implicit part of the key block (CBC IV for
/// SSL3/TLS 1.0, 4-byte GCM salt, 12-byte ChaCha20 IV). For TLS 1.3 they are the 12-byte
/// traffic IVs and the MAC secrets are empty.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct KeySet {
    pub client_write_mac_secret: Vec<u8>,
    pub server_write_mac_secret: Vec<u8>,
    pub client_write_key: Vec<u8>,
    pub server_write_key: Vec<u8>,
    pub client_write_iv: Vec<u8>,
    pub server_write_iv: Vec<u8>,
}

impl KeySet {
    pub fn mac_secret(&self, writer: ConnectionEnd) -> &[u8] {
        match writer {
            ConnectionEnd::Client => &self.client_write_mac_secret,
            ConnectionEnd::Server => &self.server_write_mac_secret,
        }
    }

    pub fn key(&self, writer: ConnectionEnd) -> &[u8] {
        match writer {
            ConnectionEnd::Client => &self.client_write_key,
            ConnectionEnd::Server => &self.server_write_key,
        }
    }

    pub fn iv(&self, writer: ConnectionEnd) -> &[u8] {
        match writer {
            ConnectionEnd::Client => &self.client_write_iv,
            ConnectionEnd::Server => &self.server_write_iv,
        }
    }
}

impl Drop for KeySet {
    fn drop(&mut self) {
        self.client_write_mac_secret.zeroize();
        self.server_write_mac_secret.zeroize();
        self.client_write_key.zeroize();
        self.server_write_key.zeroize();
        self.client_write_iv.zeroize();
        self.server_write_iv.zeroize();
    }
}

impl std::fmt::Debug for KeySet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeySet")
            .field("mac_len", &self.client_write_mac_secret.len())
            .field("key_len", &self.client_write_key.len())
            .field("iv_len", &self.client_write_iv.len())
            .finish()
    }
}
