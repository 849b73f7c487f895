use std::time::Duration;

/// Tunables of a [`Keyring`](crate::Keyring).
#[derive(Clone, Debug)]
pub struct KeyringConfig {
    /// HKDF info binding derived session secrets to this application.
    pub protocol_info: Vec<u8>,
    /// Low-water mark: the pool is refilled once fewer one-time pre-keys remain.
    pub min_one_time_pre_keys: usize,
    /// Size of the one-time pre-key pool after bootstrap or a refill.
    pub max_one_time_pre_keys: usize,
    /// Age after which the signed pre-key is replaced.
    pub signed_pre_key_rotation_interval: Duration,
    /// Signed pre-keys kept around, the current one included, so that
    /// initiations made against a rotated-out key still succeed.
    pub max_signed_pre_keys: usize,
}

impl Default for KeyringConfig {
    fn default() -> Self {
        Self {
            protocol_info: b"X3DH-Keyring-Curve25519-SHA256".to_vec(),
            min_one_time_pre_keys: 3,
            max_one_time_pre_keys: 10,
            signed_pre_key_rotation_interval: Duration::from_secs(7 * 24 * 60 * 60), // 1 week
            max_signed_pre_keys: 4,
        }
    }
}
