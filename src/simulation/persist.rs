//! Save/restore of dynamic simulation state
//!
//! Only dynamic fields are persisted. Static configuration has to be loaded
//! again before restoring, so snapshots stay small and order-stable.

use log::warn;

/// A value whose dynamic state can be snapshotted as bytes
pub trait Saveable {
    /// Key used in log messages and save-file sections
    const SAVE_KEY: &'static str;

    fn save_to_bytes(&self) -> Vec<u8>;

    /// Restores from bytes produced by [`Saveable::save_to_bytes`]
    fn load_from_bytes(&mut self, bytes: &[u8]) -> anyhow::Result<()>;
}

/// Decode bytes via `bitcode::decode`, logging a warning and returning `None` on failure
pub fn decode_or_warn<T: bitcode::DecodeOwned>(key: &str, bytes: &[u8]) -> Option<T> {
    match bitcode::decode(bytes) {
        Ok(v) => Some(v),
        Err(e) => {
            warn!(
                "Saveable {}: failed to decode {} bytes: {}",
                key,
                bytes.len(),
                e
            );
            None
        }
    }
}
