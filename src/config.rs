//! Ambient configuration (`SPEC_FULL.md` §1.3). Plain struct with a
//! `Default` impl, the same shape the teacher uses for its driver config
//! structs rather than a builder or a config-file format — this core has
//! no on-disk configuration of its own, it's embedded by a host process.

/// Tunables for [`crate::client::GattClient`].
#[derive(Debug, Clone, Copy)]
pub struct GattcConfig {
    /// Upper bound on concurrently tracked background-connect requests,
    /// mirroring the controller's white list size.
    pub max_background_connects: usize,
    /// When `true` (the default), a third attribute operation arriving
    /// while one is in flight and one is already deferred is rejected
    /// with [`crate::error::GattcError::NoResources`] instead of
    /// overwriting the deferred slot.
    pub strict_single_deferred: bool,
}

impl Default for GattcConfig {
    fn default() -> Self {
        Self {
            max_background_connects: 8,
            strict_single_deferred: true,
        }
    }
}
