use core::fmt::{self, Display, Formatter};

/// Error taxonomy surfaced to registered applications.
///
/// These are never Rust-level panics or transport-internal faults; they are
/// the small set of outcomes an app-visible callback can carry, mirroring
/// the status codes the original BTA GATTC client reports back through its
/// event callbacks.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum GattcError {
    /// Out of CLCBs, out of background-tracker slots, or the transport
    /// refused to allocate a resource.
    NoResources,
    /// Generic transport failure, or "no such connection to cancel".
    Error,
    /// Open attempted while the CLCB already has a live connection id.
    AlreadyOpen,
    /// Write length exceeds the maximum attribute payload for the link.
    InvalidAttrLen,
    /// Propagated from an op-complete; the peer's database has changed
    /// since it was last read and must be re-discovered.
    DatabaseOutOfSync,
    /// Internal marker: an in-flight discovery must be superseded by a
    /// fresher one.
    Cancel,
}

impl Display for GattcError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Self::NoResources => "no resources",
            Self::Error => "error",
            Self::AlreadyOpen => "already open",
            Self::InvalidAttrLen => "invalid attribute length",
            Self::DatabaseOutOfSync => "database out of sync",
            Self::Cancel => "cancelled",
        };
        f.write_str(msg)
    }
}

impl std::error::Error for GattcError {}

/// Result alias for operations whose only failure mode is [`GattcError`].
pub type GattcResult<T> = Result<T, GattcError>;
