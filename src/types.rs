//! Core identifiers and wire-adjacent value types shared by every module.
//!
//! Grounded in `bt.rs`'s `BdAddr`/`BtUuid` wrappers and the repeated use of
//! `num_enum::TryFromPrimitive` for C-enum-shaped status codes throughout
//! `bt/ble/gatt/client.rs`.

use core::fmt::{self, Debug, Display};

use num_enum::TryFromPrimitive;

/// Opaque client identifier handed out by the transport on registration.
/// Zero is never a valid id.
pub type ClientId = u8;

/// Opaque transport-level connection handle. Zero means "no connection".
pub type ConnId = u16;

/// An attribute handle within a peer's database.
pub type Handle = u16;

/// L2CAP transaction id, used when confirming an indication.
pub type TransId = u32;

/// Which physical bearer a connection runs over.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Transport {
    Le,
    Bredr,
}

/// A Bluetooth device address, in canonical byte order (MSB first).
#[derive(Copy, Clone, Eq, PartialEq, Hash)]
pub struct BdAddr([u8; 6]);

impl BdAddr {
    pub const fn new(bytes: [u8; 6]) -> Self {
        Self(bytes)
    }

    pub const fn bytes(&self) -> [u8; 6] {
        self.0
    }
}

impl Debug for BdAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Display::fmt(self, f)
    }
}

impl Display for BdAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            self.0[0], self.0[1], self.0[2], self.0[3], self.0[4], self.0[5]
        )
    }
}

/// A GATT UUID, either 16-, 32- or 128-bit.
#[derive(Copy, Clone, Eq, PartialEq, Hash)]
pub enum Uuid {
    Uuid16(u16),
    Uuid32(u32),
    Uuid128(u128),
}

impl Uuid {
    pub const fn uuid16(v: u16) -> Self {
        Self::Uuid16(v)
    }

    /// The well-known *Service Changed* characteristic UUID (0x2A05).
    pub const SERVICE_CHANGED: Uuid = Uuid::Uuid16(0x2A05);

    /// The well-known *GATT* service UUID (0x1801), under which the
    /// *Service Changed* characteristic lives.
    pub const GATT_SERVICE: Uuid = Uuid::Uuid16(0x1801);

    /// The database-hash characteristic used by robust caching (0x2B2A).
    pub const DATABASE_HASH: Uuid = Uuid::Uuid16(0x2B2A);
}

impl Debug for Uuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uuid16(v) => write!(f, "Uuid16({:#06x})", v),
            Self::Uuid32(v) => write!(f, "Uuid32({:#010x})", v),
            Self::Uuid128(v) => write!(f, "Uuid128({:#034x})", v),
        }
    }
}

/// Status reported by the transport on a completed operation.
#[derive(Debug, Copy, Clone, Eq, PartialEq, TryFromPrimitive)]
#[repr(u8)]
pub enum GattStatus {
    Success = 0,
    InvalidHandle = 1,
    ReadNotPermitted = 2,
    WriteNotPermitted = 3,
    InsufficientAuthentication = 5,
    RequestNotSupported = 6,
    InvalidOffset = 7,
    InsufficientAuthorization = 8,
    PrepareQueueFull = 9,
    AttributeNotFound = 10,
    InvalidAttributeLength = 13,
    InsufficientEncryption = 15,
    DatabaseOutOfSync = 0x16,
    Congested = 0x8d,
    Error = 0x85,
    NoResources = 0x80,
    InternalError = 0x81,
    WrongState = 0x82,
    DbFull = 0x83,
    Busy = 0x84,
    Timeout = 0x8a,
    Cancel = 0xfc,
}

/// Why a connection closed.
#[derive(Debug, Copy, Clone, Eq, PartialEq, TryFromPrimitive)]
#[repr(u8)]
pub enum ConnReason {
    Unknown = 0,
    PeerUserTerminated = 1,
    LocalHostTerminated = 2,
    PeerDeviceNotConnectable = 3,
    SupervisionTimeout = 4,
}

/// The role this host played in the ACL connection.
#[derive(Debug, Copy, Clone, Eq, PartialEq, TryFromPrimitive)]
#[repr(u8)]
pub enum LinkRole {
    Master = 0,
    Slave = 1,
}
