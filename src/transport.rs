//! External collaborators (spec §6): the lower GATT/ATT transport, the
//! discovery engine, the persisted attribute-database cache, and the
//! robust-caching support policy. All are consumed as traits so the core
//! state machine never touches a concrete transport — the same shape as
//! the teacher's `EspGattc`, which wraps `esp_ble_gattc_*` calls behind
//! plain methods and reports results back through one callback enum.

use crate::error::GattcResult;
use crate::types::{BdAddr, ClientId, ConnId, Handle, Transport, Uuid};

/// One cached characteristic entry, enough to answer "is this handle the
/// Service Changed characteristic" and "does this peer support the
/// database-hash characteristic" without parsing a real ATT database
/// (service-discovery traversal and database representation are out of
/// scope per spec.md §1; this is the minimal shape the core needs).
#[derive(Debug, Clone, Copy)]
pub struct CachedCharacteristic {
    pub service_uuid: Uuid,
    pub char_uuid: Uuid,
    pub value_handle: Handle,
}

/// A peer's cached attribute database, as far as this core needs to see it.
#[derive(Debug, Clone, Default)]
pub struct AttributeDatabase {
    characteristics: Vec<CachedCharacteristic>,
}

impl AttributeDatabase {
    pub fn new(characteristics: Vec<CachedCharacteristic>) -> Self {
        Self { characteristics }
    }

    pub fn is_empty(&self) -> bool {
        self.characteristics.is_empty()
    }

    pub fn clear(&mut self) {
        self.characteristics.clear();
    }

    /// Handle of the Service Changed characteristic under the GATT
    /// service, if this database has one.
    pub fn service_changed_handle(&self) -> Option<Handle> {
        self.characteristics
            .iter()
            .find(|c| c.service_uuid == Uuid::GATT_SERVICE && c.char_uuid == Uuid::SERVICE_CHANGED)
            .map(|c| c.value_handle)
    }

    /// Whether this database advertises the database-hash characteristic
    /// (a precondition for robust caching).
    pub fn has_database_hash(&self) -> bool {
        self.characteristics
            .iter()
            .any(|c| c.char_uuid == Uuid::DATABASE_HASH)
    }

    pub fn characteristic_at(&self, handle: Handle) -> Option<&CachedCharacteristic> {
        self.characteristics
            .iter()
            .find(|c| c.value_handle == handle)
    }
}

/// Outcome of `GattTransport::try_mtu_request` (spec.md §4.4).
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum TryMtuResult {
    DeviceDisconnected,
    NotAllowed,
    AlreadyDone(u16),
    InProgress,
    NotDoneYet,
}

/// Robust-caching support for a given peer, an injected policy decision
/// (spec.md §9 "Open question" resolution: always injectable, never
/// hard-coded, so tests can force each branch).
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum RobustCachingSupport {
    Supported,
    Unsupported,
    Unknown,
}

/// Policy function deciding per-peer robust-caching support, grounded in
/// spec.md §4.3 / §9 ("treat it as an injected policy function").
pub trait RobustCachingPolicy: Send {
    fn support(&self, peer: BdAddr, db: &AttributeDatabase) -> RobustCachingSupport;
}

/// A policy that always reports a fixed answer — useful both as a real
/// fallback (`Unknown`, meaning "always re-discover") and in tests.
pub struct FixedRobustCaching(pub RobustCachingSupport);

impl RobustCachingPolicy for FixedRobustCaching {
    fn support(&self, _peer: BdAddr, _db: &AttributeDatabase) -> RobustCachingSupport {
        self.0
    }
}

/// Persisted attribute-database cache, delegated to an external store
/// (spec.md §6 "Persisted state").
pub trait AttributeCache: Send {
    fn load(&self, peer: BdAddr) -> Option<AttributeDatabase>;
    fn reset(&self, peer: BdAddr);
    fn store(&self, peer: BdAddr, db: &AttributeDatabase);
    fn is_bonded(&self, peer: BdAddr) -> bool;
}

/// The external service-discovery traversal engine (spec.md §1 "out of
/// scope"). The core only asks it to start; results surface later as
/// ingress events fed back through `GattClientCore::handle_event`.
pub trait ServiceDiscovery: Send {
    /// Kick off primary-service discovery for `conn_id`. Returns an error
    /// if the engine refuses to start (e.g. out of discovery contexts).
    fn start_discovery(&self, conn_id: ConnId, peer: BdAddr) -> GattcResult<()>;
}

/// The lower GATT/ATT transport (spec.md §6). Every method here is a
/// direct analogue of the teacher's `EspGattc` methods
/// (`register_app`, `open`, `close`, `mtu_req`, `read_characteristic`, …),
/// generalized from ESP-IDF's C FFI calls to a plain Rust trait.
pub trait GattTransport: Send {
    fn register(&self, uuid: Uuid) -> GattcResult<ClientId>;
    fn deregister(&self, client_id: ClientId);
    fn start_if(&self, client_id: ClientId);

    fn connect(
        &self,
        client_id: ClientId,
        peer: BdAddr,
        is_direct: bool,
        transport: Transport,
    ) -> bool;
    fn cancel_connect(&self, client_id: ClientId, peer: BdAddr, is_direct: bool) -> bool;
    fn disconnect(&self, conn_id: ConnId) -> GattcResult<()>;

    fn conn_id_if_connected(
        &self,
        client_id: ClientId,
        peer: BdAddr,
        transport: Transport,
    ) -> Option<ConnId>;
    fn eatt_supported(&self, client_id: ClientId, peer: BdAddr) -> bool;

    fn mtu_size(&self, conn_id: ConnId) -> u16;
    fn configure_mtu(&self, conn_id: ConnId, mtu: u16) -> GattcResult<()>;
    fn try_mtu_request(&self, peer: BdAddr, transport: Transport, conn_id: ConnId) -> TryMtuResult;

    fn read(&self, conn_id: ConnId, handle: Handle) -> GattcResult<()>;
    fn read_multi(&self, conn_id: ConnId, handles: &[Handle]) -> GattcResult<()>;
    fn read_multi_variable(&self, conn_id: ConnId, handles: &[Handle]) -> GattcResult<()>;
    fn write(&self, conn_id: ConnId, handle: Handle, value: &[u8], with_response: bool) -> GattcResult<()>;
    fn execute_write(&self, conn_id: ConnId, execute: bool) -> GattcResult<()>;

    fn send_handle_value_confirm(&self, conn_id: ConnId, handle: Handle, trans_id: u32);

    fn white_list_size(&self) -> usize;
}

/// App-visible events (spec.md §6), delivered through each registrant's
/// callback. A single tagged enum, mirroring the teacher's `GattcEvent`
/// funnel rather than one method per event.
#[derive(Debug, Clone)]
pub enum AppEvent {
    Reg {
        status: GattcResult<()>,
        client_id: ClientId,
    },
    Dereg {
        client_id: ClientId,
    },
    Open {
        status: GattcResult<()>,
        peer: BdAddr,
        conn_id: ConnId,
        mtu: u16,
    },
    Close {
        conn_id: ConnId,
        peer: BdAddr,
        reason: crate::types::ConnReason,
        status: GattcResult<()>,
    },
    SearchComplete {
        peer: BdAddr,
        status: GattcResult<()>,
    },
    ServiceChanged {
        peer: BdAddr,
    },
    Notify {
        conn_id: ConnId,
        handle: Handle,
        value: Vec<u8>,
        is_notify: bool,
    },
    ReadChar {
        conn_id: ConnId,
        handle: Handle,
        status: GattcResult<()>,
        value: Vec<u8>,
    },
    ReadMulti {
        conn_id: ConnId,
        status: GattcResult<()>,
        value: Vec<u8>,
    },
    ReadMultiVariable {
        conn_id: ConnId,
        status: GattcResult<()>,
        value: Vec<u8>,
    },
    WriteChar {
        conn_id: ConnId,
        handle: Handle,
        status: GattcResult<()>,
    },
    ExecuteWrite {
        conn_id: ConnId,
        status: GattcResult<()>,
    },
    ConfigMtu {
        conn_id: ConnId,
        status: GattcResult<()>,
        mtu: u16,
    },
    Congest {
        conn_id: ConnId,
        congested: bool,
    },
    PhyUpdate {
        conn_id: ConnId,
        tx_phy: u8,
        rx_phy: u8,
    },
    ConnUpdate {
        conn_id: ConnId,
        interval: u16,
        latency: u16,
        timeout: u16,
    },
    SubrateChange {
        conn_id: ConnId,
        subrate_factor: u16,
    },
    EncryptionComplete {
        conn_id: ConnId,
        status: GattcResult<()>,
    },
    CancelOpen {
        status: GattcResult<()>,
    },
    /// The transport's own command queue is full, independent of this
    /// core's single-slot per-connection queue. Diagnostic only — never
    /// actioned, our queue is the authority on in-flight command count.
    QueueFull {
        conn_id: ConnId,
    },
}

/// Per-app callback sink (spec.md §3 Registry entry "callback sink").
pub trait GattClientCallback: Send {
    fn on_event(&mut self, event: AppEvent);
}

impl<F: FnMut(AppEvent) + Send> GattClientCallback for F {
    fn on_event(&mut self, event: AppEvent) {
        self(event)
    }
}
