//! Shared test doubles for the unit and scenario tests scattered across
//! this crate's `#[cfg(test)]` modules, in the spirit of the teacher's
//! `private::edge_config` test harness.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::error::{GattcError, GattcResult};
use crate::transport::{
    AppEvent, AttributeCache, AttributeDatabase, GattClientCallback, GattTransport,
    RobustCachingPolicy, RobustCachingSupport, ServiceDiscovery, TryMtuResult,
};
use crate::types::{BdAddr, ClientId, ConnId, Handle, Transport, Uuid};

#[derive(Default)]
struct FakeTransportState {
    next_client_id: ClientId,
    next_conn_id: ConnId,
    connect_calls: Vec<(ClientId, BdAddr, bool)>,
    fail_connect: bool,
    mtu: u16,
    try_mtu_results: VecDeque<TryMtuResult>,
    confirm_calls: Vec<(ConnId, Handle, u32)>,
}

/// A `GattTransport` that always succeeds, recording what was asked of it
/// so tests can assert on call shape without a real BLE stack. Cloning
/// shares the same underlying state, so a test can keep a handle for
/// assertions after moving the original into a `Box<dyn GattTransport>`.
#[derive(Clone)]
pub struct FakeTransport {
    state: Arc<Mutex<FakeTransportState>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(FakeTransportState {
                next_client_id: 1,
                next_conn_id: 1,
                connect_calls: Vec::new(),
                fail_connect: false,
                mtu: 23,
                try_mtu_results: VecDeque::new(),
                confirm_calls: Vec::new(),
            })),
        }
    }

    pub fn failing_connect() -> Self {
        let t = Self::new();
        t.state.lock().unwrap().fail_connect = true;
        t
    }

    pub fn connect_call_count(&self) -> usize {
        self.state.lock().unwrap().connect_calls.len()
    }

    /// Queues the next `try_mtu_request` answer (FIFO, falling back to
    /// `NotDoneYet` once drained) — used to drive the MTU coalescing path
    /// (`TryMtuResult::InProgress`/`AlreadyDone`) without a real in-flight
    /// exchange to race against.
    pub fn queue_try_mtu_result(&self, result: TryMtuResult) {
        self.state.lock().unwrap().try_mtu_results.push_back(result);
    }

    pub fn confirm_call_count(&self) -> usize {
        self.state.lock().unwrap().confirm_calls.len()
    }
}

impl GattTransport for FakeTransport {
    fn register(&self, _uuid: Uuid) -> GattcResult<ClientId> {
        let mut s = self.state.lock().unwrap();
        let id = s.next_client_id;
        s.next_client_id += 1;
        Ok(id)
    }

    fn deregister(&self, _client_id: ClientId) {}
    fn start_if(&self, _client_id: ClientId) {}

    fn connect(&self, client_id: ClientId, peer: BdAddr, is_direct: bool, _transport: Transport) -> bool {
        let mut s = self.state.lock().unwrap();
        s.connect_calls.push((client_id, peer, is_direct));
        !s.fail_connect
    }

    fn cancel_connect(&self, _client_id: ClientId, _peer: BdAddr, _is_direct: bool) -> bool {
        true
    }

    fn disconnect(&self, _conn_id: ConnId) -> GattcResult<()> {
        Ok(())
    }

    fn conn_id_if_connected(&self, _client_id: ClientId, _peer: BdAddr, _transport: Transport) -> Option<ConnId> {
        None
    }

    fn eatt_supported(&self, _client_id: ClientId, _peer: BdAddr) -> bool {
        false
    }

    fn mtu_size(&self, _conn_id: ConnId) -> u16 {
        self.state.lock().unwrap().mtu
    }

    fn configure_mtu(&self, _conn_id: ConnId, mtu: u16) -> GattcResult<()> {
        self.state.lock().unwrap().mtu = mtu;
        Ok(())
    }

    fn try_mtu_request(&self, _peer: BdAddr, _transport: Transport, _conn_id: ConnId) -> TryMtuResult {
        self.state
            .lock()
            .unwrap()
            .try_mtu_results
            .pop_front()
            .unwrap_or(TryMtuResult::NotDoneYet)
    }

    fn read(&self, _conn_id: ConnId, _handle: Handle) -> GattcResult<()> {
        Ok(())
    }

    fn read_multi(&self, _conn_id: ConnId, _handles: &[Handle]) -> GattcResult<()> {
        Ok(())
    }

    fn read_multi_variable(&self, _conn_id: ConnId, _handles: &[Handle]) -> GattcResult<()> {
        Ok(())
    }

    fn write(&self, _conn_id: ConnId, _handle: Handle, _value: &[u8], _with_response: bool) -> GattcResult<()> {
        Ok(())
    }

    fn execute_write(&self, _conn_id: ConnId, _execute: bool) -> GattcResult<()> {
        Ok(())
    }

    fn send_handle_value_confirm(&self, conn_id: ConnId, handle: Handle, trans_id: u32) {
        self.state.lock().unwrap().confirm_calls.push((conn_id, handle, trans_id));
    }

    fn white_list_size(&self) -> usize {
        8
    }
}

/// A `ServiceDiscovery` that always starts successfully and never itself
/// reports completion — tests drive `DiscoverCmpl` by hand.
pub struct FakeDiscovery {
    pub fail: bool,
}

impl FakeDiscovery {
    pub fn new() -> Self {
        Self { fail: false }
    }
}

impl ServiceDiscovery for FakeDiscovery {
    fn start_discovery(&self, _conn_id: ConnId, _peer: BdAddr) -> GattcResult<()> {
        if self.fail {
            Err(GattcError::Error)
        } else {
            Ok(())
        }
    }
}

/// An in-memory `AttributeCache`.
#[derive(Default)]
pub struct FakeCache {
    stored: Mutex<Vec<(BdAddr, AttributeDatabase)>>,
    bonded: Mutex<Vec<BdAddr>>,
}

impl FakeCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_bonded(&self, peer: BdAddr) {
        self.bonded.lock().unwrap().push(peer);
    }
}

impl AttributeCache for FakeCache {
    fn load(&self, peer: BdAddr) -> Option<AttributeDatabase> {
        self.stored
            .lock()
            .unwrap()
            .iter()
            .find(|(p, _)| *p == peer)
            .map(|(_, db)| db.clone())
    }

    fn reset(&self, peer: BdAddr) {
        self.stored.lock().unwrap().retain(|(p, _)| *p != peer);
    }

    fn store(&self, peer: BdAddr, db: &AttributeDatabase) {
        let mut stored = self.stored.lock().unwrap();
        stored.retain(|(p, _)| *p != peer);
        stored.push((peer, db.clone()));
    }

    fn is_bonded(&self, peer: BdAddr) -> bool {
        self.bonded.lock().unwrap().contains(&peer)
    }
}

/// Always reports the same robust-caching verdict.
pub struct FixedPolicy(pub RobustCachingSupport);

impl RobustCachingPolicy for FixedPolicy {
    fn support(&self, _peer: BdAddr, _db: &AttributeDatabase) -> RobustCachingSupport {
        self.0
    }
}

/// A `GattClientCallback` that records every event it receives, for
/// assertion from the test thread.
#[derive(Clone, Default)]
pub struct RecordingCallback {
    events: Arc<Mutex<Vec<AppEvent>>>,
}

impl RecordingCallback {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AppEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl GattClientCallback for RecordingCallback {
    fn on_event(&mut self, event: AppEvent) {
        self.events.lock().unwrap().push(event);
    }
}
