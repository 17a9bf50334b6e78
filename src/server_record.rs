//! Component C2: the per-peer server record (SRCB) — one per distinct
//! peer address, shared by every CLCB connected to it, holding the cached
//! attribute database and the discovery state shared across apps
//! (spec.md §3 "Server record").

use crate::clcb::ClcbIndex;
use crate::transport::AttributeDatabase;
use crate::types::BdAddr;

/// Discovery state of a peer's cached database, shared by every CLCB
/// pointing at this SRCB.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum DiscoverState {
    /// No discovery in flight; the cache (if any) is considered valid.
    Idle,
    /// A cache load from the external store is in flight.
    Load,
    /// A full service discovery is in flight.
    Disc,
    /// A discovery triggered by a Service Changed indication is in flight,
    /// distinguished from `Disc` only so completion knows whether to reset
    /// the robust-caching hash (spec.md §4.3 `DISC_ACT`).
    DiscAct,
}

/// Index into `ClcbTable`, used only to track how many CLCBs reference
/// this SRCB so it can be freed when the last one closes.
pub type SrcbIndex = usize;

/// C2: one per distinct (peer) the core has ever connected to.
pub struct ServerRecord {
    pub peer: BdAddr,
    pub connected: bool,
    pub mtu: u16,
    pub state: DiscoverState,
    pub database: AttributeDatabase,
    /// Set when a Service Changed indication reported a handle range that
    /// overlaps the cached database, forcing a re-discovery on next open.
    pub srvc_changed_pending: bool,
    /// Service Changed indications observed since the last discovery;
    /// reset to 0 once it reaches the number of CLCBs sharing this SRCB,
    /// the point at which every registrant has seen the change and the
    /// ATT confirm / re-discovery actually fire (spec.md §4.5).
    pub update_count: usize,
    /// Robust-caching database hash last observed, used to decide whether
    /// a reconnect can skip discovery entirely (spec.md §4.3 `conn`).
    pub db_hash_known: bool,
    pub num_clcb: usize,
    /// CLCBs parked behind an MTU exchange another CLCB on this same peer
    /// already kicked off (spec.md §4.4 "MTU coalescing" / scenario S6).
    pub mtu_waiters: Vec<ClcbIndex>,
}

impl ServerRecord {
    pub fn new(peer: BdAddr) -> Self {
        Self {
            peer,
            connected: false,
            mtu: 23,
            state: DiscoverState::Idle,
            database: AttributeDatabase::default(),
            srvc_changed_pending: false,
            update_count: 0,
            db_hash_known: false,
            num_clcb: 0,
            mtu_waiters: Vec::new(),
        }
    }

    pub fn set_discover_state(&mut self, state: DiscoverState) {
        self.state = state;
    }

    pub fn is_discovering(&self) -> bool {
        matches!(self.state, DiscoverState::Disc | DiscoverState::DiscAct)
    }

    /// Wipes the cached database and its bookkeeping so the next
    /// `start_discover` rebuilds it from scratch (spec.md §4.3
    /// `restart_discover` / Service Changed handling). This is purely
    /// local to the record; it does not touch any CLCB. Compare
    /// [`state_machine::reset_discover_state`](crate::state_machine::reset_discover_state),
    /// the distinct C2 operation of the same name in spec.md §4.2 that
    /// fans a `DISCOVER_CMPL` event out to every CLCB sharing this SRCB.
    pub fn clear_cache(&mut self) {
        self.database.clear();
        self.db_hash_known = false;
        self.srvc_changed_pending = false;
        self.update_count = 0;
        self.state = DiscoverState::Idle;
    }

    /// The underlying ACL link dropped. Every CLCB against this SRCB will
    /// be torn down by the caller; the cached database itself survives
    /// (robust caching may still answer from it on the next connect).
    pub fn server_disconnected(&mut self) {
        self.connected = false;
        self.mtu = 23;
        self.state = DiscoverState::Idle;
        self.mtu_waiters.clear();
    }
}

/// Owns every SRCB ever allocated, indexed by a stable handle so CLCBs can
/// reference one without a raw pointer (spec.md §9 "arena with stable
/// indices").
#[derive(Default)]
pub struct SrcbTable {
    records: Vec<ServerRecord>,
}

impl SrcbTable {
    pub fn new() -> Self {
        Self { records: Vec::new() }
    }

    /// Finds the SRCB for `peer`, allocating one if this is the first
    /// CLCB ever to reference it.
    pub fn find_or_alloc(&mut self, peer: BdAddr) -> SrcbIndex {
        if let Some(idx) = self.records.iter().position(|r| r.peer == peer) {
            return idx;
        }
        self.records.push(ServerRecord::new(peer));
        self.records.len() - 1
    }

    pub fn find(&self, peer: BdAddr) -> Option<SrcbIndex> {
        self.records.iter().position(|r| r.peer == peer)
    }

    pub fn get(&self, idx: SrcbIndex) -> &ServerRecord {
        &self.records[idx]
    }

    pub fn get_mut(&mut self, idx: SrcbIndex) -> &mut ServerRecord {
        &mut self.records[idx]
    }
}
