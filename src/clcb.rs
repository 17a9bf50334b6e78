//! Component C3: the client connection block (CLCB) — one per
//! (client, peer, transport) tuple the core is tracking, whether or not
//! it currently has a live connection id (spec.md §3 "Client connection
//! block").

use crate::event::PendingCommand;
use crate::server_record::SrcbIndex;
use crate::types::{BdAddr, ClientId, ConnId, Transport};

/// CLCB lifecycle state (spec.md §4.3's state column).
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ClcbState {
    Idle,
    W4Conn,
    Conn,
    Discover,
    /// Discovering because of a Service Changed indication rather than a
    /// fresh open; same transitions as `Discover` but remembers the
    /// distinction so `disc_cmpl` knows not to reset the robust-caching
    /// hash on success.
    DiscoverRc,
}

/// What the CLCB should do with its connection once an in-flight
/// discovery completes (spec.md §4.4 "auto_update").
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum AutoUpdate {
    NoSchedule,
    /// An MTU or similar request arrived mid-discovery; retry once
    /// discovery completes.
    ReqWaiting,
    /// A discovery is scheduled to restart once the current one
    /// completes (Service Changed arrived mid-discovery).
    DiscWaiting,
}

/// Index into `ClcbTable`.
pub type ClcbIndex = usize;

/// C3: one per open-or-opening connection. Owns at most one outstanding
/// attribute operation at a time (`pending`), per spec.md §4.4's
/// single-slot queue.
pub struct Clcb {
    pub client_id: ClientId,
    pub peer: BdAddr,
    pub transport: Transport,
    pub srcb: SrcbIndex,

    pub conn_id: ConnId,
    pub state: ClcbState,
    pub auto_update: AutoUpdate,

    /// Set while a discovery this CLCB itself started is in flight, as
    /// opposed to one merely shared via the SRCB from another CLCB.
    pub disc_active: bool,
    /// An attribute-operation API call arrived while `state` was
    /// `Discover`/`DiscoverRc`; remembered so it can be replayed once
    /// discovery completes (spec.md §4.3 edge case).
    pub request_during_discovery: bool,

    /// The single in-flight or deferred attribute operation, if any.
    pub in_flight: Option<PendingCommand>,
    /// At most one further command queued behind `in_flight` (spec.md §9
    /// Open Question: overwrite vs reject — resolved to reject, see
    /// `queue.rs`).
    pub deferred: Option<PendingCommand>,
}

impl Clcb {
    pub fn new(client_id: ClientId, peer: BdAddr, transport: Transport, srcb: SrcbIndex) -> Self {
        Self {
            client_id,
            peer,
            transport,
            srcb,
            conn_id: 0,
            state: ClcbState::Idle,
            auto_update: AutoUpdate::NoSchedule,
            disc_active: false,
            request_during_discovery: false,
            in_flight: None,
            deferred: None,
        }
    }

    pub fn is_discovering(&self) -> bool {
        matches!(self.state, ClcbState::Discover | ClcbState::DiscoverRc)
    }

    pub fn matches(&self, client_id: ClientId, peer: BdAddr, transport: Transport) -> bool {
        self.client_id == client_id && self.peer == peer && self.transport == transport
    }
}

/// Owns every CLCB ever allocated, indexed by a stable handle (spec.md §9
/// "arena with stable indices", replacing the teacher's pointer graph).
#[derive(Default)]
pub struct ClcbTable {
    blocks: Vec<Option<Clcb>>,
}

impl ClcbTable {
    pub fn new() -> Self {
        Self { blocks: Vec::new() }
    }

    pub fn alloc(&mut self, clcb: Clcb) -> ClcbIndex {
        if let Some(slot) = self.blocks.iter().position(|b| b.is_none()) {
            self.blocks[slot] = Some(clcb);
            return slot;
        }
        self.blocks.push(Some(clcb));
        self.blocks.len() - 1
    }

    pub fn free(&mut self, idx: ClcbIndex) -> Option<Clcb> {
        self.blocks.get_mut(idx).and_then(|slot| slot.take())
    }

    pub fn get(&self, idx: ClcbIndex) -> Option<&Clcb> {
        self.blocks.get(idx).and_then(|b| b.as_ref())
    }

    pub fn get_mut(&mut self, idx: ClcbIndex) -> Option<&mut Clcb> {
        self.blocks.get_mut(idx).and_then(|b| b.as_mut())
    }

    pub fn find_by_conn_id(&self, conn_id: ConnId) -> Option<ClcbIndex> {
        self.blocks
            .iter()
            .position(|b| matches!(b, Some(c) if c.conn_id == conn_id))
    }

    pub fn find_by_identity(
        &self,
        client_id: ClientId,
        peer: BdAddr,
        transport: Transport,
    ) -> Option<ClcbIndex> {
        self.blocks
            .iter()
            .position(|b| matches!(b, Some(c) if c.matches(client_id, peer, transport)))
    }

    pub fn indices_for_srcb(&self, srcb: SrcbIndex) -> Vec<ClcbIndex> {
        self.blocks
            .iter()
            .enumerate()
            .filter_map(|(i, b)| match b {
                Some(c) if c.srcb == srcb => Some(i),
                _ => None,
            })
            .collect()
    }

    /// Every CLCB currently owned by `client_id`, regardless of peer —
    /// used to fan out a synthetic close to all of an app's open
    /// connections on deregister (spec.md §4.1).
    pub fn indices_for_client(&self, client_id: ClientId) -> Vec<ClcbIndex> {
        self.blocks
            .iter()
            .enumerate()
            .filter_map(|(i, b)| match b {
                Some(c) if c.client_id == client_id => Some(i),
                _ => None,
            })
            .collect()
    }
}
