//! The state machine's event vocabulary (spec.md §4.3) and the pending
//! command record queued by a CLCB (spec.md §4.4).

use crate::error::GattcResult;
use crate::types::{BdAddr, ClientId, ConnId, ConnReason, Handle, TransId, Transport, Uuid};

/// A single attribute operation, in flight or deferred in a CLCB's
/// single-slot queue (spec.md §3 "Pending command").
#[derive(Debug, Clone)]
pub enum PendingCommand {
    ReadByHandle { handle: Handle },
    ReadByUuid { start: Handle, end: Handle, uuid: Uuid },
    ReadMulti { handles: Vec<Handle> },
    /// Same request shape as `ReadMulti`, but issued against the
    /// variable-length-response flavor of the ATT operation (distinct on
    /// the wire: each value in the reply is length-prefixed).
    ReadMultiVariable { handles: Vec<Handle> },
    Write { handle: Handle, value: Vec<u8>, with_response: bool },
    ExecuteWrite { execute: bool },
    ConfigMtu { mtu: u16 },
}

/// The payload of a completed attribute operation, as reported by the
/// transport (spec.md §6 "op-complete").
#[derive(Debug, Clone)]
pub enum OpCompletePayload {
    Read { value: Vec<u8> },
    ReadMulti { value: Vec<u8> },
    ReadMultiVariable { value: Vec<u8> },
    Write,
    ExecuteWrite,
    ConfigMtu { mtu: u16 },
}

/// Events fed into `GattClientCore::handle_event`. Falls into the three
/// classes spec.md §4.3 names: API events (from an app), internal events
/// (from the connection dispatcher / service-changed handler / ingress),
/// and completion events (from the transport).
#[derive(Debug, Clone)]
pub enum Event {
    // --- API events ---
    ApiOpen {
        client_id: ClientId,
        peer: BdAddr,
        transport: Transport,
        is_direct: bool,
    },
    ApiCancelOpen {
        client_id: ClientId,
        peer: BdAddr,
        transport: Transport,
        is_direct: bool,
    },
    ApiClose {
        conn_id: ConnId,
    },
    ApiCommand {
        conn_id: ConnId,
        cmd: PendingCommand,
    },
    ApiSearch {
        conn_id: ConnId,
        filter_uuid: Option<Uuid>,
    },
    ApiConfirm {
        conn_id: ConnId,
        handle: Handle,
        trans_id: TransId,
    },

    // --- internal events ---
    IntConn {
        client_id: ClientId,
        peer: BdAddr,
        transport: Transport,
        conn_id: ConnId,
        mtu: u16,
    },
    IntOpenFail {
        client_id: ClientId,
        peer: BdAddr,
        transport: Transport,
    },
    IntCancelOpenOk {
        client_id: ClientId,
        peer: BdAddr,
        transport: Transport,
    },
    IntDiscover {
        conn_id: ConnId,
    },
    IntDisconn {
        conn_id: ConnId,
        reason: ConnReason,
        peer_initiated: bool,
    },

    // --- completion events ---
    DiscoverCmpl {
        conn_id: ConnId,
        status: GattcResult<()>,
    },
    OpComplete {
        conn_id: ConnId,
        status: GattcResult<()>,
        payload: OpCompletePayload,
    },
}
