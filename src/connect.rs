//! Component C7: the connection dispatcher — turns an `ApiOpen` /
//! `ApiCancelOpen` into CLCB allocation plus the right transport call.
//! The already-connected short-circuit (skip straight to `conn` when the
//! transport already has a live connection id) lives inside
//! `state_machine::open` itself, since it's conditioned on the `Connect`
//! call succeeding first and on whether EATT is negotiated (spec.md §4.1,
//! §4.3 `open`).

use crate::clcb::{Clcb, ClcbIndex, ClcbState, ClcbTable};
use crate::error::{GattcError, GattcResult};
use crate::state_machine::{self, Ctx};
use crate::types::{BdAddr, ClientId, ConnId, Transport};

/// Handles `ApiOpen`. Allocates a CLCB if one doesn't already exist for
/// this identity, short-circuits to an immediate `conn` if the transport
/// reports an existing connection, and otherwise drives `open`.
pub fn api_open(
    ctx: &mut Ctx,
    clcb_table: &mut ClcbTable,
    client_id: ClientId,
    peer: BdAddr,
    transport: Transport,
    is_direct: bool,
) -> GattcResult<ClcbIndex> {
    if !ctx.registry.is_registered(client_id) {
        return Err(GattcError::Error);
    }

    let idx = match clcb_table.find_by_identity(client_id, peer, transport) {
        Some(idx) => idx,
        None => {
            let srcb = ctx.srcb.find_or_alloc(peer);
            clcb_table.alloc(Clcb::new(client_id, peer, transport, srcb))
        }
    };

    match clcb_table.get(idx) {
        Some(clcb) if clcb.state == ClcbState::Idle => {}
        Some(_) => return Err(GattcError::AlreadyOpen),
        None => return Err(GattcError::Error),
    }

    state_machine::open(ctx, clcb_table, idx, is_direct);
    Ok(idx)
}

/// Handles `ApiCancelOpen`: a direct open in `W4Conn` is actively
/// cancelled on the transport; a background open simply drops out of the
/// tracker (spec.md §4.1 `cancel_open`).
pub fn api_cancel_open(
    ctx: &mut Ctx,
    clcb_table: &mut ClcbTable,
    client_id: ClientId,
    peer: BdAddr,
    transport: Transport,
    is_direct: bool,
) {
    let Some(idx) = clcb_table.find_by_identity(client_id, peer, transport) else {
        ctx.registry.untrack_background_connect(client_id, peer);
        return;
    };
    let Some(clcb) = clcb_table.get_mut(idx) else {
        return;
    };

    if is_direct {
        if clcb.state == ClcbState::W4Conn {
            state_machine::cancel_open(ctx, clcb, true);
        }
    } else {
        ctx.registry.untrack_background_connect(client_id, peer);
        state_machine::cancel_open(ctx, clcb, false);
        state_machine::cancel_open_ok(ctx, clcb);
    }
}

pub fn int_conn(
    ctx: &mut Ctx,
    clcb_table: &mut ClcbTable,
    client_id: ClientId,
    peer: BdAddr,
    transport: Transport,
    conn_id: ConnId,
    mtu: u16,
) {
    let Some(idx) = clcb_table.find_by_identity(client_id, peer, transport) else {
        return;
    };
    let waiting = matches!(clcb_table.get(idx), Some(c) if c.state == ClcbState::W4Conn);
    if waiting {
        state_machine::conn(ctx, clcb_table, idx, conn_id, mtu);
    }
}

/// Finds `client_id`'s CLCB against `peer`/`transport`, allocating and
/// synthesizing a connect for it if none exists yet — used when a
/// notification arrives for an app that registered interest in a handle
/// without itself driving the connection open (spec.md §4.5 "if no CLCB
/// exists yet for this peer but notifications are registered, allocate a
/// CLCB and drive it through INT_CONN synthetically").
pub fn ensure_clcb_for_notification(
    ctx: &mut Ctx,
    clcb_table: &mut ClcbTable,
    client_id: ClientId,
    peer: BdAddr,
    transport: Transport,
    conn_id: ConnId,
    mtu: u16,
) -> Option<ClcbIndex> {
    if !ctx.registry.is_registered(client_id) {
        return None;
    }
    if let Some(idx) = clcb_table.find_by_identity(client_id, peer, transport) {
        return Some(idx);
    }
    let srcb = ctx.srcb.find_or_alloc(peer);
    let idx = clcb_table.alloc(Clcb::new(client_id, peer, transport, srcb));
    state_machine::conn(ctx, clcb_table, idx, conn_id, mtu);
    Some(idx)
}

pub fn int_open_fail(
    ctx: &mut Ctx,
    clcb_table: &mut ClcbTable,
    client_id: ClientId,
    peer: BdAddr,
    transport: Transport,
) {
    if let Some(idx) = clcb_table.find_by_identity(client_id, peer, transport) {
        if let Some(clcb) = clcb_table.get_mut(idx) {
            state_machine::fail(ctx, clcb);
        }
    }
}
