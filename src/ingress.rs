//! Component C8: event ingress — converts raw transport callbacks into
//! the normalized events the state machine understands, or into direct
//! app-callback passthrough for events the core doesn't otherwise act on
//! (spec.md §4.7, §6 "Transport callbacks"). A non-service-changed
//! indication or notification is fanned out to every app registered for
//! that peer/handle pair rather than only the app that happens to own the
//! connection's CLCB (spec.md §4.5).

use crate::clcb::ClcbTable;
use crate::connect;
use crate::error::GattcResult;
use crate::event::OpCompletePayload;
use crate::server_record::SrcbIndex;
use crate::service_changed;
use crate::state_machine::{self, Ctx};
use crate::transport::AppEvent;
use crate::types::{BdAddr, ClientId, ConnId, ConnReason, Handle, Transport};

/// Raw events as the lower transport reports them, before this core
/// normalizes them. Mirrors the shape of the teacher's `GattcEvent`
/// funnel, one variant per ESP-IDF GATTC callback case.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    Connected {
        client_id: ClientId,
        peer: BdAddr,
        transport: Transport,
        conn_id: ConnId,
        mtu: u16,
    },
    OpenFailed {
        client_id: ClientId,
        peer: BdAddr,
        transport: Transport,
    },
    CancelOpenOk {
        client_id: ClientId,
        peer: BdAddr,
        transport: Transport,
    },
    Disconnected {
        conn_id: ConnId,
        reason: ConnReason,
        peer_initiated: bool,
    },
    DiscoveryComplete {
        conn_id: ConnId,
        status: crate::error::GattcResult<()>,
    },
    OpComplete {
        conn_id: ConnId,
        status: crate::error::GattcResult<()>,
        payload: OpCompletePayload,
    },
    Indication {
        conn_id: ConnId,
        handle: Handle,
        value: Vec<u8>,
        trans_id: u32,
        needs_confirm: bool,
    },
    Notification {
        conn_id: ConnId,
        handle: Handle,
        value: Vec<u8>,
    },
    Congestion {
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
        status: crate::error::GattcResult<()>,
    },
    /// The transport's own outbound command queue is full. Diagnostic
    /// only; this core's single-slot per-connection queue already
    /// refuses a command it can't hold, so there's nothing to action
    /// here beyond telling the app.
    QueueFull {
        conn_id: ConnId,
    },
}

/// Routes one raw transport event into the state machine or straight to
/// the registered app's callback.
pub fn route(ctx: &mut Ctx, clcb_table: &mut ClcbTable, event: TransportEvent) {
    match event {
        TransportEvent::Connected {
            client_id,
            peer,
            transport,
            conn_id,
            mtu,
        } => connect::int_conn(ctx, clcb_table, client_id, peer, transport, conn_id, mtu),

        TransportEvent::OpenFailed { client_id, peer, transport } => {
            connect::int_open_fail(ctx, clcb_table, client_id, peer, transport)
        }

        TransportEvent::CancelOpenOk { client_id, peer, transport } => {
            if let Some(idx) = clcb_table.find_by_identity(client_id, peer, transport) {
                if let Some(clcb) = clcb_table.get_mut(idx) {
                    state_machine::cancel_open_ok(ctx, clcb);
                }
            }
        }

        TransportEvent::Disconnected { conn_id, reason, .. } => {
            if let Some(idx) = clcb_table.find_by_conn_id(conn_id) {
                if let Some(clcb) = clcb_table.get_mut(idx) {
                    if clcb.is_discovering() {
                        state_machine::disc_close(ctx, clcb, reason, Err(crate::error::GattcError::Cancel), false);
                    } else {
                        state_machine::close(ctx, clcb, reason, Ok(()), false);
                    }
                }
            }
        }

        TransportEvent::DiscoveryComplete { conn_id, status } => {
            if let Some(idx) = clcb_table.find_by_conn_id(conn_id) {
                if let Some(clcb) = clcb_table.get_mut(idx) {
                    state_machine::disc_cmpl(ctx, clcb, status);
                }
            }
        }

        TransportEvent::OpComplete { conn_id, status, payload } => {
            if let Some(idx) = clcb_table.find_by_conn_id(conn_id) {
                let srcb = clcb_table.get(idx).map(|c| c.srcb);
                let mtu_payload = match &payload {
                    OpCompletePayload::ConfigMtu { mtu } => Some(*mtu),
                    _ => None,
                };
                if let Some(clcb) = clcb_table.get_mut(idx) {
                    state_machine::op_complete(ctx, clcb, status, payload);
                }
                if let (Some(srcb), Some(mtu)) = (srcb, mtu_payload) {
                    release_mtu_waiters(ctx, clcb_table, srcb, status, mtu);
                }
            }
        }

        TransportEvent::Indication {
            conn_id,
            handle,
            value,
            trans_id,
            needs_confirm,
        } => {
            let srcb = clcb_table.find_by_conn_id(conn_id).and_then(|idx| clcb_table.get(idx).map(|c| c.srcb));
            let is_service_changed = srcb
                .map(|srcb| {
                    ctx.srcb
                        .get(srcb)
                        .database
                        .service_changed_handle()
                        .map(|h| h == handle)
                        .unwrap_or(false)
                })
                .unwrap_or(false);

            // An ordinary indication is confirmed the moment it arrives; a
            // Service Changed one is confirmed exactly once, gated on every
            // registrant having observed it (spec.md §4.5).
            if needs_confirm && !is_service_changed {
                service_changed::confirm(ctx, conn_id, handle, trans_id);
            }

            if let (Some(srcb), true) = (srcb, is_service_changed) {
                match service_changed::parse_service_changed(&value) {
                    Some(range) => {
                        service_changed::handle_indication(ctx, clcb_table, srcb, range, conn_id, handle, trans_id);
                    }
                    // Malformed payload: there's no range to act on, but the
                    // peer is still owed its confirm or it'll stall every
                    // further indication on this connection behind it.
                    None if needs_confirm => service_changed::confirm(ctx, conn_id, handle, trans_id),
                    None => {}
                }
            } else {
                deliver_notification(ctx, clcb_table, conn_id, handle, value, false);
            }
        }

        TransportEvent::Notification { conn_id, handle, value } => {
            deliver_notification(ctx, clcb_table, conn_id, handle, value, true);
        }

        TransportEvent::Congestion { conn_id, congested } => {
            deliver_passthrough(ctx, clcb_table, conn_id, AppEvent::Congest { conn_id, congested })
        }
        TransportEvent::PhyUpdate { conn_id, tx_phy, rx_phy } => deliver_passthrough(
            ctx,
            clcb_table,
            conn_id,
            AppEvent::PhyUpdate { conn_id, tx_phy, rx_phy },
        ),
        TransportEvent::ConnUpdate { conn_id, interval, latency, timeout } => deliver_passthrough(
            ctx,
            clcb_table,
            conn_id,
            AppEvent::ConnUpdate { conn_id, interval, latency, timeout },
        ),
        TransportEvent::SubrateChange { conn_id, subrate_factor } => deliver_passthrough(
            ctx,
            clcb_table,
            conn_id,
            AppEvent::SubrateChange { conn_id, subrate_factor },
        ),
        TransportEvent::EncryptionComplete { conn_id, status } => deliver_passthrough(
            ctx,
            clcb_table,
            conn_id,
            AppEvent::EncryptionComplete { conn_id, status },
        ),
        TransportEvent::QueueFull { conn_id } => {
            log::warn!("transport command queue full on conn {conn_id}");
            deliver_passthrough(ctx, clcb_table, conn_id, AppEvent::QueueFull { conn_id });
        }
    }
}

/// Fans a notification/non-service-changed-indication out to every app
/// registered for `(peer, handle)`, allocating a CLCB for a registrant
/// that doesn't already have one against this connection (spec.md §4.5:
/// "if it falls in a registered notification entry for some app, deliver
/// NOTIF_EVT... if no CLCB exists yet for this peer but notifications are
/// registered, allocate a CLCB and drive it through INT_CONN
/// synthetically"). An indication/notification nobody registered for is
/// simply dropped — an indication needing confirmation was already
/// confirmed by the caller before reaching here.
fn deliver_notification(
    ctx: &mut Ctx,
    clcb_table: &mut ClcbTable,
    conn_id: ConnId,
    handle: Handle,
    value: Vec<u8>,
    is_notify: bool,
) {
    let Some(idx) = clcb_table.find_by_conn_id(conn_id) else {
        return;
    };
    let Some((peer, transport, srcb)) = clcb_table.get(idx).map(|c| (c.peer, c.transport, c.srcb)) else {
        return;
    };
    let mtu = ctx.srcb.get(srcb).mtu;

    for client_id in ctx.registry.notification_clients_for(peer, handle) {
        if connect::ensure_clcb_for_notification(ctx, clcb_table, client_id, peer, transport, conn_id, mtu).is_some()
        {
            ctx.registry.deliver(
                client_id,
                AppEvent::Notify {
                    conn_id,
                    handle,
                    value: value.clone(),
                    is_notify,
                },
            );
        }
    }
}

fn deliver_passthrough(ctx: &mut Ctx, clcb_table: &ClcbTable, conn_id: ConnId, event: AppEvent) {
    if let Some(idx) = clcb_table.find_by_conn_id(conn_id) {
        if let Some(clcb) = clcb_table.get(idx) {
            ctx.registry.deliver(clcb.client_id, event);
        }
    }
}

/// Releases every CLCB parked on `srcb`'s MTU wait list with the same
/// outcome the in-flight exchange just produced (spec.md §4.4 scenario
/// S6: every coalesced waiter gets `CFG_MTU` before any further action).
fn release_mtu_waiters(
    ctx: &mut Ctx,
    clcb_table: &mut ClcbTable,
    srcb: SrcbIndex,
    status: GattcResult<()>,
    mtu: u16,
) {
    let waiters = std::mem::take(&mut ctx.srcb.get_mut(srcb).mtu_waiters);
    for idx in waiters {
        if let Some(clcb) = clcb_table.get_mut(idx) {
            let conn_id = clcb.conn_id;
            ctx.registry.deliver(clcb.client_id, AppEvent::ConfigMtu { conn_id, status, mtu });
        }
    }
}
