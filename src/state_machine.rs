//! Component C4: the (state, event) -> (action, next state) dispatch
//! table (spec.md §4.3) and the action functions it names.
//!
//! Every action takes a [`Ctx`] bundling the tables and external
//! collaborators it needs, rather than a method on a God object — the
//! same shape the teacher uses for its free functions taking `&EspGattc`.

use crate::clcb::{AutoUpdate, Clcb, ClcbIndex, ClcbState, ClcbTable};
use crate::config::GattcConfig;
use crate::event::{OpCompletePayload, PendingCommand};
use crate::queue::{self, EnqueueOutcome};
use crate::registry::Registry;
use crate::server_record::{DiscoverState, SrcbIndex, SrcbTable};
use crate::transport::{
    AppEvent, AttributeCache, GattTransport, RobustCachingPolicy, RobustCachingSupport,
    ServiceDiscovery, TryMtuResult,
};
use crate::types::ConnReason;

/// Everything an action function might need, borrowed disjointly so the
/// caller (`core.rs`) can destructure its fields instead of going through
/// `&mut self` and fighting the borrow checker.
pub struct Ctx<'a> {
    pub registry: &'a mut Registry,
    pub srcb: &'a mut SrcbTable,
    pub transport: &'a dyn GattTransport,
    pub discovery: &'a dyn ServiceDiscovery,
    pub cache: &'a dyn AttributeCache,
    pub policy: &'a dyn RobustCachingPolicy,
    pub config: &'a GattcConfig,
}

/// Opens a direct connection, or arms the background-connect tracker for
/// an indirect one (spec.md §4.3 `open`). Takes the CLCB by table index,
/// rather than by direct reference, so it can hand off into `conn` below —
/// which needs the table to broadcast to sibling CLCBs on the same SRCB.
pub fn open(ctx: &mut Ctx, clcb_table: &mut ClcbTable, idx: ClcbIndex, is_direct: bool) {
    let Some((client_id, peer, transport)) = clcb_table.get(idx).map(|c| (c.client_id, c.peer, c.transport)) else {
        return;
    };

    if is_direct {
        if ctx.transport.connect(client_id, peer, true, transport) {
            if let Some(clcb) = clcb_table.get_mut(idx) {
                clcb.state = ClcbState::W4Conn;
            }
            // Already connected from a prior session on this same link: if
            // EATT isn't negotiated there's no handshake about to deliver
            // its own connect callback, so synthesize one now rather than
            // leaving the app waiting (spec.md §4.3 `open`).
            if let Some(conn_id) = ctx.transport.conn_id_if_connected(client_id, peer, transport) {
                if !ctx.transport.eatt_supported(client_id, peer) {
                    let mtu = ctx.transport.mtu_size(conn_id);
                    conn(ctx, clcb_table, idx, conn_id, mtu);
                }
            }
        } else {
            ctx.registry.deliver(
                client_id,
                AppEvent::Open {
                    status: Err(crate::error::GattcError::Error),
                    peer,
                    conn_id: 0,
                    mtu: 0,
                },
            );
        }
        return;
    }

    match ctx.registry.track_background_connect(client_id, peer) {
        Ok(()) => {
            ctx.transport.connect(client_id, peer, false, transport);
            if let Some(conn_id) = ctx.transport.conn_id_if_connected(client_id, peer, transport) {
                if !ctx.transport.eatt_supported(client_id, peer) {
                    let mtu = ctx.transport.mtu_size(conn_id);
                    conn(ctx, clcb_table, idx, conn_id, mtu);
                }
            }
        }
        Err(e) => {
            ctx.registry.deliver(
                client_id,
                AppEvent::Open {
                    status: Err(e),
                    peer,
                    conn_id: 0,
                    mtu: 0,
                },
            );
        }
    }
}

/// The link came up. Decides whether robust caching lets discovery be
/// skipped (spec.md §4.3 `conn`, scenario S1): discovery is needed unless
/// the loaded database is both non-empty and the peer isn't known to
/// require robust-caching discovery, matching `GetRobustCachingSupport`'s
/// ground truth (`db.IsEmpty() || support == SUPPORTED` discovers;
/// everything else accepts the cache as-is).
pub fn conn(ctx: &mut Ctx, clcb_table: &mut ClcbTable, clcb_idx: ClcbIndex, conn_id: crate::types::ConnId, mtu: u16) {
    let Some(clcb) = clcb_table.get_mut(clcb_idx) else {
        return;
    };
    clcb.conn_id = conn_id;
    clcb.state = ClcbState::Conn;
    let client_id = clcb.client_id;
    let peer = clcb.peer;
    let srcb_idx = clcb.srcb;

    ctx.registry.on_clcb_opened(client_id);
    ctx.registry.untrack_background_connect(client_id, peer);
    ctx.registry.reenable_notifications(client_id, peer);

    let srcb = ctx.srcb.get_mut(srcb_idx);
    srcb.connected = true;
    srcb.mtu = mtu;
    srcb.num_clcb += 1;

    // A cache that's gone empty or an SRCB that wasn't left IDLE can't be
    // trusted as-is; if the peer is bonded, pull the last stored database
    // back in before deciding whether discovery is needed at all.
    if (srcb.database.is_empty() || srcb.state != DiscoverState::Idle) && ctx.cache.is_bonded(peer) {
        srcb.state = DiscoverState::Load;
        if let Some(db) = ctx.cache.load(peer) {
            let srcb = ctx.srcb.get_mut(srcb_idx);
            srcb.database = db;
            srcb.db_hash_known = srcb.database.has_database_hash();
        }
    }

    ctx.registry.deliver(
        client_id,
        AppEvent::Open {
            status: Ok(()),
            peer,
            conn_id,
            mtu,
        },
    );

    let srcb = ctx.srcb.get_mut(srcb_idx);
    let needs_discovery =
        srcb.database.is_empty() || matches!(ctx.policy.support(peer, &srcb.database), RobustCachingSupport::Supported);

    if needs_discovery {
        if let Some(clcb) = clcb_table.get_mut(clcb_idx) {
            start_discover(ctx, clcb, conn_id, false);
        }
    } else {
        // Cache accepted as-is: the SRCB never entered DISC, so nothing
        // else will ever fire the completion every attached CLCB (this one
        // included) is waiting on — raise it here (spec.md §4.2
        // `reset_discover_state`).
        ctx.srcb.get_mut(srcb_idx).state = DiscoverState::Idle;
        reset_discover_state(ctx, clcb_table, srcb_idx, Ok(()));
    }
}

/// Kicks off discovery, marking the SRCB so other CLCBs sharing it don't
/// start a redundant second pass (spec.md §4.3 `start_discover`).
///
/// Guard: a CLCB with a command already in flight or deferred holds off a
/// fresh discovery — unless `auto_update` is `ReqWaiting`, the one-shot
/// bypass `disc_cmpl` sets when it's chaining a discovery that was itself
/// deferred by this same guard.
pub fn start_discover(ctx: &mut Ctx, clcb: &mut Clcb, conn_id: crate::types::ConnId, service_changed: bool) {
    let srcb = ctx.srcb.get_mut(clcb.srcb);
    if srcb.is_discovering() {
        clcb.state = if service_changed {
            ClcbState::DiscoverRc
        } else {
            ClcbState::Discover
        };
        return;
    }

    let command_queued = clcb.in_flight.is_some() || clcb.deferred.is_some();
    if command_queued && clcb.auto_update != AutoUpdate::ReqWaiting {
        clcb.auto_update = AutoUpdate::DiscWaiting;
        return;
    }
    clcb.auto_update = AutoUpdate::NoSchedule;

    srcb.set_discover_state(if service_changed {
        DiscoverState::DiscAct
    } else {
        DiscoverState::Disc
    });
    clcb.state = if service_changed {
        ClcbState::DiscoverRc
    } else {
        ClcbState::Discover
    };
    clcb.disc_active = true;

    if let Err(e) = ctx.discovery.start_discovery(conn_id, clcb.peer) {
        disc_cmpl(ctx, clcb, Err(e));
    }
}

/// A discovery this core started has finished (spec.md §4.3 `disc_cmpl`).
pub fn disc_cmpl(ctx: &mut Ctx, clcb: &mut Clcb, status: crate::error::GattcResult<()>) {
    let was_rc = matches!(clcb.state, ClcbState::DiscoverRc);
    clcb.disc_active = false;
    clcb.state = ClcbState::Conn;

    let srcb = ctx.srcb.get_mut(clcb.srcb);
    if status.is_ok() {
        srcb.db_hash_known = srcb.database.has_database_hash();
        if !was_rc {
            ctx.cache.store(clcb.peer, &srcb.database);
        }
    }
    srcb.set_discover_state(DiscoverState::Idle);

    ctx.registry.deliver(
        clcb.client_id,
        AppEvent::SearchComplete {
            peer: clcb.peer,
            status,
        },
    );

    if clcb.request_during_discovery {
        clcb.request_during_discovery = false;
        if let Some(cmd) = clcb.in_flight.clone() {
            issue(ctx, clcb, &cmd);
        }
    }

    if clcb.auto_update == AutoUpdate::DiscWaiting {
        // `ReqWaiting`, not `NoSchedule`: the chained discovery must bypass
        // `start_discover`'s own-command-queued guard, since the command
        // that triggered that guard the first time round is still sitting
        // in `in_flight`/`deferred`.
        clcb.auto_update = AutoUpdate::ReqWaiting;
        restart_discover(ctx, clcb);
    }
}

/// Schedules (or immediately starts) a fresh discovery pass, used by the
/// Service Changed handler (spec.md §4.3 `restart_discover`).
pub fn restart_discover(ctx: &mut Ctx, clcb: &mut Clcb) {
    if clcb.is_discovering() {
        clcb.auto_update = AutoUpdate::DiscWaiting;
        return;
    }
    ctx.srcb.get_mut(clcb.srcb).clear_cache();
    let conn_id = clcb.conn_id;
    start_discover(ctx, clcb, conn_id, true);
}

/// Broadcasts discovery completion to every CLCB sharing `srcb`, feeding
/// each a `DISCOVER_CMPL` event (spec.md §4.2 `reset_discover_state`) —
/// used when a fresh connection accepts the peer's cached database
/// without ever running discovery, so every attached CLCB still gets the
/// completion it would otherwise only see at the end of a real discovery.
pub fn reset_discover_state(
    ctx: &mut Ctx,
    clcb_table: &mut ClcbTable,
    srcb: SrcbIndex,
    status: crate::error::GattcResult<()>,
) {
    for idx in clcb_table.indices_for_srcb(srcb) {
        if let Some(clcb) = clcb_table.get_mut(idx) {
            disc_cmpl(ctx, clcb, status);
        }
    }
}

/// The connection dropped while a discovery owned by this CLCB was in
/// flight (spec.md §4.3 `disc_close`).
pub fn disc_close(
    ctx: &mut Ctx,
    clcb: &mut Clcb,
    reason: ConnReason,
    status: crate::error::GattcResult<()>,
    app_initiated: bool,
) {
    if clcb.disc_active {
        let srcb = ctx.srcb.get_mut(clcb.srcb);
        srcb.set_discover_state(DiscoverState::Idle);
    }
    close(ctx, clcb, reason, status, app_initiated);
}

/// Tears the CLCB's connection down, notifying the app and releasing the
/// SRCB/registry refcounts (spec.md §4.3 `close`). `app_initiated`
/// distinguishes a local `API_CLOSE`/deregister-driven close (which must
/// additionally ask the transport to tear down the link, its own result
/// becoming the event's status) from a peer-initiated one reported
/// through `INT_DISCONN`, where the link is already gone.
pub fn close(
    ctx: &mut Ctx,
    clcb: &mut Clcb,
    reason: ConnReason,
    status: crate::error::GattcResult<()>,
    app_initiated: bool,
) {
    let conn_id = clcb.conn_id;
    clcb.conn_id = 0;
    clcb.state = ClcbState::Idle;
    clcb.in_flight = None;
    clcb.deferred = None;
    clcb.disc_active = false;
    clcb.request_during_discovery = false;
    ctx.registry.mark_notifications_disconnected(clcb.client_id, clcb.peer);

    let status = if app_initiated {
        ctx.transport.disconnect(conn_id)
    } else {
        status
    };

    let srcb = ctx.srcb.get_mut(clcb.srcb);
    srcb.num_clcb = srcb.num_clcb.saturating_sub(1);
    if srcb.num_clcb == 0 {
        srcb.server_disconnected();
    }

    ctx.registry.deliver(
        clcb.client_id,
        AppEvent::Close {
            conn_id,
            peer: clcb.peer,
            reason,
            status,
        },
    );
    ctx.registry.on_clcb_closed(ctx.transport, clcb.client_id);
}

/// An open attempt failed before a link ever formed (spec.md §4.3 `fail`).
pub fn fail(ctx: &mut Ctx, clcb: &mut Clcb) {
    clcb.state = ClcbState::Idle;
    ctx.registry.untrack_background_connect(clcb.client_id, clcb.peer);
    ctx.registry.deliver(
        clcb.client_id,
        AppEvent::Open {
            status: Err(crate::error::GattcError::Error),
            peer: clcb.peer,
            conn_id: 0,
            mtu: 0,
        },
    );
}

pub fn cancel_open(ctx: &mut Ctx, clcb: &Clcb, is_direct: bool) {
    ctx.transport.cancel_connect(clcb.client_id, clcb.peer, is_direct);
}

pub fn cancel_open_ok(ctx: &mut Ctx, clcb: &mut Clcb) {
    clcb.state = ClcbState::Idle;
    ctx.registry.untrack_background_connect(clcb.client_id, clcb.peer);
    ctx.registry.deliver(
        clcb.client_id,
        AppEvent::CancelOpen { status: Ok(()) },
    );
}

/// Issues an attribute operation that has just become the in-flight one.
fn issue(ctx: &mut Ctx, clcb: &Clcb, cmd: &PendingCommand) {
    let conn_id = clcb.conn_id;
    let _ = match cmd {
        PendingCommand::ReadByHandle { handle } => ctx.transport.read(conn_id, *handle),
        PendingCommand::ReadByUuid { start, .. } => ctx.transport.read(conn_id, *start),
        PendingCommand::ReadMulti { handles } => ctx.transport.read_multi(conn_id, handles),
        PendingCommand::ReadMultiVariable { handles } => {
            ctx.transport.read_multi_variable(conn_id, handles)
        }
        PendingCommand::Write { handle, value, with_response } => {
            ctx.transport.write(conn_id, *handle, value, *with_response)
        }
        PendingCommand::ExecuteWrite { execute } => ctx.transport.execute_write(conn_id, *execute),
        PendingCommand::ConfigMtu { mtu } => ctx.transport.configure_mtu(conn_id, *mtu),
    };
}

/// Enqueues an attribute operation. While a discovery is in flight the
/// command is parked directly (not through the normal single-slot queue)
/// and replayed once discovery completes (spec.md §4.3 edge case).
///
/// `clcb_idx` is only needed to park this CLCB on the SRCB's MTU wait
/// list when a config-MTU command coalesces with one already in flight
/// for the same peer (spec.md §4.4 "MTU coalescing").
pub fn submit_command(
    ctx: &mut Ctx,
    clcb: &mut Clcb,
    clcb_idx: ClcbIndex,
    cmd: PendingCommand,
) -> crate::error::GattcResult<()> {
    if let PendingCommand::ConfigMtu { mtu } = cmd {
        return submit_mtu_command(ctx, clcb, clcb_idx, mtu);
    }

    if clcb.is_discovering() {
        clcb.request_during_discovery = true;
        clcb.in_flight = Some(cmd);
        return Ok(());
    }
    match queue::enqueue(clcb, cmd.clone(), ctx.config.strict_single_deferred)? {
        EnqueueOutcome::Start => {
            issue(ctx, clcb, &cmd);
            Ok(())
        }
        EnqueueOutcome::Deferred => Ok(()),
    }
}

/// MTU requests bypass the normal single-slot queue and instead consult
/// `TryMtuRequest` first: a request already in flight for this peer gets
/// this CLCB parked on the SRCB's wait list instead of issuing a second
/// exchange, and every waiter is released with the same outcome once the
/// in-flight one completes (spec.md §4.4, scenario S6).
fn submit_mtu_command(
    ctx: &mut Ctx,
    clcb: &mut Clcb,
    clcb_idx: ClcbIndex,
    mtu: u16,
) -> crate::error::GattcResult<()> {
    let conn_id = clcb.conn_id;
    match ctx.transport.try_mtu_request(clcb.peer, clcb.transport, conn_id) {
        TryMtuResult::DeviceDisconnected | TryMtuResult::NotAllowed => {
            ctx.registry.deliver(
                clcb.client_id,
                AppEvent::ConfigMtu {
                    conn_id,
                    status: Err(crate::error::GattcError::Error),
                    mtu: 0,
                },
            );
        }
        TryMtuResult::AlreadyDone(current) => {
            ctx.registry.deliver(
                clcb.client_id,
                AppEvent::ConfigMtu { conn_id, status: Ok(()), mtu: current },
            );
        }
        TryMtuResult::InProgress => {
            ctx.srcb.get_mut(clcb.srcb).mtu_waiters.push(clcb_idx);
        }
        TryMtuResult::NotDoneYet => {
            let cmd = PendingCommand::ConfigMtu { mtu };
            match queue::enqueue(clcb, cmd.clone(), ctx.config.strict_single_deferred)? {
                EnqueueOutcome::Start => issue(ctx, clcb, &cmd),
                EnqueueOutcome::Deferred => {}
            }
        }
    }
    Ok(())
}

/// An in-flight attribute operation completed; reports it and starts the
/// next deferred one, if any.
pub fn op_complete(
    ctx: &mut Ctx,
    clcb: &mut Clcb,
    status: crate::error::GattcResult<()>,
    payload: OpCompletePayload,
) {
    let conn_id = clcb.conn_id;
    let event = match payload {
        OpCompletePayload::Read { value } => AppEvent::ReadChar {
            conn_id,
            handle: match clcb.in_flight {
                Some(PendingCommand::ReadByHandle { handle }) => handle,
                Some(PendingCommand::ReadByUuid { start, .. }) => start,
                _ => 0,
            },
            status,
            value,
        },
        OpCompletePayload::ReadMulti { value } => AppEvent::ReadMulti { conn_id, status, value },
        OpCompletePayload::ReadMultiVariable { value } => {
            AppEvent::ReadMultiVariable { conn_id, status, value }
        }
        OpCompletePayload::Write => AppEvent::WriteChar {
            conn_id,
            handle: match clcb.in_flight {
                Some(PendingCommand::Write { handle, .. }) => handle,
                _ => 0,
            },
            status,
        },
        OpCompletePayload::ExecuteWrite => AppEvent::ExecuteWrite { conn_id, status },
        OpCompletePayload::ConfigMtu { mtu } => AppEvent::ConfigMtu { conn_id, status, mtu },
    };
    ctx.registry.deliver(clcb.client_id, event);

    if let Some(next) = queue::complete(clcb) {
        issue(ctx, clcb, &next);
    }
}
