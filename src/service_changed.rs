//! Component C6: Service Changed indication handling — parsing the
//! payload, coalescing the resulting re-discovery across every CLCB
//! sharing the SRCB, and the exactly-once ATT confirm (spec.md §4.5).

use crate::clcb::ClcbTable;
use crate::server_record::SrcbIndex;
use crate::state_machine::{self, Ctx};
use crate::transport::AppEvent;
use crate::types::Handle;

/// A parsed Service Changed payload: the inclusive handle range whose
/// contents the peer is telling us changed.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct ServiceChangedRange {
    pub start: Handle,
    pub end: Handle,
}

/// Parses the 4-byte little-endian Service Changed indication value
/// (two handles, start then end). Returns `None` for a malformed payload
/// rather than panicking — a peer is free to send garbage.
pub fn parse_service_changed(value: &[u8]) -> Option<ServiceChangedRange> {
    if value.len() != 4 {
        return None;
    }
    let start = u16::from_le_bytes([value[0], value[1]]);
    let end = u16::from_le_bytes([value[2], value[3]]);
    Some(ServiceChangedRange { start, end })
}

/// Handles an indication on the Service Changed characteristic: every app
/// with a CLCB against the affected SRCB is told its cache went stale
/// (`SRVC_CHG_EVT`). The ATT confirm and the actual re-discovery don't
/// fire until `update_count` reaches the number of CLCBs sharing this
/// SRCB — only then has every registrant observed the indication
/// (spec.md §4.5); until then the indication is just counted.
pub fn handle_indication(
    ctx: &mut Ctx,
    clcb_table: &mut ClcbTable,
    srcb: SrcbIndex,
    range: ServiceChangedRange,
    conn_id: crate::types::ConnId,
    handle: Handle,
    trans_id: u32,
) {
    let peer = ctx.srcb.get(srcb).peer;
    let indices = clcb_table.indices_for_srcb(srcb);

    ctx.registry.clear_notifications_in_range(peer, range.start, range.end);

    let record = ctx.srcb.get_mut(srcb);
    record.srvc_changed_pending = true;
    record.update_count += 1;
    let all_observed = !indices.is_empty() && record.update_count >= indices.len();

    for &idx in &indices {
        let Some(clcb) = clcb_table.get(idx) else {
            continue;
        };
        ctx.registry.deliver(clcb.client_id, AppEvent::ServiceChanged { peer });
    }

    if !all_observed {
        return;
    }

    ctx.srcb.get_mut(srcb).update_count = 0;
    confirm(ctx, conn_id, handle, trans_id);

    let idle_clcb = indices
        .iter()
        .find(|&&idx| clcb_table.get(idx).map(|c| c.in_flight.is_none()).unwrap_or(false))
        .copied();

    if let Some(idx) = idle_clcb {
        if let Some(clcb) = clcb_table.get_mut(idx) {
            state_machine::restart_discover(ctx, clcb);
        }
    }
}

/// Confirms the indication on the transport. Called exactly once per
/// indication received, independent of how many CLCBs it fans out to
/// (spec.md §4.5 "exactly-once ATT confirm").
pub fn confirm(ctx: &mut Ctx, conn_id: crate::types::ConnId, handle: Handle, trans_id: u32) {
    ctx.transport.send_handle_value_confirm(conn_id, handle, trans_id);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_little_endian_handle_range() {
        let range = parse_service_changed(&[0x01, 0x00, 0xff, 0x00]).unwrap();
        assert_eq!(range, ServiceChangedRange { start: 1, end: 0xff });
    }

    #[test]
    fn rejects_malformed_payload() {
        assert!(parse_service_changed(&[0x01, 0x00]).is_none());
    }
}
