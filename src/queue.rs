//! Component C5: the per-connection single-slot operation queue
//! (spec.md §4.4, §9 Open Question on overwrite-vs-reject semantics).
//!
//! Resolved per `SPEC_FULL.md` §4: a second command arriving while one is
//! already deferred is rejected outright rather than overwriting it. The
//! `strict_single_deferred` config flag exists to flip that back to
//! overwrite for callers who'd rather drop a stale deferred command than
//! fail the new one.

use crate::clcb::Clcb;
use crate::error::{GattcError, GattcResult};
use crate::event::PendingCommand;

/// What the caller should do after a successful `enqueue`.
#[derive(Debug, Eq, PartialEq)]
pub enum EnqueueOutcome {
    /// Nothing was in flight; issue `cmd` to the transport now.
    Start,
    /// Something was already in flight; `cmd` was parked and will be
    /// started by a later `complete`.
    Deferred,
}

/// Attempts to queue `cmd` on `clcb`.
pub fn enqueue(
    clcb: &mut Clcb,
    cmd: PendingCommand,
    strict_single_deferred: bool,
) -> GattcResult<EnqueueOutcome> {
    if clcb.in_flight.is_none() {
        clcb.in_flight = Some(cmd);
        return Ok(EnqueueOutcome::Start);
    }
    if clcb.deferred.is_some() {
        if strict_single_deferred {
            return Err(GattcError::NoResources);
        }
        clcb.deferred = Some(cmd);
        return Ok(EnqueueOutcome::Deferred);
    }
    clcb.deferred = Some(cmd);
    Ok(EnqueueOutcome::Deferred)
}

/// Called once the in-flight command finishes. Clears it and, if a
/// command was deferred behind it, promotes it to in-flight and returns
/// it for the caller to issue.
pub fn complete(clcb: &mut Clcb) -> Option<PendingCommand> {
    clcb.in_flight = None;
    if let Some(next) = clcb.deferred.take() {
        clcb.in_flight = Some(next.clone());
        return Some(next);
    }
    None
}
