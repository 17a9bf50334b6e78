//! Component C1: the table of registered applications, their callback
//! sinks, deferred-deregistration bookkeeping and the per-app notification
//! and background-connect trackers (spec.md §3 "Registry").

use std::collections::HashMap;

use crate::error::{GattcError, GattcResult};
use crate::transport::{AppEvent, GattClientCallback, GattTransport};
use crate::types::{BdAddr, ClientId, Handle, Uuid};

/// One registered application.
struct RegistryEntry {
    app_uuid: Uuid,
    callback: Box<dyn GattClientCallback>,
    /// Set by `deregister` while CLCBs still reference this client; the
    /// entry is only torn down once `num_clcb` drops back to zero.
    dereg_pending: bool,
    /// Count of live CLCBs pointing at this client. Mirrors the teacher's
    /// `num_clcb` field used to gate deferred deregistration.
    num_clcb: usize,
}

/// A standing notification registration, surviving the underlying
/// connection going up and down (spec.md §3 "Notification registry").
/// `app_disconnected` is set when the owning CLCB closes and cleared
/// again the next time the same app reconnects to the same peer
/// (spec.md §4.3 `close` / §8 testable property 7) — the registration
/// itself is never dropped by a disconnect, only by deregistration or a
/// service-changed range that invalidates its handle.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
struct NotificationEntry {
    client_id: ClientId,
    peer: BdAddr,
    handle: Handle,
    app_disconnected: bool,
}

/// C1: registered applications, notification subscriptions, and the
/// background-connect tracker, keyed off the transport's white list.
pub struct Registry {
    entries: HashMap<ClientId, RegistryEntry>,
    notifications: Vec<NotificationEntry>,
    background_connects: Vec<(ClientId, BdAddr)>,
    max_background_connects: usize,
}

impl Registry {
    pub fn new(max_background_connects: usize) -> Self {
        Self {
            entries: HashMap::new(),
            notifications: Vec::new(),
            background_connects: Vec::new(),
            max_background_connects,
        }
    }

    /// Registers a new application with the transport and records its
    /// callback sink. Fires `AppEvent::Reg` either way.
    pub fn register(
        &mut self,
        transport: &dyn GattTransport,
        app_uuid: Uuid,
        mut callback: Box<dyn GattClientCallback>,
    ) -> GattcResult<ClientId> {
        match transport.register(app_uuid) {
            Ok(client_id) => {
                transport.start_if(client_id);
                self.entries.insert(
                    client_id,
                    RegistryEntry {
                        app_uuid,
                        callback,
                        dereg_pending: false,
                        num_clcb: 0,
                    },
                );
                if let Some(entry) = self.entries.get_mut(&client_id) {
                    entry.callback.on_event(AppEvent::Reg {
                        status: Ok(()),
                        client_id,
                    });
                }
                Ok(client_id)
            }
            Err(e) => {
                callback.on_event(AppEvent::Reg {
                    status: Err(e),
                    client_id: 0,
                });
                Err(e)
            }
        }
    }

    /// Requests deregistration. If the client still owns open CLCBs the
    /// teardown is deferred until the last one closes (spec.md §4.6).
    pub fn deregister(&mut self, transport: &dyn GattTransport, client_id: ClientId) {
        let Some(entry) = self.entries.get_mut(&client_id) else {
            return;
        };
        if entry.num_clcb > 0 {
            entry.dereg_pending = true;
            return;
        }
        self.finish_deregister(transport, client_id);
    }

    fn finish_deregister(&mut self, transport: &dyn GattTransport, client_id: ClientId) {
        if let Some(mut entry) = self.entries.remove(&client_id) {
            transport.deregister(client_id);
            self.notifications.retain(|n| n.client_id != client_id);
            self.background_connects.retain(|(id, _)| *id != client_id);
            entry.callback.on_event(AppEvent::Dereg { client_id });
        }
    }

    /// A CLCB bound to `client_id` became live. Call before dispatching
    /// `ApiOpen`'s success path.
    pub fn on_clcb_opened(&mut self, client_id: ClientId) {
        if let Some(entry) = self.entries.get_mut(&client_id) {
            entry.num_clcb += 1;
        }
    }

    /// A CLCB bound to `client_id` closed. Finalizes a deferred
    /// deregistration once the last CLCB is gone (spec.md §4.6 `close`).
    pub fn on_clcb_closed(&mut self, transport: &dyn GattTransport, client_id: ClientId) {
        let finish = if let Some(entry) = self.entries.get_mut(&client_id) {
            entry.num_clcb = entry.num_clcb.saturating_sub(1);
            entry.dereg_pending && entry.num_clcb == 0
        } else {
            false
        };
        if finish {
            self.finish_deregister(transport, client_id);
        }
    }

    pub fn is_registered(&self, client_id: ClientId) -> bool {
        self.entries.contains_key(&client_id)
    }

    pub fn is_dereg_pending(&self, client_id: ClientId) -> bool {
        self.entries
            .get(&client_id)
            .map(|e| e.dereg_pending)
            .unwrap_or(false)
    }

    pub fn deliver(&mut self, client_id: ClientId, event: AppEvent) {
        if let Some(entry) = self.entries.get_mut(&client_id) {
            entry.callback.on_event(event);
        }
    }

    // --- notification registry ---

    pub fn register_notification(&mut self, client_id: ClientId, peer: BdAddr, handle: Handle) {
        if let Some(existing) = self
            .notifications
            .iter_mut()
            .find(|n| n.client_id == client_id && n.peer == peer && n.handle == handle)
        {
            existing.app_disconnected = false;
            return;
        }
        self.notifications.push(NotificationEntry {
            client_id,
            peer,
            handle,
            app_disconnected: false,
        });
    }

    pub fn unregister_notification(&mut self, client_id: ClientId, peer: BdAddr, handle: Handle) {
        self.notifications.retain(|n| {
            !(n.client_id == client_id && n.peer == peer && n.handle == handle)
        });
    }

    pub fn is_notification_registered(
        &self,
        client_id: ClientId,
        peer: BdAddr,
        handle: Handle,
    ) -> bool {
        self.notifications.iter().any(|n| {
            n.client_id == client_id && n.peer == peer && n.handle == handle
        })
    }

    /// A CLCB for `(client_id, peer)` closed; its notification
    /// registrations survive but are marked disconnected until the app
    /// reconnects to the same peer (spec.md §4.3 `close`).
    pub fn mark_notifications_disconnected(&mut self, client_id: ClientId, peer: BdAddr) {
        for n in self.notifications.iter_mut().filter(|n| n.client_id == client_id && n.peer == peer) {
            n.app_disconnected = true;
        }
    }

    /// A CLCB for `(client_id, peer)` connected; re-enables any
    /// registrations left `app_disconnected` from a prior session
    /// (spec.md §4.3 `conn` / §8 testable property 7).
    pub fn reenable_notifications(&mut self, client_id: ClientId, peer: BdAddr) {
        for n in self.notifications.iter_mut().filter(|n| n.client_id == client_id && n.peer == peer) {
            n.app_disconnected = false;
        }
    }

    /// Every client registered for notifications on `(peer, handle)`,
    /// regardless of `app_disconnected` — a registration that survived a
    /// disconnect is still "registered" for the purpose of deciding
    /// whether an incoming indication/notification should be delivered
    /// (spec.md §4.5).
    pub fn notification_clients_for(&self, peer: BdAddr, handle: Handle) -> Vec<ClientId> {
        self.notifications
            .iter()
            .filter(|n| n.peer == peer && n.handle == handle)
            .map(|n| n.client_id)
            .collect()
    }

    /// Drops every notification registration on `peer` whose handle falls
    /// within `[start, end]` — a service-changed indication invalidated
    /// that range, so a stale registration there is no longer meaningful
    /// (spec.md §4.5).
    pub fn clear_notifications_in_range(&mut self, peer: BdAddr, start: Handle, end: Handle) {
        self.notifications
            .retain(|n| !(n.peer == peer && n.handle >= start && n.handle <= end));
    }

    // --- background-connect tracker ---

    /// Adds `(client_id, peer)` to the background-connect tracker, bounded
    /// by the white list size (spec.md §4.1 "background connect").
    pub fn track_background_connect(&mut self, client_id: ClientId, peer: BdAddr) -> GattcResult<()> {
        if self.background_connects.contains(&(client_id, peer)) {
            return Ok(());
        }
        if self.background_connects.len() >= self.max_background_connects {
            return Err(GattcError::NoResources);
        }
        self.background_connects.push((client_id, peer));
        Ok(())
    }

    pub fn untrack_background_connect(&mut self, client_id: ClientId, peer: BdAddr) {
        self.background_connects.retain(|e| *e != (client_id, peer));
    }

    pub fn is_background_tracked(&self, client_id: ClientId, peer: BdAddr) -> bool {
        self.background_connects.contains(&(client_id, peer))
    }

    /// Removes and returns every peer `client_id` has a background connect
    /// tracked against — used by `deregister` to clear each tracking row's
    /// bit for this app before cancelling the connect itself (spec.md §4.1).
    pub fn take_background_connects_for(&mut self, client_id: ClientId) -> Vec<BdAddr> {
        let mut peers = Vec::new();
        self.background_connects.retain(|(id, peer)| {
            if *id == client_id {
                peers.push(*peer);
                false
            } else {
                true
            }
        });
        peers
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FakeTransport;

    fn noop_callback() -> Box<dyn GattClientCallback> {
        Box::new(|_: AppEvent| {})
    }

    #[test]
    fn register_assigns_client_id_and_fires_reg_event() {
        let transport = FakeTransport::new();
        let mut registry = Registry::new(8);
        let client_id = registry
            .register(&transport, Uuid::uuid16(0x1234), noop_callback())
            .expect("register should succeed");
        assert!(registry.is_registered(client_id));
    }

    #[test]
    fn deregister_is_deferred_while_clcbs_are_live() {
        let transport = FakeTransport::new();
        let mut registry = Registry::new(8);
        let client_id = registry
            .register(&transport, Uuid::uuid16(0x1234), noop_callback())
            .unwrap();
        registry.on_clcb_opened(client_id);
        registry.deregister(&transport, client_id);
        assert!(registry.is_registered(client_id));
        assert!(registry.is_dereg_pending(client_id));

        registry.on_clcb_closed(&transport, client_id);
        assert!(!registry.is_registered(client_id));
    }

    #[test]
    fn background_connect_tracker_is_bounded() {
        let transport = FakeTransport::new();
        let mut registry = Registry::new(1);
        let client_id = registry
            .register(&transport, Uuid::uuid16(0x1234), noop_callback())
            .unwrap();
        let a = BdAddr::new([1, 2, 3, 4, 5, 6]);
        let b = BdAddr::new([6, 5, 4, 3, 2, 1]);
        registry.track_background_connect(client_id, a).unwrap();
        assert!(registry.track_background_connect(client_id, b).is_err());
    }
}
