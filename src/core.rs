//! Ties components C1-C8 together behind one `handle_event` entry point.
//! Everything here runs on a single thread — the worker thread owned by
//! [`crate::client::GattClient`] — so no field needs its own lock.

use crate::clcb::ClcbTable;
use crate::config::GattcConfig;
use crate::connect;
use crate::error::GattcResult;
use crate::event::PendingCommand;
#[cfg(test)]
use crate::event::Event;
use crate::ingress::{self, TransportEvent};
use crate::registry::Registry;
use crate::server_record::SrcbTable;
use crate::state_machine::{self, Ctx};
use crate::transport::{AttributeCache, GattClientCallback, GattTransport, RobustCachingPolicy, ServiceDiscovery};
use crate::types::{BdAddr, ClientId, ConnId, Transport, Uuid};

/// Builds a [`Ctx`] by borrowing each field of `$self` directly, so the
/// borrow checker sees it as disjoint from a separately-borrowed
/// `$self.clcb` rather than treating the whole struct as taken.
macro_rules! ctx {
    ($self:ident) => {
        Ctx {
            registry: &mut $self.registry,
            srcb: &mut $self.srcb,
            transport: $self.transport.as_ref(),
            discovery: $self.discovery.as_ref(),
            cache: $self.cache.as_ref(),
            policy: $self.policy.as_ref(),
            config: &$self.config,
        }
    };
}

/// The whole GATT client action layer, minus the thread that serializes
/// access to it (see `client.rs`).
pub struct GattClientCore {
    registry: Registry,
    srcb: SrcbTable,
    clcb: ClcbTable,
    transport: Box<dyn GattTransport>,
    discovery: Box<dyn ServiceDiscovery>,
    cache: Box<dyn AttributeCache>,
    policy: Box<dyn RobustCachingPolicy>,
    config: GattcConfig,
}

impl GattClientCore {
    pub fn new(
        transport: Box<dyn GattTransport>,
        discovery: Box<dyn ServiceDiscovery>,
        cache: Box<dyn AttributeCache>,
        policy: Box<dyn RobustCachingPolicy>,
        config: GattcConfig,
    ) -> Self {
        Self {
            registry: Registry::new(config.max_background_connects),
            srcb: SrcbTable::new(),
            clcb: ClcbTable::new(),
            transport,
            discovery,
            cache,
            policy,
            config,
        }
    }

    pub fn register(&mut self, app_uuid: Uuid, callback: Box<dyn GattClientCallback>) -> GattcResult<ClientId> {
        self.registry.register(self.transport.as_ref(), app_uuid, callback)
    }

    /// Handles an app's deregister request (spec.md §4.1). Every
    /// background connect this app was tracking is cancelled first; if the
    /// app still owns open CLCBs, each is driven through a synthetic close
    /// so the final one to finish completes the deregistration.
    pub fn deregister(&mut self, client_id: ClientId) {
        for peer in self.registry.take_background_connects_for(client_id) {
            self.transport.cancel_connect(client_id, peer, false);
        }

        self.registry.deregister(self.transport.as_ref(), client_id);

        if self.registry.is_dereg_pending(client_id) {
            let indices = self.clcb.indices_for_client(client_id);
            let mut ctx = ctx!(self);
            for idx in indices {
                if let Some(clcb) = self.clcb.get_mut(idx) {
                    if clcb.is_discovering() {
                        state_machine::disc_close(
                            &mut ctx,
                            clcb,
                            crate::types::ConnReason::LocalHostTerminated,
                            Ok(()),
                            true,
                        );
                    } else {
                        state_machine::close(
                            &mut ctx,
                            clcb,
                            crate::types::ConnReason::LocalHostTerminated,
                            Ok(()),
                            true,
                        );
                    }
                }
            }
        }
    }

    pub fn open(
        &mut self,
        client_id: ClientId,
        peer: BdAddr,
        transport: Transport,
        is_direct: bool,
    ) -> GattcResult<()> {
        let mut ctx = ctx!(self);
        connect::api_open(&mut ctx, &mut self.clcb, client_id, peer, transport, is_direct).map(|_| ())
    }

    pub fn cancel_open(&mut self, client_id: ClientId, peer: BdAddr, transport: Transport, is_direct: bool) {
        let mut ctx = ctx!(self);
        connect::api_cancel_open(&mut ctx, &mut self.clcb, client_id, peer, transport, is_direct);
    }

    pub fn close(&mut self, conn_id: ConnId) {
        let Some(idx) = self.clcb.find_by_conn_id(conn_id) else {
            return;
        };
        let mut ctx = ctx!(self);
        if let Some(clcb) = self.clcb.get_mut(idx) {
            if clcb.is_discovering() {
                state_machine::disc_close(
                    &mut ctx,
                    clcb,
                    crate::types::ConnReason::LocalHostTerminated,
                    Ok(()),
                    true,
                );
            } else {
                state_machine::close(&mut ctx, clcb, crate::types::ConnReason::LocalHostTerminated, Ok(()), true);
            }
        }
    }

    pub fn submit_command(&mut self, conn_id: ConnId, cmd: PendingCommand) -> GattcResult<()> {
        let Some(idx) = self.clcb.find_by_conn_id(conn_id) else {
            return Err(crate::error::GattcError::Error);
        };
        let mut ctx = ctx!(self);
        let clcb = self.clcb.get_mut(idx).ok_or(crate::error::GattcError::Error)?;
        state_machine::submit_command(&mut ctx, clcb, idx, cmd)
    }

    pub fn search(&mut self, conn_id: ConnId) {
        let Some(idx) = self.clcb.find_by_conn_id(conn_id) else {
            return;
        };
        let mut ctx = ctx!(self);
        if let Some(clcb) = self.clcb.get_mut(idx) {
            if !clcb.is_discovering() {
                let conn_id = clcb.conn_id;
                state_machine::start_discover(&mut ctx, clcb, conn_id, false);
            }
        }
    }

    pub fn register_notification(&mut self, client_id: ClientId, peer: BdAddr, handle: crate::types::Handle) {
        self.registry.register_notification(client_id, peer, handle);
    }

    pub fn unregister_notification(&mut self, client_id: ClientId, peer: BdAddr, handle: crate::types::Handle) {
        self.registry.unregister_notification(client_id, peer, handle);
    }

    pub fn handle_transport_event(&mut self, event: TransportEvent) {
        let mut ctx = ctx!(self);
        ingress::route(&mut ctx, &mut self.clcb, event);
    }

    /// Single entry point for events already normalized into the
    /// internal event vocabulary, used by tests that want to drive the
    /// state machine without a `TransportEvent` round trip.
    #[cfg(test)]
    pub(crate) fn handle_event(&mut self, event: Event) {
        match event {
            Event::ApiOpen { client_id, peer, transport, is_direct } => {
                let _ = self.open(client_id, peer, transport, is_direct);
            }
            Event::ApiCancelOpen { client_id, peer, transport, is_direct } => {
                self.cancel_open(client_id, peer, transport, is_direct);
            }
            Event::ApiClose { conn_id } => self.close(conn_id),
            Event::ApiCommand { conn_id, cmd } => {
                let _ = self.submit_command(conn_id, cmd);
            }
            Event::ApiSearch { conn_id, .. } => self.search(conn_id),
            Event::ApiConfirm { conn_id, handle, trans_id } => {
                let mut ctx = ctx!(self);
                crate::service_changed::confirm(&mut ctx, conn_id, handle, trans_id);
            }
            Event::IntConn { client_id, peer, transport, conn_id, mtu } => {
                self.handle_transport_event(TransportEvent::Connected {
                    client_id,
                    peer,
                    transport,
                    conn_id,
                    mtu,
                });
            }
            Event::IntOpenFail { client_id, peer, transport } => {
                self.handle_transport_event(TransportEvent::OpenFailed { client_id, peer, transport });
            }
            Event::IntCancelOpenOk { client_id, peer, transport } => {
                self.handle_transport_event(TransportEvent::CancelOpenOk { client_id, peer, transport });
            }
            Event::IntDiscover { conn_id } => self.search(conn_id),
            Event::IntDisconn { conn_id, reason, peer_initiated } => {
                self.handle_transport_event(TransportEvent::Disconnected { conn_id, reason, peer_initiated });
            }
            Event::DiscoverCmpl { conn_id, status } => {
                self.handle_transport_event(TransportEvent::DiscoveryComplete { conn_id, status });
            }
            Event::OpComplete { conn_id, status, payload } => {
                self.handle_transport_event(TransportEvent::OpComplete { conn_id, status, payload });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FakeCache, FakeDiscovery, FakeTransport, FixedPolicy, RecordingCallback};
    use crate::transport::{AppEvent, RobustCachingSupport};

    fn new_core(policy: RobustCachingSupport) -> GattClientCore {
        GattClientCore::new(
            Box::new(FakeTransport::new()),
            Box::new(FakeDiscovery::new()),
            Box::new(FakeCache::new()),
            Box::new(FixedPolicy(policy)),
            GattcConfig::default(),
        )
    }

    fn new_core_with_transport(
        policy: RobustCachingSupport,
        transport: FakeTransport,
    ) -> GattClientCore {
        GattClientCore::new(
            Box::new(transport),
            Box::new(FakeDiscovery::new()),
            Box::new(FakeCache::new()),
            Box::new(FixedPolicy(policy)),
            GattcConfig::default(),
        )
    }

    fn new_core_with_cache(policy: RobustCachingSupport, cache: FakeCache) -> GattClientCore {
        GattClientCore::new(
            Box::new(FakeTransport::new()),
            Box::new(FakeDiscovery::new()),
            Box::new(cache),
            Box::new(FixedPolicy(policy)),
            GattcConfig::default(),
        )
    }

    #[test]
    fn open_discover_close_happy_path() {
        let mut core = new_core(RobustCachingSupport::Unknown);
        let cb = RecordingCallback::new();
        let client_id = core.register(Uuid::uuid16(0x1234), Box::new(cb.clone())).unwrap();

        let peer = BdAddr::new([1, 2, 3, 4, 5, 6]);
        core.open(client_id, peer, Transport::Le, true).unwrap();

        let idx = core.clcb.find_by_identity(client_id, peer, Transport::Le).unwrap();
        assert_eq!(core.clcb.get(idx).unwrap().state, crate::clcb::ClcbState::W4Conn);

        core.handle_transport_event(TransportEvent::Connected {
            client_id,
            peer,
            transport: Transport::Le,
            conn_id: 7,
            mtu: 185,
        });
        assert_eq!(
            core.clcb.get(idx).unwrap().state,
            crate::clcb::ClcbState::Discover
        );

        core.handle_transport_event(TransportEvent::DiscoveryComplete {
            conn_id: 7,
            status: Ok(()),
        });
        assert_eq!(core.clcb.get(idx).unwrap().state, crate::clcb::ClcbState::Conn);

        core.close(7);
        assert_eq!(core.clcb.get(idx).unwrap().state, crate::clcb::ClcbState::Idle);

        let events = cb.events();
        assert!(events.iter().any(|e| matches!(e, AppEvent::Open { status: Ok(()), .. })));
        assert!(events.iter().any(|e| matches!(e, AppEvent::SearchComplete { .. })));
        assert!(events.iter().any(|e| matches!(e, AppEvent::Close { .. })));
    }

    #[test]
    fn deregister_while_connected_closes_every_owned_clcb_then_completes() {
        let mut core = new_core(RobustCachingSupport::Unsupported);
        let cb = RecordingCallback::new();
        let client_id = core.register(Uuid::uuid16(0x1234), Box::new(cb.clone())).unwrap();
        let peer = BdAddr::new([9; 6]);
        core.open(client_id, peer, Transport::Le, true).unwrap();
        core.handle_transport_event(TransportEvent::Connected {
            client_id,
            peer,
            transport: Transport::Le,
            conn_id: 3,
            mtu: 23,
        });

        // Deregistering while a CLCB is still open posts a synthetic close
        // to it immediately; with only one CLCB owned by this app, that
        // close drops `num_clcb` straight to zero and deregistration
        // completes in the same call (spec.md §4.1 `deregister`, §8
        // testable property 8, scenario S3).
        core.deregister(client_id);

        assert!(!core.registry.is_registered(client_id));
        let events = cb.events();
        assert!(events.iter().any(|e| matches!(e, AppEvent::Close { .. })));
        assert!(events.iter().any(|e| matches!(e, AppEvent::Dereg { .. })));
    }

    #[test]
    fn deregister_with_two_clcbs_closes_both_before_completing() {
        let mut core = new_core(RobustCachingSupport::Unsupported);
        let cb = RecordingCallback::new();
        let client_id = core.register(Uuid::uuid16(0x1234), Box::new(cb.clone())).unwrap();
        let peer_a = BdAddr::new([9; 6]);
        let peer_b = BdAddr::new([10; 6]);

        core.open(client_id, peer_a, Transport::Le, true).unwrap();
        core.handle_transport_event(TransportEvent::Connected {
            client_id,
            peer: peer_a,
            transport: Transport::Le,
            conn_id: 3,
            mtu: 23,
        });
        core.open(client_id, peer_b, Transport::Le, true).unwrap();
        core.handle_transport_event(TransportEvent::Connected {
            client_id,
            peer: peer_b,
            transport: Transport::Le,
            conn_id: 4,
            mtu: 23,
        });

        core.deregister(client_id);

        let events = cb.events();
        assert_eq!(events.iter().filter(|e| matches!(e, AppEvent::Close { .. })).count(), 2);
        assert_eq!(events.iter().filter(|e| matches!(e, AppEvent::Dereg { .. })).count(), 1);
        assert!(!core.registry.is_registered(client_id));
    }

    #[test]
    fn command_submitted_mid_discovery_is_replayed_after_completion() {
        let mut core = new_core(RobustCachingSupport::Unsupported);
        let cb = RecordingCallback::new();
        let client_id = core.register(Uuid::uuid16(0x1), Box::new(cb.clone())).unwrap();
        let peer = BdAddr::new([2; 6]);
        core.open(client_id, peer, Transport::Le, true).unwrap();
        core.handle_transport_event(TransportEvent::Connected {
            client_id,
            peer,
            transport: Transport::Le,
            conn_id: 11,
            mtu: 23,
        });

        core.submit_command(11, PendingCommand::ReadByHandle { handle: 42 }).unwrap();

        core.handle_transport_event(TransportEvent::DiscoveryComplete {
            conn_id: 11,
            status: Ok(()),
        });

        let idx = core.clcb.find_by_conn_id(11).unwrap();
        assert!(core.clcb.get(idx).unwrap().in_flight.is_some());
    }

    #[test]
    fn service_changed_indication_notifies_every_app_sharing_the_peer() {
        use crate::transport::{AttributeDatabase, CachedCharacteristic};

        let mut core = new_core(RobustCachingSupport::Supported);
        let cb_a = RecordingCallback::new();
        let cb_b = RecordingCallback::new();
        let client_a = core.register(Uuid::uuid16(0x1), Box::new(cb_a.clone())).unwrap();
        let client_b = core.register(Uuid::uuid16(0x2), Box::new(cb_b.clone())).unwrap();
        let peer = BdAddr::new([7; 6]);

        core.open(client_a, peer, Transport::Le, true).unwrap();
        core.handle_transport_event(TransportEvent::Connected {
            client_id: client_a,
            peer,
            transport: Transport::Le,
            conn_id: 1,
            mtu: 23,
        });
        core.handle_transport_event(TransportEvent::DiscoveryComplete { conn_id: 1, status: Ok(()) });

        core.open(client_b, peer, Transport::Le, true).unwrap();
        core.handle_transport_event(TransportEvent::Connected {
            client_id: client_b,
            peer,
            transport: Transport::Le,
            conn_id: 2,
            mtu: 23,
        });
        core.handle_transport_event(TransportEvent::DiscoveryComplete { conn_id: 2, status: Ok(()) });

        let srcb_idx = core.srcb.find(peer).unwrap();
        core.srcb.get_mut(srcb_idx).database = AttributeDatabase::new(vec![CachedCharacteristic {
            service_uuid: Uuid::GATT_SERVICE,
            char_uuid: Uuid::SERVICE_CHANGED,
            value_handle: 9,
        }]);

        core.handle_transport_event(TransportEvent::Indication {
            conn_id: 1,
            handle: 9,
            value: vec![0x01, 0x00, 0xff, 0x00],
            trans_id: 55,
            needs_confirm: true,
        });

        assert!(cb_a.events().iter().any(|e| matches!(e, AppEvent::ServiceChanged { .. })));
        assert!(cb_b.events().iter().any(|e| matches!(e, AppEvent::ServiceChanged { .. })));
    }

    #[test]
    fn notification_fans_out_to_a_registrant_with_no_open_connection_of_its_own() {
        let mut core = new_core(RobustCachingSupport::Unsupported);
        let cb_a = RecordingCallback::new();
        let cb_b = RecordingCallback::new();
        let client_a = core.register(Uuid::uuid16(0x1), Box::new(cb_a.clone())).unwrap();
        let client_b = core.register(Uuid::uuid16(0x2), Box::new(cb_b.clone())).unwrap();
        let peer = BdAddr::new([3; 6]);

        core.open(client_a, peer, Transport::Le, true).unwrap();
        core.handle_transport_event(TransportEvent::Connected {
            client_id: client_a,
            peer,
            transport: Transport::Le,
            conn_id: 1,
            mtu: 23,
        });
        core.handle_transport_event(TransportEvent::DiscoveryComplete { conn_id: 1, status: Ok(()) });

        // Client B never calls `open` — it only registers interest in a
        // handle on the same peer that client A already has connected.
        core.register_notification(client_b, peer, 0x30);

        core.handle_transport_event(TransportEvent::Notification {
            conn_id: 1,
            handle: 0x30,
            value: vec![0xAB],
        });

        assert!(cb_b
            .events()
            .iter()
            .any(|e| matches!(e, AppEvent::Notify { handle: 0x30, is_notify: true, .. })));
        assert!(cb_b.events().iter().any(|e| matches!(e, AppEvent::Open { status: Ok(()), .. })));
        // Client A never registered for this handle, so it gets nothing.
        assert!(!cb_a.events().iter().any(|e| matches!(e, AppEvent::Notify { .. })));
    }

    #[test]
    fn service_changed_confirm_and_rediscovery_wait_for_every_app_to_observe() {
        use crate::transport::{AttributeDatabase, CachedCharacteristic};

        let transport = FakeTransport::new();
        let handle = transport.clone();
        let mut core = new_core_with_transport(RobustCachingSupport::Supported, transport);
        let cb_a = RecordingCallback::new();
        let cb_b = RecordingCallback::new();
        let client_a = core.register(Uuid::uuid16(0x1), Box::new(cb_a.clone())).unwrap();
        let client_b = core.register(Uuid::uuid16(0x2), Box::new(cb_b.clone())).unwrap();
        let peer = BdAddr::new([8; 6]);

        core.open(client_a, peer, Transport::Le, true).unwrap();
        core.handle_transport_event(TransportEvent::Connected {
            client_id: client_a,
            peer,
            transport: Transport::Le,
            conn_id: 1,
            mtu: 23,
        });
        core.handle_transport_event(TransportEvent::DiscoveryComplete { conn_id: 1, status: Ok(()) });

        core.open(client_b, peer, Transport::Le, true).unwrap();
        core.handle_transport_event(TransportEvent::Connected {
            client_id: client_b,
            peer,
            transport: Transport::Le,
            conn_id: 2,
            mtu: 23,
        });
        core.handle_transport_event(TransportEvent::DiscoveryComplete { conn_id: 2, status: Ok(()) });

        let srcb_idx = core.srcb.find(peer).unwrap();
        core.srcb.get_mut(srcb_idx).database = AttributeDatabase::new(vec![CachedCharacteristic {
            service_uuid: Uuid::GATT_SERVICE,
            char_uuid: Uuid::SERVICE_CHANGED,
            value_handle: 9,
        }]);

        // Only client A has observed the indication so far: the ATT
        // confirm and the re-discovery kickoff both wait.
        core.handle_transport_event(TransportEvent::Indication {
            conn_id: 1,
            handle: 9,
            value: vec![0x01, 0x00, 0xff, 0x00],
            trans_id: 55,
            needs_confirm: true,
        });
        assert_eq!(handle.confirm_call_count(), 0);
        let idx_a = core.clcb.find_by_conn_id(1).unwrap();
        assert_eq!(core.clcb.get(idx_a).unwrap().state, crate::clcb::ClcbState::Conn);

        // Client B's own copy of the same indication completes the set:
        // now the confirm fires exactly once and discovery restarts.
        core.handle_transport_event(TransportEvent::Indication {
            conn_id: 2,
            handle: 9,
            value: vec![0x01, 0x00, 0xff, 0x00],
            trans_id: 56,
            needs_confirm: true,
        });
        assert_eq!(handle.confirm_call_count(), 1);
        let rediscovering = [idx_a, core.clcb.find_by_conn_id(2).unwrap()]
            .into_iter()
            .any(|idx| core.clcb.get(idx).unwrap().state == crate::clcb::ClcbState::DiscoverRc);
        assert!(rediscovering);
    }

    #[test]
    fn cancel_open_during_w4conn_returns_to_idle_on_ack() {
        let mut core = new_core(RobustCachingSupport::Unknown);
        let cb = RecordingCallback::new();
        let client_id = core.register(Uuid::uuid16(0x4), Box::new(cb.clone())).unwrap();
        let peer = BdAddr::new([3; 6]);

        core.open(client_id, peer, Transport::Le, true).unwrap();
        let idx = core.clcb.find_by_identity(client_id, peer, Transport::Le).unwrap();
        assert_eq!(core.clcb.get(idx).unwrap().state, crate::clcb::ClcbState::W4Conn);

        core.cancel_open(client_id, peer, Transport::Le, true);
        core.handle_transport_event(TransportEvent::CancelOpenOk {
            client_id,
            peer,
            transport: Transport::Le,
        });

        assert_eq!(core.clcb.get(idx).unwrap().state, crate::clcb::ClcbState::Idle);
        assert!(cb.events().iter().any(|e| matches!(e, AppEvent::CancelOpen { status: Ok(()) })));
    }

    #[test]
    fn mtu_request_in_progress_is_coalesced_onto_the_first_requester() {
        use crate::transport::TryMtuResult;

        let transport = FakeTransport::new();
        transport.queue_try_mtu_result(TryMtuResult::NotDoneYet);
        transport.queue_try_mtu_result(TryMtuResult::InProgress);
        let mut core = new_core_with_transport(RobustCachingSupport::Unsupported, transport);

        let cb_a = RecordingCallback::new();
        let cb_b = RecordingCallback::new();
        let client_a = core.register(Uuid::uuid16(0x1), Box::new(cb_a.clone())).unwrap();
        let client_b = core.register(Uuid::uuid16(0x2), Box::new(cb_b.clone())).unwrap();
        let peer = BdAddr::new([5; 6]);

        core.open(client_a, peer, Transport::Le, true).unwrap();
        core.handle_transport_event(TransportEvent::Connected {
            client_id: client_a,
            peer,
            transport: Transport::Le,
            conn_id: 1,
            mtu: 23,
        });
        core.handle_transport_event(TransportEvent::DiscoveryComplete { conn_id: 1, status: Ok(()) });

        core.open(client_b, peer, Transport::Le, true).unwrap();
        core.handle_transport_event(TransportEvent::Connected {
            client_id: client_b,
            peer,
            transport: Transport::Le,
            conn_id: 2,
            mtu: 23,
        });
        core.handle_transport_event(TransportEvent::DiscoveryComplete { conn_id: 2, status: Ok(()) });

        core.submit_command(1, PendingCommand::ConfigMtu { mtu: 185 }).unwrap();
        core.submit_command(2, PendingCommand::ConfigMtu { mtu: 185 }).unwrap();

        assert!(!cb_b.events().iter().any(|e| matches!(e, AppEvent::ConfigMtu { .. })));

        core.handle_transport_event(TransportEvent::OpComplete {
            conn_id: 1,
            status: Ok(()),
            payload: crate::event::OpCompletePayload::ConfigMtu { mtu: 185 },
        });

        assert!(cb_a.events().iter().any(|e| matches!(e, AppEvent::ConfigMtu { status: Ok(()), mtu: 185, .. })));
        assert!(cb_b.events().iter().any(|e| matches!(e, AppEvent::ConfigMtu { status: Ok(()), mtu: 185, .. })));
    }

    #[test]
    fn bonded_peer_with_unsupported_robust_caching_accepts_the_loaded_cache() {
        use crate::transport::{AttributeDatabase, CachedCharacteristic};

        // Scenario S1: a bonded peer whose robust-caching support is known
        // to be `Unsupported`, with a non-empty database already sitting in
        // the external cache. `conn` must load it and skip discovery
        // entirely rather than launch a fresh pass (spec.md §4.3 `conn`).
        let cache = FakeCache::new();
        let peer = BdAddr::new([4; 6]);
        cache.mark_bonded(peer);
        cache.store(
            peer,
            &AttributeDatabase::new(vec![CachedCharacteristic {
                service_uuid: Uuid::GATT_SERVICE,
                char_uuid: Uuid::SERVICE_CHANGED,
                value_handle: 9,
            }]),
        );

        let mut core = new_core_with_cache(RobustCachingSupport::Unsupported, cache);
        let cb_a = RecordingCallback::new();
        let cb_b = RecordingCallback::new();
        let client_a = core.register(Uuid::uuid16(0x1), Box::new(cb_a.clone())).unwrap();
        let client_b = core.register(Uuid::uuid16(0x2), Box::new(cb_b.clone())).unwrap();

        core.open(client_a, peer, Transport::Le, true).unwrap();
        core.handle_transport_event(TransportEvent::Connected {
            client_id: client_a,
            peer,
            transport: Transport::Le,
            conn_id: 1,
            mtu: 185,
        });

        // A second app attaching to the same already-loaded peer must also
        // be fanned the completion, even though it never triggers a load of
        // its own.
        core.open(client_b, peer, Transport::Le, true).unwrap();
        core.handle_transport_event(TransportEvent::Connected {
            client_id: client_b,
            peer,
            transport: Transport::Le,
            conn_id: 2,
            mtu: 185,
        });

        let idx_a = core.clcb.find_by_conn_id(1).unwrap();
        let idx_b = core.clcb.find_by_conn_id(2).unwrap();
        assert_eq!(core.clcb.get(idx_a).unwrap().state, crate::clcb::ClcbState::Conn);
        assert_eq!(core.clcb.get(idx_b).unwrap().state, crate::clcb::ClcbState::Conn);

        for cb in [&cb_a, &cb_b] {
            let events = cb.events();
            assert!(events.iter().any(|e| matches!(e, AppEvent::Open { status: Ok(()), .. })));
            assert!(events.iter().any(|e| matches!(e, AppEvent::SearchComplete { status: Ok(()), .. })));
        }
    }
}
