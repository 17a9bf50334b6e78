//! The public handle, [`GattClient`]: a single worker thread owning a
//! [`GattClientCore`] and a channel every other thread funnels requests
//! and transport callbacks through (`SPEC_FULL.md` §0). This replaces
//! the teacher's `BtSingleton` — an `unsafe impl Sync` around a raw
//! `Box<dyn FnMut>` cell — with an ordinary `std::sync::mpsc` channel and
//! a dedicated thread, since nothing here crosses an FFI boundary that
//! would force `unsafe` callback plumbing.

use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};

use crate::config::GattcConfig;
use crate::core::GattClientCore;
use crate::error::GattcResult;
use crate::event::PendingCommand;
use crate::ingress::TransportEvent;
use crate::transport::{AttributeCache, GattClientCallback, GattTransport, RobustCachingPolicy, ServiceDiscovery};
use crate::types::{BdAddr, ClientId, ConnId, Handle, Transport, Uuid};

enum Command {
    Register {
        app_uuid: Uuid,
        callback: Box<dyn GattClientCallback>,
        reply: Sender<GattcResult<ClientId>>,
    },
    Deregister {
        client_id: ClientId,
    },
    Open {
        client_id: ClientId,
        peer: BdAddr,
        transport: Transport,
        is_direct: bool,
        reply: Sender<GattcResult<()>>,
    },
    CancelOpen {
        client_id: ClientId,
        peer: BdAddr,
        transport: Transport,
        is_direct: bool,
    },
    Close {
        conn_id: ConnId,
    },
    Submit {
        conn_id: ConnId,
        cmd: PendingCommand,
        reply: Sender<GattcResult<()>>,
    },
    Search {
        conn_id: ConnId,
    },
    RegisterNotification {
        client_id: ClientId,
        peer: BdAddr,
        handle: Handle,
    },
    UnregisterNotification {
        client_id: ClientId,
        peer: BdAddr,
        handle: Handle,
    },
    Transport(TransportEvent),
    Shutdown,
}

/// Handle to a running GATT client core. Cheap to clone conceptually
/// (only a channel sender), but kept `!Clone` for now since nothing in
/// this crate needs more than one owner of the worker thread's lifetime.
pub struct GattClient {
    tx: Sender<Command>,
    worker: Option<JoinHandle<()>>,
}

impl GattClient {
    pub fn new(
        transport: Box<dyn GattTransport>,
        discovery: Box<dyn ServiceDiscovery>,
        cache: Box<dyn AttributeCache>,
        policy: Box<dyn RobustCachingPolicy>,
        config: GattcConfig,
    ) -> Self {
        let (tx, rx): (Sender<Command>, Receiver<Command>) = mpsc::channel();
        let worker = thread::Builder::new()
            .name("gattc-core".into())
            .spawn(move || {
                let mut core = GattClientCore::new(transport, discovery, cache, policy, config);
                run(&mut core, rx);
            })
            .expect("failed to spawn gattc-core worker thread");

        Self {
            tx,
            worker: Some(worker),
        }
    }

    pub fn register(&self, app_uuid: Uuid, callback: Box<dyn GattClientCallback>) -> GattcResult<ClientId> {
        let (reply_tx, reply_rx) = mpsc::channel();
        self.send(Command::Register {
            app_uuid,
            callback,
            reply: reply_tx,
        });
        reply_rx.recv().unwrap_or(Err(crate::error::GattcError::Error))
    }

    pub fn deregister(&self, client_id: ClientId) {
        self.send(Command::Deregister { client_id });
    }

    pub fn open(&self, client_id: ClientId, peer: BdAddr, transport: Transport, is_direct: bool) -> GattcResult<()> {
        let (reply_tx, reply_rx) = mpsc::channel();
        self.send(Command::Open {
            client_id,
            peer,
            transport,
            is_direct,
            reply: reply_tx,
        });
        reply_rx.recv().unwrap_or(Err(crate::error::GattcError::Error))
    }

    pub fn cancel_open(&self, client_id: ClientId, peer: BdAddr, transport: Transport, is_direct: bool) {
        self.send(Command::CancelOpen {
            client_id,
            peer,
            transport,
            is_direct,
        });
    }

    pub fn close(&self, conn_id: ConnId) {
        self.send(Command::Close { conn_id });
    }

    pub fn submit_command(&self, conn_id: ConnId, cmd: PendingCommand) -> GattcResult<()> {
        let (reply_tx, reply_rx) = mpsc::channel();
        self.send(Command::Submit { conn_id, cmd, reply: reply_tx });
        reply_rx.recv().unwrap_or(Err(crate::error::GattcError::Error))
    }

    pub fn search(&self, conn_id: ConnId) {
        self.send(Command::Search { conn_id });
    }

    pub fn register_notification(&self, client_id: ClientId, peer: BdAddr, handle: Handle) {
        self.send(Command::RegisterNotification { client_id, peer, handle });
    }

    pub fn unregister_notification(&self, client_id: ClientId, peer: BdAddr, handle: Handle) {
        self.send(Command::UnregisterNotification { client_id, peer, handle });
    }

    /// Feeds a transport callback into the core. Called from whatever
    /// thread the underlying stack delivers callbacks on; the event is
    /// queued and processed on the worker thread like everything else.
    pub fn notify_transport_event(&self, event: TransportEvent) {
        self.send(Command::Transport(event));
    }

    fn send(&self, cmd: Command) {
        if self.tx.send(cmd).is_err() {
            log::warn!("gattc-core worker thread is gone, dropping command");
        }
    }
}

impl Drop for GattClient {
    fn drop(&mut self) {
        let _ = self.tx.send(Command::Shutdown);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn run(core: &mut GattClientCore, rx: Receiver<Command>) {
    for cmd in rx {
        match cmd {
            Command::Register { app_uuid, callback, reply } => {
                let result = core.register(app_uuid, callback);
                let _ = reply.send(result);
            }
            Command::Deregister { client_id } => core.deregister(client_id),
            Command::Open { client_id, peer, transport, is_direct, reply } => {
                let result = core.open(client_id, peer, transport, is_direct);
                let _ = reply.send(result);
            }
            Command::CancelOpen { client_id, peer, transport, is_direct } => {
                core.cancel_open(client_id, peer, transport, is_direct);
            }
            Command::Close { conn_id } => core.close(conn_id),
            Command::Submit { conn_id, cmd, reply } => {
                let result = core.submit_command(conn_id, cmd);
                let _ = reply.send(result);
            }
            Command::Search { conn_id } => core.search(conn_id),
            Command::RegisterNotification { client_id, peer, handle } => {
                core.register_notification(client_id, peer, handle);
            }
            Command::UnregisterNotification { client_id, peer, handle } => {
                core.unregister_notification(client_id, peer, handle);
            }
            Command::Transport(event) => core.handle_transport_event(event),
            Command::Shutdown => break,
        }
    }
}
