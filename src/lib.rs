//! GATT client action layer: a connection-per-app state machine, a
//! single-slot per-connection operation queue, and robust-caching-aware
//! service discovery, driven over a pluggable [`transport::GattTransport`]
//! rather than a specific radio stack.
//!
//! The crate is organized the way the teacher splits its BLE GATT client
//! module: small single-purpose files per concern (registry, connection
//! block, state machine, service-changed handling, connection dispatch,
//! event ingress) composed by one core type ([`core::GattClientCore`])
//! and exposed through a worker-thread-backed handle ([`client::GattClient`]).

mod clcb;
mod client;
mod config;
mod connect;
mod core;
mod error;
mod event;
mod ingress;
mod queue;
mod registry;
mod server_record;
mod service_changed;
mod state_machine;
mod transport;
mod types;

#[cfg(test)]
mod test_support;

pub use client::GattClient;
pub use config::GattcConfig;
pub use error::{GattcError, GattcResult};
pub use event::PendingCommand;
pub use ingress::TransportEvent;
pub use server_record::DiscoverState;
pub use transport::{
    AppEvent, AttributeCache, AttributeDatabase, CachedCharacteristic, FixedRobustCaching,
    GattClientCallback, GattTransport, RobustCachingPolicy, RobustCachingSupport, ServiceDiscovery,
    TryMtuResult,
};
pub use types::{BdAddr, ClientId, ConnId, ConnReason, GattStatus, Handle, LinkRole, TransId, Transport, Uuid};
