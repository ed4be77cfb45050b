//! # `nearcast_core`
//!
//! The core of the nearcast geospatial publish/subscribe gateway.
//!
//! Connected clients broadcast their position and receive, in near-real
//! time, the activity of every client inside their local neighborhood (or
//! of every client in one of their groups). This crate owns the hard parts:
//! spatial indexing and neighborhood coverings, the session token
//! lifecycle, the two subscription planes over a pub/sub broker, and the
//! per-connection subscription driver.
//!
//! Transports (HTTP/WebSocket, the binary TCP demo surface) and the
//! production backends (Redis, SQLite) live in `nearcast_server`; this
//! crate only speaks to them through the [`store`], [`pubsub`] and
//! [`context`] contracts, with in-memory implementations in [`memory`] for
//! tests and the simulator.

pub mod activity;
pub mod broker;
pub mod cell;
pub mod config;
pub mod context;
pub mod endpoint;
pub mod entity;
pub mod error;
pub mod group;
pub mod ids;
pub mod location;
pub mod memory;
pub mod plane;
pub mod pubsub;
pub mod store;
pub mod subscription;
pub mod token;
pub mod topology;
pub mod wire;

#[cfg(test)]
pub(crate) mod testutil;

pub use activity::{Activity, DataResponse, UserData, UserFilter};
pub use broker::Broker;
pub use cell::{cell_id_at, center_location, Cell};
pub use config::Config;
pub use context::{ArchiveContext, Context};
pub use endpoint::Endpoint;
pub use entity::Entity;
pub use error::CoreError;
pub use group::Group;
pub use ids::{ClientId, TokenId};
pub use location::Location;
pub use plane::SubscriptionPlane;
pub use pubsub::PubSub;
pub use store::{ArchiveStore, ClientChannel, ConnectionId, KeyValueStore};
pub use subscription::{Subscription, SubscriptionEvent};
pub use token::TokenStore;
pub use topology::Topology;
