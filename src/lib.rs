//! # object-bus
//!
//! A bidirectional, transparent object RPC bus over local stream sockets.
//!
//! Two peers exchange length-delimited, self-describing messages that let
//! either side invoke methods on objects bound in the other, stream values
//! through a block-callback channel, propagate errors and non-local control
//! flow, and share object identities by reference across the wire.
//!
//! ## Architecture
//! - **core**: framing and the extension-tagged msgpack value codec
//! - **protocol**: messages, registries, proxies, transactions, and the
//!   connection dispatch loop
//! - **service**: unix-socket server and (supervised) client
//! - **transport**: local endpoint helpers
//! - **utils**: logging, metrics, timeouts
//!
//! ## Example
//! ```rust,no_run
//! use std::sync::Arc;
//! use object_bus::prelude::*;
//!
//! # async fn demo() -> object_bus::error::Result<()> {
//! // Server side: bind a counter and serve.
//! let counter = Arc::new(
//!     MethodTable::new("counter").method("ping", |_args, _kwargs| Ok(Value::symbol("pong"))),
//! );
//! tokio::spawn(object_bus::service::serve(
//!     "bus.ipc",
//!     ConnectionOptions::server(),
//!     move |conn| conn.bind("counter", counter.clone()),
//! ));
//!
//! // Client side: dial and invoke.
//! let conn = object_bus::service::connect("bus.ipc", ConnectionOptions::client(), |_| {}).await?;
//! let counter = conn.proxy("counter");
//! let pong = counter.call("ping", vec![], Kwargs::new()).await?;
//! assert_eq!(pong, Value::symbol("pong"));
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]

pub mod config;
pub mod core;
pub mod error;
pub mod protocol;
pub mod service;
pub mod transport;
pub mod utils;

pub use crate::config::{BusConfig, ConnectionOptions};
pub use crate::core::value::{Kwargs, Name, ObjectRef, Value};
pub use crate::error::{BusError, RemoteException, Result};
pub use crate::protocol::connection::Connection;
pub use crate::protocol::message::{Message, TransactionId};
pub use crate::protocol::object::{
    CallFault, CallResult, MethodHandler, MethodTable, ServiceObject,
};
pub use crate::protocol::proxy::Proxy;
pub use crate::protocol::transaction::{BlockCallback, BlockFn, BlockResult, YieldReply, Yielder};

/// Prelude module for convenient imports.
///
/// ```rust
/// use object_bus::prelude::*;
/// ```
pub mod prelude {
    pub use crate::config::{BusConfig, ConnectionOptions};
    pub use crate::core::value::{Kwargs, Name, ObjectRef, Value};
    pub use crate::error::{BusError, RemoteException, Result};
    pub use crate::protocol::connection::Connection;
    pub use crate::protocol::object::{
        CallFault, CallResult, MethodHandler, MethodTable, ServiceObject,
    };
    pub use crate::protocol::proxy::Proxy;
    pub use crate::protocol::transaction::{BlockCallback, BlockFn, YieldReply, Yielder};
}
