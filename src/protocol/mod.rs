//! # Protocol Layer
//!
//! The bus semantics on top of the core wire format: messages, bound
//! objects, proxies, transactions, and the connection dispatch loop.
//!
//! ## Components
//! - **Message**: wire-visible message kinds and their tags
//! - **ServiceObject / MethodTable**: open method dispatch for bound objects
//! - **ObjectRegistry**: explicit and implicit name bindings
//! - **ProxyTable**: weak cache of held proxies driving Release back-pressure
//! - **Transaction**: per-call state machine with the Yield/Next channel
//! - **Proxy**: forwarding façade identified by `(connection, name)`
//! - **Connection**: framed stream multiplexing all of the above

pub mod connection;
pub mod message;
pub mod object;
pub mod proxy;
pub(crate) mod proxy_table;
pub mod registry;
pub mod transaction;
