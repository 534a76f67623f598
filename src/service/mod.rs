//! # Service Layer
//!
//! Endpoint acceptance and dialing around the core connection: a server
//! accept loop with graceful shutdown, and a client with an optional
//! supervised reconnection mode.
//!
//! Both sides hand the freshly constructed [`Connection`] to an
//! `on_connected` callback so the application can bind its objects before
//! traffic flows.
//!
//! [`Connection`]: crate::protocol::connection::Connection

pub mod client;
pub mod server;

#[cfg(unix)]
pub use client::{connect, run_supervised};
#[cfg(unix)]
pub use server::{serve, serve_with_shutdown};
