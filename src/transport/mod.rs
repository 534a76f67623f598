//! # Transport Layer
//!
//! Stream-socket endpoints the bus runs over. The bus itself only needs a
//! bidirectional, ordered, reliable byte stream; this module provides the
//! default local endpoint.

pub mod local;
