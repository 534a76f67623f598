//! # Core Wire Components
//!
//! Low-level framing and the self-describing value codec.
//!
//! This module is the only layer that knows the ABI: frame layout, msgpack
//! encodings, and the extension-tag table.
//!
//! ## Components
//! - **Frame**: binary frame format with magic bytes and length validation
//! - **FrameCodec**: tokio codec for framing over byte streams
//! - **Value**: dynamic value model and its extension-tagged wire mapping
//!
//! ## Wire Format
//! ```text
//! [Magic(4)] [Version(1)] [Length(4)] [Payload(N msgpack bytes)]
//! ```
//!
//! ## Security
//! - Maximum frame size: 16 MiB (prevents memory exhaustion)
//! - Magic bytes prevent accidental misinterpretation
//! - Length validation before allocation

pub mod codec;
pub mod frame;
pub mod value;
