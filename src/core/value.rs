//! Dynamic value model and its msgpack wire mapping.
//!
//! Everything that crosses the wire is a [`Value`]. Scalars, strings,
//! lists, and maps use plain msgpack encodings; the remaining kinds use
//! extension types with fixed tags (the tag table is ABI):
//!
//! | Tag  | Kind           | Ext payload                                 |
//! |------|----------------|---------------------------------------------|
//! | 0x10 | Proxy ref      | name, utf8 bytes                            |
//! | 0x20 | Symbol         | utf8 bytes                                  |
//! | 0x21 | Exception      | msgpack `[class, message, backtrace]`       |
//! | 0x22 | Class token    | fully-qualified name, utf8 bytes            |
//! | 0x30+| Reference type | implicit name, utf8 bytes; one tag per kind |
//!
//! Encoding and decoding are pure given the two resolver callbacks into
//! the owning connection ([`EncodeContext`], [`DecodeContext`]): the
//! codec itself never touches registries directly.

use std::collections::BTreeMap;
use std::fmt;
use std::io::Cursor;
use std::sync::Arc;

use crate::error::{BusError, RemoteException, Result};
use crate::protocol::object::ServiceObject;
use crate::protocol::proxy::Proxy;

/// Shared handle to a locally held service object.
pub type ObjectRef = Arc<dyn ServiceObject>;

/// Keyword arguments of an invocation.
pub type Kwargs = BTreeMap<String, Value>;

/// Extension tag for proxy references.
pub const TAG_PROXY: i8 = 0x10;
/// Extension tag for symbols.
pub const TAG_SYMBOL: i8 = 0x20;
/// Extension tag for relayed exceptions.
pub const TAG_EXCEPTION: i8 = 0x21;
/// Extension tag for class tokens.
pub const TAG_CLASS: i8 = 0x22;
/// First extension tag of the per-connection reference-type range.
pub const TAG_REFERENCE_BASE: i8 = 0x30;

/// Identifier of a bound object on a particular connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Name(String);

impl Name {
    /// Wrap a name string.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Name {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for Name {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// A value travelling across the bus.
#[derive(Clone, Default)]
pub enum Value {
    /// Absence of a value.
    #[default]
    Nil,
    /// Boolean.
    Bool(bool),
    /// Signed integer.
    Integer(i64),
    /// Double-precision float.
    Float(f64),
    /// UTF-8 string.
    String(String),
    /// Raw bytes.
    Binary(Vec<u8>),
    /// Interned symbol token.
    Symbol(String),
    /// Ordered list.
    List(Vec<Value>),
    /// Ordered key/value pairs.
    Map(Vec<(Value, Value)>),
    /// Relayed exception.
    Exception(RemoteException),
    /// Class token, name-only; resolution is environment-dependent.
    Class(String),
    /// Handle to an object bound on the peer.
    Proxy(Proxy),
    /// Locally held object; encodable only when its kind is a registered
    /// reference type on the encoding connection.
    Object(ObjectRef),
}

impl Value {
    /// Shorthand for a symbol value.
    pub fn symbol(s: impl Into<String>) -> Self {
        Value::Symbol(s.into())
    }

    /// Shorthand for a string value.
    pub fn string(s: impl Into<String>) -> Self {
        Value::String(s.into())
    }

    /// Wrap a service object handle.
    pub fn object(obj: ObjectRef) -> Self {
        Value::Object(obj)
    }

    /// The integer payload, if this is an integer.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(n) => Some(*n),
            _ => None,
        }
    }

    /// The string payload, if this is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// The symbol payload, if this is a symbol.
    pub fn as_symbol(&self) -> Option<&str> {
        match self {
            Value::Symbol(s) => Some(s),
            _ => None,
        }
    }

    /// The proxy payload, if this is a proxy.
    pub fn as_proxy(&self) -> Option<&Proxy> {
        match self {
            Value::Proxy(p) => Some(p),
            _ => None,
        }
    }

    /// True for `Value::Nil`.
    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => f.write_str("nil"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Integer(n) => write!(f, "{n}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::String(s) => write!(f, "{s:?}"),
            Value::Binary(b) => write!(f, "bin[{}]", b.len()),
            Value::Symbol(s) => write!(f, ":{s}"),
            Value::List(items) => f.debug_list().entries(items).finish(),
            Value::Map(pairs) => {
                f.debug_map().entries(pairs.iter().map(|(k, v)| (k, v))).finish()
            }
            Value::Exception(e) => write!(f, "exception({e})"),
            Value::Class(name) => write!(f, "class({name})"),
            Value::Proxy(p) => write!(f, "{p}"),
            Value::Object(o) => write!(f, "object({})", o.kind()),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Binary(a), Value::Binary(b)) => a == b,
            (Value::Symbol(a), Value::Symbol(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a == b,
            (Value::Exception(a), Value::Exception(b)) => a == b,
            (Value::Class(a), Value::Class(b)) => a == b,
            (Value::Proxy(a), Value::Proxy(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Integer(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Integer(n as i64)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}

impl From<Proxy> for Value {
    fn from(p: Proxy) -> Self {
        Value::Proxy(p)
    }
}

/// Encode-side resolver callbacks into the owning connection.
pub trait EncodeContext {
    /// Name under which `proxy` travels on this connection.
    ///
    /// A proxy belonging to this connection keeps its name; a foreign
    /// proxy is implicitly re-bound here and the fresh name is emitted
    /// (multi-hop forwarding).
    fn encode_proxy(&self, proxy: &Proxy) -> Name;

    /// Extension tag and implicit name for a local object, or
    /// `Err(Unserializable)` when its kind is not a registered reference
    /// type on this connection.
    fn encode_object(&self, object: &ObjectRef) -> Result<(i8, Name)>;
}

/// Decode-side resolver callbacks into the owning connection.
pub trait DecodeContext {
    /// Resolve a reference name: the locally bound object when present
    /// (round-trip identity), otherwise a proxy coalesced through the
    /// proxy table.
    fn resolve_reference(&self, name: Name) -> Value;
}

fn codec_err(e: impl fmt::Display) -> BusError {
    BusError::Codec(e.to_string())
}

/// Render an `rmpv` tree to msgpack bytes.
pub fn to_msgpack(value: &rmpv::Value) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    rmpv::encode::write_value(&mut buf, value).map_err(codec_err)?;
    Ok(buf)
}

/// Parse a single msgpack value from bytes, rejecting trailing garbage.
pub fn from_msgpack(bytes: &[u8]) -> Result<rmpv::Value> {
    let mut cursor = Cursor::new(bytes);
    let value = rmpv::decode::read_value(&mut cursor).map_err(codec_err)?;
    if (cursor.position() as usize) < bytes.len() {
        return Err(BusError::Codec("trailing bytes after value".to_string()));
    }
    Ok(value)
}

fn utf8_payload(data: &[u8]) -> Result<String> {
    String::from_utf8(data.to_vec()).map_err(codec_err)
}

/// Lower a [`Value`] to its wire representation.
pub fn encode_value(value: &Value, cx: &dyn EncodeContext) -> Result<rmpv::Value> {
    Ok(match value {
        Value::Nil => rmpv::Value::Nil,
        Value::Bool(b) => rmpv::Value::Boolean(*b),
        Value::Integer(n) => rmpv::Value::from(*n),
        Value::Float(x) => rmpv::Value::F64(*x),
        Value::String(s) => rmpv::Value::from(s.as_str()),
        Value::Binary(b) => rmpv::Value::Binary(b.clone()),
        Value::Symbol(s) => rmpv::Value::Ext(TAG_SYMBOL, s.as_bytes().to_vec()),
        Value::List(items) => rmpv::Value::Array(
            items
                .iter()
                .map(|v| encode_value(v, cx))
                .collect::<Result<Vec<_>>>()?,
        ),
        Value::Map(pairs) => rmpv::Value::Map(
            pairs
                .iter()
                .map(|(k, v)| Ok((encode_value(k, cx)?, encode_value(v, cx)?)))
                .collect::<Result<Vec<_>>>()?,
        ),
        Value::Exception(exc) => {
            let inner = rmpv::Value::Array(vec![
                rmpv::Value::from(exc.class.as_str()),
                rmpv::Value::from(exc.message.as_str()),
                rmpv::Value::Array(
                    exc.backtrace
                        .iter()
                        .map(|line| rmpv::Value::from(line.as_str()))
                        .collect(),
                ),
            ]);
            rmpv::Value::Ext(TAG_EXCEPTION, to_msgpack(&inner)?)
        }
        Value::Class(name) => rmpv::Value::Ext(TAG_CLASS, name.as_bytes().to_vec()),
        Value::Proxy(proxy) => {
            let name = cx.encode_proxy(proxy);
            rmpv::Value::Ext(TAG_PROXY, name.as_str().as_bytes().to_vec())
        }
        Value::Object(object) => {
            let (tag, name) = cx.encode_object(object)?;
            rmpv::Value::Ext(tag, name.as_str().as_bytes().to_vec())
        }
    })
}

/// Raise a wire value back into a [`Value`].
pub fn decode_value(wire: rmpv::Value, cx: &dyn DecodeContext) -> Result<Value> {
    Ok(match wire {
        rmpv::Value::Nil => Value::Nil,
        rmpv::Value::Boolean(b) => Value::Bool(b),
        rmpv::Value::Integer(n) => Value::Integer(
            n.as_i64()
                .ok_or_else(|| BusError::Codec(format!("integer out of range: {n}")))?,
        ),
        rmpv::Value::F32(x) => Value::Float(x as f64),
        rmpv::Value::F64(x) => Value::Float(x),
        rmpv::Value::String(s) => Value::String(
            s.into_str()
                .ok_or_else(|| BusError::Codec("invalid utf8 in string".to_string()))?,
        ),
        rmpv::Value::Binary(b) => Value::Binary(b),
        rmpv::Value::Array(items) => Value::List(
            items
                .into_iter()
                .map(|v| decode_value(v, cx))
                .collect::<Result<Vec<_>>>()?,
        ),
        rmpv::Value::Map(pairs) => Value::Map(
            pairs
                .into_iter()
                .map(|(k, v)| Ok((decode_value(k, cx)?, decode_value(v, cx)?)))
                .collect::<Result<Vec<_>>>()?,
        ),
        rmpv::Value::Ext(TAG_SYMBOL, data) => Value::Symbol(utf8_payload(&data)?),
        rmpv::Value::Ext(TAG_CLASS, data) => Value::Class(utf8_payload(&data)?),
        rmpv::Value::Ext(TAG_EXCEPTION, data) => {
            Value::Exception(decode_exception(&data)?)
        }
        rmpv::Value::Ext(TAG_PROXY, data) => {
            cx.resolve_reference(Name::new(utf8_payload(&data)?))
        }
        rmpv::Value::Ext(tag, data) if tag >= TAG_REFERENCE_BASE => {
            cx.resolve_reference(Name::new(utf8_payload(&data)?))
        }
        rmpv::Value::Ext(tag, _) => return Err(BusError::UnknownTag(tag)),
    })
}

fn decode_exception(data: &[u8]) -> Result<RemoteException> {
    let inner = from_msgpack(data)?;
    let fields = match inner {
        rmpv::Value::Array(fields) if fields.len() == 3 => fields,
        _ => return Err(BusError::Codec("malformed exception payload".to_string())),
    };
    let mut fields = fields.into_iter();
    let class = expect_str(fields.next(), "exception class")?;
    let message = expect_str(fields.next(), "exception message")?;
    let backtrace = match fields.next() {
        Some(rmpv::Value::Array(lines)) => lines
            .into_iter()
            .map(|line| expect_str(Some(line), "backtrace frame"))
            .collect::<Result<Vec<_>>>()?,
        _ => return Err(BusError::Codec("malformed exception backtrace".to_string())),
    };
    Ok(RemoteException {
        class,
        message,
        backtrace,
    })
}

pub(crate) fn expect_str(value: Option<rmpv::Value>, what: &str) -> Result<String> {
    match value {
        Some(rmpv::Value::String(s)) => s
            .into_str()
            .ok_or_else(|| BusError::Codec(format!("invalid utf8 in {what}"))),
        _ => Err(BusError::Codec(format!("expected string for {what}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Resolver stub for values that never touch a connection.
    pub(crate) struct NoRefs;

    impl EncodeContext for NoRefs {
        fn encode_proxy(&self, _proxy: &Proxy) -> Name {
            unreachable!("no proxies in these tests")
        }

        fn encode_object(&self, object: &ObjectRef) -> Result<(i8, Name)> {
            Err(BusError::Unserializable(object.kind().to_string()))
        }
    }

    impl DecodeContext for NoRefs {
        fn resolve_reference(&self, _name: Name) -> Value {
            unreachable!("no references in these tests")
        }
    }

    fn roundtrip(value: Value) -> Value {
        let wire = encode_value(&value, &NoRefs).unwrap();
        let bytes = to_msgpack(&wire).unwrap();
        decode_value(from_msgpack(&bytes).unwrap(), &NoRefs).unwrap()
    }

    #[test]
    fn scalar_roundtrips() {
        for value in [
            Value::Nil,
            Value::Bool(true),
            Value::Integer(-42),
            Value::Float(1.5),
            Value::string("hello"),
            Value::Binary(vec![0, 1, 2]),
            Value::symbol("done"),
        ] {
            assert_eq!(roundtrip(value.clone()), value);
        }
    }

    #[test]
    fn container_roundtrips() {
        let value = Value::List(vec![
            Value::Integer(1),
            Value::Map(vec![(Value::symbol("k"), Value::string("v"))]),
        ]);
        assert_eq!(roundtrip(value.clone()), value);
    }

    #[test]
    fn exception_roundtrip() {
        let mut exc = RemoteException::new("RuntimeError", "boom");
        exc.backtrace = vec!["frame one".into(), "frame two".into()];
        assert_eq!(roundtrip(Value::Exception(exc.clone())), Value::Exception(exc));
    }

    #[test]
    fn symbol_tag_is_pinned() {
        let wire = encode_value(&Value::symbol("ack"), &NoRefs).unwrap();
        assert_eq!(wire, rmpv::Value::Ext(0x20, b"ack".to_vec()));
    }

    #[test]
    fn class_tag_is_pinned() {
        let wire = encode_value(&Value::Class("Service::Worker".into()), &NoRefs).unwrap();
        assert_eq!(wire, rmpv::Value::Ext(0x22, b"Service::Worker".to_vec()));
    }

    #[test]
    fn unknown_tag_rejected() {
        let err = decode_value(rmpv::Value::Ext(0x0F, vec![]), &NoRefs).unwrap_err();
        assert!(matches!(err, BusError::UnknownTag(0x0F)));
    }
}
