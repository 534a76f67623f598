//! Protocol messages and their wire mapping.
//!
//! Every frame carries exactly one message, encoded as a msgpack extension
//! value whose type is the message tag. Tag numbers and the field order
//! inside each payload are ABI:
//!
//! | Tag  | Message | Payload (msgpack array)                                  |
//! |------|---------|----------------------------------------------------------|
//! | 0x00 | Invoke  | `[id, target, method, args, kwargs, has_block]`          |
//! | 0x01 | Return  | `[id, result]`                                           |
//! | 0x02 | Yield   | `[id, values]`                                           |
//! | 0x03 | Error   | `[id, exception]`                                        |
//! | 0x04 | Next    | `[id, value]`                                            |
//! | 0x05 | Throw   | `[id, [tag, value]]`                                     |
//! | 0x06 | Close   | `[id]`                                                   |
//! | 0x11 | Release | `[name]`                                                 |

use bytes::Bytes;

use crate::core::value::{
    decode_value, encode_value, expect_str, from_msgpack, to_msgpack, DecodeContext,
    EncodeContext, Kwargs, Name, Value,
};
use crate::error::{BusError, RemoteException, Result};

/// Extension tag for Invoke.
pub const TAG_INVOKE: i8 = 0x00;
/// Extension tag for Return.
pub const TAG_RETURN: i8 = 0x01;
/// Extension tag for Yield.
pub const TAG_YIELD: i8 = 0x02;
/// Extension tag for Error.
pub const TAG_ERROR: i8 = 0x03;
/// Extension tag for Next.
pub const TAG_NEXT: i8 = 0x04;
/// Extension tag for Throw.
pub const TAG_THROW: i8 = 0x05;
/// Extension tag for Close.
pub const TAG_CLOSE: i8 = 0x06;
/// Extension tag for Release.
pub const TAG_RELEASE: i8 = 0x11;

/// Identifier of one in-flight call on a connection.
///
/// Client-originated connections allocate odd ids starting at 1,
/// server-originated connections even ids starting at 2; both increment by
/// 2, so the peers never collide on a shared wire.
pub type TransactionId = u64;

/// One wire-visible protocol message.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// Start an invocation of `method` on the object bound under `target`.
    Invoke {
        id: TransactionId,
        target: Name,
        method: String,
        args: Vec<Value>,
        kwargs: Kwargs,
        has_block: bool,
    },
    /// Terminal: successful result.
    Return { id: TransactionId, value: Value },
    /// Stream a tuple of values to the caller's block.
    Yield {
        id: TransactionId,
        values: Vec<Value>,
    },
    /// Terminal: an exception escaped the method (or the caller's block).
    Error {
        id: TransactionId,
        exception: RemoteException,
    },
    /// The caller's block reply to a Yield.
    Next { id: TransactionId, value: Value },
    /// Terminal: a tagged non-local control transfer escaped the method.
    Throw {
        id: TransactionId,
        tag: Value,
        value: Value,
    },
    /// End the transaction without a result.
    Close { id: TransactionId },
    /// The peer dropped its last proxy for `name`.
    Release { name: Name },
}

impl Message {
    /// The transaction this message belongs to, if any.
    pub fn transaction_id(&self) -> Option<TransactionId> {
        match self {
            Message::Invoke { id, .. }
            | Message::Return { id, .. }
            | Message::Yield { id, .. }
            | Message::Error { id, .. }
            | Message::Next { id, .. }
            | Message::Throw { id, .. }
            | Message::Close { id } => Some(*id),
            Message::Release { .. } => None,
        }
    }

    /// Short kind label for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Message::Invoke { .. } => "invoke",
            Message::Return { .. } => "return",
            Message::Yield { .. } => "yield",
            Message::Error { .. } => "error",
            Message::Next { .. } => "next",
            Message::Throw { .. } => "throw",
            Message::Close { .. } => "close",
            Message::Release { .. } => "release",
        }
    }

    /// True for messages that terminate their transaction.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Message::Return { .. } | Message::Error { .. } | Message::Throw { .. }
        )
    }
}

/// Serialize a message to frame payload bytes.
pub fn encode_message(msg: &Message, cx: &dyn EncodeContext) -> Result<Bytes> {
    let (tag, fields) = match msg {
        Message::Invoke {
            id,
            target,
            method,
            args,
            kwargs,
            has_block,
        } => (
            TAG_INVOKE,
            vec![
                rmpv::Value::from(*id),
                rmpv::Value::from(target.as_str()),
                rmpv::Value::from(method.as_str()),
                rmpv::Value::Array(
                    args.iter()
                        .map(|v| encode_value(v, cx))
                        .collect::<Result<Vec<_>>>()?,
                ),
                rmpv::Value::Map(
                    kwargs
                        .iter()
                        .map(|(k, v)| Ok((rmpv::Value::from(k.as_str()), encode_value(v, cx)?)))
                        .collect::<Result<Vec<_>>>()?,
                ),
                rmpv::Value::Boolean(*has_block),
            ],
        ),
        Message::Return { id, value } => (
            TAG_RETURN,
            vec![rmpv::Value::from(*id), encode_value(value, cx)?],
        ),
        Message::Yield { id, values } => (
            TAG_YIELD,
            vec![
                rmpv::Value::from(*id),
                rmpv::Value::Array(
                    values
                        .iter()
                        .map(|v| encode_value(v, cx))
                        .collect::<Result<Vec<_>>>()?,
                ),
            ],
        ),
        Message::Error { id, exception } => (
            TAG_ERROR,
            vec![
                rmpv::Value::from(*id),
                encode_value(&Value::Exception(exception.clone()), cx)?,
            ],
        ),
        Message::Next { id, value } => (
            TAG_NEXT,
            vec![rmpv::Value::from(*id), encode_value(value, cx)?],
        ),
        Message::Throw { id, tag, value } => (
            TAG_THROW,
            vec![
                rmpv::Value::from(*id),
                rmpv::Value::Array(vec![encode_value(tag, cx)?, encode_value(value, cx)?]),
            ],
        ),
        Message::Close { id } => (TAG_CLOSE, vec![rmpv::Value::from(*id)]),
        Message::Release { name } => (TAG_RELEASE, vec![rmpv::Value::from(name.as_str())]),
    };

    let payload = to_msgpack(&rmpv::Value::Array(fields))?;
    let bytes = to_msgpack(&rmpv::Value::Ext(tag, payload))?;
    Ok(Bytes::from(bytes))
}

/// Parse a message from frame payload bytes.
pub fn decode_message(bytes: &[u8], cx: &dyn DecodeContext) -> Result<Message> {
    let (tag, payload) = match from_msgpack(bytes)? {
        rmpv::Value::Ext(tag, payload) => (tag, payload),
        other => {
            return Err(BusError::Codec(format!(
                "expected message extension, got {other}"
            )))
        }
    };

    let fields = match from_msgpack(&payload)? {
        rmpv::Value::Array(fields) => fields,
        _ => return Err(BusError::Codec("malformed message payload".to_string())),
    };
    let mut fields = fields.into_iter();

    let msg = match tag {
        TAG_INVOKE => {
            let id = expect_id(fields.next())?;
            let target = Name::new(expect_str(fields.next(), "invoke target")?);
            let method = expect_str(fields.next(), "invoke method")?;
            let args = expect_values(fields.next(), cx)?;
            let kwargs = expect_kwargs(fields.next(), cx)?;
            let has_block = match fields.next() {
                Some(rmpv::Value::Boolean(b)) => b,
                _ => return Err(BusError::Codec("expected has_block flag".to_string())),
            };
            Message::Invoke {
                id,
                target,
                method,
                args,
                kwargs,
                has_block,
            }
        }
        TAG_RETURN => Message::Return {
            id: expect_id(fields.next())?,
            value: expect_value(fields.next(), cx)?,
        },
        TAG_YIELD => Message::Yield {
            id: expect_id(fields.next())?,
            values: expect_values(fields.next(), cx)?,
        },
        TAG_ERROR => {
            let id = expect_id(fields.next())?;
            let exception = match expect_value(fields.next(), cx)? {
                Value::Exception(exc) => exc,
                other => RemoteException::new(
                    crate::error::constants::CLASS_RUNTIME_ERROR,
                    format!("{other:?}"),
                ),
            };
            Message::Error { id, exception }
        }
        TAG_NEXT => Message::Next {
            id: expect_id(fields.next())?,
            value: expect_value(fields.next(), cx)?,
        },
        TAG_THROW => {
            let id = expect_id(fields.next())?;
            let pair = match fields.next() {
                Some(rmpv::Value::Array(pair)) if pair.len() == 2 => pair,
                _ => return Err(BusError::Codec("malformed throw payload".to_string())),
            };
            let mut pair = pair.into_iter();
            Message::Throw {
                id,
                tag: expect_value(pair.next(), cx)?,
                value: expect_value(pair.next(), cx)?,
            }
        }
        TAG_CLOSE => Message::Close {
            id: expect_id(fields.next())?,
        },
        TAG_RELEASE => Message::Release {
            name: Name::new(expect_str(fields.next(), "release name")?),
        },
        tag => return Err(BusError::UnknownTag(tag)),
    };
    Ok(msg)
}

fn expect_id(value: Option<rmpv::Value>) -> Result<TransactionId> {
    match value {
        Some(rmpv::Value::Integer(n)) => n
            .as_u64()
            .ok_or_else(|| BusError::Codec("negative transaction id".to_string())),
        _ => Err(BusError::Codec("expected transaction id".to_string())),
    }
}

fn expect_value(value: Option<rmpv::Value>, cx: &dyn DecodeContext) -> Result<Value> {
    match value {
        Some(wire) => decode_value(wire, cx),
        None => Err(BusError::Codec("missing message field".to_string())),
    }
}

fn expect_values(value: Option<rmpv::Value>, cx: &dyn DecodeContext) -> Result<Vec<Value>> {
    match value {
        Some(rmpv::Value::Array(items)) => items
            .into_iter()
            .map(|v| decode_value(v, cx))
            .collect::<Result<Vec<_>>>(),
        _ => Err(BusError::Codec("expected value list".to_string())),
    }
}

fn expect_kwargs(value: Option<rmpv::Value>, cx: &dyn DecodeContext) -> Result<Kwargs> {
    match value {
        Some(rmpv::Value::Map(pairs)) => {
            let mut kwargs = Kwargs::new();
            for (key, val) in pairs {
                let key = expect_str(Some(key), "kwarg key")?;
                kwargs.insert(key, decode_value(val, cx)?);
            }
            Ok(kwargs)
        }
        _ => Err(BusError::Codec("expected kwargs map".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::value::{EncodeContext, ObjectRef};
    use crate::protocol::proxy::Proxy;

    struct NoRefs;

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

    fn roundtrip(msg: Message) -> Message {
        let bytes = encode_message(&msg, &NoRefs).unwrap();
        decode_message(&bytes, &NoRefs).unwrap()
    }

    #[test]
    fn invoke_roundtrip() {
        let mut kwargs = Kwargs::new();
        kwargs.insert("depth".into(), Value::from(2));
        let msg = Message::Invoke {
            id: 7,
            target: Name::from("counter"),
            method: "increment".into(),
            args: vec![Value::from(1), Value::symbol("fast")],
            kwargs,
            has_block: true,
        };
        assert_eq!(roundtrip(msg.clone()), msg);
    }

    #[test]
    fn terminal_roundtrips() {
        for msg in [
            Message::Return {
                id: 3,
                value: Value::from("done"),
            },
            Message::Error {
                id: 3,
                exception: RemoteException::new("RuntimeError", "Remote error"),
            },
            Message::Throw {
                id: 3,
                tag: Value::symbol("abort"),
                value: Value::Nil,
            },
        ] {
            assert!(msg.is_terminal());
            assert_eq!(roundtrip(msg.clone()), msg);
        }
    }

    #[test]
    fn stream_roundtrips() {
        for msg in [
            Message::Yield {
                id: 9,
                values: vec![Value::from(1), Value::from(2)],
            },
            Message::Next {
                id: 9,
                value: Value::symbol("ack"),
            },
            Message::Close { id: 9 },
            Message::Release {
                name: Name::from("obj-7f"),
            },
        ] {
            assert!(!msg.is_terminal());
            assert_eq!(roundtrip(msg.clone()), msg);
        }
    }

    #[test]
    fn message_tags_are_pinned() {
        let cases: Vec<(Message, i8)> = vec![
            (
                Message::Return {
                    id: 1,
                    value: Value::Nil,
                },
                0x01,
            ),
            (Message::Yield { id: 1, values: vec![] }, 0x02),
            (
                Message::Next {
                    id: 1,
                    value: Value::Nil,
                },
                0x04,
            ),
            (Message::Close { id: 1 }, 0x06),
            (
                Message::Release {
                    name: Name::from("n"),
                },
                0x11,
            ),
        ];
        for (msg, tag) in cases {
            let bytes = encode_message(&msg, &NoRefs).unwrap();
            match from_msgpack(&bytes).unwrap() {
                rmpv::Value::Ext(actual, _) => assert_eq!(actual, tag),
                other => panic!("expected ext, got {other}"),
            }
        }
    }

    #[test]
    fn unknown_message_tag_rejected() {
        let bytes = to_msgpack(&rmpv::Value::Ext(0x0C, vec![0x90])).unwrap();
        assert!(matches!(
            decode_message(&bytes, &NoRefs),
            Err(BusError::UnknownTag(0x0C))
        ));
    }
}
