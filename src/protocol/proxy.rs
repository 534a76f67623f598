//! Proxy façade over a remotely bound object.
//!
//! A [`Proxy`] is a `(connection, name)` pair: every call on it travels
//! through `Connection::invoke` to the object bound under that name on the
//! peer. Identity (equality, hashing, `Display`) is local; `responds_to`
//! and `describe` queries are forwarded over the wire.
//!
//! Dropping the last clone of a proxy enqueues a `Release` for its name,
//! which the connection's finalizer task delivers to the peer.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use async_trait::async_trait;

use crate::core::value::{Kwargs, Name, Value};
use crate::error::{BusError, RemoteException, Result};
use crate::protocol::connection::Connection;
use crate::protocol::object::{CallFault, CallResult, ServiceObject};
use crate::protocol::transaction::{
    BlockCallback, BlockResult, YieldReply, Yielder, METHOD_DESCRIBE, METHOD_RESPOND_TO,
};

/// Shared state of a proxy; its `Drop` drives Release back-pressure.
pub(crate) struct ProxyShared {
    name: Name,
    conn: Connection,
}

impl Drop for ProxyShared {
    fn drop(&mut self) {
        self.conn.enqueue_release(self.name.clone());
    }
}

/// Handle forwarding invocations to an object bound on the peer.
#[derive(Clone)]
pub struct Proxy {
    shared: Arc<ProxyShared>,
}

impl Proxy {
    pub(crate) fn new(conn: Connection, name: Name) -> Self {
        Self {
            shared: Arc::new(ProxyShared { name, conn }),
        }
    }

    pub(crate) fn shared(&self) -> &Arc<ProxyShared> {
        &self.shared
    }

    pub(crate) fn from_shared(shared: Arc<ProxyShared>) -> Self {
        Self { shared }
    }

    /// The remote name this proxy stands for. Local accessor, never
    /// forwarded.
    pub fn name(&self) -> &Name {
        &self.shared.name
    }

    /// The connection that owns this proxy. Local accessor, never
    /// forwarded.
    pub fn connection(&self) -> &Connection {
        &self.shared.conn
    }

    /// This proxy as a bindable service object sharing its identity, so
    /// re-advertising it on another connection reuses one implicit name.
    pub fn as_object(&self) -> crate::core::value::ObjectRef {
        self.shared.clone()
    }

    /// Invoke a method on the remote object.
    pub async fn call(&self, method: &str, args: Vec<Value>, kwargs: Kwargs) -> Result<Value> {
        self.shared
            .conn
            .invoke(self.name(), method, args, kwargs, None)
            .await
    }

    /// Invoke a method, streaming yielded tuples through `block`.
    pub async fn call_with_block(
        &self,
        method: &str,
        args: Vec<Value>,
        kwargs: Kwargs,
        block: &mut dyn BlockCallback,
    ) -> Result<Value> {
        self.shared
            .conn
            .invoke(self.name(), method, args, kwargs, Some(block))
            .await
    }

    /// Ask the remote object whether it routes `method`.
    pub async fn responds_to(&self, method: &str) -> Result<bool> {
        let reply = self
            .call(METHOD_RESPOND_TO, vec![Value::symbol(method)], Kwargs::new())
            .await?;
        Ok(matches!(reply, Value::Bool(true)))
    }

    /// Fetch the remote object's human-readable identity.
    pub async fn describe(&self) -> Result<String> {
        match self
            .call(METHOD_DESCRIBE, Vec::new(), Kwargs::new())
            .await?
        {
            Value::String(s) => Ok(s),
            other => Ok(format!("{other:?}")),
        }
    }
}

impl PartialEq for Proxy {
    fn eq(&self, other: &Self) -> bool {
        self.shared.conn.id() == other.shared.conn.id() && self.shared.name == other.shared.name
    }
}

impl Eq for Proxy {}

impl Hash for Proxy {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.shared.conn.id().hash(state);
        self.shared.name.hash(state);
    }
}

impl fmt::Display for Proxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "proxy {}", self.shared.name)
    }
}

impl fmt::Debug for Proxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Proxy")
            .field("name", &self.shared.name)
            .field("connection", &self.shared.conn.id())
            .finish()
    }
}

/// Bridges a yield stream from one connection into a block callback on
/// another: each tuple the downstream method yields is re-yielded to the
/// upstream caller.
struct YieldRelay<'y, 'a> {
    yielder: &'y mut Yielder<'a>,
}

#[async_trait]
impl BlockCallback for YieldRelay<'_, '_> {
    async fn on_yield(&mut self, values: Vec<Value>) -> BlockResult {
        match self.yielder.yield_values(values).await {
            Ok(YieldReply::Next(value)) => Ok(value),
            Ok(YieldReply::Closed) => Ok(Value::Nil),
            Err(BusError::Remote(exception)) => Err(exception),
            Err(other) => Err(RemoteException::new("IOError", other.to_string())),
        }
    }
}

/// A proxy is itself a service object: re-binding its shared state on
/// another connection forwards invocations hop by hop back to the origin.
///
/// The impl lives on [`ProxyShared`] so the implicit name a re-bind derives
/// from its identity is stable across proxy clones.
#[async_trait]
impl ServiceObject for ProxyShared {
    fn kind(&self) -> &str {
        "proxy"
    }

    fn describe(&self) -> String {
        format!("proxy {}", self.name)
    }

    async fn call(
        &self,
        method: &str,
        args: Vec<Value>,
        kwargs: Kwargs,
        block: Option<&mut Yielder<'_>>,
    ) -> CallResult {
        let result = match block {
            Some(yielder) => {
                let mut relay = YieldRelay { yielder };
                self.conn
                    .invoke(&self.name, method, args, kwargs, Some(&mut relay))
                    .await
            }
            None => self.conn.invoke(&self.name, method, args, kwargs, None).await,
        };
        result.map_err(CallFault::from)
    }
}
