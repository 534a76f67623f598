//! Open method dispatch for bound objects.
//!
//! The bus forwards arbitrary method names; [`ServiceObject`] is the seam
//! where an application receives them. Implement it directly for full
//! control, or assemble a [`MethodTable`] from per-method handlers.

use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use tracing::warn;

use crate::core::value::{Kwargs, Value};
use crate::error::{BusError, RemoteException};
use crate::protocol::transaction::Yielder;

/// Failure modes of a serviced invocation.
#[derive(Debug, Clone)]
pub enum CallFault {
    /// An exception to relay to the caller.
    Exception(RemoteException),
    /// A non-local control transfer escaping the method.
    Throw {
        /// Tag of the transfer.
        tag: Value,
        /// Value carried alongside the tag.
        value: Value,
    },
}

impl CallFault {
    /// An exception fault with the given class and message.
    pub fn exception(class: impl Into<String>, message: impl Into<String>) -> Self {
        CallFault::Exception(RemoteException::new(class, message))
    }

    /// A `RuntimeError` fault.
    pub fn runtime(message: impl Into<String>) -> Self {
        Self::exception(crate::error::constants::CLASS_RUNTIME_ERROR, message)
    }

    /// A tagged throw fault.
    pub fn throw(tag: Value, value: Value) -> Self {
        CallFault::Throw { tag, value }
    }

    /// The `NoMethodError` fault for an unroutable method name.
    pub fn no_method(method: &str) -> Self {
        Self::exception("NoMethodError", format!("undefined method `{method}'"))
    }
}

impl From<BusError> for CallFault {
    fn from(err: BusError) -> Self {
        match err {
            BusError::Remote(exc) => CallFault::Exception(exc),
            BusError::RemoteThrow { tag, value } => CallFault::Throw { tag, value },
            other => Self::exception("IOError", other.to_string()),
        }
    }
}

/// Outcome of servicing one invocation.
pub type CallResult = std::result::Result<Value, CallFault>;

/// An object that can be bound on a connection and invoked by the peer.
#[async_trait]
pub trait ServiceObject: Send + Sync {
    /// Kind label used for reference-type matching during encoding.
    fn kind(&self) -> &str {
        "object"
    }

    /// Whether the object routes the given method name.
    fn responds_to(&self, _method: &str) -> bool {
        true
    }

    /// Human-readable identity, served to remote `describe` queries.
    fn describe(&self) -> String {
        format!("#<{}>", self.kind())
    }

    /// Service one invocation.
    ///
    /// `block` is present when the caller supplied a block callback; each
    /// [`Yielder::yield_values`] call streams a tuple to the caller and
    /// waits for its reply.
    async fn call(
        &self,
        method: &str,
        args: Vec<Value>,
        kwargs: Kwargs,
        block: Option<&mut Yielder<'_>>,
    ) -> CallResult;
}

/// Handler servicing a single method of a [`MethodTable`].
#[async_trait]
pub trait MethodHandler: Send + Sync {
    /// Service the method.
    async fn handle(
        &self,
        args: Vec<Value>,
        kwargs: Kwargs,
        block: Option<&mut Yielder<'_>>,
    ) -> CallResult;
}

struct SyncMethod<F>(F);

#[async_trait]
impl<F> MethodHandler for SyncMethod<F>
where
    F: Fn(Vec<Value>, Kwargs) -> CallResult + Send + Sync,
{
    async fn handle(
        &self,
        args: Vec<Value>,
        kwargs: Kwargs,
        _block: Option<&mut Yielder<'_>>,
    ) -> CallResult {
        (self.0)(args, kwargs)
    }
}

/// Method-routing [`ServiceObject`] built from registered handlers.
///
/// Uses `Cow<'static, str>` keys to avoid heap allocations for the usual
/// statically named methods.
pub struct MethodTable {
    kind: String,
    handlers: RwLock<HashMap<Cow<'static, str>, Arc<dyn MethodHandler>>>,
}

impl MethodTable {
    /// Create an empty table with the given kind label.
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            handlers: RwLock::new(HashMap::new()),
        }
    }

    /// Register a plain method backed by a synchronous closure.
    pub fn method<F>(self, name: &'static str, f: F) -> Self
    where
        F: Fn(Vec<Value>, Kwargs) -> CallResult + Send + Sync + 'static,
    {
        self.handler(name, SyncMethod(f))
    }

    /// Register a method backed by a full [`MethodHandler`], e.g. one that
    /// streams through the block channel.
    pub fn handler(self, name: &'static str, handler: impl MethodHandler + 'static) -> Self {
        if let Ok(mut handlers) = self.handlers.write() {
            handlers.insert(Cow::Borrowed(name), Arc::new(handler));
        }
        self
    }

    fn lookup(&self, method: &str) -> Option<Arc<dyn MethodHandler>> {
        self.handlers.read().ok()?.get(method).cloned()
    }
}

#[async_trait]
impl ServiceObject for MethodTable {
    fn kind(&self) -> &str {
        &self.kind
    }

    fn responds_to(&self, method: &str) -> bool {
        self.handlers
            .read()
            .map(|handlers| handlers.contains_key(method))
            .unwrap_or(false)
    }

    async fn call(
        &self,
        method: &str,
        args: Vec<Value>,
        kwargs: Kwargs,
        block: Option<&mut Yielder<'_>>,
    ) -> CallResult {
        match self.lookup(method) {
            Some(handler) => handler.handle(args, kwargs, block).await,
            None => {
                warn!(kind = %self.kind, method, "method not routable");
                Err(CallFault::no_method(method))
            }
        }
    }
}
